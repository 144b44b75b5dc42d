use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::domain::{
    DateRange, MISSING_COUNT, MISSING_MESSAGE, MISSING_RANGE, MessageResult, NumberRecord,
    OtpEntry, SummaryRow,
};
use crate::error::RelayError;
use crate::extract::{FieldRule, RecordSchema, extract_field, extract_records};
use crate::session::{LANDING_PATH, PortalSession};
use crate::transport::{PortalRequest, PortalTransport};

pub const SUMMARY_PATH: &str = "/portal/sms/received/getsms";
pub const NUMBERS_PATH: &str = "/portal/sms/received/getsms/number";
pub const MESSAGE_PATH: &str = "/portal/sms/received/getsms/number/sms";

pub const SUMMARY_SCHEMA: RecordSchema = RecordSchema {
    container: "div.item",
    fields: &[
        FieldRule {
            field: "range",
            selector: ".col-sm-4",
            default: Some(MISSING_RANGE),
        },
        FieldRule {
            field: "count",
            selector: ".col-3:nth-child(2) p",
            default: Some(MISSING_COUNT),
        },
    ],
};

pub const NUMBERS_SCHEMA: RecordSchema = RecordSchema {
    container: "div.card.card-body",
    fields: &[FieldRule {
        field: "phone_number",
        selector: ".col-sm-4",
        default: None,
    }],
};

pub const MESSAGE_RULE: FieldRule = FieldRule {
    field: "message",
    selector: ".col-9.col-sm-6 p",
    default: Some(MISSING_MESSAGE),
};

/// The summary → numbers → message drill-down.
#[derive(Debug, Clone)]
pub struct FetchPipeline {
    numbers_per_range: Option<usize>,
    budget: Option<Duration>,
}

impl FetchPipeline {
    pub fn new(numbers_per_range: Option<usize>) -> Self {
        Self {
            numbers_per_range,
            budget: None,
        }
    }

    /// Caps the wall time of one [`collect`](Self::collect) call.
    pub fn with_budget(mut self, budget: Option<Duration>) -> Self {
        self.budget = budget;
        self
    }

    /// Stage 1: range buckets with messages in `range`.
    pub fn summary<T: PortalTransport>(
        &self,
        session: &mut PortalSession<T>,
        range: &DateRange,
    ) -> Result<Vec<SummaryRow>, RelayError> {
        let request = PortalRequest::post(SUMMARY_PATH)
            .field("from", range.from.as_str())
            .field("to", range.to.as_str())
            .ajax_from(LANDING_PATH);
        let html = session.submit(request)?;

        let rows = extract_records(&html, &SUMMARY_SCHEMA)?
            .into_iter()
            .map(|mut record| SummaryRow {
                range_key: record
                    .take("range")
                    .unwrap_or_else(|| MISSING_RANGE.to_string()),
                count: record
                    .take("count")
                    .unwrap_or_else(|| MISSING_COUNT.to_string()),
            })
            .collect::<Vec<_>>();
        debug!(rows = rows.len(), "summary stage finished");
        Ok(rows)
    }

    /// Stage 2: numbers that received messages in one range bucket.
    pub fn numbers<T: PortalTransport>(
        &self,
        session: &mut PortalSession<T>,
        range: &DateRange,
        range_key: &str,
    ) -> Result<Vec<NumberRecord>, RelayError> {
        let request = PortalRequest::post(NUMBERS_PATH)
            .field("start", range.from.as_str())
            .field("end", range.to.as_str())
            .field("range", range_key);
        let html = session.submit(request)?;

        Ok(extract_records(&html, &NUMBERS_SCHEMA)?
            .into_iter()
            .filter_map(|mut record| record.take("phone_number"))
            .map(|phone_number| NumberRecord { phone_number })
            .collect())
    }

    /// Stage 3: the latest message for one number.
    pub fn message<T: PortalTransport>(
        &self,
        session: &mut PortalSession<T>,
        range: &DateRange,
        phone_number: &str,
        range_key: &str,
    ) -> Result<MessageResult, RelayError> {
        let request = PortalRequest::post(MESSAGE_PATH)
            .field("start", range.from.as_str())
            .field("end", range.to.as_str())
            .field("Number", phone_number)
            .field("Range", range_key);
        let html = session.submit(request)?;

        let message = extract_field(&html, &MESSAGE_RULE)?
            .unwrap_or_else(|| MISSING_MESSAGE.to_string());
        Ok(MessageResult {
            phone_number: phone_number.to_string(),
            message,
        })
    }

    /// Runs all three stages for `range` within the configured budget.
    pub fn collect<T: PortalTransport>(
        &self,
        session: &mut PortalSession<T>,
        range: &DateRange,
    ) -> Result<Vec<OtpEntry>, RelayError> {
        let deadline = self.budget.map(|budget| Instant::now() + budget);
        self.collect_until(session, range, deadline)
    }

    /// Runs all three stages for `range`.
    ///
    /// A failing summary fails the whole call. A failing range or number is
    /// logged and skipped (range) or reported with a `None` otp (number).
    /// Once `deadline` has passed no further stage 2/3 request is started and
    /// the entries gathered so far are returned.
    pub fn collect_until<T: PortalTransport>(
        &self,
        session: &mut PortalSession<T>,
        range: &DateRange,
        deadline: Option<Instant>,
    ) -> Result<Vec<OtpEntry>, RelayError> {
        let summary = self.summary(session, range)?;
        let expired = || deadline.is_some_and(|deadline| Instant::now() >= deadline);
        let mut entries = Vec::new();

        'ranges: for (index, row) in summary.iter().enumerate() {
            if expired() {
                warn!(
                    skipped_ranges = summary.len() - index,
                    entries = entries.len(),
                    "query budget spent, returning partial data"
                );
                break;
            }
            let numbers = match self.numbers(session, range, &row.range_key) {
                Ok(numbers) => numbers,
                Err(err) => {
                    warn!(range = %row.range_key, %err, "number lookup failed");
                    continue;
                }
            };
            let limit = self.numbers_per_range.unwrap_or(numbers.len());
            if numbers.len() > limit {
                debug!(range = %row.range_key, total = numbers.len(), limit, "truncating numbers");
            }

            for number in numbers.into_iter().take(limit) {
                if expired() {
                    warn!(
                        range = %row.range_key,
                        entries = entries.len(),
                        "query budget spent, returning partial data"
                    );
                    break 'ranges;
                }
                let otp = match self.message(session, range, &number.phone_number, &row.range_key)
                {
                    Ok(result) => Some(result.message),
                    Err(err) => {
                        warn!(number = %number.phone_number, %err, "message lookup failed");
                        None
                    }
                };
                entries.push(OtpEntry {
                    number: number.phone_number,
                    otp,
                });
            }
        }
        Ok(entries)
    }
}

impl Default for FetchPipeline {
    fn default() -> Self {
        Self::new(Some(5))
    }
}
