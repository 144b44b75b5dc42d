use serde::Serialize;

pub const MISSING_RANGE: &str = "N/A";
pub const MISSING_COUNT: &str = "0";
pub const MISSING_MESSAGE: &str = "No Message";

/// Date bounds as the portal expects them (`DD/MM/YYYY`), passed through
/// verbatim. An empty `to` leaves the end of the range to the portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: String,
    pub to: String,
}

impl DateRange {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn starting(from: impl Into<String>) -> Self {
        Self::new(from, "")
    }
}

/// One range bucket from the summary stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    pub range_key: String,
    pub count: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NumberRecord {
    pub phone_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageResult {
    pub phone_number: String,
    pub message: String,
}

impl MessageResult {
    pub fn has_message(&self) -> bool {
        self.message != MISSING_MESSAGE
    }
}

/// A row of the query endpoint's `data` array. `otp` is `None` when the
/// message lookup for this number failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OtpEntry {
    pub number: String,
    pub otp: Option<String>,
}
