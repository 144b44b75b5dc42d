use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use reqwest::Url;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::domain::{DateRange, OtpEntry};
use crate::pipeline::FetchPipeline;
use crate::session::PortalSession;
use crate::transport::PortalTransport;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayResponse {
    pub status: u16,
    pub body: Value,
}

impl RelayResponse {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmsQuery {
    pub date: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Serialize)]
struct SmsReport<'a> {
    status: &'static str,
    date: &'a str,
    data: Vec<OtpEntry>,
}

/// Query endpoint over a single shared portal session.
///
/// The session lives behind a mutex so logins and pipeline runs never
/// interleave; the health check reads a mirrored flag instead of waiting.
pub struct OtpRelay<T: PortalTransport> {
    session: Mutex<PortalSession<T>>,
    pipeline: FetchPipeline,
    authenticated: AtomicBool,
}

impl<T: PortalTransport> OtpRelay<T> {
    pub fn new(session: PortalSession<T>, pipeline: FetchPipeline) -> Self {
        let authenticated = AtomicBool::new(session.is_authenticated());
        Self {
            session: Mutex::new(session),
            pipeline,
            authenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Routes a `path?query` request target.
    pub fn handle(&self, target: &str) -> RelayResponse {
        let Ok(url) = Url::parse("http://relay.local").and_then(|base| base.join(target)) else {
            return RelayResponse::error(400, "Malformed request target");
        };
        match url.path() {
            "/" => self.health(),
            "/sms" => {
                let mut query = SmsQuery::default();
                for (key, value) in url.query_pairs() {
                    match key.as_ref() {
                        "date" => query.date = Some(value.into_owned()),
                        "to" => query.to = Some(value.into_owned()),
                        _ => {}
                    }
                }
                self.sms(&query)
            }
            _ => RelayResponse::error(404, "Not found"),
        }
    }

    pub fn health(&self) -> RelayResponse {
        RelayResponse::ok(json!({
            "status": "online",
            "authenticated": self.is_authenticated(),
        }))
    }

    pub fn sms(&self, query: &SmsQuery) -> RelayResponse {
        let Some(date) = query
            .date
            .as_deref()
            .filter(|date| !date.trim().is_empty())
        else {
            return RelayResponse::error(400, "Date required (DD/MM/YYYY)");
        };
        let range = DateRange::new(date, query.to.as_deref().unwrap_or(""));

        let mut session = self.lock_session();
        if !session.is_authenticated() {
            session.login();
        }
        self.mirror(&session);
        if !session.is_authenticated() {
            return RelayResponse::error(
                401,
                "Authentication failed. Update the portal cookies and retry.",
            );
        }

        let result = self.pipeline.collect(&mut *session, &range);
        self.mirror(&session);
        match result {
            Ok(data) => {
                info!(date, entries = data.len(), "sms query served");
                let report = SmsReport {
                    status: "success",
                    date,
                    data,
                };
                match serde_json::to_value(&report) {
                    Ok(body) => RelayResponse::ok(body),
                    Err(err) => {
                        warn!(%err, "failed to serialize sms report");
                        RelayResponse::error(500, "Failed to fetch data")
                    }
                }
            }
            Err(err) => {
                warn!(date, %err, "summary stage failed");
                RelayResponse::error(500, "Failed to fetch data")
            }
        }
    }

    /// Runs a login attempt outside of a query, returning the new state.
    pub fn login(&self) -> bool {
        let mut session = self.lock_session();
        let authenticated = session.login();
        self.mirror(&session);
        authenticated
    }

    pub fn cookie_count(&self) -> usize {
        self.lock_session().cookie_count()
    }

    fn lock_session(&self) -> MutexGuard<'_, PortalSession<T>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mirror(&self, session: &PortalSession<T>) {
        self.authenticated
            .store(session.is_authenticated(), Ordering::SeqCst);
    }
}
