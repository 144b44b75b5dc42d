use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RelayError {
    #[error("no cookies available: {0}")]
    CookiesNotFound(String),

    #[error("failed to parse cookies from {origin}: {message}")]
    CookieParse { origin: String, message: String },

    #[error("portal authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("portal session expired")]
    SessionExpired,

    #[error("portal session is not authenticated")]
    NotAuthenticated,

    #[error("portal request failed: {0}")]
    PortalHttp(String),

    #[error("portal returned status {status} for {path}")]
    PortalStatus { status: u16, path: String },

    #[error("invalid selector {selector}: {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("relay server error: {0}")]
    Server(String),
}
