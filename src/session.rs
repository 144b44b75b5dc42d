use tracing::{debug, info, warn};

use crate::cookies::CookieProvisioner;
use crate::decode::decode_body;
use crate::error::RelayError;
use crate::extract::extract_attr;
use crate::transport::{PortalRequest, PortalResponse, PortalTransport};

pub const LANDING_PATH: &str = "/portal/sms/received";

const TOKEN_SELECTOR: &str = r#"input[name="_token"]"#;
const TOKEN_FIELD: &str = "_token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated { token: String },
}

/// Cookie-backed portal login plus the anti-forgery token it yields.
pub struct PortalSession<T: PortalTransport> {
    transport: T,
    cookies: CookieProvisioner,
    state: AuthState,
    cookie_count: usize,
}

impl<T: PortalTransport> PortalSession<T> {
    pub fn new(transport: T, cookies: CookieProvisioner) -> Self {
        Self {
            transport,
            cookies,
            state: AuthState::Unauthenticated,
            cookie_count: 0,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, AuthState::Authenticated { .. })
    }

    pub fn token(&self) -> Option<&str> {
        match &self.state {
            AuthState::Authenticated { token } => Some(token),
            AuthState::Unauthenticated => None,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// Number of cookies installed by the last login attempt.
    pub fn cookie_count(&self) -> usize {
        self.cookie_count
    }

    pub fn expire(&mut self) {
        if self.is_authenticated() {
            warn!("portal session expired");
        }
        self.state = AuthState::Unauthenticated;
    }

    /// Verifies the provisioned cookies against the portal landing page.
    ///
    /// Returns `false` for every failure: no cookies, a redirect to the login
    /// form (expired cookies or a blocked IP), a status other than 200, a network
    /// error, or a page without the anti-forgery token.
    pub fn login(&mut self) -> bool {
        debug!("attempting portal login");
        match self.try_login() {
            Ok(token) => {
                self.state = AuthState::Authenticated { token };
                info!(cookies = self.cookie_count, "portal login succeeded");
                true
            }
            Err(err) => {
                warn!(%err, "portal login failed");
                self.state = AuthState::Unauthenticated;
                false
            }
        }
    }

    fn try_login(&mut self) -> Result<String, RelayError> {
        let cookies = self.cookies.load()?;
        self.transport.install_cookies(&cookies)?;
        self.cookie_count = cookies.len();

        let response = self.transport.send(&PortalRequest::get(LANDING_PATH))?;
        let html = decode_body(&response.body, response.content_encoding.as_deref());

        if response.is_login_redirect() || !response.is_success() {
            return Err(RelayError::AuthenticationFailed(format!(
                "cookies expired or IP blocked (status {}, url {})",
                response.status, response.final_url
            )));
        }

        match extract_attr(&html, TOKEN_SELECTOR, "value")? {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(RelayError::AuthenticationFailed(
                "landing page carries no anti-forgery token".to_string(),
            )),
        }
    }

    /// Logs in once if needed.
    pub fn ensure_authenticated(&mut self) -> Result<(), RelayError> {
        if self.is_authenticated() || self.login() {
            Ok(())
        } else {
            Err(RelayError::NotAuthenticated)
        }
    }

    /// Sends a stage request with the session token attached and returns the
    /// decoded body.
    pub fn submit(&mut self, request: PortalRequest) -> Result<String, RelayError> {
        self.ensure_authenticated()?;
        let token = self
            .token()
            .map(str::to_string)
            .ok_or(RelayError::NotAuthenticated)?;

        let mut request = request;
        request.form.insert(0, (TOKEN_FIELD.to_string(), token));
        debug!(path = %request.path, "submitting portal request");

        let response = self.transport.send(&request)?;
        self.check_response(&request, &response)?;
        Ok(decode_body(
            &response.body,
            response.content_encoding.as_deref(),
        ))
    }

    fn check_response(
        &mut self,
        request: &PortalRequest,
        response: &PortalResponse,
    ) -> Result<(), RelayError> {
        // 419 is the portal's "token mismatch" answer.
        if response.is_login_redirect() || matches!(response.status, 401 | 403 | 419) {
            self.expire();
            return Err(RelayError::SessionExpired);
        }
        if !response.is_success() {
            return Err(RelayError::PortalStatus {
                status: response.status,
                path: request.path.clone(),
            });
        }
        Ok(())
    }
}
