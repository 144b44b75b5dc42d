#![allow(dead_code)]

use std::io::Write;
use std::sync::{Arc, Mutex};

use flate2::Compression;
use flate2::write::GzEncoder;

use portal_otp_relay::cookies::{CookieProvisioner, CookieSet};
use portal_otp_relay::error::RelayError;
use portal_otp_relay::session::{LANDING_PATH, PortalSession};
use portal_otp_relay::transport::{PortalRequest, PortalResponse, PortalTransport};

pub const BASE: &str = "https://portal.test";
pub const TOKEN: &str = "tok-123";

type Reply = Box<dyn Fn(&PortalRequest) -> Result<PortalResponse, RelayError> + Send>;

/// Shared view of what a [`ScriptedTransport`] was asked to do.
#[derive(Clone, Default)]
pub struct CallLog {
    requests: Arc<Mutex<Vec<PortalRequest>>>,
    cookies: Arc<Mutex<Vec<CookieSet>>>,
}

impl CallLog {
    pub fn requests(&self) -> Vec<PortalRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|req| req.path).collect()
    }

    pub fn count_path(&self, path: &str) -> usize {
        self.requests().iter().filter(|req| req.path == path).count()
    }

    pub fn installed_cookies(&self) -> Vec<CookieSet> {
        self.cookies.lock().unwrap().clone()
    }
}

/// Fake portal answering by request path.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Vec<(String, Reply)>,
    log: CallLog,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A portal whose landing page accepts the session cookies.
    pub fn portal() -> Self {
        Self::new().route(LANDING_PATH, |_| Ok(html(&landing_page())))
    }

    pub fn route<F>(mut self, path: &str, reply: F) -> Self
    where
        F: Fn(&PortalRequest) -> Result<PortalResponse, RelayError> + Send + 'static,
    {
        self.routes.push((path.to_string(), Box::new(reply)));
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl PortalTransport for ScriptedTransport {
    fn install_cookies(&mut self, cookies: &CookieSet) -> Result<(), RelayError> {
        self.log.cookies.lock().unwrap().push(cookies.clone());
        Ok(())
    }

    fn send(&self, request: &PortalRequest) -> Result<PortalResponse, RelayError> {
        self.log.requests.lock().unwrap().push(request.clone());
        match self.routes.iter().find(|(path, _)| *path == request.path) {
            Some((_, reply)) => reply(request),
            None => Ok(html_at(404, &request.path, "not found")),
        }
    }
}

pub fn html(body: &str) -> PortalResponse {
    html_at(200, "/portal/sms/received", body)
}

pub fn html_at(status: u16, path: &str, body: &str) -> PortalResponse {
    PortalResponse {
        status,
        final_url: format!("{BASE}{path}"),
        content_encoding: None,
        body: body.as_bytes().to_vec(),
    }
}

pub fn gzipped(body: &str) -> PortalResponse {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body.as_bytes()).unwrap();
    PortalResponse {
        content_encoding: Some("gzip".to_string()),
        body: encoder.finish().unwrap(),
        ..html(body)
    }
}

pub fn login_redirect() -> PortalResponse {
    html_at(200, "/login", "<form action=\"/login\"></form>")
}

pub fn landing_page() -> String {
    format!(
        "<html><body><form><input type=\"hidden\" name=\"_token\" value=\"{TOKEN}\"></form></body></html>"
    )
}

pub fn summary_page(rows: &[(&str, &str)]) -> String {
    rows.iter()
        .map(|(range, count)| {
            format!(
                "<div class=\"item\"><div class=\"row\"><div class=\"col-sm-4\"> {range} </div><div class=\"col-3\"><p>{count}</p></div></div></div>"
            )
        })
        .collect()
}

pub fn numbers_page(numbers: &[String]) -> String {
    numbers
        .iter()
        .map(|number| {
            format!("<div class=\"card card-body\"><div class=\"row\"><div class=\"col-sm-4\">\n{number}\n</div></div></div>")
        })
        .collect()
}

pub fn message_page(text: &str) -> String {
    format!("<div class=\"row\"><div class=\"col-9 col-sm-6\"><p>  {text}  </p></div></div>")
}

pub fn cookies() -> CookieProvisioner {
    CookieProvisioner::with_blob(r#"[{"name": "laravel_session", "value": "abc"}]"#, "missing-cookies.json")
}

pub fn no_cookies(dir: &tempfile::TempDir) -> CookieProvisioner {
    let path = dir.path().join("cookies.json");
    CookieProvisioner::from_file(path.to_str().unwrap())
}

pub fn logged_in_session(transport: ScriptedTransport) -> PortalSession<ScriptedTransport> {
    let mut session = PortalSession::new(transport, cookies());
    assert!(session.login());
    session
}
