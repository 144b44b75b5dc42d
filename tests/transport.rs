mod common;

use std::io::{Cursor, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;

use assert_matches::assert_matches;
use flate2::Compression;
use flate2::write::GzEncoder;
use tiny_http::{Header, Response, Server};

use common::{ScriptedTransport, TOKEN, cookies, landing_page, summary_page};
use portal_otp_relay::config::PortalSettings;
use portal_otp_relay::cookies::CookieSet;
use portal_otp_relay::domain::DateRange;
use portal_otp_relay::error::RelayError;
use portal_otp_relay::pipeline::{FetchPipeline, NUMBERS_PATH, SUMMARY_PATH};
use portal_otp_relay::relay::OtpRelay;
use portal_otp_relay::server::RelayServer;
use portal_otp_relay::session::{LANDING_PATH, PortalSession};
use portal_otp_relay::transport::{HttpPortalTransport, PortalRequest, PortalTransport};

/// One request as the fake portal received it.
#[derive(Debug, Clone)]
struct Received {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl Received {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }
}

type Reply = Response<Cursor<Vec<u8>>>;

/// Real HTTP listener on an ephemeral port standing in for the portal.
struct FakePortal {
    base_url: String,
    received: Arc<Mutex<Vec<Received>>>,
}

impl FakePortal {
    fn start<F>(reply: F) -> Self
    where
        F: Fn(&Received) -> Reply + Send + 'static,
    {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&received);
        thread::spawn(move || {
            for mut request in server.incoming_requests() {
                let mut body = String::new();
                request.as_reader().read_to_string(&mut body).unwrap();
                let seen = Received {
                    method: request.method().to_string(),
                    path: request.url().to_string(),
                    headers: request
                        .headers()
                        .iter()
                        .map(|h| (h.field.to_string().to_ascii_lowercase(), h.value.to_string()))
                        .collect(),
                    body,
                };
                let response = reply(&seen);
                log.lock().unwrap().push(seen);
                let _ = request.respond(response);
            }
        });
        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            received,
        }
    }

    fn transport(&self) -> HttpPortalTransport {
        HttpPortalTransport::new(&PortalSettings {
            base_url: self.base_url.clone(),
            timeout_secs: 5,
            ..PortalSettings::default()
        })
        .unwrap()
    }

    fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    fn find(&self, path: &str) -> Received {
        self.received()
            .into_iter()
            .find(|req| req.path == path)
            .unwrap_or_else(|| panic!("no request for {path}"))
    }
}

fn header(field: &str, value: &str) -> Header {
    Header::from_bytes(field.as_bytes(), value.as_bytes()).unwrap()
}

fn page(status: u16, body: Vec<u8>) -> Reply {
    Response::from_data(body)
        .with_status_code(status)
        .with_header(header("Content-Type", "text/html; charset=UTF-8"))
}

fn gzip(data: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

fn brotli(data: &str) -> Vec<u8> {
    let mut writer = brotli::CompressorWriter::new(Vec::new(), 4096, 5, 22);
    writer.write_all(data.as_bytes()).unwrap();
    writer.into_inner()
}

fn portal_pages(request: &Received) -> Reply {
    match request.path.as_str() {
        LANDING_PATH => {
            page(200, gzip(&landing_page())).with_header(header("Content-Encoding", "gzip"))
        }
        SUMMARY_PATH => page(200, brotli(&summary_page(&[("PK", "7")])))
            .with_header(header("Content-Encoding", "br")),
        NUMBERS_PATH => Response::from_data(Vec::new())
            .with_status_code(302)
            .with_header(header("Location", "/login")),
        "/login" => page(200, b"<form action=\"/login\"></form>".to_vec()),
        _ => page(404, b"not found".to_vec()),
    }
}

#[test]
fn session_sends_cookies_headers_and_form_over_http() {
    let portal = FakePortal::start(portal_pages);
    let mut session = PortalSession::new(portal.transport(), cookies());

    assert!(session.login());
    assert_eq!(session.token(), Some(TOKEN));

    let rows = FetchPipeline::default()
        .summary(&mut session, &DateRange::starting("01/01/2025"))
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].range_key, "PK");
    assert_eq!(rows[0].count, "7");

    let landing = portal.find(LANDING_PATH);
    assert_eq!(landing.method, "GET");
    assert_eq!(landing.header("cookie"), Some("laravel_session=abc"));
    assert_eq!(landing.header("accept-encoding"), Some("gzip, br"));
    assert_eq!(landing.header("x-requested-with"), None);
    assert!(landing.header("user-agent").unwrap().starts_with("Mozilla/5.0"));

    let summary = portal.find(SUMMARY_PATH);
    assert_eq!(summary.method, "POST");
    assert_eq!(summary.header("cookie"), Some("laravel_session=abc"));
    assert_eq!(summary.header("x-requested-with"), Some("XMLHttpRequest"));
    let referer = format!("{}{LANDING_PATH}", portal.base_url);
    assert_eq!(summary.header("referer"), Some(referer.as_str()));
    assert_eq!(
        summary.header("content-type"),
        Some("application/x-www-form-urlencoded")
    );
    assert_eq!(summary.body, "_token=tok-123&from=01%2F01%2F2025&to=");
}

#[test]
fn encoded_bodies_reach_the_decoder_untouched() {
    let portal = FakePortal::start(portal_pages);
    let transport = portal.transport();

    let response = transport.send(&PortalRequest::get(LANDING_PATH)).unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.content_encoding.as_deref(), Some("gzip"));
    assert_eq!(response.body, gzip(&landing_page()));

    let response = transport.send(&PortalRequest::post(SUMMARY_PATH)).unwrap();
    assert_eq!(response.content_encoding.as_deref(), Some("br"));
    assert_eq!(response.body, brotli(&summary_page(&[("PK", "7")])));
}

#[test]
fn redirect_to_login_is_followed_and_expires_session() {
    let portal = FakePortal::start(portal_pages);
    let mut session = PortalSession::new(portal.transport(), cookies());
    assert!(session.login());

    let response = portal
        .transport()
        .send(&PortalRequest::post(NUMBERS_PATH))
        .unwrap();
    assert!(response.final_url.ends_with("/login"));
    assert!(response.is_login_redirect());

    let err = FetchPipeline::default()
        .numbers(&mut session, &DateRange::starting("01/01/2025"), "PK")
        .unwrap_err();
    assert_matches!(err, RelayError::SessionExpired);
    assert!(!session.is_authenticated());
}

#[test]
fn installing_cookies_replaces_the_jar() {
    let portal = FakePortal::start(|_| page(200, b"ok".to_vec()));
    let mut transport = portal.transport();

    let first: CookieSet = [("first".to_string(), "1".to_string())].into_iter().collect();
    transport.install_cookies(&first).unwrap();
    transport.send(&PortalRequest::get("/one")).unwrap();

    let second: CookieSet = [("second".to_string(), "2".to_string())].into_iter().collect();
    transport.install_cookies(&second).unwrap();
    transport.send(&PortalRequest::get("/two")).unwrap();

    assert_eq!(portal.find("/one").header("cookie"), Some("first=1"));
    assert_eq!(portal.find("/two").header("cookie"), Some("second=2"));
}

#[test]
fn error_status_is_passed_through() {
    let portal = FakePortal::start(portal_pages);
    let response = portal
        .transport()
        .send(&PortalRequest::get("/missing"))
        .unwrap();
    assert_eq!(response.status, 404);
    assert!(!response.is_success());
    assert_eq!(response.body, b"not found");
}

#[test]
fn unreachable_portal_is_a_transport_error() {
    let transport = HttpPortalTransport::new(&PortalSettings {
        base_url: "http://127.0.0.1:1".to_string(),
        timeout_secs: 2,
        ..PortalSettings::default()
    })
    .unwrap();
    let err = transport.send(&PortalRequest::get(LANDING_PATH)).unwrap_err();
    assert_matches!(err, RelayError::PortalHttp(_));
}

#[test]
fn relay_server_answers_json_and_rejects_other_methods() {
    let relay = OtpRelay::new(
        PortalSession::new(ScriptedTransport::portal(), cookies()),
        FetchPipeline::default(),
    );
    let server = RelayServer::bind("127.0.0.1:0", relay).unwrap();
    let addr = server.local_addr().unwrap();
    thread::spawn(move || server.serve(1));

    let client = reqwest::blocking::Client::new();
    let base = format!("http://{addr}");

    let response = client.post(format!("{base}/sms")).send().unwrap();
    assert_eq!(response.status().as_u16(), 405);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );
    let body: serde_json::Value = serde_json::from_str(&response.text().unwrap()).unwrap();
    assert_eq!(body, serde_json::json!({ "error": "Method not allowed" }));

    let response = client.get(format!("{base}/")).send().unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );
    let body: serde_json::Value = serde_json::from_str(&response.text().unwrap()).unwrap();
    assert_eq!(body["status"], "online");

    let response = client.get(format!("{base}/sms")).send().unwrap();
    assert_eq!(response.status().as_u16(), 400);
}
