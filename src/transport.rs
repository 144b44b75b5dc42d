use std::sync::Arc;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::cookie::Jar;
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CONTENT_ENCODING, HeaderMap, HeaderValue, REFERER,
    UPGRADE_INSECURE_REQUESTS, USER_AGENT,
};

use crate::config::PortalSettings;
use crate::cookies::CookieSet;
use crate::error::RelayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A request against a portal path, independent of the HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalRequest {
    pub method: Method,
    pub path: String,
    pub form: Vec<(String, String)>,
    /// Sends `X-Requested-With: XMLHttpRequest`.
    pub ajax: bool,
    /// Portal path sent as an absolute `Referer`.
    pub referer: Option<String>,
}

impl PortalRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            form: Vec::new(),
            ajax: false,
            referer: None,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(path)
        }
    }

    pub fn field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.form.push((name.to_string(), value.into()));
        self
    }

    pub fn ajax_from(mut self, referer: impl Into<String>) -> Self {
        self.ajax = true;
        self.referer = Some(referer.into());
        self
    }

    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalResponse {
    pub status: u16,
    /// URL after redirects were followed.
    pub final_url: String,
    pub content_encoding: Option<String>,
    pub body: Vec<u8>,
}

impl PortalResponse {
    /// The portal answers every page and fragment with 200; anything else,
    /// including other 2xx codes, carries no usable markup.
    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    /// The portal answers an expired session by redirecting to its login form.
    pub fn is_login_redirect(&self) -> bool {
        let path = Url::parse(&self.final_url)
            .map(|url| url.path().to_string())
            .unwrap_or_else(|_| self.final_url.clone());
        path.to_ascii_lowercase().contains("login")
    }
}

pub trait PortalTransport: Send {
    /// Replaces the cookie jar with exactly `cookies`.
    fn install_cookies(&mut self, cookies: &CookieSet) -> Result<(), RelayError>;

    fn send(&self, request: &PortalRequest) -> Result<PortalResponse, RelayError>;
}

pub struct HttpPortalTransport {
    base_url: Url,
    settings: PortalSettings,
    client: Client,
}

impl HttpPortalTransport {
    pub fn new(settings: &PortalSettings) -> Result<Self, RelayError> {
        let base_url = Url::parse(&settings.base_url)
            .map_err(|err| RelayError::PortalHttp(format!("invalid base url: {err}")))?;
        let client = build_client(settings, Arc::new(Jar::default()))?;
        Ok(Self {
            base_url,
            settings: settings.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> Result<Url, RelayError> {
        self.base_url
            .join(path)
            .map_err(|err| RelayError::PortalHttp(format!("invalid portal path {path}: {err}")))
    }
}

impl PortalTransport for HttpPortalTransport {
    fn install_cookies(&mut self, cookies: &CookieSet) -> Result<(), RelayError> {
        let jar = Jar::default();
        for (name, value) in cookies.iter() {
            // Host-only cookies: sent back to the portal host and nowhere else.
            jar.add_cookie_str(&format!("{name}={value}; Path=/"), &self.base_url);
        }
        self.client = build_client(&self.settings, Arc::new(jar))?;
        Ok(())
    }

    fn send(&self, request: &PortalRequest) -> Result<PortalResponse, RelayError> {
        let url = self.url(&request.path)?;
        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url).form(&request.form),
        };
        if request.ajax {
            builder = builder.header("X-Requested-With", "XMLHttpRequest");
        }
        if let Some(referer) = &request.referer {
            builder = builder.header(REFERER, self.url(referer)?.as_str());
        }

        let response = builder
            .send()
            .map_err(|err| RelayError::PortalHttp(err.to_string()))?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_encoding = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .map_err(|err| RelayError::PortalHttp(err.to_string()))?
            .to_vec();

        Ok(PortalResponse {
            status,
            final_url,
            content_encoding,
            body,
        })
    }
}

fn build_client(settings: &PortalSettings, jar: Arc<Jar>) -> Result<Client, RelayError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&settings.user_agent)
            .map_err(|err| RelayError::PortalHttp(format!("invalid user agent: {err}")))?,
    );
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, br"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

    Client::builder()
        .default_headers(headers)
        .cookie_provider(jar)
        .timeout(settings.timeout())
        .build()
        .map_err(|err| RelayError::PortalHttp(err.to_string()))
}
