use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::Context;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, ORIGIN, USER_AGENT,
};
use reqwest::{Method, Url};
use tracing_subscriber::EnvFilter;

pub mod api;
pub mod diagnostics;
pub mod html;

use api::session::{Session, SessionManager};
use diagnostics::{Diagnostics, TracingDiagnostics};
use html::{HiddenFieldExtractor, RegexFieldExtractor};

const PRODUCTION_BASE_URL: &str = "https://pnd.cezdistribuce.cz/cezpnd2/external";
const PRODUCTION_CAS_URL: &str = "https://cas.cez.cz/cas/login";
const PORTAL_ORIGIN: &str = "https://pnd.cezdistribuce.cz";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/144.0.0.0 Safari/537.36";

/// Non-success statuses the portal is known to answer with.
///
/// The transport never fails on these, they are only reported.
#[derive(Debug, PartialEq, Eq)]
enum StatusClass {
    /// Session missing or expired
    Unauthorized,
    /// Logged in, but the account may not see the resource
    Forbidden,
    TooManyRequests,
    ServerError,
    Unexpected,
}

impl StatusClass {
    fn of(status: u16) -> Option<Self> {
        match status {
            200..=399 => None,
            401 => Some(StatusClass::Unauthorized),
            403 => Some(StatusClass::Forbidden),
            429 => Some(StatusClass::TooManyRequests),
            500..=599 => Some(StatusClass::ServerError),
            _ => Some(StatusClass::Unexpected),
        }
    }
}

/// A single request handed to a [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        HttpRequest {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn post(url: Url, content_type: &'static str, body: Vec<u8>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        HttpRequest {
            method: Method::POST,
            url,
            headers,
            body: Some(body),
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Request/response primitives shared by the login and data components.
///
/// Implementations own the cookie store: cookies set by a response must be
/// replayed on later requests to the matching domain and path.
pub trait Transport {
    /// Sends the request and returns the raw response body.
    ///
    /// Every HTTP status counts as a response. Only failures to obtain one
    /// (DNS, refused connection, broken stream...) are errors.
    fn send(&self, request: HttpRequest) -> Result<Vec<u8>, anyhow::Error>;

    /// Value of the cookie `name` the store would send to `url`.
    fn cookie(&self, url: &Url, name: &str) -> Option<String>;

    /// Routes the transport's own messages to the client's sink.
    fn attach_diagnostics(&mut self, _diagnostics: Rc<dyn Diagnostics>) {}
}

fn browser_headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    h.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    h.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("cs-CZ,cs;q=0.9"));
    h.insert(ORIGIN, HeaderValue::from_static(PORTAL_ORIGIN));
    h.insert(HeaderName::from_static("dnt"), HeaderValue::from_static("1"));
    h
}

/// Picks `name` out of a `Cookie` header value (`a=1; b=2`).
fn find_cookie(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Blocking reqwest transport posing as an ordinary browser.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    jar: Arc<Jar>,
    diagnostics: Rc<dyn Diagnostics>,
}

impl HttpTransport {
    pub fn new() -> anyhow::Result<Self> {
        let jar = Arc::new(Jar::default());
        let client = reqwest::blocking::Client::builder()
            .default_headers(browser_headers())
            .cookie_provider(Arc::clone(&jar))
            .build()
            .context("Failed to build the HTTP client")?;

        Ok(HttpTransport {
            client,
            jar,
            diagnostics: Rc::new(TracingDiagnostics),
        })
    }

    pub fn with_diagnostics(mut self, diagnostics: impl Diagnostics + 'static) -> Self {
        self.diagnostics = Rc::new(diagnostics);
        self
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport").finish_non_exhaustive()
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: HttpRequest) -> Result<Vec<u8>, anyhow::Error> {
        self.diagnostics
            .debug(&format!("{} {}", request.method, request.url));

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .with_context(|| format!("{} {} failed", request.method, request.url))?;

        let status_code = response.status();
        let body = response
            .bytes()
            .with_context(|| format!("Reading the response of {} failed", request.url))?;

        if let Some(class) = StatusClass::of(status_code.as_u16()) {
            self.diagnostics.warn(&format!(
                "HTTP {} ({:?}) from {} {}",
                status_code.as_str(),
                class,
                request.method,
                request.url
            ));
        }

        Ok(body.to_vec())
    }

    fn cookie(&self, url: &Url, name: &str) -> Option<String> {
        let header = self.jar.cookies(url)?;
        find_cookie(header.to_str().ok()?, name)
    }

    fn attach_diagnostics(&mut self, diagnostics: Rc<dyn Diagnostics>) {
        self.diagnostics = diagnostics;
    }
}

/// Portal account credentials. Never validated locally.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: String, password: String) -> Self {
        Credentials { username, password }
    }

    pub fn from_env_values() -> anyhow::Result<Self> {
        let username = std::env::var("PND_USERNAME").context("PND_USERNAME must be set")?;
        let password = std::env::var("PND_PASSWORD").context("PND_PASSWORD must be set")?;

        Ok(Credentials::new(username, password))
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Client for the ČEZ Distribuce PND portal.
///
/// Log in with [`CezPnd::login`], then fetch data through the returned
/// [`Session`].
pub struct CezPnd {
    transport: Box<dyn Transport>,
    extractor: Box<dyn HiddenFieldExtractor>,
    diagnostics: Rc<dyn Diagnostics>,
    cas_url: String,
    base_url: String,
}

impl CezPnd {
    pub fn new() -> anyhow::Result<Self> {
        Ok(CezPnd::with_transport(HttpTransport::new()?))
    }

    pub fn with_transport(transport: impl Transport + 'static) -> Self {
        CezPnd {
            transport: Box::new(transport),
            extractor: Box::new(RegexFieldExtractor),
            diagnostics: Rc::new(TracingDiagnostics),
            cas_url: PRODUCTION_CAS_URL.to_string(),
            base_url: PRODUCTION_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_cas_url(mut self, cas_url: String) -> Self {
        self.cas_url = cas_url;
        self
    }

    /// Sets the sink for the client and for its transport.
    pub fn with_diagnostics(mut self, diagnostics: impl Diagnostics + 'static) -> Self {
        let diagnostics: Rc<dyn Diagnostics> = Rc::new(diagnostics);
        self.transport.attach_diagnostics(Rc::clone(&diagnostics));
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_field_extractor(mut self, extractor: impl HiddenFieldExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    /// The dashboard URL the SSO server redirects back to.
    pub fn service_url(&self) -> String {
        format!("{}/dashboard/view", self.base_url)
    }

    pub fn data_url(&self) -> String {
        format!("{}/data", self.base_url)
    }

    pub fn cas_url(&self) -> &str {
        &self.cas_url
    }

    /// Runs the SSO handshake. `None` covers every failure, the reason is
    /// only reported to the diagnostic sink.
    pub fn login(&self, credentials: &Credentials) -> Option<Session<'_>> {
        match SessionManager::new(self).login(credentials) {
            Ok(session) => {
                self.diagnostics.info("Login successful.");
                Some(session)
            }
            Err(e) => {
                self.diagnostics.error(&format!("Login failed: {}", e));
                None
            }
        }
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub(crate) fn field_extractor(&self) -> &dyn HiddenFieldExtractor {
        self.extractor.as_ref()
    }

    pub(crate) fn diagnostics(&self) -> &dyn Diagnostics {
        &*self.diagnostics
    }
}

impl fmt::Debug for CezPnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CezPnd")
            .field("cas_url", &self.cas_url)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Installs a `tracing` subscriber filtered by `RUST_LOG` (default `info`).
pub fn init_log_env() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber may already be installed by the embedding program.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
