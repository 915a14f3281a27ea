#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::anyhow;
use cez_pnd::diagnostics::RecordingDiagnostics;
use cez_pnd::{CezPnd, Credentials, HttpRequest, Transport};
use reqwest::{Method, Url};

pub const CAS_LOGIN: &str = "https://cas.cez.cz/cas/login";
pub const DASHBOARD: &str = "https://pnd.cezdistribuce.cz/cezpnd2/external/dashboard/view";
pub const DATA: &str = "https://pnd.cezdistribuce.cz/cezpnd2/external/data";

struct Route {
    method: Method,
    url: String,
    body: Vec<u8>,
    set_cookie: Option<(String, String)>,
}

#[derive(Default)]
struct Inner {
    routes: Vec<Route>,
    requests: RefCell<Vec<HttpRequest>>,
    // (host, name) -> value
    cookies: RefCell<HashMap<(String, String), String>>,
}

/// Scripted transport: answers requests by method and URL (query ignored),
/// refuses anything it does not know.
#[derive(Clone, Default)]
pub struct StubTransport {
    inner: Rc<RefCell<Inner>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, method: Method, url: &str, body: &str) -> Self {
        self.inner.borrow_mut().routes.push(Route {
            method,
            url: url.to_string(),
            body: body.as_bytes().to_vec(),
            set_cookie: None,
        });
        self
    }

    pub fn route_setting_cookie(
        self,
        method: Method,
        url: &str,
        body: &str,
        cookie: (&str, &str),
    ) -> Self {
        self.inner.borrow_mut().routes.push(Route {
            method,
            url: url.to_string(),
            body: body.as_bytes().to_vec(),
            set_cookie: Some((cookie.0.to_string(), cookie.1.to_string())),
        });
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.inner.borrow().requests.borrow().clone()
    }

    pub fn requests_to(&self, method: Method, url: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && without_query(&r.url) == url)
            .collect()
    }
}

fn without_query(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

impl Transport for StubTransport {
    fn send(&self, request: HttpRequest) -> Result<Vec<u8>, anyhow::Error> {
        let inner = self.inner.borrow();
        inner.requests.borrow_mut().push(request.clone());

        let target = without_query(&request.url);
        let route = inner
            .routes
            .iter()
            .find(|r| r.method == request.method && r.url == target)
            .ok_or_else(|| anyhow!("connection refused: {} {}", request.method, target))?;

        if let Some((name, value)) = &route.set_cookie {
            let host = request.url.host_str().unwrap_or_default().to_string();
            inner
                .cookies
                .borrow_mut()
                .insert((host, name.clone()), value.clone());
        }

        Ok(route.body.clone())
    }

    fn cookie(&self, url: &Url, name: &str) -> Option<String> {
        let host = url.host_str()?.to_string();
        self.inner
            .borrow()
            .cookies
            .borrow()
            .get(&(host, name.to_string()))
            .cloned()
    }
}

pub fn login_page(token: &str) -> String {
    format!(
        r#"<html><body><form id="fm1" method="post">
             <input id="username" name="username" type="text"/>
             <input type="hidden" name="execution" value="{}"/>
             <input type="hidden" name="_eventId" value="submit"/>
           </form></body></html>"#,
        token
    )
}

/// A portal that accepts any credentials and issues `JSESSIONID=xyz`.
pub fn working_portal(data_reply: &str) -> StubTransport {
    StubTransport::new()
        .route(Method::GET, CAS_LOGIN, &login_page("abc123"))
        .route(Method::POST, CAS_LOGIN, "<html>Redirecting</html>")
        .route_setting_cookie(Method::GET, DASHBOARD, "<html>Dashboard</html>", ("JSESSIONID", "xyz"))
        .route(Method::POST, DATA, data_reply)
}

pub fn client(transport: &StubTransport) -> (CezPnd, RecordingDiagnostics) {
    let diagnostics = RecordingDiagnostics::new();
    let client = CezPnd::with_transport(transport.clone()).with_diagnostics(diagnostics.clone());
    (client, diagnostics)
}

pub fn credentials() -> Credentials {
    Credentials::new("user@example.cz".to_string(), "s3cret&pass".to_string())
}

pub fn body_text(request: &HttpRequest) -> String {
    String::from_utf8(request.body.clone().unwrap_or_default()).unwrap()
}
