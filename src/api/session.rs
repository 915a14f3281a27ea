use std::fmt;

use chrono::{Local, NaiveDateTime};
use reqwest::Url;
use serde_json::Value;
use url::form_urlencoded;

use crate::api::data::DataFetcher;
use crate::{CezPnd, Credentials, HttpRequest};

const EXECUTION_FIELD: &str = "execution";
const SESSION_COOKIE: &str = "JSESSIONID";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// How far the SSO handshake got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    Unauthenticated,
    /// Login page fetched and `execution` token scraped
    TokenFetched,
    CredentialsSubmitted,
    /// Service URL visited, session cookie not yet checked
    Redirected,
    Authenticated,
}

impl fmt::Display for LoginStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            LoginStage::Unauthenticated => "unauthenticated",
            LoginStage::TokenFetched => "token fetched",
            LoginStage::CredentialsSubmitted => "credentials submitted",
            LoginStage::Redirected => "redirected",
            LoginStage::Authenticated => "authenticated",
        };
        write!(f, "{}", stage)
    }
}

#[derive(Debug)]
pub enum LoginError {
    /// The login page carried no `execution` hidden field
    TokenNotFound,
    /// A request could not be completed; `stage` is the last one reached
    Transport {
        stage: LoginStage,
        source: anyhow::Error,
    },
    /// Every request went through but no session cookie was issued.
    /// Wrong credentials end up here too.
    AuthenticationIncomplete,
}

impl LoginError {
    fn transport(stage: LoginStage, source: impl Into<anyhow::Error>) -> Self {
        LoginError::Transport {
            stage,
            source: source.into(),
        }
    }
}

impl fmt::Display for LoginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginError::TokenNotFound => write!(
                f,
                "'{}' token not found on the login page",
                EXECUTION_FIELD
            ),
            LoginError::Transport { stage, source } => {
                write!(f, "request failed at stage '{}': {:#}", stage, source)
            }
            LoginError::AuthenticationIncomplete => write!(
                f,
                "no {} cookie after the service redirect",
                SESSION_COOKIE
            ),
        }
    }
}

impl std::error::Error for LoginError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoginError::Transport { source, .. } => Some(&**source),
            _ => None,
        }
    }
}

/// An authenticated portal session.
///
/// Only a successful [`SessionManager::login`] hands one out, so holding a
/// `Session` means the transport's cookie store carries `JSESSIONID`.
#[derive(Debug)]
pub struct Session<'a> {
    client: &'a CezPnd,
    session_id: String,
}

impl<'a> Session<'a> {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Consumption data for the last two days, or `None` on any failure.
    pub fn fetch_data(&self) -> Option<Value> {
        self.fetch_data_at(Local::now().naive_local())
    }

    /// Same as [`Session::fetch_data`] with an explicit "now".
    pub fn fetch_data_at(&self, now: NaiveDateTime) -> Option<Value> {
        match DataFetcher::new(self).fetch_at(now) {
            Ok(payload) => Some(payload),
            Err(e) => {
                self.client
                    .diagnostics()
                    .error(&format!("Data download failed: {}", e));
                None
            }
        }
    }

    pub(crate) fn client(&self) -> &'a CezPnd {
        self.client
    }
}

/// Drives the CAS single-sign-on handshake.
pub struct SessionManager<'a> {
    client: &'a CezPnd,
}

impl<'a> SessionManager<'a> {
    pub fn new(client: &'a CezPnd) -> Self {
        Self { client }
    }

    pub fn login(&self, credentials: &Credentials) -> Result<Session<'a>, LoginError> {
        let mut stage = LoginStage::Unauthenticated;

        let service_url = Url::parse(&self.client.service_url())
            .map_err(|e| LoginError::transport(stage, e))?;
        // The credentials go to this same URL, CAS runs the redirects from there.
        let login_url = Url::parse_with_params(
            self.client.cas_url(),
            &[("service", service_url.as_str())],
        )
        .map_err(|e| LoginError::transport(stage, e))?;

        let page = self.send(HttpRequest::get(login_url.clone()), stage)?;
        let execution = self
            .client
            .field_extractor()
            .extract(&String::from_utf8_lossy(&page), EXECUTION_FIELD)
            .ok_or(LoginError::TokenNotFound)?;
        stage = self.advance(LoginStage::TokenFetched);

        let form = form_urlencoded::Serializer::new(String::new())
            .append_pair("username", credentials.username())
            .append_pair("password", credentials.password())
            .append_pair("execution", &execution)
            .append_pair("_eventId", "submit")
            .append_pair("geolocation", "")
            .finish();
        self.send(
            HttpRequest::post(login_url, FORM_CONTENT_TYPE, form.into_bytes()),
            stage,
        )?;
        stage = self.advance(LoginStage::CredentialsSubmitted);

        self.send(HttpRequest::get(service_url.clone()), stage)?;
        self.advance(LoginStage::Redirected);

        let session_id = self
            .client
            .transport()
            .cookie(&service_url, SESSION_COOKIE)
            .ok_or(LoginError::AuthenticationIncomplete)?;
        self.advance(LoginStage::Authenticated);

        Ok(Session {
            client: self.client,
            session_id,
        })
    }

    fn send(&self, request: HttpRequest, stage: LoginStage) -> Result<Vec<u8>, LoginError> {
        self.client
            .transport()
            .send(request)
            .map_err(|e| LoginError::transport(stage, e))
    }

    fn advance(&self, stage: LoginStage) -> LoginStage {
        self.client
            .diagnostics()
            .debug(&format!("login stage: {}", stage));
        stage
    }
}
