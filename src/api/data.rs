use std::fmt;

use chrono::NaiveDateTime;
use reqwest::header::{HeaderName, HeaderValue, REFERER};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::session::Session;
use super::{DateWindow, FormatToApiFmt};
use crate::{CezPnd, HttpRequest};

/// Measuring assembly the dashboard chart is built from.
pub const ASSEMBLY_ID: i64 = -1027;
/// Device set of the metered connection point.
pub const DEVICE_SET_ID: &str = "79005";

const CHART_FORMAT: &str = "chart";
const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

/// Body of `POST /data`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DataRequest {
    pub format: String,
    pub id_assembly: i64,
    pub id_device_set: String,
    pub interval_from: String,
    pub interval_to: String,
    pub compare_from: Option<String>,
    pub opm_id: Option<String>,
    pub electrometer_id: Option<String>,
}

impl DataRequest {
    pub fn chart(window: &DateWindow) -> Self {
        DataRequest {
            format: CHART_FORMAT.to_string(),
            id_assembly: ASSEMBLY_ID,
            id_device_set: DEVICE_SET_ID.to_string(),
            interval_from: window.from.to_api_format(),
            interval_to: window.to.to_api_format(),
            compare_from: None,
            opm_id: None,
            electrometer_id: None,
        }
    }
}

#[derive(Debug)]
pub enum FetchError {
    Transport(anyhow::Error),
    /// The portal answered with something that is not JSON, typically the
    /// login page when the session has expired
    PayloadParse(serde_json::Error),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Transport(e) => write!(f, "request failed: {:#}", e),
            FetchError::PayloadParse(e) => write!(f, "response is not valid JSON: {}", e),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Transport(e) => Some(&**e),
            FetchError::PayloadParse(e) => Some(e),
        }
    }
}

/// Issues the chart data request on behalf of a [`Session`].
pub struct DataFetcher<'a> {
    client: &'a CezPnd,
}

impl<'a> DataFetcher<'a> {
    pub fn new(session: &Session<'a>) -> Self {
        Self {
            client: session.client(),
        }
    }

    pub fn fetch_at(&self, now: NaiveDateTime) -> Result<Value, FetchError> {
        let window = DateWindow::ending_at(now);
        let descriptor = DataRequest::chart(&window);

        self.client.diagnostics().info(&format!(
            "Downloading data from {} to {}",
            descriptor.interval_from, descriptor.interval_to
        ));

        let request = self.build_request(&descriptor).map_err(FetchError::Transport)?;
        let reply = self
            .client
            .transport()
            .send(request)
            .map_err(FetchError::Transport)?;

        serde_json::from_slice(&reply).map_err(FetchError::PayloadParse)
    }

    fn build_request(&self, descriptor: &DataRequest) -> anyhow::Result<HttpRequest> {
        let url = Url::parse(&self.client.data_url())?;
        let referer = HeaderValue::from_str(&self.client.service_url())?;
        let body = serde_json::to_vec(descriptor)?;

        Ok(HttpRequest::post(url, JSON_CONTENT_TYPE, body)
            .header(
                HeaderName::from_static("x-requested-with"),
                HeaderValue::from_static("XMLHttpRequest"),
            )
            .header(REFERER, referer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn window() -> DateWindow {
        let now = NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap();
        DateWindow::ending_at(now)
    }

    #[test]
    fn chart_request_matches_wire_format() {
        let wire = serde_json::to_value(DataRequest::chart(&window())).unwrap();
        assert_eq!(
            wire,
            json!({
                "format": "chart",
                "idAssembly": -1027,
                "idDeviceSet": "79005",
                "intervalFrom": "08.03.2024 00:00",
                "intervalTo": "10.03.2024 00:00",
                "compareFrom": null,
                "opmId": null,
                "electrometerId": null
            })
        );
    }

    #[test]
    fn serialized_request_parses_back_unchanged() {
        let request = DataRequest::chart(&window());
        let text = serde_json::to_string(&request).unwrap();
        let parsed: DataRequest = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, request);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), text);
    }

    #[test]
    fn null_fields_are_written_out() {
        let text = serde_json::to_string(&DataRequest::chart(&window())).unwrap();
        assert!(text.contains(r#""compareFrom":null"#));
        assert!(text.contains(r#""opmId":null"#));
        assert!(text.contains(r#""electrometerId":null"#));
    }

    #[test]
    fn parse_error_is_reported_as_such() {
        let err = serde_json::from_slice::<Value>(b"<html>").unwrap_err();
        let message = FetchError::PayloadParse(err).to_string();
        assert!(message.starts_with("response is not valid JSON"));
    }
}
