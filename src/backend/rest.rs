use crate::api::{
    client::{Request, Transport},
    error::{Error as ApiError, RestError, StatusReason},
};
use anyhow::{Context, Error};
use serde::Deserialize;
use serde_json::Value;
use std::{convert::TryInto, sync::Arc, time::Duration};

/// The `Status` object the API server answers failed requests with.
#[derive(Deserialize)]
struct StatusResponse {
    #[serde(default)]
    message: String,
    #[serde(default)]
    reason: Option<StatusReason>,
}

fn parse_error(response: ureq::Response) -> RestError {
    let status = response.status();
    let body = response
        .into_string()
        .unwrap_or_else(|_| "Could not turn error body into String.".to_string());

    match serde_json::from_str::<StatusResponse>(&body) {
        Ok(response) => RestError::Status {
            status,
            reason: response.reason.unwrap_or_else(|| StatusReason::Unknown(String::new())),
            message: response.message,
        },
        Err(_) => RestError::Unknown { status, body },
    }
}

/// Failures to reach the server are worth another attempt. A malformed URL,
/// unknown scheme or broken proxy setting will fail the same way every time.
fn classify(error: &ureq::Error) -> RestError {
    match error {
        ureq::Error::DnsFailed(_)
        | ureq::Error::ConnectionFailed(_)
        | ureq::Error::BadStatusRead
        | ureq::Error::Io(_) => RestError::Transport(error.to_string()),
        _ => RestError::Request(error.to_string()),
    }
}

fn read_body(response: ureq::Response) -> Result<Value, Error> {
    let response_string = response
        .into_string()
        .context("failed to turn response into string")?;
    if response_string.trim().is_empty() {
        return Ok(Value::Null);
    }
    let value = serde_json::from_str(&response_string)
        .with_context(|| format!("deserializing response failed:\n{}", &response_string))?;
    Ok(value)
}

/// Blocking HTTP transport to a Kubernetes API server.
pub struct Server {
    api_url: String,
    token: Option<String>,
    timeout: Duration,
    tls: Option<Arc<rustls::ClientConfig>>,
}

impl Server {
    /// The `api_url` should be something like `http://127.0.0.1:8001`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Server {
            api_url: api_url.into().trim_end_matches('/').to_owned(),
            token: None,
            timeout: Duration::from_secs(30),
            tls: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Trust only the PEM encoded certificates in `pem`, such as the cluster
    /// CA mounted into every pod.
    pub fn with_ca_pem(mut self, pem: &[u8]) -> Result<Self, ApiError> {
        let mut tls = rustls::ClientConfig::new();
        let mut reader = pem;
        match tls.root_store.add_pem_file(&mut reader) {
            Ok((valid, _)) if valid > 0 => {
                self.tls = Some(Arc::new(tls));
                Ok(self)
            }
            _ => Err(ApiError::Configuration("no usable CA certificate found".into())),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

impl Transport for Server {
    fn send(&mut self, request: &Request) -> Result<Value, RestError> {
        let url = format!("{}/{}", self.api_url, request.path);
        let millis: u64 = self.timeout.as_millis().try_into().unwrap_or(u64::MAX);

        let mut http_request = ureq::request(request.method.as_str(), &url);
        http_request
            .set("Accept", "application/json")
            .timeout_connect(millis)
            .timeout_read(millis);
        if let Some(token) = &self.token {
            http_request.set("Authorization", &format!("Bearer {}", token));
        }
        if let Some(tls) = &self.tls {
            http_request.set_tls_config(Arc::clone(tls));
        }
        let http_response = match &request.body {
            Some(body) => http_request
                .set("Content-Type", "application/json")
                .send_string(&body.to_string()),
            None => http_request.call(),
        };

        if let Some(error) = http_response.synthetic_error() {
            return Err(classify(error));
        }
        if http_response.error() {
            return Err(parse_error(http_response));
        }
        read_body(http_response).map_err(|err| RestError::Decode(format!("{:#}", err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_status_response() {
        let response = r#"
        {
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": "experiments.ml.intel.com \"mnist\" not found",
            "reason": "NotFound",
            "details": {"name": "mnist", "group": "ml.intel.com", "kind": "experiments"},
            "code": 404
        }
        "#;
        let parsed = serde_json::from_str::<StatusResponse>(response).unwrap();
        assert_eq!(parsed.reason, Some(StatusReason::NotFound));
        assert!(parsed.message.contains("not found"));
    }

    #[test]
    fn parse_status_without_reason() {
        let parsed = serde_json::from_str::<StatusResponse>(r#"{"code": 500}"#).unwrap();
        assert_eq!(parsed.reason, None);
        assert!(parsed.message.is_empty());
    }

    fn get(path: &str) -> Request {
        Request {
            method: crate::api::client::Method::Get,
            path: path.into(),
            body: None,
        }
    }

    #[test]
    fn malformed_url_is_not_transient() {
        let mut server = Server::new("localhost:8001");
        let error = server
            .send(&get("apis/ml.intel.com/v1/namespaces/default/experiments"))
            .unwrap_err();
        assert!(matches!(error, RestError::Request(_)), "{:?}", error);
        assert!(!error.is_transient());
    }

    #[test]
    fn unknown_scheme_is_not_transient() {
        let mut server = Server::new("ftp://127.0.0.1:8001");
        let error = server.send(&get("api")).unwrap_err();
        assert!(!error.is_transient(), "{:?}", error);
    }

    #[test]
    fn rejects_ca_without_certificates() {
        let error = Server::new("https://10.0.0.1:443")
            .with_ca_pem(b"not a certificate")
            .err()
            .unwrap();
        assert!(matches!(error, ApiError::Configuration(_)));
    }

    #[test]
    fn trims_trailing_slash() {
        let server = Server::new("http://127.0.0.1:8001/");
        assert_eq!(server.api_url(), "http://127.0.0.1:8001");
    }
}
