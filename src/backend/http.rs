use crate::backend::{Backend, BackendError};
use crate::model::{ErrorBody, ServerConfig, TranslateRequest, TranslateResponse};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{StatusCode, Url};

const CONFIG_PATH: &str = "api/v1/config";
const TRANSLATE_PATH: &str = "api/v1/sql-to-logsql";

#[derive(Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("invalid server URL {base_url:?}"))?;
        // Url::join drops the last path segment unless it ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::Transport(e.to_string()))
    }
}

/// Turn a non-success response into `BackendError::Status`, preferring the
/// server's `{error}` text.
async fn status_error(resp: reqwest::Response) -> BackendError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    BackendError::Status {
        status: status.as_u16(),
        message: error_message(status, &body),
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return parsed.error;
    }
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {}", status.as_u16(), body)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn fetch_config(&self) -> Result<ServerConfig, BackendError> {
        let resp = self.http.get(self.url(CONFIG_PATH)?).send().await?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        Ok(resp.json::<ServerConfig>().await?)
    }

    async fn sql_to_logsql(
        &self,
        request: &TranslateRequest,
        bearer_token: &str,
    ) -> Result<TranslateResponse, BackendError> {
        let auth = HeaderValue::from_str(&format!("Bearer {bearer_token}"))
            .map_err(|e| BackendError::Transport(format!("invalid bearer token: {e}")))?;
        let resp = self
            .http
            .post(self.url(TRANSLATE_PATH)?)
            .header(AUTHORIZATION, auth)
            .json(request)
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(status_error(resp).await);
        }
        Ok(resp.json::<TranslateResponse>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExecMode;
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[test]
    fn error_message_prefers_server_text() {
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"error":"unknown table"}"#),
            "unknown table"
        );
    }

    #[test]
    fn error_message_falls_back_to_status() {
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, ""), "HTTP 502");
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, "oops\n"),
            "HTTP 500: oops"
        );
    }

    #[test]
    fn joins_api_paths_under_base_path() {
        let backend = HttpBackend::new("http://localhost:8080/proxy", "test").unwrap();
        assert_eq!(
            backend.url(CONFIG_PATH).unwrap().as_str(),
            "http://localhost:8080/proxy/api/v1/config"
        );
        let backend = HttpBackend::new("http://localhost:8080", "test").unwrap();
        assert_eq!(
            backend.url(TRANSLATE_PATH).unwrap().as_str(),
            "http://localhost:8080/api/v1/sql-to-logsql"
        );
    }

    #[test]
    fn rejects_bad_server_url() {
        assert!(HttpBackend::new("not a url", "test").is_err());
    }

    fn request(endpoint: Option<&str>, bearer_token: Option<&str>) -> TranslateRequest {
        TranslateRequest {
            sql: "select * from logs".into(),
            start: Some("1704067200000".into()),
            end: None,
            exec_mode: ExecMode::Query,
            endpoint: endpoint.map(String::from),
            bearer_token: bearer_token.map(String::from),
        }
    }

    #[tokio::test]
    async fn translate_sends_bearer_header_and_json_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/sql-to-logsql")
            .match_header("authorization", "Bearer secret")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({
                "sql": "select * from logs",
                "start": "1704067200000",
                "execMode": "query",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"logsql":"* | limit 10","data":[{"_msg":"hi"}]}"#)
            .create_async()
            .await;

        let backend = HttpBackend::new(&server.url(), "test").unwrap();
        let resp = backend
            .sql_to_logsql(&request(None, None), "secret")
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(resp.logsql, "* | limit 10");
        assert_eq!(resp.data, json!([{"_msg": "hi"}]));
    }

    #[tokio::test]
    async fn translate_forwards_endpoint_override() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/sql-to-logsql")
            .match_header("authorization", "Bearer tok")
            .match_body(Matcher::PartialJson(json!({
                "endpoint": "https://logs",
                "bearerToken": "tok",
            })))
            .with_status(200)
            .with_body(r#"{"logsql":"*"}"#)
            .create_async()
            .await;

        let backend = HttpBackend::new(&server.url(), "test").unwrap();
        let resp = backend
            .sql_to_logsql(&request(Some("https://logs"), Some("tok")), "tok")
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(resp.data, serde_json::Value::Null);
    }

    #[tokio::test]
    async fn translate_error_body_becomes_status_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/sql-to-logsql")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"unknown table"}"#)
            .create_async()
            .await;

        let backend = HttpBackend::new(&server.url(), "test").unwrap();
        let err = backend
            .sql_to_logsql(&request(None, None), "")
            .await
            .unwrap_err();
        match err {
            BackendError::Status { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "unknown table");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn translate_plain_text_failure_falls_back_to_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/sql-to-logsql")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let backend = HttpBackend::new(&server.url(), "test").unwrap();
        let err = backend
            .sql_to_logsql(&request(None, None), "")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "HTTP 502: bad gateway");
    }

    #[tokio::test]
    async fn fetch_config_decodes_optional_fields() {
        let mut server = Server::new_async().await;
        let empty = server
            .mock("GET", "/api/v1/config")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("{}")
            .create_async()
            .await;
        let backend = HttpBackend::new(&server.url(), "test").unwrap();
        assert_eq!(backend.fetch_config().await.unwrap(), ServerConfig::default());
        empty.assert_async().await;
        empty.remove_async().await;

        let _pinned = server
            .mock("GET", "/api/v1/config")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"endpoint":"https://x","limit":1000}"#)
            .create_async()
            .await;
        let cfg = backend.fetch_config().await.unwrap();
        assert_eq!(cfg.endpoint.as_deref(), Some("https://x"));
        assert_eq!(cfg.limit, Some(1000));
    }

    #[tokio::test]
    async fn fetch_config_failure_is_status_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/config")
            .with_status(503)
            .create_async()
            .await;
        let backend = HttpBackend::new(&server.url(), "test").unwrap();
        let err = backend.fetch_config().await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP 503");
    }
}
