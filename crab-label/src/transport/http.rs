//! HTTP request/poll transport
//!
//! Every call is a POST with a form-urlencoded content type whose body is the
//! raw JSON string; the agent answers with an [`AgentReply`].

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument, warn};

use crate::batch::EncodedPayload;
use crate::config::{AgentConfig, STATUS_TIMEOUT_HINT_SECS};
use crate::error::{LabelError, LabelResult, TransportError, TransportResult};
use crate::poller::StatusChecker;
use crate::protocol::{AgentReply, MsrRequest, StatusCheck};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// HTTP client for the local print agent
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: AgentConfig,
}

impl HttpTransport {
    pub fn new(config: &AgentConfig) -> LabelResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LabelError::InvalidConfig(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    async fn post(&self, url: &str, body: String) -> TransportResult<AgentReply> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "Agent request failed");
                TransportError::Connection(e.to_string())
            })?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                warn!(url = %url, "Agent has no such printer");
                return Err(TransportError::PrinterNotFound(url.to_string()));
            }
            status => {
                warn!(url = %url, status = %status, "Agent returned unexpected status");
                return Err(TransportError::Connection(format!("HTTP {status}")));
            }
        }

        let text = response.text().await?;
        debug!(url = %url, body = %text, "Agent reply");
        AgentReply::parse(&text)
    }

    /// `POST {server}{printer}` with the encoded label
    #[instrument(skip(self, payload), fields(request_id = payload.request_id()))]
    pub async fn send_print(
        &self,
        printer: &str,
        payload: &EncodedPayload,
    ) -> TransportResult<AgentReply> {
        let url = self.config.endpoint_url(printer, "");
        self.post(&url, payload.as_str().to_string()).await
    }

    /// `POST {server}{printer}/requestMSRData`
    #[instrument(skip(self))]
    pub async fn request_msr(&self, printer: &str, timeout_secs: u64) -> TransportResult<AgentReply> {
        let url = self.config.endpoint_url(printer, "/requestMSRData");
        let body = serde_json::to_string(&MsrRequest {
            timeout: timeout_secs,
        })
        .map_err(|e| TransportError::Parse(e.to_string()))?;
        self.post(&url, body).await
    }
}

#[async_trait]
impl StatusChecker for HttpTransport {
    /// `POST {server}{printer}/checkStatus`
    async fn check_status(
        &self,
        printer: &str,
        request_id: u64,
        response_id: &str,
    ) -> TransportResult<AgentReply> {
        let url = self.config.endpoint_url(printer, "/checkStatus");
        let body = serde_json::to_string(&StatusCheck {
            request_id,
            response_id,
            timeout: STATUS_TIMEOUT_HINT_SECS,
        })
        .map_err(|e| TransportError::Parse(e.to_string()))?;
        self.post(&url, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandAccumulator;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn transport(server: &MockServer) -> HttpTransport {
        let config = AgentConfig::new(format!("{}/WebPrintSDK/", server.uri())).unwrap();
        HttpTransport::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_send_print_posts_form_body() {
        let server = MockServer::start().await;
        let mut acc = CommandAccumulator::new();
        acc.print_buffer();
        let payload = acc.finish(5).unwrap();

        Mock::given(method("POST"))
            .and(path("/WebPrintSDK/Printer1"))
            .and(header("content-type", FORM_CONTENT_TYPE))
            .and(body_string(payload.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"Result":"ready","RequestID":5,"ResponseID":"r1"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let reply = transport(&server)
            .await
            .send_print("Printer1", &payload)
            .await
            .unwrap();
        assert_eq!(reply.result, "ready");
        assert_eq!(reply.response_id(), "r1");
    }

    #[tokio::test]
    async fn test_not_found_maps_to_printer_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = transport(&server)
            .await
            .check_status("Nope", 1, "r1")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::PrinterNotFound(_)));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_connection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = transport(&server)
            .await
            .request_msr("Printer1", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)));
    }

    #[tokio::test]
    async fn test_status_check_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/WebPrintSDK/Printer1/checkStatus"))
            .and(body_string(r#"{"RequestID":3,"ResponseID":"r9","Timeout":30}"#))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"Result":"success","RequestID":3,"ResponseID":"r9"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let reply = transport(&server)
            .await
            .check_status("Printer1", 3, "r9")
            .await
            .unwrap();
        assert_eq!(reply.result, "success");
    }

    #[tokio::test]
    async fn test_unreachable_agent() {
        let config = AgentConfig::new("http://127.0.0.1:1/WebPrintSDK/").unwrap();
        let err = HttpTransport::new(&config)
            .unwrap()
            .request_msr("Printer1", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)));
    }
}
