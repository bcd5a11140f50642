use snafu::ResultExt;

use super::error::{MalformedPayloadSnafu, SourceError, SourceResult, TransportSnafu};
use super::source::{Batch, BatchRequest, BoxFuture, MessageSource};

/// Connection settings for the hosted retrieval endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSourceConfig {
    pub base_url: String,
    pub bearer_token: Option<String>,
}

impl HttpSourceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token: None,
        }
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

/// Retrieval endpoint adapter over HTTP.
///
/// The response body is handed to the caller exactly as decoded; ordering and
/// deduplication guarantees stay with the cache.
pub struct HttpMessageSource {
    config: HttpSourceConfig,
    client: reqwest::Client,
}

impl HttpMessageSource {
    pub fn new(config: HttpSourceConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn execute(&self, request: &BatchRequest) -> SourceResult<Batch> {
        let url = batch_url(&self.config.base_url, request);
        let mut http_request = self.client.get(&url);
        if let Some(token) = &self.config.bearer_token {
            http_request = http_request.bearer_auth(token);
        }

        let response = http_request.send().await.context(TransportSnafu {
            stage: "send-batch-request",
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.context(TransportSnafu {
            stage: "read-batch-response",
        })?;

        if let Some(error) = classify_status(status, &body) {
            tracing::warn!(
                url = %url,
                status,
                retryable = error.is_retryable(),
                "batch retrieval returned a non-success status"
            );
            return Err(error);
        }

        serde_json::from_str(&body).context(MalformedPayloadSnafu {
            stage: "decode-batch-payload",
        })
    }
}

impl MessageSource for HttpMessageSource {
    fn fetch_batch<'a>(&'a self, request: &'a BatchRequest) -> BoxFuture<'a, SourceResult<Batch>> {
        Box::pin(self.execute(request))
    }
}

/// Builds the batch endpoint URL for one request.
fn batch_url(base_url: &str, request: &BatchRequest) -> String {
    let mut url = format!(
        "{base_url}/conversations/{conversation_id}/messages?direction={direction}&limit={limit}",
        conversation_id = request.conversation_id,
        direction = request.direction.as_str(),
        limit = request.limit,
    );

    if let Some(cursor) = &request.cursor {
        url.push_str("&cursor=");
        url.push_str(cursor.as_str());
    }

    url
}

/// Maps a non-success HTTP status onto the retrieval error taxonomy.
fn classify_status(status: u16, body: &str) -> Option<SourceError> {
    match status {
        200..=299 => None,
        500..=599 => Some(SourceError::ServerFault {
            stage: "classify-batch-status",
            status,
            body: body.to_string(),
        }),
        _ => Some(SourceError::ClientRequest {
            stage: "classify-batch-status",
            status,
            body: body.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ConversationId;
    use crate::source::BatchDirection;
    use crate::types::{Cursor, OrderingKey};

    fn request_fixture() -> BatchRequest {
        BatchRequest::new(ConversationId::generate(), BatchDirection::Before, 30)
    }

    #[test]
    fn batch_url_without_cursor_omits_the_parameter() {
        let request = request_fixture();
        let url = batch_url("https://chat.example.com/api", &request);

        assert!(url.starts_with("https://chat.example.com/api/conversations/"));
        assert!(url.ends_with("/messages?direction=before&limit=30"));
        assert!(!url.contains("cursor="));
    }

    #[test]
    fn batch_url_appends_the_cursor() {
        let request = request_fixture().with_cursor(Cursor::from_key(OrderingKey::new(1_700)));
        let url = batch_url("https://chat.example.com/api", &request);

        assert!(url.ends_with("&cursor=1700"));
    }

    #[test]
    fn trailing_base_url_slash_is_normalized() {
        let config = HttpSourceConfig::new("https://chat.example.com/api/");
        assert_eq!(config.base_url, "https://chat.example.com/api");
    }

    #[test]
    fn success_statuses_are_not_errors() {
        assert!(classify_status(200, "").is_none());
        assert!(classify_status(204, "").is_none());
    }

    #[test]
    fn server_faults_are_retryable() {
        let error = classify_status(503, "unavailable").expect("5xx must map to an error");
        assert!(matches!(error, SourceError::ServerFault { status: 503, .. }));
        assert!(error.is_retryable());
    }

    #[test]
    fn client_rejections_are_not_retryable() {
        let error = classify_status(404, "unknown cursor").expect("4xx must map to an error");
        assert!(matches!(error, SourceError::ClientRequest { status: 404, .. }));
        assert!(!error.is_retryable());
    }
}
