use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SourceError {
    #[snafu(display("retrieval transport failed on `{stage}`: {source}"))]
    Transport {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("retrieval endpoint faulted with status {status}: {body}"))]
    ServerFault {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("retrieval request was rejected with status {status}: {body}"))]
    ClientRequest {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to decode retrieval payload on `{stage}`: {source}"))]
    MalformedPayload {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("retrieval network failure on `{stage}`: {details}"))]
    Network {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("id '{raw}' is invalid for {id_type}"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
        source: uuid::Error,
    },
}

impl SourceError {
    /// Returns true when a later attempt can plausibly succeed.
    ///
    /// Transport losses and 5xx-class faults are transient; 4xx rejections
    /// and undecodable payloads are not and must surface immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::ServerFault { .. } | Self::Network { .. }
        )
    }
}

pub type SourceResult<T> = Result<T, SourceError>;
