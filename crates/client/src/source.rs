use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use super::error::SourceResult;
use super::ids::ConversationId;
use super::types::{Cursor, MessageRecord};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Paging direction relative to the cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchDirection {
    Before,
    After,
}

impl BatchDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
        }
    }
}

/// One retrieval request against a conversation's history.
///
/// The limit is chosen by the caller; sources transmit it unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub conversation_id: ConversationId,
    pub direction: BatchDirection,
    pub cursor: Option<Cursor>,
    pub limit: u32,
}

impl BatchRequest {
    pub fn new(conversation_id: ConversationId, direction: BatchDirection, limit: u32) -> Self {
        Self {
            conversation_id,
            direction,
            cursor: None,
            limit,
        }
    }

    pub fn with_cursor(mut self, cursor: Cursor) -> Self {
        self.cursor = Some(cursor);
        self
    }
}

/// One page of history returned by a single retrieval request.
///
/// Messages are ordered oldest to newest. `has_more` reports whether the
/// requested direction has further history beyond this page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub messages: Vec<MessageRecord>,
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<Cursor>,
    #[serde(default)]
    pub total_estimate: Option<u64>,
}

/// Retrieval capability over a conversation's paginated history.
///
/// Implementations must preserve response message ordering exactly as
/// received and never deduplicate; both are the cache's job.
pub trait MessageSource: Send + Sync {
    fn fetch_batch<'a>(&'a self, request: &'a BatchRequest) -> BoxFuture<'a, SourceResult<Batch>>;
}
