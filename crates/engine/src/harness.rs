//! Deterministic in-memory collaborators for unit tests and the QA runner.
//!
//! `FixtureSource` doubles as the reference [`MessageSource`] implementation:
//! it serves contiguous cursor pages over generated conversations and can
//! inject a planned failure sequence ahead of real pages.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use backscroll_client::{
    Batch, BatchDirection, BatchRequest, BoxFuture, ConversationId, Cursor, MessageId,
    MessageRecord, MessageSource, OrderingKey, SenderId, SourceError, SourceResult,
};

use crate::anchor::ViewportHandle;
use crate::dispatch::{HistoryRenderer, RenderMode};

/// Builds one synthetic message for a conversation at the given ordering key.
pub fn fixture_message(conversation_id: ConversationId, key: i64) -> MessageRecord {
    MessageRecord::new(
        MessageId::generate(),
        conversation_id,
        OrderingKey::new(key),
        SenderId::generate(),
        format!("message-{key}"),
    )
}

/// Failure the fixture source injects before serving real pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedFailure {
    Network,
    ServerFault(u16),
    ClientRequest(u16),
}

impl PlannedFailure {
    fn into_error(self) -> SourceError {
        match self {
            Self::Network => SourceError::Network {
                stage: "fixture-planned-failure",
                details: "connection reset".to_string(),
            },
            Self::ServerFault(status) => SourceError::ServerFault {
                stage: "fixture-planned-failure",
                status,
                body: "injected fault".to_string(),
            },
            Self::ClientRequest(status) => SourceError::ClientRequest {
                stage: "fixture-planned-failure",
                status,
                body: "injected rejection".to_string(),
            },
        }
    }
}

/// Fully scripted paginated backend over generated conversations.
pub struct FixtureSource {
    conversations: HashMap<ConversationId, Vec<MessageRecord>>,
    failures: Mutex<VecDeque<PlannedFailure>>,
    requests: Mutex<Vec<BatchRequest>>,
}

impl Default for FixtureSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureSource {
    pub fn new() -> Self {
        Self {
            conversations: HashMap::new(),
            failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Seeds one conversation of `count` messages with ordering keys
    /// `base_key, base_key + step, ..`.
    pub fn seed_conversation(&mut self, count: usize, base_key: i64, step: i64) -> ConversationId {
        let conversation_id = ConversationId::generate();
        let messages = (0..count)
            .map(|index| fixture_message(conversation_id, base_key + index as i64 * step))
            .collect();
        self.conversations.insert(conversation_id, messages);
        conversation_id
    }

    /// Convenience for the single-conversation case.
    pub fn seeded(count: usize, base_key: i64, step: i64) -> (Self, ConversationId) {
        let mut source = Self::new();
        let conversation_id = source.seed_conversation(count, base_key, step);
        (source, conversation_id)
    }

    pub fn messages(&self, conversation_id: ConversationId) -> Vec<MessageRecord> {
        self.conversations
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Queues failures served ahead of real pages, in order.
    pub fn plan_failures(&self, plan: impl IntoIterator<Item = PlannedFailure>) {
        let mut failures = self.failures.lock().expect("failure plan lock poisoned");
        failures.extend(plan);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("request log lock poisoned").len()
    }

    pub fn requests(&self) -> Vec<BatchRequest> {
        self.requests
            .lock()
            .expect("request log lock poisoned")
            .clone()
    }

    fn serve(&self, request: &BatchRequest) -> SourceResult<Batch> {
        if let Some(failure) = self
            .failures
            .lock()
            .expect("failure plan lock poisoned")
            .pop_front()
        {
            return Err(failure.into_error());
        }

        let Some(messages) = self.conversations.get(&request.conversation_id) else {
            return Err(SourceError::ClientRequest {
                stage: "fixture-serve",
                status: 404,
                body: format!("unknown conversation {}", request.conversation_id),
            });
        };

        let limit = request.limit as usize;
        let cursor_key = request.cursor.as_ref().and_then(Cursor::to_key);

        let batch = match request.direction {
            BatchDirection::Before => {
                let eligible: Vec<&MessageRecord> = messages
                    .iter()
                    .filter(|message| {
                        cursor_key.is_none_or(|key| message.ordering_key < key)
                    })
                    .collect();
                let start = eligible.len().saturating_sub(limit);
                let page: Vec<MessageRecord> =
                    eligible[start..].iter().map(|message| (*message).clone()).collect();

                Batch {
                    has_more: start > 0,
                    next_cursor: page.first().map(|message| Cursor::from_key(message.ordering_key)),
                    total_estimate: Some(messages.len() as u64),
                    messages: page,
                }
            }
            BatchDirection::After => {
                let eligible: Vec<&MessageRecord> = messages
                    .iter()
                    .filter(|message| {
                        cursor_key.is_none_or(|key| message.ordering_key > key)
                    })
                    .collect();
                let page: Vec<MessageRecord> = eligible
                    .iter()
                    .take(limit)
                    .map(|message| (*message).clone())
                    .collect();

                Batch {
                    has_more: eligible.len() > page.len(),
                    next_cursor: page.last().map(|message| Cursor::from_key(message.ordering_key)),
                    total_estimate: Some(messages.len() as u64),
                    messages: page,
                }
            }
        };

        Ok(batch)
    }
}

impl MessageSource for FixtureSource {
    fn fetch_batch<'a>(&'a self, request: &'a BatchRequest) -> BoxFuture<'a, SourceResult<Batch>> {
        Box::pin(async move {
            self.requests
                .lock()
                .expect("request log lock poisoned")
                .push(request.clone());
            self.serve(request)
        })
    }
}

/// One renderer invocation captured for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    Batch {
        mode: RenderMode,
        messages: Vec<MessageRecord>,
    },
    One {
        message: MessageRecord,
        auto_scroll: bool,
    },
}

/// Shared measurement state behind a [`TestViewport`].
///
/// Inserted heights land in `pending_extent` and only become measurable
/// after a settle, so an implementation that measures too early reads a
/// stale content extent, exactly like a real layout pass.
#[derive(Debug, Default)]
struct ViewportMetrics {
    content_extent: f32,
    pending_extent: f32,
    viewport_extent: f32,
    offset: f32,
    settles: u32,
}

/// Fake host viewport with settle-gated height application.
#[derive(Clone)]
pub struct TestViewport {
    metrics: Arc<Mutex<ViewportMetrics>>,
}

impl TestViewport {
    pub fn new(viewport_extent: f32) -> Self {
        Self {
            metrics: Arc::new(Mutex::new(ViewportMetrics {
                viewport_extent,
                ..ViewportMetrics::default()
            })),
        }
    }

    /// Queues content growth that becomes measurable at the next settle.
    pub fn grow_content(&self, by: f32) {
        self.metrics.lock().expect("viewport lock poisoned").pending_extent += by;
    }

    /// Applies pending growth immediately, standing in for a host layout pass.
    pub fn settle_now(&self) {
        let mut metrics = self.metrics.lock().expect("viewport lock poisoned");
        metrics.content_extent += std::mem::take(&mut metrics.pending_extent);
        metrics.settles += 1;
    }

    pub fn force_offset(&self, offset: f32) {
        self.metrics.lock().expect("viewport lock poisoned").offset = offset;
    }

    pub fn offset_now(&self) -> f32 {
        self.metrics.lock().expect("viewport lock poisoned").offset
    }

    pub fn content_extent_now(&self) -> f32 {
        self.metrics.lock().expect("viewport lock poisoned").content_extent
    }

    pub fn settle_count(&self) -> u32 {
        self.metrics.lock().expect("viewport lock poisoned").settles
    }
}

impl ViewportHandle for TestViewport {
    fn content_extent(&self) -> f32 {
        self.metrics.lock().expect("viewport lock poisoned").content_extent
    }

    fn viewport_extent(&self) -> f32 {
        self.metrics.lock().expect("viewport lock poisoned").viewport_extent
    }

    fn offset(&self) -> f32 {
        self.metrics.lock().expect("viewport lock poisoned").offset
    }

    fn set_offset(&mut self, offset: f32) {
        self.metrics.lock().expect("viewport lock poisoned").offset = offset;
    }

    fn settle<'a>(&'a mut self) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.settle_now();
        })
    }
}

/// Renderer double that records every dispatch and optionally feeds row
/// heights into a shared [`TestViewport`].
#[derive(Clone)]
pub struct RecordingRenderer {
    calls: Arc<Mutex<Vec<RenderCall>>>,
    layout: Option<LayoutFeed>,
}

#[derive(Clone)]
struct LayoutFeed {
    viewport: TestViewport,
    row_height: f32,
}

impl Default for RecordingRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            layout: None,
        }
    }

    /// Couples rendered rows to a viewport: every rendered message is
    /// `row_height` tall and becomes measurable at the next settle.
    pub fn with_layout(viewport: &TestViewport, row_height: f32) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            layout: Some(LayoutFeed {
                viewport: viewport.clone(),
                row_height,
            }),
        }
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().expect("render log lock poisoned").clone()
    }

    fn feed_layout(&self, mode: RenderMode, count: usize) {
        let Some(feed) = &self.layout else {
            return;
        };
        let rendered_height = feed.row_height * count as f32;

        match mode {
            RenderMode::Replace => {
                // Replacing rebuilds the tree: pending growth becomes the
                // difference between the new total height and the old one.
                let mut metrics = feed
                    .viewport
                    .metrics
                    .lock()
                    .expect("viewport lock poisoned");
                metrics.pending_extent = rendered_height - metrics.content_extent;
            }
            RenderMode::Prepend | RenderMode::Append => {
                feed.viewport.grow_content(rendered_height);
            }
        }
    }
}

impl HistoryRenderer for RecordingRenderer {
    fn render(&mut self, mode: RenderMode, messages: &[MessageRecord]) {
        self.feed_layout(mode, messages.len());
        self.calls
            .lock()
            .expect("render log lock poisoned")
            .push(RenderCall::Batch {
                mode,
                messages: messages.to_vec(),
            });
    }

    fn render_one(&mut self, message: &MessageRecord, auto_scroll: bool) {
        if let Some(feed) = &self.layout {
            feed.viewport.grow_content(feed.row_height);
        }
        self.calls
            .lock()
            .expect("render log lock poisoned")
            .push(RenderCall::One {
                message: message.clone(),
                auto_scroll,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn before_pages_are_contiguous_and_exhaust_cleanly() {
        let (source, conversation_id) = FixtureSource::seeded(70, 1_000, 10);

        let newest = BatchRequest::new(conversation_id, BatchDirection::Before, 30);
        let page1 = source.fetch_batch(&newest).await.expect("page must serve");
        assert_eq!(page1.messages.len(), 30);
        assert!(page1.has_more);
        assert_eq!(
            page1.messages.first().map(|message| message.ordering_key),
            Some(OrderingKey::new(1_400))
        );

        let older = newest
            .clone()
            .with_cursor(page1.next_cursor.clone().expect("cursor must exist"));
        let page2 = source.fetch_batch(&older).await.expect("page must serve");
        assert_eq!(page2.messages.len(), 30);
        assert!(page2.has_more);
        // Contiguous: page2 ends right below page1's oldest key.
        assert_eq!(
            page2.messages.last().map(|message| message.ordering_key),
            Some(OrderingKey::new(1_390))
        );

        let oldest = newest
            .clone()
            .with_cursor(page2.next_cursor.clone().expect("cursor must exist"));
        let page3 = source.fetch_batch(&oldest).await.expect("page must serve");
        assert_eq!(page3.messages.len(), 10);
        assert!(!page3.has_more);
    }

    #[tokio::test]
    async fn after_pages_walk_forward() {
        let (source, conversation_id) = FixtureSource::seeded(50, 1_000, 10);

        let request = BatchRequest::new(conversation_id, BatchDirection::After, 20)
            .with_cursor(Cursor::from_key(OrderingKey::new(1_190)));
        let page = source.fetch_batch(&request).await.expect("page must serve");

        assert_eq!(page.messages.len(), 20);
        assert_eq!(
            page.messages.first().map(|message| message.ordering_key),
            Some(OrderingKey::new(1_200))
        );
        assert!(page.has_more);
    }

    #[tokio::test]
    async fn planned_failures_serve_before_real_pages() {
        let (source, conversation_id) = FixtureSource::seeded(10, 1_000, 10);
        source.plan_failures([PlannedFailure::ServerFault(500)]);

        let request = BatchRequest::new(conversation_id, BatchDirection::Before, 5);
        let first = source.fetch_batch(&request).await;
        assert!(matches!(first, Err(SourceError::ServerFault { .. })));

        let second = source.fetch_batch(&request).await;
        assert!(second.is_ok());
        assert_eq!(source.request_count(), 2);
    }

    #[test]
    fn settle_gates_height_application() {
        let viewport = TestViewport::new(200.0);
        let mut renderer = RecordingRenderer::with_layout(&viewport, 20.0);
        let message = fixture_message(ConversationId::generate(), 1_000);

        renderer.render_one(&message, false);
        assert_eq!(viewport.content_extent_now(), 0.0);

        viewport.settle_now();
        assert_eq!(viewport.content_extent_now(), 20.0);
    }
}
