use std::sync::Arc;

use tokio::sync::mpsc;

use backscroll_client::{
    Batch, BatchDirection, BatchRequest, ConversationId, Cursor, MessageRecord, MessageSource,
    SourceError, SourceResult, fetch_with_retry,
};

use crate::anchor::{AnchorController, ViewportHandle};
use crate::cache::{KeepRange, MessageCache};
use crate::config::EngineConfig;
use crate::dispatch::{HistoryRenderer, RenderDispatcher, RenderMode};
use crate::events::{EngineEvent, EngineEventStream, make_event_channel};
use crate::viewport::{Edge, ScrollInput, ScrollTelemetry, ViewportIntentDetector};

/// Which page of history a load is fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadKind {
    Initial,
    Older,
    Newer,
}

impl LoadKind {
    pub fn batch_direction(&self) -> BatchDirection {
        match self {
            Self::Initial | Self::Older => BatchDirection::Before,
            Self::Newer => BatchDirection::After,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Older => "older",
            Self::Newer => "newer",
        }
    }
}

/// Generation token identifying the currently open conversation session.
///
/// Must change on every conversation open so batch completions issued for a
/// previous conversation can be rejected on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadGeneration(pub u64);

impl LoadGeneration {
    fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

/// Load lifecycle for one conversation's pagination state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    LoadingInitial,
    LoadingOlder,
    LoadingNewer,
    Retrying {
        kind: LoadKind,
        attempt: u32,
    },
    Failed {
        kind: LoadKind,
    },
    Ready,
}

/// State transition input for the load lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadTransition {
    Begin(LoadKind),
    Complete(LoadKind),
    RetryScheduled { kind: LoadKind, attempt: u32 },
    FailTerminal(LoadKind),
    ManualRetry { kind: LoadKind },
}

/// Rejection reason for illegal load transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadTransitionRejection {
    LoadInFlight { active: LoadKind, attempted: LoadKind },
    NoActiveLoad { attempted: LoadKind },
    KindMismatch { active: LoadKind, attempted: LoadKind },
    NotReady { attempted: LoadKind },
    NotFailed,
}

pub type LoadTransitionResult = Result<LoadState, LoadTransitionRejection>;

impl LoadState {
    /// Returns the in-flight load kind, if any; `Retrying` counts as in
    /// flight since its fetch task is sleeping toward the next attempt.
    pub fn active_kind(&self) -> Option<LoadKind> {
        match self {
            Self::LoadingInitial => Some(LoadKind::Initial),
            Self::LoadingOlder => Some(LoadKind::Older),
            Self::LoadingNewer => Some(LoadKind::Newer),
            Self::Retrying { kind, .. } => Some(*kind),
            Self::Idle | Self::Failed { .. } | Self::Ready => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.active_kind().is_some()
    }

    fn loading_for(kind: LoadKind) -> Self {
        match kind {
            LoadKind::Initial => Self::LoadingInitial,
            LoadKind::Older => Self::LoadingOlder,
            LoadKind::Newer => Self::LoadingNewer,
        }
    }

    /// Applies one transition deterministically.
    ///
    /// A trigger while any load is in flight is rejected, which is how the
    /// single-flight guarantee is enforced. Edge loads may only begin from
    /// `Ready`; a manual retry may only leave `Failed`.
    pub fn apply(&self, transition: LoadTransition) -> LoadTransitionResult {
        match transition {
            LoadTransition::Begin(kind) => self.apply_begin(kind),
            LoadTransition::Complete(kind) => self.apply_settled(kind, Self::Ready),
            LoadTransition::RetryScheduled { kind, attempt } => {
                self.apply_settled(kind, Self::Retrying { kind, attempt })
            }
            LoadTransition::FailTerminal(kind) => self.apply_settled(kind, Self::Failed { kind }),
            LoadTransition::ManualRetry { kind } => match self {
                Self::Failed { .. } => Ok(Self::loading_for(kind)),
                _ => Err(LoadTransitionRejection::NotFailed),
            },
        }
    }

    fn apply_begin(&self, kind: LoadKind) -> LoadTransitionResult {
        if let Some(active) = self.active_kind() {
            return Err(LoadTransitionRejection::LoadInFlight {
                active,
                attempted: kind,
            });
        }

        match (kind, self) {
            (LoadKind::Initial, _) => Ok(Self::LoadingInitial),
            (_, Self::Ready) => Ok(Self::loading_for(kind)),
            _ => Err(LoadTransitionRejection::NotReady { attempted: kind }),
        }
    }

    fn apply_settled(&self, kind: LoadKind, next: LoadState) -> LoadTransitionResult {
        match self.active_kind() {
            Some(active) if active == kind => Ok(next),
            Some(active) => Err(LoadTransitionRejection::KindMismatch {
                active,
                attempted: kind,
            }),
            None => Err(LoadTransitionRejection::NoActiveLoad { attempted: kind }),
        }
    }
}

/// Cursor and exhaustion bookkeeping for one open conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationState {
    pub conversation_id: ConversationId,
    pub before_cursor: Option<Cursor>,
    pub after_cursor: Option<Cursor>,
    pub has_more_before: bool,
    pub has_more_after: bool,
    pub load_state: LoadState,
    /// Approximate total reported by the endpoint; display-only, never
    /// consulted for correctness.
    pub total_estimate: Option<u64>,
}

impl PaginationState {
    fn opened(conversation_id: ConversationId, anchored: bool) -> Self {
        Self {
            conversation_id,
            before_cursor: None,
            after_cursor: None,
            has_more_before: true,
            // Opening at the newest page means the present is already loaded;
            // an anchored open must still discover the newer side.
            has_more_after: anchored,
            load_state: LoadState::Idle,
            total_estimate: None,
        }
    }

    /// Drops every cursor after the endpoint rejected one as malformed.
    fn reset_pagination(&mut self) {
        self.before_cursor = None;
        self.after_cursor = None;
        self.has_more_before = true;
        self.has_more_after = false;
        self.total_estimate = None;
    }
}

/// Internal signal from a fetch task back to the engine's timeline.
#[derive(Debug)]
enum LoadSignal {
    Retrying {
        generation: LoadGeneration,
        kind: LoadKind,
        attempt: u32,
        error: String,
    },
    Finished {
        generation: LoadGeneration,
        kind: LoadKind,
        result: SourceResult<Batch>,
    },
}

/// Per-conversation pagination and scroll engine.
///
/// Owns the cache and pagination state exclusively; collaborators are
/// injected once and reached only through their capability traits. Network
/// work runs on spawned tasks, and every signal they send is applied on the
/// caller's timeline via [`HistoryEngine::pump_one`] so all state mutation
/// happens between suspension points, lock-free.
pub struct HistoryEngine {
    config: EngineConfig,
    source: Arc<dyn MessageSource>,
    dispatcher: RenderDispatcher,
    viewport: Box<dyn ViewportHandle>,
    detector: ViewportIntentDetector,
    anchor: AnchorController,
    cache: MessageCache,
    state: Option<PaginationState>,
    generation: LoadGeneration,
    current_attempts: u32,
    last_telemetry: Option<ScrollTelemetry>,
    signals_tx: mpsc::UnboundedSender<LoadSignal>,
    signals_rx: mpsc::UnboundedReceiver<LoadSignal>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
}

impl HistoryEngine {
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn MessageSource>,
        renderer: Box<dyn HistoryRenderer>,
        viewport: Box<dyn ViewportHandle>,
    ) -> (Self, EngineEventStream) {
        let config = config.normalized();
        let (events_tx, event_stream) = make_event_channel();
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let detector = ViewportIntentDetector::new(
            config.edge_threshold,
            config.quiet_period(),
            config.trigger_throttle(),
        );
        let cache = MessageCache::new(config.max_cache_size);

        let engine = Self {
            config,
            source,
            dispatcher: RenderDispatcher::new(renderer),
            viewport,
            detector,
            anchor: AnchorController::new(),
            cache,
            state: None,
            generation: LoadGeneration(0),
            current_attempts: 0,
            last_telemetry: None,
            signals_tx,
            signals_rx,
            events_tx,
        };

        (engine, event_stream)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &MessageCache {
        &self.cache
    }

    pub fn pagination_state(&self) -> Option<&PaginationState> {
        self.state.as_ref()
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.state.as_ref().map(|state| state.conversation_id)
    }

    /// Approximate conversation length for progress display only.
    pub fn total_estimate(&self) -> Option<u64> {
        self.state.as_ref().and_then(|state| state.total_estimate)
    }

    /// Opens a conversation at its newest page and pins the viewport to the
    /// bottom once the first batch renders.
    pub fn open_conversation(&mut self, conversation_id: ConversationId) {
        self.open(conversation_id, None);
    }

    /// Opens a conversation anchored at a historical position (deep link or
    /// jump-to-message); both directions stay loadable.
    pub fn open_conversation_at(&mut self, conversation_id: ConversationId, cursor: Cursor) {
        self.open(conversation_id, Some(cursor));
    }

    fn open(&mut self, conversation_id: ConversationId, anchor_cursor: Option<Cursor>) {
        // Everything in flight for the previous conversation becomes stale
        // the moment the generation advances; its signals are dropped on
        // arrival rather than cancelled at the transport.
        self.generation = self.generation.next();
        self.cache.clear();
        self.detector.reset();
        self.last_telemetry = None;

        let mut state = PaginationState::opened(conversation_id, anchor_cursor.is_some());
        match state.load_state.apply(LoadTransition::Begin(LoadKind::Initial)) {
            Ok(next) => state.load_state = next,
            Err(rejection) => {
                tracing::error!(?rejection, "initial load transition rejected");
                return;
            }
        }

        tracing::info!(
            conversation_id = %conversation_id,
            generation = self.generation.0,
            anchored = anchor_cursor.is_some(),
            "opening conversation"
        );

        self.state = Some(state);
        self.current_attempts = 0;
        self.spawn_fetch(LoadKind::Initial, anchor_cursor);
    }

    /// Feeds one raw scroll signal from the host view.
    pub fn on_scroll(&mut self, input: ScrollInput) {
        let telemetry = self.detector.observe(input);
        self.last_telemetry = Some(telemetry);

        self.emit(EngineEvent::Scroll {
            offset: telemetry.offset,
            is_at_top: telemetry.is_near_top,
            is_at_bottom: telemetry.is_near_bottom,
            direction: telemetry.direction,
        });

        if let Some(edge) = self.detector.trigger_for(&telemetry) {
            self.maybe_begin_edge_load(edge);
        }
    }

    /// Feeds a sentinel-visibility signal, for hosts whose scroll events are
    /// coalesced or suppressed.
    pub fn on_sentinel_visible(&mut self, edge: Edge) {
        if let Some(edge) = self.detector.on_sentinel_visible(edge) {
            self.maybe_begin_edge_load(edge);
        }
    }

    /// Inserts one out-of-band message (push arrival, local echo).
    ///
    /// Auto-scrolls only when the viewport is at the bottom and the user is
    /// not actively scrolling; never force-scrolls over someone reading
    /// older history.
    pub async fn insert_incoming(&mut self, message: MessageRecord) {
        let Some(state) = self.state.as_ref() else {
            return;
        };
        if message.conversation_id != state.conversation_id {
            tracing::debug!(
                message_conversation = %message.conversation_id,
                active_conversation = %state.conversation_id,
                "ignoring out-of-band message for an inactive conversation"
            );
            return;
        }
        let conversation_id = state.conversation_id;

        let outcome = self.cache.upsert(std::slice::from_ref(&message));
        if outcome.inserted == 0 {
            return;
        }

        let near_bottom = self
            .last_telemetry
            .map(|telemetry| telemetry.is_near_bottom)
            .unwrap_or(true);
        let auto_scroll = near_bottom && !self.detector.is_user_scrolling();

        let evicted = self
            .keep_range(LoadKind::Newer)
            .map(|keep| self.cache.evict_if_over_capacity(keep))
            .unwrap_or(0);

        if evicted > 0 {
            let rendered = self.cache.ordered_messages();
            self.dispatcher.dispatch(RenderMode::Replace, &rendered);
        } else {
            self.dispatcher.dispatch_one(&message, auto_scroll);
        }

        self.emit(EngineEvent::MessageArrived {
            conversation_id,
            message_id: message.id,
            auto_scroll,
        });

        if auto_scroll {
            self.detector.note_programmatic_scroll();
            self.anchor.scroll_to_bottom(self.viewport.as_mut()).await;
        }
    }

    /// Re-issues the failed load after the terminal error state.
    pub fn retry_failed(&mut self) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let LoadState::Failed { kind: failed_kind } = &state.load_state else {
            tracing::debug!("manual retry ignored outside the failed state");
            return;
        };
        let failed_kind = *failed_kind;

        // After a pagination reset the stored cursors are gone; start over
        // from the newest page instead of replaying a rejected cursor.
        let kind = match failed_kind {
            LoadKind::Older if state.before_cursor.is_none() => LoadKind::Initial,
            LoadKind::Newer if state.after_cursor.is_none() => LoadKind::Initial,
            other => other,
        };
        let cursor = match kind {
            LoadKind::Initial => None,
            LoadKind::Older => state.before_cursor.clone(),
            LoadKind::Newer => state.after_cursor.clone(),
        };

        match state.load_state.apply(LoadTransition::ManualRetry { kind }) {
            Ok(next) => state.load_state = next,
            Err(rejection) => {
                tracing::warn!(?rejection, "manual retry transition rejected");
                return;
            }
        }

        tracing::info!(kind = kind.as_str(), "manual retry issued");
        self.current_attempts = 0;
        self.spawn_fetch(kind, cursor);
    }

    /// Awaits and applies the next pending load signal.
    pub async fn pump_one(&mut self) {
        if let Some(signal) = self.signals_rx.recv().await {
            self.apply_signal(signal).await;
        }
    }

    /// Pumps until no load is in flight for the open conversation.
    pub async fn settle(&mut self) {
        while self
            .state
            .as_ref()
            .is_some_and(|state| state.load_state.is_loading())
        {
            self.pump_one().await;
        }
    }

    fn maybe_begin_edge_load(&mut self, edge: Edge) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        let kind = match edge {
            Edge::Top => LoadKind::Older,
            Edge::Bottom => LoadKind::Newer,
        };

        let exhausted = match kind {
            LoadKind::Older => !state.has_more_before,
            LoadKind::Newer => !state.has_more_after,
            LoadKind::Initial => false,
        };
        if exhausted {
            return;
        }

        let cursor = match kind {
            LoadKind::Older => state.before_cursor.clone(),
            LoadKind::Newer => state.after_cursor.clone(),
            LoadKind::Initial => None,
        };
        let Some(cursor) = cursor else {
            // No batch has been requested in this direction yet; the initial
            // load is responsible for establishing the cursor.
            return;
        };

        match state.load_state.apply(LoadTransition::Begin(kind)) {
            Ok(next) => state.load_state = next,
            Err(rejection) => {
                // Single-flight: triggers during a load are dropped, not queued.
                tracing::debug!(?rejection, "edge trigger dropped");
                return;
            }
        }

        self.current_attempts = 0;
        self.spawn_fetch(kind, Some(cursor));
    }

    fn spawn_fetch(&self, kind: LoadKind, cursor: Option<Cursor>) {
        let Some(state) = self.state.as_ref() else {
            return;
        };

        let mut request = BatchRequest::new(
            state.conversation_id,
            kind.batch_direction(),
            self.config.batch_size,
        );
        if let Some(cursor) = cursor {
            request = request.with_cursor(cursor);
        }

        let source = Arc::clone(&self.source);
        let policy = self.config.retry_policy();
        let generation = self.generation;
        let signals_tx = self.signals_tx.clone();
        let retry_tx = self.signals_tx.clone();

        tokio::spawn(async move {
            let result = fetch_with_retry(source.as_ref(), &request, &policy, |notice| {
                let _ = retry_tx.send(LoadSignal::Retrying {
                    generation,
                    kind,
                    attempt: notice.attempt,
                    error: notice.error,
                });
            })
            .await;

            let _ = signals_tx.send(LoadSignal::Finished {
                generation,
                kind,
                result,
            });
        });
    }

    async fn apply_signal(&mut self, signal: LoadSignal) {
        match signal {
            LoadSignal::Retrying {
                generation,
                kind,
                attempt,
                error,
            } => self.apply_retry_notice(generation, kind, attempt, error),
            LoadSignal::Finished {
                generation,
                kind,
                result,
            } => self.apply_finished(generation, kind, result).await,
        }
    }

    fn apply_retry_notice(
        &mut self,
        generation: LoadGeneration,
        kind: LoadKind,
        attempt: u32,
        error: String,
    ) {
        if generation != self.generation {
            tracing::debug!(
                stale_generation = generation.0,
                current_generation = self.generation.0,
                "discarding stale retry notice"
            );
            return;
        }
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let conversation_id = state.conversation_id;

        match state
            .load_state
            .apply(LoadTransition::RetryScheduled { kind, attempt })
        {
            Ok(next) => state.load_state = next,
            Err(rejection) => {
                tracing::warn!(?rejection, "retry notice rejected");
                return;
            }
        }

        self.current_attempts = attempt;
        self.emit(EngineEvent::LoadFailed {
            conversation_id,
            kind,
            attempt,
            will_retry: true,
            error,
        });
    }

    async fn apply_finished(
        &mut self,
        generation: LoadGeneration,
        kind: LoadKind,
        result: SourceResult<Batch>,
    ) {
        if generation != self.generation {
            // A response for a superseded conversation is a logical no-op:
            // no cache mutation, no render, no events.
            tracing::debug!(
                stale_generation = generation.0,
                current_generation = self.generation.0,
                kind = kind.as_str(),
                "discarding stale batch completion"
            );
            return;
        }

        match result {
            Ok(batch) => self.apply_batch(kind, batch).await,
            Err(error) => self.apply_terminal_failure(kind, error),
        }
    }

    async fn apply_batch(&mut self, kind: LoadKind, batch: Batch) {
        let Some(conversation_id) = self.conversation_id() else {
            return;
        };

        let mut pin_to_bottom = false;
        {
            let Some(state) = self.state.as_mut() else {
                return;
            };

            let oldest_in_batch = batch
                .messages
                .first()
                .map(|message| Cursor::from_key(message.ordering_key));
            let newest_in_batch = batch
                .messages
                .last()
                .map(|message| Cursor::from_key(message.ordering_key));

            if let Some(estimate) = batch.total_estimate {
                state.total_estimate = Some(estimate);
            }

            match kind {
                LoadKind::Initial => {
                    state.has_more_before = batch.has_more;
                    state.before_cursor = batch.next_cursor.clone().or(oldest_in_batch);
                    if state.has_more_after {
                        state.after_cursor = newest_in_batch;
                    }
                    pin_to_bottom = !state.has_more_after;
                }
                LoadKind::Older => {
                    state.has_more_before = batch.has_more;
                    if let Some(cursor) = batch.next_cursor.clone().or(oldest_in_batch) {
                        state.before_cursor = Some(cursor);
                    }
                }
                LoadKind::Newer => {
                    state.has_more_after = batch.has_more;
                    if let Some(cursor) = batch.next_cursor.clone().or(newest_in_batch) {
                        state.after_cursor = Some(cursor);
                    }
                }
            }
        }

        let outcome = self.cache.upsert(&batch.messages);
        tracing::debug!(
            kind = kind.as_str(),
            inserted = outcome.inserted,
            duplicates = outcome.duplicates,
            cached = self.cache.len(),
            "applied batch to cache"
        );

        let evicted = match kind {
            LoadKind::Initial => 0,
            LoadKind::Older | LoadKind::Newer => self
                .keep_range(kind)
                .map(|keep| self.cache.evict_if_over_capacity(keep))
                .unwrap_or(0),
        };

        match kind {
            LoadKind::Initial => {
                let rendered = self.cache.ordered_messages();
                self.dispatcher.dispatch(RenderMode::Replace, &rendered);
                if pin_to_bottom {
                    self.detector.note_programmatic_scroll();
                    self.anchor.scroll_to_bottom(self.viewport.as_mut()).await;
                }
            }
            LoadKind::Older => {
                if !batch.messages.is_empty() {
                    // Prepending shifts everything below; the anchor hand-off
                    // must finish before this load reports ready, or stacked
                    // corrections would compound height errors.
                    let (mode, rendered) = if evicted > 0 {
                        (RenderMode::Replace, self.cache.ordered_messages())
                    } else {
                        (RenderMode::Prepend, batch.messages.clone())
                    };
                    let viewport = self.viewport.as_mut();
                    let dispatcher = &mut self.dispatcher;
                    self.anchor
                        .preserve(viewport, move || dispatcher.dispatch(mode, &rendered))
                        .await;
                }
            }
            LoadKind::Newer => {
                if !batch.messages.is_empty() {
                    // Appending below the viewport never moves visible content.
                    if evicted > 0 {
                        let rendered = self.cache.ordered_messages();
                        self.dispatcher.dispatch(RenderMode::Replace, &rendered);
                    } else {
                        self.dispatcher.dispatch(RenderMode::Append, &batch.messages);
                    }
                }
            }
        }

        let Some(state) = self.state.as_mut() else {
            return;
        };
        match state.load_state.apply(LoadTransition::Complete(kind)) {
            Ok(next) => state.load_state = next,
            Err(rejection) => {
                tracing::warn!(?rejection, "batch completion rejected");
                return;
            }
        }

        let has_more = match kind.batch_direction() {
            BatchDirection::Before => state.has_more_before,
            BatchDirection::After => state.has_more_after,
        };

        self.emit(EngineEvent::MessagesLoaded {
            conversation_id,
            direction: kind.batch_direction(),
            count: batch.messages.len(),
            has_more,
        });
    }

    fn apply_terminal_failure(&mut self, kind: LoadKind, error: SourceError) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let conversation_id = state.conversation_id;

        if matches!(error, SourceError::ClientRequest { .. }) {
            // A 4xx means our cursor or conversation no longer matches the
            // endpoint's view; every cursor we hold is suspect.
            state.reset_pagination();
            tracing::warn!(
                conversation_id = %conversation_id,
                kind = kind.as_str(),
                error = %error,
                "client request rejected; pagination state reset"
            );
        }

        match state.load_state.apply(LoadTransition::FailTerminal(kind)) {
            Ok(next) => state.load_state = next,
            Err(rejection) => {
                tracing::warn!(?rejection, "terminal failure rejected");
                return;
            }
        }

        let attempt = self.current_attempts.saturating_add(1);
        tracing::warn!(
            conversation_id = %conversation_id,
            kind = kind.as_str(),
            attempt,
            error = %error,
            "load failed terminally; cached history stays visible"
        );

        self.emit(EngineEvent::LoadFailed {
            conversation_id,
            kind,
            attempt,
            will_retry: false,
            error: error.to_string(),
        });
    }

    /// Approximates the viewport-proximate window in ordering-key terms,
    /// padded by the configured buffer. Rendered content near the viewport
    /// must survive eviction; precision beyond that is not required.
    fn keep_range(&self, kind: LoadKind) -> Option<KeepRange> {
        let keys: Vec<_> = self.cache.keys().collect();
        let len = keys.len();
        if len == 0 {
            return None;
        }

        let (start_fraction, end_fraction) = match &self.last_telemetry {
            Some(telemetry) if telemetry.content_extent > f32::EPSILON => {
                let start = (telemetry.offset / telemetry.content_extent).clamp(0.0, 1.0);
                let end = ((telemetry.offset + telemetry.viewport_extent)
                    / telemetry.content_extent)
                    .clamp(0.0, 1.0);
                (start, end)
            }
            // No telemetry yet: keep the side this load extended toward.
            _ => match kind {
                LoadKind::Older => (0.0, 0.0),
                LoadKind::Initial | LoadKind::Newer => (1.0, 1.0),
            },
        };

        let buffer = self.config.eviction_buffer;
        let start_index = ((start_fraction * len as f32) as usize)
            .min(len - 1)
            .saturating_sub(buffer);
        let end_index = (((end_fraction * len as f32).ceil() as usize).saturating_add(buffer))
            .min(len - 1);

        Some(KeepRange::new(keys[start_index], keys[end_index]))
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events_tx.send(event);
    }
}
