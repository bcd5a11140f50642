use tokio::sync::mpsc;

use backscroll_client::{BatchDirection, ConversationId, MessageId};

use crate::orchestrator::LoadKind;
use crate::viewport::ScrollDirection;

/// Engine outcome surfaced to the hosting UI layer.
///
/// Render instructions travel through the `HistoryRenderer` capability; this
/// stream carries everything else the host reacts to (spinners, retry
/// indicators, the new-message affordance, scroll affordances).
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A history batch landed in the cache.
    MessagesLoaded {
        conversation_id: ConversationId,
        direction: BatchDirection,
        count: usize,
        has_more: bool,
    },
    /// An out-of-band message was inserted; `auto_scroll` is false when the
    /// viewer is reading older content and the host should show an
    /// affordance instead of moving the viewport.
    MessageArrived {
        conversation_id: ConversationId,
        message_id: MessageId,
        auto_scroll: bool,
    },
    /// A load attempt failed; `will_retry` distinguishes a transient
    /// indicator from the terminal, user-actionable state.
    LoadFailed {
        conversation_id: ConversationId,
        kind: LoadKind,
        attempt: u32,
        will_retry: bool,
        error: String,
    },
    /// Scroll telemetry echo for host-side affordances.
    Scroll {
        offset: f32,
        is_at_top: bool,
        is_at_bottom: bool,
        direction: ScrollDirection,
    },
}

/// Receiving half of the engine's event stream.
pub struct EngineEventStream {
    events: mpsc::UnboundedReceiver<EngineEvent>,
}

impl EngineEventStream {
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        self.events.try_recv().ok()
    }

    /// Drains every event already delivered, for frame-driven hosts.
    pub fn drain(&mut self) -> Vec<EngineEvent> {
        let mut drained = Vec::new();
        while let Some(event) = self.try_recv() {
            drained.push(event);
        }
        drained
    }
}

pub(crate) fn make_event_channel() -> (mpsc::UnboundedSender<EngineEvent>, EngineEventStream) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    (event_tx, EngineEventStream { events: event_rx })
}
