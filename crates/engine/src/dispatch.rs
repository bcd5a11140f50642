use backscroll_client::MessageRecord;

/// How a batch of messages replaces or extends the rendered history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderMode {
    Replace,
    Prepend,
    Append,
}

impl RenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Prepend => "prepend",
            Self::Append => "append",
        }
    }
}

/// Narrow rendering capability the engine depends on.
///
/// Any concrete renderer (a DOM message list, a TUI widget, a test recorder)
/// implements exactly these two entry points; the engine never sees layout.
pub trait HistoryRenderer: Send {
    fn render(&mut self, mode: RenderMode, messages: &[MessageRecord]);
    fn render_one(&mut self, message: &MessageRecord, auto_scroll: bool);
}

/// Translates cache outcomes into ordered render instructions.
///
/// Carries no layout knowledge, only ordering and labeling; every arrival
/// dispatches independently.
pub struct RenderDispatcher {
    renderer: Box<dyn HistoryRenderer>,
}

impl RenderDispatcher {
    pub fn new(renderer: Box<dyn HistoryRenderer>) -> Self {
        Self { renderer }
    }

    pub fn dispatch(&mut self, mode: RenderMode, messages: &[MessageRecord]) {
        tracing::debug!(
            mode = mode.as_str(),
            count = messages.len(),
            "dispatching render batch"
        );
        self.renderer.render(mode, messages);
    }

    pub fn dispatch_one(&mut self, message: &MessageRecord, auto_scroll: bool) {
        tracing::debug!(
            message_id = %message.id,
            auto_scroll,
            "dispatching single message"
        );
        self.renderer.render_one(message, auto_scroll);
    }
}

#[cfg(test)]
mod tests {
    use backscroll_client::{ConversationId, MessageId, OrderingKey, SenderId};

    use super::*;
    use crate::harness::{RecordingRenderer, RenderCall};

    fn record(key: i64) -> MessageRecord {
        MessageRecord::new(
            MessageId::generate(),
            ConversationId::generate(),
            OrderingKey::new(key),
            SenderId::generate(),
            format!("message-{key}"),
        )
    }

    #[test]
    fn batches_and_singles_pass_through_in_order() {
        let renderer = RecordingRenderer::new();
        let mut dispatcher = RenderDispatcher::new(Box::new(renderer.clone()));
        let batch = vec![record(1), record(2)];
        let single = record(3);

        dispatcher.dispatch(RenderMode::Prepend, &batch);
        dispatcher.dispatch_one(&single, true);

        let calls = renderer.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(
            &calls[0],
            RenderCall::Batch { mode: RenderMode::Prepend, messages } if messages.len() == 2
        ));
        assert!(matches!(
            &calls[1],
            RenderCall::One { message, auto_scroll: true } if message.id == single.id
        ));
    }
}
