use backscroll_client::BoxFuture;

/// Host-view capability for measuring and moving the scroll viewport.
///
/// `settle` must complete one full layout pass before resolving; extents read
/// before a settle can be stale and will under-correct the offset.
pub trait ViewportHandle: Send {
    fn content_extent(&self) -> f32;
    fn viewport_extent(&self) -> f32;
    fn offset(&self) -> f32;
    fn set_offset(&mut self, offset: f32);
    fn settle<'a>(&'a mut self) -> BoxFuture<'a, ()>;
}

/// Offset adjustment applied after content was inserted above the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorCorrection {
    pub height_delta: f32,
    pub corrected_offset: f32,
}

/// Keeps visible content stationary while content is inserted above it.
#[derive(Debug, Default)]
pub struct AnchorController;

impl AnchorController {
    pub fn new() -> Self {
        Self
    }

    /// Runs `mutate`, waits one layout pass, then shifts the offset by the
    /// measured content-height delta so the message that was topmost in the
    /// viewport before the insertion stays topmost after it.
    pub async fn preserve<F>(
        &self,
        viewport: &mut dyn ViewportHandle,
        mutate: F,
    ) -> AnchorCorrection
    where
        F: FnOnce(),
    {
        let old_extent = viewport.content_extent();
        let old_offset = viewport.offset();

        mutate();
        viewport.settle().await;

        let height_delta = viewport.content_extent() - old_extent;
        let corrected_offset = (old_offset + height_delta).max(0.0);
        viewport.set_offset(corrected_offset);

        tracing::debug!(
            height_delta,
            corrected_offset,
            "anchor restored after insertion above the viewport"
        );

        AnchorCorrection {
            height_delta,
            corrected_offset,
        }
    }

    /// Pins the viewport to the newest content once layout settles.
    pub async fn scroll_to_bottom(&self, viewport: &mut dyn ViewportHandle) -> f32 {
        viewport.settle().await;
        let target = (viewport.content_extent() - viewport.viewport_extent()).max(0.0);
        viewport.set_offset(target);
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::TestViewport;

    #[tokio::test]
    async fn prepended_height_shifts_the_offset_by_the_same_amount() {
        let controller = AnchorController::new();
        let mut viewport = TestViewport::new(300.0);
        viewport.grow_content(600.0);
        viewport.settle_now();
        viewport.set_offset(120.0);

        let correction = {
            let handle = viewport.clone();
            controller
                .preserve(&mut viewport, move || handle.grow_content(400.0))
                .await
        };

        assert_eq!(correction.height_delta, 400.0);
        assert_eq!(correction.corrected_offset, 520.0);
        assert_eq!(viewport.offset(), 520.0);
    }

    #[tokio::test]
    async fn measurement_waits_for_the_layout_pass() {
        let controller = AnchorController::new();
        let mut viewport = TestViewport::new(300.0);
        viewport.grow_content(600.0);
        viewport.settle_now();
        let settles_before = viewport.settle_count();

        let handle = viewport.clone();
        let correction = controller
            .preserve(&mut viewport, move || handle.grow_content(250.0))
            .await;

        // The inserted height is only visible to measurement after the settle,
        // so a correct implementation sees the full delta exactly once.
        assert_eq!(viewport.settle_count(), settles_before + 1);
        assert_eq!(correction.height_delta, 250.0);
    }

    #[tokio::test]
    async fn scroll_to_bottom_pins_the_tail() {
        let controller = AnchorController::new();
        let mut viewport = TestViewport::new(300.0);
        viewport.grow_content(1_000.0);

        let target = controller.scroll_to_bottom(&mut viewport).await;

        assert_eq!(target, 700.0);
        assert_eq!(viewport.offset(), 700.0);
    }

    #[tokio::test]
    async fn short_content_clamps_to_the_top() {
        let controller = AnchorController::new();
        let mut viewport = TestViewport::new(300.0);
        viewport.grow_content(150.0);

        let target = controller.scroll_to_bottom(&mut viewport).await;
        assert_eq!(target, 0.0);
    }
}
