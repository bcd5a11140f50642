use std::time::{Duration, Instant};

/// Small delta used to ignore floating-point scroll jitter.
const SCROLL_DELTA_EPSILON: f32 = 1.0;
/// Content growth beyond this is treated as an insertion, not user motion.
const CONTENT_DELTA_EPSILON: f32 = 1.0;
/// Fraction of the viewport extent the edge look-ahead grows to on tall views.
const VIEWPORT_THRESHOLD_FRACTION: f32 = 0.25;

/// Scroll motion classification for one telemetry snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScrollDirection {
    Up,
    Down,
    Neutral,
}

/// Viewport edge that can trigger a history load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Top,
    Bottom,
}

/// Raw scroll signal as reported by the host view.
///
/// `offset` is the distance from the top of the content; zero means the
/// oldest loaded message is flush with the viewport top.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollInput {
    pub offset: f32,
    pub content_extent: f32,
    pub viewport_extent: f32,
}

/// Derived snapshot recomputed on every scroll signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollTelemetry {
    pub offset: f32,
    pub content_extent: f32,
    pub viewport_extent: f32,
    pub direction: ScrollDirection,
    pub is_near_top: bool,
    pub is_near_bottom: bool,
    pub is_user_driven: bool,
}

/// Classifies scroll activity and decides when edge proximity should load.
///
/// Distinguishes user-driven motion from offsets that moved because content
/// was inserted or a programmatic scroll was issued, and collapses signal
/// bursts so each edge produces at most one trigger per throttle window.
pub struct ViewportIntentDetector {
    edge_threshold: f32,
    quiet_period: Duration,
    trigger_throttle: Duration,
    last_offset: f32,
    last_content_extent: f32,
    pending_programmatic: u32,
    user_active_until: Option<Instant>,
    last_trigger: Option<(Edge, Instant)>,
}

impl ViewportIntentDetector {
    pub fn new(edge_threshold: f32, quiet_period: Duration, trigger_throttle: Duration) -> Self {
        Self {
            edge_threshold: edge_threshold.max(0.0),
            quiet_period,
            trigger_throttle,
            last_offset: 0.0,
            last_content_extent: 0.0,
            pending_programmatic: 0,
            user_active_until: None,
            last_trigger: None,
        }
    }

    /// Marks the next scroll signal as engine-issued rather than user input.
    pub fn note_programmatic_scroll(&mut self) {
        self.pending_programmatic = self.pending_programmatic.saturating_add(1);
    }

    /// Clears motion history when a different conversation takes over.
    pub fn reset(&mut self) {
        self.last_offset = 0.0;
        self.last_content_extent = 0.0;
        self.pending_programmatic = 0;
        self.user_active_until = None;
        self.last_trigger = None;
    }

    pub fn observe(&mut self, input: ScrollInput) -> ScrollTelemetry {
        self.observe_at(input, Instant::now())
    }

    pub fn is_user_scrolling(&self) -> bool {
        self.is_user_scrolling_at(Instant::now())
    }

    /// Yields an edge when proximity holds and motion points at that edge.
    pub fn trigger_for(&mut self, telemetry: &ScrollTelemetry) -> Option<Edge> {
        self.trigger_for_at(telemetry, Instant::now())
    }

    /// Secondary trigger path fed by a sentinel region's visibility signal,
    /// for hosts that coalesce or suppress raw scroll events.
    pub fn on_sentinel_visible(&mut self, edge: Edge) -> Option<Edge> {
        self.admit_trigger(edge, Instant::now())
    }

    fn observe_at(&mut self, input: ScrollInput, now: Instant) -> ScrollTelemetry {
        let offset_delta = input.offset - self.last_offset;
        let content_changed =
            (input.content_extent - self.last_content_extent).abs() > CONTENT_DELTA_EPSILON;

        let direction = if offset_delta < -SCROLL_DELTA_EPSILON {
            ScrollDirection::Up
        } else if offset_delta > SCROLL_DELTA_EPSILON {
            ScrollDirection::Down
        } else {
            ScrollDirection::Neutral
        };

        // An expected programmatic move or a content-height change means the
        // offset did not move because of the user's pointer.
        let programmatic = self.pending_programmatic > 0 || content_changed;
        if self.pending_programmatic > 0 {
            self.pending_programmatic -= 1;
        }

        let is_user_driven = !programmatic && direction != ScrollDirection::Neutral;
        if is_user_driven {
            self.user_active_until = Some(now + self.quiet_period);
        }

        let threshold = self.effective_threshold(input.viewport_extent);
        let is_near_top = input.offset <= threshold;
        let is_near_bottom =
            input.offset + input.viewport_extent >= input.content_extent - threshold;

        self.last_offset = input.offset;
        self.last_content_extent = input.content_extent;

        ScrollTelemetry {
            offset: input.offset,
            content_extent: input.content_extent,
            viewport_extent: input.viewport_extent,
            direction,
            is_near_top,
            is_near_bottom,
            is_user_driven,
        }
    }

    fn effective_threshold(&self, viewport_extent: f32) -> f32 {
        self.edge_threshold
            .max(viewport_extent * VIEWPORT_THRESHOLD_FRACTION)
    }

    fn is_user_scrolling_at(&self, now: Instant) -> bool {
        self.user_active_until
            .is_some_and(|active_until| now < active_until)
    }

    fn trigger_for_at(&mut self, telemetry: &ScrollTelemetry, now: Instant) -> Option<Edge> {
        let edge = if telemetry.is_near_top && telemetry.direction == ScrollDirection::Up {
            Edge::Top
        } else if telemetry.is_near_bottom && telemetry.direction == ScrollDirection::Down {
            Edge::Bottom
        } else {
            // Momentum overshoot moving away from the edge never triggers.
            return None;
        };

        self.admit_trigger(edge, now)
    }

    fn admit_trigger(&mut self, edge: Edge, now: Instant) -> Option<Edge> {
        if let Some((last_edge, fired_at)) = self.last_trigger
            && last_edge == edge
            && now.duration_since(fired_at) < self.trigger_throttle
        {
            return None;
        }

        self.last_trigger = Some((edge, now));
        Some(edge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: Duration = Duration::from_millis(300);
    const THROTTLE: Duration = Duration::from_millis(250);

    fn detector() -> ViewportIntentDetector {
        ViewportIntentDetector::new(50.0, QUIET, THROTTLE)
    }

    fn input(offset: f32) -> ScrollInput {
        ScrollInput {
            offset,
            content_extent: 2_000.0,
            viewport_extent: 200.0,
        }
    }

    #[test]
    fn user_motion_toward_the_top_is_detected() {
        let mut detector = detector();
        let start = Instant::now();

        detector.observe_at(input(600.0), start);
        let telemetry = detector.observe_at(input(30.0), start + Duration::from_millis(16));

        assert_eq!(telemetry.direction, ScrollDirection::Up);
        assert!(telemetry.is_near_top);
        assert!(telemetry.is_user_driven);
        assert!(detector.is_user_scrolling_at(start + Duration::from_millis(100)));
        assert!(!detector.is_user_scrolling_at(start + Duration::from_millis(500)));
    }

    #[test]
    fn content_growth_is_not_user_motion() {
        let mut detector = detector();
        let start = Instant::now();

        detector.observe_at(input(30.0), start);
        let grown = ScrollInput {
            offset: 630.0,
            content_extent: 2_600.0,
            viewport_extent: 200.0,
        };
        let telemetry = detector.observe_at(grown, start + Duration::from_millis(16));

        assert!(!telemetry.is_user_driven);
        assert!(!detector.is_user_scrolling_at(start + Duration::from_millis(100)));
    }

    #[test]
    fn programmatic_scroll_is_consumed_once() {
        let mut detector = detector();
        let start = Instant::now();

        detector.observe_at(input(600.0), start);
        detector.note_programmatic_scroll();

        let pinned = detector.observe_at(input(1_800.0), start + Duration::from_millis(16));
        assert!(!pinned.is_user_driven);

        let user = detector.observe_at(input(1_500.0), start + Duration::from_millis(32));
        assert!(user.is_user_driven);
    }

    #[test]
    fn trigger_requires_motion_toward_the_edge() {
        let mut detector = detector();
        let start = Instant::now();

        detector.observe_at(input(10.0), start);
        // Near the top but bouncing back down: no trigger.
        let away = detector.observe_at(input(40.0), start + Duration::from_millis(16));
        assert!(away.is_near_top);
        assert_eq!(detector.trigger_for_at(&away, start + Duration::from_millis(16)), None);

        let toward = detector.observe_at(input(5.0), start + Duration::from_millis(32));
        assert_eq!(
            detector.trigger_for_at(&toward, start + Duration::from_millis(32)),
            Some(Edge::Top)
        );
    }

    #[test]
    fn trigger_bursts_collapse_within_the_throttle_window() {
        let mut detector = detector();
        let start = Instant::now();

        detector.observe_at(input(120.0), start);
        let mut fired = 0;
        for step in 1..=5u64 {
            let at = start + Duration::from_millis(step * 16);
            let telemetry = detector.observe_at(input(120.0 - step as f32 * 20.0), at);
            if detector.trigger_for_at(&telemetry, at).is_some() {
                fired += 1;
            }
        }

        assert_eq!(fired, 1);

        // After the throttle window a fresh burst may fire again.
        let later = start + THROTTLE + Duration::from_millis(200);
        detector.observe_at(input(100.0), later);
        let telemetry = detector.observe_at(input(10.0), later + Duration::from_millis(16));
        assert_eq!(
            detector.trigger_for_at(&telemetry, later + Duration::from_millis(16)),
            Some(Edge::Top)
        );
    }

    #[test]
    fn sentinel_path_shares_the_throttle_window() {
        let mut detector = detector();
        let start = Instant::now();

        assert_eq!(detector.admit_trigger(Edge::Top, start), Some(Edge::Top));
        assert_eq!(
            detector.admit_trigger(Edge::Top, start + Duration::from_millis(50)),
            None
        );
        // The opposite edge is throttled independently.
        assert_eq!(
            detector.admit_trigger(Edge::Bottom, start + Duration::from_millis(60)),
            Some(Edge::Bottom)
        );
    }

    #[test]
    fn threshold_scales_with_the_viewport() {
        let detector = detector();
        assert_eq!(detector.effective_threshold(100.0), 50.0);
        assert_eq!(detector.effective_threshold(1_000.0), 250.0);
    }
}
