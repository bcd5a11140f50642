use std::env;
use std::sync::Arc;

use snafu::{OptionExt, Snafu};

use backscroll_client::MessageSource;
use backscroll_engine::harness::{
    FixtureSource, PlannedFailure, RecordingRenderer, RenderCall, TestViewport, fixture_message,
};
use backscroll_engine::{
    Edge, EngineConfig, EngineEvent, EngineEventStream, HistoryEngine, LoadState, RenderMode,
    ScrollInput,
};

const ROW_HEIGHT: f32 = 20.0;
const VIEWPORT_EXTENT: f32 = 200.0;

#[derive(Debug, Clone)]
struct RunnerArgs {
    scenario: Scenario,
}

#[derive(Debug, Clone, Copy)]
enum Scenario {
    InitialLoad,
    OlderLoad,
    Exhaustion,
    SingleFlight,
    StaleDiscard,
    RetryBackoff,
    ClientErrorReset,
    IncomingAutoscroll,
    Eviction,
    All,
}

impl Scenario {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "initial_load" => Some(Self::InitialLoad),
            "older_load" => Some(Self::OlderLoad),
            "exhaustion" => Some(Self::Exhaustion),
            "single_flight" => Some(Self::SingleFlight),
            "stale_discard" => Some(Self::StaleDiscard),
            "retry_backoff" => Some(Self::RetryBackoff),
            "client_error_reset" => Some(Self::ClientErrorReset),
            "incoming_autoscroll" => Some(Self::IncomingAutoscroll),
            "eviction" => Some(Self::Eviction),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::InitialLoad => "initial_load",
            Self::OlderLoad => "older_load",
            Self::Exhaustion => "exhaustion",
            Self::SingleFlight => "single_flight",
            Self::StaleDiscard => "stale_discard",
            Self::RetryBackoff => "retry_backoff",
            Self::ClientErrorReset => "client_error_reset",
            Self::IncomingAutoscroll => "incoming_autoscroll",
            Self::Eviction => "eviction",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Snafu)]
enum RunnerError {
    #[snafu(display("missing required --scenario argument"))]
    MissingScenario { stage: &'static str },
    #[snafu(display("missing value for argument '{arg}'"))]
    MissingArgumentValue {
        stage: &'static str,
        arg: &'static str,
    },
    #[snafu(display("unknown scenario '{raw}'"))]
    UnknownScenario { stage: &'static str, raw: String },
    #[snafu(display("unknown argument '{raw}'"))]
    UnknownArgument { stage: &'static str, raw: String },
    #[snafu(display("scenario '{scenario}' failed: {reason}"))]
    ScenarioFailed {
        stage: &'static str,
        scenario: &'static str,
        reason: String,
    },
}

type RunnerResult<T> = Result<T, RunnerError>;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(error) = run().await {
        println!("runner_ok=false");
        eprintln!("runner_error={error}");
        std::process::exit(1);
    }
}

async fn run() -> RunnerResult<()> {
    let args = parse_args(env::args().skip(1))?;
    println!("scenario={}", args.scenario.name());

    match args.scenario {
        Scenario::InitialLoad => run_initial_load().await,
        Scenario::OlderLoad => run_older_load().await,
        Scenario::Exhaustion => run_exhaustion().await,
        Scenario::SingleFlight => run_single_flight().await,
        Scenario::StaleDiscard => run_stale_discard().await,
        Scenario::RetryBackoff => run_retry_backoff().await,
        Scenario::ClientErrorReset => run_client_error_reset().await,
        Scenario::IncomingAutoscroll => run_incoming_autoscroll().await,
        Scenario::Eviction => run_eviction().await,
        Scenario::All => run_all().await,
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> RunnerResult<RunnerArgs> {
    let mut scenario = None;
    let mut pending = args.into_iter();

    // The parser is intentionally strict to keep scenario execution deterministic in CI.
    while let Some(argument) = pending.next() {
        match argument.as_str() {
            "--scenario" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-scenario-value",
                    arg: "--scenario",
                })?;

                let parsed = Scenario::parse(&value).context(UnknownScenarioSnafu {
                    stage: "parse-args-scenario",
                    raw: value,
                })?;
                scenario = Some(parsed);
            }
            _ => {
                return UnknownArgumentSnafu {
                    stage: "parse-args",
                    raw: argument,
                }
                .fail();
            }
        }
    }

    Ok(RunnerArgs {
        scenario: scenario.context(MissingScenarioSnafu {
            stage: "parse-args-scenario-required",
        })?,
    })
}

async fn run_all() -> RunnerResult<()> {
    run_initial_load().await?;
    run_older_load().await?;
    run_exhaustion().await?;
    run_single_flight().await?;
    run_stale_discard().await?;
    run_retry_backoff().await?;
    run_client_error_reset().await?;
    run_incoming_autoscroll().await?;
    run_eviction().await?;

    println!("all_passed=true");
    Ok(())
}

struct Rig {
    engine: HistoryEngine,
    events: EngineEventStream,
    source: Arc<FixtureSource>,
    renderer: RecordingRenderer,
    viewport: TestViewport,
}

fn runner_config() -> EngineConfig {
    EngineConfig {
        batch_size: 30,
        edge_threshold: 50.0,
        trigger_throttle_ms: 0,
        retry_base_delay_ms: 2,
        retry_cap_delay_ms: 20,
        eviction_buffer: 5,
        ..EngineConfig::default()
    }
}

fn build_rig(config: EngineConfig, source: FixtureSource) -> Rig {
    let source = Arc::new(source);
    let viewport = TestViewport::new(VIEWPORT_EXTENT);
    let renderer = RecordingRenderer::with_layout(&viewport, ROW_HEIGHT);
    let (engine, events) = HistoryEngine::new(
        config,
        Arc::clone(&source) as Arc<dyn MessageSource>,
        Box::new(renderer.clone()),
        Box::new(viewport.clone()),
    );

    Rig {
        engine,
        events,
        source,
        renderer,
        viewport,
    }
}

fn scroll_input(offset: f32, content_extent: f32) -> ScrollInput {
    ScrollInput {
        offset,
        content_extent,
        viewport_extent: VIEWPORT_EXTENT,
    }
}

/// Feeds the post-load programmatic echo plus a user glide to the top edge.
fn glide_to_top(rig: &mut Rig) {
    let content = rig.viewport.content_extent_now();
    let bottom = (content - VIEWPORT_EXTENT).max(0.0);
    rig.engine.on_scroll(scroll_input(bottom, content));
    rig.engine.on_scroll(scroll_input(bottom / 2.0, content));
    rig.engine.on_scroll(scroll_input(10.0, content));
}

fn fail_scenario(scenario: &'static str, stage: &'static str, reason: String) -> RunnerError {
    RunnerError::ScenarioFailed {
        stage,
        scenario,
        reason,
    }
}

async fn run_initial_load() -> RunnerResult<()> {
    let (source, conversation_id) = FixtureSource::seeded(200, 1_000, 10);
    let mut rig = build_rig(runner_config(), source);

    rig.engine.open_conversation(conversation_id);
    rig.engine.settle().await;

    let request_count = rig.source.request_count();
    let cached = rig.engine.cache().len();
    let pinned_offset = rig.viewport.offset_now();
    let expected_offset = 30.0 * ROW_HEIGHT - VIEWPORT_EXTENT;
    let replace_dispatched = matches!(
        rig.renderer.calls().first(),
        Some(RenderCall::Batch {
            mode: RenderMode::Replace,
            messages
        }) if messages.len() == 30
    );
    let state = rig
        .engine
        .pagination_state()
        .cloned()
        .context(ScenarioFailedSnafu {
            stage: "scenario-initial-load-state",
            scenario: "initial_load",
            reason: "pagination state missing after open".to_string(),
        })?;

    println!("request_count={request_count}");
    println!("cached={cached}");
    println!("replace_dispatched={replace_dispatched}");
    println!("has_more_before={}", state.has_more_before);
    println!("has_more_after={}", state.has_more_after);
    println!("pinned_offset={pinned_offset}");

    if request_count != 1 || cached != 30 || !replace_dispatched {
        return Err(fail_scenario(
            "initial_load",
            "scenario-initial-load-assert",
            format!("expected one request replacing 30 messages, got request_count={request_count} cached={cached}"),
        ));
    }
    if !state.has_more_before || state.has_more_after {
        return Err(fail_scenario(
            "initial_load",
            "scenario-initial-load-assert-flags",
            "newest-page open must leave only the before side loadable".to_string(),
        ));
    }
    if (pinned_offset - expected_offset).abs() > 0.5 {
        return Err(fail_scenario(
            "initial_load",
            "scenario-initial-load-assert-pin",
            format!("expected viewport pinned at {expected_offset}, got {pinned_offset}"),
        ));
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_older_load() -> RunnerResult<()> {
    let (source, conversation_id) = FixtureSource::seeded(200, 1_000, 10);
    let mut rig = build_rig(runner_config(), source);

    rig.engine.open_conversation(conversation_id);
    rig.engine.settle().await;
    let offset_before = rig.viewport.offset_now();

    glide_to_top(&mut rig);
    rig.engine.settle().await;

    let cached = rig.engine.cache().len();
    let keys: Vec<i64> = rig.engine.cache().keys().map(|key| key.as_i64()).collect();
    let contiguous = keys.windows(2).all(|pair| pair[1] - pair[0] == 10);
    let prepend_dispatched = matches!(
        rig.renderer.calls().last(),
        Some(RenderCall::Batch {
            mode: RenderMode::Prepend,
            messages
        }) if messages.len() == 30
    );
    let corrected_offset = rig.viewport.offset_now();
    let expected_offset = offset_before + 30.0 * ROW_HEIGHT;

    println!("cached={cached}");
    println!("contiguous={contiguous}");
    println!("prepend_dispatched={prepend_dispatched}");
    println!("offset_before={offset_before}");
    println!("corrected_offset={corrected_offset}");

    if cached != 60 || !contiguous || !prepend_dispatched {
        return Err(fail_scenario(
            "older_load",
            "scenario-older-load-assert",
            format!("expected a contiguous 60-message cache after one prepend, got cached={cached}"),
        ));
    }
    if (corrected_offset - expected_offset).abs() > 0.5 {
        return Err(fail_scenario(
            "older_load",
            "scenario-older-load-assert-anchor",
            format!("expected anchor-corrected offset {expected_offset}, got {corrected_offset}"),
        ));
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_exhaustion() -> RunnerResult<()> {
    let (source, conversation_id) = FixtureSource::seeded(40, 1_000, 10);
    let mut rig = build_rig(runner_config(), source);

    rig.engine.open_conversation(conversation_id);
    rig.engine.settle().await;
    glide_to_top(&mut rig);
    rig.engine.settle().await;

    let requests_after_drain = rig.source.request_count();
    let has_more_before = rig
        .engine
        .pagination_state()
        .map(|state| state.has_more_before)
        .unwrap_or(true);

    glide_to_top(&mut rig);
    rig.engine.on_sentinel_visible(Edge::Top);
    rig.engine.settle().await;
    let requests_after_triggers = rig.source.request_count();

    println!("requests_after_drain={requests_after_drain}");
    println!("has_more_before={has_more_before}");
    println!("requests_after_triggers={requests_after_triggers}");

    if has_more_before || requests_after_drain != 2 || requests_after_triggers != 2 {
        return Err(fail_scenario(
            "exhaustion",
            "scenario-exhaustion-assert",
            format!(
                "expected no further requests after exhaustion, got {requests_after_triggers}"
            ),
        ));
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_single_flight() -> RunnerResult<()> {
    let (source, conversation_id) = FixtureSource::seeded(200, 1_000, 10);
    let mut rig = build_rig(runner_config(), source);

    rig.engine.open_conversation(conversation_id);
    rig.engine.settle().await;

    // Repeated triggers while the older load is still in flight.
    glide_to_top(&mut rig);
    rig.engine.on_sentinel_visible(Edge::Top);
    glide_to_top(&mut rig);
    rig.engine.settle().await;

    let request_count = rig.source.request_count();
    println!("request_count={request_count}");

    if request_count != 2 {
        return Err(fail_scenario(
            "single_flight",
            "scenario-single-flight-assert",
            format!("expected exactly one older request, got {}", request_count - 1),
        ));
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_stale_discard() -> RunnerResult<()> {
    let mut source = FixtureSource::new();
    let conversation_a = source.seed_conversation(50, 1_000, 10);
    let conversation_b = source.seed_conversation(50, 500_000, 10);
    let mut rig = build_rig(runner_config(), source);

    rig.engine.open_conversation(conversation_a);
    rig.engine.open_conversation(conversation_b);
    rig.engine.settle().await;
    // A's completion may land after B's; give it a bounded window so the
    // stale-discard path definitely runs before asserting.
    let _ = tokio::time::timeout(
        std::time::Duration::from_millis(200),
        rig.engine.pump_one(),
    )
    .await;

    let active_ok = rig.engine.conversation_id() == Some(conversation_b);
    let cache_pure = rig
        .engine
        .cache()
        .keys()
        .all(|key| key.as_i64() >= 500_000);
    let loaded_events = rig
        .events
        .drain()
        .into_iter()
        .filter(|event| matches!(event, EngineEvent::MessagesLoaded { .. }))
        .count();

    println!("active_ok={active_ok}");
    println!("cache_pure={cache_pure}");
    println!("loaded_events={loaded_events}");

    if !active_ok || !cache_pure || loaded_events != 1 {
        return Err(fail_scenario(
            "stale_discard",
            "scenario-stale-discard-assert",
            "stale completion leaked into cache or events".to_string(),
        ));
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_retry_backoff() -> RunnerResult<()> {
    let (source, conversation_id) = FixtureSource::seeded(100, 1_000, 10);
    source.plan_failures([PlannedFailure::Network, PlannedFailure::ServerFault(503)]);
    let mut rig = build_rig(runner_config(), source);

    rig.engine.open_conversation(conversation_id);
    rig.engine.settle().await;

    let ready = rig
        .engine
        .pagination_state()
        .map(|state| state.load_state == LoadState::Ready)
        .unwrap_or(false);
    let cached = rig.engine.cache().len();
    let retry_attempts: Vec<u32> = rig
        .events
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            EngineEvent::LoadFailed {
                attempt,
                will_retry: true,
                ..
            } => Some(attempt),
            _ => None,
        })
        .collect();

    println!("ready={ready}");
    println!("cached={cached}");
    println!(
        "retry_attempts={}",
        retry_attempts
            .iter()
            .map(|attempt| attempt.to_string())
            .collect::<Vec<_>>()
            .join(",")
    );

    if !ready || cached != 30 || retry_attempts != vec![1, 2] {
        return Err(fail_scenario(
            "retry_backoff",
            "scenario-retry-backoff-assert",
            "transient failures did not retry transparently to success".to_string(),
        ));
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_client_error_reset() -> RunnerResult<()> {
    let (source, conversation_id) = FixtureSource::seeded(100, 1_000, 10);
    source.plan_failures([PlannedFailure::ClientRequest(400)]);
    let mut rig = build_rig(runner_config(), source);

    rig.engine.open_conversation(conversation_id);
    rig.engine.settle().await;

    let attempts_spent = rig.source.request_count();
    let failed = matches!(
        rig.engine.pagination_state().map(|state| &state.load_state),
        Some(LoadState::Failed { .. })
    );
    let cursors_cleared = rig
        .engine
        .pagination_state()
        .map(|state| state.before_cursor.is_none() && state.after_cursor.is_none())
        .unwrap_or(false);

    rig.engine.retry_failed();
    rig.engine.settle().await;
    let recovered = rig.engine.cache().len();

    println!("attempts_spent={attempts_spent}");
    println!("failed={failed}");
    println!("cursors_cleared={cursors_cleared}");
    println!("recovered_cache={recovered}");

    if attempts_spent != 1 || !failed || !cursors_cleared || recovered != 30 {
        return Err(fail_scenario(
            "client_error_reset",
            "scenario-client-error-reset-assert",
            "4xx rejection must fail fast, reset cursors, and recover on manual retry".to_string(),
        ));
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_incoming_autoscroll() -> RunnerResult<()> {
    let (source, conversation_id) = FixtureSource::seeded(200, 1_000, 10);
    let mut rig = build_rig(runner_config(), source);

    rig.engine.open_conversation(conversation_id);
    rig.engine.settle().await;

    // Reading older history: the viewport must not move.
    let content = rig.viewport.content_extent_now();
    rig.engine
        .on_scroll(scroll_input(content - VIEWPORT_EXTENT, content));
    rig.engine.on_scroll(scroll_input(60.0, content));
    let offset_before = rig.viewport.offset_now();

    let while_reading = fixture_message(conversation_id, 999_000);
    rig.engine.insert_incoming(while_reading.clone()).await;

    let offset_unmoved = (rig.viewport.offset_now() - offset_before).abs() < 0.5;
    let arrival_quiet = rig.events.drain().iter().any(|event| {
        matches!(
            event,
            EngineEvent::MessageArrived {
                auto_scroll: false,
                ..
            }
        )
    });

    println!("offset_unmoved={offset_unmoved}");
    println!("arrival_quiet={arrival_quiet}");

    if !offset_unmoved || !arrival_quiet {
        return Err(fail_scenario(
            "incoming_autoscroll",
            "scenario-incoming-autoscroll-assert",
            "arrival while reading history moved the viewport".to_string(),
        ));
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_eviction() -> RunnerResult<()> {
    let (source, conversation_id) = FixtureSource::seeded(300, 1_000, 10);
    let config = EngineConfig {
        max_cache_size: 60,
        ..runner_config()
    };
    let mut rig = build_rig(config, source);

    rig.engine.open_conversation(conversation_id);
    rig.engine.settle().await;
    glide_to_top(&mut rig);
    rig.engine.settle().await;
    glide_to_top(&mut rig);
    rig.engine.settle().await;

    let cached = rig.engine.cache().len();
    let oldest_key = rig
        .engine
        .cache()
        .oldest_key()
        .map(|key| key.as_i64())
        .unwrap_or(0);
    let expected_oldest = 1_000 + (300 - 90) * 10;
    let replace_after_eviction = matches!(
        rig.renderer.calls().last(),
        Some(RenderCall::Batch {
            mode: RenderMode::Replace,
            ..
        })
    );

    println!("cached={cached}");
    println!("oldest_key={oldest_key}");
    println!("replace_after_eviction={replace_after_eviction}");

    if cached != 60 || oldest_key != expected_oldest || !replace_after_eviction {
        return Err(fail_scenario(
            "eviction",
            "scenario-eviction-assert",
            format!(
                "expected a 60-entry cache anchored at {expected_oldest}, got cached={cached} oldest={oldest_key}"
            ),
        ));
    }

    println!("runner_ok=true");
    Ok(())
}
