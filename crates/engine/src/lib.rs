pub mod anchor;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod harness;
pub mod orchestrator;
pub mod viewport;

pub use anchor::{AnchorController, AnchorCorrection, ViewportHandle};
pub use cache::{KeepRange, MessageCache, UpsertOutcome};
pub use config::{
    ConfigError, ConfigStore, ConnectionClass, DeviceProfile, EngineConfig, MemoryClass,
    PointerClass,
};
pub use dispatch::{HistoryRenderer, RenderDispatcher, RenderMode};
pub use events::{EngineEvent, EngineEventStream};
pub use orchestrator::{
    HistoryEngine, LoadGeneration, LoadKind, LoadState, LoadTransition, LoadTransitionRejection,
    PaginationState,
};
pub use viewport::{
    Edge, ScrollDirection, ScrollInput, ScrollTelemetry, ViewportIntentDetector,
};
