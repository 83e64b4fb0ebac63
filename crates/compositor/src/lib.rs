//! Keeps weather overlays on a rendering surface: ordered, idempotent and restorable.

pub mod engine;
pub mod error;
pub mod placement;
pub mod provider;
pub mod registry;
pub mod snapshot;
pub mod surface;

pub use engine::{
    ActivateOutcome, DeactivateOutcome, EngineConfig, OverlayEngine, ReconfigureReport,
};
pub use error::EngineError;
pub use placement::{FOREGROUND_MARKER_ID, PlacementError, resolve_anchor};
pub use provider::{HttpStyleProvider, ProviderError, StyleMetadata, StyleProvider};
pub use registry::{ActiveOverlay, OverlayRegistry, OverlayState, OverlaySummary};
pub use snapshot::SnapshotEntry;
pub use surface::{InMemorySurface, RenderSurface, SourceSpec, SurfaceError};
