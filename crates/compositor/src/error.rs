use credentials::CredentialError;
use layers::{BuildError, OverlayKind};
use runtime::NoticeLevel;

use crate::placement::PlacementError;
use crate::provider::ProviderError;
use crate::surface::SurfaceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    Build(BuildError),
    Credential(CredentialError),
    Provider(ProviderError),
    Placement(PlacementError),
    Surface(SurfaceError),
    /// The operation needs an active overlay of this kind.
    NotActive(OverlayKind),
    /// The kind is mid-transition.
    Busy(OverlayKind),
}

impl EngineError {
    pub fn notice_level(&self) -> NoticeLevel {
        match self {
            EngineError::NotActive(_) | EngineError::Busy(_) => NoticeLevel::Warning,
            _ => NoticeLevel::Error,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Build(e) => write!(f, "invalid overlay configuration: {e}"),
            EngineError::Credential(e) => write!(f, "could not obtain tile credential: {e}"),
            EngineError::Provider(e) => write!(f, "{e}"),
            EngineError::Placement(e) => write!(f, "{e}"),
            EngineError::Surface(e) => write!(f, "{e}"),
            EngineError::NotActive(kind) => write!(f, "{kind} overlay is not active"),
            EngineError::Busy(kind) => write!(f, "{kind} overlay is changing state; try again"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Build(e) => Some(e),
            EngineError::Credential(e) => Some(e),
            EngineError::Provider(e) => Some(e),
            EngineError::Placement(e) => Some(e),
            EngineError::Surface(e) => Some(e),
            EngineError::NotActive(_) | EngineError::Busy(_) => None,
        }
    }
}

impl From<BuildError> for EngineError {
    fn from(e: BuildError) -> Self {
        EngineError::Build(e)
    }
}

impl From<CredentialError> for EngineError {
    fn from(e: CredentialError) -> Self {
        EngineError::Credential(e)
    }
}

impl From<ProviderError> for EngineError {
    fn from(e: ProviderError) -> Self {
        EngineError::Provider(e)
    }
}

impl From<PlacementError> for EngineError {
    fn from(e: PlacementError) -> Self {
        EngineError::Placement(e)
    }
}

impl From<SurfaceError> for EngineError {
    fn from(e: SurfaceError) -> Self {
        EngineError::Surface(e)
    }
}
