//! Where a new overlay's primitives go in the draw order.
//!
//! Top-tier overlays are inserted just below the foreground marker. Bottom-tier overlays
//! are inserted below the first primitive of the earliest-activated top-tier overlay, so
//! the bottom tier always stays under the top tier.

use layers::{OverlayKind, Tier};

use crate::registry::ActiveOverlay;

/// Primitive separating overlays from foreground content (labels, vessel markers).
pub const FOREGROUND_MARKER_ID: &str = "woce-foreground-marker";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementError {
    /// The top-tier overlay that should anchor `kind` has no primitives.
    NoValidAnchor { kind: OverlayKind, blocking: OverlayKind },
}

impl std::fmt::Display for PlacementError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlacementError::NoValidAnchor { kind, blocking } => {
                write!(f, "no anchor for {kind}: {blocking} has no primitives")
            }
        }
    }
}

impl std::error::Error for PlacementError {}

/// `active` is in activation order.
pub fn resolve_anchor(kind: OverlayKind, active: &[&ActiveOverlay]) -> Result<String, PlacementError> {
    if kind.tier() == Tier::Top {
        return Ok(FOREGROUND_MARKER_ID.to_string());
    }
    let Some(top) = active.iter().find(|o| o.kind.tier() == Tier::Top) else {
        return Ok(FOREGROUND_MARKER_ID.to_string());
    };
    top.primitive_ids
        .first()
        .cloned()
        .ok_or(PlacementError::NoValidAnchor {
            kind,
            blocking: top.kind,
        })
}
