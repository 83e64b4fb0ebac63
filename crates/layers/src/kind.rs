use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Z-order partition. Every bottom-tier overlay renders beneath every top-tier one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Bottom,
    Top,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Shape {
    Raster,
    LinePair,
    Fill,
    SymbolText,
    PointCluster,
    /// Several sub-primitives sharing one source.
    Composite,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OverlayKind {
    Wind,
    Swell,
    Pressure,
    PressureGradient,
    CycloneTrack,
    Symbol,
    Current,
    Nautical,
}

impl OverlayKind {
    pub const ALL: [OverlayKind; 8] = [
        OverlayKind::Wind,
        OverlayKind::Swell,
        OverlayKind::Pressure,
        OverlayKind::PressureGradient,
        OverlayKind::CycloneTrack,
        OverlayKind::Symbol,
        OverlayKind::Current,
        OverlayKind::Nautical,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            OverlayKind::Wind => "wind",
            OverlayKind::Swell => "swell",
            OverlayKind::Pressure => "pressure",
            OverlayKind::PressureGradient => "pressureGradient",
            OverlayKind::CycloneTrack => "cycloneTrack",
            OverlayKind::Symbol => "symbol",
            OverlayKind::Current => "current",
            OverlayKind::Nautical => "nautical",
        }
    }

    pub const fn tier(self) -> Tier {
        match self {
            OverlayKind::Pressure
            | OverlayKind::CycloneTrack
            | OverlayKind::Symbol
            | OverlayKind::Nautical => Tier::Top,
            OverlayKind::Wind
            | OverlayKind::Swell
            | OverlayKind::PressureGradient
            | OverlayKind::Current => Tier::Bottom,
        }
    }

    pub const fn shape(self) -> Shape {
        match self {
            OverlayKind::Wind => Shape::Raster,
            OverlayKind::Swell | OverlayKind::PressureGradient => Shape::Fill,
            OverlayKind::Pressure | OverlayKind::Current => Shape::LinePair,
            OverlayKind::CycloneTrack => Shape::Composite,
            OverlayKind::Symbol => Shape::SymbolText,
            OverlayKind::Nautical => Shape::PointCluster,
        }
    }

    /// Layer reference on the tile/style provider.
    pub const fn layer_ref(self) -> &'static str {
        match self {
            OverlayKind::Wind => "wind-speed",
            OverlayKind::Swell => "swell-height",
            OverlayKind::Pressure => "pressure-isobars",
            OverlayKind::PressureGradient => "pressure-field",
            OverlayKind::CycloneTrack => "cyclone-tracks",
            OverlayKind::Symbol => "wind-symbols",
            OverlayKind::Current => "ocean-currents",
            OverlayKind::Nautical => "nautical-marks",
        }
    }

    /// Weather layers are licensed; nautical marks are public.
    pub const fn requires_credential(self) -> bool {
        !matches!(self, OverlayKind::Nautical)
    }

    pub const fn is_gradient(self) -> bool {
        matches!(self, OverlayKind::Swell | OverlayKind::PressureGradient)
    }

    pub fn source_id(self) -> String {
        format!("woce-{}-source", self.as_str())
    }

    pub fn primitive_id(self, suffix: &str) -> String {
        format!("woce-{}-{suffix}", self.as_str())
    }
}

impl std::fmt::Display for OverlayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverlayKind {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OverlayKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BuildError::UnsupportedKind(s.to_string()))
    }
}
