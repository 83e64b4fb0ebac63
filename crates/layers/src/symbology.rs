//! Per-kind styles with their declared defaults.
//!
//! Each style's `Default` is the contract for omitted configuration fields; `from_config`
//! overlays whatever the panel supplied.

use crate::config::{GradientStop, OverlayConfiguration};
use crate::error::BuildError;
use crate::kind::OverlayKind;
use crate::units::SpeedUnit;

fn visible(config: &OverlayConfiguration) -> Result<bool, BuildError> {
    config.flag_or("visible", true)
}

fn opacity(config: &OverlayConfiguration, default: f64) -> Result<f64, BuildError> {
    config.ranged_or("opacity", default, 0.0, 1.0)
}

fn width(config: &OverlayConfiguration, key: &str, default: f64) -> Result<f64, BuildError> {
    config.ranged_or(key, default, 0.0, 64.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindStyle {
    pub opacity: f64,
    pub fade_duration_ms: f64,
    pub resampling: String,
    pub visible: bool,
}

impl Default for WindStyle {
    fn default() -> Self {
        Self {
            opacity: 0.8,
            fade_duration_ms: 0.0,
            resampling: "linear".to_string(),
            visible: true,
        }
    }
}

impl WindStyle {
    pub fn from_config(config: &OverlayConfiguration) -> Result<Self, BuildError> {
        let d = Self::default();
        let resampling = config.text_or("resampling", &d.resampling)?;
        if resampling != "linear" && resampling != "nearest" {
            return Err(BuildError::invalid_value("resampling", "linear or nearest"));
        }
        Ok(Self {
            opacity: opacity(config, d.opacity)?,
            fade_duration_ms: config.ranged_or("fadeDuration", d.fade_duration_ms, 0.0, 10_000.0)?,
            resampling,
            visible: visible(config)?,
        })
    }
}

const SWELL_STOPS: &[(&str, &str)] = &[
    ("0m", "#e0f3ff"),
    ("0.5m", "#9ecae1"),
    ("1m", "#4292c6"),
    ("2m", "#2171b5"),
    ("4m", "#08519c"),
    ("6m", "#08306b"),
    ("10m+", "#3f007d"),
];

const PRESSURE_STOPS: &[(&str, &str)] = &[
    ("960hPa", "#542788"),
    ("980hPa", "#8073ac"),
    ("1000hPa", "#d8daeb"),
    ("1013hPa", "#f7f7f7"),
    ("1020hPa", "#fee0b6"),
    ("1030hPa", "#e08214"),
    ("1040hPa+", "#b35806"),
];

/// Filled field colored by a numeric feature property (swell height, sea-level pressure).
#[derive(Debug, Clone, PartialEq)]
pub struct GradientFillStyle {
    /// Feature property the ramp reads.
    pub field: &'static str,
    pub stops: Vec<GradientStop>,
    pub opacity: f64,
    pub antialias: bool,
    pub visible: bool,
}

impl GradientFillStyle {
    pub fn default_for(kind: OverlayKind) -> Result<Self, BuildError> {
        let (field, stops, opacity) = match kind {
            OverlayKind::Swell => ("swh", SWELL_STOPS, 0.7),
            OverlayKind::PressureGradient => ("msl", PRESSURE_STOPS, 0.6),
            other => return Err(BuildError::UnsupportedKind(other.as_str().to_string())),
        };
        Ok(Self {
            field,
            stops: stops.iter().map(|(t, c)| GradientStop::new(*t, *c)).collect(),
            opacity,
            antialias: false,
            visible: true,
        })
    }

    pub fn from_config(kind: OverlayKind, config: &OverlayConfiguration) -> Result<Self, BuildError> {
        let d = Self::default_for(kind)?;
        let defaults: Vec<(&str, &str)> = d
            .stops
            .iter()
            .map(|s| (s.threshold.as_str(), s.color.as_str()))
            .collect();
        Ok(Self {
            field: d.field,
            stops: config.stops_or("gradient", &defaults)?,
            opacity: opacity(config, d.opacity)?,
            antialias: config.flag_or("antialias", d.antialias)?,
            visible: visible(config)?,
        })
    }
}

/// Isobars: a dark casing under a light line.
#[derive(Debug, Clone, PartialEq)]
pub struct IsobarStyle {
    pub line_color: String,
    pub line_width: f64,
    pub casing_color: String,
    pub casing_width: f64,
    pub opacity: f64,
    pub visible: bool,
}

impl Default for IsobarStyle {
    fn default() -> Self {
        Self {
            line_color: "#ffffff".to_string(),
            line_width: 1.2,
            casing_color: "#1b1b1b".to_string(),
            casing_width: 1.0,
            opacity: 0.9,
            visible: true,
        }
    }
}

impl IsobarStyle {
    pub fn from_config(config: &OverlayConfiguration) -> Result<Self, BuildError> {
        let d = Self::default();
        Ok(Self {
            line_color: config.text_or("lineColor", &d.line_color)?,
            line_width: width(config, "lineWidth", d.line_width)?,
            casing_color: config.text_or("casingColor", &d.casing_color)?,
            casing_width: width(config, "casingWidth", d.casing_width)?,
            opacity: opacity(config, d.opacity)?,
            visible: visible(config)?,
        })
    }
}

/// Ocean current streamlines, optionally animated.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentStyle {
    pub line_color: String,
    pub line_width: f64,
    pub border_color: String,
    pub border_width: f64,
    pub opacity: f64,
    pub animation_enabled: bool,
    /// Cycles per second.
    pub animation_speed: f64,
    pub animation_distance_px: f64,
    pub visible: bool,
}

impl Default for CurrentStyle {
    fn default() -> Self {
        Self {
            line_color: "#00c2ff".to_string(),
            line_width: 1.5,
            border_color: "#003a4d".to_string(),
            border_width: 1.0,
            opacity: 0.85,
            animation_enabled: false,
            animation_speed: 0.5,
            animation_distance_px: 12.0,
            visible: true,
        }
    }
}

impl CurrentStyle {
    pub fn from_config(config: &OverlayConfiguration) -> Result<Self, BuildError> {
        let d = Self::default();
        Ok(Self {
            line_color: config.text_or("lineColor", &d.line_color)?,
            line_width: width(config, "lineWidth", d.line_width)?,
            border_color: config.text_or("borderColor", &d.border_color)?,
            border_width: width(config, "borderWidth", d.border_width)?,
            opacity: opacity(config, d.opacity)?,
            animation_enabled: config.flag_or("animationEnabled", d.animation_enabled)?,
            animation_speed: config.ranged_or("animationSpeed", d.animation_speed, 0.0, 10.0)?,
            animation_distance_px: config.ranged_or(
                "animationDistance",
                d.animation_distance_px,
                0.0,
                256.0,
            )?,
            visible: visible(config)?,
        })
    }
}

/// Wind arrows with speed labels.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolStyle {
    pub unit: SpeedUnit,
    pub text_size: f64,
    pub text_color: String,
    pub halo_color: String,
    pub halo_width: f64,
    pub icon_image: String,
    pub icon_size: f64,
    pub allow_overlap: bool,
    pub visible: bool,
}

impl Default for SymbolStyle {
    fn default() -> Self {
        Self {
            unit: SpeedUnit::Knots,
            text_size: 12.0,
            text_color: "#ffffff".to_string(),
            halo_color: "#000000".to_string(),
            halo_width: 1.0,
            icon_image: "wind-arrow".to_string(),
            icon_size: 0.8,
            allow_overlap: false,
            visible: true,
        }
    }
}

impl SymbolStyle {
    pub fn from_config(config: &OverlayConfiguration) -> Result<Self, BuildError> {
        let d = Self::default();
        Ok(Self {
            unit: config.text_or("unit", d.unit.as_str())?.parse()?,
            text_size: config.ranged_or("textSize", d.text_size, 1.0, 96.0)?,
            text_color: config.text_or("textColor", &d.text_color)?,
            halo_color: config.text_or("haloColor", &d.halo_color)?,
            halo_width: width(config, "haloWidth", d.halo_width)?,
            icon_image: config.text_or("iconImage", &d.icon_image)?,
            icon_size: config.ranged_or("iconSize", d.icon_size, 0.0, 10.0)?,
            allow_overlap: config.flag_or("allowOverlap", d.allow_overlap)?,
            visible: visible(config)?,
        })
    }
}

/// Clustered navigational marks.
#[derive(Debug, Clone, PartialEq)]
pub struct NauticalStyle {
    pub cluster_color: String,
    pub point_color: String,
    pub point_radius: f64,
    pub cluster_radius: u32,
    pub cluster_max_zoom: u8,
    pub visible: bool,
}

impl Default for NauticalStyle {
    fn default() -> Self {
        Self {
            cluster_color: "#f28cb1".to_string(),
            point_color: "#11b4da".to_string(),
            point_radius: 5.0,
            cluster_radius: 50,
            cluster_max_zoom: 14,
            visible: true,
        }
    }
}

impl NauticalStyle {
    pub fn from_config(config: &OverlayConfiguration) -> Result<Self, BuildError> {
        let d = Self::default();
        Ok(Self {
            cluster_color: config.text_or("clusterColor", &d.cluster_color)?,
            point_color: config.text_or("pointColor", &d.point_color)?,
            point_radius: width(config, "pointRadius", d.point_radius)?,
            cluster_radius: config.ranged_or("clusterRadius", f64::from(d.cluster_radius), 1.0, 512.0)?
                .round() as u32,
            cluster_max_zoom: config.ranged_or("clusterMaxZoom", f64::from(d.cluster_max_zoom), 0.0, 22.0)?
                .round() as u8,
            visible: visible(config)?,
        })
    }
}

/// Tropical cyclone tracks: four bordered track segments plus fix points.
#[derive(Debug, Clone, PartialEq)]
pub struct CycloneStyle {
    pub past_color: String,
    pub forecast_color: String,
    pub ensemble_color: String,
    pub boundary_color: String,
    pub line_width: f64,
    pub border_color: String,
    pub border_width: f64,
    pub point_color: String,
    pub point_radius: f64,
    /// Show systems flagged as under investigation.
    pub include_investigations: bool,
    pub visible: bool,
}

impl Default for CycloneStyle {
    fn default() -> Self {
        Self {
            past_color: "#ff4d4d".to_string(),
            forecast_color: "#ffa64d".to_string(),
            ensemble_color: "#ffd24d".to_string(),
            boundary_color: "#ffffff".to_string(),
            line_width: 2.0,
            border_color: "#000000".to_string(),
            border_width: 1.0,
            point_color: "#ff4d4d".to_string(),
            point_radius: 4.0,
            include_investigations: false,
            visible: true,
        }
    }
}

impl CycloneStyle {
    pub fn from_config(config: &OverlayConfiguration) -> Result<Self, BuildError> {
        let d = Self::default();
        Ok(Self {
            past_color: config.text_or("pastColor", &d.past_color)?,
            forecast_color: config.text_or("forecastColor", &d.forecast_color)?,
            ensemble_color: config.text_or("ensembleColor", &d.ensemble_color)?,
            boundary_color: config.text_or("boundaryColor", &d.boundary_color)?,
            line_width: width(config, "lineWidth", d.line_width)?,
            border_color: config.text_or("borderColor", &d.border_color)?,
            border_width: width(config, "borderWidth", d.border_width)?,
            point_color: config.text_or("pointColor", &d.point_color)?,
            point_radius: width(config, "pointRadius", d.point_radius)?,
            include_investigations: config
                .flag_or("includeInvestigations", d.include_investigations)?,
            visible: visible(config)?,
        })
    }
}
