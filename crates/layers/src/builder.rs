//! Overlay descriptor builder: `(kind, configuration)` to render-primitive descriptions.
//!
//! Pure. Every omitted configuration field falls back to the style default of its kind,
//! so an empty configuration always builds.

use serde_json::json;

use crate::config::OverlayConfiguration;
use crate::cyclone;
use crate::descriptor::{
    AnimationSpec, OverlayDescriptor, PrimitiveDescriptor, PrimitiveType, SourceDescriptor,
    SubRole,
};
use crate::error::BuildError;
use crate::gradient::color_ramp;
use crate::kind::OverlayKind;
use crate::symbology::{
    CurrentStyle, CycloneStyle, GradientFillStyle, IsobarStyle, NauticalStyle, SymbolStyle,
    WindStyle,
};
use crate::units::speed_text_expression;

pub const RASTER_TILE_SIZE: u32 = 256;

/// Feature property carrying wind speed in m/s.
pub const SPEED_FIELD: &str = "speed";
/// Feature property carrying wind direction in degrees.
pub const DIRECTION_FIELD: &str = "direction";

pub fn build(kind: OverlayKind, config: &OverlayConfiguration) -> Result<OverlayDescriptor, BuildError> {
    let (source, primitives, animation) = match kind {
        OverlayKind::Wind => (SourceDescriptor::raster(RASTER_TILE_SIZE), wind(config)?, None),
        OverlayKind::Swell | OverlayKind::PressureGradient => {
            (SourceDescriptor::vector(), gradient_fill(kind, config)?, None)
        }
        OverlayKind::Pressure => (SourceDescriptor::vector(), isobars(config)?, None),
        OverlayKind::Current => {
            let style = CurrentStyle::from_config(config)?;
            let animation = AnimationSpec {
                property: "line-translate".to_string(),
                roles: vec![SubRole::Border, SubRole::Line],
                distance_px: style.animation_distance_px,
                enabled: style.animation_enabled,
                speed: style.animation_speed,
            };
            (SourceDescriptor::vector(), currents(&style), Some(animation))
        }
        OverlayKind::Symbol => (SourceDescriptor::vector(), symbols(config)?, None),
        OverlayKind::Nautical => {
            let style = NauticalStyle::from_config(config)?;
            (
                SourceDescriptor::clustered(style.cluster_radius, style.cluster_max_zoom),
                nautical(&style),
                None,
            )
        }
        OverlayKind::CycloneTrack => (
            SourceDescriptor::vector(),
            cyclone::primitives(&CycloneStyle::from_config(config)?),
            None,
        ),
    };

    Ok(OverlayDescriptor {
        kind,
        source,
        primitives,
        animation,
    })
}

fn wind(config: &OverlayConfiguration) -> Result<Vec<PrimitiveDescriptor>, BuildError> {
    let style = WindStyle::from_config(config)?;
    Ok(vec![
        PrimitiveDescriptor::new(SubRole::Raster, PrimitiveType::Raster)
            .paint("raster-opacity", style.opacity)
            .paint("raster-fade-duration", style.fade_duration_ms)
            .paint("raster-resampling", style.resampling)
            .visible(style.visible),
    ])
}

fn gradient_fill(
    kind: OverlayKind,
    config: &OverlayConfiguration,
) -> Result<Vec<PrimitiveDescriptor>, BuildError> {
    let style = GradientFillStyle::from_config(kind, config)?;
    let ramp = color_ramp(json!(["get", style.field]), &style.stops)?;
    Ok(vec![
        PrimitiveDescriptor::new(SubRole::Fill, PrimitiveType::Fill)
            .paint("fill-color", ramp)
            .paint("fill-opacity", style.opacity)
            .paint("fill-antialias", style.antialias)
            .visible(style.visible),
    ])
}

fn line_pair(
    border_color: &str,
    border_width: f64,
    line_color: &str,
    line_width: f64,
    opacity: f64,
    visible: bool,
) -> Vec<PrimitiveDescriptor> {
    let border = PrimitiveDescriptor::new(SubRole::Border, PrimitiveType::Line)
        .paint("line-color", border_color)
        .paint("line-width", line_width + 2.0 * border_width)
        .paint("line-opacity", opacity)
        .layout("line-join", "round")
        .layout("line-cap", "round")
        .visible(visible);
    let line = PrimitiveDescriptor::new(SubRole::Line, PrimitiveType::Line)
        .paint("line-color", line_color)
        .paint("line-width", line_width)
        .paint("line-opacity", opacity)
        .layout("line-join", "round")
        .layout("line-cap", "round")
        .visible(visible);
    vec![border, line]
}

fn isobars(config: &OverlayConfiguration) -> Result<Vec<PrimitiveDescriptor>, BuildError> {
    let s = IsobarStyle::from_config(config)?;
    Ok(line_pair(
        &s.casing_color,
        s.casing_width,
        &s.line_color,
        s.line_width,
        s.opacity,
        s.visible,
    ))
}

fn currents(s: &CurrentStyle) -> Vec<PrimitiveDescriptor> {
    line_pair(
        &s.border_color,
        s.border_width,
        &s.line_color,
        s.line_width,
        s.opacity,
        s.visible,
    )
}

fn symbols(config: &OverlayConfiguration) -> Result<Vec<PrimitiveDescriptor>, BuildError> {
    let s = SymbolStyle::from_config(config)?;
    Ok(vec![
        PrimitiveDescriptor::new(SubRole::Label, PrimitiveType::Symbol)
            .layout("text-field", speed_text_expression(SPEED_FIELD, s.unit))
            .layout("text-size", s.text_size)
            .layout("text-offset", json!([0.0, 1.2]))
            .layout("text-anchor", "top")
            .layout("text-allow-overlap", s.allow_overlap)
            .layout("icon-image", s.icon_image)
            .layout("icon-size", s.icon_size)
            .layout("icon-rotate", json!(["get", DIRECTION_FIELD]))
            .layout("icon-rotation-alignment", "map")
            .layout("icon-allow-overlap", s.allow_overlap)
            .paint("text-color", s.text_color)
            .paint("text-halo-color", s.halo_color)
            .paint("text-halo-width", s.halo_width)
            .visible(s.visible),
    ])
}

fn nautical(s: &NauticalStyle) -> Vec<PrimitiveDescriptor> {
    let clustered = json!(["has", "point_count"]);
    vec![
        PrimitiveDescriptor::new(SubRole::Clusters, PrimitiveType::Circle)
            .filter(clustered.clone())
            .paint("circle-color", s.cluster_color.as_str())
            .paint(
                "circle-radius",
                json!(["step", ["get", "point_count"], 15, 10, 20, 50, 25]),
            )
            .visible(s.visible),
        PrimitiveDescriptor::new(SubRole::ClusterCount, PrimitiveType::Symbol)
            .filter(clustered)
            .layout("text-field", json!(["get", "point_count_abbreviated"]))
            .layout("text-size", 12.0)
            .visible(s.visible),
        PrimitiveDescriptor::new(SubRole::Points, PrimitiveType::Circle)
            .filter(json!(["!", ["has", "point_count"]]))
            .paint("circle-color", s.point_color.as_str())
            .paint("circle-radius", s.point_radius)
            .visible(s.visible),
    ]
}
