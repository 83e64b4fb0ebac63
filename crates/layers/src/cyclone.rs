//! Composite descriptor for tropical cyclone tracks.

use serde_json::{Value, json};

use crate::descriptor::{PrimitiveDescriptor, PrimitiveType, SubRole};
use crate::symbology::CycloneStyle;

/// Track segments, drawn bottom to top.
pub const SEGMENTS: [TrackSegment; 4] = [
    TrackSegment::Boundary,
    TrackSegment::Ensemble,
    TrackSegment::Forecast,
    TrackSegment::Past,
];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TrackSegment {
    Past,
    Forecast,
    Ensemble,
    Boundary,
}

impl TrackSegment {
    pub const fn as_str(self) -> &'static str {
        match self {
            TrackSegment::Past => "past",
            TrackSegment::Forecast => "forecast",
            TrackSegment::Ensemble => "ensemble",
            TrackSegment::Boundary => "boundary",
        }
    }

    fn color(self, style: &CycloneStyle) -> &str {
        match self {
            TrackSegment::Past => &style.past_color,
            TrackSegment::Forecast => &style.forecast_color,
            TrackSegment::Ensemble => &style.ensemble_color,
            TrackSegment::Boundary => &style.boundary_color,
        }
    }

    fn dash(self) -> Option<Value> {
        match self {
            TrackSegment::Past => None,
            TrackSegment::Forecast => Some(json!([2, 2])),
            TrackSegment::Ensemble => Some(json!([1, 2])),
            TrackSegment::Boundary => Some(json!([4, 2])),
        }
    }
}

/// Filter shared by every cyclone primitive. Features flagged `underInvestigation` are
/// hidden unless the panel opts in.
pub fn investigation_filter(include_investigations: bool) -> Option<Value> {
    if include_investigations {
        None
    } else {
        Some(json!(["!=", ["get", "underInvestigation"], true]))
    }
}

fn combine(own: Value, shared: &Option<Value>) -> Value {
    match shared {
        Some(shared) => json!(["all", own, shared]),
        None => own,
    }
}

pub fn primitives(style: &CycloneStyle) -> Vec<PrimitiveDescriptor> {
    let shared = investigation_filter(style.include_investigations);
    let mut out = Vec::with_capacity(SEGMENTS.len() * 2 + 1);

    for segment in SEGMENTS {
        let own = json!(["==", ["get", "segment"], segment.as_str()]);
        let filter = combine(own, &shared);

        let border = PrimitiveDescriptor::new(SubRole::Border, PrimitiveType::Line)
            .segment(segment.as_str())
            .filter(filter.clone())
            .paint("line-color", style.border_color.as_str())
            .paint("line-width", style.line_width + 2.0 * style.border_width)
            .layout("line-join", "round")
            .visible(style.visible);
        let mut line = PrimitiveDescriptor::new(SubRole::Line, PrimitiveType::Line)
            .segment(segment.as_str())
            .filter(filter)
            .paint("line-color", segment.color(style))
            .paint("line-width", style.line_width)
            .layout("line-join", "round")
            .visible(style.visible);
        if let Some(dash) = segment.dash() {
            line = line.paint("line-dasharray", dash);
        }
        out.push(border);
        out.push(line);
    }

    let points = PrimitiveDescriptor::new(SubRole::Points, PrimitiveType::Circle)
        .filter(combine(json!(["==", ["geometry-type"], "Point"]), &shared))
        .paint("circle-color", style.point_color.as_str())
        .paint("circle-radius", style.point_radius)
        .paint("circle-stroke-color", style.border_color.as_str())
        .paint("circle-stroke-width", style.border_width)
        .visible(style.visible);
    out.push(points);
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn four_bordered_segments_then_points() {
        let prims = primitives(&CycloneStyle::default());
        let tags: Vec<(Option<&str>, SubRole)> = prims
            .iter()
            .map(|p| (p.segment.as_deref(), p.role))
            .collect();
        assert_eq!(
            tags,
            vec![
                (Some("boundary"), SubRole::Border),
                (Some("boundary"), SubRole::Line),
                (Some("ensemble"), SubRole::Border),
                (Some("ensemble"), SubRole::Line),
                (Some("forecast"), SubRole::Border),
                (Some("forecast"), SubRole::Line),
                (Some("past"), SubRole::Border),
                (Some("past"), SubRole::Line),
                (None, SubRole::Points),
            ]
        );
    }

    #[test]
    fn investigations_hidden_by_default() {
        let prims = primitives(&CycloneStyle::default());
        let shared = json!(["!=", ["get", "underInvestigation"], true]);
        for p in &prims {
            let filter = p.filter.as_ref().unwrap();
            assert_eq!(filter[0], json!("all"));
            assert_eq!(filter[2], shared);
        }
    }

    #[test]
    fn investigations_included_on_request() {
        let style = CycloneStyle {
            include_investigations: true,
            ..CycloneStyle::default()
        };
        let prims = primitives(&style);
        assert_eq!(
            prims[7].filter,
            Some(json!(["==", ["get", "segment"], "past"]))
        );
        assert_eq!(prims[8].filter, Some(json!(["==", ["geometry-type"], "Point"])));
    }

    #[test]
    fn border_is_wider_than_line() {
        let prims = primitives(&CycloneStyle::default());
        assert_eq!(prims[0].paint["line-width"], json!(4.0));
        assert_eq!(prims[1].paint["line-width"], json!(2.0));
        assert_eq!(prims[7].paint["line-color"], json!("#ff4d4d"));
        assert!(!prims[7].paint.contains_key("line-dasharray"));
    }
}
