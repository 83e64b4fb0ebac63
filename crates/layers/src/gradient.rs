//! Piecewise color ramps built from panel-entered `{threshold, color}` pairs.

use serde_json::{Value, json};

use crate::config::GradientStop;
use crate::error::BuildError;

/// Parse a threshold label such as `"0.5m"`, `"10m+"` or `"1013 hPa"`.
///
/// A trailing unit suffix is stripped and the numeric prefix parsed. Anything that does
/// not leave a valid number is an error; labels are never coerced to zero.
pub fn parse_threshold(label: &str) -> Result<f64, BuildError> {
    let numeric = label
        .trim()
        .trim_end_matches(|c: char| !(c.is_ascii_digit() || c == '.'));
    if numeric.is_empty() {
        return Err(BuildError::invalid_threshold(label, "no numeric value"));
    }
    let value: f64 = numeric
        .parse()
        .map_err(|_| BuildError::invalid_threshold(label, "not a number"))?;
    if !value.is_finite() {
        return Err(BuildError::invalid_threshold(label, "not finite"));
    }
    Ok(value)
}

/// Parse every threshold, requiring a strictly ascending sequence.
pub fn parse_thresholds(stops: &[GradientStop]) -> Result<Vec<f64>, BuildError> {
    let mut out: Vec<f64> = Vec::with_capacity(stops.len());
    for stop in stops {
        let value = parse_threshold(&stop.threshold)?;
        if let Some(prev) = out.last() {
            if value <= *prev {
                return Err(BuildError::invalid_threshold(
                    &stop.threshold,
                    format!("must be greater than {prev}"),
                ));
            }
        }
        out.push(value);
    }
    Ok(out)
}

/// `["interpolate", ["linear"], input, t0, c0, t1, c1, ...]`.
pub fn color_ramp(input: Value, stops: &[GradientStop]) -> Result<Value, BuildError> {
    if stops.is_empty() {
        return Err(BuildError::invalid_threshold("", "gradient has no stops"));
    }
    let thresholds = parse_thresholds(stops)?;

    let mut expr = vec![json!("interpolate"), json!(["linear"]), input];
    for (stop, threshold) in stops.iter().zip(thresholds) {
        let color = stop.color.trim();
        if color.is_empty() {
            return Err(BuildError::invalid_value(
                format!("gradient[{}].color", stop.threshold),
                "a color",
            ));
        }
        expr.push(json!(threshold));
        expr.push(json!(color));
    }
    Ok(Value::Array(expr))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{color_ramp, parse_threshold, parse_thresholds};
    use crate::config::GradientStop;
    use crate::error::BuildError;

    fn stops(labels: &[&str]) -> Vec<GradientStop> {
        labels.iter().map(|l| GradientStop::new(*l, "#000")).collect()
    }

    #[test]
    fn strips_unit_suffixes() {
        assert_eq!(
            parse_thresholds(&stops(&["0m", "0.5m", "10m+"])).unwrap(),
            vec![0.0, 0.5, 10.0]
        );
        assert_eq!(parse_threshold("1013 hPa").unwrap(), 1013.0);
        assert_eq!(parse_threshold("-5°C").unwrap(), -5.0);
        assert_eq!(parse_threshold(" 42 ").unwrap(), 42.0);
    }

    #[test]
    fn malformed_threshold_is_an_error() {
        assert!(matches!(
            parse_threshold("abc"),
            Err(BuildError::InvalidThreshold { .. })
        ));
        assert!(matches!(
            parse_threshold("m5"),
            Err(BuildError::InvalidThreshold { .. })
        ));
        assert!(matches!(
            parse_threshold(""),
            Err(BuildError::InvalidThreshold { .. })
        ));
        assert!(parse_thresholds(&stops(&["0m", "abc"])).is_err());
    }

    #[test]
    fn thresholds_must_ascend() {
        let err = parse_thresholds(&stops(&["1m", "1m"])).unwrap_err();
        assert_eq!(
            err,
            BuildError::InvalidThreshold {
                label: "1m".into(),
                reason: "must be greater than 1".into()
            }
        );
    }

    #[test]
    fn ramp_interleaves_thresholds_and_colors() {
        let ramp = color_ramp(
            json!(["get", "swh"]),
            &[
                GradientStop::new("0m", "#e0f3ff"),
                GradientStop::new("2m", "#08519c"),
            ],
        )
        .unwrap();
        assert_eq!(
            ramp,
            json!([
                "interpolate",
                ["linear"],
                ["get", "swh"],
                0.0,
                "#e0f3ff",
                2.0,
                "#08519c"
            ])
        );
    }

    #[test]
    fn empty_ramp_is_rejected() {
        assert!(color_ramp(json!(["get", "x"]), &[]).is_err());
    }
}
