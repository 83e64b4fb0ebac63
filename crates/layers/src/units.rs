//! Speed units for labels. Tile data carries speeds in metres per second.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::BuildError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedUnit {
    Mps,
    Kmh,
    Knots,
}

impl SpeedUnit {
    pub const ALL: [SpeedUnit; 3] = [SpeedUnit::Mps, SpeedUnit::Kmh, SpeedUnit::Knots];

    /// Value of one metre per second in this unit.
    pub const fn multiplier(self) -> f64 {
        match self {
            SpeedUnit::Mps => 1.0,
            SpeedUnit::Kmh => 3.6,
            SpeedUnit::Knots => 1.943844,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            SpeedUnit::Mps => "mps",
            SpeedUnit::Kmh => "kmh",
            SpeedUnit::Knots => "knots",
        }
    }

    pub const fn suffix(self) -> &'static str {
        match self {
            SpeedUnit::Mps => " m/s",
            SpeedUnit::Kmh => " km/h",
            SpeedUnit::Knots => " kt",
        }
    }

    pub fn from_mps(self, mps: f64) -> f64 {
        mps * self.multiplier()
    }

    pub fn to_mps(self, value: f64) -> f64 {
        value / self.multiplier()
    }
}

impl FromStr for SpeedUnit {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mps" | "m/s" => Ok(SpeedUnit::Mps),
            "kmh" | "km/h" | "kph" => Ok(SpeedUnit::Kmh),
            "knots" | "kt" | "kn" | "kts" => Ok(SpeedUnit::Knots),
            _ => Err(BuildError::invalid_value("unit", "one of mps, kmh, knots")),
        }
    }
}

pub fn convert(value: f64, from: SpeedUnit, to: SpeedUnit) -> f64 {
    if from == to {
        return value;
    }
    to.from_mps(from.to_mps(value))
}

/// Label text for a speed `field` (m/s) rendered in `unit`, rounded to one decimal.
pub fn speed_label(field: &str, unit: SpeedUnit) -> Value {
    json!([
        "concat",
        [
            "to-string",
            ["/", ["round", ["*", ["get", field], unit.multiplier() * 10.0]], 10]
        ],
        unit.suffix()
    ])
}

/// Render-time selection among the unit-converted labels, keyed by the chosen unit.
pub fn speed_text_expression(field: &str, selected: SpeedUnit) -> Value {
    let mut expr = vec![json!("match"), json!(selected.as_str())];
    for unit in SpeedUnit::ALL {
        expr.push(json!(unit.as_str()));
        expr.push(speed_label(field, unit));
    }
    expr.push(speed_label(field, SpeedUnit::Mps));
    Value::Array(expr)
}

#[cfg(test)]
mod tests {
    use super::{SpeedUnit, convert, speed_text_expression};
    use serde_json::json;

    #[test]
    fn ten_mps_in_other_units() {
        assert_eq!(convert(10.0, SpeedUnit::Mps, SpeedUnit::Kmh), 36.0);
        assert!((convert(10.0, SpeedUnit::Mps, SpeedUnit::Knots) - 19.4384).abs() < 0.001);
        assert_eq!(convert(10.0, SpeedUnit::Mps, SpeedUnit::Mps), 10.0);
    }

    #[test]
    fn multipliers_are_exact() {
        assert_eq!(SpeedUnit::Mps.multiplier(), 1.0);
        assert_eq!(SpeedUnit::Kmh.multiplier(), 3.6);
        assert_eq!(SpeedUnit::Knots.multiplier(), 1.943844);
    }

    #[test]
    fn converting_back_is_lossless_within_tolerance() {
        let kt = convert(36.0, SpeedUnit::Kmh, SpeedUnit::Knots);
        assert!((kt - 19.43844).abs() < 1e-9);
        let back = convert(kt, SpeedUnit::Knots, SpeedUnit::Kmh);
        assert!((back - 36.0).abs() < 1e-9);
    }

    #[test]
    fn parses_common_spellings() {
        assert_eq!("KT".parse(), Ok(SpeedUnit::Knots));
        assert_eq!("km/h".parse(), Ok(SpeedUnit::Kmh));
        assert!("furlongs".parse::<SpeedUnit>().is_err());
    }

    #[test]
    fn text_expression_branches_on_every_unit() {
        let expr = speed_text_expression("speed", SpeedUnit::Knots);
        let items = expr.as_array().unwrap();
        assert_eq!(items[0], json!("match"));
        assert_eq!(items[1], json!("knots"));
        assert_eq!(items[2], json!("mps"));
        assert_eq!(items[4], json!("kmh"));
        assert_eq!(items[6], json!("knots"));
        // match + input + 3 branches + fallback
        assert_eq!(items.len(), 2 + 3 * 2 + 1);
        assert_eq!(items[7][2], json!(" kt"));
    }
}
