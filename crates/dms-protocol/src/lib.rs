//! Shared machine-readable contracts for the DMS-Heatmap core.
//!
//! Everything in here is plain data: rows, tagged measurements, view rows and
//! the error taxonomy. The rendering/UI collaborator consumes these as JSON.

use serde::{Deserialize, Serialize};
use std::{error::Error, fmt, str::FromStr};

pub type BackgroundId = String;

/// The header names every dataset has to carry, in canonical order.
pub const REQUIRED_COLUMNS: [&str; 8] = [
    "target",
    "wildtype",
    "position",
    "mutant",
    "mutation",
    "bind",
    "delta_bind",
    "n_bc_bind",
];

/// A numeric cell that may be missing.
///
/// Missing data is a value of its own rather than a NaN, so every consumer has
/// to decide what to do with it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum Measurement {
    Defined(f64),
    #[default]
    Undefined,
}

impl Measurement {
    /// NaN and infinities are folded into `Undefined`; no statistic can use them.
    pub fn new(value: f64) -> Self {
        if !value.is_finite() {
            Self::Undefined
        } else {
            Self::Defined(value)
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Defined(v) => Some(*v),
            Self::Undefined => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Self::Defined(_))
    }
}

impl From<Option<f64>> for Measurement {
    fn from(value: Option<f64>) -> Self {
        value.map(Self::new).unwrap_or(Self::Undefined)
    }
}

impl From<Measurement> for Option<f64> {
    fn from(value: Measurement) -> Self {
        value.value()
    }
}

/// Numeric columns a view can plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Bind,
    DeltaBind,
    NBcBind,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Bind, Metric::DeltaBind, Metric::NBcBind];

    pub fn column_name(&self) -> &'static str {
        match self {
            Self::Bind => "bind",
            Self::DeltaBind => "delta_bind",
            Self::NBcBind => "n_bc_bind",
        }
    }

    pub fn value(&self, observation: &Observation) -> Measurement {
        match self {
            Self::Bind => observation.bind,
            Self::DeltaBind => observation.delta_bind,
            Self::NBcBind => observation.n_bc_bind.map(f64::from).into(),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

impl FromStr for Metric {
    type Err = DmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.column_name() == s.trim())
            .ok_or_else(|| {
                DmsError::new(
                    ErrorCode::InvalidInput,
                    format!(
                        "Unknown metric '{s}', expected one of: {}",
                        Self::ALL.map(|m| m.column_name()).join(", ")
                    ),
                )
            })
    }
}

/// One row of a DMS dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub target: BackgroundId,
    pub wildtype: char,
    pub position: i64,
    pub mutant: char,
    pub mutation: String,
    pub bind: Measurement,
    pub delta_bind: Measurement,
    pub n_bc_bind: Option<u32>,
}

impl Observation {
    pub fn is_wildtype(&self) -> bool {
        self.wildtype == self.mutant
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRange {
    pub min: i64,
    pub max: i64,
}

impl PositionRange {
    pub fn contains(&self, position: i64) -> bool {
        self.min <= position && position <= self.max
    }

    pub fn clamp(&self, position: i64) -> i64 {
        position.clamp(self.min, self.max)
    }
}

/// Heatmap window around a center position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub center: i64,
    pub interval_size: u32,
}

impl WindowSpec {
    pub fn new(center: i64, interval_size: u32) -> Self {
        Self {
            center,
            interval_size,
        }
    }

    /// Real-valued `(lower, upper)`; half the interval is not rounded.
    pub fn bounds(&self) -> (f64, f64) {
        let half = f64::from(self.interval_size) / 2.0;
        let center = self.center as f64;
        (center - half, center + half)
    }

    /// `lower < position <= upper`
    pub fn contains(&self, position: i64) -> bool {
        let (lower, upper) = self.bounds();
        let position = position as f64;
        lower < position && position <= upper
    }
}

/// A heatmap input row: the observation plus its wildtype marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapCell {
    #[serde(flatten)]
    pub observation: Observation,
    pub is_wildtype_cell: bool,
    pub wildtype_code: String,
}

impl HeatmapCell {
    pub fn from_observation(observation: Observation) -> Self {
        let is_wildtype_cell = observation.is_wildtype();
        Self {
            observation,
            is_wildtype_cell,
            wildtype_code: if is_wildtype_cell { "x" } else { "" }.to_string(),
        }
    }
}

/// Two backgrounds' values for the same `(mutant, position)` key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairedObservation {
    pub mutant: char,
    pub position: i64,
    pub value_a: Measurement,
    pub value_b: Measurement,
}

impl PairedObservation {
    pub fn values(&self) -> (Measurement, Measurement) {
        (self.value_a, self.value_b)
    }

    pub fn swapped(&self) -> Self {
        Self {
            value_a: self.value_b,
            value_b: self.value_a,
            ..*self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Load,
    Schema,
    EmptyDataset,
    UnknownBackground,
    InvalidComparison,
    InsufficientData,
    InvalidInput,
    Io,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DmsError {
    pub code: ErrorCode,
    pub message: String,
    /// Missing column names for `ErrorCode::Schema`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
}

impl DmsError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            columns: vec![],
        }
    }

    pub fn missing_columns(columns: Vec<String>) -> Self {
        Self {
            code: ErrorCode::Schema,
            message: format!("Missing required column(s): {}", columns.join(", ")),
            columns,
        }
    }
}

impl fmt::Display for DmsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl Error for DmsError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(wildtype: char, mutant: char) -> Observation {
        Observation {
            target: "Wuhan_Hu_1".to_string(),
            wildtype,
            position: 501,
            mutant,
            mutation: format!("{wildtype}501{mutant}"),
            bind: Measurement::Defined(-0.5),
            delta_bind: Measurement::Undefined,
            n_bc_bind: Some(12),
        }
    }

    #[test]
    fn measurement_serializes_as_number_or_null() {
        let text = serde_json::to_string(&[Measurement::Defined(1.5), Measurement::Undefined])
            .expect("serialize");
        assert_eq!(text, "[1.5,null]");
        let back: Vec<Measurement> = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(back, vec![Measurement::Defined(1.5), Measurement::Undefined]);
    }

    #[test]
    fn non_finite_is_undefined() {
        assert_eq!(Measurement::new(f64::NAN), Measurement::Undefined);
        assert!(!Measurement::from(Some(f64::NAN)).is_defined());
        assert_eq!(Measurement::new(f64::INFINITY), Measurement::Undefined);
        assert_eq!(Measurement::new(f64::NEG_INFINITY), Measurement::Undefined);
        assert_eq!(Measurement::new(-0.5), Measurement::Defined(-0.5));
        assert_eq!(Measurement::new(0.0).value(), Some(0.0));
    }

    #[test]
    fn metric_parses_column_names() {
        assert_eq!("delta_bind".parse::<Metric>().unwrap(), Metric::DeltaBind);
        assert_eq!(" n_bc_bind ".parse::<Metric>().unwrap(), Metric::NBcBind);
        let err = "expr".parse::<Metric>().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }

    #[test]
    fn metric_value_reads_count_as_float() {
        let o = obs('N', 'Y');
        assert_eq!(Metric::NBcBind.value(&o), Measurement::Defined(12.0));
        assert_eq!(Metric::DeltaBind.value(&o), Measurement::Undefined);
    }

    #[test]
    fn window_bounds_use_real_half_interval() {
        let w = WindowSpec::new(10, 5);
        assert_eq!(w.bounds(), (7.5, 12.5));
        assert!(!w.contains(7));
        assert!(w.contains(8));
        assert!(w.contains(12));
        assert!(!w.contains(13));

        let even = WindowSpec::new(10, 4);
        assert!(!even.contains(8));
        assert!(even.contains(9));
        assert!(even.contains(12));
        assert!(!even.contains(13));
    }

    #[test]
    fn heatmap_cell_marks_wildtype() {
        let wt = HeatmapCell::from_observation(obs('N', 'N'));
        assert!(wt.is_wildtype_cell);
        assert_eq!(wt.wildtype_code, "x");
        let mt = HeatmapCell::from_observation(obs('N', 'Y'));
        assert!(!mt.is_wildtype_cell);
        assert_eq!(mt.wildtype_code, "");
    }

    #[test]
    fn heatmap_cell_json_is_flat() {
        let cell = HeatmapCell::from_observation(obs('N', 'N'));
        let value = serde_json::to_value(&cell).expect("serialize");
        assert_eq!(value["target"], "Wuhan_Hu_1");
        assert_eq!(value["delta_bind"], serde_json::Value::Null);
        assert_eq!(value["is_wildtype_cell"], true);
    }

    #[test]
    fn schema_error_lists_columns() {
        let err = DmsError::missing_columns(vec!["bind".to_string()]);
        assert_eq!(err.code, ErrorCode::Schema);
        assert_eq!(err.columns, vec!["bind".to_string()]);
        assert!(err.to_string().contains("bind"));
    }
}
