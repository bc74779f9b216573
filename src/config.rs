use dms_protocol::{DmsError, ErrorCode, Metric, PositionRange, WindowSpec};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerParameters {
    pub heatmap_metric: Metric,
    pub comparison_metric: Metric,
    pub min_interval_size: u32,
    pub max_interval_size: u32,
    pub interval_step: u32,
    pub default_interval_size: u32,
}

impl Default for ViewerParameters {
    fn default() -> Self {
        Self {
            heatmap_metric: Metric::DeltaBind,
            comparison_metric: Metric::Bind,
            min_interval_size: 10,
            max_interval_size: 50,
            interval_step: 2,
            default_interval_size: 10,
        }
    }
}

fn invalid(message: impl Into<String>) -> DmsError {
    DmsError::new(ErrorCode::InvalidInput, message)
}

impl ViewerParameters {
    pub fn load_from_path(path: &str) -> Result<Self, DmsError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DmsError::new(
                ErrorCode::Io,
                format!("Could not read parameter file '{path}': {e}"),
            )
        })?;
        let params: Self = serde_json::from_str(&text)
            .map_err(|e| invalid(format!("Could not parse parameter JSON '{path}': {e}")))?;
        params.validate()?;
        Ok(params)
    }

    pub fn save_to_path(&self, path: &str) -> Result<(), DmsError> {
        let text = serde_json::to_string_pretty(self).map_err(|e| {
            DmsError::new(
                ErrorCode::Internal,
                format!("Could not serialize parameters: {e}"),
            )
        })?;
        std::fs::write(path, text).map_err(|e| {
            DmsError::new(
                ErrorCode::Io,
                format!("Could not write parameter file '{path}': {e}"),
            )
        })
    }

    pub fn validate(&self) -> Result<(), DmsError> {
        if self.interval_step == 0 {
            return Err(invalid("interval_step must be >= 1"));
        }
        if self.min_interval_size > self.max_interval_size {
            return Err(invalid(format!(
                "min_interval_size ({}) exceeds max_interval_size ({})",
                self.min_interval_size, self.max_interval_size
            )));
        }
        if !(self.min_interval_size..=self.max_interval_size).contains(&self.default_interval_size)
        {
            return Err(invalid(format!(
                "default_interval_size ({}) is outside {}..={}",
                self.default_interval_size, self.min_interval_size, self.max_interval_size
            )));
        }
        Ok(())
    }

    /// Center into the dataset's range, interval size onto the slider grid.
    pub fn clamp_window(&self, window: WindowSpec, range: PositionRange) -> WindowSpec {
        let upper = self.max_interval_size.max(self.min_interval_size);
        let size = window.interval_size.clamp(self.min_interval_size, upper);
        let step = self.interval_step.max(1);
        let size = self.min_interval_size + (size - self.min_interval_size) / step * step;
        WindowSpec::new(range.clamp(window.center), size)
    }

    /// Applies one named parameter; the previous value survives a rejected update.
    pub fn set(&mut self, name: &str, value: &serde_json::Value) -> Result<(), DmsError> {
        let mut next = self.clone();
        match name {
            "heatmap_metric" | "comparison_metric" => {
                let metric = value
                    .as_str()
                    .ok_or_else(|| invalid(format!("SetParameter {name} requires a metric name")))?
                    .parse::<Metric>()?;
                if name == "heatmap_metric" {
                    next.heatmap_metric = metric;
                } else {
                    next.comparison_metric = metric;
                }
            }
            "min_interval_size" | "max_interval_size" | "interval_step"
            | "default_interval_size" => {
                let raw = value
                    .as_u64()
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| {
                        invalid(format!("SetParameter {name} requires a non-negative integer"))
                    })?;
                match name {
                    "min_interval_size" => next.min_interval_size = raw,
                    "max_interval_size" => next.max_interval_size = raw,
                    "interval_step" => next.interval_step = raw,
                    _ => next.default_interval_size = raw,
                }
            }
            other => return Err(invalid(format!("Unknown parameter '{other}'"))),
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const RANGE: PositionRange = PositionRange { min: 331, max: 531 };

    #[test]
    fn defaults_match_slider_bounds() {
        let p = ViewerParameters::default();
        assert_eq!(p.heatmap_metric, Metric::DeltaBind);
        assert_eq!(p.comparison_metric, Metric::Bind);
        assert_eq!((p.min_interval_size, p.max_interval_size), (10, 50));
        assert!(p.validate().is_ok());
    }

    #[test]
    fn clamp_window_snaps_and_bounds() {
        let p = ViewerParameters::default();
        assert_eq!(
            p.clamp_window(WindowSpec::new(100, 3), RANGE),
            WindowSpec::new(331, 10)
        );
        assert_eq!(
            p.clamp_window(WindowSpec::new(500, 23), RANGE),
            WindowSpec::new(500, 22)
        );
        assert_eq!(
            p.clamp_window(WindowSpec::new(9000, 99), RANGE),
            WindowSpec::new(531, 50)
        );
    }

    #[test]
    fn clamp_window_tolerates_inverted_bounds() {
        let p = ViewerParameters {
            min_interval_size: 30,
            max_interval_size: 20,
            ..ViewerParameters::default()
        };
        assert!(p.validate().is_err());
        assert_eq!(
            p.clamp_window(WindowSpec::new(500, 40), RANGE),
            WindowSpec::new(500, 30)
        );
    }

    #[test]
    fn set_updates_and_validates() {
        let mut p = ViewerParameters::default();
        p.set("heatmap_metric", &json!("bind")).unwrap();
        assert_eq!(p.heatmap_metric, Metric::Bind);
        p.set("max_interval_size", &json!(80)).unwrap();
        assert_eq!(p.max_interval_size, 80);

        let err = p.set("min_interval_size", &json!(90)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
        assert_eq!(p.min_interval_size, 10);

        assert!(p.set("interval_step", &json!(-1)).is_err());
        assert!(p.set("color_scheme", &json!("redblue")).is_err());
        assert!(p.set("comparison_metric", &json!("expr")).is_err());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(&path, r#"{"comparison_metric":"delta_bind"}"#).unwrap();
        let p = ViewerParameters::load_from_path(path.to_str().unwrap()).unwrap();
        assert_eq!(p.comparison_metric, Metric::DeltaBind);
        assert_eq!(p.max_interval_size, 50);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        let path = path.to_str().unwrap();
        let mut p = ViewerParameters::default();
        p.set("interval_step", &json!(5)).unwrap();
        p.save_to_path(path).unwrap();
        assert_eq!(ViewerParameters::load_from_path(path).unwrap(), p);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ViewerParameters::load_from_path("does/not/exist.json").unwrap_err();
        assert_eq!(err.code, ErrorCode::Io);
    }
}
