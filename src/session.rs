//! Request/session object driving the core.
//!
//! A `Session` owns the load cache, the current dataset, the viewer parameters
//! and the user's selections. Front ends send it `Operation`s; every derived
//! view is computed fresh from the immutable dataset.

use crate::{
    comparison::{build_comparison, qualified_column},
    config::ViewerParameters,
    dataset::Dataset,
    heatmap::{RESIDUE_ORDER, metric_domain, prepare_heatmap_data, residue_rank},
    index::{comparison_pairs, list_backgrounds, position_range},
    loader::{DataSource, LoadCache},
    stats::{PairSummary, mean_absolute_error, summarize_observations},
};
use dms_protocol::{
    BackgroundId, DmsError, ErrorCode, HeatmapCell, Measurement, Metric, PairedObservation,
    PositionRange, WindowSpec,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub type OpId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Load {
        source: String,
    },
    ListBackgrounds,
    PositionRange,
    ComparisonPairs,
    PrepareHeatmap {
        background: BackgroundId,
        center: i64,
        interval_size: u32,
    },
    BuildComparison {
        background_a: BackgroundId,
        background_b: BackgroundId,
        metric: Option<Metric>,
        position: i64,
    },
    MeanAbsoluteError {
        pairs: Vec<(Measurement, Measurement)>,
    },
    SelectHeatmaps {
        backgrounds: Vec<BackgroundId>,
    },
    SetWindow {
        center: i64,
        interval_size: u32,
    },
    SelectComparisons {
        pairs: Vec<(BackgroundId, BackgroundId)>,
        position: Option<i64>,
    },
    RenderSelection,
    SetParameter {
        name: String,
        value: serde_json::Value,
    },
    ClearCache,
}

impl Operation {
    fn name(&self) -> &'static str {
        match self {
            Self::Load { .. } => "Load",
            Self::ListBackgrounds => "ListBackgrounds",
            Self::PositionRange => "PositionRange",
            Self::ComparisonPairs => "ComparisonPairs",
            Self::PrepareHeatmap { .. } => "PrepareHeatmap",
            Self::BuildComparison { .. } => "BuildComparison",
            Self::MeanAbsoluteError { .. } => "MeanAbsoluteError",
            Self::SelectHeatmaps { .. } => "SelectHeatmaps",
            Self::SetWindow { .. } => "SetWindow",
            Self::SelectComparisons { .. } => "SelectComparisons",
            Self::RenderSelection => "RenderSelection",
            Self::SetParameter { .. } => "SetParameter",
            Self::ClearCache => "ClearCache",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub run_id: String,
    pub ops: Vec<Operation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub source: String,
    pub row_count: usize,
    pub backgrounds: Vec<BackgroundId>,
    pub position_range: PositionRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapView {
    pub background: BackgroundId,
    pub metric: Metric,
    pub window: WindowSpec,
    /// Color scale domain; `None` when no cell has a defined value.
    pub domain: Option<(f64, f64)>,
    /// Y axis, top to bottom.
    pub residue_order: Vec<char>,
    /// Sorted by position, then by rank on the y axis.
    pub cells: Vec<HeatmapCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonView {
    pub background_a: BackgroundId,
    pub background_b: BackgroundId,
    pub metric: Metric,
    pub position: i64,
    pub column_a: String,
    pub column_b: String,
    pub pairs: Vec<PairedObservation>,
    pub summary: Option<PairSummary>,
    /// Why `summary` is missing, typically `InsufficientData`.
    pub statistic_error: Option<DmsError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionView {
    pub heatmaps: Vec<HeatmapView>,
    pub comparisons: Vec<ComparisonView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpOutput {
    Empty,
    Loaded(DatasetSummary),
    Backgrounds(Vec<BackgroundId>),
    PositionRange(PositionRange),
    ComparisonPairs(Vec<(BackgroundId, BackgroundId)>),
    Heatmap(HeatmapView),
    Comparison(ComparisonView),
    MeanAbsoluteError(f64),
    Selection(SelectionView),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpResult {
    pub op_id: OpId,
    pub output: OpOutput,
    pub messages: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub run_id: String,
    pub op: Operation,
    pub result: OpResult,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub heatmap_backgrounds: Vec<BackgroundId>,
    pub window: Option<WindowSpec>,
    pub comparisons: Vec<(BackgroundId, BackgroundId)>,
    pub compare_position: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    pub protocol_version: String,
    pub supported_operations: Vec<String>,
    pub metrics: Vec<String>,
    pub required_columns: Vec<String>,
}

pub trait Engine {
    fn apply(&mut self, op: Operation) -> Result<OpResult, DmsError>;
    fn apply_batch(&mut self, batch: Batch) -> Result<Vec<OpResult>, DmsError>;
}

#[derive(Debug, Default)]
pub struct Session {
    cache: LoadCache,
    dataset: Option<Arc<Dataset>>,
    parameters: ViewerParameters,
    selection: Selection,
    journal: Vec<OperationRecord>,
    op_counter: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with `InvalidInput` when the slider bounds are inconsistent.
    pub fn with_parameters(parameters: ViewerParameters) -> Result<Self, DmsError> {
        parameters.validate()?;
        Ok(Self {
            parameters,
            ..Self::default()
        })
    }

    pub fn parameters(&self) -> &ViewerParameters {
        &self.parameters
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn cache(&self) -> &LoadCache {
        &self.cache
    }

    pub fn operation_log(&self) -> &[OperationRecord] {
        &self.journal
    }

    pub fn capabilities() -> Capabilities {
        Capabilities {
            protocol_version: "v1".to_string(),
            supported_operations: [
                "Load",
                "ListBackgrounds",
                "PositionRange",
                "ComparisonPairs",
                "PrepareHeatmap",
                "BuildComparison",
                "MeanAbsoluteError",
                "SelectHeatmaps",
                "SetWindow",
                "SelectComparisons",
                "RenderSelection",
                "SetParameter",
                "ClearCache",
            ]
            .map(str::to_string)
            .to_vec(),
            metrics: Metric::ALL.map(|m| m.column_name().to_string()).to_vec(),
            required_columns: dms_protocol::REQUIRED_COLUMNS
                .map(str::to_string)
                .to_vec(),
        }
    }

    /// Replaces the current dataset; selections from the previous one are dropped.
    pub fn load(&mut self, source: &DataSource) -> Result<DatasetSummary, DmsError> {
        let dataset = self.cache.load(source)?;
        let summary = summarize(&dataset)?;
        let unchanged = self
            .dataset
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &dataset));
        if !unchanged {
            self.selection = Selection::default();
        }
        self.dataset = Some(dataset);
        Ok(summary)
    }

    pub fn summary(&self) -> Result<DatasetSummary, DmsError> {
        summarize(self.require_dataset()?)
    }

    fn require_dataset(&self) -> Result<&Dataset, DmsError> {
        self.dataset
            .as_deref()
            .ok_or_else(|| DmsError::new(ErrorCode::InvalidInput, "No dataset loaded"))
    }

    fn next_op_id(&mut self) -> OpId {
        self.op_counter += 1;
        format!("op-{}", self.op_counter)
    }

    pub fn heatmap_view(
        &self,
        background: &str,
        window: WindowSpec,
    ) -> Result<HeatmapView, DmsError> {
        let dataset = self.require_dataset()?;
        let metric = self.parameters.heatmap_metric;
        let mut cells =
            prepare_heatmap_data(dataset, background, window.center, window.interval_size)?;
        cells.sort_by_key(|c| (c.observation.position, residue_rank(c.observation.mutant)));
        Ok(HeatmapView {
            background: background.to_string(),
            metric,
            window,
            domain: metric_domain(&cells, metric),
            residue_order: RESIDUE_ORDER.to_vec(),
            cells,
        })
    }

    pub fn comparison_view(
        &self,
        background_a: &str,
        background_b: &str,
        metric: Option<Metric>,
        position: i64,
    ) -> Result<ComparisonView, DmsError> {
        let dataset = self.require_dataset()?;
        let metric = metric.unwrap_or(self.parameters.comparison_metric);
        let pairs = build_comparison(dataset, background_a, background_b, metric, position)?;
        let (summary, statistic_error) = match summarize_observations(&pairs) {
            Ok(summary) => (Some(summary), None),
            Err(e) => (None, Some(e)),
        };
        Ok(ComparisonView {
            background_a: background_a.to_string(),
            background_b: background_b.to_string(),
            metric,
            position,
            column_a: qualified_column(background_a, metric),
            column_b: qualified_column(background_b, metric),
            pairs,
            summary,
            statistic_error,
        })
    }

    fn current_window(&self, range: PositionRange) -> WindowSpec {
        let window = self.selection.window.unwrap_or(WindowSpec::new(
            range.min,
            self.parameters.default_interval_size,
        ));
        self.parameters.clamp_window(window, range)
    }

    pub fn render_selection(&self) -> Result<(SelectionView, Vec<String>), DmsError> {
        let dataset = self.require_dataset()?;
        let range = position_range(dataset)?;
        let window = self.current_window(range);
        let mut warnings = vec![];

        let heatmaps = self
            .selection
            .heatmap_backgrounds
            .iter()
            .map(|b| self.heatmap_view(b, window))
            .collect::<Result<Vec<_>, _>>()?;

        let mut comparisons = vec![];
        if !self.selection.comparisons.is_empty() {
            match self.selection.compare_position {
                Some(position) => {
                    if !range.contains(position) {
                        warnings.push(format!(
                            "Position {position} is outside {}..={}",
                            range.min, range.max
                        ));
                    }
                    for (a, b) in &self.selection.comparisons {
                        comparisons.push(self.comparison_view(a, b, None, position)?);
                    }
                }
                None => warnings.push("No comparison position selected".to_string()),
            }
        }
        Ok((
            SelectionView {
                heatmaps,
                comparisons,
            },
            warnings,
        ))
    }

    fn check_backgrounds<'a>(
        &self,
        backgrounds: impl IntoIterator<Item = &'a BackgroundId>,
    ) -> Result<(), DmsError> {
        let dataset = self.require_dataset()?;
        for b in backgrounds {
            if !dataset.has_background(b) {
                return Err(DmsError::new(
                    ErrorCode::UnknownBackground,
                    format!("Background '{b}' is not present in '{}'", dataset.source()),
                ));
            }
        }
        Ok(())
    }

    fn apply_internal(&mut self, op: Operation) -> Result<OpResult, DmsError> {
        let mut result = OpResult {
            op_id: self.next_op_id(),
            output: OpOutput::Empty,
            messages: vec![],
            warnings: vec![],
        };
        match op {
            Operation::Load { source } => {
                let summary = self.load(&DataSource::parse(&source))?;
                result.messages.push(format!(
                    "Loaded {} row(s) across {} background(s) from '{}'",
                    summary.row_count,
                    summary.backgrounds.len(),
                    summary.source
                ));
                result.output = OpOutput::Loaded(summary);
            }
            Operation::ListBackgrounds => {
                result.output = OpOutput::Backgrounds(list_backgrounds(self.require_dataset()?)?);
            }
            Operation::PositionRange => {
                result.output = OpOutput::PositionRange(position_range(self.require_dataset()?)?);
            }
            Operation::ComparisonPairs => {
                let backgrounds = list_backgrounds(self.require_dataset()?)?;
                result.output = OpOutput::ComparisonPairs(comparison_pairs(&backgrounds));
            }
            Operation::PrepareHeatmap {
                background,
                center,
                interval_size,
            } => {
                let view = self.heatmap_view(&background, WindowSpec::new(center, interval_size))?;
                result.output = OpOutput::Heatmap(view);
            }
            Operation::BuildComparison {
                background_a,
                background_b,
                metric,
                position,
            } => {
                let range = position_range(self.require_dataset()?)?;
                if !range.contains(position) {
                    warn!("Compare position {position} is outside {}..={}", range.min, range.max);
                    result.warnings.push(format!(
                        "Position {position} is outside {}..={}",
                        range.min, range.max
                    ));
                }
                let view = self.comparison_view(&background_a, &background_b, metric, position)?;
                result.output = OpOutput::Comparison(view);
            }
            Operation::MeanAbsoluteError { pairs } => {
                result.output = OpOutput::MeanAbsoluteError(mean_absolute_error(pairs)?);
            }
            Operation::SelectHeatmaps { backgrounds } => {
                self.check_backgrounds(&backgrounds)?;
                result
                    .messages
                    .push(format!("Selected {} heatmap background(s)", backgrounds.len()));
                self.selection.heatmap_backgrounds = backgrounds;
            }
            Operation::SetWindow {
                center,
                interval_size,
            } => {
                let range = position_range(self.require_dataset()?)?;
                let requested = WindowSpec::new(center, interval_size);
                let window = self.parameters.clamp_window(requested, range);
                if window != requested {
                    result.warnings.push(format!(
                        "Window adjusted to center {} size {}",
                        window.center, window.interval_size
                    ));
                }
                self.selection.window = Some(window);
            }
            Operation::SelectComparisons { pairs, position } => {
                self.check_backgrounds(pairs.iter().flat_map(|(a, b)| [a, b]))?;
                if let Some((a, _)) = pairs.iter().find(|(a, b)| a == b) {
                    return Err(DmsError::new(
                        ErrorCode::InvalidComparison,
                        format!("Cannot compare background '{a}' with itself"),
                    ));
                }
                result
                    .messages
                    .push(format!("Selected {} comparison(s)", pairs.len()));
                self.selection.comparisons = pairs;
                if position.is_some() {
                    self.selection.compare_position = position;
                }
            }
            Operation::RenderSelection => {
                let (view, warnings) = self.render_selection()?;
                result.warnings.extend(warnings);
                result.output = OpOutput::Selection(view);
            }
            Operation::SetParameter { name, value } => {
                self.parameters.set(&name, &value)?;
                result
                    .messages
                    .push(format!("Set parameter '{name}' to {value}"));
            }
            Operation::ClearCache => {
                self.cache.clear();
                result.messages.push("Cleared load cache".to_string());
            }
        }
        Ok(result)
    }
}

fn summarize(dataset: &Dataset) -> Result<DatasetSummary, DmsError> {
    Ok(DatasetSummary {
        source: dataset.source().to_string(),
        row_count: dataset.len(),
        backgrounds: list_backgrounds(dataset)?,
        position_range: position_range(dataset)?,
    })
}

impl Engine for Session {
    fn apply(&mut self, op: Operation) -> Result<OpResult, DmsError> {
        let name = op.name();
        let result = self.apply_internal(op.clone())?;
        info!("Applied {name} as {}", result.op_id);
        self.journal.push(OperationRecord {
            run_id: "interactive".to_string(),
            op,
            result: result.clone(),
        });
        Ok(result)
    }

    fn apply_batch(&mut self, batch: Batch) -> Result<Vec<OpResult>, DmsError> {
        let mut results = Vec::new();
        for op in &batch.ops {
            let result = self.apply_internal(op.clone())?;
            self.journal.push(OperationRecord {
                run_id: batch.run_id.clone(),
                op: op.clone(),
                result: result.clone(),
            });
            results.push(result);
        }
        Ok(results)
    }
}
