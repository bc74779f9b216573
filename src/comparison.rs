//! Cross-background pairing of observations for scatter comparison.

use crate::dataset::Dataset;
use dms_protocol::{DmsError, ErrorCode, Measurement, Metric, PairedObservation};
use log::{debug, warn};
use std::collections::HashMap;

/// Name of a background's value column in a joined view, e.g. `BA1_bind`.
pub fn qualified_column(background: &str, metric: Metric) -> String {
    format!("{background}_{}", metric.column_name())
}

fn project(dataset: &Dataset, background: &str, metric: Metric) -> Vec<(char, i64, Measurement)> {
    dataset
        .rows_for(background)
        .map(|o| (o.mutant, o.position, metric.value(o)))
        .collect()
}

fn inner_join(
    left: Vec<(char, i64, Measurement)>,
    right: Vec<(char, i64, Measurement)>,
) -> Vec<PairedObservation> {
    // Keys are unique per background, so a map lookup is an exact join.
    let right: HashMap<(char, i64), Measurement> =
        right.into_iter().map(|(m, p, v)| ((m, p), v)).collect();
    left.into_iter()
        .filter_map(|(mutant, position, value_a)| {
            right
                .get(&(mutant, position))
                .map(|value_b| PairedObservation {
                    mutant,
                    position,
                    value_a,
                    value_b: *value_b,
                })
        })
        .collect()
}

/// Pairs `background_a` and `background_b` on `(mutant, position)` at `position`.
///
/// Keys present on one side only are dropped; an empty result is not an error.
/// Rows come back in `background_a`'s dataset order.
pub fn build_comparison(
    dataset: &Dataset,
    background_a: &str,
    background_b: &str,
    metric: Metric,
    position: i64,
) -> Result<Vec<PairedObservation>, DmsError> {
    if background_a == background_b {
        return Err(DmsError::new(
            ErrorCode::InvalidComparison,
            format!("Cannot compare background '{background_a}' with itself"),
        ));
    }
    for background in [background_a, background_b] {
        if !dataset.has_background(background) {
            return Err(DmsError::new(
                ErrorCode::UnknownBackground,
                format!(
                    "Background '{background}' is not present in '{}'",
                    dataset.source()
                ),
            ));
        }
    }

    let joined = inner_join(
        project(dataset, background_a, metric),
        project(dataset, background_b, metric),
    );
    let joined_len = joined.len();
    let pairs = joined
        .into_iter()
        .filter(|p| p.position == position)
        .collect::<Vec<_>>();
    debug!(
        "Joined '{background_a}' and '{background_b}' on {metric}: {joined_len} shared key(s), {} at position {position}",
        pairs.len()
    );
    if pairs.is_empty() {
        warn!("No shared residues for '{background_a}' and '{background_b}' at position {position}");
    }
    Ok(pairs)
}
