//! Background/window slicing for the position-by-residue heatmap.

use crate::dataset::Dataset;
use dms_protocol::{DmsError, ErrorCode, HeatmapCell, Metric, WindowSpec};
use log::debug;

/// Residue order of the heatmap's y axis, grouped by side-chain chemistry.
pub const RESIDUE_ORDER: [char; 20] = [
    'R', 'K', 'H', 'D', 'E', 'Q', 'N', 'S', 'T', 'Y', 'W', 'F', 'A', 'I', 'L', 'M', 'V', 'G', 'P',
    'C',
];

/// Rows of `background` inside the window, each with its wildtype marker.
///
/// Rows whose metrics are undefined are kept; the renderer greys them out.
pub fn prepare_heatmap_data(
    dataset: &Dataset,
    background: &str,
    center: i64,
    interval_size: u32,
) -> Result<Vec<HeatmapCell>, DmsError> {
    if !dataset.has_background(background) {
        return Err(DmsError::new(
            ErrorCode::UnknownBackground,
            format!(
                "Background '{background}' is not present in '{}'",
                dataset.source()
            ),
        ));
    }
    let window = WindowSpec::new(center, interval_size);
    let cells = dataset
        .rows_for(background)
        .filter(|o| window.contains(o.position))
        .cloned()
        .map(HeatmapCell::from_observation)
        .collect::<Vec<_>>();
    debug!(
        "Heatmap '{background}' window {:?}: {} cell(s)",
        window.bounds(),
        cells.len()
    );
    Ok(cells)
}

/// Min and max of the defined `metric` values, for the color scale.
pub fn metric_domain(cells: &[HeatmapCell], metric: Metric) -> Option<(f64, f64)> {
    cells
        .iter()
        .filter_map(|c| metric.value(&c.observation).value())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Position of a residue on the y axis; unknown codes sort after the standard 20.
pub fn residue_rank(residue: char) -> usize {
    RESIDUE_ORDER
        .iter()
        .position(|r| *r == residue.to_ascii_uppercase())
        .unwrap_or(RESIDUE_ORDER.len())
}
