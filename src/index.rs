use crate::dataset::Dataset;
use dms_protocol::{BackgroundId, DmsError, ErrorCode, PositionRange};
use itertools::Itertools;
use std::collections::HashSet;

fn ensure_rows(dataset: &Dataset) -> Result<(), DmsError> {
    if dataset.is_empty() {
        return Err(DmsError::new(
            ErrorCode::EmptyDataset,
            format!("Dataset '{}' has no rows", dataset.source()),
        ));
    }
    Ok(())
}

/// Distinct backgrounds in the order they first appear.
pub fn list_backgrounds(dataset: &Dataset) -> Result<Vec<BackgroundId>, DmsError> {
    ensure_rows(dataset)?;
    let mut seen = HashSet::new();
    Ok(dataset
        .observations()
        .iter()
        .filter(|o| seen.insert(o.target.as_str()))
        .map(|o| o.target.clone())
        .collect())
}

pub fn position_range(dataset: &Dataset) -> Result<PositionRange, DmsError> {
    ensure_rows(dataset)?;
    let (min, max) = dataset
        .observations()
        .iter()
        .map(|o| o.position)
        .minmax()
        .into_option()
        .ok_or_else(|| DmsError::new(ErrorCode::Internal, "No positions in non-empty dataset"))?;
    Ok(PositionRange { min, max })
}

/// Every unordered background pair, in combination order.
pub fn comparison_pairs(backgrounds: &[BackgroundId]) -> Vec<(BackgroundId, BackgroundId)> {
    backgrounds
        .iter()
        .cloned()
        .tuple_combinations()
        .collect()
}
