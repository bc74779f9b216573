use dms_protocol::{DmsError, ErrorCode, Measurement, PairedObservation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairSummary {
    /// Pairs with both values defined.
    pub compared: usize,
    /// Pairs dropped because a value was undefined.
    pub excluded: usize,
    pub mean_absolute_error: f64,
}

/// Mean of `|a - b|` over pairs where both sides are defined.
///
/// Pairs with an undefined side are skipped rather than counted as zero. With
/// nothing left to compare the result is `InsufficientData`, never 0 or NaN.
pub fn mean_absolute_error<I>(pairs: I) -> Result<f64, DmsError>
where
    I: IntoIterator<Item = (Measurement, Measurement)>,
{
    summarize_pairs(pairs).map(|s| s.mean_absolute_error)
}

pub fn summarize_pairs<I>(pairs: I) -> Result<PairSummary, DmsError>
where
    I: IntoIterator<Item = (Measurement, Measurement)>,
{
    let mut compared = 0usize;
    let mut excluded = 0usize;
    let mut total = 0.0f64;
    for pair in pairs {
        match pair {
            (Measurement::Defined(a), Measurement::Defined(b)) => {
                compared += 1;
                total += (a - b).abs();
            }
            _ => excluded += 1,
        }
    }
    if compared == 0 {
        return Err(DmsError::new(
            ErrorCode::InsufficientData,
            format!("No pair with both values defined ({excluded} pair(s) excluded)"),
        ));
    }
    Ok(PairSummary {
        compared,
        excluded,
        mean_absolute_error: total / compared as f64,
    })
}

pub fn summarize_observations(pairs: &[PairedObservation]) -> Result<PairSummary, DmsError> {
    summarize_pairs(pairs.iter().map(PairedObservation::values))
}
