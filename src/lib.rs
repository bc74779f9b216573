//! Data core of DMS-Heatmap: loading, indexing, heatmap windows, background
//! comparisons and their statistics for deep mutational scanning datasets.

pub mod about;
pub mod comparison;
pub mod config;
pub mod dataset;
pub mod heatmap;
pub mod index;
pub mod loader;
pub mod session;
pub mod shell;
pub mod stats;

pub use comparison::build_comparison;
pub use dataset::Dataset;
pub use dms_protocol as protocol;
pub use heatmap::prepare_heatmap_data;
pub use index::{list_backgrounds, position_range};
pub use loader::{DataSource, LoadCache, load};
pub use stats::mean_absolute_error;
