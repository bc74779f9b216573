pub const DMS_HEATMAP_DISPLAY_VERSION: &str = env!("DMS_HEATMAP_DISPLAY_VERSION");
pub const DMS_HEATMAP_BUILD_N: &str = env!("DMS_HEATMAP_BUILD_N");

pub fn version_cli_text() -> String {
    format!(
        "DMS-Heatmap {}\nBuild {}\nDeep mutational scanning viewer core for multiple backgrounds",
        DMS_HEATMAP_DISPLAY_VERSION, DMS_HEATMAP_BUILD_N
    )
}
