use crate::shapes::{GridSettings, ShapeSpec};
use shapecorr::engine::config::OptimizationConfig;

/// Fully merged settings of one `optimize` invocation.
pub struct AppConfig {
    pub shapes: Vec<ShapeSpec>,
    pub grid: GridSettings,
    pub optimization: OptimizationConfig,
}
