/// Values the CLI falls back to when neither the config file nor a flag sets them.
pub struct DefaultsConfig {
    pub num_scales: usize,
    pub max_iterations: usize,
    pub grid_resolution: usize,
    pub grid_padding: f64,
    pub surface_tolerance: f64,
    pub evaluation_modes: usize,
    pub specificity_samples: usize,
    pub evaluation_seed: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            num_scales: 5,
            max_iterations: 200,
            grid_resolution: 48,
            grid_padding: 0.25,
            surface_tolerance: 1e-4,
            evaluation_modes: 1,
            specificity_samples: 1000,
            evaluation_seed: 42,
        }
    }
}
