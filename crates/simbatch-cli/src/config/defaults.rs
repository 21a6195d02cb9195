use simbatch::core::selection::SortOrder;

pub struct DefaultsConfig {
    pub label: String,
    pub output_template: String,
    pub log_template: String,
    pub workers: usize,
    pub order: SortOrder,
    pub manifest: String,
    pub seed: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            label: "simulation".to_string(),
            output_template: "{label}_{id:014}.root".to_string(),
            log_template: "{label}_{id:014}.log".to_string(),
            workers: 4,
            order: SortOrder::Ascending,
            manifest: "run_list.dat".to_string(),
            seed: 0,
        }
    }
}
