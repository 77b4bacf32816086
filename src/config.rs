use chrono::Duration;
use clap::Args;

use crate::error::PlanError;

#[derive(Debug, Clone, Args)]
pub struct PlannerConfig {
    /// Target number of seniors per cluster
    #[arg(long, default_value_t = 7)]
    pub cluster_size: usize,
    /// Soft-capacity assignment passes
    #[arg(long, default_value_t = 20)]
    pub balancing_rounds: usize,
    /// How much farther an under-capacity centroid may be than the nearest one
    #[arg(long, default_value_t = 1.2)]
    pub comparability_factor: f64,
    /// Clusters wider than this multiple of the median radius get bisected
    #[arg(long, default_value_t = 2.5)]
    pub split_radius_factor: f64,
    /// A cluster needs more members than this to be bisected
    #[arg(long, default_value_t = 4)]
    pub split_min_members: usize,
    /// Bounding-box area floor used by the density metric
    #[arg(long, default_value_t = 0.001)]
    pub min_cluster_area: f64,
    #[arg(long, default_value_t = 60)]
    pub visit_minutes: u32,
    /// Seniors at or below this wellbeing score get the most skilled volunteers first
    #[arg(long, default_value_t = 2)]
    pub high_need_max_score: i32,
    /// Wellbeing score that qualifies for the short revisit interval
    #[arg(long, default_value_t = 1)]
    pub urgent_score: i32,
    #[arg(long, default_value_t = 4)]
    pub urgent_revisit_months: u32,
    /// Fixed RNG seed for reproducible clustering
    #[arg(long)]
    pub seed: Option<u64>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            cluster_size: 7,
            balancing_rounds: 20,
            comparability_factor: 1.2,
            split_radius_factor: 2.5,
            split_min_members: 4,
            min_cluster_area: 0.001,
            visit_minutes: 60,
            high_need_max_score: 2,
            urgent_score: 1,
            urgent_revisit_months: 4,
            seed: None,
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.cluster_size == 0 {
            return Err(PlanError::Config("cluster size must be at least 1".into()));
        }
        if self.balancing_rounds == 0 {
            return Err(PlanError::Config("balancing rounds must be at least 1".into()));
        }
        if self.comparability_factor.is_nan() || self.comparability_factor < 1.0 {
            return Err(PlanError::Config(format!(
                "comparability factor must be >= 1.0, got {}",
                self.comparability_factor
            )));
        }
        if self.split_radius_factor.is_nan() || self.split_radius_factor <= 0.0 {
            return Err(PlanError::Config(format!(
                "split radius factor must be positive, got {}",
                self.split_radius_factor
            )));
        }
        if self.min_cluster_area.is_nan() || self.min_cluster_area <= 0.0 {
            return Err(PlanError::Config(format!(
                "minimum cluster area must be positive, got {}",
                self.min_cluster_area
            )));
        }
        if self.visit_minutes == 0 || self.visit_minutes >= 24 * 60 {
            return Err(PlanError::Config(format!(
                "visit length must be between 1 and 1439 minutes, got {}",
                self.visit_minutes
            )));
        }
        Ok(())
    }

    /// Overflow ceiling used while balancing.
    pub fn soft_max(&self) -> usize {
        self.cluster_size + 1
    }

    pub fn visit_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.visit_minutes))
    }
}
