use async_trait::async_trait;

use crate::models::{
    Assignment, AvailabilityWindow, Cluster, SeniorRecord, TargetWeek, VolunteerRecord,
};

/// Records the planner reads and writes. Each call stands alone; nothing here
/// promises atomicity across calls.
#[async_trait]
pub trait VisitStore: Send + Sync {
    async fn fetch_seniors(&self) -> anyhow::Result<Vec<SeniorRecord>>;

    async fn fetch_volunteers(&self) -> anyhow::Result<Vec<VolunteerRecord>>;

    async fn fetch_availability(&self, week: TargetWeek)
        -> anyhow::Result<Vec<AvailabilityWindow>>;

    /// Returns the number of rows removed.
    async fn delete_clusters(&self) -> anyhow::Result<u64>;

    async fn insert_clusters(&self, clusters: &[Cluster]) -> anyhow::Result<()>;

    async fn insert_assignments(&self, assignments: &[Assignment]) -> anyhow::Result<()>;
}
