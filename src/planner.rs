//! One scheduling run: eligibility, clustering, volunteer assignment,
//! scheduling, then reconciliation with the store.
//!
//! Writes happen in three separate store calls (delete clusters, insert
//! clusters, insert assignments). A failure part way through leaves the
//! earlier writes in place.

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, info_span, warn, Instrument};

use crate::assigner::{self, VolunteerAllocation};
use crate::clustering;
use crate::config::PlannerConfig;
use crate::eligibility;
use crate::error::{PlanError, PlanResult};
use crate::models::{
    Assignment, AvailabilityWindow, Cluster, Diagnostics, RunOutcome, RunSummary, SeniorRecord,
    TargetWeek, VolunteerRecord,
};
use crate::scheduler;
use crate::store::VisitStore;

#[derive(Debug, Clone)]
pub struct Plan {
    pub clusters: Vec<Cluster>,
    pub allocation: VolunteerAllocation,
    pub assignments: Vec<Assignment>,
    pub diagnostics: Diagnostics,
}

/// Runs the in-memory stages over already eligible seniors.
pub fn build_plan<R: Rng>(
    seniors: &[SeniorRecord],
    volunteers: &[VolunteerRecord],
    windows: &[AvailabilityWindow],
    config: &PlannerConfig,
    rng: &mut R,
) -> Plan {
    let mut diagnostics = Diagnostics::default();
    let clusters = clustering::cluster_seniors(seniors, config, rng, &mut diagnostics);
    let allocation =
        assigner::assign_volunteers(&clusters, volunteers, windows, &mut diagnostics);
    let assignments = scheduler::generate_schedule(
        &clusters,
        volunteers,
        &allocation,
        windows,
        config,
        &mut diagnostics,
    );
    if !diagnostics.unscheduled_seniors.is_empty() {
        diagnostics.warn(format!(
            "{} of {} eligible seniors could not be scheduled",
            diagnostics.unscheduled_seniors.len(),
            seniors.len()
        ));
    }

    Plan {
        clusters,
        allocation,
        assignments,
        diagnostics,
    }
}

pub struct Planner<'a, S: VisitStore + ?Sized> {
    store: &'a S,
    config: PlannerConfig,
}

impl<'a, S: VisitStore + ?Sized> Planner<'a, S> {
    pub fn new(store: &'a S, config: PlannerConfig) -> Self {
        Self { store, config }
    }

    fn rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Executes one full run. With `dry_run` every stage runs but nothing is
    /// written back.
    pub async fn run(&self, today: NaiveDate, dry_run: bool) -> PlanResult<RunOutcome> {
        self.config.validate()?;
        let week = eligibility::target_week(today);
        let span = info_span!("planning_run", %today, week_start = %week.start, dry_run);
        self.execute(today, week, dry_run).instrument(span).await
    }

    async fn execute(
        &self,
        today: NaiveDate,
        week: TargetWeek,
        dry_run: bool,
    ) -> PlanResult<RunOutcome> {
        let seniors = self
            .store
            .fetch_seniors()
            .await
            .map_err(|e| PlanError::read("seniors", e))?;
        let volunteers = self
            .store
            .fetch_volunteers()
            .await
            .map_err(|e| PlanError::read("volunteers", e))?;
        let windows: Vec<AvailabilityWindow> = self
            .store
            .fetch_availability(week)
            .await
            .map_err(|e| PlanError::read("availability", e))?
            .into_iter()
            .filter(|w| week.contains(w.date))
            .collect();

        let total = seniors.len();
        let eligible = eligibility::eligible_seniors(seniors, today, &self.config);
        info!(
            seniors = total,
            eligible = eligible.len(),
            volunteers = volunteers.len(),
            windows = windows.len(),
            "loaded planning inputs"
        );

        let plan = build_plan(
            &eligible,
            &volunteers,
            &windows,
            &self.config,
            &mut self.rng(),
        );

        if dry_run {
            info!("dry run, skipping writes");
        } else {
            self.persist(&plan).await?;
        }

        for message in &plan.diagnostics.warnings {
            warn!("{message}");
        }

        let summary = RunSummary {
            message: if dry_run {
                "Schedules computed (dry run)".to_string()
            } else {
                "Schedules generated successfully".to_string()
            },
            clusters_count: plan.clusters.len(),
            schedules_created: plan.assignments.len(),
        };
        info!(
            clusters = summary.clusters_count,
            assigned_volunteers = plan.allocation.len(),
            schedules = summary.schedules_created,
            "planning run complete"
        );

        Ok(RunOutcome {
            summary,
            week,
            clusters: plan.clusters,
            assignments: plan.assignments,
            diagnostics: plan.diagnostics,
        })
    }

    async fn persist(&self, plan: &Plan) -> PlanResult<()> {
        let removed = self
            .store
            .delete_clusters()
            .await
            .map_err(|e| PlanError::write("cluster deletion", e))?;
        info!(removed, "cleared previous clusters");

        if !plan.clusters.is_empty() {
            self.store
                .insert_clusters(&plan.clusters)
                .await
                .map_err(|e| PlanError::write("clusters", e))?;
        }

        if !plan.assignments.is_empty() {
            self.store
                .insert_assignments(&plan.assignments)
                .await
                .map_err(|e| PlanError::write("assignments", e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coord;
    use async_trait::async_trait;
    use chrono::NaiveTime;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Stage {
        Seniors,
        Availability,
        DeleteClusters,
        InsertAssignments,
    }

    #[derive(Default)]
    struct MemoryStore {
        seniors: Vec<SeniorRecord>,
        volunteers: Vec<VolunteerRecord>,
        windows: Vec<AvailabilityWindow>,
        fail_at: Option<Stage>,
        requested_week: Mutex<Option<TargetWeek>>,
        clusters: Mutex<Vec<i32>>,
        assignments: Mutex<Vec<Assignment>>,
        writes: Mutex<Vec<&'static str>>,
    }

    impl MemoryStore {
        fn check(&self, stage: Stage) -> anyhow::Result<()> {
            if self.fail_at == Some(stage) {
                anyhow::bail!("{stage:?} unavailable");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl VisitStore for MemoryStore {
        async fn fetch_seniors(&self) -> anyhow::Result<Vec<SeniorRecord>> {
            self.check(Stage::Seniors)?;
            Ok(self.seniors.clone())
        }

        async fn fetch_volunteers(&self) -> anyhow::Result<Vec<VolunteerRecord>> {
            Ok(self.volunteers.clone())
        }

        async fn fetch_availability(
            &self,
            week: TargetWeek,
        ) -> anyhow::Result<Vec<AvailabilityWindow>> {
            self.check(Stage::Availability)?;
            *self.requested_week.lock().unwrap() = Some(week);
            Ok(self.windows.clone())
        }

        async fn delete_clusters(&self) -> anyhow::Result<u64> {
            self.check(Stage::DeleteClusters)?;
            self.writes.lock().unwrap().push("delete_clusters");
            let mut clusters = self.clusters.lock().unwrap();
            let removed = clusters.len() as u64;
            clusters.clear();
            Ok(removed)
        }

        async fn insert_clusters(&self, clusters: &[Cluster]) -> anyhow::Result<()> {
            self.writes.lock().unwrap().push("insert_clusters");
            self.clusters
                .lock()
                .unwrap()
                .extend(clusters.iter().map(|c| c.id));
            Ok(())
        }

        async fn insert_assignments(&self, assignments: &[Assignment]) -> anyhow::Result<()> {
            self.check(Stage::InsertAssignments)?;
            self.writes.lock().unwrap().push("insert_assignments");
            self.assignments
                .lock()
                .unwrap()
                .extend(assignments.iter().cloned());
            Ok(())
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
    }

    fn sample_seniors(n: usize) -> Vec<SeniorRecord> {
        (0..n)
            .map(|i| SeniorRecord {
                id: format!("s{i}"),
                coords: Coord::new(
                    1.32 + (i % 4) as f64 * 0.004,
                    103.70 + (i / 4) as f64 * 0.004,
                ),
                wellbeing: 1 + (i % 3) as i32,
                last_visit: None,
                cluster_id: None,
            })
            .collect()
    }

    fn sample_volunteers() -> Vec<VolunteerRecord> {
        ["alex", "sarah", "marcus"]
            .iter()
            .enumerate()
            .map(|(i, name)| VolunteerRecord {
                id: format!("v{i}"),
                email: format!("{name}@sample.com"),
                name: name.to_string(),
                coords: Coord::new(1.325 + i as f64 * 0.003, 103.705),
                skill: 1 + i as i32,
            })
            .collect()
    }

    fn sample_windows() -> Vec<AvailabilityWindow> {
        let mut windows = Vec::new();
        for email in ["alex@sample.com", "sarah@sample.com", "marcus@sample.com"] {
            for day in 19..=23 {
                for hour in [9, 14] {
                    windows.push(AvailabilityWindow {
                        volunteer_email: email.to_string(),
                        date: NaiveDate::from_ymd_opt(2026, 10, day).unwrap(),
                        start: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
                        end: NaiveTime::from_hms_opt(hour + 2, 0, 0).unwrap(),
                    });
                }
            }
        }
        // outside the target week
        windows.push(AvailabilityWindow {
            volunteer_email: "alex@sample.com".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        });
        windows
    }

    fn seeded() -> PlannerConfig {
        PlannerConfig {
            seed: Some(17),
            ..PlannerConfig::default()
        }
    }

    fn populated_store() -> MemoryStore {
        MemoryStore {
            seniors: sample_seniors(20),
            volunteers: sample_volunteers(),
            windows: sample_windows(),
            ..MemoryStore::default()
        }
    }

    #[tokio::test]
    async fn full_run_replaces_clusters_and_appends_assignments() {
        let store = populated_store();
        store.clusters.lock().unwrap().extend([90, 91]);

        let outcome = Planner::new(&store, seeded()).run(today(), false).await.unwrap();

        assert_eq!(outcome.summary.message, "Schedules generated successfully");
        assert_eq!(outcome.summary.clusters_count, outcome.clusters.len());
        assert_eq!(outcome.summary.schedules_created, outcome.assignments.len());
        assert!(outcome.summary.schedules_created > 0);
        assert_eq!(
            *store.writes.lock().unwrap(),
            vec!["delete_clusters", "insert_clusters", "insert_assignments"]
        );
        let stored: Vec<i32> = store.clusters.lock().unwrap().clone();
        assert!(!stored.contains(&90));
        assert_eq!(stored.len(), outcome.clusters.len());
        assert_eq!(store.assignments.lock().unwrap().len(), outcome.assignments.len());

        let week = store.requested_week.lock().unwrap().unwrap();
        assert_eq!(week.start, NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        for assignment in &outcome.assignments {
            assert!(week.contains(assignment.date));
        }
    }

    #[tokio::test]
    async fn schedule_respects_exclusivity() {
        let store = populated_store();
        let outcome = Planner::new(&store, seeded()).run(today(), true).await.unwrap();

        let mut slots = HashSet::new();
        let mut seniors = HashSet::new();
        for a in &outcome.assignments {
            assert!(slots.insert((a.volunteer_email.clone(), a.date, a.start_time)));
            assert!(seniors.insert(a.senior_id.clone()));
            assert!(a.end_time > a.start_time);
        }
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let store = populated_store();
        let outcome = Planner::new(&store, seeded()).run(today(), true).await.unwrap();
        assert!(outcome.summary.message.contains("dry run"));
        assert!(store.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ineligible_seniors_are_not_clustered() {
        let mut store = populated_store();
        for senior in store.seniors.iter_mut().skip(5) {
            senior.wellbeing = 3;
            senior.last_visit = NaiveDate::from_ymd_opt(2026, 2, 1);
        }
        let outcome = Planner::new(&store, seeded()).run(today(), true).await.unwrap();
        let clustered: usize = outcome.clusters.iter().map(|c| c.len()).sum();
        assert_eq!(clustered, 5);
    }

    #[tokio::test]
    async fn read_failure_aborts_before_any_write() {
        let store = MemoryStore {
            fail_at: Some(Stage::Availability),
            ..populated_store()
        };
        let err = Planner::new(&store, seeded()).run(today(), false).await.unwrap_err();
        assert!(matches!(err, PlanError::Read { what: "availability", .. }));
        assert!(store.writes.lock().unwrap().is_empty());

        let store = MemoryStore {
            fail_at: Some(Stage::Seniors),
            ..MemoryStore::default()
        };
        let err = Planner::new(&store, seeded()).run(today(), false).await.unwrap_err();
        assert!(err.to_string().starts_with("failed to read seniors"));
    }

    #[tokio::test]
    async fn write_failure_keeps_earlier_writes() {
        let store = MemoryStore {
            fail_at: Some(Stage::InsertAssignments),
            ..populated_store()
        };
        let err = Planner::new(&store, seeded()).run(today(), false).await.unwrap_err();
        assert!(matches!(err, PlanError::Write { what: "assignments", .. }));
        assert_eq!(
            *store.writes.lock().unwrap(),
            vec!["delete_clusters", "insert_clusters"]
        );
        assert!(!store.clusters.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_failure_stops_the_write_stage() {
        let store = MemoryStore {
            fail_at: Some(Stage::DeleteClusters),
            ..populated_store()
        };
        let err = Planner::new(&store, seeded()).run(today(), false).await.unwrap_err();
        assert!(matches!(err, PlanError::Write { what: "cluster deletion", .. }));
        assert!(store.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_eligible_seniors_still_clears_clusters() {
        let store = MemoryStore {
            volunteers: sample_volunteers(),
            windows: sample_windows(),
            ..MemoryStore::default()
        };
        store.clusters.lock().unwrap().push(4);
        let outcome = Planner::new(&store, seeded()).run(today(), false).await.unwrap();
        assert_eq!(outcome.summary.clusters_count, 0);
        assert_eq!(outcome.summary.schedules_created, 0);
        assert_eq!(*store.writes.lock().unwrap(), vec!["delete_clusters"]);
        assert!(store.clusters.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_up_front() {
        let store = populated_store();
        let config = PlannerConfig {
            cluster_size: 0,
            ..PlannerConfig::default()
        };
        let err = Planner::new(&store, config).run(today(), false).await.unwrap_err();
        assert!(matches!(err, PlanError::Config(_)));
        assert!(store.requested_week.lock().unwrap().is_none());
    }

    #[test]
    fn build_plan_reports_shortfalls() {
        let seniors = sample_seniors(10);
        let volunteers = sample_volunteers();
        let mut rng = StdRng::seed_from_u64(1);
        let plan = build_plan(&seniors, &volunteers, &[], &seeded(), &mut rng);
        assert!(plan.assignments.is_empty());
        assert!(plan.allocation.is_empty());
        assert_eq!(plan.diagnostics.unscheduled_seniors.len(), 10);
        assert_eq!(plan.diagnostics.idle_volunteers.len(), 3);
        assert!(!plan.diagnostics.is_clean());
    }
}
