use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime};
use clap::ValueEnum;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::eligibility;
use crate::models::{
    Assignment, AvailabilityWindow, Cluster, Coord, ScheduledVisit, SeniorRecord, TargetWeek,
    VolunteerRecord,
};
use crate::store::VisitStore;

/// Advisory lock key shared by every `run` invocation.
const RUN_LOCK_KEY: i64 = 0x5649_5349_5450_4c4e;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn senior_from_row(row: &PgRow) -> anyhow::Result<SeniorRecord> {
    Ok(SeniorRecord {
        id: row.try_get("uid")?,
        coords: Coord::new(row.try_get("lat")?, row.try_get("lng")?),
        wellbeing: row.try_get("overall_wellbeing")?,
        last_visit: row.try_get("last_visit")?,
        cluster_id: None,
    })
}

fn volunteer_from_row(row: &PgRow) -> anyhow::Result<VolunteerRecord> {
    Ok(VolunteerRecord {
        id: row.try_get("vid")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        coords: Coord::new(row.try_get("lat")?, row.try_get("lng")?),
        skill: row.try_get("skill")?,
    })
}

#[async_trait]
impl VisitStore for PgStore {
    async fn fetch_seniors(&self) -> anyhow::Result<Vec<SeniorRecord>> {
        let rows = sqlx::query(
            "SELECT uid, overall_wellbeing, lat, lng, last_visit \
             FROM visit_planner.seniors ORDER BY uid",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(senior_from_row).collect()
    }

    async fn fetch_volunteers(&self) -> anyhow::Result<Vec<VolunteerRecord>> {
        let rows = sqlx::query(
            "SELECT vid, email, name, lat, lng, skill \
             FROM visit_planner.volunteers ORDER BY vid",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(volunteer_from_row).collect()
    }

    async fn fetch_availability(
        &self,
        week: TargetWeek,
    ) -> anyhow::Result<Vec<AvailabilityWindow>> {
        let rows = sqlx::query(
            "SELECT volunteer_email, date, start_t, end_t \
             FROM visit_planner.availabilities \
             WHERE date >= $1 AND date <= $2 \
             ORDER BY date, start_t",
        )
        .bind(week.start)
        .bind(week.end)
        .fetch_all(&self.pool)
        .await?;

        let mut windows = Vec::with_capacity(rows.len());
        for row in rows {
            windows.push(AvailabilityWindow {
                volunteer_email: row.try_get("volunteer_email")?,
                date: row.try_get("date")?,
                start: row.try_get("start_t")?,
                end: row.try_get("end_t")?,
            });
        }
        Ok(windows)
    }

    async fn delete_clusters(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM visit_planner.clusters")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_clusters(&self, clusters: &[Cluster]) -> anyhow::Result<()> {
        for cluster in clusters {
            sqlx::query(
                r#"
                INSERT INTO visit_planner.clusters
                (id, centroid_lat, centroid_lng, radius, density)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(cluster.id)
            .bind(cluster.centroid.lat)
            .bind(cluster.centroid.lng)
            .bind(cluster.radius)
            .bind(cluster.density)
            .execute(&self.pool)
            .await
            .with_context(|| format!("cluster {}", cluster.id))?;
        }
        debug!(count = clusters.len(), "inserted clusters");
        Ok(())
    }

    async fn insert_assignments(&self, assignments: &[Assignment]) -> anyhow::Result<()> {
        for assignment in assignments {
            sqlx::query(
                r#"
                INSERT INTO visit_planner.assignments
                (aid, vid, sid, date, start_time, end_time, volunteer_email, is_acknowledged, cluster_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&assignment.volunteer_id)
            .bind(&assignment.senior_id)
            .bind(assignment.date)
            .bind(assignment.start_time)
            .bind(assignment.end_time)
            .bind(&assignment.volunteer_email)
            .bind(assignment.is_acknowledged)
            .bind(assignment.cluster_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("assignment for senior {}", assignment.senior_id))?;
        }
        debug!(count = assignments.len(), "inserted assignments");
        Ok(())
    }
}

/// Session advisory lock held on a dedicated pooled connection until
/// [`RunLock::release`] is called.
pub struct RunLock {
    conn: PoolConnection<Postgres>,
}

pub async fn try_acquire_run_lock(pool: &PgPool) -> anyhow::Result<Option<RunLock>> {
    let mut conn = pool.acquire().await?;
    let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
        .bind(RUN_LOCK_KEY)
        .fetch_one(&mut *conn)
        .await?;
    Ok(acquired.then_some(RunLock { conn }))
}

impl RunLock {
    pub async fn release(mut self) -> anyhow::Result<()> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(RUN_LOCK_KEY)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }
}

pub async fn fetch_week_visits(
    pool: &PgPool,
    week: TargetWeek,
) -> anyhow::Result<Vec<ScheduledVisit>> {
    let rows = sqlx::query(
        "SELECT a.aid, a.sid, a.date, a.start_time, a.end_time, a.cluster_id, \
         a.is_acknowledged, a.volunteer_email, \
         COALESCE(v.name, a.volunteer_email) AS volunteer_name, s.name AS senior_name \
         FROM visit_planner.assignments a \
         LEFT JOIN visit_planner.volunteers v ON v.vid = a.vid \
         LEFT JOIN visit_planner.seniors s ON s.uid = a.sid \
         WHERE a.date >= $1 AND a.date <= $2 \
         ORDER BY a.volunteer_email, a.date, a.start_time",
    )
    .bind(week.start)
    .bind(week.end)
    .fetch_all(pool)
    .await?;

    let mut visits = Vec::with_capacity(rows.len());
    for row in rows {
        visits.push(ScheduledVisit {
            assignment_id: row.try_get("aid")?,
            volunteer_name: row.try_get("volunteer_name")?,
            volunteer_email: row.try_get("volunteer_email")?,
            senior_id: row.try_get("sid")?,
            senior_name: row.try_get("senior_name")?,
            date: row.try_get("date")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            cluster_id: row.try_get("cluster_id")?,
            is_acknowledged: row.try_get("is_acknowledged")?,
        });
    }
    Ok(visits)
}

async fn upsert_senior(
    pool: &PgPool,
    uid: &str,
    name: Option<&str>,
    wellbeing: i32,
    coords: Coord,
    last_visit: Option<NaiveDate>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO visit_planner.seniors (uid, name, overall_wellbeing, lat, lng, last_visit)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (uid) DO UPDATE
        SET name = EXCLUDED.name,
            overall_wellbeing = EXCLUDED.overall_wellbeing,
            lat = EXCLUDED.lat,
            lng = EXCLUDED.lng,
            last_visit = EXCLUDED.last_visit
        "#,
    )
    .bind(uid)
    .bind(name)
    .bind(wellbeing)
    .bind(coords.lat)
    .bind(coords.lng)
    .bind(last_visit)
    .execute(pool)
    .await?;
    Ok(())
}

async fn upsert_volunteer(
    pool: &PgPool,
    vid: &str,
    email: &str,
    name: &str,
    coords: Coord,
    skill: i32,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO visit_planner.volunteers (vid, email, name, lat, lng, skill)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (vid) DO UPDATE
        SET email = EXCLUDED.email,
            name = EXCLUDED.name,
            lat = EXCLUDED.lat,
            lng = EXCLUDED.lng,
            skill = EXCLUDED.skill
        "#,
    )
    .bind(vid)
    .bind(email)
    .bind(name)
    .bind(coords.lat)
    .bind(coords.lng)
    .bind(skill)
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns whether a new window row was written.
async fn insert_window(pool: &PgPool, window: &AvailabilityWindow) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO visit_planner.availabilities (id, volunteer_email, date, start_t, end_t)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (volunteer_email, date, start_t) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&window.volunteer_email)
    .bind(window.date)
    .bind(window.start)
    .bind(window.end)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool, today: NaiveDate) -> anyhow::Result<()> {
    let seniors = vec![
        ("S001", "Tan Ah Kow", 1, 1.3390, 103.7057, None),
        ("S002", "Lim Mei Ling", 2, 1.3280, 103.7430, None),
        ("S003", "Goh Swee Hock", 3, 1.3200, 103.7290, NaiveDate::from_ymd_opt(2025, 11, 3)),
        ("S004", "Wong Siew Lan", 1, 1.3350, 103.7180, NaiveDate::from_ymd_opt(2025, 12, 20)),
        ("S005", "Ng Boon Huat", 2, 1.3310, 103.7420, None),
        ("S006", "Chua Geok Hoon", 3, 1.3160, 103.7380, None),
        ("S007", "Lee Kim Seng", 2, 1.3240, 103.7160, None),
        ("S008", "Ong Bee Choo", 1, 1.3380, 103.7300, None),
        ("S009", "Koh Ah Huat", 3, 1.3290, 103.7050, None),
        ("S010", "Teo Siok Hwa", 2, 1.3400, 103.7250, None),
        ("S011", "Yeo Chin Huat", 1, 1.3475, 103.6920, None),
        ("S012", "Sim Lay Keng", 3, 1.3462, 103.6955, None),
    ];
    for (uid, name, wellbeing, lat, lng, last_visit) in seniors {
        upsert_senior(pool, uid, Some(name), wellbeing, Coord::new(lat, lng), last_visit).await?;
    }

    let volunteers = vec![
        ("V001", "alex.chen@sample.com", "Alex Chen", 1.3360, 103.7100, 3),
        ("V002", "sarah.krishnan@sample.com", "Sarah Krishnan", 1.3270, 103.7400, 2),
        ("V003", "marcus.lim@sample.com", "Marcus Lim", 1.3455, 103.6940, 1),
    ];
    for (vid, email, name, lat, lng, skill) in &volunteers {
        upsert_volunteer(pool, vid, email, name, Coord::new(*lat, *lng), *skill).await?;
    }

    let week = eligibility::target_week(today);
    let slots = [(9, 12), (14, 17)];
    let mut inserted = 0usize;
    for (_, email, ..) in &volunteers {
        for offset in [0, 2, 4] {
            for (start, end) in slots {
                let window = AvailabilityWindow {
                    volunteer_email: email.to_string(),
                    date: week.start + Duration::days(offset),
                    start: NaiveTime::from_hms_opt(start, 0, 0).context("invalid time")?,
                    end: NaiveTime::from_hms_opt(end, 0, 0).context("invalid time")?,
                };
                if insert_window(pool, &window).await? {
                    inserted += 1;
                }
            }
        }
    }
    info!(windows = inserted, week_start = %week.start, "seeded availability");

    Ok(())
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ImportKind {
    Seniors,
    Volunteers,
    Availability,
}

pub async fn import_csv(
    pool: &PgPool,
    kind: ImportKind,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct SeniorRow {
        uid: String,
        name: Option<String>,
        overall_wellbeing: i32,
        lat: f64,
        lng: f64,
        last_visit: Option<NaiveDate>,
    }

    #[derive(serde::Deserialize)]
    struct VolunteerRow {
        vid: String,
        email: String,
        name: String,
        lat: f64,
        lng: f64,
        skill: i32,
    }

    #[derive(serde::Deserialize)]
    struct AvailabilityRow {
        volunteer_email: String,
        date: NaiveDate,
        start_t: NaiveTime,
        end_t: NaiveTime,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut written = 0usize;

    match kind {
        ImportKind::Seniors => {
            for result in reader.deserialize::<SeniorRow>() {
                let row = result?;
                upsert_senior(
                    pool,
                    &row.uid,
                    row.name.as_deref(),
                    row.overall_wellbeing,
                    Coord::new(row.lat, row.lng),
                    row.last_visit,
                )
                .await?;
                written += 1;
            }
        }
        ImportKind::Volunteers => {
            for result in reader.deserialize::<VolunteerRow>() {
                let row = result?;
                upsert_volunteer(
                    pool,
                    &row.vid,
                    &row.email,
                    &row.name,
                    Coord::new(row.lat, row.lng),
                    row.skill,
                )
                .await?;
                written += 1;
            }
        }
        ImportKind::Availability => {
            for result in reader.deserialize::<AvailabilityRow>() {
                let row = result?;
                if row.end_t <= row.start_t {
                    anyhow::bail!(
                        "window for {} on {} ends before it starts",
                        row.volunteer_email,
                        row.date
                    );
                }
                let window = AvailabilityWindow {
                    volunteer_email: row.volunteer_email,
                    date: row.date,
                    start: row.start_t,
                    end: row.end_t,
                };
                if insert_window(pool, &window).await? {
                    written += 1;
                }
            }
        }
    }

    Ok(written)
}
