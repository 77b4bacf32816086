use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lng: f64,
}

impl Coord {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Planar distance in degree space.
    pub fn distance(&self, other: &Coord) -> f64 {
        self.distance_sq(other).sqrt()
    }

    pub fn distance_sq(&self, other: &Coord) -> f64 {
        (self.lat - other.lat).powi(2) + (self.lng - other.lng).powi(2)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeniorRecord {
    pub id: String,
    pub coords: Coord,
    pub wellbeing: i32,
    pub last_visit: Option<NaiveDate>,
    pub cluster_id: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VolunteerRecord {
    pub id: String,
    pub email: String,
    pub name: String,
    pub coords: Coord,
    pub skill: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AvailabilityWindow {
    pub volunteer_email: String,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

#[derive(Debug, Clone)]
pub struct Cluster {
    pub id: i32,
    pub centroid: Coord,
    pub radius: f64,
    pub density: f64,
    pub members: Vec<SeniorRecord>,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub volunteer_id: String,
    pub volunteer_email: String,
    pub senior_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub cluster_id: i32,
    pub is_acknowledged: bool,
}

/// Monday to Sunday, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetWeek {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TargetWeek {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Shortfalls each stage reports without failing the run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub warnings: Vec<String>,
    pub uncovered_clusters: Vec<i32>,
    pub unscheduled_seniors: Vec<String>,
    pub idle_volunteers: Vec<String>,
    pub outlier_splits: usize,
}

impl Diagnostics {
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
            && self.uncovered_clusters.is_empty()
            && self.unscheduled_seniors.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub message: String,
    pub clusters_count: usize,
    pub schedules_created: usize,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub week: TargetWeek,
    pub clusters: Vec<Cluster>,
    pub assignments: Vec<Assignment>,
    pub diagnostics: Diagnostics,
}

/// A persisted assignment joined with display names, used by the weekly digest.
#[derive(Debug, Clone)]
pub struct ScheduledVisit {
    pub assignment_id: Uuid,
    pub volunteer_name: String,
    pub volunteer_email: String,
    pub senior_id: String,
    pub senior_name: Option<String>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub cluster_id: i32,
    pub is_acknowledged: bool,
}
