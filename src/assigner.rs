//! Volunteer-to-cluster assignment: one coverage pass, then a fill pass.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::models::{AvailabilityWindow, Cluster, Diagnostics, VolunteerRecord};

/// Volunteer contact identity to cluster id.
pub type VolunteerAllocation = BTreeMap<String, i32>;

/// Windows grouped by volunteer contact identity, in input order.
pub fn windows_by_volunteer(
    windows: &[AvailabilityWindow],
) -> HashMap<&str, Vec<&AvailabilityWindow>> {
    let mut map: HashMap<&str, Vec<&AvailabilityWindow>> = HashMap::new();
    for window in windows {
        map.entry(window.volunteer_email.as_str())
            .or_default()
            .push(window);
    }
    map
}

/// Densest clusters first, then larger ones, then lower ids.
pub fn priority_order(clusters: &[Cluster]) -> Vec<&Cluster> {
    let mut ordered: Vec<&Cluster> = clusters.iter().collect();
    ordered.sort_by(|a, b| {
        b.density
            .total_cmp(&a.density)
            .then(b.len().cmp(&a.len()))
            .then(a.id.cmp(&b.id))
    });
    ordered
}

/// First record per contact identity, plus the records shadowed by an
/// earlier one with the same email.
pub fn distinct_volunteers(
    volunteers: &[VolunteerRecord],
) -> (Vec<&VolunteerRecord>, Vec<&VolunteerRecord>) {
    let mut seen: HashSet<&str> = HashSet::new();
    volunteers.iter().partition(|v| {
        let volunteer: &VolunteerRecord = *v;
        seen.insert(volunteer.email.as_str())
    })
}

pub fn assign_volunteers(
    clusters: &[Cluster],
    volunteers: &[VolunteerRecord],
    windows: &[AvailabilityWindow],
    diagnostics: &mut Diagnostics,
) -> VolunteerAllocation {
    let availability = windows_by_volunteer(windows);
    let (distinct, duplicates) = distinct_volunteers(volunteers);
    for volunteer in duplicates {
        diagnostics.warn(format!(
            "volunteer {} appears more than once; keeping the first record",
            volunteer.email
        ));
    }

    let mut available: Vec<&VolunteerRecord> = Vec::new();
    for volunteer in distinct {
        if availability.contains_key(volunteer.email.as_str()) {
            available.push(volunteer);
        } else {
            diagnostics.idle_volunteers.push(volunteer.email.clone());
        }
    }

    let mut allocation = VolunteerAllocation::new();
    if clusters.is_empty() {
        return allocation;
    }

    let mut used = vec![false; available.len()];
    for cluster in priority_order(clusters) {
        let nearest = available
            .iter()
            .enumerate()
            .filter(|(i, _)| !used[*i])
            .map(|(i, v)| (i, v.coords.distance(&cluster.centroid)))
            .fold(None, |best: Option<(usize, f64)>, candidate| match best {
                Some((_, best_dist)) if best_dist <= candidate.1 => best,
                _ => Some(candidate),
            });

        match nearest {
            Some((i, dist)) => {
                used[i] = true;
                allocation.insert(available[i].email.clone(), cluster.id);
                debug!(
                    cluster = cluster.id,
                    volunteer = %available[i].email,
                    distance = dist,
                    "coverage assignment"
                );
            }
            None => {
                warn!(cluster = cluster.id, "no volunteer left to cover cluster");
                diagnostics.uncovered_clusters.push(cluster.id);
            }
        }
    }

    for (i, volunteer) in available.iter().enumerate() {
        if used[i] {
            continue;
        }
        if let Some(cluster_id) = nearest_cluster(volunteer, clusters) {
            allocation.insert(volunteer.email.clone(), cluster_id);
            debug!(cluster = cluster_id, volunteer = %volunteer.email, "fill assignment");
        }
    }

    if !diagnostics.uncovered_clusters.is_empty() {
        diagnostics.warn(format!(
            "{} of {} clusters have no volunteer",
            diagnostics.uncovered_clusters.len(),
            clusters.len()
        ));
    }
    info!(
        available = available.len(),
        assigned = allocation.len(),
        uncovered = diagnostics.uncovered_clusters.len(),
        "volunteers assigned to clusters"
    );
    allocation
}

/// Nearest centroid; equal distances go to the lower cluster id.
fn nearest_cluster(volunteer: &VolunteerRecord, clusters: &[Cluster]) -> Option<i32> {
    clusters
        .iter()
        .map(|c| (c.id, volunteer.coords.distance(&c.centroid)))
        .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
        .map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coord, SeniorRecord};
    use chrono::{NaiveDate, NaiveTime};

    fn cluster(id: i32, lat: f64, lng: f64, density: f64) -> Cluster {
        Cluster {
            id,
            centroid: Coord::new(lat, lng),
            radius: 0.01,
            density,
            members: Vec::new(),
        }
    }

    fn volunteer(email: &str, lat: f64, lng: f64) -> VolunteerRecord {
        VolunteerRecord {
            id: format!("v-{email}"),
            email: email.to_string(),
            name: email.to_string(),
            coords: Coord::new(lat, lng),
            skill: 2,
        }
    }

    fn window(email: &str) -> AvailabilityWindow {
        AvailabilityWindow {
            volunteer_email: email.to_string(),
            date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn coverage_then_fill() {
        let clusters = vec![cluster(1, 0.0, 0.0, 50.0), cluster(2, 1.0, 1.0, 10.0)];
        let volunteers = vec![
            volunteer("a1", 0.01, 0.0),
            volunteer("a2", 0.02, 0.0),
            volunteer("b1", 0.98, 1.0),
        ];
        let windows = vec![window("a1"), window("a2"), window("b1")];
        let mut diagnostics = Diagnostics::default();

        let allocation = assign_volunteers(&clusters, &volunteers, &windows, &mut diagnostics);

        assert_eq!(allocation.get("a1"), Some(&1));
        assert_eq!(allocation.get("b1"), Some(&2));
        assert_eq!(allocation.get("a2"), Some(&1));
        assert!(diagnostics.uncovered_clusters.is_empty());
        for c in &clusters {
            assert!(allocation.values().any(|&id| id == c.id));
        }
    }

    #[test]
    fn coverage_pass_serves_densest_cluster_first() {
        // one volunteer sits between both clusters, slightly nearer the sparse one
        let clusters = vec![cluster(1, 0.0, 0.0, 5.0), cluster(2, 1.0, 0.0, 80.0)];
        let volunteers = vec![volunteer("mid", 0.45, 0.0)];
        let windows = vec![window("mid")];
        let mut diagnostics = Diagnostics::default();

        let allocation = assign_volunteers(&clusters, &volunteers, &windows, &mut diagnostics);

        assert_eq!(allocation.get("mid"), Some(&2));
        assert_eq!(diagnostics.uncovered_clusters, vec![1]);
        assert_eq!(diagnostics.warnings.len(), 1);
    }

    #[test]
    fn volunteers_without_windows_are_left_out() {
        let clusters = vec![cluster(1, 0.0, 0.0, 1.0)];
        let volunteers = vec![volunteer("busy", 0.0, 0.0), volunteer("free", 0.5, 0.5)];
        let windows = vec![window("free")];
        let mut diagnostics = Diagnostics::default();

        let allocation = assign_volunteers(&clusters, &volunteers, &windows, &mut diagnostics);

        assert_eq!(allocation.len(), 1);
        assert_eq!(allocation.get("free"), Some(&1));
        assert_eq!(diagnostics.idle_volunteers, vec!["busy".to_string()]);
    }

    #[test]
    fn density_ties_break_on_member_count() {
        let small = cluster(1, 0.0, 0.0, 10.0);
        let mut large = cluster(2, 0.0, 1.0, 10.0);
        large.members = vec![SeniorRecord {
            id: "s".into(),
            coords: Coord::new(0.0, 1.0),
            wellbeing: 1,
            last_visit: None,
            cluster_id: Some(2),
        }];
        let clusters = vec![small, large];
        let ordered: Vec<i32> = priority_order(&clusters).iter().map(|c| c.id).collect();
        assert_eq!(ordered, vec![2, 1]);
    }

    #[test]
    fn no_clusters_means_no_allocation() {
        let volunteers = vec![volunteer("a", 0.0, 0.0)];
        let windows = vec![window("a")];
        let mut diagnostics = Diagnostics::default();
        let allocation = assign_volunteers(&[], &volunteers, &windows, &mut diagnostics);
        assert!(allocation.is_empty());
    }

    #[test]
    fn repeated_email_keeps_the_first_record() {
        let clusters = vec![cluster(1, 0.0, 0.0, 1.0)];
        let mut second = volunteer("x@a", 0.0, 0.0);
        second.id = "second".into();
        let volunteers = vec![volunteer("x@a", 0.5, 0.5), second];
        let windows = vec![window("x@a")];
        let mut diagnostics = Diagnostics::default();

        let (distinct, duplicates) = distinct_volunteers(&volunteers);
        assert_eq!(distinct.len(), 1);
        assert_eq!(distinct[0].id, "v-x@a");
        assert_eq!(duplicates[0].id, "second");

        let allocation = assign_volunteers(&clusters, &volunteers, &windows, &mut diagnostics);
        assert_eq!(allocation.get("x@a"), Some(&1));
        assert_eq!(diagnostics.warnings.len(), 1);
    }
}
