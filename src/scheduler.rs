//! Greedy visit scheduling.
//!
//! # Algorithm
//!
//! 1. Walk clusters densest first.
//! 2. Within a cluster, walk members by ascending wellbeing score.
//! 3. High-need seniors try the most skilled volunteers first; everyone else
//!    tries the least skilled first.
//! 4. The first unused window that fits a whole visit is committed.
//!
//! Nothing is revisited once committed, so the result is not globally optimal.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, info};

use crate::assigner::{
    distinct_volunteers, priority_order, windows_by_volunteer, VolunteerAllocation,
};
use crate::config::PlannerConfig;
use crate::models::{Assignment, AvailabilityWindow, Cluster, Diagnostics, VolunteerRecord};

type SlotKey = (String, NaiveDate, NaiveTime);

pub fn generate_schedule(
    clusters: &[Cluster],
    volunteers: &[VolunteerRecord],
    allocation: &VolunteerAllocation,
    windows: &[AvailabilityWindow],
    config: &PlannerConfig,
    diagnostics: &mut Diagnostics,
) -> Vec<Assignment> {
    let availability = windows_by_volunteer(windows);
    let (volunteers, _) = distinct_volunteers(volunteers);
    let duration = config.visit_duration();
    let mut used_slots: HashSet<SlotKey> = HashSet::new();
    let mut scheduled: HashSet<&str> = HashSet::new();
    let mut assignments = Vec::new();

    for cluster in priority_order(clusters) {
        let mut seniors: Vec<_> = cluster.members.iter().collect();
        seniors.sort_by_key(|s| s.wellbeing);

        let mut crew: Vec<&VolunteerRecord> = volunteers
            .iter()
            .copied()
            .filter(|v| allocation.get(&v.email) == Some(&cluster.id))
            .filter(|v| availability.contains_key(v.email.as_str()))
            .collect();
        crew.sort_by(|a, b| b.skill.cmp(&a.skill));

        debug!(
            cluster = cluster.id,
            volunteers = crew.len(),
            seniors = seniors.len(),
            "scheduling cluster"
        );

        for senior in seniors {
            if scheduled.contains(senior.id.as_str()) {
                continue;
            }

            let mut candidates = crew.clone();
            if senior.wellbeing > config.high_need_max_score {
                candidates.sort_by(|a, b| a.skill.cmp(&b.skill));
            }

            let placed = candidates.iter().find_map(|volunteer| {
                let slots = availability.get(volunteer.email.as_str())?;
                slots.iter().find_map(|window| {
                    let key = (volunteer.email.clone(), window.date, window.start);
                    if used_slots.contains(&key) {
                        return None;
                    }
                    let (end, wrapped) = window.start.overflowing_add_signed(duration);
                    if wrapped != 0 || end > window.end {
                        return None;
                    }
                    Some((*volunteer, *window, key, end))
                })
            });

            match placed {
                Some((volunteer, window, key, end)) => {
                    used_slots.insert(key);
                    scheduled.insert(senior.id.as_str());
                    debug!(
                        senior = %senior.id,
                        volunteer = %volunteer.email,
                        volunteer_name = %volunteer.name,
                        date = %window.date,
                        start = %window.start,
                        cluster = cluster.id,
                        "visit scheduled"
                    );
                    assignments.push(Assignment {
                        volunteer_id: volunteer.id.clone(),
                        volunteer_email: volunteer.email.clone(),
                        senior_id: senior.id.clone(),
                        date: window.date,
                        start_time: window.start,
                        end_time: end,
                        cluster_id: senior.cluster_id.unwrap_or(cluster.id),
                        is_acknowledged: false,
                    });
                }
                None => {
                    debug!(senior = %senior.id, cluster = cluster.id, "no slot for senior");
                    diagnostics.unscheduled_seniors.push(senior.id.clone());
                }
            }
        }
    }

    info!(
        visits = assignments.len(),
        unscheduled = diagnostics.unscheduled_seniors.len(),
        "schedule generated"
    );
    assignments
}
