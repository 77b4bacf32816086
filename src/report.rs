use std::collections::BTreeMap;
use std::fmt::Write;

use crate::models::{ScheduledVisit, TargetWeek};

#[derive(Debug, Clone, PartialEq)]
pub struct VolunteerDigest {
    pub volunteer_name: String,
    pub volunteer_email: String,
    pub visits: usize,
    pub acknowledged: usize,
}

/// One entry per volunteer, ordered by email.
pub fn summarize_by_volunteer(visits: &[ScheduledVisit]) -> Vec<VolunteerDigest> {
    let mut map: BTreeMap<&str, VolunteerDigest> = BTreeMap::new();

    for visit in visits {
        let entry = map
            .entry(visit.volunteer_email.as_str())
            .or_insert_with(|| VolunteerDigest {
                volunteer_name: visit.volunteer_name.clone(),
                volunteer_email: visit.volunteer_email.clone(),
                visits: 0,
                acknowledged: 0,
            });
        entry.visits += 1;
        if visit.is_acknowledged {
            entry.acknowledged += 1;
        }
    }

    map.into_values().collect()
}

pub fn build_report(week: TargetWeek, visits: &[ScheduledVisit]) -> String {
    let digests = summarize_by_volunteer(visits);
    let mut output = String::new();

    let _ = writeln!(output, "# Weekly Visit Schedule");
    let _ = writeln!(output, "Week of {} to {}", week.start, week.end);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");

    if digests.is_empty() {
        let _ = writeln!(output, "No visits scheduled for this week.");
        return output;
    }

    let acknowledged: usize = digests.iter().map(|d| d.acknowledged).sum();
    let _ = writeln!(
        output,
        "- {} visits across {} volunteers ({} acknowledged)",
        visits.len(),
        digests.len(),
        acknowledged
    );

    for digest in &digests {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "## {} ({})",
            digest.volunteer_name, digest.volunteer_email
        );
        let _ = writeln!(
            output,
            "{} visits, {} acknowledged",
            digest.visits, digest.acknowledged
        );

        let mut own: Vec<&ScheduledVisit> = visits
            .iter()
            .filter(|v| v.volunteer_email == digest.volunteer_email)
            .collect();
        own.sort_by_key(|v| (v.date, v.start_time));

        for visit in own {
            let senior = visit
                .senior_name
                .clone()
                .unwrap_or_else(|| format!("Senior {}", visit.senior_id));
            let mark = if visit.is_acknowledged { "x" } else { " " };
            let reference = visit.assignment_id.simple().to_string();
            let _ = writeln!(
                output,
                "- [{}] {} {}-{}: visit {} (cluster {}, ref {})",
                mark,
                visit.date.format("%a %d %b"),
                visit.start_time.format("%H:%M"),
                visit.end_time.format("%H:%M"),
                senior,
                visit.cluster_id,
                &reference[..8]
            );
        }
    }

    output
}
