use chrono::{Datelike, Duration, Months, NaiveDate, Utc};

use crate::config::PlannerConfig;
use crate::models::{SeniorRecord, TargetWeek};

/// Urgent seniors are due once their last visit is older than the revisit
/// interval; everyone else is due if not yet visited this calendar year.
pub fn is_eligible(senior: &SeniorRecord, today: NaiveDate, config: &PlannerConfig) -> bool {
    let Some(last_visit) = senior.last_visit else {
        return true;
    };

    if senior.wellbeing == config.urgent_score {
        last_visit < revisit_cutoff(today, config.urgent_revisit_months)
    } else {
        last_visit < start_of_year(today)
    }
}

pub fn eligible_seniors(
    seniors: Vec<SeniorRecord>,
    today: NaiveDate,
    config: &PlannerConfig,
) -> Vec<SeniorRecord> {
    seniors
        .into_iter()
        .filter(|s| is_eligible(s, today, config))
        .collect()
}

pub fn revisit_cutoff(today: NaiveDate, months: u32) -> NaiveDate {
    today
        .checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}

pub fn start_of_year(today: NaiveDate) -> NaiveDate {
    NaiveDate::from_yo_opt(today.year(), 1).unwrap_or(today)
}

/// The Monday to Sunday after the current, or upcoming, Sunday.
pub fn target_week(today: NaiveDate) -> TargetWeek {
    let days_to_sunday = (7 - today.weekday().num_days_from_sunday()) % 7;
    let sunday = today + Duration::days(i64::from(days_to_sunday));
    let start = sunday + Duration::days(1);
    TargetWeek {
        start,
        end: start + Duration::days(6),
    }
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
