//! Treatment schedule: step-up doses, a first full dose, then weekly and
//! biweekly maintenance dosing, all derived from the date of the first dose.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::CalendarError;
use crate::view::WINDOW_DAYS;

pub const STEP_UP_DOSES: [&str; 4] = ["0.16 mg", "0.8 mg", "3 mg", "48 mg"];
pub const FULL_DOSE: &str = "48 mg";
pub const WEEKLY_DOSES: usize = 5;
pub const BIWEEKLY_DOSES: usize = 7;
pub const TREATMENT_DAYS: usize = STEP_UP_DOSES.len() + WEEKLY_DOSES + BIWEEKLY_DOSES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    StepUp,
    FirstFull,
    Weekly,
    Biweekly,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::StepUp, Phase::FirstFull, Phase::Weekly, Phase::Biweekly];

    pub fn name(self) -> &'static str {
        match self {
            Phase::StepUp => "Step-up",
            Phase::FirstFull => "First full",
            Phase::Weekly => "Weekly",
            Phase::Biweekly => "Biweekly",
        }
    }

    /// Parse a display name such as `"first full"`. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Phase> {
        let wanted = name.trim();
        Phase::ALL
            .into_iter()
            .find(|phase| phase.name().eq_ignore_ascii_case(wanted))
    }

    /// Medication and clinic checklist for a dose day of this phase.
    pub fn checklist(self) -> &'static [&'static str] {
        match self {
            Phase::StepUp => &["Dexamethasone", "Promethazine", "Acamol", "Fluids"],
            Phase::FirstFull => &["Acamol", "Full-day clinic"],
            Phase::Weekly => &["Acamol", "Monitor CBC"],
            Phase::Biweekly => &["Acamol", "Clinic check-in"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentDay {
    pub date: NaiveDate,
    pub dose: String,
    pub phase: Phase,
    pub checklist: Vec<String>,
    pub label: String,
}

impl TreatmentDay {
    fn new(date: NaiveDate, dose: &str, phase: Phase) -> Self {
        Self {
            date,
            dose: dose.to_string(),
            phase,
            checklist: phase.checklist().iter().map(|item| item.to_string()).collect(),
            label: date.format("%a %d %b").to_string(),
        }
    }
}

/// Parse a calendar day given as `YYYY-MM-DD`.
pub fn parse_day(input: &str) -> Result<NaiveDate, CalendarError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CalendarError::InvalidInput(
            "date is required (YYYY-MM-DD)".to_string(),
        ));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|e| {
        CalendarError::InvalidInput(format!("'{}' is not a valid date: {}", trimmed, e))
    })
}

/// Parse the date of the first dose.
///
/// Rejects empty or malformed input, and dates whose display window would run
/// past the end of the supported calendar.
pub fn parse_start_date(input: &str) -> Result<NaiveDate, CalendarError> {
    let date = parse_day(input)?;
    check_start_date(date)
}

pub fn check_start_date(date: NaiveDate) -> Result<NaiveDate, CalendarError> {
    // The last biweekly dose lands after the window, so check that one too
    let horizon = WINDOW_DAYS.max(21 + 7 * WEEKLY_DOSES + 14 * BIWEEKLY_DOSES);
    if date.checked_add_days(Days::new(horizon as u64)).is_none() {
        return Err(CalendarError::InvalidInput(format!(
            "start date {} is too far in the future",
            date
        )));
    }
    Ok(date)
}

/// Build the full 16-dose schedule starting at `start`.
///
/// Dates are strictly increasing: four doses a week apart (three step-up, one
/// first full), five weekly doses, then seven doses every two weeks.
pub fn generate_schedule(start: NaiveDate) -> Vec<TreatmentDay> {
    let mut days = Vec::with_capacity(TREATMENT_DAYS);

    for (i, dose) in STEP_UP_DOSES.iter().enumerate() {
        let phase = if i + 1 < STEP_UP_DOSES.len() {
            Phase::StepUp
        } else {
            Phase::FirstFull
        };
        days.push(TreatmentDay::new(start + Days::new(7 * i as u64), dose, phase));
    }

    let first_full = days[days.len() - 1].date;
    for i in 0..WEEKLY_DOSES {
        let date = first_full + Days::new(7 * (i as u64 + 1));
        days.push(TreatmentDay::new(date, FULL_DOSE, Phase::Weekly));
    }

    let last_weekly = days[days.len() - 1].date;
    for i in 0..BIWEEKLY_DOSES {
        let date = last_weekly + Days::new(14 * (i as u64 + 1));
        days.push(TreatmentDay::new(date, FULL_DOSE, Phase::Biweekly));
    }

    days
}

pub fn schedule_for_date(schedule: &[TreatmentDay], date: NaiveDate) -> Option<&TreatmentDay> {
    schedule
        .binary_search_by_key(&date, |day| day.date)
        .ok()
        .map(|idx| &schedule[idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn generates_sixteen_strictly_increasing_days() {
        for start in [date(2025, 7, 13), date(2024, 2, 29), date(1999, 12, 31)] {
            let schedule = generate_schedule(start);
            assert_eq!(schedule.len(), 16);
            assert!(schedule.windows(2).all(|w| w[0].date < w[1].date));
        }
    }

    #[test]
    fn step_up_block_matches_dosing_table() {
        let start = date(2025, 7, 13);
        let schedule = generate_schedule(start);

        let head: Vec<_> = schedule[..4]
            .iter()
            .map(|d| (d.date, d.dose.as_str(), d.phase))
            .collect();
        assert_eq!(
            head,
            vec![
                (start, "0.16 mg", Phase::StepUp),
                (date(2025, 7, 20), "0.8 mg", Phase::StepUp),
                (date(2025, 7, 27), "3 mg", Phase::StepUp),
                (date(2025, 8, 3), "48 mg", Phase::FirstFull),
            ]
        );
    }

    #[test]
    fn weekly_then_biweekly_spacing() {
        let start = date(2025, 7, 13);
        let schedule = generate_schedule(start);

        for pair in schedule[3..9].windows(2) {
            assert_eq!((pair[1].date - pair[0].date).num_days(), 7);
        }
        assert!(schedule[4..9].iter().all(|d| d.phase == Phase::Weekly && d.dose == "48 mg"));

        for pair in schedule[8..].windows(2) {
            assert_eq!((pair[1].date - pair[0].date).num_days(), 14);
        }
        assert!(schedule[9..].iter().all(|d| d.phase == Phase::Biweekly && d.dose == "48 mg"));

        // 3 weeks of step-up, 5 weekly, 7 biweekly
        assert_eq!(schedule[15].date, start + Days::new(21 + 35 + 98));
    }

    #[test]
    fn checklist_and_label_follow_phase() {
        let schedule = generate_schedule(date(2025, 7, 13));
        assert_eq!(schedule[0].label, "Sun 13 Jul");
        assert_eq!(
            schedule[0].checklist,
            vec!["Dexamethasone", "Promethazine", "Acamol", "Fluids"]
        );
        assert_eq!(schedule[3].checklist, vec!["Acamol", "Full-day clinic"]);
        assert_eq!(schedule[4].checklist, vec!["Acamol", "Monitor CBC"]);
        assert_eq!(schedule[15].checklist, vec!["Acamol", "Clinic check-in"]);
    }

    #[test]
    fn parse_start_date_rejects_bad_input() {
        assert_eq!(parse_start_date(" 2025-07-13 ").unwrap(), date(2025, 7, 13));
        assert!(matches!(parse_start_date(""), Err(CalendarError::InvalidInput(_))));
        assert!(matches!(parse_start_date("13/07/2025"), Err(CalendarError::InvalidInput(_))));
        assert!(matches!(parse_start_date("2025-02-30"), Err(CalendarError::InvalidInput(_))));
        assert!(matches!(check_start_date(NaiveDate::MAX), Err(CalendarError::InvalidInput(_))));
    }

    #[test]
    fn phase_names_parse_case_insensitively() {
        assert_eq!(Phase::from_name("first FULL"), Some(Phase::FirstFull));
        assert_eq!(Phase::from_name("Step-up"), Some(Phase::StepUp));
        assert_eq!(Phase::from_name("monthly"), None);
    }

    #[test]
    fn lookup_by_date() {
        let schedule = generate_schedule(date(2025, 7, 13));
        assert_eq!(
            schedule_for_date(&schedule, date(2025, 8, 3)).map(|d| d.phase),
            Some(Phase::FirstFull)
        );
        assert!(schedule_for_date(&schedule, date(2025, 8, 4)).is_none());
    }
}
