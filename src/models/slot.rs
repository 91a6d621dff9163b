use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// One cell of the day's appointment grid. Slots are aligned to the opening
/// time and stepped by the appointment type's duration, so `start < end`
/// always holds and a slot never crosses midnight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TimeSlot {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub available: bool,
}

impl TimeSlot {
    pub fn label(&self) -> String {
        format!("{} - {}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// Coarse time-of-day preference: morning before 12:00, afternoon
/// 12:00-17:00, evening from 17:00.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimePreference {
    Morning,
    Afternoon,
    Evening,
}

impl TimePreference {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "morning" => Some(TimePreference::Morning),
            "afternoon" => Some(TimePreference::Afternoon),
            "evening" => Some(TimePreference::Evening),
            _ => None,
        }
    }

    pub fn contains(&self, start: NaiveTime) -> bool {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let five_pm = NaiveTime::from_hms_opt(17, 0, 0).unwrap();
        match self {
            TimePreference::Morning => start < noon,
            TimePreference::Afternoon => start >= noon && start < five_pm,
            TimePreference::Evening => start >= five_pm,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimePreference::Morning => "morning",
            TimePreference::Afternoon => "afternoon",
            TimePreference::Evening => "evening",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    #[test]
    fn test_preference_bands() {
        assert!(TimePreference::Morning.contains(t("09:00")));
        assert!(TimePreference::Morning.contains(t("11:30")));
        assert!(!TimePreference::Morning.contains(t("12:00")));

        assert!(TimePreference::Afternoon.contains(t("12:00")));
        assert!(TimePreference::Afternoon.contains(t("16:30")));
        assert!(!TimePreference::Afternoon.contains(t("17:00")));

        assert!(TimePreference::Evening.contains(t("17:00")));
        assert!(!TimePreference::Evening.contains(t("16:59")));
    }

    #[test]
    fn test_parse() {
        assert_eq!(TimePreference::parse("Morning"), Some(TimePreference::Morning));
        assert_eq!(TimePreference::parse(" afternoon "), Some(TimePreference::Afternoon));
        assert_eq!(TimePreference::parse("midnight"), None);
    }
}
