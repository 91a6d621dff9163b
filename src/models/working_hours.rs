use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DayHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

/// Static clinic schedule: one optional open/close pair per weekday.
/// `None` means the clinic is closed that day. Read-only after load.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingHours {
    days: [Option<DayHours>; 7],
}

#[derive(Debug, Deserialize)]
struct RawDay {
    open: String,
    close: String,
}

impl WorkingHours {
    /// Parse a schedule like
    /// `{"monday":{"open":"09:00","close":"17:00"},...,"sunday":null}`.
    /// Missing weekdays are treated as closed.
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let raw: std::collections::HashMap<String, Option<RawDay>> = serde_json::from_str(s)?;

        let mut days = [None; 7];
        for (day, hours) in raw {
            let weekday = parse_weekday(&day)?;
            if let Some(h) = hours {
                let open = parse_time(&h.open)?;
                let close = parse_time(&h.close)?;
                if open >= close {
                    anyhow::bail!("{day}: open {open} is not before close {close}");
                }
                days[weekday.num_days_from_monday() as usize] = Some(DayHours { open, close });
            }
        }
        Ok(Self { days })
    }

    /// Read the schedule file, falling back to the default schedule when the
    /// file does not exist.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path, "schedule file not found, using default working hours");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn for_day(&self, weekday: Weekday) -> Option<DayHours> {
        self.days[weekday.num_days_from_monday() as usize]
    }

    pub fn for_date(&self, date: NaiveDate) -> Option<DayHours> {
        self.for_day(date.weekday())
    }

    /// Whether `[start, end)` on `date` falls entirely within that day's
    /// open hours.
    pub fn fits(&self, date: NaiveDate, start: NaiveTime, end: NaiveTime) -> bool {
        match self.for_date(date) {
            Some(h) => start >= h.open && end <= h.close,
            None => false,
        }
    }

    pub fn to_human_readable(&self) -> String {
        const LABELS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
        let mut parts = Vec::new();
        for (i, hours) in self.days.iter().enumerate() {
            if let Some(h) = hours {
                parts.push(format!(
                    "{}: {}-{}",
                    LABELS[i],
                    h.open.format("%H:%M"),
                    h.close.format("%H:%M")
                ));
            }
        }
        parts.join(", ")
    }
}

impl Default for WorkingHours {
    /// Mon-Fri 09:00-17:00, Sat 09:00-13:00, Sun closed.
    fn default() -> Self {
        let weekday = Some(DayHours {
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            close: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        });
        let saturday = Some(DayHours {
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            close: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
        });
        Self {
            days: [weekday, weekday, weekday, weekday, weekday, saturday, None],
        }
    }
}

fn parse_weekday(s: &str) -> anyhow::Result<Weekday> {
    match s.to_lowercase().as_str() {
        "monday" | "mon" => Ok(Weekday::Mon),
        "tuesday" | "tue" => Ok(Weekday::Tue),
        "wednesday" | "wed" => Ok(Weekday::Wed),
        "thursday" | "thu" => Ok(Weekday::Thu),
        "friday" | "fri" => Ok(Weekday::Fri),
        "saturday" | "sat" => Ok(Weekday::Sat),
        "sunday" | "sun" => Ok(Weekday::Sun),
        _ => Err(anyhow::anyhow!("invalid weekday: {s}")),
    }
}

fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|_| anyhow::anyhow!("invalid time: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_parse_valid_json() {
        let json = r#"{"monday":{"open":"09:00","close":"17:00"},"sunday":null}"#;
        let hours = WorkingHours::from_json(json).unwrap();
        assert_eq!(
            hours.for_day(Weekday::Mon),
            Some(DayHours { open: t("09:00"), close: t("17:00") })
        );
        assert_eq!(hours.for_day(Weekday::Sun), None);
        // Unlisted days are closed
        assert_eq!(hours.for_day(Weekday::Tue), None);
    }

    #[test]
    fn test_parse_rejects_bad_day() {
        let json = r#"{"someday":{"open":"09:00","close":"17:00"}}"#;
        assert!(WorkingHours::from_json(json).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_time() {
        let json = r#"{"monday":{"open":"25:00","close":"17:00"}}"#;
        assert!(WorkingHours::from_json(json).is_err());
    }

    #[test]
    fn test_parse_rejects_inverted_hours() {
        let json = r#"{"monday":{"open":"17:00","close":"09:00"}}"#;
        assert!(WorkingHours::from_json(json).is_err());
    }

    #[test]
    fn test_default_schedule() {
        let hours = WorkingHours::default();
        assert_eq!(
            hours.for_day(Weekday::Fri),
            Some(DayHours { open: t("09:00"), close: t("17:00") })
        );
        assert_eq!(
            hours.for_day(Weekday::Sat),
            Some(DayHours { open: t("09:00"), close: t("13:00") })
        );
        assert_eq!(hours.for_day(Weekday::Sun), None);
    }

    #[test]
    fn test_fits() {
        let hours = WorkingHours::default();
        // 2030-06-17 is a Monday
        assert!(hours.fits(d("2030-06-17"), t("09:00"), t("09:30")));
        assert!(hours.fits(d("2030-06-17"), t("16:30"), t("17:00")));
        assert!(!hours.fits(d("2030-06-17"), t("16:45"), t("17:15")));
        assert!(!hours.fits(d("2030-06-17"), t("08:30"), t("09:00")));
        // 2030-06-16 is a Sunday
        assert!(!hours.fits(d("2030-06-16"), t("10:00"), t("10:30")));
    }

    #[test]
    fn test_to_human_readable() {
        let json = r#"{"monday":{"open":"09:00","close":"17:00"},"saturday":{"open":"09:00","close":"13:00"}}"#;
        let hours = WorkingHours::from_json(json).unwrap();
        assert_eq!(hours.to_human_readable(), "Mon: 09:00-17:00, Sat: 09:00-13:00");
    }
}
