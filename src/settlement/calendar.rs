use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Maps dates onto season weeks.
///
/// Week N covers `[start + 7(N-1) days, start + 7N days)`; `start` is the
/// Tuesday before the first game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeasonCalendar {
    pub season: i32,
    pub start: NaiveDate,
    pub weeks: i32,
}

impl SeasonCalendar {
    pub fn new(season: i32, start: NaiveDate, weeks: i32) -> Self {
        Self {
            season,
            start,
            weeks: weeks.max(1),
        }
    }

    pub fn week_for(&self, date: NaiveDate) -> i32 {
        let days = (date - self.start).num_days();
        if days < 0 {
            return 1;
        }
        let week = i32::try_from(days / 7 + 1).unwrap_or(i32::MAX);
        week.min(self.weeks)
    }

    /// Week being played right now
    pub fn current_week(&self, now: DateTime<Utc>) -> i32 {
        self.week_for(now.date_naive())
    }

    /// Most recent week whose games could all be over: the week that
    /// contained yesterday.
    pub fn completed_week(&self, now: DateTime<Utc>) -> i32 {
        self.week_for((now - Duration::days(1)).date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn calendar() -> SeasonCalendar {
        SeasonCalendar::new(2026, NaiveDate::from_ymd_opt(2026, 9, 8).unwrap(), 18)
    }

    #[test]
    fn test_week_boundaries() {
        let cal = calendar();
        assert_eq!(cal.week_for(NaiveDate::from_ymd_opt(2026, 9, 1).unwrap()), 1);
        assert_eq!(cal.week_for(NaiveDate::from_ymd_opt(2026, 9, 8).unwrap()), 1);
        assert_eq!(cal.week_for(NaiveDate::from_ymd_opt(2026, 9, 14).unwrap()), 1);
        assert_eq!(cal.week_for(NaiveDate::from_ymd_opt(2026, 9, 15).unwrap()), 2);
        assert_eq!(cal.week_for(NaiveDate::from_ymd_opt(2027, 6, 1).unwrap()), 18);
    }

    #[test]
    fn test_completed_week_on_tuesday_is_previous_week() {
        let cal = calendar();
        // Tuesday of week 4
        let tuesday = Utc.with_ymd_and_hms(2026, 9, 29, 10, 0, 0).unwrap();
        assert_eq!(cal.current_week(tuesday), 4);
        assert_eq!(cal.completed_week(tuesday), 3);
    }
}
