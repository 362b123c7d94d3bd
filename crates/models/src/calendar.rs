//! Operating calendar of the park.
//!
//! The venue advertises 9:00-19:00 opening hours, but only the day is
//! checked here.

use chrono::{Datelike, NaiveDate, Weekday};

/// (month, day) pairs the park is closed every year.
const HOLIDAYS: [(u32, u32); 2] = [(12, 25), (1, 1)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closure {
    Monday,
    Holiday,
}

pub fn closure_reason(date: NaiveDate) -> Option<Closure> {
    if date.weekday() == Weekday::Mon {
        return Some(Closure::Monday);
    }
    if HOLIDAYS.contains(&(date.month(), date.day())) {
        return Some(Closure::Holiday);
    }
    None
}

pub fn is_open(date: NaiveDate) -> bool {
    closure_reason(date).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn closed_on_mondays() {
        // 2025-10-27 and 2026-10-19 are Mondays
        assert!(!is_open(date(2025, 10, 27)));
        assert!(!is_open(date(2026, 10, 19)));
        assert_eq!(closure_reason(date(2026, 10, 19)), Some(Closure::Monday));
    }

    #[test]
    fn closed_on_christmas_and_new_year() {
        assert!(!is_open(date(2025, 12, 25)));
        assert!(!is_open(date(2026, 1, 1)));
        assert_eq!(closure_reason(date(2025, 12, 25)), Some(Closure::Holiday));
    }

    #[test]
    fn monday_takes_precedence_over_holiday() {
        // 2029-01-01 is a Monday
        assert_eq!(closure_reason(date(2029, 1, 1)), Some(Closure::Monday));
    }

    #[test]
    fn open_on_other_days() {
        // Tuesday through Sunday of the same week
        for day in 21..=26 {
            assert!(is_open(date(2025, 10, day)), "2025-10-{day} should be open");
        }
        assert!(is_open(date(2025, 12, 24)));
        assert!(is_open(date(2026, 12, 26)));
    }
}
