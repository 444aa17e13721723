use crate::errors::StatsError;
use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

pub const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Weekly schedule: the set of weekday indices (0 = Sunday .. 6 = Saturday) on
/// which a habit is due. Never empty once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct Schedule {
    mask: u8,
}

impl Schedule {
    pub const EVERYDAY: Schedule = Schedule { mask: 0b111_1111 };
    pub const WEEKDAYS: Schedule = Schedule { mask: 0b011_1110 };
    pub const WEEKENDS: Schedule = Schedule { mask: 0b100_0001 };

    pub fn from_days(days: &[u8]) -> Result<Self, StatsError> {
        let mut mask = 0u8;
        for &day in days {
            if day > 6 {
                return Err(StatsError::configuration(format!(
                    "weekday index {day} is outside 0..=6"
                )));
            }
            mask |= 1 << day;
        }
        if mask == 0 {
            return Err(StatsError::configuration(
                "schedule must contain at least one weekday",
            ));
        }
        Ok(Self { mask })
    }

    /// Resolves the presets offered when a habit is created: `everyday`,
    /// `weekdays`, `weekends` or a single day such as `mon`.
    pub fn from_preset(preset: &str) -> Result<Self, StatsError> {
        let preset = preset.trim().to_ascii_lowercase();
        match preset.as_str() {
            "everyday" | "daily" => Ok(Self::EVERYDAY),
            "weekdays" => Ok(Self::WEEKDAYS),
            "weekends" => Ok(Self::WEEKENDS),
            other => DAY_NAMES
                .iter()
                .position(|name| name.eq_ignore_ascii_case(other))
                .map(|index| Self { mask: 1 << index })
                .ok_or_else(|| {
                    StatsError::configuration(format!("unknown schedule preset '{other}'"))
                }),
        }
    }

    pub fn days(&self) -> Vec<u8> {
        (0..7u8).filter(|day| self.mask & (1 << day) != 0).collect()
    }

    pub fn len(&self) -> usize {
        self.mask.count_ones() as usize
    }

    pub fn contains(&self, weekday: Weekday) -> bool {
        self.mask & (1 << weekday.num_days_from_sunday()) != 0
    }

    pub fn is_scheduled(&self, date: NaiveDate) -> bool {
        self.contains(date.weekday())
    }

    /// `from` itself when scheduled, otherwise the nearest earlier scheduled date.
    pub fn walk_back(&self, from: NaiveDate) -> NaiveDate {
        let weekday = from.weekday().num_days_from_sunday();
        let offset = (0..7u32)
            .find(|back| self.mask & (1 << ((weekday + 7 - back) % 7)) != 0)
            .unwrap_or(0);
        from.checked_sub_days(Days::new(u64::from(offset)))
            .unwrap_or(NaiveDate::MIN)
    }

    /// The nearest scheduled date strictly before `date`.
    pub fn previous_before(&self, date: NaiveDate) -> Option<NaiveDate> {
        date.pred_opt().map(|prev| self.walk_back(prev))
    }

    /// Scheduled dates in `[start, end]`, ascending. Walk it with `.rev()` to go
    /// backward from `end`.
    pub fn enumerate(&self, start: NaiveDate, end: NaiveDate) -> ScheduledDates {
        ScheduledDates {
            schedule: *self,
            front: start,
            back: end,
            exhausted: start > end,
        }
    }

    pub fn label(&self) -> String {
        match *self {
            Self::EVERYDAY => "Everyday".to_string(),
            Self::WEEKDAYS => "Weekdays".to_string(),
            Self::WEEKENDS => "Weekends".to_string(),
            _ => self
                .days()
                .into_iter()
                .map(|day| DAY_NAMES[usize::from(day)])
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::EVERYDAY
    }
}

impl TryFrom<Vec<u8>> for Schedule {
    type Error = StatsError;

    fn try_from(days: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_days(&days)
    }
}

impl From<Schedule> for Vec<u8> {
    fn from(schedule: Schedule) -> Self {
        schedule.days()
    }
}

/// Lazy, cloneable walk over the scheduled dates of a bounded range.
#[derive(Debug, Clone)]
pub struct ScheduledDates {
    schedule: Schedule,
    front: NaiveDate,
    back: NaiveDate,
    exhausted: bool,
}

impl Iterator for ScheduledDates {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        while !self.exhausted {
            let date = self.front;
            if date == self.back {
                self.exhausted = true;
            } else {
                match date.succ_opt() {
                    Some(next) => self.front = next,
                    None => self.exhausted = true,
                }
            }
            if self.schedule.is_scheduled(date) {
                return Some(date);
            }
        }
        None
    }
}

impl DoubleEndedIterator for ScheduledDates {
    fn next_back(&mut self) -> Option<NaiveDate> {
        while !self.exhausted {
            let date = self.back;
            if date == self.front {
                self.exhausted = true;
            } else {
                match date.pred_opt() {
                    Some(prev) => self.back = prev,
                    None => self.exhausted = true,
                }
            }
            if self.schedule.is_scheduled(date) {
                return Some(date);
            }
        }
        None
    }
}

const YEARS: RangeInclusive<i32> = 1..=9999;

/// Parses a `YYYY-MM-DD` calendar date between years 1 and 9999.
pub fn parse_date(value: &str) -> Result<NaiveDate, StatsError> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|err| StatsError::configuration(format!("malformed date '{value}': {err}")))?;
    if !YEARS.contains(&date.year()) {
        return Err(StatsError::configuration(format!(
            "date '{value}' is outside years {}..={}",
            YEARS.start(),
            YEARS.end()
        )));
    }
    Ok(date)
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // 2024-01-01 is a Monday.
    const MON_WED_FRI: [u8; 3] = [1, 3, 5];

    #[test]
    fn empty_schedule_is_rejected() {
        let err = Schedule::from_days(&[]).unwrap_err();
        assert!(matches!(err, StatsError::Configuration(_)));
        let err = Schedule::from_days(&[7]).unwrap_err();
        assert!(matches!(err, StatsError::Configuration(_)));
    }

    #[test]
    fn is_scheduled_uses_sunday_based_indices() {
        let schedule = Schedule::from_days(&[0]).unwrap();
        assert!(schedule.is_scheduled(date(2024, 1, 7)));
        assert!(!schedule.is_scheduled(date(2024, 1, 8)));
    }

    #[test]
    fn walk_back_returns_same_or_earlier_scheduled_date() {
        let schedule = Schedule::from_days(&MON_WED_FRI).unwrap();
        assert_eq!(schedule.walk_back(date(2024, 1, 8)), date(2024, 1, 8));
        assert_eq!(schedule.walk_back(date(2024, 1, 7)), date(2024, 1, 5));
        assert_eq!(schedule.walk_back(date(2024, 1, 4)), date(2024, 1, 3));

        let sundays = Schedule::from_days(&[0]).unwrap();
        assert_eq!(sundays.walk_back(date(2024, 1, 13)), date(2024, 1, 7));
        assert_eq!(
            sundays.previous_before(date(2024, 1, 7)),
            Some(date(2023, 12, 31))
        );
    }

    #[test]
    fn enumerate_is_inclusive_and_reversible() {
        let schedule = Schedule::from_days(&MON_WED_FRI).unwrap();
        let dates: Vec<_> = schedule.enumerate(date(2024, 1, 1), date(2024, 1, 8)).collect();
        assert_eq!(
            dates,
            vec![date(2024, 1, 1), date(2024, 1, 3), date(2024, 1, 5), date(2024, 1, 8)]
        );

        let walk = schedule.enumerate(date(2024, 1, 1), date(2024, 1, 8));
        let backward: Vec<_> = walk.clone().rev().collect();
        assert_eq!(backward.first(), Some(&date(2024, 1, 8)));
        assert_eq!(walk.count(), 4);
    }

    #[test]
    fn enumerate_meets_in_the_middle() {
        let mut walk = Schedule::EVERYDAY.enumerate(date(2024, 1, 1), date(2024, 1, 3));
        assert_eq!(walk.next(), Some(date(2024, 1, 1)));
        assert_eq!(walk.next_back(), Some(date(2024, 1, 3)));
        assert_eq!(walk.next(), Some(date(2024, 1, 2)));
        assert_eq!(walk.next_back(), None);
    }

    #[test]
    fn enumerate_empty_when_range_inverted() {
        let walk = Schedule::EVERYDAY.enumerate(date(2024, 1, 5), date(2024, 1, 4));
        assert_eq!(walk.count(), 0);
    }

    #[test]
    fn presets_and_labels() {
        assert_eq!(Schedule::from_preset("weekdays").unwrap().days(), vec![1, 2, 3, 4, 5]);
        assert_eq!(Schedule::from_preset("Weekends").unwrap().days(), vec![0, 6]);
        assert_eq!(Schedule::from_preset("thu").unwrap().days(), vec![4]);
        assert!(Schedule::from_preset("fortnightly").is_err());

        assert_eq!(Schedule::EVERYDAY.label(), "Everyday");
        assert_eq!(Schedule::from_days(&MON_WED_FRI).unwrap().label(), "Mon, Wed, Fri");
    }

    #[test]
    fn schedule_serializes_as_day_indices() {
        let schedule = Schedule::from_days(&[5, 1]).unwrap();
        assert_eq!(serde_json::to_string(&schedule).unwrap(), "[1,5]");
        assert!(serde_json::from_str::<Schedule>("[]").is_err());
    }

    #[test]
    fn parse_date_rejects_malformed_input() {
        assert_eq!(parse_date("2024-02-29").unwrap(), date(2024, 2, 29));
        assert!(matches!(parse_date("2024-13-01"), Err(StatsError::Configuration(_))));
        assert!(matches!(parse_date("-262143-01-03"), Err(StatsError::Configuration(_))));
        assert!(matches!(parse_date("+262142-12-20"), Err(StatsError::Configuration(_))));
        assert_eq!(parse_date("0001-01-01").unwrap(), date(1, 1, 1));
        assert_eq!(parse_date("9999-12-31").unwrap(), date(9999, 12, 31));
        assert_eq!(date_key(date(2024, 3, 9)), "2024-03-09");
    }
}
