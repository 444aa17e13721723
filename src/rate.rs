use crate::models::{CompletionMap, Habit};
use crate::schedule::{Schedule, ScheduledDates};
use chrono::{Datelike, Days, Months, NaiveDate};
use std::collections::BTreeSet;
use std::ops::AddAssign;

/// Inclusive calendar-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn single_day(date: NaiveDate) -> Self {
        Self::new(date, date)
    }

    /// `days` days ending at `end`, inclusive.
    pub fn rolling(end: NaiveDate, days: u32) -> Self {
        let span = u64::from(days.max(1) - 1);
        Self::new(days_before(end, span), end)
    }

    pub fn month_to_date(reference: NaiveDate) -> Self {
        Self::new(first_of_month(reference), reference)
    }

    pub fn full_month(date: NaiveDate) -> Self {
        Self::new(first_of_month(date), last_of_month(date))
    }

    /// Monday through Sunday of the week holding `date`.
    pub fn calendar_week(date: NaiveDate) -> Self {
        let monday = days_before(date, u64::from(date.weekday().num_days_from_monday()));
        Self::new(monday, days_after(monday, 6))
    }

    /// Same elapsed-day count in the previous month, clamped to that month's end.
    pub fn comparable_previous_month(&self) -> Self {
        let start = months_before(first_of_month(self.start), 1);
        let month_end = last_of_month(start);
        let elapsed = u64::try_from(self.len_days().max(1) - 1).unwrap_or(0);
        Self::new(start, days_after(start, elapsed).min(month_end))
    }

    pub fn len_days(&self) -> i64 {
        if self.start > self.end {
            0
        } else {
            (self.end - self.start).num_days() + 1
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn days(&self) -> ScheduledDates {
        Schedule::EVERYDAY.enumerate(self.start, self.end)
    }
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn last_of_month(date: NaiveDate) -> NaiveDate {
    first_of_month(date)
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

// Date steps clamp to the representable range instead of overflowing.

pub fn days_before(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_sub_days(Days::new(days))
        .unwrap_or(NaiveDate::MIN)
}

pub fn days_after(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_add_days(Days::new(days))
        .unwrap_or(NaiveDate::MAX)
}

pub fn months_before(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}

pub fn months_after(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

/// Scheduled slots (`possible`) and the completed ones among them (`actual`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateTally {
    pub possible: u32,
    pub actual: u32,
}

impl RateTally {
    pub fn for_habit(habit: &Habit, completed: Option<&BTreeSet<NaiveDate>>, window: DateWindow) -> Self {
        let mut tally = Self::default();
        for date in habit.active_dates(window.start, window.end) {
            tally.possible += 1;
            if completed.is_some_and(|dates| dates.contains(&date)) {
                tally.actual += 1;
            }
        }
        tally
    }

    pub fn percentage(&self) -> u8 {
        round_percentage(self.actual, self.possible)
    }
}

impl AddAssign for RateTally {
    fn add_assign(&mut self, other: Self) {
        self.possible += other.possible;
        self.actual += other.actual;
    }
}

/// `round(100 * actual / possible)` with halves rounded up; 0 when nothing was possible.
pub fn round_percentage(actual: u32, possible: u32) -> u8 {
    if possible == 0 {
        return 0;
    }
    let actual = u64::from(actual.min(possible));
    let possible = u64::from(possible);
    ((200 * actual + possible) / (2 * possible)) as u8
}

pub fn tally_window(habits: &[Habit], completed: &CompletionMap, window: DateWindow) -> RateTally {
    let mut total = RateTally::default();
    for habit in habits {
        total += RateTally::for_habit(habit, completed.get(&habit.id), window);
    }
    total
}

/// Completion percentage of a batch of habits over `[window_start, window_end]`.
pub fn completion_rate(
    habits: &[Habit],
    completed: &CompletionMap,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> u8 {
    tally_window(habits, completed, DateWindow::new(window_start, window_end)).percentage()
}

/// Rate of `current` minus the rate of its comparable previous-month window.
pub fn trend(habits: &[Habit], completed: &CompletionMap, current: DateWindow) -> i16 {
    let previous = current.comparable_previous_month();
    let now = tally_window(habits, completed, current).percentage();
    let before = tally_window(habits, completed, previous).percentage();
    i16::from(now) - i16::from(before)
}

/// A calendar month as seen from `today`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthView {
    pub month_start: NaiveDate,
    pub reference: NaiveDate,
}

impl MonthView {
    /// The current month is viewed up to today, past months up to their last day.
    /// Future months have no reference date.
    pub fn resolve(month: NaiveDate, today: NaiveDate) -> Option<Self> {
        let month_start = first_of_month(month);
        let current_start = first_of_month(today);
        if month_start > current_start {
            return None;
        }
        let reference = if month_start == current_start {
            today
        } else {
            last_of_month(month_start)
        };
        Some(Self {
            month_start,
            reference,
        })
    }

    pub fn window(&self) -> DateWindow {
        DateWindow::new(self.month_start, self.reference)
    }
}
