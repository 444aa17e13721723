//! Streak and miss accounting over a habit's scheduled dates.
//!
//! The reference date is the "as of" day. Its slot stays open until the day is
//! over: an uncompleted reference date neither breaks the current streak nor
//! counts as a miss.

use crate::models::{DerivedStats, Habit};
use chrono::NaiveDate;
use std::collections::BTreeSet;

/// Consecutive completed scheduled dates ending at the last scheduled date on or
/// before `reference`, looking past an open reference slot.
pub fn current_streak(habit: &Habit, completed: &BTreeSet<NaiveDate>, reference: NaiveDate) -> u32 {
    if reference < habit.created_at {
        return 0;
    }

    habit
        .enumerate_scheduled(habit.created_at, reference)
        .rev()
        .skip_while(|date| *date == reference && !completed.contains(date))
        .take_while(|date| completed.contains(date))
        .count() as u32
}

/// `(highest_streak, highest_miss_streak)` over the habit's whole lifetime up to
/// and including `reference`.
pub fn lifetime_extremes(
    habit: &Habit,
    completed: &BTreeSet<NaiveDate>,
    reference: NaiveDate,
) -> (u32, u32) {
    let tally = scan(habit, completed, reference);
    (tally.highest_streak, tally.highest_miss_streak)
}

/// Scheduled dates in `[created_at, reference)` without a completion.
pub fn missed_count(habit: &Habit, completed: &BTreeSet<NaiveDate>, reference: NaiveDate) -> u32 {
    scan(habit, completed, reference).missed
}

pub fn derive_stats(
    habit: &Habit,
    completed: &BTreeSet<NaiveDate>,
    reference: NaiveDate,
) -> DerivedStats {
    let tally = scan(habit, completed, reference);
    DerivedStats {
        completed_count: tally.completed,
        missed_count: tally.missed,
        current_streak: current_streak(habit, completed, reference),
        highest_streak: tally.highest_streak,
        highest_miss_streak: tally.highest_miss_streak,
    }
}

#[derive(Default)]
struct Tally {
    completed: u32,
    missed: u32,
    highest_streak: u32,
    highest_miss_streak: u32,
}

fn scan(habit: &Habit, completed: &BTreeSet<NaiveDate>, reference: NaiveDate) -> Tally {
    let mut tally = Tally::default();
    let mut running_streak = 0u32;
    let mut running_miss = 0u32;

    for date in habit.enumerate_scheduled(habit.created_at, reference) {
        if completed.contains(&date) {
            tally.completed += 1;
            running_streak += 1;
            running_miss = 0;
            tally.highest_streak = tally.highest_streak.max(running_streak);
        } else if date < reference {
            tally.missed += 1;
            running_miss += 1;
            running_streak = 0;
            tally.highest_miss_streak = tally.highest_miss_streak.max(running_miss);
        }
    }

    tally
}
