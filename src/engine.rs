use crate::errors::StatsError;
use crate::models::{
    ActivityPoint, CachedStats, CompletionMap, DayConsistency, DerivedStats, Granularity, Habit,
    HabitRanking, HabitSummary, MonthProgress, RollingPoint, WeekRate,
};
use crate::rate::{
    self, DateWindow, MonthView, RateTally, days_after, days_before, first_of_month, months_after,
    months_before,
};
use crate::schedule::DAY_NAMES;
use crate::storage::{HabitStore, LogStore, StatsCache};
use crate::streak;
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

const TOP_HABIT_WINDOW_DAYS: u32 = 30;
const TREND_BUCKETS_BEFORE: i64 = 5;
const TREND_BUCKETS_AFTER: i64 = 4;

/// Stateless statistics over the habit and log collaborators. Every method fetches
/// what it needs once and computes in memory.
pub struct StatsEngine {
    habits: Arc<dyn HabitStore>,
    logs: Arc<dyn LogStore>,
    cache: Arc<dyn StatsCache>,
}

impl StatsEngine {
    pub fn new(
        habits: Arc<dyn HabitStore>,
        logs: Arc<dyn LogStore>,
        cache: Arc<dyn StatsCache>,
    ) -> Self {
        Self {
            habits,
            logs,
            cache,
        }
    }

    pub async fn compute_for_habit(
        &self,
        habit: &Habit,
        reference: NaiveDate,
    ) -> Result<DerivedStats, StatsError> {
        if reference < habit.created_at {
            return Ok(DerivedStats::default());
        }
        let completions = self.lifetime_completions(std::slice::from_ref(habit), reference).await?;
        Ok(streak::derive_stats(habit, completed_for(&completions, habit), reference))
    }

    pub async fn compute_for_habit_id(
        &self,
        id: &str,
        reference: NaiveDate,
    ) -> Result<DerivedStats, StatsError> {
        let habit = self.habits.get(id).await?;
        self.compute_for_habit(&habit, reference).await
    }

    pub async fn compute_rate(
        &self,
        habits: &[Habit],
        window_start: NaiveDate,
        window_end: NaiveDate,
    ) -> Result<u8, StatsError> {
        let window = DateWindow::new(window_start, window_end);
        let completions = self.fetch(habits, window).await?;
        Ok(rate::completion_rate(habits, &completions, window_start, window_end))
    }

    pub async fn compute_active_rate(
        &self,
        window_start: NaiveDate,
        window_end: NaiveDate,
    ) -> Result<u8, StatsError> {
        let habits = self.habits.list_active().await?;
        self.compute_rate(&habits, window_start, window_end).await
    }

    /// Progress of the month holding `month` as seen on `today`, with the trend
    /// against the same elapsed days of the previous month.
    pub async fn month_progress(
        &self,
        month: NaiveDate,
        today: NaiveDate,
    ) -> Result<MonthProgress, StatsError> {
        let month_start = first_of_month(month);
        let Some(view) = MonthView::resolve(month, today) else {
            return Ok(MonthProgress {
                month_start,
                reference: None,
                percentage: 0,
                trend: 0,
            });
        };

        let habits = self.habits.list_active().await?;
        let current = view.window();
        let previous = current.comparable_previous_month();
        let completions = self
            .fetch(&habits, DateWindow::new(previous.start, current.end))
            .await?;

        Ok(MonthProgress {
            month_start,
            reference: Some(view.reference),
            percentage: rate::tally_window(&habits, &completions, current).percentage(),
            trend: rate::trend(&habits, &completions, current),
        })
    }

    /// Share of due habits completed on each of the 7 days ending at `reference`.
    pub async fn weekly_consistency(
        &self,
        reference: NaiveDate,
    ) -> Result<Vec<DayConsistency>, StatsError> {
        let habits = self.habits.list_active().await?;
        let window = DateWindow::rolling(reference, 7);
        let completions = self.fetch(&habits, window).await?;

        Ok(window
            .days()
            .map(|date| {
                let day = DateWindow::single_day(date);
                DayConsistency {
                    date,
                    day: DAY_NAMES[date.weekday().num_days_from_sunday() as usize].to_string(),
                    value: rate::tally_window(&habits, &completions, day).percentage(),
                }
            })
            .collect())
    }

    /// Habits ranked by their 30-day rate, then by current streak.
    pub async fn top_habits(
        &self,
        reference: NaiveDate,
        limit: usize,
    ) -> Result<Vec<HabitRanking>, StatsError> {
        let habits = self.habits.list_active().await?;
        let completions = self.lifetime_completions(&habits, reference).await?;
        let recent = DateWindow::rolling(reference, TOP_HABIT_WINDOW_DAYS);

        let mut rankings: Vec<HabitRanking> = habits
            .iter()
            .map(|habit| {
                let completed = completed_for(&completions, habit);
                HabitRanking {
                    id: habit.id.clone(),
                    name: habit.name.clone(),
                    streak: streak::current_streak(habit, completed, reference),
                    percentage: RateTally::for_habit(habit, Some(completed), recent).percentage(),
                }
            })
            .collect();

        rankings.sort_by(|a, b| {
            b.percentage
                .cmp(&a.percentage)
                .then_with(|| b.streak.cmp(&a.streak))
        });
        rankings.truncate(limit);
        Ok(rankings)
    }

    /// Completion rate of the last `weeks` calendar weeks (Monday to Sunday), most
    /// recent first. The current week only counts up to `today`.
    pub async fn weekly_overview(
        &self,
        today: NaiveDate,
        weeks: u32,
    ) -> Result<Vec<WeekRate>, StatsError> {
        let habits = self.habits.list_active().await?;
        let current = DateWindow::calendar_week(today);
        let oldest = days_before(current.start, 7 * u64::from(weeks.saturating_sub(1)));
        let completions = self.fetch(&habits, DateWindow::new(oldest, today)).await?;

        Ok((0..weeks)
            .map(|offset| {
                let start = days_before(current.start, 7 * u64::from(offset));
                let end = days_after(start, 6);
                let counted = DateWindow::new(start, end.min(today));
                WeekRate {
                    week: if offset == 0 {
                        "Now".to_string()
                    } else {
                        format!("W-{offset}")
                    },
                    start_date: start,
                    end_date: end,
                    value: rate::tally_window(&habits, &completions, counted).percentage(),
                    is_current: offset == 0,
                }
            })
            .collect())
    }

    /// For each of the `days` days ending at `reference`, every habit's rate over
    /// the `window` days ending that day.
    pub async fn rolling_rates(
        &self,
        reference: NaiveDate,
        days: u32,
        window: u32,
    ) -> Result<Vec<RollingPoint>, StatsError> {
        let habits = self.habits.list_active().await?;
        let points = DateWindow::rolling(reference, days);
        let first_window = DateWindow::rolling(points.start, window);
        let completions = self
            .fetch(&habits, DateWindow::new(first_window.start, reference))
            .await?;

        Ok(points
            .days()
            .map(|date| {
                let span = DateWindow::rolling(date, window);
                let rates = habits
                    .iter()
                    .map(|habit| {
                        let tally = RateTally::for_habit(habit, completions.get(&habit.id), span);
                        (habit.id.clone(), tally.percentage())
                    })
                    .collect();
                RollingPoint { date, rates }
            })
            .collect())
    }

    /// Completion counts in ten consecutive buckets around the one holding
    /// `reference`. Buckets starting after `today` are marked future and empty.
    pub async fn activity_trend(
        &self,
        reference: NaiveDate,
        granularity: Granularity,
        today: NaiveDate,
    ) -> Result<Vec<ActivityPoint>, StatsError> {
        let buckets: Vec<DateWindow> = (-TREND_BUCKETS_BEFORE..=TREND_BUCKETS_AFTER)
            .map(|offset| bucket(reference, granularity, offset))
            .collect();

        let habits = self.habits.list_active().await?;
        let first = buckets.first().map_or(reference, |window| window.start);
        let last = buckets.last().map_or(reference, |window| window.end);
        let completions = self
            .fetch(&habits, DateWindow::new(first, last.min(today)))
            .await?;

        Ok(buckets
            .into_iter()
            .map(|window| {
                let is_future = window.start > today;
                let count = if is_future {
                    0
                } else {
                    let counted = DateWindow::new(window.start, window.end.min(today));
                    completions
                        .values()
                        .flat_map(|dates| dates.range(counted.start..=counted.end))
                        .count() as u32
                };
                let label = match granularity {
                    Granularity::Month => window.start.format("%b").to_string(),
                    Granularity::Day | Granularity::Week => window.start.day().to_string(),
                };
                ActivityPoint {
                    label,
                    start_date: window.start,
                    end_date: window.end,
                    count,
                    is_future,
                }
            })
            .collect())
    }

    /// Derived stats as of `today`, served from the cache when it was filled today.
    pub async fn cached_stats(
        &self,
        habit: &Habit,
        today: NaiveDate,
    ) -> Result<DerivedStats, StatsError> {
        if let Some(cached) = self.cache.cached(&habit.id).await? {
            if cached.as_of == today {
                return Ok(cached.stats);
            }
        }

        debug!(habit_id = %habit.id, "refreshing cached stats as of {today}");
        let generation = self.cache.generation(&habit.id).await?;
        let stats = self.compute_for_habit(habit, today).await?;
        let stored = self
            .cache
            .store(&habit.id, CachedStats { as_of: today, stats }, generation)
            .await?;
        if !stored {
            debug!(habit_id = %habit.id, "logs changed while computing, not caching");
        }
        Ok(stats)
    }

    pub async fn habit_summaries(&self, today: NaiveDate) -> Result<Vec<HabitSummary>, StatsError> {
        let habits = self.habits.list_active().await?;
        let mut summaries = Vec::with_capacity(habits.len());
        for habit in habits {
            let stats = self.cached_stats(&habit, today).await?;
            summaries.push(HabitSummary {
                schedule_label: habit.schedule.label(),
                habit,
                stats,
            });
        }
        Ok(summaries)
    }

    async fn lifetime_completions(
        &self,
        habits: &[Habit],
        reference: NaiveDate,
    ) -> Result<CompletionMap, StatsError> {
        self.fetch(habits, DateWindow::new(NaiveDate::MIN, reference)).await
    }

    async fn fetch(&self, habits: &[Habit], window: DateWindow) -> Result<CompletionMap, StatsError> {
        let ids: Vec<String> = habits.iter().map(|habit| habit.id.clone()).collect();
        let mut completions = self.logs.get_completions(&ids, window).await?;
        for habit in habits {
            if let Some(dates) = completions.get_mut(&habit.id) {
                for issue in drop_inconsistent(habit, dates) {
                    warn!("{issue}; ignoring record");
                }
            }
        }
        Ok(completions)
    }
}

/// Removes completions dated before the habit existed and reports each one.
pub fn drop_inconsistent(habit: &Habit, dates: &mut BTreeSet<NaiveDate>) -> Vec<StatsError> {
    let valid = dates.split_off(&habit.created_at);
    let early = std::mem::replace(dates, valid);
    early
        .into_iter()
        .map(|date| StatsError::DataInconsistency {
            habit_id: habit.id.clone(),
            date,
            created_at: habit.created_at,
        })
        .collect()
}

fn completed_for<'a>(completions: &'a CompletionMap, habit: &Habit) -> &'a BTreeSet<NaiveDate> {
    static EMPTY: BTreeSet<NaiveDate> = BTreeSet::new();
    completions.get(&habit.id).unwrap_or(&EMPTY)
}

fn bucket(reference: NaiveDate, granularity: Granularity, offset: i64) -> DateWindow {
    let steps = offset.unsigned_abs();
    match granularity {
        Granularity::Day => {
            let date = if offset < 0 {
                days_before(reference, steps)
            } else {
                days_after(reference, steps)
            };
            DateWindow::single_day(date)
        }
        Granularity::Week => {
            let week = DateWindow::calendar_week(reference);
            let start = if offset < 0 {
                days_before(week.start, 7 * steps)
            } else {
                days_after(week.start, 7 * steps)
            };
            DateWindow::new(start, days_after(start, 6))
        }
        Granularity::Month => {
            let months = u32::try_from(steps).unwrap_or(u32::MAX);
            let start = if offset < 0 {
                months_before(first_of_month(reference), months)
            } else {
                months_after(first_of_month(reference), months)
            };
            DateWindow::full_month(start)
        }
    }
}
