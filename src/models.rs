use crate::schedule::{Schedule, ScheduledDates};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const DEFAULT_COLOR: &str = "#6366F1";

/// Completion dates keyed by habit id.
pub type CompletionMap = HashMap<String, BTreeSet<NaiveDate>>;

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Habit {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(rename = "days_of_week", default)]
    pub schedule: Schedule,
    pub created_at: NaiveDate,
    #[serde(default)]
    pub archived: bool,
}

impl Habit {
    pub fn new(name: impl Into<String>, schedule: Schedule, created_at: NaiveDate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            color: default_color(),
            schedule,
            created_at,
            archived: false,
        }
    }

    pub fn is_scheduled(&self, date: NaiveDate) -> bool {
        self.schedule.is_scheduled(date)
    }

    pub fn walk_back(&self, from: NaiveDate) -> NaiveDate {
        self.schedule.walk_back(from)
    }

    pub fn enumerate_scheduled(&self, start: NaiveDate, end: NaiveDate) -> ScheduledDates {
        self.schedule.enumerate(start, end)
    }

    /// Scheduled dates in `[start, end]` on which the habit already existed.
    pub fn active_dates(&self, start: NaiveDate, end: NaiveDate) -> ScheduledDates {
        self.schedule.enumerate(start.max(self.created_at), end)
    }
}

#[derive(Debug, Clone)]
pub struct NewHabit {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub schedule: Schedule,
    pub created_at: NaiveDate,
}

impl NewHabit {
    pub fn into_habit(self) -> Habit {
        let mut habit = Habit::new(self.name, self.schedule, self.created_at);
        habit.description = self.description;
        if let Some(color) = self.color {
            habit.color = color;
        }
        habit
    }
}

#[derive(Debug, Clone, Default)]
pub struct HabitUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub schedule: Option<Schedule>,
}

/// Statistics of one habit as of a reference date. Never persisted as source of truth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedStats {
    pub completed_count: u32,
    pub missed_count: u32,
    pub current_streak: u32,
    pub highest_streak: u32,
    pub highest_miss_streak: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedStats {
    pub as_of: NaiveDate,
    pub stats: DerivedStats,
}

/// A habit as listed to the user: record, schedule label and current stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabitSummary {
    #[serde(flatten)]
    pub habit: Habit,
    pub schedule_label: String,
    pub stats: DerivedStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Pattern,
    Suggestion,
    Summary,
    #[default]
    #[serde(other)]
    General,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Insight {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: InsightKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GeneratedInsight {
    title: String,
    content: String,
    #[serde(rename = "type", default)]
    kind: InsightKind,
}

impl Insight {
    /// Builds an insight from raw generator output, which is expected to be a JSON
    /// object possibly wrapped in a Markdown code fence.
    pub fn from_generated(text: &str, now: DateTime<Utc>) -> Self {
        let cleaned = text.replace("```json", "").replace("```", "");
        let cleaned = cleaned.trim();
        let (title, content, kind) = match serde_json::from_str::<GeneratedInsight>(cleaned) {
            Ok(generated) => (generated.title, generated.content, generated.kind),
            Err(_) => (
                "Weekly Insight".to_string(),
                cleaned.to_string(),
                InsightKind::General,
            ),
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            content,
            kind,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppData {
    #[serde(default)]
    pub habits: Vec<Habit>,
    #[serde(default)]
    pub logs: BTreeMap<String, BTreeSet<NaiveDate>>,
    #[serde(default)]
    pub stats: BTreeMap<String, CachedStats>,
    #[serde(default)]
    pub insights: Vec<Insight>,
    /// Per-habit counter guarding `stats` against writes computed from older logs.
    #[serde(skip)]
    pub generations: HashMap<String, u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    Month,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthProgress {
    pub month_start: NaiveDate,
    pub reference: Option<NaiveDate>,
    pub percentage: u8,
    pub trend: i16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayConsistency {
    pub date: NaiveDate,
    pub day: String,
    pub value: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitRanking {
    pub id: String,
    pub name: String,
    pub streak: u32,
    pub percentage: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekRate {
    pub week: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub value: u8,
    pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingPoint {
    pub date: NaiveDate,
    pub rates: BTreeMap<String, u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityPoint {
    pub label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub count: u32,
    pub is_future: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateHabitRequest {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub schedule: Option<String>,
    pub days_of_week: Option<Vec<u8>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateHabitRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub schedule: Option<String>,
    pub days_of_week: Option<Vec<u8>>,
}

#[derive(Debug, Deserialize)]
pub struct InsightRequest {
    pub text: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ToggleRequest {
    pub date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleResponse {
    pub habit_id: String,
    pub date: NaiveDate,
    pub completed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RateResponse {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub percentage: u8,
}

#[derive(Debug, Deserialize, Default)]
pub struct DateQuery {
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RateQuery {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct MonthQuery {
    pub month: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TopQuery {
    pub date: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct OverviewQuery {
    pub weeks: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RollingQuery {
    pub date: Option<String>,
    pub days: Option<u32>,
    pub window: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TrendQuery {
    pub date: Option<String>,
    pub granularity: Option<Granularity>,
}
