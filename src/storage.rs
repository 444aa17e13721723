use crate::errors::StatsError;
use crate::models::{AppData, CachedStats, CompletionMap, Habit, HabitUpdate, Insight, NewHabit};
use crate::rate::DateWindow;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::{fs, sync::Mutex};
use tracing::{debug, error, info};

#[async_trait]
pub trait HabitStore: Send + Sync {
    /// Non-archived habits, oldest first.
    async fn list_active(&self) -> Result<Vec<Habit>, StatsError>;
    async fn get(&self, id: &str) -> Result<Habit, StatsError>;
    async fn create(&self, habit: NewHabit) -> Result<Habit, StatsError>;
    async fn update(&self, id: &str, update: HabitUpdate) -> Result<Habit, StatsError>;
    async fn archive(&self, id: &str) -> Result<(), StatsError>;
    async fn delete(&self, id: &str) -> Result<(), StatsError>;
}

#[async_trait]
pub trait LogStore: Send + Sync {
    /// Completion dates inside `range` for each requested habit. Every requested
    /// id is present in the result, possibly with an empty set.
    async fn get_completions(
        &self,
        habit_ids: &[String],
        range: DateWindow,
    ) -> Result<CompletionMap, StatsError>;

    /// Flips the completion of `habit_id` on `date` and returns the new state.
    async fn toggle(&self, habit_id: &str, date: NaiveDate) -> Result<bool, StatsError>;
}

/// Persisted derived stats. Every habit carries a generation that moves whenever
/// its completions are toggled or its schedule changes; those events also drop
/// the habit's entry.
#[async_trait]
pub trait StatsCache: Send + Sync {
    async fn cached(&self, habit_id: &str) -> Result<Option<CachedStats>, StatsError>;
    async fn generation(&self, habit_id: &str) -> Result<u64, StatsError>;

    /// Stores `cached` only while the habit is still at `generation`. Returns
    /// whether the entry was written.
    async fn store(
        &self,
        habit_id: &str,
        cached: CachedStats,
        generation: u64,
    ) -> Result<bool, StatsError>;
}

/// Habits, completion logs, cached stats and insights in one JSON document.
pub struct JsonStore {
    path: Option<PathBuf>,
    data: Mutex<AppData>,
}

impl JsonStore {
    pub async fn open(path: PathBuf) -> Self {
        let data = load_data(&path).await;
        info!(
            "loaded {} habits from {}",
            data.habits.len(),
            path.display()
        );
        Self {
            path: Some(path),
            data: Mutex::new(data),
        }
    }

    /// A store that never touches the filesystem.
    pub fn in_memory(data: AppData) -> Self {
        Self {
            path: None,
            data: Mutex::new(data),
        }
    }

    pub async fn recent_insights(&self, limit: usize) -> Vec<Insight> {
        let data = self.data.lock().await;
        let mut insights = data.insights.clone();
        insights.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        insights.truncate(limit);
        insights
    }

    pub async fn add_insight(&self, insight: Insight) -> Result<Insight, StatsError> {
        self.commit(|data| {
            data.insights.push(insight.clone());
            Ok(insight)
        })
        .await
    }

    /// Applies `change` to a copy of the document and swaps it in once the copy
    /// is on disk. A failed change or write leaves the document untouched.
    async fn commit<T>(
        &self,
        change: impl FnOnce(&mut AppData) -> Result<T, StatsError>,
    ) -> Result<T, StatsError> {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        let outcome = change(&mut next)?;
        self.persist(&next).await?;
        *data = next;
        Ok(outcome)
    }

    async fn persist(&self, data: &AppData) -> Result<(), StatsError> {
        match &self.path {
            Some(path) => persist_data(path, data).await,
            None => Ok(()),
        }
    }
}

fn find_mut<'a>(data: &'a mut AppData, id: &str) -> Result<&'a mut Habit, StatsError> {
    data.habits
        .iter_mut()
        .find(|habit| habit.id == id)
        .ok_or_else(|| StatsError::not_found(id))
}

fn invalidate(data: &mut AppData, id: &str) {
    *data.generations.entry(id.to_string()).or_default() += 1;
    data.stats.remove(id);
}

#[async_trait]
impl HabitStore for JsonStore {
    async fn list_active(&self) -> Result<Vec<Habit>, StatsError> {
        let data = self.data.lock().await;
        let mut habits: Vec<Habit> = data
            .habits
            .iter()
            .filter(|habit| !habit.archived)
            .cloned()
            .collect();
        habits.sort_by_key(|habit| habit.created_at);
        Ok(habits)
    }

    async fn get(&self, id: &str) -> Result<Habit, StatsError> {
        let data = self.data.lock().await;
        data.habits
            .iter()
            .find(|habit| habit.id == id)
            .cloned()
            .ok_or_else(|| StatsError::not_found(id))
    }

    async fn create(&self, habit: NewHabit) -> Result<Habit, StatsError> {
        let habit = habit.into_habit();
        self.commit(|data| {
            data.habits.push(habit.clone());
            Ok(())
        })
        .await?;
        info!(habit_id = %habit.id, "created habit '{}'", habit.name);
        Ok(habit)
    }

    async fn update(&self, id: &str, update: HabitUpdate) -> Result<Habit, StatsError> {
        self.commit(|data| {
            let habit = find_mut(data, id)?;
            if let Some(name) = update.name {
                habit.name = name;
            }
            if let Some(description) = update.description {
                habit.description = Some(description);
            }
            if let Some(color) = update.color {
                habit.color = color;
            }
            let schedule_changed = match update.schedule {
                Some(schedule) if schedule != habit.schedule => {
                    habit.schedule = schedule;
                    true
                }
                _ => false,
            };
            let updated = habit.clone();
            if schedule_changed {
                debug!(habit_id = %id, "schedule changed, dropping cached stats");
                invalidate(data, id);
            }
            Ok(updated)
        })
        .await
    }

    async fn archive(&self, id: &str) -> Result<(), StatsError> {
        self.commit(|data| {
            find_mut(data, id)?.archived = true;
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<(), StatsError> {
        self.commit(|data| {
            let before = data.habits.len();
            data.habits.retain(|habit| habit.id != id);
            if data.habits.len() == before {
                return Err(StatsError::not_found(id));
            }
            data.logs.remove(id);
            invalidate(data, id);
            Ok(())
        })
        .await?;
        info!(habit_id = %id, "deleted habit");
        Ok(())
    }
}

#[async_trait]
impl LogStore for JsonStore {
    async fn get_completions(
        &self,
        habit_ids: &[String],
        range: DateWindow,
    ) -> Result<CompletionMap, StatsError> {
        let data = self.data.lock().await;
        let mut completions = CompletionMap::with_capacity(habit_ids.len());
        for id in habit_ids {
            let dates: BTreeSet<NaiveDate> = match data.logs.get(id) {
                Some(logged) if range.start <= range.end => {
                    logged.range(range.start..=range.end).copied().collect()
                }
                _ => BTreeSet::new(),
            };
            completions.insert(id.clone(), dates);
        }
        Ok(completions)
    }

    /// Rejects dates before the habit was created.
    async fn toggle(&self, habit_id: &str, date: NaiveDate) -> Result<bool, StatsError> {
        self.commit(|data| {
            let created_at = find_mut(data, habit_id)?.created_at;
            if date < created_at {
                return Err(StatsError::configuration(format!(
                    "cannot log {date} for habit {habit_id} created on {created_at}"
                )));
            }
            let logged = data.logs.entry(habit_id.to_string()).or_default();
            let completed = if logged.remove(&date) {
                false
            } else {
                logged.insert(date);
                true
            };
            invalidate(data, habit_id);
            Ok(completed)
        })
        .await
    }
}

#[async_trait]
impl StatsCache for JsonStore {
    async fn cached(&self, habit_id: &str) -> Result<Option<CachedStats>, StatsError> {
        let data = self.data.lock().await;
        Ok(data.stats.get(habit_id).copied())
    }

    async fn generation(&self, habit_id: &str) -> Result<u64, StatsError> {
        let data = self.data.lock().await;
        Ok(data.generations.get(habit_id).copied().unwrap_or(0))
    }

    async fn store(
        &self,
        habit_id: &str,
        cached: CachedStats,
        generation: u64,
    ) -> Result<bool, StatsError> {
        let mut data = self.data.lock().await;
        if data.generations.get(habit_id).copied().unwrap_or(0) != generation {
            return Ok(false);
        }
        let mut next = data.clone();
        next.stats.insert(habit_id.to_string(), cached);
        self.persist(&next).await?;
        *data = next;
        Ok(true)
    }
}

pub async fn load_data(path: &Path) -> AppData {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(data) => data,
            Err(err) => {
                error!("failed to parse data file: {err}");
                AppData::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => AppData::default(),
        Err(err) => {
            error!("failed to read data file: {err}");
            AppData::default()
        }
    }
}

pub async fn persist_data(path: &Path, data: &AppData) -> Result<(), StatsError> {
    let payload = serde_json::to_vec_pretty(data)?;
    fs::write(path, payload).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DerivedStats;
    use crate::schedule::Schedule;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn new_habit(name: &str) -> NewHabit {
        NewHabit {
            name: name.to_string(),
            description: None,
            color: None,
            schedule: Schedule::EVERYDAY,
            created_at: date(2024, 1, 1),
        }
    }

    fn cached() -> CachedStats {
        CachedStats {
            as_of: date(2024, 1, 5),
            stats: DerivedStats {
                completed_count: 1,
                ..DerivedStats::default()
            },
        }
    }

    #[tokio::test]
    async fn toggle_adds_then_removes() {
        let store = JsonStore::in_memory(AppData::default());
        let habit = store.create(new_habit("Read")).await.unwrap();

        assert!(store.toggle(&habit.id, date(2024, 1, 2)).await.unwrap());
        assert!(!store.toggle(&habit.id, date(2024, 1, 2)).await.unwrap());

        let completions = store
            .get_completions(&[habit.id.clone()], DateWindow::new(date(2024, 1, 1), date(2024, 1, 31)))
            .await
            .unwrap();
        assert!(completions[&habit.id].is_empty());
    }

    #[tokio::test]
    async fn toggle_unknown_habit_is_not_found() {
        let store = JsonStore::in_memory(AppData::default());
        let err = store.toggle("missing", date(2024, 1, 2)).await.unwrap_err();
        assert!(matches!(err, StatsError::NotFound(_)));
    }

    #[tokio::test]
    async fn completions_are_limited_to_range() {
        let store = JsonStore::in_memory(AppData::default());
        let habit = store.create(new_habit("Run")).await.unwrap();
        for day in [1, 10, 20] {
            store.toggle(&habit.id, date(2024, 1, day)).await.unwrap();
        }

        let ids = vec![habit.id.clone(), "other".to_string()];
        let completions = store
            .get_completions(&ids, DateWindow::new(date(2024, 1, 5), date(2024, 1, 20)))
            .await
            .unwrap();
        assert_eq!(completions[&habit.id].len(), 2);
        assert!(completions["other"].is_empty());

        let inverted = store
            .get_completions(&ids, DateWindow::new(date(2024, 1, 20), date(2024, 1, 5)))
            .await
            .unwrap();
        assert!(inverted[&habit.id].is_empty());
    }

    #[tokio::test]
    async fn cache_is_invalidated_by_toggle_and_schedule_change() {
        let store = JsonStore::in_memory(AppData::default());
        let habit = store.create(new_habit("Meditate")).await.unwrap();

        let generation = store.generation(&habit.id).await.unwrap();
        assert!(store.store(&habit.id, cached(), generation).await.unwrap());
        store.toggle(&habit.id, date(2024, 1, 3)).await.unwrap();
        assert_eq!(store.cached(&habit.id).await.unwrap(), None);

        let generation = store.generation(&habit.id).await.unwrap();
        assert!(store.store(&habit.id, cached(), generation).await.unwrap());
        let rename = HabitUpdate {
            name: Some("Sit".into()),
            ..HabitUpdate::default()
        };
        store.update(&habit.id, rename).await.unwrap();
        assert_eq!(store.cached(&habit.id).await.unwrap(), Some(cached()));
        assert_eq!(store.generation(&habit.id).await.unwrap(), generation);

        let reschedule = HabitUpdate {
            schedule: Some(Schedule::WEEKDAYS),
            ..HabitUpdate::default()
        };
        let updated = store.update(&habit.id, reschedule).await.unwrap();
        assert_eq!(updated.schedule, Schedule::WEEKDAYS);
        assert_eq!(store.cached(&habit.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn store_skips_entries_computed_before_a_toggle() {
        let store = JsonStore::in_memory(AppData::default());
        let habit = store.create(new_habit("Floss")).await.unwrap();

        let before = store.generation(&habit.id).await.unwrap();
        store.toggle(&habit.id, date(2024, 1, 2)).await.unwrap();

        assert!(!store.store(&habit.id, cached(), before).await.unwrap());
        assert_eq!(store.cached(&habit.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn toggle_before_creation_is_rejected() {
        let store = JsonStore::in_memory(AppData::default());
        let mut late = new_habit("Late");
        late.created_at = date(2024, 1, 10);
        let habit = store.create(late).await.unwrap();

        let err = store.toggle(&habit.id, date(2020, 1, 1)).await.unwrap_err();
        assert!(matches!(err, StatsError::Configuration(_)));
        assert!(store.toggle(&habit.id, date(2024, 1, 10)).await.unwrap());

        let logged = store
            .get_completions(&[habit.id.clone()], DateWindow::new(date(2020, 1, 1), date(2024, 1, 31)))
            .await
            .unwrap();
        assert_eq!(logged[&habit.id].len(), 1);
    }

    #[tokio::test]
    async fn failed_write_leaves_document_unchanged() {
        let mut path = std::env::temp_dir();
        path.push(format!("habit_stats_missing_dir_{}", std::process::id()));
        path.push("state.json");

        let store = JsonStore::open(path).await;
        let err = store.create(new_habit("Ghost")).await.unwrap_err();
        assert!(matches!(err, StatsError::Storage(_)));
        assert!(store.list_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn archive_hides_and_delete_removes() {
        let store = JsonStore::in_memory(AppData::default());
        let kept = store.create(new_habit("Kept")).await.unwrap();
        let archived = store.create(new_habit("Archived")).await.unwrap();
        let deleted = store.create(new_habit("Deleted")).await.unwrap();

        store.archive(&archived.id).await.unwrap();
        store.delete(&deleted.id).await.unwrap();

        let active = store.list_active().await.unwrap();
        assert_eq!(active, vec![kept]);
        assert!(store.get(&archived.id).await.unwrap().archived);
        assert!(matches!(store.get(&deleted.id).await, Err(StatsError::NotFound(_))));
        assert!(matches!(store.delete(&deleted.id).await, Err(StatsError::NotFound(_))));
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let mut path = std::env::temp_dir();
        path.push(format!("habit_stats_store_{}_{}.json", std::process::id(), nanos));

        let store = JsonStore::open(path.clone()).await;
        let habit = store.create(new_habit("Journal")).await.unwrap();
        store.toggle(&habit.id, date(2024, 1, 4)).await.unwrap();
        drop(store);

        let reopened = JsonStore::open(path.clone()).await;
        let completions = reopened
            .get_completions(&[habit.id.clone()], DateWindow::single_day(date(2024, 1, 4)))
            .await
            .unwrap();
        assert_eq!(completions[&habit.id].len(), 1);

        let _ = std::fs::remove_file(path);
    }
}
