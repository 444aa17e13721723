use crate::errors::{AppError, StatsError};
use crate::models::{
    ActivityPoint, CreateHabitRequest, DateQuery, DayConsistency, DerivedStats, Granularity, Habit,
    HabitRanking, HabitSummary, HabitUpdate, Insight, InsightRequest, MonthProgress, MonthQuery,
    NewHabit, OverviewQuery, RateQuery, RateResponse, RollingPoint, RollingQuery, ToggleRequest,
    ToggleResponse, TopQuery, TrendQuery, UpdateHabitRequest, WeekRate,
};
use crate::schedule::{Schedule, parse_date};
use crate::state::AppState;
use crate::storage::{HabitStore, LogStore};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{Local, NaiveDate, Utc};
use tracing::info;

const RECENT_INSIGHTS: usize = 10;

pub async fn list_habits(State(state): State<AppState>) -> Result<Json<Vec<Habit>>, AppError> {
    Ok(Json(state.store.list_active().await?))
}

pub async fn habit_summaries(
    State(state): State<AppState>,
) -> Result<Json<Vec<HabitSummary>>, AppError> {
    Ok(Json(state.engine.habit_summaries(today()).await?))
}

pub async fn create_habit(
    State(state): State<AppState>,
    Json(payload): Json<CreateHabitRequest>,
) -> Result<(StatusCode, Json<Habit>), AppError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let schedule = resolve_schedule(payload.schedule.as_deref(), payload.days_of_week.as_deref())?
        .unwrap_or_default();
    let habit = state
        .store
        .create(NewHabit {
            name: name.to_string(),
            description: payload.description,
            color: payload.color,
            schedule,
            created_at: today(),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(habit)))
}

pub async fn update_habit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateHabitRequest>,
) -> Result<Json<Habit>, AppError> {
    if payload.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let update = HabitUpdate {
        name: payload.name.map(|name| name.trim().to_string()),
        description: payload.description,
        color: payload.color,
        schedule: resolve_schedule(payload.schedule.as_deref(), payload.days_of_week.as_deref())?,
    };
    Ok(Json(state.store.update(&id, update).await?))
}

pub async fn archive_habit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.archive(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_habit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_completion(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Option<Json<ToggleRequest>>,
) -> Result<Json<ToggleResponse>, AppError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let date = date_or_today(request.date.as_deref())?;
    if date > today() {
        return Err(AppError::bad_request(format!(
            "cannot log a completion for future date {date}"
        )));
    }
    let completed = state.store.toggle(&id, date).await?;
    info!(habit_id = %id, %date, completed, "toggled completion");

    Ok(Json(ToggleResponse {
        habit_id: id,
        date,
        completed,
    }))
}

pub async fn habit_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DateQuery>,
) -> Result<Json<DerivedStats>, AppError> {
    let reference = date_or_today(query.date.as_deref())?;
    Ok(Json(state.engine.compute_for_habit_id(&id, reference).await?))
}

pub async fn get_rate(
    State(state): State<AppState>,
    Query(query): Query<RateQuery>,
) -> Result<Json<RateResponse>, AppError> {
    let start = parse_date(&query.start)?;
    let end = parse_date(&query.end)?;
    let percentage = state.engine.compute_active_rate(start, end).await?;
    Ok(Json(RateResponse {
        start,
        end,
        percentage,
    }))
}

pub async fn month_progress(
    State(state): State<AppState>,
    Query(query): Query<MonthQuery>,
) -> Result<Json<MonthProgress>, AppError> {
    let month = date_or_today(query.month.as_deref())?;
    Ok(Json(state.engine.month_progress(month, today()).await?))
}

pub async fn weekly_consistency(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Vec<DayConsistency>>, AppError> {
    let reference = date_or_today(query.date.as_deref())?;
    Ok(Json(state.engine.weekly_consistency(reference).await?))
}

pub async fn top_habits(
    State(state): State<AppState>,
    Query(query): Query<TopQuery>,
) -> Result<Json<Vec<HabitRanking>>, AppError> {
    let reference = date_or_today(query.date.as_deref())?;
    let limit = query.limit.unwrap_or(3);
    Ok(Json(state.engine.top_habits(reference, limit).await?))
}

pub async fn weekly_overview(
    State(state): State<AppState>,
    Query(query): Query<OverviewQuery>,
) -> Result<Json<Vec<WeekRate>>, AppError> {
    let weeks = query.weeks.unwrap_or(4).clamp(1, 52);
    Ok(Json(state.engine.weekly_overview(today(), weeks).await?))
}

pub async fn rolling_rates(
    State(state): State<AppState>,
    Query(query): Query<RollingQuery>,
) -> Result<Json<Vec<RollingPoint>>, AppError> {
    let reference = date_or_today(query.date.as_deref())?;
    let days = query.days.unwrap_or(30).clamp(1, 366);
    let window = query.window.unwrap_or(7).clamp(1, 366);
    Ok(Json(state.engine.rolling_rates(reference, days, window).await?))
}

pub async fn activity_trend(
    State(state): State<AppState>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<Vec<ActivityPoint>>, AppError> {
    let reference = date_or_today(query.date.as_deref())?;
    let granularity = query.granularity.unwrap_or(Granularity::Day);
    Ok(Json(
        state
            .engine
            .activity_trend(reference, granularity, today())
            .await?,
    ))
}

pub async fn list_insights(State(state): State<AppState>) -> Json<Vec<Insight>> {
    Json(state.store.recent_insights(RECENT_INSIGHTS).await)
}

pub async fn add_insight(
    State(state): State<AppState>,
    Json(payload): Json<InsightRequest>,
) -> Result<(StatusCode, Json<Insight>), AppError> {
    let insight = Insight::from_generated(&payload.text, Utc::now());
    let insight = state.store.add_insight(insight).await?;
    Ok((StatusCode::CREATED, Json(insight)))
}

/// Explicit day indices win over a preset; neither means "unchanged".
fn resolve_schedule(
    preset: Option<&str>,
    days: Option<&[u8]>,
) -> Result<Option<Schedule>, StatsError> {
    match (days, preset) {
        (Some(days), _) => Schedule::from_days(days).map(Some),
        (None, Some(preset)) => Schedule::from_preset(preset).map(Some),
        (None, None) => Ok(None),
    }
}

fn date_or_today(value: Option<&str>) -> Result<NaiveDate, StatsError> {
    value.map_or_else(|| Ok(today()), parse_date)
}

/// The user's local calendar day.
fn today() -> NaiveDate {
    Local::now().date_naive()
}
