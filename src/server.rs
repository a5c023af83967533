use crate::availability::is_teacher_available;
use crate::config::Config;
use crate::data::{parse_date, GenerationReport, PeriodId, TeacherId};
use crate::error::{Result, ScheduleError};
use crate::report::{schedule_entries, ScheduleEntry, ScheduleFilter};
use crate::scheduler::{generate_schedule, GenerateOptions};
use crate::store::EntityStore;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

type ApiError = (StatusCode, String);

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<EntityStore>>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, store: EntityStore) -> Self {
        AppState {
            store: Arc::new(Mutex::new(store)),
            config: Arc::new(config),
        }
    }

    fn lock(&self) -> std::result::Result<MutexGuard<'_, EntityStore>, ApiError> {
        self.store.lock().map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Entity store lock poisoned".to_string(),
            )
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    start_date: String,
    end_date: String,
}

#[derive(Debug, Deserialize)]
struct AvailabilityQuery {
    date: String,
    period: PeriodId,
}

#[derive(Debug, Serialize, Deserialize)]
struct AvailabilityResponse {
    available: bool,
}

fn api_error(err: ScheduleError) -> ApiError {
    let status = match err {
        ScheduleError::InvalidInput(_)
        | ScheduleError::InvalidRange { .. }
        | ScheduleError::Validation(_) => StatusCode::BAD_REQUEST,
        ScheduleError::NotFound { .. } => StatusCode::NOT_FOUND,
        ScheduleError::InsufficientHours { .. }
        | ScheduleError::ClassroomOccupied { .. }
        | ScheduleError::TeacherDoubleBooked { .. } => StatusCode::CONFLICT,
        ScheduleError::Io(_) | ScheduleError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

// The store guard is held for the whole run, so concurrent requests cannot
// interleave their exists-check and insert.
async fn generate_handler(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> std::result::Result<Json<GenerationReport>, ApiError> {
    let options = GenerateOptions::with_slots(state.config.slots.clone());
    let mut store = state.lock()?;
    let report = generate_schedule(&mut store, &request.start_date, &request.end_date, &options)
        .map_err(api_error)?;
    if let Some(path) = &state.config.data_file {
        store.save(path).map_err(api_error)?;
    }
    Ok(Json(report))
}

async fn list_handler(
    State(state): State<AppState>,
    Query(filter): Query<ScheduleFilter>,
) -> std::result::Result<Json<Vec<ScheduleEntry>>, ApiError> {
    let store = state.lock()?;
    schedule_entries(&store, &filter)
        .map(Json)
        .map_err(api_error)
}

async fn availability_handler(
    State(state): State<AppState>,
    Path(teacher): Path<TeacherId>,
    Query(query): Query<AvailabilityQuery>,
) -> std::result::Result<Json<AvailabilityResponse>, ApiError> {
    let date = parse_date(&query.date).map_err(api_error)?;
    let store = state.lock()?;
    let period = *store.period(query.period).map_err(api_error)?;
    let available = is_teacher_available(&store, teacher, date, &period).map_err(api_error)?;
    Ok(Json(AvailabilityResponse { available }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/schedule/generate", post(generate_handler))
        .route("/v1/schedules", get(list_handler))
        .route("/v1/teachers/:id/availability", get(availability_handler))
        .with_state(state)
}

pub async fn run_server(config: Config, store: EntityStore) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Server running at http://{}", listener.local_addr()?);

    axum::serve(listener, router(AppState::new(config, store))).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SlotSource;
    use crate::store::tests::small_school;
    use axum::body::Body;
    use axum::http::{Request, Response};
    use tower::ServiceExt;

    fn test_config(data_file: Option<std::path::PathBuf>) -> Config {
        Config {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            data_file,
            slots: SlotSource::Periods,
        }
    }

    fn state() -> AppState {
        let (store, ..) = small_school();
        AppState::new(test_config(None), store)
    }

    async fn body_json(response: Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn generate(start: &str, end: &str) -> Request<Body> {
        let body = serde_json::json!({"startDate": start, "endDate": end});
        Request::builder()
            .method("POST")
            .uri("/v1/schedule/generate")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn generate_then_list() {
        let state = state();

        let response = router(state.clone())
            .oneshot(generate("2024-01-03", "2024-01-19"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report = body_json(response).await;
        // the only period is on Mondays
        assert_eq!(report["created"].as_array().unwrap().len(), 2);
        assert_eq!(report["weeks"].as_array().unwrap().len(), 2);

        let response = router(state)
            .oneshot(get_request("/v1/schedules?week=2"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let rows = body_json(response).await;
        assert_eq!(rows.as_array().unwrap().len(), 1);
        assert_eq!(rows[0]["subject"], "Mathematics");
        assert_eq!(rows[0]["startTime"], "08:00");
        assert_eq!(rows[0]["date"], "2024-01-15");
    }

    #[tokio::test]
    async fn malformed_date_is_a_bad_request() {
        let state = state();
        let response = router(state.clone())
            .oneshot(generate("2024-13-01", "2024-12-31"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.store.lock().unwrap().schedule_count(), 0);
    }

    #[tokio::test]
    async fn availability_endpoint() {
        let state = state();
        let response = router(state.clone())
            .oneshot(get_request("/v1/teachers/1/availability?date=2024-01-08&period=1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["available"], true);

        state.store.lock().unwrap().mark_busy(1, 1).unwrap();
        let response = router(state.clone())
            .oneshot(get_request("/v1/teachers/1/availability?date=2024-01-08&period=1"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["available"], false);

        let response = router(state)
            .oneshot(get_request("/v1/teachers/9/availability?date=2024-01-08&period=1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn generation_is_persisted_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timetable.json");
        let (store, ..) = small_school();
        let state = AppState::new(test_config(Some(path.clone())), store);

        let response = router(state)
            .oneshot(generate("2024-01-08", "2024-01-12"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let reloaded = EntityStore::load(&path).unwrap();
        assert_eq!(reloaded.schedule_count(), 1);
        assert_eq!(reloaded.subjects().next().unwrap().remaining_hours, 32);
    }
}
