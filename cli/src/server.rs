use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::{Local, NaiveDate, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use fittrack_core::error::{Conflict, ReportError};
use fittrack_core::models::{
    FitnessGoals, Intensity, Macros, Meal, NewMeal, NewUser, NewWeightLog, NewWorkout, UpdateMeal,
    UpdateWorkout, User, WeightLog, Workout, validate_date_range, validate_goals,
    validate_meal_update, validate_new_meal, validate_new_user, validate_new_weight_log,
    validate_new_workout, validate_weight_kg, validate_workout_update,
};
use fittrack_core::report::Report;
use fittrack_core::service::FitService;

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB
const DEFAULT_REPORT_DAYS: i64 = 7;

#[derive(Clone)]
struct AppState {
    svc: Arc<Mutex<FitService>>,
    api_key: Option<String>,
}

impl AppState {
    fn svc(&self) -> MutexGuard<'_, FitService> {
        self.svc
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct CreateUserRequest {
    username: String,
    email: String,
    full_name: Option<String>,
    dob: Option<String>,
    target_weight: Option<f64>,
    weekly_workout_minutes: Option<i64>,
}

#[derive(Deserialize)]
struct SetGoalsRequest {
    target_weight: Option<f64>,
    weekly_workout_minutes: Option<i64>,
}

#[derive(Deserialize)]
struct CreateWorkoutRequest {
    user: String,
    activity: String,
    duration_minutes: i64,
    intensity: Option<String>,
    date: Option<String>,
    notes: Option<String>,
}

#[derive(Deserialize)]
struct UpdateWorkoutRequest {
    activity: Option<String>,
    duration_minutes: Option<i64>,
    intensity: Option<String>,
    date: Option<String>,
    notes: Option<String>,
}

#[derive(Deserialize)]
struct CreateMealRequest {
    user: String,
    name: String,
    calories: i64,
    #[serde(default)]
    protein: f64,
    #[serde(default)]
    carbs: f64,
    #[serde(default)]
    fat: f64,
    time: Option<String>,
    notes: Option<String>,
}

#[derive(Deserialize)]
struct UpdateMealRequest {
    name: Option<String>,
    calories: Option<i64>,
    protein: Option<f64>,
    carbs: Option<f64>,
    fat: Option<f64>,
    time: Option<String>,
    notes: Option<String>,
}

#[derive(Deserialize)]
struct CreateWeightRequest {
    user: String,
    weight_kg: f64,
    date: Option<String>,
}

#[derive(Deserialize)]
struct UpdateWeightRequest {
    weight_kg: f64,
}

#[derive(Deserialize)]
struct RangeQuery {
    from: Option<String>,
    to: Option<String>,
    limit: Option<u32>,
}

#[derive(Deserialize)]
struct ReportQuery {
    from: Option<String>,
    to: Option<String>,
    #[serde(default)]
    no_cache: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(err) => {
                tracing::error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(ReportError::NotFound(user)) = err.downcast_ref::<ReportError>() {
            return Self::NotFound(format!("User '{user}' not found"));
        }
        if let Some(conflict) = err.downcast_ref::<Conflict>() {
            return Self::Conflict(conflict.to_string());
        }
        Self::Internal(err)
    }
}

fn bad_request(err: &anyhow::Error) -> ApiError {
    ApiError::BadRequest(err.to_string())
}

// --- Parsing helpers ---

fn parse_date(label: &str, value: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("Invalid {label} '{value}'. Use YYYY-MM-DD")))
}

fn parse_optional_date(label: &str, value: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
    value.map(|v| parse_date(label, v)).transpose()
}

fn parse_time(value: &str) -> Result<NaiveDateTime, ApiError> {
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .ok_or_else(|| {
            ApiError::BadRequest(format!("Invalid time '{value}'. Use YYYY-MM-DDTHH:MM[:SS]"))
        })
}

fn parse_intensity(value: &str) -> Result<Intensity, ApiError> {
    value.parse().map_err(|e| bad_request(&e))
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- User handlers ---

async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let new_user = NewUser {
        username: req.username,
        email: req.email,
        full_name: req.full_name,
        dob: parse_optional_date("dob", req.dob.as_deref())?,
        goals: FitnessGoals {
            target_weight: req.target_weight,
            weekly_workout_minutes: req.weekly_workout_minutes,
        },
    };
    validate_new_user(&new_user).map_err(|e| bad_request(&e))?;

    let user = state.svc().register_user(&new_user)?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.svc().resolve_user(&user)?))
}

async fn set_goals(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(req): Json<SetGoalsRequest>,
) -> Result<Json<User>, ApiError> {
    let goals = FitnessGoals {
        target_weight: req.target_weight,
        weekly_workout_minutes: req.weekly_workout_minutes,
    };
    validate_goals(&goals).map_err(|e| bad_request(&e))?;
    Ok(Json(state.svc().set_goals(&user, &goals)?))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .svc()
        .delete_user(&user)?
        .ok_or_else(|| ApiError::NotFound(format!("User '{user}' not found")))?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Workout handlers ---

async fn create_workout(
    State(state): State<AppState>,
    Json(req): Json<CreateWorkoutRequest>,
) -> Result<(StatusCode, Json<Workout>), ApiError> {
    let workout = NewWorkout {
        activity: req.activity,
        duration_minutes: req.duration_minutes,
        intensity: req
            .intensity
            .as_deref()
            .map_or(Ok(Intensity::Medium), parse_intensity)?,
        date: parse_optional_date("date", req.date.as_deref())?.unwrap_or_else(today),
        notes: req.notes,
    };
    validate_new_workout(&workout, today()).map_err(|e| bad_request(&e))?;

    let workout = state.svc().log_workout(&req.user, &workout)?;
    Ok((StatusCode::CREATED, Json(workout)))
}

async fn list_workouts(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(params): Query<RangeQuery>,
) -> Result<Json<Vec<Workout>>, ApiError> {
    let (start, end) = parse_range(&params)?;
    let workouts = state
        .svc()
        .list_workouts(&user, start, end, params.limit)?;
    Ok(Json(workouts))
}

async fn update_workout(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateWorkoutRequest>,
) -> Result<Json<Workout>, ApiError> {
    let update = UpdateWorkout {
        activity: req.activity,
        duration_minutes: req.duration_minutes,
        intensity: req.intensity.as_deref().map(parse_intensity).transpose()?,
        date: parse_optional_date("date", req.date.as_deref())?,
        notes: req.notes,
    };
    validate_workout_update(&update, today()).map_err(|e| bad_request(&e))?;

    let workout = state
        .svc()
        .update_workout(id, &update)?
        .ok_or_else(|| ApiError::NotFound(format!("Workout {id} not found")))?;
    Ok(Json(workout))
}

async fn delete_workout(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.svc().delete_workout(id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Workout {id} not found")))
    }
}

// --- Meal handlers ---

async fn create_meal(
    State(state): State<AppState>,
    Json(req): Json<CreateMealRequest>,
) -> Result<(StatusCode, Json<Meal>), ApiError> {
    let meal = NewMeal {
        name: req.name,
        calories: req.calories,
        macros: Macros {
            protein: req.protein,
            carbs: req.carbs,
            fat: req.fat,
        },
        time: req.time.as_deref().map(parse_time).transpose()?.unwrap_or_else(now),
        notes: req.notes,
    };
    validate_new_meal(&meal, now()).map_err(|e| bad_request(&e))?;

    let meal = state.svc().log_meal(&req.user, &meal)?;
    Ok((StatusCode::CREATED, Json(meal)))
}

async fn list_meals(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(params): Query<RangeQuery>,
) -> Result<Json<Vec<Meal>>, ApiError> {
    let (start, end) = parse_range(&params)?;
    let meals = state.svc().list_meals(&user, start, end, params.limit)?;
    Ok(Json(meals))
}

async fn update_meal(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateMealRequest>,
) -> Result<Json<Meal>, ApiError> {
    let time = req.time.as_deref().map(parse_time).transpose()?;

    let svc = state.svc();
    let current = svc
        .get_meal(id)?
        .ok_or_else(|| ApiError::NotFound(format!("Meal {id} not found")))?;

    // Macros not named in the request keep their stored values
    let macros = if req.protein.is_some() || req.carbs.is_some() || req.fat.is_some() {
        Some(Macros {
            protein: req.protein.unwrap_or(current.macros.protein),
            carbs: req.carbs.unwrap_or(current.macros.carbs),
            fat: req.fat.unwrap_or(current.macros.fat),
        })
    } else {
        None
    };

    let update = UpdateMeal {
        name: req.name,
        calories: req.calories,
        macros,
        time,
        notes: req.notes,
    };
    validate_meal_update(&update, now()).map_err(|e| bad_request(&e))?;

    let meal = svc
        .update_meal(id, &update)?
        .ok_or_else(|| ApiError::NotFound(format!("Meal {id} not found")))?;
    Ok(Json(meal))
}

async fn delete_meal(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.svc().delete_meal(id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Meal {id} not found")))
    }
}

// --- Weight handlers ---

async fn create_weight(
    State(state): State<AppState>,
    Json(req): Json<CreateWeightRequest>,
) -> Result<(StatusCode, Json<WeightLog>), ApiError> {
    let log = NewWeightLog {
        weight_kg: req.weight_kg,
        date: parse_optional_date("date", req.date.as_deref())?.unwrap_or_else(today),
    };
    validate_new_weight_log(&log, today()).map_err(|e| bad_request(&e))?;

    let log = state.svc().log_weight(&req.user, &log)?;
    Ok((StatusCode::CREATED, Json(log)))
}

async fn list_weight_logs(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(params): Query<RangeQuery>,
) -> Result<Json<Vec<WeightLog>>, ApiError> {
    let (start, end) = parse_range(&params)?;
    let logs = state
        .svc()
        .list_weight_logs(&user, start, end, params.limit)?;
    Ok(Json(logs))
}

async fn update_weight(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateWeightRequest>,
) -> Result<Json<WeightLog>, ApiError> {
    validate_weight_kg(req.weight_kg).map_err(|e| bad_request(&e))?;
    let log = state
        .svc()
        .update_weight(id, req.weight_kg)?
        .ok_or_else(|| ApiError::NotFound(format!("Weight log {id} not found")))?;
    Ok(Json(log))
}

async fn delete_weight(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.svc().delete_weight(id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Weight log {id} not found")))
    }
}

fn parse_range(params: &RangeQuery) -> Result<(Option<NaiveDate>, Option<NaiveDate>), ApiError> {
    let start = parse_optional_date("from date", params.from.as_deref())?;
    let end = parse_optional_date("to date", params.to.as_deref())?;
    if let (Some(s), Some(e)) = (start, end) {
        validate_date_range(s, e).map_err(|e| bad_request(&e))?;
    }
    Ok((start, end))
}

// --- Report handlers ---

async fn get_report(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(params): Query<ReportQuery>,
) -> Result<Json<Report>, ApiError> {
    let end = parse_optional_date("to date", params.to.as_deref())?.unwrap_or_else(today);
    let start = parse_optional_date("from date", params.from.as_deref())?
        .unwrap_or(end - chrono::Duration::days(DEFAULT_REPORT_DAYS - 1));
    validate_date_range(start, end).map_err(|e| bad_request(&e))?;

    let report = state
        .svc()
        .generate_report(&user, start, end, !params.no_cache)?;
    Ok(Json(report))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/users", post(create_user))
        .route("/api/users/{user}", get(get_user).delete(delete_user))
        .route("/api/users/{user}/goals", put(set_goals))
        .route("/api/workouts", post(create_workout))
        .route("/api/workouts/user/{user}", get(list_workouts))
        .route(
            "/api/workouts/{id}",
            put(update_workout).delete(delete_workout),
        )
        .route("/api/meals", post(create_meal))
        .route("/api/meals/user/{user}", get(list_meals))
        .route("/api/meals/{id}", put(update_meal).delete(delete_meal))
        .route("/api/weight-logs", post(create_weight))
        .route("/api/weight-logs/user/{user}", get(list_weight_logs))
        .route(
            "/api/weight-logs/{id}",
            put(update_weight).delete(delete_weight),
        )
        .route("/api/reports/{user}", get(get_report))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .route("/api/health", get(health))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    svc: FitService,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let state = AppState {
        svc: Arc::new(Mutex::new(svc)),
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        let head = key.get(..4).unwrap_or_default();
        let tail = key.get(key.len().saturating_sub(4)..).unwrap_or_default();
        eprintln!("API key: {head}...{tail} (see api_key file in data directory)");
    } else {
        tracing::warn!("Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        tracing::warn!(
            bind,
            "Listening with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    tracing::info!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use fittrack_core::cache::{DEFAULT_CACHE_TTL, MemoryCache};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn test_app(api_key: Option<String>) -> Router {
        let svc =
            FitService::new_in_memory(Box::new(MemoryCache::default()), DEFAULT_CACHE_TTL).unwrap();
        build_router(AppState {
            svc: Arc::new(Mutex::new(svc)),
            api_key,
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = axum::http::Request::builder().method(method).uri(uri);
        let request = match body {
            Some(b) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn register(app: &Router, username: &str, weekly_minutes: Option<i64>) -> Value {
        let (status, user) = send(
            app,
            "POST",
            "/api/users",
            Some(json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "target_weight": 75.0,
                "weekly_workout_minutes": weekly_minutes,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        user
    }

    async fn add_workout(app: &Router, user: &str, minutes: i64, date: &str) {
        let (status, _) = send(
            app,
            "POST",
            "/api/workouts",
            Some(json!({
                "user": user,
                "activity": "running",
                "duration_minutes": minutes,
                "intensity": "high",
                "date": date,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn auth_missing_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/users/alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Invalid or missing API key");
    }

    #[tokio::test]
    async fn auth_wrong_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/users/alice")
                    .header("Authorization", "Bearer wrong-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_correct_key_reaches_handler() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/users/alice")
                    .header("Authorization", "Bearer test-key-abc123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        // Authorized, but nobody is registered yet
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_skips_auth() {
        let app = test_app(Some("secret".to_string()));
        let (status, body) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn security_headers_present() {
        let app = test_app(Some("secret".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/users/alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(
            response.headers().get("content-security-policy").unwrap(),
            "default-src 'none'"
        );
    }

    #[tokio::test]
    async fn user_lifecycle() {
        let app = test_app(None);
        let user = register(&app, "Alice", Some(150)).await;
        assert_eq!(user["username"], "alice");
        let identity = user["identity"].as_str().unwrap().to_string();

        let (status, by_identity) = send(&app, "GET", &format!("/api/users/{identity}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(by_identity["username"], "alice");

        let (status, updated) = send(
            &app,
            "PUT",
            "/api/users/alice/goals",
            Some(json!({ "weekly_workout_minutes": 200 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["goals"]["weekly_workout_minutes"], 200);

        let (status, _) = send(&app, "DELETE", "/api/users/alice", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "GET", "/api/users/alice", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_user_accepts_identity() {
        let app = test_app(None);
        let user = register(&app, "bob", None).await;
        let identity = user["identity"].as_str().unwrap().to_string();

        let (status, _) = send(&app, "DELETE", &format!("/api/users/{identity}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "GET", "/api/users/bob", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "DELETE", &format!("/api/users/{identity}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn duplicate_username_is_conflict() {
        let app = test_app(None);
        register(&app, "alice", None).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/users",
            Some(json!({ "username": "alice", "email": "other@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("already taken"));
    }

    #[tokio::test]
    async fn invalid_user_is_bad_request() {
        let app = test_app(None);
        let (status, _) = send(
            &app,
            "POST",
            "/api/users",
            Some(json!({ "username": "a", "email": "not-an-email" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn workout_crud() {
        let app = test_app(None);
        register(&app, "alice", None).await;
        add_workout(&app, "alice", 30, "2024-06-01").await;

        let (status, list) = send(&app, "GET", "/api/workouts/user/alice", None).await;
        assert_eq!(status, StatusCode::OK);
        let id = list[0]["id"].as_i64().unwrap();

        let (status, updated) = send(
            &app,
            "PUT",
            &format!("/api/workouts/{id}"),
            Some(json!({ "duration_minutes": 45, "intensity": "low" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["duration_minutes"], 45);
        assert_eq!(updated["intensity"], "low");

        let (status, _) = send(&app, "DELETE", &format!("/api/workouts/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "DELETE", &format!("/api/workouts/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn workout_bad_intensity_rejected() {
        let app = test_app(None);
        register(&app, "alice", None).await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/workouts",
            Some(json!({
                "user": "alice",
                "activity": "yoga",
                "duration_minutes": 30,
                "intensity": "extreme",
                "date": "2024-06-01",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("intensity"));
    }

    #[tokio::test]
    async fn meal_partial_macro_update_keeps_others() {
        let app = test_app(None);
        register(&app, "alice", None).await;
        let (status, meal) = send(
            &app,
            "POST",
            "/api/meals",
            Some(json!({
                "user": "alice",
                "name": "Oatmeal",
                "calories": 350,
                "protein": 12.0,
                "carbs": 60.0,
                "fat": 6.0,
                "time": "2024-06-01T08:00",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = meal["id"].as_i64().unwrap();

        let (status, updated) = send(
            &app,
            "PUT",
            &format!("/api/meals/{id}"),
            Some(json!({ "protein": 20.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["macros"]["protein"], 20.0);
        assert_eq!(updated["macros"]["carbs"], 60.0);
        assert_eq!(updated["macros"]["fat"], 6.0);
    }

    #[tokio::test]
    async fn weight_duplicate_date_is_conflict() {
        let app = test_app(None);
        register(&app, "alice", None).await;
        let body = json!({ "user": "alice", "weight_kg": 80.0, "date": "2024-06-01" });

        let (status, _) = send(&app, "POST", "/api/weight-logs", Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = send(&app, "POST", "/api/weight-logs", Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn report_is_cached_until_records_change() {
        let app = test_app(None);
        register(&app, "alice", Some(150)).await;
        add_workout(&app, "alice", 30, "2024-06-01").await;
        add_workout(&app, "alice", 45, "2024-06-03").await;
        add_workout(&app, "alice", 60, "2024-06-05").await;

        let uri = "/api/reports/alice?from=2024-06-01&to=2024-06-07";
        let (status, first) = send(&app, "GET", uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["from_cache"], false);
        assert_eq!(first["workouts"]["total_minutes"], 135);
        assert!(
            first["summary"]
                .as_str()
                .unwrap()
                .contains("15.0 minutes short of weekly goal")
        );

        let (_, second) = send(&app, "GET", uri, None).await;
        assert_eq!(second["from_cache"], true);
        assert_eq!(second["workouts"], first["workouts"]);

        add_workout(&app, "alice", 20, "2024-06-06").await;
        let (_, third) = send(&app, "GET", uri, None).await;
        assert_eq!(third["from_cache"], false);
        assert_eq!(third["workouts"]["total_minutes"], 155);
    }

    #[tokio::test]
    async fn report_no_cache_always_recomputes() {
        let app = test_app(None);
        register(&app, "alice", None).await;
        let uri = "/api/reports/alice?from=2024-06-01&to=2024-06-07&no_cache=true";

        let (_, first) = send(&app, "GET", uri, None).await;
        let (_, second) = send(&app, "GET", uri, None).await;
        assert_eq!(first["from_cache"], false);
        assert_eq!(second["from_cache"], false);
    }

    #[tokio::test]
    async fn report_unknown_user_returns_404() {
        let app = test_app(None);
        let (status, body) = send(&app, "GET", "/api/reports/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "User 'ghost' not found");
    }

    #[tokio::test]
    async fn report_reversed_range_returns_400() {
        let app = test_app(None);
        register(&app, "alice", None).await;
        let (status, _) = send(
            &app,
            "GET",
            "/api/reports/alice?from=2024-06-07&to=2024-06-01",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "GET", "/api/reports/alice?from=junk", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
