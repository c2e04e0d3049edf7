use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use metrics::counter;
use serde::Deserialize;
use tracing::{info, warn};

use handy_core::geo::{rank_nearby, NearbyQuery};
use handy_core::transition::{action_for_status, plan, Actor, TaskAction, TaskRef};
use handy_core::types::{normalize_category, GeoPoint, TaskDetail, TaskStatus};
use handy_geocode::GeocodeError;
use handy_storage::{NewTask, TaskError, TaskFilter};

use crate::auth::AuthUser;
use crate::problem::ProblemResponse;
use crate::router::{data, AppState, Data};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub creator_id: Option<i64>,
    pub helper_id: Option<i64>,
    pub category: Option<String>,
    pub q: Option<String>,
    pub limit: Option<u32>,
}

/// GeoJSON point; `coordinates` is `[longitude, latitude]`.
#[derive(Debug, Deserialize)]
pub struct PointGeometry {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub coordinates: [f64; 2],
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub reward: Option<f64>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub location: Option<PointGeometry>,
}

#[derive(Debug, Deserialize)]
pub struct NearbyParams {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius_km: Option<f64>,
    pub limit: Option<u32>,
    pub postal_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

pub async fn list(
    State(state): State<AppState>,
    _user: AuthUser,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Data<Vec<TaskDetail>>, ProblemResponse> {
    let Query(params) = params?;
    let filter = TaskFilter {
        status: params
            .status
            .as_deref()
            .map(parse_status)
            .transpose()?,
        creator_id: params.creator_id,
        helper_id: params.helper_id,
        category: params.category.as_deref().and_then(normalize_category),
        search: params.q,
        limit: params.limit,
    };

    let tasks = state.storage().tasks().list(&filter).await?;
    Ok(data(tasks))
}

pub async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let Json(request) = payload?;

    let title = request.title.trim();
    if title.is_empty() {
        return Err(ProblemResponse::bad_request(
            "invalid_title",
            "title is required",
        ));
    }
    let category = normalize_category(&request.category).ok_or_else(|| {
        ProblemResponse::bad_request("invalid_category", "category is required")
    })?;
    let reward = request.reward.unwrap_or(0.0);
    if !reward.is_finite() || reward < 0.0 {
        return Err(ProblemResponse::bad_request(
            "invalid_reward",
            "reward must be zero or greater",
        ));
    }
    let postal_code = request
        .postal_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty());

    let location = match explicit_location(request.location.as_ref())? {
        Some(point) => point,
        None => match postal_code {
            Some(code) => geocode(&state, code).await?,
            None => {
                return Err(ProblemResponse::bad_request(
                    "location_required",
                    "provide a location or a postal code",
                ))
            }
        },
    };

    let task = state
        .storage()
        .tasks()
        .insert(&NewTask {
            title,
            description: request.description.trim(),
            category: &category,
            reward,
            creator_id: user.id,
            postal_code,
            location,
            created_at: state.now(),
        })
        .await?;

    counter!("tasks_created_total").increment(1);
    info!(
        stage = "tasks",
        task_id = task.task.id,
        creator_id = user.id,
        category = %task.task.category,
        "task created"
    );

    Ok((StatusCode::CREATED, data(task)))
}

pub async fn nearby(
    State(state): State<AppState>,
    _user: AuthUser,
    params: Result<Query<NearbyParams>, QueryRejection>,
) -> Result<Data<Vec<TaskDetail>>, ProblemResponse> {
    let Query(params) = params?;

    let center = match (params.lat, params.lng) {
        (Some(lat), Some(lng)) => {
            let point = GeoPoint::new(lat, lng);
            if !point.is_valid() {
                return Err(ProblemResponse::bad_request(
                    "invalid_location",
                    "lat must be within [-90, 90] and lng within [-180, 180]",
                ));
            }
            point
        }
        (None, None) => match params.postal_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => geocode(&state, code).await?,
            _ => {
                return Err(ProblemResponse::bad_request(
                    "location_required",
                    "provide lat and lng or a postal_code",
                ))
            }
        },
        _ => {
            return Err(ProblemResponse::bad_request(
                "invalid_location",
                "lat and lng must be provided together",
            ))
        }
    };

    let query = NearbyQuery::new(center, params.radius_km, params.limit);
    let candidates = state
        .storage()
        .tasks()
        .nearby_candidates(&query.bounding_box())
        .await?;

    let ranked = rank_nearby(&query, candidates)
        .into_iter()
        .map(|(mut task, distance)| {
            task.distance_km = Some(distance);
            task
        })
        .collect();

    Ok(data(ranked))
}

pub async fn detail(
    State(state): State<AppState>,
    _user: AuthUser,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Data<TaskDetail>, ProblemResponse> {
    let Path(id) = id?;
    let task = state
        .storage()
        .tasks()
        .fetch_detail(id)
        .await?
        .ok_or(TaskError::NotFound)?;
    Ok(data(task))
}

pub async fn accept(
    State(state): State<AppState>,
    user: AuthUser,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Data<TaskDetail>, ProblemResponse> {
    let Path(id) = id?;
    let task = run_action(&state, user.actor(), id, TaskAction::Accept).await?;
    Ok(data(task))
}

pub async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Data<TaskDetail>, ProblemResponse> {
    let Path(id) = id?;
    let Json(request) = payload?;
    let action = action_for_status(parse_status(&request.status)?)?;
    let task = run_action(&state, user.actor(), id, action).await?;
    Ok(data(task))
}

/// Plans `action` against the current task and persists it with a status compare-and-set.
pub(crate) async fn run_action(
    state: &AppState,
    actor: Actor,
    id: i64,
    action: TaskAction,
) -> Result<TaskDetail, ProblemResponse> {
    let tasks = state.storage().tasks();
    let current = match tasks.fetch_detail(id).await? {
        Some(task) => task,
        None => {
            record_transition(action, "not_found");
            return Err(TaskError::NotFound.into());
        }
    };

    let transition = plan(TaskRef::from(&current.task), actor, action).map_err(|err| {
        record_transition(action, "rejected");
        warn!(
            stage = "tasks",
            task_id = id,
            user_id = actor.user_id,
            action = action.as_str(),
            error = %err,
            "task transition rejected"
        );
        ProblemResponse::from(err)
    })?;

    match tasks.apply_transition(id, &transition, state.now()).await {
        Ok(updated) => {
            record_transition(action, "ok");
            info!(
                stage = "tasks",
                task_id = id,
                user_id = actor.user_id,
                action = action.as_str(),
                from = %transition.from,
                to = %transition.to,
                "task transitioned"
            );
            Ok(updated)
        }
        Err(err) => {
            let result = match err {
                TaskError::Conflict => "conflict",
                TaskError::NotFound => "not_found",
                _ => "error",
            };
            record_transition(action, result);
            Err(err.into())
        }
    }
}

pub(crate) fn parse_status(raw: &str) -> Result<TaskStatus, ProblemResponse> {
    raw.trim()
        .parse::<TaskStatus>()
        .map_err(|err| ProblemResponse::bad_request("invalid_status", err.to_string()))
}

fn record_transition(action: TaskAction, result: &'static str) {
    counter!(
        "task_transitions_total",
        "action" => action.as_str(),
        "result" => result
    )
    .increment(1);
}

/// The client sends `[0, 0]` when it has no fix; treat it as absent.
fn explicit_location(
    location: Option<&PointGeometry>,
) -> Result<Option<GeoPoint>, ProblemResponse> {
    let Some(geometry) = location else {
        return Ok(None);
    };
    if let Some(kind) = geometry.kind.as_deref() {
        if kind != "Point" {
            return Err(ProblemResponse::bad_request(
                "invalid_location",
                "location.type must be \"Point\"",
            ));
        }
    }
    let [longitude, latitude] = geometry.coordinates;
    if longitude == 0.0 && latitude == 0.0 {
        return Ok(None);
    }
    let point = GeoPoint::new(latitude, longitude);
    if !point.is_valid() {
        return Err(ProblemResponse::bad_request(
            "invalid_location",
            "coordinates must be [longitude, latitude] within WGS84 ranges",
        ));
    }
    Ok(Some(point))
}

async fn geocode(state: &AppState, postal_code: &str) -> Result<GeoPoint, ProblemResponse> {
    let Some(geocoder) = state.geocoder() else {
        return Err(ProblemResponse::bad_request(
            "location_required",
            "geocoding is not configured; provide coordinates",
        ));
    };

    match geocoder.lookup_postal_code(postal_code).await {
        Ok(point) => {
            counter!("geocode_requests_total", "result" => "ok").increment(1);
            Ok(point)
        }
        Err(err) => {
            counter!("geocode_requests_total", "result" => err.kind()).increment(1);
            warn!(stage = "geocode", postal_code, error = %err, "postal code lookup failed");
            match err {
                GeocodeError::NoResults | GeocodeError::EmptyQuery => {
                    Err(ProblemResponse::bad_request(
                        "postal_code_not_found",
                        format!("no location found for postal code {postal_code}"),
                    ))
                }
                _ => Err(ProblemResponse::new(
                    StatusCode::BAD_GATEWAY,
                    "geocoding_failed",
                    "postal code lookup failed",
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::test_support::TestApp;
    use handy_core::types::{User, UserRole};
    use handy_geocode::GeocodingClient;
    use httpmock::prelude::*;
    use serde_json::{json, Value};

    async fn create_task(app: &TestApp, creator: &User, title: &str, lng: f64, lat: f64) -> i64 {
        let (status, body) = app
            .send(
                "POST",
                "/api/tasks",
                Some(&app.token_for(creator)),
                Some(json!({
                    "title": title,
                    "description": "needs a hand",
                    "category": "Garden",
                    "reward": 15.0,
                    "location": { "type": "Point", "coordinates": [lng, lat] },
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_i64().expect("task id")
    }

    #[tokio::test]
    async fn create_uses_caller_as_creator() {
        let app = TestApp::new().await;
        let creator = app.create_user("creator@example.com", UserRole::User).await;

        let (status, body) = app
            .send(
                "POST",
                "/api/tasks",
                Some(&app.token_for(&creator)),
                Some(json!({
                    "title": "  Mow the lawn ",
                    "description": "front yard",
                    "category": " Garden ",
                    "creator_id": 9999,
                    "location": { "type": "Point", "coordinates": [-79.3832, 43.6532] },
                })),
            )
            .await;

        assert_eq!(status, StatusCode::CREATED);
        let task = &body["data"];
        assert_eq!(task["title"], "Mow the lawn");
        assert_eq!(task["category"], "garden");
        assert_eq!(task["status"], "open");
        assert_eq!(task["reward"], 0.0);
        assert_eq!(task["creator"]["id"], creator.id);
        assert_eq!(task["helper"], Value::Null);
        assert_eq!(task["location"]["latitude"], 43.6532);
    }

    #[tokio::test]
    async fn create_rejects_invalid_payloads() {
        let app = TestApp::new().await;
        let creator = app.create_user("creator@example.com", UserRole::User).await;
        let token = app.token_for(&creator);
        let cases = [
            (
                json!({"title": " ", "category": "garden", "location": {"coordinates": [1.0, 1.0]}}),
                "invalid_title",
            ),
            (
                json!({"title": "t", "category": "", "location": {"coordinates": [1.0, 1.0]}}),
                "invalid_category",
            ),
            (
                json!({"title": "t", "category": "garden", "reward": -1.0, "location": {"coordinates": [1.0, 1.0]}}),
                "invalid_reward",
            ),
            (
                json!({"title": "t", "category": "garden", "location": {"coordinates": [200.0, 1.0]}}),
                "invalid_location",
            ),
            (
                json!({"title": "t", "category": "garden", "location": {"coordinates": [0.0, 0.0]}}),
                "location_required",
            ),
            (json!({"title": "t"}), "invalid_body"),
        ];

        for (payload, expected) in cases {
            let (status, body) = app
                .send("POST", "/api/tasks", Some(&token), Some(payload))
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
            assert_eq!(body["type"], expected);
        }
    }

    #[tokio::test]
    async fn create_geocodes_postal_code_when_location_missing() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/json")
                    .query_param("address", "M5V2T6")
                    .query_param("key", "geo-key");
                then.status(200).json_body(json!({
                    "status": "OK",
                    "results": [{ "geometry": { "location": { "lat": 43.6426, "lng": -79.3871 } } }]
                }));
            })
            .await;
        let geocoder = GeocodingClient::new(
            "geo-key",
            url::Url::parse(&server.url("/")).unwrap(),
            reqwest::Client::new(),
        );
        let app = TestApp::with_geocoder(Some(geocoder)).await;
        let creator = app.create_user("creator@example.com", UserRole::User).await;

        let (status, body) = app
            .send(
                "POST",
                "/api/tasks/create",
                Some(&app.token_for(&creator)),
                Some(json!({
                    "title": "Walk the dog",
                    "description": "30 minutes",
                    "category": "pets",
                    "postal_code": "M5V2T6",
                    "location": { "type": "Point", "coordinates": [0, 0] },
                })),
            )
            .await;

        mock.assert_async().await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["data"]["location"]["latitude"], 43.6426);
        assert_eq!(body["data"]["location"]["longitude"], -79.3871);
        assert_eq!(body["data"]["postal_code"], "M5V2T6");
    }

    #[tokio::test]
    async fn geocoder_failures_map_to_client_and_gateway_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/json").query_param("address", "00000");
                then.status(200)
                    .json_body(json!({ "status": "ZERO_RESULTS", "results": [] }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/json").query_param("address", "11111");
                then.status(500).body("boom");
            })
            .await;
        let geocoder = GeocodingClient::new(
            "geo-key",
            url::Url::parse(&server.url("/")).unwrap(),
            reqwest::Client::new(),
        );
        let app = TestApp::with_geocoder(Some(geocoder)).await;
        let user = app.create_user("u@example.com", UserRole::User).await;
        let token = app.token_for(&user);

        let (status, body) = app
            .send(
                "POST",
                "/api/tasks",
                Some(&token),
                Some(json!({"title": "t", "category": "misc", "postal_code": "00000"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["type"], "postal_code_not_found");

        let (status, body) = app
            .send("GET", "/api/tasks/nearby?postal_code=11111", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["type"], "geocoding_failed");
    }

    #[tokio::test]
    async fn nearby_ranks_open_tasks_by_distance() {
        let app = TestApp::new().await;
        let creator = app.create_user("creator@example.com", UserRole::User).await;
        let helper = app.create_user("helper@example.com", UserRole::Student).await;

        let far = create_task(&app, &creator, "far", -79.30, 43.70).await;
        let near = create_task(&app, &creator, "near", -79.3840, 43.6540).await;
        let taken = create_task(&app, &creator, "taken", -79.3833, 43.6533).await;
        create_task(&app, &creator, "other city", -73.5673, 45.5017).await;

        let (status, _) = app
            .send(
                "POST",
                &format!("/api/tasks/{taken}/accept"),
                Some(&app.token_for(&helper)),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app
            .send(
                "GET",
                "/api/tasks/nearby?lat=43.6532&lng=-79.3832&radius_km=20",
                Some(&app.token_for(&helper)),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let items = body["data"].as_array().expect("array");
        let ids: Vec<i64> = items.iter().map(|t| t["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![near, far]);
        let first = items[0]["distance_km"].as_f64().unwrap();
        let second = items[1]["distance_km"].as_f64().unwrap();
        assert!(first < 0.2 && first < second && second <= 20.0);

        let (status, body) = app
            .send(
                "GET",
                "/api/tasks/nearby?lat=43.6532&lng=-79.3832&radius_km=5",
                Some(&app.token_for(&helper)),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn nearby_validates_center() {
        let app = TestApp::new().await;
        let user = app.create_user("u@example.com", UserRole::User).await;
        let token = app.token_for(&user);

        for (uri, expected) in [
            ("/api/tasks/nearby?lat=43.6", "invalid_location"),
            ("/api/tasks/nearby?lat=95&lng=10", "invalid_location"),
            ("/api/tasks/nearby", "location_required"),
            ("/api/tasks/nearby?postal_code=M5V", "location_required"),
            ("/api/tasks/nearby?lat=abc&lng=1", "invalid_query"),
        ] {
            let (status, body) = app.send("GET", uri, Some(&token), None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["type"], expected, "{uri}");
        }
    }

    #[tokio::test]
    async fn full_lifecycle_accept_then_complete() {
        let app = TestApp::new().await;
        let creator = app.create_user("creator@example.com", UserRole::User).await;
        let helper = app.create_user("helper@example.com", UserRole::Student).await;
        let id = create_task(&app, &creator, "paint fence", -79.38, 43.65).await;

        let (status, body) = app
            .send(
                "POST",
                &format!("/api/tasks/{id}/accept"),
                Some(&app.token_for(&creator)),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["type"], "transition_forbidden");

        let (status, body) = app
            .send(
                "POST",
                &format!("/api/tasks/{id}/accept"),
                Some(&app.token_for(&helper)),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "assigned");
        assert_eq!(body["data"]["helper"]["id"], helper.id);

        let (status, _) = app
            .send(
                "PUT",
                &format!("/api/tasks/{id}/status"),
                Some(&app.token_for(&creator)),
                Some(json!({ "status": "completed" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .send(
                "PUT",
                &format!("/api/tasks/{id}/status"),
                Some(&app.token_for(&helper)),
                Some(json!({ "status": "completed" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "completed");

        let (status, body) = app
            .send(
                "PUT",
                &format!("/api/tasks/{id}/status"),
                Some(&app.token_for(&creator)),
                Some(json!({ "status": "cancelled" })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["type"], "invalid_transition");
    }

    #[tokio::test]
    async fn second_accept_loses() {
        let app = TestApp::new().await;
        let creator = app.create_user("creator@example.com", UserRole::User).await;
        let first = app.create_user("first@example.com", UserRole::Student).await;
        let second = app.create_user("second@example.com", UserRole::Student).await;
        let id = create_task(&app, &creator, "carry boxes", -79.38, 43.65).await;

        let (status, _) = app
            .send(
                "POST",
                &format!("/api/tasks/{id}/accept"),
                Some(&app.token_for(&first)),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .send(
                "POST",
                &format!("/api/tasks/{id}/accept"),
                Some(&app.token_for(&second)),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) = app
            .send("GET", &format!("/api/tasks/{id}"), Some(&app.token_for(&creator)), None)
            .await;
        assert_eq!(body["data"]["helper"]["id"], first.id);
    }

    #[tokio::test]
    async fn status_endpoint_rejects_open_and_unknown_statuses() {
        let app = TestApp::new().await;
        let creator = app.create_user("creator@example.com", UserRole::User).await;
        let id = create_task(&app, &creator, "t", -79.38, 43.65).await;
        let token = app.token_for(&creator);

        let (status, body) = app
            .send(
                "PUT",
                &format!("/api/tasks/{id}/status"),
                Some(&token),
                Some(json!({ "status": "open" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["type"], "status_not_requestable");

        let (status, body) = app
            .send(
                "PUT",
                &format!("/api/tasks/{id}/status"),
                Some(&token),
                Some(json!({ "status": "done" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["type"], "invalid_status");

        let (status, body) = app
            .send(
                "PUT",
                &format!("/api/tasks/{id}/status"),
                Some(&token),
                Some(json!({ "status": "cancelled" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "cancelled");
    }

    #[tokio::test]
    async fn detail_and_list_filters() {
        let app = TestApp::new().await;
        let creator = app.create_user("creator@example.com", UserRole::User).await;
        let other = app.create_user("other@example.com", UserRole::User).await;
        let id = create_task(&app, &creator, "Fix bike", -79.38, 43.65).await;
        create_task(&app, &other, "Bake bread", -79.38, 43.65).await;
        let token = app.token_for(&creator);

        let (status, body) = app
            .send("GET", &format!("/api/tasks/{id}"), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["creator"]["email"], "creator@example.com");

        let (status, body) = app
            .send("GET", "/api/tasks/99999", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["type"], "task_not_found");

        let (status, _) = app
            .send("GET", "/api/tasks/abc", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = app
            .send(
                "GET",
                &format!("/api/tasks?creator_id={}", creator.id),
                Some(&token),
                None,
            )
            .await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (_, body) = app
            .send("GET", "/api/tasks?q=BREAD&status=open", Some(&token), None)
            .await;
        let items = body["data"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["title"], "Bake bread");

        let (status, _) = app
            .send("GET", "/api/tasks?status=bogus", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app.send("GET", "/api/tasks", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
