use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use handy_core::transition::{Actor, TaskAction};
use handy_core::types::{PublicUser, TaskDetail, UserStatus};
use handy_storage::{TaskFilter, TaskStatusCounts};

use crate::auth::AdminUser;
use crate::problem::ProblemResponse;
use crate::router::{data, AppState, Data};
use crate::tasks::{parse_status, run_action, StatusRequest};

const RECENT_LIMIT: u32 = 5;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub users: UserTotals,
    pub tasks: TaskTotals,
    pub recent: RecentActivity,
}

#[derive(Debug, Serialize)]
pub struct UserTotals {
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct TaskTotals {
    pub stats: StatusCounts,
}

#[derive(Debug, Serialize)]
pub struct StatusCounts {
    pub open: i64,
    pub assigned: i64,
    pub completed: i64,
    pub cancelled: i64,
}

impl From<TaskStatusCounts> for StatusCounts {
    fn from(counts: TaskStatusCounts) -> Self {
        Self {
            open: counts.open,
            assigned: counts.assigned,
            completed: counts.completed,
            cancelled: counts.cancelled,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecentActivity {
    pub users: Vec<PublicUser>,
    pub tasks: Vec<TaskDetail>,
}

#[derive(Debug, Deserialize)]
pub struct AdminTaskParams {
    pub status: Option<String>,
    pub q: Option<String>,
}

pub async fn stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Data<StatsResponse>, ProblemResponse> {
    let users = state.storage().users();
    let tasks = state.storage().tasks();

    let total = users.count().await?;
    let counts = tasks.status_counts().await?;
    let recent_users = users.recent(RECENT_LIMIT).await?;
    let recent_tasks = tasks.recent(RECENT_LIMIT).await?;

    Ok(data(StatsResponse {
        users: UserTotals { total },
        tasks: TaskTotals {
            stats: counts.into(),
        },
        recent: RecentActivity {
            users: recent_users.iter().map(|user| user.to_public()).collect(),
            tasks: recent_tasks,
        },
    }))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    _admin: AdminUser,
    params: Result<Query<AdminTaskParams>, QueryRejection>,
) -> Result<Data<Vec<TaskDetail>>, ProblemResponse> {
    let Query(params) = params?;
    let status = match params.status.as_deref().map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(parse_status(raw)?),
    };

    let tasks = state
        .storage()
        .tasks()
        .list(&TaskFilter {
            status,
            search: params.q,
            ..TaskFilter::default()
        })
        .await?;
    Ok(data(tasks))
}

pub async fn update_task_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Data<TaskDetail>, ProblemResponse> {
    let Path(id) = id?;
    let Json(request) = payload?;
    let target = parse_status(&request.status)?;

    let actor = Actor::new(admin.id, admin.role, admin.status);
    let task = run_action(&state, actor, id, TaskAction::AdminSet(target)).await?;
    Ok(data(task))
}

pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Data<Vec<PublicUser>>, ProblemResponse> {
    let users = state.storage().users().list_all().await?;
    Ok(data(users.iter().map(|user| user.to_public()).collect()))
}

pub async fn update_user_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Data<PublicUser>, ProblemResponse> {
    let Path(id) = id?;
    let Json(request) = payload?;
    let status = request
        .status
        .trim()
        .parse::<UserStatus>()
        .map_err(|err| ProblemResponse::bad_request("invalid_status", err.to_string()))?;

    if id == admin.id && status == UserStatus::Suspended {
        return Err(ProblemResponse::bad_request(
            "cannot_suspend_self",
            "administrators cannot suspend their own account",
        ));
    }

    let user = state
        .storage()
        .users()
        .set_status(id, status, state.now())
        .await?
        .ok_or_else(|| ProblemResponse::not_found("user_not_found", "user does not exist"))?;

    info!(
        stage = "admin",
        admin_id = admin.id,
        user_id = user.id,
        status = status.as_str(),
        "user status updated"
    );
    Ok(data(user.to_public()))
}
