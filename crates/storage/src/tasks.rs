use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use thiserror::Error;
use tracing::debug;

use handy_core::geo::BoundingBox;
use handy_core::transition::{HelperChange, Transition};
use handy_core::types::{GeoPoint, Task, TaskDetail, TaskParty, TaskStatus, UnknownVariant};

use crate::to_rfc3339;

const DETAIL_SELECT: &str = "SELECT t.id, t.title, t.description, t.category, t.reward, t.status, \
            t.creator_id, t.helper_id, t.postal_code, t.latitude, t.longitude, \
            t.created_at, t.updated_at, \
            c.full_name AS creator_name, c.email AS creator_email, \
            h.full_name AS helper_name, h.email AS helper_email \
       FROM tasks AS t \
       JOIN users AS c ON c.id = t.creator_id \
       LEFT JOIN users AS h ON h.id = t.helper_id";

/// Repository for tasks.
#[derive(Clone)]
pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts an open task and returns it joined with its creator.
    pub async fn insert(&self, task: &NewTask<'_>) -> Result<TaskDetail, TaskError> {
        let now = to_rfc3339(task.created_at);
        let row = sqlx::query(
            "INSERT INTO tasks \
             (title, description, category, reward, status, creator_id, postal_code, latitude, longitude, created_at, updated_at) \
             VALUES (?, ?, ?, ?, 'open', ?, ?, ?, ?, ?, ?) \
             RETURNING id",
        )
        .bind(task.title)
        .bind(task.description)
        .bind(task.category)
        .bind(task.reward)
        .bind(task.creator_id)
        .bind(task.postal_code)
        .bind(task.location.latitude)
        .bind(task.location.longitude)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.get("id");
        self.fetch_detail(id).await?.ok_or(TaskError::NotFound)
    }

    pub async fn fetch_detail(&self, id: i64) -> Result<Option<TaskDetail>, TaskError> {
        let row = sqlx::query_as::<_, TaskDetailRow>(&format!("{DETAIL_SELECT} WHERE t.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TaskDetailRow::into_domain).transpose()
    }

    /// Lists tasks matching every provided filter, newest first.
    pub async fn list(&self, filter: &TaskFilter) -> Result<Vec<TaskDetail>, TaskError> {
        let mut builder = QueryBuilder::<Sqlite>::new(DETAIL_SELECT);
        builder.push(" WHERE 1 = 1");

        if let Some(status) = filter.status {
            builder.push(" AND t.status = ").push_bind(status.as_str());
        }
        if let Some(creator_id) = filter.creator_id {
            builder.push(" AND t.creator_id = ").push_bind(creator_id);
        }
        if let Some(helper_id) = filter.helper_id {
            builder.push(" AND t.helper_id = ").push_bind(helper_id);
        }
        if let Some(category) = filter.category.as_deref() {
            builder.push(" AND t.category = ").push_bind(category.to_string());
        }
        if let Some(term) = filter.search.as_deref().map(str::trim) {
            if !term.is_empty() {
                let pattern = like_pattern(term);
                builder
                    .push(" AND (LOWER(t.title) LIKE ")
                    .push_bind(pattern.clone())
                    .push(" ESCAPE '\\' OR LOWER(t.description) LIKE ")
                    .push_bind(pattern.clone())
                    .push(" ESCAPE '\\' OR LOWER(COALESCE(t.postal_code, '')) LIKE ")
                    .push_bind(pattern)
                    .push(" ESCAPE '\\')");
            }
        }

        builder.push(" ORDER BY t.created_at DESC, t.id DESC LIMIT ");
        builder.push_bind(filter.limit.map(i64::from).unwrap_or(-1));

        let rows = builder
            .build_query_as::<TaskDetailRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TaskDetailRow::into_domain).collect()
    }

    /// Open tasks whose location falls inside the bounding box.
    pub async fn nearby_candidates(&self, bbox: &BoundingBox) -> Result<Vec<TaskDetail>, TaskError> {
        let rows = sqlx::query_as::<_, TaskDetailRow>(&format!(
            "{DETAIL_SELECT} \
             WHERE t.status = 'open' \
               AND t.latitude BETWEEN ? AND ? \
               AND t.longitude BETWEEN ? AND ?"
        ))
        .bind(bbox.min_lat)
        .bind(bbox.max_lat)
        .bind(bbox.min_lng)
        .bind(bbox.max_lng)
        .fetch_all(&self.pool)
        .await?;

        debug!(
            stage = "storage",
            candidates = rows.len(),
            "loaded nearby task candidates"
        );
        rows.into_iter().map(TaskDetailRow::into_domain).collect()
    }

    /// Persists a validated transition if the task still has `transition.from` as its
    /// status and `transition.from_helper` as its helper.
    ///
    /// Returns [`TaskError::Conflict`] when another request changed the task first.
    pub async fn apply_transition(
        &self,
        id: i64,
        transition: &Transition,
        updated_at: DateTime<Utc>,
    ) -> Result<TaskDetail, TaskError> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE tasks SET status = ");
        builder.push_bind(transition.to.as_str());
        match transition.helper {
            HelperChange::Keep => {}
            HelperChange::Set(helper_id) => {
                builder.push(", helper_id = ").push_bind(helper_id);
            }
            HelperChange::Clear => {
                builder.push(", helper_id = NULL");
            }
        }
        builder
            .push(", updated_at = ")
            .push_bind(to_rfc3339(updated_at))
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND status = ")
            .push_bind(transition.from.as_str())
            .push(" AND helper_id IS ")
            .push_bind(transition.from_helper);

        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return match self.fetch_detail(id).await? {
                Some(_) => Err(TaskError::Conflict),
                None => Err(TaskError::NotFound),
            };
        }

        self.fetch_detail(id).await?.ok_or(TaskError::NotFound)
    }

    /// Number of tasks per status; statuses with no tasks report zero.
    pub async fn status_counts(&self) -> Result<TaskStatusCounts, TaskError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS total FROM tasks GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = TaskStatusCounts::default();
        for row in rows {
            let status: String = row.get("status");
            let total: i64 = row.get("total");
            match status.parse::<TaskStatus>()? {
                TaskStatus::Open => counts.open = total,
                TaskStatus::Assigned => counts.assigned = total,
                TaskStatus::Completed => counts.completed = total,
                TaskStatus::Cancelled => counts.cancelled = total,
            }
        }
        Ok(counts)
    }

    /// The `limit` most recently created tasks.
    pub async fn recent(&self, limit: u32) -> Result<Vec<TaskDetail>, TaskError> {
        self.list(&TaskFilter {
            limit: Some(limit),
            ..TaskFilter::default()
        })
        .await
    }
}

/// Data required to create a task.
pub struct NewTask<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub category: &'a str,
    pub reward: f64,
    pub creator_id: i64,
    pub postal_code: Option<&'a str>,
    pub location: GeoPoint,
    pub created_at: DateTime<Utc>,
}

/// Optional filters for [`TaskRepository::list`].
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub creator_id: Option<i64>,
    pub helper_id: Option<i64>,
    pub category: Option<String>,
    /// Case-insensitive substring matched against title, description and postal code.
    pub search: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStatusCounts {
    pub open: i64,
    pub assigned: i64,
    pub completed: i64,
    pub cancelled: i64,
}

/// Errors that can occur while reading or mutating tasks.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task not found")]
    NotFound,
    #[error("task was modified concurrently")]
    Conflict,
    #[error("stored task row is invalid: {0}")]
    Decode(#[from] UnknownVariant),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[derive(Debug, sqlx::FromRow)]
struct TaskDetailRow {
    id: i64,
    title: String,
    description: String,
    category: String,
    reward: f64,
    status: String,
    creator_id: i64,
    helper_id: Option<i64>,
    postal_code: Option<String>,
    latitude: f64,
    longitude: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    creator_name: String,
    creator_email: String,
    helper_name: Option<String>,
    helper_email: Option<String>,
}

impl TaskDetailRow {
    fn into_domain(self) -> Result<TaskDetail, TaskError> {
        let helper = match (self.helper_id, self.helper_name, self.helper_email) {
            (Some(id), Some(full_name), Some(email)) => Some(TaskParty {
                id,
                full_name,
                email,
            }),
            _ => None,
        };

        Ok(TaskDetail {
            task: Task {
                id: self.id,
                title: self.title,
                description: self.description,
                category: self.category,
                reward: self.reward,
                status: self.status.parse()?,
                creator_id: self.creator_id,
                helper_id: self.helper_id,
                postal_code: self.postal_code,
                location: GeoPoint::new(self.latitude, self.longitude),
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            creator: TaskParty {
                id: self.creator_id,
                full_name: self.creator_name,
                email: self.creator_email,
            },
            helper,
            distance_km: None,
        })
    }
}
