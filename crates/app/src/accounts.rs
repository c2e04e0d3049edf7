use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use handy_core::types::{PublicUser, User, UserRole};
use handy_storage::{NewUser, ProfileUpdate};

use crate::auth::AuthUser;
use crate::problem::ProblemResponse;
use crate::router::{data, AppState, Data};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    #[serde(default)]
    pub user_type: Option<String>,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: PublicUser,
    pub token: String,
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: PublicUser,
}

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let Json(request) = payload?;

    let email = request.email.trim();
    if !looks_like_email(email) {
        return Err(ProblemResponse::bad_request(
            "invalid_email",
            "a valid email address is required",
        ));
    }
    if request.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ProblemResponse::bad_request(
            "weak_password",
            format!("password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    let full_name = request.full_name.trim();
    if full_name.is_empty() {
        return Err(ProblemResponse::bad_request(
            "invalid_full_name",
            "full_name is required",
        ));
    }

    let role = match request.user_type.as_deref().map(str::trim) {
        None | Some("") => UserRole::User,
        Some(raw) => raw.parse::<UserRole>().map_err(|err| {
            ProblemResponse::bad_request("invalid_user_type", err.to_string())
        })?,
    };
    if role.is_admin() {
        return Err(ProblemResponse::bad_request(
            "invalid_user_type",
            "admin accounts cannot be self-registered",
        ));
    }

    let student_id = trimmed(request.student_id.as_deref());
    if role == UserRole::Student && student_id.is_none() {
        return Err(ProblemResponse::bad_request(
            "student_id_required",
            "student accounts require a student_id",
        ));
    }

    let password_hash = state
        .passwords()
        .hash(&request.password)
        .await
        .map_err(|err| {
            error!(stage = "auth", error = %err, "failed to hash password");
            ProblemResponse::internal("failed to create account")
        })?;

    let user = state
        .storage()
        .users()
        .insert(&NewUser {
            email,
            password_hash: &password_hash,
            full_name,
            role,
            student_id,
            postal_code: trimmed(request.postal_code.as_deref()),
            created_at: state.now(),
        })
        .await?;

    counter!("users_registered_total").increment(1);
    info!(stage = "auth", user_id = user.id, role = role.as_str(), "account registered");

    Ok((StatusCode::CREATED, data(user.to_public())))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Data<LoginResponse>, ProblemResponse> {
    let Json(request) = payload?;
    let user = authenticate(&state, &request, "user").await?;
    issue_session(&state, user, "user")
}

pub async fn admin_login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Data<LoginResponse>, ProblemResponse> {
    let Json(request) = payload?;
    let user = authenticate(&state, &request, "admin").await?;
    if !user.role.is_admin() {
        counter!("auth_logins_total", "kind" => "admin", "result" => "not_admin").increment(1);
        return Err(ProblemResponse::forbidden(
            "admin_required",
            "Access denied. Admin privileges required.",
        ));
    }
    issue_session(&state, user, "admin")
}

pub async fn session(AuthUser(user): AuthUser) -> Data<SessionResponse> {
    data(SessionResponse {
        user: user.to_public(),
    })
}

pub async fn profile(AuthUser(user): AuthUser) -> Data<PublicUser> {
    data(user.to_public())
}

pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<ProfileRequest>, JsonRejection>,
) -> Result<Data<PublicUser>, ProblemResponse> {
    let Json(request) = payload?;

    let full_name = request.full_name.as_deref().map(str::trim);
    if full_name == Some("") {
        return Err(ProblemResponse::bad_request(
            "invalid_full_name",
            "full_name cannot be blank",
        ));
    }

    let updated = state
        .storage()
        .users()
        .update_profile(
            user.id,
            &ProfileUpdate {
                full_name,
                description: request.description.as_deref().map(str::trim),
                postal_code: request.postal_code.as_deref().map(str::trim),
                updated_at: state.now(),
            },
        )
        .await?
        .ok_or_else(|| ProblemResponse::not_found("user_not_found", "account no longer exists"))?;

    Ok(data(updated.to_public()))
}

/// Resolves credentials to an active account; unknown email and bad password are indistinguishable.
async fn authenticate(
    state: &AppState,
    request: &LoginRequest,
    kind: &'static str,
) -> Result<User, ProblemResponse> {
    let invalid = || {
        counter!("auth_logins_total", "kind" => kind, "result" => "invalid_credentials")
            .increment(1);
        ProblemResponse::unauthorized("invalid_credentials", "email or password is incorrect")
    };

    let user = state
        .storage()
        .users()
        .find_by_email(request.email.trim())
        .await?
        .ok_or_else(invalid)?;

    let matches = state
        .passwords()
        .verify(&request.password, &user.password_hash)
        .await
        .map_err(|err| {
            error!(stage = "auth", error = %err, "failed to verify password");
            ProblemResponse::internal("failed to verify credentials")
        })?;
    if !matches {
        return Err(invalid());
    }

    if user.is_suspended() {
        counter!("auth_logins_total", "kind" => kind, "result" => "suspended").increment(1);
        return Err(ProblemResponse::forbidden(
            "account_suspended",
            "this account has been suspended",
        ));
    }

    Ok(user)
}

fn issue_session(
    state: &AppState,
    user: User,
    kind: &'static str,
) -> Result<Data<LoginResponse>, ProblemResponse> {
    let token = state.tokens().issue(&user, state.now()).map_err(|err| {
        error!(stage = "auth", error = %err, "failed to sign token");
        ProblemResponse::internal("failed to issue token")
    })?;

    counter!("auth_logins_total", "kind" => kind, "result" => "ok").increment(1);
    info!(stage = "auth", user_id = user.id, kind, "login succeeded");

    Ok(data(LoginResponse {
        user: user.to_public(),
        token,
        expires_in: state.tokens().ttl().as_secs(),
    }))
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !value.contains(' '),
        None => false,
    }
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
