use super::helper;
use crate::auth::{
    AdminUser, AuthUser, JwtKeys, Role, hash_password, validate_new_password, verify_password,
};
use crate::model::account::{LoginResponse, NewUser, UserCredentials, UserProfile};
use crate::payloads::account::{
    ChangePasswordPayload, CreateUserPayload, LoginPayload, RegisterPayload, SetRolePayload,
    is_plausible_email, normalize_email,
};
use crate::{errors::AppError, response::ApiResponse, schema::users::dsl as users_dsl};
use axum::{
    Json,
    extract::{Path, State},
};
use deadpool_diesel::postgres::Pool;
use diesel::dsl::now;
use diesel::prelude::*;
use tracing::{debug, error, info, instrument, warn};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Validates and inserts a user, mapping a duplicate email to 409.
async fn insert_user(
    pool: &Pool,
    username: &str,
    email: &str,
    password: &str,
    role: Role,
) -> Result<i64, AppError> {
    let username = helper::required_text(username, "username", helper::NAME_MAX_LENGTH)?;
    let email = normalize_email(email);
    if !is_plausible_email(&email) || email.chars().count() > helper::EMAIL_MAX_LENGTH {
        return Err(AppError::UnprocessableEntity(format!(
            "'{}' is not a valid email address.",
            email
        )));
    }
    validate_new_password(password)?;

    let new_user = NewUser {
        username,
        email: email.clone(),
        password_hash: hash_password(password)?,
        role: role.as_str().to_string(),
    };

    let insert_result = helper::run_query(pool, move |conn| {
        diesel::insert_into(users_dsl::users)
            .values(&new_user)
            .returning(users_dsl::id)
            .get_result::<i64>(conn)
    })
    .await;

    match insert_result {
        Ok(id) => Ok(id),
        Err(e) if e.is_unique_violation() => {
            warn!("Registration rejected, email {} already in use", email);
            Err(AppError::Conflict(format!(
                "Email {} is already registered.",
                email
            )))
        }
        Err(e) => Err(e),
    }
}

/// Creates a regular user account.
///
/// Request Body: `RegisterPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `i64`: The new user ID (200 OK).
/// * `409 Conflict`: If the email is already registered.
/// * `422 Unprocessable Entity`: If the username, email or password is invalid.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn register(
    State(pool): State<Pool>,
    Json(payload): Json<RegisterPayload>,
) -> Result<ApiResponse<i64>, AppError> {
    info!("Attempting to register account for email: {}", payload.email);

    let user_id = insert_user(
        &pool,
        &payload.username,
        &payload.email,
        &payload.password,
        Role::User,
    )
    .await?;

    info!("Registered user {}", user_id);
    Ok(ApiResponse::ok(user_id))
}

/// Exchanges email and password for an access token.
///
/// Request Body: `LoginPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `LoginResponse`: Token, role, user ID and username (200 OK).
/// * `401 Unauthorized`: If the email is unknown or the password is wrong.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, keys, payload))]
pub async fn login(
    State(pool): State<Pool>,
    State(keys): State<JwtKeys>,
    Json(payload): Json<LoginPayload>,
) -> Result<ApiResponse<LoginResponse>, AppError> {
    let email = normalize_email(&payload.email);
    info!("Login attempt for email: {}", email);
    debug!("Login payload: {:?}", payload);

    let lookup_email = email.clone();
    let credentials = helper::run_query(&pool, move |conn| {
        users_dsl::users
            .filter(users_dsl::email.eq(lookup_email))
            .select(UserCredentials::as_select())
            .first::<UserCredentials>(conn)
            .optional()
    })
    .await?;

    let credentials = match credentials {
        Some(c) if verify_password(&payload.password, &c.password_hash) => c,
        Some(_) => {
            warn!("Wrong password supplied for email: {}", email);
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }
        None => {
            warn!("Login attempted for unknown email: {}", email);
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }
    };

    let role: Role = credentials.role.parse().map_err(|_| {
        error!(
            "User {} has an unrecognised role '{}' stored",
            credentials.id, credentials.role
        );
        AppError::InternalServerError(anyhow::anyhow!("Stored role is invalid"))
    })?;
    let token = keys.issue(credentials.id, &credentials.email, role)?;

    let user_id = credentials.id;
    helper::run_query(&pool, move |conn| {
        diesel::update(users_dsl::users.find(user_id))
            .set(users_dsl::last_login.eq(now))
            .execute(conn)
    })
    .await?;

    info!("User {} logged in with role {}", credentials.id, role);
    Ok(ApiResponse::ok(LoginResponse {
        token,
        role: role.to_string(),
        user_id: credentials.id,
        username: credentials.username,
    }))
}

/// Returns the profile of the calling user.
///
/// Returns (wrapped in `ApiResponse`)
/// * `UserProfile`: The caller's profile (200 OK).
/// * `401 Unauthorized`: If the token is missing or invalid.
/// * `404 Not Found`: If the account was deleted after the token was issued.
#[instrument(skip(pool))]
pub async fn me(
    State(pool): State<Pool>,
    user: AuthUser,
) -> Result<ApiResponse<UserProfile>, AppError> {
    let user_id = user.user_id;
    info!("Fetching profile for user {}", user_id);

    let profile = helper::run_query(&pool, move |conn| {
        users_dsl::users
            .find(user_id)
            .select(UserProfile::as_select())
            .first::<UserProfile>(conn)
            .optional()
    })
    .await?;

    profile.map(ApiResponse::ok).ok_or_else(|| {
        warn!("Token refers to user {} which no longer exists", user_id);
        AppError::NotFound(format!("User with ID {} not found.", user_id))
    })
}

/// Changes the caller's password after checking the current one.
///
/// Request Body: `ChangePasswordPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `bool`: true (200 OK).
/// * `401 Unauthorized`: If the current password is wrong.
/// * `422 Unprocessable Entity`: If the new password is too short.
#[instrument(skip(pool, payload))]
pub async fn change_password(
    State(pool): State<Pool>,
    user: AuthUser,
    Json(payload): Json<ChangePasswordPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let user_id = user.user_id;
    info!("User {} is changing their password", user_id);

    let stored_hash = helper::run_query(&pool, move |conn| {
        users_dsl::users
            .find(user_id)
            .select(users_dsl::password_hash)
            .first::<String>(conn)
    })
    .await?;

    if !verify_password(&payload.current_password, &stored_hash) {
        warn!("User {} supplied a wrong current password", user_id);
        return Err(AppError::Unauthorized(
            "Current password is incorrect.".to_string(),
        ));
    }
    validate_new_password(&payload.new_password)?;
    let new_hash = hash_password(&payload.new_password)?;

    helper::run_query(&pool, move |conn| {
        diesel::update(users_dsl::users.find(user_id))
            .set(users_dsl::password_hash.eq(new_hash))
            .execute(conn)
    })
    .await?;

    info!("Password changed for user {}", user_id);
    Ok(ApiResponse::ok(true))
}

/// Lists all accounts ordered by ID. Admin only.
#[instrument(skip(pool))]
pub async fn list_users(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
) -> Result<ApiResponse<Vec<UserProfile>>, AppError> {
    info!("Admin {} listing users", admin.user_id);

    let users = helper::run_query(&pool, |conn| {
        users_dsl::users
            .order(users_dsl::id.asc())
            .select(UserProfile::as_select())
            .load::<UserProfile>(conn)
    })
    .await?;

    info!("Fetched {} users", users.len());
    Ok(ApiResponse::ok(users))
}

/// Creates an account with an explicit role. Admin only.
///
/// Request Body: `CreateUserPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `i64`: The new user ID (200 OK).
/// * `409 Conflict`: If the email is already registered.
/// * `422 Unprocessable Entity`: If a field or the role is invalid.
#[instrument(skip(pool, payload))]
pub async fn create_user(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<CreateUserPayload>,
) -> Result<ApiResponse<i64>, AppError> {
    info!(
        "Admin {} creating user {} with role {}",
        admin.user_id, payload.email, payload.role
    );

    let role: Role = payload.role.parse()?;
    let user_id = insert_user(
        &pool,
        &payload.username,
        &payload.email,
        &payload.password,
        role,
    )
    .await?;

    info!("Admin {} created user {}", admin.user_id, user_id);
    Ok(ApiResponse::ok(user_id))
}

/// Changes a user's role. Admin only; admins cannot demote themselves.
///
/// Request Body: `SetRolePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `bool`: true (200 OK).
/// * `404 Not Found`: If the user does not exist.
/// * `409 Conflict`: If an admin tries to change their own role.
/// * `422 Unprocessable Entity`: If the role is unknown.
#[instrument(skip(pool, payload))]
pub async fn set_user_role(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<i64>,
    Json(payload): Json<SetRolePayload>,
) -> Result<ApiResponse<bool>, AppError> {
    info!(
        "Admin {} setting role of user {} to {}",
        admin.user_id, user_id, payload.role
    );

    let role: Role = payload.role.parse()?;
    if user_id == admin.user_id && role != Role::Admin {
        warn!("Admin {} attempted to demote themself", admin.user_id);
        return Err(AppError::Conflict(
            "Administrators cannot remove their own admin role.".to_string(),
        ));
    }

    let rows_affected = helper::run_query(&pool, move |conn| {
        diesel::update(users_dsl::users.find(user_id))
            .set(users_dsl::role.eq(role.as_str()))
            .execute(conn)
    })
    .await?;

    if rows_affected == 0 {
        error!("User with ID {} not found. Role not changed.", user_id);
        return Err(AppError::NotFound(format!(
            "User with ID {} not found.",
            user_id
        )));
    }

    info!("User {} now has role {}", user_id, role);
    Ok(ApiResponse::ok(true))
}

/// Deletes a user. Admin only; admins cannot delete themselves.
///
/// Returns (wrapped in `ApiResponse`)
/// * `bool`: true (200 OK).
/// * `404 Not Found`: If the user does not exist.
/// * `409 Conflict`: If an admin tries to delete their own account.
#[instrument(skip(pool))]
pub async fn delete_user(
    State(pool): State<Pool>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<i64>,
) -> Result<ApiResponse<bool>, AppError> {
    info!("Admin {} deleting user {}", admin.user_id, user_id);

    if user_id == admin.user_id {
        warn!("Admin {} attempted to delete themself", admin.user_id);
        return Err(AppError::Conflict(
            "Administrators cannot delete their own account.".to_string(),
        ));
    }

    let rows_affected = helper::run_query(&pool, move |conn| {
        diesel::delete(users_dsl::users.find(user_id)).execute(conn)
    })
    .await?;

    if rows_affected == 0 {
        error!("User with ID {} not found. Nothing deleted.", user_id);
        return Err(AppError::NotFound(format!(
            "User with ID {} not found.",
            user_id
        )));
    }

    info!("Deleted user {}", user_id);
    Ok(ApiResponse::ok(true))
}
