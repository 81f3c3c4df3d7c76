use axum::{Json, extract::State, http::StatusCode};

use crate::{
    AppState,
    auth::SecurityContext,
    error::AppError,
    models::{
        AuthResponse, Identity, LoginRequest, NewIdentity, RefreshRequest, RegisterRequest, Role,
        UserSummary, is_active,
    },
    password::{hash_password_blocking, verify_password_blocking},
    policy::endpoints,
    token::TokenKind,
};

fn auth_response(state: &AppState, identity: &Identity) -> Result<AuthResponse, AppError> {
    let pair = state.tokens.issue_pair(identity)?;
    Ok(AuthResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        email: identity.email.clone(),
        role: identity.role,
    })
}

/// register
///
/// [Public Route] Creates a USER account and signs it in. Email and username must both be
/// unused; the first clash found is reported as 409.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = AuthResponse),
        (status = 409, description = "Email or username already in use"),
        (status = 422, description = "Invalid payload")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    payload.validate()?;

    let email = payload.email.trim().to_string();
    let username = payload.username.trim().to_string();

    if state.repo.email_taken(&email).await? {
        return Err(AppError::Conflict("email already in use".into()));
    }
    if state.repo.username_taken(&username).await? {
        return Err(AppError::Conflict("username already in use".into()));
    }

    let password_hash = hash_password_blocking(payload.password).await?;
    let identity = state
        .repo
        .create_user(NewIdentity {
            email,
            username,
            password_hash,
            first_name: payload.first_name,
            last_name: payload.last_name,
            role: Role::User,
        })
        .await?;

    tracing::info!("Registered identity {}", identity.id);
    Ok((StatusCode::CREATED, Json(auth_response(&state, &identity)?)))
}

/// login
///
/// [Public Route] Exchanges email and password for a token pair. Unknown email, wrong
/// password and deactivated account all answer the same 401.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let Some(identity) = state.repo.find_user_by_email(payload.email.trim()).await? else {
        tracing::debug!("login: unknown email");
        return Err(AppError::Unauthenticated);
    };

    let password_ok =
        verify_password_blocking(payload.password, identity.password_hash.clone()).await;
    if !password_ok || !is_active(&identity) {
        tracing::debug!("login refused for {}", identity.id);
        return Err(AppError::Unauthenticated);
    }

    Ok(Json(auth_response(&state, &identity)?))
}

/// refresh
///
/// [Public Route] Trades a refresh token for a fresh pair. Access tokens are refused here,
/// and the identity must still exist and be active.
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = AuthResponse),
        (status = 401, description = "Refresh token invalid or expired")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let verified = state
        .tokens
        .verify_kind(&payload.refresh_token, TokenKind::Refresh)
        .map_err(|e| {
            tracing::debug!("refresh rejected: {}", e);
            AppError::Unauthenticated
        })?;

    let identity = state
        .repo
        .find_user_by_email(&verified.subject)
        .await?
        .filter(is_active)
        .ok_or(AppError::Unauthenticated)?;

    Ok(Json(auth_response(&state, &identity)?))
}

/// get_me
///
/// [Authenticated Route] The caller's own account.
#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Current user", body = UserSummary),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_me(ctx: SecurityContext) -> Result<Json<UserSummary>, AppError> {
    endpoints::VIEW_OWN.authorize(&ctx)?;
    let identity = ctx.identity().ok_or(AppError::Unauthenticated)?;
    Ok(Json(UserSummary::from(identity)))
}

/// list_users
///
/// [Admin Route] Every registered account, newest first.
#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "All users", body = [UserSummary]),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn list_users(
    ctx: SecurityContext,
    State(state): State<AppState>,
) -> Result<Json<Vec<UserSummary>>, AppError> {
    endpoints::LIST_USERS.authorize(&ctx)?;
    let users = state.repo.list_users().await?;
    Ok(Json(users.iter().map(UserSummary::from).collect()))
}
