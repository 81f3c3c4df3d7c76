use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{Method, header, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::{
    AppState,
    error::AppError,
    models::{Identity, Role, is_active},
    repository::Repository,
    token::{TokenKind, TokenService},
};

/// SecurityContext
///
/// The per-request view of who is calling. Built by the `authenticate` middleware, stored
/// in the request extensions, and read by handlers. It never outlives its request.
#[derive(Debug, Clone, Default)]
pub struct SecurityContext {
    identity: Option<Identity>,
    token: Option<String>,
}

impl SecurityContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(identity: Identity, token: String) -> Self {
        Self {
            identity: Some(identity),
            token: Some(token),
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn role(&self) -> Option<Role> {
        self.identity.as_ref().map(|i| i.role)
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

/// Public routes see an anonymous context; a request that never went through the gate
/// does too.
impl<S> FromRequestParts<S> for SecurityContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<SecurityContext>()
            .cloned()
            .unwrap_or_default())
    }
}

/// One allow-list entry. `*` matches exactly one path segment, a trailing `**` matches
/// whatever remains, including nothing.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    method: Option<Method>,
    segments: Vec<String>,
}

impl RoutePattern {
    pub fn new(method: Option<Method>, pattern: &str) -> Self {
        Self {
            method,
            segments: split_path(pattern).map(str::to_owned).collect(),
        }
    }

    pub fn matches(&self, method: &Method, path: &str) -> bool {
        if self.method.as_ref().is_some_and(|m| m != method) {
            return false;
        }

        let mut actual = split_path(path);
        for (i, expected) in self.segments.iter().enumerate() {
            if expected == "**" && i == self.segments.len() - 1 {
                return true;
            }
            match actual.next() {
                Some(segment) if expected == "*" || expected == segment => {}
                _ => return false,
            }
        }
        actual.next().is_none()
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// AllowList
///
/// Method and path patterns reachable without credentials. `protected` entries carve
/// more specific routes back out of a public wildcard: a request is public when some
/// public entry matches it and no protected entry does.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    public: Vec<RoutePattern>,
    protected: Vec<RoutePattern>,
}

impl AllowList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn permit(mut self, method: Option<Method>, pattern: &str) -> Self {
        self.public.push(RoutePattern::new(method, pattern));
        self
    }

    pub fn protect(mut self, method: Option<Method>, pattern: &str) -> Self {
        self.protected.push(RoutePattern::new(method, pattern));
        self
    }

    pub fn is_public(&self, method: &Method, path: &str) -> bool {
        self.public.iter().any(|p| p.matches(method, path))
            && !self.protected.iter().any(|p| p.matches(method, path))
    }

    /// The routes this service exposes anonymously.
    pub fn standard() -> Self {
        Self::new()
            .permit(None, "/health")
            .permit(None, "/api/auth/**")
            .permit(Some(Method::GET), "/api/places/**")
            .permit(Some(Method::GET), "/api/mushroom-types/**")
            .permit(Some(Method::GET), "/swagger-ui/**")
            .permit(Some(Method::GET), "/api-docs/**")
            .protect(Some(Method::GET), "/api/places/my")
    }
}

/// bearer_token
///
/// Extracts the credential from an `Authorization` header value. The scheme is matched
/// case-insensitively; anything but exactly one non-empty token after it is refused.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }
    Some(token)
}

/// resolve_context
///
/// Turns an `Authorization` header into an authenticated context, or `Unauthenticated`.
/// The exact reason is logged and never returned to the caller.
///
/// 1. Token extraction from the Bearer header.
/// 2. Signature, expiry and kind: only access tokens open the API.
/// 3. Identity lookup by the token subject. The role used from here on is the stored one.
/// 4. Active check, so deactivation takes effect without revoking tokens.
pub async fn resolve_context(
    header_value: Option<&str>,
    tokens: &TokenService,
    users: &dyn Repository,
) -> Result<SecurityContext, AppError> {
    // 1. Token Extraction
    let Some(token) = header_value.and_then(bearer_token) else {
        tracing::debug!("rejected: missing or malformed Authorization header");
        return Err(AppError::Unauthenticated);
    };

    // 2. Verification
    let verified = tokens
        .verify_kind(token, TokenKind::Access)
        .map_err(|e| {
            tracing::debug!("rejected: {}", e);
            AppError::Unauthenticated
        })?;

    // 3. Identity Lookup
    let Some(identity) = users.find_user_by_email(&verified.subject).await? else {
        tracing::debug!("rejected: no identity for subject {}", verified.subject);
        return Err(AppError::Unauthenticated);
    };

    // 4. Active Check
    if !is_active(&identity) {
        tracing::info!("rejected: identity {} is deactivated", identity.id);
        return Err(AppError::Unauthenticated);
    }

    Ok(SecurityContext::authenticated(identity, token.to_string()))
}

/// authenticate
///
/// The gate. Allow-listed requests pass with an anonymous context; every other request
/// must resolve to an authenticated one or is answered with 401 before reaching a handler.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let context = if state
        .public_routes
        .is_public(request.method(), request.uri().path())
    {
        SecurityContext::anonymous()
    } else {
        let header_value = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        resolve_context(header_value.as_deref(), &state.tokens, state.repo.as_ref()).await?
    };

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}
