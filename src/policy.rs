//! Authorization decisions.
//!
//! Everything here is a pure function of the request's `SecurityContext` and, for
//! resource-scoped endpoints, the owner id of the addressed resource. The per-endpoint
//! table in [`endpoints`] is the single place where an endpoint's roles and its
//! ownership rule are declared.

use uuid::Uuid;

use crate::{
    auth::SecurityContext,
    error::AppError,
    models::{Role, authorities_of},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Unauthenticated,
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(Denial),
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }

    pub fn into_result(self, action: &str) -> Result<(), AppError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(Denial::Unauthenticated) => Err(AppError::Unauthenticated),
            Decision::Deny(Denial::Forbidden) => {
                Err(AppError::Forbidden(format!("not allowed to {}", action)))
            }
        }
    }
}

/// How an endpoint relates to the owner of the resource it addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Only the role check applies.
    NotScoped,
    /// The caller must own the resource; ADMIN gets no exemption.
    OwnerOnly,
    /// The caller must own the resource or be ADMIN.
    OwnerOrAdmin,
}

/// require_role
///
/// Allows when any of the caller's authorities is listed. Roles do not imply each other:
/// an endpoint open to both USER and ADMIN lists both.
pub fn require_role(ctx: &SecurityContext, allowed: &[Role]) -> Decision {
    let Some(identity) = ctx.identity() else {
        return Decision::Deny(Denial::Unauthenticated);
    };
    if authorities_of(identity)
        .iter()
        .any(|role| allowed.contains(role))
    {
        Decision::Allow
    } else {
        Decision::Deny(Denial::Forbidden)
    }
}

/// require_ownership
///
/// Allows the resource's owner, and ADMIN only when `admin_override` is set.
pub fn require_ownership(ctx: &SecurityContext, owner_id: Uuid, admin_override: bool) -> Decision {
    let Some(identity) = ctx.identity() else {
        return Decision::Deny(Denial::Unauthenticated);
    };
    if identity.id == owner_id || (admin_override && identity.role == Role::Admin) {
        Decision::Allow
    } else {
        Decision::Deny(Denial::Forbidden)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EndpointPolicy {
    /// Human-readable action, used in the Forbidden message.
    pub action: &'static str,
    pub roles: &'static [Role],
    pub ownership: Ownership,
}

impl EndpointPolicy {
    pub const fn new(action: &'static str, roles: &'static [Role], ownership: Ownership) -> Self {
        Self {
            action,
            roles,
            ownership,
        }
    }

    /// Role check, then the ownership rule against `owner_id`.
    pub fn evaluate(&self, ctx: &SecurityContext, owner_id: Uuid) -> Decision {
        match require_role(ctx, self.roles) {
            Decision::Allow => {}
            denied => return denied,
        }
        match self.ownership {
            Ownership::NotScoped => Decision::Allow,
            Ownership::OwnerOnly => require_ownership(ctx, owner_id, false),
            Ownership::OwnerOrAdmin => require_ownership(ctx, owner_id, true),
        }
    }

    /// For endpoints that do not address an existing resource.
    pub fn authorize(&self, ctx: &SecurityContext) -> Result<(), AppError> {
        require_role(ctx, self.roles).into_result(self.action)
    }

    /// authorize_resource
    ///
    /// `owner_id` is `None` when the resource lookup found nothing. Absence is reported as
    /// `NotFound` before any role or ownership evaluation, whoever the caller is.
    pub fn authorize_resource(
        &self,
        ctx: &SecurityContext,
        owner_id: Option<Uuid>,
        resource: &str,
    ) -> Result<(), AppError> {
        let owner_id = owner_id.ok_or_else(|| AppError::NotFound(resource.to_string()))?;
        self.evaluate(ctx, owner_id).into_result(self.action)
    }
}

/// The endpoint table.
pub mod endpoints {
    use super::{EndpointPolicy, Ownership};
    use crate::models::Role;

    const MEMBERS: &[Role] = &[Role::User, Role::Admin];
    const ADMINS: &[Role] = &[Role::Admin];

    pub const VIEW_OWN: EndpointPolicy =
        EndpointPolicy::new("view own account data", MEMBERS, Ownership::NotScoped);
    pub const CREATE_PLACE: EndpointPolicy =
        EndpointPolicy::new("create a place", MEMBERS, Ownership::NotScoped);
    pub const UPDATE_PLACE: EndpointPolicy =
        EndpointPolicy::new("edit this place", MEMBERS, Ownership::OwnerOnly);
    pub const DELETE_PLACE: EndpointPolicy =
        EndpointPolicy::new("delete this place", MEMBERS, Ownership::OwnerOrAdmin);
    pub const UPLOAD_PLACE_IMAGES: EndpointPolicy =
        EndpointPolicy::new("add images to this place", MEMBERS, Ownership::OwnerOnly);
    pub const DELETE_PLACE_IMAGE: EndpointPolicy =
        EndpointPolicy::new("delete this image", MEMBERS, Ownership::OwnerOrAdmin);
    pub const UPLOAD_TEMP_IMAGE: EndpointPolicy =
        EndpointPolicy::new("upload images", MEMBERS, Ownership::NotScoped);
    pub const LIST_USERS: EndpointPolicy =
        EndpointPolicy::new("list users", ADMINS, Ownership::NotScoped);
}
