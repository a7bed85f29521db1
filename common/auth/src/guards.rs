use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::error::{error_response, AuthError};
use crate::roles::Role;
use crate::verifier::JwtVerifier;
use crate::AuthContext;

#[derive(Debug)]
pub enum GuardError {
    Unauthenticated(AuthError),
    Forbidden { required: Vec<Role> },
    NotPermitted,
}

impl From<AuthError> for GuardError {
    fn from(value: AuthError) -> Self {
        GuardError::Unauthenticated(value)
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        match self {
            GuardError::Unauthenticated(err) => err.into_response(),
            GuardError::Forbidden { required } => {
                let message = if required.is_empty() {
                    "Insufficient role".to_string()
                } else {
                    let names = required.iter().map(Role::as_str).collect::<Vec<_>>();
                    format!("Insufficient role. Required one of: {}", names.join(", "))
                };
                error_response(StatusCode::FORBIDDEN, "FORBIDDEN", message)
            }
            GuardError::NotPermitted => error_response(
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "You do not have permission to manage this resource".to_string(),
            ),
        }
    }
}

/// An empty `allowed` set admits any authenticated subject.
pub fn ensure_role(auth: &AuthContext, allowed: &[Role]) -> Result<(), GuardError> {
    if allowed.is_empty() || auth.claims.has_any_role(allowed) {
        return Ok(());
    }

    warn!(
        user_id = %auth.claims.subject,
        role = %auth.claims.role,
        ?allowed,
        "role_check_failed"
    );
    Err(GuardError::Forbidden {
        required: allowed.to_vec(),
    })
}

/// Per-route access policy consumed by [`require_roles`].
#[derive(Clone)]
pub struct RoleRequirement {
    verifier: Arc<JwtVerifier>,
    allowed: Arc<[Role]>,
}

impl RoleRequirement {
    pub fn new(verifier: Arc<JwtVerifier>, allowed: &[Role]) -> Self {
        Self {
            verifier,
            allowed: Arc::from(allowed),
        }
    }

    pub fn authorize(&self, headers: &axum::http::HeaderMap) -> Result<AuthContext, GuardError> {
        let auth = AuthContext::from_headers(headers, &self.verifier)?;
        ensure_role(&auth, &self.allowed)?;
        Ok(auth)
    }
}

/// Route middleware: verifies the access credential, enforces the role set and
/// stores the resulting [`AuthContext`] in request extensions.
pub async fn require_roles(
    State(requirement): State<RoleRequirement>,
    mut request: Request,
    next: Next,
) -> Response {
    match requirement.authorize(request.headers()) {
        Ok(auth) => {
            request.extensions_mut().insert(auth);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}
