use crate::guards::GuardError;
use crate::roles::Role;
use crate::AuthContext;

/// Who may manage a resource besides global admins.
#[derive(Debug, Clone, Default)]
pub struct ResourceOwnership {
    pub owner_id: Option<String>,
    pub admin_ids: Vec<String>,
}

impl ResourceOwnership {
    pub fn owned_by(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: Some(owner_id.into()),
            admin_ids: Vec::new(),
        }
    }

    pub fn with_admins<I, T>(mut self, admins: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.admin_ids.extend(admins.into_iter().map(Into::into));
        self
    }
}

/// Owner, resource-level admin, or global admin.
pub fn can_manage(subject: &str, role: Role, resource: &ResourceOwnership) -> bool {
    if role == Role::Admin {
        return true;
    }
    if resource.owner_id.as_deref() == Some(subject) {
        return true;
    }
    resource.admin_ids.iter().any(|id| id == subject)
}

pub fn ensure_can_manage(auth: &AuthContext, resource: &ResourceOwnership) -> Result<(), GuardError> {
    if can_manage(&auth.claims.subject, auth.claims.role, resource) {
        Ok(())
    } else {
        Err(GuardError::NotPermitted)
    }
}
