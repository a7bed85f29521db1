pub mod claims;
pub mod config;
pub mod error;
pub mod extractors;
pub mod guards;
pub mod policy;
pub mod roles;
pub mod verifier;

pub use claims::{Claims, SignedClaims, TokenKind};
pub use config::JwtConfig;
pub use error::{AuthError, AuthResult};
pub use extractors::{read_cookie, AuthContext};
pub use guards::{ensure_role, require_roles, GuardError, RoleRequirement};
pub use policy::{can_manage, ensure_can_manage, ResourceOwnership};
pub use roles::{Role, ROLE_ADMIN, ROLE_USER};
pub use verifier::JwtVerifier;
