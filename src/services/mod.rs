//! Services layer - Business logic
//!
//! - Session tokens, cookies and identity resolution
//! - Accounts (signup, login, password change)
//! - Catalog browsing and administration

pub mod catalog;
pub mod cookies;
pub mod identity;
pub mod password;
pub mod session;
pub mod token;
pub mod user;

pub use catalog::{CatalogError, CatalogService, NewContentInput};
pub use cookies::{CookieJar, SameSite, SetCookie};
pub use identity::{
    CookieSessionProvider, Identity, IdentityProvider, IdentityResolver, IdentitySource,
    OAuthProfile, OAuthSessionProvider, RequestIdentity,
};
pub use password::{hash_password, password_policy_violations, verify_password};
pub use session::{SessionManager, OAUTH_PROVIDER_COOKIES, OAUTH_SESSION_COOKIES};
pub use token::{TokenCodec, TokenError, OAUTH_AUDIENCE, SESSION_AUDIENCE};
pub use user::{
    FieldErrors, LoginInput, SignupInput, UpdateUserInput, UserService, UserServiceError,
};
