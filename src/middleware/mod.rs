pub mod auth;

pub use auth::{AdminUser, CurrentUser, hash_token, new_session_token, require_owned_site};
