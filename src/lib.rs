pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod oauth;
pub mod providers;
pub mod router;

pub use error::ScopeError;
pub use oauth::gateway::TokenGateway;
pub use providers::Provider;
