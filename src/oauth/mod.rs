pub mod credential;
pub mod endpoints;
pub mod gateway;

pub use credential::{Credential, TokenSet};
pub use endpoints::OauthClientSettings;
pub use gateway::{AccessGrant, TokenGateway};
