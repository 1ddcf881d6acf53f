//! Database module: models and schema for persistent storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows and conversions
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `store.rs`: the record store all handlers and the gateway go through

pub mod models;
pub mod schema;
pub mod store;

pub use models::{
    IntegrationRow, IntegrationStatus, KeywordRow, LeadFormRow, LeadSubmissionRow, RankResult,
    SessionRow, SiteRow, UserRow,
};
pub use schema::SQLITE_INIT;
pub use store::{SqlitePool, Storage};
