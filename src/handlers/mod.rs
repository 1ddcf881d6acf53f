pub mod admin;
pub mod auth;
pub mod export;
pub mod integrations;
pub mod keywords;
pub mod leads;
pub mod lookup;
pub mod reports;
pub mod sites;
