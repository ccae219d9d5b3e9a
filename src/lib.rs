// Library exports for CivicSense
// This allows integration tests and the client stores to share modules

pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod external;
pub mod extractors;
pub mod posts;
pub mod routes;
pub mod state;
pub mod upload;
