//! Client-side library: the in-memory post and auth stores a frontend
//! holds for a page session, plus the HTTP access layer they share.
//! Mutations are optimistic and roll back on confirmed server rejection.

pub mod api;
pub mod auth;
pub mod posts;

pub use api::{Api, ClientError, HttpApi, PostDraft};
pub use auth::{AuthPhase, AuthStore};
pub use posts::PostStore;
