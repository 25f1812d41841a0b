//! Core data models for the community post service.
//!
//! These entities represent posts, the pets tagged on them, and the owning
//! users. They map cleanly to database tables via `sqlx::FromRow` and
//! serialize naturally as JSON via `serde`.

pub mod pet;
pub mod post;
pub mod user;
