//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that accept
//! `&PgPool` as the first argument. [`PgVersionStore`] adapts them to the
//! [`crate::store::VersionStore`] seam.

pub mod content_version_repo;
pub mod pg_store;

pub use content_version_repo::ContentVersionRepo;
pub use pg_store::PgVersionStore;
