//! Versioning operations over a [`verso_db::VersionStore`].
//!
//! [`VersioningService`] is the single entry point. Its operations are
//! grouped by concern across [`versions`], [`branches`], [`merge`] and
//! [`publication`]; [`scheduler`] drives the periodic publication and
//! retention passes.

pub mod branches;
pub mod config;
pub mod error;
pub mod locks;
pub mod merge;
pub mod publication;
pub mod scheduler;
pub mod service;
pub mod versions;

pub use error::{EngineError, EngineResult, ErrorKind};
pub use service::VersioningService;
