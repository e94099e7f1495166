//! Pure domain logic for the content versioning engine.
//!
//! Nothing in this crate performs I/O: diffing, hashing, validation, merge
//! payload resolution and retention selection are all plain functions so
//! they can be shared by the store backends and the service layer.

pub mod branching;
pub mod clock;
pub mod content;
pub mod diff;
pub mod error;
pub mod hashing;
pub mod merge;
pub mod patch;
pub mod publication;
pub mod retention;
pub mod types;
