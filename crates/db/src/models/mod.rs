//! Domain model structs and DTOs.

pub mod content_version;

pub use content_version::{
    BranchSummary, ContentVersion, HistoryQuery, NewContentVersion, ReviewUpdate,
};
