//! Repository layer over the unified store.
//!
//! # Responsibility
//! - Keep SQL details inside the persistence boundary.
//! - Offer a full-refresh write path and read paths for reporting.
//!
//! # Invariants
//! - Writes replace all unified rows inside one IMMEDIATE transaction.
//! - Read paths reject invalid persisted state instead of masking it.

pub mod report_repo;
pub mod unified_repo;
