//! Canonical unified entities.
//!
//! # Responsibility
//! - Define the post-normalization shape shared by loader, resolver and façade.
//! - Keep money and provenance representation in one place.
//!
//! # Invariants
//! - Every entity is identified by the integer id its domain store assigned.
//! - Provenance is stamped during normalization, never read from a source record.

pub mod entities;
pub mod money;
