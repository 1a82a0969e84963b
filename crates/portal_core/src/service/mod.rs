//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate normalization, loading and reporting over repositories.
//! - Keep CLI/HTTP layers decoupled from storage details.

pub mod blocker_service;
pub mod etl_service;
pub mod load_service;
pub mod query_service;
