//! Shared types, errors, and configuration for Tally.
//!
//! This crate provides the pieces every other crate leans on:
//! - Typed IDs for tenant-scoped ledger records
//! - Application-wide error categories
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, LogFormat, SyncMode};
pub use error::{AppError, AppResult};
