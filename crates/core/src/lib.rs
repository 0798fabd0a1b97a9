//! Muchio Core - Shared types library.
//!
//! This crate provides common types used across all Muchio components:
//! - `server` - HTTP backend (checkout webhooks, orders)
//! - `cli` - Command-line tools for migrations and inventory reconciliation
//!
//! # Architecture
//!
//! The core crate contains only types and pure helpers - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, money, emails, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
