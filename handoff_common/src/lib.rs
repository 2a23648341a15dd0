//! Handoff Common Library
//!
//! This crate provides shared constants, the role type and configuration
//! loading utilities for all handoff workspace crates.
//!
//! # Module Structure
//!
//! - [`consts`] - Channel layout and benchmark defaults
//! - [`role`] - Sender / receiver role tag
//! - [`config`] - Configuration loading traits and types
//!
//! # Usage
//!
//! Add to your `Cargo.toml` with alias for shorter imports:
//! ```toml
//! [dependencies]
//! handoff = { package = "handoff_common", path = "../handoff_common" }
//! ```
//!
//! Then import:
//! ```rust
//! use handoff_common::consts::*;
//! use handoff_common::config::{ConfigLoader, SharedConfig};
//! ```

pub mod config;
pub mod consts;
pub mod role;

pub use role::Role;
