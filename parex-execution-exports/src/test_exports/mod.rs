// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! This module exposes useful tooling for testing.
//! It is only compiled and exported by the crate if the "test-exports" feature is enabled.
//!
//! # Architecture
//!
//! ## config.rs
//! Provides a default execution configuration for testing.
//!
//! ## tools.rs
//! Provides a service pack backed by the in-memory collaborators and transaction builders.

mod config;
mod tools;

pub use tools::*;
