//! Test utilities for swiftprof.
//!
//! This crate provides utilities to facilitate testing of the copiers and the benchmark runner
//! without a real object store. See the modules for all available utilities.

pub mod swift;
pub mod tracing;
