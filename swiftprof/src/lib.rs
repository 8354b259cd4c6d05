//! Benchmarks how fast a directory of files can be copied into an object store.
//!
//! Builds on top of [`swiftprof_copier`], which provides the storage backends. This crate adds
//! configuration, directory discovery, the concurrent dispatch of copies and the final report.
#![warn(missing_debug_implementations)]

pub mod batch;
pub mod cli;
pub mod config;
pub mod discover;
pub mod dispatch;
pub mod observability;
pub mod report;
