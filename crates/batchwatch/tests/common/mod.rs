//! Shared test utilities for batchwatch integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a coordinator to in-process collaborators
//! - `RecordingUploader` capturing dependent uploads

pub mod harness;

pub use harness::{next_notice, wait_for, wait_until, RecordingUploader, TestHarness};
