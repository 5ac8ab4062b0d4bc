//! Integration test suite for converge.
//!
//! These tests drive the public API against the simulated control plane,
//! covering the full reassignment path and the standalone pollers.
//!
//! # Test Categories
//!
//! - `reassign_e2e`: end-to-end reassignment scenarios
//! - `pollers`: task and materialization pollers used directly
//! - `concurrency`: concurrent reassignments, cancellation and retry

mod fixtures;

mod reassign_e2e;
