//! Property-based tests for determinism and aggregate invariants

mod determinism;
mod aggregates;
