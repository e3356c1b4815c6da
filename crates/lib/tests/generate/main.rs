//! End-to-end generation tests over the cluster fixtures.

mod common;
mod property_tests;
mod scenario_tests;
