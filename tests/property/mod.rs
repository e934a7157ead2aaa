//! Property-based tests

mod status_proptest;
