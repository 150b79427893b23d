//! Unit tests for individual components

mod admin_test;
mod api_test;
mod audit_test;
mod config_test;
mod error_test;
mod lifecycle_test;
mod release_test;
