//! Integration tests

mod config_test;
mod manager_test;
