//! Integration tests for the collector
//!
//! These tests use wiremock to stand in for the registry site and tempfile
//! databases for the store.

mod common;
mod crawl_tests;
mod fetch_tests;
