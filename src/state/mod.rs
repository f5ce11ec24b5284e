//! State module for tracking crawl progress
//!
//! `PageState` is the per-URL claim state held by the frontier.

mod page_state;

pub use page_state::PageState;
