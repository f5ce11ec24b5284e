//! Crawl frontier
//!
//! The frontier owns every URL the run knows about together with its claim
//! state, plus the queue of discovered pages nobody owns yet. Its one
//! mutation that matters for correctness is [`Frontier::claim`]: the
//! membership check and the state change happen under a single lock with no
//! suspension point in between, so each URL is claimed by exactly one caller
//! no matter how many tasks discover it concurrently.

use crate::state::PageState;
use crate::url::CrawlTarget;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use url::Url;

/// Per-state URL counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrontierCounts {
    pub discovered: usize,
    pub claimed: usize,
    pub done: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct FrontierInner {
    states: HashMap<Url, PageState>,
    pending: VecDeque<CrawlTarget>,
}

/// Set of known URLs and their claim state
#[derive(Debug, Default)]
pub struct Frontier {
    inner: Mutex<FrontierInner>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a frontier seeded with one page
    pub fn with_seed(seed: CrawlTarget) -> Self {
        let frontier = Self::new();
        frontier.discover(seed);
        frontier
    }

    fn lock(&self) -> MutexGuard<'_, FrontierInner> {
        // The inner state stays consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a newly found page
    ///
    /// No-op if the URL is already known in any state. Returns true if the
    /// page was queued.
    pub fn discover(&self, target: CrawlTarget) -> bool {
        let mut inner = self.lock();
        if inner.states.contains_key(&target.url) {
            return false;
        }
        inner
            .states
            .insert(target.url.clone(), PageState::Discovered);
        inner.pending.push_back(target);
        true
    }

    /// Takes ownership of `url`
    ///
    /// Returns true for exactly one caller per URL; every later call, from any
    /// task or thread, returns false.
    pub fn claim(&self, url: &Url) -> bool {
        let mut inner = self.lock();
        match inner.states.get(url) {
            Some(state) if !state.is_claimable() => false,
            _ => {
                inner.states.insert(url.clone(), PageState::Claimed);
                true
            }
        }
    }

    /// Pops the next queued page and claims it
    ///
    /// Queued entries that were claimed by some other path meanwhile are
    /// skipped. Returns `None` when nothing is left to claim.
    pub fn next_unclaimed(&self) -> Option<CrawlTarget> {
        let mut inner = self.lock();
        while let Some(target) = inner.pending.pop_front() {
            if let Some(state) = inner.states.get_mut(&target.url) {
                if state.is_claimable() {
                    *state = PageState::Claimed;
                    return Some(target);
                }
            }
        }
        None
    }

    pub fn mark_done(&self, url: &Url) {
        self.finish(url, PageState::Done);
    }

    pub fn mark_failed(&self, url: &Url) {
        self.finish(url, PageState::Failed);
    }

    fn finish(&self, url: &Url, state: PageState) {
        let mut inner = self.lock();
        match inner.states.get_mut(url) {
            // A finished page keeps its first outcome
            Some(current) if !current.is_terminal() => *current = state,
            _ => {}
        }
    }

    /// Number of queued pages waiting to be claimed
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn counts(&self) -> FrontierCounts {
        let inner = self.lock();
        let mut counts = FrontierCounts::default();
        for state in inner.states.values() {
            match state {
                PageState::Discovered => counts.discovered += 1,
                PageState::Claimed => counts.claimed += 1,
                PageState::Done => counts.done += 1,
                PageState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn state_of(&self, url: &Url) -> Option<PageState> {
        self.lock().states.get(url).copied()
    }
}
