//! URL handling module for the collector
//!
//! This module provides URL normalization and classification of site URLs into
//! the page kinds of the crawl hierarchy:
//!
//! ```text
//! /area                                  region index
//! /area/<region>/<country>/airline       operator list of one country
//! /airline/<slug>/aircrafts[?pageid=N]   aircraft list of one operator
//! /registration/<REG>                    aircraft detail
//! ```
//!
//! Country pages (`/area/<region>/<country>`) and operator landing pages
//! (`/airline/<slug>`) are never fetched themselves; [`crawl_target`] rewrites
//! them to the listing page they lead to.

mod normalize;

use std::fmt;
use url::Url;

pub use normalize::{normalize_parsed, normalize_url};

/// The kind of page a URL points at, which selects the extraction rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    /// Index of all regions and their countries
    RegionIndex,
    /// Operators registered in one country
    OperatorList,
    /// One page of an operator's aircraft list
    AircraftList,
    /// A single registration with its history and alias table
    AircraftDetail,
}

impl PageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegionIndex => "region",
            Self::OperatorList => "operator_list",
            Self::AircraftList => "aircraft_list",
            Self::AircraftDetail => "aircraft_detail",
        }
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized URL together with the kind of page it is
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CrawlTarget {
    pub url: Url,
    pub kind: PageKind,
}

impl CrawlTarget {
    pub fn new(url: Url, kind: PageKind) -> Self {
        Self { url, kind }
    }
}

fn segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default()
}

/// Classifies a URL by its path, exactly as it stands
///
/// Returns `None` for URLs outside the crawl hierarchy, including country and
/// operator landing pages (see [`crawl_target`]).
///
/// # Examples
///
/// ```
/// use flyteam_collector::url::{classify_url, PageKind};
/// use url::Url;
///
/// let url = Url::parse("https://flyteam.jp/registration/JA31MC").unwrap();
/// assert_eq!(classify_url(&url), Some(PageKind::AircraftDetail));
/// ```
pub fn classify_url(url: &Url) -> Option<PageKind> {
    match segments(url).as_slice() {
        ["area"] => Some(PageKind::RegionIndex),
        ["area", _, _, "airline"] => Some(PageKind::OperatorList),
        ["airline", _, "aircrafts"] => Some(PageKind::AircraftList),
        ["registration", _] => Some(PageKind::AircraftDetail),
        _ => None,
    }
}

/// Turns a site URL into the page the crawl should fetch for it
///
/// Country pages become their operator list and operator landing pages become
/// their aircraft list; every other URL is classified as-is.
pub fn crawl_target(url: &Url) -> Option<CrawlTarget> {
    let url = normalize_parsed(url.clone()).ok()?;

    let rewritten = match segments(&url).as_slice() {
        ["area", region, country] => Some(format!("/area/{}/{}/airline", region, country)),
        ["airline", slug] => Some(format!("/airline/{}/aircrafts", slug)),
        _ => None,
    };

    let url = match rewritten {
        Some(path) => {
            let mut url = url;
            url.set_path(&path);
            url.set_query(None);
            url
        }
        None => url,
    };

    classify_url(&url).map(|kind| CrawlTarget::new(url, kind))
}

/// Resolves the configured start URL (absolute or site-relative) into a target
pub fn resolve_start_url(base_url: &str, start_url: &str) -> Option<CrawlTarget> {
    let base = Url::parse(base_url).ok()?;
    let url = base.join(start_url.trim()).ok()?;
    crawl_target(&url)
}

/// Extracts the registration identifier from an aircraft detail URL
///
/// The identifier is trimmed and uppercased; `None` for any other page kind.
pub fn registration_from_url(url: &Url) -> Option<String> {
    match segments(url).as_slice() {
        ["registration", reg] => {
            let reg = reg.trim().to_uppercase();
            (!reg.is_empty()).then_some(reg)
        }
        _ => None,
    }
}

/// Region slug of a country link (`/area/<region>/<country>...`)
pub fn region_of(url: &Url) -> Option<String> {
    match segments(url).as_slice() {
        ["area", region, ..] => Some(region.to_string()),
        _ => None,
    }
}
