//! Record and link extraction from fetched pages
//!
//! Extraction is a pure function of the page markup and the page it came
//! from. It never performs I/O and never mutates the parse tree: unwanted
//! fragments (tracker links, photo counters) are filtered out of the text
//! nodes instead of being removed from the document.
//!
//! | Page kind | Records | Links |
//! |-----------|---------|-------|
//! | Region index | none | country operator lists |
//! | Operator list | none | operator aircraft lists |
//! | Aircraft list | none | aircraft details, next page |
//! | Aircraft detail | aircraft, histories, aliases | alias details |

use crate::model::{
    Aircraft, AircraftAlias, AircraftHistory, HistoryFields, Record, ValidationError,
};
use crate::url::{crawl_target, region_of, registration_from_url, CrawlTarget, PageKind};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

/// Tracker text in the status cell; the site also spells it "exchenge"
static ADSB_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)ADS-B|adsbexchange|exchenge|exchange").expect("static ADS-B pattern is valid")
});

/// Photo counter links in the status cell, e.g. "24枚"
static PHOTO_COUNT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+枚$").expect("static photo count pattern is valid"));

static HEX_PREFIX_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Fa-f]+").expect("static hex prefix pattern is valid"));

static HEX_CODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9A-Fa-f]{6}").expect("static hex code pattern is valid"));

// Selectors, parsed once
static LINK: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static OPERATOR_LINK: LazyLock<Selector> =
    LazyLock::new(|| selector(".contents-item__header a[href]"));
static LIST_DETAIL_LINK: LazyLock<Selector> =
    LazyLock::new(|| selector(".regnumber-table__regnumber a[href]"));
static COMPACT_DETAIL_LINK: LazyLock<Selector> =
    LazyLock::new(|| selector("div.regnumber-table-sm__info-regnumber a[href]"));
static NEXT_PAGE_LINK: LazyLock<Selector> = LazyLock::new(|| selector("div.next a[href]"));
static HISTORY_ROW: LazyLock<Selector> = LazyLock::new(|| selector(".regnumber-table tbody tr"));
static ROW_DATA: LazyLock<Selector> = LazyLock::new(|| selector(".regnumber-table__data"));
static ROW_REGISTRATION: LazyLock<Selector> =
    LazyLock::new(|| selector(".regnumber-table__regnumber a"));
static ROW_SERIAL: LazyLock<Selector> = LazyLock::new(|| selector(".regnumber-table__serial a"));
static ROW_MODEL: LazyLock<Selector> = LazyLock::new(|| selector(".regnumber-table__model a"));
static ROW_TERM: LazyLock<Selector> = LazyLock::new(|| selector(".regnumber-table__term"));
static ROW_AIRLINE_LINK: LazyLock<Selector> =
    LazyLock::new(|| selector(".regnumber-table__airline a"));
static ROW_AIRLINE: LazyLock<Selector> = LazyLock::new(|| selector(".regnumber-table__airline"));
static ROW_CONDITION: LazyLock<Selector> =
    LazyLock::new(|| selector(".regnumber-table__condition"));
static TERM_LABEL: LazyLock<Selector> = LazyLock::new(|| selector("dt"));
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector("a"));

/// Separator between the start and end of an operating period
const TERM_SEPARATOR: char = '〜';

/// Everything extracted from one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Valid records, aircraft first so dependent rows follow their parent
    pub records: Vec<Record>,

    /// Newly discovered pages, deduplicated, in document order
    pub links: Vec<CrawlTarget>,

    /// Records dropped because they failed validation
    pub rejected: Vec<ValidationError>,
}

impl Extraction {
    fn push_link(&mut self, target: CrawlTarget) {
        if !self.links.contains(&target) {
            self.links.push(target);
        }
    }
}

/// Extracts records and links from a page
///
/// # Arguments
///
/// * `markup` - The page HTML
/// * `page` - The page the markup was fetched from; relative links resolve
///   against its URL and its kind selects the rules
/// * `region` - Optional region slug restricting region index extraction
///
/// # Example
///
/// ```
/// use flyteam_collector::crawler::extract;
/// use flyteam_collector::url::{CrawlTarget, PageKind};
/// use url::Url;
///
/// let page = CrawlTarget::new(Url::parse("https://flyteam.jp/area").unwrap(), PageKind::RegionIndex);
/// let html = r#"<a href="/area/asia/japan">Japan</a>"#;
/// let extraction = extract(html, &page, None);
/// assert_eq!(extraction.links[0].url.as_str(), "https://flyteam.jp/area/asia/japan/airline");
/// ```
pub fn extract(markup: &str, page: &CrawlTarget, region: Option<&str>) -> Extraction {
    let document = Html::parse_document(markup);
    let root = document.root_element();

    match page.kind {
        PageKind::RegionIndex => extract_region_index(root, &page.url, region),
        PageKind::OperatorList => extract_operator_list(root, &page.url),
        PageKind::AircraftList => extract_aircraft_list(root, &page.url),
        PageKind::AircraftDetail => extract_aircraft_detail(root, &page.url),
    }
}

fn extract_region_index(root: ElementRef<'_>, page: &Url, region: Option<&str>) -> Extraction {
    let mut extraction = Extraction::default();

    for anchor in select(root, &LINK) {
        let Some(target) = follow(anchor, page, PageKind::OperatorList) else {
            continue;
        };
        if let Some(wanted) = region {
            if region_of(&target.url).as_deref() != Some(wanted) {
                continue;
            }
        }
        extraction.push_link(target);
    }

    extraction
}

fn extract_operator_list(root: ElementRef<'_>, page: &Url) -> Extraction {
    let mut extraction = Extraction::default();

    for anchor in select(root, &OPERATOR_LINK) {
        if let Some(target) = follow(anchor, page, PageKind::AircraftList) {
            extraction.push_link(target);
        }
    }

    extraction
}

fn extract_aircraft_list(root: ElementRef<'_>, page: &Url) -> Extraction {
    let mut extraction = Extraction::default();

    // Standard table first, then the compact layout used by yearly lists
    for selector in [&*LIST_DETAIL_LINK, &*COMPACT_DETAIL_LINK] {
        for anchor in select(root, selector) {
            if let Some(target) = follow(anchor, page, PageKind::AircraftDetail) {
                extraction.push_link(target);
            }
        }
    }

    // Pagination is just another aircraft list link
    if let Some(next) = select(root, &NEXT_PAGE_LINK).into_iter().next() {
        if let Some(target) = follow(next, page, PageKind::AircraftList) {
            extraction.push_link(target);
        }
    }

    extraction
}

fn extract_aircraft_detail(root: ElementRef<'_>, page: &Url) -> Extraction {
    let mut extraction = Extraction::default();

    let Some(registration) = registration_from_url(page) else {
        extraction.rejected.push(ValidationError::EmptyRegistration);
        return extraction;
    };

    let mut serial_number: Option<String> = None;
    let mut histories = Vec::new();
    let mut aliases = Vec::new();
    let mut seen_aliases = HashSet::new();

    for row in select(root, &HISTORY_ROW) {
        let Some(data) = select(row, &ROW_DATA).into_iter().next() else {
            continue;
        };

        // A registration cell in the row means the row is about another registration
        let reg_anchor = select(data, &ROW_REGISTRATION).into_iter().next();
        let row_registration = reg_anchor
            .map(|a| clean(&text_of(a)).to_uppercase())
            .unwrap_or_else(|| registration.clone());

        if row_registration != registration {
            match AircraftAlias::new(&registration, &row_registration) {
                Ok(alias) => {
                    if seen_aliases.insert(alias.clone()) {
                        aliases.push(alias);
                    }
                }
                Err(e) => extraction.rejected.push(e),
            }
            if let Some(target) = reg_anchor.and_then(|a| follow(a, page, PageKind::AircraftDetail)) {
                extraction.push_link(target);
            }
            continue;
        }

        if serial_number.is_none() {
            serial_number = select(row, &ROW_SERIAL)
                .into_iter()
                .map(|a| clean(&text_of(a)))
                .find(|s| !s.is_empty());
        }

        let (operator_slug, operator_name) = operator_of(data);
        let model = select(data, &ROW_MODEL)
            .into_iter()
            .next()
            .map(|a| clean(&text_of(a)))
            .unwrap_or_default();
        let term = select(data, &ROW_TERM)
            .into_iter()
            .next()
            .map(|t| clean(&text_of(t)))
            .unwrap_or_default();
        let (term_start, term_end) = split_term(&term);
        let status = condition_of(data);

        let fields = HistoryFields {
            operator_slug: &operator_slug,
            operator_name: &operator_name,
            model: &model,
            status: &status,
            term_start,
            term_end,
        };
        match AircraftHistory::new(&registration, fields) {
            Ok(history) => histories.push(history),
            Err(e) => extraction.rejected.push(e),
        }
    }

    let hex_code = hex_code_of(root);
    match Aircraft::new(&registration, serial_number.as_deref(), hex_code.as_deref()) {
        Ok(aircraft) => extraction.records.push(aircraft.into()),
        Err(e) => extraction.rejected.push(e),
    }
    extraction
        .records
        .extend(histories.into_iter().map(Record::from));
    extraction
        .records
        .extend(aliases.into_iter().map(Record::from));

    extraction
}

/// Operator slug (last path segment of the operator link) and display name
fn operator_of(data: ElementRef<'_>) -> (String, String) {
    if let Some(anchor) = select(data, &ROW_AIRLINE_LINK).into_iter().next() {
        let slug = anchor
            .value()
            .attr("href")
            .and_then(|href| href.trim_end_matches('/').rsplit('/').next())
            .unwrap_or_default()
            .to_string();
        return (slug, clean(&text_of(anchor)));
    }

    let name = select(data, &ROW_AIRLINE)
        .into_iter()
        .next()
        .map(|cell| clean(&text_of(cell)))
        .unwrap_or_default();
    (String::new(), name)
}

/// Splits "2019/04〜2023/10" into start and end; a missing end means ongoing
fn split_term(term: &str) -> (&str, Option<&str>) {
    match term.split_once(TERM_SEPARATOR) {
        Some((start, end)) => {
            let end = end.trim();
            (start.trim(), (!end.is_empty()).then_some(end))
        }
        None => (term.trim(), None),
    }
}

/// Status text with tracker links and photo counters filtered out
fn condition_of(data: ElementRef<'_>) -> String {
    let Some(cell) = select(data, &ROW_CONDITION).into_iter().next() else {
        return String::new();
    };

    let parts: Vec<&str> = cell
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| !ADSB_PATTERN.is_match(s))
        .filter(|s| !PHOTO_COUNT_PATTERN.is_match(s))
        .collect();

    clean(&parts.join(" "))
}

/// Transponder code from the `dd` following the "HexCode" `dt`
fn hex_code_of(root: ElementRef<'_>) -> Option<String> {
    let dt = select(root, &TERM_LABEL)
        .into_iter()
        .find(|dt| text_of(*dt).contains("HexCode"))?;
    let dd = dt
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "dd")?;

    // The tracker link text starts with the code, e.g. "84C068 ..."
    if let Some(anchor) = select(dd, &ANCHOR).into_iter().next() {
        let raw = clean(&text_of(anchor));
        if let Some(m) = HEX_PREFIX_PATTERN.find(&raw) {
            return Some(m.as_str().to_uppercase());
        }
    }

    let raw = clean(&text_of(dd));
    HEX_CODE_PATTERN
        .find(&raw)
        .map(|m| m.as_str().to_uppercase())
}

/// Resolves an anchor into a crawl target of the expected kind on the same site
fn follow(anchor: ElementRef<'_>, page: &Url, expected: PageKind) -> Option<CrawlTarget> {
    let href = anchor.value().attr("href")?.trim();
    let url = page.join(href).ok()?;

    if url.host_str() != page.host_str() || url.port_or_known_default() != page.port_or_known_default() {
        return None;
    }

    crawl_target(&url).filter(|target| target.kind == expected)
}

fn select<'a>(scope: ElementRef<'a>, selector: &Selector) -> Vec<ElementRef<'a>> {
    scope.select(selector).collect()
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect()
}

/// Collapses runs of whitespace and trims
fn clean(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
