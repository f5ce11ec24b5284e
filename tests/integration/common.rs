//! Shared fixtures for the integration tests

use flyteam_collector::config::{parse_config, Config};
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at `base_url`
///
/// Retries are fast and jitter-free so failure paths finish quickly.
pub fn create_test_config(base_url: &str, start_url: &str, db_path: &Path) -> Config {
    let toml = format!(
        r#"
[crawler]
base-url = "{base_url}"
start-url = "{start_url}"
max-concurrent-requests = 4
max-attempts = 2
retry-base-delay-ms = 10
retry-jitter-ms = 0
request-timeout-secs = 5
connect-timeout-secs = 2

[writer]
batch-size = 2
queue-capacity = 16

[user-agent]
crawler-name = "TestCollector"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[output]
database-path = "{db}"
"#,
        db = db_path.display()
    );
    parse_config(&toml).expect("test config is valid")
}

/// One history row about the page's own registration
pub fn self_row(operator: &str, term: &str) -> String {
    format!(
        r#"<tr><td class="regnumber-table__data">
            <div class="regnumber-table__serial"><a href="/serial/1">12963</a></div>
            <div class="regnumber-table__airline"><a href="/airline/{operator}">{operator} Airlines</a></div>
            <div class="regnumber-table__model"><a href="/model/a320neo">A320neo</a></div>
            <div class="regnumber-table__term">{term}</div>
            <div class="regnumber-table__condition">運用中 <a href="/photo">3枚</a></div>
        </td></tr>"#
    )
}

/// One row about a different registration of the same airframe
pub fn alias_row(registration: &str) -> String {
    format!(
        r#"<tr><td class="regnumber-table__data">
            <div class="regnumber-table__regnumber"><a href="/registration/{registration}">{registration}</a></div>
            <div class="regnumber-table__term">2010/01〜2019/03</div>
        </td></tr>"#
    )
}

pub fn detail_page(rows: &[String]) -> String {
    format!(
        r#"<html><body>
            <dl><dt>HexCode</dt><dd><a href="https://globe.adsbexchange.com/">85134a 追跡</a></dd></dl>
            <table class="regnumber-table"><tbody>{}</tbody></table>
        </body></html>"#,
        rows.join("\n")
    )
}

pub fn aircraft_list_page(registrations: &[&str], next: Option<&str>) -> String {
    let rows: String = registrations
        .iter()
        .map(|reg| {
            format!(
                r#"<tr><td class="regnumber-table__regnumber"><a href="/registration/{reg}">{reg}</a></td></tr>"#
            )
        })
        .collect();
    let next = next
        .map(|href| format!(r#"<div class="next"><a href="{href}">次へ</a></div>"#))
        .unwrap_or_default();
    format!(r#"<html><body><table><tbody>{rows}</tbody></table>{next}</body></html>"#)
}

/// Mounts an HTML page at `page_path`
pub async fn mount_page(server: &MockServer, page_path: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}
