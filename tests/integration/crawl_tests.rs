//! Integration tests for the crawler
//!
//! These tests use wiremock to serve a small registry site and run the full
//! crawl cycle end-to-end into a temporary database.

use flyteam_collector::crawler::run_crawl;
use flyteam_collector::storage::{RecordCounts, Repository, SqliteStore};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{
    aircraft_list_page, alias_row, create_test_config, detail_page, mount_page, self_row,
};

fn open_store(db_path: &std::path::Path) -> SqliteStore {
    SqliteStore::open(db_path).unwrap()
}

#[tokio::test]
async fn test_full_crawl_from_region_index() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("collector.db");

    mount_page(
        &server,
        "/area",
        r#"<html><body>
            <a href="/area/asia/japan">Japan</a>
            <a href="/area/europe/france">France</a>
        </body></html>"#
            .to_string(),
    )
    .await;

    // Outside the region filter
    Mock::given(method("GET"))
        .and(path("/area/europe/france/airline"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .expect(0)
        .mount(&server)
        .await;

    mount_page(
        &server,
        "/area/asia/japan/airline",
        r#"<html><body>
            <div class="contents-item__header"><a href="/airline/test-air">Test Air</a></div>
            <a href="/airline/ignored-air">Sidebar link</a>
        </body></html>"#
            .to_string(),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/airline/test-air/aircrafts"))
        .and(query_param("pageid", "2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(aircraft_list_page(&["JA01XX"], None)),
        )
        .with_priority(1)
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/airline/test-air/aircrafts",
        aircraft_list_page(
            &["JA31MC"],
            Some("/airline/test-air/aircrafts?pageid=2"),
        ),
    )
    .await;

    mount_page(
        &server,
        "/registration/JA31MC",
        detail_page(&[self_row("test-air", "2019/04〜"), alias_row("N477SG")]),
    )
    .await;
    // Only reachable through the alias link
    mount_page(
        &server,
        "/registration/N477SG",
        detail_page(&[self_row("other-air", "2010/01〜2019/03")]),
    )
    .await;
    mount_page(
        &server,
        "/registration/JA01XX",
        detail_page(&[self_row("test-air", "2021/06〜")]),
    )
    .await;

    let mut config = create_test_config(&server.uri(), "/area", &db_path);
    config.crawler.region = Some("asia".to_string());

    let summary = run_crawl(&config, CancellationToken::new()).await.unwrap();

    assert!(!summary.report.interrupted);
    assert!(summary.report.failed.is_empty(), "{:?}", summary.report.failed);
    // area + operator list + two list pages + three details
    assert_eq!(summary.report.pages_fetched, 7);
    assert_eq!(summary.report.details_fetched, 3);
    assert_eq!(summary.writer.records.aircrafts, 3);

    let store = open_store(&db_path);
    let conn = store.connection();
    assert_eq!(
        conn.count_records().unwrap(),
        RecordCounts {
            aircrafts: 3,
            histories: 3,
            aliases: 1
        }
    );

    let aliases = conn.get_aliases("JA31MC").unwrap();
    assert_eq!(aliases.len(), 1);
    assert_eq!(aliases[0].alias_registration, "N477SG");
    // Aliases are directional
    assert!(conn.get_aliases("N477SG").unwrap().is_empty());

    let aircraft = conn.get_aircraft("N477SG").unwrap().unwrap();
    assert_eq!(aircraft.hex_code.as_deref(), Some("85134A"));

    let histories = conn.get_histories("JA31MC").unwrap();
    assert_eq!(histories.len(), 1);
    assert_eq!(histories[0].operator_slug, "test-air");
    assert_eq!(histories[0].term_start, "2019/04");
    assert_eq!(histories[0].term_end, None);
}

#[tokio::test]
async fn test_detail_with_one_history_and_no_alias() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("collector.db");

    mount_page(
        &server,
        "/registration/JA31MC",
        detail_page(&[self_row("test-air", "2019/04〜")]),
    )
    .await;

    let config = create_test_config(&server.uri(), "/registration/JA31MC", &db_path);
    let summary = run_crawl(&config, CancellationToken::new()).await.unwrap();

    assert_eq!(summary.report.pages_fetched, 1);
    assert_eq!(
        open_store(&db_path).connection().count_records().unwrap(),
        RecordCounts {
            aircrafts: 1,
            histories: 1,
            aliases: 0
        }
    );
}

#[tokio::test]
async fn test_detail_alias_row_adds_link_and_frontier_entry() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("collector.db");

    mount_page(
        &server,
        "/registration/JA31MC",
        detail_page(&[self_row("test-air", "2019/04〜"), alias_row("N477SG")]),
    )
    .await;
    // The alias page exists in the frontier but not on the site
    Mock::given(method("GET"))
        .and(path("/registration/N477SG"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), "/registration/JA31MC", &db_path);
    let summary = run_crawl(&config, CancellationToken::new()).await.unwrap();

    assert_eq!(summary.report.failed.len(), 1);
    assert!(summary.report.failed[0]
        .to_string()
        .contains("/registration/N477SG"));

    let store = open_store(&db_path);
    let conn = store.connection();
    assert_eq!(
        conn.count_records().unwrap(),
        RecordCounts {
            aircrafts: 1,
            histories: 1,
            aliases: 1
        }
    );
    let aliases = conn.get_aliases("JA31MC").unwrap();
    assert_eq!(aliases[0].base_registration, "JA31MC");
    assert_eq!(aliases[0].alias_registration, "N477SG");
}

#[tokio::test]
async fn test_repeated_alias_rows_store_distinct_links() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("collector.db");

    mount_page(
        &server,
        "/registration/JA31MC",
        detail_page(&[
            self_row("test-air", "2019/04〜"),
            alias_row("N477SG"),
            self_row("other-air", "2012/01〜2019/03"),
            alias_row("N477SG"),
            alias_row("B-18101"),
            alias_row("N477SG"),
            alias_row("9V-SKA"),
        ]),
    )
    .await;

    let config = create_test_config(&server.uri(), "/registration/JA31MC", &db_path);
    let summary = run_crawl(&config, CancellationToken::new()).await.unwrap();

    // Each alias page is fetched once even though N477SG is linked three times
    assert_eq!(summary.report.failed.len(), 3);

    let store = open_store(&db_path);
    let conn = store.connection();
    let counts = conn.count_records().unwrap();
    assert_eq!(counts.histories, 2);
    assert_eq!(counts.aliases, 3);

    let requests = server.received_requests().await.unwrap();
    let n477sg = requests
        .iter()
        .filter(|r| r.url.path() == "/registration/N477SG")
        .count();
    // One initial attempt; 404 is never retried
    assert_eq!(n477sg, 1);
}

#[tokio::test]
async fn test_recrawl_is_idempotent() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("collector.db");

    mount_page(
        &server,
        "/registration/JA31MC",
        detail_page(&[self_row("test-air", "2019/04〜")]),
    )
    .await;

    let config = create_test_config(&server.uri(), "/registration/JA31MC", &db_path);
    run_crawl(&config, CancellationToken::new()).await.unwrap();
    let first = open_store(&db_path)
        .connection()
        .get_histories("JA31MC")
        .unwrap();

    run_crawl(&config, CancellationToken::new()).await.unwrap();
    let store = open_store(&db_path);
    let second = store.connection().get_histories("JA31MC").unwrap();

    assert_eq!(first, second);
    assert_eq!(store.connection().count_records().unwrap().total(), 2);
}

#[tokio::test]
async fn test_shutdown_keeps_only_completed_pages() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("collector.db");

    let registrations: Vec<String> = (0..20).map(|i| format!("JA{:02}TS", i)).collect();
    let refs: Vec<&str> = registrations.iter().map(String::as_str).collect();
    mount_page(
        &server,
        "/airline/test-air/aircrafts",
        aircraft_list_page(&refs, None),
    )
    .await;

    Mock::given(method("GET"))
        .and(wiremock::matchers::path_regex(r"^/registration/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(detail_page(&[self_row("test-air", "2019/04〜")]))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let mut config = create_test_config(&server.uri(), "/airline/test-air/aircrafts", &db_path);
    config.crawler.max_concurrent_requests = 2;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(800)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let summary = run_crawl(&config, cancel).await.unwrap();

    assert!(summary.report.interrupted);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(summary.report.details_fetched < 20);

    // Every page that finished is fully persisted; abandoned pages leave nothing
    let counts = open_store(&db_path).connection().count_records().unwrap();
    assert_eq!(counts.aircrafts, summary.report.details_fetched);
    assert_eq!(counts.histories, summary.report.details_fetched);
    assert_eq!(counts, summary.writer.records);
}

#[tokio::test]
async fn test_store_error_keeps_crawl_report() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("collector.db");

    // The store refuses one aircraft mid-crawl
    open_store(&db_path)
        .connection()
        .execute_batch(
            "CREATE TRIGGER reject_ja02xx BEFORE INSERT ON aircrafts
             WHEN NEW.registration_number = 'JA02XX'
             BEGIN SELECT RAISE(ABORT, 'disk says no'); END;",
        )
        .unwrap();

    mount_page(
        &server,
        "/airline/test-air/aircrafts",
        aircraft_list_page(&["JA01XX", "JA02XX", "JA03XX"], None),
    )
    .await;
    for missing in ["/registration/JA01XX", "/registration/JA03XX"] {
        Mock::given(method("GET"))
            .and(path(missing))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
    }
    // Arrives after both 404s have been recorded
    Mock::given(method("GET"))
        .and(path("/registration/JA02XX"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(detail_page(&[self_row("test-air", "2019/04〜")]))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), "/airline/test-air/aircrafts", &db_path);
    let summary = run_crawl(&config, CancellationToken::new()).await.unwrap();

    let error = summary.writer_error.as_ref().expect("store error is reported");
    assert!(error.to_string().contains("disk says no"), "{}", error);

    // The report of the aborted run is still complete
    let failed: Vec<String> = summary.report.failed.iter().map(|f| f.url.clone()).collect();
    assert_eq!(failed.len(), 2, "{:?}", failed);
    assert!(failed.iter().any(|url| url.ends_with("/registration/JA01XX")));
    assert!(failed.iter().any(|url| url.ends_with("/registration/JA03XX")));
    assert!(summary.report.pages_fetched >= 1);
    assert_eq!(summary.writer.records.aircrafts, 0);

    assert_eq!(
        open_store(&db_path).connection().count_records().unwrap().aircrafts,
        0
    );
}
