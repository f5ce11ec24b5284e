//! Retry, backoff and concurrency behaviour of the fetcher against a mock server

use flyteam_collector::config::UserAgentConfig;
use flyteam_collector::crawler::{build_http_client, FetchError, RetryPolicy, RetryingFetcher};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::create_test_config;

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(10),
        jitter: Duration::ZERO,
        max_retry_after: Duration::from_secs(60),
    }
}

fn fetcher(server: &MockServer, max_concurrent: usize, policy: RetryPolicy) -> RetryingFetcher {
    fetcher_with_cancel(server, max_concurrent, policy, CancellationToken::new())
}

fn fetcher_with_cancel(
    server: &MockServer,
    max_concurrent: usize,
    policy: RetryPolicy,
    cancel: CancellationToken,
) -> RetryingFetcher {
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&server.uri(), "/area", &dir.path().join("unused.db"));
    let client = build_http_client(&config.user_agent, &config.crawler).unwrap();
    RetryingFetcher::new(client, max_concurrent, policy, cancel)
}

fn page_url(server: &MockServer, page: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), page)).unwrap()
}

#[tokio::test]
async fn test_four_server_errors_then_success_uses_four_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/registration/JA31MC"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(4)
        .expect(4)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/registration/JA31MC"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fetcher(&server, 4, fast_policy(5));
    let body = fetcher
        .fetch(&page_url(&server, "/registration/JA31MC"))
        .await
        .unwrap();

    assert_eq!(body, "ok");
    assert_eq!(server.received_requests().await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_persistent_server_error_gives_up_after_max_attempts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let fetcher = fetcher(&server, 4, fast_policy(3));
    let result = fetcher
        .fetch(&page_url(&server, "/registration/JA31MC"))
        .await;

    match result {
        Err(FetchError::Transient {
            attempts, reason, ..
        }) => {
            assert_eq!(attempts, 3);
            assert_eq!(reason, "HTTP 503");
        }
        other => panic!("expected transient failure, got {:?}", other),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_not_found_is_never_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = fetcher(&server, 4, fast_policy(5));
    let result = fetcher
        .fetch(&page_url(&server, "/registration/NOPE"))
        .await;

    assert!(matches!(
        result,
        Err(FetchError::Permanent { status: 404, .. })
    ));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_too_many_requests_honours_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let fetcher = fetcher(&server, 4, fast_policy(5));
    let started = Instant::now();
    let body = fetcher.fetch(&page_url(&server, "/area")).await.unwrap();

    assert_eq!(body, "ok");
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_huge_retry_after_is_capped() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "999999999"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let policy = RetryPolicy {
        max_retry_after: Duration::from_secs(1),
        ..fast_policy(3)
    };
    let fetcher = fetcher(&server, 4, policy);
    let started = Instant::now();
    let body = fetcher.fetch(&page_url(&server, "/area")).await.unwrap();

    assert_eq!(body, "ok");
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_slow_body_hits_total_timeout_and_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&server.uri(), "/area", &dir.path().join("unused.db"));
    config.crawler.request_timeout_secs = 1;
    let client = build_http_client(&config.user_agent, &config.crawler).unwrap();
    let fetcher = RetryingFetcher::new(client, 4, fast_policy(2), CancellationToken::new());

    let result = fetcher.fetch(&page_url(&server, "/area")).await;

    assert!(matches!(
        result,
        Err(FetchError::Transient { attempts: 2, .. })
    ));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_cancel_interrupts_backoff() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let policy = RetryPolicy {
        max_attempts: 5,
        base_delay: Duration::from_secs(30),
        jitter: Duration::ZERO,
        max_retry_after: Duration::from_secs(60),
    };
    let fetcher = fetcher_with_cancel(&server, 1, policy, cancel.clone());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = fetcher.fetch(&page_url(&server, "/area")).await;

    assert!(matches!(result, Err(FetchError::Cancelled { .. })));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_are_bounded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("ok")
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let fetcher = fetcher(&server, 2, fast_policy(1));
    let started = Instant::now();

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..6 {
        let fetcher = fetcher.clone();
        let url = page_url(&server, &format!("/registration/JA{:02}XX", i));
        tasks.spawn(async move { fetcher.fetch(&url).await });
    }
    while let Some(result) = tasks.join_next().await {
        assert_eq!(result.unwrap().unwrap(), "ok");
    }

    // Six requests through two permits take at least three round trips
    assert!(started.elapsed() >= Duration::from_millis(550));
}

#[test]
fn test_user_agent_header_value() {
    let user_agent = UserAgentConfig {
        crawler_name: "TestCollector".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    };
    assert_eq!(
        user_agent.header_value(),
        "TestCollector/1.0.0 (+https://example.com/contact; test@example.com)"
    );
}
