//! Portal fetch against a mock server

use stockstatus_etl::{FetchError, SourceConfig, StockFetcher};
use wiremock::{
    matchers::{body_string_contains, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

const PAGE_PATH: &str = "/views/em_abc_stockstatus.asp";

fn source(server: &MockServer, account: &str, password: &str) -> SourceConfig {
    SourceConfig::new(format!("{}{}", server.uri(), PAGE_PATH), account, password)
}

#[tokio::test]
async fn test_fetch_posts_login_form() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(PAGE_PATH))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("EMAccount=abc002"))
        .and(body_string_contains("EMPassword=p%40ss+word"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<table></table>"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = StockFetcher::new(source(&server, "abc002", "p@ss word")).unwrap();
    let body = fetcher.fetch().await.unwrap();

    assert_eq!(body, "<table></table>");
}

#[tokio::test]
async fn test_custom_form_field_names() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_string_contains("user=abc002"))
        .and(body_string_contains("pass=secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = source(&server, "abc002", "secret");
    config.account_field = "user".to_string();
    config.password_field = "pass".to_string();

    let body = StockFetcher::new(config).unwrap().fetch().await.unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_non_success_status_is_fetch_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let fetcher = StockFetcher::new(source(&server, "abc002", "secret")).unwrap();
    let err = fetcher.fetch().await.unwrap_err();

    match err {
        FetchError::Status { status, url } => {
            assert_eq!(status, 503);
            assert!(url.ends_with(PAGE_PATH));
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unreachable_host_is_transport_error() {
    // Port 9 (discard) is not served in test environments
    let config = SourceConfig::new("http://127.0.0.1:9/stock.asp", "abc002", "secret");
    let err = StockFetcher::new(config).unwrap().fetch().await.unwrap_err();

    assert!(matches!(err, FetchError::Transport { .. }));
}

#[tokio::test]
async fn test_missing_credentials_never_send_a_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    for (account, password) in [("", "secret"), ("abc002", ""), ("  ", "  ")] {
        let err = StockFetcher::new(source(&server, account, password)).err().unwrap();
        assert_eq!(err.kind(), "ConfigError");
    }
}

#[tokio::test]
async fn test_password_is_not_in_error_messages() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let fetcher = StockFetcher::new(source(&server, "abc002", "hunter2")).unwrap();
    let err = fetcher.fetch().await.unwrap_err();

    assert!(!err.to_string().contains("hunter2"));
}
