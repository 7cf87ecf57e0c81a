//! Yahoo chart provider against a mock HTTP server

use std::time::Duration;
use stock_ingest::ingest::normalize;
use stock_ingest::model::{Interval, Lookback, Symbol};
use stock_ingest::provider::{
    ExchangeZone, FetchError, FetchOutcome, PriceProvider, RetryPolicy, RetryingProvider,
    YahooConfig, YahooProvider,
};
use wiremock::matchers::{header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AAPL_FIXTURE: &str = include_str!("fixtures/aapl_2d_1h.json");

fn provider(server: &MockServer) -> YahooProvider {
    YahooProvider::with_config(YahooConfig {
        base_url: server.uri(),
        timeout: Duration::from_secs(2),
        ..Default::default()
    })
    .unwrap()
}

async fn fetch(provider: &impl PriceProvider, symbol: &str) -> FetchOutcome {
    provider
        .fetch(&Symbol::new(symbol), Lookback::Days(2), Interval::OneHour)
        .await
}

fn json(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "application/json")
}

#[tokio::test]
async fn test_fixture_series() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/AAPL"))
        .and(query_param("range", "2d"))
        .and(query_param("interval", "1h"))
        .and(query_param("includePrePost", "false"))
        .and(header_exists("user-agent"))
        .respond_with(json(AAPL_FIXTURE))
        .expect(1)
        .mount(&server)
        .await;

    let FetchOutcome::Series(series) = fetch(&provider(&server), "AAPL").await else {
        panic!("expected a series");
    };

    assert_eq!(series.len(), 14);
    assert_eq!(
        series.zone,
        ExchangeZone::Named("America/New_York".parse().unwrap())
    );
    assert!(series.rows.iter().all(|r| r.datetime.is_some() && r.date.is_none()));
    assert_eq!(series.rows[0].datetime.unwrap().timestamp(), 1735828200);
    assert_eq!(series.rows[13].volume, None);
}

#[tokio::test]
async fn test_fixture_timestamps_strictly_increase() {
    let server = MockServer::start().await;
    Mock::given(path("/v8/finance/chart/AAPL"))
        .respond_with(json(AAPL_FIXTURE))
        .mount(&server)
        .await;

    let FetchOutcome::Series(series) = fetch(&provider(&server), "AAPL").await else {
        panic!("expected a series");
    };
    let points = normalize(&series, &Symbol::new("AAPL"));

    assert_eq!(points.len(), 14);
    assert!(points.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    assert!(points.iter().all(|p| p.symbol.as_str() == "AAPL"));

    // A zero-volume bar is kept as zero; a missing one becomes null
    assert_eq!(points[6].volume, Some(0));
    assert_eq!(points[13].volume, None);
    assert!(points[13].close.is_some());
}

#[tokio::test]
async fn test_daily_interval_fills_session_date() {
    let server = MockServer::start().await;
    let body = r#"{"chart":{"result":[{
        "meta":{"symbol":"MSFT","gmtoffset":-18000,"exchangeTimezoneName":"America/New_York"},
        "timestamp":[1735828200,1735914600],
        "indicators":{"quote":[{
            "open":[425.5,421.0],"high":[426.0,424.1],"low":[418.2,419.9],
            "close":[418.6,423.4],"volume":[16896500,16662900]}]}}],"error":null}}"#;
    Mock::given(path("/v8/finance/chart/MSFT"))
        .and(query_param("interval", "1d"))
        .respond_with(json(body))
        .mount(&server)
        .await;

    let outcome = provider(&server)
        .fetch(&Symbol::new("MSFT"), Lookback::Days(5), Interval::OneDay)
        .await;
    let FetchOutcome::Series(series) = outcome else {
        panic!("expected a series");
    };

    assert!(series.rows.iter().all(|r| r.datetime.is_none()));
    assert_eq!(
        series.rows[0].date.unwrap().to_string(),
        "2025-01-02"
    );

    let points = normalize(&series, &Symbol::new("MSFT"));
    assert_eq!(points[0].timestamp.to_rfc3339(), "2025-01-02T05:00:00+00:00");
}

#[tokio::test]
async fn test_not_found() {
    let server = MockServer::start().await;
    Mock::given(path("/v8/finance/chart/XXXX"))
        .respond_with(ResponseTemplate::new(404).set_body_string(
            r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#,
        ))
        .mount(&server)
        .await;

    let outcome = fetch(&provider(&server), "XXXX").await;
    assert!(matches!(
        outcome,
        FetchOutcome::Failed(FetchError::SymbolNotFound { ref symbol }) if symbol == "XXXX"
    ));
}

#[tokio::test]
async fn test_chart_error_in_body() {
    let server = MockServer::start().await;
    Mock::given(path("/v8/finance/chart/AAPL"))
        .respond_with(json(
            r#"{"chart":{"result":null,"error":{"code":"Bad Request","description":"Invalid input - interval=7m is not supported"}}}"#,
        ))
        .mount(&server)
        .await;

    let outcome = fetch(&provider(&server), "AAPL").await;
    let FetchOutcome::Failed(FetchError::Provider { code, .. }) = outcome else {
        panic!("expected a provider error, got {:?}", outcome);
    };
    assert_eq!(code, "Bad Request");
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(path("/v8/finance/chart/AAPL"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let FetchOutcome::Failed(error) = fetch(&provider(&server), "AAPL").await else {
        panic!("expected a failure");
    };
    assert!(matches!(error, FetchError::Http { status: 502, ref body } if body == "bad gateway"));
    assert!(error.is_transient());
}

#[tokio::test]
async fn test_rate_limited_reads_retry_after() {
    let server = MockServer::start().await;
    Mock::given(path("/v8/finance/chart/AAPL"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let outcome = fetch(&provider(&server), "AAPL").await;
    assert!(matches!(
        outcome,
        FetchOutcome::Failed(FetchError::RateLimited {
            retry_after_secs: 7
        })
    ));
}

#[tokio::test]
async fn test_empty_result_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(path("/v8/finance/chart/AAPL"))
        .respond_with(json(r#"{"chart":{"result":[],"error":null}}"#))
        .mount(&server)
        .await;

    assert!(matches!(
        fetch(&provider(&server), "AAPL").await,
        FetchOutcome::Empty
    ));
}

#[tokio::test]
async fn test_all_null_rows_are_empty() {
    let server = MockServer::start().await;
    let body = r#"{"chart":{"result":[{
        "meta":{"symbol":"AAPL","gmtoffset":-18000},
        "timestamp":[1735828200,1735831800],
        "indicators":{"quote":[{
            "open":[null,null],"high":[null,null],"low":[null,null],
            "close":[null,null],"volume":[null,null]}]}}],"error":null}}"#;
    Mock::given(path("/v8/finance/chart/AAPL"))
        .respond_with(json(body))
        .mount(&server)
        .await;

    assert!(matches!(
        fetch(&provider(&server), "AAPL").await,
        FetchOutcome::Empty
    ));
}

#[tokio::test]
async fn test_garbage_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(path("/v8/finance/chart/AAPL"))
        .respond_with(json("<html>captcha</html>"))
        .mount(&server)
        .await;

    let outcome = fetch(&provider(&server), "AAPL").await;
    assert!(matches!(outcome, FetchOutcome::Failed(FetchError::Malformed(_))));
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(path("/v8/finance/chart/AAPL"))
        .respond_with(json(AAPL_FIXTURE).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let provider = YahooProvider::with_config(YahooConfig {
        base_url: server.uri(),
        timeout: Duration::from_millis(200),
        ..Default::default()
    })
    .unwrap();

    let outcome = fetch(&provider, "AAPL").await;
    assert!(matches!(outcome, FetchOutcome::Failed(FetchError::Timeout(_))));
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let provider = YahooProvider::with_config(YahooConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        timeout: Duration::from_secs(2),
        ..Default::default()
    })
    .unwrap();

    let outcome = fetch(&provider, "AAPL").await;
    assert!(matches!(outcome, FetchOutcome::Failed(FetchError::Network(_))));
}

#[tokio::test]
async fn test_retrying_provider_recovers_from_5xx() {
    let server = MockServer::start().await;
    Mock::given(path("/v8/finance/chart/AAPL"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/v8/finance/chart/AAPL"))
        .respond_with(json(AAPL_FIXTURE))
        .expect(1)
        .mount(&server)
        .await;

    let retrying = RetryingProvider::new(
        provider(&server),
        RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(10),
        },
    );

    assert!(matches!(
        fetch(&retrying, "AAPL").await,
        FetchOutcome::Series(_)
    ));
}

#[tokio::test]
async fn test_retrying_provider_skips_not_found() {
    let server = MockServer::start().await;
    Mock::given(path("/v8/finance/chart/XXXX"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let retrying = RetryingProvider::new(provider(&server), RetryPolicy::default());
    let outcome = fetch(&retrying, "XXXX").await;

    assert!(matches!(
        outcome,
        FetchOutcome::Failed(FetchError::SymbolNotFound { .. })
    ));
}
