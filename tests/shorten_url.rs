//! `shorten-url` against a mock shortening upstream.

mod common;

use common::{proxy, registry_with_shortener, ScriptedBackend};
use mockito::Matcher;
use pretty_assertions::assert_eq;
use serde_json::json;
use toolflow::contract::Contract;
use toolflow::invoker::{GenerateResponse, ProxySpec, ResponseCheck};
use toolflow::tasks::shorten::{ShortenUrlInput, ShortenUrlOutput};
use toolflow::{Boundary, InvocationError, TaskError, TaskRegistry};

const LONG_URL: &str = "https://example.com/very/long/path";

fn registry_for(server: &mockito::Server, check: ResponseCheck) -> TaskRegistry {
    registry_with_shortener(
        ScriptedBackend::replying(GenerateResponse::empty()),
        &format!("{}/api-create.php", server.url()),
        check,
    )
}

#[tokio::test]
async fn returns_the_short_url() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api-create.php")
        .match_query(Matcher::UrlEncoded("url".into(), LONG_URL.into()))
        .with_status(200)
        .with_body("https://tinyurl.com/abc123")
        .create_async()
        .await;

    let output = registry_for(&server, ResponseCheck::Strict)
        .run("shorten-url", json!({"url": LONG_URL}))
        .await
        .unwrap();

    assert_eq!(output, json!({"shortUrl": "https://tinyurl.com/abc123"}));
    mock.assert_async().await;
}

#[tokio::test]
async fn trailing_whitespace_in_the_body_is_trimmed() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api-create.php")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("https://tinyurl.com/abc123\n")
        .create_async()
        .await;

    let output = registry_for(&server, ResponseCheck::Strict)
        .run("shorten-url", json!({"url": LONG_URL}))
        .await
        .unwrap();
    assert_eq!(output["shortUrl"], "https://tinyurl.com/abc123");
}

#[tokio::test]
async fn error_body_is_rejected_under_both_checks() {
    for check in [ResponseCheck::Strict, ResponseCheck::Sentinel] {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api-create.php")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("Error")
            .create_async()
            .await;

        let err = registry_for(&server, check)
            .run("shorten-url", json!({"url": LONG_URL}))
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                TaskError::Invocation(InvocationError::UpstreamRejected(_))
            ),
            "{check:?}: {err:?}"
        );
    }
}

#[tokio::test]
async fn strict_check_rejects_what_sentinel_lets_through() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api-create.php")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("rate limited, try later")
        .expect(2)
        .create_async()
        .await;

    let err = registry_for(&server, ResponseCheck::Strict)
        .run("shorten-url", json!({"url": LONG_URL}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "upstream_rejected");

    // Sentinel accepts the body, so the output contract is what catches it.
    let err = registry_for(&server, ResponseCheck::Sentinel)
        .run("shorten-url", json!({"url": LONG_URL}))
        .await
        .unwrap_err();
    let contract = err.as_contract().unwrap();
    assert_eq!(contract.boundary, Boundary::Output);
    assert_eq!(contract.field, "shortUrl");
}

#[tokio::test]
async fn non_success_status_is_a_transport_failure() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api-create.php")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("service unavailable")
        .create_async()
        .await;

    let err = registry_for(&server, ResponseCheck::Strict)
        .run("shorten-url", json!({"url": LONG_URL}))
        .await
        .unwrap_err();
    match err {
        TaskError::Invocation(InvocationError::TransportFailure(message)) => {
            assert!(message.contains("503"), "{message}");
        },
        other => panic!("expected transport failure, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_body_is_an_empty_result() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api-create.php")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("   ")
        .create_async()
        .await;

    let err = registry_for(&server, ResponseCheck::Strict)
        .run("shorten-url", json!({"url": LONG_URL}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "empty_result");
}

#[tokio::test]
async fn invalid_url_fails_before_any_network_call() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let err = registry_for(&server, ResponseCheck::Strict)
        .run("shorten-url", json!({"url": "not-a-url"}))
        .await
        .unwrap_err();

    let contract = err.as_contract().unwrap();
    assert_eq!(contract.boundary, Boundary::Input);
    assert_eq!(contract.field, "url");
    mock.assert_async().await;
}

#[tokio::test]
async fn unreachable_upstream_is_a_transport_failure() {
    let registry = registry_with_shortener(
        ScriptedBackend::replying(GenerateResponse::empty()),
        "http://127.0.0.1:9/api-create.php",
        ResponseCheck::Strict,
    );
    let err = registry
        .run("shorten-url", json!({"url": LONG_URL}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "transport_failure");
}

#[tokio::test]
async fn checks_disagree_on_short_urls_containing_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api-create.php")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("https://tinyurl.com/errorx")
        .expect(2)
        .create_async()
        .await;

    let output = registry_for(&server, ResponseCheck::Strict)
        .run("shorten-url", json!({"url": LONG_URL}))
        .await
        .unwrap();
    assert_eq!(output, json!({"shortUrl": "https://tinyurl.com/errorx"}));

    let err = registry_for(&server, ResponseCheck::Sentinel)
        .run("shorten-url", json!({"url": LONG_URL}))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        TaskError::Invocation(InvocationError::UpstreamRejected(
            "https://tinyurl.com/errorx".into()
        ))
    );
}

#[tokio::test]
async fn proxy_invoke_validates_the_wrapped_body() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api-create.php")
        .match_query(Matcher::UrlEncoded("url".into(), LONG_URL.into()))
        .with_status(200)
        .with_body("short link pending")
        .expect(2)
        .create_async()
        .await;

    let input = Contract::of::<ShortenUrlInput>()
        .validate_input(json!({"url": LONG_URL}))
        .unwrap();
    let spec = ProxySpec {
        input_field: "url",
        output_field: "shortUrl",
    };
    let output = Contract::of::<ShortenUrlOutput>();

    let sentinel = proxy(&format!("{}/api-create.php", server.url()), ResponseCheck::Sentinel);
    let err = sentinel.invoke(&input, &spec, &output).await.unwrap_err();
    let contract = err.as_contract().unwrap();
    assert_eq!(contract.boundary, Boundary::Output);
    assert_eq!(contract.field, "shortUrl");

    let strict = proxy(&format!("{}/api-create.php", server.url()), ResponseCheck::Strict);
    let err = strict.invoke(&input, &spec, &output).await.unwrap_err();
    assert_eq!(err.kind(), "upstream_rejected");
}
