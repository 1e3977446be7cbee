#![allow(clippy::unwrap_used)]
// Integration tests for `StreamClient` using wiremock.

use futures_util::StreamExt;
use secrecy::SecretString;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use orderbell_api::{Error, StreamClient};

async fn setup() -> (MockServer, StreamClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&format!("{}/api", server.uri())).unwrap();
    let client = StreamClient::with_client(reqwest::Client::new(), base_url);
    (server, client)
}

#[tokio::test]
async fn test_stream_yields_envelopes_in_order() {
    let (server, client) = setup().await;

    let body = concat!(
        ": hello\n\n",
        "data: {\"type\":\"connected\",\"message\":\"welcome\"}\n\n",
        "data: {\"type\":\"order.created\",\"data\":{\"_id\":\"o-9\"}}\n\n",
        "data: not json\n\n",
        "data: {\"type\":\"pending.count\",\"data\":{\"count\":4}}\n\n",
    );

    Mock::given(method("GET"))
        .and(path("/api/realtime/orders"))
        .and(query_param("token", "tok-1"))
        .and(header("accept", "text/event-stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let token = SecretString::from("tok-1".to_string());
    let stream = client.open(Some(&token)).await.unwrap();
    let kinds: Vec<String> = stream
        .map(|item| item.unwrap().kind)
        .collect()
        .await;

    assert_eq!(kinds, vec!["connected", "order.created", "pending.count"]);
}

#[tokio::test]
async fn test_stream_refused_with_status() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/realtime/orders"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client.open(None).await;
    match result {
        Err(Error::StreamRefused { status }) => assert_eq!(status, 401),
        Err(other) => panic!("expected StreamRefused, got: {other:?}"),
        Ok(_) => panic!("expected StreamRefused, got an open stream"),
    }
}
