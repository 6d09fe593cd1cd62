//! Discord clients driven against an echoing stub server.

use axum::extract::RawQuery;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use courier::discord::{BotClient, WebhookClient};
use courier::http::{PostBody, PostOptions};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

/// Echoes back the interesting parts of the request.
async fn echo(headers: HeaderMap, RawQuery(query): RawQuery, Json(payload): Json<Value>) -> Json<Value> {
    Json(json!({
        "authorization": headers
            .get("authorization")
            .and_then(|value| value.to_str().ok()),
        "user_agent": headers
            .get("user-agent")
            .and_then(|value| value.to_str().ok()),
        "query": query,
        "payload": payload,
    }))
}

async fn serve(router: Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Url::parse(&format!("http://{addr}/")).unwrap()
}

fn options() -> PostOptions {
    PostOptions::default().with_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn webhook_post_sets_wait_and_suppresses_mentions() {
    let router = Router::new().route("/api/webhooks/{id}/{token}", post(echo));
    let base = serve(router).await;
    let webhook_url = base.join("api/webhooks/1/tok").unwrap();

    let client = WebhookClient::new(webhook_url.as_str())
        .unwrap()
        .with_options(options());
    let body = client.post("hello", true, false).await.unwrap();

    let PostBody::Json(echoed) = body else {
        panic!("expected JSON echo");
    };
    assert_eq!(echoed["query"], json!("wait=true"));
    assert_eq!(
        echoed["payload"],
        json!({"content": "hello", "allowed_mentions": {"parse": []}})
    );
    assert!(echoed["user_agent"]
        .as_str()
        .unwrap()
        .starts_with("courier/"));
    assert_eq!(echoed["authorization"], Value::Null);
}

#[tokio::test]
async fn webhook_post_without_wait_leaves_query_empty() {
    let router = Router::new().route("/api/webhooks/{id}/{token}", post(echo));
    let base = serve(router).await;
    let webhook_url = base.join("api/webhooks/1/tok").unwrap();

    let client = WebhookClient::new(webhook_url.as_str())
        .unwrap()
        .with_options(options());
    let body = client.post("hi", false, true).await.unwrap();

    let PostBody::Json(echoed) = body else {
        panic!("expected JSON echo");
    };
    assert_eq!(echoed["query"], Value::Null);
    assert_eq!(echoed["payload"], json!({"content": "hi"}));
}

#[tokio::test]
async fn bot_client_authenticates_with_the_bot_scheme() {
    let router = Router::new().route("/channels/42/messages", post(echo));
    let base = serve(router).await;

    let client = BotClient::new("token123")
        .with_base_url(base.as_str())
        .with_options(options());
    let body = client.send("42", "release shipped", false).await.unwrap();

    let PostBody::Json(echoed) = body else {
        panic!("expected JSON echo");
    };
    assert_eq!(echoed["authorization"], json!("Bot token123"));
    assert_eq!(
        echoed["payload"],
        json!({"content": "release shipped", "allowed_mentions": {"parse": []}})
    );
}
