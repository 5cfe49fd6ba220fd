//! Full HTTP server: admission, challenges, caching, and the admin API.

mod common;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, COOKIE, USER_AGENT};
use reqwest::StatusCode;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use edge_shield::config::EdgeConfig;
use edge_shield::{HttpServer, Shutdown};

use common::{closed_port, config_with_origins, origin, start_programmable_origin, MockOrigin};

const BROWSER: &str = "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0";

struct TestOrigin {
    mock: MockOrigin,
    asset_hits: Arc<AtomicUsize>,
}

async fn asset_origin() -> TestOrigin {
    let asset_hits = Arc::new(AtomicUsize::new(0));
    let counter = asset_hits.clone();
    let mock = start_programmable_origin(move |path| {
        if path.starts_with("/asset") {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        async move { (200, format!("content of {}", path)) }
    })
    .await;
    TestOrigin { mock, asset_hits }
}

fn edge_config(origin_url: &str) -> EdgeConfig {
    let mut upstream = origin(origin_url, 5);
    upstream.health_check_enabled = false;
    let mut config = config_with_origins(vec![upstream]);
    config.shield.whitelist_addresses.clear();
    config
}

async fn start_edge(config: EdgeConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config).unwrap();
    let shutdown = Shutdown::new();
    let (_updates_tx, updates_rx) = mpsc::unbounded_channel();
    tokio::spawn(server.run(listener, updates_rx, shutdown.clone()));
    (addr, shutdown)
}

fn solve(challenge: &Value) -> Option<String> {
    match challenge["type"].as_str()? {
        "puzzle" => {
            let parts: Vec<&str> = challenge["question"].as_str()?.split_whitespace().collect();
            let a: i64 = parts[0].parse().ok()?;
            let b: i64 = parts[2].parse().ok()?;
            let result = match parts[1] {
                "+" => a + b,
                "-" => a - b,
                "*" => a * b,
                _ => return None,
            };
            Some(result.to_string())
        }
        "scripted-proof" => {
            let nonce = challenge["nonce"].as_str()?;
            Some(hex::encode(Sha256::digest(nonce.as_bytes())))
        }
        "cookie-echo" => challenge["token"].as_str().map(str::to_string),
        _ => None,
    }
}

#[tokio::test]
async fn challenge_then_verify_then_allow() {
    let origin = asset_origin().await;
    let (addr, shutdown) = start_edge(edge_config(&origin.mock.url())).await;
    let client = reqwest::Client::new();
    let base = format!("http://{}", addr);

    let challenged = client
        .get(format!("{}/asset/1.png", base))
        .header(USER_AGENT, BROWSER)
        .send()
        .await
        .unwrap();
    assert_eq!(challenged.status(), StatusCode::FORBIDDEN);
    assert!(challenged.headers().contains_key("x-request-id"));
    let body: Value = challenged.json().await.unwrap();
    let challenge = &body["challenge"];
    assert!(challenge.get("answer").is_none());
    let token = challenge["token"].as_str().unwrap().to_string();

    // A wrong answer is rejected and consumes nothing.
    let wrong = client
        .post(format!("{}/__edge/verify", base))
        .header(USER_AGENT, BROWSER)
        .json(&json!({ "token": token, "answer": "definitely wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);

    let answer = solve(challenge).unwrap();
    let verified = client
        .post(format!("{}/__edge/verify", base))
        .header(USER_AGENT, BROWSER)
        .json(&json!({ "token": token, "answer": answer }))
        .send()
        .await
        .unwrap();
    assert_eq!(verified.status(), StatusCode::OK);
    let verdict: Value = verified.json().await.unwrap();
    assert_eq!(verdict["verified"], true);

    let allowed = client
        .get(format!("{}/asset/1.png", base))
        .header(USER_AGENT, BROWSER)
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
    assert_eq!(allowed.text().await.unwrap(), "content of /asset/1.png");
    assert_eq!(origin.asset_hits.load(Ordering::SeqCst), 1);

    shutdown.trigger();
}

/// Requests `url` until a cookie-echo challenge comes back; returns its token and `Set-Cookie` pair.
async fn cookie_challenge(client: &reqwest::Client, url: &str) -> (String, String) {
    // Challenge kinds are random; keep asking until a cookie-echo one is issued.
    for _ in 0..40 {
        let response = client.get(url).header(USER_AGENT, BROWSER).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let set_cookie = response
            .headers()
            .get(reqwest::header::SET_COOKIE)
            .map(|v| v.to_str().unwrap().to_string());
        let body: Value = response.json().await.unwrap();
        if body["challenge"]["type"] == "cookie-echo" {
            let token = body["challenge"]["token"].as_str().unwrap().to_string();
            let pair = set_cookie.unwrap().split(';').next().unwrap().to_string();
            return (token, pair);
        }
    }
    panic!("no cookie-echo challenge within 40 attempts");
}

#[tokio::test]
async fn echoed_cookie_completes_cookie_challenge() {
    let origin = asset_origin().await;
    let (addr, shutdown) = start_edge(edge_config(&origin.mock.url())).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/asset/cookie.css", addr);

    let (_, pair) = cookie_challenge(&client, &url).await;
    let response = client
        .get(&url)
        .header(USER_AGENT, BROWSER)
        .header(COOKIE, pair)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    shutdown.trigger();
}

#[tokio::test]
async fn cookie_challenge_verifies_with_token_alone() {
    let origin = asset_origin().await;
    let (addr, shutdown) = start_edge(edge_config(&origin.mock.url())).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/asset/token.css", addr);

    let (token, _) = cookie_challenge(&client, &url).await;
    let verified = client
        .post(format!("http://{}/__edge/verify", addr))
        .header(USER_AGENT, BROWSER)
        .json(&json!({ "token": token }))
        .send()
        .await
        .unwrap();
    assert_eq!(verified.status(), StatusCode::OK);

    let response = client.get(&url).header(USER_AGENT, BROWSER).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "content of /asset/token.css");

    shutdown.trigger();
}

#[tokio::test]
async fn blacklisted_and_suspicious_clients_are_denied() {
    let origin = asset_origin().await;
    let mut config = edge_config(&origin.mock.url());
    config.shield.blacklist_addresses = vec!["127.0.0.1".parse().unwrap()];
    let (addr, shutdown) = start_edge(config).await;

    let response = reqwest::Client::new()
        .get(format!("http://{}/asset/a", addr))
        .header(USER_AGENT, BROWSER)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Access Denied");
    assert_eq!(body["reason"], "blocked");
    assert_eq!(body["ip"], "127.0.0.1");
    shutdown.trigger();

    let (addr, shutdown) = start_edge(edge_config(&origin.mock.url())).await;
    let response = reqwest::Client::new()
        .get(format!("http://{}/asset/a", addr))
        .header(USER_AGENT, "sqlmap/1.7")
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["reason"], "suspicious agent");
    assert_eq!(origin.asset_hits.load(Ordering::SeqCst), 0);
    shutdown.trigger();
}

#[tokio::test]
async fn whitelisted_client_is_served_from_cache() {
    let origin = asset_origin().await;
    let mut config = edge_config(&origin.mock.url());
    config.shield.whitelist_addresses = vec!["127.0.0.1".parse().unwrap()];
    let (addr, shutdown) = start_edge(config).await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        let response = client
            .get(format!("http://{}/asset/cached.js?v=3", addr))
            .header(USER_AGENT, "curl/8.0")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "content of /asset/cached.js?v=3");
    }
    assert_eq!(origin.asset_hits.load(Ordering::SeqCst), 1);

    shutdown.trigger();
}

#[tokio::test]
async fn rate_limit_denies_after_ceiling() {
    let origin = asset_origin().await;
    let mut config = edge_config(&origin.mock.url());
    config.shield.max_requests_per_minute = 3;
    let (addr, shutdown) = start_edge(config).await;
    let client = reqwest::Client::new();

    let mut reasons = Vec::new();
    for _ in 0..4 {
        let response = client
            .get(format!("http://{}/asset/r", addr))
            .header(USER_AGENT, BROWSER)
            .send()
            .await
            .unwrap();
        let body: Value = response.json().await.unwrap();
        reasons.push(body["reason"].as_str().map(str::to_string));
    }
    assert_eq!(reasons[..3], [None, None, None]);
    assert_eq!(reasons[3].as_deref(), Some("rate limited"));

    shutdown.trigger();
}

#[tokio::test]
async fn liveness_endpoint_bypasses_the_shield() {
    let origin = asset_origin().await;
    let mut config = edge_config(&origin.mock.url());
    config.shield.blacklist_addresses = vec!["127.0.0.1".parse().unwrap()];
    let (addr, shutdown) = start_edge(config).await;

    let response = reqwest::get(format!("http://{}/__edge/health", addr)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    shutdown.trigger();
}

#[tokio::test]
async fn admin_api_reports_and_purges() {
    let origin = asset_origin().await;
    let admin_addr = closed_port().await;
    let mut config = edge_config(&origin.mock.url());
    config.shield.whitelist_addresses = vec!["127.0.0.1".parse().unwrap()];
    config.admin.enabled = true;
    config.admin.api_key = "test-admin-key".to_string();
    config.admin.bind_address = admin_addr.to_string();
    let (addr, shutdown) = start_edge(config).await;
    let client = reqwest::Client::new();

    for path in ["/asset/a", "/asset/b"] {
        client.get(format!("http://{}{}", addr, path)).send().await.unwrap();
    }

    let admin = format!("http://{}", admin_addr);
    let unauthorized = client.get(format!("{}/admin/status", admin)).send().await.unwrap();
    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

    let bearer = "Bearer test-admin-key";
    let cache: Value = client
        .get(format!("{}/admin/cache", admin))
        .header(AUTHORIZATION, bearer)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cache["entries"], 2);

    let origins: Value = client
        .get(format!("{}/admin/origins", admin))
        .header(AUTHORIZATION, bearer)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(origins[0]["healthy"], true);

    let purged: Value = client
        .post(format!("{}/admin/cache/purge", admin))
        .header(AUTHORIZATION, bearer)
        .json(&json!({ "path": "/asset/a" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(purged["removed"], 1);

    let purged_all: Value = client
        .post(format!("{}/admin/cache/purge", admin))
        .header(AUTHORIZATION, bearer)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(purged_all["removed"], 1);

    let status: Value = client
        .get(format!("{}/admin/status", admin))
        .header(AUTHORIZATION, bearer)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["origins_total"], 1);
    assert_eq!(status["shield"]["enabled"], true);

    shutdown.trigger();
}
