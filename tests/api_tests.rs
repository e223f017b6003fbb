// tests/api_tests.rs

mod common;

use axum::http::StatusCode;
use blacklist_checker::build_app;
use common::{
    app_state,
    assertions::{assert_error_response, assert_json_response},
    clean_payload,
    http::{get_request, json_request, post_request},
    listed_payload, TestConfigBuilder, PRIMARY_PATH,
};
use serde_json::json;
use tower::ServiceExt;
use wiremock::{
    matchers::{header, method, path, path_regex},
    Mock, MockServer, ResponseTemplate,
};

#[tokio::test]
async fn test_health_reports_key_counts() {
    let config = TestConfigBuilder::new()
        .with_api_key("health-key-1")
        .with_api_key("health-key-2")
        .build();
    let app = build_app(app_state(&config));

    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
    let json = assert_json_response(response, 200).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["totalKeys"], 2);
    assert_eq!(json["availableKeys"], 2);
}

#[tokio::test]
async fn test_check_blacklist_classifies_each_ip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{PRIMARY_PATH}/192.0.2.10")))
        .respond_with(ResponseTemplate::new(200).set_body_json(listed_payload(&["SORBS", "SpamCop"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{PRIMARY_PATH}/192.0.2.20")))
        .respond_with(ResponseTemplate::new(200).set_body_json(clean_payload()))
        .mount(&server)
        .await;

    let config = TestConfigBuilder::new()
        .with_api_key("check-key-1")
        .with_upstream(&server.uri())
        .build();
    let app = build_app(app_state(&config));

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/check-blacklist",
            json!({"ips": ["192.0.2.10", "192.0.2.20"]}),
        ))
        .await
        .unwrap();
    let json = assert_json_response(response, 200).await;

    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["ip"], "192.0.2.10");
    assert_eq!(results[0]["isBlacklisted"], true);
    assert_eq!(results[0]["blacklists"], json!(["SORBS", "SpamCop"]));
    assert_eq!(results[1]["isBlacklisted"], false);
    assert!(results[1].get("error").is_none());
}

#[tokio::test]
async fn test_check_blacklist_degrades_failed_ip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"/198\.51\.100\.1$"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"/198\.51\.100\.2$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(clean_payload()))
        .mount(&server)
        .await;

    let config = TestConfigBuilder::new()
        .with_api_key("degrade-key-1")
        .with_upstream(&server.uri())
        .build();
    let app = build_app(app_state(&config));

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/check-blacklist",
            json!({"ips": ["198.51.100.1", "198.51.100.2"]}),
        ))
        .await
        .unwrap();
    let json = assert_json_response(response, 200).await;

    let results = json["results"].as_array().unwrap();
    assert_eq!(results[0]["isBlacklisted"], false);
    assert_eq!(results[0]["error"], "Failed to check this IP");
    assert_eq!(results[1]["isBlacklisted"], false);
    assert!(results[1].get("error").is_none());
}

#[tokio::test]
async fn test_check_blacklist_rejects_missing_ips() {
    let app = build_app(app_state(&TestConfigBuilder::new().build()));

    let response = app
        .oneshot(json_request("POST", "/api/check-blacklist", json!({"addresses": []})))
        .await
        .unwrap();
    let json = assert_error_response(response, 400, "REQUEST_BODY_ERROR").await;
    assert_eq!(json["error"]["details"], "Invalid IP list provided");
}

#[tokio::test]
async fn test_check_blacklist_rejects_non_array_ips() {
    let app = build_app(app_state(&TestConfigBuilder::new().build()));

    let response = app
        .oneshot(post_request("/api/check-blacklist", r#"{"ips": "8.8.8.8"}"#))
        .await
        .unwrap();
    assert_error_response(response, 400, "REQUEST_BODY_ERROR").await;
}

#[tokio::test]
async fn test_stats_report_shape() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"/blacklist/.+$"))
        .and(header("authorization", "stats-key-aaaa"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let config = TestConfigBuilder::new()
        .with_api_key("stats-key-aaaa")
        .with_api_key("stats-key-bbbb")
        .with_upstream(&server.uri())
        .build();
    let state = app_state(&config);
    let _ = state.key_manager.request("8.8.8.8").await;
    let app = build_app(state);

    let response = app.oneshot(get_request("/api/stats")).await.unwrap();
    let json = assert_json_response(response, 200).await;

    assert_eq!(json["totalKeys"], 2);
    assert_eq!(json["availableKeys"], 1);
    assert_eq!(json["blockedKeys"], 1);
    assert_eq!(json["summary"]["totalRequests"], 1);
    assert_eq!(json["summary"]["activeKeys"], 1);
    assert_eq!(json["summary"]["rateLimitedKeys"], 1);

    let details = json["keyDetails"].as_array().unwrap();
    assert_eq!(details[0]["keyPreview"], "stats-ke...");
    assert_eq!(details[0]["isBlocked"], true);
    assert!(details[0]["blockUntil"].is_string());
    assert!(details[1]["lastUsed"].is_null());
    assert!(details[1]["blockUntil"].is_null());
    assert!(!json.to_string().contains("stats-key-aaaa"));
}

#[tokio::test]
async fn test_test_all_keys_without_keys_is_server_error() {
    let app = build_app(app_state(&TestConfigBuilder::new().build()));

    let response = app.oneshot(get_request("/api/test-all-keys")).await.unwrap();
    assert_error_response(response, 500, "NO_CREDENTIALS").await;
}

#[tokio::test]
async fn test_test_all_keys_rotates_through_keys() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"/blacklist/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(clean_payload()))
        .mount(&server)
        .await;

    let config = TestConfigBuilder::new()
        .with_api_key("rotate-key-1")
        .with_api_key("other-key-2")
        .with_max_requests(2)
        .with_upstream(&server.uri())
        .build();
    let app = build_app(app_state(&config));

    let response = app.oneshot(get_request("/api/test-all-keys")).await.unwrap();
    let json = assert_json_response(response, 200).await;

    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "Successfully tested 4/4 requests");
    assert_eq!(json["keysUsedInTest"], 2);
    let results = json["testResults"].as_array().unwrap();
    assert_eq!(results.len(), 4);
    assert_eq!(results[0]["usedKey"], "rotate-k...");
    assert_eq!(results[2]["usedKey"], "other-ke...");
    assert_eq!(json["stats"]["summary"]["totalRequests"], 4);
}

#[tokio::test]
async fn test_test_key_reports_valid_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{PRIMARY_PATH}/8.8.8.8")))
        .and(header("authorization", "candidate-key-xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(clean_payload()))
        .mount(&server)
        .await;

    let config = TestConfigBuilder::new().with_upstream(&server.uri()).build();
    let state = app_state(&config);
    let app = build_app(state.clone());

    let response = app
        .oneshot(json_request("POST", "/api/test-key", json!({"apiKey": "candidate-key-xyz"})))
        .await
        .unwrap();
    let json = assert_json_response(response, 200).await;

    assert_eq!(json["success"], true);
    assert_eq!(json["keyPreview"], "candidat...");
    assert_eq!(json["testIp"], "8.8.8.8");
    // The probed key never joins the rotation.
    assert_eq!(state.key_manager.get_total_keys(), 0);
}

#[tokio::test]
async fn test_test_key_reports_invalid_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"/blacklist/.+$"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let config = TestConfigBuilder::new().with_upstream(&server.uri()).build();
    let app = build_app(app_state(&config));

    let response = app
        .oneshot(json_request("POST", "/api/test-key", json!({"apiKey": "bad-key"})))
        .await
        .unwrap();
    let json = assert_json_response(response, 200).await;
    assert_eq!(json["success"], false);
    assert_eq!(
        json["error"],
        "Invalid API key - please check your MXToolbox API key"
    );
}

#[tokio::test]
async fn test_test_key_rejects_blank_key() {
    let app = build_app(app_state(&TestConfigBuilder::new().build()));

    let response = app
        .oneshot(json_request("POST", "/api/test-key", json!({"apiKey": "   "})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_route_still_gets_request_id() {
    let app = build_app(app_state(&TestConfigBuilder::new().build()));

    let response = app.oneshot(get_request("/api/unknown")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().contains_key("x-request-id"));
}
