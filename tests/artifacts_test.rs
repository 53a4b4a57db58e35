//! Scoped artifact and legacy data integration tests

mod common;

use common::Harness;
use hyper::{Method, StatusCode};
use serde_json::json;

#[tokio::test]
async fn test_cluster_models_page_past_the_first_ten() {
    let harness = Harness::new();
    let trainer = harness.enroll("t1", "s1", "c1").await;
    let token = harness.trainer_token(&trainer);

    for round in 0..15 {
        let (status, receipt) = harness
            .send(
                Method::POST,
                "/cluster/models",
                Some(&token),
                Some(json!({"payload": {"round": round}})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", receipt);
        assert_eq!(receipt["scope_id"], "c1");
    }
    // another cluster's artifact must not count toward c1's pages
    harness
        .send(
            Method::POST,
            "/cluster/models",
            Some(&token),
            Some(json!({"clusterId": "c2", "payload": {"round": 99}})),
        )
        .await;

    let (status, first) = harness
        .send(Method::GET, "/cluster/models?scopeId=c1", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["items"].as_array().unwrap().len(), 10);
    assert_eq!(first["total"], 15);
    assert_eq!(first["has_more"], true);

    let (_, second) = harness
        .send(Method::GET, "/cluster/models?scopeId=C1&page=2&perPage=10", Some(&token), None)
        .await;
    assert_eq!(second["items"].as_array().unwrap().len(), 5);
    assert_eq!(second["has_more"], false);

    let (_, beyond) = harness
        .send(Method::GET, "/cluster/models?scopeId=c1&page=3", Some(&token), None)
        .await;
    assert!(beyond["items"].as_array().unwrap().is_empty());
    assert_eq!(beyond["has_more"], false);

    let (status, _) = harness
        .send(Method::GET, "/cluster/models?page=0", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_artifact_retrieval_checks_layer() {
    let harness = Harness::new();
    let owner = harness.enroll("t1", "s1", "c1").await;
    let reader = harness.enroll("t2", "s1", "c2").await;

    let (_, receipt) = harness
        .send(
            Method::POST,
            "/state/models",
            Some(&harness.trainer_token(&owner)),
            Some(json!({"payload": {"cid": "bafy-state"}})),
        )
        .await;
    let id = receipt["data_id"].as_str().unwrap().to_string();
    assert!(id.starts_with("model-"));
    assert_eq!(receipt["scope_id"], "s1");

    let reader_token = harness.trainer_token(&reader);
    let (status, artifact) = harness
        .send(Method::GET, &format!("/state/models/{}", id), Some(&reader_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(artifact["payload"], json!({"cid": "bafy-state"}));
    assert_eq!(artifact["owner"], "node-t1");

    let (status, _) = harness
        .send(Method::GET, &format!("/cluster/models/{}", id), Some(&reader_token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = harness
        .send(Method::GET, "/state/models/model-missing", Some(&reader_token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_models_require_an_enrolled_trainer() {
    let harness = Harness::new();
    let admin = harness.gateway_token("root", trainer_gateway::auth::Role::Admin, None, None);

    let (status, _) = harness
        .send(Method::POST, "/nation/models", Some(&admin), Some(json!({"payload": {"x": 1}})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = harness
        .send(Method::POST, "/nation/models", None, Some(json!({"payload": {"x": 1}})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_legacy_data_is_owner_only() {
    let harness = Harness::new();
    let owner = harness.enroll("t1", "s1", "c1").await;
    let other = harness.enroll("t2", "s1", "c2").await;
    let owner_token = harness.trainer_token(&owner);

    let (status, receipt) = harness
        .send(
            Method::POST,
            "/data/commit",
            Some(&owner_token),
            Some(json!({"dataId": "sample-1", "payload": {"rows": 12}})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", receipt);
    assert_eq!(receipt["data_id"], "sample-1");

    let (status, record) = harness
        .send(Method::GET, "/data/sample-1", Some(&owner_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["payload"], json!({"rows": 12}));

    let (status, _) = harness
        .send(Method::GET, "/data/sample-1", Some(&harness.trainer_token(&other)), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = harness
        .send(
            Method::POST,
            "/data/commit",
            Some(&owner_token),
            Some(json!({"payload": {}})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
