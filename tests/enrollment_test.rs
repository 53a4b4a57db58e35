//! Enrollment integration tests
//!
//! Single and bulk enrollment through the router, credential rejection,
//! and the persisted registry mirror.

mod common;

use common::{Harness, UnreachableReplica, ORG_DOMAIN};
use ed25519_dalek::SigningKey;
use hyper::{Method, StatusCode};
use rand::rngs::OsRng;
use serde_json::json;
use std::sync::Arc;

use trainer_gateway::auth::Role;
use trainer_gateway::credentials::{attach_proof, credential_hash};
use trainer_gateway::ledger::{LedgerReplica, MemoryLedger};
use trainer_gateway::registry::{
    IdentityResolver, MspIdentityResolver, RegistryStore, StaticIdentityResolver,
};

#[tokio::test]
async fn test_register_trainer_records_credential_hash() {
    let harness = Harness::new();
    let (request, key) = harness.enrollment("t1", "s1", "c1");
    let vc = request.vc.clone().unwrap();
    let token = harness.gateway_token("t1", Role::Registrar, None, None);

    let (status, body) = harness
        .send(
            Method::POST,
            "/auth/register-trainer",
            Some(&token),
            Some(Harness::enrollment_json(&request)),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["vc_hash"], credential_hash(&vc));
    assert_eq!(body["ledger_identity"], "t1@org1.example.com");

    let record = harness.state.registry.find_by_subject("T1").unwrap();
    assert_eq!(record.cluster, "c1");

    let trainer = common::Trainer {
        subject: "t1".into(),
        key,
        vc,
    };
    let (status, me) = harness
        .send(Method::GET, "/auth/me", Some(&harness.trainer_token(&trainer)), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["role"], "trainer");
    assert_eq!(me["enrolled"], true);
    assert_eq!(me["authorized"], true);
}

#[tokio::test]
async fn test_tampered_credential_is_rejected() {
    let harness = Harness::new();
    let (mut request, _) = harness.enrollment("t1", "s1", "c1");
    if let Some(vc) = request.vc.as_mut() {
        vc["credentialSubject"]["jobId"] = json!("job-2");
    }
    let token = harness.gateway_token("t1", Role::Registrar, None, None);

    let (status, body) = harness
        .send(
            Method::POST,
            "/auth/register-trainer",
            Some(&token),
            Some(Harness::enrollment_json(&request)),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "CREDENTIAL_INVALID");
    assert!(harness.state.registry.is_empty());
}

#[tokio::test]
async fn test_registration_requires_gateway_token() {
    let harness = Harness::new();
    let trainer = harness.enroll("t1", "s1", "c1").await;
    let (request, _) = harness.enrollment("t2", "s1", "c2");

    let (status, _) = harness
        .send(
            Method::POST,
            "/auth/register-trainer",
            Some(&harness.trainer_token(&trainer)),
            Some(Harness::enrollment_json(&request)),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = harness
        .send(
            Method::POST,
            "/auth/register-trainer",
            None,
            Some(Harness::enrollment_json(&request)),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bulk_enrollment_reports_each_item() {
    let harness = Harness::new();
    let admin = harness.gateway_token("root", Role::Admin, None, None);

    let (first, _) = harness.enrollment("t1", "s1", "c1");
    let (mut second, _) = harness.enrollment("t2", "s1", "c2");
    let (third, _) = harness.enrollment("t3", "s2", "c3");

    let forger = SigningKey::generate(&mut OsRng);
    second.vc = Some(attach_proof(second.vc.as_ref().unwrap(), &forger).unwrap());

    let body = json!([
        Harness::enrollment_json(&first),
        Harness::enrollment_json(&second),
        Harness::enrollment_json(&third),
    ]);
    let (status, outcome) = harness
        .send(Method::POST, "/auth/register-trainers", Some(&admin), Some(body))
        .await;

    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert_eq!(outcome["any_failed"], true);
    let results = outcome["results"].as_array().unwrap();
    let statuses: Vec<&str> = results.iter().map(|r| r["status"].as_str().unwrap()).collect();
    assert_eq!(statuses, vec!["ok", "error", "ok"]);
    assert_eq!(results[1]["error_code"], "CREDENTIAL_INVALID");
    assert_eq!(results[1]["status_code"], 401);

    assert!(harness.state.registry.find_by_subject("t1").is_some());
    assert!(harness.state.registry.find_by_subject("t2").is_none());
    assert!(harness.state.registry.find_by_subject("t3").is_some());
}

#[tokio::test]
async fn test_bulk_enrollment_all_ok_and_admin_only() {
    let harness = Harness::new();
    let (first, _) = harness.enrollment("t1", "s1", "c1");
    let body = json!({ "trainers": [Harness::enrollment_json(&first)] });

    let aggregator = harness.gateway_token("agg", Role::Aggregator, Some("s1"), None);
    let (status, _) = harness
        .send(Method::POST, "/auth/register-trainers", Some(&aggregator), Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = harness.gateway_token("root", Role::Admin, None, None);
    let (status, outcome) = harness
        .send(Method::POST, "/auth/register-trainers", Some(&admin), Some(body))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["any_failed"], false);

    let (status, _) = harness
        .send(Method::POST, "/auth/register-trainers", Some(&admin), Some(json!([])))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_registry_mirror_survives_reopen() {
    let harness = Harness::new();
    harness.enroll("Trainer-9", "s1", "c1").await;

    let reopened = RegistryStore::open(harness.dir.path().join("registry.json")).unwrap();
    let record = reopened.find_by_subject("trainer-9").unwrap();
    assert_eq!(record.ledger_identity, "trainer-9@org1.example.com");
    assert_eq!(
        reopened.find_by_identity("trainer-9@org1.example.com").unwrap().jwt_sub,
        "trainer-9"
    );
}

#[tokio::test]
async fn test_ledger_outage_fails_enrollment_without_mirroring() {
    let replicas: Vec<Arc<dyn LedgerReplica>> = vec![Arc::new(UnreachableReplica)];
    let harness = Harness::with_ledger(replicas, |_| {
        Arc::new(StaticIdentityResolver::accept_all(ORG_DOMAIN)) as Arc<dyn IdentityResolver>
    });
    let (request, _) = harness.enrollment("t1", "s1", "c1");
    let token = harness.gateway_token("t1", Role::Registrar, None, None);

    let (status, body) = harness
        .send(
            Method::POST,
            "/auth/register-trainer",
            Some(&token),
            Some(Harness::enrollment_json(&request)),
        )
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{}", body);
    assert_eq!(body["code"], "LEDGER_ERROR");
    assert!(harness.state.registry.is_empty());
    assert!(!harness.dir.path().join("registry.json").exists());
}

#[tokio::test]
async fn test_unprovisioned_identity_is_forbidden() {
    let replicas: Vec<Arc<dyn LedgerReplica>> = vec![Arc::new(MemoryLedger::new("peer0"))];
    let harness = Harness::with_ledger(replicas, |dir| {
        Arc::new(MspIdentityResolver::new(dir.join("crypto"), ORG_DOMAIN)) as Arc<dyn IdentityResolver>
    });
    let (request, _) = harness.enrollment("t1", "s1", "c1");
    let token = harness.gateway_token("t1", Role::Registrar, None, None);

    let (status, body) = harness
        .send(
            Method::POST,
            "/auth/register-trainer",
            Some(&token),
            Some(Harness::enrollment_json(&request)),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "IDENTITY_NOT_PROVISIONED");
    assert!(harness.state.registry.is_empty());

    // provisioning the msp directory is enough to enroll
    let msp = harness
        .dir
        .path()
        .join("crypto/users/t1@org1.example.com/msp");
    std::fs::create_dir_all(msp).unwrap();
    let (status, body) = harness
        .send(
            Method::POST,
            "/auth/register-trainer",
            Some(&token),
            Some(Harness::enrollment_json(&request)),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
}

#[tokio::test]
async fn test_credential_validity_window_is_enforced() {
    let harness = Harness::new();
    let token = harness.gateway_token("t1", Role::Registrar, None, None);

    let windows = [
        ("2020-01-01T00:00:00Z", "2021-01-01T00:00:00Z", "expired"),
        ("2999-01-01T00:00:00Z", "2999-06-01T00:00:00Z", "not valid before"),
    ];
    for (from, until, message) in windows {
        let (mut request, _) = harness.enrollment("t1", "s1", "c1");
        request.vc = Some(harness.credential_valid_between(&request.did, from, until));

        let (status, body) = harness
            .send(
                Method::POST,
                "/auth/register-trainer",
                Some(&token),
                Some(Harness::enrollment_json(&request)),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", body);
        assert_eq!(body["code"], "CREDENTIAL_INVALID");
        assert!(body["error"].as_str().unwrap().contains(message), "{}", body);
    }
    assert!(harness.state.registry.is_empty());
}

#[tokio::test]
async fn test_subjects_sharing_a_ledger_identity_conflict() {
    let harness = Harness::new();
    harness.enroll("a b", "s1", "c1").await;

    let (request, _) = harness.enrollment("a-b", "s1", "c2");
    let token = harness.gateway_token("a-b", Role::Registrar, None, None);
    let (status, body) = harness
        .send(
            Method::POST,
            "/auth/register-trainer",
            Some(&token),
            Some(Harness::enrollment_json(&request)),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT, "{}", body);
    assert_eq!(body["code"], "CONFLICT");
    assert!(harness.state.registry.find_by_subject("a-b").is_none());
    assert_eq!(
        harness.state.registry.find_by_identity("a-b@org1.example.com").unwrap().jwt_sub,
        "a b"
    );

    // the holder itself can still re-enroll
    let (again, _) = harness.enrollment("A B", "s1", "c3");
    let outcome = harness.state.enrollment.register(again, None).await.unwrap();
    assert_eq!(outcome.ledger_identity, "a-b@org1.example.com");
    assert_eq!(harness.state.registry.find_by_subject("a b").unwrap().cluster, "c3");
}

#[tokio::test]
async fn test_bodies_with_both_spellings_enroll() {
    let harness = Harness::new();
    let token = harness.gateway_token("t1", Role::Registrar, None, None);

    let (request, _) = harness.enrollment("t1", "s1", "c1");
    let mut body = Harness::enrollment_json(&request);
    body["state_id"] = json!("s1");
    body["cluster_id"] = json!("c1");
    body["node_id"] = json!("ignored");
    body["publicKey"] = json!("ignored");
    body["subject"] = json!("ignored");

    let (status, outcome) = harness
        .send(Method::POST, "/auth/register-trainer", Some(&token), Some(body))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", outcome);
    assert_eq!(outcome["jwt_sub"], "t1");
    assert_eq!(outcome["node_id"], "node-t1");
    assert_eq!(outcome["state"], "s1");

    let (second, _) = harness.enrollment("t2", "s1", "c2");
    let mut both = Harness::enrollment_json(&second);
    both["state_id"] = json!("s1");
    both["cluster_id"] = json!("c2");
    let admin = harness.gateway_token("root", Role::Admin, None, None);
    let (status, outcome) = harness
        .send(Method::POST, "/auth/register-trainers", Some(&admin), Some(json!([both])))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", outcome);
    assert_eq!(outcome["results"][0]["status"], "ok");
    assert_eq!(harness.state.registry.find_by_subject("t2").unwrap().cluster, "c2");
}
