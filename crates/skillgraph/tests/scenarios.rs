//! End-to-end scenarios across the issuer, the employer flow, presentations
//! and skill graph aggregation.

use std::sync::Arc;

use chrono::{Duration, Utc};

use skillgraph::core::{
    Action, CandidateId, CredentialId, IssuerId, Keypair, PresentationEngine, VerificationStatus,
};
use skillgraph::issuer::{self, AcademicSeed, MemoryRecords, Provider, ProviderConfig};
use skillgraph::protocol::transport::memory::MemoryTransport;
use skillgraph::protocol::{
    verify_inbound, BapConfig, BapEngine, Dispatcher, PollResult, StoreTrustRegistry,
    TransportResponse,
};
use skillgraph::store::{MemoryStore, Store};
use skillgraph::{
    ApplicationStatus, CredentialService, EmployerVerificationRequest, EmployerVerifier,
    SkillGraphService,
};
use skillgraph_testkit::fixtures;
use skillgraph_testkit::vectors::SCENARIO_A_CERTIFICATE_ID;

const BPP: &str = "http://uni.test";

/// A university provider mounted on a memory transport and trusted by the
/// requester's store.
async fn network() -> (Arc<MemoryTransport>, EmployerVerifier) {
    let transport = MemoryTransport::new();
    let provider = Arc::new(Provider::new(
        ProviderConfig {
            bpp_uri: BPP.into(),
            ..Default::default()
        },
        Keypair::from_seed(&[5u8; 32]),
        Arc::new(MemoryRecords::from_seed(AcademicSeed::demo())),
        transport.clone(),
    ));
    issuer::mount(&transport, provider.clone()).await;

    let store = Arc::new(MemoryStore::new());
    store.upsert_issuer(&provider.registry_entry()).await.unwrap();
    let employer = EmployerVerifier::new(
        Arc::new(StoreTrustRegistry::new(store)),
        transport.clone(),
        fixtures::bap_identity(),
        IssuerId::new("UNI001"),
    );
    (transport, employer)
}

fn request(skills: &[&str]) -> EmployerVerificationRequest {
    EmployerVerificationRequest {
        student_id: "STU001".into(),
        required_skills: skills.iter().map(|s| s.to_string()).collect(),
        issuer_id: None,
    }
}

#[tokio::test]
async fn scenario_a_react_is_verified_with_evidence() {
    let (_, employer) = network().await;
    let result = employer.verify(&request(&["React"])).await.unwrap();

    assert_eq!(result.status, ApplicationStatus::Verified);
    let check = &result.verification_results[0];
    assert!(check.verified);
    assert_eq!(check.confidence, Some(78));
    assert_eq!(check.nsqf_level, Some(7));
    assert_eq!(check.certificate_id.as_deref(), Some(SCENARIO_A_CERTIFICATE_ID));
}

#[tokio::test]
async fn scenario_a_is_deterministic() {
    let (_, employer) = network().await;
    let first = employer.verify(&request(&["React"])).await.unwrap();
    let again = employer.verify(&request(&["React"])).await.unwrap();
    assert_eq!(first, again);
}

#[tokio::test]
async fn scenario_b_unmapped_skill_is_rejected() {
    let (_, employer) = network().await;
    let result = employer.verify(&request(&["COBOL"])).await.unwrap();

    assert_eq!(result.status, ApplicationStatus::Failed);
    assert_eq!(
        result.verification_results[0].reason.as_deref(),
        Some("SKILL_NOT_RECOGNIZED_BY_UNIVERSITY")
    );
}

#[tokio::test]
async fn scenario_c_one_missing_skill_fails_the_application() {
    let (transport, employer) = network().await;
    let result = employer.verify(&request(&["React", "Node.js"])).await.unwrap();

    assert_eq!(result.status, ApplicationStatus::Failed);
    assert_eq!(result.verification_results.len(), 2);
    assert!(result.verification_results[0].verified);
    assert!(!result.verification_results[1].verified);
    assert_eq!(result.verification_results[1].skill, "Node.js");

    let confirms = transport
        .sent()
        .await
        .into_iter()
        .filter(|(url, _)| url == &format!("{BPP}/confirm"))
        .count();
    assert_eq!(confirms, 2);
}

#[tokio::test]
async fn scenario_d_presentation_survives_json_round_trip() {
    let store = Arc::new(MemoryStore::new());
    let cand = CandidateId::new("cand-1");
    store
        .insert_credential(&fixtures::credential("c1", &cand, &["React", "SQL"], Utc::now()))
        .await
        .unwrap();
    let graph = SkillGraphService::new(store).recompute(&cand).await.unwrap();

    let engine = PresentationEngine::new(Keypair::from_seed(&[8u8; 32]));
    let vp = engine
        .generate(&fixtures::candidate("cand-1", "Asha"), &graph.skills, Utc::now())
        .unwrap();

    let text = serde_json::to_string_pretty(&vp).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert!(engine.verify(&parsed));

    let mut tampered = parsed.clone();
    tampered["holder"] = serde_json::json!("did:candidate:mallory");
    assert!(!engine.verify(&tampered));
}

#[tokio::test]
async fn scenario_e_revoking_sole_source_removes_skill() {
    let store = Arc::new(MemoryStore::new());
    let graphs = SkillGraphService::new(store.clone());
    let credentials = CredentialService::new(store, graphs);
    let cand = CandidateId::new("cand-1");
    let now = Utc::now();

    credentials
        .add(&fixtures::credential("c1", &cand, &["React", "SQL"], now - Duration::days(2)))
        .await
        .unwrap();
    let (_, before) = credentials
        .add(&fixtures::credential("c2", &cand, &["SQL"], now))
        .await
        .unwrap();
    assert_eq!(before.skill_count, 2);

    let after = credentials
        .set_status(&CredentialId::new("c1"), VerificationStatus::Revoked)
        .await
        .unwrap();
    assert_eq!(after.skill_count, 1);
    assert!(after.node("react").is_none());
    assert_eq!(after.node("sql").unwrap().sources.len(), 1);
    assert_eq!(after.overall_score, after.skills[0].proficiency as f64);
    assert_ne!(after.overall_score, before.overall_score);
}

/// Requester engine wired to the university, collecting whatever callbacks
/// the university sends back.
async fn requester() -> (
    BapEngine,
    StoreTrustRegistry,
    Arc<std::sync::Mutex<Vec<(String, serde_json::Value)>>>,
) {
    let transport = MemoryTransport::new();
    let provider = Arc::new(Provider::new(
        ProviderConfig {
            bpp_uri: BPP.into(),
            ..Default::default()
        },
        Keypair::from_seed(&[5u8; 32]),
        Arc::new(MemoryRecords::from_seed(AcademicSeed::demo())),
        transport.clone(),
    ));
    issuer::mount(&transport, provider.clone()).await;

    let inbox = Arc::new(std::sync::Mutex::new(Vec::new()));
    for action in ["on_search", "on_select", "on_status"] {
        let inbox = inbox.clone();
        transport
            .route_fn(format!("http://bap.test/api/beckn/{}", action), move |body| {
                inbox.lock().unwrap().push((action.to_string(), body));
                TransportResponse::ok(serde_json::json!({"message": {"ack": {"status": "ACK"}}}))
            })
            .await;
    }

    let store = Arc::new(MemoryStore::new());
    store.upsert_issuer(&provider.registry_entry()).await.unwrap();
    let (dispatcher, _) = Dispatcher::spawn(transport, store.clone(), 8);
    let engine = BapEngine::new(
        BapConfig {
            identity: fixtures::bap_identity(),
            bpp_uri: Some(BPP.into()),
            gateway_uri: None,
        },
        store.clone(),
        dispatcher,
    );
    (engine, StoreTrustRegistry::new(store), inbox)
}

async fn wait_for_callback(
    inbox: &std::sync::Mutex<Vec<(String, serde_json::Value)>>,
    action: &str,
) -> serde_json::Value {
    for _ in 0..100 {
        if let Some((_, body)) = inbox.lock().unwrap().iter().find(|(a, _)| a == action) {
            return body.clone();
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("no {} callback arrived", action);
}

#[tokio::test]
async fn select_round_trip_reaches_the_poller() {
    let (engine, registry, inbox) = requester().await;

    let ack = engine
        .select("UNI001", vec![serde_json::json!({"id": "React"})], Some("txn-sel".into()))
        .await
        .unwrap();
    assert!(ack.is_ack());
    assert!(ack.ticket.unwrap().outcome().await.unwrap().is_delivered());
    assert_eq!(engine.get_result("txn-sel", Action::Select).await.unwrap(), PollResult::Pending);

    let callback = wait_for_callback(&inbox, "on_select").await;
    verify_inbound(&registry, &callback).await.unwrap();
    engine.handle_callback(Action::OnSelect, &callback).await.unwrap();

    let PollResult::Completed { results } =
        engine.get_result("txn-sel", Action::Select).await.unwrap()
    else {
        panic!("expected the on_select answer");
    };
    assert_eq!(results["message"]["order"]["items"][0]["tags"]["available"], true);
}

#[tokio::test]
async fn status_round_trip_reports_order_state() {
    let (engine, registry, inbox) = requester().await;

    let ack = engine
        .status(Some(SCENARIO_A_CERTIFICATE_ID), Some("txn-st".into()))
        .await
        .unwrap();
    assert!(ack.ticket.unwrap().outcome().await.unwrap().is_delivered());

    let callback = wait_for_callback(&inbox, "on_status").await;
    verify_inbound(&registry, &callback).await.unwrap();
    engine.handle_callback(Action::OnStatus, &callback).await.unwrap();

    let PollResult::Completed { results } =
        engine.get_result("txn-st", Action::Status).await.unwrap()
    else {
        panic!("expected the on_status answer");
    };
    // No confirm has run against this university yet.
    assert_eq!(results["message"]["order"]["state"], "NOT_FOUND");
    assert_eq!(results["message"]["order"]["id"], SCENARIO_A_CERTIFICATE_ID);
}
