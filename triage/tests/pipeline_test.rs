//! End-to-end pipeline tests against the mock oracle and the memory store

use std::sync::Arc;
use std::time::Duration;

use complaint_triage::backend::{MockBackend, MockReply};
use complaint_triage::config::{AssignmentConfig, OracleConfig};
use complaint_triage::pipeline::RECENT_COMPLAINTS;
use complaint_triage::retry::RecordingSleeper;
use complaint_triage::*;
use tokio_test::{assert_err, assert_ok};

const POTHOLE_ANSWER: &str = "\
Department: Roads and Bridges Department
Priority: 8
Category: infrastructure
Analysis: A large pothole on a busy street is causing accidents and needs urgent repair.
Officer: Executive Engineer, Roads Division - road surface damage with safety risk";

struct Harness {
    store: Arc<MemoryStore>,
    backend: Arc<MockBackend>,
    sleeper: Arc<RecordingSleeper>,
    pipeline: Arc<TriagePipeline>,
}

fn harness(backend: MockBackend, officers: Vec<Officer>, config: TriageConfig) -> Harness {
    let store = Arc::new(MemoryStore::new().with_officers(officers));
    let backend = Arc::new(backend);
    let sleeper = Arc::new(RecordingSleeper::new());
    let pipeline = Arc::new(TriagePipeline::with_sleeper(
        store.clone(),
        backend.clone(),
        config,
        sleeper.clone(),
    ));
    Harness {
        store,
        backend,
        sleeper,
        pipeline,
    }
}

fn officer(id: &str, dept: &str, load: usize) -> Officer {
    Officer::new(id, format!("Officer {id}"), dept)
        .with_active((0..load).map(|i| format!("{id}-existing-{i}")))
}

fn pothole(citizen: &str) -> NewComplaint {
    NewComplaint {
        citizen_id: citizen.to_string(),
        title: "Pothole on Main St".to_string(),
        description: "large pothole causing accidents".to_string(),
        location: "Main St".to_string(),
        category: ComplaintCategory::Infrastructure,
        image_url: None,
    }
}

#[tokio::test]
async fn test_pothole_routed_to_roads_and_least_loaded_officer() {
    let h = harness(
        MockBackend::new("llama-3.3-70b-versatile").with_response(POTHOLE_ANSWER),
        vec![
            officer("busy", "ROADS_001", 3),
            officer("light", "ROADS_001", 1),
            officer("full", "ROADS_001", 5),
            officer("health", "HEALTH_001", 0),
        ],
        TriageConfig::default(),
    );

    let complaint = assert_ok!(h.pipeline.submit(pothole("citizen@example.com")).await);

    assert_eq!(complaint.status, ComplaintStatus::Pending);
    assert_eq!(complaint.department_id.as_deref(), Some("ROADS_001"));
    assert_eq!(complaint.assigned_to.as_deref(), Some("light"));

    let analysis = complaint.ai_analysis.as_ref().unwrap();
    assert_eq!(analysis.department_id, "ROADS_001");
    assert!((analysis.priority_score - 0.8).abs() < f64::EPSILON);
    assert_eq!(analysis.category_prediction, ComplaintCategory::Infrastructure);
    assert_eq!(analysis.version, "llama-3.3-70b-versatile");
    assert!(analysis.officer_recommendation.starts_with("Executive Engineer"));

    let light = h.store.officer("light").await.unwrap();
    assert_eq!(light.active_count(), 2);
    assert_eq!(light.active_complaints.last(), Some(&complaint.id));
    assert_eq!(h.store.officer("busy").await.unwrap().active_count(), 3);

    assert_eq!(h.backend.call_count(), 1);
    assert!(h.sleeper.delays().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_oracle_timing_out_three_times_yields_sentinel() {
    let slow = || MockReply::Delay(Duration::from_secs(120), POTHOLE_ANSWER.to_string());
    let config = TriageConfig {
        oracle: OracleConfig {
            timeout_secs: 60,
            ..Default::default()
        },
        ..Default::default()
    };
    let h = harness(
        MockBackend::default().with_script([slow(), slow(), slow()]),
        vec![officer("o1", "ROADS_001", 0)],
        config,
    );

    let complaint = assert_ok!(h.pipeline.submit(pothole("ana")).await);

    let analysis = complaint.ai_analysis.as_ref().unwrap();
    assert_eq!(analysis.department_id, SENTINEL_DEPARTMENT_ID);
    assert_eq!(analysis.priority_score, 0.0);
    assert_eq!(analysis.version, SENTINEL_VERSION);
    assert!(analysis.analysis_text.contains("3 attempts"));

    assert_eq!(complaint.status, ComplaintStatus::Pending);
    assert!(complaint.department_id.is_none());
    assert!(complaint.assigned_to.is_none());

    // Still fetchable by its owner
    let fetched = assert_ok!(
        h.pipeline
            .get_complaint(&Identity::citizen("ana"), &complaint.id)
            .await
    );
    assert!(fetched.ai_analysis.unwrap().is_sentinel());

    assert_eq!(h.backend.call_count(), 3);
    assert_eq!(
        h.sleeper.delays(),
        vec![Duration::from_secs(2), Duration::from_secs(4)]
    );
    assert_eq!(h.store.officer("o1").await.unwrap().active_count(), 0);
    assert!(h.store.analyses().await.is_empty());
}

#[tokio::test]
async fn test_permanently_unavailable_oracle_keeps_complaint() {
    let h = harness(
        MockBackend::default().with_available(false),
        vec![],
        TriageConfig::default(),
    );

    let complaint = assert_ok!(h.pipeline.submit(pothole("ana")).await);

    assert!(complaint.ai_analysis.unwrap().is_sentinel());
    assert!(h.store.find_complaint(&complaint.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_attempts_stop_at_first_success() {
    let h = harness(
        MockBackend::default()
            .with_response(POTHOLE_ANSWER)
            .with_script([
                MockReply::Fail(OracleError::NetworkError("connection reset".to_string())),
                // Ignores the format contract entirely
                MockReply::Respond("I'm sorry, I can't help with that.".to_string()),
            ]),
        vec![],
        TriageConfig::default(),
    );

    let complaint = assert_ok!(h.pipeline.submit(pothole("ana")).await);

    assert_eq!(complaint.department_id.as_deref(), Some("ROADS_001"));
    assert_eq!(h.backend.call_count(), 3);
    assert_eq!(
        h.sleeper.delays(),
        vec![Duration::from_secs(2), Duration::from_secs(4)]
    );
}

#[tokio::test]
async fn test_unknown_department_goes_to_default() {
    let h = harness(
        MockBackend::default().with_response(
            "Priority: 3\nDepartment: Department of Silly Walks\nAnalysis: Odd request.",
        ),
        vec![officer("w1", "WORKS_001", 2)],
        TriageConfig::default(),
    );

    let complaint = assert_ok!(h.pipeline.submit(pothole("ana")).await);

    assert_eq!(complaint.department_id.as_deref(), Some("WORKS_001"));
    assert_eq!(complaint.assigned_to.as_deref(), Some("w1"));

    let analysis = complaint.ai_analysis.unwrap();
    assert!((analysis.priority_score - 0.3).abs() < f64::EPSILON);
    assert_eq!(analysis.officer_recommendation, parser::NO_OFFICER_RECOMMENDATION);
}

#[tokio::test]
async fn test_no_officer_below_ceiling_leaves_unassigned() {
    let h = harness(
        MockBackend::default().with_response(POTHOLE_ANSWER),
        vec![officer("a", "ROADS_001", 5), officer("b", "ROADS_001", 6)],
        TriageConfig::default(),
    );

    let complaint = assert_ok!(h.pipeline.submit(pothole("ana")).await);

    assert_eq!(complaint.department_id.as_deref(), Some("ROADS_001"));
    assert!(complaint.assigned_to.is_none());
    assert_eq!(h.store.officer("a").await.unwrap().active_count(), 5);
    assert_eq!(h.store.officer("b").await.unwrap().active_count(), 6);
}

#[tokio::test]
async fn test_conditional_claims_hold_the_ceiling_under_concurrency() {
    let config = TriageConfig {
        assignment: AssignmentConfig {
            claim_mode: ClaimMode::Conditional,
            max_claim_attempts: 20,
            ..Default::default()
        },
        ..Default::default()
    };
    let h = harness(
        MockBackend::default().with_response(POTHOLE_ANSWER),
        vec![officer("a", "ROADS_001", 3), officer("b", "ROADS_001", 4)],
        config,
    );

    let submissions = (0..8).map(|i| {
        let pipeline = h.pipeline.clone();
        tokio::spawn(async move { pipeline.submit(pothole(&format!("citizen-{i}"))).await })
    });
    let complaints: Vec<Complaint> = futures::future::join_all(submissions)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let assigned = complaints.iter().filter(|c| c.assigned_to.is_some()).count();
    assert_eq!(assigned, 3);
    assert_eq!(h.store.officer("a").await.unwrap().active_count(), 5);
    assert_eq!(h.store.officer("b").await.unwrap().active_count(), 5);
}

#[tokio::test]
async fn test_spawn_triage_for_persisted_complaint() {
    let h = harness(
        MockBackend::default().with_response(POTHOLE_ANSWER),
        vec![officer("a", "ROADS_001", 0)],
        TriageConfig::default(),
    );

    let complaint = Complaint::new(pothole("ana"));
    h.store.insert_complaint(&complaint).await.unwrap();

    let report = h.pipeline.spawn_triage(complaint.clone()).await.unwrap();
    assert!(!report.is_sentinel());
    assert_eq!(report.attempts, 1);
    assert_eq!(report.assigned.unwrap().officer_id, "a");

    let stored = h.store.find_complaint(&complaint.id).await.unwrap().unwrap();
    assert!(stored.is_triaged());
    assert_eq!(stored.assigned_to.as_deref(), Some("a"));
    assert_eq!(h.store.analyses().await.len(), 1);
}

#[tokio::test]
async fn test_listing_is_scoped_by_role() {
    let h = harness(
        MockBackend::default().with_response(POTHOLE_ANSWER),
        vec![],
        TriageConfig::default(),
    );

    let ana = assert_ok!(h.pipeline.submit(pothole("ana")).await);
    let _bo = assert_ok!(h.pipeline.submit(pothole("bo")).await);

    let mine = assert_ok!(
        h.pipeline
            .list_complaints(&Identity::citizen("ana"), ComplaintFilter::default())
            .await
    );
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, ana.id);

    // Officer's own department overrides the requested one
    let roads = assert_ok!(
        h.pipeline
            .list_complaints(
                &Identity::officer("o1", "ROADS_001"),
                ComplaintFilter::default().with_department("HEALTH_001"),
            )
            .await
    );
    assert_eq!(roads.len(), 2);

    let health = assert_ok!(
        h.pipeline
            .list_complaints(&Identity::officer("o2", "HEALTH_001"), ComplaintFilter::default())
            .await
    );
    assert!(health.is_empty());

    let resolved = assert_ok!(
        h.pipeline
            .list_complaints(
                &Identity::admin("root"),
                ComplaintFilter::default().with_status(ComplaintStatus::Resolved),
            )
            .await
    );
    assert!(resolved.is_empty());
}

#[tokio::test]
async fn test_resolving_releases_officer_slot() {
    let h = harness(
        MockBackend::default().with_response(POTHOLE_ANSWER),
        vec![officer("a", "ROADS_001", 4)],
        TriageConfig::default(),
    );
    let admin = Identity::admin("root");

    let complaint = assert_ok!(h.pipeline.submit(pothole("ana")).await);
    assert_eq!(h.store.officer("a").await.unwrap().active_count(), 5);

    let eta = chrono::Utc::now() + chrono::Duration::days(3);
    let in_progress = assert_ok!(
        h.pipeline
            .update_status(
                &admin,
                &complaint.id,
                StatusUpdate {
                    status: Some(ComplaintStatus::InProgress),
                    resolution_eta: Some(eta),
                },
            )
            .await
    );
    assert_eq!(in_progress.resolution_eta, Some(eta));

    let resolved = assert_ok!(
        h.pipeline
            .update_status(
                &admin,
                &complaint.id,
                StatusUpdate {
                    status: Some(ComplaintStatus::Resolved),
                    resolution_eta: None,
                },
            )
            .await
    );
    assert_eq!(resolved.status, ComplaintStatus::Resolved);
    assert_eq!(h.store.officer("a").await.unwrap().active_count(), 4);

    // Terminal
    assert_err!(
        h.pipeline
            .update_status(
                &admin,
                &complaint.id,
                StatusUpdate {
                    status: Some(ComplaintStatus::Escalated),
                    resolution_eta: None,
                },
            )
            .await
    );
}

async fn active_of(store: &MemoryStore, officer_id: &str) -> Vec<String> {
    store.officer(officer_id).await.unwrap().active_complaints
}

fn move_to(status: ComplaintStatus) -> StatusUpdate {
    StatusUpdate {
        status: Some(status),
        resolution_eta: None,
    }
}

#[tokio::test]
async fn test_retriage_moves_the_officer_slot() {
    let h = harness(
        MockBackend::default().with_response(POTHOLE_ANSWER),
        vec![officer("a", "ROADS_001", 0), officer("b", "ROADS_001", 1)],
        TriageConfig::default(),
    );
    let admin = Identity::admin("root");

    let complaint = assert_ok!(h.pipeline.submit(pothole("ana")).await);
    assert_eq!(complaint.assigned_to.as_deref(), Some("a"));

    // "a" picks up other work and is no longer the least loaded
    for other in ["x1", "x2"] {
        assert!(h
            .store
            .claim_officer_slot("a", other, SlotGuard::Unchecked)
            .await
            .unwrap());
    }

    let report = assert_ok!(h.pipeline.retriage(&admin, &complaint.id).await);
    assert_eq!(report.assigned.unwrap().officer_id, "b");
    assert!(!active_of(&h.store, "a").await.contains(&complaint.id));
    assert!(active_of(&h.store, "b").await.contains(&complaint.id));

    for status in [ComplaintStatus::InProgress, ComplaintStatus::Resolved] {
        assert_ok!(h.pipeline.update_status(&admin, &complaint.id, move_to(status)).await);
    }
    assert!(!active_of(&h.store, "a").await.contains(&complaint.id));
    assert!(!active_of(&h.store, "b").await.contains(&complaint.id));

    let err = h.pipeline.retriage(&admin, &complaint.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidRequest(_)));

    let err = h
        .pipeline
        .retriage(&Identity::citizen("ana"), &complaint.id)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Forbidden(_)));
}

#[tokio::test]
async fn test_failed_retriage_keeps_previous_routing() {
    let fail = || MockReply::Fail(OracleError::Unavailable("down".to_string()));
    let h = harness(
        MockBackend::default().with_script([
            MockReply::Respond(POTHOLE_ANSWER.to_string()),
            fail(),
            fail(),
            fail(),
        ]),
        vec![officer("a", "ROADS_001", 0)],
        TriageConfig::default(),
    );

    let complaint = assert_ok!(h.pipeline.submit(pothole("ana")).await);
    let report = assert_ok!(h.pipeline.retriage(&Identity::admin("root"), &complaint.id).await);
    assert!(report.is_sentinel());

    let stored = h.store.find_complaint(&complaint.id).await.unwrap().unwrap();
    assert_eq!(stored.department_id.as_deref(), Some("ROADS_001"));
    assert_eq!(stored.assigned_to.as_deref(), Some("a"));
    assert!(!stored.ai_analysis.unwrap().is_sentinel());
    assert_eq!(active_of(&h.store, "a").await, vec![complaint.id.clone()]);
}

#[tokio::test]
async fn test_retriage_without_eligible_officer_clears_assignee() {
    let health = "Department: Public Health Department\nPriority: 6\nAnalysis: Clinic closed.";
    let h = harness(
        MockBackend::default().with_script([
            MockReply::Respond(POTHOLE_ANSWER.to_string()),
            MockReply::Respond(health.to_string()),
        ]),
        vec![officer("a", "ROADS_001", 0)],
        TriageConfig::default(),
    );

    let complaint = assert_ok!(h.pipeline.submit(pothole("ana")).await);
    assert_eq!(complaint.assigned_to.as_deref(), Some("a"));

    let report = assert_ok!(h.pipeline.retriage(&Identity::admin("root"), &complaint.id).await);
    assert!(report.assigned.is_none());

    let stored = h.store.find_complaint(&complaint.id).await.unwrap().unwrap();
    assert_eq!(stored.department_id.as_deref(), Some("HEALTH_001"));
    assert!(stored.assigned_to.is_none());
    assert!(active_of(&h.store, "a").await.is_empty());
}

#[tokio::test]
async fn test_citizen_stats_counts_and_recent() {
    let h = harness(
        MockBackend::default().with_response(POTHOLE_ANSWER),
        vec![],
        TriageConfig::default(),
    );
    let admin = Identity::admin("root");
    let ana = Identity::citizen("ana");

    let mut ids = Vec::new();
    for _ in 0..6 {
        ids.push(assert_ok!(h.pipeline.submit(pothole("ana")).await).id);
    }
    assert_ok!(h.pipeline.submit(pothole("bo")).await);

    assert_ok!(h.pipeline.update_status(&admin, &ids[0], move_to(ComplaintStatus::InProgress)).await);
    assert_ok!(h.pipeline.update_status(&admin, &ids[0], move_to(ComplaintStatus::Resolved)).await);
    assert_ok!(h.pipeline.update_status(&admin, &ids[1], move_to(ComplaintStatus::Escalated)).await);

    let stats = assert_ok!(h.pipeline.citizen_stats(&ana).await);
    assert_eq!(stats.total_complaints, 6);
    assert_eq!(stats.active_complaints, 4);
    assert_eq!(stats.resolved_complaints, 1);

    let recent: Vec<_> = stats.recent_complaints.iter().map(|c| c.id.clone()).collect();
    let expected: Vec<_> = ids.iter().rev().take(RECENT_COMPLAINTS).cloned().collect();
    assert_eq!(recent, expected);
    assert!(stats.recent_complaints.iter().all(|c| c.ai_analysis.is_some()));

    assert_err!(h.pipeline.citizen_stats(&admin).await);
}
