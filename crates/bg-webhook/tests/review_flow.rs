//! Admission review scenarios against a held clock.

use std::sync::Arc;

use bg_core::config::ReviewRenewal;
use bg_core::ManualClock;
use bg_webhook::{
    AccessReviewEngine, AdmissionWebhook, ResourceAttributes, ReviewError, ReviewStatus,
    SubjectAccessReview, SubjectAccessReviewSpec,
};

const START: i64 = 1_700_000_000;
const CLUSTER: &str = "prod-eu";

fn subject(user: &str) -> SubjectAccessReviewSpec {
    SubjectAccessReviewSpec::new(
        user,
        vec!["team-debug".to_string(), "system:authenticated".to_string()],
        ResourceAttributes {
            namespace: "payments".to_string(),
            verb: "exec".to_string(),
            resource: "pods".to_string(),
            version: "v1".to_string(),
            ..ResourceAttributes::default()
        },
    )
}

fn engine(renewal: ReviewRenewal) -> (Arc<ManualClock>, Arc<AccessReviewEngine>) {
    let clock = Arc::new(ManualClock::at_unix(START));
    let engine = AccessReviewEngine::new(clock.clone())
        .with_validity(300)
        .with_renewal(renewal);
    (clock, Arc::new(engine))
}

#[test]
fn first_query_creates_one_pending_review() {
    let (clock, engine) = engine(ReviewRenewal::default());

    let first = engine.decide(CLUSTER, &subject("alice"));
    assert!(!first.allowed);
    assert_eq!(first.reason, "pending administrator review");

    let reviews = engine.subject_reviews(CLUSTER, &subject("alice"));
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].status, ReviewStatus::Pending);

    clock.advance_secs(299);
    let second = engine.decide(CLUSTER, &subject("alice"));
    assert!(!second.allowed);
    assert_eq!(engine.reviews().len(), 1);
}

#[test]
fn accepted_review_allows() {
    let (_clock, engine) = engine(ReviewRenewal::ReplaceInPlace);
    engine.decide(CLUSTER, &subject("alice"));
    let id = engine.reviews()[0].id;

    engine.accept(id).unwrap();

    let decision = engine.decide(CLUSTER, &subject("alice"));
    assert!(decision.allowed);
    assert_eq!(decision.reason, "accepted by administrator");
}

#[test]
fn different_action_is_a_different_subject() {
    let (_clock, engine) = engine(ReviewRenewal::ReplaceInPlace);
    engine.decide(CLUSTER, &subject("alice"));
    engine.accept(engine.reviews()[0].id).unwrap();

    let mut other = subject("alice");
    if let Some(attrs) = other.resource_attributes.as_mut() {
        attrs.verb = "delete".to_string();
    }

    assert!(!engine.decide(CLUSTER, &other).allowed);
    assert_eq!(engine.reviews().len(), 2);
}

#[test]
fn racing_first_queries_create_one_review() {
    let (_clock, engine) = engine(ReviewRenewal::default());

    std::thread::scope(|scope| {
        for _ in 0..16 {
            let engine = &engine;
            scope.spawn(move || engine.decide(CLUSTER, &subject("alice")));
        }
    });

    assert_eq!(engine.reviews().len(), 1);
}

#[test]
fn rejected_then_stale_opens_a_new_review() {
    let (clock, engine) = engine(ReviewRenewal::ReplaceInPlace);
    engine.decide(CLUSTER, &subject("alice"));
    let id = engine.reviews()[0].id;
    engine.reject(id).unwrap();

    let denied = engine.decide(CLUSTER, &subject("alice"));
    assert_eq!(
        denied.reason,
        "previously rejected; new request will be created"
    );

    clock.advance_secs(300);
    engine.decide(CLUSTER, &subject("alice"));

    let reviews = engine.reviews();
    assert_eq!(reviews.len(), 2);
    assert_eq!(reviews[0].id, id);
    assert_eq!(reviews[0].status, ReviewStatus::Rejected);
    assert_eq!(reviews[1].status, ReviewStatus::Pending);

    // the rejection stays final; only the new review can be decided
    assert!(engine.accept(id).is_err());
    engine.accept(reviews[1].id).unwrap();
    assert!(engine.decide(CLUSTER, &subject("alice")).allowed);
}

#[test]
fn stale_acceptance_is_kept_as_history_by_default() {
    let (clock, engine) = engine(ReviewRenewal::default());
    engine.decide(CLUSTER, &subject("alice"));
    let id = engine.reviews()[0].id;
    engine.accept(id).unwrap();

    clock.advance_secs(300);
    let decision = engine.decide(CLUSTER, &subject("alice"));
    assert!(!decision.allowed);

    let reviews = engine.reviews();
    assert_eq!(reviews.len(), 2);
    assert_eq!(reviews[0].id, id);
    assert_eq!(reviews[0].status, ReviewStatus::Accepted);
    assert_eq!(reviews[1].status, ReviewStatus::Pending);
}

#[test]
fn append_policy_keeps_history() {
    let (clock, engine) = engine(ReviewRenewal::Append);
    engine.decide(CLUSTER, &subject("alice"));
    let stale = engine.reviews()[0].id;
    engine.reject(stale).unwrap();

    clock.advance_secs(400);
    let decision = engine.decide(CLUSTER, &subject("alice"));
    assert!(!decision.allowed);
    assert_eq!(decision.reason, "pending administrator review");

    let reviews = engine.reviews();
    assert_eq!(reviews.len(), 2);
    assert_eq!(reviews[0].status, ReviewStatus::Rejected);
    assert_eq!(reviews[1].status, ReviewStatus::Pending);
    assert_eq!(reviews[1].valid_until.timestamp(), START + 700);
}

#[test]
fn decided_review_cannot_be_flipped() {
    let (_clock, engine) = engine(ReviewRenewal::ReplaceInPlace);
    engine.decide(CLUSTER, &subject("alice"));
    let id = engine.reviews()[0].id;
    engine.reject(id).unwrap();

    let err = engine.accept(id).unwrap_err();
    assert!(matches!(err, ReviewError::AlreadyDecided { .. }));
    assert_eq!(err.http_status(), 409);
}

#[test]
fn webhook_round_trip() {
    let (_clock, engine) = engine(ReviewRenewal::ReplaceInPlace);
    let webhook = AdmissionWebhook::new(engine.clone());
    let request = SubjectAccessReview {
        api_version: "authorization.k8s.io/v1".to_string(),
        kind: "SubjectAccessReview".to_string(),
        spec: subject("bob"),
    };

    let pending = webhook.authorize(CLUSTER, &request);
    assert!(!pending.status.allowed);

    engine.accept(engine.reviews()[0].id).unwrap();
    let allowed = webhook.authorize(CLUSTER, &request);

    let json = serde_json::to_value(&allowed).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "apiVersion": "authorization.k8s.io/v1",
            "kind": "SubjectAccessReview",
            "status": { "allowed": true, "reason": "accepted by administrator" }
        })
    );
}
