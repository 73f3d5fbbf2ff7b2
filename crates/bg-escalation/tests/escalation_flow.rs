//! End-to-end escalation flows against the in-memory identity provider.

use std::sync::Arc;

use bg_core::ManualClock;
use bg_directory::{ClientCredentials, GroupDirectory, InMemoryIdentityProvider, TokenLifecycleManager};
use bg_escalation::{
    is_allowed_approver, ApprovalTokenProtocol, Approver, BreakglassService, EscalationError,
    GrantLifecycleManager, Reaper, SuffixConventionDiscovery, TransitionCatalog,
};
use bg_model::{Group, Transition, User};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use uuid::Uuid;

const PRIVATE_KEY: &[u8] = include_bytes!("../testdata/approval_key.pem");
const PUBLIC_KEY: &[u8] = include_bytes!("../testdata/approval_key.pub.pem");
const START: i64 = 1_700_000_000;

struct Harness {
    provider: Arc<InMemoryIdentityProvider>,
    clock: Arc<ManualClock>,
    directory: GroupDirectory,
    catalog: Arc<TransitionCatalog>,
    approvals: Arc<ApprovalTokenProtocol>,
    grants: GrantLifecycleManager,
    service: BreakglassService,
    reaper: Reaper,
}

impl Harness {
    fn new(configured: Vec<Transition>) -> Self {
        let provider = Arc::new(InMemoryIdentityProvider::new());
        let clock = Arc::new(ManualClock::at_unix(START));
        let sessions = Arc::new(TokenLifecycleManager::new(
            provider.clone(),
            ClientCredentials::new("breakglass", "secret", "master"),
            clock.clone(),
        ));
        let directory = GroupDirectory::new(provider.clone(), sessions, "fleet");

        let discovery = Arc::new(SuffixConventionDiscovery::new(directory.clone(), 7200));
        let catalog = Arc::new(
            TransitionCatalog::new(discovery, clock.clone())
                .with_configured(configured)
                .with_global_groups(vec!["sre".to_string()]),
        );
        let approvals = Arc::new(
            ApprovalTokenProtocol::from_pem(PRIVATE_KEY, PUBLIC_KEY, clock.clone()).unwrap(),
        );
        let grants = GrantLifecycleManager::new(directory.clone(), clock.clone());
        let service = BreakglassService::new(
            catalog.clone(),
            approvals.clone(),
            grants.clone(),
            directory.clone(),
            clock.clone(),
        );
        let reaper = Reaper::new(catalog.clone(), directory.clone(), grants.clone(), clock.clone());

        Self {
            provider,
            clock,
            directory,
            catalog,
            approvals,
            grants,
            service,
            reaper,
        }
    }

    fn group(&self, name: &str) -> Group {
        self.provider.add_group(Group::new(name))
    }

    fn user_in(&self, name: &str, groups: &[&Group]) -> User {
        let user = self
            .provider
            .add_user(User::new(name).with_email(format!("{name}@example.com")));
        for group in groups {
            self.provider.add_member(user.id, group.id);
        }
        user
    }
}

struct Tenant {
    appowner: Group,
    collaborator: Group,
    poweruser: Group,
    debug: Group,
}

fn tenant(h: &Harness, name: &str) -> Tenant {
    Tenant {
        appowner: h.group(&format!("{name}-appowner")),
        collaborator: h.group(&format!("{name}-collaborator")),
        poweruser: h.group(&format!("{name}-poweruser")),
        debug: h.group(&format!("{name}-debug")),
    }
}

#[tokio::test]
async fn configured_transition_shadows_discovered_pair() {
    let configured = vec![Transition::new("team-collaborator", "team-debug", 900)
        .with_approval_group("security")];
    let h = Harness::new(configured);
    tenant(&h, "team");

    let transitions = h.catalog.get_transitions().await.unwrap();

    let pairs: Vec<_> = transitions
        .iter()
        .map(|t| (t.from.as_str(), t.to.as_str()))
        .collect();
    assert_eq!(
        pairs,
        [("team-collaborator", "team-debug"), ("team-poweruser", "team-debug")]
    );
    assert_eq!(transitions[0].duration, 900);
    assert_eq!(transitions[0].approval_groups, vec!["security"]);
}

#[tokio::test]
async fn self_approval_scenario() {
    let h = Harness::new(Vec::new());
    let team = tenant(&h, "team");
    let other = h.group("other-group");
    let alice = h.user_in("alice", &[&team.poweruser, &team.appowner]);
    let bob = h.user_in("bob", &[&other]);

    let token = h
        .service
        .request(alice.id, "team-poweruser", "team-debug")
        .await
        .unwrap();
    let claims = h.approvals.verify(&token).unwrap();
    assert_eq!(claims.subject, alice.id);
    assert_eq!(claims.requestor.email, "alice@example.com");
    assert!(claims.transition.self_approval);

    assert!(is_allowed_approver(alice.id, &["team-appowner"], &claims));
    assert!(!is_allowed_approver(bob.id, &["other-group"], &claims));

    let bob = h.service.resolve_approver(bob.id).await.unwrap();
    let err = h.service.approve(&token, &bob).await.unwrap_err();
    assert!(matches!(err, EscalationError::NotAllowedApprover));
    assert!(!h.provider.is_member(alice.id, team.debug.id));

    let alice_approver = h.service.resolve_approver(alice.id).await.unwrap();
    let marker = h.service.approve(&token, &alice_approver).await.unwrap();
    assert_eq!(marker.expires_at, START + 7200);
    assert!(h.provider.is_member(alice.id, team.debug.id));
}

#[tokio::test]
async fn request_outside_catalog_is_refused() {
    let h = Harness::new(Vec::new());
    let team = tenant(&h, "team");
    let mallory = h.user_in("mallory", &[&team.appowner]);

    let err = h
        .service
        .request(mallory.id, "team-collaborator", "team-debug")
        .await
        .unwrap_err();

    assert!(matches!(err, EscalationError::TransitionNotAvailable { .. }));
}

#[tokio::test]
async fn global_group_can_request_global_transitions_only() {
    let h = Harness::new(Vec::new());
    tenant(&h, "team");
    let sre = h.group("sre");
    let carol = h.user_in("carol", &[&sre]);

    let available = h.service.available_transitions(carol.id).await.unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].from, "team-collaborator");

    assert!(h
        .service
        .request(carol.id, "team-collaborator", "team-debug")
        .await
        .is_ok());
    assert!(h
        .service
        .request(carol.id, "team-poweruser", "team-debug")
        .await
        .is_err());
}

#[tokio::test]
async fn requester_without_self_approval_needs_someone_else() {
    let configured = vec![Transition::new("ops", "ops-admin", 600).with_approval_group("ops-lead")];
    let h = Harness::new(configured);
    let ops = h.group("ops");
    let lead = h.group("ops-lead");
    let admin = h.group("ops-admin");
    let dave = h.user_in("dave", &[&ops, &lead]);
    let erin = h.user_in("erin", &[&lead]);

    let token = h.service.request(dave.id, "ops", "ops-admin").await.unwrap();

    let dave = h.service.resolve_approver(dave.id).await.unwrap();
    assert!(matches!(
        h.service.approve(&token, &dave).await,
        Err(EscalationError::NotAllowedApprover)
    ));

    let erin = h.service.resolve_approver(erin.id).await.unwrap();
    let rejected = h.service.reject(&token, &erin).unwrap();
    assert_eq!(rejected.transition.to, "ops-admin");
    assert!(!h.provider.is_member(dave.id, admin.id));

    h.service.approve(&token, &erin).await.unwrap();
    assert!(h.provider.is_member(dave.id, admin.id));
}

#[tokio::test]
async fn expired_request_cannot_be_approved() {
    let h = Harness::new(Vec::new());
    let team = tenant(&h, "team");
    let alice = h.user_in("alice", &[&team.collaborator, &team.appowner]);

    let token = h
        .service
        .request(alice.id, "team-collaborator", "team-debug")
        .await
        .unwrap();
    h.clock.advance_secs(3600);

    let approver = Approver::new(alice.id, vec!["team-appowner".to_string()]);
    let err = h.service.approve(&token, &approver).await.unwrap_err();
    assert!(matches!(err, EscalationError::Expired));
}

#[tokio::test]
async fn grant_survives_sweep_until_expiry() {
    let h = Harness::new(Vec::new());
    let team = tenant(&h, "team");
    let alice = h.user_in("alice", &[&team.collaborator]);

    h.grants.apply(alice.id, "team-debug", 7200).await.unwrap();

    h.clock.advance_secs(7199);
    let report = h.reaper.sweep().await;
    assert_eq!(report.revoked, 0);
    assert!(h.provider.is_member(alice.id, team.debug.id));
    assert!(h.provider.user(alice.id).unwrap().marker_values("team-debug").is_some());

    h.clock.advance_secs(1);
    let report = h.reaper.sweep().await;
    assert_eq!(report.revoked, 1);
    assert!(!h.provider.is_member(alice.id, team.debug.id));
    assert!(h.provider.user(alice.id).unwrap().marker_values("team-debug").is_none());
}

#[tokio::test]
async fn sweep_leaves_only_tracked_members() {
    let h = Harness::new(Vec::new());
    let team = tenant(&h, "team");
    let live = h.user_in("live", &[]);
    let stale = h.user_in("stale", &[]);
    let intruder = h.user_in("intruder", &[&team.debug]);

    h.grants.apply(live.id, "team-debug", 7200).await.unwrap();
    h.grants.apply(stale.id, "team-debug", 60).await.unwrap();
    h.clock.advance_secs(120);

    h.reaper.sweep().await;

    let members = h.directory.list_members(&team.debug).await.unwrap();
    let now = START + 120;
    for member in &members {
        let status = bg_model::marker::evaluate(&member.attributes, "team-debug", now).unwrap();
        assert!(!status.requires_revocation(), "{} kept without live marker", member.username);
    }
    let names: Vec<_> = members.iter().map(|m| m.username.as_str()).collect();
    assert_eq!(names, ["live"]);
    assert!(!h.provider.is_member(intruder.id, team.debug.id));
}

#[tokio::test]
async fn dropped_grant_is_gone() {
    let h = Harness::new(Vec::new());
    let team = tenant(&h, "team");
    let alice = h.user_in("alice", &[&team.collaborator]);
    h.grants.apply(alice.id, "team-debug", 7200).await.unwrap();

    assert_eq!(h.service.active_grants(alice.id).await.unwrap().len(), 1);
    h.service.drop(alice.id, "team-debug").await.unwrap();

    assert!(h.service.active_grants(alice.id).await.unwrap().is_empty());
    assert!(matches!(
        h.service.drop(alice.id, "team-debug").await,
        Err(EscalationError::NoActiveGrant(_))
    ));
}

#[tokio::test]
async fn forged_algorithm_is_rejected_by_approve() {
    let h = Harness::new(Vec::new());
    let team = tenant(&h, "team");
    let alice = h.user_in("alice", &[&team.collaborator, &team.appowner]);

    let token = h
        .service
        .request(alice.id, "team-collaborator", "team-debug")
        .await
        .unwrap();
    let mut claims = h.approvals.verify(&token).unwrap();
    claims.transition.duration = 10 * 365 * 24 * 3600;
    claims.subject = Uuid::now_v7();

    let forged = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(PUBLIC_KEY),
    )
    .unwrap();

    let approver = Approver::new(alice.id, vec!["team-appowner".to_string()]);
    let err = h.service.approve(&forged, &approver).await.unwrap_err();
    assert!(matches!(err, EscalationError::InvalidSignature(_)));
    assert!(!h.provider.is_member(alice.id, team.debug.id));
}
