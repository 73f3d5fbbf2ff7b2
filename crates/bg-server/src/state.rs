//! Shared component graph.

use std::sync::Arc;

use bg_core::{Clock, Config};
use bg_directory::{
    ClientCredentials, GroupDirectory, IdentityProvider, SessionThresholds, TokenLifecycleManager,
};
use bg_escalation::{
    ApprovalTokenProtocol, BreakglassService, GrantLifecycleManager, Reaper,
    SuffixConventionDiscovery, TransitionCatalog,
};
use bg_records::{BreakglassEscalation, BreakglassSession, InMemoryRecordStore, RecordStore};
use bg_webhook::{AccessReviewEngine, AdmissionWebhook};

/// Components shared by every request handler and the background reaper.
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<Config>,
    /// Identity provider session.
    pub sessions: Arc<TokenLifecycleManager>,
    /// Group and user access in the managed realm.
    pub directory: GroupDirectory,
    /// Cached transitions.
    pub catalog: Arc<TransitionCatalog>,
    /// Escalation request, approval and drop.
    pub service: Arc<BreakglassService>,
    /// Expired grant revocation.
    pub reaper: Arc<Reaper>,
    /// Admission decisions.
    pub webhook: Arc<AdmissionWebhook>,
    /// Session records.
    pub session_records: Arc<dyn RecordStore<BreakglassSession>>,
    /// Escalation records.
    pub escalation_records: Arc<dyn RecordStore<BreakglassEscalation>>,
}

impl AppState {
    /// Wires every component over `provider`.
    ///
    /// # Errors
    ///
    /// Returns an error if the approval key pair cannot be parsed.
    pub fn build(
        config: Config,
        provider: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let kc = &config.keycloak;
        let credentials =
            ClientCredentials::new(&kc.client_id, &kc.client_secret, &kc.login_realm);
        let sessions = Arc::new(
            TokenLifecycleManager::new(provider.clone(), credentials, clock.clone())
                .with_thresholds(SessionThresholds::from(&config.session)),
        );
        let directory = GroupDirectory::new(provider, sessions.clone(), &kc.managed_realm);

        let discovery = Arc::new(SuffixConventionDiscovery::new(
            directory.clone(),
            config.catalog.discovered_duration_secs,
        ));
        let catalog = Arc::new(
            TransitionCatalog::new(discovery, clock.clone())
                .with_configured(config.catalog.transitions.clone())
                .with_global_groups(config.catalog.global_breakglass_groups.clone())
                .with_staleness(config.catalog.staleness()),
        );

        let approvals = Arc::new(ApprovalTokenProtocol::from_config(
            &config.approval,
            clock.clone(),
        )?);
        let grants = GrantLifecycleManager::new(directory.clone(), clock.clone());
        let service = Arc::new(BreakglassService::new(
            catalog.clone(),
            approvals,
            grants.clone(),
            directory.clone(),
            clock.clone(),
        ));
        let reaper = Arc::new(
            Reaper::new(catalog.clone(), directory.clone(), grants, clock.clone())
                .with_interval(config.reaper.interval()),
        );

        let reviews = Arc::new(AccessReviewEngine::from_config(&config.review, clock));
        let webhook = Arc::new(AdmissionWebhook::new(reviews));

        Ok(Self {
            config: Arc::new(config),
            sessions,
            directory,
            catalog,
            service,
            reaper,
            webhook,
            session_records: Arc::new(InMemoryRecordStore::<BreakglassSession>::new()),
            escalation_records: Arc::new(InMemoryRecordStore::<BreakglassEscalation>::new()),
        })
    }
}
