//! The seven-stage Reaper deployment and its verification step.

use super::actions::{ApplyManifests, CreateNamespace, CreateReaper};
use super::{CASSANDRA_SERVICE, CLUSTER_NAME};
use crate::config::HarnessConfig;
use crate::context::RunContext;
use crate::errors::{DeployflowError, ValidationError, VerificationError};
use crate::events::EventSink;
use crate::pipeline::{
    ObjectReadiness, RetryPolicy, RunReport, SequencerBuilder, Stage, StageSequencer,
};
use crate::poll::PollConfig;
use crate::resources::{
    datacenter_ready, deployment_ready, reaper_ready, CassandraDatacenterView, ObjectKind,
    ReaperView, StorageType,
};
use crate::store::ObjectStore;
use crate::verify::BackendRegistrar;
use k8s_openapi::api::apps::v1::Deployment;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Creates the run's namespace.
pub const CREATE_NAMESPACE: &str = "create-namespace";
/// Applies both operators' manifests.
pub const APPLY_MANIFESTS: &str = "apply-manifests";
/// Waits for the cass-operator deployment.
pub const WAIT_CASS_OPERATOR: &str = "wait-cass-operator";
/// Waits for the reaper-operator deployment.
pub const WAIT_REAPER_OPERATOR: &str = "wait-reaper-operator";
/// Waits for the datacenter and records its cluster and service names.
pub const WAIT_DATACENTER: &str = "wait-cassandra-datacenter";
/// Creates the Reaper.
pub const CREATE_REAPER: &str = "create-reaper";
/// Waits for the Reaper.
pub const WAIT_REAPER: &str = "wait-reaper";

/// The sequencer report plus the verification result.
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    /// The sequencer's report.
    pub report: RunReport,
    /// `None` if verification did not run.
    pub verification: Option<Result<(), VerificationError>>,
}

impl ScenarioOutcome {
    /// 0 on success, 1 if a stage failed, 2 if verification failed.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if !self.report.is_success() {
            return 1;
        }
        match &self.verification {
            Some(Err(_)) => 2,
            _ => 0,
        }
    }
}

/// Deploys cass-operator, reaper-operator, a Cassandra datacenter and a
/// Reaper backed by it.
#[derive(Clone)]
pub struct ReaperScenario {
    store: Arc<dyn ObjectStore>,
    apply_retry: RetryPolicy<DeployflowError>,
    operator_wait: PollConfig,
    datacenter_wait: PollConfig,
    reaper_wait: PollConfig,
    storage_type: StorageType,
    credentials_secret: Option<String>,
}

impl fmt::Debug for ReaperScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaperScenario")
            .field("apply_retry", &self.apply_retry)
            .field("operator_wait", &self.operator_wait)
            .field("datacenter_wait", &self.datacenter_wait)
            .field("reaper_wait", &self.reaper_wait)
            .field("storage_type", &self.storage_type)
            .finish_non_exhaustive()
    }
}

impl ReaperScenario {
    /// Creates the scenario with default timings.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::from_config(store, &HarnessConfig::default())
    }

    /// Creates the scenario from a harness config.
    #[must_use]
    pub fn from_config(store: Arc<dyn ObjectStore>, config: &HarnessConfig) -> Self {
        let apply_retry = RetryPolicy::always(config.apply.max_attempts).with_config(config.apply.clone());
        let apply_retry = if config.apply_transient_only {
            apply_retry.with_classifier(DeployflowError::is_transient)
        } else {
            apply_retry
        };

        Self {
            store,
            apply_retry,
            operator_wait: config.operator_wait.poll_config(),
            datacenter_wait: config.datacenter_wait.poll_config(),
            reaper_wait: config.reaper_wait.poll_config(),
            storage_type: config.storage_type,
            credentials_secret: config.credentials_secret.clone(),
        }
    }

    /// Replaces the manifest apply retry policy.
    #[must_use]
    pub fn with_apply_retry(mut self, policy: RetryPolicy<DeployflowError>) -> Self {
        self.apply_retry = policy;
        self
    }

    /// Builds the sequencer.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured wait or retry budget is invalid.
    pub fn sequencer(&self, sink: Arc<dyn EventSink>) -> Result<StageSequencer, ValidationError> {
        let store = &self.store;

        let cass_operator = ObjectReadiness::<Deployment>::resolving(
            store.clone(),
            ObjectKind::Deployment,
            |ctx| ctx.naming().cass_operator.clone(),
            deployment_ready,
        );
        let reaper_operator = ObjectReadiness::<Deployment>::resolving(
            store.clone(),
            ObjectKind::Deployment,
            |ctx| ctx.naming().reaper_operator.clone(),
            deployment_ready,
        );
        let datacenter = ObjectReadiness::<CassandraDatacenterView>::resolving(
            store.clone(),
            ObjectKind::CassandraDatacenter,
            |ctx| ctx.naming().datacenter.clone(),
            datacenter_ready,
        )
        .with_capture(|dc, values| {
            values.set(CLUSTER_NAME, dc.spec.cluster_name.clone())?;
            values.set(CASSANDRA_SERVICE, dc.service_name())?;
            Ok(())
        });
        let reaper = ObjectReadiness::<ReaperView>::resolving(
            store.clone(),
            ObjectKind::Reaper,
            |ctx| ctx.naming().reaper.clone(),
            reaper_ready,
        );

        let create_reaper = CreateReaper::new(store.clone())
            .with_storage_type(self.storage_type)
            .with_credentials_secret(self.credentials_secret.clone());

        SequencerBuilder::new("deploy-reaper")
            .with_event_sink(sink)
            .stage(Stage::new(CREATE_NAMESPACE, Arc::new(CreateNamespace::new(store.clone()))))?
            .stage(
                Stage::new(APPLY_MANIFESTS, Arc::new(ApplyManifests::new(store.clone())))
                    .with_retry(self.apply_retry.clone()),
            )?
            .stage(Stage::wait(WAIT_CASS_OPERATOR, Arc::new(cass_operator), self.operator_wait))?
            .stage(Stage::wait(WAIT_REAPER_OPERATOR, Arc::new(reaper_operator), self.operator_wait))?
            .stage(Stage::wait(WAIT_DATACENTER, Arc::new(datacenter), self.datacenter_wait))?
            .stage(Stage::new(CREATE_REAPER, Arc::new(create_reaper)))?
            .stage(Stage::wait(WAIT_REAPER, Arc::new(reaper), self.reaper_wait))?
            .build()
    }

    /// Runs the stages without verification.
    ///
    /// # Errors
    ///
    /// See [`ReaperScenario::sequencer`].
    pub async fn run(&self, ctx: &RunContext, sink: Arc<dyn EventSink>) -> Result<ScenarioOutcome, ValidationError> {
        let report = self.sequencer(sink)?.run(ctx).await;
        Ok(ScenarioOutcome {
            report,
            verification: None,
        })
    }

    /// Runs the stages, then registers the datacenter with Reaper once if
    /// every stage succeeded.
    ///
    /// # Errors
    ///
    /// See [`ReaperScenario::sequencer`].
    pub async fn run_and_verify(
        &self,
        ctx: &RunContext,
        sink: Arc<dyn EventSink>,
        registrar: &dyn BackendRegistrar,
    ) -> Result<ScenarioOutcome, ValidationError> {
        let mut outcome = self.run(ctx, sink).await?;
        if outcome.report.is_success() {
            outcome.verification = Some(verify(ctx, registrar).await);
        }
        Ok(outcome)
    }
}

async fn verify(ctx: &RunContext, registrar: &dyn BackendRegistrar) -> Result<(), VerificationError> {
    let values = ctx.values();
    let (Some(cluster_name), Some(seed_host)) = (values.get_str(CLUSTER_NAME), values.get_str(CASSANDRA_SERVICE))
    else {
        return Err(VerificationError::InvalidRequest(
            "cluster name and Cassandra service were not discovered".to_string(),
        ));
    };

    info!(cluster = %cluster_name, seed_host = %seed_host, "Registering Cassandra cluster with Reaper");
    let result = registrar.register_backend(&cluster_name, &seed_host).await;
    match &result {
        Ok(()) => info!(cluster = %cluster_name, "Reaper accepted the cluster"),
        Err(e) => warn!(cluster = %cluster_name, error = %e, "Verification failed"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{StageFailure, StoreError};
    use crate::events::{CollectingEventSink, NoOpEventSink};
    use crate::pipeline::SequencerState;
    use crate::testing::{RecordingRegistrar, ScriptedStore};
    use crate::verify::MockBackendRegistrar;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    const NS: &str = "deploy-reaper-test";

    fn deployment(ready: i32) -> Value {
        json!({ "spec": { "replicas": 1, "selector": {}, "template": {} }, "status": { "readyReplicas": ready } })
    }

    fn datacenter(progress: &str) -> Value {
        json!({
            "metadata": { "name": "reaper-test" },
            "spec": { "clusterName": "reaper-test", "size": 1 },
            "status": { "cassandraOperatorProgress": progress },
        })
    }

    /// A cluster where everything becomes ready after a poll or two.
    fn healthy_store(ctx: &RunContext) -> Arc<ScriptedStore> {
        let store = Arc::new(ScriptedStore::new());
        store.script_get(
            ObjectKind::Deployment,
            &ctx.key("cass-operator"),
            vec![Err(StoreError::not_found("Deployment", "cass-operator")), Ok(deployment(1))],
        );
        store.script_get(ObjectKind::Deployment, &ctx.key("reaper-operator"), vec![Ok(deployment(1))]);
        store.script_get(
            ObjectKind::CassandraDatacenter,
            &ctx.key("reaper-test"),
            vec![Ok(datacenter("Updating")), Ok(datacenter("Ready"))],
        );
        store.script_get(
            ObjectKind::Reaper,
            &ctx.key("cass-backend"),
            vec![
                Err(StoreError::not_found("Reaper", "cass-backend")),
                Ok(json!({ "status": { "ready": true } })),
            ],
        );
        store
    }

    #[test]
    fn test_stage_order() {
        let scenario = ReaperScenario::new(Arc::new(ScriptedStore::new()));
        let sequencer = scenario.sequencer(Arc::new(NoOpEventSink)).unwrap();
        assert_eq!(
            sequencer.stage_names(),
            vec![
                CREATE_NAMESPACE,
                APPLY_MANIFESTS,
                WAIT_CASS_OPERATOR,
                WAIT_REAPER_OPERATOR,
                WAIT_DATACENTER,
                CREATE_REAPER,
                WAIT_REAPER,
            ]
        );
    }

    #[test]
    fn test_invalid_config_rejected_at_build() {
        let mut config = HarnessConfig::default();
        config.reaper_wait.interval_seconds = 0;
        let scenario = ReaperScenario::from_config(Arc::new(ScriptedStore::new()), &config);
        assert!(scenario.sequencer(Arc::new(NoOpEventSink)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_verifies_once() {
        let ctx = RunContext::new(NS);
        let store = healthy_store(&ctx);
        store.script_apply(vec![
            Err(StoreError::Unavailable("webhook not ready".into())),
            Err(StoreError::Unavailable("webhook not ready".into())),
            Ok(()),
        ]);

        let mut registrar = MockBackendRegistrar::new();
        registrar
            .expect_register_backend()
            .times(1)
            .returning(|_, _| Ok(()));

        let sink = Arc::new(CollectingEventSink::new());
        let outcome = ReaperScenario::new(store.clone())
            .run_and_verify(&ctx, sink.clone(), &registrar)
            .await
            .unwrap();

        assert_eq!(outcome.report.state, SequencerState::Succeeded);
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(outcome.report.stage(APPLY_MANIFESTS).unwrap().attempts, 3);
        assert_eq!(outcome.report.stage(WAIT_DATACENTER).unwrap().polls, 2);
        assert_eq!(store.apply_calls(), 3);

        let created = store.created();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0].kind(), ObjectKind::Namespace);
        assert_eq!(created[1].kind(), ObjectKind::Reaper);
        assert_eq!(
            created[1].body()["spec"]["serverConfig"]["cassandraBackend"]["cassandraService"],
            "reaper-test-reaper-test-service"
        );

        assert_eq!(sink.events_of_type("stage.completed").len(), 7);
        assert_eq!(sink.event_types().last().map(String::as_str), Some("run.succeeded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_registers_discovered_cluster() {
        let ctx = RunContext::new(NS);
        let store = healthy_store(&ctx);
        let registrar = RecordingRegistrar::new();

        let outcome = ReaperScenario::new(store)
            .run_and_verify(&ctx, Arc::new(NoOpEventSink), &registrar)
            .await
            .unwrap();

        assert_eq!(outcome.verification, Some(Ok(())));
        assert_eq!(
            registrar.calls(),
            vec![("reaper-test".to_string(), "reaper-test-reaper-test-service".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_datacenter_timeout_skips_verification() {
        let ctx = RunContext::new(NS);
        let store = healthy_store(&ctx);
        store.script_get(
            ObjectKind::CassandraDatacenter,
            &ctx.key("reaper-test"),
            vec![Ok(datacenter("Updating"))],
        );

        let mut registrar = MockBackendRegistrar::new();
        registrar.expect_register_backend().times(0);

        let outcome = ReaperScenario::new(store.clone())
            .run_and_verify(&ctx, Arc::new(NoOpEventSink), &registrar)
            .await
            .unwrap();

        let (index, stage, cause) = outcome.report.failure().unwrap();
        assert_eq!(index, 4);
        assert_eq!(stage, WAIT_DATACENTER);
        assert!(cause.is_timeout());
        assert_eq!(outcome.exit_code(), 1);
        assert!(outcome.verification.is_none());
        assert!(outcome.report.stage(CREATE_REAPER).is_none());
        assert_eq!(store.created().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_namespace_is_reused() {
        let ctx = RunContext::new(NS);
        let store = healthy_store(&ctx);
        store.script_create(vec![
            Err(StoreError::AlreadyExists {
                kind: "Namespace".into(),
                name: NS.into(),
            }),
            Ok(()),
        ]);

        let outcome = ReaperScenario::new(store).run(&ctx, Arc::new(NoOpEventSink)).await.unwrap();
        assert!(outcome.report.is_success());
        assert_eq!(outcome.exit_code(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_verification_failure_exit_code() {
        let ctx = RunContext::new(NS);
        let store = healthy_store(&ctx);
        let registrar = RecordingRegistrar::failing(VerificationError::Status {
            status: 404,
            body: "cluster not reachable".into(),
        });

        let outcome = ReaperScenario::new(store)
            .run_and_verify(&ctx, Arc::new(NoOpEventSink), &registrar)
            .await
            .unwrap();

        assert!(outcome.report.is_success());
        assert_eq!(outcome.exit_code(), 2);
        assert_eq!(registrar.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_only_apply_fails_fast() {
        let ctx = RunContext::new(NS);
        let store = healthy_store(&ctx);
        store.script_apply(vec![Err(StoreError::Rejected("bad kustomization".into()))]);

        let config = HarnessConfig {
            apply_transient_only: true,
            ..HarnessConfig::default()
        };
        let outcome = ReaperScenario::from_config(store.clone(), &config)
            .run(&ctx, Arc::new(NoOpEventSink))
            .await
            .unwrap();

        let (index, _, cause) = outcome.report.failure().unwrap();
        assert_eq!(index, 1);
        assert!(matches!(cause, StageFailure::Action { attempts: 1, .. }));
        assert_eq!(store.apply_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_naming_flows_through() {
        let mut naming = crate::context::Naming::default();
        naming.datacenter = "dc1".into();
        naming.reaper = "reaper".into();
        let ctx = RunContext::new(NS).with_naming(naming);

        let store = Arc::new(ScriptedStore::new());
        store.script_get(ObjectKind::Deployment, &ctx.key("cass-operator"), vec![Ok(deployment(1))]);
        store.script_get(ObjectKind::Deployment, &ctx.key("reaper-operator"), vec![Ok(deployment(1))]);
        store.script_get(
            ObjectKind::CassandraDatacenter,
            &ctx.key("dc1"),
            vec![Ok(json!({
                "metadata": { "name": "dc1" },
                "spec": { "clusterName": "Prod Cluster" },
                "status": { "cassandraOperatorProgress": "Ready" },
            }))],
        );
        store.script_get(ObjectKind::Reaper, &ctx.key("reaper"), vec![Ok(json!({ "status": { "ready": true } }))]);

        let registrar = RecordingRegistrar::new();
        let outcome = ReaperScenario::new(store)
            .run_and_verify(&ctx, Arc::new(NoOpEventSink), &registrar)
            .await
            .unwrap();

        assert!(outcome.report.is_success());
        assert_eq!(
            registrar.calls(),
            vec![("Prod Cluster".to_string(), "prodcluster-dc1-service".to_string())]
        );
    }
}
