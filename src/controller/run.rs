use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Namespace, Service};
use kube::runtime::controller::Controller;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::{predicates, reflector, watcher, WatchStreamExt};
use kube::{Api, ResourceExt};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::reconciler::{self, Context};
use crate::api::agent::Agent;
use crate::api::card::AgentCard;
use crate::api::registry::AgentRegistry;
use crate::card::generator::CardGenerator;
use crate::config::CardinalConfig;
use crate::health::endpoints::{EndpointChecker, EndpointCheckerError};
use crate::http_server::server::run_card_server;
use crate::k8s::annotations;
use crate::k8s::client::try_client;
use crate::k8s::error::K8sError;
use crate::k8s::leader::{self, LeaderElector};
use crate::k8s::reflectors::{ClusterView, SpawnedReflector};

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    K8s(#[from] K8sError),

    #[error(transparent)]
    EndpointChecker(#[from] EndpointCheckerError),

    #[error("leadership lost")]
    LeadershipLost,
}

/// Assembles and runs the controller until a shutdown signal arrives or
/// leadership is lost.
///
/// Three watch streams feed one workqueue keyed by registry identity:
/// generation-changed registries enqueue directly, changed agents carrying
/// the registration annotation and changed services fan out to every
/// registry. The same streams feed the read caches the passes consult.
pub async fn run(config: CardinalConfig) -> Result<(), RunError> {
    let client = try_client().await?;

    // A single active replica may write under the card field manager.
    let renewal = if config.leader_election.enabled {
        let elector = LeaderElector::new(
            client.clone(),
            &config.leader_election.namespace,
            config.leader_election.lease_name.clone(),
            leader::default_identity(),
            config.leader_election.lease_duration,
            config.leader_election.retry_interval,
        );
        elector.acquire().await;
        Some(tokio::spawn(elector.run_renewal()))
    } else {
        None
    };

    // Read caches without trigger duty.
    let namespaces =
        SpawnedReflector::<Namespace>::start(Api::all(client.clone()), watcher::Config::default())
            .await?;
    let cards =
        SpawnedReflector::<AgentCard>::start(Api::all(client.clone()), watcher::Config::default())
            .await?;

    // Trigger streams, each feeding its read cache on the way through.
    let (registry_store, registry_writer) = reflector::store();
    let registry_trigger = watcher(
        Api::<AgentRegistry>::all(client.clone()),
        watcher::Config::default(),
    )
    .default_backoff()
    .reflect(registry_writer)
    .applied_objects()
    .predicate_filter(predicates::generation);

    let (agent_store, agent_writer) = reflector::store();
    let agent_trigger = watcher(Api::<Agent>::all(client.clone()), watcher::Config::default())
        .default_backoff()
        .reflect(agent_writer)
        .applied_objects()
        .predicate_filter(predicates::resource_version);

    let (service_store, service_writer) = reflector::store();
    let service_trigger = watcher(
        Api::<Service>::all(client.clone()),
        watcher::Config::default(),
    )
    .default_backoff()
    .reflect(service_writer)
    .applied_objects()
    .predicate_filter(predicates::resource_version);

    let view = ClusterView {
        registries: registry_store.clone(),
        agents: agent_store,
        services: service_store,
        namespaces: namespaces.reader(),
        cards: cards.reader(),
    };

    // Read-only facade over the card cache. actix-web's service factory is
    // Rc-based and not Send, so it cannot live inside a tokio::spawn'd task
    // on this multi-threaded runtime; it gets its own OS thread with a
    // dedicated single-threaded runtime instead.
    let server_config = config.server.clone();
    let server_cards = view.cards.clone();
    let server = std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                warn!(error = %err, "failed to start card server runtime");
                return;
            }
        };
        runtime.block_on(async move {
            if let Err(err) = run_card_server(server_config, server_cards).await {
                warn!(error = %err, "card server terminated");
            }
        });
    });

    let ctx = Arc::new(Context::new(
        client,
        view,
        CardGenerator::default(),
        EndpointChecker::try_new(config.probe_timeout)?,
    ));

    // Agent and service events fan out to every registry. The mapping is
    // coarse on purpose, false positives are absorbed by the content-hash
    // fast path.
    let agent_registries = registry_store.clone();
    let agent_mapper = move |agent: Agent| {
        if !annotations::registration_requested(agent.annotations()) {
            return Vec::new();
        }
        all_registries(&agent_registries)
    };
    let service_registries = registry_store.clone();
    let service_mapper = move |_service: Service| all_registries(&service_registries);

    info!(
        workers = config.max_concurrent_reconciles,
        "starting registry controller"
    );
    let controller = Controller::for_stream(registry_trigger, registry_store)
        .watches_stream(agent_trigger, agent_mapper)
        .watches_stream(service_trigger, service_mapper)
        .with_config(
            kube::runtime::controller::Config::default()
                .concurrency(config.max_concurrent_reconciles.into()),
        )
        .shutdown_on_signal()
        .run(reconciler::reconcile, reconciler::error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((registry, _action)) => debug!(registry = %registry, "pass finished"),
                // Pass failures are already logged with context by the error
                // policy, the applier additionally reports queue-level errors.
                Err(err) => debug!(error = %err, "controller event"),
            }
        });

    let outcome = match renewal {
        Some(renewal) => {
            tokio::select! {
                _ = controller => Ok(()),
                _ = renewal => Err(RunError::LeadershipLost),
            }
        }
        None => {
            controller.await;
            Ok(())
        }
    };

    // The card server thread is detached: the process exits shortly after
    // this function returns, which tears it down.
    drop(server);
    info!("registry controller stopped");
    outcome
}

fn all_registries(store: &Store<AgentRegistry>) -> Vec<ObjectRef<AgentRegistry>> {
    store
        .state()
        .iter()
        .map(|registry| ObjectRef::from_obj(registry.as_ref()))
        .collect()
}
