use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kube::api::{DeleteParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::{Api, Client, Resource, ResourceExt};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::discovery::{self, DiscoveryError};
use super::{status, FIELD_MANAGER};
use crate::api::agent::Agent;
use crate::api::card::AgentCard;
use crate::api::registry::{AgentRegistry, RegistryPhase};
use crate::card::generator::{CardGenerator, GenerationError};
use crate::health::endpoints::EndpointChecker;
use crate::k8s::reflectors::ClusterView;

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(5 * 60);

const MESSAGE_DISCOVERY_DISABLED: &str = "Auto-discovery disabled";
const MESSAGE_DISCOVERING: &str = "Discovering agents";
const MESSAGE_DISCOVERY_COMPLETE: &str = "Discovery complete";

/// Pass-level failures, they terminate the pass and trigger a rate-limited
/// requeue of the registry key.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("the kube client returned an error: `{0}`")]
    Kube(#[from] kube::Error),
}

/// Per-agent failures, they are logged and must not terminate the pass for
/// the remaining agents.
#[derive(Error, Debug)]
enum CardError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("applying agent card: `{0}`")]
    Apply(#[source] kube::Error),

    #[error("updating agent card status: `{0}`")]
    Status(#[source] kube::Error),
}

#[derive(Debug, PartialEq)]
enum CardOutcome {
    Applied,
    Unchanged,
}

/// State shared by every reconciliation pass: the API client for writes, the
/// watch-fed caches for reads and the per-key failure counters backing the
/// requeue rate limiting.
pub struct Context {
    client: Client,
    view: ClusterView,
    generator: CardGenerator,
    checker: EndpointChecker,
    failures: Mutex<HashMap<String, u32>>,
}

impl Context {
    pub fn new(
        client: Client,
        view: ClusterView,
        generator: CardGenerator,
        checker: EndpointChecker,
    ) -> Self {
        Self {
            client,
            view,
            generator,
            checker,
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn note_failure(&self, key: &str) -> u32 {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        let count = failures.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    fn clear_failures(&self, key: &str) {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        failures.remove(key);
    }
}

/// One reconciliation pass over a single registry.
///
/// The registry handed over comes from the informer cache, a registry deleted
/// meanwhile never reaches this function and its cards are collected through
/// the owner reference cascade.
pub async fn reconcile(
    registry: Arc<AgentRegistry>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let name = registry.name_any();
    let namespace = registry.namespace().unwrap_or_default();
    let requeue_after = registry.sync_interval();

    info!(
        registry = %name,
        namespace = %namespace,
        generation = registry.metadata.generation,
        "reconciling registry"
    );

    if !registry.spec.discovery.enabled {
        debug!(registry = %name, "auto-discovery disabled, skipping");
        status::patch_status(
            ctx.client.clone(),
            &registry,
            status::next_status(
                &registry,
                RegistryPhase::NotStarted,
                MESSAGE_DISCOVERY_DISABLED,
                0,
            ),
        )
        .await;
        ctx.clear_failures(&registry_key(&registry));
        return Ok(Action::requeue(requeue_after));
    }

    status::patch_status(
        ctx.client.clone(),
        &registry,
        status::next_status(&registry, RegistryPhase::Discovering, MESSAGE_DISCOVERING, 0),
    )
    .await;

    match run_pass(&registry, &ctx).await {
        Ok(registered_count) => {
            status::patch_status(
                ctx.client.clone(),
                &registry,
                status::next_status(
                    &registry,
                    RegistryPhase::Ready,
                    MESSAGE_DISCOVERY_COMPLETE,
                    registered_count,
                ),
            )
            .await;
            ctx.clear_failures(&registry_key(&registry));
            info!(
                registry = %name,
                registered = registered_count,
                requeue_after_secs = requeue_after.as_secs(),
                "registry reconciliation complete"
            );
            Ok(Action::requeue(requeue_after))
        }
        Err(err) => {
            status::patch_status(
                ctx.client.clone(),
                &registry,
                status::next_status(&registry, RegistryPhase::Error, &err.to_string(), 0),
            )
            .await;
            Err(err)
        }
    }
}

/// Rate limiting on failures: exponential per-key back-off, reset by the next
/// successful pass.
pub fn error_policy(
    registry: Arc<AgentRegistry>,
    err: &ReconcileError,
    ctx: Arc<Context>,
) -> Action {
    let attempt = ctx.note_failure(&registry_key(&registry));
    let delay = backoff_delay(attempt);
    warn!(
        registry = %registry.name_any(),
        error = %err,
        attempt,
        requeue_after_secs = delay.as_secs(),
        "registry reconciliation failed"
    );
    Action::requeue(delay)
}

async fn run_pass(registry: &AgentRegistry, ctx: &Context) -> Result<i32, ReconcileError> {
    let agents = discovery::selected_agents(registry, &ctx.view)?;
    info!(registry = %registry.name_any(), count = agents.len(), "discovered agents");

    let mut registered_count = 0;
    for agent in &agents {
        match reconcile_card(registry, agent, ctx).await {
            Ok(outcome) => {
                debug!(agent = %agent.name_any(), ?outcome, "agent card reconciled");
                registered_count += 1;
            }
            Err(err) => warn!(
                registry = %registry.name_any(),
                agent = %agent.name_any(),
                error = %err,
                "failed to reconcile agent card"
            ),
        }
    }

    prune_stale_cards(registry, &agents, ctx).await;

    info!(
        registry = %registry.name_any(),
        registered = registered_count,
        total = agents.len(),
        "agent discovery complete"
    );
    Ok(registered_count)
}

async fn reconcile_card(
    registry: &AgentRegistry,
    agent: &Agent,
    ctx: &Context,
) -> Result<CardOutcome, CardError> {
    let agent_name = agent.name_any();
    let agent_namespace = agent.namespace().unwrap_or_default();

    let service = ctx
        .view
        .services
        .get(&ObjectRef::new(&agent_name).within(&agent_namespace));
    let mut card = ctx
        .generator
        .generate(registry, agent, service.as_deref())?;

    let card_name = card.name_any();
    let card_namespace = card.namespace().unwrap_or_default();
    let derived_hash = card
        .status
        .as_ref()
        .map(|status| status.hash.clone())
        .unwrap_or_default();

    // Dedup fast path: an unchanged spec needs no probe and no write.
    if let Some(existing) = ctx
        .view
        .cards
        .get(&ObjectRef::new(&card_name).within(&card_namespace))
    {
        if existing
            .status
            .as_ref()
            .is_some_and(|status| status.hash == derived_hash)
        {
            debug!(card = %card_name, "agent card unchanged, skipping update");
            return Ok(CardOutcome::Unchanged);
        }
    }

    if !card.spec.endpoints.is_empty() {
        let health = ctx.checker.check_endpoints(&card.spec.endpoints).await;
        if let Some(status) = card.status.as_mut() {
            status.endpoint_healthy = Some(health);
        }
    }

    let api: Api<AgentCard> = Api::namespaced(ctx.client.clone(), &card_namespace);
    let params = PatchParams::apply(FIELD_MANAGER).force();
    api.patch(&card_name, &params, &Patch::Apply(&spec_apply_payload(&card)))
        .await
        .map_err(CardError::Apply)?;
    api.patch_status(
        &card_name,
        &params,
        &Patch::Apply(&status_apply_payload(&card)),
    )
    .await
    .map_err(CardError::Status)?;

    info!(
        card = %card_name,
        agent = %agent_name,
        healthy = ?card.status.as_ref().and_then(|status| status.endpoint_healthy),
        "reconciled agent card"
    );
    Ok(CardOutcome::Applied)
}

/// Deletes cards owned by this registry whose source agent is no longer
/// selected. Failures are logged, the next pass retries.
async fn prune_stale_cards(registry: &AgentRegistry, agents: &[Arc<Agent>], ctx: &Context) {
    let Some(registry_uid) = registry.uid() else {
        return;
    };
    let selected: HashSet<(String, String)> = agents
        .iter()
        .map(|agent| (agent.namespace().unwrap_or_default(), agent.name_any()))
        .collect();

    for card in ctx.view.cards.state() {
        if !is_controller_owned(&card, &registry_uid) {
            continue;
        }
        let card_namespace = card.namespace().unwrap_or_default();
        let card_name = card.name_any();
        if selected.contains(&(card_namespace.clone(), card_name.clone())) {
            continue;
        }

        let api: Api<AgentCard> = Api::namespaced(ctx.client.clone(), &card_namespace);
        match api.delete(&card_name, &DeleteParams::default()).await {
            Ok(_) => info!(
                card = %card_name,
                namespace = %card_namespace,
                "deleted card of unselected agent"
            ),
            Err(kube::Error::Api(response)) if response.code == 404 => {}
            Err(err) => warn!(
                card = %card_name,
                namespace = %card_namespace,
                error = %err,
                "deleting card of unselected agent"
            ),
        }
    }
}

fn is_controller_owned(card: &AgentCard, registry_uid: &str) -> bool {
    card.metadata
        .owner_references
        .iter()
        .flatten()
        .any(|owner| owner.controller == Some(true) && owner.uid == registry_uid)
}

/// Server-side apply payload for the card main resource. Only fields this
/// controller declares are owned, a status stanza would be ignored here since
/// status is a subresource.
fn spec_apply_payload(card: &AgentCard) -> serde_json::Value {
    serde_json::json!({
        "apiVersion": AgentCard::api_version(&()),
        "kind": AgentCard::kind(&()),
        "metadata": {
            "name": card.metadata.name,
            "namespace": card.metadata.namespace,
            "ownerReferences": card.metadata.owner_references,
        },
        "spec": card.spec,
    })
}

fn status_apply_payload(card: &AgentCard) -> serde_json::Value {
    serde_json::json!({
        "apiVersion": AgentCard::api_version(&()),
        "kind": AgentCard::kind(&()),
        "metadata": {
            "name": card.metadata.name,
            "namespace": card.metadata.namespace,
        },
        "status": card.status,
    })
}

fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(8);
    (BACKOFF_BASE * 2u32.pow(exponent)).min(BACKOFF_MAX)
}

fn registry_key(registry: &AgentRegistry) -> String {
    format!(
        "{}/{}",
        registry.namespace().unwrap_or_default(),
        registry.name_any()
    )
}
