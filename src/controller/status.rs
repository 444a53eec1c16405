use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use tracing::warn;

use super::FIELD_MANAGER;
use crate::api::registry::{
    AgentRegistry, AgentRegistryStatus, RegistryPhase, REGISTRY_CONDITION_TYPE_DISCOVERING,
    REGISTRY_CONDITION_TYPE_ERROR, REGISTRY_CONDITION_TYPE_READY,
};

pub(crate) const REASON_RECONCILIATION_SUCCEEDED: &str = "ReconciliationSucceeded";
pub(crate) const REASON_RECONCILIATION_FAILED: &str = "ReconciliationFailed";
pub(crate) const REASON_DISCOVERING_AGENTS: &str = "DiscoveringAgents";

/// Builds the registry status reflecting a pass outcome.
///
/// Conditions are carried over from the current status and the one matching
/// the outcome is upserted by type. `lastSync` only moves when the pass
/// reached a terminal phase.
pub(crate) fn next_status(
    registry: &AgentRegistry,
    phase: RegistryPhase,
    message: &str,
    registered_count: i32,
) -> AgentRegistryStatus {
    let now = Time(Utc::now());
    let previous = registry.status.clone().unwrap_or_default();

    let (condition_type, reason) = match phase {
        RegistryPhase::Error => (REGISTRY_CONDITION_TYPE_ERROR, REASON_RECONCILIATION_FAILED),
        RegistryPhase::Discovering => (
            REGISTRY_CONDITION_TYPE_DISCOVERING,
            REASON_DISCOVERING_AGENTS,
        ),
        RegistryPhase::NotStarted | RegistryPhase::Ready => (
            REGISTRY_CONDITION_TYPE_READY,
            REASON_RECONCILIATION_SUCCEEDED,
        ),
    };
    let condition = Condition {
        type_: condition_type.to_string(),
        status: "True".to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
        observed_generation: registry.metadata.generation,
        last_transition_time: now.clone(),
    };

    let mut conditions = previous.conditions;
    match conditions
        .iter_mut()
        .find(|existing| existing.type_ == condition.type_)
    {
        Some(existing) => *existing = condition,
        None => conditions.push(condition),
    }

    let last_sync = match phase {
        RegistryPhase::Ready | RegistryPhase::Error => Some(now),
        RegistryPhase::NotStarted | RegistryPhase::Discovering => previous.last_sync,
    };

    AgentRegistryStatus {
        registered_count,
        phase,
        last_sync,
        conditions,
        observed_generation: registry.metadata.generation,
    }
}

/// Writes the registry status subresource under the controller's field
/// manager. Failures are logged and swallowed, the next pass resynchronizes
/// the status while the functional outcome of the pass is preserved.
pub(crate) async fn patch_status(
    client: Client,
    registry: &AgentRegistry,
    status: AgentRegistryStatus,
) {
    let name = registry.name_any();
    let namespace = registry.namespace().unwrap_or_default();
    let api: Api<AgentRegistry> = Api::namespaced(client, &namespace);

    let patch = serde_json::json!({
        "apiVersion": AgentRegistry::api_version(&()),
        "kind": AgentRegistry::kind(&()),
        "metadata": { "name": name },
        "status": status,
    });
    let params = PatchParams::apply(FIELD_MANAGER).force();

    if let Err(err) = api.patch_status(&name, &params, &Patch::Apply(&patch)).await {
        warn!(registry = %name, error = %err, "updating registry status");
    }
}
