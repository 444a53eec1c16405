use std::sync::Arc;

use kube::core::{Selector, SelectorExt};
use kube::ResourceExt;
use thiserror::Error;

use crate::api::agent::Agent;
use crate::api::registry::AgentRegistry;
use crate::k8s::annotations;
use crate::k8s::reflectors::ClusterView;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("invalid namespace selector: `{0}`")]
    InvalidSelector(String),
}

/// Lists the agents selected by the registry: agents inside the discovery
/// scope that requested registration and did not opt out. The result is
/// ordered by namespace and name so passes enumerate deterministically.
pub(crate) fn selected_agents(
    registry: &AgentRegistry,
    view: &ClusterView,
) -> Result<Vec<Arc<Agent>>, DiscoveryError> {
    let namespaces = search_namespaces(registry, view)?;

    let mut agents: Vec<Arc<Agent>> = view
        .agents
        .state()
        .into_iter()
        .filter(|agent| {
            agent
                .namespace()
                .is_some_and(|ns| namespaces.iter().any(|wanted| *wanted == ns))
        })
        .filter(|agent| is_registrable(agent))
        .collect();
    agents.sort_by_key(|agent| (agent.namespace().unwrap_or_default(), agent.name_any()));

    Ok(agents)
}

fn is_registrable(agent: &Agent) -> bool {
    let annotations = agent.annotations();
    annotations::registration_requested(annotations)
        && !annotations::discovery_disabled(annotations)
}

/// Namespaces searched for agents: those matching the selector when one is
/// set, the registry's own namespace otherwise.
fn search_namespaces(
    registry: &AgentRegistry,
    view: &ClusterView,
) -> Result<Vec<String>, DiscoveryError> {
    let Some(label_selector) = &registry.spec.discovery.namespace_selector else {
        return Ok(vec![registry.namespace().unwrap_or_default()]);
    };

    let selector = Selector::try_from(label_selector.clone())
        .map_err(|err| DiscoveryError::InvalidSelector(err.to_string()))?;

    Ok(view
        .namespaces
        .state()
        .iter()
        .filter(|namespace| selector.matches(namespace.labels()))
        .map(|namespace| namespace.name_any())
        .collect())
}
