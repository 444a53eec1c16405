use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Condition type reporting that the card was derived successfully.
pub const CARD_CONDITION_TYPE_READY: &str = "Ready";

/// One network address at which a registered agent can be reached.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct AgentEndpoint {
    /// Full endpoint URL, e.g. `http://svc-name.namespace.svc.cluster.local:8080`.
    #[schemars(length(min = 1))]
    pub url: String,

    /// Transport protocol, e.g. `http`, `https` or `grpc`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol: String,

    /// Port number. Zero means unspecified.
    #[serde(default, skip_serializing_if = "port_is_unspecified")]
    #[schemars(range(min = 1, max = 65535))]
    pub port: i32,
}

fn port_is_unspecified(port: &i32) -> bool {
    *port == 0
}

/// Derived descriptor of one registered agent.
///
/// Cards are produced and maintained exclusively by the registry controller
/// under a single field manager. Deleting the owning
/// [AgentRegistry](crate::api::registry::AgentRegistry) cascade-deletes its
/// cards through the controller owner reference.
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cardinal.dev",
    version = "v1alpha1",
    kind = "AgentCard",
    namespaced,
    status = "AgentCardStatus",
    shortname = "acard"
)]
#[kube(printcolumn = r#"{"name":"Agent","type":"string","jsonPath":".spec.name"}"#)]
#[kube(printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#)]
#[kube(printcolumn = r#"{"name":"Hash","type":"string","jsonPath":".status.hash"}"#)]
#[kube(printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#)]
#[serde(rename_all = "camelCase")]
pub struct AgentCardSpec {
    /// Agent name, mirrors the source agent.
    #[schemars(length(min = 1))]
    pub name: String,

    /// Version advertised by the agent.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    /// Identity of the agent this card was derived from.
    pub source_ref: ObjectReference,

    /// Addresses at which the agent is reachable, in resolution order.
    #[serde(default)]
    pub endpoints: Vec<AgentEndpoint>,

    /// Capabilities advertised by the agent.
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// A2A protocol version the card conforms to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol_version: String,

    /// Free-form key/value metadata harvested from the agent.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,

    /// Serialized A2A document for external consumption.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub public_document: String,
}

/// Reachability of a card's endpoints as observed by the last probe.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum EndpointHealth {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentCardStatus {
    /// Content digest of the spec, used for no-op detection.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hash: String,

    /// Timestamp of the last observation of the source agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<Time>,

    /// Outcome of the last endpoint probe, absent when never probed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_healthy: Option<EndpointHealth>,

    /// Latest available observations on the card.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Source agent generation observed when the card was derived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
