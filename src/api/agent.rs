use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Subset of the `Agent` resource consumed by the registry controller.
///
/// Agents are authored and reconciled elsewhere; this controller only reads
/// them. Fields not relevant to card derivation are intentionally omitted,
/// unknown fields are ignored on deserialization.
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(group = "cardinal.dev", version = "v1alpha1", kind = "Agent", namespaced)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    /// Human readable description of the agent.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Declarative agent definition, absent for externally managed agents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declarative: Option<DeclarativeSpec>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeclarativeSpec {
    /// Name of the model configuration the agent runs with.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model_config: String,

    /// Tools wired into the agent, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolRef>,

    /// A2A protocol configuration, present when the agent is served through
    /// the in-cluster A2A endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a2a_config: Option<A2AConfig>,
}

/// Reference to a tool. Exactly one of the variants is expected to be set.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_server: Option<McpServerRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentRef>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct McpServerRef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct AgentRef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct A2AConfig {
    /// Skills the agent advertises, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<Skill>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Skill {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}
