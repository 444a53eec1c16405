use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, LabelSelector, Time};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Condition type reporting a completed reconciliation pass.
pub const REGISTRY_CONDITION_TYPE_READY: &str = "Ready";
/// Condition type reporting a pass in progress.
pub const REGISTRY_CONDITION_TYPE_DISCOVERING: &str = "Discovering";
/// Condition type reporting a failed pass.
pub const REGISTRY_CONDITION_TYPE_ERROR: &str = "Error";

/// Protocol version stamped into derived cards unless the registry overrides it.
pub const DEFAULT_PROTOCOL_VERSION: &str = "0.3.0";

/// Cadence of the discovery loop when the registry does not set one.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Lower bound for the discovery cadence, intervals below it are clamped.
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Declarative configuration of one agent discovery scope.
///
/// An `AgentRegistry` names which namespaces are searched for registrable
/// agents, how often the search runs and which protocol version the derived
/// [AgentCard](crate::api::card::AgentCard)s advertise. The controller owns the
/// status subresource exclusively.
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cardinal.dev",
    version = "v1alpha1",
    kind = "AgentRegistry",
    namespaced,
    status = "AgentRegistryStatus",
    shortname = "areg"
)]
#[kube(printcolumn = r#"{"name":"Agents","type":"integer","jsonPath":".status.registeredCount"}"#)]
#[kube(printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#)]
#[kube(printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#)]
#[serde(rename_all = "camelCase")]
pub struct AgentRegistrySpec {
    /// Discovery scope and cadence.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// A2A protocol version stamped into every derived card.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryConfig {
    /// Enables the discovery loop. When false, reconciliation only reports
    /// the `NotStarted` phase and no cards are produced.
    #[serde(default)]
    pub enabled: bool,

    /// Restricts discovery to namespaces matching this selector. When absent,
    /// only the registry's own namespace is searched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<LabelSelector>,

    /// How often to re-run discovery, e.g. "30s" or "5m". Defaults to 5m.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_interval: Option<String>,
}

/// Outcome of the most recent reconciliation pass.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum RegistryPhase {
    #[default]
    NotStarted,
    Discovering,
    Ready,
    Error,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentRegistryStatus {
    /// Count of agents registered by the last completed pass.
    #[serde(default)]
    pub registered_count: i32,

    /// Current lifecycle phase.
    #[serde(default)]
    pub phase: RegistryPhase,

    /// Timestamp of the last pass that reached a terminal phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<Time>,

    /// Latest available observations on the registry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Spec generation observed by the last pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl AgentRegistry {
    /// Requeue delay after a completed pass. Unparsable or sub-second values
    /// fall back to the default and the lower bound respectively.
    pub fn sync_interval(&self) -> Duration {
        self.spec
            .discovery
            .sync_interval
            .as_deref()
            .and_then(|raw| duration_str::parse(raw).ok())
            .map(|interval| interval.max(MIN_SYNC_INTERVAL))
            .unwrap_or(DEFAULT_SYNC_INTERVAL)
    }
}

fn default_protocol_version() -> String {
    DEFAULT_PROTOCOL_VERSION.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_defaults() {
        let spec: AgentRegistrySpec = serde_yaml::from_str("{}").unwrap();

        assert!(!spec.discovery.enabled);
        assert!(spec.discovery.namespace_selector.is_none());
        assert!(spec.discovery.sync_interval.is_none());
        assert_eq!(spec.protocol_version, DEFAULT_PROTOCOL_VERSION);
    }

    #[test]
    fn test_sync_interval_default_and_bounds() {
        struct TestCase {
            name: &'static str,
            raw: Option<&'static str>,
            expected: Duration,
        }
        let test_cases = [
            TestCase {
                name: "unset falls back to the default",
                raw: None,
                expected: DEFAULT_SYNC_INTERVAL,
            },
            TestCase {
                name: "valid interval is honored",
                raw: Some("30s"),
                expected: Duration::from_secs(30),
            },
            TestCase {
                name: "sub-second interval is clamped",
                raw: Some("10ms"),
                expected: MIN_SYNC_INTERVAL,
            },
            TestCase {
                name: "unparsable interval falls back to the default",
                raw: Some("not-a-duration"),
                expected: DEFAULT_SYNC_INTERVAL,
            },
        ];
        for tc in test_cases {
            let registry = AgentRegistry::new(
                "r1",
                AgentRegistrySpec {
                    discovery: DiscoveryConfig {
                        sync_interval: tc.raw.map(String::from),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            );
            assert_eq!(registry.sync_interval(), tc.expected, "{} failed", tc.name);
        }
    }

    #[test]
    fn test_phase_serialization() {
        assert_eq!(
            serde_json::to_string(&RegistryPhase::NotStarted).unwrap(),
            r#""NotStarted""#
        );
        assert_eq!(
            serde_json::to_string(&RegistryPhase::Ready).unwrap(),
            r#""Ready""#
        );
        let parsed: RegistryPhase = serde_json::from_str(r#""Discovering""#).unwrap();
        assert_eq!(parsed, RegistryPhase::Discovering);
    }
}
