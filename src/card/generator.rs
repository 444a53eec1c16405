use chrono::Utc;
use k8s_openapi::api::core::v1::{ObjectReference, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use super::hash::spec_hash;
use crate::a2a::translator::{Translator, DESCRIPTION_METADATA_KEY};
use crate::api::agent::Agent;
use crate::api::card::{
    AgentCard, AgentCardSpec, AgentCardStatus, AgentEndpoint, CARD_CONDITION_TYPE_READY,
};
use crate::api::registry::AgentRegistry;
use crate::k8s::annotations;

/// Metadata key carrying the model configuration name.
pub const MODEL_CONFIG_METADATA_KEY: &str = "modelConfig";
/// Metadata key carrying the comma-separated tool names.
pub const TOOLS_METADATA_KEY: &str = "tools";

/// In-cluster host serving declarative agents over A2A.
pub const IN_CLUSTER_A2A_HOST: &str = "cardinal-controller.cardinal.svc.cluster.local";
/// Port of the in-cluster A2A endpoint.
pub const IN_CLUSTER_A2A_PORT: i32 = 8083;

const VERSION_LABEL_KEY: &str = "version";
const APP_VERSION_LABEL_KEY: &str = "app.kubernetes.io/version";

const HTTP_PROTOCOL: &str = "http";
const CLUSTER_DNS_SUFFIX: &str = "svc.cluster.local";

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("computing card content hash: `{0}`")]
    Hash(#[from] serde_json::Error),

    #[error("the registry cannot own cards, it is missing identity metadata")]
    UnownableRegistry,
}

/// Derives an [AgentCard] from a discovered agent.
///
/// Derivation is a closed, ordered set of rules, each attribute resolver
/// returns on the first matching source. Apart from the timestamps stamped
/// into the status, the derived spec is a pure function of its inputs.
#[derive(Debug, Default, Clone)]
pub struct CardGenerator {
    translator: Translator,
}

impl CardGenerator {
    pub fn new(translator: Translator) -> Self {
        Self { translator }
    }

    /// Builds the card for `agent` under `registry`. `service` is the service
    /// sharing the agent's name and namespace, when one exists.
    pub fn generate(
        &self,
        registry: &AgentRegistry,
        agent: &Agent,
        service: Option<&Service>,
    ) -> Result<AgentCard, GenerationError> {
        let name = agent.name_any();
        let namespace = agent.namespace().unwrap_or_default();
        let owner_ref = registry
            .controller_owner_ref(&())
            .ok_or(GenerationError::UnownableRegistry)?;

        let mut spec = AgentCardSpec {
            name: name.clone(),
            version: resolve_version(agent),
            source_ref: source_ref(agent),
            endpoints: resolve_endpoints(agent, service),
            capabilities: resolve_capabilities(agent),
            protocol_version: registry.spec.protocol_version.clone(),
            metadata: resolve_metadata(agent),
            public_document: String::new(),
        };

        // Translation failure is not fatal, the card ships without a public
        // document and the next pass retries.
        match self.translator.to_json(&spec) {
            Ok(document) => spec.public_document = document,
            Err(err) => debug!(agent = %name, error = %err, "translating agent card"),
        }

        let hash = spec_hash(&spec)?;
        let now = Time(Utc::now());

        let mut card = AgentCard::new(&name, spec);
        card.metadata.namespace = Some(namespace);
        card.metadata.owner_references = Some(vec![owner_ref]);
        card.status = Some(AgentCardStatus {
            hash,
            last_seen: Some(now.clone()),
            endpoint_healthy: None,
            conditions: vec![Condition {
                type_: CARD_CONDITION_TYPE_READY.to_string(),
                status: "True".to_string(),
                reason: "Generated".to_string(),
                message: "agent card generated".to_string(),
                observed_generation: agent.metadata.generation,
                last_transition_time: now,
            }],
            observed_generation: agent.metadata.generation,
        });

        Ok(card)
    }
}

/// Version resolution, first match wins: `version` label, well-known
/// `app.kubernetes.io/version` label, resource version token.
fn resolve_version(agent: &Agent) -> String {
    let labels = agent.labels();
    labels
        .get(VERSION_LABEL_KEY)
        .or_else(|| labels.get(APP_VERSION_LABEL_KEY))
        .cloned()
        .or_else(|| agent.resource_version())
        .unwrap_or_default()
}

fn source_ref(agent: &Agent) -> ObjectReference {
    ObjectReference {
        api_version: Some(Agent::api_version(&()).into_owned()),
        kind: Some(Agent::kind(&()).into_owned()),
        name: Some(agent.name_any()),
        namespace: agent.namespace(),
        uid: agent.uid(),
        ..Default::default()
    }
}

/// Endpoint resolution, first match wins: annotation override, in-cluster A2A
/// endpoint for declarative agents, one endpoint per port of the service
/// named like the agent, otherwise empty.
fn resolve_endpoints(agent: &Agent, service: Option<&Service>) -> Vec<AgentEndpoint> {
    if let Some(url) = annotations::endpoint_override(agent.annotations()) {
        return vec![AgentEndpoint {
            url: url.clone(),
            protocol: HTTP_PROTOCOL.to_string(),
            port: 0,
        }];
    }

    if agent
        .spec
        .declarative
        .as_ref()
        .is_some_and(|declarative| declarative.a2a_config.is_some())
    {
        let namespace = agent.namespace().unwrap_or_default();
        let name = agent.name_any();
        return vec![AgentEndpoint {
            url: format!(
                "http://{IN_CLUSTER_A2A_HOST}:{IN_CLUSTER_A2A_PORT}/api/a2a/{namespace}/{name}"
            ),
            protocol: HTTP_PROTOCOL.to_string(),
            port: IN_CLUSTER_A2A_PORT,
        }];
    }

    if let Some(service) = service {
        let service_name = service.name_any();
        let service_namespace = service.namespace().unwrap_or_default();
        return service
            .spec
            .iter()
            .flat_map(|spec| spec.ports.iter().flatten())
            .map(|port| AgentEndpoint {
                url: format!(
                    "http://{service_name}.{service_namespace}.{CLUSTER_DNS_SUFFIX}:{}",
                    port.port
                ),
                protocol: port
                    .protocol
                    .as_deref()
                    .unwrap_or("TCP")
                    .to_ascii_lowercase(),
                port: port.port,
            })
            .collect();
    }

    Vec::new()
}

/// Capability resolution, first match wins: annotation CSV (trimmed, empty
/// segments dropped), declared skill names in order, otherwise empty.
fn resolve_capabilities(agent: &Agent) -> Vec<String> {
    if let Some(csv) = annotations::capabilities_override(agent.annotations()) {
        return csv
            .split(',')
            .map(str::trim)
            .filter(|capability| !capability.is_empty())
            .map(String::from)
            .collect();
    }

    agent
        .spec
        .declarative
        .as_ref()
        .and_then(|declarative| declarative.a2a_config.as_ref())
        .map(|a2a| {
            a2a.skills
                .iter()
                .filter(|skill| !skill.name.is_empty())
                .map(|skill| skill.name.clone())
                .collect()
        })
        .unwrap_or_default()
}

/// Metadata merge, later sources overwrite earlier ones: agent description,
/// model config reference, tool name CSV, then `card-` prefixed annotations.
fn resolve_metadata(agent: &Agent) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();

    if !agent.spec.description.is_empty() {
        metadata.insert(
            DESCRIPTION_METADATA_KEY.to_string(),
            agent.spec.description.clone(),
        );
    }

    if let Some(declarative) = &agent.spec.declarative {
        if !declarative.model_config.is_empty() {
            metadata.insert(
                MODEL_CONFIG_METADATA_KEY.to_string(),
                declarative.model_config.clone(),
            );
        }

        let tool_names: Vec<&str> = declarative
            .tools
            .iter()
            .filter_map(|tool| {
                tool.mcp_server
                    .as_ref()
                    .map(|mcp| mcp.name.as_str())
                    .filter(|name| !name.is_empty())
                    .or_else(|| {
                        tool.agent
                            .as_ref()
                            .map(|agent| agent.name.as_str())
                            .filter(|name| !name.is_empty())
                    })
            })
            .collect();
        if !tool_names.is_empty() {
            metadata.insert(TOOLS_METADATA_KEY.to_string(), tool_names.join(","));
        }
    }

    for (key, value) in annotations::card_metadata(agent.annotations()) {
        metadata.insert(key, value);
    }

    metadata
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::api::agent::{A2AConfig, AgentRef, AgentSpec, DeclarativeSpec, McpServerRef, Skill, ToolRef};
    use crate::api::registry::AgentRegistrySpec;
    use k8s_openapi::api::core::v1::{ServicePort, ServiceSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    pub(crate) fn test_registry(name: &str, namespace: &str) -> AgentRegistry {
        let mut registry = AgentRegistry::new(
            name,
            AgentRegistrySpec {
                protocol_version: "0.3.0".to_string(),
                ..Default::default()
            },
        );
        registry.metadata.namespace = Some(namespace.to_string());
        registry.metadata.uid = Some("registry-uid".to_string());
        registry
    }

    pub(crate) fn test_agent(name: &str, namespace: &str, spec: AgentSpec) -> Agent {
        let mut agent = Agent::new(name, spec);
        agent.metadata.namespace = Some(namespace.to_string());
        agent.metadata.uid = Some(format!("{name}-uid"));
        agent.metadata.resource_version = Some("12345".to_string());
        agent.metadata.generation = Some(1);
        agent
    }

    pub(crate) fn annotated(mut agent: Agent, entries: &[(&str, &str)]) -> Agent {
        let annotations = agent.metadata.annotations.get_or_insert_with(Default::default);
        for (key, value) in entries {
            annotations.insert(key.to_string(), value.to_string());
        }
        agent
    }

    pub(crate) fn test_service(name: &str, namespace: &str, ports: &[(&str, i32, &str)]) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(
                    ports
                        .iter()
                        .map(|(port_name, port, protocol)| ServicePort {
                            name: Some(port_name.to_string()),
                            port: *port,
                            protocol: Some(protocol.to_string()),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_minimal_agent_produces_card() {
        let registry = test_registry("r1", "n");
        let agent = annotated(
            test_agent(
                "a1",
                "n",
                AgentSpec {
                    description: "hello".to_string(),
                    ..Default::default()
                },
            ),
            &[("cardinal.dev/register-to-registry", "true")],
        );

        let card = CardGenerator::default()
            .generate(&registry, &agent, None)
            .unwrap();

        assert_eq!(card.metadata.name.as_deref(), Some("a1"));
        assert_eq!(card.metadata.namespace.as_deref(), Some("n"));
        assert_eq!(card.spec.name, "a1");
        assert_eq!(card.spec.protocol_version, "0.3.0");
        assert_eq!(
            card.spec.metadata.get("description").map(String::as_str),
            Some("hello")
        );
        assert!(card.spec.endpoints.is_empty());
        assert!(card.spec.capabilities.is_empty());
        assert!(!card.spec.public_document.is_empty());

        let status = card.status.as_ref().unwrap();
        assert!(!status.hash.is_empty());
        assert!(status.last_seen.is_some());
        assert!(status.endpoint_healthy.is_none());

        let owner = &card.metadata.owner_references.as_ref().unwrap()[0];
        assert_eq!(owner.controller, Some(true));
        assert_eq!(owner.kind, "AgentRegistry");
        assert_eq!(owner.name, "r1");
        assert_eq!(owner.uid, "registry-uid");

        assert_eq!(card.spec.source_ref.kind.as_deref(), Some("Agent"));
        assert_eq!(card.spec.source_ref.name.as_deref(), Some("a1"));
        assert_eq!(card.spec.source_ref.namespace.as_deref(), Some("n"));
        assert_eq!(card.spec.source_ref.uid.as_deref(), Some("a1-uid"));
    }

    #[test]
    fn test_service_derived_endpoints_preserve_port_order() {
        let registry = test_registry("r1", "n");
        let agent = test_agent("a1", "n", AgentSpec::default());
        let service = test_service("a1", "n", &[("http", 8080, "TCP"), ("grpc", 9090, "TCP")]);

        let card = CardGenerator::default()
            .generate(&registry, &agent, Some(&service))
            .unwrap();

        assert_eq!(
            card.spec.endpoints,
            vec![
                AgentEndpoint {
                    url: "http://a1.n.svc.cluster.local:8080".to_string(),
                    protocol: "tcp".to_string(),
                    port: 8080,
                },
                AgentEndpoint {
                    url: "http://a1.n.svc.cluster.local:9090".to_string(),
                    protocol: "tcp".to_string(),
                    port: 9090,
                },
            ]
        );
    }

    #[test]
    fn test_endpoint_annotation_override_wins_over_service() {
        let registry = test_registry("r1", "n");
        let agent = annotated(
            test_agent("a1", "n", AgentSpec::default()),
            &[("cardinal.dev/a2a-endpoint", "https://x.example:9000")],
        );
        let service = test_service("a1", "n", &[("http", 8080, "TCP")]);

        let card = CardGenerator::default()
            .generate(&registry, &agent, Some(&service))
            .unwrap();

        assert_eq!(
            card.spec.endpoints,
            vec![AgentEndpoint {
                url: "https://x.example:9000".to_string(),
                protocol: "http".to_string(),
                port: 0,
            }]
        );
    }

    #[test]
    fn test_declarative_agent_gets_in_cluster_endpoint() {
        let registry = test_registry("r1", "n");
        let agent = test_agent(
            "a1",
            "n",
            AgentSpec {
                declarative: Some(DeclarativeSpec {
                    a2a_config: Some(A2AConfig::default()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );

        let card = CardGenerator::default()
            .generate(&registry, &agent, None)
            .unwrap();

        assert_eq!(
            card.spec.endpoints,
            vec![AgentEndpoint {
                url: "http://cardinal-controller.cardinal.svc.cluster.local:8083/api/a2a/n/a1"
                    .to_string(),
                protocol: "http".to_string(),
                port: 8083,
            }]
        );
    }

    #[test]
    fn test_capabilities_annotation_override_wins_over_skills() {
        let registry = test_registry("r1", "n");
        let agent = annotated(
            test_agent(
                "a1",
                "n",
                AgentSpec {
                    declarative: Some(DeclarativeSpec {
                        a2a_config: Some(A2AConfig {
                            skills: vec![Skill {
                                name: "ignored-skill".to_string(),
                                ..Default::default()
                            }],
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ),
            &[("cardinal.dev/capabilities", "kubernetes, monitoring, alerting")],
        );

        let card = CardGenerator::default()
            .generate(&registry, &agent, None)
            .unwrap();

        assert_eq!(
            card.spec.capabilities,
            vec!["kubernetes", "monitoring", "alerting"]
        );
    }

    #[test]
    fn test_capabilities_from_skills_skip_empty_names() {
        let registry = test_registry("r1", "n");
        let agent = test_agent(
            "a1",
            "n",
            AgentSpec {
                declarative: Some(DeclarativeSpec {
                    a2a_config: Some(A2AConfig {
                        skills: vec![
                            Skill {
                                name: "kubernetes".to_string(),
                                ..Default::default()
                            },
                            Skill::default(),
                            Skill {
                                name: "alerting".to_string(),
                                ..Default::default()
                            },
                        ],
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );

        let card = CardGenerator::default()
            .generate(&registry, &agent, None)
            .unwrap();

        assert_eq!(card.spec.capabilities, vec!["kubernetes", "alerting"]);
    }

    #[test]
    fn test_version_resolution_order() {
        let registry = test_registry("r1", "n");

        let mut agent = test_agent("a1", "n", AgentSpec::default());
        agent.metadata.labels = Some(
            [
                ("version".to_string(), "2.0.0".to_string()),
                (
                    "app.kubernetes.io/version".to_string(),
                    "1.0.0".to_string(),
                ),
            ]
            .into(),
        );
        let card = CardGenerator::default()
            .generate(&registry, &agent, None)
            .unwrap();
        assert_eq!(card.spec.version, "2.0.0");

        let mut agent = test_agent("a1", "n", AgentSpec::default());
        agent.metadata.labels = Some(
            [(
                "app.kubernetes.io/version".to_string(),
                "1.0.0".to_string(),
            )]
            .into(),
        );
        let card = CardGenerator::default()
            .generate(&registry, &agent, None)
            .unwrap();
        assert_eq!(card.spec.version, "1.0.0");

        let agent = test_agent("a1", "n", AgentSpec::default());
        let card = CardGenerator::default()
            .generate(&registry, &agent, None)
            .unwrap();
        assert_eq!(card.spec.version, "12345");
    }

    #[test]
    fn test_metadata_merge_order() {
        let registry = test_registry("r1", "n");
        let agent = annotated(
            test_agent(
                "a1",
                "n",
                AgentSpec {
                    description: "from the spec".to_string(),
                    declarative: Some(DeclarativeSpec {
                        model_config: "default-model".to_string(),
                        tools: vec![
                            ToolRef {
                                mcp_server: Some(McpServerRef {
                                    name: "search".to_string(),
                                }),
                                ..Default::default()
                            },
                            ToolRef {
                                agent: Some(AgentRef {
                                    name: "helper".to_string(),
                                }),
                                ..Default::default()
                            },
                            ToolRef::default(),
                        ],
                        ..Default::default()
                    }),
                },
            ),
            &[
                // Annotation metadata overwrites earlier sources.
                ("cardinal.dev/card-description", "from the annotation"),
                ("cardinal.dev/card-team", "platform"),
            ],
        );

        let card = CardGenerator::default()
            .generate(&registry, &agent, None)
            .unwrap();

        assert_eq!(
            card.spec.metadata.get("description").map(String::as_str),
            Some("from the annotation")
        );
        assert_eq!(
            card.spec.metadata.get("modelConfig").map(String::as_str),
            Some("default-model")
        );
        assert_eq!(
            card.spec.metadata.get("tools").map(String::as_str),
            Some("search,helper")
        );
        assert_eq!(
            card.spec.metadata.get("team").map(String::as_str),
            Some("platform")
        );
    }

    #[test]
    fn test_generation_is_deterministic() {
        let registry = test_registry("r1", "n");
        let agent = annotated(
            test_agent(
                "a1",
                "n",
                AgentSpec {
                    description: "hello".to_string(),
                    ..Default::default()
                },
            ),
            &[("cardinal.dev/capabilities", "kubernetes")],
        );

        let generator = CardGenerator::default();
        let first = generator.generate(&registry, &agent, None).unwrap();
        let second = generator.generate(&registry, &agent, None).unwrap();

        assert_eq!(first.spec, second.spec);
        assert_eq!(
            first.status.as_ref().unwrap().hash,
            second.status.as_ref().unwrap().hash
        );
    }

    #[test]
    fn test_registry_without_uid_cannot_own_cards() {
        let registry = AgentRegistry::new("r1", AgentRegistrySpec::default());
        let agent = test_agent("a1", "n", AgentSpec::default());

        let err = CardGenerator::default()
            .generate(&registry, &agent, None)
            .unwrap_err();
        assert_matches!(err, GenerationError::UnownableRegistry);
    }
}
