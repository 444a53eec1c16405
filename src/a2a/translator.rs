use thiserror::Error;

use super::document::{AgentCapabilities, AgentDocument, AgentProvider, AgentSkill};
use crate::api::card::AgentCardSpec;

/// Metadata key carrying the agent description.
pub const DESCRIPTION_METADATA_KEY: &str = "description";
/// Metadata key carrying the providing organization name.
pub const PROVIDER_ORGANIZATION_METADATA_KEY: &str = "provider.organization";
/// Metadata key carrying the provider URL.
pub const PROVIDER_URL_METADATA_KEY: &str = "provider.url";
/// Metadata key carrying the agent icon URL.
pub const ICON_URL_METADATA_KEY: &str = "iconUrl";
/// Metadata key carrying the agent documentation URL.
pub const DOCUMENTATION_URL_METADATA_KEY: &str = "documentationUrl";

const DEFAULT_VERSION: &str = "1.0.0";
const DEFAULT_MODE: &str = "text";

#[derive(Error, Debug)]
pub enum TranslationError {
    #[error("serializing agent document: `{0}`")]
    Serialize(#[from] serde_json::Error),
}

/// Translates a card spec into the public A2A document.
///
/// Translation is deterministic for a given spec. Conventional metadata keys
/// are read when present, sensible defaults are synthesized otherwise.
#[derive(Debug, Default, Clone)]
pub struct Translator;

impl Translator {
    pub fn to_document(&self, spec: &AgentCardSpec) -> AgentDocument {
        AgentDocument {
            name: spec.name.clone(),
            description: self.description(spec),
            provider: self.provider(spec),
            url: self.primary_url(spec),
            icon_url: spec.metadata.get(ICON_URL_METADATA_KEY).cloned(),
            version: self.version(spec),
            documentation_url: spec.metadata.get(DOCUMENTATION_URL_METADATA_KEY).cloned(),
            protocol_version: (!spec.protocol_version.is_empty())
                .then(|| spec.protocol_version.clone()),
            capabilities: AgentCapabilities {
                streaming: Some(true),
                push_notifications: Some(false),
                state_transition_history: Some(false),
            },
            default_input_modes: vec![DEFAULT_MODE.to_string()],
            default_output_modes: vec![DEFAULT_MODE.to_string()],
            skills: self.skills(spec),
        }
    }

    pub fn to_json(&self, spec: &AgentCardSpec) -> Result<String, TranslationError> {
        Ok(serde_json::to_string(&self.to_document(spec))?)
    }

    fn description(&self, spec: &AgentCardSpec) -> String {
        match spec.metadata.get(DESCRIPTION_METADATA_KEY) {
            Some(description) if !description.is_empty() => description.clone(),
            _ => format!("Agent {}", spec.name),
        }
    }

    fn version(&self, spec: &AgentCardSpec) -> String {
        if spec.version.is_empty() {
            DEFAULT_VERSION.to_string()
        } else {
            spec.version.clone()
        }
    }

    fn primary_url(&self, spec: &AgentCardSpec) -> String {
        spec.endpoints
            .first()
            .map(|endpoint| endpoint.url.clone())
            .unwrap_or_default()
    }

    fn provider(&self, spec: &AgentCardSpec) -> Option<AgentProvider> {
        let organization = spec.metadata.get(PROVIDER_ORGANIZATION_METADATA_KEY)?;
        Some(AgentProvider {
            organization: organization.clone(),
            url: spec.metadata.get(PROVIDER_URL_METADATA_KEY).cloned(),
        })
    }

    fn skills(&self, spec: &AgentCardSpec) -> Vec<AgentSkill> {
        if spec.capabilities.is_empty() {
            return vec![AgentSkill {
                id: "default".to_string(),
                name: "General Purpose".to_string(),
                description: Some("General purpose agent".to_string()),
                tags: Vec::new(),
            }];
        }

        spec.capabilities
            .iter()
            .enumerate()
            .map(|(i, capability)| AgentSkill {
                id: format!("skill-{i}"),
                name: capability.clone(),
                description: None,
                tags: Vec::new(),
            })
            .collect()
    }
}
