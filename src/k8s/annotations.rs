use std::collections::BTreeMap;

/// Marks an agent as eligible for registration when set to `"true"`.
pub const REGISTER_TO_REGISTRY_ANNOTATION_KEY: &str = "cardinal.dev/register-to-registry";

/// Overrides eligibility when set to `"true"`, the agent is skipped.
pub const DISCOVERY_DISABLED_ANNOTATION_KEY: &str = "cardinal.dev/discovery-disabled";

/// Comma-separated capability list overriding capability derivation.
pub const CAPABILITIES_ANNOTATION_KEY: &str = "cardinal.dev/capabilities";

/// Endpoint URL overriding endpoint derivation.
pub const A2A_ENDPOINT_ANNOTATION_KEY: &str = "cardinal.dev/a2a-endpoint";

/// Annotations under this prefix contribute `<suffix> -> value` entries to the
/// derived card metadata.
pub const CARD_METADATA_ANNOTATION_PREFIX: &str = "cardinal.dev/card-";

const TRUE_VALUE: &str = "true";

/// The agent asked to be registered.
pub fn registration_requested(annotations: &BTreeMap<String, String>) -> bool {
    annotations
        .get(REGISTER_TO_REGISTRY_ANNOTATION_KEY)
        .is_some_and(|v| v == TRUE_VALUE)
}

/// The agent opted out of discovery, overriding any registration request.
pub fn discovery_disabled(annotations: &BTreeMap<String, String>) -> bool {
    annotations
        .get(DISCOVERY_DISABLED_ANNOTATION_KEY)
        .is_some_and(|v| v == TRUE_VALUE)
}

pub fn capabilities_override(annotations: &BTreeMap<String, String>) -> Option<&String> {
    annotations.get(CAPABILITIES_ANNOTATION_KEY)
}

pub fn endpoint_override(annotations: &BTreeMap<String, String>) -> Option<&String> {
    annotations.get(A2A_ENDPOINT_ANNOTATION_KEY)
}

/// Harvests `card-` prefixed annotations as metadata entries.
pub fn card_metadata(annotations: &BTreeMap<String, String>) -> Vec<(String, String)> {
    annotations
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(CARD_METADATA_ANNOTATION_PREFIX)
                .map(|suffix| (suffix.to_string(), value.clone()))
        })
        .collect()
}
