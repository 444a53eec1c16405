//! The registry reconciliation control loop.

pub mod discovery;
pub mod reconciler;
pub mod run;
pub mod status;

/// Field-ownership identifier under which every card and status write is
/// performed. Other managers touching the same objects keep their fields.
pub const FIELD_MANAGER: &str = "cardinal-agentregistry";
