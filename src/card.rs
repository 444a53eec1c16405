//! Derivation of agent cards from discovered agents.

pub mod generator;
pub mod hash;
