pub mod annotations;
pub mod client;
pub mod error;
pub mod leader;
pub mod reflectors;
