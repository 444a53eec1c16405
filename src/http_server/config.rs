use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

const DEFAULT_PORT: u16 = 8083;
pub(super) const DEFAULT_WORKERS: usize = 2;
const DEFAULT_HOST: &str = "0.0.0.0";

#[derive(PartialEq, Deserialize, Serialize, Debug, Clone)]
pub struct Port(u16);
#[derive(PartialEq, Deserialize, Serialize, Debug, Clone)]
pub struct Host(String);

#[derive(PartialEq, Deserialize, Serialize, Clone, Debug)]
pub struct ServerConfig {
    #[serde(default)]
    pub port: Port,
    #[serde(default)]
    pub host: Host,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: Port::default(),
            host: Host::default(),
            enabled: default_enabled(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

impl Default for Port {
    fn default() -> Self {
        Port(DEFAULT_PORT)
    }
}

impl From<Port> for u16 {
    fn from(value: Port) -> Self {
        value.0
    }
}

impl Default for Host {
    fn default() -> Self {
        Host(String::from(DEFAULT_HOST))
    }
}

impl Display for Port {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for Host {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
