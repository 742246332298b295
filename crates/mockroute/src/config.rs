//! Server configuration
//!
//! [`ServerConfig`] holds the settings that are not tied to a particular
//! route: where to listen, how to dispatch, and how chatty to be. Values can
//! be set in code or read from the environment:
//!
//! | Variable           | Example                 | Default        |
//! |--------------------|-------------------------|----------------|
//! | `MOCKROUTE_ADDR`   | `127.0.0.1:49999`       | `127.0.0.1:0`  |
//! | `MOCKROUTE_POLICY` | `ordered` / `any`       | `any`          |
//! | `MOCKROUTE_DEBUG`  | `trace,headers,body`    | `none`         |

use crate::debug::DebugFlags;
use crate::dispatch::DispatchPolicy;
use crate::error::{MockError, Result};
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};

/// Prefix shared by every configuration variable.
pub const ENV_PREFIX: &str = "MOCKROUTE_";

pub const ADDR_VAR: &str = "MOCKROUTE_ADDR";
pub const POLICY_VAR: &str = "MOCKROUTE_POLICY";
pub const DEBUG_VAR: &str = "MOCKROUTE_DEBUG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind. Port 0 picks a free port.
    pub addr: SocketAddr,
    pub policy: DispatchPolicy,
    pub debug: DebugFlags,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            policy: DispatchPolicy::AnyOrder,
            debug: DebugFlags::NONE,
        }
    }
}

fn config_error(err: envy::Error) -> MockError {
    MockError::Config(format!("invalid {}* environment: {}", ENV_PREFIX, err))
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by any `MOCKROUTE_*` variable that is set.
    pub fn from_env() -> Result<Self> {
        envy::prefixed(ENV_PREFIX)
            .from_env::<Self>()
            .map_err(config_error)
    }

    pub fn addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn debug(mut self, debug: DebugFlags) -> Self {
        self.debug = debug;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig> {
        let vars = vars.iter().map(|(k, v)| (k.to_string(), v.to_string()));
        envy::prefixed(ENV_PREFIX)
            .from_iter::<_, ServerConfig>(vars)
            .map_err(config_error)
    }

    #[test]
    fn defaults_bind_random_local_port() {
        let config = ServerConfig::default();
        assert_eq!(config.addr, "127.0.0.1:0".parse::<SocketAddr>().unwrap());
        assert_eq!(config.policy, DispatchPolicy::AnyOrder);
        assert_eq!(config.debug, DebugFlags::NONE);
    }

    #[test]
    fn unset_variables_keep_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn variables_override_defaults() {
        let config = load(&[
            (ADDR_VAR, "127.0.0.1:49999"),
            (POLICY_VAR, "ordered"),
            (DEBUG_VAR, "trace,body"),
        ])
        .unwrap();

        assert_eq!(config.addr, "127.0.0.1:49999".parse::<SocketAddr>().unwrap());
        assert_eq!(config.policy, DispatchPolicy::Ordered);
        assert_eq!(config.debug, DebugFlags::TRACE | DebugFlags::BODY);
    }

    #[test]
    fn invalid_address_is_config_error() {
        let err = load(&[(ADDR_VAR, "localhost")]).unwrap_err();
        assert!(matches!(err, MockError::Config(ref m) if m.contains(ENV_PREFIX)));
    }

    #[test]
    fn invalid_policy_is_config_error() {
        let err = load(&[(POLICY_VAR, "sometimes")]).unwrap_err();
        assert!(matches!(err, MockError::Config(ref m) if m.contains("sometimes")));
    }

    #[test]
    fn unrelated_variables_are_ignored() {
        let config = load(&[("PATH", "/usr/bin"), ("MOCKROUTE_UNKNOWN", "1")]).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"policy": "ordered", "debug": "headers"}"#).unwrap();

        assert_eq!(config.addr, ServerConfig::default().addr);
        assert_eq!(config.policy, DispatchPolicy::Ordered);
        assert_eq!(config.debug, DebugFlags::HEADERS);
    }
}
