use clap::Parser;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::{path::Path, time::Duration};

pub const ENV_PREFIX: &str = "MPC_IMPUTE";

#[derive(Debug, Parser)]
pub struct Opt {
    /// Optional configuration file (yaml, toml or json).
    #[arg(long)]
    pub config: Option<String>,

    #[arg(long)]
    pub node_id: Option<String>,

    #[arg(long)]
    pub service_address: Option<String>,
}

/// What a scheduler makes of a job where only some nodes succeeded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    #[default]
    RequireAll,
    AllowPartial,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub node_id: String,
    pub ip:      String,
    pub port:    u16,
}

impl PeerConfig {
    /// Address of the peer's task service.
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub environment: String,

    #[serde(default = "default_node_id")]
    pub node_id: String,

    #[serde(default = "default_service_address")]
    pub service_address: String,

    #[serde(default, deserialize_with = "deserialize_json_string")]
    pub peers: Vec<PeerConfig>,

    #[serde(default = "default_session_base_port")]
    pub session_base_port: u16,

    /// Co-locate all three parties on the first peer.
    #[serde(default)]
    pub singleton: bool,

    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,

    #[serde(default)]
    pub dispatch_timeout_secs: Option<u64>,

    #[serde(default)]
    pub dispatch_policy: DispatchPolicy,
}

fn default_node_id() -> String {
    "node0".to_string()
}

fn default_service_address() -> String {
    "0.0.0.0:50050".to_string()
}

fn default_session_base_port() -> u16 {
    12120
}

fn default_output_dir() -> String {
    "data".to_string()
}

fn default_handshake_timeout_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment:            String::new(),
            node_id:                default_node_id(),
            service_address:        default_service_address(),
            peers:                  Vec::new(),
            session_base_port:      default_session_base_port(),
            singleton:              false,
            output_dir:             default_output_dir(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            dispatch_timeout_secs:  None,
            dispatch_policy:        DispatchPolicy::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from an optional file, then from environment
    /// variables `{prefix}__KEY`.
    pub fn load_config(prefix: &str, config_path: Option<&Path>) -> eyre::Result<Config> {
        let mut settings = config::Config::builder();

        if let Some(path) = config_path {
            settings = settings.add_source(config::File::from(path).required(true));
        }

        let settings = settings
            .add_source(
                config::Environment::with_prefix(prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize::<Config>()?;
        Ok(config)
    }

    pub fn overwrite_defaults_with_cli_args(&mut self, opts: Opt) {
        if let Some(node_id) = opts.node_id {
            self.node_id = node_id;
        }

        if let Some(service_address) = opts.service_address {
            self.service_address = service_address;
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn dispatch_timeout(&self) -> Option<Duration> {
        self.dispatch_timeout_secs.map(Duration::from_secs)
    }
}

/// Accepts either a native sequence or a JSON encoded string, the latter being
/// what environment variables carry.
fn deserialize_json_string<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: for<'a> Deserialize<'a>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw<T> {
        Json(String),
        List(Vec<T>),
    }

    match Raw::<T>::deserialize(deserializer)? {
        Raw::Json(s) if s.trim().is_empty() => Ok(Vec::new()),
        Raw::Json(s) => serde_json::from_str(&s).map_err(de::Error::custom),
        Raw::List(v) => Ok(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.session_base_port, 12120);
        assert_eq!(config.output_dir, "data");
        assert_eq!(config.dispatch_policy, DispatchPolicy::RequireAll);
        assert!(config.dispatch_timeout().is_none());
        assert!(!config.singleton);
    }

    #[test]
    fn test_peers_from_json_string() {
        let config: Config = serde_json::from_str(
            r#"{"peers": "[{\"node_id\":\"node0\",\"ip\":\"10.0.0.1\",\"port\":50050}]"}"#,
        )
        .unwrap();
        assert_eq!(config.peers, vec![PeerConfig {
            node_id: "node0".into(),
            ip:      "10.0.0.1".into(),
            port:    50050,
        }]);
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("mpc-impute-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("node.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"node_id": "node2", "singleton": true, "dispatch_policy": "allow_partial",
                "peers": [{{"node_id": "node0", "ip": "127.0.0.1", "port": 1}}]}}"#
        )
        .unwrap();

        let config = Config::load_config("MPC_IMPUTE_TEST_UNUSED", Some(&path)).unwrap();
        assert_eq!(config.node_id, "node2");
        assert!(config.singleton);
        assert_eq!(config.dispatch_policy, DispatchPolicy::AllowPartial);
        assert_eq!(config.peers.len(), 1);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
