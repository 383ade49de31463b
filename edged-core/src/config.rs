//! Layered configuration: built-in defaults, an optional TOML file, `EDGED_`-prefixed
//! environment variables, then CLI overrides applied last by the caller.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Final, immutable configuration snapshot used for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct EdgedConfig {
    pub content_directory: PathBuf,
    pub content_port: u16,

    pub control_protocol: String,
    pub control_hostname: String,
    pub control_port: u16,

    pub p2p_seed_node_address: String,
    pub p2p_seed_node_port: u16,

    pub override_ip: Option<String>,
    pub disable_auto_join: bool,
    pub disable_heartbeat: bool,
    pub disable_ip_discovery: bool,

    pub log_level: String,
    pub log_pretty: bool,

    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
}

impl EdgedConfig {
    pub fn control_p2p_base(&self) -> String {
        format!(
            "{}://{}:{}/api/p2p",
            self.control_protocol, self.control_hostname, self.control_port
        )
    }

    pub fn control_state_base(&self) -> String {
        format!(
            "{}://{}:{}/api",
            self.control_protocol, self.control_hostname, self.control_port
        )
    }
}

/// Raw configuration as it appears in an `edged.toml` file. Every field is optional; absent
/// fields fall through to environment variables, then to [`defaults`].
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub content: FileContentConfig,
    #[serde(default)]
    pub p2p: FileP2pConfig,
    #[serde(default)]
    pub edged: FileEdgedConfig,
    #[serde(default)]
    pub log: FileLogConfig,
    #[serde(default)]
    pub tls: FileTlsConfig,
    pub override_ip: Option<String>,
    pub disable_auto_join: Option<bool>,
    pub disable_heartbeat: Option<bool>,
    pub disable_ip_discovery: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileContentConfig {
    pub directory: Option<PathBuf>,
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileP2pConfig {
    pub seed_node_address: Option<String>,
    pub seed_node_port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileEdgedConfig {
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileLogConfig {
    pub level: Option<String>,
    pub pretty: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileTlsConfig {
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
}

/// Command-line overrides, applied after the file/environment layers. A `clap::Parser`-derived
/// struct, with an `env` fallback on each flag.
#[derive(Debug, Parser)]
#[command(name = "edged", about = "Peer-assisted CDN edge content node")]
pub struct Args {
    /// Path to an edged.toml configuration file.
    #[arg(long, env = "EDGED_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    #[arg(long, env = "EDGED_CONTENT_DIRECTORY")]
    pub content_directory: Option<PathBuf>,

    #[arg(long, env = "EDGED_CONTENT_PORT")]
    pub content_port: Option<u16>,

    #[arg(long, env = "EDGED_EDGED_HOSTNAME")]
    pub control_hostname: Option<String>,

    #[arg(long, env = "EDGED_EDGED_PORT")]
    pub control_port: Option<u16>,

    #[arg(long, env = "EDGED_EDGED_PROTOCOL")]
    pub control_protocol: Option<String>,

    #[arg(long, env = "EDGED_P2P_SEED_NODE_ADDRESS")]
    pub p2p_seed_node_address: Option<String>,

    #[arg(long, env = "EDGED_P2P_SEED_NODE_PORT")]
    pub p2p_seed_node_port: Option<u16>,

    #[arg(long, env = "EDGED_OVERRIDE_IP")]
    pub override_ip: Option<String>,

    #[arg(long, env = "EDGED_DISABLE_AUTO_JOIN")]
    pub disable_auto_join: bool,

    #[arg(long, env = "EDGED_DISABLE_HEARTBEAT")]
    pub disable_heartbeat: bool,

    #[arg(long, env = "EDGED_DISABLE_IP_DISCOVERY")]
    pub disable_ip_discovery: bool,

    #[arg(long, env = "EDGED_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, env = "EDGED_LOG_PRETTY")]
    pub log_pretty: bool,

    #[arg(long = "tls-cert", env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<PathBuf>,

    #[arg(long = "tls-key", env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<PathBuf>,
}

/// Defaults matching the original `gladius-edged` config package exactly: a localhost
/// development control daemon, an IANA-reserved seed node address, info-level logging.
fn defaults() -> FileConfig {
    FileConfig {
        content: FileContentConfig {
            directory: Some(PathBuf::from("content")),
            port: Some(8080),
        },
        p2p: FileP2pConfig {
            seed_node_address: Some("165.227.16.209".to_string()),
            seed_node_port: Some(7947),
        },
        edged: FileEdgedConfig {
            hostname: Some("localhost".to_string()),
            port: Some(3001),
            protocol: Some("http".to_string()),
        },
        log: FileLogConfig {
            level: Some("info".to_string()),
            pretty: Some(false),
        },
        tls: FileTlsConfig::default(),
        override_ip: Some(String::new()),
        disable_auto_join: Some(false),
        disable_heartbeat: Some(false),
        disable_ip_discovery: Some(false),
    }
}

/// Environment-variable overlay, gathered by hand rather than through the `config` crate's
/// automatic `Environment` source splitting: several of our keys (`seed_node_address`,
/// `disable_auto_join`, ...) contain underscores of their own, which the separator-based
/// nested-key inference can't tell apart from structural nesting.
#[derive(Debug, Default)]
struct EnvConfig {
    content_directory: Option<PathBuf>,
    content_port: Option<u16>,
    control_hostname: Option<String>,
    control_port: Option<u16>,
    control_protocol: Option<String>,
    p2p_seed_node_address: Option<String>,
    p2p_seed_node_port: Option<u16>,
    override_ip: Option<String>,
    disable_auto_join: Option<bool>,
    disable_heartbeat: Option<bool>,
    disable_ip_discovery: Option<bool>,
    log_level: Option<String>,
    log_pretty: Option<bool>,
    tls_cert_path: Option<PathBuf>,
    tls_key_path: Option<PathBuf>,
}

impl EnvConfig {
    fn gather() -> Self {
        Self {
            content_directory: env_path("EDGED_CONTENT_DIRECTORY"),
            content_port: env_parsed("EDGED_CONTENT_PORT"),
            control_hostname: env_string("EDGED_EDGED_HOSTNAME"),
            control_port: env_parsed("EDGED_EDGED_PORT"),
            control_protocol: env_string("EDGED_EDGED_PROTOCOL"),
            p2p_seed_node_address: env_string("EDGED_P2P_SEED_NODE_ADDRESS"),
            p2p_seed_node_port: env_parsed("EDGED_P2P_SEED_NODE_PORT"),
            override_ip: env_string("EDGED_OVERRIDE_IP"),
            disable_auto_join: env_parsed("EDGED_DISABLE_AUTO_JOIN"),
            disable_heartbeat: env_parsed("EDGED_DISABLE_HEARTBEAT"),
            disable_ip_discovery: env_parsed("EDGED_DISABLE_IP_DISCOVERY"),
            log_level: env_string("EDGED_LOG_LEVEL"),
            log_pretty: env_parsed("EDGED_LOG_PRETTY"),
            tls_cert_path: env_path("TLS_CERT_PATH"),
            tls_key_path: env_path("TLS_KEY_PATH"),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().map(PathBuf::from)
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Builds the final configuration by layering defaults, an optional TOML file, `EDGED_`
/// prefixed environment variables, and finally CLI flags (highest precedence).
pub fn load(args: &Args) -> Result<EdgedConfig, ConfigError> {
    let mut builder =
        config::Config::builder().add_source(config::Config::try_from(&defaults())?);

    if let Some(path) = &args.config_file {
        builder = builder.add_source(config::File::from(path.as_path()));
    } else {
        builder = builder.add_source(config::File::with_name("edged").required(false));
    }

    let file: FileConfig = builder.build()?.try_deserialize()?;
    let env = EnvConfig::gather();

    let content_directory = args
        .content_directory
        .clone()
        .or(env.content_directory)
        .or(file.content.directory)
        .ok_or(ConfigError::MissingContentDirectory)?;

    Ok(EdgedConfig {
        content_directory,
        content_port: args
            .content_port
            .or(env.content_port)
            .or(file.content.port)
            .unwrap_or(8080),
        control_protocol: args
            .control_protocol
            .clone()
            .or(env.control_protocol)
            .or(file.edged.protocol)
            .unwrap_or_else(|| "http".to_string()),
        control_hostname: args
            .control_hostname
            .clone()
            .or(env.control_hostname)
            .or(file.edged.hostname)
            .unwrap_or_else(|| "localhost".to_string()),
        control_port: args
            .control_port
            .or(env.control_port)
            .or(file.edged.port)
            .unwrap_or(3001),
        p2p_seed_node_address: args
            .p2p_seed_node_address
            .clone()
            .or(env.p2p_seed_node_address)
            .or(file.p2p.seed_node_address)
            .unwrap_or_else(|| "165.227.16.209".to_string()),
        p2p_seed_node_port: args
            .p2p_seed_node_port
            .or(env.p2p_seed_node_port)
            .or(file.p2p.seed_node_port)
            .unwrap_or(7947),
        override_ip: args
            .override_ip
            .clone()
            .or(env.override_ip)
            .or(file.override_ip)
            .filter(|s| !s.is_empty()),
        disable_auto_join: args.disable_auto_join
            || env.disable_auto_join.unwrap_or(false)
            || file.disable_auto_join.unwrap_or(false),
        disable_heartbeat: args.disable_heartbeat
            || env.disable_heartbeat.unwrap_or(false)
            || file.disable_heartbeat.unwrap_or(false),
        disable_ip_discovery: args.disable_ip_discovery
            || env.disable_ip_discovery.unwrap_or(false)
            || file.disable_ip_discovery.unwrap_or(false),
        log_level: args
            .log_level
            .clone()
            .or(env.log_level)
            .or(file.log.level)
            .unwrap_or_else(|| "info".to_string()),
        log_pretty: args.log_pretty || env.log_pretty.unwrap_or(false) || file.log.pretty.unwrap_or(false),
        tls_cert_path: args.tls_cert_path.clone().or(env.tls_cert_path).or(file.tls.cert_path),
        tls_key_path: args.tls_key_path.clone().or(env.tls_key_path).or(file.tls.key_path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_args() -> Args {
        Args {
            config_file: None,
            content_directory: Some(PathBuf::from("/tmp/edged-content")),
            content_port: None,
            control_hostname: None,
            control_port: None,
            control_protocol: None,
            p2p_seed_node_address: None,
            p2p_seed_node_port: None,
            override_ip: None,
            disable_auto_join: false,
            disable_heartbeat: false,
            disable_ip_discovery: false,
            log_level: None,
            log_pretty: false,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }

    #[test]
    fn defaults_fill_in_when_nothing_else_is_set() {
        let args = bare_args();
        let cfg = load(&args).expect("config should build from defaults");
        assert_eq!(cfg.content_port, 8080);
        assert_eq!(cfg.p2p_seed_node_address, "165.227.16.209");
        assert_eq!(cfg.control_p2p_base(), "http://localhost:3001/api/p2p");
        assert!(cfg.override_ip.is_none());
    }

    #[test]
    fn cli_flags_take_highest_precedence() {
        let mut args = bare_args();
        args.content_port = Some(9999);
        args.disable_heartbeat = true;
        let cfg = load(&args).expect("config should build");
        assert_eq!(cfg.content_port, 9999);
        assert!(cfg.disable_heartbeat);
    }
}
