//! Layered configuration: built-in defaults < config file < CLI flags.
//!
//! The original collaborator stores its configuration as flat
//! `key = value` lines (`config.c`'s `add_config_value`), not YAML or TOML,
//! so the file loader here matches that grammar rather than reaching for a
//! generic layered-config crate that would assume a structured format.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::units::{parse_duration, parse_memory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Standalone,
    Cluster,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Standalone => write!(f, "STANDALONE"),
            Mode::Cluster => write!(f, "CLUSTER"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Information,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listener {
    Tcp { addr: String, port: u16 },
    Unix { path: PathBuf },
}

/// The daemon's fully merged configuration (§6 configuration keys).
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: LogLevel,
    pub log_path: Option<PathBuf>,
    pub listener: Listener,
    pub max_memory: u64,
    pub mem_reclaim_time: Duration,
    pub max_request_size: u64,
    pub tcp_backlog: i32,
    pub mode: Mode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Information,
            log_path: None,
            listener: Listener::Tcp {
                addr: "127.0.0.1".to_string(),
                port: 9090,
            },
            max_memory: 2 * 1024 * 1024 * 1024,
            mem_reclaim_time: Duration::from_secs(60 * 60),
            max_request_size: 2 * 1024 * 1024,
            tcp_backlog: 128,
            mode: Mode::Standalone,
        }
    }
}

impl Config {
    /// Parses the original's flat `key = value`, `#`-comment config grammar.
    pub fn from_file(path: &Path) -> Result<HashMap<String, String>, std::io::Error> {
        let contents = fs::read_to_string(path)?;
        let mut values = HashMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                values.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Ok(values)
    }

    /// Merges config-file key/value pairs onto defaults. CLI flags are
    /// applied afterwards by the caller (`tritedb-server::args`), so CLI
    /// always wins, matching the teacher's `Args::merge_config` ordering.
    pub fn merge_file_values(mut self, values: &HashMap<String, String>) -> Self {
        if let Some(v) = values.get("log_level") {
            self.log_level = match v.to_ascii_uppercase().as_str() {
                "DEBUG" => LogLevel::Debug,
                "WARNING" => LogLevel::Warning,
                "ERROR" => LogLevel::Error,
                _ => LogLevel::Information,
            };
        }
        if let Some(v) = values.get("log_path") {
            self.log_path = Some(PathBuf::from(v));
        }
        if let Some(v) = values.get("unix_socket") {
            self.listener = Listener::Unix {
                path: PathBuf::from(v),
            };
        } else if let Some(v) = values.get("ip_address") {
            let port = match &self.listener {
                Listener::Tcp { port, .. } => *port,
                Listener::Unix { .. } => 9090,
            };
            self.listener = Listener::Tcp {
                addr: v.clone(),
                port,
            };
        }
        if let Some(v) = values.get("ip_port") {
            if let Ok(port) = v.parse::<u16>() {
                if let Listener::Tcp { addr, .. } = &self.listener {
                    self.listener = Listener::Tcp {
                        addr: addr.clone(),
                        port,
                    };
                }
            }
        }
        if let Some(v) = values.get("max_memory") {
            if let Ok(bytes) = parse_memory(v) {
                self.max_memory = bytes;
            }
        }
        if let Some(v) = values.get("mem_reclaim_time") {
            if let Ok(d) = parse_duration(v) {
                self.mem_reclaim_time = d;
            }
        }
        if let Some(v) = values.get("max_request_size") {
            if let Ok(bytes) = parse_memory(v) {
                self.max_request_size = bytes;
            }
        }
        if let Some(v) = values.get("tcp_backlog") {
            if let Ok(n) = v.parse() {
                self.tcp_backlog = n;
            }
        }
        if let Some(v) = values.get("mode") {
            self.mode = match v.to_ascii_uppercase().as_str() {
                "CLUSTER" => Mode::Cluster,
                _ => Mode::Standalone,
            };
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_flat_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tritedb.conf");
        std::fs::write(
            &path,
            "# a comment\nlog_level = DEBUG\nip_port = 7070\nmax_memory = 2mb\n",
        )
        .unwrap();
        let values = Config::from_file(&path).unwrap();
        let cfg = Config::default().merge_file_values(&values);
        assert_eq!(cfg.log_level, LogLevel::Debug);
        assert_eq!(cfg.max_memory, 2 * 1024 * 1024);
        match cfg.listener {
            Listener::Tcp { port, .. } => assert_eq!(port, 7070),
            _ => panic!("expected tcp listener"),
        }
    }

    #[test]
    fn unix_socket_overrides_tcp() {
        let mut values = HashMap::new();
        values.insert("unix_socket".to_string(), "/tmp/tritedb.sock".to_string());
        let cfg = Config::default().merge_file_values(&values);
        assert_eq!(
            cfg.listener,
            Listener::Unix {
                path: PathBuf::from("/tmp/tritedb.sock")
            }
        );
    }
}
