//! CLI flags (§6, SPEC_FULL §10.4), merged onto the config-file layer the
//! way the teacher's `Args::merge_config(Config) -> Config` does.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tritedb_common::config::{Config, Listener, LogLevel, Mode};

#[derive(Parser, Debug)]
#[command(name = "tritedbd", about = "The tritedb key-value server")]
pub struct Args {
    #[arg(short = 'a', long = "addr", value_name = "HOST")]
    pub addr: Option<String>,

    #[arg(short = 'p', long = "port", value_name = "PORT")]
    pub port: Option<u16>,

    #[arg(long = "unix-socket", value_name = "PATH")]
    pub unix_socket: Option<PathBuf>,

    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    #[arg(short = 'm', long = "mode", value_enum)]
    pub mode: Option<CliMode>,

    #[arg(short = 'v', long = "debug", help = "Enable debug logging")]
    pub debug: bool,

    /// Cluster-join stub (§1 Non-goals): `tritedbd join HOST PORT`.
    #[arg(value_name = "join", num_args = 0..=2)]
    pub join: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliMode {
    Standalone,
    Cluster,
}

impl From<CliMode> for Mode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Standalone => Mode::Standalone,
            CliMode::Cluster => Mode::Cluster,
        }
    }
}

impl Args {
    /// CLI flags win over whatever the config file (and defaults) set,
    /// matching `DatabaseArgs::merge_config`'s "only override what was
    /// actually passed" shape.
    pub fn merge_config(&self, mut config: Config) -> Config {
        if let Some(path) = self.unix_socket.as_ref() {
            config.listener = Listener::Unix { path: path.clone() };
        } else if self.addr.is_some() || self.port.is_some() {
            let (default_addr, default_port) = match &config.listener {
                Listener::Tcp { addr, port } => (addr.clone(), *port),
                Listener::Unix { .. } => ("127.0.0.1".to_string(), 9090),
            };
            config.listener = Listener::Tcp {
                addr: self.addr.clone().unwrap_or(default_addr),
                port: self.port.unwrap_or(default_port),
            };
        }
        if let Some(mode) = self.mode {
            config.mode = mode.into();
        }
        if self.debug {
            config.log_level = LogLevel::Debug;
        }
        config
    }

    /// Parses the optional `join HOST PORT` positional pair (§10.4).
    pub fn join_target(&self) -> Option<(String, u16)> {
        match self.join.as_slice() {
            [host, port] => port.parse().ok().map(|p| (host.clone(), p)),
            _ => None,
        }
    }
}
