//! `tritedbd`: parses CLI flags and the config file, merges them onto the
//! built-in defaults (§6), brings up the shared `Engine`, and runs the
//! reactor until SIGTERM/SIGINT.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use eyre::{eyre, Report};
use mimalloc::MiMalloc;
use tracing::{info, warn};

use tritedb_common::config::Config;
use tritedb_server::args::Args;
use tritedb_server::{reactor, Engine};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let args = Args::parse();

    let config = load_config(&args)?;

    let _log_guard = tritedb_common::logging::init(config.log_level, config.log_path.as_deref());

    let (phys_cores, logical_cores) = (
        gdt_cpus::num_physical_cores().unwrap_or(1),
        gdt_cpus::num_logical_cores().unwrap_or(1),
    );
    info!(
        version = tritedb_common::build::PKG_VERSION,
        phys_cores, logical_cores, "tritedbd starting"
    );

    if let Some((host, port)) = args.join_target() {
        // §1 Non-goals: cluster join is a stub, no networking attempted.
        warn!(host, port, "cluster join is not implemented, ignoring");
    }

    let io_threads = logical_cores.clamp(1, 8);
    let worker_threads = logical_cores.clamp(1, 16);

    let engine = Arc::new(Engine::new(config));
    let kill_switch = Arc::new(AtomicBool::new(false));

    signal_hook::flag::register(signal_hook::consts::SIGTERM, kill_switch.clone())?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, kill_switch.clone())?;

    if let Err(e) = reactor::run(engine, kill_switch, io_threads, worker_threads) {
        return Err(eyre!("reactor failed: {e}"));
    }

    info!("tritedbd stopped");
    Ok(())
}

fn load_config(args: &Args) -> Result<Config, Report> {
    let mut config = Config::default();
    if let Some(path) = args.config_file.as_ref() {
        let values = Config::from_file(path).map_err(|e| eyre!("failed to read config file {path:?}: {e}"))?;
        config = config.merge_file_values(&values);
    }
    Ok(args.merge_config(config))
}
