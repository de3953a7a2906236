extern crate atty;
#[macro_use]
extern crate clap;
extern crate env_logger;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;
extern crate num_cpus;
extern crate tokio_core;

extern crate sleet;

use std::path::{Path, PathBuf};
use std::process::exit;
use std::rc::Rc;

use clap::{App, Arg};

use sleet::common::{Config, Resources};
use sleet::scheduler::StateRef;
use sleet::table::memory::{MemoryObjectTable, MemoryTaskTable};
use sleet::Result;

const DEFAULT_SCHEDULER_SOCKET: &str = "/tmp/sleet-scheduler.sock";
const DEFAULT_REDIS_ADDRESS: &str = "127.0.0.1:6379";

fn default_log_directory() -> PathBuf {
    PathBuf::from("/tmp/sleet-logs").join(format!("scheduler-{}", ::std::process::id()))
}

fn ensure_directory(dir: &Path, name: &str) -> Result<()> {
    if !dir.exists() {
        debug!("{} not found, creating ... {:?}", name, dir);
        if let Err(e) = ::std::fs::create_dir_all(dir) {
            bail!("{} {:?} cannot be created: {}", name, dir, e);
        }
    } else if !dir.is_dir() {
        bail!("{} {:?} exists but it is not a directory", name, dir);
    }
    Ok(())
}

fn detect_cpus() -> f64 {
    debug!("Detecting number of cpus");
    let cpus = num_cpus::get();
    if cpus < 1 {
        error!("Autodetection of CPUs failed. Use --cpus with a positive argument.");
        exit(1);
    }
    cpus as f64
}

fn init_log() {
    // Simple logger with per-module control, default level is INFO
    if ::std::env::var("RUST_LOG").is_err() {
        ::std::env::set_var("RUST_LOG", "info");
    }
    if ::atty::is(::atty::Stream::Stdout) {
        ::env_logger::Builder::new()
            .format(|buf, record| {
                use env_logger::fmt::Color;
                use log::Level;
                use std::io::Write;

                let ts = buf.timestamp();
                let level = record.level();
                let mut level_style = buf.style();

                match level {
                    Level::Trace => level_style.set_color(Color::White),
                    Level::Debug => level_style.set_color(Color::Blue),
                    Level::Info => level_style.set_color(Color::Green),
                    Level::Warn => level_style.set_color(Color::Yellow),
                    Level::Error => level_style.set_color(Color::Red).set_bold(true),
                };
                writeln!(
                    buf,
                    "{:>5} {} {}",
                    level_style.value(level),
                    ts,
                    record.args()
                )
            })
            .parse(&::std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
            .init();
    } else {
        ::env_logger::init();
    }
}

fn main() {
    init_log();

    let args = App::new("sleet")
        .version(sleet::VERSION)
        .about("Per-node local task scheduler")
        .arg(
            Arg::with_name("SCHEDULER_SOCKET")
                .long("--socket")
                .value_name("PATH")
                .help("Unix socket for worker IPC (default /tmp/sleet-scheduler.sock)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("STORE_SOCKET")
                .long("--store-socket")
                .value_name("PATH")
                .help("Unix socket of the local object store")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("MANAGER_SOCKET")
                .long("--manager-socket")
                .value_name("PATH")
                .help("Unix socket of the local object manager")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("NODE_IP")
                .long("--node-ip")
                .value_name("ADDRESS")
                .help("Address of this node as seen by the cluster (default 127.0.0.1)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("REDIS_ADDRESS")
                .long("--redis-address")
                .value_name("ADDRESS")
                .help("Address of the global state store (default 127.0.0.1:6379)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("WORKER_COMMAND")
                .long("--worker-command")
                .value_name("COMMAND")
                .help("Command used to spawn worker processes")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("NUM_WORKERS")
                .long("--num-workers")
                .value_name("N")
                .help("Number of workers started with the scheduler (default 0)")
                .default_value("0"),
        )
        .arg(
            Arg::with_name("CPUS")
                .long("--cpus")
                .value_name("N")
                .help("CPU capacity announced to workers, or 'detect' (default = detect)")
                .default_value("detect"),
        )
        .arg(
            Arg::with_name("GPUS")
                .long("--gpus")
                .value_name("N")
                .help("GPU capacity announced to workers (default 0)")
                .default_value("0"),
        )
        .arg(
            Arg::with_name("LOG_DIR")
                .long("--logdir")
                .help("Logging directory (default /tmp/sleet-logs/scheduler-$PID)")
                .takes_value(true),
        )
        .get_matches();

    let cpus = if args.value_of("CPUS") != Some("detect") {
        let value = value_t_or_exit!(args, "CPUS", f64);
        if value < 0.0 {
            error!("--cpus must not be negative");
            exit(1);
        }
        value
    } else {
        detect_cpus()
    };
    let gpus = value_t_or_exit!(args, "GPUS", f64);

    let worker_command: Vec<String> = args
        .value_of("WORKER_COMMAND")
        .map(|command| command.split(' ').map(|part| part.to_string()).collect())
        .unwrap_or_else(Vec::new);
    let num_initial_workers = value_t_or_exit!(args, "NUM_WORKERS", u32);
    if num_initial_workers > 0 && worker_command.is_empty() {
        error!("--num-workers requires --worker-command");
        exit(1);
    }

    let log_dir = args
        .value_of("LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(default_log_directory);
    ensure_directory(&log_dir, "logging directory").unwrap_or_else(|e| {
        error!("{}", e);
        exit(1);
    });

    let debug_checks = ::std::env::var("SLEET_DEBUG_MODE")
        .map(|s| s == "1")
        .unwrap_or(false);

    let config = Config {
        node_ip: args.value_of("NODE_IP").unwrap_or("127.0.0.1").to_string(),
        redis_address: args
            .value_of("REDIS_ADDRESS")
            .unwrap_or(DEFAULT_REDIS_ADDRESS)
            .to_string(),
        store_socket: args.value_of("STORE_SOCKET").unwrap().into(),
        manager_socket: args.value_of("MANAGER_SOCKET").unwrap().into(),
        scheduler_socket: args
            .value_of("SCHEDULER_SOCKET")
            .unwrap_or(DEFAULT_SCHEDULER_SOCKET)
            .into(),
        worker_command,
        num_initial_workers,
        resources: Resources::new(cpus, gpus),
        log_dir,
        debug_checks,
    };

    info!("Starting sleet {} scheduler", sleet::VERSION);
    info!("Resources: {}", config.resources);
    info!("Log directory: {:?}", config.log_dir);
    if config.debug_checks {
        info!("DEBUG mode enabled, consistency is checked every turn");
    }

    let mut core = tokio_core::reactor::Core::new().unwrap();
    let state = StateRef::new(
        core.handle(),
        config,
        Rc::new(MemoryTaskTable::new()),
        Rc::new(MemoryObjectTable::new()),
    );

    if let Err(error) = state.start() {
        error!("{}", error);
        exit(1);
    }

    loop {
        core.turn(None);
        state.turn();
    }
}
