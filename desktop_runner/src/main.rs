use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use std::{env, fs, process, thread};

use env_logger::{Builder, Env};
use log::{error, info, warn};
use vmem_sim::{ProcessDescriptor, SimConfig, SimulationReport, Simulator};

/// How long to wait for the frontend to signal its documents.
const CONFIG_WAIT: Duration = Duration::from_secs(60);

/// How long one simulation run may take before the watchdog gives up.
const SIMULATION_DEADLINE: Duration = Duration::from_secs(60);

const ENVIRONMENT_FILE: &str = "environment.json";
const PROCESSES_FILE: &str = "processes.json";
const READY_FLAG: &str = "ready.flag";
const RESULTS_FILE: &str = "simulation_results.json";

fn main() {
    Builder::from_env(Env::default())
        .filter_level(log::LevelFilter::Info)
        .format_module_path(false)
        .init();

    let code = match run() {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(reason) => {
            error!("{}", reason);
            1
        }
    };
    process::exit(code);
}

fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let dir = binary_dir();
    info!("waiting for {} in {}", READY_FLAG, dir.display());

    if !wait_for_ready_flag(&dir.join(READY_FLAG), CONFIG_WAIT) {
        warn!("no configuration arrived within {:?}", CONFIG_WAIT);
        write_report(&dir, &SimulationReport::timed_out())?;
        return Ok(false);
    }
    fs::remove_file(dir.join(READY_FLAG))?;

    let environment = fs::read_to_string(dir.join(ENVIRONMENT_FILE))?;
    let processes = fs::read_to_string(dir.join(PROCESSES_FILE))?;
    let config = SimConfig::from_json(&environment)?;
    let descriptors = ProcessDescriptor::list_from_json(&processes)?;

    let mut simulator = Simulator::new(config);
    simulator.set_processes(descriptors);

    let report = run_with_watchdog(simulator, SIMULATION_DEADLINE);
    let completed = matches!(report, SimulationReport::Completed(_));
    write_report(&dir, &report)?;
    info!("results written to {}", dir.join(RESULTS_FILE).display());
    Ok(completed)
}

/// Directory next to the binary; the handshake files live there.
fn binary_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn wait_for_ready_flag(flag: &Path, deadline: Duration) -> bool {
    let started = Instant::now();
    while started.elapsed() < deadline {
        if flag.exists() {
            return true;
        }
        thread::sleep(Duration::from_millis(100));
    }
    false
}

/// Drives the run on a worker so the deadline stays enforceable. When
/// the watchdog fires, the worker is abandoned and its state discarded.
fn run_with_watchdog(mut simulator: Simulator, deadline: Duration) -> SimulationReport {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let report = simulator.run();
        simulator.log_page_tables();
        let _ = sender.send(report);
    });

    match receiver.recv_timeout(deadline) {
        Ok(report) => report,
        Err(_) => {
            warn!("simulation exceeded {:?}", deadline);
            SimulationReport::timed_out()
        }
    }
}

fn write_report(
    dir: &Path,
    report: &SimulationReport,
) -> Result<(), Box<dyn std::error::Error>> {
    fs::write(
        dir.join(RESULTS_FILE),
        serde_json::to_string_pretty(report)?,
    )?;
    Ok(())
}
