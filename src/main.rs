#[macro_use]
extern crate log;
extern crate simplelog;

use rand::Rng;

use pin_cracker::attack::scenario::Scenario;
use pin_cracker::attack::{self, scenario};
use pin_cracker::crypto::weak_key;
use pin_cracker::crypto::PinError;
use pin_cracker::report;

// process exit statuses
const EXIT_FOUND: i32 = 0;
const EXIT_NOT_FOUND: i32 = 1;
const EXIT_ERROR: i32 = 2;

const DUKPT_TERMINAL: &str = "TERM-001";
const DUKPT_TRANSACTIONS: usize = 5;

fn main() {
    let level = std::env::var("LOG_LEVEL").ok()
        .and_then(|l| l.parse::<simplelog::LevelFilter>().ok())
        .unwrap_or(simplelog::LevelFilter::Info);
    let _ = simplelog::SimpleLogger::init(level, simplelog::Config::default());

    let outcome = run();
    if let Err(e) = &outcome {
        error!("attack aborted: {}", e);
        println!("  error: {}", e);
    }
    std::process::exit(exit_code(&outcome));
}

/// Maps the outcome of a run to the process exit status
fn exit_code(outcome: &Result<bool, PinError>) -> i32 {
    match outcome {
        Ok(true) => EXIT_FOUND,
        Ok(false) => EXIT_NOT_FOUND,
        Err(_) => EXIT_ERROR,
    }
}

fn run() -> Result<bool, PinError> {
    let lab = match std::env::var("SCENARIO_FILE") {
        Ok(scenario_file) => {
            info!("loading scenario from {}", scenario_file);
            scenario::read_scenario(&scenario_file)?
        }
        Err(_) => scenario::scenario(scenario::DEFAULT_SCENARIO)?.clone(),
    };
    let workers = std::env::var("SEARCH_WORKERS").ok()
        .and_then(|w| w.parse::<usize>().ok())
        .unwrap_or(1);

    info!("running scenario {}", lab.name);
    report::print_banner();

    let config = lab.attack_config()?;
    report::print_capture(&config.pin_block_hex, &lab.pan, &lab.key);
    report::print_search_start(config.max_pin.min(attack::MAX_PIN));

    let result = attack::search_parallel(&config, workers)?;
    report::print_result(&result);

    report::print_key_report(&weak_key::analyze_key(&lab.key)?);
    report::print_lesson();

    show_fix(&lab)?;

    Ok(result.found())
}

/// Replays the attack against captures from a DUKPT terminal holding a freshly drawn BDK
fn show_fix(lab: &Scenario) -> Result<(), PinError> {
    let bdk: [u8; 16] = rand::thread_rng().gen();

    report::print_fix_header(DUKPT_TERMINAL);
    let captures = lab.simulate_dukpt_captures(&bdk, DUKPT_TERMINAL, DUKPT_TRANSACTIONS)?;
    captures.iter().for_each(report::print_dukpt_transaction);

    match captures.last() {
        Some(last) => {
            let replay = attack::search(&lab.replay_config(&last.pin_block))?;
            report::print_fix_result(&replay);
        }
        None => warn!("no DUKPT transactions were simulated"),
    }
    Ok(())
}
