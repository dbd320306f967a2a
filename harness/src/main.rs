use std::path::{Path, PathBuf};

use structopt::StructOpt;
use threepc::storage::{Directory, Memory};

mod scenario;

use crate::scenario::{Execution, Scenario};

#[derive(StructOpt)]
#[structopt(name = "harness")]
struct Opt {
    /// JSON execution file; replaces the single-run flags below
    #[structopt(short = "f", long = "file")]
    file: Option<PathBuf>,

    /// Number of participants
    #[structopt(short = "c", long = "count", default_value = "3")]
    count: usize,

    /// Receive timeout (in milliseconds)
    #[structopt(short = "t", long = "timeout", default_value = "1000")]
    timeout: u64,

    /// Probability that the coordinator crashes in INIT
    #[structopt(long = "crash-init", default_value = "0")]
    crash_init: f64,

    /// Probability that the coordinator crashes in WAIT
    #[structopt(long = "crash-wait", default_value = "0")]
    crash_wait: f64,

    /// Probability that the coordinator crashes in PRECOMMIT
    #[structopt(long = "crash-precommit", default_value = "0")]
    crash_precommit: f64,

    /// Probability that a participant's local work fails
    #[structopt(long = "failure-rate", default_value = "0")]
    failure_rate: f64,

    /// Join index of a participant whose local work fails
    #[structopt(long = "fail")]
    fail: Vec<usize>,

    /// Seed for reproducible runs
    #[structopt(long = "seed")]
    seed: Option<u64>,

    /// Write stable logs under this directory instead of keeping them in memory
    #[structopt(long = "log-dir")]
    log_dir: Option<PathBuf>,

    /// Logging verbosity (-v, -vv, -vvv)
    #[structopt(short = "v", parse(from_occurrences))]
    verbose: u64,
}

impl Opt {
    fn scenario(&self) -> Scenario {
        Scenario {
            name: "command line".to_string(),
            participants: self.count,
            timeout_ms: self.timeout,
            faults: threepc::FaultInjection::none()
                .crash_in_init(self.crash_init)
                .crash_in_wait(self.crash_wait)
                .crash_in_precommit(self.crash_precommit),
            failure_rate: self.failure_rate,
            failing: self.fail.clone(),
            seed: self.seed,
        }
    }
}

fn setup_logger(verbose: u64) -> Result<(), fern::InitError> {
    let level = match verbose {
    | 0 => log::LevelFilter::Warn,
    | 1 => log::LevelFilter::Info,
    | 2 => log::LevelFilter::Debug,
    | _ => log::LevelFilter::Trace,
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}] {}",
                record.level(),
                record.target(),
                message,
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

async fn execute(scenario: &Scenario, log_dir: Option<&Path>) -> Result<threepc::Report, threepc::Error> {
    let config = scenario.config();
    match log_dir {
    | Some(root) => {
        let name = scenario.name.replace(' ', "-");
        config.run(Directory::new(root.join(name))?).await
    }
    | None => config.run(Memory::new()).await,
    }
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();

    if let Err(error) = setup_logger(opt.verbose) {
        eprintln!("[ERROR]: could not install logger: {}", error);
    }

    let execution = match &opt.file {
    | Some(path) => match Execution::load(path) {
        | Ok(execution) => execution,
        | Err(error) => {
            eprintln!("[ERROR]: {}", error);
            std::process::exit(2)
        }
    },
    | None => Execution(vec![opt.scenario()]),
    };

    let mut failed = false;
    for scenario in &execution.0 {
        println!("Executing scenario {:?}", scenario.name);
        match execute(scenario, opt.log_dir.as_deref()).await {
        | Ok(report) => {
            print!("{}", report);
            match report.decision() {
            | Some(decision) => println!("Decision: {}", decision),
            | None => {
                println!("Participants disagree");
                failed = true;
            }
            }
            failed |= report.has_errors();
        }
        | Err(error) => {
            eprintln!("[ERROR]: {}", error);
            failed = true;
        }
        }
    }

    if failed {
        std::process::exit(1)
    }
}
