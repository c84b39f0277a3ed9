use std::path::Path;
use std::process::ExitCode;

use scycle_io::IoError;
use scycle_model::{ConfigError, Params};
use scycle_solver::{Coordinator, SCycleError};
use scycle_inp::RawInput;

fn usage() {
    eprintln!("usage:");
    eprintln!("  scycle-cli <input-file>");
    eprintln!("  scycle-cli --help");
    eprintln!();
    eprintln!("examples:");
    eprintln!("  scycle-cli run.in");
}

fn run(path: &Path) -> Result<(), SCycleError> {
    let text = std::fs::read_to_string(path).map_err(|err| SCycleError::Io(IoError::Io(err)))?;
    let raw = RawInput::parse_str(&text, " = ").map_err(ConfigError::Parse)?;
    let params = Params::from_entries(&raw)?;

    tracing::info!(input = %path.display(), "starting earthquake-cycle run");
    let mut coordinator = Coordinator::new(params)?;
    coordinator.run()?;
    tracing::info!(
        curr_time = coordinator.curr_time(),
        step_count = coordinator.step_count(),
        "run complete"
    );
    Ok(())
}

fn exit_code_for(err: &SCycleError) -> u8 {
    match err {
        SCycleError::Config(_) => 1,
        SCycleError::Backend(_) | SCycleError::Invariant(_) | SCycleError::StepSizeCollapse { .. } => 2,
        SCycleError::Io(_) => 3,
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("--help") | Some("-h") => {
            usage();
            ExitCode::SUCCESS
        }
        Some(input) if args.len() == 2 => match run(Path::new(input)) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("scycle-cli: {err}");
                ExitCode::from(exit_code_for(&err))
            }
        },
        _ => {
            usage();
            ExitCode::from(2)
        }
    }
}
