//! `xm` — run and validate x-machine simulation models.
//!
//! Exit codes are one-per-failure-kind so scripted pipelines can tell a
//! schema error from a missing file from an uncastable value:
//!
//! | Code | Meaning                                   |
//! |------|-------------------------------------------|
//! | 0    | success                                   |
//! | 64   | command-line usage error                  |
//! | 65   | model parse or validation error           |
//! | 66   | population file missing                   |
//! | 67   | population schema (malformed document)    |
//! | 68   | population names an undeclared agent      |
//! | 69   | population names an undeclared variable   |
//! | 70   | population value fails its declared cast  |
//! | 74   | output I/O error                          |
//! | 1    | runtime error during iteration            |

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use xm_core::PopReadError;
use xm_exec::ExecError;
use xm_io::{OutputFormat, make_sink, parse_model_file, reader_for_path};
use xm_sim::{NoopObserver, SimConfig, SimError, Simulation};

#[derive(Parser)]
#[command(name = "xm", version, about = "x-machine agent-simulation runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a model against a population for a number of iterations.
    Run {
        /// Model file (xmodel version 2).
        model: PathBuf,
        /// Initial population file (format chosen by extension).
        population: PathBuf,
        /// Iterations to execute.
        iterations: u64,
        /// Snapshot format written after each iteration.
        #[arg(long, default_value = "xml")]
        output_format: OutputFormat,
        /// Snapshot directory; defaults to the population file's directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Worker threads for agent tasks; defaults to the core count.
        #[arg(long)]
        slots: Option<usize>,
        /// Substitute no-op bodies for unregistered transition functions.
        #[arg(long)]
        allow_stub_functions: bool,
    },
    /// Parse and validate a model file without running it.
    Validate {
        /// Model file (xmodel version 2).
        model: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(64);
        }
    };

    let code = match cli.command {
        Command::Run {
            model,
            population,
            iterations,
            output_format,
            output_dir,
            slots,
            allow_stub_functions,
        } => run(
            &model,
            &population,
            iterations,
            output_format,
            output_dir,
            slots,
            allow_stub_functions,
        ),
        Command::Validate { model } => validate(&model),
    };
    ExitCode::from(code)
}

fn validate(model_path: &Path) -> u8 {
    let model = match parse_model_file(model_path) {
        Ok(model) => model,
        Err(e) => {
            eprintln!("error: {e}");
            return 65;
        }
    };
    match xm_model::validate_model(&model) {
        Ok(()) => {
            println!(
                "model {:?} is valid: {} agent(s), {} message(s)",
                model.name,
                model.agents.len(),
                model.messages.len()
            );
            0
        }
        Err(e) => {
            for line in e.to_string().lines() {
                eprintln!("error: {line}");
            }
            65
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run(
    model_path: &Path,
    pop_path: &Path,
    iterations: u64,
    output_format: OutputFormat,
    output_dir: Option<PathBuf>,
    slots: Option<usize>,
    allow_stub_functions: bool,
) -> u8 {
    let model = match parse_model_file(model_path) {
        Ok(model) => model,
        Err(e) => {
            eprintln!("error: {e}");
            return 65;
        }
    };

    let mut sim = match Simulation::new(model) {
        Ok(sim) => sim,
        Err(e) => return report(&e),
    };
    sim.allow_stub_functions(allow_stub_functions);

    let mut reader = reader_for_path(pop_path, sim.schema());
    let itno = match sim.load_population(&mut *reader, pop_path) {
        Ok(itno) => itno,
        Err(e) => return report(&e),
    };
    tracing::info!(itno, "population loaded");

    let out_dir = output_dir.unwrap_or_else(|| {
        pop_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    });
    sim.set_output(make_sink(output_format, &out_dir, ""));

    let mut config = SimConfig::default();
    if let Some(slots) = slots {
        config.slots = slots;
    }
    if let Err(e) = sim.compile(config) {
        return report(&e);
    }
    if let Err(e) = sim.run(iterations, &mut NoopObserver) {
        return report(&e);
    }
    println!("completed {iterations} iteration(s)");
    0
}

fn report(error: &SimError) -> u8 {
    for line in error.to_string().lines() {
        eprintln!("error: {line}");
    }
    exit_code(error)
}

fn exit_code(error: &SimError) -> u8 {
    match error {
        SimError::Model(_) => 65,
        SimError::Population(p) => match p {
            PopReadError::MissingFile { .. } => 66,
            PopReadError::Malformed { .. } => 67,
            PopReadError::UnknownAgent { .. } => 68,
            PopReadError::UnknownVariable { .. } => 69,
            PopReadError::BadCast { .. } => 70,
            PopReadError::Io(_) => 74,
        },
        SimError::Exec(ExecError::Sink(_)) => 74,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use xm_core::{PopReadError, ScalarType};
    use xm_model::ModelError;
    use xm_sim::SimError;

    use super::exit_code;

    #[test]
    fn population_error_kinds_map_to_distinct_codes() {
        let cases = [
            (
                PopReadError::MissingFile {
                    path: "p.xml".into(),
                },
                66,
            ),
            (
                PopReadError::Malformed {
                    path: "p.xml".into(),
                    element_path: "states".into(),
                    detail: "broken".into(),
                },
                67,
            ),
            (
                PopReadError::UnknownAgent {
                    element_path: "states/xagent[1]/name".into(),
                    agent: "Square".into(),
                },
                68,
            ),
            (
                PopReadError::UnknownVariable {
                    element_path: "states/xagent[1]/ghost".into(),
                    agent: "Circle".into(),
                    var: "ghost".into(),
                },
                69,
            ),
            (
                PopReadError::BadCast {
                    element_path: "states/xagent[1]/x_int".into(),
                    value: "abc".into(),
                    expected: ScalarType::Int,
                },
                70,
            ),
        ];
        let mut seen = std::collections::BTreeSet::new();
        for (error, expected) in cases {
            let code = exit_code(&SimError::Population(error));
            assert_eq!(code, expected);
            assert!(seen.insert(code), "exit code {code} reused");
        }
    }

    #[test]
    fn model_errors_map_to_65() {
        let err = SimError::Model(ModelError::Validation("bad".into()));
        assert_eq!(exit_code(&err), 65);
    }
}
