//! Reflex CLI - analyze reaction-time session logs
//!
//! Commands:
//! - analyze: run the full pipeline over one session log and persist the summary
//! - validate: parse-check an event log and report malformed lines

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use reflex::config::ProjectConfig;
use reflex::schema::RawEvent;
use reflex::session;
use reflex::trial::TaskKind;
use reflex::{AnalysisError, REFLEX_VERSION};

/// Reflex - offline analysis for reaction-time experiment sessions
#[derive(Parser)]
#[command(name = "reflex")]
#[command(version = REFLEX_VERSION)]
#[command(about = "Analyze reaction-time session event logs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline over one session log and persist the summary
    Analyze {
        /// Path to the NDJSON event log
        log_path: PathBuf,

        /// Task kind the session was recorded with
        #[arg(long, value_parser = parse_task)]
        task: TaskKind,

        /// Optional configuration file overriding the built-in defaults
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory the per-session summary is written under
        #[arg(long, default_value = "reports")]
        out_dir: PathBuf,

        /// Print the full summary as JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Parse-check an event log and report malformed lines
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output the validation report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_task(s: &str) -> Result<TaskKind, String> {
    s.parse().map_err(|_| {
        format!(
            "unknown task kind '{}', expected one of: {}",
            s,
            TaskKind::ALL.map(|k| k.as_str()).join(", ")
        )
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), ReflexCliError> {
    match cli.command {
        Commands::Analyze {
            log_path,
            task,
            config,
            out_dir,
            json,
        } => cmd_analyze(&log_path, task, config.as_deref(), &out_dir, json),
        Commands::Validate { input, json } => cmd_validate(&input, json),
    }
}

fn cmd_analyze(
    log_path: &Path,
    task: TaskKind,
    config: Option<&Path>,
    out_dir: &Path,
    json: bool,
) -> Result<(), ReflexCliError> {
    let cfg = ProjectConfig::load(config)?;
    let analysis = session::analyze_log(log_path, task, &cfg)?;
    let written = analysis.write_summary(out_dir)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis.summary)?);
    } else {
        println!("summary written to {}", written.display());
        let flags = &analysis.summary.flags;
        println!("attention_scattered: {}", flags.attention_scattered.value);
        println!(
            "aggressive_response_tactic: {}",
            flags.aggressive_response_tactic.value
        );
        println!("many_anticipations: {}", flags.many_anticipations.value);
        println!(
            "post_error_slowing_detected: {}",
            flags.post_error_slowing_detected.value
        );
        println!(
            "fatigue_trend_detected: {}",
            flags.fatigue_trend_detected.value
        );
        println!("conservative_tactic: {}", flags.conservative_tactic.value);
    }

    Ok(())
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), ReflexCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            eprintln!("reading events from terminal; pipe a log or press Ctrl-D to finish");
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let mut total = 0usize;
    let mut errors: Vec<LineError> = Vec::new();
    for (idx, line) in input_data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        total += 1;
        if let Err(e) = serde_json::from_str::<RawEvent>(trimmed) {
            errors.push(LineError {
                line: idx + 1,
                error: e.to_string(),
            });
        }
    }

    let report = ValidationReport {
        total_lines: total,
        valid_lines: total - errors.len(),
        invalid_lines: errors.len(),
        errors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total lines:   {}", report.total_lines);
        println!("Valid lines:   {}", report.valid_lines);
        println!("Invalid lines: {}", report.invalid_lines);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - line {}: {}", err.line, err.error);
            }
        }
    }

    if report.invalid_lines > 0 {
        Err(ReflexCliError::ValidationFailed(report.invalid_lines))
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum ReflexCliError {
    Io(io::Error),
    Analysis(AnalysisError),
    Json(serde_json::Error),
    ValidationFailed(usize),
}

impl From<io::Error> for ReflexCliError {
    fn from(e: io::Error) -> Self {
        ReflexCliError::Io(e)
    }
}

impl From<AnalysisError> for ReflexCliError {
    fn from(e: AnalysisError) -> Self {
        ReflexCliError::Analysis(e)
    }
}

impl From<serde_json::Error> for ReflexCliError {
    fn from(e: serde_json::Error) -> Self {
        ReflexCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<ReflexCliError> for CliError {
    fn from(e: ReflexCliError) -> Self {
        match e {
            ReflexCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            ReflexCliError::Analysis(e) => {
                let hint = match &e {
                    AnalysisError::MalformedEvent { .. } => {
                        "Run 'reflex validate' to list malformed lines"
                    }
                    AnalysisError::ConfigError(_) => {
                        "Check the configuration file path and JSON syntax"
                    }
                    _ => "Ensure the log matches the rt.event.v1 schema",
                };
                CliError {
                    code: "ANALYSIS_ERROR".to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            ReflexCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            ReflexCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} lines failed validation", count),
                hint: Some("Fix the reported lines and retry".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_lines: usize,
    valid_lines: usize,
    invalid_lines: usize,
    errors: Vec<LineError>,
}

#[derive(serde::Serialize)]
struct LineError {
    line: usize,
    error: String,
}
