//! Looking glass CLI entry point.
//!
//! `lg run` executes one probe and streams its padded output lines to
//! stdout, flushing per line; all logging goes to stderr. `lg check`
//! validates the deployment settings and reports tool availability.

use clap::{Args, Parser, Subcommand, ValueEnum};
use lg_common::{ProbeKind, ProbeRequest};
use lg_config::Settings;
use lg_core::dispatch::{LineSink, ProbeDispatcher};
use lg_core::exit_codes::ExitCode;
use lg_core::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use lg_core::transform::OutputLine;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Looking glass probe engine
#[derive(Parser)]
#[command(name = "lg")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to the settings file
    #[arg(long, global = true, env = "LG_CONFIG", default_value = "lookingglass.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true, env = "LG_LOG")]
    log_level: Option<LogLevel>,

    /// Log format (human, jsonl)
    #[arg(long, global = true, env = "LG_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one probe and stream its output to stdout
    Run(RunArgs),

    /// Validate settings and report probe tool availability
    Check(CheckArgs),

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Target address literal or hostname
    #[arg(long)]
    target: String,

    /// Probe kind
    #[arg(long, value_enum)]
    kind: ProbeKind,

    /// Egress link index
    #[arg(long, default_value_t = 0)]
    link: usize,

    /// Override the consecutive-timeout abort limit
    #[arg(long)]
    fail_threshold: Option<u32>,
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Output format
    #[arg(long, short = 'f', value_enum, default_value_t = ReportFormat::Text)]
    format: ReportFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

fn main() {
    let cli = Cli::parse();
    let log_config = LogConfig::from_env(cli.global.log_level, cli.global.log_format);
    init_logging(&log_config);

    let code = match cli.command {
        Commands::Run(args) => cmd_run(&cli.global, &args),
        Commands::Check(args) => cmd_check(&cli.global, &args),
        Commands::Version => {
            println!("lg {}", env!("CARGO_PKG_VERSION"));
            0
        }
    };
    std::process::exit(code);
}

/// Stdout sink honoring the flush-per-line transport contract.
struct StdoutSink {
    out: std::io::Stdout,
}

impl LineSink for StdoutSink {
    fn deliver(&mut self, line: &OutputLine) -> std::io::Result<()> {
        let mut lock = self.out.lock();
        lock.write_all(line.display.as_bytes())?;
        lock.write_all(b"\n")?;
        lock.flush()
    }
}

fn cmd_run(global: &GlobalOpts, args: &RunArgs) -> i32 {
    let settings = match Settings::load(&global.config) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(&err).code();
        }
    };

    let mut request = ProbeRequest::new(args.target.clone(), args.link, args.kind)
        .with_fail_threshold(settings.fail_threshold);
    if let Some(threshold) = args.fail_threshold {
        request = request.with_fail_threshold(threshold);
    }

    let dispatcher = ProbeDispatcher::new(settings);
    let mut sink = StdoutSink {
        out: std::io::stdout(),
    };
    match dispatcher.run(&request, &mut sink) {
        Ok(status) => ExitCode::from(status).code(),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(&err).code()
        }
    }
}

#[derive(Debug, Serialize)]
struct ToolReport {
    name: String,
    configured: String,
    resolved: Option<PathBuf>,
    available: bool,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    location: String,
    links: Vec<String>,
    allowed: Vec<String>,
    tools: Vec<ToolReport>,
}

fn cmd_check(global: &GlobalOpts, args: &CheckArgs) -> i32 {
    let settings = match Settings::load(&global.config) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(&err).code();
        }
    };

    let tools = [
        ("ping", settings.tools.ping.clone()),
        ("traceroute", settings.tools.traceroute.clone()),
        ("mtr", settings.tools.mtr.clone()),
    ]
    .into_iter()
    .map(|(name, configured)| {
        let resolved = resolve_tool(&configured);
        ToolReport {
            name: name.to_string(),
            available: resolved.is_some(),
            configured,
            resolved,
        }
    })
    .collect::<Vec<_>>();

    let report = CheckReport {
        location: settings.location.clone(),
        links: settings.links.iter().map(|l| l.name.clone()).collect(),
        allowed: settings.allowed.iter().map(|k| k.to_string()).collect(),
        tools,
    };

    match args.format {
        ReportFormat::Json => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::IoError.code();
            }
        },
        ReportFormat::Text => {
            println!("settings: ok ({} links)", report.links.len());
            println!("allowed: {}", report.allowed.join(", "));
            for tool in &report.tools {
                match &tool.resolved {
                    Some(path) => println!("{}: {}", tool.name, path.display()),
                    None => println!("{}: NOT FOUND ({})", tool.name, tool.configured),
                }
            }
        }
    }

    if report.tools.iter().all(|t| t.available) {
        0
    } else {
        ExitCode::ConfigError.code()
    }
}

/// Resolve a configured tool path: absolute/relative paths are checked
/// directly, bare names are searched through PATH.
fn resolve_tool(configured: &str) -> Option<PathBuf> {
    let candidate = Path::new(configured);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(configured))
        .find(|full| is_executable(full))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
