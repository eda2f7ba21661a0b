use anyhow::{Context, Result};
use clap::Parser;
use depstrace::cli::{Cli, OutputFormat};
use depstrace::config::{absolutize, ConfigFile, ParserConfig, DEFAULT_OUTFILE};
use depstrace::report::{write_text, JsonReport};
use depstrace::{tracer, DepsParser, TraceOutcome};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Initialize the stderr log subscriber; RUST_LOG directives win over -v/-q
fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// CLI flags merged over the config file merged over defaults
struct Settings {
    parser: ParserConfig,
    outfile: PathBuf,
    format: OutputFormat,
}

fn resolve_settings(args: &Cli, traced: bool) -> Result<Settings> {
    let file = match &args.config {
        Some(path) => ConfigFile::from_file(path)?,
        None => ConfigFile::default(),
    };
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;

    let build_root = args
        .build_dir
        .as_ref()
        .or(file.build_dir.as_ref())
        .map(|dir| absolutize(dir, &cwd))
        .unwrap_or_else(|| cwd.clone());

    // A live trace starts where we run; a replayed log is assumed to start in the build root
    let initial_cwd = match &file.initial_cwd {
        Some(dir) => absolutize(dir, &cwd),
        None if traced => cwd.clone(),
        None => build_root.clone(),
    };

    let mut parser = ParserConfig::new(&build_root)
        .with_initial_cwd(&initial_cwd)
        .with_strict(args.strict || file.strict.unwrap_or(false));
    if let Some(tool) = args.tool.as_ref().or(file.tool.as_ref()) {
        parser = parser.with_tool(tool.clone());
    }
    parser.validate()?;

    Ok(Settings {
        parser,
        outfile: args
            .outfile
            .clone()
            .or(file.outfile)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTFILE)),
        format: args.format.or(file.format).unwrap_or_default(),
    })
}

/// Write the report to `outfile`, or stdout for "-"
fn write_report(outcome: &TraceOutcome, outfile: &Path, format: OutputFormat) -> Result<()> {
    let mut out: Box<dyn Write> = if outfile == Path::new("-") {
        Box::new(io::stdout().lock())
    } else {
        let file = File::create(outfile)
            .with_context(|| format!("Failed to create {}", outfile.display()))?;
        Box::new(BufWriter::new(file))
    };

    match format {
        OutputFormat::Text => write_text(&mut out, &outcome.rules)?,
        OutputFormat::Json => {
            let report = JsonReport::new(outcome.root_pid, &outcome.rules, &outcome.diagnostics);
            writeln!(out, "{}", report.to_json()?)?;
        }
    }
    out.flush()
        .with_context(|| format!("Failed to write {}", outfile.display()))?;

    if outfile != Path::new("-") {
        tracing::info!(
            "Wrote {} rule records to {}",
            outcome.rules.len(),
            outfile.display()
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose, args.quiet);

    match (&args.from_tracefile, &args.command) {
        (Some(_), Some(_)) => {
            anyhow::bail!("Cannot specify both -r FILE and command. Choose one.");
        }
        (None, None) => {
            anyhow::bail!(
                "Must specify either -r FILE or command. Usage: depstrace -r FILE or depstrace -- COMMAND [ARGS...]"
            );
        }
        (None, Some(command)) if command.is_empty() => {
            anyhow::bail!("Command array is empty");
        }
        _ => {}
    }

    let settings = resolve_settings(&args, args.command.is_some())?;
    tracing::debug!(
        "build root {}, tool {}",
        settings.parser.build_root.display(),
        settings.parser.tool_name
    );

    let (outcome, status) = match (&args.from_tracefile, &args.command) {
        (Some(tracefile), _) => {
            let outcome = DepsParser::new(settings.parser)?
                .parse_path(tracefile)
                .with_context(|| format!("Failed to process {}", tracefile.display()))?;
            (outcome, None)
        }
        (None, Some(command)) => {
            let run = tracer::trace_command(command, settings.parser, args.save_trace.as_deref())?;
            (run.outcome, Some(run.status))
        }
        (None, None) => unreachable!("checked above"),
    };

    outcome.diagnostics.log_summary();
    write_report(&outcome, &settings.outfile, settings.format)?;

    if let Some(status) = status {
        if !status.success() {
            tracing::error!("traced command failed: {}", status);
            std::process::exit(status.code().unwrap_or(1));
        }
    }

    Ok(())
}
