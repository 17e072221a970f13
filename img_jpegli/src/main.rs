use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::ProgressBar;
use img_jpegli::{
    Analysis, Analyzer, BatchCoordinator, BatchTally, CancelToken, CjpegliEncoder,
    EdgeGuard, ExifToolCopier, FileOutcome, FileReport, OptimizeConfig,
    Pipeline, ReplacementDecision, DEFAULT_ENCODER_TIMEOUT, DEFAULT_EXIFTOOL_TIMEOUT,
    DEFAULT_MIN_REDUCTION_PERCENT,
};
use rayon::prelude::*;
use serde_json::json;
use shared_utils::logging::{init_logging, log_operation_end, LogConfig};
use shared_utils::{
    check_dangerous_directory, collect_inputs, create_progress_bar, format_bytes,
    print_summary_report, resolve_tool, truncate_filename,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Level;

#[derive(Parser)]
#[command(name = "img-jpegli")]
#[command(version, about = "Re-encode JPEG/PNG images with an adaptive jpegli distance", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-encode files in place, keeping only meaningful savings.
    Run {
        #[command(flatten)]
        inputs: InputArgs,

        /// Fixed cjpegli quality (1-100) instead of the adaptive distance.
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100))]
        quality: Option<u8>,

        /// Downscale so the longest side is at most N pixels.
        #[arg(long, value_name = "N")]
        max_size: Option<u32>,

        /// Required size reduction in percent; smaller savings are skipped.
        #[arg(long, default_value_t = DEFAULT_MIN_REDUCTION_PERCENT)]
        min_reduction: f64,

        /// Worker threads (default: CPU count minus one).
        #[arg(short, long)]
        jobs: Option<usize>,

        #[command(flatten)]
        tuning: TuningArgs,

        /// Path to cjpegli (default: search PATH).
        #[arg(long, value_name = "PATH")]
        cjpegli: Option<PathBuf>,

        /// Path to exiftool (default: search PATH).
        #[arg(long, value_name = "PATH")]
        exiftool: Option<PathBuf>,

        /// Seconds before a cjpegli run is killed.
        #[arg(long, default_value_t = DEFAULT_ENCODER_TIMEOUT.as_secs())]
        encoder_timeout: u64,

        /// Seconds before an exiftool run is killed.
        #[arg(long, default_value_t = DEFAULT_EXIFTOOL_TIMEOUT.as_secs())]
        exiftool_timeout: u64,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Print features, score and distance per file without encoding.
    Analyze {
        #[command(flatten)]
        inputs: InputArgs,

        #[command(flatten)]
        tuning: TuningArgs,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Files or directories to process.
    #[arg(value_name = "INPUT", required = true)]
    paths: Vec<PathBuf>,

    /// Descend into subdirectories.
    #[arg(short, long)]
    recursive: bool,
}

#[derive(Args)]
struct TuningArgs {
    /// Do not force the finest distance on sharp, clean images.
    #[arg(long)]
    no_edge_guard: bool,
}

#[derive(Args)]
struct OutputArgs {
    #[arg(short, long, value_enum, default_value = "human")]
    output: OutputFormat,

    #[arg(short, long)]
    verbose: bool,

    /// Directory for the rolling log file (default: system temp dir).
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            inputs,
            quality,
            max_size,
            min_reduction,
            jobs,
            tuning,
            cjpegli,
            exiftool,
            encoder_timeout,
            exiftool_timeout,
            output,
        } => {
            setup_logging(&output);

            let config = OptimizeConfig::new()
                .with_quality(quality)
                .with_max_dimension(max_size)
                .with_min_reduction(min_reduction)
                .with_workers(jobs)
                .with_edge_guard(edge_guard(&tuning))
                .with_timeouts(
                    Duration::from_secs(encoder_timeout),
                    Duration::from_secs(exiftool_timeout),
                );
            config.validate().context("Invalid options")?;

            let files = gather(&inputs)?;

            let cjpegli = resolve_tool("cjpegli", cjpegli.as_deref())?;
            let exiftool = resolve_tool("exiftool", exiftool.as_deref())?;

            if files.is_empty() {
                eprintln!("📂 No JPEG or PNG files found");
                return Ok(ExitCode::SUCCESS);
            }

            run_batch(files, config, cjpegli, exiftool, output.output)
        }

        Commands::Analyze {
            inputs,
            tuning,
            output,
        } => {
            setup_logging(&output);

            let config = OptimizeConfig::new().with_edge_guard(edge_guard(&tuning));
            let files = gather(&inputs)?;
            analyze_files(&files, &config, output.output)
        }
    }
}

fn setup_logging(output: &OutputArgs) {
    let mut config = LogConfig::default();
    if output.verbose {
        config = config.with_level(Level::DEBUG);
    }
    if let Some(dir) = &output.log_dir {
        config = config.with_log_dir(dir);
    }
    if let Err(e) = init_logging("img_jpegli", config) {
        eprintln!("⚠️  Logging disabled: {:#}", e);
    }
}

fn edge_guard(tuning: &TuningArgs) -> Option<EdgeGuard> {
    if tuning.no_edge_guard {
        None
    } else {
        Some(EdgeGuard::default())
    }
}

/// Resolve inputs to a sorted file list. Refuses system directories; missing
/// paths are reported and skipped.
fn gather(inputs: &InputArgs) -> anyhow::Result<Vec<PathBuf>> {
    for path in inputs.paths.iter().filter(|p| p.is_dir()) {
        check_dangerous_directory(path)?;
    }

    let (files, missing) = collect_inputs(&inputs.paths, inputs.recursive);
    for path in &missing {
        eprintln!("⚠️  Input path does not exist: {}", path.display());
    }
    if files.is_empty() && missing.len() == inputs.paths.len() {
        bail!("None of the input paths exist");
    }
    Ok(files)
}

fn run_batch(
    files: Vec<PathBuf>,
    config: OptimizeConfig,
    cjpegli: PathBuf,
    exiftool: PathBuf,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let start = Instant::now();
    let json_mode = format == OutputFormat::Json;

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            eprintln!("\n🛑 Cancelling: finishing in-flight files, originals stay untouched");
            cancel.cancel();
        })
        .context("Failed to install Ctrl-C handler")?;
    }

    let workers = config.workers;
    let pipeline = Pipeline::new(
        config.clone(),
        Arc::new(CjpegliEncoder::new(cjpegli, config.encoder_timeout)),
        Arc::new(ExifToolCopier::new(exiftool, config.exiftool_timeout)),
    );
    let coordinator = BatchCoordinator::new(&pipeline, workers)
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {}", e))?;

    let pb = create_progress_bar(files.len() as u64, "Optimizing", json_mode);
    let (reports, tally) = coordinator.run(&files, &cancel, &pb, |report| {
        if !json_mode {
            emit_report_line(&pb, &report_line(report), &mut std::io::stderr());
        }
    });
    pb.finish_and_clear();

    let elapsed = start.elapsed();
    if json_mode {
        let summaries: Vec<_> = reports.iter().map(FileReport::summary).collect();
        let out = json!({
            "timestamp": chrono::Local::now().to_rfc3339(),
            "duration_secs": elapsed.as_secs_f64(),
            "tally": &tally,
            "files": summaries,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_summary_report(&tally.to_summary_counts(), elapsed, "JPEG Optimization");
    }

    log_operation_end("jpegli batch", elapsed, tally.errored == 0);
    Ok(exit_code(&tally))
}

/// `println` on a hidden bar is a no-op, so non-terminal runs write to
/// `fallback` instead.
fn emit_report_line(pb: &ProgressBar, line: &str, fallback: &mut dyn Write) {
    if pb.is_hidden() {
        let _ = writeln!(fallback, "{}", line);
    } else {
        pb.println(line);
    }
}

fn exit_code(tally: &BatchTally) -> ExitCode {
    if tally.cancelled > 0 {
        ExitCode::from(130)
    } else if tally.errored > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn display_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    truncate_filename(&name, 48)
}

fn report_line(report: &FileReport) -> String {
    let name = display_name(&report.path);
    let setting = report
        .setting
        .map(|s| format!(" [{}]", s))
        .unwrap_or_default();

    match &report.outcome {
        FileOutcome::Cancelled => format!("{} {}", style("🛑").dim(), style(name).dim()),
        FileOutcome::Decided(ReplacementDecision::Replaced {
            original_size,
            new_size,
        }) => {
            let saved = (1.0 - *new_size as f64 / *original_size as f64) * 100.0;
            format!(
                "✅ {} {} → {} ({}){}",
                name,
                format_bytes(*original_size),
                format_bytes(*new_size),
                style(format!("-{:.1}%", saved)).green(),
                style(setting).dim()
            )
        }
        FileOutcome::Decided(ReplacementDecision::SkippedLarger {
            original_size,
            candidate_size,
        }) => format!(
            "⏭️  {} {}{}",
            name,
            style(format!(
                "not smaller ({} → {})",
                format_bytes(*original_size),
                format_bytes(*candidate_size)
            ))
            .yellow(),
            style(setting).dim()
        ),
        FileOutcome::Decided(ReplacementDecision::SkippedAlreadyOptimized {
            original_size,
            candidate_size,
        }) => {
            let saved = (1.0 - *candidate_size as f64 / *original_size as f64) * 100.0;
            format!(
                "⏭️  {} {}{}",
                name,
                style(format!("already optimized (-{:.1}%)", saved)).yellow(),
                style(setting).dim()
            )
        }
        FileOutcome::Decided(ReplacementDecision::Errored(e)) => {
            format!("❌ {} {}", name, style(e).red())
        }
    }
}

fn analyze_files(
    files: &[PathBuf],
    config: &OptimizeConfig,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let analyzer = Analyzer::new(config);
    let results: Vec<(&PathBuf, img_jpegli::Result<Analysis>)> = files
        .par_iter()
        .map(|path| (path, analyzer.analyze(path)))
        .collect();

    let mut failed = 0usize;
    if format == OutputFormat::Json {
        let entries: Vec<serde_json::Value> = results
            .iter()
            .map(|(path, result)| match result {
                Ok(analysis) => serde_json::to_value(analysis),
                Err(e) => {
                    failed += 1;
                    Ok(json!({
                        "path": path,
                        "error_kind": e.kind(),
                        "error": e.to_string(),
                    }))
                }
            })
            .collect::<Result<_, serde_json::Error>>()?;
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for (path, result) in &results {
            match result {
                Ok(a) => println!(
                    "{} {}x{} noise={:.3} texture={:.3} edges={:.3} score={:.3} → distance {}{}",
                    display_name(path),
                    a.width,
                    a.height,
                    a.features.noise,
                    a.features.texture,
                    a.features.edge_density,
                    a.score.value(),
                    style(a.tier).cyan(),
                    if a.edge_guarded { " (edge guard)" } else { "" }
                ),
                Err(e) => {
                    failed += 1;
                    eprintln!("❌ {} {}", display_name(path), style(e).red());
                }
            }
        }
    }

    Ok(if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
