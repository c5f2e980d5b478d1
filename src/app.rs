use std::path::PathBuf;
use std::time::Duration;

use clap::{error::ErrorKind, CommandFactory, Parser};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::time::Instant;

use crate::catalog;
use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::findings::{ArtifactPaths, RunSummary};
use crate::runner::{Options, Runner};

fn print_banner() {
    const BANNER: &str = r#"
              _                 __
  ____ _____ (_)___  _________  / /_  ___
 / __ `/ __ \/ / __ \/ ___/ __ \/ __ \/ _ \
/ /_/ / /_/ / / /_/ / /  / /_/ / /_/ /  __/
\__,_/ .___/_/ .___/_/   \____/_.___/\___/
    /_/     /_/
       v0.3.2 - api discovery and mutation harness
    "#;
    print!("{}", BANNER);
    println!();
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn format_kv_line(label: &str, value: &str) {
    println!(":: {:<10}: {}", label, value);
}

fn expand_artifact(cli: Option<String>, cfg: Option<String>, default: &str) -> PathBuf {
    config::expand_tilde(cli.or(cfg).unwrap_or_else(|| default.to_string()).as_str())
}

fn build_options(args: CliArgs, cfg: ConfigFile) -> Result<Options, String> {
    validation::validate(&args)?;

    let base_url = args
        .url
        .or(cfg.url)
        .ok_or_else(|| "a target URL must be specified (--url or config)".to_string())?
        .trim()
        .trim_end_matches('/')
        .to_string();

    let defaults = Options::default();
    let artifact_defaults = ArtifactPaths::default();

    Ok(Options {
        base_url,
        proxy: args.proxy.or(cfg.proxy),
        endpoints: catalog::default_endpoints(),
        timeout_seconds: args.timeout.or(cfg.timeout).unwrap_or(defaults.timeout_seconds),
        retry_count: args.retries.or(cfg.retries).unwrap_or(defaults.retry_count),
        activation_workers: args
            .activation_workers
            .or(cfg.activation_workers)
            .unwrap_or(defaults.activation_workers),
        generic_workers: args
            .generic_workers
            .or(cfg.generic_workers)
            .unwrap_or(defaults.generic_workers),
        pattern_repetitions: args
            .pattern_repetitions
            .or(cfg.pattern_repetitions)
            .unwrap_or(defaults.pattern_repetitions),
        repetition_delay_ms: args
            .repetition_delay_ms
            .or(cfg.repetition_delay_ms)
            .unwrap_or(defaults.repetition_delay_ms),
        submission_rate: args
            .submission_rate
            .or(cfg.submission_rate)
            .unwrap_or(defaults.submission_rate),
        artifacts: ArtifactPaths {
            interesting: expand_artifact(
                args.interesting_log,
                cfg.interesting_log,
                &artifact_defaults.interesting.to_string_lossy(),
            ),
            activations: expand_artifact(
                args.activations_log,
                cfg.activations_log,
                &artifact_defaults.activations.to_string_lossy(),
            ),
            structures: expand_artifact(
                args.structures_log,
                cfg.structures_log,
                &artifact_defaults.structures.to_string_lossy(),
            ),
        },
    })
}

fn print_report(summary: &RunSummary, options: &Options, elapsed: Duration) {
    println!();
    println!("{}", "=== Probe Results ===".bold());
    format_kv_line("Attempts", &summary.total.to_string());
    format_kv_line(
        "Successes",
        &format!(
            "{} ({:.1}%)",
            summary.successes.to_string().green(),
            summary.hit_rate()
        ),
    );
    format_kv_line("Codes", &summary.accepted_codes.len().to_string());
    for code in summary.accepted_codes.iter() {
        println!("     {}", code.green());
    }
    format_kv_line("Endpoints", &summary.successful_endpoints.len().to_string());
    for endpoint in summary.successful_endpoints.iter() {
        println!("     {}", endpoint.cyan());
    }
    println!();
    format_kv_line(
        "Artifacts",
        &format!(
            "{} {} {}",
            options.artifacts.interesting.display(),
            options.artifacts.activations.display(),
            options.artifacts.structures.display()
        ),
    );
    println!(
        ":: Completed :: probe took {}s ::",
        elapsed.as_secs()
    );
}

async fn run_async(options: Options) -> Result<(), String> {
    print_banner();

    let activation = options
        .endpoints
        .iter()
        .filter(|e| e.kind == catalog::EndpointKind::Activation)
        .count();
    let generic = options.endpoints.len() - activation;
    format_kv_line("Target", &options.base_url);
    format_kv_line(
        "Scan",
        &format!(
            "activation={activation} generic={generic} reps={} patterns={}",
            options.pattern_repetitions,
            catalog::ACTIVATION_PATTERNS.len()
        ),
    );
    format_kv_line(
        "HTTP",
        &format!(
            "timeout={}s retries={} aw={} gw={} rate={}/s proxy={}",
            options.timeout_seconds,
            options.retry_count,
            options.activation_workers,
            options.generic_workers,
            options.submission_rate,
            if options.proxy.is_some() { "on" } else { "off" }
        ),
    );
    println!();

    // activation endpoints run patterns * reps probes each; generic counts
    // are unknowable up front (mutations depend on payload shape), so the
    // bar tracks attempts without a fixed length
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(200));
    pb.set_style(
        ProgressStyle::with_template(
            ":: Probes: [{pos}] :: {per_sec} :: Duration: [{elapsed_precise}] :: {msg}",
        )
        .map_err(|e| format!("failed to build progress bar style: {e}"))?,
    );

    let runner = Runner::new(options).map_err(|e| e.to_string())?;
    let now = Instant::now();
    let summary = runner
        .run_with_progress(pb.clone())
        .await
        .map_err(|e| e.to_string())?;
    pb.finish_and_clear();

    print_report(&summary, runner.options(), now.elapsed());
    Ok(())
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp => {
                let mut cmd = CliArgs::command();
                cmd.print_help().map_err(|e| e.to_string())?;
                return Ok(());
            }
            ErrorKind::DisplayVersion => {
                let cmd = CliArgs::command();
                print!("{}", cmd.render_version());
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };

    init_logging(args.verbose);

    let cfg = match args.config.clone() {
        Some(path) => {
            let path = config::expand_tilde(&path);
            config::load_config(&path, false)?
        }
        None => match config::default_config_path() {
            Some(path) => {
                config::ensure_default_config_file(&path)?;
                config::load_config(&path, true)?
            }
            None => ConfigFile::default(),
        },
    };

    let options = build_options(args, cfg)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(options))?;
    Ok(())
}
