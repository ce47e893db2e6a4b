//! alti-cli - Image Project Import Client
//!
//! Entry point for the CLI application.

use alti_cli::cancel::CancelToken;
use alti_cli::config::{
    CheckConfig, CheckTarget, CliArgs, Command, ExportConfig, ExportTarget, ImportTarget,
    ListTarget, RemoteConfig, UploadConfig,
};
use alti_cli::digest::ImageDigester;
use alti_cli::error::{ExportError, UploadError};
use alti_cli::export::ImageExporter;
use alti_cli::pool::effective_workers;
use alti_cli::progress::{
    item_line, print_check_summary, print_export_summary, print_header, print_import_summary,
    print_session, ProgressReporter,
};
use alti_cli::remote::{HttpRemote, RemoteService, UploadKind};
use alti_cli::report::CheckReport;
use alti_cli::upload::check;
use alti_cli::upload::{ImportSummary, Uploader};
use alti_cli::walker::walk_files;
use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status after an interrupt
const EXIT_INTERRUPTED: u8 = 130;

/// Time allowed to wind down after the first Ctrl+C
const GRACE_PERIOD: Duration = Duration::from_secs(3);

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    match &args.command {
        Command::Check(CheckTarget::Image(check)) => {
            let config = CheckConfig::from_args(check, args.verbose, args.quiet)
                .context("Invalid configuration")?;
            run_check(config)
        }
        Command::Import(target) => {
            let config = match target {
                ImportTarget::Image(a) => UploadConfig::for_images(a, args.verbose),
                ImportTarget::Meta(a) => UploadConfig::for_file(UploadKind::Meta, a, args.verbose),
                ImportTarget::Model(a) => UploadConfig::for_file(UploadKind::Model, a, args.verbose),
            }
            .context("Invalid configuration")?;
            let remote = connect(&args)?;
            if config.kind == UploadKind::Image {
                run_import_images(remote, config, args.quiet)
            } else {
                run_import_file(remote, config, args.quiet)
            }
        }
        Command::List(ListTarget::Buckets) => run_list_buckets(connect(&args)?),
        Command::Export(ExportTarget::Image(export)) => {
            let config = ExportConfig::from_args(export).context("Invalid configuration")?;
            run_export_images(connect(&args)?, config, args.quiet)
        }
    }
}

fn connect(args: &CliArgs) -> Result<Arc<dyn RemoteService>> {
    let config = RemoteConfig::from_args(args).context("Invalid configuration")?;
    let remote = HttpRemote::new(&config).context("Failed to create API client")?;
    debug!(endpoint = %config.endpoint, "API client ready");
    Ok(Arc::new(remote))
}

/// Install the Ctrl+C handler. The first interrupt runs `on_cancel` and
/// leaves the command `GRACE_PERIOD` to wind down; a second one exits at once.
fn install_interrupt<F>(on_cancel: F) -> Result<()>
where
    F: Fn() + Send + 'static,
{
    let hits = AtomicUsize::new(0);
    ctrlc::set_handler(move || {
        if hits.fetch_add(1, Ordering::SeqCst) > 0 {
            eprintln!("\nForced exit");
            std::process::exit(i32::from(EXIT_INTERRUPTED));
        }
        eprintln!("\nInterrupt received, shutting down...");
        on_cancel();
        let _ = thread::Builder::new().name("grace".into()).spawn(|| {
            thread::sleep(GRACE_PERIOD);
            eprintln!("Shutdown took too long, exiting");
            std::process::exit(i32::from(EXIT_INTERRUPTED));
        });
    })
    .context("Failed to set signal handler")
}

/// Digest every file under the directory and print the report
fn run_check(config: CheckConfig) -> Result<ExitCode> {
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        install_interrupt(move || {
            cancel.cancel();
        })?;
    }

    if config.show_progress {
        print_header(
            "check image",
            &config.dir.display().to_string(),
            effective_workers(config.workers),
        );
    }

    let start = Instant::now();
    let walk = walk_files(&config.dir, config.skip.clone(), &cancel);
    let pool = ImageDigester::new()
        .run(walk.paths.clone(), config.workers, &cancel)
        .context("Failed to start digest workers")?;
    info!(workers = pool.workers(), "Digesting images");

    let progress = config.show_progress.then(ProgressReporter::new);
    let mut report = CheckReport::new(pool.workers());

    for result in pool.results().iter() {
        if let Some(e) = &result.error {
            if config.verbose {
                warn!("{}", e);
            }
        } else {
            debug!(path = %result.path.display(), checksum = %result.checksum, "Image ok");
        }
        report.record(result);
        if let Some(ref p) = progress {
            p.update_check(&report);
        }
    }

    pool.join().context("Digest worker failed")?;
    let walked = walk.wait();

    if let Some(ref p) = progress {
        if cancel.is_cancelled() {
            p.finish("Check interrupted");
        } else {
            p.finish_and_clear();
        }
    }

    walked.context("Failed to walk directory")?;
    print_check_summary(&report, start.elapsed(), config.table);

    if cancel.is_cancelled() {
        info!("Check was interrupted before completion");
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    }
    Ok(ExitCode::SUCCESS)
}

/// Import one meta or model file
fn run_import_file(remote: Arc<dyn RemoteService>, config: UploadConfig, quiet: bool) -> Result<ExitCode> {
    let kind = config.kind;
    if !quiet {
        print_header(&format!("import {}", kind), &config.source.display().to_string(), 0);
    }

    let uploader = Uploader::new(remote, config);
    let canceller = uploader.canceller();
    install_interrupt(move || {
        canceller.cancel();
    })?;

    let progress = (!quiet).then(ProgressReporter::new);
    if let Some(ref p) = progress {
        p.set_status(&format!("Importing {}...", kind));
    }

    let result = uploader.run();

    if let Some(ref p) = progress {
        p.finish_and_clear();
    }
    if let (false, Some(session)) = (quiet, uploader.session()) {
        print_session(&session);
    }

    match result {
        Ok(item) => {
            println!("  {}", item_line(&item));
            info!(item = %item.item_id, "{} imported", kind);
            Ok(ExitCode::SUCCESS)
        }
        Err(UploadError::Cancelled) => {
            eprintln!("Import aborted by user");
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
        Err(e) => {
            debug!(stage = %uploader.stage(), "Import failed");
            Err(anyhow::Error::new(e).context(format!("Failed to import {}", kind)))
        }
    }
}

/// Import every image under a directory
fn run_import_images(remote: Arc<dyn RemoteService>, config: UploadConfig, quiet: bool) -> Result<ExitCode> {
    let verbose = config.verbose;
    if !quiet {
        print_header(
            "import image",
            &config.source.display().to_string(),
            effective_workers(config.workers),
        );
    }

    let uploader = Uploader::new(remote, config);
    let canceller = uploader.canceller();
    install_interrupt(move || {
        canceller.cancel();
    })?;

    let progress = (!quiet).then(ProgressReporter::new);
    if let Some(ref p) = progress {
        p.set_status("Checking preconditions...");
    }

    let mut live = ImportSummary::default();
    let result = uploader.run_images(|item| {
        live.record(item);
        if let Some(ref p) = progress {
            p.update_import(&live);
            if verbose {
                p.println(&item_line(item));
            }
        }
    });

    if let Some(ref p) = progress {
        p.finish_and_clear();
    }

    let summary = match result {
        Ok(summary) => summary,
        Err(UploadError::Cancelled) => {
            eprintln!("Import aborted by user");
            return Ok(ExitCode::from(EXIT_INTERRUPTED));
        }
        Err(e) => return Err(anyhow::Error::new(e).context("Failed to import images")),
    };

    if !quiet {
        if let Some(session) = uploader.session() {
            print_session(&session);
        }
    }
    print_import_summary(&summary);

    if summary.cancelled > 0 || uploader.canceller().is_cancelled() {
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    }
    if !summary.is_success() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Write a project's image list to CSV and download ready images
fn run_export_images(remote: Arc<dyn RemoteService>, config: ExportConfig, quiet: bool) -> Result<ExitCode> {
    if !quiet {
        print_header("export image", &config.project_id, 0);
    }

    let exporter = ImageExporter::new(remote).context("Failed to create download client")?;
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        install_interrupt(move || {
            cancel.cancel();
        })?;
    }

    let progress = (!quiet).then(ProgressReporter::new);
    if let Some(ref p) = progress {
        p.set_status("Listing images...");
    }

    let result = exporter.run(&config, &cancel, |summary| {
        if let Some(ref p) = progress {
            p.update_export(summary);
        }
    });

    if let Some(ref p) = progress {
        p.finish_and_clear();
    }

    let summary = match result {
        Ok(summary) => summary,
        Err(ExportError::Cancelled) => {
            eprintln!("Export aborted by user");
            return Ok(ExitCode::from(EXIT_INTERRUPTED));
        }
        Err(e) => return Err(anyhow::Error::new(e).context("Failed to export images")),
    };

    info!(exported = summary.exported, downloaded = summary.downloaded, "Export finished");
    print_export_summary(&summary, config.download.is_some());
    Ok(ExitCode::SUCCESS)
}

/// Print buckets for every kind and supported cloud
fn run_list_buckets(remote: Arc<dyn RemoteService>) -> Result<ExitCode> {
    check::check(&check::warn_log, vec![check::api_server_lite(&*remote)])
        .context("API server is not available")?;

    println!(
        "{}",
        style(format!("{:<8} {:<8} {:<24} {}", "KIND", "CLOUD", "SUGGESTED", "BUCKETS")).bold()
    );
    for kind in UploadKind::ALL {
        let clouds = remote
            .supported_clouds(kind)
            .with_context(|| format!("Failed to list clouds for {}", kind))?;
        if clouds.is_empty() {
            println!("{:<8} {}", kind.as_str(), style("direct only").dim());
            continue;
        }
        for cloud in clouds {
            let buckets = remote
                .bucket_list(kind, &cloud)
                .with_context(|| format!("Failed to list buckets for {} on {}", kind, cloud))?;
            let suggested = remote
                .suggested_bucket(kind, &cloud)
                .with_context(|| format!("Failed to get suggested bucket for {} on {}", kind, cloud))?;
            println!(
                "{:<8} {:<8} {:<24} {}",
                kind.as_str(),
                cloud,
                suggested,
                buckets.join(", ")
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("alti_cli=debug,warn")
    } else {
        EnvFilter::new("alti_cli=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
