//! fwcarve - firmware model segment extraction and rebuild tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{theme::ColorfulTheme, Confirm};
use fwcarve_core::{CoreError, LocatorConfig};
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use fwcarve_app::{
    extract, file_size, inspect, rebuild, status, ExtractOutcome, Integrity, RebuildOutcome,
    Settings, Workspace,
};

#[derive(Parser, Debug)]
#[command(name = "fwcarve")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base directory the firmware, side file and output paths are relative to
    #[arg(short = 'C', long, default_value = ".", global = true)]
    dir: PathBuf,

    /// JSON settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    firmware: Option<PathBuf>,

    /// Payload side file
    #[arg(long, global = true)]
    payload: Option<PathBuf>,

    /// Rebuilt image output
    #[arg(long, global = true)]
    rebuilt: Option<PathBuf>,

    #[arg(long, global = true)]
    window_size: Option<usize>,

    #[arg(long, global = true)]
    density_threshold: Option<f64>,

    #[arg(long, global = true)]
    min_run_size: Option<u64>,

    /// Answer yes to every prompt
    #[arg(short = 'y', long, default_value_t = false, global = true)]
    yes: bool,

    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract, optionally rebuild, then show status
    Pipeline,
    /// Locate the model segment and save it to the side file
    Extract,
    /// Re-embed the side file into a new firmware image
    Rebuild,
    /// Show which files exist and whether they are consistent
    Status,
    /// Read the marker block of a rebuilt image
    Inspect {
        image: PathBuf,

        /// Write the embedded payload here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let cancel = Arc::new(AtomicBool::new(false));
    let c = Arc::clone(&cancel);
    // First Ctrl+C cancels the running step, a second one exits.
    ctrlc::set_handler(move || {
        if c.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
    })
    .context("Failed to set Ctrl+C handler")?;

    let settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let (ws, locator) = resolve(&args, &settings);
    locator.validate().context("Invalid locator settings")?;

    match &args.command {
        None | Some(Command::Pipeline) => run_pipeline(&ws, &locator, &cancel, args.yes),
        Some(Command::Extract) => run_extract(&ws, &locator, &cancel).map(|_| ()),
        Some(Command::Rebuild) => run_rebuild(&ws, &cancel).map(|_| ()),
        Some(Command::Status) => run_status(&ws, &cancel),
        Some(Command::Inspect { image, output }) => run_inspect(image, output.as_deref()),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve(args: &Args, settings: &Settings) -> (Workspace, LocatorConfig) {
    let mut paths = settings.paths.clone();
    if let Some(p) = &args.firmware {
        paths.firmware = p.clone();
    }
    if let Some(p) = &args.payload {
        paths.payload = p.clone();
    }
    if let Some(p) = &args.rebuilt {
        paths.rebuilt = p.clone();
    }

    let mut locator = LocatorConfig::from(&settings.locator);
    if let Some(v) = args.window_size {
        locator.window_size = v;
    }
    if let Some(v) = args.density_threshold {
        locator.density_threshold = v;
    }
    if let Some(v) = args.min_run_size {
        locator.min_run_size = v;
    }

    (Workspace::resolve(&args.dir, &paths), locator)
}

fn run_pipeline(
    ws: &Workspace,
    locator: &LocatorConfig,
    cancel: &AtomicBool,
    skip_confirm: bool,
) -> Result<()> {
    println!("🚀 fwcarve pipeline");
    println!("{}", "=".repeat(50));
    println!("📁 Firmware: {}", ws.firmware.display());
    println!();

    match run_extract(ws, locator, cancel)? {
        ExtractOutcome::FirmwareMissing => return Ok(()),
        ExtractOutcome::AlreadyExtracted { .. } | ExtractOutcome::Extracted(_) => {}
    }

    println!();
    let confirmed = skip_confirm
        || Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Rebuild firmware with the extracted payload?")
            .default(true)
            .interact()
            .context("Failed to confirm")?;
    if cancel.load(Ordering::SeqCst) {
        anyhow::bail!(CoreError::Cancelled);
    }

    if confirmed {
        run_rebuild(ws, cancel)?;
    } else {
        println!("⏭️  Skipping firmware rebuild");
    }

    run_status(ws, cancel)
}

fn run_extract(
    ws: &Workspace,
    locator: &LocatorConfig,
    cancel: &AtomicBool,
) -> Result<ExtractOutcome> {
    println!("🔍 Extraction");
    println!("{}", "-".repeat(30));

    let total = file_size(&ws.firmware)?.unwrap_or(0);
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")?
            .progress_chars("##-"),
    );

    let result = extract(ws, locator, Some(cancel), |w| {
        pb.set_position(w.offset + w.len as u64);
    });
    pb.finish_and_clear();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) if matches!(e.downcast_ref::<CoreError>(), Some(CoreError::Cancelled)) => {
            println!("🛑 Scan cancelled, nothing was written");
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    match &outcome {
        ExtractOutcome::FirmwareMissing => {
            println!("❌ Firmware not found: {}", ws.firmware.display());
            println!("Place the firmware file there or pass --firmware");
        }
        ExtractOutcome::AlreadyExtracted { size } => {
            println!("✅ Payload already extracted: {}", format_size(*size, BINARY));
        }
        ExtractOutcome::Extracted(report) => {
            let segment = report.detection.segment();
            println!(
                "📊 Firmware size: {}",
                format_size(report.firmware_size, BINARY)
            );
            if report.detection.is_confident() {
                println!("🎯 Dense segment found");
            } else {
                println!("⚠️  No dense segment reached the minimum size");
                println!("   Using the middle-half fallback (low confidence)");
            }
            println!("   Start offset: 0x{:08X}", segment.offset);
            println!("   Size:         {}", format_size(segment.length, BINARY));
            println!("   SHA-256:      {}", report.manifest.sha256_hash);
            println!("💾 Saved to: {}", ws.payload.display());
        }
    }
    Ok(outcome)
}

fn run_rebuild(ws: &Workspace, cancel: &AtomicBool) -> Result<RebuildOutcome> {
    println!("🔧 Rebuild");
    println!("{}", "-".repeat(30));

    let outcome = match rebuild(ws, Some(cancel)) {
        Ok(outcome) => outcome,
        Err(e) if matches!(e.downcast_ref::<CoreError>(), Some(CoreError::Cancelled)) => {
            println!("🛑 Rebuild cancelled, {} was not changed", ws.rebuilt.display());
            return Err(e);
        }
        Err(e) => return Err(e),
    };
    match outcome {
        RebuildOutcome::FirmwareMissing => {
            println!("❌ Firmware not found: {}", ws.firmware.display());
        }
        RebuildOutcome::PayloadMissing => {
            println!("❌ Payload not found, run extraction first");
        }
        RebuildOutcome::Rebuilt {
            original_size,
            payload_size,
            rebuilt_size,
        } => {
            println!("📊 Original firmware: {}", format_size(original_size, BINARY));
            println!("📊 Payload:           {}", format_size(payload_size, BINARY));
            println!("✅ Firmware rebuilt:  {}", format_size(rebuilt_size, BINARY));
            println!("💾 Saved to: {}", ws.rebuilt.display());
        }
    }
    Ok(outcome)
}

fn run_status(ws: &Workspace, cancel: &AtomicBool) -> Result<()> {
    let st = status(ws, Some(cancel))?;

    println!();
    println!("╔════════════════════════════════════════╗");
    println!("║            === Status ===              ║");
    println!("╠════════════════════════════════════════╣");
    println!("║ Firmware:           {:>18} ║", presence(st.firmware_size));
    println!("║ Payload:            {:>18} ║", presence(st.payload_size));
    let integrity = match &st.payload_integrity {
        Integrity::Unknown => "unverified",
        Integrity::Verified => "sha256 ok",
        Integrity::Mismatch { .. } => "sha256 MISMATCH",
    };
    println!("║ Payload integrity:  {:>18} ║", integrity);
    if let Some(m) = &st.manifest {
        println!("║ Detection:          {:>18} ║", m.detection);
        println!("║ Source offset:      {:>18} ║", m.source_offset);
    }
    println!("║ Rebuilt image:      {:>18} ║", presence(st.rebuilt_size));
    match &st.embedded {
        Some(Ok(marker)) => println!(
            "║ Embedded payload:   {:>18} ║",
            format_size(marker.payload_len, BINARY)
        ),
        Some(Err(_)) => println!("║ Embedded payload:   {:>18} ║", "marker invalid"),
        None => {}
    }
    println!("╚════════════════════════════════════════╝");

    if let Integrity::Mismatch { expected, actual } = &st.payload_integrity {
        println!("⚠️  Side file changed since extraction");
        println!("   expected {expected}");
        println!("   actual   {actual}");
    }
    if let Some(Err(e)) = &st.embedded {
        println!("⚠️  {}: {e}", ws.rebuilt.display());
    }
    Ok(())
}

fn run_inspect(image: &Path, output: Option<&Path>) -> Result<()> {
    let report = inspect(image, output)?;

    println!("📦 {}", image.display());
    println!("   Image size:     {}", format_size(report.image_size, BINARY));
    println!("   Original size:  {}", format_size(report.original_size, BINARY));
    println!("   Marker offset:  0x{:08X}", report.marker.offset);
    println!(
        "   Payload:        {} ({} bytes)",
        format_size(report.marker.payload_len, BINARY),
        report.marker.payload_len
    );
    println!("   SHA-256:        {}", report.payload_sha256);
    if let Some(path) = &report.written_to {
        println!("💾 Payload saved to: {}", path.display());
    }
    Ok(())
}

fn presence(size: Option<u64>) -> String {
    match size {
        Some(s) => format!("✅ {}", format_size(s, BINARY)),
        None => "❌".to_string(),
    }
}
