use anyhow::Result;
use clap::Parser;
use exposure_sweep::domain::models::SweepStatus;
use exposure_sweep::domain::settings::{Settings, SettingsService};
use exposure_sweep::domain::sweep::SweepController;
use exposure_sweep::infrastructure::export::{Exporter, FileExporter};
use exposure_sweep::infrastructure::logging::init_logger;
use exposure_sweep::infrastructure::transport::simulated::{Fault, SimulatedCamera};
use exposure_sweep::infrastructure::transport::ReplayTransport;
use exposure_sweep::presentation::console::Progress;
use exposure_sweep::presentation::ConsolePresenter;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "exposure_sweep")]
#[command(about = "Sweep a camera peripheral across gain x shutter and assemble a mosaic")]
struct Args {
    /// Grid size N (N x N cells, at least 2)
    #[arg(long)]
    size: Option<u32>,

    /// Capture quality index sent with every request
    #[arg(long)]
    quality: Option<u8>,

    /// Use the peripheral's auto-exposure profile instead of manual settings
    #[arg(long)]
    auto_exposure: bool,

    /// Per-cell wait for the photo, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// After a timeout, how long to wait for and discard the overdue photo
    #[arg(long)]
    grace_ms: Option<u64>,

    /// Replay images from this directory instead of the simulated camera
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Directory the mosaic is exported to
    #[arg(long)]
    out: Option<PathBuf>,

    /// Request indices the simulated camera should drop (e.g. 4,7)
    #[arg(long, value_delimiter = ',')]
    fail_cells: Vec<usize>,

    /// Persist the effective sweep settings
    #[arg(long)]
    save_settings: bool,
}

fn apply_overrides(settings: &mut Settings, args: &Args) {
    if let Some(size) = args.size {
        settings.sweep.size = size;
    }
    if let Some(quality) = args.quality {
        settings.sweep.quality_index = quality;
    }
    if args.auto_exposure {
        settings.sweep.auto_exposure = true;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        settings.sweep.capture_timeout_ms = timeout_ms;
    }
    if let Some(grace_ms) = args.grace_ms {
        settings.sweep.late_payload_grace_ms = grace_ms;
    }
    if let Some(out) = &args.out {
        settings.export_dir = out.display().to_string();
    }
}

/// Wait for the presenter to drain the event stream
async fn join_presenter(presenter: JoinHandle<Progress>) -> Option<Progress> {
    match presenter.await {
        Ok(progress) => Some(progress),
        Err(e) => {
            warn!("Console presenter stopped abnormally: {}", e);
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings_service = SettingsService::new()?;
    let _logging_guard = init_logger(&settings_service.get().log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    apply_overrides(settings_service.get_mut(), &args);
    if args.save_settings {
        settings_service.save()?;
        info!("Saved settings to {}", settings_service.path().display());
    }
    let settings = settings_service.get().clone();

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let presenter = tokio::spawn(ConsolePresenter::new(event_rx).run());
    let mut controller = SweepController::new().with_events(event_tx);

    let handle = controller.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && handle.cancel() {
            warn!("Cancellation requested, finishing the current cell");
        }
    });

    let report = match &args.replay {
        Some(dir) => {
            let transport = ReplayTransport::from_dir(dir)?;
            controller.run(&transport, &settings.sweep).await
        }
        None => {
            let camera = args
                .fail_cells
                .iter()
                .fold(SimulatedCamera::new(), |camera, &index| {
                    camera.with_fault(index, Fault::NoPayload)
                });
            controller.run(&camera, &settings.sweep).await
        }
    };

    // Closes the event stream so the presenter can finish
    drop(controller);
    join_presenter(presenter).await;

    for failure in &report.failures {
        warn!(
            "Cell {} (gain={}, shutter={}): {}",
            failure.index, failure.cell.gain, failure.cell.shutter, failure.reason
        );
    }

    match report.status {
        SweepStatus::Completed => {
            if let Some(mosaic) = &report.mosaic {
                let exporter = FileExporter::new(&settings.export_dir).with_prefix("mosaic");
                let path = exporter.export(&mosaic.encoded, mosaic.mime)?;
                if !report.failures.is_empty() {
                    exporter.export_failures(&path, &report.failures)?;
                }
                println!("{}", path.display());
            }
            Ok(())
        }
        SweepStatus::Cancelled => {
            info!(
                "Sweep cancelled with {} cells captured, nothing exported",
                report.results.len()
            );
            Ok(())
        }
        SweepStatus::Failed => anyhow::bail!(
            "Sweep failed: {}",
            report.error.unwrap_or_else(|| "unknown error".to_string())
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_presenter_panic_is_reported_not_ignored() {
        async fn crash() -> Progress {
            panic!("presenter crashed")
        }
        let crashed = tokio::spawn(crash());
        assert!(join_presenter(crashed).await.is_none());

        let (tx, rx) = mpsc::unbounded_channel();
        drop(tx);
        let finished = tokio::spawn(ConsolePresenter::new(rx).run());
        assert!(join_presenter(finished).await.is_some());
    }

    #[test]
    fn test_cli_overrides_settings_file() {
        let args = Args::parse_from([
            "exposure_sweep",
            "--size",
            "3",
            "--auto-exposure",
            "--timeout-ms",
            "250",
            "--grace-ms",
            "400",
            "--fail-cells",
            "1,4",
        ]);
        let mut settings = Settings::default();
        apply_overrides(&mut settings, &args);

        assert_eq!(settings.sweep.size, 3);
        assert!(settings.sweep.auto_exposure);
        assert_eq!(settings.sweep.capture_timeout_ms, 250);
        assert_eq!(settings.sweep.late_payload_grace_ms, 400);
        assert_eq!(settings.sweep.quality_index, 0);
        assert_eq!(args.fail_cells, vec![1, 4]);
    }
}
