use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use poise_core::{ScrfdSource, StillReport};
use poise_hw::{V4lCamera, V4lProvider};
use poise_session::{CaptureCommand, CaptureController, RunOutcome, SessionConfig, SessionError};
use std::io::BufRead;
use std::path::PathBuf;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "poise", about = "Capture guidance for avatar photos")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a still image against the framing rules
    Check {
        /// Image file (PNG, JPEG, ...)
        image: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a live capture session on the camera
    Capture {
        /// Where to write the confirmed still
        #[arg(short, long, default_value = "poise-capture.jpg")]
        output: PathBuf,
    },
    /// Print the effective threshold table as TOML
    Thresholds,
    /// List V4L2 capture devices
    Devices,
}

type Controller = CaptureController<V4lProvider, ScrfdSource>;

fn controller(config: SessionConfig) -> Result<Controller> {
    let thresholds = config.thresholds().context("loading thresholds")?;
    let provider = V4lProvider {
        device_path: config.camera_device.clone(),
        width: config.camera_width,
        height: config.camera_height,
    };
    let source = ScrfdSource::new(config.scrfd_model_path());
    Ok(CaptureController::new(config, thresholds, provider, source))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = SessionConfig::from_env();

    match cli.command {
        Commands::Check { image, json } => check(config, image, json).await,
        Commands::Capture { output } => capture(config, output).await,
        Commands::Thresholds => {
            let thresholds = config.thresholds().context("loading thresholds")?;
            print!("{}", toml::to_string_pretty(&thresholds)?);
            Ok(())
        }
        Commands::Devices => {
            let devices = V4lCamera::list_devices();
            if devices.is_empty() {
                println!("no video capture devices found");
            }
            for device in devices {
                println!("{}  {} ({}, {})", device.path, device.name, device.driver, device.bus);
            }
            Ok(())
        }
    }
}

async fn check(config: SessionConfig, image: PathBuf, json: bool) -> Result<()> {
    let bytes = std::fs::read(&image).with_context(|| format!("reading {}", image.display()))?;
    let mut controller = controller(config)?;

    let report = match controller.submit_upload(&bytes).await {
        Ok(report) => report,
        Err(SessionError::Validation(e)) => {
            if let Some(warning) = e.warning() {
                println!("[{:?}] {}: {}", warning.severity, image.display(), warning.message);
            }
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

async fn capture(config: SessionConfig, output: PathBuf) -> Result<()> {
    let mut controller = controller(config)?;

    let mode = match controller.start_camera() {
        Ok(mode) => mode,
        Err(e) => {
            if let Some(reason) = e.acquire_failure() {
                eprintln!(
                    "camera unavailable ({reason:?}); \
                     try `poise check <image>` with a photo instead"
                );
            }
            return Err(e.into());
        }
    };
    println!("camera active in {mode:?} mode; press Enter to capture, Ctrl-C to cancel");

    let (tx, mut rx) = mpsc::channel(4);
    spawn_stdin(std::io::BufReader::new(std::io::stdin()), tx.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(CaptureCommand::Cancel).await;
        }
    });

    let mut updates = controller.subscribe();
    tokio::spawn(async move {
        let mut last = None;
        while updates.changed().await.is_ok() {
            let status = updates.borrow_and_update().status;
            if last != Some(status) {
                println!("status: {status}");
                last = Some(status);
            }
        }
    });

    match controller.run(&mut rx).await? {
        RunOutcome::Cancelled => {
            println!("cancelled");
            return Ok(());
        }
        RunOutcome::Captured(origin) => println!("captured ({origin:?})"),
    }

    let report = controller.analyze().await?;
    print_report(&report);

    let still = controller.confirm()?;
    std::fs::write(&output, &still.jpeg)
        .with_context(|| format!("writing {}", output.display()))?;
    println!("wrote {} ({}x{})", output.display(), still.width, still.height);
    Ok(())
}

/// Every input line is a capture request. The reader runs on a detached
/// thread so a pending read never holds up runtime shutdown.
fn spawn_stdin(
    input: impl BufRead + Send + 'static,
    tx: mpsc::Sender<CaptureCommand>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        for line in input.lines() {
            if line.is_err() || tx.blocking_send(CaptureCommand::Capture).is_err() {
                break;
            }
        }
    })
}

fn print_report(report: &StillReport) {
    println!(
        "{}x{}, capability {:?}",
        report.dims.width, report.dims.height, report.capability
    );
    if !report.analyzed {
        println!("  no detector ran; only the dimension gate was applied");
    }
    if report.warnings.is_empty() {
        println!("  no issues found");
    }
    for warning in &report.warnings {
        println!(
            "  [{:?}] {:?}: {}",
            warning.severity, warning.category, warning.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_each_input_line_requests_capture() {
        let (tx, mut rx) = mpsc::channel(4);
        let reader = spawn_stdin(Cursor::new("\n\n"), tx);

        assert_eq!(rx.recv().await, Some(CaptureCommand::Capture));
        assert_eq!(rx.recv().await, Some(CaptureCommand::Capture));
        // End of input drops the sender.
        assert_eq!(rx.recv().await, None);
        assert!(reader.join().is_ok());
    }

    #[test]
    fn test_stdin_reader_outlives_runtime() {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let (tx, rx) = mpsc::channel(1);
        // A reader that never returns, like a terminal nobody types into.
        let (_writer, pipe) = std::sync::mpsc::channel::<u8>();
        let blocked = std::io::BufReader::new(BlockedReader(pipe));
        runtime.block_on(async { spawn_stdin(blocked, tx) });
        drop(rx);
        // Shutdown does not wait on the parked read.
        drop(runtime);
    }

    struct BlockedReader(std::sync::mpsc::Receiver<u8>);

    impl std::io::Read for BlockedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.0.recv() {
                Ok(byte) => {
                    buf[0] = byte;
                    Ok(1)
                }
                Err(_) => Ok(0),
            }
        }
    }
}
