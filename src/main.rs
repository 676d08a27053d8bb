use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use dicom_review::{
    DirectoryTransport, HeadlessEngine, Orchestrator, Orientation, ViewerConfig, ViewerError,
};

/// Load a scan offscreen, window it and save the axial view
#[derive(Debug, Parser)]
#[command(name = "dicom-review", version)]
struct Args {
    /// Directory holding one sub-directory of .dcm files per scan
    root: PathBuf,

    /// Scan sub-directory to open
    scan: String,

    /// Window preset (lung, bone, brain, soft-tissue, liver, mediastinum)
    #[arg(long)]
    preset: Option<String>,

    /// Axial slice to show, defaults to the first
    #[arg(long)]
    slice: Option<usize>,

    #[arg(long, default_value = "result.png")]
    output: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), ViewerError> {
    let mut viewer = Orchestrator::new(
        HeadlessEngine::new(),
        DirectoryTransport::new(&args.root),
        ViewerConfig::default(),
    );
    viewer.load_scan(&args.scan).await?;
    for skipped in viewer.skipped_frames() {
        log::warn!("Skipped frame {skipped}");
    }

    if let Some(preset) = &args.preset {
        viewer.apply_preset(preset)?;
    }
    if let Some(slice) = args.slice {
        viewer.set_slice_index(Orientation::Axial, slice).await?;
    }
    if let Some(displayed) = viewer.displayed() {
        log::info!(
            "Slice {}/{} of {}x{}, W/L {:.0}/{:.0} ({}), mean {:.1}",
            displayed.slice_index + 1,
            displayed.slice_count,
            displayed.columns,
            displayed.rows,
            displayed.window.width,
            displayed.window.center,
            displayed.preset.name(),
            displayed.histogram.mean
        );
    }

    viewer.screenshot(&args.output)
}
