use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use dicom_series::{
    enums::{OverflowPolicy, TemporalPolicy, Windowing},
    normalizer::VolumeNormalizer,
    sink::DirectorySink,
    synthesizer::{SeriesConfig, SeriesSynthesizer, convert},
    volume_loader::VolumeLoader,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Overflow {
    Wrap,
    Clamp,
    Reject,
}

impl From<Overflow> for OverflowPolicy {
    fn from(value: Overflow) -> Self {
        match value {
            Overflow::Wrap => OverflowPolicy::Wrap,
            Overflow::Clamp => OverflowPolicy::Clamp,
            Overflow::Reject => OverflowPolicy::Reject,
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about = "Write a NIfTI volume as a series of single-frame DICOM files")]
struct Args {
    #[arg(help = "Input volume (.nii or .nii.gz)")]
    volume: PathBuf,

    #[arg(help = "DICOM instance from the same study whose header seeds the series")]
    template: PathBuf,

    #[arg(help = "Output directory, created if missing")]
    output: PathBuf,

    #[arg(long, default_value_t = 2001)]
    series_number: i32,

    #[arg(long)]
    series_description: Option<String>,

    #[arg(long, help = "Write only the first frame of a 4-D volume")]
    collapse_time: bool,

    #[arg(long, value_enum, default_value_t = Overflow::Wrap)]
    overflow: Overflow,

    #[arg(
        long,
        value_parser = parse_window,
        help = "VOI window: `auto` or `CENTER,WIDTH`"
    )]
    window: Option<Windowing>,
}

fn parse_window(value: &str) -> Result<Windowing, String> {
    if value.eq_ignore_ascii_case("auto") {
        return Ok(Windowing::FromData);
    }
    let (center, width) = value
        .split_once(',')
        .ok_or_else(|| format!("expected `auto` or `CENTER,WIDTH`, got `{value}`"))?;
    let center = center.trim().parse().map_err(|e| format!("center: {e}"))?;
    let width = width.trim().parse().map_err(|e| format!("width: {e}"))?;
    Ok(Windowing::Fixed { center, width })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let template = VolumeLoader::load_template(&args.template)?;
    let volume = VolumeLoader::load_nifti(&args.volume)?;
    fs::create_dir_all(&args.output)?;

    let temporal = if args.collapse_time {
        TemporalPolicy::FirstFrame
    } else {
        TemporalPolicy::AllFrames
    };
    let mut config = SeriesConfig::default()
        .with_series_number(args.series_number)
        .with_temporal(temporal)
        .with_windowing(args.window.unwrap_or_default());
    if let Some(description) = args.series_description {
        config = config.with_series_description(description);
    }

    let mut synthesizer = SeriesSynthesizer::new(config);
    let mut sink = DirectorySink::new(&args.output);
    let report = convert(
        &template,
        &volume,
        &VolumeNormalizer::new(args.overflow.into()),
        &mut synthesizer,
        &mut sink,
    )?;

    info!(
        instances = report.instance_count(),
        output = %args.output.display(),
        "DICOM files written"
    );
    Ok(())
}
