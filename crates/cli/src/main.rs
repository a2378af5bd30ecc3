use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tempfile::NamedTempFile;

use facestress_core::analysis::stress_score::StressScore;
use facestress_core::detection::domain::detector_capability::DetectorCapability;
use facestress_core::detection::infrastructure::haar_cascade_detector::{
    DetectionConfig, HaarCascadeDetector,
};
use facestress_core::detection::infrastructure::model_resolver::ModelCache;
use facestress_core::detection::infrastructure::onnx_blazeface_detector::OnnxBlazefaceDetector;
use facestress_core::pipeline::analysis_pipeline::AnalysisOutcome;
use facestress_core::pipeline::infrastructure::batch_analyzer::BatchAnalyzer;
use facestress_core::shared::constants::{
    CAPTURE_METHOD, CASCADE_MODEL_NAME, CASCADE_MODEL_URL, UNKNOWN_SITE,
};
use facestress_core::shared::settings::{AnalysisSettings, DetectorBackend};

const STDIN_INPUT: &str = "-";
const USAGE_EXIT_CODE: i32 = 2;

/// Scores face redness variability in short video clips.
#[derive(Parser, Debug)]
#[command(name = "facestress", version)]
struct Cli {
    /// Video files to analyze; `-` reads one clip from stdin.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Site identifier echoed in the output.
    #[arg(long, default_value = UNKNOWN_SITE)]
    site: String,

    /// Settings file (defaults to the user config directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pyramid step between detection scales (> 1.0).
    #[arg(long)]
    scale_factor: Option<f64>,

    /// Raw detections a face needs before it counts.
    #[arg(long)]
    min_neighbors: Option<u32>,

    /// Smallest face side in pixels.
    #[arg(long)]
    min_size: Option<u32>,

    /// Face detector backend.
    #[arg(long, value_enum)]
    detector: Option<DetectorArg>,

    /// Haar cascade XML to use instead of the cached download.
    #[arg(long)]
    cascade: Option<PathBuf>,

    /// BlazeFace ONNX model (required with --detector blazeface).
    #[arg(long)]
    blazeface_model: Option<PathBuf>,

    /// BlazeFace confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Clips analyzed concurrently.
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DetectorArg {
    Haar,
    Blazeface,
}

impl From<DetectorArg> for DetectorBackend {
    fn from(arg: DetectorArg) -> Self {
        match arg {
            DetectorArg::Haar => DetectorBackend::Haar,
            DetectorArg::Blazeface => DetectorBackend::Blazeface,
        }
    }
}

/// One output line per clip.
#[derive(Serialize)]
struct ScoreLine<'a> {
    site: &'a str,
    stress_score: StressScore,
    method: &'static str,
    input: String,
    outcome: AnalysisOutcome,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let settings = match prepare(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(USAGE_EXIT_CODE);
        }
    };

    if let Err(e) = run(&cli, &settings) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Checks the inputs and builds the effective settings.
fn prepare(cli: &Cli) -> Result<AnalysisSettings, Box<dyn std::error::Error>> {
    validate_inputs(&cli.inputs)?;

    let mut settings = match &cli.config {
        Some(path) => AnalysisSettings::load_from(path)?,
        None => AnalysisSettings::load(),
    };
    apply_overrides(cli, &mut settings);
    settings.validate()?;

    if settings.detector == DetectorBackend::Blazeface && settings.blazeface_model_path.is_none() {
        return Err("--detector blazeface needs --blazeface-model".into());
    }
    Ok(settings)
}

fn validate_inputs(inputs: &[PathBuf]) -> Result<(), Box<dyn std::error::Error>> {
    if inputs.is_empty() {
        return Err("No input provided".into());
    }
    let stdin_count = inputs.iter().filter(|p| is_stdin(p)).count();
    if stdin_count > 1 {
        return Err("stdin (`-`) can only be given once".into());
    }
    for input in inputs.iter().filter(|p| !is_stdin(p)) {
        if !input.is_file() {
            return Err(format!("Input file not found: {}", input.display()).into());
        }
    }
    Ok(())
}

fn apply_overrides(cli: &Cli, settings: &mut AnalysisSettings) {
    if let Some(v) = cli.scale_factor {
        settings.scale_factor = v;
    }
    if let Some(v) = cli.min_neighbors {
        settings.min_neighbors = v;
    }
    if let Some(v) = cli.min_size {
        settings.min_face_size = v;
    }
    if let Some(v) = cli.detector {
        settings.detector = v.into();
    }
    if let Some(v) = &cli.cascade {
        settings.cascade_path = Some(v.clone());
    }
    if let Some(v) = &cli.blazeface_model {
        settings.blazeface_model_path = Some(v.clone());
    }
    if let Some(v) = cli.confidence {
        settings.blazeface_confidence = v;
    }
    if let Some(v) = cli.workers {
        settings.workers = v;
    }
}

fn run(cli: &Cli, settings: &AnalysisSettings) -> Result<(), Box<dyn std::error::Error>> {
    let capability = build_capability(settings);

    // Held until the end so the staged upload outlives the analysis.
    let staged = if cli.inputs.iter().any(|p| is_stdin(p)) {
        Some(stage_stdin()?)
    } else {
        None
    };
    let paths: Vec<PathBuf> = cli
        .inputs
        .iter()
        .map(|p| match &staged {
            Some(file) if is_stdin(p) => file.path().to_path_buf(),
            _ => p.clone(),
        })
        .collect();

    let reports = BatchAnalyzer::new(capability, settings.workers).analyze_all(&paths);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (input, report) in cli.inputs.iter().zip(reports) {
        let line = ScoreLine {
            site: &cli.site,
            stress_score: report.score,
            method: CAPTURE_METHOD,
            input: input.display().to_string(),
            outcome: report.outcome,
        };
        writeln!(out, "{}", serde_json::to_string(&line)?)?;
    }
    Ok(())
}

/// Loads the configured detector once. A failure is recorded in the
/// capability; every clip then gets the fallback score.
fn build_capability(settings: &AnalysisSettings) -> DetectorCapability {
    match settings.detector {
        DetectorBackend::Haar => {
            let config = DetectionConfig::from(settings);
            DetectorCapability::load(|| -> Result<_, Box<dyn std::error::Error>> {
                let path = match &settings.cascade_path {
                    Some(path) => path.clone(),
                    None => {
                        log::info!("Resolving cascade: {CASCADE_MODEL_NAME}");
                        ModelCache::user()?.resolve(
                            CASCADE_MODEL_NAME,
                            CASCADE_MODEL_URL,
                            download_progress,
                        )?
                    }
                };
                Ok(HaarCascadeDetector::from_file(&path, config)?)
            })
        }
        DetectorBackend::Blazeface => {
            DetectorCapability::load(|| -> Result<_, Box<dyn std::error::Error>> {
                let path = settings
                    .blazeface_model_path
                    .as_deref()
                    .ok_or("no BlazeFace model configured")?;
                Ok(OnnxBlazefaceDetector::new(path, settings.blazeface_confidence)?)
            })
        }
    }
}

/// Copies stdin into a temporary `.webm` file that is deleted on drop.
fn stage_stdin() -> Result<NamedTempFile, Box<dyn std::error::Error>> {
    let mut file = tempfile::Builder::new()
        .prefix("facestress-")
        .suffix(".webm")
        .tempfile()?;
    let bytes = io::copy(&mut io::stdin().lock(), &mut file)?;
    file.flush()?;
    log::info!("Staged {bytes} bytes from stdin at {}", file.path().display());
    Ok(file)
}

fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == STDIN_INPUT
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face cascade... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading face cascade... {downloaded} bytes");
    }
}
