use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::analysis::signal_extractor::SignalExtractor;
use crate::analysis::stress_score::{StressScore, StressScoreCalculator};
use crate::analysis::time_series::TimeSeriesAccumulator;
use crate::detection::domain::detector_capability::DetectorCapability;
use crate::detection::domain::dominant_face::select_dominant;
use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::constants::MIN_SAMPLES;
use crate::video::domain::frame_source::FrameSource;
use crate::video::domain::video_reader::VideoReader;
use crate::video::infrastructure::ffmpeg_reader::FfmpegReader;

use super::pipeline_logger::{NullPipelineLogger, PipelineLogger};

/// Where a run is in its lifecycle.
///
/// `Unavailable` is terminal and entered without opening the video when the
/// detector never loaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Opening,
    Streaming,
    Finalizing,
    Done,
    Unavailable,
}

/// How a run ended. Every outcome other than `Completed` carries the
/// fallback score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Completed,
    InsufficientSignal,
    OpenFailed,
    DetectorUnavailable,
    Cancelled,
    Failed,
}

/// Result of one analysis: the score plus counters for diagnostics.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub score: StressScore,
    pub outcome: AnalysisOutcome,
    pub frames_read: usize,
    pub frames_with_face: usize,
    pub samples: usize,
    /// Frames that yielded no sample: no face, a failed detection or an empty ROI.
    pub frames_skipped: usize,
}

impl AnalysisReport {
    pub(crate) fn fallback(outcome: AnalysisOutcome) -> Self {
        Self {
            score: StressScore::FALLBACK,
            outcome,
            frames_read: 0,
            frames_with_face: 0,
            samples: 0,
            frames_skipped: 0,
        }
    }
}

/// Turns one video into a stress score.
///
/// Never fails: open errors, a missing detector, cancellation and panics in
/// collaborators all end in a report with the fallback score. The video is
/// released on every path.
pub struct AnalysisPipeline {
    capability: DetectorCapability,
    logger: Box<dyn PipelineLogger>,
    cancelled: Arc<AtomicBool>,
    state: PipelineState,
}

impl AnalysisPipeline {
    pub fn new(capability: DetectorCapability) -> Self {
        Self {
            capability,
            logger: Box::new(NullPipelineLogger),
            cancelled: Arc::new(AtomicBool::new(false)),
            state: PipelineState::Idle,
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Stops the frame loop once `flag` is set.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = flag;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Decodes `path` with ffmpeg and analyzes it.
    pub fn analyze_path(&mut self, path: &Path) -> AnalysisReport {
        self.analyze(Box::new(FfmpegReader::new()), path)
    }

    pub fn analyze(&mut self, reader: Box<dyn VideoReader>, path: &Path) -> AnalysisReport {
        self.state = PipelineState::Idle;

        let Some(detector) = self.capability.detector().cloned() else {
            log::warn!(
                "Skipping {}: face detector {:?}",
                path.display(),
                self.capability
            );
            self.transition(PipelineState::Unavailable);
            return AnalysisReport::fallback(AnalysisOutcome::DetectorUnavailable);
        };

        log::info!("Analyzing {}", path.display());
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run(reader, path, detector)));
        let report = match result {
            Ok(report) => report,
            Err(payload) => {
                log::error!(
                    "Analysis of {} aborted: {}",
                    path.display(),
                    panic_message(payload.as_ref())
                );
                AnalysisReport::fallback(AnalysisOutcome::Failed)
            }
        };
        self.transition(PipelineState::Done);

        self.logger.info(&format!(
            "{:?}: score {} ({} samples from {} frames, {} skipped)",
            report.outcome,
            report.score,
            report.samples,
            report.frames_read,
            report.frames_skipped
        ));
        self.logger.summary();
        report
    }

    fn run(
        &mut self,
        reader: Box<dyn VideoReader>,
        path: &Path,
        detector: Arc<dyn FaceDetector>,
    ) -> AnalysisReport {
        if self.cancelled.load(Ordering::Relaxed) {
            return AnalysisReport::fallback(AnalysisOutcome::Cancelled);
        }

        self.transition(PipelineState::Opening);
        let mut source = match FrameSource::open(reader, path) {
            Ok(source) => source,
            Err(e) => {
                log::warn!("Could not open {}: {e}", path.display());
                return AnalysisReport::fallback(AnalysisOutcome::OpenFailed);
            }
        };
        log::debug!(
            "Opened {} ({}x{}, {:.2} fps, {} frames reported)",
            path.display(),
            source.metadata().width,
            source.metadata().height,
            source.frame_rate(),
            source.frame_count()
        );

        self.transition(PipelineState::Streaming);
        let total = source.frame_count();
        let mut series = TimeSeriesAccumulator::with_capacity(total);
        let mut frames_read = 0;
        let mut frames_with_face = 0;
        let mut cancelled = false;

        let frames = match source.frames() {
            Ok(frames) => frames,
            Err(e) => {
                log::warn!("No frames from {}: {e}", path.display());
                return AnalysisReport::fallback(AnalysisOutcome::Failed);
            }
        };
        for frame in frames {
            if self.cancelled.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }
            frames_read += 1;

            let t0 = Instant::now();
            let faces = detector.detect(&frame).unwrap_or_else(|e| {
                log::debug!("Frame {}: detection failed, skipping: {e}", frame.index());
                Vec::new()
            });
            self.logger
                .timing("detect", t0.elapsed().as_secs_f64() * 1000.0);
            self.logger.metric("faces_per_frame", faces.len() as f64);

            let sample = select_dominant(&faces).and_then(|face| {
                frames_with_face += 1;
                SignalExtractor::extract(&frame, &face)
            });
            series.record(sample);
            self.logger.progress(frames_read, total);
        }
        source.close();

        if cancelled {
            log::info!("Analysis of {} cancelled", path.display());
            return AnalysisReport {
                frames_read,
                frames_with_face,
                samples: series.len(),
                frames_skipped: series.skipped(),
                ..AnalysisReport::fallback(AnalysisOutcome::Cancelled)
            };
        }

        self.transition(PipelineState::Finalizing);
        let outcome = if series.len() < MIN_SAMPLES {
            AnalysisOutcome::InsufficientSignal
        } else {
            AnalysisOutcome::Completed
        };
        AnalysisReport {
            score: StressScoreCalculator::finalize(series.samples()),
            outcome,
            frames_read,
            frames_with_face,
            samples: series.len(),
            frames_skipped: series.skipped(),
        }
    }

    fn transition(&mut self, next: PipelineState) {
        log::debug!("Pipeline state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
