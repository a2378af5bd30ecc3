use std::path::{Path, PathBuf};

use crate::detection::domain::detector_capability::DetectorCapability;
use crate::pipeline::analysis_pipeline::{AnalysisOutcome, AnalysisPipeline, AnalysisReport};
use crate::pipeline::pipeline_logger::LogPipelineLogger;
use crate::video::domain::video_reader::VideoReader;
use crate::video::infrastructure::ffmpeg_reader::FfmpegReader;

const DEFAULT_CHANNEL_CAPACITY: usize = 8;
const PROGRESS_THROTTLE_FRAMES: usize = 30;

/// Analyzes several clips on a pool of worker threads.
///
/// Layout: `queue → N x [open/detect/extract/score] → results`
///
/// Every worker runs its own [`AnalysisPipeline`]; the only thing they share
/// is the read-only detector inside the capability.
pub struct BatchAnalyzer {
    capability: DetectorCapability,
    workers: usize,
    channel_capacity: usize,
}

impl BatchAnalyzer {
    pub fn new(capability: DetectorCapability, workers: usize) -> Self {
        Self {
            capability,
            workers: workers.max(1),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Decodes each path with ffmpeg. Reports come back in input order.
    pub fn analyze_all(&self, paths: &[PathBuf]) -> Vec<AnalysisReport> {
        self.analyze_all_with(paths, || Box::new(FfmpegReader::new()))
    }

    /// Like [`Self::analyze_all`], with readers built by `make_reader`.
    pub fn analyze_all_with<F>(&self, paths: &[PathBuf], make_reader: F) -> Vec<AnalysisReport>
    where
        F: Fn() -> Box<dyn VideoReader> + Sync,
    {
        if paths.is_empty() {
            return Vec::new();
        }
        let workers = self.workers.min(paths.len());
        log::info!("Analyzing {} clips on {workers} workers", paths.len());

        let (job_tx, job_rx) = crossbeam_channel::bounded::<(usize, PathBuf)>(self.channel_capacity);
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<(usize, AnalysisReport)>();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let capability = self.capability.clone();
                let make_reader = &make_reader;
                scope.spawn(move || {
                    for (index, path) in job_rx {
                        let report = analyze_one(&capability, make_reader(), &path);
                        if result_tx.send((index, report)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(result_tx);

            for job in paths.iter().cloned().enumerate() {
                if job_tx.send(job).is_err() {
                    break;
                }
            }
            drop(job_tx);
        });

        let mut reports: Vec<Option<AnalysisReport>> = vec![None; paths.len()];
        for (index, report) in result_rx {
            reports[index] = Some(report);
        }
        reports
            .into_iter()
            .zip(paths)
            .map(|(report, path)| {
                report.unwrap_or_else(|| {
                    log::error!("No report for {}", path.display());
                    AnalysisReport::fallback(AnalysisOutcome::Failed)
                })
            })
            .collect()
    }
}

fn analyze_one(
    capability: &DetectorCapability,
    reader: Box<dyn VideoReader>,
    path: &Path,
) -> AnalysisReport {
    let label = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    AnalysisPipeline::new(capability.clone())
        .with_logger(Box::new(LogPipelineLogger::new(label, PROGRESS_THROTTLE_FRAMES)))
        .analyze(reader, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face_detector::{DetectionError, FaceDetector};
    use crate::shared::bounding_box::BoundingBox;
    use crate::shared::frame::Frame;
    use crate::shared::video_metadata::VideoMetadata;
    use crate::video::domain::video_reader::VideoError;
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serves a clip whose red values are encoded in the file name,
    /// e.g. `90-110-90-110.webm`. Names starting with `missing` fail to open.
    struct NamedClipReader {
        reds: Vec<u8>,
        closes: Arc<AtomicUsize>,
    }

    impl VideoReader for NamedClipReader {
        fn open(&mut self, path: &Path) -> Result<VideoMetadata, VideoError> {
            let stem = path.file_stem().unwrap().to_string_lossy();
            if stem.starts_with("missing") {
                return Err(VideoError::Open {
                    path: path.to_path_buf(),
                    reason: "not found".to_string(),
                });
            }
            self.reds = stem.split('-').map(|s| s.parse().unwrap()).collect();
            Ok(VideoMetadata {
                width: 16,
                height: 16,
                fps: 30.0,
                total_frames: self.reds.len(),
                codec: "stub".to_string(),
                rotation: 0,
                source_path: Some(path.to_path_buf()),
            })
        }

        fn frames(&mut self) -> Box<dyn Iterator<Item = Result<Frame, VideoError>> + '_> {
            Box::new(
                self.reds
                    .clone()
                    .into_iter()
                    .enumerate()
                    .map(|(i, r)| Ok(Frame::uniform(16, 16, [r, 0, 0], i))),
            )
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct WholeFrameDetector;

    impl FaceDetector for WholeFrameDetector {
        fn detect(&self, frame: &Frame) -> Result<Vec<BoundingBox>, DetectionError> {
            Ok(vec![BoundingBox::new(0, 0, frame.width(), frame.height())])
        }
    }

    fn analyzer(workers: usize) -> BatchAnalyzer {
        BatchAnalyzer::new(
            DetectorCapability::from_detector(Arc::new(WholeFrameDetector)),
            workers,
        )
    }

    fn run(analyzer: &BatchAnalyzer, names: &[&str]) -> (Vec<AnalysisReport>, usize) {
        let closes = Arc::new(AtomicUsize::new(0));
        let paths: Vec<PathBuf> = names.iter().map(|n| PathBuf::from(*n)).collect();
        let reports = analyzer.analyze_all_with(&paths, || {
            Box::new(NamedClipReader {
                reds: Vec::new(),
                closes: closes.clone(),
            })
        });
        (reports, closes.load(Ordering::SeqCst))
    }

    #[test]
    fn test_reports_follow_input_order() {
        let names = [
            "100-100-100.webm",
            "90-110-90-110.webm",
            "missing.webm",
            "50-150.webm",
            "42.webm",
        ];
        let (reports, closes) = run(&analyzer(3), &names);

        assert_eq!(reports.len(), 5);
        assert_relative_eq!(reports[0].score.value(), 0.0);
        assert_relative_eq!(reports[1].score.value(), 0.5);
        assert_eq!(reports[2].outcome, AnalysisOutcome::OpenFailed);
        assert_relative_eq!(reports[3].score.value(), 1.0);
        assert_eq!(reports[4].outcome, AnalysisOutcome::InsufficientSignal);
        assert_eq!(closes, 5);
    }

    #[test]
    fn test_single_worker_matches_many() {
        let names = ["90-110-90-110.webm", "95-105.webm", "80-120-100.webm"];
        let (one, _) = run(&analyzer(1), &names);
        let (many, _) = run(&analyzer(8), &names);
        assert_eq!(one, many);
    }

    #[test]
    fn test_empty_batch() {
        assert!(analyzer(2).analyze_all(&[]).is_empty());
    }

    #[test]
    fn test_unavailable_detector_reports_every_clip() {
        let analyzer = BatchAnalyzer::new(DetectorCapability::unavailable("no model"), 2);
        let (reports, closes) = run(&analyzer, &["90-110.webm", "100-120.webm"]);
        assert!(reports
            .iter()
            .all(|r| r.outcome == AnalysisOutcome::DetectorUnavailable && r.score.is_fallback()));
        assert_eq!(closes, 0);
    }

    #[test]
    fn test_zero_workers_means_one() {
        assert_eq!(analyzer(0).workers, 1);
    }
}
