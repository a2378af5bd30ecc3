//! Face redness variability analysis.
//!
//! Decodes a short clip, finds the dominant face in every frame, samples the
//! mean red intensity of a fixed forehead region and maps the variability of
//! that series to a bounded stress score.

pub mod analysis {
    pub mod signal_extractor;
    pub mod stress_score;
    pub mod time_series;
}

pub mod detection {
    pub mod domain {
        pub mod detector_capability;
        pub mod dominant_face;
        pub mod face_detector;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod analysis_pipeline;
    pub mod pipeline_logger;
    pub mod infrastructure {
        pub mod batch_analyzer;
    }
}

pub mod shared {
    pub mod bounding_box;
    pub mod constants;
    pub mod frame;
    pub mod settings;
    pub mod video_metadata;
}

pub mod video {
    pub mod domain {
        pub mod frame_source;
        pub mod video_reader;
    }
    pub mod infrastructure {
        pub mod ffmpeg_reader;
    }
}
