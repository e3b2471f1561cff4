use super::{CaptureHandle, CaptureSettings, SourceUrl};
use crate::error::SourceError;
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Time a pipeline gets to reach PLAYING before the open is declared failed
const PREROLL_TIMEOUT: Duration = Duration::from_secs(10);

/// GStreamer-backed capture of devices, network streams and files.
///
/// The appsink keeps a single buffer and drops older ones, so every read
/// returns the freshest decoded frame.
pub struct GstCapture {
    source_url: String,
    pipeline: Pipeline,
    appsink: AppSink,
    read_timeout: Duration,
    frame_counter: u64,
}

impl GstCapture {
    /// Build and start the pipeline. Blocks until the source prerolls.
    pub fn open(
        source_url: &str,
        source: &SourceUrl,
        settings: &CaptureSettings,
    ) -> Result<Self, SourceError> {
        let open_error = |details: String| SourceError::Open {
            source_url: source_url.to_string(),
            details,
        };

        gstreamer::init()
            .map_err(|e| open_error(format!("Failed to initialize GStreamer: {}", e)))?;

        let pipeline_desc = build_pipeline_string(source, settings).ok_or_else(|| {
            SourceError::Unsupported {
                source_url: source_url.to_string(),
                reason: "synthetic sources do not use GStreamer".to_string(),
            }
        })?;

        info!("Creating GStreamer pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| open_error(format!("Failed to create pipeline: {}", e)))?
            .downcast::<Pipeline>()
            .map_err(|_| open_error("Failed to downcast to Pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| open_error("Pipeline has no appsink".to_string()))?
            .downcast::<AppSink>()
            .map_err(|_| open_error("Failed to downcast to AppSink".to_string()))?;

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(open_error(format!("Failed to start pipeline: {}", e)));
        }

        let (result, _, _) = pipeline.state(gstreamer::ClockTime::from_mseconds(
            PREROLL_TIMEOUT.as_millis() as u64,
        ));
        if let Err(e) = result {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(open_error(format!("Pipeline failed to preroll: {}", e)));
        }

        info!("GStreamer pipeline started for {}", source);

        Ok(Self {
            source_url: source_url.to_string(),
            pipeline,
            appsink,
            read_timeout: settings.read_timeout,
            frame_counter: 0,
        })
    }

    fn sample_to_frame(
        sample: &gstreamer::Sample,
        frame_id: u64,
    ) -> Result<FrameData, SourceError> {
        let buffer = sample.buffer().ok_or_else(|| SourceError::Read {
            details: "No buffer in sample".to_string(),
        })?;

        let (width, height) = sample
            .caps()
            .and_then(|caps| caps.structure(0))
            .map(|s| {
                (
                    s.get::<i32>("width").unwrap_or(0).max(0) as u32,
                    s.get::<i32>("height").unwrap_or(0).max(0) as u32,
                )
            })
            .unwrap_or((0, 0));

        let map = buffer.map_readable().map_err(|e| SourceError::Read {
            details: format!("Failed to map buffer: {}", e),
        })?;

        Ok(FrameData::new(
            frame_id,
            map.as_slice().to_vec(),
            width,
            height,
            FrameFormat::Mjpeg,
        ))
    }
}

#[async_trait]
impl CaptureHandle for GstCapture {
    async fn read_frame(&mut self) -> Result<FrameData, SourceError> {
        let appsink = self.appsink.clone();
        let timeout = self.read_timeout;

        let sample = tokio::task::spawn_blocking(move || {
            let wait = gstreamer::ClockTime::from_mseconds(timeout.as_millis() as u64);
            let sample = appsink.try_pull_sample(wait);
            (sample, appsink.is_eos())
        })
        .await
        .map_err(|e| SourceError::Read {
            details: format!("capture task failed: {}", e),
        })?;

        match sample {
            (Some(sample), _) => {
                let frame_id = self.frame_counter;
                self.frame_counter += 1;

                let frame = Self::sample_to_frame(&sample, frame_id)?;
                trace!(
                    "Captured frame {} from {} ({}x{}, {} bytes)",
                    frame.id,
                    self.source_url,
                    frame.width,
                    frame.height,
                    frame.size_bytes()
                );
                Ok(frame)
            }
            (None, true) => Err(SourceError::EndOfStream),
            (None, false) => Err(SourceError::ReadTimeout { timeout }),
        }
    }
}

impl Drop for GstCapture {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("Failed to stop pipeline for {}: {}", self.source_url, e);
        } else {
            debug!("Released GStreamer pipeline for {}", self.source_url);
        }
    }
}

/// Build the pipeline description for a source. Every pipeline ends in a
/// JPEG encoder feeding a single-buffer, dropping appsink.
pub(crate) fn build_pipeline_string(
    source: &SourceUrl,
    settings: &CaptureSettings,
) -> Option<String> {
    let head = match source {
        SourceUrl::Device(index) => format!("v4l2src device=/dev/video{} ! decodebin", index),
        SourceUrl::Rtsp(url) => format!("rtspsrc location=\"{}\" latency=200 ! decodebin", url),
        SourceUrl::Http(url) => {
            format!("souphttpsrc location=\"{}\" is-live=true ! decodebin", url)
        }
        SourceUrl::File(path) => format!("filesrc location=\"{}\" ! decodebin", path),
        SourceUrl::Synthetic(_) => return None,
    };

    let (width, height) = settings.frame_size;

    Some(format!(
        "{} ! videoconvert ! videoscale ! video/x-raw,width={},height={} ! \
         jpegenc quality={} ! \
         appsink name=sink max-buffers=1 drop=true sync={} emit-signals=false",
        head,
        width,
        height,
        settings.jpeg_quality,
        !source.is_live()
    ))
}
