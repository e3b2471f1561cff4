use super::CaptureHandle;
use crate::error::SourceError;
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use tracing::{debug, trace};

/// In-process test pattern used for `fake://` sources.
///
/// `fake://fail` refuses to open; any other name produces frames forever.
pub struct SyntheticCapture {
    name: String,
    width: u32,
    height: u32,
    frame_counter: u64,
}

impl SyntheticCapture {
    pub fn open(name: &str, frame_size: (u32, u32)) -> Result<Self, SourceError> {
        if name == "fail" {
            return Err(SourceError::Open {
                source_url: format!("fake://{}", name),
                details: "synthetic source configured to fail".to_string(),
            });
        }

        debug!(
            "Opened synthetic source fake://{} ({}x{})",
            name, frame_size.0, frame_size.1
        );

        Ok(Self {
            name: name.to_string(),
            width: frame_size.0.max(16),
            height: frame_size.1.max(16),
            frame_counter: 0,
        })
    }

    #[cfg(feature = "annotation")]
    fn render(&self, frame_id: u64) -> Result<Vec<u8>, SourceError> {
        use image::codecs::jpeg::JpegEncoder;
        use image::{Rgb, RgbImage};

        let shift = (frame_id % 256) as u32;
        let img = RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb([
                ((x + shift) % 256) as u8,
                ((y + shift) % 256) as u8,
                128,
            ])
        });

        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, 70)
            .encode_image(&img)
            .map_err(|e| SourceError::Read {
                details: format!("synthetic JPEG encoding failed: {}", e),
            })?;
        Ok(buf)
    }

    #[cfg(not(feature = "annotation"))]
    fn render(&self, frame_id: u64) -> Result<Vec<u8>, SourceError> {
        let mut data = vec![
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x01,
            0x00, 0x48, 0x00, 0x48, 0x00, 0x00,
        ];

        let pattern_size = 1000 + (frame_id % 500) as usize;
        data.extend(vec![(frame_id % 256) as u8; pattern_size]);
        data.extend_from_slice(&[0xFF, 0xD9]);
        Ok(data)
    }
}

#[async_trait]
impl CaptureHandle for SyntheticCapture {
    async fn read_frame(&mut self) -> Result<FrameData, SourceError> {
        let frame_id = self.frame_counter;
        self.frame_counter += 1;

        let data = self.render(frame_id)?;
        trace!(
            "Generated synthetic frame {} for fake://{} ({} bytes)",
            frame_id,
            self.name,
            data.len()
        );

        Ok(FrameData::new(
            frame_id,
            data,
            self.width,
            self.height,
            FrameFormat::Mjpeg,
        ))
    }
}

impl Drop for SyntheticCapture {
    fn drop(&mut self) {
        debug!(
            "Released synthetic source fake://{} after {} frames",
            self.name, self.frame_counter
        );
    }
}
