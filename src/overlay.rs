use crate::detector::{ClassTaxonomy, Detection};
use crate::error::{EpiguardError, Result};
use crate::frame::FrameData;
use crate::snapshot::AlertSnapshot;
use bytes::Bytes;
use tracing::{debug, warn};

/// Draws detections and the compliance panels onto frames
pub struct FrameAnnotator {
    frame_size: (u32, u32),
    jpeg_quality: u8,
    #[cfg(feature = "annotation")]
    font: Option<rusttype::Font<'static>>,
}

impl FrameAnnotator {
    /// Create an annotator. A font that fails to load only disables labels.
    pub fn new(frame_size: (u32, u32), jpeg_quality: u8, font_path: &str) -> Self {
        #[cfg(feature = "annotation")]
        {
            let font = match std::fs::read(font_path) {
                Ok(data) => {
                    let font = rusttype::Font::try_from_vec(data);
                    if font.is_none() {
                        warn!("Failed to parse font file '{}', labels disabled", font_path);
                    }
                    font
                }
                Err(e) => {
                    warn!(
                        "Failed to read font file '{}': {}, labels disabled",
                        font_path, e
                    );
                    None
                }
            };

            Self {
                frame_size,
                jpeg_quality,
                font,
            }
        }

        #[cfg(not(feature = "annotation"))]
        {
            debug!(
                "Annotation feature disabled, frames are published as captured (font {} unused)",
                font_path
            );
            Self {
                frame_size,
                jpeg_quality,
            }
        }
    }

    /// Annotator that leaves frames untouched
    pub fn passthrough() -> Self {
        Self {
            frame_size: (0, 0),
            jpeg_quality: 0,
            #[cfg(feature = "annotation")]
            font: None,
        }
    }

    fn is_passthrough(&self) -> bool {
        self.frame_size.0 == 0 || self.frame_size.1 == 0
    }

    /// Produce the JPEG viewers receive for a processed frame
    pub fn annotate(
        &self,
        frame: &FrameData,
        detections: &[Detection],
        alerts: &AlertSnapshot,
        taxonomy: &ClassTaxonomy,
        caption: &str,
    ) -> Result<Bytes> {
        if self.is_passthrough() {
            return Ok(frame.data.clone());
        }

        #[cfg(feature = "annotation")]
        {
            self.draw(frame, detections, alerts, taxonomy, caption)
        }

        #[cfg(not(feature = "annotation"))]
        {
            let _ = (detections, alerts, taxonomy, caption);
            Ok(frame.data.clone())
        }
    }

    /// Resize and caption a frame that has no detections to show
    pub fn caption_only(&self, frame: &FrameData, caption: &str) -> Result<Bytes> {
        if self.is_passthrough() {
            return Ok(frame.data.clone());
        }

        #[cfg(feature = "annotation")]
        {
            let (mut img, _) = self.decode_resized(frame)?;
            let height = self.frame_size.1 as i32;
            self.draw_text(&mut img, caption, 360, height - 20, image::Rgb([255, 255, 255]));
            self.encode(&img)
        }

        #[cfg(not(feature = "annotation"))]
        {
            let _ = caption;
            Ok(frame.data.clone())
        }
    }

    /// Decode the source JPEG and scale it to the output size. Also returns
    /// the source dimensions that detection boxes refer to.
    #[cfg(feature = "annotation")]
    fn decode_resized(&self, frame: &FrameData) -> Result<(image::RgbImage, (u32, u32))> {
        use image::imageops::FilterType;
        use image::ImageFormat;

        let decoded = image::load_from_memory_with_format(&frame.data, ImageFormat::Jpeg)
            .map_err(|e| {
                EpiguardError::component("annotator", format!("Failed to decode JPEG: {}", e))
            })?;

        let source_size = if frame.width > 0 && frame.height > 0 {
            (frame.width, frame.height)
        } else {
            (decoded.width(), decoded.height())
        };

        let (width, height) = self.frame_size;
        let img = decoded
            .resize_exact(width, height, FilterType::Triangle)
            .to_rgb8();
        Ok((img, source_size))
    }

    #[cfg(feature = "annotation")]
    fn encode(&self, img: &image::RgbImage) -> Result<Bytes> {
        use image::codecs::jpeg::JpegEncoder;

        let mut output = Vec::new();
        JpegEncoder::new_with_quality(&mut output, self.jpeg_quality)
            .encode_image(img)
            .map_err(|e| {
                EpiguardError::component("annotator", format!("Failed to encode JPEG: {}", e))
            })?;
        Ok(Bytes::from(output))
    }

    #[cfg(feature = "annotation")]
    fn draw(
        &self,
        frame: &FrameData,
        detections: &[Detection],
        alerts: &AlertSnapshot,
        taxonomy: &ClassTaxonomy,
        caption: &str,
    ) -> Result<Bytes> {
        use image::Rgb;
        use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
        use imageproc::rect::Rect;

        let (mut img, source_size) = self.decode_resized(frame)?;
        let (width, height) = self.frame_size;

        for detection in detections {
            let info = taxonomy.lookup(detection.class_id);
            let color = Rgb(info.color);
            let bbox = detection.bbox.scaled(source_size, (width, height));

            let x = bbox.x1.max(0.0) as i32;
            let y = bbox.y1.max(0.0) as i32;
            let w = (bbox.width() as u32).max(1);
            let h = (bbox.height() as u32).max(1);
            let thickness = if info.category.is_violation() { 3 } else { 2 };

            for t in 0..thickness {
                let tw = w.saturating_sub(2 * t as u32).max(1);
                let th = h.saturating_sub(2 * t as u32).max(1);
                draw_hollow_rect_mut(&mut img, Rect::at(x + t, y + t).of_size(tw, th), color);
            }

            let label = format!("{}: {:.0}%", info.name, detection.confidence * 100.0);
            let label_y = (y - 22).max(0);
            self.draw_label(&mut img, &label, x, label_y, color);
        }

        // Alert panel, top left
        if alerts.has_violations {
            let panel = Rect::at(5, 5).of_size(295, 30 + alerts.violations.len() as u32 * 25);
            draw_filled_rect_mut(&mut img, panel, Rgb([0, 0, 0]));
            draw_hollow_rect_mut(&mut img, panel, Rgb([255, 0, 0]));
            self.draw_text(&mut img, "SAFETY ALERTS", 10, 10, Rgb([255, 0, 0]));

            let mut line_y = 35;
            for violation in &alerts.violations {
                let name = taxonomy.lookup(violation.class_id).name;
                let line = format!("! {}x {}", violation.count, name);
                self.draw_text(&mut img, &line, 15, line_y, Rgb([255, 255, 255]));
                line_y += 25;
            }
        }

        // Summary panel, bottom
        let panel_y = height.saturating_sub(60) as i32;
        let summary = Rect::at(5, panel_y).of_size(345, 55);
        draw_filled_rect_mut(&mut img, summary, Rgb([0, 0, 0]));
        draw_hollow_rect_mut(&mut img, summary, Rgb([255, 255, 255]));

        let total = alerts.total_violations();
        let (status_text, status_color) = if total == 0 {
            ("Status: OK".to_string(), Rgb([0, 255, 0]))
        } else {
            (format!("Status: {} VIOLATIONS", total), Rgb([255, 0, 0]))
        };

        let white = Rgb([255, 255, 255]);
        let people = format!("People: {}", alerts.person_count);
        let ppe = format!("PPE: {}", alerts.epi_count);
        self.draw_text(&mut img, &people, 15, panel_y + 5, white);
        self.draw_text(&mut img, &ppe, 130, panel_y + 5, Rgb([0, 255, 0]));
        self.draw_text(&mut img, &status_text, 15, panel_y + 30, status_color);
        self.draw_text(&mut img, caption, 360, height as i32 - 20, white);

        let output = self.encode(&img)?;

        debug!(
            "Annotated frame {} with {} detections ({} bytes)",
            frame.id,
            detections.len(),
            output.len()
        );
        Ok(output)
    }

    #[cfg(feature = "annotation")]
    fn draw_text(
        &self,
        img: &mut image::RgbImage,
        text: &str,
        x: i32,
        y: i32,
        color: image::Rgb<u8>,
    ) {
        use imageproc::drawing::draw_text_mut;

        if let Some(font) = &self.font {
            draw_text_mut(img, color, x, y, rusttype::Scale::uniform(16.0), font, text);
        }
    }

    /// Text on a filled background in the box colour
    #[cfg(feature = "annotation")]
    fn draw_label(
        &self,
        img: &mut image::RgbImage,
        text: &str,
        x: i32,
        y: i32,
        color: image::Rgb<u8>,
    ) {
        use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
        use imageproc::rect::Rect;

        if let Some(font) = &self.font {
            let scale = rusttype::Scale::uniform(16.0);
            let (text_width, text_height) = text_size(scale, font, text);
            let background = Rect::at(x, y)
                .of_size((text_width + 6).max(1) as u32, (text_height + 6).max(1) as u32);
            draw_filled_rect_mut(img, background, color);
            draw_text_mut(img, image::Rgb([255, 255, 255]), x + 3, y + 3, scale, font, text);
        }
    }
}
