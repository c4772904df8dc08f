use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, ImageFormat};
use tracing::{debug, warn};

use crate::error::PipelineError;

/// Image bytes ready to be inlined into a completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl PreparedImage {
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

/// Decodes an uploaded image given either as a `data:` URL or as bare base64.
pub fn decode_image_payload(payload: &str) -> Result<Vec<u8>, PipelineError> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::MissingInput("image".to_string()));
    }

    let encoded = if trimmed.starts_with("data:") {
        let (header, data) = trimmed
            .split_once(',')
            .ok_or_else(|| PipelineError::MissingInput("image data after data URL header".to_string()))?;
        if !header.ends_with(";base64") {
            return Err(PipelineError::MissingInput(
                "image data URL must be base64 encoded".to_string(),
            ));
        }
        data
    } else {
        trimmed
    };

    let compact: String = encoded.chars().filter(|ch| !ch.is_whitespace()).collect();
    let bytes = general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|err| PipelineError::MissingInput(format!("image is not valid base64: {err}")))?;
    if bytes.is_empty() {
        return Err(PipelineError::MissingInput("image".to_string()));
    }
    Ok(bytes)
}

fn resize_if_needed(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    if width <= max_dimension && height <= max_dimension {
        return img;
    }

    let scale = max_dimension as f32 / width.max(height) as f32;
    let new_width = ((width as f32 * scale) as u32).max(1);
    let new_height = ((height as f32 * scale) as u32).max(1);
    img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3)
}

fn encode_to_jpeg(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img.to_rgb8()).write_to(&mut buffer, ImageFormat::Jpeg)?;
    Ok(buffer.into_inner())
}

/// Downscales decodable images to `max_dimension` on the long edge and
/// re-encodes them as JPEG. Bytes the `image` crate cannot decode are passed
/// through unchanged with their sniffed MIME type.
pub fn prepare_image(bytes: Vec<u8>, max_dimension: u32) -> PreparedImage {
    let sniffed = detect_mime_type(&bytes).unwrap_or_else(|| "image/jpeg".to_string());

    let decoded = match image::load_from_memory(&bytes) {
        Ok(img) => img,
        Err(err) => {
            warn!(
                "Could not decode uploaded image ({} bytes, mime={}): {}; sending as-is",
                bytes.len(),
                sniffed,
                err
            );
            return PreparedImage {
                mime_type: sniffed,
                bytes,
            };
        }
    };

    let (width, height) = (decoded.width(), decoded.height());
    if width <= max_dimension && height <= max_dimension && sniffed == "image/jpeg" {
        return PreparedImage {
            mime_type: sniffed,
            bytes,
        };
    }

    let resized = resize_if_needed(decoded, max_dimension);
    match encode_to_jpeg(&resized) {
        Ok(jpeg) => {
            debug!(
                "Prepared image {}x{} -> {}x{} ({} -> {} bytes)",
                width,
                height,
                resized.width(),
                resized.height(),
                bytes.len(),
                jpeg.len()
            );
            PreparedImage {
                mime_type: "image/jpeg".to_string(),
                bytes: jpeg,
            }
        }
        Err(err) => {
            warn!("Failed to re-encode image as JPEG: {}; sending original", err);
            PreparedImage {
                mime_type: sniffed,
                bytes,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use image::{ImageBuffer, Rgba};

    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgba([200u8, 40, 90, 255]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut buffer, ImageFormat::Png)
            .expect("png encodes");
        buffer.into_inner()
    }

    #[test]
    fn decodes_data_urls_and_bare_base64() {
        let encoded = general_purpose::STANDARD.encode(b"hello image");
        let data_url = format!("data:image/png;base64,{encoded}");
        assert_eq!(decode_image_payload(&data_url).unwrap(), b"hello image");
        assert_eq!(decode_image_payload(&encoded).unwrap(), b"hello image");
    }

    #[test]
    fn rejects_empty_and_invalid_payloads() {
        assert!(matches!(
            decode_image_payload("   "),
            Err(PipelineError::MissingInput(_))
        ));
        assert!(matches!(
            decode_image_payload("data:image/png;base64,@@@"),
            Err(PipelineError::MissingInput(_))
        ));
        assert!(matches!(
            decode_image_payload("data:image/png,rawtext"),
            Err(PipelineError::MissingInput(_))
        ));
    }

    #[test]
    fn large_images_are_downscaled_to_jpeg() {
        let prepared = prepare_image(png_bytes(300, 150), 100);
        assert_eq!(prepared.mime_type, "image/jpeg");
        let decoded = image::load_from_memory(&prepared.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 50));
    }

    #[test]
    fn undecodable_bytes_pass_through() {
        let prepared = prepare_image(b"definitely not an image".to_vec(), 100);
        assert_eq!(prepared.bytes, b"definitely not an image");
        assert_eq!(prepared.mime_type, "image/jpeg");
        assert!(prepared.to_data_url().starts_with("data:image/jpeg;base64,"));
    }
}
