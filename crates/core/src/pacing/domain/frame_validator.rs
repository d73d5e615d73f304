use thiserror::Error;

use crate::shared::capture_config::{CaptureConfig, ImageFormat, Viewport};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const PNG_HEADER_LEN: usize = 24;
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// Why a frame was rejected. Recovered locally: never fails a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameValidationError {
    #[error("{format} payload truncated at {len} bytes")]
    Truncated { format: &'static str, len: usize },
    #[error("missing {0} signature")]
    BadSignature(&'static str),
    #[error("first PNG chunk is {0:?}, expected IHDR")]
    MissingHeader(String),
    #[error("frame is {width}x{height}, expected {expected_width}x{expected_height}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },
}

/// Checks encoded frame headers against the configured viewport.
///
/// PNG frames must carry the signature and a leading IHDR chunk whose
/// dimensions match. JPEG frames must start with SOI; when a start-of-frame
/// segment is present before the scan data its dimensions must match too.
pub struct FrameValidator {
    viewport: Viewport,
    format: ImageFormat,
}

impl FrameValidator {
    pub fn new(viewport: Viewport, format: ImageFormat) -> Self {
        Self { viewport, format }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(config.viewport, config.image_format)
    }

    pub fn validate(&self, payload: &[u8]) -> Result<(), FrameValidationError> {
        let dimensions = match self.format {
            ImageFormat::Png => Some(png_dimensions(payload)?),
            ImageFormat::Jpeg { .. } => jpeg_dimensions(payload)?,
        };
        match dimensions {
            Some((width, height))
                if width != self.viewport.width || height != self.viewport.height =>
            {
                Err(FrameValidationError::DimensionMismatch {
                    width,
                    height,
                    expected_width: self.viewport.width,
                    expected_height: self.viewport.height,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Reads width and height from a PNG's IHDR chunk.
pub fn png_dimensions(payload: &[u8]) -> Result<(u32, u32), FrameValidationError> {
    if payload.len() < PNG_HEADER_LEN {
        return Err(FrameValidationError::Truncated {
            format: "PNG",
            len: payload.len(),
        });
    }
    if payload[..8] != PNG_SIGNATURE {
        return Err(FrameValidationError::BadSignature("PNG"));
    }
    if payload[12..16] != *b"IHDR" {
        return Err(FrameValidationError::MissingHeader(
            String::from_utf8_lossy(&payload[12..16]).into_owned(),
        ));
    }
    Ok((read_u32_be(&payload[16..20]), read_u32_be(&payload[20..24])))
}

/// Scans JPEG marker segments for a start-of-frame header.
///
/// Returns `Ok(None)` when the scan data (or the end of the payload) is
/// reached before any SOF segment.
pub fn jpeg_dimensions(payload: &[u8]) -> Result<Option<(u32, u32)>, FrameValidationError> {
    if payload.len() < 2 {
        return Err(FrameValidationError::Truncated {
            format: "JPEG",
            len: payload.len(),
        });
    }
    if payload[..2] != JPEG_SOI {
        return Err(FrameValidationError::BadSignature("JPEG"));
    }

    let mut pos = 2;
    while pos + 1 < payload.len() {
        if payload[pos] != 0xFF {
            return Ok(None);
        }
        let marker = payload[pos + 1];
        pos += 2;
        match marker {
            // Fill byte: the next byte starts the marker again.
            0xFF => pos -= 1,
            // Standalone markers without a length field.
            0x01 | 0xD0..=0xD7 => {}
            // End of image or start of scan: no SOF seen.
            0xD9 | 0xDA => return Ok(None),
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                if pos + 7 > payload.len() {
                    return Ok(None);
                }
                let height = read_u16_be(&payload[pos + 3..pos + 5]);
                let width = read_u16_be(&payload[pos + 5..pos + 7]);
                return Ok(Some((width, height)));
            }
            _ => {
                if pos + 2 > payload.len() {
                    return Ok(None);
                }
                pos += read_u16_be(&payload[pos..pos + 2]) as usize;
            }
        }
    }
    Ok(None)
}

fn read_u32_be(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_u16_be(bytes: &[u8]) -> u32 {
    u16::from_be_bytes([bytes[0], bytes[1]]) as u32
}
