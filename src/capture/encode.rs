use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use super::frame::{Frame, PixelFormat};
use crate::error::EncodeError;

/// Encode a frame as a JPEG file body.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let meta = &frame.meta;
    match meta.format {
        PixelFormat::Mjpeg => {
            // Already a JPEG
            Ok(frame.data.to_vec())
        }
        PixelFormat::Rgb24 => {
            check_len(frame)?;
            encode_rgb(&frame.data, meta.width, meta.height, quality)
        }
        PixelFormat::Bgr24 => {
            check_len(frame)?;
            let rgb: Vec<u8> = frame
                .data
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect();
            encode_rgb(&rgb, meta.width, meta.height, quality)
        }
    }
}

fn check_len(frame: &Frame) -> Result<(), EncodeError> {
    let meta = &frame.meta;
    let bpp = meta.format.bytes_per_pixel().unwrap_or(1);
    let expected = meta.width as usize * meta.height as usize * bpp;
    if frame.data.len() != expected {
        return Err(EncodeError::BufferSize {
            width: meta.width,
            height: meta.height,
            expected,
            actual: frame.data.len(),
        });
    }
    Ok(())
}

fn encode_rgb(rgb: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).encode(
        rgb,
        width,
        height,
        ExtendedColorType::Rgb8,
    )?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::FrameMetadata;

    fn frame(format: PixelFormat, data: Vec<u8>) -> Frame {
        Frame::new(
            data,
            FrameMetadata {
                sequence: 1,
                width: 4,
                height: 2,
                format,
            },
        )
    }

    #[test]
    fn rgb_frames_become_jpeg() {
        let jpeg = encode_jpeg(&frame(PixelFormat::Rgb24, vec![128; 4 * 2 * 3]), 90).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn bgr_frames_become_jpeg() {
        let jpeg = encode_jpeg(&frame(PixelFormat::Bgr24, vec![10; 4 * 2 * 3]), 75).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn mjpeg_passes_through() {
        let body = vec![0xFF, 0xD8, 0x01, 0xFF, 0xD9];
        assert_eq!(encode_jpeg(&frame(PixelFormat::Mjpeg, body.clone()), 90).unwrap(), body);
    }

    #[test]
    fn short_buffers_are_rejected() {
        let err = encode_jpeg(&frame(PixelFormat::Rgb24, vec![0; 5]), 90).unwrap_err();
        assert!(matches!(
            err,
            EncodeError::BufferSize {
                expected: 24,
                actual: 5,
                ..
            }
        ));
    }
}
