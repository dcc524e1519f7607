use image::RgbImage;

/// Decode a transport-encoded image (JPEG, PNG, WebP...) into RGB pixels.
///
/// Empty input means the client had no frame. Undecodable input is logged
/// and also reported as no frame, so the detector answers with its neutral
/// "No frame received" result instead of an error.
pub fn decode_frame(encoded: &[u8]) -> Option<RgbImage> {
    if encoded.is_empty() {
        return None;
    }
    match image::load_from_memory(encoded) {
        Ok(img) => Some(img.to_rgb8()),
        Err(e) => {
            tracing::warn!(error = %e, bytes = encoded.len(), "frame decode failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 120, 40]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_decodes_png() {
        let frame = decode_frame(&png_bytes(8, 6)).unwrap();
        assert_eq!(frame.dimensions(), (8, 6));
        assert_eq!(frame.get_pixel(3, 3), &Rgb([200, 120, 40]));
    }

    #[test]
    fn test_empty_is_no_frame() {
        assert!(decode_frame(&[]).is_none());
    }

    #[test]
    fn test_garbage_is_no_frame() {
        assert!(decode_frame(b"definitely not an image").is_none());
    }
}
