use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageResult};

/// Payload format tiles are stored in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TileEncoding {
    /// Store the response body untouched.
    Original,
    /// Decode the response body and re-encode it as an RGB JPEG.
    Jpeg { quality: u8 },
}

impl Default for TileEncoding {
    fn default() -> Self {
        TileEncoding::Jpeg { quality: 100 }
    }
}

impl TileEncoding {
    /// Whether [`TileEncoding::encode`] does CPU-bound work.
    pub fn is_passthrough(&self) -> bool {
        matches!(self, TileEncoding::Original)
    }

    pub fn encode(&self, body: Vec<u8>) -> ImageResult<Vec<u8>> {
        match *self {
            TileEncoding::Original => Ok(body),
            TileEncoding::Jpeg { quality } => {
                let rgb = DynamicImage::ImageRgb8(image::load_from_memory(&body)?.to_rgb8());

                let mut out = Vec::with_capacity(body.len());
                rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))?;
                Ok(out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_fixture() -> Vec<u8> {
        let img = RgbaImage::from_fn(4, 3, |x, y| Rgba([x as u8 * 60, y as u8 * 80, 200, 128]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn original_is_untouched() {
        let body = b"not even an image".to_vec();
        assert_eq!(TileEncoding::Original.encode(body.clone()).unwrap(), body);
    }

    #[test]
    fn png_becomes_jpeg() {
        let jpeg = TileEncoding::default().encode(png_fixture()).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(TileEncoding::Jpeg { quality: 90 }
            .encode(b"<html>503</html>".to_vec())
            .is_err());
    }
}
