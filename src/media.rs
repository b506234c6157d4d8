use std::io::Read;

use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;

use crate::api::FetchError;

/// Longest edge kept after decoding. Terminal cells are coarse, anything
/// bigger only costs memory and resize time on the UI thread.
pub const MAX_PICTURE_EDGE: u32 = 640;

pub const MAX_DOWNLOAD_BYTES: u64 = 32 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Picture {
    image: RgbaImage,
}

impl Picture {
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        RgbaImage::from_raw(width, height, pixels).map(|image| Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Scales to fit inside `max_width` x `max_height`, preserving aspect ratio.
    pub fn fitted(&self, max_width: u32, max_height: u32) -> RgbaImage {
        let (width, height) = fit_dimensions(self.width(), self.height(), max_width, max_height);
        if width == self.width() && height == self.height() {
            return self.image.clone();
        }
        image::imageops::resize(&self.image, width, height, FilterType::Triangle)
    }
}

pub fn fit_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 || max_width == 0 || max_height == 0 {
        return (0, 0);
    }
    let scale = (max_width as f64 / width as f64).min(max_height as f64 / height as f64);
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_width);
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_height);
    (w, h)
}

/// Downloads and decodes the image at `url`.
pub fn download_picture(
    client: &Client,
    user_agent: &str,
    url: &str,
) -> std::result::Result<Picture, FetchError> {
    download_picture_with_limit(client, user_agent, url, MAX_DOWNLOAD_BYTES)
}

/// Like [`download_picture`], reading at most `max_bytes` of the body.
pub fn download_picture_with_limit(
    client: &Client,
    user_agent: &str,
    url: &str,
    max_bytes: u64,
) -> std::result::Result<Picture, FetchError> {
    let response = client
        .get(url)
        .header(USER_AGENT, user_agent)
        .send()
        .map_err(|err| FetchError::Decode(format!("download failed: {err}")))?;

    if !response.status().is_success() {
        return Err(FetchError::Decode(format!(
            "image download returned status {}",
            response.status().as_u16()
        )));
    }

    let mut bytes = Vec::with_capacity(256 * 1024);
    response
        .take(max_bytes)
        .read_to_end(&mut bytes)
        .map_err(|err| FetchError::Decode(format!("read image body: {err}")))?;

    decode_picture(&bytes)
}

pub fn decode_picture(bytes: &[u8]) -> std::result::Result<Picture, FetchError> {
    if bytes.is_empty() {
        return Err(FetchError::Decode("image had no bytes".into()));
    }
    let decoded = image::load_from_memory(bytes)
        .map_err(|err| FetchError::Decode(format!("decode image: {err}")))?;
    let decoded = shrink(decoded);
    Ok(Picture {
        image: decoded.into_rgba8(),
    })
}

fn shrink(image: DynamicImage) -> DynamicImage {
    if image.width() <= MAX_PICTURE_EDGE && image.height() <= MAX_PICTURE_EDGE {
        return image;
    }
    image.resize(MAX_PICTURE_EDGE, MAX_PICTURE_EDGE, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn decodes_png_into_rgba() {
        let picture = decode_picture(&png_bytes(4, 2)).unwrap();
        assert_eq!((picture.width(), picture.height()), (4, 2));
        assert_eq!(picture.fitted(4, 2).get_pixel(3, 1).0, [10, 20, 30, 255]);
    }

    #[test]
    fn large_pictures_are_shrunk() {
        let picture = decode_picture(&png_bytes(MAX_PICTURE_EDGE * 2, 10)).unwrap();
        assert_eq!(picture.width(), MAX_PICTURE_EDGE);
    }

    #[test]
    fn garbage_is_a_decode_failure() {
        let err = decode_picture(b"<html>not an image</html>").unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
        assert!(matches!(decode_picture(&[]), Err(FetchError::Decode(_))));
    }

    #[test]
    fn fit_keeps_aspect_ratio() {
        assert_eq!(fit_dimensions(200, 100, 50, 50), (50, 25));
        assert_eq!(fit_dimensions(100, 400, 80, 40), (10, 40));
        assert_eq!(fit_dimensions(0, 10, 5, 5), (0, 0));
    }
}
