use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use image::RgbImage;

/// Standard alphabet; trailing `=` padding is optional.
const FRAME_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Cannot identify image file: {0}")]
    Image(#[from] image::ImageError),
    #[error("Empty image")]
    Empty,
}

/// Decodes a websocket frame: base64 text, optionally behind a `data:...;base64,` header.
pub fn decode_frame(payload: &str) -> Result<RgbImage, DecodeError> {
    let encoded = strip_data_url(payload);
    let cleaned: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = FRAME_ENGINE.decode(cleaned.as_bytes())?;
    decode_upload(&bytes)
}

/// Decodes the raw bytes of an uploaded file.
pub fn decode_upload(bytes: &[u8]) -> Result<RgbImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let image = image::load_from_memory(bytes)?.to_rgb8();
    if image.width() == 0 || image.height() == 0 {
        return Err(DecodeError::Empty);
    }
    Ok(image)
}

/// Everything after the first comma, or the whole string when there is none.
fn strip_data_url(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_, rest)) => rest,
        None => payload,
    }
}

/// Encodes a pixel grid as PNG, the container remote backends are fed with.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    image.write_to(&mut buffer, image::ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use image::{Rgb, RgbImage};

    pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 40) as u8, (y * 40) as u8, 128])
        });
        super::encode_png(&image).unwrap()
    }

    pub fn png_base64(width: u32, height: u32) -> String {
        STANDARD.encode(png_bytes(width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{png_base64, png_bytes};
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn data_url_header_is_ignored() {
        let raw = png_base64(5, 3);
        let with_header = format!("data:image/png;base64,{raw}");
        let a = decode_frame(&raw).unwrap();
        let b = decode_frame(&with_header).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dimensions(), (5, 3));
    }

    #[test]
    fn missing_padding_and_line_breaks_are_tolerated() {
        let raw = png_base64(4, 4);
        let unpadded = raw.trim_end_matches('=');
        let wrapped: String = unpadded
            .as_bytes()
            .chunks(16)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(decode_frame(&wrapped).unwrap(), decode_frame(&raw).unwrap());
    }

    #[test]
    fn malformed_base64_is_rejected() {
        let err = decode_frame("data:image/png;base64,@@not*base64@@").unwrap_err();
        assert!(matches!(err, DecodeError::Base64(_)));
    }

    #[test]
    fn valid_base64_of_garbage_is_rejected() {
        let err = decode_frame("aGVsbG8gd29ybGQ=").unwrap_err();
        assert!(matches!(err, DecodeError::Image(_)));
    }

    #[test]
    fn empty_upload_is_rejected() {
        assert!(matches!(decode_upload(&[]), Err(DecodeError::Empty)));
        assert!(matches!(decode_frame(""), Err(DecodeError::Empty)));
    }

    #[test]
    fn grayscale_upload_becomes_three_channels() {
        let gray = GrayImage::from_pixel(2, 2, Luma([200]));
        let mut buffer = std::io::Cursor::new(Vec::new());
        gray.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        let rgb = decode_upload(buffer.get_ref()).unwrap();
        assert_eq!(rgb.get_pixel(1, 1).0, [200, 200, 200]);
    }

    #[test]
    fn upload_bytes_decode_directly() {
        let image = decode_upload(&png_bytes(7, 2)).unwrap();
        assert_eq!(image.dimensions(), (7, 2));
    }
}
