use std::io::Cursor;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{DynamicImage, ImageFormat, RgbaImage};
use crate::{error::Result, types::Mask};

/// Decode any supported raster format to native-resolution RGBA
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Decode a mask image; colour masks are reduced to luma (RGB are equal in practice)
pub fn decode_mask(bytes: &[u8]) -> Result<Mask> {
    Ok(image::load_from_memory(bytes)?.to_luma8())
}

/// Accepts raw base64 or a `data:<mime>;base64,` URL
pub fn decode_base64_payload(payload: &str) -> Result<Vec<u8>> {
    let data = match payload.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => payload,
    };
    Ok(STANDARD.decode(data.trim())?)
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

pub fn encode_base64_png(image: &DynamicImage) -> Result<String> {
    Ok(STANDARD.encode(encode_png(image)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_mask_survives_base64_png() {
        let mask = GrayImage::from_fn(6, 4, |x, y| Luma([((x + y) * 20) as u8]));
        let encoded = encode_base64_png(&DynamicImage::ImageLuma8(mask.clone())).unwrap();

        let bytes = decode_base64_payload(&format!("data:image/png;base64,{encoded}")).unwrap();
        assert_eq!(decode_mask(&bytes).unwrap(), mask);
        assert_eq!(decode_mask(&decode_base64_payload(&encoded).unwrap()).unwrap(), mask);
    }

    #[test]
    fn test_garbage_is_a_decode_failure() {
        assert!(matches!(
            decode_image(b"not an image"),
            Err(crate::error::CutoutError::Decode(_))
        ));
        assert!(matches!(
            decode_base64_payload("%%%"),
            Err(crate::error::CutoutError::Base64(_))
        ));
    }
}
