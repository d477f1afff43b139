use barcoders::sym::code128::Code128;
use image::{imageops::FilterType, DynamicImage, ImageBuffer, Rgba};
use thiserror::Error;

// barcoders selects the initial Code 128 character set with a unicode
// escape prefix; Ɓ = character set B (full printable ASCII).
const CHARSET_B: char = '\u{0181}';

const BAR_MODULE_PX: u32 = 3;
const BAR_HEIGHT_RATIO: u32 = 10; // bar height = 10 module widths

#[derive(Debug, Error)]
pub enum BarcodeError {
    #[error("text cannot be encoded as Code 128: {0}")]
    Unencodable(String),
    #[error("barcode text is empty")]
    Empty,
}

/// Encode `text` as a Code 128 symbol and rasterize it as black bars on
/// white, resized to `target_w` pixels wide with aspect ratio preserved.
pub fn code128_image(
    text: &str,
    target_w: u32,
) -> Result<ImageBuffer<Rgba<u8>, Vec<u8>>, BarcodeError> {
    if text.is_empty() {
        return Err(BarcodeError::Empty);
    }
    let modules = code128_modules(text)?;

    let n = modules.len() as u32;
    let px_per_module = (target_w / n).max(1).min(BAR_MODULE_PX);
    let w = n * px_per_module;
    let h = px_per_module * BAR_HEIGHT_RATIO;

    let mut img = ImageBuffer::from_pixel(w, h, Rgba([255, 255, 255, 255]));
    for (i, m) in modules.iter().enumerate() {
        if *m == 0 {
            continue;
        }
        let x0 = i as u32 * px_per_module;
        for x in x0..(x0 + px_per_module) {
            for y in 0..h {
                img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
    }

    if w != target_w {
        let target_h = ((h as f32 * target_w as f32 / w as f32).round() as u32).max(1);
        img = DynamicImage::ImageRgba8(img)
            .resize_exact(target_w, target_h, FilterType::Nearest)
            .to_rgba8();
    }
    Ok(img)
}

/// Bar/space module pattern for `text` (1 = bar, 0 = space).
pub fn code128_modules(text: &str) -> Result<Vec<u8>, BarcodeError> {
    let code = Code128::new(format!("{CHARSET_B}{text}"))
        .map_err(|e| BarcodeError::Unencodable(e.to_string()))?;
    Ok(code.encode())
}
