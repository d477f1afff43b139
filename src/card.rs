use std::path::Path;

use image::{imageops::FilterType, ImageBuffer, ImageEncoder, Rgba, RgbaImage};
use rusttype::{point, Font, Scale};
use thiserror::Error;
use uuid::Uuid;

use crate::barcode::{self, BarcodeError};

// Layout is fraction-of-canvas; the handful of pixel values below were
// authored against the 1004x638 template and are scaled by H / REF_HEIGHT
// so a swapped template keeps the same proportions.
const REF_HEIGHT: f32 = 638.0;

const PHOTO_X: f32 = 0.148;
const PHOTO_Y: f32 = 0.382;
const PHOTO_W: f32 = 0.295;
const PHOTO_H: f32 = 0.455;

const INFO_X: f32 = 0.48;
const INFO_Y: f32 = 0.37;
const ROLE_OFFSET_PX: f32 = 50.0;
const ID_OFFSET_PX: f32 = 80.0;

const BARCODE_X: f32 = 0.48;
const BARCODE_Y: f32 = 0.72;
const BARCODE_W: f32 = 0.38;
const CAPTION_GAP_PX: f32 = 5.0;

const TITLE_PX: f32 = 32.0;
const BODY_PX: f32 = 16.0;

const DEFAULT_VALID_FROM: &str = "2022";
const DEFAULT_VALID_TO: &str = "2027";

const INK: Rgba<u8> = Rgba([0, 0, 0, 255]);

const TEMPLATE_FILE: &str = "bg_clean.png";
const FONT_TITLE_FILE: &str = "fonts/DejaVuSans-Bold.ttf";
const FONT_BODY_FILE: &str = "fonts/DejaVuSans.ttf";

#[derive(Debug, Error)]
pub enum CardError {
    #[error("missing required fields: {0}")]
    Validation(String),
    #[error("failed to decode {0} image")]
    Decode(String),
    #[error("barcode: {0}")]
    Encode(#[from] BarcodeError),
    #[error("image: {0}")]
    Image(String),
    #[error("asset {0} unavailable")]
    Asset(String),
}

/// Shared render inputs, loaded once at startup (missing assets abort
/// before the server accepts requests).
pub struct Assets {
    pub template: RgbaImage,
    pub font_title: Font<'static>,
    pub font_body: Font<'static>,
}

impl Assets {
    pub fn load(assets_dir: &Path) -> Result<Self, CardError> {
        let template_bytes = std::fs::read(assets_dir.join(TEMPLATE_FILE))
            .map_err(|_| CardError::Asset(TEMPLATE_FILE.into()))?;
        let template = image::load_from_memory(&template_bytes)
            .map_err(|_| CardError::Asset(TEMPLATE_FILE.into()))?
            .to_rgba8();

        Ok(Self {
            template,
            font_title: load_font(assets_dir, FONT_TITLE_FILE)?,
            font_body: load_font(assets_dir, FONT_BODY_FILE)?,
        })
    }
}

fn load_font(assets_dir: &Path, name: &str) -> Result<Font<'static>, CardError> {
    let bytes =
        std::fs::read(assets_dir.join(name)).map_err(|_| CardError::Asset(name.into()))?;
    Font::try_from_vec(bytes).ok_or_else(|| CardError::Asset(name.into()))
}

#[derive(Debug, Default, Clone)]
pub struct CardRequest {
    pub name: String,
    pub role: String,
    pub id_number: String,
    pub valid_from: Option<String>,
    pub valid_to: Option<String>,
    /// Raw image bytes, already base64-decoded by the caller.
    pub photo: Option<Vec<u8>>,
}

#[derive(Debug)]
pub struct RenderedCard {
    pub id: String,
    pub png: Vec<u8>,
}

/// Composite a card onto a copy of the background template.
///
/// Pure and deterministic for fixed inputs; the generated id is the only
/// varying output and is never drawn onto the canvas.
pub fn render(assets: &Assets, req: &CardRequest) -> Result<RenderedCard, CardError> {
    validate(req)?;

    let mut canvas = assets.template.clone();
    let (w, h) = (canvas.width(), canvas.height());
    let s = h as f32 / REF_HEIGHT;

    // photo, cover-fit into its placeholder rect
    if let Some(bytes) = &req.photo {
        let photo = image::load_from_memory(bytes)
            .map_err(|_| CardError::Decode("photo".into()))?
            .to_rgba8();
        let (px, py, pw, ph) = photo_rect(w, h);
        let fitted = cover_fit(&photo, pw, ph);
        overlay_alpha(&mut canvas, &fitted, px, py);
    }

    // text block
    let ix = frac(w, INFO_X) as i32;
    let iy = frac(h, INFO_Y) as i32;
    draw_text(&mut canvas, &assets.font_title, TITLE_PX * s, ix, iy, INK, &req.name);
    draw_text(
        &mut canvas,
        &assets.font_body,
        BODY_PX * s,
        ix,
        iy + (ROLE_OFFSET_PX * s).round() as i32,
        INK,
        &req.role,
    );
    draw_text(
        &mut canvas,
        &assets.font_body,
        BODY_PX * s,
        ix,
        iy + (ID_OFFSET_PX * s).round() as i32,
        INK,
        &req.id_number,
    );

    // barcode
    let bc = barcode::code128_image(&req.id_number, frac(w, BARCODE_W))?;
    let bx = frac(w, BARCODE_X);
    let by = frac(h, BARCODE_Y);
    overlay_alpha(&mut canvas, &bc, bx, by);

    // validity caption, just below the barcode
    let caption_y = by + bc.height() + (CAPTION_GAP_PX * s).round() as u32;
    draw_text(
        &mut canvas,
        &assets.font_body,
        BODY_PX * s,
        bx as i32,
        caption_y as i32,
        INK,
        &validity_text(req.valid_from.as_deref(), req.valid_to.as_deref()),
    );

    Ok(RenderedCard {
        id: Uuid::new_v4().to_string(),
        png: encode_png(&canvas)?,
    })
}

/// Required-field check. Also runs inside [`render`]; exposed so callers
/// can reject incomplete requests before doing any work on the photo.
pub fn validate(req: &CardRequest) -> Result<(), CardError> {
    let mut missing = Vec::new();
    if req.name.trim().is_empty() {
        missing.push("name");
    }
    if req.role.trim().is_empty() {
        missing.push("role");
    }
    if req.id_number.trim().is_empty() {
        missing.push("idNumber");
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CardError::Validation(missing.join(", ")))
    }
}

pub(crate) fn validity_text(valid_from: Option<&str>, valid_to: Option<&str>) -> String {
    format!(
        "Valid: {}-{}",
        valid_from.filter(|s| !s.trim().is_empty()).unwrap_or(DEFAULT_VALID_FROM),
        valid_to.filter(|s| !s.trim().is_empty()).unwrap_or(DEFAULT_VALID_TO),
    )
}

pub(crate) fn photo_rect(w: u32, h: u32) -> (u32, u32, u32, u32) {
    (frac(w, PHOTO_X), frac(h, PHOTO_Y), frac(w, PHOTO_W), frac(h, PHOTO_H))
}

fn frac(dim: u32, f: f32) -> u32 {
    (dim as f32 * f).round() as u32
}

/// Scale-to-fill `src` into a `dw` x `dh` rectangle, cropping overflow
/// around the center.
fn cover_fit(src: &RgbaImage, dw: u32, dh: u32) -> RgbaImage {
    let (sw, sh) = (src.width().max(1), src.height().max(1));
    let scale = (dw as f32 / sw as f32).max(dh as f32 / sh as f32);
    let rw = ((sw as f32 * scale).round() as u32).max(dw);
    let rh = ((sh as f32 * scale).round() as u32).max(dh);
    let resized = image::imageops::resize(src, rw, rh, FilterType::Lanczos3);
    let left = (rw - dw) / 2;
    let top = (rh - dh) / 2;
    image::imageops::crop_imm(&resized, left, top, dw, dh).to_image()
}

fn overlay_alpha(base: &mut RgbaImage, over: &RgbaImage, x: u32, y: u32) {
    for oy in 0..over.height() {
        for ox in 0..over.width() {
            let p = over.get_pixel(ox, oy);
            let a = p.0[3] as f32 / 255.0;
            if a <= 0.0 {
                continue;
            }
            let bx = x + ox;
            let by = y + oy;
            if bx >= base.width() || by >= base.height() {
                continue;
            }
            let dst = base.get_pixel_mut(bx, by);
            let inv = 1.0 - a;
            dst.0[0] = (p.0[0] as f32 * a + dst.0[0] as f32 * inv) as u8;
            dst.0[1] = (p.0[1] as f32 * a + dst.0[1] as f32 * inv) as u8;
            dst.0[2] = (p.0[2] as f32 * a + dst.0[2] as f32 * inv) as u8;
            dst.0[3] = 255;
        }
    }
}

fn draw_text(
    img: &mut ImageBuffer<Rgba<u8>, Vec<u8>>,
    font: &Font<'static>,
    px: f32,
    x: i32,
    y: i32,
    color: Rgba<u8>,
    text: &str,
) {
    let scale = Scale::uniform(px);
    let v_metrics = font.v_metrics(scale);
    let mut caret_x = x as f32;
    let baseline_y = y as f32 + v_metrics.ascent;

    for ch in text.chars() {
        let glyph = font.glyph(ch).scaled(scale).positioned(point(caret_x, baseline_y));
        if let Some(bb) = glyph.pixel_bounding_box() {
            glyph.draw(|gx, gy, v| {
                let px = gx as i32 + bb.min.x;
                let py = gy as i32 + bb.min.y;
                if px < 0 || py < 0 {
                    return;
                }
                let (px, py) = (px as u32, py as u32);
                if px >= img.width() || py >= img.height() {
                    return;
                }
                let a = (v * 255.0) as u8;
                if a == 0 {
                    return;
                }
                let dst = img.get_pixel_mut(px, py);
                let sa = a as f32 / 255.0;
                let inv = 1.0 - sa;
                dst.0[0] = (color.0[0] as f32 * sa + dst.0[0] as f32 * inv) as u8;
                dst.0[1] = (color.0[1] as f32 * sa + dst.0[1] as f32 * inv) as u8;
                dst.0[2] = (color.0[2] as f32 * sa + dst.0[2] as f32 * inv) as u8;
                dst.0[3] = 255;
            });
        }
        caret_x += glyph.unpositioned().h_metrics().advance_width;
    }
}

fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, CardError> {
    let mut buf = Vec::new();
    let enc = image::codecs::png::PngEncoder::new(&mut buf);
    enc.write_image(img, img.width(), img.height(), image::ExtendedColorType::Rgba8)
        .map_err(|e| CardError::Image(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn fonts_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets")
    }

    fn test_assets(w: u32, h: u32) -> Assets {
        Assets {
            template: RgbaImage::from_pixel(w, h, Rgba([250, 250, 250, 255])),
            font_title: load_font(&fonts_dir(), FONT_TITLE_FILE).unwrap(),
            font_body: load_font(&fonts_dir(), FONT_BODY_FILE).unwrap(),
        }
    }

    fn sample_request() -> CardRequest {
        CardRequest {
            name: "MARIA SANTOS".into(),
            role: "FACULTY".into(),
            id_number: "AC-T-45892".into(),
            valid_from: Some("2022".into()),
            valid_to: Some("2027".into()),
            photo: None,
        }
    }

    fn red_photo_png() -> Vec<u8> {
        let img = RgbaImage::from_pixel(64, 64, Rgba([200, 30, 30, 255]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn render_is_deterministic_for_fixed_inputs() {
        let assets = test_assets(1004, 638);
        let req = sample_request();
        let a = render(&assets, &req).unwrap();
        let b = render(&assets, &req).unwrap();
        assert_eq!(a.png, b.png);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn output_dimensions_match_template() {
        for (w, h) in [(1004, 638), (502, 319)] {
            let assets = test_assets(w, h);
            let card = render(&assets, &sample_request()).unwrap();
            let out = image::load_from_memory(&card.png).unwrap();
            assert_eq!((out.width(), out.height()), (w, h));
        }
    }

    #[test]
    fn missing_fields_fail_validation() {
        let assets = test_assets(1004, 638);
        let mut req = sample_request();
        req.name.clear();
        req.role = "  ".into();
        match render(&assets, &req) {
            Err(CardError::Validation(fields)) => {
                assert_eq!(fields, "name, role");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn template_is_not_mutated() {
        let assets = test_assets(1004, 638);
        let before = assets.template.clone();
        render(&assets, &sample_request()).unwrap();
        assert_eq!(assets.template, before);
    }

    #[test]
    fn undecodable_photo_is_a_decode_error() {
        let assets = test_assets(1004, 638);
        let mut req = sample_request();
        req.photo = Some(b"not an image".to_vec());
        assert!(matches!(render(&assets, &req), Err(CardError::Decode(_))));
    }

    #[test]
    fn photo_only_affects_its_own_region() {
        let assets = test_assets(1004, 638);
        let without = render(&assets, &sample_request()).unwrap();
        let mut req = sample_request();
        req.photo = Some(red_photo_png());
        let with = render(&assets, &req).unwrap();

        let a = image::load_from_memory(&without.png).unwrap().to_rgba8();
        let b = image::load_from_memory(&with.png).unwrap().to_rgba8();
        let (px, py, pw, ph) = photo_rect(1004, 638);

        let mut inside_differs = false;
        for (x, y, pa) in a.enumerate_pixels() {
            let pb = b.get_pixel(x, y);
            let inside = x >= px && x < px + pw && y >= py && y < py + ph;
            if inside {
                inside_differs |= pa != pb;
            } else {
                assert_eq!(pa, pb, "pixel outside photo rect changed at ({x},{y})");
            }
        }
        assert!(inside_differs);
    }

    #[test]
    fn barcode_region_has_bars() {
        let assets = test_assets(1004, 638);
        let card = render(&assets, &sample_request()).unwrap();
        let img = image::load_from_memory(&card.png).unwrap().to_rgba8();

        let bx = frac(1004, BARCODE_X);
        let by = frac(638, BARCODE_Y);
        let bw = frac(1004, BARCODE_W);
        let mut dark = 0;
        for x in bx..bx + bw {
            if img.get_pixel(x, by + 2).0[0] < 64 {
                dark += 1;
            }
        }
        assert!(dark > 0, "no bars in barcode region");
        assert!(dark < bw, "barcode region is solid");
    }

    #[test]
    fn validity_caption_defaults() {
        assert_eq!(validity_text(Some("2022"), Some("2027")), "Valid: 2022-2027");
        assert_eq!(validity_text(None, None), "Valid: 2022-2027");
        assert_eq!(validity_text(Some("2024"), None), "Valid: 2024-2027");
        assert_eq!(validity_text(Some(""), Some("2030")), "Valid: 2022-2030");
    }

    #[test]
    fn cover_fit_fills_and_crops() {
        let src = RgbaImage::from_pixel(100, 50, Rgba([1, 2, 3, 255]));
        let out = cover_fit(&src, 40, 40);
        assert_eq!((out.width(), out.height()), (40, 40));
    }
}
