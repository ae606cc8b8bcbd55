use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma, RgbImage};

/// Images smaller than this are upscaled before masking.
const MIN_WIDTH: u32 = 300;
const MIN_HEIGHT: u32 = 150;

/// Fraction of mask pixels above which the color mask is trusted.
const COVERAGE_THRESHOLD: f64 = 0.003;

/// Final upscale applied to the binarized image before OCR.
const OCR_SCALE: u32 = 3;

/// Adaptive threshold parameters: Gaussian-weighted neighbourhood of 31 px
/// (sigma 5.0) and constant 5 subtracted from the local mean.
const ADAPTIVE_SIGMA: f32 = 5.0;
const ADAPTIVE_C: f32 = 5.0;

/// Which strategy produced the OCR image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreprocessMode {
    /// Red or white pixels isolated through HSV masks.
    ColorMask,
    /// Color mask too sparse; grayscale with local adaptive threshold.
    AdaptiveThreshold,
}

impl std::fmt::Display for PreprocessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreprocessMode::ColorMask => write!(f, "HSV_RED_WHITE"),
            PreprocessMode::AdaptiveThreshold => write!(f, "ADAPTIVE_THRESHOLD"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PreprocessInfo {
    pub mode: PreprocessMode,
    /// Fraction of pixels selected by the color mask; 0.0 on the fallback path.
    pub coverage: f64,
}

/// Turns a raw capture into a dark-on-light binarized image for Tesseract.
///
/// Large red or white glyphs on a dark background (death banners) are
/// isolated through HSV masks. When too few pixels match, the image goes
/// through a grayscale sharpen + adaptive threshold path instead.
///
/// The output always has some contrast: a uniform result is replaced by a
/// light canvas with a one-pixel dark border.
pub fn preprocess_for_ocr(img: &RgbImage) -> (GrayImage, PreprocessInfo) {
    let img = ensure_min_size(img);

    let red = red_mask(&img);
    let white = white_mask(&img);
    let combined = union(&red, &white);

    let cleaned = dilate(&close(&open(&combined)));
    let coverage = coverage(&cleaned);

    let (mut binary, info) = if coverage >= COVERAGE_THRESHOLD {
        let mut inverted = cleaned;
        imageops::invert(&mut inverted);
        (
            inverted,
            PreprocessInfo {
                mode: PreprocessMode::ColorMask,
                coverage,
            },
        )
    } else {
        (
            adaptive_binarize(&img),
            PreprocessInfo {
                mode: PreprocessMode::AdaptiveThreshold,
                coverage: 0.0,
            },
        )
    };

    ensure_contrast(&mut binary);
    let sharpened = sharpen(&binary);

    let (w, h) = sharpened.dimensions();
    let scaled = imageops::resize(&sharpened, w * OCR_SCALE, h * OCR_SCALE, FilterType::Lanczos3);

    (scaled, info)
}

/// Upscales so both dimensions reach the minimum, keeping the aspect ratio.
fn ensure_min_size(img: &RgbImage) -> RgbImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return RgbImage::new(MIN_WIDTH, MIN_HEIGHT);
    }
    if w >= MIN_WIDTH && h >= MIN_HEIGHT {
        return img.clone();
    }

    let scale = f64::max(MIN_WIDTH as f64 / w as f64, MIN_HEIGHT as f64 / h as f64);
    let new_w = ((w as f64 * scale).round() as u32).max(1);
    let new_h = ((h as f64 * scale).round() as u32).max(1);
    imageops::resize(img, new_w, new_h, FilterType::Lanczos3)
}

/// Converts RGB to 8-bit HSV with hue halved into 0..180.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let s = if max == 0.0 { 0.0 } else { 255.0 * delta / max };

    let mut h = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    let h = (h / 2.0).round().min(179.0) as u8;
    (h, s.round() as u8, max as u8)
}

/// Red hues at either end of the wheel with enough saturation and value.
fn red_mask(img: &RgbImage) -> GrayImage {
    mask_from(img, |h, s, v| (h <= 15 || h >= 165) && s >= 30 && v >= 30)
}

/// Bright, nearly unsaturated pixels.
fn white_mask(img: &RgbImage) -> GrayImage {
    mask_from(img, |_, s, v| s <= 30 && v >= 200)
}

fn mask_from(img: &RgbImage, select: impl Fn(u8, u8, u8) -> bool) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut output = ImageBuffer::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels() {
        let (h, s, v) = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
        let value = if select(h, s, v) { 255u8 } else { 0u8 };
        output.put_pixel(x, y, Luma([value]));
    }

    output
}

fn union(a: &GrayImage, b: &GrayImage) -> GrayImage {
    ImageBuffer::from_fn(a.width(), a.height(), |x, y| {
        Luma([a.get_pixel(x, y)[0].max(b.get_pixel(x, y)[0])])
    })
}

/// 2x2 structuring element. Erosion looks forward, dilation looks back, so
/// opening and closing leave shapes in place.
const ERODE_TAPS: [(i32, i32); 4] = [(0, 0), (1, 0), (0, 1), (1, 1)];
const DILATE_TAPS: [(i32, i32); 4] = [(0, 0), (-1, 0), (0, -1), (-1, -1)];

fn morph(mask: &GrayImage, taps: &[(i32, i32)], erode: bool) -> GrayImage {
    let (width, height) = mask.dimensions();
    ImageBuffer::from_fn(width, height, |x, y| {
        let mut acc = if erode { 255u8 } else { 0u8 };
        for (dx, dy) in taps {
            let nx = x as i32 + dx;
            let ny = y as i32 + dy;
            // Out-of-bounds neighbours are ignored
            if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                continue;
            }
            let v = mask.get_pixel(nx as u32, ny as u32)[0];
            acc = if erode { acc.min(v) } else { acc.max(v) };
        }
        Luma([acc])
    })
}

fn erode(mask: &GrayImage) -> GrayImage {
    morph(mask, &ERODE_TAPS, true)
}

fn dilate(mask: &GrayImage) -> GrayImage {
    morph(mask, &DILATE_TAPS, false)
}

/// Removes specks smaller than the kernel.
fn open(mask: &GrayImage) -> GrayImage {
    dilate(&erode(mask))
}

/// Fills pinholes smaller than the kernel.
fn close(mask: &GrayImage) -> GrayImage {
    erode(&dilate(mask))
}

fn coverage(mask: &GrayImage) -> f64 {
    let total = mask.width() as u64 * mask.height() as u64;
    if total == 0 {
        return 0.0;
    }
    let on = mask.pixels().filter(|p| p[0] > 0).count() as u64;
    on as f64 / total as f64
}

/// Grayscale, light blur, unsharp mask, then adaptive Gaussian threshold.
/// Returns dark text on a light background.
fn adaptive_binarize(img: &RgbImage) -> GrayImage {
    let gray = to_grayscale(img);
    let blurred = imageops::blur(&gray, 0.8);
    let soft = imageops::blur(&blurred, 2.0);

    // 1.5 * sharp - 0.5 * soft
    let unsharp: GrayImage = ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let a = blurred.get_pixel(x, y)[0] as f32;
        let b = soft.get_pixel(x, y)[0] as f32;
        Luma([(1.5 * a - 0.5 * b).round().clamp(0.0, 255.0) as u8])
    });

    let local_mean = imageops::blur(&unsharp, ADAPTIVE_SIGMA);
    let mut binary: GrayImage = ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let v = unsharp.get_pixel(x, y)[0] as f32;
        let t = local_mean.get_pixel(x, y)[0] as f32 - ADAPTIVE_C;
        Luma([if v > t { 255u8 } else { 0u8 }])
    });

    imageops::invert(&mut binary);
    binary
}

/// ITU-R BT.601 luma.
fn to_grayscale(img: &RgbImage) -> GrayImage {
    ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
        let p = img.get_pixel(x, y);
        let luma = 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32;
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// Replaces a uniform image with a light canvas framed by a dark border.
///
/// Flat input has no local contrast, so both binarization paths return a
/// single value for it (adaptive threshold yields solid black after the
/// invert). This frame is what keeps such frames from reaching Tesseract as
/// a uniform image; textured input never gets here.
fn ensure_contrast(img: &mut GrayImage) {
    let Some(first) = img.pixels().next().map(|p| p[0]) else {
        return;
    };
    if img.pixels().any(|p| p[0] != first) {
        return;
    }

    let (width, height) = img.dimensions();
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let border = x == 0 || y == 0 || x + 1 == width || y + 1 == height;
        *pixel = Luma([if border { 0u8 } else { 255u8 }]);
    }
}

/// 3x3 sharpen (center 9, neighbours -1) with clamped edges.
fn sharpen(img: &GrayImage) -> GrayImage {
    let (width, height) = img.dimensions();
    let at = |x: i64, y: i64| -> i32 {
        let cx = x.clamp(0, width as i64 - 1) as u32;
        let cy = y.clamp(0, height as i64 - 1) as u32;
        img.get_pixel(cx, cy)[0] as i32
    };

    ImageBuffer::from_fn(width, height, |x, y| {
        let (x, y) = (x as i64, y as i64);
        let mut sum = 9 * at(x, y);
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx != 0 || dy != 0 {
                    sum -= at(x + dx, y + dy);
                }
            }
        }
        Luma([sum.clamp(0, 255) as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn is_uniform(img: &GrayImage) -> bool {
        let first = img.get_pixel(0, 0)[0];
        img.pixels().all(|p| p[0] == first)
    }

    /// Dark background with a filled block of `color` in the middle.
    fn banner(color: Rgb<u8>) -> RgbImage {
        ImageBuffer::from_fn(400, 200, |x, y| {
            if (100..300).contains(&x) && (80..120).contains(&y) {
                color
            } else {
                Rgb([10, 10, 12])
            }
        })
    }

    #[test]
    fn test_rgb_to_hsv_primary_colors() {
        assert_eq!(rgb_to_hsv(255, 0, 0), (0, 255, 255));
        assert_eq!(rgb_to_hsv(0, 255, 0), (60, 255, 255));
        assert_eq!(rgb_to_hsv(0, 0, 255), (120, 255, 255));
        assert_eq!(rgb_to_hsv(128, 128, 128), (0, 0, 128));
    }

    #[test]
    fn test_red_text_uses_color_mask() {
        let (out, info) = preprocess_for_ocr(&banner(Rgb([200, 20, 20])));
        assert_eq!(info.mode, PreprocessMode::ColorMask);
        assert!(info.coverage >= COVERAGE_THRESHOLD);
        assert_eq!(out.dimensions(), (1200, 600));
        // Text pixels come out dark, background light
        assert!(out.get_pixel(600, 300)[0] < 64);
        assert!(out.get_pixel(60, 30)[0] > 192);
    }

    #[test]
    fn test_white_text_uses_color_mask() {
        let (_, info) = preprocess_for_ocr(&banner(Rgb([235, 235, 235])));
        assert_eq!(info.mode, PreprocessMode::ColorMask);
    }

    #[test]
    fn test_gray_image_falls_back_and_keeps_contrast() {
        let img: RgbImage = ImageBuffer::from_pixel(400, 200, Rgb([128, 128, 128]));
        let (out, info) = preprocess_for_ocr(&img);
        assert_eq!(info.mode, PreprocessMode::AdaptiveThreshold);
        assert_eq!(info.coverage, 0.0);
        assert!(!is_uniform(&out));
    }

    #[test]
    fn test_adaptive_path_binarizes_textured_input_by_itself() {
        // Light gray glyph on a darker gray field: no saturation, below the
        // white mask, so only the adaptive path can pick it up
        let img: RgbImage = ImageBuffer::from_fn(400, 200, |x, y| {
            if (180..220).contains(&x) && (90..110).contains(&y) {
                Rgb([170, 170, 170])
            } else {
                Rgb([60, 60, 60])
            }
        });

        let binary = adaptive_binarize(&img);
        assert!(!is_uniform(&binary));
        // Glyph dark, its surroundings light
        assert_eq!(binary.get_pixel(200, 100)[0], 0);
        assert!(binary.pixels().any(|p| p[0] == 255));

        let mut guarded = binary.clone();
        ensure_contrast(&mut guarded);
        assert_eq!(guarded, binary);

        let (_, info) = preprocess_for_ocr(&img);
        assert_eq!(info.mode, PreprocessMode::AdaptiveThreshold);
    }

    #[test]
    fn test_flat_input_binarizes_uniformly_before_the_frame() {
        let img: RgbImage = ImageBuffer::from_pixel(400, 200, Rgb([128, 128, 128]));
        assert!(is_uniform(&adaptive_binarize(&img)));
    }

    #[test]
    fn test_all_white_image_keeps_contrast() {
        let img: RgbImage = ImageBuffer::from_pixel(400, 200, Rgb([255, 255, 255]));
        let (out, info) = preprocess_for_ocr(&img);
        assert_eq!(info.mode, PreprocessMode::ColorMask);
        assert!(!is_uniform(&out));
    }

    #[test]
    fn test_small_input_is_upscaled() {
        let img: RgbImage = ImageBuffer::from_pixel(100, 30, Rgb([20, 20, 20]));
        let (out, _) = preprocess_for_ocr(&img);
        // 100x30 scaled by 5 -> 500x150, then 3x
        assert_eq!(out.dimensions(), (1500, 450));
    }

    #[test]
    fn test_open_removes_isolated_pixel() {
        let mut mask = GrayImage::new(10, 10);
        mask.put_pixel(5, 5, Luma([255]));
        assert!(open(&mask).pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_ensure_contrast_frames_uniform_image() {
        let mut img: GrayImage = ImageBuffer::from_pixel(5, 4, Luma([0]));
        ensure_contrast(&mut img);
        assert_eq!(img.get_pixel(0, 0)[0], 0);
        assert_eq!(img.get_pixel(2, 2)[0], 255);
        assert_eq!(img.get_pixel(4, 3)[0], 0);
    }
}
