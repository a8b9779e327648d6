//! Per-layer color grading.
//!
//! All stages run in f32 and collapse to u8 once, through a gamma LUT, so
//! the same input bytes always produce the same output bytes.

use image::RgbaImage;
use sunlapse_config::GradeParams;

/// Rec.601 luma weights; the grade pivots saturation around this.
const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

/// Apply the full grade: saturation, brightness, hue rotation, tint
/// overlay, affine contrast, gamma. Alpha is untouched.
pub fn apply(mut image: RgbaImage, params: &GradeParams) -> RgbaImage {
    let gamma_lut = gamma_lut(params.gamma);
    let hue = hue_matrix(params.hue_shift_deg);
    let tint = [
        f32::from(params.tint[0]),
        f32::from(params.tint[1]),
        f32::from(params.tint[2]),
    ];
    let tint_alpha = params.tint_alpha.clamp(0.0, 1.0);

    for pixel in image.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let (mut r, mut g, mut b) =
            (f32::from(r), f32::from(g), f32::from(b));

        let luma = LUMA_R * r + LUMA_G * g + LUMA_B * b;
        r = luma + params.saturation * (r - luma);
        g = luma + params.saturation * (g - luma);
        b = luma + params.saturation * (b - luma);

        r *= params.brightness;
        g *= params.brightness;
        b *= params.brightness;

        let rotated = (
            hue[0][0] * r + hue[0][1] * g + hue[0][2] * b,
            hue[1][0] * r + hue[1][1] * g + hue[1][2] * b,
            hue[2][0] * r + hue[2][1] * g + hue[2][2] * b,
        );
        (r, g, b) = rotated;

        r = r * (1.0 - tint_alpha) + tint[0] * tint_alpha;
        g = g * (1.0 - tint_alpha) + tint[1] * tint_alpha;
        b = b * (1.0 - tint_alpha) + tint[2] * tint_alpha;

        r = r * params.contrast_mul + params.contrast_off;
        g = g * params.contrast_mul + params.contrast_off;
        b = b * params.contrast_mul + params.contrast_off;

        pixel.0 = [
            gamma_lut[clamp_u8(r) as usize],
            gamma_lut[clamp_u8(g) as usize],
            gamma_lut[clamp_u8(b) as usize],
            a,
        ];
    }

    image
}

fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn gamma_lut(gamma: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if (gamma - 1.0).abs() < f32::EPSILON {
        for (i, slot) in lut.iter_mut().enumerate() {
            *slot = i as u8;
        }
        return lut;
    }
    let exponent = 1.0 / gamma;
    for (i, slot) in lut.iter_mut().enumerate() {
        let normalized = i as f32 / 255.0;
        *slot = clamp_u8(normalized.powf(exponent) * 255.0);
    }
    lut
}

/// Standard SVG/CSS hue-rotation matrix around the luma axis.
fn hue_matrix(degrees: f32) -> [[f32; 3]; 3] {
    let radians = degrees.to_radians();
    let cos = radians.cos();
    let sin = radians.sin();
    [
        [
            0.213 + cos * 0.787 - sin * 0.213,
            0.715 - cos * 0.715 - sin * 0.715,
            0.072 - cos * 0.072 + sin * 0.928,
        ],
        [
            0.213 - cos * 0.213 + sin * 0.143,
            0.715 + cos * 0.285 + sin * 0.140,
            0.072 - cos * 0.072 - sin * 0.283,
        ],
        [
            0.213 - cos * 0.213 - sin * 0.787,
            0.715 - cos * 0.715 + sin * 0.715,
            0.072 + cos * 0.928 + sin * 0.072,
        ],
    ]
}
