//! Frame compositing: grade both layers, feather the disk, screen-blend on
//! a shared canvas, crop, and encode one JPEG.
//!
//! The whole pipeline is a pure function of its input bytes and the frozen
//! composite configuration; identical inputs produce identical output bytes.

mod grade;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgba, RgbaImage, imageops};
use sunlapse_config::CompositeConfig;

use crate::error::{PipelineError, Result};

/// Compose one frame from the two raw source bodies.
pub fn compose(
    corona_bytes: &[u8],
    disk_bytes: &[u8],
    config: &CompositeConfig,
) -> Result<Vec<u8>> {
    let corona = decode(corona_bytes, "corona")?;
    let disk = decode(disk_bytes, "disk")?;

    let corona = grade::apply(corona, &config.corona_grade);
    let disk = grade::apply(disk, &config.disk_grade);

    let size = config.disk_final_size;
    let mut disk =
        imageops::resize(&disk, size, size, imageops::FilterType::Lanczos3);
    feather(
        &mut disk,
        config.composite_radius as f32,
        config.feather_radius as f32,
    );

    let mut canvas = RgbaImage::from_pixel(
        config.canvas_width,
        config.canvas_height,
        Rgba([0, 0, 0, 0]),
    );
    place_centered(&mut canvas, &corona)?;
    screen_blend_centered(&mut canvas, &disk)?;

    let crop = config.crop;
    let cropped = imageops::crop_imm(
        &canvas,
        crop.left,
        crop.top,
        crop.width,
        crop.height,
    )
    .to_image();

    encode_jpeg(cropped, config.jpeg_quality)
}

fn decode(bytes: &[u8], layer: &str) -> Result<RgbaImage> {
    let image = image::load_from_memory(bytes).map_err(|err| {
        PipelineError::Composite(format!("{layer} failed to decode: {err}"))
    })?;
    Ok(image.to_rgba8())
}

/// Radial alpha ramp: opaque inside `radius - feather`, transparent at
/// `radius`, linear in between. Multiplied into the existing alpha.
fn feather(image: &mut RgbaImage, radius: f32, feather: f32) {
    let center_x = image.width() as f32 / 2.0;
    let center_y = image.height() as f32 / 2.0;
    let inner = radius - feather;

    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let dx = x as f32 + 0.5 - center_x;
        let dy = y as f32 + 0.5 - center_y;
        let distance = (dx * dx + dy * dy).sqrt();

        let factor = if distance <= inner {
            1.0
        } else if distance >= radius {
            0.0
        } else {
            1.0 - (distance - inner) / feather
        };

        pixel.0[3] = (f32::from(pixel.0[3]) * factor).round() as u8;
    }
}

/// Copy a layer onto the canvas center. The layer must fit the canvas; the
/// geometry is a frozen contract, so a mismatch is corrupt input.
fn place_centered(canvas: &mut RgbaImage, layer: &RgbaImage) -> Result<()> {
    let (left, top) = centered_offset(canvas, layer)?;
    for (x, y, pixel) in layer.enumerate_pixels() {
        canvas.put_pixel(left + x, top + y, *pixel);
    }
    Ok(())
}

/// Screen (inverted-multiply) blend of the layer onto the canvas center,
/// weighted by the layer's alpha.
fn screen_blend_centered(
    canvas: &mut RgbaImage,
    layer: &RgbaImage,
) -> Result<()> {
    let (left, top) = centered_offset(canvas, layer)?;
    for (x, y, pixel) in layer.enumerate_pixels() {
        let alpha = f32::from(pixel.0[3]) / 255.0;
        if alpha <= 0.0 {
            continue;
        }
        let under = canvas.get_pixel_mut(left + x, top + y);
        for channel in 0..3 {
            let base = f32::from(under.0[channel]);
            let over = f32::from(pixel.0[channel]);
            let screened = 255.0 - (255.0 - base) * (255.0 - over) / 255.0;
            under.0[channel] = (base * (1.0 - alpha) + screened * alpha)
                .round()
                .clamp(0.0, 255.0) as u8;
        }
        under.0[3] = under.0[3].max(pixel.0[3]);
    }
    Ok(())
}

fn centered_offset(
    canvas: &RgbaImage,
    layer: &RgbaImage,
) -> Result<(u32, u32)> {
    if layer.width() > canvas.width() || layer.height() > canvas.height() {
        return Err(PipelineError::Composite(format!(
            "layer {}x{} exceeds canvas {}x{}",
            layer.width(),
            layer.height(),
            canvas.width(),
            canvas.height()
        )));
    }
    Ok((
        (canvas.width() - layer.width()) / 2,
        (canvas.height() - layer.height()) / 2,
    ))
}

fn encode_jpeg(image: RgbaImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&rgb)
        .map_err(|err| {
            PipelineError::Composite(format!("jpeg encode failed: {err}"))
        })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sunlapse_config::CropRect;

    /// Small geometry that keeps the test pipeline fast while preserving
    /// all proportions of the production contract.
    fn small_config() -> CompositeConfig {
        CompositeConfig {
            disk_final_size: 96,
            composite_radius: 40,
            feather_radius: 10,
            canvas_width: 128,
            canvas_height: 96,
            crop: CropRect {
                left: 16,
                top: 8,
                width: 96,
                height: 80,
            },
            ..CompositeConfig::default()
        }
    }

    fn synthetic_png(width: u32, height: u32, seed: u8) -> Vec<u8> {
        let image = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([
                (x as u8).wrapping_mul(seed),
                (y as u8).wrapping_add(seed),
                seed,
                255,
            ])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .expect("encode fixture");
        bytes
    }

    #[test]
    fn output_decodes_to_crop_dimensions() {
        let config = small_config();
        let corona = synthetic_png(128, 96, 3);
        let disk = synthetic_png(96, 96, 5);

        let frame = compose(&corona, &disk, &config).unwrap();
        let decoded = image::load_from_memory(&frame).unwrap();
        assert_eq!(decoded.width(), config.crop.width);
        assert_eq!(decoded.height(), config.crop.height);
    }

    #[test]
    fn compose_is_byte_stable() {
        let config = small_config();
        let corona = synthetic_png(128, 96, 7);
        let disk = synthetic_png(96, 96, 11);

        let first = compose(&corona, &disk, &config).unwrap();
        let second = compose(&corona, &disk, &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn oversized_layer_is_a_composite_error() {
        let config = small_config();
        let corona = synthetic_png(256, 256, 3);
        let disk = synthetic_png(96, 96, 5);

        let err = compose(&corona, &disk, &config).unwrap_err();
        assert!(matches!(err, PipelineError::Composite(_)));
    }

    #[test]
    fn garbage_bytes_are_a_composite_error() {
        let config = small_config();
        let err =
            compose(b"not an image", b"also not", &config).unwrap_err();
        assert!(matches!(err, PipelineError::Composite(_)));
    }

    #[test]
    fn feather_fades_to_transparent_at_radius() {
        let mut disk = RgbaImage::from_pixel(96, 96, Rgba([80, 80, 80, 255]));
        feather(&mut disk, 40.0, 10.0);

        let center = disk.get_pixel(48, 48).0[3];
        assert_eq!(center, 255);

        // Corner sits well outside the radius.
        let corner = disk.get_pixel(0, 0).0[3];
        assert_eq!(corner, 0);

        // A pixel inside the ramp is partially transparent.
        let ramp = disk.get_pixel(48 + 35, 48).0[3];
        assert!(ramp > 0 && ramp < 255);
    }

    #[test]
    fn screen_blend_brightens_never_darkens() {
        let mut canvas =
            RgbaImage::from_pixel(16, 16, Rgba([100, 100, 100, 255]));
        let layer = RgbaImage::from_pixel(16, 16, Rgba([60, 60, 60, 255]));
        screen_blend_centered(&mut canvas, &layer).unwrap();

        let blended = canvas.get_pixel(8, 8).0;
        assert!(blended[0] >= 100);
        // screen(100, 60) = 255 - 155*195/255 = 136 (rounded).
        assert_eq!(blended[0], 136);
    }
}
