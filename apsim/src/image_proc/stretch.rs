//! Tone mapping of flux images for display
//!
//! Focal plane fluxes span many orders of magnitude; these functions map them
//! to display levels in `[0, 1]`. The midtones transfer function used by
//! [`midtone_stretch`] and [`autostretch`] is
//!
//! ```text
//! mtf(x, m) = (m - 1) x / ((2m - 1) x - m)
//! ```
//!
//! which keeps 0 and 1 fixed and sends the level `m` to 0.5.

use image::{ImageBuffer, Luma};
use ndarray::{Array2, ArrayView2};

/// Midtones transfer function for a single level
pub fn midtones_transfer(x: f64, balance: f64) -> f64 {
    (balance - 1.0) * x / ((2.0 * balance - 1.0) * x - balance)
}

/// Map `black` to 0 and `white` to 1, clamping everything outside.
///
/// A degenerate range (`white <= black`) maps the whole image to 0.5.
pub fn linear_stretch(image: ArrayView2<'_, f64>, black: f64, white: f64) -> Array2<f64> {
    if white <= black {
        return Array2::from_elem(image.dim(), 0.5);
    }
    let range = white - black;
    image.mapv(|v| ((v - black) / range).clamp(0.0, 1.0))
}

/// Linear stretch between the scaled image minimum and maximum
///
/// # Arguments
/// * `image` - Input flux image
/// * `black_scale` - Factor applied to the minimum to get the black point
/// * `white_scale` - Factor applied to the maximum to get the white point
pub fn histogram_clip(image: ArrayView2<'_, f64>, black_scale: f64, white_scale: f64) -> Array2<f64> {
    if image.is_empty() {
        return Array2::zeros(image.dim());
    }
    let (min, max) = image
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    linear_stretch(image, min * black_scale, max * white_scale)
}

/// Apply the midtones transfer function to an image with levels in `[0, 1]`
pub fn midtone_stretch(image: ArrayView2<'_, f64>, balance: f64) -> Array2<f64> {
    image.mapv(|v| midtones_transfer(v, balance).clamp(0.0, 1.0))
}

/// Clip to the full range, then stretch the midtones so the mean level lands
/// on `target_mean` (0.25 is a good default for star fields).
pub fn autostretch(image: ArrayView2<'_, f64>, target_mean: f64) -> Array2<f64> {
    let clipped = histogram_clip(image, 1.0, 1.0);
    if is_flat(image) {
        return clipped;
    }
    let mean = match clipped.mean() {
        Some(mean) if mean > 0.0 && mean < 1.0 => mean,
        _ => return clipped,
    };
    let balance = midtones_transfer(mean, target_mean);
    midtone_stretch(clipped.view(), balance)
}

fn is_flat(image: ArrayView2<'_, f64>) -> bool {
    let mut values = image.iter();
    match values.next() {
        Some(&first) => values.all(|&v| v == first),
        None => true,
    }
}

/// Clip to the full range and raise to `gamma`
pub fn gamma_correction(image: ArrayView2<'_, f64>, gamma: f64) -> Array2<f64> {
    let clipped = histogram_clip(image, 1.0, 1.0);
    if gamma == 0.5 {
        clipped.mapv(f64::sqrt)
    } else {
        clipped.mapv(|v| v.powf(gamma))
    }
}

/// Quantise display levels in `[0, 1]` to a 16-bit grayscale image.
///
/// Row 0 of the array is the bottom of the image (y grows upwards), so rows
/// are flipped to match the top-down pixel order of image files.
pub fn to_u16_image(levels: ArrayView2<'_, f64>) -> ImageBuffer<Luma<u16>, Vec<u16>> {
    let (height, width) = levels.dim();
    ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
        let row = height - 1 - y as usize;
        let level = levels[[row, x as usize]].clamp(0.0, 1.0);
        Luma([(level * u16::MAX as f64).round() as u16])
    })
}
