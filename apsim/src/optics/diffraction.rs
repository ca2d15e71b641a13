//! Fraunhofer diffraction transform
//!
//! Converts the complex field just behind the aperture into focal plane
//! spectral flux. For each wavelength slice the field is zero-padded from the
//! aperture footprint out to the shared grid, Fourier transformed, shifted so
//! that zero spatial frequency sits at the grid centre, cropped to the field
//! of view window and finally squared and scaled into physical units.
//!
//! The forward DFT is left unnormalized (no `1/N`); the flux scales from the
//! grid planner already account for it.
//!
//! The transform is generic over the float precision of the incident field.
//! An `f32` field is transformed, squared and scaled in `f32`.

use ndarray::{s, stack, Array2, Array3, ArrayView2, ArrayView3, Axis};
use num_complex::Complex;
use rayon::prelude::*;
use rustfft::{Fft, FftNum, FftPlanner};
use std::sync::Arc;

use super::error::OpticsError;
use super::grid::{GridPlan, IndexRange};

/// Compute the image plane flux inside the field of view window.
///
/// # Arguments
/// * `field` - Incident field with shape `(wavelengths, footprint, footprint)`
/// * `plan` - Grid plan the field was sampled on
///
/// # Returns
/// Flux density with shape `(wavelengths, window_y, window_x)`, wavelength
/// order matching the input.
///
/// # Errors
/// [`OpticsError::FieldShapeMismatch`] if the field does not have exactly the
/// planned shape. Nothing is padded or truncated to make it fit.
pub fn transform<T: FftNum>(
    field: ArrayView3<'_, Complex<T>>,
    plan: &GridPlan,
) -> Result<Array3<T>, OpticsError> {
    let image = plan.image();
    transform_window(field, plan, image.range_y, image.range_x)
}

/// Compute the image plane flux over the full, uncropped grid.
///
/// Mostly useful for checking energy conservation independently of the
/// field of view crop.
pub fn transform_full<T: FftNum>(
    field: ArrayView3<'_, Complex<T>>,
    plan: &GridPlan,
) -> Result<Array3<T>, OpticsError> {
    let full = IndexRange::new(0, plan.aperture().n_grid_cells);
    transform_window(field, plan, full, full)
}

fn transform_window<T: FftNum>(
    field: ArrayView3<'_, Complex<T>>,
    plan: &GridPlan,
    range_y: IndexRange,
    range_x: IndexRange,
) -> Result<Array3<T>, OpticsError> {
    let (n_wavelengths, n_y, n_x) = plan.field_shape();
    if field.dim() != (n_wavelengths, n_y, n_x) {
        return Err(OpticsError::shape_mismatch(
            &[n_wavelengths, n_y, n_x],
            field.shape(),
        ));
    }

    let scales = plan
        .flux_scale()
        .as_slice()
        .iter()
        .map(|&scale| {
            T::from_f64(scale).ok_or(OpticsError::InvalidParameter {
                name: "flux_scale",
                value: scale,
            })
        })
        .collect::<Result<Vec<T>, _>>()?;

    let n = plan.aperture().n_grid_cells;
    let n_pad = plan.aperture().footprint.n_pad_cells;
    let fft = FftPlanner::<T>::new().plan_fft_forward(n);

    let slices: Vec<Array2<T>> = (0..n_wavelengths)
        .into_par_iter()
        .map(|w| {
            let coefficients = fft2(field.index_axis(Axis(0), w), n, n_pad, &fft);
            shifted_flux(&coefficients, range_y, range_x, scales[w])
        })
        .collect();

    let views: Vec<ArrayView2<'_, T>> = slices.iter().map(|slice| slice.view()).collect();
    stack(Axis(0), &views).map_err(|_| {
        OpticsError::shape_mismatch(
            &[n_wavelengths, range_y.len(), range_x.len()],
            &[slices.len()],
        )
    })
}

/// Zero-pad a footprint slice to `n × n` and take its forward 2D DFT.
///
/// Rows are transformed in one batched call, then the array is transposed so
/// the columns become contiguous rows for the second pass.
fn fft2<T: FftNum>(
    slice: ArrayView2<'_, Complex<T>>,
    n: usize,
    n_pad: usize,
    fft: &Arc<dyn Fft<T>>,
) -> Array2<Complex<T>> {
    let zero = Complex::new(T::zero(), T::zero());
    let (rows, cols) = slice.dim();

    let mut padded = Array2::from_elem((n, n), zero);
    padded
        .slice_mut(s![n_pad..n_pad + rows, n_pad..n_pad + cols])
        .assign(&slice);

    fft_rows(&mut padded, fft);
    let mut transposed = padded.t().as_standard_layout().into_owned();
    fft_rows(&mut transposed, fft);

    transposed.reversed_axes()
}

fn fft_rows<T: FftNum>(array: &mut Array2<Complex<T>>, fft: &Arc<dyn Fft<T>>) {
    match array.as_slice_mut() {
        Some(buffer) => fft.process(buffer),
        None => {
            for mut row in array.rows_mut() {
                let mut buffer = row.to_vec();
                fft.process(&mut buffer);
                row.iter_mut().zip(buffer).for_each(|(dst, src)| *dst = src);
            }
        }
    }
}

/// Read the `fftshift`ed coefficients inside the window and convert them to flux.
fn shifted_flux<T: FftNum>(
    coefficients: &Array2<Complex<T>>,
    range_y: IndexRange,
    range_x: IndexRange,
    scale: T,
) -> Array2<T> {
    let n = coefficients.nrows();
    Array2::from_shape_fn((range_y.len(), range_x.len()), |(iy, ix)| {
        let y = fftshift_index(range_y.start + iy, n);
        let x = fftshift_index(range_x.start + ix, n);
        coefficients[[y, x]].norm_sqr() * scale
    })
}

/// Index into an unshifted DFT for position `i` of the shifted output
fn fftshift_index(i: usize, n: usize) -> usize {
    (i + n - n / 2) % n
}
