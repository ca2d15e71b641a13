//! Pull-based production of short-exposure frames
//!
//! [`FrameProducer`] drives a [`PhaseScreen`] through time: every frame it
//! replaces the modulation of the incident field with the current screen and
//! diffracts the modulated field. Frames are pulled as an iterator so the
//! caller decides whether to display, save or accumulate them.

use log::debug;
use ndarray::Array3;

use super::phase_screen::PhaseScreen;
use crate::field::light_field::FieldStage;
use crate::optics::error::OpticsError;
use crate::optics::fraunhofer::FraunhoferOptics;

/// One short exposure
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: usize,
    /// Screen time at which the frame was taken (s)
    pub time: f64,
    /// Image plane spectral flux, shape `(wavelengths, y, x)`
    pub fluxes: Array3<f64>,
}

pub struct FrameProducer<'a, S: PhaseScreen + ?Sized> {
    optics: &'a mut FraunhoferOptics,
    screen: &'a mut S,
    time_step: f64,
    n_frames: usize,
    index: usize,
}

impl<'a, S: PhaseScreen + ?Sized> FrameProducer<'a, S> {
    /// Produce `n_frames` frames `time_step` seconds apart.
    ///
    /// The first frame uses the screen as it is; every later frame advances it
    /// by `time_step` first.
    pub fn new(
        optics: &'a mut FraunhoferOptics,
        screen: &'a mut S,
        time_step: f64,
        n_frames: usize,
    ) -> Self {
        Self {
            optics,
            screen,
            time_step,
            n_frames,
            index: 0,
        }
    }

    /// Cover `duration` seconds inclusive of both ends
    ///
    /// # Errors
    /// [`OpticsError::InvalidParameter`] for a `time_step` that is not finite
    /// and positive, or a `duration` that is negative, not finite or needs
    /// more frames than can be counted.
    pub fn for_duration(
        optics: &'a mut FraunhoferOptics,
        screen: &'a mut S,
        time_step: f64,
        duration: f64,
    ) -> Result<Self, OpticsError> {
        if !(time_step.is_finite() && time_step > 0.0) {
            return Err(OpticsError::InvalidParameter {
                name: "time_step",
                value: time_step,
            });
        }
        let steps = (duration / time_step).ceil();
        if !(duration.is_finite() && duration >= 0.0) || steps >= usize::MAX as f64 {
            return Err(OpticsError::InvalidParameter {
                name: "duration",
                value: duration,
            });
        }
        Ok(Self::new(optics, screen, time_step, steps as usize + 1))
    }

    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    fn render(&mut self) -> Result<Frame, OpticsError> {
        if self.index > 0 {
            self.screen.advance(self.time_step);
        }
        let modulation = self.screen.perturbation_field()?;
        self.optics.modulate_incident_light_field(modulation)?;
        let fluxes = self.optics.compute_image_fluxes(FieldStage::Modulated)?;

        debug!("Frame {} at t = {:.4} s", self.index, self.screen.time());
        Ok(Frame {
            index: self.index,
            time: self.screen.time(),
            fluxes,
        })
    }
}

impl<S: PhaseScreen + ?Sized> Iterator for FrameProducer<'_, S> {
    type Item = Result<Frame, OpticsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.n_frames {
            return None;
        }
        let frame = self.render();
        self.index += 1;
        if frame.is_err() {
            // Stop after the first failure
            self.n_frames = self.index;
        }
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.n_frames - self.index;
        (remaining, Some(remaining))
    }
}

/// Running sum of flux frames for long-exposure images
#[derive(Debug, Clone, Default)]
pub struct FluxAccumulator {
    sum: Option<Array3<f64>>,
    count: usize,
}

impl FluxAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, fluxes: &Array3<f64>) -> Result<(), OpticsError> {
        match &mut self.sum {
            Some(sum) => {
                if sum.shape() != fluxes.shape() {
                    return Err(OpticsError::shape_mismatch(sum.shape(), fluxes.shape()));
                }
                *sum += fluxes;
            }
            None => self.sum = Some(fluxes.clone()),
        }
        self.count += 1;
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn sum(&self) -> Option<&Array3<f64>> {
        self.sum.as_ref()
    }

    /// Mean flux over all added frames, `None` before the first frame
    pub fn mean(&self) -> Option<Array3<f64>> {
        self.sum.as_ref().map(|sum| sum / self.count as f64)
    }
}
