//! Display processing of flux images

pub mod stretch;

pub use stretch::{
    autostretch, gamma_correction, histogram_clip, linear_stretch, midtone_stretch, to_u16_image,
};
