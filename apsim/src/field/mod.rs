//! Incident light on the aperture and the masks that shape it

pub mod light_field;
pub mod mask;

pub use light_field::{ExtendedSource, FieldStage, IncidentLightField, PointSource};
pub use mask::{Annular, Circular, SpiderVaned, TransmissionMask};
