pub mod resolver;
pub mod windows;

pub use resolver::{EffectiveLimits, resolve};
pub use windows::{Admission, LimitKind, RateWindowTracker};
