//! Scan-point generation over a declared coefficient space.
//!
//! A sweep is described by a set of [`DegreeOfFreedom`] axes, each mapping a
//! single scalar to one or more underlying coefficients at fixed relative
//! weights. [`generate`] turns the axes plus a sampling [`Strategy`] into the
//! ordered list of [`ScanPoint`]s for one job, with reference-point and
//! anchor bookkeeping applied uniformly across strategies.

pub mod dof;
pub mod generate;
pub mod point;

pub use dof::DegreeOfFreedom;
pub use generate::{
    calculate_start_point, generate, linspace, linspace_with, recommended_random_samples,
    Strategy, DEFAULT_RAND_FACTOR,
};
pub use point::{round_to, ScanPoint, CANONICAL_DECIMALS};
