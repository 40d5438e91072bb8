//! Thomson and linear Compton X-ray sources.
//!
//! Models the photons produced when a relativistic electron bunch
//! collides with a laser pulse: angular flux density, spectra,
//! spectral brilliance, Stokes parameters and individual sampled
//! rays for downstream ray tracing.

pub mod constants;
pub mod geometry;
pub mod beam;
pub mod quadrature;
pub mod source;
pub mod setup;

mod error;
pub use error::SourceError;
