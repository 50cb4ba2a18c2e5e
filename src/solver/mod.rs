//! Cosmological history solvers built on the decay model.
//!
//! - `hubble`: `H(x)` from an ODE integration starting at `z_ini`
//! - `distance`: luminosity distance and distance modulus via quadrature

pub mod distance;
pub mod hubble;

pub use distance::*;
pub use hubble::*;
