//! Numerical building blocks: adaptive ODE integration and quadrature.

pub mod ode;
pub mod quad;

pub use ode::{OdeOptions, OdeSystem};
pub use quad::{QuadOptions, QuadResult};
