//! Background cosmology model.
//!
//! The model is a pure right-hand side so the solver code can stay generic.

pub mod cosmology;

pub use cosmology::*;
