//! Decaying dark matter background model.
//!
//! Coordinate: `x = ln a` (`x = 0` today). State: `[ln ω_dm, ln ω_dr]`.
//! Baryons and radiation dilute in closed form:
//!
//! - `ω_b(x) = ω_b0 · e^(−3x)`
//! - `ω_r(x) = ω_r0 · e^(−4x)`
//!
//! With `E = sqrt(ω_dm + ω_dr + ω_Λ + ω_b + ω_r)` and dark matter decaying into
//! dark radiation at rate `1/(τE)`:
//!
//! - `d ln ω_dm / dx = −1/(τE) − 3`
//! - `d ln ω_dr / dx = e^(ln ω_dm − ln ω_dr)/(τE) − 4`
//!
//! Numerical notes:
//! - Between `z = 1000` and today the densities change by ~10 orders of
//!   magnitude, so the solver integrates their logarithms.
//! - [`DecayModel::derivative_linear`] keeps the un-logged form for reference;
//!   nothing integrates it.

use crate::error::ModelError;
use crate::math::OdeSystem;

/// Physical constants and the fixed early-universe initial condition.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConstants {
    /// Baryon density today.
    pub omega_b0: f64,
    /// Radiation density today.
    pub omega_r0: f64,
    /// Redshift of the initial condition.
    pub z_ini: f64,
    /// Dark radiation density at `z_ini`. No decay has happened yet, but it
    /// must be non-zero because the state is logarithmic.
    pub omega_dr_ini: f64,
}

impl Default for ModelConstants {
    fn default() -> Self {
        Self {
            omega_b0: 0.04,
            omega_r0: 4.94e-5,
            z_ini: 1000.0,
            omega_dr_ini: 1.0,
        }
    }
}

impl ModelConstants {
    /// `x_ini = ln(1 / (1 + z_ini))`.
    pub fn x_ini(&self) -> f64 {
        (1.0 / (1.0 + self.z_ini)).ln()
    }

    pub fn omega_b(&self, x: f64) -> f64 {
        self.omega_b0 * (-3.0 * x).exp()
    }

    pub fn omega_r(&self, x: f64) -> f64 {
        self.omega_r0 * (-4.0 * x).exp()
    }
}

/// Metre length of one megaparsec.
pub const MPC_METRES: f64 = 3.1e22;
/// 1 km/s/Mpc in s⁻¹.
pub const KM_S_MPC: f64 = 1000.0 / MPC_METRES;
/// Hubble normalisation `H_n = 100 km/s/Mpc` in s⁻¹; `τ` is measured in `1/H_n`.
pub const HUBBLE_NORM: f64 = 100.0 * KM_S_MPC;
/// Speed of light in km/s.
pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.46;

/// The ODE right-hand side for one `(τ, ω_Λ)` pair.
#[derive(Debug, Clone)]
pub struct DecayModel<'a> {
    pub tau: f64,
    pub omega_lambda: f64,
    pub constants: &'a ModelConstants,
}

impl<'a> DecayModel<'a> {
    pub fn new(tau: f64, omega_lambda: f64, constants: &'a ModelConstants) -> Result<Self, ModelError> {
        if !(tau.is_finite() && tau > 0.0) {
            return Err(ModelError::InvalidParameter { name: "tau", value: tau });
        }
        if !omega_lambda.is_finite() {
            return Err(ModelError::InvalidParameter {
                name: "omega_lambda",
                value: omega_lambda,
            });
        }
        Ok(Self {
            tau,
            omega_lambda,
            constants,
        })
    }

    /// Total density from un-logged dark matter / dark radiation values.
    pub fn total_density(&self, x: f64, omega_dm: f64, omega_dr: f64) -> f64 {
        omega_dm + omega_dr + self.omega_lambda + self.constants.omega_b(x) + self.constants.omega_r(x)
    }

    /// `E(x)`; rejects states whose total density is not a positive finite number.
    ///
    /// An infinite total is a [`ModelError::DensityOverflow`], which the
    /// integrator treats as an oversized trial step rather than a dead cell.
    pub fn expansion_rate(&self, x: f64, omega_dm: f64, omega_dr: f64) -> Result<f64, ModelError> {
        let total = self.total_density(x, omega_dm, omega_dr);
        if total.is_nan() {
            return Err(ModelError::NonFinite { what: "total density", x });
        }
        if total == f64::INFINITY {
            return Err(ModelError::DensityOverflow {
                x,
                omega_dm,
                omega_dr,
                tau: self.tau,
            });
        }
        if total <= 0.0 {
            return Err(ModelError::NonPositiveDensity {
                x,
                omega_dm,
                omega_dr,
                tau: self.tau,
            });
        }
        Ok(total.sqrt())
    }

    /// Derivative of `[ln ω_dm, ln ω_dr]` with respect to `x`.
    pub fn derivative(&self, x: f64, ln_state: &[f64; 2]) -> Result<[f64; 2], ModelError> {
        let [ln_dm, ln_dr] = *ln_state;
        let e = self.expansion_rate(x, ln_dm.exp(), ln_dr.exp())?;
        let rate = 1.0 / (self.tau * e);
        Ok([-rate - 3.0, (ln_dm - ln_dr).exp() * rate - 4.0])
    }

    /// Derivative of `[ω_dm, ω_dr]` (un-logged) with respect to `x`.
    pub fn derivative_linear(&self, x: f64, state: &[f64; 2]) -> Result<[f64; 2], ModelError> {
        let [dm, dr] = *state;
        let e = self.expansion_rate(x, dm, dr)?;
        let decay = dm / (self.tau * e);
        Ok([-decay - 3.0 * dm, decay - 4.0 * dr])
    }
}

impl OdeSystem<2> for DecayModel<'_> {
    fn rhs(&self, x: f64, y: &[f64; 2]) -> Result<[f64; 2], ModelError> {
        self.derivative(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x_ini_matches_redshift_1000() {
        let c = ModelConstants::default();
        assert!((c.x_ini() - (1.0_f64 / 1001.0).ln()).abs() < 1e-15);
    }

    #[test]
    fn hubble_norm_is_100_km_s_mpc() {
        assert!((HUBBLE_NORM / KM_S_MPC - 100.0).abs() < 1e-12);
    }

    #[test]
    fn derivative_is_finite_for_physical_parameters() {
        let c = ModelConstants::default();
        for &tau in &[1e-2, 1.0, 500.0, 1e6] {
            for &ol in &[0.0, 0.5, 0.7] {
                let model = DecayModel::new(tau, ol, &c).unwrap();
                for &x in &[c.x_ini(), -3.0, -1.0, 0.0] {
                    for &(dm, dr) in &[(0.1, 1.0), (0.2, 1e-6), (1e-12, 1e3)] {
                        let d = model
                            .derivative(x, &[f64::ln(dm), f64::ln(dr)])
                            .unwrap();
                        assert!(d[0].is_finite() && d[1].is_finite());
                        // Dark matter can only dilute at least as fast as matter.
                        assert!(d[0] <= -3.0);
                    }
                }
            }
        }
    }

    #[test]
    fn negative_total_density_is_rejected() {
        let c = ModelConstants::default();
        let model = DecayModel::new(100.0, -10.0, &c).unwrap();
        let err = model.derivative(0.0, &[0.1_f64.ln(), 0.1_f64.ln()]).unwrap_err();
        assert!(matches!(err, ModelError::NonPositiveDensity { .. }));

        let err = model.derivative_linear(0.0, &[0.1, 0.1]).unwrap_err();
        assert!(matches!(err, ModelError::NonPositiveDensity { .. }));
    }

    #[test]
    fn infinite_total_density_is_an_overflow() {
        let c = ModelConstants::default();
        let model = DecayModel::new(0.05, 0.7, &c).unwrap();
        let err = model.derivative(-6.9, &[18.4, 800.0]).unwrap_err();
        assert!(matches!(err, ModelError::DensityOverflow { .. }), "{err:?}");

        // Positive and finite but huge is still a valid state.
        assert!(model.derivative(-6.9, &[18.4, 700.0]).is_ok());
    }

    #[test]
    fn invalid_tau_is_rejected() {
        let c = ModelConstants::default();
        assert!(DecayModel::new(0.0, 0.7, &c).is_err());
        assert!(DecayModel::new(f64::NAN, 0.7, &c).is_err());
    }

    #[test]
    fn log_and_linear_forms_agree_by_chain_rule() {
        // d ln ω / dx = (dω/dx) / ω at a single point.
        let c = ModelConstants::default();
        let model = DecayModel::new(3.0, 0.7, &c).unwrap();
        let (dm, dr, x) = (0.3_f64, 0.02_f64, -0.5);
        let log_d = model.derivative(x, &[dm.ln(), dr.ln()]).unwrap();
        let lin_d = model.derivative_linear(x, &[dm, dr]).unwrap();
        assert!((log_d[0] - lin_d[0] / dm).abs() < 1e-12);
        assert!((log_d[1] - lin_d[1] / dr).abs() < 1e-12);
    }
}
