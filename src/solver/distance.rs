//! Luminosity distance.
//!
//! `D_L(z) = (1 + z) · c · ∫₀^z dz′ / H(z′)` in Mpc. Every integrand evaluation
//! is a single-point Hubble solve from `z_ini`, so one distance costs one ODE
//! integration per quadrature node.

use tracing::warn;

use crate::error::ModelError;
use crate::math::quad::{self, QuadOptions};
use crate::models::SPEED_OF_LIGHT_KM_S;
use crate::solver::hubble::{HubbleSolver, x_from_redshift};

/// Luminosity distance evaluator bound to a Hubble solver.
#[derive(Debug, Clone)]
pub struct DistanceEvaluator<'a> {
    pub solver: &'a HubbleSolver,
    pub quad: QuadOptions,
}

impl<'a> DistanceEvaluator<'a> {
    pub fn new(solver: &'a HubbleSolver, quad: QuadOptions) -> Self {
        Self { solver, quad }
    }

    /// `D_L` in Mpc for redshift `z >= 0`.
    pub fn luminosity_distance(
        &self,
        omega_dm_ini: f64,
        omega_lambda: f64,
        tau: f64,
        z: f64,
    ) -> Result<f64, ModelError> {
        if !(z.is_finite() && z >= 0.0) {
            return Err(ModelError::InvalidRedshift { z });
        }

        let integrand = |zp: f64| -> Result<f64, ModelError> {
            let x = x_from_redshift(zp);
            let h = self.solver.hubble_history(omega_dm_ini, omega_lambda, tau, &[x])?;
            Ok(1.0 / h[0])
        };
        let result = quad::integrate(integrand, 0.0, z, &self.quad)?;

        if !result.converged {
            warn!(
                z,
                omega_dm = omega_dm_ini,
                omega_lambda,
                tau,
                abs_error = result.abs_error,
                "distance quadrature hit the subinterval limit"
            );
        }
        if !result.value.is_finite() {
            return Err(ModelError::NonFinite {
                what: "luminosity distance",
                x: x_from_redshift(z),
            });
        }

        Ok((1.0 + z) * SPEED_OF_LIGHT_KM_S * result.value)
    }

    /// Distance modulus `μ = 5 log₁₀(D_L / Mpc) + 25`.
    pub fn distance_modulus(
        &self,
        omega_dm_ini: f64,
        omega_lambda: f64,
        tau: f64,
        z: f64,
    ) -> Result<f64, ModelError> {
        let dl = self.luminosity_distance(omega_dm_ini, omega_lambda, tau, z)?;
        if !(dl > 0.0) {
            return Err(ModelError::InvalidRedshift { z });
        }
        Ok(5.0 * dl.log10() + 25.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_redshift_gives_zero_distance() {
        let solver = HubbleSolver::default();
        let eval = DistanceEvaluator::new(&solver, QuadOptions::default());
        let dl = eval.luminosity_distance(0.2, 0.7, 500.0, 0.0).unwrap();
        assert_eq!(dl, 0.0);
    }

    #[test]
    fn low_redshift_follows_hubble_law() {
        // D_L ≈ c z / H0 for z << 1.
        let solver = HubbleSolver::default();
        let eval = DistanceEvaluator::new(&solver, QuadOptions::default());
        let h0 = solver.hubble_today(0.2, 0.7, 500.0).unwrap();
        let z = 1e-3;
        let dl = eval.luminosity_distance(0.2, 0.7, 500.0, z).unwrap();
        let approx = SPEED_OF_LIGHT_KM_S * z / h0;
        assert!(((dl - approx) / approx).abs() < 3e-3);
    }

    #[test]
    fn distance_grows_with_redshift() {
        let solver = HubbleSolver::default();
        let eval = DistanceEvaluator::new(&solver, QuadOptions::default());
        let mut prev = 0.0;
        for &z in &[0.1, 0.5, 1.0] {
            let dl = eval.luminosity_distance(0.2, 0.7, 500.0, z).unwrap();
            assert!(dl > prev);
            prev = dl;
        }
    }

    #[test]
    fn negative_redshift_is_rejected() {
        let solver = HubbleSolver::default();
        let eval = DistanceEvaluator::new(&solver, QuadOptions::default());
        assert!(eval.luminosity_distance(0.2, 0.7, 500.0, -0.1).is_err());
        assert!(eval.distance_modulus(0.2, 0.7, 500.0, 0.0).is_err());
    }
}
