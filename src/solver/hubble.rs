//! Hubble history: integrate the decay model from `z_ini` to the query points.
//!
//! The integrator only moves forward, so queries are visited in ascending `x`
//! and scattered back into the caller's order. The initial coordinate is
//! prepended to the output list (its state is the initial condition itself) and
//! that leading entry is dropped before returning.

use crate::error::ModelError;
use crate::math::ode::{self, OdeOptions};
use crate::models::{DecayModel, HUBBLE_NORM, KM_S_MPC, ModelConstants};

/// Solver for `H(x)` given `(ω_dm,I, ω_Λ, τ)`.
#[derive(Debug, Clone, Default)]
pub struct HubbleSolver {
    pub constants: ModelConstants,
    pub ode: OdeOptions,
}

impl HubbleSolver {
    pub fn new(constants: ModelConstants, ode: OdeOptions) -> Self {
        Self { constants, ode }
    }

    /// `H(x)` in km/s/Mpc at each query coordinate `x = ln a`.
    pub fn hubble_history(
        &self,
        omega_dm_ini: f64,
        omega_lambda: f64,
        tau: f64,
        xs: &[f64],
    ) -> Result<Vec<f64>, ModelError> {
        if !(omega_dm_ini.is_finite() && omega_dm_ini > 0.0) {
            return Err(ModelError::InvalidParameter {
                name: "omega_dm",
                value: omega_dm_ini,
            });
        }
        let model = DecayModel::new(tau, omega_lambda, &self.constants)?;
        let x_ini = self.constants.x_ini();

        for (index, &x) in xs.iter().enumerate() {
            if !x.is_finite() {
                return Err(ModelError::NonFiniteQuery { index });
            }
            if x < x_ini {
                return Err(ModelError::QueryBeforeInitial { x, x_ini });
            }
        }

        let mut order: Vec<usize> = (0..xs.len()).collect();
        order.sort_by(|&a, &b| xs[a].total_cmp(&xs[b]));

        let mut outputs = Vec::with_capacity(xs.len() + 1);
        outputs.push(x_ini);
        outputs.extend(order.iter().map(|&i| xs[i]));

        let y0 = [omega_dm_ini.ln(), self.constants.omega_dr_ini.ln()];
        let states = ode::integrate(&model, x_ini, y0, &outputs, &self.ode)?;

        let mut out = vec![0.0; xs.len()];
        for (&slot, (&x, state)) in order.iter().zip(outputs.iter().zip(states.iter()).skip(1)) {
            let h = self.hubble_from_state(&model, x, state)?;
            out[slot] = h;
        }
        Ok(out)
    }

    /// Present-day `H0` (`x = 0`).
    pub fn hubble_today(&self, omega_dm_ini: f64, omega_lambda: f64, tau: f64) -> Result<f64, ModelError> {
        let h = self.hubble_history(omega_dm_ini, omega_lambda, tau, &[0.0])?;
        Ok(h[0])
    }

    fn hubble_from_state(&self, model: &DecayModel<'_>, x: f64, state: &[f64; 2]) -> Result<f64, ModelError> {
        let e = model.expansion_rate(x, state[0].exp(), state[1].exp())?;
        let h = e * (HUBBLE_NORM / KM_S_MPC);
        if !h.is_finite() {
            return Err(ModelError::NonFinite { what: "Hubble parameter", x });
        }
        Ok(h)
    }
}

/// `x = ln(1 / (1 + z))`.
pub fn x_from_redshift(z: f64) -> f64 {
    (1.0 / (1.0 + z)).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_order_does_not_matter() {
        let solver = HubbleSolver::default();
        let xs = [0.0, -1.2, -0.3, -2.0];
        let h = solver.hubble_history(0.2, 0.7, 500.0, &xs).unwrap();

        let mut sorted = xs;
        sorted.sort_by(|a, b| a.total_cmp(b));
        let h_sorted = solver.hubble_history(0.2, 0.7, 500.0, &sorted).unwrap();

        for (x, hx) in xs.iter().zip(h.iter()) {
            let j = sorted.iter().position(|s| s == x).unwrap();
            assert!((hx - h_sorted[j]).abs() < 1e-9 * hx.abs());
        }
    }

    #[test]
    fn initial_coordinate_recovers_initial_condition() {
        let solver = HubbleSolver::default();
        let c = &solver.constants;
        let x_ini = c.x_ini();
        let h = solver.hubble_history(0.2, 0.7, 500.0, &[x_ini]).unwrap();
        let expected = (0.2 + c.omega_dr_ini + 0.7 + c.omega_b(x_ini) + c.omega_r(x_ini)).sqrt() * 100.0;
        assert!((h[0] - expected).abs() < 1e-9 * expected);
    }

    #[test]
    fn slow_decay_dilutes_like_matter_and_radiation() {
        // With τ huge the decay term is negligible: ln ω_dm falls by 3 per e-fold
        // and ln ω_dr by 4.
        let solver = HubbleSolver::default();
        let c = &solver.constants;
        let x_ini = c.x_ini();
        let (om, ol, tau) = (1e8, 0.7, 1e12);
        let xs = [-2.0, -0.5, 0.0];
        let h = solver.hubble_history(om, ol, tau, &xs).unwrap();
        for (&x, &hx) in xs.iter().zip(h.iter()) {
            let dm = om * (-3.0 * (x - x_ini)).exp();
            let dr = c.omega_dr_ini * (-4.0 * (x - x_ini)).exp();
            let expected = (dm + dr + ol + c.omega_b(x) + c.omega_r(x)).sqrt() * 100.0;
            assert!(((hx - expected) / expected).abs() < 1e-6, "x={x}: {hx} vs {expected}");
        }
    }

    #[test]
    fn decay_lowers_matter_density_today() {
        let solver = HubbleSolver::default();
        let stable = solver.hubble_today(1e8, 0.7, 1e12).unwrap();
        let decaying = solver.hubble_today(1e8, 0.7, 0.05).unwrap();
        assert!(decaying < stable);
    }

    #[test]
    fn fast_decay_from_large_initial_density_integrates() {
        // The decay term for ln ω_dr starts near 1e5 per e-fold at these τ.
        let solver = HubbleSolver::default();
        let stable = solver.hubble_today(1e8, 0.7, 1e12).unwrap();
        for &tau in &[1e-3, 1e-2, 0.05, 0.1, 0.5, 10.0] {
            let h0 = solver.hubble_today(1e8, 0.7, tau).unwrap();
            assert!(h0.is_finite() && h0 > 0.0, "tau={tau}: {h0}");
            assert!(h0 < stable, "tau={tau}: {h0} vs {stable}");
        }
    }

    #[test]
    fn queries_before_initial_condition_fail() {
        let solver = HubbleSolver::default();
        let err = solver
            .hubble_history(0.2, 0.7, 500.0, &[x_from_redshift(2000.0)])
            .unwrap_err();
        assert!(matches!(err, ModelError::QueryBeforeInitial { .. }));
    }

    #[test]
    fn empty_query_returns_empty_history() {
        let solver = HubbleSolver::default();
        assert!(solver.hubble_history(0.2, 0.7, 500.0, &[]).unwrap().is_empty());
    }
}
