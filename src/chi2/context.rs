//! Chi-square evaluators bound to an immutable context.
//!
//! The context is built once per run (datasets, inverse covariance, local `H0`
//! measurement, solver settings) and then shared read-only by every grid cell.

use nalgebra::DMatrix;

use crate::chi2::stats::{covariance_chi2, diagonal_chi2};
use crate::domain::{Dataset, Observable, ObservableSet, ParamPoint};
use crate::error::ModelError;
use crate::math::QuadOptions;
use crate::solver::{DistanceEvaluator, HubbleSolver, x_from_redshift};

/// A single local Hubble constant measurement in km/s/Mpc.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct H0Measurement {
    pub value: f64,
    pub sigma: f64,
}

impl Default for H0Measurement {
    fn default() -> Self {
        Self {
            value: 73.8,
            sigma: 2.4,
        }
    }
}

/// Supernova data plus the optional inverse covariance aligned with it.
#[derive(Debug, Clone)]
pub struct SneData {
    pub dataset: Dataset,
    pub inv_cov: Option<DMatrix<f64>>,
}

/// Everything the evaluators need, fixed for the whole run.
#[derive(Debug, Clone)]
pub struct ChiSquareContext {
    solver: HubbleSolver,
    quad: QuadOptions,
    ohd: Option<Dataset>,
    ohd_x: Vec<f64>,
    sne: Option<SneData>,
    h0: H0Measurement,
}

impl ChiSquareContext {
    /// Validate and assemble the context.
    ///
    /// Fails if an inverse covariance does not match the supernova count, or if
    /// a dataset contains a non-positive `σ` or negative redshift.
    pub fn new(
        solver: HubbleSolver,
        quad: QuadOptions,
        ohd: Option<Dataset>,
        sne: Option<SneData>,
        h0: H0Measurement,
    ) -> Result<Self, ModelError> {
        for ds in ohd.iter().chain(sne.iter().map(|s| &s.dataset)) {
            for p in &ds.points {
                if !(p.z.is_finite() && p.z >= 0.0) {
                    return Err(ModelError::InvalidRedshift { z: p.z });
                }
                if !(p.sigma.is_finite() && p.sigma > 0.0) {
                    return Err(ModelError::InvalidParameter {
                        name: "sigma",
                        value: p.sigma,
                    });
                }
            }
        }
        if let Some(sne) = &sne {
            if let Some(inv) = &sne.inv_cov {
                if inv.nrows() != sne.dataset.len() || inv.ncols() != sne.dataset.len() {
                    return Err(ModelError::DimensionMismatch {
                        what: "supernova inverse covariance",
                        expected: sne.dataset.len(),
                        actual: inv.nrows(),
                    });
                }
            }
        }
        if !(h0.sigma.is_finite() && h0.sigma > 0.0) {
            return Err(ModelError::InvalidParameter {
                name: "h0_sigma",
                value: h0.sigma,
            });
        }

        let ohd_x = ohd
            .as_ref()
            .map(|ds| ds.points.iter().map(|p| x_from_redshift(p.z)).collect())
            .unwrap_or_default();

        Ok(Self {
            solver,
            quad,
            ohd,
            ohd_x,
            sne,
            h0,
        })
    }

    pub fn solver(&self) -> &HubbleSolver {
        &self.solver
    }

    pub fn ohd(&self) -> Option<&Dataset> {
        self.ohd.as_ref()
    }

    pub fn sne(&self) -> Option<&SneData> {
        self.sne.as_ref()
    }

    pub fn has_sne_covariance(&self) -> bool {
        self.sne.as_ref().is_some_and(|s| s.inv_cov.is_some())
    }

    /// Check that every dataset the selector needs is loaded.
    pub fn ensure_supports(&self, set: ObservableSet) -> Result<(), ModelError> {
        if set.contains(Observable::Ohd) && self.ohd.is_none() {
            return Err(ModelError::MissingDataset {
                observable: "OHD",
                dataset: "OHD",
            });
        }
        if set.contains(Observable::Sne) && self.sne.is_none() {
            return Err(ModelError::MissingDataset {
                observable: "SNe",
                dataset: "supernova",
            });
        }
        Ok(())
    }

    /// OHD chi-square from one batched Hubble solve.
    pub fn chi2_ohd(&self, p: &ParamPoint) -> Result<f64, ModelError> {
        let ds = self.ohd.as_ref().ok_or(ModelError::MissingDataset {
            observable: "OHD",
            dataset: "OHD",
        })?;
        let predicted = self
            .solver
            .hubble_history(p.omega_dm, p.omega_lambda, p.tau, &self.ohd_x)?;
        diagonal_chi2(&predicted, &ds.values(), &ds.sigmas())
    }

    /// Supernova chi-square; covariance form when an inverse covariance is loaded.
    pub fn chi2_sne(&self, p: &ParamPoint) -> Result<f64, ModelError> {
        let sne = self.sne.as_ref().ok_or(ModelError::MissingDataset {
            observable: "SNe",
            dataset: "supernova",
        })?;
        let mu = self.distance_moduli(p, &sne.dataset)?;
        match &sne.inv_cov {
            Some(inv) => covariance_chi2(&mu, &sne.dataset.values(), inv),
            None => diagonal_chi2(&mu, &sne.dataset.values(), &sne.dataset.sigmas()),
        }
    }

    /// Supernova chi-square using only the per-point `σ`, even if a covariance is loaded.
    pub fn chi2_sne_diagonal(&self, p: &ParamPoint) -> Result<f64, ModelError> {
        let sne = self.sne.as_ref().ok_or(ModelError::MissingDataset {
            observable: "SNe",
            dataset: "supernova",
        })?;
        let mu = self.distance_moduli(p, &sne.dataset)?;
        diagonal_chi2(&mu, &sne.dataset.values(), &sne.dataset.sigmas())
    }

    /// Local `H0` chi-square at `x = 0`.
    pub fn chi2_h0(&self, p: &ParamPoint) -> Result<f64, ModelError> {
        let h0 = self.solver.hubble_today(p.omega_dm, p.omega_lambda, p.tau)?;
        let r = (h0 - self.h0.value) / self.h0.sigma;
        Ok(r * r)
    }

    /// Density prior: always zero.
    pub fn chi2_density_prior(&self, _p: &ParamPoint) -> Result<f64, ModelError> {
        Ok(0.0)
    }

    pub fn evaluate(&self, observable: Observable, p: &ParamPoint) -> Result<f64, ModelError> {
        match observable {
            Observable::Ohd => self.chi2_ohd(p),
            Observable::Sne => self.chi2_sne(p),
            Observable::H0 => self.chi2_h0(p),
            Observable::DensityPrior => self.chi2_density_prior(p),
        }
    }

    /// Sum of the selector's members, each evaluated once.
    pub fn combined(&self, set: ObservableSet, p: &ParamPoint) -> Result<f64, ModelError> {
        let mut total = 0.0;
        for &observable in set.members() {
            total += self.evaluate(observable, p)?;
        }
        Ok(total)
    }

    fn distance_moduli(&self, p: &ParamPoint, ds: &Dataset) -> Result<Vec<f64>, ModelError> {
        let eval = DistanceEvaluator::new(&self.solver, self.quad.clone());
        ds.points
            .iter()
            .map(|obs| eval.distance_modulus(p.omega_dm, p.omega_lambda, p.tau, obs.z))
            .collect()
    }
}
