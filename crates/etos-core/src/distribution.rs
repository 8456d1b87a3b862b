//! Random distributions for lazily drawn attribute values
//!
//! A distribution is declared in a document (`Dist(Uniform(min: 1.0, max:
//! 2.0))`) and sampled from the simulation [`SimRng`] whenever the value's
//! scope asks for a fresh draw.

use crate::{Error, Result, SimRng};
use rand_distr::{Beta, Exp, Gamma, LogNormal, Normal, Pareto, Triangular, Weibull};
use serde::{Deserialize, Serialize};

fn zero() -> f64 {
    0.0
}

fn one() -> f64 {
    1.0
}

/// A parameterised probability distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Distribution {
    /// Uniform on [min, max)
    Uniform {
        #[serde(default = "zero")]
        min: f64,
        #[serde(default = "one")]
        max: f64,
    },
    /// Normal with mean `mu` and standard deviation `sigma`
    Normal {
        #[serde(default = "zero")]
        mu: f64,
        #[serde(default = "one")]
        sigma: f64,
    },
    /// Normal clamped at zero (for durations and velocities)
    PNormal {
        #[serde(default = "zero")]
        mu: f64,
        #[serde(default = "one")]
        sigma: f64,
    },
    /// Triangular on [low, high] peaking at `mode`
    Triangular {
        #[serde(default = "zero")]
        low: f64,
        #[serde(default = "one")]
        high: f64,
        #[serde(default = "one")]
        mode: f64,
    },
    /// Exponential with rate `lambda`
    Exponential {
        #[serde(default = "one")]
        lambda: f64,
    },
    /// Log-normal: `exp(normal(mu, sigma))`
    LogNormal {
        #[serde(default = "zero")]
        mu: f64,
        #[serde(default = "one")]
        sigma: f64,
    },
    /// Gamma with shape `alpha` and scale `beta`
    Gamma {
        #[serde(default = "one")]
        alpha: f64,
        #[serde(default = "one")]
        beta: f64,
    },
    /// Beta on [0, 1]
    Beta {
        #[serde(default = "one")]
        alpha: f64,
        #[serde(default = "one")]
        beta: f64,
    },
    /// Pareto with shape `alpha`
    Pareto {
        #[serde(default = "one")]
        alpha: f64,
    },
    /// Weibull with scale `alpha` and shape `beta`
    Weibull {
        #[serde(default = "one")]
        alpha: f64,
        #[serde(default = "one")]
        beta: f64,
    },
}

impl Distribution {
    /// Short name of the distribution (as written in documents)
    pub fn name(&self) -> &'static str {
        match self {
            Distribution::Uniform { .. } => "uniform",
            Distribution::Normal { .. } => "normal",
            Distribution::PNormal { .. } => "pnormal",
            Distribution::Triangular { .. } => "triangular",
            Distribution::Exponential { .. } => "exponential",
            Distribution::LogNormal { .. } => "lognormal",
            Distribution::Gamma { .. } => "gamma",
            Distribution::Beta { .. } => "beta",
            Distribution::Pareto { .. } => "pareto",
            Distribution::Weibull { .. } => "weibull",
        }
    }

    /// Check the parameters once, before any draw happens
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: &str| Err(Error::InvalidDistribution(format!("{}: {}", self.name(), reason)));
        match *self {
            Distribution::Uniform { min, max } if min > max => fail("min > max"),
            Distribution::Normal { sigma, .. }
            | Distribution::PNormal { sigma, .. }
            | Distribution::LogNormal { sigma, .. }
                if sigma < 0.0 =>
            {
                fail("sigma < 0")
            }
            Distribution::Triangular { low, high, mode } if !(low <= mode && mode <= high) => {
                fail("mode outside [low, high]")
            }
            Distribution::Exponential { lambda } if lambda <= 0.0 => fail("lambda <= 0"),
            Distribution::Gamma { alpha, beta }
            | Distribution::Beta { alpha, beta }
            | Distribution::Weibull { alpha, beta }
                if alpha <= 0.0 || beta <= 0.0 =>
            {
                fail("alpha and beta must be positive")
            }
            Distribution::Pareto { alpha } if alpha <= 0.0 => fail("alpha <= 0"),
            _ => Ok(()),
        }
    }

    /// Draw one sample
    pub fn sample(&self, rng: &mut SimRng) -> Result<f64> {
        let value = match *self {
            Distribution::Uniform { min, max } => rng.range_f64(min, max),
            Distribution::Normal { mu, sigma } => {
                rng.sample(Normal::new(mu, sigma).map_err(|e| self.error(&e))?)
            }
            Distribution::PNormal { mu, sigma } => rng
                .sample(Normal::new(mu, sigma).map_err(|e| self.error(&e))?)
                .max(0.0),
            // Degenerate range; validation pins the mode to it
            Distribution::Triangular { low, high, .. } if low == high => low,
            Distribution::Triangular { low, high, mode } => {
                rng.sample(Triangular::new(low, high, mode).map_err(|e| self.error(&e))?)
            }
            Distribution::Exponential { lambda } => {
                rng.sample(Exp::new(lambda).map_err(|e| self.error(&e))?)
            }
            Distribution::LogNormal { mu, sigma } => {
                rng.sample(LogNormal::new(mu, sigma).map_err(|e| self.error(&e))?)
            }
            Distribution::Gamma { alpha, beta } => {
                rng.sample(Gamma::new(alpha, beta).map_err(|e| self.error(&e))?)
            }
            Distribution::Beta { alpha, beta } => {
                rng.sample(Beta::new(alpha, beta).map_err(|e| self.error(&e))?)
            }
            Distribution::Pareto { alpha } => {
                rng.sample(Pareto::new(1.0, alpha).map_err(|e| self.error(&e))?)
            }
            Distribution::Weibull { alpha, beta } => {
                rng.sample(Weibull::new(alpha, beta).map_err(|e| self.error(&e))?)
            }
        };
        Ok(value)
    }

    fn error(&self, reason: &dyn std::fmt::Display) -> Error {
        Error::InvalidDistribution(format!("{}: {}", self.name(), reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(Distribution::Uniform { min: 1.0, max: 2.0 }.validate().is_ok());
        assert!(Distribution::Uniform { min: 3.0, max: 2.0 }.validate().is_err());
        assert!(Distribution::Exponential { lambda: 0.0 }.validate().is_err());
        assert!(Distribution::Triangular {
            low: 0.0,
            high: 1.0,
            mode: 2.0
        }
        .validate()
        .is_err());
        assert!(Distribution::Gamma {
            alpha: 2.0,
            beta: -1.0
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_pnormal_never_negative() {
        let dist = Distribution::PNormal {
            mu: 0.0,
            sigma: 5.0,
        };
        let mut rng = SimRng::new(3);
        for _ in 0..1000 {
            assert!(dist.sample(&mut rng).unwrap() >= 0.0);
        }
    }

    fn mean(dist: &Distribution, seed: u64) -> f64 {
        let mut rng = SimRng::new(seed);
        let n = 20_000;
        (0..n).map(|_| dist.sample(&mut rng).unwrap()).sum::<f64>() / n as f64
    }

    #[test]
    fn test_sample_means() {
        let normal = Distribution::Normal { mu: 5.0, sigma: 2.0 };
        assert!((mean(&normal, 7) - 5.0).abs() < 0.1);
        let exponential = Distribution::Exponential { lambda: 0.5 };
        assert!((mean(&exponential, 7) - 2.0).abs() < 0.1);
        let gamma = Distribution::Gamma { alpha: 2.0, beta: 3.0 };
        assert!((mean(&gamma, 11) - 6.0).abs() < 0.2);
        let uniform = Distribution::Uniform { min: 1.0, max: 2.0 };
        assert!((mean(&uniform, 3) - 1.5).abs() < 0.02);
    }

    #[test]
    fn test_sample_bounds() {
        let mut rng = SimRng::new(9);
        let triangular = Distribution::Triangular {
            low: 1.0,
            high: 4.0,
            mode: 2.0,
        };
        let beta = Distribution::Beta { alpha: 2.0, beta: 5.0 };
        let pareto = Distribution::Pareto { alpha: 3.0 };
        let weibull = Distribution::Weibull { alpha: 2.0, beta: 1.5 };
        for _ in 0..1000 {
            assert!((1.0..=4.0).contains(&triangular.sample(&mut rng).unwrap()));
            assert!((0.0..=1.0).contains(&beta.sample(&mut rng).unwrap()));
            assert!(pareto.sample(&mut rng).unwrap() >= 1.0);
            assert!(weibull.sample(&mut rng).unwrap() >= 0.0);
        }
        let point = Distribution::Triangular {
            low: 3.0,
            high: 3.0,
            mode: 3.0,
        };
        assert_eq!(point.sample(&mut rng).unwrap(), 3.0);
    }

    #[test]
    fn test_ron_defaults() {
        let dist: Distribution = ron::from_str("Uniform(max: 4.0)").unwrap();
        assert_eq!(dist, Distribution::Uniform { min: 0.0, max: 4.0 });

        let dist: Distribution = ron::from_str("Exponential(lambda: 0.25)").unwrap();
        assert_eq!(dist.name(), "exponential");
    }
}
