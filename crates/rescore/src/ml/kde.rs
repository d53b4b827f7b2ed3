//! Calculate posterior error probabilities for PSMs.
//! We use Kernel Density Estimation to fit a non-parametric model to the
//! discriminant score distribution of targets and decoys. Linear interpolation
//! and binning is used to dramatically speed up the PEP calculation
//!
//! Käll, 2008 [https://pubmed.ncbi.nlm.nih.gov/18052118/]
//! Ma, 2012 [https://pubmed.ncbi.nlm.nih.gov/23176103/]

use super::*;
use rayon::prelude::*;

pub struct Kde<'a> {
    sample: &'a [f64],
    pub bandwidth: f64,
    constant: f64,
}

impl<'a> Kde<'a> {
    /// Gaussian kernel density with Silverman's rule of thumb bandwidth
    pub fn new(sample: &'a [f64]) -> Self {
        let factor = 4. / 3.;
        let exponent = 1. / 5.;
        let sigma = std(sample);
        let bandwidth = sigma * (factor / sample.len() as f64).powf(exponent);
        let constant = (2.0 * std::f64::consts::PI).sqrt() * bandwidth * sample.len() as f64;
        Self {
            sample,
            bandwidth,
            constant,
        }
    }

    fn kernel(&self, x: f64) -> f64 {
        (-0.5 * x.powi(2)).exp()
    }

    pub fn pdf(&self, x: f64) -> f64 {
        let h = self.bandwidth;
        // Summed sequentially so that results do not depend on thread count
        let sum = self
            .sample
            .iter()
            .fold(0.0, |acc, xi| acc + self.kernel((x - xi) / h));
        sum / self.constant
    }
}

pub struct Builder {
    monotonic: bool,
    bins: usize,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            monotonic: true,
            bins: 1000,
        }
    }
}

impl Builder {
    pub fn monotonic(mut self, monotonic: bool) -> Self {
        self.monotonic = monotonic;
        self
    }

    pub fn bins(mut self, bins: usize) -> Self {
        self.bins = bins.max(2);
        self
    }

    /// Fit target and decoy densities. Returns `None` when either class has
    /// fewer than two distinct scores, since no bandwidth can be estimated
    pub fn build(self, scores: &[f64], decoys: &[bool]) -> Option<Estimator> {
        let d = scores
            .iter()
            .zip(decoys)
            .filter(|&(_, d)| *d)
            .map(|(s, _)| *s)
            .collect::<Vec<_>>();

        let t = scores
            .iter()
            .zip(decoys)
            .filter(|&(_, d)| !*d)
            .map(|(s, _)| *s)
            .collect::<Vec<_>>();

        if std(&d) <= 0.0 || std(&t) <= 0.0 || !std(&d).is_finite() || !std(&t).is_finite() {
            return None;
        }

        // P(decoy)
        let pi = d.len() as f64 / scores.len() as f64;
        let decoy = Kde::new(&d);
        let target = Kde::new(&t);

        // Essentially, np.linspace(scores.min(), scores.max(), bins)
        let mut min_score = f64::MAX;
        let mut max_score = f64::MIN;
        for s in scores {
            min_score = min_score.min(*s);
            max_score = max_score.max(*s);
        }
        let score_step = (max_score - min_score) / (self.bins - 1) as f64;

        let mut bins = (0..self.bins)
            .into_par_iter()
            .map(|bin| {
                let score = (bin as f64 * score_step) + min_score;
                let decoy = decoy.pdf(score) * pi;
                let target = target.pdf(score) * (1.0 - pi);
                match target + decoy {
                    x if x > 0.0 => decoy / x,
                    _ => 1.0,
                }
            })
            .collect::<Vec<_>>();

        if self.monotonic {
            // PEP must not increase with score. Walk from the lowest scores up
            // and carry the running minimum
            let mut running = 1.0f64;
            for pep in bins.iter_mut() {
                running = running.min(*pep);
                *pep = running;
            }
        }

        Some(Estimator {
            bins,
            min_score,
            score_step,
        })
    }
}

pub struct Estimator {
    bins: Vec<f64>,
    min_score: f64,
    score_step: f64,
}

impl Estimator {
    /// Calculate the posterior error probability for a given score, under the
    /// pre-fit non-parametric probability model.
    pub fn posterior_error(&self, score: f64) -> f64 {
        let last = self.bins.len().saturating_sub(1);
        let position = ((score - self.min_score) / self.score_step).max(0.0);
        let bin_lo = last.min(position.floor() as usize);
        let bin_hi = last.min(bin_lo + 1);

        let lower = self.bins[bin_lo];
        let upper = self.bins[bin_hi];

        // What percent of the way to the higher bin are we?
        let bin_lo_score = bin_lo as f64 * self.score_step + self.min_score;
        let linear = ((score - bin_lo_score) / self.score_step).clamp(0.0, 1.0);

        (lower + (upper - lower) * linear).clamp(0.0, 1.0)
    }
}
