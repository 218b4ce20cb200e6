// SPDX-License-Identifier: AGPL-3.0-only

//! Learned regressors compared against the closed-form surrogate.
//!
//! Both learn the mapping [nOfM, ln(sAEC/Dc), nOfCon] → infection score:
//!
//! - [`FeedForwardRegressor`]: 3-13-3-1 sigmoid multilayer perceptron,
//!   full-batch Adam on mean squared error for a fixed epoch budget.
//! - [`RandomForestRegressor`]: 100 bootstrap variance-reduction regression
//!   trees averaged; trees train independently under rayon.
//!
//! The cross-validation harness drives them through [`GenericRegressor`],
//! the same black-box fit/predict surface the calibrated surrogate is
//! wrapped in (`SurrogateRegressor`), so all three see identical splits.

use crate::calibrate::{train_sim, CalibrationConfig};
use crate::data::CalibrationSet;
use crate::error::SporeFitError;
use crate::models::{self, Covariates, SurrogateInfectionModel};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

/// Feature vector shared by both learned regressors.
fn features(c: &Covariates) -> [f64; 3] {
    [c.n_of_m, c.ln_ratio(), c.n_of_con]
}

/// Black-box fit/predict contract uniting the surrogate, the network and
/// the forest.
pub trait GenericRegressor {
    /// Identifier used in cross-validation report rows.
    fn name(&self) -> &'static str;

    /// Train on a calibration set, replacing any previous fit.
    ///
    /// # Errors
    ///
    /// Implementation-specific; the surrogate propagates calibration errors.
    fn fit(&mut self, train: &CalibrationSet) -> Result<(), SporeFitError>;

    /// Predicted scores, aligned with `inputs`.
    fn predict(&self, inputs: &[Covariates]) -> Vec<f64>;

    /// Mean absolute deviation of predictions over a set.
    fn mad(&self, set: &CalibrationSet) -> f64 {
        if set.is_empty() {
            return 0.0;
        }
        let preds = self.predict(&set.inputs);
        let sum: f64 = preds
            .iter()
            .zip(&set.scores)
            .map(|(p, y)| (p - y).abs())
            .sum();
        sum / set.len() as f64
    }
}

// ═══════════════════════════════════════════════════════════════════
// Calibrated surrogate behind the regressor surface
// ═══════════════════════════════════════════════════════════════════

/// The closed-form surrogate infection model plus its calibrator, wrapped
/// as a regressor. Every fit restarts from the same stored seed.
pub struct SurrogateRegressor {
    seed: Vec<f64>,
    config: CalibrationConfig,
    rng: ChaCha8Rng,
    params: Option<Vec<f64>>,
}

impl SurrogateRegressor {
    /// `seed` is an optimizer-space 14-vector (typically the stored
    /// per-system seed).
    #[must_use]
    pub fn new(seed: Vec<f64>, config: CalibrationConfig, rng_seed: u64) -> Self {
        Self {
            seed,
            config,
            rng: ChaCha8Rng::seed_from_u64(rng_seed),
            params: None,
        }
    }

    /// Fitted optimizer-space parameters, if `fit` has run.
    #[must_use]
    pub fn params(&self) -> Option<&[f64]> {
        self.params.as_deref()
    }
}

impl GenericRegressor for SurrogateRegressor {
    fn name(&self) -> &'static str {
        "Surr"
    }

    fn fit(&mut self, train: &CalibrationSet) -> Result<(), SporeFitError> {
        let result = train_sim(train, &self.seed, self.config.clone(), None, &mut self.rng)?;
        self.params = Some(result.params);
        Ok(())
    }

    fn predict(&self, inputs: &[Covariates]) -> Vec<f64> {
        let sim = SurrogateInfectionModel;
        let params = self.params.as_deref().unwrap_or(&self.seed);
        inputs
            .iter()
            .map(|c| models::ModelFunction::predict(&sim, c, params))
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════
// Feed-forward network
// ═══════════════════════════════════════════════════════════════════

const MLP_IN: usize = 3;
const MLP_H1: usize = 13;
const MLP_H2: usize = 3;

/// Adam hyperparameters, full-batch.
const ADAM_LR: f64 = 0.0005;
const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;

/// Default training epochs.
pub const MLP_EPOCHS: usize = 25_000;

/// One dense layer with sigmoid-friendly uniform init.
#[derive(Debug, Clone)]
struct Dense {
    /// Row-major `out × in` weights.
    w: Vec<f64>,
    b: Vec<f64>,
    n_in: usize,
    n_out: usize,
}

impl Dense {
    fn new(n_in: usize, n_out: usize, rng: &mut impl Rng) -> Self {
        // U(-1/sqrt(fan_in), 1/sqrt(fan_in)).
        let bound = 1.0 / (n_in as f64).sqrt();
        let mut draw = || rng.gen_range(-bound..bound);
        Self {
            w: (0..n_in * n_out).map(|_| draw()).collect(),
            b: (0..n_out).map(|_| draw()).collect(),
            n_in,
            n_out,
        }
    }

    fn forward(&self, x: &[f64], out: &mut Vec<f64>) {
        out.clear();
        for o in 0..self.n_out {
            let row = &self.w[o * self.n_in..(o + 1) * self.n_in];
            let z: f64 = row.iter().zip(x).map(|(w, x)| w * x).sum();
            out.push(z + self.b[o]);
        }
    }

    fn n_weights(&self) -> usize {
        self.w.len() + self.b.len()
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// 3-13-3-1 sigmoid MLP trained with full-batch Adam on MSE.
pub struct FeedForwardRegressor {
    l1: Dense,
    l2: Dense,
    l3: Dense,
    epochs: usize,
    rng: ChaCha8Rng,
}

/// Flat gradient/moment buffers for Adam, one slot per weight.
struct AdamState {
    m: Vec<f64>,
    v: Vec<f64>,
    t: usize,
}

impl AdamState {
    fn new(n: usize) -> Self {
        Self {
            m: vec![0.0; n],
            v: vec![0.0; n],
            t: 0,
        }
    }

    fn step(&mut self, params: &mut [f64], grads: &[f64]) {
        self.t += 1;
        let bc1 = 1.0 - ADAM_BETA1.powi(self.t as i32);
        let bc2 = 1.0 - ADAM_BETA2.powi(self.t as i32);
        for ((p, &g), (m, v)) in params
            .iter_mut()
            .zip(grads)
            .zip(self.m.iter_mut().zip(&mut self.v))
        {
            *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
            *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
            let m_hat = *m / bc1;
            let v_hat = *v / bc2;
            *p -= ADAM_LR * m_hat / (v_hat.sqrt() + ADAM_EPS);
        }
    }
}

impl FeedForwardRegressor {
    /// Freshly initialized network with the default epoch budget.
    #[must_use]
    pub fn new(rng_seed: u64) -> Self {
        Self::with_epochs(rng_seed, MLP_EPOCHS)
    }

    /// Network with an explicit epoch budget (tests use small budgets).
    #[must_use]
    pub fn with_epochs(rng_seed: u64, epochs: usize) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(rng_seed);
        Self {
            l1: Dense::new(MLP_IN, MLP_H1, &mut rng),
            l2: Dense::new(MLP_H1, MLP_H2, &mut rng),
            l3: Dense::new(MLP_H2, 1, &mut rng),
            epochs,
            rng,
        }
    }

    fn forward_one(&self, x: &[f64; 3]) -> f64 {
        let mut z1 = Vec::with_capacity(MLP_H1);
        let mut z2 = Vec::with_capacity(MLP_H2);
        let mut z3 = Vec::with_capacity(1);
        self.l1.forward(x, &mut z1);
        let a1: Vec<f64> = z1.iter().map(|&z| sigmoid(z)).collect();
        self.l2.forward(&a1, &mut z2);
        let a2: Vec<f64> = z2.iter().map(|&z| sigmoid(z)).collect();
        self.l3.forward(&a2, &mut z3);
        z3[0]
    }

    /// Full-batch MSE training loop with hand-rolled backpropagation.
    fn train_epochs(&mut self, xs: &[[f64; 3]], ys: &[f64]) {
        let n = xs.len();
        if n == 0 {
            return;
        }
        let nw1 = self.l1.n_weights();
        let nw2 = self.l2.n_weights();
        let nw3 = self.l3.n_weights();
        let mut adam1 = AdamState::new(nw1);
        let mut adam2 = AdamState::new(nw2);
        let mut adam3 = AdamState::new(nw3);

        let mut g1 = vec![0.0; nw1];
        let mut g2 = vec![0.0; nw2];
        let mut g3 = vec![0.0; nw3];
        let mut z1 = Vec::with_capacity(MLP_H1);
        let mut z2 = Vec::with_capacity(MLP_H2);
        let mut z3 = Vec::with_capacity(1);

        for _ in 0..self.epochs {
            g1.iter_mut().for_each(|g| *g = 0.0);
            g2.iter_mut().for_each(|g| *g = 0.0);
            g3.iter_mut().for_each(|g| *g = 0.0);

            for (x, &y) in xs.iter().zip(ys) {
                self.l1.forward(x, &mut z1);
                let a1: Vec<f64> = z1.iter().map(|&z| sigmoid(z)).collect();
                self.l2.forward(&a1, &mut z2);
                let a2: Vec<f64> = z2.iter().map(|&z| sigmoid(z)).collect();
                self.l3.forward(&a2, &mut z3);
                let out = z3[0];

                // d(MSE)/d(out) for the mean over the batch.
                let d_out = 2.0 * (out - y) / n as f64;

                // Output layer: w3[o*H2+i], b3 at the tail of g3.
                for i in 0..MLP_H2 {
                    g3[i] += d_out * a2[i];
                }
                g3[MLP_H2] += d_out;

                // Hidden layer 2.
                let mut d_a2 = [0.0; MLP_H2];
                for (i, d) in d_a2.iter_mut().enumerate() {
                    *d = d_out * self.l3.w[i];
                }
                let mut d_z2 = [0.0; MLP_H2];
                for i in 0..MLP_H2 {
                    d_z2[i] = d_a2[i] * a2[i] * (1.0 - a2[i]);
                }
                for o in 0..MLP_H2 {
                    for i in 0..MLP_H1 {
                        g2[o * MLP_H1 + i] += d_z2[o] * a1[i];
                    }
                    g2[MLP_H2 * MLP_H1 + o] += d_z2[o];
                }

                // Hidden layer 1.
                let mut d_a1 = [0.0; MLP_H1];
                for (i, d) in d_a1.iter_mut().enumerate() {
                    for o in 0..MLP_H2 {
                        *d += d_z2[o] * self.l2.w[o * MLP_H1 + i];
                    }
                }
                for o in 0..MLP_H1 {
                    let d_z1 = d_a1[o] * a1[o] * (1.0 - a1[o]);
                    for i in 0..MLP_IN {
                        g1[o * MLP_IN + i] += d_z1 * x[i];
                    }
                    g1[MLP_H1 * MLP_IN + o] += d_z1;
                }
            }

            apply_adam(&mut self.l1, &mut adam1, &g1);
            apply_adam(&mut self.l2, &mut adam2, &g2);
            apply_adam(&mut self.l3, &mut adam3, &g3);
        }
    }
}

/// Weights first, biases at the tail, matching the gradient layout above.
fn apply_adam(layer: &mut Dense, adam: &mut AdamState, grads: &[f64]) {
    let nw = layer.w.len();
    let mut flat: Vec<f64> = layer.w.iter().chain(&layer.b).copied().collect();
    adam.step(&mut flat, grads);
    layer.w.copy_from_slice(&flat[..nw]);
    layer.b.copy_from_slice(&flat[nw..]);
}

impl GenericRegressor for FeedForwardRegressor {
    fn name(&self) -> &'static str {
        "DNN"
    }

    fn fit(&mut self, train: &CalibrationSet) -> Result<(), SporeFitError> {
        // Re-draw initial weights so repeated fits are independent restarts.
        self.l1 = Dense::new(MLP_IN, MLP_H1, &mut self.rng);
        self.l2 = Dense::new(MLP_H1, MLP_H2, &mut self.rng);
        self.l3 = Dense::new(MLP_H2, 1, &mut self.rng);
        let xs: Vec<[f64; 3]> = train.inputs.iter().map(features).collect();
        self.train_epochs(&xs, &train.scores);
        Ok(())
    }

    fn predict(&self, inputs: &[Covariates]) -> Vec<f64> {
        inputs
            .iter()
            .map(|c| self.forward_one(&features(c)))
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════
// Random forest
// ═══════════════════════════════════════════════════════════════════

/// Default ensemble size.
pub const FOREST_TREES: usize = 100;

/// Stop splitting below this node size.
const MIN_SAMPLES_SPLIT: usize = 2;

enum TreeNode {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, x: &[f64; 3]) -> f64 {
        match self {
            Self::Leaf(v) => *v,
            Self::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if x[*feature] <= *threshold {
                    left.predict(x)
                } else {
                    right.predict(x)
                }
            }
        }
    }
}

fn mean(ys: &[f64], idx: &[usize]) -> f64 {
    idx.iter().map(|&i| ys[i]).sum::<f64>() / idx.len() as f64
}

/// Sum of squared deviations from the mean over `idx`.
fn sse(ys: &[f64], idx: &[usize]) -> f64 {
    let m = mean(ys, idx);
    idx.iter().map(|&i| (ys[i] - m).powi(2)).sum()
}

/// Grow one variance-reduction regression tree to purity.
fn grow_tree(xs: &[[f64; 3]], ys: &[f64], idx: Vec<usize>) -> TreeNode {
    let node_sse = sse(ys, &idx);
    if idx.len() < MIN_SAMPLES_SPLIT || node_sse <= f64::EPSILON {
        return TreeNode::Leaf(mean(ys, &idx));
    }

    // Best split over all features, thresholds at midpoints between
    // consecutive distinct feature values.
    let mut best: Option<(usize, f64, f64)> = None;
    for feature in 0..3 {
        let mut values: Vec<f64> = idx.iter().map(|&i| xs[i][feature]).collect();
        values.sort_by(f64::total_cmp);
        values.dedup_by(|a, b| a.to_bits() == b.to_bits());
        for pair in values.windows(2) {
            let threshold = (pair[0] + pair[1]) / 2.0;
            let (left, right): (Vec<usize>, Vec<usize>) =
                idx.iter().partition(|&&i| xs[i][feature] <= threshold);
            if left.is_empty() || right.is_empty() {
                continue;
            }
            let score = sse(ys, &left) + sse(ys, &right);
            if best.is_none_or(|(_, _, s)| score < s) {
                best = Some((feature, threshold, score));
            }
        }
    }

    match best {
        Some((feature, threshold, score)) if score < node_sse => {
            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
                idx.iter().partition(|&&i| xs[i][feature] <= threshold);
            TreeNode::Split {
                feature,
                threshold,
                left: Box::new(grow_tree(xs, ys, left_idx)),
                right: Box::new(grow_tree(xs, ys, right_idx)),
            }
        }
        _ => TreeNode::Leaf(mean(ys, &idx)),
    }
}

/// Bagged ensemble of regression trees, predictions averaged.
pub struct RandomForestRegressor {
    n_trees: usize,
    rng: ChaCha8Rng,
    trees: Vec<TreeNode>,
}

impl RandomForestRegressor {
    /// Default 100-tree forest.
    #[must_use]
    pub fn new(rng_seed: u64) -> Self {
        Self::with_trees(rng_seed, FOREST_TREES)
    }

    /// Forest with an explicit ensemble size.
    #[must_use]
    pub fn with_trees(rng_seed: u64, n_trees: usize) -> Self {
        Self {
            n_trees,
            rng: ChaCha8Rng::seed_from_u64(rng_seed),
            trees: Vec::new(),
        }
    }
}

impl GenericRegressor for RandomForestRegressor {
    fn name(&self) -> &'static str {
        "RF"
    }

    fn fit(&mut self, train: &CalibrationSet) -> Result<(), SporeFitError> {
        if train.is_empty() {
            return Err(SporeFitError::Format(
                "cannot fit a forest on an empty training set".into(),
            ));
        }
        let xs: Vec<[f64; 3]> = train.inputs.iter().map(features).collect();
        let ys = &train.scores;
        let n = xs.len();

        // Per-tree seeds drawn up front so tree training order is free.
        let tree_seeds: Vec<u64> = (0..self.n_trees).map(|_| self.rng.gen()).collect();
        self.trees = tree_seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                grow_tree(&xs, ys, bootstrap)
            })
            .collect();
        Ok(())
    }

    fn predict(&self, inputs: &[Covariates]) -> Vec<f64> {
        inputs
            .iter()
            .map(|c| {
                let x = features(c);
                let sum: f64 = self.trees.iter().map(|t| t.predict(&x)).sum();
                sum / self.trees.len().max(1) as f64
            })
            .collect()
    }
}
