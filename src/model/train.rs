//! Joint training of the phase autoencoder
//!
//! Full-batch gradient descent with Adam and stepwise learning-rate decay.
//! The loss combines three terms: mean squared reconstruction error, a
//! wrapped absolute error against known collection times, and the cosinor
//! prior over the predicted phase ordering. Gradients flow analytically
//! through the unit-circle normalization and the phase angle.

use ndarray::{Array1, Array2, Axis, Zip};
use rayon::prelude::*;

use crate::config::FitConfig;
use crate::data::SampleMetadata;
use crate::error::{CircaError, Result};
use crate::phase;
use crate::rng::Mt19937;

use super::autoencoder::PhaseAutoEncoder;
use super::sine::SinePrior;

/// Adam state for one parameter tensor
#[derive(Debug, Clone)]
struct AdamState {
    m: Array2<f64>,
    v: Array2<f64>,
}

impl AdamState {
    fn new(shape: (usize, usize)) -> Self {
        Self {
            m: Array2::zeros(shape),
            v: Array2::zeros(shape),
        }
    }

    /// One Adam update with bias correction; `t` is the 1-based step count
    fn step(
        &mut self,
        param: &mut Array2<f64>,
        grad: &Array2<f64>,
        lr: f64,
        config: &FitConfig,
        t: usize,
    ) {
        let beta1 = config.adam_beta1;
        let beta2 = config.adam_beta2;
        let bias1 = 1.0 - beta1.powi(t as i32);
        let bias2 = 1.0 - beta2.powi(t as i32);

        Zip::from(param)
            .and(&mut self.m)
            .and(&mut self.v)
            .and(grad)
            .for_each(|p, m, v, &g| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / bias1;
                let v_hat = *v / bias2;
                *p -= lr * m_hat / (v_hat.sqrt() + config.adam_epsilon);
            });
    }
}

/// Loss components of one epoch
#[derive(Debug, Clone, Copy)]
pub struct EpochLoss {
    pub reconstruction: f64,
    pub time: f64,
    pub sine: f64,
}

impl EpochLoss {
    pub fn total(&self) -> f64 {
        self.reconstruction + self.time + self.sine
    }
}

/// A trained model together with its training record
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub model: PhaseAutoEncoder,
    pub loss_trace: Vec<f64>,
    pub final_loss: f64,
    pub seed: u64,
}

/// Train one model from one seed
fn train_single(
    x: &Array2<f64>,
    metadata: &SampleMetadata,
    config: &FitConfig,
    seed: u64,
) -> Result<TrainOutcome> {
    let (n_samples, input_dim) = x.dim();
    if n_samples == 0 {
        return Err(CircaError::EmptyData {
            reason: "No samples to train on".to_string(),
        });
    }

    let mut rng = Mt19937::new(seed);
    let mut model = PhaseAutoEncoder::new(input_dim, config.weight_init_std, &mut rng)?;

    // Known phases from collection times, where present
    let known_phases: Vec<Option<f64>> = (0..n_samples)
        .map(|s| {
            metadata
                .collection_time(s)
                .map(|t| phase::time_to_phase(t, config.period_hours))
        })
        .collect();
    let n_timed = known_phases.iter().filter(|p| p.is_some()).count();

    let prior = SinePrior::new(metadata, config.min_samples_per_group);

    let mut adam_w_enc = AdamState::new(model.w_enc.dim());
    let mut adam_w_dec = AdamState::new(model.w_dec.dim());
    let mut adam_b_enc = AdamState::new((1, 2));
    let mut adam_b_dec = AdamState::new((1, input_dim));

    let mut loss_trace = Vec::with_capacity(config.num_epochs);

    for epoch in 0..config.num_epochs {
        let lr = config.learning_rate
            * config.lr_gamma.powi((epoch / config.lr_step_size) as i32);

        let pass = model.forward(x)?;

        // -- reconstruction loss and its gradient --------------------------
        let diff = &pass.reconstruction - x;
        let denom = (n_samples * input_dim) as f64;
        let recon_loss = config.lambda_recon * diff.iter().map(|d| d * d).sum::<f64>() / denom;
        let d_recon = diff.mapv(|d| 2.0 * d * config.lambda_recon / denom);

        // -- phase losses and their gradient w.r.t. each phase --------------
        let mut d_phase = vec![0.0; n_samples];

        let mut time_loss = 0.0;
        if config.lambda_time > 0.0 && n_timed > 0 {
            for (s, known) in known_phases.iter().enumerate() {
                if let Some(theta) = known {
                    let delta = phase::signed_wrapped_diff(pass.phases[s], *theta);
                    time_loss += delta.abs();
                    d_phase[s] +=
                        config.lambda_time * delta.signum() / n_timed as f64;
                }
            }
            time_loss *= config.lambda_time / n_timed as f64;
        }

        let mut sine_loss = 0.0;
        if config.lambda_sine > 0.0 {
            let (prior_loss, prior_grad) =
                prior.loss_and_phase_grad(x, &pass.phases, config.sine_ridge)?;
            sine_loss = config.lambda_sine * prior_loss;
            for (s, g) in prior_grad.iter().enumerate() {
                d_phase[s] += config.lambda_sine * g;
            }
        }

        // -- backpropagation ------------------------------------------------
        // decoder: reconstruction = unit . w_dec' + b_dec
        let grad_w_dec = d_recon.t().dot(&pass.unit);
        let grad_b_dec = d_recon.sum_axis(Axis(0));
        let mut d_unit = d_recon.dot(&model.w_dec);

        // phase angle: phi = atan2(u_y, u_x) on the unit circle, so
        // d(phi)/d(u) = (-u_y, u_x)
        for s in 0..n_samples {
            d_unit[[s, 0]] += d_phase[s] * -pass.unit[[s, 1]];
            d_unit[[s, 1]] += d_phase[s] * pass.unit[[s, 0]];
        }

        // normalization: u = r / |r|, so
        // d(L)/d(r) = (d(L)/d(u) - u (u . d(L)/d(u))) / |r|
        let mut d_raw = Array2::zeros((n_samples, 2));
        for s in 0..n_samples {
            let u = (pass.unit[[s, 0]], pass.unit[[s, 1]]);
            let du = (d_unit[[s, 0]], d_unit[[s, 1]]);
            let dot = u.0 * du.0 + u.1 * du.1;
            d_raw[[s, 0]] = (du.0 - u.0 * dot) / pass.norms[s];
            d_raw[[s, 1]] = (du.1 - u.1 * dot) / pass.norms[s];
        }

        // encoder: raw = x . w_enc' + b_enc
        let grad_w_enc = d_raw.t().dot(x);
        let grad_b_enc = d_raw.sum_axis(Axis(0));

        let t = epoch + 1;
        adam_w_enc.step(&mut model.w_enc, &grad_w_enc, lr, config, t);
        adam_w_dec.step(&mut model.w_dec, &grad_w_dec, lr, config, t);
        step_bias(&mut adam_b_enc, &mut model.b_enc, &grad_b_enc, lr, config, t);
        step_bias(&mut adam_b_dec, &mut model.b_dec, &grad_b_dec, lr, config, t);

        let epoch_loss = EpochLoss {
            reconstruction: recon_loss,
            time: time_loss,
            sine: sine_loss,
        };
        let total = epoch_loss.total();
        if !total.is_finite() {
            return Err(CircaError::TrainingFailed {
                reason: format!("Non-finite loss at epoch {} (seed {})", epoch, seed),
            });
        }
        loss_trace.push(total);

        if epoch % 100 == 0 || epoch + 1 == config.num_epochs {
            log::debug!(
                "seed {} epoch {}: recon {:.6} time {:.6} sine {:.6}",
                seed,
                epoch,
                epoch_loss.reconstruction,
                epoch_loss.time,
                epoch_loss.sine
            );
        }
    }

    let final_loss = loss_trace.last().copied().unwrap_or(f64::INFINITY);
    Ok(TrainOutcome {
        model,
        loss_trace,
        final_loss,
        seed,
    })
}

/// Adam step for a 1-D bias, routed through the 2-D state
fn step_bias(
    state: &mut AdamState,
    bias: &mut Array1<f64>,
    grad: &Array1<f64>,
    lr: f64,
    config: &FitConfig,
    t: usize,
) {
    let n = bias.len();
    let mut param = bias
        .view()
        .to_owned()
        .into_shape_with_order((1, n))
        .unwrap_or_else(|_| Array2::zeros((1, n)));
    let grad2 = grad
        .view()
        .to_owned()
        .into_shape_with_order((1, n))
        .unwrap_or_else(|_| Array2::zeros((1, n)));
    state.step(&mut param, &grad2, lr, config, t);
    for (i, value) in param.row(0).iter().enumerate() {
        bias[i] = *value;
    }
}

/// Train an ensemble of independently seeded models in parallel and keep
/// the one with the lowest final loss.
pub fn train_ensemble(
    x: &Array2<f64>,
    metadata: &SampleMetadata,
    config: &FitConfig,
) -> Result<TrainOutcome> {
    let outcomes: Vec<Result<TrainOutcome>> = (0..config.ensemble_size as u64)
        .into_par_iter()
        .map(|member| train_single(x, metadata, config, config.random_seed + member))
        .collect();

    let mut best: Option<TrainOutcome> = None;
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(o) => {
                let better = best
                    .as_ref()
                    .map(|b| o.final_loss < b.final_loss)
                    .unwrap_or(true);
                if better {
                    best = Some(o);
                }
            }
            Err(e) => failures.push(e.to_string()),
        }
    }

    match best {
        Some(outcome) => {
            if !failures.is_empty() {
                log::warn!(
                    "{} of {} ensemble members failed: {}",
                    failures.len(),
                    config.ensemble_size,
                    failures.join("; ")
                );
            }
            log::info!(
                "Ensemble winner: seed {} with final loss {:.6}",
                outcome.seed,
                outcome.final_loss
            );
            Ok(outcome)
        }
        None => Err(CircaError::TrainingFailed {
            reason: format!(
                "All {} ensemble members failed: {}",
                config.ensemble_size,
                failures.join("; ")
            ),
        }),
    }
}
