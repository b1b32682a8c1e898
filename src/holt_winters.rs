//! Holt-Winters triple exponential smoothing
//!
//! `holt_winters(call, h, m)` fits a seasonal exponential smoothing model
//! over the windowed output of the wrapped call per series and projects `h`
//! future buckets at seasonal period `m`. `holt_winters_with_fit` also
//! re-emits the fitted curve over the observed buckets.
//!
//! Smoothing parameters (α, β, γ) are chosen by minimizing the sum of
//! squared errors over the observed buckets with a Nelder-Mead simplex
//! search. Seasonal indices carry a stability floor so a flat or
//! zero-valued season cannot divide the model away; a series whose fit
//! degenerates to non-finite values forecasts nothing.

use crate::error::{QueryError, Result};
use crate::iterator::{AnyIterator, IteratorStats, PointIterator};
use crate::options::IteratorOptions;
use crate::point::{AnyPoint, FloatPoint, Tags};
use std::collections::VecDeque;

/// Floor applied to level and seasonal terms before division.
const STABILITY_FLOOR: f64 = 1.0e-10;

// ============================================================================
// Nelder-Mead simplex search
// ============================================================================

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;
const MAX_ITERATIONS: usize = 400;
const TOLERANCE: f64 = 1.0e-10;

/// Minimize `f` starting from `start`, returning the best parameters found.
fn nelder_mead(f: impl Fn(&[f64]) -> f64, start: &[f64]) -> Vec<f64> {
    let n = start.len();
    let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
    simplex.push((start.to_vec(), f(start)));
    for i in 0..n {
        let mut vertex = start.to_vec();
        vertex[i] += if vertex[i].abs() > f64::EPSILON {
            0.1 * vertex[i]
        } else {
            0.1
        };
        let score = f(&vertex);
        simplex.push((vertex, score));
    }

    for _ in 0..MAX_ITERATIONS {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        if (simplex[n].1 - simplex[0].1).abs() < TOLERANCE {
            break;
        }

        // Centroid of all but the worst vertex.
        let mut centroid = vec![0.0; n];
        for (vertex, _) in simplex.iter().take(n) {
            for (c, v) in centroid.iter_mut().zip(vertex) {
                *c += v / n as f64;
            }
        }

        let worst = simplex[n].clone();
        let blend = |t: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(&worst.0)
                .map(|(c, w)| c + t * (c - w))
                .collect()
        };

        let reflected = blend(REFLECTION);
        let reflected_score = f(&reflected);
        if reflected_score < simplex[0].1 {
            let expanded = blend(EXPANSION);
            let expanded_score = f(&expanded);
            simplex[n] = if expanded_score < reflected_score {
                (expanded, expanded_score)
            } else {
                (reflected, reflected_score)
            };
            continue;
        }
        if reflected_score < simplex[n - 1].1 {
            simplex[n] = (reflected, reflected_score);
            continue;
        }

        let contracted = blend(-CONTRACTION);
        let contracted_score = f(&contracted);
        if contracted_score < simplex[n].1 {
            simplex[n] = (contracted, contracted_score);
            continue;
        }

        // Shrink toward the best vertex.
        let best = simplex[0].0.clone();
        for (vertex, score) in simplex.iter_mut().skip(1) {
            for (v, b) in vertex.iter_mut().zip(&best) {
                *v = b + SHRINK * (*v - b);
            }
            *score = f(vertex);
        }
    }

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    simplex.remove(0).0
}

// ============================================================================
// The smoothing model
// ============================================================================

struct Model {
    /// Seasonal period; values below 2 disable seasonality
    period: usize,
}

impl Model {
    /// Run the smoothing pass, returning fitted values over the data plus
    /// `horizon` forecast steps. Returns `None` when the fit degenerates.
    fn smooth(&self, data: &[f64], params: &[f64], horizon: usize) -> Option<Vec<f64>> {
        let (alpha, beta, gamma) = (params[0], params[1], params[2]);
        let n = data.len();
        let m = self.period;
        let seasonal = m >= 2 && n >= 2 * m;

        let mut level = data[0];
        let mut trend = if seasonal {
            (data[m] - data[0]) / m as f64
        } else {
            data[1] - data[0]
        };

        // Initial multiplicative seasonal indices from the first season.
        let mut indices = vec![1.0; m.max(1)];
        if seasonal {
            let season_mean = data[..m].iter().sum::<f64>() / m as f64;
            let floor = season_mean.abs().max(STABILITY_FLOOR);
            for (index, value) in indices.iter_mut().zip(data) {
                *index = (value / floor).max(STABILITY_FLOOR);
            }
        }

        let mut out = Vec::with_capacity(n + horizon);
        out.push(data[0]);

        for t in 1..n {
            let s = if seasonal {
                indices[t % m].max(STABILITY_FLOOR)
            } else {
                1.0
            };
            let forecast = (level + trend) * s;
            out.push(forecast);

            let prev_level = level;
            level = alpha * data[t] / s + (1.0 - alpha) * (level + trend);
            trend = beta * (level - prev_level) + (1.0 - beta) * trend;
            if seasonal {
                let denom = level.abs().max(STABILITY_FLOOR);
                indices[t % m] =
                    (gamma * data[t] / denom + (1.0 - gamma) * indices[t % m]).max(STABILITY_FLOOR);
            }
        }

        for i in 1..=horizon {
            let s = if seasonal {
                indices[(n + i - 1) % m].max(STABILITY_FLOOR)
            } else {
                1.0
            };
            out.push((level + trend * i as f64) * s);
        }

        if out.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(out)
    }

    /// Sum of squared errors of the fit under the given parameters, with a
    /// penalty wall outside the unit cube.
    fn sse(&self, data: &[f64], params: &[f64]) -> f64 {
        if params.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return f64::MAX;
        }
        match self.smooth(data, params, 0) {
            Some(fitted) => fitted
                .iter()
                .zip(data)
                .map(|(f, y)| (f - y) * (f - y))
                .sum(),
            None => f64::MAX,
        }
    }

    /// Fit parameters and return fitted values plus `horizon` forecasts.
    fn fit(&self, data: &[f64], horizon: usize) -> Option<Vec<f64>> {
        if data.len() < 2 {
            return None;
        }
        let params = nelder_mead(|p| self.sse(data, p), &[0.5, 0.1, 0.1]);
        self.smooth(data, &params, horizon)
    }
}

// ============================================================================
// Iterator
// ============================================================================

struct HoltWintersIterator {
    input: AnyIterator,
    opt: IteratorOptions,
    horizon: usize,
    period: usize,
    with_fit: bool,
    pending: VecDeque<FloatPoint>,
    buffered: bool,
    closed: bool,
}

impl HoltWintersIterator {
    /// Read the whole input and fit one model per series.
    fn buffer(&mut self) -> Result<()> {
        self.buffered = true;
        let mut series: Vec<(String, Tags, Vec<(i64, f64)>)> = Vec::new();
        while let Some(p) = self.input.next_any()? {
            if p.is_nil() {
                continue;
            }
            let value = match &p {
                AnyPoint::Float(p) => p.value,
                AnyPoint::Integer(p) => p.value as f64,
                _ => continue,
            };
            let key = (p.name().to_string(), p.tags().clone());
            match series.last_mut() {
                Some((name, tags, points)) if *name == key.0 && *tags == key.1 => {
                    points.push((p.time(), value));
                }
                _ => series.push((key.0, key.1, vec![(p.time(), value)])),
            }
        }

        let model = Model {
            period: self.period,
        };
        let every = self.opt.interval.every;
        for (name, tags, points) in series {
            let data: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
            let Some(curve) = model.fit(&data, self.horizon) else {
                continue;
            };
            let last_time = points.last().map(|(t, _)| *t).unwrap_or_default();
            if self.with_fit {
                for ((time, _), fitted) in points.iter().zip(&curve) {
                    self.pending.push_back(
                        FloatPoint::new(name.clone(), *time, *fitted).with_tags(tags.clone()),
                    );
                }
            }
            for (i, forecast) in curve[points.len()..].iter().enumerate() {
                let time = last_time + every * (i as i64 + 1);
                self.pending.push_back(
                    FloatPoint::new(name.clone(), time, *forecast).with_tags(tags.clone()),
                );
            }
        }
        Ok(())
    }
}

impl PointIterator<f64> for HoltWintersIterator {
    fn next_point(&mut self) -> Result<Option<FloatPoint>> {
        if self.closed {
            return Ok(None);
        }
        if !self.buffered {
            self.buffer()?;
        }
        Ok(self.pending.pop_front())
    }

    fn stats(&self) -> IteratorStats {
        self.input.stats()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pending.clear();
        self.input.close();
    }
}

/// Build a `holt_winters(call, h, m)` iterator over a windowed aggregation.
pub fn new_holt_winters_iterator(
    input: AnyIterator,
    opt: &IteratorOptions,
    horizon: usize,
    period: usize,
    with_fit: bool,
) -> Result<AnyIterator> {
    let kind = input.data_type();
    match kind {
        crate::point::DataType::Float | crate::point::DataType::Integer => {
            Ok(AnyIterator::float(HoltWintersIterator {
                input,
                opt: opt.clone(),
                horizon,
                period,
                with_fit,
                pending: VecDeque::new(),
                buffered: false,
                closed: false,
            }))
        }
        _ => Err(QueryError::unsupported_call("holt_winters", kind)),
    }
}
