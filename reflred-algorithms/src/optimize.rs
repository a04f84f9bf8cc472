//! Shrinking-step coordinate search for two instrument parameters.
//!
//! The search is an explicit state machine. Each transition evaluates at most
//! one candidate:
//!
//! - `Probing { candidate }` tries the current point moved by `-step`, then
//!   `+step` along the searched coordinate. The first strictly better value
//!   is accepted and completes the iteration.
//! - `Shrinking` is entered when neither candidate improved; the step scale
//!   is halved and the iteration completes.
//! - `Done` is reached when the scale drops below its threshold or the
//!   iteration limit is hit.
//!
//! The objective is treated as expensive and noisy: values are never cached
//! or interpolated, and a failed evaluation aborts the search unchanged.

use reflred_core::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A figure of merit to maximise over two parameters.
pub trait FigureOfMerit {
    /// Failure of one evaluation.
    type Error;

    /// Evaluates the objective at `point`.
    ///
    /// # Errors
    /// Any failure is returned to the caller of the search without retry.
    fn evaluate(&mut self, point: [f64; 2]) -> std::result::Result<f64, Self::Error>;
}

impl<F, E> FigureOfMerit for F
where
    F: FnMut([f64; 2]) -> std::result::Result<f64, E>,
{
    type Error = E;

    fn evaluate(&mut self, point: [f64; 2]) -> std::result::Result<f64, E> {
        self(point)
    }
}

/// Search parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Starting point.
    pub start: [f64; 2],
    /// Step at scale one.
    pub base_step: f64,
    /// Index of the coordinate that is varied.
    pub coordinate: usize,
    /// Factor applied to the scale when no candidate improves.
    pub shrink: f64,
    /// The search stops once the scale falls below this.
    pub min_scale: f64,
    /// Upper bound on completed iterations.
    pub max_iterations: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            start: [0.03, 0.7],
            base_step: 0.005,
            coordinate: 0,
            shrink: 0.5,
            min_scale: 0.1,
            max_iterations: 15,
        }
    }
}

impl SearchConfig {
    /// Set the starting point.
    #[must_use]
    pub fn with_start(mut self, start: [f64; 2]) -> Self {
        self.start = start;
        self
    }

    /// Set the step at scale one.
    #[must_use]
    pub fn with_base_step(mut self, base_step: f64) -> Self {
        self.base_step = base_step;
        self
    }

    /// Set the iteration limit.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Validate configuration parameters.
    ///
    /// # Errors
    /// Returns an error for a non-positive step or threshold, a shrink
    /// factor outside `(0, 1)`, or a coordinate index above one.
    pub fn validate(&self) -> Result<()> {
        Error::ensure_positive("base_step", self.base_step)?;
        Error::ensure_positive("min_scale", self.min_scale)?;
        if !(self.shrink > 0.0 && self.shrink < 1.0) {
            return Err(Error::Config(format!(
                "shrink factor must lie in (0, 1), got {}",
                self.shrink
            )));
        }
        if self.coordinate > 1 {
            return Err(Error::Config(format!(
                "coordinate index must be 0 or 1, got {}",
                self.coordinate
            )));
        }
        Ok(())
    }
}

/// Why the search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Termination {
    /// The step scale fell below the threshold.
    StepBelowThreshold,
    /// The iteration limit was reached.
    IterationLimit,
}

/// Position of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Evaluating candidate 0 (`-step`) or 1 (`+step`).
    Probing {
        /// Index into `[-step, +step]`.
        candidate: usize,
    },
    /// No candidate improved in this iteration.
    Shrinking,
    /// Terminal.
    Done(Termination),
}

/// One objective evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    /// Evaluated point.
    pub point: [f64; 2],
    /// Objective value.
    pub value: f64,
    /// Whether the point became the new best.
    pub accepted: bool,
}

/// Current point, best value and step scale.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchState {
    /// Best point so far.
    pub point: [f64; 2],
    /// Objective value at `point`.
    pub best: f64,
    /// Multiplier of the base step.
    pub scale: f64,
    /// Completed iterations.
    pub iteration: usize,
    /// Next transition.
    pub phase: Phase,
    /// Every evaluation, including the starting point.
    pub history: Vec<Evaluation>,
}

impl SearchState {
    /// True once the search has terminated.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self.phase, Phase::Done(_))
    }
}

/// Final outcome of a search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// Best point found.
    pub point: [f64; 2],
    /// Objective value at `point`.
    pub value: f64,
    /// Completed iterations.
    pub iterations: usize,
    /// Stop reason.
    pub termination: Termination,
    /// Every evaluation in order.
    pub history: Vec<Evaluation>,
}

/// Shrinking-step coordinate search.
#[derive(Debug, Clone)]
pub struct CoordinateSearch {
    config: SearchConfig,
}

impl CoordinateSearch {
    /// Creates a search.
    ///
    /// # Errors
    /// Returns a configuration error if `config` fails validation.
    pub fn new(config: SearchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Search configuration.
    #[must_use]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Evaluates the starting point.
    ///
    /// # Errors
    /// Returns the objective's error.
    pub fn start<F: FigureOfMerit>(
        &self,
        objective: &mut F,
    ) -> std::result::Result<SearchState, F::Error> {
        let point = self.config.start;
        let best = objective.evaluate(point)?;
        let phase = if self.config.max_iterations == 0 {
            Phase::Done(Termination::IterationLimit)
        } else {
            Phase::Probing { candidate: 0 }
        };
        Ok(SearchState {
            point,
            best,
            scale: 1.0,
            iteration: 0,
            phase,
            history: vec![Evaluation {
                point,
                value: best,
                accepted: true,
            }],
        })
    }

    fn finish_iteration(&self, state: &mut SearchState) {
        state.iteration += 1;
        state.phase = if state.iteration >= self.config.max_iterations {
            Phase::Done(Termination::IterationLimit)
        } else {
            Phase::Probing { candidate: 0 }
        };
    }

    /// Performs one transition. A terminal state is returned unchanged.
    ///
    /// # Errors
    /// Returns the objective's error; the state is consumed.
    pub fn step<F: FigureOfMerit>(
        &self,
        mut state: SearchState,
        objective: &mut F,
    ) -> std::result::Result<SearchState, F::Error> {
        match state.phase {
            Phase::Done(_) => {}
            Phase::Probing { candidate } => {
                let sign = if candidate == 0 { -1.0 } else { 1.0 };
                let mut point = state.point;
                point[self.config.coordinate] += sign * self.config.base_step * state.scale;

                let value = objective.evaluate(point)?;
                let accepted = value > state.best;
                state.history.push(Evaluation {
                    point,
                    value,
                    accepted,
                });

                if accepted {
                    log::info!("update to {point:?} with figure of merit {value}");
                    state.point = point;
                    state.best = value;
                    self.finish_iteration(&mut state);
                } else if candidate == 0 {
                    state.phase = Phase::Probing { candidate: 1 };
                } else {
                    state.phase = Phase::Shrinking;
                }
            }
            Phase::Shrinking => {
                state.scale *= self.config.shrink;
                log::debug!("no improvement, step scale now {}", state.scale);
                if state.scale < self.config.min_scale {
                    state.iteration += 1;
                    state.phase = Phase::Done(Termination::StepBelowThreshold);
                } else {
                    self.finish_iteration(&mut state);
                }
            }
        }
        Ok(state)
    }

    /// Runs the search to completion.
    ///
    /// # Errors
    /// Returns the first objective error.
    pub fn run<F: FigureOfMerit>(
        &self,
        objective: &mut F,
    ) -> std::result::Result<SearchResult, F::Error> {
        let mut state = self.start(objective)?;
        loop {
            if let Phase::Done(termination) = state.phase {
                log::info!(
                    "search finished after {} iterations at {:?}: {:?}",
                    state.iteration,
                    state.point,
                    termination
                );
                return Ok(SearchResult {
                    point: state.point,
                    value: state.best,
                    iterations: state.iteration,
                    termination,
                    history: state.history,
                });
            }
            state = self.step(state, objective)?;
        }
    }
}
