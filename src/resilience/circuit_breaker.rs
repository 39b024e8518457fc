//! Circuit breaker for downstream protection.
//!
//! # States
//! - Closed: normal operation, attempts pass through and are recorded
//! - Open: downstream assumed down, attempts fail fast with `CircuitOpen`
//! - Half-Open: a limited batch of probes tests whether it recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: a saturated window at or above the failure rate threshold
//!                is judged by the next outcome that arrives
//! Open → Half-Open: after wait_duration_open
//! Half-Open → Closed: probe failure rate below the threshold
//! Half-Open → Open: probe failure rate at or above the threshold
//! ```
//!
//! # Design Decisions
//! - One breaker per client, shared by all concurrent calls
//! - All transitions happen under a single lock
//! - Every transition starts a new generation; outcomes from an older one are dropped
//! - Rejected attempts are never recorded
//! - The outcome that judges a saturated window is not recorded itself, so a
//!   success arriving at a failing window still opens the circuit

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::error::CallError;
use crate::observability::metrics;

/// Observable state of a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        };
        f.write_str(state)
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    generation: u64,
    /// Most recent outcomes, `true` meaning failure.
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    probes_admitted: u32,
    probes_completed: u32,
    probe_failures: u32,
}

impl BreakerState {
    fn failure_rate(failures: usize, total: usize) -> f32 {
        if total == 0 {
            return 0.0;
        }
        failures as f32 * 100.0 / total as f32
    }

    fn window_failure_rate(&self) -> f32 {
        let failures = self.window.iter().filter(|failed| **failed).count();
        Self::failure_rate(failures, self.window.len())
    }
}

/// Count-based circuit breaker over a sliding window of attempt outcomes.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let name = name.into();
        metrics::record_circuit_state(&name, CircuitState::Closed);
        Self {
            name,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                generation: 0,
                window: VecDeque::with_capacity(config.sliding_window_size as usize),
                opened_at: None,
                probes_admitted: 0,
                probes_completed: 0,
                probe_failures: 0,
            }),
            config,
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state. An open breaker whose wait has elapsed still reports
    /// `Open` until the next attempt moves it to half-open.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Ask for permission to run one attempt.
    ///
    /// The returned [`Permit`] must be settled with the attempt's outcome.
    /// Dropping it unsettled records nothing and frees a half-open probe slot.
    pub fn try_acquire(&self) -> Result<Permit<'_>, CallError> {
        let mut inner = self.lock();

        if inner.state == CircuitState::Open {
            let waited = inner
                .opened_at
                .map(|opened_at| opened_at.elapsed() >= self.config.wait_duration_open)
                .unwrap_or(true);
            if waited {
                self.transition(&mut inner, CircuitState::HalfOpen);
            }
        }

        let admitted = match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.probes_admitted < self.config.permitted_calls_half_open {
                    inner.probes_admitted += 1;
                    true
                } else {
                    false
                }
            }
        };

        if !admitted {
            let state = inner.state;
            drop(inner);
            tracing::warn!(breaker = %self.name, state = %state, "Circuit breaker rejected attempt");
            metrics::record_circuit_rejection(&self.name);
            return Err(CallError::CircuitOpen);
        }

        Ok(Permit {
            breaker: self,
            generation: inner.generation,
            settled: false,
        })
    }

    fn on_result(&self, generation: u64, failed: bool) {
        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::trace!(breaker = %self.name, "Discarding outcome from a previous breaker state");
            return;
        }

        match inner.state {
            CircuitState::Closed => {
                let size = self.config.sliding_window_size as usize;
                if inner.window.len() >= size
                    && inner.window_failure_rate() >= self.config.failure_rate_threshold
                {
                    let rate = inner.window_failure_rate();
                    tracing::debug!(breaker = %self.name, failure_rate = rate, "Failure rate threshold reached");
                    self.transition(&mut inner, CircuitState::Open);
                    return;
                }

                if inner.window.len() >= size {
                    inner.window.pop_front();
                }
                inner.window.push_back(failed);
            }
            CircuitState::HalfOpen => {
                inner.probes_completed += 1;
                if failed {
                    inner.probe_failures += 1;
                }

                if inner.probes_completed >= self.config.permitted_calls_half_open {
                    let rate = BreakerState::failure_rate(
                        inner.probe_failures as usize,
                        inner.probes_completed as usize,
                    );
                    let next = if rate >= self.config.failure_rate_threshold {
                        CircuitState::Open
                    } else {
                        CircuitState::Closed
                    };
                    self.transition(&mut inner, next);
                }
            }
            // Outcomes of an open breaker always belong to an older generation.
            CircuitState::Open => {}
        }
    }

    fn release_probe(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation
            && inner.state == CircuitState::HalfOpen
            && inner.probes_admitted > inner.probes_completed
        {
            inner.probes_admitted -= 1;
        }
    }

    fn transition(&self, inner: &mut BreakerState, next: CircuitState) {
        let previous = inner.state;
        inner.state = next;
        inner.generation += 1;
        inner.window.clear();
        inner.probes_admitted = 0;
        inner.probes_completed = 0;
        inner.probe_failures = 0;
        inner.opened_at = (next == CircuitState::Open).then(Instant::now);

        tracing::info!(
            breaker = %self.name,
            from = %previous,
            to = %next,
            "Circuit breaker state changed"
        );
        metrics::record_circuit_state(&self.name, next);
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Admission for a single attempt, tied to the breaker generation that granted it.
#[must_use = "a permit must be settled with the outcome of the attempt"]
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl Permit<'_> {
    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.on_result(self.generation, false);
    }

    pub fn record_failure(mut self) {
        self.settled = true;
        self.breaker.on_result(self.generation, true);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release_probe(self.generation);
        }
    }
}
