use std::{
    future::Future,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use tracing::{debug, info, warn};

use crate::{
    error::BreakerError,
    models::circuit_breaker::{CircuitBreakerConfig, CircuitState, Counts},
};

type StateListener = Box<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// Circuit breaker shared by every delivery task.
///
/// State, generation and counts live behind one mutex so the half-open
/// admission decision is made exactly once per trial slot. The lock is never
/// held while the guarded call runs.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    listener: Option<StateListener>,
}

struct BreakerInner {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    expiry: Option<Instant>,
}

type Transitions = Vec<(CircuitState, CircuitState)>;

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            breaker = %name,
            min_requests = config.min_requests,
            failure_ratio = config.failure_ratio,
            timeout_ms = config.timeout.as_millis() as u64,
            "Circuit breaker initialized"
        );

        let expiry = (!config.window.is_zero()).then(|| Instant::now() + config.window);

        Self {
            name,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry,
            }),
            listener: None,
        }
    }

    /// Registers a callback invoked after every state transition.
    pub fn with_state_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        let mut transitions = Transitions::new();
        let state = {
            let mut inner = self.lock();
            self.current_state(&mut inner, Instant::now(), &mut transitions)
        };
        self.notify(transitions);
        state
    }

    pub fn counts(&self) -> Counts {
        let mut transitions = Transitions::new();
        let counts = {
            let mut inner = self.lock();
            self.current_state(&mut inner, Instant::now(), &mut transitions);
            inner.counts
        };
        self.notify(transitions);
        counts
    }

    /// Runs `operation` if the breaker admits it and records the outcome.
    ///
    /// Rejected calls never poll `operation`. A call whose future is dropped
    /// before completing is recorded as a failure.
    pub async fn execute<Fut, T, E>(&self, operation: Fut) -> Result<T, BreakerError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = self.admit()?;
        let result = operation.await;
        admission.settle(result.is_ok());
        result.map_err(BreakerError::Inner)
    }

    fn admit<E>(&self) -> Result<Admission<'_>, BreakerError<E>> {
        let mut transitions = Transitions::new();
        let admitted = {
            let mut inner = self.lock();
            match self.current_state(&mut inner, Instant::now(), &mut transitions) {
                CircuitState::Open => Err(BreakerError::Open),
                CircuitState::HalfOpen
                    if inner.counts.requests >= self.config.half_open_requests =>
                {
                    Err(BreakerError::TooManyRequests)
                }
                _ => {
                    inner.counts.on_request();
                    Ok(inner.generation)
                }
            }
        };
        self.notify(transitions);

        match admitted {
            Ok(generation) => Ok(Admission {
                breaker: self,
                generation,
                settled: false,
            }),
            Err(e) => {
                debug!(breaker = %self.name, "Circuit breaker rejected call");
                Err(e)
            }
        }
    }

    fn after_request(&self, generation: u64, success: bool) {
        let mut transitions = Transitions::new();
        {
            let mut inner = self.lock();
            let now = Instant::now();
            let state = self.current_state(&mut inner, now, &mut transitions);

            // Outcome belongs to a generation that has since been reset.
            if inner.generation != generation {
                drop(inner);
                self.notify(transitions);
                return;
            }

            if success {
                inner.counts.on_success();
            } else {
                inner.counts.on_failure();
            }

            match state {
                CircuitState::Closed => {
                    if self.ready_to_trip(&inner.counts) {
                        self.set_state(&mut inner, CircuitState::Open, now, &mut transitions);
                    }
                }
                CircuitState::HalfOpen => {
                    if !success {
                        self.set_state(&mut inner, CircuitState::Open, now, &mut transitions);
                    } else if inner.counts.consecutive_successes >= self.config.half_open_requests {
                        self.set_state(&mut inner, CircuitState::Closed, now, &mut transitions);
                    }
                }
                CircuitState::Open => {}
            }
        }
        self.notify(transitions);
    }

    fn ready_to_trip(&self, counts: &Counts) -> bool {
        counts.requests >= self.config.min_requests
            && counts.failure_ratio() >= self.config.failure_ratio
    }

    fn current_state(
        &self,
        inner: &mut BreakerInner,
        now: Instant,
        transitions: &mut Transitions,
    ) -> CircuitState {
        let expired = inner.expiry.is_some_and(|expiry| expiry <= now);

        match inner.state {
            CircuitState::Closed if expired => self.new_generation(inner, now),
            CircuitState::Open if expired => {
                self.set_state(inner, CircuitState::HalfOpen, now, transitions)
            }
            _ => {}
        }

        inner.state
    }

    fn set_state(
        &self,
        inner: &mut BreakerInner,
        state: CircuitState,
        now: Instant,
        transitions: &mut Transitions,
    ) {
        if inner.state == state {
            return;
        }

        let previous = inner.state;
        inner.state = state;
        self.new_generation(inner, now);
        transitions.push((previous, state));
    }

    fn new_generation(&self, inner: &mut BreakerInner, now: Instant) {
        inner.generation = inner.generation.wrapping_add(1);
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            CircuitState::Closed => {
                (!self.config.window.is_zero()).then(|| now + self.config.window)
            }
            CircuitState::Open => Some(now + self.config.timeout),
            CircuitState::HalfOpen => None,
        };
    }

    fn notify(&self, transitions: Transitions) {
        for (from, to) in transitions {
            match to {
                CircuitState::Open => {
                    warn!(breaker = %self.name, from = %from, to = %to, "Circuit breaker opened")
                }
                _ => info!(breaker = %self.name, from = %from, to = %to, "Circuit breaker state changed"),
            }

            if let Some(listener) = &self.listener {
                listener(&self.name, from, to);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl Admission<'_> {
    fn settle(mut self, success: bool) {
        self.settled = true;
        self.breaker.after_request(self.generation, success);
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.after_request(self.generation, false);
        }
    }
}
