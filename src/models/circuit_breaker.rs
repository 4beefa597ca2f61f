use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Minimum requests observed in the current window before the breaker may trip.
    pub min_requests: u32,
    /// Failure ratio at or above which the breaker trips.
    pub failure_ratio: f64,
    /// How long the breaker stays open before admitting a trial call.
    pub timeout: Duration,
    /// Trial calls admitted while half-open; that many consecutive successes close it.
    pub half_open_requests: u32,
    /// Closed-state counts are cleared on this cycle. Zero keeps them until a trip.
    pub window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            min_requests: 10,
            failure_ratio: 0.6,
            timeout: Duration::from_secs(5),
            half_open_requests: 1,
            window: Duration::from_secs(60),
        }
    }
}

/// Request tallies for the current breaker generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    pub fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    pub fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    pub fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        f64::from(self.total_failures) / f64::from(self.requests)
    }
}
