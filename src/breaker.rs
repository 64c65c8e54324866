//! Circuit Breaker
//!
//! Explicit three-state machine guarding calls into a fallible dependency.
//!
//! # State Machine
//!
//! ```text
//!            failures in interval >= threshold
//!  CLOSED ─────────────────────────────────────▶ OPEN
//!    ▲                                            │
//!    │ probe succeeds              cooldown over  │
//!    │                                            ▼
//!    └──────────────────────────────────────── HALF_OPEN
//!                    probe fails ──▶ OPEN
//! ```
//!
//! - **Closed**: calls pass; counts reset every `interval`.
//! - **Open**: calls rejected with [`BreakerError::Open`] until `cooldown` elapses.
//! - **Half-Open**: `max_probes` calls admitted; further calls get
//!   [`BreakerError::TooManyProbes`].
//!
//! Each transition starts a new generation; results of calls admitted in an
//! older generation are discarded.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::BreakerConfig;
use crate::error::ChargeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "CLOSED"),
            BreakerState::Open => write!(f, "OPEN"),
            BreakerState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Request/outcome counters for the current generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests += 1;
    }

    fn on_success(&mut self) {
        self.total_successes += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BreakerError<E> {
    /// Rejected without calling: breaker is open
    Open,
    /// Rejected without calling: half-open probe slots are taken
    TooManyProbes,
    /// The call ran and failed
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::Open => write!(f, "circuit breaker is open"),
            BreakerError::TooManyProbes => write!(f, "too many requests while half-open"),
            BreakerError::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl From<BreakerError<ChargeError>> for ChargeError {
    fn from(e: BreakerError<ChargeError>) -> Self {
        match e {
            BreakerError::Open | BreakerError::TooManyProbes => ChargeError::CircuitOpen,
            BreakerError::Inner(e) => e,
        }
    }
}

type Classifier<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;
type Listener = Arc<dyn Fn(&str, BreakerState, BreakerState) + Send + Sync>;

pub struct Settings<E> {
    pub name: String,
    /// Rolling window for counts while closed
    pub interval: Duration,
    /// Time spent open before probing
    pub cooldown: Duration,
    pub failure_threshold: u32,
    pub max_probes: u32,
    /// Errors for which this returns true count as successes
    pub is_successful: Classifier<E>,
    pub on_state_change: Option<Listener>,
}

fn never_successful<E>(_: &E) -> bool {
    false
}

impl<E: 'static> Settings<E> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interval: Duration::from_secs(10),
            cooldown: Duration::from_secs(5),
            failure_threshold: 3,
            max_probes: 1,
            is_successful: Arc::new(never_successful::<E>),
            on_state_change: None,
        }
    }

    pub fn from_config(config: &BreakerConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs),
            cooldown: Duration::from_secs(config.cooldown_secs),
            failure_threshold: config.failure_threshold,
            ..Self::new(config.name.clone())
        }
    }

    pub fn with_success_classifier<F>(mut self, f: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.is_successful = Arc::new(f);
        self
    }

    pub fn with_state_listener<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, BreakerState, BreakerState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(f));
        self
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    generation: u64,
    counts: Counts,
    /// Closed: end of the counting window. Open: end of cooldown.
    expiry: Option<Instant>,
}

/// Counts a call dropped before completion as a failure, so a cancelled
/// half-open probe cannot hold the probe slot forever.
struct InFlight<'a, E> {
    breaker: &'a CircuitBreaker<E>,
    generation: u64,
    done: bool,
}

impl<E> Drop for InFlight<'_, E> {
    fn drop(&mut self) {
        if !self.done {
            self.breaker.after_request(self.generation, false);
        }
    }
}

pub struct CircuitBreaker<E> {
    settings: Settings<E>,
    inner: Mutex<Inner>,
}

impl<E> CircuitBreaker<E> {
    pub fn new(settings: Settings<E>) -> Self {
        let expiry = Some(Instant::now() + settings.interval);
        Self {
            settings,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Current state, applying any time-based transition first
    pub fn state(&self) -> BreakerState {
        let mut inner = self.lock();
        self.current_state(&mut inner, Instant::now());
        inner.state
    }

    pub fn counts(&self) -> Counts {
        let mut inner = self.lock();
        self.current_state(&mut inner, Instant::now());
        inner.counts
    }

    /// Run `f` through the breaker
    pub async fn execute<T, F, Fut>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let generation = self.before_request()?;
        let mut in_flight = InFlight {
            breaker: self,
            generation,
            done: false,
        };
        let result = f().await;
        let success = match &result {
            Ok(_) => true,
            Err(e) => (self.settings.is_successful)(e),
        };
        in_flight.done = true;
        self.after_request(generation, success);
        result.map_err(BreakerError::Inner)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn before_request(&self) -> Result<u64, BreakerError<E>> {
        let mut inner = self.lock();
        let now = Instant::now();
        let generation = self.current_state(&mut inner, now);

        match inner.state {
            BreakerState::Open => return Err(BreakerError::Open),
            BreakerState::HalfOpen if inner.counts.requests >= self.settings.max_probes => {
                return Err(BreakerError::TooManyProbes);
            }
            _ => {}
        }

        inner.counts.on_request();
        Ok(generation)
    }

    fn after_request(&self, before: u64, success: bool) {
        let mut inner = self.lock();
        let now = Instant::now();
        let generation = self.current_state(&mut inner, now);
        if generation != before {
            return;
        }

        if success {
            self.on_success(&mut inner, now);
        } else {
            self.on_failure(&mut inner, now);
        }
    }

    fn on_success(&self, inner: &mut Inner, now: Instant) {
        match inner.state {
            BreakerState::Closed => inner.counts.on_success(),
            BreakerState::HalfOpen => {
                inner.counts.on_success();
                if inner.counts.consecutive_successes >= self.settings.max_probes {
                    self.set_state(inner, BreakerState::Closed, now);
                }
            }
            BreakerState::Open => {}
        }
    }

    fn on_failure(&self, inner: &mut Inner, now: Instant) {
        match inner.state {
            BreakerState::Closed => {
                inner.counts.on_failure();
                if inner.counts.total_failures >= self.settings.failure_threshold {
                    self.set_state(inner, BreakerState::Open, now);
                }
            }
            BreakerState::HalfOpen => self.set_state(inner, BreakerState::Open, now),
            BreakerState::Open => {}
        }
    }

    /// Apply time-based transitions; returns the current generation
    fn current_state(&self, inner: &mut Inner, now: Instant) -> u64 {
        match inner.state {
            BreakerState::Closed => {
                if inner.expiry.is_some_and(|expiry| expiry <= now) {
                    self.new_generation(inner, now);
                }
            }
            BreakerState::Open => {
                if inner.expiry.is_some_and(|expiry| expiry <= now) {
                    self.set_state(inner, BreakerState::HalfOpen, now);
                }
            }
            BreakerState::HalfOpen => {}
        }
        inner.generation
    }

    fn set_state(&self, inner: &mut Inner, state: BreakerState, now: Instant) {
        if inner.state == state {
            return;
        }
        let prev = inner.state;
        inner.state = state;
        self.new_generation(inner, now);

        match state {
            BreakerState::Open => warn!(breaker = %self.settings.name, from = %prev, to = %state, "Circuit breaker state change"),
            _ => info!(breaker = %self.settings.name, from = %prev, to = %state, "Circuit breaker state change"),
        }
        if let Some(listener) = &self.settings.on_state_change {
            listener(&self.settings.name, prev, state);
        }
    }

    fn new_generation(&self, inner: &mut Inner, now: Instant) {
        inner.generation += 1;
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            BreakerState::Closed => Some(now + self.settings.interval),
            BreakerState::Open => Some(now + self.settings.cooldown),
            BreakerState::HalfOpen => None,
        };
    }
}
