//! Live provider capacity tracking with circuit breaker
//!
//! Keeps a rolling window of call outcomes per provider and trips a
//! breaker after consecutive failures. Each provider has its own lock;
//! there is no lock across providers.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use dashmap::{DashMap, DashSet};
use switchyard_config::CapacityConfig;
use switchyard_core::{CircuitState, ProviderError, ProviderState};

/// Classified outcome of one provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The provider answered
    Success,
    /// The provider failed; counts toward the breaker
    Failure,
    /// The provider throttled the call; counts as an error but never trips the breaker
    Throttled,
    /// The caller's own deadline cut the call short; not a health signal
    Cancelled,
}

impl CallOutcome {
    pub const fn from_error(error: &ProviderError) -> Self {
        match error {
            ProviderError::RateLimited { .. } => Self::Throttled,
            _ => Self::Failure,
        }
    }

    pub fn of<T>(result: &Result<T, ProviderError>) -> Self {
        result.as_ref().map_or_else(Self::from_error, |_| Self::Success)
    }

    const fn is_error(self) -> bool {
        !matches!(self, Self::Success)
    }
}

/// Resolved capacity settings
#[derive(Debug, Clone, Copy)]
pub struct CapacitySettings {
    /// Sample age limit
    pub window: Duration,
    /// Sample count limit
    pub max_samples: usize,
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Open duration before a probe is admitted
    pub cooldown: Duration,
}

impl CapacitySettings {
    /// Resolve duration strings from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if `window` or `cooldown` cannot be parsed
    pub fn from_config(config: &CapacityConfig) -> anyhow::Result<Self> {
        Ok(Self {
            window: switchyard_config::parse_duration(&config.window)?,
            max_samples: config.max_samples.max(1),
            failure_threshold: config.failure_threshold.max(1),
            cooldown: switchyard_config::parse_duration(&config.cooldown)?,
        })
    }
}

impl Default for CapacitySettings {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_samples: 256,
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    latency: Duration,
    outcome: CallOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Circuit {
    Closed,
    Open { since: Instant },
    HalfOpen,
}

impl Circuit {
    const fn state(self) -> CircuitState {
        match self {
            Self::Closed => CircuitState::Closed,
            Self::Open { .. } => CircuitState::Open,
            Self::HalfOpen => CircuitState::HalfOpen,
        }
    }
}

/// Per-provider mutable state, guarded by its own lock
#[derive(Debug)]
struct ProviderCell {
    samples: VecDeque<Sample>,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    circuit: Circuit,
    in_flight: u32,
    probe_in_flight: bool,
}

impl ProviderCell {
    const fn new() -> Self {
        Self {
            samples: VecDeque::new(),
            consecutive_failures: 0,
            last_failure_at: None,
            circuit: Circuit::Closed,
            in_flight: 0,
            probe_in_flight: false,
        }
    }

    fn evict(&mut self, now: Instant, settings: &CapacitySettings) {
        while let Some(front) = self.samples.front()
            && (now.saturating_duration_since(front.at) > settings.window
                || self.samples.len() > settings.max_samples)
        {
            self.samples.pop_front();
        }
    }

    /// Apply the time-driven `Open -> HalfOpen` edge
    fn refresh(&mut self, provider: &str, now: Instant, settings: &CapacitySettings) {
        if let Circuit::Open { since } = self.circuit
            && now.saturating_duration_since(since) >= settings.cooldown
        {
            self.transition(provider, Circuit::HalfOpen);
            self.probe_in_flight = false;
        }
    }

    fn transition(&mut self, provider: &str, to: Circuit) {
        let from = self.circuit.state();
        self.circuit = to;
        tracing::warn!(
            target: "switchyard::circuit",
            provider,
            from = from.as_str(),
            to = to.state().as_str(),
            consecutive_failures = self.consecutive_failures,
            "circuit state changed"
        );
    }

    fn record(&mut self, provider: &str, outcome: CallOutcome, latency: Duration, now: Instant, settings: &CapacitySettings) {
        self.refresh(provider, now, settings);
        if outcome == CallOutcome::Cancelled {
            self.probe_in_flight = false;
            return;
        }
        self.samples.push_back(Sample {
            at: now,
            latency,
            outcome,
        });
        self.evict(now, settings);

        let was_probe = self.circuit == Circuit::HalfOpen;
        self.probe_in_flight = false;

        match outcome {
            CallOutcome::Success => {
                self.consecutive_failures = 0;
                self.last_failure_at = None;
                if was_probe {
                    self.transition(provider, Circuit::Closed);
                }
            }
            CallOutcome::Failure => {
                let stale = self
                    .last_failure_at
                    .is_some_and(|at| now.saturating_duration_since(at) > settings.window);
                if stale {
                    self.consecutive_failures = 0;
                }
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.last_failure_at = Some(now);

                match self.circuit {
                    Circuit::HalfOpen => self.transition(provider, Circuit::Open { since: now }),
                    Circuit::Closed if self.consecutive_failures >= settings.failure_threshold => {
                        self.transition(provider, Circuit::Open { since: now });
                    }
                    Circuit::Closed | Circuit::Open { .. } => {}
                }
            }
            CallOutcome::Throttled => {
                if was_probe {
                    self.transition(provider, Circuit::Open { since: now });
                }
            }
            CallOutcome::Cancelled => {}
        }
    }

    const fn available(&self) -> bool {
        match self.circuit {
            Circuit::Closed => true,
            Circuit::Open { .. } => false,
            Circuit::HalfOpen => !self.probe_in_flight,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn snapshot(&self, provider: &str) -> ProviderState {
        let mut latencies: Vec<f64> = self
            .samples
            .iter()
            .filter(|s| s.outcome == CallOutcome::Success)
            .map(|s| s.latency.as_secs_f64() * 1000.0)
            .collect();
        latencies.sort_by(f64::total_cmp);

        let mean_latency_ms = (!latencies.is_empty()).then(|| latencies.iter().sum::<f64>() / latencies.len() as f64);
        let p50_latency_ms = (!latencies.is_empty()).then(|| percentile(&latencies, 0.50));

        let sample_count = self.samples.len();
        let errors = self.samples.iter().filter(|s| s.outcome.is_error()).count();
        let error_rate = (sample_count > 0).then(|| errors as f64 / sample_count as f64);

        ProviderState {
            provider_id: provider.to_owned(),
            queue_depth: self.in_flight,
            mean_latency_ms,
            p50_latency_ms,
            error_rate,
            sample_count,
            consecutive_failures: self.consecutive_failures,
            circuit: self.circuit.state(),
            available: self.available(),
        }
    }
}

/// Track provider capacity and implement circuit breaker logic
#[derive(Debug)]
pub struct CapacityMonitor {
    providers: DashMap<String, Mutex<ProviderCell>>,
    /// Ids removed by a reload; never given a new cell
    retired: DashSet<String>,
    settings: CapacitySettings,
}

impl CapacityMonitor {
    /// Create a monitor with the given settings
    pub fn new(settings: CapacitySettings) -> Self {
        Self {
            providers: DashMap::new(),
            retired: DashSet::new(),
            settings,
        }
    }

    pub const fn settings(&self) -> &CapacitySettings {
        &self.settings
    }

    fn with_cell<R>(&self, provider: &str, f: impl FnOnce(&mut ProviderCell) -> R) -> Option<R> {
        if let Some(cell) = self.providers.get(provider) {
            return Some(f(&mut lock(&cell)));
        }
        if self.retired.contains(provider) {
            return None;
        }
        let cell = self
            .providers
            .entry(provider.to_owned())
            .or_insert_with(|| Mutex::new(ProviderCell::new()))
            .downgrade();
        Some(f(&mut lock(&cell)))
    }

    /// Record the outcome of one call
    pub fn record(&self, provider: &str, outcome: CallOutcome, latency: Duration) {
        self.record_at(provider, outcome, latency, Instant::now());
    }

    pub(crate) fn record_at(&self, provider: &str, outcome: CallOutcome, latency: Duration, now: Instant) {
        let settings = self.settings;
        self.with_cell(provider, |cell| cell.record(provider, outcome, latency, now, &settings));
    }

    /// Current state of a provider; a never-seen provider is fresh and closed
    pub fn snapshot(&self, provider: &str) -> ProviderState {
        self.snapshot_at(provider, Instant::now())
    }

    pub(crate) fn snapshot_at(&self, provider: &str, now: Instant) -> ProviderState {
        let Some(cell) = self.providers.get(provider) else {
            return ProviderState::fresh(provider);
        };
        let mut cell = lock(&cell);
        cell.refresh(provider, now, &self.settings);
        cell.evict(now, &self.settings);
        cell.snapshot(provider)
    }

    /// Claim the right to send a call now
    ///
    /// Always granted while closed. While half-open only the first caller
    /// wins; it holds the probe slot until its outcome is recorded or
    /// [`release`](Self::release) is called.
    pub fn try_admit(&self, provider: &str) -> bool {
        self.try_admit_at(provider, Instant::now())
    }

    pub(crate) fn try_admit_at(&self, provider: &str, now: Instant) -> bool {
        let Some(cell) = self.providers.get(provider) else {
            return true;
        };
        let mut cell = lock(&cell);
        cell.refresh(provider, now, &self.settings);
        match cell.circuit {
            Circuit::Closed => true,
            Circuit::Open { .. } => false,
            Circuit::HalfOpen if cell.probe_in_flight => false,
            Circuit::HalfOpen => {
                cell.probe_in_flight = true;
                true
            }
        }
    }

    /// Give back an admission that will not be used
    pub fn release(&self, provider: &str) {
        if let Some(cell) = self.providers.get(provider) {
            lock(&cell).probe_in_flight = false;
        }
    }

    /// Mark a call as in flight until the guard is finished or dropped
    pub fn begin(&self, provider: &str) -> InFlight<'_> {
        self.with_cell(provider, |cell| cell.in_flight = cell.in_flight.saturating_add(1));
        InFlight {
            monitor: self,
            provider: provider.to_owned(),
            started: Instant::now(),
            finished: false,
        }
    }

    /// Keep state only for the `configured` providers
    ///
    /// Dropped ids are retired: outcomes still arriving from requests on an
    /// older catalog are ignored instead of recreating their state. An id
    /// that is configured again starts fresh.
    pub fn retain_providers<'a>(&self, configured: impl IntoIterator<Item = &'a str>) {
        let configured: HashSet<&str> = configured.into_iter().collect();
        self.providers.retain(|id, _| {
            let keep = configured.contains(id.as_str());
            if !keep {
                self.retired.insert(id.clone());
            }
            keep
        });
        self.retired.retain(|id| !configured.contains(id.as_str()));
    }

    /// Number of providers with tracked state
    pub fn tracked(&self) -> usize {
        self.providers.len()
    }

    fn end(&self, provider: &str) {
        if let Some(cell) = self.providers.get(provider) {
            let mut cell = lock(&cell);
            cell.in_flight = cell.in_flight.saturating_sub(1);
        }
    }
}

impl Default for CapacityMonitor {
    fn default() -> Self {
        Self::new(CapacitySettings::default())
    }
}

/// In-flight call; reports its outcome exactly once
#[derive(Debug)]
pub struct InFlight<'a> {
    monitor: &'a CapacityMonitor,
    provider: String,
    started: Instant,
    finished: bool,
}

impl InFlight<'_> {
    /// Time since the call began
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Record the outcome and latency, consuming the guard
    pub fn finish(mut self, outcome: CallOutcome) -> Duration {
        let latency = self.elapsed();
        self.finished = true;
        self.monitor.end(&self.provider);
        self.monitor.record(&self.provider, outcome, latency);
        latency
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.monitor.end(&self.provider);
            self.monitor.release(&self.provider);
        }
    }
}

fn lock(cell: &Mutex<ProviderCell>) -> MutexGuard<'_, ProviderCell> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let idx = ((sorted.len() as f64 - 1.0) * pct).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
