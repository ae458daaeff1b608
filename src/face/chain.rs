//! Provider fallback chain
//!
//! Providers are tried in declared priority order. Unavailable ones are
//! skipped, each call is bounded by its own timeout, a failure moves on to
//! the next provider and the first verdict wins.
//!
//! Raced mode starts every available provider at once under a shared
//! budget, but still returns the highest-priority verdict: a lower-priority
//! result is only used once everything above it has failed. Dropping the
//! future (client went away) drops the in-flight calls with it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::types::{CapturedPhoto, FaceProvider, FaceVerificationResult, ProviderError};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Consecutive failures before a provider is benched
const FAILURE_THRESHOLD: u32 = 3;

/// How long a benched provider stays unavailable
const COOLDOWN: Duration = Duration::from_secs(60);

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Skipped,
    Failed(String),
    TimedOut,
    Succeeded,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderAttempt {
    pub provider: String,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub result: FaceVerificationResult,
    pub attempts: Vec<ProviderAttempt>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum FaceChainError {
    #[error("all face providers failed: {last_error}")]
    AllProvidersFailed {
        last_error: String,
        attempts: Vec<ProviderAttempt>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainMode {
    Sequential,
    Raced { budget: Duration },
}

#[derive(Debug, Default)]
struct ProviderHealth {
    consecutive_failures: u32,
    benched_until: Option<Instant>,
}

struct ProviderSlot {
    provider: Arc<dyn FaceProvider>,
    timeout: Duration,
    health: Mutex<ProviderHealth>,
}

impl ProviderSlot {
    fn name(&self) -> &str {
        self.provider.name()
    }

    fn is_available(&self) -> bool {
        if !self.provider.available() {
            return false;
        }
        let mut health = self.health.lock();
        match health.benched_until {
            Some(until) if Instant::now() < until => false,
            Some(_) => {
                // Cooldown over, give it another chance
                health.benched_until = None;
                health.consecutive_failures = 0;
                true
            }
            None => true,
        }
    }

    fn record_success(&self) {
        let mut health = self.health.lock();
        health.consecutive_failures = 0;
        health.benched_until = None;
    }

    fn record_failure(&self) {
        let mut health = self.health.lock();
        health.consecutive_failures += 1;
        if health.consecutive_failures >= FAILURE_THRESHOLD {
            tracing::warn!(
                "Face provider {} failed {} times in a row, benched for {:?}",
                self.name(),
                health.consecutive_failures,
                COOLDOWN
            );
            health.benched_until = Some(Instant::now() + COOLDOWN);
        }
    }

    /// Execute under the slot timeout and tag the result with the slot name
    async fn run(&self, captured: &CapturedPhoto, reference_url: &str) -> Result<FaceVerificationResult, ProviderError> {
        let call = self.provider.execute(captured, reference_url, self.timeout);
        let mut result = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))??
            .normalized();
        result.provider_name = self.name().to_string();
        Ok(result)
    }

    /// Fold one call result into health state and an attempt entry
    fn settle(
        &self,
        result: Result<FaceVerificationResult, ProviderError>,
        elapsed: Duration,
    ) -> (ProviderAttempt, Result<FaceVerificationResult, String>) {
        let elapsed_ms = elapsed.as_millis() as u64;
        let (outcome, settled) = match result {
            Ok(r) if r.success => {
                self.record_success();
                (AttemptOutcome::Succeeded, Ok(r))
            }
            Ok(r) => {
                self.record_failure();
                let reason = r.reasoning.unwrap_or_else(|| "provider returned no verdict".to_string());
                (AttemptOutcome::Failed(reason.clone()), Err(reason))
            }
            Err(ProviderError::Timeout(t)) => {
                self.record_failure();
                (AttemptOutcome::TimedOut, Err(format!("timed out after {:?}", t)))
            }
            Err(e) => {
                self.record_failure();
                (AttemptOutcome::Failed(e.to_string()), Err(e.to_string()))
            }
        };

        if let Err(reason) = &settled {
            tracing::warn!("Face provider {} failed, falling back: {}", self.name(), reason);
        }

        let attempt = ProviderAttempt {
            provider: self.name().to_string(),
            outcome,
            elapsed_ms,
        };
        (attempt, settled)
    }

    fn attempt(&self, outcome: AttemptOutcome) -> ProviderAttempt {
        ProviderAttempt {
            provider: self.name().to_string(),
            outcome,
            elapsed_ms: 0,
        }
    }
}

enum RaceState {
    Skipped,
    Pending,
    Failed,
    Won(FaceVerificationResult),
}

// ============================================================================
// CHAIN
// ============================================================================

pub struct FaceVerificationChain {
    slots: Vec<Arc<ProviderSlot>>,
    mode: ChainMode,
}

impl FaceVerificationChain {
    pub fn new(mode: ChainMode) -> Self {
        Self { slots: Vec::new(), mode }
    }

    /// Append a provider; call order is priority order
    pub fn with_provider(mut self, provider: Arc<dyn FaceProvider>, timeout: Duration) -> Self {
        self.slots.push(Arc::new(ProviderSlot {
            provider,
            timeout,
            health: Mutex::new(ProviderHealth::default()),
        }));
        self
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.name().to_string()).collect()
    }

    pub async fn verify(&self, captured: &CapturedPhoto, reference_url: &str) -> Result<ChainOutcome, FaceChainError> {
        match self.mode {
            ChainMode::Sequential => self.verify_sequential(captured, reference_url).await,
            ChainMode::Raced { budget } => self.verify_raced(captured, reference_url, budget).await,
        }
    }

    async fn verify_sequential(&self, captured: &CapturedPhoto, reference_url: &str) -> Result<ChainOutcome, FaceChainError> {
        let mut attempts = Vec::with_capacity(self.slots.len());
        let mut last_error: Option<String> = None;

        for slot in &self.slots {
            if !slot.is_available() {
                tracing::debug!("Face provider {} unavailable, skipping", slot.name());
                attempts.push(slot.attempt(AttemptOutcome::Skipped));
                continue;
            }

            let started = Instant::now();
            let result = slot.run(captured, reference_url).await;
            let (attempt, settled) = slot.settle(result, started.elapsed());
            attempts.push(attempt);

            match settled {
                Ok(result) => {
                    tracing::info!("Face verified by {}", slot.name());
                    return Ok(ChainOutcome { result, attempts });
                }
                Err(reason) => last_error = Some(format!("{}: {}", slot.name(), reason)),
            }
        }

        Err(FaceChainError::AllProvidersFailed {
            last_error: last_error.unwrap_or_else(|| "no face provider available".to_string()),
            attempts,
        })
    }

    async fn verify_raced(
        &self,
        captured: &CapturedPhoto,
        reference_url: &str,
        budget: Duration,
    ) -> Result<ChainOutcome, FaceChainError> {
        let photo = Arc::new(captured.clone());
        let reference: Arc<str> = Arc::from(reference_url);
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Dropping the set aborts whatever is still running
        let mut tasks = JoinSet::new();
        let mut states = Vec::with_capacity(self.slots.len());
        let mut attempts: Vec<Option<ProviderAttempt>> = vec![None; self.slots.len()];

        for (i, slot) in self.slots.iter().enumerate() {
            if !slot.is_available() {
                states.push(RaceState::Skipped);
                attempts[i] = Some(slot.attempt(AttemptOutcome::Skipped));
                continue;
            }
            states.push(RaceState::Pending);

            let slot = slot.clone();
            let photo = photo.clone();
            let reference = reference.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                let started = Instant::now();
                let result = slot.run(&photo, &reference).await;
                let _ = tx.send((i, result, started.elapsed()));
            });
        }
        drop(tx);

        let mut last_error: Option<String> = None;
        let winner = tokio::time::timeout(budget, async {
            loop {
                // First non-failed slot in priority order decides
                let mut waiting = false;
                let mut decided = None;
                for (i, state) in states.iter().enumerate() {
                    match state {
                        RaceState::Pending => {
                            waiting = true;
                            break;
                        }
                        RaceState::Won(_) => {
                            decided = Some(i);
                            break;
                        }
                        RaceState::Skipped | RaceState::Failed => {}
                    }
                }
                if let Some(i) = decided {
                    if let RaceState::Won(result) = std::mem::replace(&mut states[i], RaceState::Failed) {
                        return Some((i, result));
                    }
                }
                if !waiting {
                    return None;
                }

                match rx.recv().await {
                    Some((i, result, elapsed)) => {
                        let slot = &self.slots[i];
                        let (attempt, settled) = slot.settle(result, elapsed);
                        attempts[i] = Some(attempt);
                        states[i] = match settled {
                            Ok(r) => RaceState::Won(r),
                            Err(reason) => {
                                last_error = Some(format!("{}: {}", slot.name(), reason));
                                RaceState::Failed
                            }
                        };
                    }
                    None => {
                        // Every sender gone; a task died without reporting
                        for (i, state) in states.iter_mut().enumerate() {
                            if matches!(state, RaceState::Pending) {
                                *state = RaceState::Failed;
                                attempts[i] = Some(self.slots[i].attempt(AttemptOutcome::Failed(
                                    "provider task ended without a result".to_string(),
                                )));
                            }
                        }
                    }
                }
            }
        })
        .await;

        tasks.abort_all();

        let winner = match winner {
            Ok(w) => w,
            Err(_) => {
                tracing::warn!("Face provider race exceeded its {:?} budget", budget);
                // Best settled success still counts; the slots ahead of it never answered
                let settled = states.iter_mut().enumerate().find_map(|(i, state)| {
                    match std::mem::replace(state, RaceState::Failed) {
                        RaceState::Won(result) => Some((i, result)),
                        _ => None,
                    }
                });
                if settled.is_none() {
                    last_error = Some(format!("time budget of {:?} exhausted", budget));
                }
                settled
            }
        };

        // Anything never heard from was cancelled by the early return or the budget
        let attempts: Vec<ProviderAttempt> = attempts
            .into_iter()
            .enumerate()
            .map(|(i, a)| a.unwrap_or_else(|| self.slots[i].attempt(AttemptOutcome::Cancelled)))
            .collect();

        match winner {
            Some((i, result)) => {
                tracing::info!("Face verified by {} (raced)", self.slots[i].name());
                Ok(ChainOutcome { result, attempts })
            }
            None => Err(FaceChainError::AllProvidersFailed {
                last_error: last_error.unwrap_or_else(|| "no face provider available".to_string()),
                attempts,
            }),
        }
    }
}
