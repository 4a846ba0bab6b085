//! Proof-of-work key generation.
//!
//! Candidates are drawn from a backend until one's identifier hashes to at most
//! `2^(256 - difficulty)`. Expected cost is `2^difficulty` key generations.
//! The search can be cancelled, bounded by a deadline, and split across
//! racing worker threads.

use crate::backend::{CryptoBackend, KeyPair};
use crate::error::{KeyError, Result};
use crate::hash::{numeric_hash, MAX_DIFFICULTY};
use keyauth_common::{log_debug, log_info, Component, Logger};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

/// Cooperative cancellation flag shared between a search and its owner
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Search tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowConfig {
    /// Number of racing worker threads; 0 and 1 both search on the caller's thread
    pub workers: usize,
    /// Give up after this long
    pub timeout: Option<Duration>,
}

impl Default for PowConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            timeout: None,
        }
    }
}

impl PowConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

pub struct ProofOfWorkKeyGenerator {
    config: PowConfig,
    logger: Logger,
}

/// Shared bookkeeping for one search run
struct SearchState<'a> {
    target: u32,
    deadline: Option<Instant>,
    cancel: &'a CancellationToken,
    done: AtomicBool,
    attempts: AtomicU64,
}

impl SearchState<'_> {
    /// Run attempts until a candidate passes, the search is stopped, or it fails.
    /// `Ok(None)` means another worker finished first.
    fn run(&self, backend: &dyn CryptoBackend) -> Result<Option<KeyPair>> {
        loop {
            if self.done.load(Ordering::Relaxed) {
                return Ok(None);
            }
            if self.cancel.is_cancelled() {
                return Err(KeyError::Cancelled);
            }
            if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(KeyError::PowTimeout {
                    attempts: self.attempts.load(Ordering::Relaxed),
                });
            }

            let candidate = backend.generate()?;
            self.attempts.fetch_add(1, Ordering::Relaxed);
            let key_id = backend.identifier(candidate.public_key())?;
            if numeric_hash(key_id.as_bytes()).meets_difficulty(self.target) {
                return Ok(Some(candidate));
            }
        }
    }
}

impl ProofOfWorkKeyGenerator {
    pub fn new(config: PowConfig, logger: &Logger) -> Self {
        Self {
            config,
            logger: logger.with_component(Component::ProofOfWork),
        }
    }

    pub fn config(&self) -> &PowConfig {
        &self.config
    }

    /// Search without an external cancellation handle
    pub fn search(&self, backend: &dyn CryptoBackend, difficulty: u32) -> Result<KeyPair> {
        self.search_with_cancel(backend, difficulty, &CancellationToken::new())
    }

    pub fn search_with_cancel(
        &self,
        backend: &dyn CryptoBackend,
        difficulty: u32,
        cancel: &CancellationToken,
    ) -> Result<KeyPair> {
        if difficulty > MAX_DIFFICULTY {
            return Err(KeyError::InvalidOperation(format!(
                "difficulty {difficulty} exceeds maximum of {MAX_DIFFICULTY}"
            )));
        }

        let started = Instant::now();
        let state = SearchState {
            target: difficulty,
            deadline: self.config.timeout.map(|timeout| started + timeout),
            cancel,
            done: AtomicBool::new(false),
            attempts: AtomicU64::new(0),
        };
        log_debug!(
            self.logger,
            "Searching {} key with difficulty {} on {} worker(s)",
            backend.scheme(),
            difficulty,
            self.config.workers.max(1)
        );

        let result = if self.config.workers <= 1 {
            state.run(backend)
        } else {
            self.race(backend, &state)
        };

        let attempts = state.attempts.load(Ordering::Relaxed);
        match result {
            Ok(Some(key_pair)) => {
                log_info!(
                    self.logger,
                    "Found {} key with difficulty >= {} after {} attempts in {:?}",
                    backend.scheme(),
                    difficulty,
                    attempts,
                    started.elapsed()
                );
                Ok(key_pair)
            }
            Ok(None) => Err(KeyError::InvalidOperation(
                "proof-of-work search stopped without a result".to_string(),
            )),
            Err(e) => {
                log_info!(self.logger, "Search aborted after {} attempts: {}", attempts, e);
                Err(e)
            }
        }
    }

    fn race(
        &self,
        backend: &dyn CryptoBackend,
        state: &SearchState<'_>,
    ) -> Result<Option<KeyPair>> {
        let (tx, rx) = mpsc::channel();
        thread::scope(|scope| {
            for _ in 0..self.config.workers {
                let tx = tx.clone();
                scope.spawn(move || {
                    let outcome = state.run(backend);
                    // a finished worker stops the others whatever its outcome
                    state.done.store(true, Ordering::Relaxed);
                    let _ = tx.send(outcome);
                });
            }
            drop(tx);

            let mut first_error = None;
            for outcome in rx.iter() {
                match outcome {
                    Ok(Some(key_pair)) => return Ok(Some(key_pair)),
                    Ok(None) => {}
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }
            match first_error {
                Some(e) => Err(e),
                None => Ok(None),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{EccBackend, KeyScheme};
    use crate::hash::difficulty;

    fn logger() -> Logger {
        Logger::new_root(Component::ProofOfWork, "pow-test")
    }

    #[test]
    fn test_search_meets_target() {
        let logger = logger();
        let backend = EccBackend::new(&logger);
        let generator = ProofOfWorkKeyGenerator::new(PowConfig::default(), &logger);
        for target in [0, 1, 4] {
            let key_pair = generator.search(&backend, target).unwrap();
            let key_id = backend.identifier(key_pair.public_key()).unwrap();
            assert!(difficulty(&key_id) >= target);
        }
    }

    #[test]
    fn test_parallel_search_meets_target() {
        let logger = logger();
        let backend = KeyScheme::Ecc.backend(&logger);
        let generator =
            ProofOfWorkKeyGenerator::new(PowConfig::default().with_workers(4), &logger);
        let key_pair = generator.search(backend.as_ref(), 6).unwrap();
        let key_id = backend.identifier(key_pair.public_key()).unwrap();
        assert!(difficulty(&key_id) >= 6);
    }

    #[test]
    fn test_cancelled_search() {
        let logger = logger();
        let backend = EccBackend::new(&logger);
        let generator = ProofOfWorkKeyGenerator::new(PowConfig::default(), &logger);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            generator.search_with_cancel(&backend, 200, &cancel),
            Err(KeyError::Cancelled)
        ));
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let logger = logger();
        let backend = EccBackend::new(&logger);
        let generator =
            ProofOfWorkKeyGenerator::new(PowConfig::default().with_workers(2), &logger);
        let cancel = CancellationToken::new();
        let remote = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });
        let result = generator.search_with_cancel(&backend, 200, &cancel);
        handle.join().unwrap();
        assert!(matches!(result, Err(KeyError::Cancelled)));
    }

    #[test]
    fn test_timeout() {
        let logger = logger();
        let backend = EccBackend::new(&logger);
        let generator = ProofOfWorkKeyGenerator::new(
            PowConfig::default().with_timeout(Duration::from_millis(20)),
            &logger,
        );
        assert!(matches!(
            generator.search(&backend, 200),
            Err(KeyError::PowTimeout { .. })
        ));
    }

    #[test]
    fn test_impossible_difficulty_rejected() {
        let logger = logger();
        let backend = EccBackend::new(&logger);
        let generator = ProofOfWorkKeyGenerator::new(PowConfig::default(), &logger);
        assert!(matches!(
            generator.search(&backend, MAX_DIFFICULTY + 1),
            Err(KeyError::InvalidOperation(_))
        ));
    }
}
