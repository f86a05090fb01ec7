//! Pod scoring through an embedded Python callable
//!
//! `Scorer` drives the whole bridge sequence for one configured symbol:
//! resolve, marshal, invoke, decode. Results come back as native values,
//! so every sequence must end with zero outstanding handles; the ledger
//! check turns a leak into an error instead of a slow heap growth.

use crate::config::ScorerConfig;
use crate::errors::{BridgeError, Result};
use crate::ffi::balanced;
use crate::interop::{decode_scores, unmarshal, ScoredPod, SymbolRef};
use crate::metrics::MetricsRecord;
use crate::runtime::EmbeddedRuntime;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct Scorer {
    symbol: SymbolRef,
    json_symbol: Option<SymbolRef>,
    runtime: &'static EmbeddedRuntime,
}

impl Scorer {
    pub fn new(symbol: SymbolRef) -> Self {
        Self {
            symbol,
            json_symbol: None,
            runtime: EmbeddedRuntime::global(),
        }
    }

    pub fn from_config(config: &ScorerConfig) -> Self {
        Self::new(config.symbol()).with_json_symbol(config.json_symbol())
    }

    /// Callable used by `score_json`
    pub fn with_json_symbol(mut self, symbol: SymbolRef) -> Self {
        self.json_symbol = Some(symbol);
        self
    }

    pub fn symbol(&self) -> &SymbolRef {
        &self.symbol
    }

    /// Score a batch passed as `list[dict]`.
    pub fn score(&self, records: &[MetricsRecord]) -> Result<Vec<ScoredPod>> {
        let started = Instant::now();
        let scores = self.runtime.session(|s| {
            balanced(|| {
                let result = s.begin(&self.symbol)?.marshal_batch(records)?.invoke()?;
                decode_scores(result.borrow())
            })
        })?;

        debug!(
            target: "runtime",
            symbol = %self.symbol,
            pods = records.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "batch scored"
        );
        Ok(scores)
    }

    /// Score a batch passed as a JSON `bytearray`.
    pub fn score_json(&self, records: &[MetricsRecord]) -> Result<Vec<ScoredPod>> {
        let symbol = self.json_target();
        self.runtime.session(|s| {
            balanced(|| {
                let result = s.begin(symbol)?.marshal_json(records)?.invoke()?;
                decode_scores(result.borrow())
            })
        })
    }

    /// Send one record and read the returned dict back as a record.
    ///
    /// Suited to callables that transform or echo a single pod.
    pub fn call_record(&self, record: &MetricsRecord) -> Result<MetricsRecord> {
        self.runtime.session(|s| {
            balanced(|| {
                let result = s.begin(&self.symbol)?.marshal(record)?.invoke()?;
                unmarshal(result.borrow())
            })
        })
    }

    /// Run `score` on a dedicated thread and stop waiting after `timeout`.
    ///
    /// The interpreter cannot be preempted mid-call, so a late worker is
    /// abandoned rather than killed. It keeps holding the runtime until
    /// the callable returns, and later sessions queue behind it.
    pub fn score_with_deadline(&self, records: &[MetricsRecord], timeout: Duration) -> Result<Vec<ScoredPod>> {
        self.with_deadline(&self.symbol, records, timeout, Scorer::score)
    }

    /// `score_json` under the same deadline rules as `score_with_deadline`.
    pub fn score_json_with_deadline(
        &self,
        records: &[MetricsRecord],
        timeout: Duration,
    ) -> Result<Vec<ScoredPod>> {
        self.with_deadline(self.json_target(), records, timeout, Scorer::score_json)
    }

    /// Score with the configured deadline; 0 waits forever.
    pub fn score_within(&self, records: &[MetricsRecord], timeout_ms: u64) -> Result<Vec<ScoredPod>> {
        if timeout_ms == 0 {
            self.score(records)
        } else {
            self.score_with_deadline(records, Duration::from_millis(timeout_ms))
        }
    }

    /// JSON-bytes counterpart of `score_within`.
    pub fn score_json_within(&self, records: &[MetricsRecord], timeout_ms: u64) -> Result<Vec<ScoredPod>> {
        if timeout_ms == 0 {
            self.score_json(records)
        } else {
            self.score_json_with_deadline(records, Duration::from_millis(timeout_ms))
        }
    }

    fn json_target(&self) -> &SymbolRef {
        self.json_symbol.as_ref().unwrap_or(&self.symbol)
    }

    fn with_deadline<F>(
        &self,
        symbol: &SymbolRef,
        records: &[MetricsRecord],
        timeout: Duration,
        run: F,
    ) -> Result<Vec<ScoredPod>>
    where
        F: FnOnce(&Scorer, &[MetricsRecord]) -> Result<Vec<ScoredPod>> + Send + 'static,
    {
        let (tx, rx) = flume::bounded(1);
        let scorer = self.clone();
        let records = records.to_vec();
        let worker_error = || BridgeError::Worker {
            symbol: symbol.to_string(),
        };

        std::thread::Builder::new()
            .name(format!("pybridge-{}", symbol))
            .spawn(move || {
                // The receiver may be gone after a timeout; nothing to report then
                let _ = tx.send(run(&scorer, &records[..]));
            })
            .map_err(|_| worker_error())?;

        match rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(flume::RecvTimeoutError::Timeout) => {
                warn!(target: "runtime", %symbol, ?timeout, "call abandoned after deadline");
                Err(BridgeError::Timeout {
                    symbol: symbol.to_string(),
                    after: timeout,
                })
            }
            Err(flume::RecvTimeoutError::Disconnected) => Err(worker_error()),
        }
    }
}

/// Keep the `top` best pods, logging the winner.
pub fn top_pods(mut scores: Vec<ScoredPod>, top: usize) -> Vec<ScoredPod> {
    scores.truncate(top);
    if let Some(best) = scores.first() {
        info!(target: "runtime", pod = %best.pod_name, score = best.score, "best pod");
    }
    scores
}
