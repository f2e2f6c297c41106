//! Streaming execution engine
//!
//! Execution flow (strict order):
//! 1. Validate the source schema against the plan. No batch is read on failure.
//! 2. Pull batches from the source in order
//! 3. Fold each batch into a batch-local accumulator set
//! 4. Merge batch partials into the running set in batch order
//! 5. Finalize non-empty bins in rank order
//!
//! With `workers > 1` batches are pulled on the calling thread and handed to
//! scoped fold workers over a bounded channel. Partials come back tagged with
//! their sequence number and are merged strictly in order, so sequential and
//! parallel runs produce bit-identical results.

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::accumulator::AccumulatorSet;
use super::errors::{ExecutorError, ExecutorResult};
use super::filters::{PredicateFilter, RowOutcome};
use super::result::{ExecutionResult, ExecutionStats, ResultRow};
use super::source::BatchSource;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry, ObservationScope};
use crate::planner::QueryPlan;
use crate::storage::{Batch, ColumnarReader, StorageError};

/// Default rows per batch
pub const DEFAULT_BATCH_SIZE: usize = 8_192;

/// Upper bound on fold workers
pub const MAX_WORKERS: usize = 256;

/// Non-semantic execution settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorOptions {
    pub batch_size: usize,
    pub workers: usize,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            workers: 1,
        }
    }
}

impl ExecutorOptions {
    pub fn validate(&self) -> ExecutorResult<()> {
        if self.batch_size == 0 {
            return Err(ExecutorError::invalid_options("batch_size must be positive"));
        }
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(ExecutorError::invalid_options(format!(
                "workers must be between 1 and {}, got {}",
                MAX_WORKERS, self.workers
            )));
        }
        Ok(())
    }
}

/// Contribution of one folded batch
#[derive(Debug)]
struct BatchPartial {
    accumulators: AccumulatorSet,
    stats: ExecutionStats,
    /// Column of the first skipped row, for the per-batch warning
    first_skipped: Option<String>,
}

fn fold_batch(filter: &PredicateFilter, batch: &Batch) -> BatchPartial {
    let mut accumulators = AccumulatorSet::new(filter.bucketizer().num_bins());
    let mut stats = ExecutionStats {
        batches_processed: 1,
        rows_scanned: batch.num_rows() as u64,
        ..ExecutionStats::default()
    };
    let mut first_skipped = None;

    for row in 0..batch.num_rows() {
        match filter.classify(batch, row) {
            RowOutcome::Filtered => stats.rows_filtered += 1,
            RowOutcome::Unbinned => stats.rows_unbinned += 1,
            RowOutcome::Skipped(column) => {
                stats.rows_skipped += 1;
                if first_skipped.is_none() {
                    first_skipped = batch
                        .schema()
                        .columns()
                        .get(column)
                        .map(|c| c.name.clone());
                }
            }
            RowOutcome::Aggregated { rank, glucose, age } => {
                stats.rows_aggregated += 1;
                accumulators.fold(rank, glucose, age);
            }
        }
    }

    BatchPartial {
        accumulators,
        stats,
        first_skipped,
    }
}

/// Running state at the coordinator
struct MergeState<'m> {
    accumulators: AccumulatorSet,
    stats: ExecutionStats,
    metrics: Option<&'m MetricsRegistry>,
}

impl<'m> MergeState<'m> {
    fn absorb(&mut self, seq: u64, partial: BatchPartial) {
        let s = &partial.stats;
        if s.rows_skipped > 0 {
            log_event_with_fields(
                Event::RowsSkipped,
                &[
                    ("batch", &seq.to_string()),
                    ("rows_skipped", &s.rows_skipped.to_string()),
                    ("column", partial.first_skipped.as_deref().unwrap_or("")),
                ],
            );
        }
        log_event_with_fields(
            Event::BatchFolded,
            &[("batch", &seq.to_string()), ("rows", &s.rows_scanned.to_string())],
        );
        if let Some(metrics) = self.metrics {
            metrics.record_batch(
                s.rows_scanned,
                s.rows_filtered,
                s.rows_skipped,
                s.rows_unbinned,
                s.rows_aggregated,
            );
        }
        self.accumulators.merge(&partial.accumulators);
        self.stats.merge(s);
    }

    /// Merges every partial whose predecessors have all been merged
    fn drain_in_order(&mut self, pending: &mut BTreeMap<u64, BatchPartial>, next: &mut u64) {
        while let Some(partial) = pending.remove(next) {
            self.absorb(*next, partial);
            *next += 1;
        }
    }
}

/// Executes a cohort plan over a stream of batches
pub struct StreamingExecutor<'m> {
    plan: QueryPlan,
    options: ExecutorOptions,
    metrics: Option<&'m MetricsRegistry>,
}

impl<'m> StreamingExecutor<'m> {
    /// Creates an executor. Options are validated here.
    pub fn new(plan: QueryPlan, options: ExecutorOptions) -> ExecutorResult<Self> {
        options.validate()?;
        Ok(Self {
            plan,
            options,
            metrics: None,
        })
    }

    /// Records batch and execution counters into `metrics`
    pub fn with_metrics(mut self, metrics: &'m MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Opens a projected scan over a columnar file and executes over it.
    pub fn execute_columnar(&self, reader: &ColumnarReader) -> ExecutorResult<ExecutionResult> {
        if let Err(e) = reader.require_columns(&self.plan.required_columns()) {
            return Err(self.reject_schema(e));
        }
        let mut scan = reader
            .scan(&self.plan.projection, self.options.batch_size)
            .map_err(|e| {
                if e.is_schema_mismatch() {
                    self.reject_schema(e)
                } else {
                    ExecutorError::scan_failed(e, 0)
                }
            })?;
        log_event_with_fields(
            Event::ScanOpen,
            &[
                ("path", &reader.path().display().to_string()),
                ("batch_size", &self.options.batch_size.to_string()),
                ("total_rows", &reader.metadata().total_rows.to_string()),
            ],
        );
        self.execute(&mut scan)
    }

    /// Executes the plan over `source` and materializes the result.
    ///
    /// Any error aborts the execution; no partial result is returned.
    pub fn execute<S: BatchSource>(&self, source: &mut S) -> ExecutorResult<ExecutionResult> {
        let run_id = Uuid::new_v4().to_string();
        let scope = ObservationScope::with_fields(
            "EXECUTE",
            &[
                ("run_id", &run_id),
                ("workers", &self.options.workers.to_string()),
            ],
        );

        let outcome = self.execute_inner(source);

        if let Some(metrics) = self.metrics {
            if outcome.is_ok() {
                metrics.increment_executions();
            } else {
                metrics.increment_executions_failed();
            }
        }

        match &outcome {
            Ok(result) => {
                let s = &result.stats;
                scope.complete_with_fields(&[
                    ("batches", &s.batches_processed.to_string()),
                    ("rows_scanned", &s.rows_scanned.to_string()),
                    ("rows_filtered", &s.rows_filtered.to_string()),
                    ("rows_skipped", &s.rows_skipped.to_string()),
                    ("rows_unbinned", &s.rows_unbinned.to_string()),
                    ("rows_aggregated", &s.rows_aggregated.to_string()),
                    ("bins", &result.rows.len().to_string()),
                ]);
            }
            Err(e) => scope.fail(e.code().code(), e.message(), e.is_fatal()),
        }
        outcome
    }

    fn execute_inner<S: BatchSource>(&self, source: &mut S) -> ExecutorResult<ExecutionResult> {
        for (name, types) in self.plan.required_columns() {
            if let Err(e) = source.schema().require(name, types) {
                return Err(self.reject_schema(e));
            }
        }
        let filter = PredicateFilter::bind(&self.plan, source.schema())
            .map_err(|e| self.reject_schema(e))?;

        let mut state = MergeState {
            accumulators: AccumulatorSet::new(filter.bucketizer().num_bins()),
            stats: ExecutionStats::default(),
            metrics: self.metrics,
        };

        if self.options.workers > 1 {
            self.run_parallel(source, &filter, &mut state)?;
        } else {
            self.run_sequential(source, &filter, &mut state)?;
        }

        Ok(ExecutionResult {
            rows: ResultRow::from_accumulators(&state.accumulators, filter.bucketizer()),
            stats: state.stats,
        })
    }

    fn run_sequential<S: BatchSource>(
        &self,
        source: &mut S,
        filter: &PredicateFilter,
        state: &mut MergeState<'_>,
    ) -> ExecutorResult<()> {
        let mut seq = 0u64;
        loop {
            let batch = match source.next_batch() {
                Ok(Some(batch)) => batch,
                Ok(None) => return Ok(()),
                Err(e) => return Err(scan_aborted(e, state.stats.batches_processed)),
            };
            state.absorb(seq, fold_batch(filter, &batch));
            seq += 1;
        }
    }

    fn run_parallel<S: BatchSource>(
        &self,
        source: &mut S,
        filter: &PredicateFilter,
        state: &mut MergeState<'_>,
    ) -> ExecutorResult<()> {
        let workers = self.options.workers;
        log_event_with_fields(Event::WorkersStarted, &[("workers", &workers.to_string())]);

        thread::scope(|s| {
            let (work_tx, work_rx) = mpsc::sync_channel::<(u64, Batch)>(workers);
            let work_rx = Arc::new(Mutex::new(work_rx));
            let (part_tx, part_rx) = mpsc::channel::<(u64, BatchPartial)>();

            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let work_rx = Arc::clone(&work_rx);
                    let part_tx = part_tx.clone();
                    s.spawn(move || loop {
                        let next = match work_rx.lock() {
                            Ok(rx) => rx.recv(),
                            Err(_) => return,
                        };
                        let (seq, batch) = match next {
                            Ok(job) => job,
                            Err(_) => return,
                        };
                        if part_tx.send((seq, fold_batch(filter, &batch))).is_err() {
                            return;
                        }
                    })
                })
                .collect();
            drop(part_tx);

            let mut pending = BTreeMap::new();
            let mut next_merge = 0u64;
            let mut dispatched = 0u64;
            let mut scan_error = None;

            loop {
                match source.next_batch() {
                    Ok(Some(batch)) => {
                        // Every worker is gone; stop pulling
                        if work_tx.send((dispatched, batch)).is_err() {
                            break;
                        }
                        dispatched += 1;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        scan_error = Some(e);
                        break;
                    }
                }
                while let Ok((seq, partial)) = part_rx.try_recv() {
                    pending.insert(seq, partial);
                }
                state.drain_in_order(&mut pending, &mut next_merge);
            }
            drop(work_tx);

            // Workers finish what was dispatched, then drop their senders
            for (seq, partial) in part_rx.iter() {
                pending.insert(seq, partial);
            }
            state.drain_in_order(&mut pending, &mut next_merge);

            let panicked = handles
                .into_iter()
                .map(|h| h.join())
                .filter(Result::is_err)
                .count();

            if let Some(e) = scan_error {
                return Err(scan_aborted(e, state.stats.batches_processed));
            }
            if panicked > 0 || next_merge != dispatched {
                return Err(ExecutorError::worker_failed(
                    format!(
                        "{} fold workers failed; {} of {} batches merged",
                        panicked, next_merge, dispatched
                    ),
                    state.stats.batches_processed,
                ));
            }
            Ok(())
        })
    }

    fn reject_schema(&self, e: StorageError) -> ExecutorError {
        log_event_with_fields(
            Event::SchemaRejected,
            &[
                ("code", e.code().code()),
                ("reason", e.message()),
            ],
        );
        ExecutorError::schema_invalid(e)
    }
}

fn scan_aborted(e: StorageError, batches_completed: u64) -> ExecutorError {
    if e.is_fatal() {
        log_event_with_fields(
            Event::DataCorruption,
            &[
                ("batches_completed", &batches_completed.to_string()),
                ("reason", e.message()),
            ],
        );
    }
    ExecutorError::scan_failed(e, batches_completed)
}
