//! Concurrent query runner.
//!
//! A run issues `transactions` queries of one type with exactly `concurrency`
//! workers. Worker `w` owns the contiguous 1-based index range
//! `[(w-1)*per_worker + 1, min(w*per_worker, transactions)]` where
//! `per_worker = ceil(transactions / concurrency)`; trailing workers may get a
//! short or empty range. Each worker runs its indices sequentially, checking a
//! connection out of the shared [`Pool`] per query, and returns its own
//! [`WorkerReport`]. The coordinator sums the reports after all workers have
//! joined.

use std::ops::RangeInclusive;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::error::{BenchError, Result};
use crate::pool::Pool;

/// Transaction count and worker count of one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunPlan {
    pub transactions: usize,
    pub concurrency: usize,
}

impl RunPlan {
    pub fn new(transactions: usize, concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            return Err(BenchError::InvalidConfig("concurrency must be at least 1".into()));
        }
        Ok(RunPlan { transactions, concurrency })
    }

    /// Plan for the discarded warmup phase: a tenth of the transactions, at least one.
    pub fn warmup(&self) -> Self {
        RunPlan {
            transactions: (self.transactions / 10).max(1),
            concurrency: self.concurrency,
        }
    }

    pub fn per_worker(&self) -> usize {
        self.transactions.div_ceil(self.concurrency)
    }

    /// Index ranges of all `concurrency` workers, in worker order.
    pub fn assignments(&self) -> Vec<WorkerAssignment> {
        let per_worker = self.per_worker();
        (1..=self.concurrency)
            .map(|worker| WorkerAssignment {
                worker,
                start: (worker - 1) * per_worker + 1,
                end: (worker * per_worker).min(self.transactions),
            })
            .collect()
    }
}

/// Inclusive index range owned by one worker; empty when `start > end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerAssignment {
    pub worker: usize,
    pub start: usize,
    pub end: usize,
}

impl WorkerAssignment {
    pub fn indices(&self) -> RangeInclusive<usize> {
        self.start..=self.end
    }

    pub fn len(&self) -> usize {
        if self.start > self.end {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a single worker measured.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkerReport {
    pub worker: usize,
    pub executed: usize,
    pub failed: usize,
    pub hits: u64,
    /// Sum of per-query execution times.
    pub latency: Duration,
    /// Time from the worker's first checkout to its last release.
    pub elapsed: Duration,
}

/// Aggregate metrics of one query type in one phase. Times are in seconds.
#[derive(Clone, Debug, PartialEq)]
pub struct RunResult {
    pub query_id: u8,
    pub transactions: usize,
    pub concurrency: usize,
    pub total_latency: f64,
    pub average_latency: f64,
    pub wall_time: f64,
    pub tps: f64,
    pub failed: usize,
    pub hits: u64,
    pub workers: Vec<WorkerReport>,
}

impl RunResult {
    /// Sum worker reports; zero transactions give zero averages.
    pub fn from_workers(query_id: u8, plan: RunPlan, workers: Vec<WorkerReport>, wall: Duration) -> Self {
        let total_latency: Duration = workers.iter().map(|w| w.latency).sum();
        let total_latency = total_latency.as_secs_f64();
        let wall_time = wall.as_secs_f64();

        let average_latency = if plan.transactions > 0 {
            total_latency / plan.transactions as f64
        } else {
            0.0
        };
        let tps = if plan.transactions > 0 && wall_time > 0.0 {
            plan.transactions as f64 / wall_time
        } else {
            0.0
        };

        RunResult {
            query_id,
            transactions: plan.transactions,
            concurrency: plan.concurrency,
            total_latency,
            average_latency,
            wall_time,
            tps,
            failed: workers.iter().map(|w| w.failed).sum(),
            hits: workers.iter().map(|w| w.hits).sum(),
            workers,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.transactions - self.failed.min(self.transactions)
    }
}

/// Run `plan` against `pool`.
///
/// `render(i)` builds the query for 1-based index `i`; `execute` runs it on a
/// checked-out connection and returns the number of hits. Only `execute` is
/// timed. A failed query is counted in [`WorkerReport::failed`] and the worker
/// moves on to its next index.
pub fn run<C, Q, R, E>(pool: &Pool<C>, plan: RunPlan, query_id: u8, render: R, execute: E) -> RunResult
where
    C: Send,
    R: Fn(usize) -> Q + Sync,
    E: Fn(&mut C, &Q) -> Result<usize> + Sync,
{
    let assignments = plan.assignments();
    let started = Instant::now();

    let workers = thread::scope(|scope| {
        let handles: Vec<_> = assignments
            .iter()
            .map(|assignment| {
                let render = &render;
                let execute = &execute;
                let assignment = *assignment;
                (
                    assignment,
                    scope.spawn(move || run_worker(pool, assignment, query_id, render, execute)),
                )
            })
            .collect();

        handles
            .into_iter()
            .map(|(assignment, handle)| match handle.join() {
                Ok(report) => report,
                Err(_) => {
                    error!(
                        query = query_id,
                        worker = assignment.worker,
                        "worker panicked; counting its {} queries as failed",
                        assignment.len()
                    );
                    WorkerReport {
                        worker: assignment.worker,
                        failed: assignment.len(),
                        ..WorkerReport::default()
                    }
                }
            })
            .collect::<Vec<_>>()
    });

    RunResult::from_workers(query_id, plan, workers, started.elapsed())
}

fn run_worker<C, Q, R, E>(
    pool: &Pool<C>,
    assignment: WorkerAssignment,
    query_id: u8,
    render: &R,
    execute: &E,
) -> WorkerReport
where
    R: Fn(usize) -> Q,
    E: Fn(&mut C, &Q) -> Result<usize>,
{
    let started = Instant::now();
    let mut report = WorkerReport {
        worker: assignment.worker,
        ..WorkerReport::default()
    };

    if assignment.is_empty() {
        return report;
    }

    for i in assignment.indices() {
        let query = render(i);
        let mut conn = pool.checkout();

        let query_start = Instant::now();
        let outcome = execute(&mut *conn, &query);
        report.latency += query_start.elapsed();
        drop(conn);

        report.executed += 1;
        match outcome {
            Ok(hits) => report.hits += hits as u64,
            Err(e) => {
                report.failed += 1;
                warn!(query = query_id, index = i, "query failed: {}", e);
            }
        }
    }

    report.elapsed = started.elapsed();
    debug!(
        query = query_id,
        worker = assignment.worker,
        executed = report.executed,
        "worker finished in {:?}",
        report.elapsed
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(transactions: usize, concurrency: usize) -> Vec<(usize, usize)> {
        RunPlan::new(transactions, concurrency)
            .unwrap()
            .assignments()
            .iter()
            .filter(|a| !a.is_empty())
            .map(|a| (a.start, a.end))
            .collect()
    }

    #[test]
    fn test_ten_over_three() {
        let plan = RunPlan::new(10, 3).unwrap();
        assert_eq!(plan.per_worker(), 4);
        assert_eq!(ranges(10, 3), vec![(1, 4), (5, 8), (9, 10)]);
    }

    #[test]
    fn test_partition_is_exact() {
        for transactions in 1..=40 {
            for concurrency in 1..=12 {
                let plan = RunPlan::new(transactions, concurrency).unwrap();
                let assignments = plan.assignments();
                assert_eq!(assignments.len(), concurrency);

                let mut seen: Vec<usize> = assignments.iter().flat_map(|a| a.indices()).collect();
                let total: usize = assignments.iter().map(|a| a.len()).sum();
                seen.sort_unstable();

                assert_eq!(total, transactions);
                assert_eq!(seen, (1..=transactions).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_excess_workers_are_idle() {
        let plan = RunPlan::new(2, 5).unwrap();
        let lens: Vec<usize> = plan.assignments().iter().map(|a| a.len()).collect();
        assert_eq!(lens, vec![1, 1, 0, 0, 0]);
    }

    #[test]
    fn test_zero_transactions() {
        let plan = RunPlan::new(0, 4).unwrap();
        assert!(plan.assignments().iter().all(|a| a.is_empty()));

        let result = RunResult::from_workers(1, plan, vec![], Duration::from_millis(3));
        assert_eq!(result.average_latency, 0.0);
        assert_eq!(result.tps, 0.0);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(RunPlan::new(10, 0).is_err());
    }

    #[test]
    fn test_warmup_plan() {
        assert_eq!(RunPlan::new(100, 4).unwrap().warmup().transactions, 10);
        assert_eq!(RunPlan::new(5, 4).unwrap().warmup().transactions, 1);
    }

    #[test]
    fn test_aggregate_math() {
        let plan = RunPlan::new(4, 2).unwrap();
        let workers = vec![
            WorkerReport {
                worker: 1,
                executed: 2,
                latency: Duration::from_millis(300),
                hits: 20,
                ..WorkerReport::default()
            },
            WorkerReport {
                worker: 2,
                executed: 2,
                failed: 1,
                latency: Duration::from_millis(100),
                hits: 10,
                ..WorkerReport::default()
            },
        ];

        let result = RunResult::from_workers(3, plan, workers, Duration::from_millis(200));
        assert!((result.average_latency - 0.1).abs() < 1e-9);
        assert!((result.tps - 20.0).abs() < 1e-9);
        assert_eq!(result.failed, 1);
        assert_eq!(result.succeeded(), 3);
        assert_eq!(result.hits, 30);
    }
}
