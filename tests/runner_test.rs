//! Integration tests for the concurrent runner and the connection pool

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use searchbench::runner::{self, RunPlan};
use searchbench::{BenchError, Pool};

/// A connection that records whether two workers ever held it at once.
struct TrackedConn {
    in_use: AtomicBool,
    overlaps: AtomicUsize,
}

impl TrackedConn {
    fn new() -> Self {
        TrackedConn {
            in_use: AtomicBool::new(false),
            overlaps: AtomicUsize::new(0),
        }
    }

    fn hold(&self, pause: Duration) {
        if self.in_use.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        thread::sleep(pause);
        self.in_use.store(false, Ordering::SeqCst);
    }
}

#[test]
fn test_every_index_runs_exactly_once() {
    let pool = Pool::new(4, |i| Ok(i)).unwrap();
    let seen = Mutex::new(Vec::new());
    let plan = RunPlan::new(37, 4).unwrap();

    let result = runner::run(
        &pool,
        plan,
        1,
        |i| i,
        |_conn, &i| {
            seen.lock().unwrap().push(i);
            Ok(1)
        },
    );

    let mut seen = seen.into_inner().unwrap();
    seen.sort_unstable();
    assert_eq!(seen, (1..=37).collect::<Vec<_>>());
    assert_eq!(result.hits, 37);
    assert_eq!(result.failed, 0);
    assert_eq!(result.workers.iter().map(|w| w.executed).sum::<usize>(), 37);
}

#[test]
fn test_connections_are_never_shared() {
    let pool = Pool::new(2, |_| Ok(TrackedConn::new())).unwrap();
    let plan = RunPlan::new(24, 6).unwrap();

    let result = runner::run(
        &pool,
        plan,
        2,
        |i| i,
        |conn: &mut TrackedConn, _| {
            conn.hold(Duration::from_millis(1));
            Ok(0)
        },
    );

    assert_eq!(result.failed, 0);
    assert_eq!(pool.idle(), 2);
    for conn in pool.into_connections() {
        assert_eq!(conn.overlaps.load(Ordering::SeqCst), 0);
    }
}

#[test]
fn test_latency_and_wall_time() {
    let pool = Pool::new(3, |i| Ok(i)).unwrap();
    let plan = RunPlan::new(9, 3).unwrap();

    let result = runner::run(
        &pool,
        plan,
        3,
        |i| i,
        |_conn, _| {
            thread::sleep(Duration::from_millis(5));
            Ok(0)
        },
    );

    let summed: f64 = result.workers.iter().map(|w| w.latency.as_secs_f64()).sum();
    assert!((result.average_latency * 9.0 - summed).abs() < 1e-9);
    assert!(result.average_latency >= 0.005);

    let slowest = result
        .workers
        .iter()
        .map(|w| w.elapsed.as_secs_f64())
        .fold(0.0, f64::max);
    let total: f64 = result.workers.iter().map(|w| w.elapsed.as_secs_f64()).sum();
    assert!(result.wall_time >= slowest);
    assert!(result.wall_time <= total + 0.05);
    assert!((result.tps - 9.0 / result.wall_time).abs() < 1e-6);
}

#[test]
fn test_failures_are_counted_and_run_continues() {
    let pool = Pool::new(2, |i| Ok(i)).unwrap();
    let plan = RunPlan::new(10, 2).unwrap();

    let result = runner::run(
        &pool,
        plan,
        4,
        |i| i,
        |_conn, &i| {
            if i % 3 == 0 {
                Err(BenchError::Query(format!("timeout on {}", i)))
            } else {
                Ok(2)
            }
        },
    );

    assert_eq!(result.failed, 3);
    assert_eq!(result.succeeded(), 7);
    assert_eq!(result.hits, 14);
    assert_eq!(result.workers.iter().map(|w| w.executed).sum::<usize>(), 10);
}

#[test]
fn test_panicking_worker_returns_its_connection() {
    let pool = Pool::new(2, |i| Ok(i)).unwrap();
    let plan = RunPlan::new(10, 2).unwrap();

    let result = runner::run(
        &pool,
        plan,
        5,
        |i| i,
        |_conn, &i| {
            if i == 7 {
                panic!("driver crashed");
            }
            Ok(1)
        },
    );

    // worker 2 owns [6, 10] and dies on index 7
    assert_eq!(result.failed, 5);
    assert_eq!(pool.idle(), 2);
    assert_eq!(result.workers[0].executed, 5);
}

#[test]
fn test_small_pool_makes_workers_wait() {
    let pool = Pool::new(1, |i| Ok(i)).unwrap();
    let plan = RunPlan::new(12, 4).unwrap();

    let result = runner::run(
        &pool,
        plan,
        1,
        |i| i,
        |_conn, _| {
            thread::sleep(Duration::from_millis(1));
            Ok(1)
        },
    );

    assert_eq!(result.failed, 0);
    assert_eq!(result.hits, 12);
    assert_eq!(pool.idle(), 1);
}
