//! Fixed-size pool of database connections or HTTP sessions.
//!
//! All connections are opened when the pool is built and closed when it is
//! dropped; nothing is opened or closed while a benchmark is running.
//!
//! # Concurrency Model
//!
//! - The idle connections live in a `Mutex<Vec<C>>` free list
//! - `checkout` blocks on a `Condvar` while every connection is in use
//! - A [`PooledConnection`] guard hands the connection back on drop, so it is
//!   returned on every exit path, panics included
//!
//! # Example
//!
//! ```rust
//! use searchbench::pool::Pool;
//!
//! let pool = Pool::new(2, |i| Ok(format!("session-{}", i))).unwrap();
//! {
//!     let conn = pool.checkout();
//!     assert!(conn.starts_with("session-"));
//!     assert_eq!(pool.idle(), 1);
//! }
//! assert_eq!(pool.idle(), 2);
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::{BenchError, Result};

pub struct Pool<C> {
    idle: Mutex<Vec<C>>,
    returned: Condvar,
    capacity: usize,
}

impl<C> Pool<C> {
    /// Open `size` connections up front with `connect(i)` for `i` in `0..size`.
    pub fn new<F>(size: usize, mut connect: F) -> Result<Self>
    where
        F: FnMut(usize) -> Result<C>,
    {
        if size == 0 {
            return Err(BenchError::InvalidConfig("pool size must be at least 1".into()));
        }
        let mut connections = Vec::with_capacity(size);
        for i in 0..size {
            connections.push(connect(i)?);
        }
        Self::from_connections(connections)
    }

    /// Wrap connections that were already opened.
    pub fn from_connections(connections: Vec<C>) -> Result<Self> {
        if connections.is_empty() {
            return Err(BenchError::InvalidConfig("pool size must be at least 1".into()));
        }
        Ok(Pool {
            capacity: connections.len(),
            idle: Mutex::new(connections),
            returned: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<C>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a connection, waiting until one is returned if all are in use.
    pub fn checkout(&self) -> PooledConnection<'_, C> {
        let mut idle = self.lock();
        loop {
            if let Some(conn) = idle.pop() {
                return PooledConnection {
                    pool: self,
                    conn: Some(conn),
                };
            }
            idle = self.returned.wait(idle).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Take a connection only if one is idle right now.
    pub fn try_checkout(&self) -> Option<PooledConnection<'_, C>> {
        self.lock().pop().map(|conn| PooledConnection {
            pool: self,
            conn: Some(conn),
        })
    }

    fn release(&self, conn: C) {
        self.lock().push(conn);
        self.returned.notify_one();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Connections currently checked in.
    pub fn idle(&self) -> usize {
        self.lock().len()
    }

    /// Tear the pool down and hand back its connections.
    pub fn into_connections(self) -> Vec<C> {
        self.idle.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A connection checked out of a [`Pool`]; returned when dropped.
pub struct PooledConnection<'a, C> {
    pool: &'a Pool<C>,
    conn: Option<C>,
}

impl<C> Deref for PooledConnection<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl<C> DerefMut for PooledConnection<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl<C> Drop for PooledConnection<'_, C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_connections_opened_up_front() {
        let opened = AtomicUsize::new(0);
        let pool = Pool::new(4, |i| {
            opened.fetch_add(1, Ordering::SeqCst);
            Ok(i)
        })
        .unwrap();

        assert_eq!(opened.load(Ordering::SeqCst), 4);
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.idle(), 4);
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(Pool::new(0, |i| Ok(i)).is_err());
        assert!(Pool::<u32>::from_connections(vec![]).is_err());
    }

    #[test]
    fn test_connect_failure_propagates() {
        let result = Pool::new(3, |i| {
            if i == 2 {
                Err(BenchError::Setup("refused".into()))
            } else {
                Ok(i)
            }
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_checkout_returns_on_drop() {
        let pool = Pool::new(2, |i| Ok(i)).unwrap();

        let a = pool.checkout();
        let b = pool.checkout();
        assert_eq!(pool.idle(), 0);
        assert!(pool.try_checkout().is_none());
        assert_ne!(*a, *b);

        drop(a);
        assert_eq!(pool.idle(), 1);
        drop(b);
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn test_checkout_blocks_until_returned() {
        let pool = Arc::new(Pool::new(1, |_| Ok(0u32)).unwrap());
        let held = pool.checkout();

        let pool_clone = Arc::clone(&pool);
        let waiter = thread::spawn(move || {
            let mut conn = pool_clone.checkout();
            *conn += 1;
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());
        drop(held);

        waiter.join().unwrap();
        assert_eq!(*pool.checkout(), 1);
    }

    #[test]
    fn test_returned_after_panic() {
        let pool = Arc::new(Pool::new(1, |_| Ok(())).unwrap());

        let pool_clone = Arc::clone(&pool);
        let handle = thread::spawn(move || {
            let _conn = pool_clone.checkout();
            panic!("query blew up");
        });
        assert!(handle.join().is_err());

        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_never_shared_concurrently() {
        let in_use: Arc<Vec<AtomicUsize>> = Arc::new((0..3).map(|_| AtomicUsize::new(0)).collect());
        let pool = Arc::new(Pool::new(3, |i| Ok(i)).unwrap());
        let mut handles = vec![];

        for _ in 0..8 {
            let pool_clone = Arc::clone(&pool);
            let in_use = Arc::clone(&in_use);
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    let conn = pool_clone.checkout();
                    let users = in_use[*conn].fetch_add(1, Ordering::SeqCst);
                    assert_eq!(users, 0, "connection {} shared", *conn);
                    thread::yield_now();
                    in_use[*conn].fetch_sub(1, Ordering::SeqCst);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(pool.idle(), 3);
    }
}
