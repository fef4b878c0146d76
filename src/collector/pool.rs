use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

use log::{debug, warn};

use crate::error::ConfigurationError;

/// Fixed-size pool of scoped worker threads.
///
/// A pool owns no threads between calls. `try_for_each` starts at most
/// `size` workers, feeds them the inputs from a shared queue and joins
/// every worker before it returns: on success, on the first task
/// error, and on a worker panic (re-raised after the join). No thread
/// outlives the call that started it.
///
/// Nesting a pool inside another pool's task gives the two-tier
/// bound used by the thread-pool strategy.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    name: &'static str,
    size: usize,
}

impl WorkerPool {
    pub fn new(name: &'static str, size: usize) -> Result<Self, ConfigurationError> {
        ConfigurationError::require_positive(name, size)?;
        Ok(Self { name, size })
    }

    /// Runs `task` once per input on at most `size` workers.
    ///
    /// FAILURE:
    /// - The first error stops every worker from taking new inputs
    /// - Tasks already running are drained before returning
    /// - That first error is returned; later errors are dropped
    pub fn try_for_each<T, E, F>(&self, inputs: Vec<T>, task: F) -> Result<(), E>
    where
        T: Send,
        E: Send,
        F: Fn(T) -> Result<(), E> + Sync,
    {
        if inputs.is_empty() {
            return Ok(());
        }

        let workers = self.size.min(inputs.len());
        let queue = Mutex::new(inputs.into_iter());
        let failed = AtomicBool::new(false);
        let first_error: Mutex<Option<E>> = Mutex::new(None);

        let worker = || drain_queue(&queue, &failed, &first_error, &task);

        debug!("[pool:{}] starting {} workers", self.name, workers);

        thread::scope(|scope| {
            let mut started = 0;
            for i in 0..workers {
                let spawned = thread::Builder::new()
                    .name(format!("{}-{}", self.name, i))
                    .spawn_scoped(scope, &worker);

                match spawned {
                    Ok(_) => started += 1,
                    Err(e) => {
                        warn!("[pool:{}] could not start worker {}: {}", self.name, i, e);
                        break;
                    }
                }
            }

            // Fall back to the calling thread so the queue still drains.
            if started == 0 {
                worker();
            }
        });

        debug!("[pool:{}] shut down", self.name);

        match first_error.into_inner().unwrap_or_else(PoisonError::into_inner) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn drain_queue<T, E, F>(
    queue: &Mutex<std::vec::IntoIter<T>>,
    failed: &AtomicBool,
    first_error: &Mutex<Option<E>>,
    task: &F,
) where
    F: Fn(T) -> Result<(), E>,
{
    while !failed.load(Ordering::Acquire) {
        let next = queue.lock().unwrap_or_else(PoisonError::into_inner).next();
        let Some(item) = next else {
            break;
        };

        if let Err(err) = task(item) {
            failed.store(true, Ordering::Release);
            let mut slot = first_error.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(err);
            }
            break;
        }
    }
}
