/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

//! A fixed-size pool of worker threads consuming a shared task queue.
//!
//! Completion is tracked with an outstanding-task counter rather than queue emptiness:
//! [`WorkerPool::await_idle`] returns only once every submitted task has *finished*, not
//! merely been dequeued.
//!
//! Tasks return `anyhow::Result<()>`. Errors and panics are caught at the task boundary
//! and recorded as [`TaskError`]s together with the context string given at submission.
//! A failing task never takes its worker thread down.

use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::JoinHandle,
};

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

type Task = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

struct Job {
    context: String,
    task: Task,
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("a worker pool needs at least one thread")]
    NoThreads,
    #[error("failed to spawn worker thread {index}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("the worker pool has been shut down and no longer accepts tasks")]
    Closed,
}

/// A failure captured from a task, tagged with the context it was submitted with.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{context}: {message}")]
pub struct TaskError {
    pub context: String,
    pub message: String,
}

/// Lock `mutex`, recovering the data if a previous holder panicked.
///
/// Tasks run under `catch_unwind`, so a poisoned lock only means a task panicked while
/// holding it. The protected collections are append-only and remain valid.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared {
    outstanding: Mutex<usize>,
    idle: Condvar,
    errors: Mutex<Vec<TaskError>>,
}

impl Shared {
    fn finish(&self) {
        let mut outstanding = lock(&self.outstanding);
        *outstanding -= 1;
        if *outstanding == 0 {
            self.idle.notify_all();
        }
    }

    fn record(&self, context: String, message: String) {
        tracing::error!(%context, %message, "task failed");
        lock(&self.errors).push(TaskError { context, message });
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("task panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("task panicked: {}", s)
    } else {
        "task panicked".to_string()
    }
}

fn worker(receiver: Receiver<Job>, shared: Arc<Shared>) {
    for Job { context, task } in receiver.iter() {
        match std::panic::catch_unwind(AssertUnwindSafe(task)) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => shared.record(context, format!("{:#}", err)),
            Err(payload) => shared.record(context, panic_message(payload)),
        }
        shared.finish();
    }
}

/// A fixed set of worker threads consuming a shared FIFO queue.
///
/// Submission after [`WorkerPool::shutdown`] is always rejected with [`PoolError::Closed`].
/// Dropping the pool shuts it down, draining any queued work first.
pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shared: Arc<Shared>,
    num_threads: usize,
}

impl WorkerPool {
    /// Spawn `num_threads` workers named `ccbench-worker-{i}`.
    pub fn new(num_threads: usize) -> Result<Self, PoolError> {
        if num_threads == 0 {
            return Err(PoolError::NoThreads);
        }

        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let shared = Arc::new(Shared {
            outstanding: Mutex::new(0),
            idle: Condvar::new(),
            errors: Mutex::new(Vec::new()),
        });

        let mut workers = Vec::with_capacity(num_threads);
        for index in 0..num_threads {
            let receiver = receiver.clone();
            let shared = shared.clone();
            let handle = std::thread::Builder::new()
                .name(format!("ccbench-worker-{}", index))
                .spawn(move || worker(receiver, shared))
                .map_err(|source| PoolError::Spawn { index, source })?;
            workers.push(handle);
        }

        tracing::debug!(num_threads, "worker pool started");
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            shared,
            num_threads,
        })
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Enqueue `task` and return immediately.
    ///
    /// `context` identifies the task in any [`TaskError`] it produces.
    pub fn submit<C, F>(&self, context: C, task: F) -> Result<(), PoolError>
    where
        C: Into<String>,
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let guard = lock(&self.sender);
        let sender = guard.as_ref().ok_or(PoolError::Closed)?;

        // Count the task before it becomes visible to a worker so that `await_idle` can
        // never observe a zero count while it is queued.
        *lock(&self.shared.outstanding) += 1;
        let job = Job {
            context: context.into(),
            task: Box::new(task),
        };
        if sender.send(job).is_err() {
            self.shared.finish();
            return Err(PoolError::Closed);
        }
        Ok(())
    }

    /// Block until every task submitted so far has finished executing.
    pub fn await_idle(&self) {
        let mut outstanding = lock(&self.shared.outstanding);
        while *outstanding > 0 {
            outstanding = self
                .shared
                .idle
                .wait(outstanding)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Stop accepting work, drain the queue and join every worker.
    ///
    /// Every caller returns only after the workers have been joined. Calling this more
    /// than once is a no-op.
    pub fn shutdown(&self) {
        // Concurrent callers wait here until the first one has joined the workers.
        let mut workers = lock(&self.workers);

        // Dropping the last sender disconnects the channel once the queue is drained.
        drop(lock(&self.sender).take());
        if workers.is_empty() {
            return;
        }

        for handle in std::mem::take(&mut *workers) {
            let name = handle.thread().name().unwrap_or("<unnamed>").to_string();
            if handle.join().is_err() {
                tracing::error!(worker = %name, "worker thread panicked outside of a task");
            }
        }
        tracing::debug!("worker pool shut down");
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.sender).is_none()
    }

    /// Return a copy of every error captured so far.
    pub fn errors(&self) -> Vec<TaskError> {
        lock(&self.shared.errors).clone()
    }

    /// Remove and return every error captured so far.
    pub fn take_errors(&self) -> Vec<TaskError> {
        std::mem::take(&mut *lock(&self.shared.errors))
    }

    /// The most recently captured error, if any.
    pub fn last_error(&self) -> Option<TaskError> {
        lock(&self.shared.errors).last().cloned()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("num_threads", &self.num_threads)
            .field("closed", &self.is_closed())
            .finish()
    }
}

///////////
// Tests //
///////////
