use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, SendError, Sender};
use crossbeam::sync::WaitGroup;
use log::{debug, error, info, trace, warn};

use crate::registry::{Registry, Ticket};
use crate::thread_pool::{NaiveThreadPool, ThreadPool};
use crate::worker::{Function, Worker};
use crate::{PoolConfig, PoolError, Result};

/// Lifecycle of a [`Pool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Built but not yet run.
    Created,
    /// Workers are running and the input stream is open.
    Running,
    /// The input stream is closed; workers are finishing what is left.
    Draining,
    /// The output stream is closed. The pool cannot be run again.
    Closed,
}

/// A fixed-size pool that streams inputs through a transformation.
///
/// Inputs go in through [`send`](Pool::send) (or the sender from
/// [`input`](Pool::input)), results come out of [`output`](Pool::output).
/// Both streams are unbuffered, so a producer waits for a free worker and a
/// worker waits for a consumer.
///
/// A transformation that panics or returns `None` produces nothing on the
/// output stream. Panics are logged; there is no other way to observe them,
/// so to a consumer a failed job looks the same as one that is still pending.
///
/// `Pool` is a cheap handle: clones share the same streams and workers, which
/// lets `run` block on one thread while others feed and drain it.
pub struct Pool<I, O> {
    shared: Arc<Shared<I, O>>,
}

impl<I, O> Clone for Pool<I, O> {
    fn clone(&self) -> Self {
        Pool {
            shared: self.shared.clone(),
        }
    }
}

struct Shared<I, O> {
    threads: usize,
    interval: Mutex<Duration>,
    function: RwLock<Option<Function<I, O>>>,
    input_tx: Mutex<Option<Sender<I>>>,
    input_rx: Receiver<I>,
    output_tx: Mutex<Option<Sender<O>>>,
    output_rx: Receiver<O>,
    jobs: Registry<I>,
    /// Cooperative stop request, checked once per received input.
    done: AtomicBool,
    started: AtomicBool,
}

impl<I, O> Pool<I, O>
where
    I: Clone + Debug + Send + 'static,
    O: Send + 'static,
{
    /// Creates a pool that will run `threads` workers.
    ///
    /// # Errors
    ///
    /// Returns `InvalidThreads` if `threads` is zero.
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(PoolError::InvalidThreads(threads));
        }
        let (input_tx, input_rx) = channel::bounded(0);
        let (output_tx, output_rx) = channel::bounded(0);
        Ok(Pool {
            shared: Arc::new(Shared {
                threads,
                interval: Mutex::new(Duration::ZERO),
                function: RwLock::new(None),
                input_tx: Mutex::new(Some(input_tx)),
                input_rx,
                output_tx: Mutex::new(Some(output_tx)),
                output_rx,
                jobs: Registry::new(),
                done: AtomicBool::new(false),
                started: AtomicBool::new(false),
            }),
        })
    }

    /// Creates a pool from a [`PoolConfig`].
    pub fn from_config(config: &PoolConfig) -> Result<Self> {
        let pool = Self::new(config.threads)?;
        pool.set_interval(config.interval());
        Ok(pool)
    }

    /// Sets the transformation every worker runs. Must happen before `run`.
    pub fn set_function<F>(&self, f: F)
    where
        F: Fn(I) -> Option<O> + Send + Sync + 'static,
    {
        *self.shared.function.write().unwrap() = Some(Arc::new(f));
    }

    /// Sets the delay between starting two workers.
    pub fn set_interval(&self, interval: Duration) {
        *self.shared.interval.lock().unwrap() = interval;
    }

    /// The delay between starting two workers.
    pub fn interval(&self) -> Duration {
        *self.shared.interval.lock().unwrap()
    }

    /// The number of workers `run` starts.
    pub fn threads(&self) -> usize {
        self.shared.threads
    }

    /// A handle on the jobs currently being processed.
    pub fn jobs(&self) -> Registry<I> {
        self.shared.jobs.clone()
    }

    /// Returns a sender for the input stream, or `None` once it is closed.
    ///
    /// The stream only closes when every sender is gone, so a sender obtained
    /// here keeps it open past `in_done` until it is dropped.
    pub fn input(&self) -> Option<Sender<I>> {
        self.shared.input_tx.lock().unwrap().clone()
    }

    /// Sends one input, blocking until a worker takes it.
    ///
    /// # Errors
    ///
    /// If `in_done` has been called the input is handed back inside the
    /// `SendError`. It converts into `PoolError::InputClosed` with `?`.
    pub fn send(&self, input: I) -> std::result::Result<(), SendError<I>> {
        match self.input() {
            Some(tx) => tx.send(input),
            None => Err(SendError(input)),
        }
    }

    /// Returns a receiver for the output stream.
    ///
    /// Iterating it ends once `run` has finished and the stream is closed.
    /// Workers block until each result is received, so a pool whose
    /// consumers have all gone away stalls rather than dropping results.
    pub fn output(&self) -> Receiver<O> {
        self.shared.output_rx.clone()
    }

    /// Runs the pool on dedicated threads, blocking until every worker exits.
    ///
    /// See [`run_on`](Pool::run_on).
    pub fn run(&self) -> Result<()> {
        self.run_on(&NaiveThreadPool::default())
    }

    /// Starts the workers on `executor` and blocks until all of them exit,
    /// then closes the output stream.
    ///
    /// Workers exit when the input stream is closed and drained, or when they
    /// receive an input after `stop` was called. Job faults never make this
    /// fail.
    ///
    /// # Errors
    ///
    /// Returns `MissingFunction` if no transformation was set, `AlreadyRun` on
    /// a second call, or the executor's error if a worker could not be
    /// spawned. In the last case the workers already started are still waited
    /// for and the output stream is still closed.
    pub fn run_on<P: ThreadPool>(&self, executor: &P) -> Result<()> {
        let function = self
            .shared
            .function
            .read()
            .unwrap()
            .clone()
            .ok_or(PoolError::MissingFunction)?;
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Err(PoolError::AlreadyRun);
        }

        let worker = Worker::new(function);
        let output = self.shared.output_tx.lock().unwrap().clone();
        if output.is_none() {
            warn!("Output stream closed before run, results will be dropped");
        }
        let interval = self.interval();
        let wg = WaitGroup::new();
        let mut spawn_err = None;

        info!("Starting {} workers", self.shared.threads);
        for id in 0..self.shared.threads {
            if !interval.is_zero() {
                thread::sleep(interval);
            }
            let ctx = WorkLoop {
                id,
                shared: self.shared.clone(),
                worker: worker.clone(),
                output: output.clone(),
                _wg: wg.clone(),
            };
            if let Err(e) = executor.spawn(move || ctx.run()) {
                error!("Failed to start worker {}: {}", id, e);
                spawn_err = Some(e);
                break;
            }
        }
        drop(output);

        wg.wait();
        self.out_done();
        info!("All workers finished");

        match spawn_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Closes the input stream: no more inputs will be sent.
    ///
    /// Workers still drain inputs that were already handed over.
    pub fn in_done(&self) {
        if self.shared.input_tx.lock().unwrap().take().is_some() {
            debug!("Input stream closed");
        }
    }

    /// Closes the output stream. `run` does this itself once all workers
    /// have exited.
    ///
    /// Workers hold their own senders, so calling this early only takes
    /// effect once they are done.
    pub fn out_done(&self) {
        if self.shared.output_tx.lock().unwrap().take().is_some() {
            debug!("Output stream closed");
        }
    }

    /// Asks workers to stop.
    ///
    /// Each worker checks the request after it receives its next input and
    /// exits without processing that input. Jobs already running finish
    /// normally. A worker blocked waiting for input only notices once an
    /// input arrives or the input stream is closed, so pair this with
    /// `in_done` if the pool must terminate.
    pub fn stop(&self) {
        debug!("Stop requested");
        self.shared.done.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once `stop` has been called.
    pub fn is_stopped(&self) -> bool {
        self.shared.done.load(Ordering::SeqCst)
    }

    /// Draws a fresh job ticket.
    pub fn new_tick(&self) -> Ticket {
        self.shared.new_tick()
    }

    /// Where the pool is in its lifecycle.
    pub fn state(&self) -> State {
        if self.shared.output_tx.lock().unwrap().is_none() {
            State::Closed
        } else if !self.shared.started.load(Ordering::SeqCst) {
            State::Created
        } else if self.shared.input_tx.lock().unwrap().is_none() {
            State::Draining
        } else {
            State::Running
        }
    }
}

impl<I, O> Shared<I, O> {
    fn new_tick(&self) -> Ticket {
        Ticket::random()
    }
}

/// One execution context. Dropping it releases its slot in the wait group.
struct WorkLoop<I, O> {
    id: usize,
    shared: Arc<Shared<I, O>>,
    worker: Worker<I, O>,
    output: Option<Sender<O>>,
    _wg: WaitGroup,
}

impl<I, O> WorkLoop<I, O>
where
    I: Clone + Debug,
{
    fn run(self) {
        let id = self.id;
        debug!("Worker {} started", id);

        for input in self.shared.input_rx.iter() {
            if self.shared.done.load(Ordering::SeqCst) {
                debug!("Worker {} stopping, discarding {:?}", id, input);
                return;
            }

            let step = panic::catch_unwind(AssertUnwindSafe(|| self.process(input)));
            let out = match step {
                Ok(out) => out,
                Err(_) => {
                    error!(
                        "Worker {}: job panicked outside the transformation, dropping it",
                        id
                    );
                    continue;
                }
            };

            if let (Some(out), Some(tx)) = (out, &self.output) {
                // Cannot fail: the pool itself keeps a receiver.
                let _ = tx.send(out);
            }
        }

        debug!("Worker {}: input stream closed, exiting", id);
    }

    /// Runs one input with its registry entry held for the duration.
    fn process(&self, input: I) -> Option<O> {
        let job = self
            .shared
            .jobs
            .track(input.clone(), || self.shared.new_tick());
        trace!("Worker {} took job {}", self.id, job.ticket());
        // Faults were already logged by the worker.
        let out = self.worker.run(input).ok().flatten();
        drop(job);
        out
    }
}
