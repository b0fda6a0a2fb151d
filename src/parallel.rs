//! Bounded worker pool used for every fan-out in the crate
//!
//! Tasks go into one shared queue served by native worker threads. The thread
//! consuming a [`ParallelResults`] also pulls tasks from that queue while it
//! waits, so nested fan-out (a task that itself parallelizes) cannot starve
//! the pool, and a pool with zero workers still makes progress.

use crate::error::ParallelError;
use crate::logging::*;
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Options for a single [`Parallelizer::parallelize`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelOptions {
	/// Yield results in input order (otherwise as they complete)
	pub ordered: bool,

	/// Let the consuming thread run queued tasks while it waits
	pub main_thread_processing: bool,
}

impl Default for ParallelOptions {
	fn default() -> Self {
		ParallelOptions { ordered: true, main_thread_processing: true }
	}
}

impl ParallelOptions {
	pub fn unordered() -> Self {
		ParallelOptions { ordered: false, ..Default::default() }
	}
}

struct Worker {
	stop: Sender<()>,
	handle: JoinHandle<()>,
}

/// Worker pool with a resizable thread count
pub struct Parallelizer {
	jobs_tx: Sender<Job>,
	jobs_rx: Receiver<Job>,
	workers: Mutex<Vec<Worker>>,
}

impl Parallelizer {
	/// Pool with exactly `threads` workers
	pub fn new(threads: usize) -> Self {
		let (jobs_tx, jobs_rx) = unbounded();
		let parallelizer = Parallelizer { jobs_tx, jobs_rx, workers: Mutex::new(Vec::new()) };
		parallelizer.resize(threads);
		parallelizer
	}

	/// Pool sized for `concurrency` parallel operations, the caller included
	pub fn from_concurrency(concurrency: usize) -> Self {
		Parallelizer::new(concurrency.saturating_sub(1))
	}

	/// No workers: every task runs on the consuming thread, in queue order
	pub fn synchronous() -> Self {
		Parallelizer::new(0)
	}

	pub fn thread_count(&self) -> usize {
		self.workers.lock().len()
	}

	/// Change the number of workers.
	///
	/// Shrinking waits for the removed workers to finish their current task.
	pub fn resize(&self, threads: usize) {
		let removed = {
			let mut workers = self.workers.lock();
			while workers.len() < threads {
				match self.spawn_worker(workers.len()) {
					Some(worker) => workers.push(worker),
					None => break,
				}
			}
			if workers.len() > threads {
				workers.split_off(threads)
			} else {
				Vec::new()
			}
		};

		for worker in &removed {
			let _ = worker.stop.send(());
		}
		for worker in removed {
			if worker.handle.thread().id() == thread::current().id() {
				continue;
			}
			if worker.handle.join().is_err() {
				warn!("Parallel worker exited abnormally");
			}
		}
	}

	fn spawn_worker(&self, index: usize) -> Option<Worker> {
		let (stop_tx, stop_rx) = bounded(1);
		let jobs = self.jobs_rx.clone();
		let spawned = thread::Builder::new()
			.name(format!("cheffs-worker-{}", index))
			.spawn(move || worker_loop(jobs, stop_rx));
		match spawned {
			Ok(handle) => Some(Worker { stop: stop_tx, handle }),
			Err(e) => {
				error!("Failed to spawn parallel worker: {}", e);
				None
			}
		}
	}

	/// Run `f` over every item, returning a result stream.
	///
	/// All tasks are queued immediately; a panicking task yields
	/// `Err(ParallelError::TaskPanicked)` in its slot without stopping others.
	/// Dropping the returned results cancels the tasks that have not started.
	pub fn parallelize<I, T, F>(&self, items: I, options: ParallelOptions, f: F) -> ParallelResults<T>
	where
		I: IntoIterator,
		I::Item: Send + 'static,
		T: Send + 'static,
		F: Fn(I::Item) -> T + Send + Sync + 'static,
	{
		let f = Arc::new(f);
		let (tx, rx) = unbounded();
		let cancelled = Arc::new(AtomicBool::new(false));
		let mut total = 0;

		for (index, item) in items.into_iter().enumerate() {
			let f = Arc::clone(&f);
			let tx = tx.clone();
			let cancelled = Arc::clone(&cancelled);
			let job: Job = Box::new(move || {
				if cancelled.load(Ordering::Acquire) {
					return;
				}
				let result = panic::catch_unwind(AssertUnwindSafe(|| f(item))).map_err(|payload| {
					let message = panic_message(payload.as_ref());
					error!("Parallel task panicked: {}", message);
					ParallelError::TaskPanicked { message }
				});
				// Release captured state before the consumer can observe completion.
				drop(f);
				let _ = tx.send((index, result));
			});
			let _ = self.jobs_tx.send(job);
			total += 1;
		}

		ParallelResults {
			results: rx,
			jobs: self.jobs_rx.clone(),
			cancelled,
			ordered: options.ordered,
			steal: options.main_thread_processing || self.thread_count() == 0,
			total,
			received: 0,
			next: 0,
			pending: BTreeMap::new(),
		}
	}

	/// Run `f` over every item and wait; returns the panics, if any
	pub fn parallel_do<I, F>(&self, items: I, f: F) -> Vec<ParallelError>
	where
		I: IntoIterator,
		I::Item: Send + 'static,
		F: Fn(I::Item) + Send + Sync + 'static,
	{
		self.parallelize(items, ParallelOptions::unordered(), f).filter_map(Result::err).collect()
	}
}

impl Default for Parallelizer {
	fn default() -> Self {
		Parallelizer::from_concurrency(10)
	}
}

impl Drop for Parallelizer {
	fn drop(&mut self) {
		self.resize(0);
	}
}

fn worker_loop(jobs: Receiver<Job>, stop: Receiver<()>) {
	loop {
		let keep_running = select! {
			recv(stop) -> _ => false,
			recv(jobs) -> job => match job {
				Ok(job) => {
					job();
					true
				}
				Err(_) => false,
			},
		};
		if !keep_running {
			break;
		}
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		message.to_string()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"unknown panic".to_string()
	}
}

/// Results of one `parallelize` call
pub struct ParallelResults<T> {
	results: Receiver<(usize, Result<T, ParallelError>)>,
	jobs: Receiver<Job>,
	cancelled: Arc<AtomicBool>,
	ordered: bool,
	steal: bool,
	total: usize,
	received: usize,
	next: usize,
	pending: BTreeMap<usize, Result<T, ParallelError>>,
}

impl<T> ParallelResults<T> {
	/// Number of tasks queued by this call
	pub fn len(&self) -> usize {
		self.total
	}

	pub fn is_empty(&self) -> bool {
		self.total == 0
	}

	fn receive(&self) -> Option<(usize, Result<T, ParallelError>)> {
		if !self.steal {
			return self.results.recv().ok();
		}
		loop {
			if let Ok(message) = self.results.try_recv() {
				return Some(message);
			}
			let step = select! {
				recv(self.results) -> message => Err(message.ok()),
				recv(self.jobs) -> job => Ok(job.ok()),
			};
			match step {
				Err(message) => return message,
				Ok(Some(job)) => job(),
				// Pool is gone; only our own results can still arrive.
				Ok(None) => return self.results.recv().ok(),
			}
		}
	}
}

impl<T> Iterator for ParallelResults<T> {
	type Item = Result<T, ParallelError>;

	fn next(&mut self) -> Option<Self::Item> {
		loop {
			if self.ordered {
				if let Some(result) = self.pending.remove(&self.next) {
					self.next += 1;
					return Some(result);
				}
				if self.next >= self.total {
					return None;
				}
			} else if self.received >= self.total {
				return None;
			}

			let (index, result) = self.receive()?;
			self.received += 1;
			if !self.ordered {
				return Some(result);
			}
			if index == self.next {
				self.next += 1;
				return Some(result);
			}
			self.pending.insert(index, result);
		}
	}
}

impl<T> Drop for ParallelResults<T> {
	fn drop(&mut self) {
		if self.received < self.total {
			debug!("Cancelling {} unfinished parallel tasks", self.total - self.received);
			self.cancelled.store(true, Ordering::Release);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::AtomicUsize;

	#[test]
	fn test_empty_input() {
		let parallelizer = Parallelizer::new(2);
		let results: Vec<_> = parallelizer.parallelize(Vec::<u32>::new(), Default::default(), |x| x).collect();
		assert!(results.is_empty());
	}

	#[test]
	fn test_synchronous_pool_runs_on_caller() {
		let parallelizer = Parallelizer::synchronous();
		assert_eq!(parallelizer.thread_count(), 0);
		let results: Vec<u32> = parallelizer
			.parallelize(vec![1, 2, 3], Default::default(), |x| x * 2)
			.map(|r| r.unwrap())
			.collect();
		assert_eq!(results, vec![2, 4, 6]);
	}

	#[test]
	fn test_dropped_results_cancel_queued_tasks() {
		let parallelizer = Parallelizer::synchronous();
		let runs = Arc::new(AtomicUsize::new(0));

		let counter = Arc::clone(&runs);
		let mut results = parallelizer.parallelize(0..5, Default::default(), move |x| {
			counter.fetch_add(1, Ordering::SeqCst);
			x
		});
		assert_eq!(results.next().unwrap().unwrap(), 0);
		drop(results);
		assert_eq!(runs.load(Ordering::SeqCst), 1);

		// The next consumer drains the abandoned tasks from the queue without running them.
		let counter = Arc::clone(&runs);
		let later: Vec<usize> = parallelizer
			.parallelize(vec![10], Default::default(), move |x| {
				counter.fetch_add(1, Ordering::SeqCst);
				x
			})
			.map(|r| r.unwrap())
			.collect();
		assert_eq!(later, vec![10]);
		assert_eq!(runs.load(Ordering::SeqCst), 2);
	}

	#[test]
	fn test_resize() {
		let parallelizer = Parallelizer::new(1);
		parallelizer.resize(3);
		assert_eq!(parallelizer.thread_count(), 3);
		parallelizer.resize(0);
		assert_eq!(parallelizer.thread_count(), 0);
	}
}

// vim: ts=4
