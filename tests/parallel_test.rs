//! Worker pool behavior seen from the outside

use cheffs::error::ParallelError;
use cheffs::parallel::ParallelOptions;
use cheffs::Parallelizer;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_ordered_results_follow_input() {
	let parallelizer = Parallelizer::new(4);
	// Later items finish first
	let results: Vec<u64> = parallelizer
		.parallelize(0..8u64, ParallelOptions::default(), |i| {
			thread::sleep(Duration::from_millis((8 - i) * 3));
			i * 10
		})
		.map(|r| r.unwrap())
		.collect();
	assert_eq!(results, vec![0, 10, 20, 30, 40, 50, 60, 70]);
}

#[test]
fn test_unordered_yields_everything() {
	let parallelizer = Parallelizer::new(3);
	let results: HashSet<u32> = parallelizer
		.parallelize(0..20u32, ParallelOptions::unordered(), |i| i)
		.map(|r| r.unwrap())
		.collect();
	assert_eq!(results.len(), 20);
}

#[test]
fn test_panic_is_reported_in_its_slot() {
	let parallelizer = Parallelizer::new(2);
	let results: Vec<_> = parallelizer
		.parallelize(vec![1, 2, 3], ParallelOptions::default(), |i| {
			if i == 2 {
				panic!("bad item {}", i);
			}
			i
		})
		.collect();
	assert_eq!(results.len(), 3);
	assert_eq!(results[0].as_ref().ok(), Some(&1));
	match &results[1] {
		Err(ParallelError::TaskPanicked { message }) => assert!(message.contains("bad item 2")),
		other => panic!("expected a panic result, got {:?}", other.as_ref().ok()),
	}
	assert_eq!(results[2].as_ref().ok(), Some(&3));
}

#[test]
fn test_nested_fan_out_on_small_pool() {
	let parallelizer = Arc::new(Parallelizer::new(1));
	let inner = Arc::clone(&parallelizer);
	let totals: Vec<u32> = parallelizer
		.parallelize(0..4u32, ParallelOptions::default(), move |i| {
			inner
				.parallelize(0..5u32, ParallelOptions::default(), move |j| i * j)
				.map(|r| r.unwrap())
				.sum::<u32>()
		})
		.map(|r| r.unwrap())
		.collect();
	assert_eq!(totals, vec![0, 10, 20, 30]);
}

#[test]
fn test_parallel_do_runs_every_item() {
	let parallelizer = Parallelizer::from_concurrency(4);
	let counter = Arc::new(AtomicUsize::new(0));
	let seen = Arc::clone(&counter);
	let errors = parallelizer.parallel_do(0..50, move |_| {
		seen.fetch_add(1, Ordering::SeqCst);
	});
	assert!(errors.is_empty());
	assert_eq!(counter.load(Ordering::SeqCst), 50);
}

#[test]
fn test_resize_keeps_pool_working() {
	let parallelizer = Parallelizer::new(4);
	parallelizer.resize(1);
	assert_eq!(parallelizer.thread_count(), 1);
	let count = parallelizer.parallelize(0..10, ParallelOptions::unordered(), |i| i).count();
	assert_eq!(count, 10);
}

// vim: ts=4
