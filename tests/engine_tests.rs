//! Cross-strategy behavior of the aggregation engine

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use splitfold::EngineError;
use splitfold::domain::tree::NodeId;
use splitfold::domain::{FsTree, Matcher, MemoryTree, TreeSource, count_matching, pair_sum};
use splitfold::parallel::aggregation::from_fns;
use splitfold::parallel::{
    BatchDispatchScheduler, ExecutionStrategy, ForkJoinScheduler, Scheduler, StrategyKind,
    run_batch_dispatch, run_fork_join,
};
use std::borrow::Cow;
use std::fs;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(5);

fn both(workers: usize) -> Vec<ExecutionStrategy> {
    [StrategyKind::ForkJoin, StrategyKind::BatchDispatch]
        .into_iter()
        .map(|kind| ExecutionStrategy::build(kind, workers, TIMEOUT, 0).unwrap())
        .collect()
}

/// Deterministic tree with a mix of .pdf and .txt leaves and empty folders
fn random_tree(seed: u64, files: usize) -> (MemoryTree, usize) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut paths = Vec::new();
    let mut pdfs = 0;

    for i in 0..files {
        let depth = rng.gen_range(0..5);
        let mut path = String::new();
        for _ in 0..depth {
            path.push_str(&format!("d{}/", rng.gen_range(0..3)));
        }
        if rng.gen_bool(0.4) {
            path.push_str(&format!("f{i}.pdf"));
            pdfs += 1;
        } else {
            path.push_str(&format!("f{i}.txt"));
        }
        paths.push(path);
    }
    paths.push("d0/empty/".to_string());
    paths.push("vacant/".to_string());

    (MemoryTree::from_paths("root", &paths), pdfs)
}

#[test]
fn test_strategies_agree_on_trees() {
    for seed in 0..5 {
        let (tree, pdfs) = random_tree(seed, 200);
        for scheduler in both(4) {
            let root = tree.root();
            let outcome =
                count_matching(&scheduler, tree.clone(), root, Matcher::suffix(".pdf")).unwrap();
            assert_eq!(outcome.value, pdfs as u64, "{} seed {seed}", scheduler.name());
            assert!(outcome.is_complete());
        }
    }
}

#[test]
fn test_result_does_not_depend_on_pool_size() {
    let (tree, _) = random_tree(42, 300);
    let numbers: Vec<i64> = (0..1000).map(|i| (i * 37 % 101) - 50).collect();

    let mut tree_counts = Vec::new();
    let mut sums = Vec::new();
    for workers in [1, 2, 8] {
        for scheduler in both(workers) {
            let root = tree.root();
            tree_counts.push(
                count_matching(&scheduler, tree.clone(), root, Matcher::suffix(".txt"))
                    .unwrap()
                    .value,
            );
            sums.push(pair_sum(&scheduler, numbers.clone(), 7).unwrap().value);
        }
    }

    assert!(tree_counts.windows(2).all(|w| w[0] == w[1]));
    assert!(sums.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_zero_and_all_matches() {
    let tree = MemoryTree::from_paths("root", &["a.txt", "sub/b.txt", "sub/deeper/c.txt", "e/"]);
    for scheduler in both(3) {
        let none = count_matching(&scheduler, tree.clone(), tree.root(), Matcher::suffix(".pdf"));
        assert_eq!(none.unwrap().value, 0);

        let all = count_matching(&scheduler, tree.clone(), tree.root(), Matcher::suffix(".txt"));
        assert_eq!(all.unwrap().value, 3);
    }
}

#[test]
fn test_empty_root_counts_zero() {
    let tree = MemoryTree::new("root");
    for scheduler in both(2) {
        let outcome =
            count_matching(&scheduler, tree.clone(), tree.root(), Matcher::suffix("")).unwrap();
        assert_eq!(outcome.value, 0);
    }
}

#[test]
fn test_short_sequences_sum_to_zero() {
    for scheduler in both(2) {
        assert_eq!(pair_sum(&scheduler, Vec::<i64>::new(), 10).unwrap().value, 0);
        assert_eq!(pair_sum(&scheduler, vec![7i64], 10).unwrap().value, 0);
    }
}

#[test]
fn test_four_numbers() {
    for scheduler in both(2) {
        assert_eq!(pair_sum(&scheduler, vec![1i64, 2, 3, 4], 2).unwrap().value, 12);
        assert_eq!(pair_sum(&scheduler, vec![1i64, 2, 3, 4], 10).unwrap().value, 12);
    }
}

#[test]
fn test_threshold_does_not_change_total() {
    let mut rng = StdRng::seed_from_u64(7);
    let numbers: Vec<i64> = (0..37).map(|_| rng.gen_range(-100..=100)).collect();
    let expected: i64 = numbers.windows(2).map(|w| w[0] + w[1]).sum();

    for scheduler in both(4) {
        let whole = pair_sum(&scheduler, numbers.clone(), numbers.len()).unwrap();
        assert_eq!(whole.value, expected);

        for threshold in 2..=numbers.len() {
            let outcome = pair_sum(&scheduler, numbers.clone(), threshold).unwrap();
            assert_eq!(outcome.value, expected, "{} threshold {threshold}", scheduler.name());
        }
    }
}

#[test]
fn test_overflowing_sequence_is_rejected() {
    for scheduler in both(2) {
        let err = pair_sum(&scheduler, vec![i64::MAX, 1], 2).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)), "{}", scheduler.name());

        let err = pair_sum(&scheduler, vec![i64::MIN, -1, 0, 0, 0], 2).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }
}

#[test]
fn test_five_numbers_with_large_thresholds() {
    for scheduler in both(2) {
        for threshold in [5, 6, 10, 100] {
            let outcome = pair_sum(&scheduler, vec![5i64, 1, 9, 2, 7], threshold).unwrap();
            assert_eq!(outcome.value, 36);
        }
    }
}

#[test]
fn test_threshold_below_two_is_rejected() {
    for scheduler in both(1) {
        let err = pair_sum(&scheduler, vec![1i64, 2, 3], 1).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }
}

#[test]
fn test_directory_fixture() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::write(root.join("a.txt"), "a").unwrap();
    fs::write(root.join("b.pdf"), "b").unwrap();
    fs::create_dir(root.join("sub")).unwrap();
    fs::write(root.join("sub").join("c.pdf"), "c").unwrap();

    let tree = FsTree::default();
    for scheduler in both(2) {
        let node = tree.root(root).unwrap();
        let outcome =
            count_matching(&scheduler, tree.clone(), node, Matcher::suffix(".pdf")).unwrap();
        assert_eq!(outcome.value, 2, "{}", scheduler.name());
    }
}

#[test]
fn test_directory_named_like_a_match_is_not_counted() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::create_dir(root.join("folder.pdf")).unwrap();
    fs::write(root.join("folder.pdf").join("inner.pdf"), "x").unwrap();

    let tree = FsTree::default();
    for scheduler in both(2) {
        let node = tree.root(root).unwrap();
        let outcome =
            count_matching(&scheduler, tree.clone(), node, Matcher::suffix(".pdf")).unwrap();
        assert_eq!(outcome.value, 1);
    }
}

/// Memory tree whose listing of one container takes longer than the deadline
#[derive(Clone)]
struct Stalling {
    tree: MemoryTree,
    slow: NodeId,
    delay: Duration,
}

impl TreeSource for Stalling {
    type Node = NodeId;

    fn children(&self, node: &NodeId) -> splitfold::Result<Vec<NodeId>> {
        if *node == self.slow {
            thread::sleep(self.delay);
        }
        self.tree.children(node)
    }

    fn is_container(&self, node: &NodeId) -> bool {
        self.tree.is_container(node)
    }

    fn name<'a>(&'a self, node: &'a NodeId) -> Cow<'a, str> {
        self.tree.name(node)
    }
}

#[test]
fn test_one_timeout_drops_exactly_one_subtree() {
    let tree = MemoryTree::from_paths(
        "root",
        &["good/a.pdf", "good/b.pdf", "slow/c.pdf", "slow/d.pdf", "slow/e.pdf", "f.pdf"],
    );
    let slow = tree.find("slow").unwrap();

    let fork_join = ForkJoinScheduler::new(2).unwrap();
    let full = count_matching(&fork_join, tree.clone(), tree.root(), Matcher::suffix(".pdf"))
        .unwrap()
        .value;
    assert_eq!(full, 6);

    let stalling = Stalling {
        tree: tree.clone(),
        slow,
        delay: Duration::from_millis(600),
    };
    let batch = BatchDispatchScheduler::new(2, Duration::from_millis(100)).unwrap();
    let outcome = count_matching(&batch, stalling, tree.root(), Matcher::suffix(".pdf")).unwrap();

    // The slow folder holds three matches
    assert_eq!(outcome.value, full - 3);
    assert_eq!(outcome.dropped.len(), 1);
    assert_eq!(outcome.dropped[0].round, 1);
    assert_eq!(outcome.dropped[0].item, format!("{slow:?}"));
    assert!(matches!(outcome.dropped[0].reason, EngineError::Timeout(_)));
}

#[test]
fn test_queued_task_is_not_charged_for_waiting() {
    // One worker: good waits in the queue while slow holds the worker
    let tree = MemoryTree::from_paths(
        "root",
        &["slow/c.pdf", "slow/d.pdf", "good/a.pdf", "good/b.pdf", "f.pdf"],
    );
    let stalling = Stalling {
        slow: tree.find("slow").unwrap(),
        tree: tree.clone(),
        delay: Duration::from_millis(600),
    };

    let batch = BatchDispatchScheduler::new(1, Duration::from_millis(100)).unwrap();
    let outcome = count_matching(&batch, stalling, tree.root(), Matcher::suffix(".pdf")).unwrap();

    assert_eq!(outcome.value, 3);
    assert_eq!(outcome.dropped.len(), 1);
    assert_eq!(outcome.dropped[0].item, format!("{:?}", tree.find("slow").unwrap()));
}

#[test]
fn test_timed_out_run_returns_without_waiting_for_the_task() {
    let agg = from_fns(
        |n: &u32| {
            if *n == 1 {
                thread::sleep(Duration::from_secs(3));
            }
            Ok(if *n == 0 { vec![1, 2] } else { vec![] })
        },
        |_: &u32| Ok(1u64),
        |a: u64, b: u64| a + b,
    );

    let started = Instant::now();
    let value = run_batch_dispatch(agg, 0, 2, Duration::from_millis(100)).unwrap();
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
    assert_eq!(value, 1);
}

#[test]
fn test_fork_join_surfaces_failures() {
    let agg = from_fns(
        |n: &u32| Ok(if *n < 5 { vec![n * 2 + 1, n * 2 + 2] } else { vec![] }),
        |n: &u32| {
            if *n == 9 {
                Err(EngineError::evaluation(n, "bad leaf"))
            } else {
                Ok(1u64)
            }
        },
        |a: u64, b: u64| a + b,
    );

    let err = run_fork_join(agg, 0, 4).unwrap_err();
    assert_eq!(err, EngineError::evaluation(9u32, "bad leaf"));
}

#[test]
fn test_batch_dispatch_continues_past_failures() {
    // Node 1 cannot be expanded; nodes 2.. are fine
    let agg = from_fns(
        |n: &u32| match *n {
            0 => Ok(vec![1, 2]),
            1 => Err(EngineError::evaluation(1u32, "unreadable")),
            2 => Ok(vec![3, 4, 5]),
            _ => Ok(vec![]),
        },
        |_: &u32| Ok(1u64),
        |a: u64, b: u64| a + b,
    );

    let scheduler = BatchDispatchScheduler::new(2, TIMEOUT).unwrap();
    let outcome = scheduler.run(std::sync::Arc::new(agg), 0).unwrap();
    assert_eq!(outcome.value, 3);
    assert_eq!(outcome.dropped.len(), 1);
    assert!(!outcome.is_complete());
}

#[test]
fn test_free_functions_agree() {
    let halving = || {
        from_fns(
            |n: &u64| Ok(if *n > 1 { vec![n / 2, n - n / 2] } else { vec![] }),
            |n: &u64| Ok(*n),
            |a: u64, b: u64| a + b,
        )
    };

    let fork_join = run_fork_join(halving(), 1000, 3).unwrap();
    let batch = run_batch_dispatch(halving(), 1000, 3, TIMEOUT).unwrap();
    assert_eq!(fork_join, 1000);
    assert_eq!(batch, 1000);
}
