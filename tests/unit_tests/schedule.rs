use eyre::eyre;
use parasm::error::AssemblyError;
use parasm::schedule::{run_phase, DomainMap, ElementDomain, JobDispenser, Phase, ThreadConfig, WorkUnit, WorkerPool};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn dispenser_hands_out_indices_in_order() {
    let dispenser = JobDispenser::new(3);
    assert_eq!(dispenser.claim(), Some(0));
    assert_eq!(dispenser.claim(), Some(1));
    assert_eq!(dispenser.claim(), Some(2));
    assert_eq!(dispenser.claim(), None);
    assert_eq!(dispenser.claim(), None);
    assert_eq!(dispenser.num_claimed(), 3);
}

#[test]
fn dispenser_with_zero_total_is_exhausted() {
    let dispenser = JobDispenser::new(0);
    assert_eq!(dispenser.claim(), None);
    assert_eq!(dispenser.num_claimed(), 0);
}

#[test]
fn cancelled_dispenser_hands_out_nothing() {
    let dispenser = JobDispenser::new(10);
    assert_eq!(dispenser.claim(), Some(0));
    assert!(!dispenser.is_cancelled());
    dispenser.cancel();
    assert!(dispenser.is_cancelled());
    assert_eq!(dispenser.claim(), None);
    assert_eq!(dispenser.num_claimed(), 1);
}

#[test]
fn domain_map_resolves_entire_domain_to_identity() {
    let map = DomainMap::entire(4);
    assert_eq!(map.total(), 4);
    for i in 0..4 {
        let unit = map.resolve(i).unwrap();
        assert_eq!(unit.quantity, 0);
        assert_eq!(unit.local_index, i);
        assert_eq!(unit.element_index, i);
    }
    assert_eq!(map.resolve(4), None);
}

#[test]
fn domain_map_skips_empty_subdomains() {
    let first = [7, 8, 9];
    let third = [0, 2, 4, 6, 8];
    let domains = [
        ElementDomain::Subset(&first),
        ElementDomain::Subset(&[]),
        ElementDomain::Subset(&third),
    ];
    let map = DomainMap::new(domains, 10);
    assert_eq!(map.offsets(), &[0, 3, 3, 8]);
    assert_eq!(map.total(), 8);

    let mut cursor = map.cursor();
    for flat in 0..=2 {
        let expected = WorkUnit {
            quantity: 0,
            local_index: flat,
            element_index: first[flat],
        };
        assert_eq!(cursor.resolve(flat), Some(expected));
    }
    for flat in 3..=7 {
        let expected = WorkUnit {
            quantity: 2,
            local_index: flat - 3,
            element_index: third[flat - 3],
        };
        assert_eq!(cursor.resolve(flat), Some(expected));
    }
    assert_eq!(cursor.resolve(8), None);
    assert_eq!(cursor.resolve(100), None);
}

#[test]
fn domain_cursor_restarts_for_earlier_index() {
    let map = DomainMap::new([ElementDomain::Entire, ElementDomain::Entire], 3);
    let mut cursor = map.cursor();
    assert_eq!(cursor.resolve(4).unwrap().quantity, 1);
    assert_eq!(cursor.cached_quantity(), 1);

    let unit = cursor.resolve(1).unwrap();
    assert_eq!(unit.quantity, 0);
    assert_eq!(unit.element_index, 1);
    assert_eq!(cursor.cached_quantity(), 0);
}

#[test]
fn domain_map_without_quantities_is_empty() {
    let map = DomainMap::new([], 5);
    assert_eq!(map.num_quantities(), 0);
    assert_eq!(map.total(), 0);
    assert_eq!(map.resolve(0), None);
}

#[test]
fn domain_map_finds_out_of_range_subset_entries() {
    let valid = [0, 1];
    let invalid = [2, 5, 1];
    let map = DomainMap::new(
        [
            ElementDomain::Subset(&valid),
            ElementDomain::Entire,
            ElementDomain::Subset(&invalid),
        ],
        3,
    );
    assert_eq!(map.find_out_of_range(), Some((2, 5)));

    let map = DomainMap::new([ElementDomain::Subset(&valid)], 3);
    assert_eq!(map.find_out_of_range(), None);
}

#[test]
fn thread_config_rejects_zero_threads() {
    let config = ThreadConfig::with_num_threads(0);
    assert!(matches!(config.validate(), Err(AssemblyError::InvalidConfig(_))));
    assert!(matches!(WorkerPool::new(&config), Err(AssemblyError::InvalidConfig(_))));
    assert!(ThreadConfig::default().num_threads >= 1);
}

#[test]
fn worker_pool_runs_worker_once_per_thread() {
    let pool = WorkerPool::new(&ThreadConfig::with_num_threads(3)).unwrap();
    assert_eq!(pool.num_threads(), 3);
    let indices = pool.run(|index| index);
    assert_eq!(indices, vec![0, 1, 2]);
}

#[test]
fn run_phase_with_nothing_to_do_still_runs_every_worker() {
    let results = run_phase(Phase::Residual, &ThreadConfig::with_num_threads(2), 0, |worker| {
        let mut count = 0;
        while worker.claim().is_some() {
            count += 1;
        }
        count
    })
    .unwrap();
    assert_eq!(results, vec![0, 0]);
}

#[test]
fn run_phase_gives_each_worker_its_thread_index() {
    let indices = run_phase(Phase::Matrix, &ThreadConfig::with_num_threads(4), 0, |worker| {
        worker.worker_index()
    })
    .unwrap();
    assert_eq!(indices, vec![0, 1, 2, 3]);
}

#[test]
fn run_phase_reports_first_failure() {
    let result = run_phase(Phase::Jacobian, &ThreadConfig::with_num_threads(4), 1000, |worker| {
        while let Some(index) = worker.claim() {
            if index == 10 {
                worker.fail(index, eyre!("unit {index} failed"));
                return;
            }
        }
    });

    match result {
        Err(AssemblyError::Kernel { phase, element, source }) => {
            assert_eq!(phase, Phase::Jacobian);
            assert_eq!(element, 10);
            assert_eq!(source.to_string(), "unit 10 failed");
        }
        other => panic!("expected kernel error, got {other:?}"),
    }
}

#[test]
fn run_phase_keeps_only_the_first_of_several_failures() {
    let result = run_phase(Phase::Residual, &ThreadConfig::with_num_threads(1), 10, |worker| {
        worker.fail(3, eyre!("first"));
        worker.fail(5, eyre!("second"));
        // The dispenser is cancelled by the first failure
        assert_eq!(worker.claim(), None);
    });
    assert!(matches!(result, Err(AssemblyError::Kernel { element: 3, .. })));
}

#[test]
fn failure_stops_further_claims() {
    let claims = AtomicUsize::new(0);
    let result = run_phase(Phase::Residual, &ThreadConfig::with_num_threads(1), 100, |worker| {
        while let Some(index) = worker.claim() {
            claims.fetch_add(1, Ordering::SeqCst);
            if index == 3 {
                worker.fail(index, eyre!("failure"));
            }
        }
    });
    assert!(result.is_err());
    // A single worker sees the cancellation at its very next claim
    assert_eq!(claims.load(Ordering::SeqCst), 4);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn run_phase_claims_every_index_exactly_once(total in 0usize..300, num_threads in 1usize..8) {
        let config = ThreadConfig::with_num_threads(num_threads);
        let claimed = run_phase(Phase::Residual, &config, total, |worker| {
            let mut indices = Vec::new();
            while let Some(index) = worker.claim() {
                indices.push(index);
            }
            assert_eq!(indices.len(), worker.num_claimed());
            indices
        })
        .unwrap();

        prop_assert_eq!(claimed.len(), num_threads);
        for indices in &claimed {
            prop_assert!(indices.windows(2).all(|w| w[0] < w[1]));
        }
        let mut all: Vec<_> = claimed.into_iter().flatten().collect();
        all.sort_unstable();
        prop_assert_eq!(all, (0..total).collect::<Vec<_>>());
    }

    #[test]
    fn domain_map_resolves_every_flat_index(
        sizes in proptest::collection::vec(0usize..6, 0..6),
        num_elements in 1usize..10,
    ) {
        // Subset k visits the elements (j * (k + 1)) % num_elements
        let subsets: Vec<Vec<usize>> = sizes
            .iter()
            .enumerate()
            .map(|(k, &size)| (0..size).map(|j| (j * (k + 1)) % num_elements).collect())
            .collect();
        let map = DomainMap::new(subsets.iter().map(|s| ElementDomain::Subset(s)), num_elements);
        prop_assert_eq!(map.total(), sizes.iter().sum::<usize>());

        let expected: Vec<_> = subsets
            .iter()
            .enumerate()
            .flat_map(|(k, s)| s.iter().enumerate().map(move |(local, &e)| (k, local, e)))
            .collect();
        let mut cursor = map.cursor();
        for (flat, &(quantity, local_index, element_index)) in expected.iter().enumerate() {
            let unit = cursor.resolve(flat).unwrap();
            prop_assert_eq!(unit, WorkUnit { quantity, local_index, element_index });
        }
        prop_assert_eq!(cursor.resolve(map.total()), None);
    }
}
