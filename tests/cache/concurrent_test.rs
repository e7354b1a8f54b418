// tests/cache/concurrent_test.rs
#[path = "../common/mod.rs"]
mod common;

use std::sync::Barrier;
use std::thread;

use common::{number, QUARTERS_1997, UNIT_SALES_1997};

const THREADS: usize = 8;

#[test]
fn test_concurrent_cold_requests_load_once() {
    let (session, counting) = common::counting_session();
    let barrier = Barrier::new(THREADS);
    let mdx = "SELECT {[Time].[1997].Children} ON COLUMNS FROM [Sales]";

    let results: Vec<Vec<f64>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let session = session.clone();
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    let result = session.execute(mdx).unwrap();
                    (0..4).map(|q| number(&result, &[q])).collect()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for values in &results {
        assert_eq!(values.as_slice(), QUARTERS_1997.as_slice());
    }
    assert_eq!(counting.count_matching("AS \"m0\""), 1);
    // Member trees are read once too.
    assert_eq!(counting.max_per_statement(), 1);

    let cache = session.cache();
    assert_eq!(cache.request_count(), (THREADS * 4) as u64);
    assert_eq!(cache.miss_count(), 1);
}

#[test]
fn test_concurrent_distinct_queries() {
    let (session, counting) = common::counting_session();
    let queries = [
        "SELECT {[Measures].[Unit Sales]} ON COLUMNS FROM [Sales]",
        "SELECT {[Measures].[Store Sales]} ON COLUMNS FROM [Sales]",
        "SELECT {[Measures].[Store Cost]} ON COLUMNS FROM [Sales]",
    ];
    let barrier = Barrier::new(queries.len() * 2);

    let results: Vec<(usize, f64)> = thread::scope(|scope| {
        let handles: Vec<_> = queries
            .iter()
            .enumerate()
            .chain(queries.iter().enumerate())
            .map(|(i, mdx)| {
                let session = session.clone();
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    (i, number(&session.execute(mdx).unwrap(), &[0]))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (i, value) in results {
        // store_cost = units, store_sales = 2 * units
        let expected = match i {
            0 | 2 => UNIT_SALES_1997,
            _ => 2.0 * UNIT_SALES_1997,
        };
        assert_eq!(value, expected, "{}", queries[i]);
    }
    assert_eq!(counting.count_matching("AS \"m0\""), 3);
    assert_eq!(counting.max_per_statement(), 1);
    assert_eq!(session.cache().miss_count(), 3);
}

#[test]
fn test_flush_during_reads_reloads_consistently() {
    let (session, counting) = common::counting_session();
    let mdx = "SELECT {[Measures].[Unit Sales]} ON COLUMNS FROM [Sales]";
    session.execute(mdx).unwrap();

    let sales = session.schema().cube("Sales").unwrap().clone();
    thread::scope(|scope| {
        for _ in 0..4 {
            let session = session.clone();
            scope.spawn(move || {
                for _ in 0..10 {
                    let result = session.execute(mdx).unwrap();
                    assert_eq!(number(&result, &[0]), UNIT_SALES_1997);
                }
            });
        }
        let cache = session.cache();
        for _ in 0..5 {
            cache.flush(&cache.create_measures_region(&sales));
        }
    });

    let loads = counting.count_matching("AS \"m0\"");
    assert!((1..=6).contains(&loads), "{loads} loads");
}
