// tests/cache/cache_hit_test.rs
#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use common::{number, QUARTERS_1997, UNIT_SALES_1997};
use cubist::cache::{AggregationManager, CellRegion};
use cubist::config::CacheSettings;
use cubist::olap::{CellValue, Session};

const TOTAL: &str = "SELECT {[Measures].[Unit Sales]} ON COLUMNS FROM [Sales]";
const QUARTERS: &str = "SELECT {[Time].[1997].Children} ON COLUMNS FROM [Sales]";

fn time_members(session: &Session) -> Arc<cubist::olap::HierarchyMembers> {
    let schema = session.schema();
    let cube = schema.cube("Sales").unwrap();
    let time = schema.cube_dimension(cube, "Time").unwrap().hierarchies[0];
    session.members(time).unwrap()
}

#[test]
fn test_grand_total() {
    let session = common::session();
    let result = session.execute(TOTAL).unwrap();
    assert_eq!(number(&result, &[0]), UNIT_SALES_1997);
    assert_eq!(result.cell(&[0]).formatted_value(), "266,773");
}

#[test]
fn test_siblings_share_one_segment() {
    let session = common::session();
    let cache = session.cache();

    let result = session.execute(QUARTERS).unwrap();
    for (q, expected) in QUARTERS_1997.iter().enumerate() {
        assert_eq!(number(&result, &[q]), *expected, "Q{}", q + 1);
    }
    assert_eq!(cache.request_count(), 4);
    assert_eq!(cache.miss_count(), 1);

    let again = session.execute(QUARTERS).unwrap();
    assert_eq!(number(&again, &[3]), QUARTERS_1997[3]);
    assert_eq!(cache.request_count(), 8);
    assert_eq!(cache.miss_count(), 1);
    assert_eq!(cache.hit_ratio(), Some(0.875));

    let stats = cache.stats();
    assert_eq!(stats.segments, 1);
    assert_eq!(stats.ready, 1);
}

#[test]
fn test_year_without_facts_is_empty() {
    let session = common::session();
    let result = session
        .execute("SELECT {[Time].[1997], [Time].[1998]} ON COLUMNS FROM [Sales]")
        .unwrap();
    assert_eq!(number(&result, &[0]), UNIT_SALES_1997);
    assert_eq!(result.cell(&[1]).value(), &CellValue::Empty);
    assert_eq!(result.cell(&[1]).formatted_value(), "");
    assert_eq!(session.cache().miss_count(), 1);
}

#[test]
fn test_flush_measures_region_forces_reload() {
    let session = common::session();
    let cache = session.cache();
    session.execute(TOTAL).unwrap();
    assert_eq!(cache.miss_count(), 1);

    let warehouse = session.schema().cube("Warehouse").unwrap();
    assert_eq!(cache.flush(&cache.create_measures_region(warehouse)), 0);
    session.execute(TOTAL).unwrap();
    assert_eq!(cache.miss_count(), 1);

    let sales = session.schema().cube("Sales").unwrap();
    let other_measure = CellRegion::Measures(vec![(sales.id, "Store Sales".into())]);
    assert_eq!(cache.flush(&other_measure), 0);

    assert_eq!(cache.flush(&cache.create_measures_region(sales)), 1);
    assert_eq!(cache.stats().segments, 0);
    let result = session.execute(TOTAL).unwrap();
    assert_eq!(cache.miss_count(), 2);
    assert_eq!(number(&result, &[0]), UNIT_SALES_1997);
}

#[test]
fn test_flush_member_region() {
    let session = common::session();
    let cache = session.cache();
    session.execute(QUARTERS).unwrap();

    let time = time_members(&session);
    let y1998 = time.by_unique_name("[Time].[1998]").unwrap();
    assert_eq!(cache.flush(&cache.create_member_region(&time, y1998)), 0);
    session.execute(QUARTERS).unwrap();
    assert_eq!(cache.miss_count(), 1);

    let q2 = time.by_unique_name("[Time].[1997].[Q2]").unwrap();
    assert_eq!(cache.flush(&cache.create_member_region(&time, q2)), 1);
    let result = session.execute(QUARTERS).unwrap();
    assert_eq!(cache.miss_count(), 2);
    assert_eq!(number(&result, &[1]), QUARTERS_1997[1]);
}

#[test]
fn test_crossjoin_region_needs_every_part() {
    let session = common::session();
    let cache = session.cache();
    session.execute(QUARTERS).unwrap();

    let time = time_members(&session);
    let q1 = time.by_unique_name("[Time].[1997].[Q1]").unwrap();
    let warehouse = session.schema().cube("Warehouse").unwrap();
    let sales = session.schema().cube("Sales").unwrap();

    let miss = CellRegion::crossjoin(vec![
        cache.create_measures_region(warehouse),
        cache.create_member_region(&time, q1),
    ]);
    assert_eq!(cache.flush(&miss), 0);

    let hit = CellRegion::crossjoin(vec![
        cache.create_measures_region(sales),
        cache.create_member_region(&time, q1),
    ]);
    assert_eq!(cache.flush(&hit), 1);
}

#[test]
fn test_compound_slicer_is_cached() {
    let session = common::session();
    let mdx = "SELECT {[Measures].[Unit Sales]} ON COLUMNS FROM [Sales] \
               WHERE {[Product].[Drink], [Product].[Food]}";
    let first = session.execute(mdx).unwrap();
    let drink_and_food: i64 = common::CELLS[0].iter().chain(&common::CELLS[1]).sum();
    assert_eq!(number(&first, &[0]), drink_and_food as f64);

    let misses = session.cache().miss_count();
    let second = session.execute(mdx).unwrap();
    assert_eq!(number(&second, &[0]), drink_and_food as f64);
    assert_eq!(session.cache().miss_count(), misses);
}

#[test]
fn test_sessions_can_share_a_cache() {
    let cache = Arc::new(AggregationManager::new(&CacheSettings::default()));
    let open = || {
        Session::builder(common::schema(false), Arc::new(common::foodmart_db()))
            .dialect(common::sqlite())
            .cache(cache.clone())
            .build()
            .unwrap()
    };
    open().execute(TOTAL).unwrap();
    let result = open().execute(TOTAL).unwrap();
    assert_eq!(number(&result, &[0]), UNIT_SALES_1997);
    assert_eq!(cache.request_count(), 2);
    assert_eq!(cache.miss_count(), 1);
}

#[test]
fn test_counters_can_be_disabled() {
    let session = common::session_with(common::settings("[cache]\ncounters_enabled = false"));
    session.execute(TOTAL).unwrap();
    session.execute(TOTAL).unwrap();
    assert_eq!(session.cache().request_count(), 0);
    assert_eq!(session.cache().hit_ratio(), None);
    assert_eq!(session.cache().stats().segments, 1);
}

#[test]
fn test_segment_limit_evicts_least_recently_used() {
    let session = common::session_with(common::settings("[cache]\nmax_segments = 1"));
    let cache = session.cache();
    session.execute(TOTAL).unwrap();
    session.execute(QUARTERS).unwrap();
    assert_eq!(cache.stats().segments, 1);
    assert_eq!(cache.miss_count(), 2);

    // The year-level segment was evicted.
    session.execute(TOTAL).unwrap();
    assert_eq!(cache.miss_count(), 3);
}

#[test]
fn test_reset_counters() {
    let session = common::session();
    session.execute(TOTAL).unwrap();
    session.cache().reset_counters();
    assert_eq!(session.cache().hit_ratio(), None);
    session.execute(TOTAL).unwrap();
    assert_eq!(session.cache().hit_ratio(), Some(1.0));
}
