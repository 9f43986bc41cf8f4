//! Day-by-day replay and series aggregation against a store

mod common;

use common::*;
use repo_stats::aggregator::{Aggregator, SeriesQuery};
use repo_stats::config::{AuthorsConfig, RulesConfig};
use repo_stats::models::{DayState, DerivedMetrics, EntityKey};
use repo_stats::replay::StateReconstructor;
use repo_stats::store::{EntityFilter, EntityStore, MemoryStore};
use repo_stats::EngineError;

#[test]
fn test_closed_entity_counted_until_close_day() {
    let store = MemoryStore::new();
    seed(
        &store,
        EntityBuilder::pr("acme/widgets", 1, at(2022, 1, 1, 9))
            .closed(at(2022, 1, 3, 15))
            .build(),
        vec![record(at(2022, 1, 3, 15), "closed")],
    );
    let rules = RulesConfig::default();
    let query = SeriesQuery::new(range(day(2022, 1, 1), day(2022, 1, 5)), EntityFilter::new());

    let series = Aggregator::new(&store, &rules)
        .with_now(now())
        .daily_state_series(&query)
        .unwrap();

    let open: Vec<u32> = series.days.values().map(|c| c.open).collect();
    let total: Vec<u32> = series.days.values().map(|c| c.total).collect();
    assert_eq!(open, vec![1, 1, 1, 0, 0]);
    assert_eq!(total, vec![1, 1, 1, 0, 0]);
    assert_eq!(series.days.len(), 5);
}

#[test]
fn test_blocked_then_ready_milestone() {
    let store = MemoryStore::new();
    let key = seed(
        &store,
        EntityBuilder::pr("acme/widgets", 2, at(2022, 3, 1, 0)).build(),
        vec![
            record(at(2022, 3, 2, 10), "milestoned").with_milestone("Blocked"),
            record(at(2022, 3, 5, 10), "milestoned").with_milestone("Ready"),
        ],
    );
    let rules = RulesConfig::default();

    let timeline = StateReconstructor::new(&store, &rules)
        .with_now(now())
        .replay_key(&key, &range(day(2022, 3, 1), day(2022, 3, 7)))
        .unwrap();

    let states: Vec<DayState> = timeline.days.iter().map(|(_, s)| *s).collect();
    assert_eq!(
        states,
        vec![
            DayState::Open,
            DayState::Blocked,
            DayState::Blocked,
            DayState::Blocked,
            DayState::Waiting,
            DayState::Waiting,
            DayState::Waiting,
        ]
    );
}

#[test]
fn test_replay_never_skips_days() {
    let store = MemoryStore::new();
    let key = seed(
        &store,
        EntityBuilder::pr("acme/widgets", 3, at(2022, 1, 28, 23))
            .closed(at(2022, 3, 2, 1))
            .build(),
        vec![record(at(2022, 2, 14, 0), "reviewed")],
    );
    let rules = RulesConfig::default();

    let timeline = StateReconstructor::new(&store, &rules)
        .with_now(now())
        .replay_key(&key, &range(day(2022, 1, 1), day(2022, 12, 31)))
        .unwrap();

    let days: Vec<_> = timeline.days.iter().map(|(d, _)| *d).collect();
    let expected: Vec<_> = range(day(2022, 1, 28), day(2022, 3, 2)).days().collect();
    assert_eq!(days, expected);
}

#[test]
fn test_missing_events_is_not_found() {
    let store = MemoryStore::new();
    let rules = RulesConfig::default();
    let result = StateReconstructor::new(&store, &rules)
        .replay_key(&EntityKey::new("acme/widgets", 9), &range(day(2022, 1, 1), day(2022, 1, 2)));
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[test]
fn test_repo_totals_are_additive() {
    let store = MemoryStore::new();
    seed(
        &store,
        EntityBuilder::pr("acme/widgets", 1, at(2022, 1, 1, 0)).build(),
        vec![record(at(2022, 1, 3, 0), "unlabeled").with_label("waiting-response")],
    );
    seed(
        &store,
        EntityBuilder::pr("acme/widgets", 2, at(2022, 1, 4, 0))
            .closed(at(2022, 1, 6, 0))
            .build(),
        vec![],
    );
    seed(
        &store,
        EntityBuilder::pr("acme/gadgets", 1, at(2021, 12, 20, 0)).build(),
        vec![record(at(2021, 12, 21, 0), "milestoned").with_milestone("Blocked")],
    );
    seed(
        &store,
        EntityBuilder::issue("acme/gadgets", 2, at(2022, 1, 2, 0)).build(),
        vec![],
    );
    let rules = RulesConfig::default();
    let aggregator = Aggregator::new(&store, &rules).with_now(now());
    let window = range(day(2022, 1, 1), day(2022, 1, 10));
    let filter = EntityFilter::new().repos(["acme/widgets", "acme/gadgets"]);

    let by_repo = aggregator
        .repo_state_series(&SeriesQuery::new(window, filter.clone()))
        .unwrap();
    let combined = aggregator
        .daily_state_series(&SeriesQuery::new(window, filter))
        .unwrap();

    assert_eq!(by_repo.repos, vec!["acme/gadgets", "acme/widgets"]);
    for (day, totals) in &by_repo.totals {
        let per_repo_sum: u32 = by_repo.days[day].values().map(|c| c.total).sum();
        assert_eq!(totals.total, per_repo_sum);
        assert_eq!(totals.total, combined.days[day].total);
        assert_eq!(totals.blocked, combined.days[day].blocked);
        assert_eq!(totals.trend, combined.days[day].trend);
    }
    assert_eq!(combined.days[&day(2022, 1, 5)].total, 4);
    assert_eq!(combined.days[&day(2022, 1, 5)].waiting, 1);
    assert_eq!(combined.days[&day(2022, 1, 5)].blocked, 1);
}

#[test]
fn test_trend_over_daily_series() {
    let store = MemoryStore::new();
    for n in 0..7u32 {
        seed(
            &store,
            EntityBuilder::pr("acme/widgets", u64::from(n), at(2022, 1, 1 + n, 0)).build(),
            vec![],
        );
    }
    let rules = RulesConfig::default();
    let query = SeriesQuery::new(range(day(2022, 1, 1), day(2022, 1, 7)), EntityFilter::new());

    let series = Aggregator::new(&store, &rules)
        .with_now(now())
        .daily_state_series(&query)
        .unwrap();

    let trend: Vec<f64> = series.days.values().map(|c| c.trend).collect();
    assert_eq!(trend[0], 1.0);
    assert_eq!(trend[6], 4.0);
}

#[test]
fn test_inconsistent_entity_flagged_and_counted_open() {
    let store = MemoryStore::new();
    let key = seed(
        &store,
        EntityBuilder::pr("acme/widgets", 1, at(2022, 1, 3, 0))
            .closed(at(2022, 1, 1, 0))
            .build(),
        vec![],
    );
    let rules = RulesConfig::default();
    let query = SeriesQuery::new(range(day(2022, 1, 1), day(2022, 1, 5)), EntityFilter::new());

    let series = Aggregator::new(&store, &rules)
        .with_now(now())
        .daily_state_series(&query)
        .unwrap();

    let open: Vec<u32> = series.days.values().map(|c| c.open).collect();
    assert_eq!(open, vec![0, 0, 1, 1, 1]);
    assert_eq!(series.flagged.len(), 1);
    assert_eq!(series.flagged[0].entity, key);
}

#[test]
fn test_issue_types_prefer_question() {
    let store = MemoryStore::new();
    seed(
        &store,
        EntityBuilder::issue("acme/widgets", 1, at(2022, 1, 1, 0))
            .labels(&["bug", "question"])
            .build(),
        vec![],
    );
    seed(
        &store,
        EntityBuilder::issue("acme/widgets", 2, at(2022, 1, 2, 0))
            .labels(&["bug"])
            .closed(at(2022, 1, 2, 5))
            .build(),
        vec![],
    );
    seed(
        &store,
        EntityBuilder::pr("acme/widgets", 3, at(2022, 1, 1, 0))
            .labels(&["enhancement"])
            .build(),
        vec![],
    );
    let rules = RulesConfig::default();
    let query = SeriesQuery::new(range(day(2022, 1, 1), day(2022, 1, 3)), EntityFilter::new());

    let series = Aggregator::new(&store, &rules)
        .with_now(now())
        .issue_type_series(&query)
        .unwrap();

    let jan1 = series.days[&day(2022, 1, 1)];
    assert_eq!((jan1.total, jan1.question, jan1.bug), (1, 1, 0));
    let jan2 = series.days[&day(2022, 1, 2)];
    assert_eq!((jan2.total, jan2.question, jan2.bug), (2, 1, 1));
    assert_eq!(series.days[&day(2022, 1, 3)].enhancement, 0);
}

#[test]
fn test_author_groups_default_to_community() {
    let store = MemoryStore::new();
    seed(
        &store,
        EntityBuilder::pr("acme/widgets", 1, at(2022, 1, 1, 0))
            .author("alice")
            .build(),
        vec![],
    );
    seed(
        &store,
        EntityBuilder::pr("acme/widgets", 2, at(2022, 1, 2, 0))
            .author("mallory")
            .build(),
        vec![],
    );
    let mut authors = AuthorsConfig::default();
    authors
        .groups
        .insert("maintainers".to_string(), ["alice".to_string()].into());
    let rules = RulesConfig::default();
    let query = SeriesQuery::new(range(day(2022, 1, 1), day(2022, 1, 2)), EntityFilter::new());

    let series = Aggregator::new(&store, &rules)
        .with_now(now())
        .author_group_series(&query, &authors)
        .unwrap();

    assert_eq!(series.groups, vec!["maintainers", "community"]);
    let jan1 = &series.days[&day(2022, 1, 1)];
    assert_eq!(jan1.groups["maintainers"], 1);
    assert_eq!(jan1.groups["community"], 0);
    let jan2 = &series.days[&day(2022, 1, 2)];
    assert_eq!(jan2.total, 2);
    assert_eq!(jan2.groups["community"], 1);
}

#[test]
fn test_opened_series_and_running_total() {
    let store = MemoryStore::new();
    seed(
        &store,
        EntityBuilder::pr("acme/widgets", 1, at(2022, 1, 1, 0))
            .merged(at(2022, 1, 2, 0))
            .build(),
        vec![],
    );
    seed(
        &store,
        EntityBuilder::pr("acme/widgets", 2, at(2022, 1, 1, 5))
            .closed(at(2022, 1, 2, 0))
            .build(),
        vec![],
    );
    seed(
        &store,
        EntityBuilder::pr("acme/widgets", 3, at(2022, 1, 3, 0)).build(),
        vec![],
    );
    let rules = RulesConfig::default();
    let query = SeriesQuery::new(range(day(2022, 1, 1), day(2022, 1, 3)), EntityFilter::new());

    let series = Aggregator::new(&store, &rules)
        .with_now(now())
        .opened_series(&query)
        .unwrap();

    let jan1 = series.daily[&day(2022, 1, 1)];
    assert_eq!((jan1.total, jan1.merged, jan1.closed, jan1.open), (2, 1, 1, 0));
    assert_eq!(series.daily[&day(2022, 1, 2)].total, 0);
    let last = series.cumulative[&day(2022, 1, 3)];
    assert_eq!((last.total, last.merged, last.closed, last.open), (3, 1, 1, 1));
}

#[test]
fn test_range_summary_counts_and_averages() {
    let store = MemoryStore::new();
    let merged = seed(
        &store,
        EntityBuilder::pr("acme/widgets", 1, at(2022, 1, 1, 0))
            .merged(at(2022, 1, 3, 0))
            .build(),
        vec![],
    );
    let slow = seed(
        &store,
        EntityBuilder::pr("acme/widgets", 2, at(2022, 1, 2, 0)).build(),
        vec![],
    );
    seed(
        &store,
        EntityBuilder::pr("acme/widgets", 3, at(2022, 1, 3, 0)).build(),
        vec![],
    );
    seed(
        &store,
        EntityBuilder::pr("acme/widgets", 4, at(2021, 12, 1, 0)).build(),
        vec![],
    );
    store
        .upsert_derived_metrics(
            &merged,
            DerivedMetrics {
                days_open: 2.0,
                days_waiting: 0.0,
                days_to_first: 1.0,
            },
        )
        .unwrap();
    store
        .upsert_derived_metrics(
            &slow,
            DerivedMetrics {
                days_open: 30.0,
                days_waiting: 4.0,
                days_to_first: 20.0,
            },
        )
        .unwrap();
    let rules = RulesConfig::default();
    let query = SeriesQuery::new(range(day(2022, 1, 1), day(2022, 1, 31)), EntityFilter::new());

    let summary = Aggregator::new(&store, &rules)
        .with_now(now())
        .range_summary(&query)
        .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.merged, 1);
    assert_eq!(summary.open, 2);
    assert_eq!(summary.closed, 0);
    assert_eq!(summary.days_open_avg, Some(16.0));
    assert_eq!(summary.days_waiting_avg, Some(2.0));
    assert_eq!(summary.days_to_first_avg, Some(10.5));
    assert_eq!(summary.days_to_first_over, 1);
}

#[test]
fn test_author_filter_limits_summary_and_daily_counts() {
    let store = MemoryStore::new();
    let alice = seed(
        &store,
        EntityBuilder::pr("acme/widgets", 1, at(2022, 1, 1, 0))
            .author("alice")
            .build(),
        vec![],
    );
    let mallory = seed(
        &store,
        EntityBuilder::pr("acme/widgets", 2, at(2022, 1, 2, 0))
            .author("mallory")
            .build(),
        vec![record(at(2022, 1, 3, 0), "milestoned").with_milestone("Blocked")],
    );
    store
        .upsert_derived_metrics(
            &alice,
            DerivedMetrics {
                days_open: 4.0,
                days_waiting: 1.0,
                days_to_first: 2.0,
            },
        )
        .unwrap();
    store
        .upsert_derived_metrics(
            &mallory,
            DerivedMetrics {
                days_open: 40.0,
                days_waiting: 10.0,
                days_to_first: 30.0,
            },
        )
        .unwrap();
    let rules = RulesConfig::default();
    let aggregator = Aggregator::new(&store, &rules).with_now(now());
    let query = SeriesQuery::new(
        range(day(2022, 1, 1), day(2022, 1, 5)),
        EntityFilter::new().authors(["alice"]),
    );

    let summary = aggregator.range_summary(&query).unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.open, 1);
    assert_eq!(summary.days_open_avg, Some(4.0));
    assert_eq!(summary.days_waiting_avg, Some(1.0));
    assert_eq!(summary.days_to_first_avg, Some(2.0));
    assert_eq!(summary.days_to_first_over, 0);

    let series = aggregator.daily_state_series(&query).unwrap();
    for counts in series.days.values() {
        assert_eq!(counts.total, 1);
        assert_eq!(counts.open, 1);
        assert_eq!(counts.blocked, 0);
    }
}
