//! FILENAME: core/data-provider/tests/test_settings.rs
//! PURPOSE: View rules through the provider: descriptor factories,
//! aggregate function choice and layout notifications.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::TestHarness;
use data_model::{
    AggregateDescriptor, AggregateFunction, DataError, FilterCondition, SettingsChange,
    SortDescriptor, SortOrder,
};
use data_provider::{DataProviderStatus, ValueProvider};
use parking_lot::Mutex;

// ============================================================================
// DESCRIPTOR FACTORIES
// ============================================================================

#[test]
fn test_factories_follow_field_types() {
    let harness = TestHarness::with_orders();
    let fields = harness.provider.field_descriptions().unwrap();
    let amount = fields.get("amount").unwrap();
    let region = fields.get("region").unwrap();

    assert_eq!(
        harness.provider.aggregate_description_for(amount).function,
        AggregateFunction::Sum
    );
    assert_eq!(
        harness.provider.aggregate_description_for(region).function,
        AggregateFunction::Count
    );

    let sort = harness.provider.sort_description_for(region);
    assert_eq!(sort.property, "region");
    assert_eq!(sort.order, SortOrder::Ascending);
    assert_eq!(harness.provider.group_description_for(region).property, "region");

    let filter = harness.provider.filter_description_for(amount);
    assert_eq!(filter.condition, FilterCondition::ValueList(Vec::new()));
}

#[test]
fn test_aggregate_functions_depend_on_field_type() {
    let harness = TestHarness::with_orders();

    let numeric = AggregateDescriptor::new("amount", AggregateFunction::Sum);
    assert_eq!(
        harness.provider.aggregate_functions_for(&numeric),
        AggregateFunction::ALL.to_vec()
    );

    let text = AggregateDescriptor::new("product", AggregateFunction::Count);
    assert_eq!(
        harness.provider.aggregate_functions_for(&text),
        vec![AggregateFunction::Count]
    );

    let unknown = AggregateDescriptor::new("missing", AggregateFunction::Count);
    assert_eq!(
        harness.provider.aggregate_functions_for(&unknown),
        vec![AggregateFunction::Count]
    );
}

// ============================================================================
// AGGREGATE FUNCTION
// ============================================================================

#[test]
fn test_set_aggregate_function_rebuilds() {
    let harness = TestHarness::with_orders();
    harness.provider.update_settings(|s| {
        s.aggregates_mut()
            .push(AggregateDescriptor::new("amount", AggregateFunction::Sum))
    });
    harness.events.clear();
    harness.engine.clear_calls();

    harness
        .provider
        .set_aggregate_function(0, AggregateFunction::Average)
        .unwrap();

    assert_eq!(harness.events.layouts(), vec![SettingsChange::Aggregates]);
    assert_eq!(harness.engine.rebuild_count(), 1);
    let snapshot = harness.provider.value_provider().unwrap();
    assert_eq!(
        snapshot.aggregate_descriptors()[0].function,
        AggregateFunction::Average
    );
}

#[test]
fn test_set_aggregate_function_out_of_range() {
    let harness = TestHarness::with_orders();

    let result = harness.provider.set_aggregate_function(3, AggregateFunction::Max);

    assert_eq!(result, Err(DataError::IndexOutOfRange { index: 3, len: 0 }));
    assert!(harness.events.layouts().is_empty());
    assert_eq!(harness.engine.rebuild_count(), 0);
}

#[test]
fn test_snapshot_aggregates_read_bound_members() {
    let harness = TestHarness::with_orders();
    harness.provider.update_settings(|s| {
        s.aggregates_mut()
            .push(AggregateDescriptor::new("amount", AggregateFunction::Max).with_format("#,##0"))
    });
    let snapshot = harness.provider.value_provider().unwrap();

    let mut max = snapshot.create_aggregate(0).unwrap();
    for item in snapshot.items() {
        max.accumulate(&snapshot.aggregate_value(0, item.as_ref()));
    }

    assert_eq!(max.result(), data_model::Value::number(12.0));
    assert_eq!(snapshot.aggregate_format(0), Some("#,##0"));
}

// ============================================================================
// LAYOUT EVENTS
// ============================================================================

#[test]
fn test_each_registry_mutation_is_republished() {
    let harness = TestHarness::with_orders();
    harness.provider.update_settings(|s| {
        s.aggregates_mut()
            .push(AggregateDescriptor::new("amount", AggregateFunction::Sum));
        s.set_aggregates_level(Some(0));
        s.set_aggregates_level(Some(0));
    });

    assert_eq!(
        harness.events.layouts(),
        vec![SettingsChange::Aggregates, SettingsChange::AggregatesLevel]
    );
    // One refresh for the whole batch.
    assert_eq!(harness.engine.rebuild_count(), 1);
}

#[test]
fn test_read_only_access_raises_nothing() {
    let harness = TestHarness::with_orders();
    let count = harness.provider.settings(|s| s.sorts().len());

    assert_eq!(count, 0);
    assert!(harness.events.layouts().is_empty());
    assert_eq!(harness.engine.rebuild_count(), 0);
}

#[test]
fn test_removed_listener_stops_receiving() {
    let harness = TestHarness::with_orders();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let id = harness.provider.on_layout_changed(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    harness
        .provider
        .update_settings(|s| s.set_aggregates_level(Some(1)));
    assert!(harness.provider.remove_listener(id));
    harness
        .provider
        .update_settings(|s| s.set_aggregates_level(Some(2)));

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!harness.provider.remove_listener(id));
}

#[test]
fn test_registry_listener_may_read_the_provider() {
    let harness = Arc::new(TestHarness::with_orders());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let weak = Arc::downgrade(&harness);
    let sink = seen.clone();
    harness.provider.settings(|s| {
        s.notifier().on_layout_changed(move |change| {
            if let Some(harness) = weak.upgrade() {
                let sorts = harness.provider.settings(|s| s.sorts().len());
                sink.lock().push((*change, sorts, harness.provider.status()));
            }
        })
    });

    harness
        .provider
        .update_settings(|s| s.sorts_mut().push(SortDescriptor::new("amount", SortOrder::Ascending)));

    assert_eq!(
        *seen.lock(),
        vec![(SettingsChange::Sorts, 1, DataProviderStatus::Ready)]
    );
    assert_eq!(harness.rows(), vec![2, 3, 1, 4]);
}
