// crates/fssync-core/tests/proptest_reconcile.rs
// ============================================================================
// Module: Reconciliation Property-Based Tests
// Description: Property tests for history contiguity and rerun idempotence.
// Purpose: Detect version drift across arbitrary sequences of source states.
// ============================================================================

//! Property-based tests for reconciliation invariants.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;

use fssync_core::AttributeValue;
use fssync_core::EntityLayout;
use fssync_core::EntityType;
use fssync_core::FeatureRecord;
use fssync_core::FieldKind;
use fssync_core::FieldSpec;
use fssync_core::InMemoryFeatureSource;
use fssync_core::InMemorySyncStore;
use fssync_core::Reconciler;
use fssync_core::ReconcilerConfig;
use fssync_core::RunOptions;
use fssync_core::SyncStore;
use fssync_core::TableNaming;
use fssync_core::WriteRow;
use fssync_core::runtime::audit_store;
use fssync_core::runtime::has_changed;
use proptest::prelude::*;

fn fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new("OBJECTID", FieldKind::Integer),
        FieldSpec::new("Name", FieldKind::Text),
        FieldSpec::new("Depth", FieldKind::Float),
    ]
}

fn records(generation: &[(String, f64)]) -> Vec<FeatureRecord> {
    generation
        .iter()
        .zip(1_i64..)
        .map(|((name, depth), object_id)| FeatureRecord {
            object_id,
            external_id: None,
            attributes: BTreeMap::from([
                ("OBJECTID".to_string(), AttributeValue::Int(object_id)),
                ("Name".to_string(), AttributeValue::from(name.as_str())),
                ("Depth".to_string(), AttributeValue::Float(*depth)),
            ]),
            geometry: None,
        })
        .collect()
}

fn generation_strategy() -> impl Strategy<Value = Vec<(String, f64)>> {
    prop::collection::vec(("[a-c]{0,2}", prop_oneof![Just(0.5), Just(1.25), -1.0e6 .. 1.0e6]), 3)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn history_stays_contiguous_and_reruns_are_noops(
        generations in prop::collection::vec(generation_strategy(), 1 .. 5),
        page_size in 1_usize .. 4,
    ) {
        let entity = EntityType::new("Prop");
        let store = InMemorySyncStore::new();
        let source = InMemoryFeatureSource::new(page_size);
        let mut expected_versions: BTreeMap<i64, i64> = BTreeMap::new();
        let mut previous: Option<&Vec<(String, f64)>> = None;

        for generation in &generations {
            source.set_layer(&entity, fields(), "OBJECTID", records(generation)).unwrap();
            let reconciler = Reconciler::new(&source, &store, ReconcilerConfig::default());
            let result = reconciler.run(&entity, &RunOptions::default()).unwrap();
            for (index, object_id) in (0..generation.len()).zip(1_i64..) {
                let changed = previous.is_none_or(|before| before[index] != generation[index]);
                if changed {
                    *expected_versions.entry(object_id).or_insert(0) += 1;
                }
            }
            prop_assert_eq!(result.skipped, 0);
            let rerun = reconciler.run(&entity, &RunOptions::default()).unwrap();
            prop_assert!(rerun.is_noop());
            previous = Some(generation);
        }

        let layout =
            EntityLayout::from_fields(&entity, &TableNaming::default(), "OBJECTID", &fields())
                .unwrap();
        prop_assert!(audit_store(&store, &layout).unwrap().is_clean());
        let mut found: BTreeMap<i64, i64> = BTreeMap::new();
        for row in store.history_rows(&layout).unwrap() {
            *found.entry(row.object_id).or_insert(0) += 1;
        }
        prop_assert_eq!(found, expected_versions);
    }

    #[test]
    fn stored_numbers_compare_unchanged(value in any::<f64>(), count in any::<i64>()) {
        prop_assume!(value.is_finite());
        let layout = EntityLayout::from_fields(
            &EntityType::new("Prop"),
            &TableNaming::default(),
            "OBJECTID",
            &[
                FieldSpec::new("OBJECTID", FieldKind::Integer),
                FieldSpec::new("Depth", FieldKind::Float),
                FieldSpec::new("Count", FieldKind::Integer),
            ],
        )
        .unwrap();
        let record = FeatureRecord {
            object_id: 1,
            external_id: None,
            attributes: BTreeMap::from([
                ("Depth".to_string(), AttributeValue::Float(value)),
                ("Count".to_string(), AttributeValue::Int(count)),
            ]),
            geometry: None,
        };
        let row = WriteRow::bind(&layout, &record, 0).unwrap();
        prop_assert!(!has_changed(&row.to_text_row(&layout), &record).unwrap());
    }
}
