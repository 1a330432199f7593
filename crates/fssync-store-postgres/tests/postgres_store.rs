// crates/fssync-store-postgres/tests/postgres_store.rs
// ============================================================================
// Module: Postgres Store Tests
// Description: Configuration checks plus live-database reconciliation runs.
// Purpose: Validate error handling offline and store semantics when enabled.
// Dependencies: fssync-store-postgres, fssync-core, serde_json
// ============================================================================

//! ## Overview
//! Offline checks run everywhere. Live tests run with `--features postgres-tests`
//! and `FSSYNC_TEST_POSTGRES_URL` pointing at a disposable database; each test
//! uses its own table prefix.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only panic-based assertions are permitted."
)]

use fssync_store_postgres::PostgresStoreConfig;
use fssync_store_postgres::PostgresStoreError;
use fssync_store_postgres::PostgresSyncStore;

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Defaults describe a usable pool.
#[test]
fn postgres_store_default_config_is_valid_shape() {
    let config = PostgresStoreConfig::default();
    assert!(config.connection.starts_with("postgres://"));
    assert!(config.max_connections > 0);
    assert!(config.connect_timeout_ms > 0);
    assert!(config.statement_timeout_ms > 0);
}

/// Malformed connection strings fail before any pool is built.
#[test]
fn postgres_store_invalid_connection_string_fails() {
    let config = PostgresStoreConfig {
        connection: "not-a-url".to_string(),
        max_connections: 1,
        connect_timeout_ms: 1,
        statement_timeout_ms: 1,
    };
    assert!(PostgresSyncStore::new(&config).is_err());
}

/// A zero-sized pool is rejected.
#[test]
fn postgres_store_rejects_empty_pool() {
    let config = PostgresStoreConfig {
        max_connections: 0,
        ..PostgresStoreConfig::default()
    };
    let err = PostgresSyncStore::new(&config).unwrap_err();
    assert!(matches!(err, PostgresStoreError::Invalid(_)));
}

/// Omitted settings take their defaults and unknown keys are refused.
#[test]
fn postgres_store_config_fills_defaults() {
    let config: PostgresStoreConfig =
        serde_json::from_str(r#"{"connection":"postgres://u@h/db"}"#).unwrap();
    assert_eq!(config.max_connections, PostgresStoreConfig::default().max_connections);
    assert!(serde_json::from_str::<PostgresStoreConfig>(r#"{"connection":"x","pool":2}"#).is_err());
}

// ============================================================================
// SECTION: Live Database
// ============================================================================

#[cfg(feature = "postgres-tests")]
mod live {
    use std::collections::BTreeMap;

    use fssync_core::AttributeValue;
    use fssync_core::EntityLayout;
    use fssync_core::EntityType;
    use fssync_core::FeatureRecord;
    use fssync_core::FieldKind;
    use fssync_core::FieldSpec;
    use fssync_core::InMemoryFeatureSource;
    use fssync_core::Reconciler;
    use fssync_core::ReconcilerConfig;
    use fssync_core::RunOptions;
    use fssync_core::StoreError;
    use fssync_core::SyncStore;
    use fssync_core::TableNaming;
    use fssync_core::WriteRow;
    use fssync_core::runtime::audit_store;
    use fssync_store_postgres::PostgresStoreConfig;
    use fssync_store_postgres::PostgresSyncStore;

    fn store() -> Option<PostgresSyncStore> {
        let url = std::env::var("FSSYNC_TEST_POSTGRES_URL").ok()?;
        let config = PostgresStoreConfig {
            connection: url,
            ..PostgresStoreConfig::default()
        };
        Some(PostgresSyncStore::new(&config).expect("postgres store"))
    }

    fn naming(test: &str) -> TableNaming {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.subsec_nanos());
        let tag = format!("t{}_{nanos}_{test}", std::process::id());
        TableNaming {
            current_prefix: format!("{tag}_fs_"),
            history_prefix: format!("{tag}_history_"),
        }
    }

    fn fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("OBJECTID", FieldKind::Integer),
            FieldSpec::new("Name", FieldKind::Text),
            FieldSpec::new("Depth", FieldKind::Float),
        ]
    }

    fn feature(object_id: i64, name: &str, depth: f64) -> FeatureRecord {
        FeatureRecord {
            object_id,
            external_id: None,
            attributes: BTreeMap::from([
                ("OBJECTID".to_string(), AttributeValue::Int(object_id)),
                ("Name".to_string(), AttributeValue::from(name)),
                ("Depth".to_string(), AttributeValue::Float(depth)),
            ]),
            geometry: None,
        }
    }

    /// Inserts, updates, and reruns behave as on any other store.
    #[test]
    fn postgres_reconcile_roundtrip() {
        let Some(store) = store() else {
            return;
        };
        let entity = EntityType::new("Foo");
        let naming = naming("roundtrip");
        let config = ReconcilerConfig {
            naming: naming.clone(),
            ..ReconcilerConfig::default()
        };
        let source = InMemoryFeatureSource::new(1);
        source.set_layer(&entity, fields(), "OBJECTID", vec![feature(1, "Foo", 2.5)]).unwrap();
        let first = Reconciler::new(&source, &store, config.clone())
            .run(&entity, &RunOptions::default())
            .unwrap();
        assert_eq!(first.inserts, 1);

        source
            .set_layer(
                &entity,
                fields(),
                "OBJECTID",
                vec![feature(1, "Foo2", 2.5), feature(2, "Bar", 1.0)],
            )
            .unwrap();
        let second = Reconciler::new(&source, &store, config.clone())
            .run(&entity, &RunOptions::default())
            .unwrap();
        assert_eq!((second.inserts, second.updates), (1, 1));
        let rerun = Reconciler::new(&source, &store, config)
            .run(&entity, &RunOptions::default())
            .unwrap();
        assert!(rerun.is_noop());

        let layout = EntityLayout::from_fields(&entity, &naming, "OBJECTID", &fields()).unwrap();
        assert!(audit_store(&store, &layout).unwrap().is_clean());
    }

    /// The unique key on the current table surfaces as a conflict.
    #[test]
    fn postgres_duplicate_first_insert_is_conflict() {
        let Some(store) = store() else {
            return;
        };
        let entity = EntityType::new("Foo");
        let layout =
            EntityLayout::from_fields(&entity, &naming("conflict"), "OBJECTID", &fields()).unwrap();
        store.ensure_schema(&layout).unwrap();
        let row = WriteRow::bind(&layout, &feature(9, "x", 1.0), 1).unwrap();
        store.insert_new(&layout, &row).unwrap();
        let err = store.insert_new(&layout, &row).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)), "unexpected error: {err:?}");
    }
}
