//! End-to-end engine tests against a file-backed SQLite database

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::*;
use pin_migration::{
    Adapter, Dialect, MigrationError, MigrationResult, MigrationStatus, Registry,
    ReversibleMigration, RollbackTarget, Row, Schema, SqliteAdapter, StatusFormat, Version,
};

#[tokio::test]
async fn test_migrate_status_and_partial_rollback() {
    let project = Project::new();
    project
        .migration("20200101000000_create_things_table.sql", CREATE_THINGS)
        .migration("20200102000000_add_column_to_things.sql", ADD_COLUMN);

    let mut manager = project.manager();
    let applied = manager.migrate(ENV, None, false).await.unwrap();
    assert_eq!(applied, vec![v(20200101000000), v(20200102000000)]);

    let report = manager.status(ENV).await.unwrap();
    let rows: Vec<_> = report
        .migrations
        .iter()
        .map(|m| (m.status, m.version))
        .collect();
    assert_eq!(
        rows,
        vec![
            (MigrationStatus::Up, v(20200101000000)),
            (MigrationStatus::Up, v(20200102000000)),
        ]
    );
    assert_eq!(report.migrations[0].name.as_deref(), Some("CreateThingsTable"));

    let mut db = project.inspect().await;
    assert!(has_column(&mut db, "t", "c").await);

    let report = manager
        .rollback(ENV, RollbackTarget::Version(v(20200101000000)), false, true, false)
        .await
        .unwrap();
    assert_eq!(report.reverted, vec![v(20200102000000)]);
    assert_eq!(report.halted_at, None);

    let report = manager.status(ENV).await.unwrap();
    assert_eq!(report.migrations[0].status, MigrationStatus::Up);
    assert_eq!(report.migrations[1].status, MigrationStatus::Down);
    assert!(has_table(&mut db, "t").await);
    assert!(!has_column(&mut db, "t", "c").await);

    assert!(project.output.contains(" == 20200102000000 AddColumnToThings: reverting"));
    assert!(project.output.contains(" == 20200101000000 CreateThingsTable: migrated"));
}

#[tokio::test]
async fn test_reset_empties_version_log() {
    let project = Project::new();
    project
        .migration("20200101000000_create_things_table.sql", CREATE_THINGS)
        .migration("20200102000000_add_column_to_things.sql", ADD_COLUMN)
        .migration("20200103000000_create_others.sql", &create_table("others"));

    let mut manager = project.manager();
    manager.migrate(ENV, None, false).await.unwrap();

    let report = manager.reset(ENV, false, false).await.unwrap();
    assert_eq!(
        report.reverted,
        vec![v(20200103000000), v(20200102000000), v(20200101000000)]
    );

    let status = manager.status(ENV).await.unwrap();
    assert!(status
        .migrations
        .iter()
        .all(|m| m.status == MigrationStatus::Down));

    let mut db = project.inspect().await;
    assert_eq!(count_rows(&mut db, "migrations").await, 0);
    assert!(!has_table(&mut db, "t").await);
    assert!(!has_table(&mut db, "others").await);

    // nothing left to undo
    let report = manager.reset(ENV, false, false).await.unwrap();
    assert!(report.reverted.is_empty());
    assert!(project.output.contains("No migrations to rollback"));
}

#[tokio::test]
async fn test_previous_rollback_undoes_last_migration() {
    let project = Project::new();
    project
        .migration("20200101000000_create_things_table.sql", CREATE_THINGS)
        .migration("20200102000000_add_column_to_things.sql", ADD_COLUMN);

    let mut manager = project.manager();
    manager.migrate(ENV, None, false).await.unwrap();

    let report = manager
        .rollback(ENV, RollbackTarget::Previous, false, true, false)
        .await
        .unwrap();
    assert_eq!(report.reverted, vec![v(20200102000000)]);

    let report = manager
        .rollback(ENV, RollbackTarget::Previous, false, true, false)
        .await
        .unwrap();
    assert_eq!(report.reverted, vec![v(20200101000000)]);
}

#[tokio::test]
async fn test_rollback_by_name() {
    let project = Project::new();
    project
        .migration("20200101000000_create_things_table.sql", CREATE_THINGS)
        .migration("20200102000000_add_column_to_things.sql", ADD_COLUMN)
        .migration("20200103000000_create_others.sql", &create_table("others"));

    let mut manager = project.manager();
    manager.migrate(ENV, None, false).await.unwrap();

    let report = manager
        .rollback(
            ENV,
            RollbackTarget::Name("CreateThingsTable".to_string()),
            false,
            true,
            false,
        )
        .await
        .unwrap();
    assert_eq!(report.reverted, vec![v(20200103000000), v(20200102000000)]);

    let err = manager
        .rollback(ENV, RollbackTarget::Name("Nope".to_string()), false, true, false)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::UnknownTarget { .. }));
}

#[tokio::test]
async fn test_rollback_to_unknown_version_fails_before_changes() {
    let project = Project::new();
    project
        .migration("20200101000000_create_things_table.sql", CREATE_THINGS)
        .migration("20200102000000_add_column_to_things.sql", ADD_COLUMN);

    let mut manager = project.manager();
    manager.migrate(ENV, None, false).await.unwrap();

    let err = manager
        .rollback(ENV, RollbackTarget::Version(v(20200101120000)), false, true, false)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::UnknownTarget { .. }));
    assert_eq!(manager.status(ENV).await.unwrap().pending_count, 0);
}

#[tokio::test]
async fn test_rollback_to_pending_version_keeps_older_migrations() {
    let project = Project::new();
    project
        .migration("20200101000000_create_alpha.sql", &create_table("alpha"))
        .migration("20200103000000_create_gamma.sql", &create_table("gamma"));
    project.manager().migrate(ENV, None, false).await.unwrap();

    project.migration("20200102000000_create_beta.sql", &create_table("beta"));
    let mut manager = project.manager();
    let report = manager
        .rollback(ENV, RollbackTarget::Version(v(20200102000000)), false, true, false)
        .await
        .unwrap();
    assert_eq!(report.reverted, vec![v(20200103000000)]);

    let status = manager.status(ENV).await.unwrap();
    let rows: Vec<_> = status
        .migrations
        .iter()
        .map(|m| (m.version, m.status))
        .collect();
    assert_eq!(
        rows,
        vec![
            (v(20200101000000), MigrationStatus::Up),
            (v(20200102000000), MigrationStatus::Down),
            (v(20200103000000), MigrationStatus::Down),
        ]
    );

    let mut db = project.inspect().await;
    assert!(has_table(&mut db, "alpha").await);
    assert!(!has_table(&mut db, "gamma").await);
}

#[tokio::test]
async fn test_breakpoint_stops_rollback() {
    let project = Project::new();
    project
        .migration("20200101000000_create_alpha.sql", &create_table("alpha"))
        .migration("20200102000000_create_beta.sql", &create_table("beta"))
        .migration("20200103000000_create_gamma.sql", &create_table("gamma"));

    let mut manager = project.manager();
    manager.migrate(ENV, None, false).await.unwrap();

    let state = manager
        .set_breakpoint(ENV, Some(v(20200102000000)))
        .await
        .unwrap();
    assert!(state);
    assert!(project
        .output
        .contains(" Breakpoint set for 20200102000000 CreateBeta"));

    let report = manager
        .rollback(ENV, RollbackTarget::All, false, true, false)
        .await
        .unwrap();
    assert_eq!(report.reverted, vec![v(20200103000000)]);
    assert_eq!(report.halted_at, Some(v(20200102000000)));
    assert_eq!(report.skipped, 2);
    assert!(project
        .output
        .contains("Breakpoint reached. Further rollbacks inhibited."));

    let status = manager.status(ENV).await.unwrap();
    let up: Vec<_> = status
        .migrations
        .iter()
        .filter(|m| m.status == MigrationStatus::Up)
        .map(|m| m.version)
        .collect();
    assert_eq!(up, vec![v(20200101000000), v(20200102000000)]);
    assert!(status.migrations[1].breakpoint);

    let report = manager
        .rollback(ENV, RollbackTarget::All, true, true, false)
        .await
        .unwrap();
    assert_eq!(report.reverted, vec![v(20200102000000), v(20200101000000)]);
}

#[tokio::test]
async fn test_breakpoint_toggle_and_remove() {
    let project = Project::new();
    project
        .migration("20200101000000_create_alpha.sql", &create_table("alpha"))
        .migration("20200102000000_create_beta.sql", &create_table("beta"));

    let mut manager = project.manager();
    manager.migrate(ENV, None, false).await.unwrap();

    assert!(manager.toggle_breakpoint(ENV, None).await.unwrap());
    assert!(!manager.toggle_breakpoint(ENV, None).await.unwrap());
    assert!(manager
        .toggle_breakpoint(ENV, Some(v(20200101000000)))
        .await
        .unwrap());
    assert!(manager.set_breakpoint(ENV, None).await.unwrap());
    assert!(!manager
        .unset_breakpoint(ENV, Some(v(20200101000000)))
        .await
        .unwrap());
    manager
        .set_breakpoint(ENV, Some(v(20200101000000)))
        .await
        .unwrap();

    assert_eq!(manager.remove_breakpoints(ENV).await.unwrap(), 2);
    assert!(project.output.contains(" 2 breakpoints cleared."));
    let status = manager.status(ENV).await.unwrap();
    assert!(status.migrations.iter().all(|m| !m.breakpoint));

    let err = manager
        .toggle_breakpoint(ENV, Some(v(20990101000000)))
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::UnknownTarget { .. }));
}

#[tokio::test]
async fn test_fake_run_only_touches_bookkeeping() {
    let project = Project::new();
    project
        .migration("20200101000000_create_things_table.sql", CREATE_THINGS)
        .migration("20200102000000_add_column_to_things.sql", ADD_COLUMN);

    let mut manager = project.manager();
    let applied = manager.migrate(ENV, None, true).await.unwrap();
    assert_eq!(applied.len(), 2);

    let mut db = project.inspect().await;
    assert!(!has_table(&mut db, "t").await);
    assert_eq!(count_rows(&mut db, "migrations").await, 2);

    let report = manager
        .rollback(ENV, RollbackTarget::All, false, true, true)
        .await
        .unwrap();
    assert_eq!(report.reverted.len(), 2);
    assert_eq!(count_rows(&mut db, "migrations").await, 0);
}

#[tokio::test]
async fn test_dry_run_prints_sql_without_executing() {
    let project = Project::new();
    project.migration("20200101000000_create_things_table.sql", CREATE_THINGS);

    let mut manager = project.manager().dry_run(true);
    let applied = manager.migrate(ENV, None, false).await.unwrap();
    assert_eq!(applied, vec![v(20200101000000)]);

    let lines = project.output.lines();
    assert!(lines.iter().any(|l| l.starts_with("CREATE TABLE \"migrations\"")));
    assert!(lines.iter().any(|l| l.contains("CREATE TABLE t")));
    assert!(lines
        .iter()
        .any(|l| l.starts_with("INSERT INTO \"migrations\"") && l.contains("20200101000000")));

    let mut db = project.inspect().await;
    assert!(!has_table(&mut db, "migrations").await);
    assert!(!has_table(&mut db, "t").await);
}

#[tokio::test]
async fn test_fake_rollback_skips_the_migration_body() {
    let project = Project::new();
    project.migration(
        "20200101000000_create_alpha.sql",
        "-- up\nCREATE TABLE alpha (id INTEGER);\n",
    );

    let mut manager = project.manager();
    manager.migrate(ENV, None, false).await.unwrap();

    // the file has no down section, which only matters when it runs
    let report = manager
        .rollback(ENV, RollbackTarget::All, false, true, true)
        .await
        .unwrap();
    assert_eq!(report.reverted, vec![v(20200101000000)]);

    let mut db = project.inspect().await;
    assert_eq!(count_rows(&mut db, "migrations").await, 0);
    assert!(has_table(&mut db, "alpha").await);
}

#[tokio::test]
async fn test_dry_run_rollback_leaves_version_log() {
    let project = Project::new();
    project
        .migration("20200101000000_create_alpha.sql", &create_table("alpha"))
        .migration("20200102000000_create_beta.sql", &create_table("beta"));
    project.manager().migrate(ENV, None, false).await.unwrap();
    project.output.clear();

    let mut manager = project.manager().dry_run(true);
    let report = manager
        .rollback(ENV, RollbackTarget::Previous, false, true, false)
        .await
        .unwrap();
    assert_eq!(report.reverted, vec![v(20200102000000)]);
    assert!(project
        .output
        .contains("DELETE FROM \"migrations\" WHERE version = 20200102000000"));

    let mut db = project.inspect().await;
    assert_eq!(count_rows(&mut db, "migrations").await, 2);
    assert!(has_table(&mut db, "beta").await);
}

#[tokio::test]
async fn test_dry_run_breakpoints_leave_version_log() {
    let project = Project::new();
    project
        .migration("20200101000000_create_alpha.sql", &create_table("alpha"))
        .migration("20200102000000_create_beta.sql", &create_table("beta"));
    let mut manager = project.manager();
    manager.migrate(ENV, None, false).await.unwrap();
    manager
        .set_breakpoint(ENV, Some(v(20200101000000)))
        .await
        .unwrap();
    project.output.clear();

    let mut dry = project.manager().dry_run(true);
    assert!(dry.toggle_breakpoint(ENV, None).await.unwrap());
    assert!(project
        .output
        .contains("UPDATE \"migrations\" SET breakpoint = NOT breakpoint WHERE version = 20200102000000"));
    assert_eq!(dry.remove_breakpoints(ENV).await.unwrap(), 1);
    assert!(project
        .output
        .contains("UPDATE \"migrations\" SET breakpoint = FALSE WHERE breakpoint = TRUE"));

    let status = project.manager().status(ENV).await.unwrap();
    let breakpoints: Vec<_> = status
        .migrations
        .iter()
        .map(|m| (m.version, m.breakpoint))
        .collect();
    assert_eq!(
        breakpoints,
        vec![(v(20200101000000), true), (v(20200102000000), false)]
    );
}

#[tokio::test]
async fn test_failure_keeps_earlier_steps_and_rolls_back_the_failed_one() {
    let project = Project::new();
    project
        .migration("20200101000000_create_alpha.sql", &create_table("alpha"))
        .migration(
            "20200102000000_create_partial.sql",
            "-- up\n\
             CREATE TABLE partial (id INTEGER);\n\
             INSERT INTO nowhere (id) VALUES (1);\n\
             -- down\n\
             DROP TABLE partial;\n",
        )
        .migration("20200103000000_create_gamma.sql", &create_table("gamma"));

    let mut manager = project.manager();
    let err = manager.migrate(ENV, None, false).await.unwrap_err();
    match &err {
        MigrationError::Execution {
            version, direction, ..
        } => {
            assert_eq!(*version, v(20200102000000));
            assert_eq!(direction.to_string(), "migrating");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.version(), Some(v(20200102000000)));

    let status = manager.status(ENV).await.unwrap();
    let states: Vec<_> = status.migrations.iter().map(|m| m.status).collect();
    assert_eq!(
        states,
        vec![
            MigrationStatus::Up,
            MigrationStatus::Down,
            MigrationStatus::Down
        ]
    );

    let mut db = project.inspect().await;
    assert!(has_table(&mut db, "alpha").await);
    assert!(!has_table(&mut db, "partial").await);
    assert!(!has_table(&mut db, "gamma").await);
}

#[tokio::test]
async fn test_irreversible_rollback_keeps_earlier_reverts() {
    let project = Project::new();
    project
        .migration(
            "20200101000000_create_alpha.sql",
            "-- up\nCREATE TABLE alpha (id INTEGER);\n",
        )
        .migration("20200102000000_create_beta.sql", &create_table("beta"));

    let mut manager = project.manager();
    manager.migrate(ENV, None, false).await.unwrap();

    let err = manager
        .rollback(ENV, RollbackTarget::All, false, true, false)
        .await
        .unwrap_err();
    match err {
        MigrationError::Irreversible { version, .. } => assert_eq!(version, v(20200101000000)),
        other => panic!("unexpected error {:?}", other),
    }

    let status = manager.status(ENV).await.unwrap();
    assert_eq!(status.migrations[0].version, v(20200101000000));
    assert_eq!(status.migrations[0].status, MigrationStatus::Up);
    assert_eq!(status.migrations[1].status, MigrationStatus::Down);

    let mut db = project.inspect().await;
    assert!(has_table(&mut db, "alpha").await);
    assert!(!has_table(&mut db, "beta").await);
}

#[tokio::test]
async fn test_missing_migrations_are_reported_and_skipped() {
    let project = Project::new();
    project
        .migration("20200101000000_create_alpha.sql", &create_table("alpha"))
        .migration("20200102000000_create_beta.sql", &create_table("beta"));
    project.manager().migrate(ENV, None, false).await.unwrap();

    project.remove_migration("20200101000000_create_alpha.sql");
    let mut manager = project.manager();

    let report = manager.print_status(ENV, StatusFormat::Text).await.unwrap();
    assert_eq!(report.missing_count, 1);
    assert_eq!(report.migrations[0].status, MigrationStatus::Missing);
    assert_eq!(report.migrations[0].name.as_deref(), Some("CreateAlpha"));
    assert!(project.output.contains("** MISSING MIGRATION FILE **"));

    let report = manager
        .rollback(ENV, RollbackTarget::All, false, true, false)
        .await
        .unwrap();
    assert_eq!(report.reverted, vec![v(20200102000000)]);

    let report = manager.status(ENV).await.unwrap();
    assert_eq!(report.missing_count, 1);
    assert_eq!(report.pending_count, 1);
}

#[tokio::test]
async fn test_execution_order_mode() {
    let project = Project::new().with_settings("version_order: execution");
    project
        .migration("20200101000000_create_alpha.sql", &create_table("alpha"))
        .migration("20200102000000_create_beta.sql", &create_table("beta"))
        .migration("20200103000000_create_gamma.sql", &create_table("gamma"));

    let mut manager = project.manager();
    manager.migrate(ENV, None, false).await.unwrap();

    let mut db = project.inspect().await;
    db.execute("UPDATE migrations SET start_time = '2020-06-01 00:00:00'")
        .await
        .unwrap();
    db.execute(
        "UPDATE migrations SET start_time = '2030-01-01 00:00:00' WHERE version = 20200102000000",
    )
    .await
    .unwrap();

    let order: Vec<_> = manager
        .status(ENV)
        .await
        .unwrap()
        .migrations
        .iter()
        .map(|m| m.version)
        .collect();
    assert_eq!(
        order,
        vec![v(20200101000000), v(20200103000000), v(20200102000000)]
    );

    // last executed, not highest version
    let report = manager
        .rollback(ENV, RollbackTarget::Previous, false, true, false)
        .await
        .unwrap();
    assert_eq!(report.reverted, vec![v(20200102000000)]);

    manager.migrate(ENV, None, false).await.unwrap();
    db.execute(
        "UPDATE migrations SET start_time = '2030-01-01 00:00:00' WHERE version = 20200101000000",
    )
    .await
    .unwrap();

    // date targets compare start times in this mode
    let target = Version::from_date_argument("2029").unwrap();
    let report = manager
        .rollback(ENV, RollbackTarget::Version(target), false, false, false)
        .await
        .unwrap();
    assert_eq!(report.reverted, vec![v(20200101000000)]);
    assert!(has_table(&mut db, "beta").await);
    assert!(!has_table(&mut db, "alpha").await);
}

#[tokio::test]
async fn test_out_of_order_versions() {
    let project = Project::new();
    project
        .migration("20200101000000_create_alpha.sql", &create_table("alpha"))
        .migration("20200103000000_create_gamma.sql", &create_table("gamma"));
    project.manager().migrate(ENV, None, false).await.unwrap();
    project.migration("20200102000000_create_beta.sql", &create_table("beta"));

    let mut manager = project.manager();
    let applied = manager.migrate(ENV, None, false).await.unwrap();
    assert_eq!(applied, vec![v(20200102000000)]);
}

#[tokio::test]
async fn test_out_of_order_versions_can_be_refused() {
    let project = Project::new().with_settings("allow_out_of_order: false");
    project
        .migration("20200101000000_create_alpha.sql", &create_table("alpha"))
        .migration("20200103000000_create_gamma.sql", &create_table("gamma"));
    project.manager().migrate(ENV, None, false).await.unwrap();
    project.migration("20200102000000_create_beta.sql", &create_table("beta"));

    let mut manager = project.manager();
    let applied = manager.migrate(ENV, None, false).await.unwrap();
    assert!(applied.is_empty());
    assert!(project.output.contains("20200102000000 CreateBeta skipped"));
    assert_eq!(manager.status(ENV).await.unwrap().pending_count, 1);
}

#[tokio::test]
async fn test_migrate_targets() {
    let project = Project::new();
    project
        .migration("20200101000000_create_alpha.sql", &create_table("alpha"))
        .migration("20200201000000_create_beta.sql", &create_table("beta"))
        .migration("20200301000000_create_gamma.sql", &create_table("gamma"));

    let mut manager = project.manager();
    let err = manager
        .migrate(ENV, Some(v(20200115000000)), false)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::UnknownTarget { .. }));

    let datetime = Version::from_date_argument("20200215")
        .unwrap()
        .to_datetime()
        .unwrap();
    let applied = manager
        .migrate_to_datetime(ENV, datetime, false)
        .await
        .unwrap();
    assert_eq!(applied, vec![v(20200101000000), v(20200201000000)]);

    let early = Version::from_date_argument("2019").unwrap().to_datetime().unwrap();
    assert!(manager
        .migrate_to_datetime(ENV, early, false)
        .await
        .unwrap()
        .is_empty());

    // migrate never goes down
    let applied = manager
        .migrate(ENV, Some(v(20200101000000)), false)
        .await
        .unwrap();
    assert!(applied.is_empty());
    assert_eq!(manager.status(ENV).await.unwrap().pending_count, 1);

    let applied = manager.migrate(ENV, None, false).await.unwrap();
    assert_eq!(applied, vec![v(20200301000000)]);
    assert!(manager.migrate(ENV, None, false).await.unwrap().is_empty());
    assert!(project.output.contains("No migrations to run"));
}

#[tokio::test]
async fn test_refresh_reapplies_everything() {
    let project = Project::new();
    project
        .migration("20200101000000_create_things_table.sql", CREATE_THINGS)
        .migration("20200102000000_add_column_to_things.sql", ADD_COLUMN);

    let mut manager = project.manager();
    manager.migrate(ENV, None, false).await.unwrap();

    let mut db = project.inspect().await;
    db.execute("INSERT INTO t (id, c) VALUES (1, 'x')").await.unwrap();

    let (report, migrated) = manager.refresh(ENV, false, false).await.unwrap();
    assert_eq!(report.reverted.len(), 2);
    assert_eq!(migrated.len(), 2);
    assert_eq!(count_rows(&mut db, "t").await, 0);
}

struct CreateAccounts;

impl ReversibleMigration for CreateAccounts {
    fn change(&self, schema: &mut Schema) -> MigrationResult<()> {
        schema.create_table("accounts", |table| {
            table.id("id");
            table.string("email", Some(255)).not_null().unique();
            table.boolean("active").default_value(true);
            table.timestamps();
            table.index(&["active"]);
        });
        schema.insert(
            "accounts",
            serde_json::json!({"email": "admin@example.com"}),
        )?;
        Ok(())
    }
}

struct CreateSessions;

impl ReversibleMigration for CreateSessions {
    fn change(&self, schema: &mut Schema) -> MigrationResult<()> {
        schema.create_table("sessions", |table| {
            table.id("id");
            table.integer("account_id").not_null();
            table.foreign_key("account_id", "accounts", "id");
        });
        Ok(())
    }
}

#[tokio::test]
async fn test_registered_code_migrations_with_table_prefix() {
    let project = Project::new().with_profile("table_prefix: app_");
    project.migration("20200103000000_create_things_table.sql", CREATE_THINGS);

    let registry = Registry::new()
        .reversible("20200101000000_create_accounts", || CreateAccounts)
        .reversible("20200102000000_create_sessions", || CreateSessions);
    let mut manager = project.manager_with(registry);

    let applied = manager.migrate(ENV, None, false).await.unwrap();
    assert_eq!(applied.len(), 3);

    let mut db = project.inspect().await;
    assert!(has_table(&mut db, "app_accounts").await);
    assert!(has_table(&mut db, "app_sessions").await);
    assert!(has_table(&mut db, "migrations").await);
    assert_eq!(count_rows(&mut db, "app_accounts").await, 1);

    // inserts have no inverse, so the accounts migration cannot be undone
    let err = manager
        .rollback(ENV, RollbackTarget::All, false, true, false)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::Irreversible { version, .. } if version == v(20200101000000)));
    assert!(!has_table(&mut db, "app_sessions").await);
    assert!(!has_table(&mut db, "t").await);
    assert!(has_table(&mut db, "app_accounts").await);
}

#[tokio::test]
async fn test_seeds_run_in_dependency_order() {
    let project = Project::new();
    project.migration(
        "20200101000000_create_people.sql",
        "-- up\n\
         CREATE TABLE roles (name TEXT);\n\
         CREATE TABLE people (name TEXT, role TEXT);\n\
         -- down\n\
         DROP TABLE people;\n\
         DROP TABLE roles;\n",
    );
    project
        .seed(
            "PeopleSeeder.sql",
            "-- depends: RoleSeeder\n\
             INSERT INTO people (name, role) SELECT 'ada', name FROM roles;\n",
        )
        .seed(
            "RoleSeeder.sql",
            "INSERT INTO roles (name) VALUES ('admin');\n",
        );

    let mut manager = project.manager();
    manager.migrate(ENV, None, false).await.unwrap();

    let executed = manager.seed_all(ENV).await.unwrap();
    assert_eq!(executed, vec!["RoleSeeder", "PeopleSeeder"]);

    let mut db = project.inspect().await;
    assert_eq!(count_rows(&mut db, "people").await, 1);

    // seeds are not tracked, running one again is allowed
    let executed = manager.seed(ENV, Some("RoleSeeder")).await.unwrap();
    assert_eq!(executed, vec!["RoleSeeder"]);
    assert_eq!(count_rows(&mut db, "roles").await, 2);
    assert_eq!(count_rows(&mut db, "migrations").await, 1);

    let err = manager.seed(ENV, Some("MissingSeeder")).await.unwrap_err();
    assert!(matches!(err, MigrationError::UnknownSeed { .. }));
}

#[tokio::test]
async fn test_bootstrap_runs_before_tracking_table() {
    let project = Project::new();
    project.file(
        "bootstrap.sql",
        "CREATE TABLE IF NOT EXISTS settings (key TEXT);",
    );
    let project = project.with_settings("bootstrap: bootstrap.sql");
    project.migration("20200101000000_create_alpha.sql", &create_table("alpha"));

    let mut manager = project.manager();
    manager.migrate(ENV, None, false).await.unwrap();

    let mut db = project.inspect().await;
    assert!(has_table(&mut db, "settings").await);

    let project = Project::new().with_settings("bootstrap: missing.sql");
    let err = project.manager().status(ENV).await.unwrap_err();
    assert!(matches!(err, MigrationError::Configuration { .. }));
}

#[tokio::test]
async fn test_verify_checks_paths_and_connection() {
    let project = Project::new();
    project.migration("20200101000000_create_alpha.sql", &create_table("alpha"));

    let mut manager = project.manager();
    manager.verify(Some(ENV)).await.unwrap();
    assert!(project.output.contains("success!"));

    let err = manager.verify(Some("staging")).await.unwrap_err();
    assert!(matches!(err, MigrationError::Configuration { .. }));

    std::fs::remove_dir(project.dir.path().join("seeds")).unwrap();
    let err = project.manager().verify(None).await.unwrap_err();
    assert!(err.to_string().contains("Seed directory"));
}

/// Delegates to SQLite but claims DDL cannot run inside a transaction
struct NonTransactional(SqliteAdapter);

#[async_trait]
impl Adapter for NonTransactional {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn has_transactions(&self) -> bool {
        false
    }

    async fn execute(&mut self, sql: &str) -> MigrationResult<u64> {
        self.0.execute(sql).await
    }

    async fn query(&mut self, sql: &str) -> MigrationResult<Vec<Row>> {
        self.0.query(sql).await
    }

    async fn disconnect(self: Box<Self>) -> MigrationResult<()> {
        let NonTransactional(inner) = *self;
        Box::new(inner).disconnect().await
    }
}

#[tokio::test]
async fn test_non_transactional_failure_leaves_partial_changes() {
    let project = Project::new();
    project.migration(
        "20200101000000_create_partial.sql",
        "-- up\n\
         CREATE TABLE partial (id INTEGER);\n\
         INSERT INTO nowhere (id) VALUES (1);\n\
         -- down\n\
         DROP TABLE partial;\n",
    );

    let adapter = NonTransactional(project.inspect().await);
    let mut manager = project.manager().attach(ENV, Box::new(adapter));
    let err = manager.migrate(ENV, None, false).await.unwrap_err();
    assert!(matches!(err, MigrationError::Execution { .. }));

    let mut db = project.inspect().await;
    assert!(has_table(&mut db, "partial").await);
    assert_eq!(count_rows(&mut db, "migrations").await, 0);

    manager.close().await.unwrap();
}

#[tokio::test]
async fn test_json_status_output() {
    let project = Project::new();
    project
        .migration("20200101000000_create_alpha.sql", &create_table("alpha"))
        .migration("20200102000000_create_beta.sql", &create_table("beta"));

    let mut manager = project.manager();
    manager
        .migrate(ENV, Some(v(20200101000000)), false)
        .await
        .unwrap();
    project.output.clear();

    manager.print_status(ENV, StatusFormat::Json).await.unwrap();
    let json: serde_json::Value = serde_json::from_str(&project.output.lines().join("\n")).unwrap();
    assert_eq!(json["total_count"], 2);
    assert_eq!(json["pending_count"], 1);
    assert_eq!(json["migrations"][0]["name"], "CreateAlpha");
    assert_eq!(json["migrations"][1]["status"], "down");
}

#[tokio::test]
async fn test_manager_uses_attached_in_memory_adapter() {
    let project = Project::new();
    project.migration("20200101000000_create_alpha.sql", &create_table("alpha"));

    let adapter = SqliteAdapter::in_memory().await.unwrap();
    let mut manager = project
        .manager()
        .attach(ENV, Box::new(adapter))
        .with_output(Arc::new(project.output.clone()));
    manager.migrate(ENV, None, false).await.unwrap();

    // the file database was never touched
    let mut db = project.inspect().await;
    assert!(!has_table(&mut db, "alpha").await);
    assert_eq!(manager.status(ENV).await.unwrap().pending_count, 0);
}
