//! End-to-end migrations against real drivers

use std::sync::Arc;
use warden_index::{JsonDriver, MemoryDriver, RegionDriver, RegionStore};
use warden_migration::{
    DriverMigration, HeightMigration, HeightRange, HeightStrategy, IdentityMigration, Migration,
    MigrationError, StaticResolver, UnresolvedPolicy,
};
use warden_supervisor::{CancelCause, CancelToken};
use warden_types::{BlockPoint, FlagValue, PlayerId, Point2, Region, RegionId, Shape, StateValue};

fn cuboid(id: &str, min_y: i32, max_y: i32) -> Region {
    Region::new(
        RegionId::new(id).unwrap(),
        Shape::cuboid(BlockPoint::new(0, min_y, 0), BlockPoint::new(16, max_y, 16)),
    )
    .unwrap()
}

fn sample_world() -> Vec<Region> {
    let mut spawn = cuboid("spawn", 0, 255)
        .with_priority(10)
        .with_flag("pvp", FlagValue::State(StateValue::Deny));
    spawn.owners_mut().add_name("Alice");
    spawn.members_mut().add_name("bob");
    spawn.members_mut().add_group("builders");
    let shop = cuboid("shop", 60, 80).with_parent(Some(RegionId::new("spawn").unwrap()));
    let tower = Region::new(
        RegionId::new("tower").unwrap(),
        Shape::polygon(
            vec![Point2::new(0, 0), Point2::new(10, 0), Point2::new(5, 10)],
            40,
            120,
        )
        .unwrap(),
    )
    .unwrap();
    vec![Region::global(), spawn, shop, tower]
}

fn seed(driver: &dyn RegionDriver, world: &str, regions: &[Region]) {
    driver
        .store(world)
        .unwrap()
        .save_all(&mut regions.iter())
        .unwrap();
}

fn load(driver: &dyn RegionDriver, world: &str) -> Vec<Region> {
    driver.store(world).unwrap().load_all().unwrap()
}

#[test]
fn driver_round_trip_preserves_every_region() {
    let dir = tempfile::tempdir().unwrap();
    let json: Arc<dyn RegionDriver> = Arc::new(JsonDriver::new(dir.path().join("json")));
    let memory: Arc<dyn RegionDriver> = Arc::new(MemoryDriver::new());
    let back: Arc<dyn RegionDriver> = Arc::new(JsonDriver::new(dir.path().join("back")));
    let regions = sample_world();
    seed(json.as_ref(), "world", &regions);
    seed(json.as_ref(), "nether", &regions[1..2]);

    let cancel = CancelToken::new();
    let report = DriverMigration::new(json.clone(), memory.clone())
        .with_flush_batch(1)
        .run(&cancel)
        .unwrap();
    assert!(report.is_clean());
    assert_eq!(report.worlds, vec!["nether", "world"]);
    assert_eq!(report.migrated.len(), 5);

    DriverMigration::new(memory, back.clone()).run(&cancel).unwrap();
    assert_eq!(load(back.as_ref(), "world"), regions);
    assert_eq!(load(back.as_ref(), "nether"), regions[1..2].to_vec());
}

#[test]
fn cancelled_driver_migration_leaves_destination_untouched() {
    let source = Arc::new(MemoryDriver::new());
    let destination = Arc::new(MemoryDriver::new());
    seed(source.as_ref(), "world", &sample_world());
    seed(destination.as_ref(), "world", &[cuboid("old", 0, 1)]);

    let cancel = CancelToken::new();
    cancel.cancel(CancelCause::User);
    let err = DriverMigration::new(source, destination.clone())
        .run(&cancel)
        .unwrap_err();
    let report = match err {
        MigrationError::Cancelled { report } => report,
        other => panic!("expected cancellation, got {other}"),
    };
    assert!(report.migrated.is_empty());
    assert_eq!(report.skipped.len(), 4);
    let kept = load(destination.as_ref(), "world");
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].id().as_str(), "old");
}

#[test]
fn write_failure_surfaces_as_storage_error() {
    let source = Arc::new(MemoryDriver::new());
    let destination = Arc::new(MemoryDriver::new());
    seed(source.as_ref(), "world", &sample_world());
    destination.memory_store("world").set_fail_writes(true);

    let err = DriverMigration::new(source, destination.clone())
        .run(&CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, MigrationError::Storage(_)));
    assert_eq!(destination.memory_store("world").stored_len(), 0);
}

#[test]
fn identity_migration_rekeys_and_reports_unresolved() {
    let alice = PlayerId::generate();
    let resolver = Arc::new(StaticResolver::new().with("alice", alice));

    for (policy, keeps_bob) in [(UnresolvedPolicy::KeepNames, true), (UnresolvedPolicy::Drop, false)] {
        let driver = Arc::new(MemoryDriver::new());
        seed(driver.as_ref(), "world", &sample_world());
        let report = IdentityMigration::new(driver.clone(), resolver.clone(), policy)
            .run(&CancelToken::new())
            .unwrap();
        assert_eq!(report.unresolved.iter().collect::<Vec<_>>(), vec!["bob"]);

        let spawn = load(driver.as_ref(), "world")
            .into_iter()
            .find(|r| r.id().as_str() == "spawn")
            .unwrap();
        assert!(spawn.owners().contains_player(&alice));
        assert!(spawn.owners().names().is_empty());
        assert_eq!(spawn.members().contains_name("bob"), keeps_bob);
        assert_eq!(spawn.members().groups().len(), 1);
    }
}

#[test]
fn identity_migration_reject_writes_nothing() {
    let driver = Arc::new(MemoryDriver::new());
    let regions = sample_world();
    seed(driver.as_ref(), "world", &regions);
    let err = IdentityMigration::new(
        driver.clone(),
        Arc::new(StaticResolver::new()),
        UnresolvedPolicy::Reject,
    )
    .run(&CancelToken::new())
    .unwrap_err();
    match err {
        MigrationError::UnresolvedIdentity(names) => assert_eq!(names, vec!["alice", "bob"]),
        other => panic!("unexpected {other}"),
    }
    assert_eq!(load(driver.as_ref(), "world"), regions);
}

#[test]
fn height_migration_rewrites_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let driver: Arc<dyn RegionDriver> = Arc::new(JsonDriver::new(dir.path()));
    seed(driver.as_ref(), "world", &sample_world());

    let report = HeightMigration::new(
        driver.clone(),
        HeightRange::new(0, 255),
        HeightRange::new(-64, 319),
        HeightStrategy::ExpandFullHeight,
    )
    .run(&CancelToken::new())
    .unwrap();
    assert_eq!(report.migrated.len(), 4);

    let regions = load(driver.as_ref(), "world");
    let bounds = |id: &str| {
        let region = regions.iter().find(|r| r.id().as_str() == id).unwrap();
        let bb = region.shape().bounding_box().unwrap();
        (bb.min().y, bb.max().y)
    };
    assert_eq!(bounds("spawn"), (-64, 319));
    assert_eq!(bounds("shop"), (60, 80));
    assert_eq!(bounds("tower"), (40, 120));
    assert!(regions[0].is_global());
    assert_eq!(regions[2].parent().map(RegionId::as_str), Some("spawn"));
}

/// Put an undecodable line after the first record of a JSON world file.
fn corrupt_second_line(path: &std::path::Path) {
    let text = std::fs::read_to_string(path).unwrap();
    let (first, rest) = text.split_once('\n').unwrap();
    std::fs::write(path, format!("{first}\n{{\"id\": 7}}\n{rest}")).unwrap();
}

#[test]
fn driver_migration_reports_undecodable_records_and_copies_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let source: Arc<dyn RegionDriver> = Arc::new(JsonDriver::new(dir.path()));
    let destination = Arc::new(MemoryDriver::new());
    let regions = sample_world();
    seed(source.as_ref(), "world", &regions);
    corrupt_second_line(&dir.path().join("world.jsonl"));

    let err = DriverMigration::new(source, destination.clone())
        .with_flush_batch(1)
        .run(&CancelToken::new())
        .unwrap_err();
    let report = match err {
        MigrationError::Partial { report } => report,
        other => panic!("expected a partial migration, got {other}"),
    };
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].region.is_none());
    assert!(report.failures[0].reason.contains("Corrupt record 2"));
    assert_eq!(report.migrated.len(), regions.len());
    assert_eq!(load(destination.as_ref(), "world"), regions);
}

#[test]
fn in_place_migration_leaves_world_with_undecodable_record_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let driver: Arc<dyn RegionDriver> = Arc::new(JsonDriver::new(dir.path()));
    seed(driver.as_ref(), "world", &sample_world());
    let path = dir.path().join("world.jsonl");
    corrupt_second_line(&path);
    let before = std::fs::read(&path).unwrap();

    let err = HeightMigration::new(
        driver.clone(),
        HeightRange::new(0, 255),
        HeightRange::new(-64, 319),
        HeightStrategy::ExpandFullHeight,
    )
    .run(&CancelToken::new())
    .unwrap_err();
    let report = match err {
        MigrationError::Partial { report } => report,
        other => panic!("expected a partial migration, got {other}"),
    };
    assert!(report.migrated.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert!(report.failures[0].reason.ends_with("world left unchanged"));
    assert_eq!(std::fs::read(&path).unwrap(), before);
    assert!(!dir.path().join("world.jsonl.tmp").exists());

    let resolver = Arc::new(StaticResolver::new().with("alice", PlayerId::generate()));
    let err = IdentityMigration::new(driver, resolver, UnresolvedPolicy::KeepNames)
        .run(&CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, MigrationError::Partial { .. }));
    assert_eq!(std::fs::read(&path).unwrap(), before);
}
