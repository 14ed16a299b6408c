// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use lupa_app::HistoryEntryId;
use lupa_store::Store;
use lupa_testkit::{orders_snapshot, regions_snapshot, timestamp};

#[test]
fn append_then_list_orders_most_recent_first() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let store = Store::open(temp.path(), 10)?;

    store.append(&orders_snapshot("first", 2), timestamp(100))?;
    store.append(&orders_snapshot("second", 3), timestamp(200))?;
    store.append(&regions_snapshot("third", 4), timestamp(300))?;

    let entries = store.list()?;
    assert_eq!(
        entries
            .iter()
            .map(|entry| entry.title.as_str())
            .collect::<Vec<_>>(),
        vec!["third", "second", "first"]
    );
    assert_eq!(entries[0].row_count, 4);
    Ok(())
}

#[test]
fn load_round_trips_the_snapshot() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let store = Store::open(temp.path(), 10)?;

    let snapshot = orders_snapshot("orders", 5);
    let entry = store.append(&snapshot, timestamp(100))?;

    let loaded = store.load(&entry.id)?.expect("entry should load");
    assert_eq!(loaded, snapshot);

    assert!(store.load(&HistoryEntryId::new("feedfeedfeed"))?.is_none());
    Ok(())
}

#[test]
fn delete_removes_one_entry() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let store = Store::open(temp.path(), 10)?;

    let first = store.append(&orders_snapshot("first", 2), timestamp(100))?;
    let second = store.append(&orders_snapshot("second", 2), timestamp(200))?;

    assert!(store.delete(&first.id)?);
    assert!(!store.delete(&first.id)?);

    let entries = store.list()?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, second.id);
    Ok(())
}

#[test]
fn prune_evicts_oldest_entries_first() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let store = Store::open(temp.path(), 3)?;

    for index in 0..5 {
        store.append(
            &orders_snapshot(&format!("s{index}"), 2),
            timestamp(100 + index),
        )?;
    }

    let removed = store.prune(None)?;
    assert_eq!(removed, 2);

    let titles: Vec<String> = store
        .list()?
        .iter()
        .map(|entry| entry.title.clone())
        .collect();
    assert_eq!(titles, vec!["s4", "s3", "s2"]);
    Ok(())
}

#[test]
fn prune_never_evicts_the_protected_entry() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let store = Store::open(temp.path(), 2)?;

    let oldest = store.append(&orders_snapshot("oldest", 2), timestamp(100))?;
    for index in 1..4 {
        store.append(
            &orders_snapshot(&format!("s{index}"), 2),
            timestamp(100 + index),
        )?;
    }

    store.prune(Some(&oldest.id))?;
    let ids: Vec<HistoryEntryId> = store.list()?.into_iter().map(|entry| entry.id).collect();
    assert!(ids.contains(&oldest.id), "protected entry was evicted");
    Ok(())
}

#[test]
fn corrupt_entries_are_skipped_not_fatal() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let store = Store::open(temp.path(), 10)?;

    store.append(&orders_snapshot("good", 2), timestamp(100))?;
    std::fs::write(temp.path().join("deadbeef0000.json"), b"{not json")?;

    let entries = store.list()?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].title, "good");
    Ok(())
}

#[test]
fn leftover_temp_files_are_not_listed() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let store = Store::open(temp.path(), 10)?;

    store.append(&orders_snapshot("good", 2), timestamp(100))?;
    std::fs::write(temp.path().join(".abc123.tmp"), b"partial")?;

    assert_eq!(store.list()?.len(), 1);
    Ok(())
}

#[test]
fn same_second_archives_get_distinct_entries() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let store = Store::open(temp.path(), 10)?;

    let mut first = orders_snapshot("burst", 2);
    first.created_at = timestamp(1);
    let mut second = orders_snapshot("burst", 2);
    second.created_at = timestamp(2);

    store.append(&first, timestamp(100))?;
    store.append(&second, timestamp(100))?;
    assert_eq!(store.list()?.len(), 2);
    Ok(())
}
