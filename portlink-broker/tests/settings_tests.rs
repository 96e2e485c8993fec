use portlink_broker::{ConfigStore, SettingsStore};

fn make_store() -> SettingsStore {
    SettingsStore::open_in_memory().unwrap()
}

// ── Basic key/value ──────────────────────────────────────────────

#[test]
fn set_then_get() {
    let store = make_store();
    store.set("scheduler", "base_delay_ms", "1000").unwrap();
    assert_eq!(
        store.get("scheduler", "base_delay_ms").unwrap(),
        Some("1000".to_string())
    );
}

#[test]
fn missing_key_reads_as_none() {
    let store = make_store();
    assert_eq!(store.get("scheduler", "unset").unwrap(), None);
}

#[test]
fn set_overwrites() {
    let store = make_store();
    store.set("scheduler", "retry_count_max", "50").unwrap();
    store.set("scheduler", "retry_count_max", "3").unwrap();
    assert_eq!(
        store.get("scheduler", "retry_count_max").unwrap(),
        Some("3".to_string())
    );
}

#[test]
fn remove_deletes_the_key() {
    let store = make_store();
    store.set("scheduler", "worker_count", "8").unwrap();
    store.remove("scheduler", "worker_count").unwrap();
    assert_eq!(store.get("scheduler", "worker_count").unwrap(), None);
}

#[test]
fn domains_are_isolated() {
    let store = make_store();
    store.set("scheduler", "knob", "1").unwrap();
    store.set("broker", "knob", "2").unwrap();

    assert_eq!(store.get("scheduler", "knob").unwrap(), Some("1".into()));
    assert_eq!(store.get("broker", "knob").unwrap(), Some("2".into()));
}

#[test]
fn entries_lists_a_domain_sorted() {
    let store = make_store();
    store.set("scheduler", "b", "2").unwrap();
    store.set("scheduler", "a", "1").unwrap();
    store.set("other", "c", "3").unwrap();

    let entries = store.entries("scheduler").unwrap();
    assert_eq!(
        entries,
        vec![("a".into(), "1".into()), ("b".into(), "2".into())]
    );
}

// ── Typed reads ──────────────────────────────────────────────────

#[test]
fn get_u64_parses_numbers() {
    let store = make_store();
    store.set("scheduler", "postpone_delay_ms", "5000").unwrap();
    assert_eq!(
        store.get_u64("scheduler", "postpone_delay_ms").unwrap(),
        Some(5000)
    );
}

#[test]
fn get_u64_treats_garbage_as_absent() {
    let store = make_store();
    store.set("scheduler", "base_delay_ms", "not-a-number").unwrap();
    assert_eq!(store.get_u64("scheduler", "base_delay_ms").unwrap(), None);
}

// ── Persistence ──────────────────────────────────────────────────

#[test]
fn values_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.db");
    let path = path.to_str().unwrap();

    {
        let store = SettingsStore::new(path).unwrap();
        store.set("scheduler", "retry_count_max", "42").unwrap();
    }

    let reopened = SettingsStore::new(path).unwrap();
    assert_eq!(
        reopened.get_u64("scheduler", "retry_count_max").unwrap(),
        Some(42)
    );
}
