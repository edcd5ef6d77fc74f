#![allow(dead_code)]

use recordhooks::prelude::*;
use recordhooks::Row;

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn run<F: Future>(f: F) -> F::Output {
    let rt = asupersync::runtime::RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    rt.block_on(f)
}

pub fn ordering(store: MemoryStore) -> Lifecycle<MemoryStore> {
    Lifecycle::new(store).with_behavior(
        OrderMaintainer::new(OrderConfig::new().reference_attribute("list_id"))
            .expect("valid order config"),
    )
}

pub fn item(list: impl Into<Value>, name: &str) -> ActiveRecord {
    ActiveRecord::new("items", ["id"])
        .with("list_id", list.into())
        .with("name", name)
}

/// Save new items into `list`, returning them in insertion order.
pub async fn fill(
    cx: &Cx,
    lifecycle: &Lifecycle<MemoryStore>,
    list: i64,
    names: &[&str],
) -> Vec<ActiveRecord> {
    let mut saved = Vec::with_capacity(names.len());
    for name in names {
        let mut record = item(list, name);
        assert!(unwrap_outcome(lifecycle.save(cx, &mut record).await));
        saved.push(record);
    }
    saved
}

/// Committed names of a list, sorted by order value.
pub fn names(store: &MemoryStore, list: impl Into<Value>) -> Vec<String> {
    sorted(store, list)
        .into_iter()
        .map(|row| {
            row.get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

/// Committed order values of a list, sorted.
pub fn orders(store: &MemoryStore, list: impl Into<Value>) -> Vec<i64> {
    sorted(store, list)
        .into_iter()
        .map(|row| row.get("order").and_then(Value::as_i64).unwrap_or(-1))
        .collect()
}

fn sorted(store: &MemoryStore, list: impl Into<Value>) -> Vec<Row> {
    let mut rows = store.rows("items", &Filter::new().eq("list_id", list.into()));
    rows.sort_by_key(|row| row.get("order").and_then(Value::as_i64));
    rows
}

/// Re-read a record from committed storage.
pub fn reload(store: &MemoryStore, record: &ActiveRecord) -> ActiveRecord {
    let rows = store.rows("items", &record.primary_key_filter());
    let row = rows.first().expect("record row exists");
    ActiveRecord::from_row("items", ["id"], row)
}
