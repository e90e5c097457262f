use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use switchboard_proto::{Identified, Push};

use super::*;

#[derive(Debug, Clone, PartialEq)]
struct Row {
	id: String,
	n: String,
}

impl Identified for Row {
	fn id(&self) -> &str {
		&self.id
	}
}

fn row(id: &str, n: &str) -> Row {
	Row {
		id: id.into(),
		n: n.into(),
	}
}

fn ids(rows: &[Row]) -> Vec<&str> {
	rows.iter().map(|r| r.id.as_str()).collect()
}

#[test]
fn snapshot_diff_reports_added_removed_and_unchanged() {
	let mut cache = ResourceCache::new();
	cache.apply_snapshot(vec![row("1", "a"), row("2", "b")]);

	let delta = cache.apply_snapshot(vec![row("1", "a"), row("3", "c")]);

	assert_eq!(ids(&delta.added), vec!["3"]);
	assert_eq!(delta.removed, vec!["2".to_string()]);
	assert!(delta.changed.is_empty());
	assert_eq!(ids(&cache.to_vec()), vec!["1", "3"]);
}

#[test]
fn snapshot_diff_reports_structural_changes() {
	let mut cache = ResourceCache::new();
	cache.apply_snapshot(vec![row("1", "a"), row("2", "b")]);
	let delta = cache.apply_snapshot(vec![row("1", "a"), row("2", "B")]);
	assert_eq!(delta.changed, vec![row("2", "B")]);
	assert!(delta.added.is_empty() && delta.removed.is_empty());
}

#[test]
fn identical_snapshot_is_empty_delta() {
	let mut cache = ResourceCache::new();
	cache.apply_snapshot(vec![row("1", "a")]);
	assert!(cache.apply_snapshot(vec![row("1", "a")]).is_empty());
}

#[test]
fn duplicate_ids_in_snapshot_keep_last() {
	let mut cache = ResourceCache::new();
	let delta = cache.apply_snapshot(vec![row("1", "a"), row("1", "z")]);
	assert_eq!(delta.added, vec![row("1", "z")]);
	assert_eq!(cache.len(), 1);
}

#[test]
fn update_for_unknown_id_is_an_addition() {
	let mut cache = ResourceCache::new();
	let delta = cache.apply_updated(row("9", "x"));
	assert_eq!(delta.added, vec![row("9", "x")]);
}

#[test]
fn repeated_add_is_idempotent() {
	let mut cache = ResourceCache::new();
	cache.apply_added(row("1", "a"));
	assert!(cache.apply_added(row("1", "a")).is_empty());
	assert_eq!(cache.apply_added(row("1", "b")).changed, vec![row("1", "b")]);
}

#[test]
fn removing_unknown_id_is_noop() {
	let mut cache: ResourceCache<Row> = ResourceCache::new();
	assert!(cache.apply_removed("ghost").is_empty());
}

#[derive(Debug, Clone)]
enum Event {
	Added(u8, u8),
	Updated(u8, u8),
	Removed(u8),
}

fn event() -> impl Strategy<Value = Event> {
	prop_oneof![
		(0u8..12, 0u8..4).prop_map(|(i, v)| Event::Added(i, v)),
		(0u8..12, 0u8..4).prop_map(|(i, v)| Event::Updated(i, v)),
		(0u8..12).prop_map(Event::Removed),
	]
}

fn snapshot() -> impl Strategy<Value = Vec<(u8, u8)>> {
	proptest::collection::vec((0u8..12, 0u8..4), 0..12)
}

fn to_row(i: u8, v: u8) -> Row {
	row(&i.to_string(), &v.to_string())
}

proptest! {
	#[test]
	fn cache_equals_fold_of_events_over_snapshot(
		initial in snapshot(),
		events in proptest::collection::vec(event(), 0..40),
	) {
		let mut cache = ResourceCache::new();
		let mut model: BTreeMap<String, Row> = BTreeMap::new();

		cache.apply(Push::Snapshot(initial.iter().map(|&(i, v)| to_row(i, v)).collect()));
		for &(i, v) in &initial {
			model.insert(i.to_string(), to_row(i, v));
		}

		for ev in events {
			match ev {
				Event::Added(i, v) => {
					cache.apply(Push::Added(to_row(i, v)));
					model.insert(i.to_string(), to_row(i, v));
				}
				Event::Updated(i, v) => {
					cache.apply(Push::Updated(to_row(i, v)));
					model.insert(i.to_string(), to_row(i, v));
				}
				Event::Removed(i) => {
					cache.apply(Push::Removed(i.to_string()));
					model.remove(&i.to_string());
				}
			}
		}

		let mut actual = cache.to_vec();
		actual.sort_by(|a, b| a.id.cmp(&b.id));
		prop_assert_eq!(actual, model.into_values().collect::<Vec<_>>());
	}

	#[test]
	fn snapshot_delta_replayed_on_old_state_yields_new_state(
		before in snapshot(),
		after in snapshot(),
	) {
		let mut cache = ResourceCache::new();
		cache.apply_snapshot(before.iter().map(|&(i, v)| to_row(i, v)).collect());
		let mut replay: BTreeMap<String, Row> = cache.iter().map(|r| (r.id.clone(), r.clone())).collect();

		let delta = cache.apply_snapshot(after.iter().map(|&(i, v)| to_row(i, v)).collect());
		for id in &delta.removed {
			prop_assert!(replay.remove(id).is_some());
		}
		for r in &delta.changed {
			prop_assert!(replay.insert(r.id.clone(), r.clone()).is_some());
		}
		for r in &delta.added {
			prop_assert!(replay.insert(r.id.clone(), r.clone()).is_none());
		}

		let current: BTreeMap<String, Row> = cache.iter().map(|r| (r.id.clone(), r.clone())).collect();
		prop_assert_eq!(replay, current);
	}
}
