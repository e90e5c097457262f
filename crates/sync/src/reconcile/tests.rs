use pretty_assertions::assert_eq;
use proptest::prelude::*;
use switchboard_proto::{FieldValue, Identified, Tabular};

use super::*;

#[derive(Debug, Clone, PartialEq)]
struct Row {
	id: String,
	size: i64,
}

impl Identified for Row {
	fn id(&self) -> &str {
		&self.id
	}
}

impl Tabular for Row {
	fn field(&self, column: &str) -> FieldValue {
		match column {
			"size" => FieldValue::Int(self.size),
			"id" => FieldValue::Text(self.id.clone()),
			_ => FieldValue::Null,
		}
	}
}

fn row(id: &str, size: i64) -> Row {
	Row { id: id.into(), size }
}

fn order(view: &TableView<Row>) -> Vec<&str> {
	view.rows().iter().map(|r| r.id.as_str()).collect()
}

fn seeded(rows: Vec<Row>, sort: Option<SortSpec>) -> TableView<Row> {
	let mut view = TableView::with_sort(sort);
	view.reconcile(&Delta {
		added: rows,
		..Delta::default()
	});
	view
}

#[test]
fn removes_highest_index_first_then_patches_and_appends() {
	let mut view = seeded(vec![row("a", 1), row("b", 2), row("c", 3), row("d", 4)], None);

	let patches = view.reconcile(&Delta {
		added: vec![row("e", 5)],
		removed: vec!["b".into(), "d".into()],
		changed: vec![row("c", 30)],
	});

	assert_eq!(patches, vec![Patch::Remove(3), Patch::Remove(1), Patch::Update(1), Patch::Insert(2)]);
	assert_eq!(view.rows(), &[row("a", 1), row("c", 30), row("e", 5)]);
}

#[test]
fn sort_reapplied_with_id_tie_break() {
	let mut view = seeded(vec![row("b", 1), row("a", 2)], Some(SortSpec::ascending("size")));
	assert_eq!(order(&view), vec!["b", "a"]);

	let patches = view.reconcile(&Delta {
		added: vec![row("c", 1), row("0", 1)],
		..Delta::default()
	});

	assert_eq!(order(&view), vec!["0", "b", "c", "a"]);
	assert_eq!(patches.last(), Some(&Patch::Reorder));
}

#[test]
fn descending_sort_keeps_ascending_id_tie_break() {
	let view = seeded(vec![row("b", 1), row("a", 1), row("z", 9)], Some(SortSpec::descending("size")));
	assert_eq!(order(&view), vec!["z", "a", "b"]);
}

#[test]
fn change_that_moves_row_keeps_selection() {
	let mut view = seeded(vec![row("a", 1), row("b", 2), row("c", 3)], Some(SortSpec::ascending("size")));
	assert!(view.select("a"));

	view.reconcile(&Delta {
		changed: vec![row("a", 99)],
		..Delta::default()
	});

	assert_eq!(order(&view), vec!["b", "c", "a"]);
	assert_eq!(view.selected_rows().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["a"]);
}

#[test]
fn removed_selection_is_dropped() {
	let mut view = seeded(vec![row("a", 1), row("b", 2)], None);
	view.select("a");
	view.select("b");
	view.reconcile(&Delta {
		removed: vec!["a".into()],
		..Delta::default()
	});
	assert_eq!(view.selected().iter().cloned().collect::<Vec<_>>(), vec!["b".to_string()]);
}

#[test]
fn scroll_is_restored_or_clamped() {
	let rows: Vec<_> = (0..20).map(|i| row(&format!("{i:02}"), i)).collect();
	let mut view = seeded(rows, Some(SortSpec::ascending("size")));
	view.set_viewport(5);
	view.scroll_to(10);

	view.reconcile(&Delta {
		changed: vec![row("03", 3)],
		..Delta::default()
	});
	assert_eq!(view.scroll(), 10);

	view.reconcile(&Delta {
		removed: (8..20).map(|i| format!("{i:02}")).collect(),
		..Delta::default()
	});
	assert_eq!(view.len(), 8);
	assert_eq!(view.scroll(), 3);
	assert_eq!(view.visible().len(), 5);
}

#[test]
fn rebuild_resets_selection_and_scroll_but_keeps_sort() {
	let mut view = seeded(vec![row("a", 1), row("b", 2)], Some(SortSpec::descending("size")));
	view.select("a");
	view.set_viewport(1);
	view.scroll_to(1);

	assert_eq!(view.rebuild(vec![row("x", 1), row("y", 5)]), Patch::Rebuild);

	assert_eq!(order(&view), vec!["y", "x"]);
	assert!(view.selected().is_empty());
	assert_eq!(view.scroll(), 0);
}

#[test]
fn toggle_sort_flips_direction_on_same_column() {
	let mut view = seeded(vec![row("a", 1), row("b", 2)], None);
	view.toggle_sort("size");
	assert_eq!(order(&view), vec!["a", "b"]);
	view.toggle_sort("size");
	assert_eq!(order(&view), vec!["b", "a"]);
	assert_eq!(view.sort().map(|s| s.direction), Some(SortDirection::Descending));
}

#[test]
fn selecting_unknown_id_is_refused() {
	let mut view = seeded(vec![row("a", 1)], None);
	assert!(!view.select("zzz"));
	assert!(view.selected().is_empty());
}

fn sort_strategy() -> impl Strategy<Value = Option<SortSpec>> {
	prop_oneof![
		Just(None),
		Just(Some(SortSpec::ascending("size"))),
		Just(Some(SortSpec::descending("size"))),
		Just(Some(SortSpec::descending("id"))),
	]
}

proptest! {
	#[test]
	fn selection_survives_any_delta_that_keeps_selected_ids(
		sizes in proptest::collection::vec(0i64..5, 1..20),
		selected_mask in proptest::collection::vec(any::<bool>(), 20),
		removed_mask in proptest::collection::vec(any::<bool>(), 20),
		changed in proptest::collection::vec((0usize..20, 0i64..5), 0..10),
		added in proptest::collection::vec(0i64..5, 0..10),
		sort in sort_strategy(),
		resort in sort_strategy(),
	) {
		let rows: Vec<_> = sizes.iter().enumerate().map(|(i, &s)| row(&format!("r{i}"), s)).collect();
		let mut view = seeded(rows.clone(), sort);

		let mut expected = HashSet::new();
		for (i, r) in rows.iter().enumerate() {
			if selected_mask[i] {
				prop_assert!(view.select(&r.id));
				expected.insert(r.id.clone());
			}
		}

		let removed: Vec<String> = rows
			.iter()
			.enumerate()
			.filter(|(i, r)| removed_mask[*i] && !expected.contains(&r.id))
			.map(|(_, r)| r.id.clone())
			.collect();
		let changed: Vec<Row> = changed
			.into_iter()
			.filter(|(i, _)| *i < rows.len() && !removed.contains(&rows[*i].id))
			.map(|(i, s)| row(&rows[i].id, s))
			.collect();
		let added: Vec<Row> = added.into_iter().enumerate().map(|(i, s)| row(&format!("n{i}"), s)).collect();

		view.reconcile(&Delta { added, removed, changed });
		prop_assert_eq!(view.selected(), &expected);

		view.set_sort(resort);
		prop_assert_eq!(view.selected(), &expected);
	}

	#[test]
	fn reconciled_rows_match_cache_contents(
		before in proptest::collection::vec((0u8..10, 0i64..5), 0..10),
		after in proptest::collection::vec((0u8..10, 0i64..5), 0..10),
	) {
		let mut cache = crate::cache::ResourceCache::new();
		let mut view = TableView::with_sort(Some(SortSpec::ascending("size")));
		view.reconcile(&cache.apply_snapshot(before.iter().map(|&(i, s)| row(&i.to_string(), s)).collect()));
		view.reconcile(&cache.apply_snapshot(after.iter().map(|&(i, s)| row(&i.to_string(), s)).collect()));

		let mut expected = cache.to_vec();
		expected.sort_by(|a, b| a.size.cmp(&b.size).then_with(|| a.id.cmp(&b.id)));
		prop_assert_eq!(view.rows(), expected.as_slice());
	}
}
