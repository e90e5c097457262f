//! State-preserving table reconciliation.
//!
//! A [`TableView`] is the presentation-side list of one collection. Cache
//! deltas are folded into it in place so the UI can patch individual rows,
//! and the user's sort, selection and scroll position survive every update.
//!
//! Selection is tracked by record id, never by row index, because indices
//! shift whenever rows are removed, appended or re-sorted.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use switchboard_proto::{Identified, Tabular};

use crate::cache::Delta;

/// Sort direction of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
	/// Smallest first.
	#[default]
	Ascending,
	/// Largest first.
	Descending,
}

impl SortDirection {
	/// The opposite direction.
	pub fn flipped(self) -> Self {
		match self {
			Self::Ascending => Self::Descending,
			Self::Descending => Self::Ascending,
		}
	}
}

/// Active sort of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
	/// Column name passed to [`Tabular::field`].
	pub column: String,
	/// Direction.
	#[serde(default)]
	pub direction: SortDirection,
}

impl SortSpec {
	/// Ascending sort on `column`.
	pub fn ascending(column: impl Into<String>) -> Self {
		Self {
			column: column.into(),
			direction: SortDirection::Ascending,
		}
	}

	/// Descending sort on `column`.
	pub fn descending(column: impl Into<String>) -> Self {
		Self {
			column: column.into(),
			direction: SortDirection::Descending,
		}
	}
}

/// One change a renderer has to apply, in order.
///
/// Indices refer to the row list as it stands after all preceding patches of
/// the same batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Patch {
	/// Row at index was deleted.
	Remove(usize),
	/// Row at index changed its fields.
	Update(usize),
	/// Row appended at index.
	Insert(usize),
	/// Rows were re-ordered by the active sort.
	Reorder,
	/// The whole table was replaced.
	Rebuild,
}

/// Ordered rows of one collection plus the user's view state.
#[derive(Debug, Clone)]
pub struct TableView<R> {
	rows: Vec<R>,
	sort: Option<SortSpec>,
	selected: HashSet<String>,
	scroll: usize,
	viewport: usize,
}

impl<R> Default for TableView<R> {
	fn default() -> Self {
		Self {
			rows: Vec::new(),
			sort: None,
			selected: HashSet::new(),
			scroll: 0,
			viewport: 0,
		}
	}
}

impl<R> TableView<R>
where
	R: Tabular + Clone,
{
	/// Creates an empty, unsorted view.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates an empty view with an initial sort.
	pub fn with_sort(sort: Option<SortSpec>) -> Self {
		Self {
			sort,
			..Self::default()
		}
	}

	/// Folds a cache delta into the rows.
	///
	/// Removed rows go highest index first, changed rows are overwritten in
	/// place, new rows are appended, then the active sort is re-applied
	/// (ties broken by ascending id). Selected ids that survive stay selected
	/// and the scroll offset is clamped to the new row count.
	pub fn reconcile(&mut self, delta: &Delta<R>) -> Vec<Patch> {
		let selected = std::mem::take(&mut self.selected);
		let scroll = self.scroll;
		let mut patches = Vec::with_capacity(delta.len() + 1);

		let index = self.index();
		let mut doomed: Vec<usize> = delta.removed.iter().filter_map(|id| index.get(id.as_str()).copied()).collect();
		doomed.sort_unstable_by(|a, b| b.cmp(a));
		doomed.dedup();
		for i in doomed {
			self.rows.remove(i);
			patches.push(Patch::Remove(i));
		}

		let mut index: HashMap<String, usize> = self.index().into_iter().map(|(id, i)| (id.to_owned(), i)).collect();
		for record in delta.changed.iter().chain(&delta.added) {
			match index.get(record.id()) {
				Some(&i) => {
					self.rows[i] = record.clone();
					patches.push(Patch::Update(i));
				}
				None => {
					index.insert(record.id().to_owned(), self.rows.len());
					self.rows.push(record.clone());
					patches.push(Patch::Insert(self.rows.len() - 1));
				}
			}
		}

		if self.apply_sort() {
			patches.push(Patch::Reorder);
		}

		let present: HashSet<&str> = self.rows.iter().map(Identified::id).collect();
		self.selected = selected.into_iter().filter(|id| present.contains(id.as_str())).collect();
		self.scroll = scroll.min(self.max_scroll());
		patches
	}

	/// Replaces every row, for a change of context (e.g. a new directory).
	///
	/// Selection and scroll reset; the sort is kept.
	pub fn rebuild(&mut self, records: Vec<R>) -> Patch {
		self.rows = records;
		self.apply_sort();
		self.selected.clear();
		self.scroll = 0;
		Patch::Rebuild
	}

	/// Changes the sort and re-orders the rows. Returns whether the order changed.
	pub fn set_sort(&mut self, sort: Option<SortSpec>) -> bool {
		self.sort = sort;
		self.apply_sort()
	}

	/// Active sort.
	pub fn sort(&self) -> Option<&SortSpec> {
		self.sort.as_ref()
	}

	/// Sorts by `column`, flipping the direction if it is already the sort column.
	pub fn toggle_sort(&mut self, column: &str) -> bool {
		let next = match &self.sort {
			Some(s) if s.column == column => SortSpec {
				column: s.column.clone(),
				direction: s.direction.flipped(),
			},
			_ => SortSpec::ascending(column),
		};
		self.set_sort(Some(next))
	}

	/// Adds `id` to the selection if a row with that id exists.
	pub fn select(&mut self, id: &str) -> bool {
		if self.rows.iter().any(|r| r.id() == id) {
			self.selected.insert(id.to_owned());
			true
		} else {
			false
		}
	}

	/// Removes `id` from the selection.
	pub fn deselect(&mut self, id: &str) {
		self.selected.remove(id);
	}

	/// Clears the selection.
	pub fn clear_selection(&mut self) {
		self.selected.clear();
	}

	/// Selected ids.
	pub fn selected(&self) -> &HashSet<String> {
		&self.selected
	}

	/// Selected rows in display order.
	pub fn selected_rows(&self) -> impl Iterator<Item = &R> {
		self.rows.iter().filter(|r| self.selected.contains(r.id()))
	}

	/// Sets the number of visible rows and re-clamps the scroll offset.
	pub fn set_viewport(&mut self, rows: usize) {
		self.viewport = rows;
		self.scroll = self.scroll.min(self.max_scroll());
	}

	/// Scrolls so that `offset` is the first visible row, clamped.
	pub fn scroll_to(&mut self, offset: usize) {
		self.scroll = offset.min(self.max_scroll());
	}

	/// Index of the first visible row.
	pub fn scroll(&self) -> usize {
		self.scroll
	}

	/// All rows in display order.
	pub fn rows(&self) -> &[R] {
		&self.rows
	}

	/// Rows currently inside the viewport. Everything, if no viewport is set.
	pub fn visible(&self) -> &[R] {
		if self.viewport == 0 {
			return &self.rows;
		}
		let end = (self.scroll + self.viewport).min(self.rows.len());
		&self.rows[self.scroll.min(end)..end]
	}

	/// Number of rows.
	pub fn len(&self) -> usize {
		self.rows.len()
	}

	/// Whether the table has no rows.
	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	fn max_scroll(&self) -> usize {
		self.rows.len().saturating_sub(self.viewport.max(1))
	}

	fn index(&self) -> HashMap<&str, usize> {
		self.rows.iter().enumerate().map(|(i, r)| (r.id(), i)).collect()
	}

	fn apply_sort(&mut self) -> bool {
		let Some(sort) = &self.sort else {
			return false;
		};
		let before: Vec<String> = self.rows.iter().map(|r| r.id().to_owned()).collect();
		self.rows.sort_by(|a, b| compare(a, b, sort));
		self.rows.iter().map(Identified::id).ne(before.iter().map(String::as_str))
	}
}

fn compare<R: Tabular>(a: &R, b: &R, sort: &SortSpec) -> Ordering {
	let by_column = a.field(&sort.column).cmp(&b.field(&sort.column));
	let by_column = match sort.direction {
		SortDirection::Ascending => by_column,
		SortDirection::Descending => by_column.reverse(),
	};
	by_column.then_with(|| a.id().cmp(b.id()))
}

#[cfg(test)]
mod tests;
