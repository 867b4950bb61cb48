//! Maps whose entries are locked independently.

use std::hash::Hash;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

/// Cell contents with an empty state the map need not keep.
pub(crate) trait Vacancy: Default {
	fn is_vacant(&self) -> bool;
}

impl Vacancy for bool {
	fn is_vacant(&self) -> bool {
		!*self
	}
}

impl<T> Vacancy for Vec<T> {
	fn is_vacant(&self) -> bool {
		self.is_empty()
	}
}

/// A map of independently locked cells.
///
/// Work on a cell holds the map's read lock plus that cell's guard, so work
/// on one key never waits on another key's guard. Only creating or dropping
/// a cell takes the write lock. Missing cells are created at `V::default()`
/// and dropped again as soon as they are vacant.
pub(crate) struct KeyedCells<K, V> {
	cells: RwLock<FxHashMap<K, Mutex<V>>>,
}

impl<K, V> Default for KeyedCells<K, V> {
	fn default() -> Self {
		Self { cells: RwLock::new(FxHashMap::default()) }
	}
}

impl<K, V> KeyedCells<K, V>
where
	K: Eq + Hash + Clone,
	V: Vacancy,
{
	/// Runs `f` on the cell for `key` under its guard, creating it if needed.
	pub(crate) fn with<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> R {
		let cells = self.cells.read();
		if let Some(cell) = cells.get(key) {
			let (out, vacant) = {
				let mut value = cell.lock();
				let out = f(&mut value);
				(out, value.is_vacant())
			};
			drop(cells);
			if vacant {
				self.prune(key);
			}
			return out;
		}
		drop(cells);

		let mut cells = self.cells.write();
		let value = cells.entry(key.clone()).or_default().get_mut();
		let out = f(value);
		if value.is_vacant() {
			cells.remove(key);
		}
		out
	}

	/// Drops the cell for `key` if it is still vacant.
	fn prune(&self, key: &K) {
		let mut cells = self.cells.write();
		if cells.get_mut(key).is_some_and(|cell| cell.get_mut().is_vacant()) {
			cells.remove(key);
		}
	}

	/// Reads the cell for `key` without creating it.
	pub(crate) fn peek<R>(&self, key: &K, f: impl FnOnce(Option<&V>) -> R) -> R {
		let cells = self.cells.read();
		match cells.get(key) {
			Some(cell) => {
				let value = cell.lock();
				f(Some(&*value))
			}
			None => f(None),
		}
	}

	/// Applies `f` to every cell, dropping those it leaves vacant.
	pub(crate) fn update_all(&self, mut f: impl FnMut(&K, &mut V)) {
		self.cells.write().retain(|key, cell| {
			let value = cell.get_mut();
			f(key, value);
			!value.is_vacant()
		});
	}

	/// Drops every cell whose key matches `pred`.
	pub(crate) fn forget(&self, mut pred: impl FnMut(&K) -> bool) {
		self.cells.write().retain(|key, _| !pred(key));
	}

	#[cfg(test)]
	pub(crate) fn len(&self) -> usize {
		self.cells.read().len()
	}
}
