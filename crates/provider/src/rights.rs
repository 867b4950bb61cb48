//! Per (session, object) access rights.
//!
//! Transitions are pure functions of the current right and the request; the
//! table applies them under the object's own guard.

use xdsm_types::{Error, Handle, Result, Right, RightFlags, Token};

use crate::keyed::{KeyedCells, Vacancy};

/// `request_right` transition.
///
/// Requesting EXCL while holding SHARED succeeds without `WAIT` and fails
/// [`Error::RightConflict`] with it.
pub(crate) fn on_request(current: Right, requested: Right, flags: RightFlags) -> Result<Right> {
	match (current, requested) {
		(_, Right::Null) => Err(Error::InvalidRight),
		(Right::Shared, Right::Excl) if flags.contains(RightFlags::WAIT) => Err(Error::RightConflict),
		(Right::Excl, Right::Shared) => Ok(Right::Excl),
		(_, requested) => Ok(requested),
	}
}

/// `release_right` transition.
pub(crate) fn on_release(current: Right) -> Result<Right> {
	match current {
		Right::Null => Err(Error::NotHeld),
		Right::Shared | Right::Excl => Ok(Right::Null),
	}
}

/// `upgrade_right` transition.
pub(crate) fn on_upgrade(current: Right) -> Result<Right> {
	match current {
		Right::Null => Err(Error::PermissionDenied),
		Right::Shared | Right::Excl => Ok(Right::Excl),
	}
}

/// `downgrade_right` transition.
pub(crate) fn on_downgrade(current: Right) -> Result<Right> {
	match current {
		Right::Null | Right::Shared => Err(Error::PermissionDenied),
		Right::Excl => Ok(Right::Shared),
	}
}

#[derive(Debug, Default, Clone, Copy)]
struct RightCell {
	right: Right,
	/// Token the right was acquired under.
	token: Option<Token>,
}

impl Vacancy for RightCell {
	fn is_vacant(&self) -> bool {
		self.right == Right::Null
	}
}

/// Rights of one session, one guard per object.
#[derive(Default)]
pub(crate) struct RightsTable {
	cells: KeyedCells<Handle, RightCell>,
}

impl RightsTable {
	pub(crate) fn request(&self, token: Token, handle: &Handle, requested: Right, flags: RightFlags) -> Result<Right> {
		self.cells.with(handle, |cell| {
			let next = on_request(cell.right, requested, flags)?;
			if cell.right == Right::Null {
				cell.token = Some(token);
			}
			cell.right = next;
			Ok(next)
		})
	}

	pub(crate) fn release(&self, handle: &Handle) -> Result<()> {
		self.cells.with(handle, |cell| {
			cell.right = on_release(cell.right)?;
			Ok(())
		})
	}

	pub(crate) fn upgrade(&self, handle: &Handle) -> Result<Right> {
		self.transition(handle, on_upgrade)
	}

	pub(crate) fn downgrade(&self, handle: &Handle) -> Result<Right> {
		self.transition(handle, on_downgrade)
	}

	fn transition(&self, handle: &Handle, step: fn(Right) -> Result<Right>) -> Result<Right> {
		self.cells.with(handle, |cell| {
			cell.right = step(cell.right)?;
			Ok(cell.right)
		})
	}

	pub(crate) fn query(&self, handle: &Handle) -> Right {
		self.cells.peek(handle, |cell| cell.map_or(Right::Null, |cell| cell.right))
	}

	/// Releases every right acquired under `token`. Returns how many were released.
	pub(crate) fn release_token(&self, token: Token) -> usize {
		let mut released = 0;
		self.cells.update_all(|_, cell| {
			if cell.token == Some(token) {
				*cell = RightCell::default();
				released += 1;
			}
		});
		released
	}

	pub(crate) fn forget(&self, pred: impl FnMut(&Handle) -> bool) {
		self.cells.forget(pred);
	}

	#[cfg(test)]
	fn len(&self) -> usize {
		self.cells.len()
	}
}
