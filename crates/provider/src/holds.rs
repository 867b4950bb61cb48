//! Object reference holds, one flag per (session, token, object).

use xdsm_types::{Error, Handle, Result, Token};

use crate::keyed::KeyedCells;

#[derive(Default)]
pub(crate) struct HoldTable {
	cells: KeyedCells<(Token, Handle), bool>,
}

impl HoldTable {
	pub(crate) fn hold(&self, token: Token, handle: &Handle) -> Result<()> {
		self.cells.with(&(token, *handle), |held| {
			if *held {
				return Err(Error::AlreadyHeld);
			}
			*held = true;
			Ok(())
		})
	}

	pub(crate) fn rele(&self, token: Token, handle: &Handle) -> Result<()> {
		self.cells.with(&(token, *handle), |held| {
			if !*held {
				return Err(Error::NotHeld);
			}
			*held = false;
			Ok(())
		})
	}

	pub(crate) fn query(&self, token: Token, handle: &Handle) -> bool {
		self.cells.peek(&(token, *handle), |held| held.copied().unwrap_or(false))
	}

	pub(crate) fn forget(&self, mut pred: impl FnMut(&Handle) -> bool) {
		self.cells.forget(|(_, handle)| pred(handle));
	}
}
