//! Derived collections kept in sync with a source listenable.
//!
//! Every operator subscribes to the changes of its source and translates
//! each delivered mutation into the smallest matching write on its target.
//! Those writes run in a batch named after the operator.

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use crate::listenable::Listenable;

mod filter;
mod map;
mod to_object;

pub use filter::filter;
pub use map::listenable_map;
pub use to_object::to_object;

/// The read-only result of an operator.
///
/// The operator keeps running for as long as this value lives.
pub struct DerivedCollection {
	view: Listenable,
	_operator: Rc<dyn Any>,
}

impl DerivedCollection {
	pub(crate) fn new(target: &Listenable, operator: Rc<dyn Any>) -> Self {
		DerivedCollection {
			view: target.as_readonly(),
			_operator: operator,
		}
	}

	pub fn listenable(&self) -> &Listenable {
		&self.view
	}
}

impl Deref for DerivedCollection {
	type Target = Listenable;

	fn deref(&self) -> &Listenable {
		&self.view
	}
}

impl fmt::Debug for DerivedCollection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.view.fmt(f)
	}
}
