use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::listenable::Listenable;

/// Identity attached to writes made through an actor view.
///
/// Two actors with the same name are the same actor.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Actor(Rc<str>);

impl Actor {
	pub fn new(name: &str) -> Self {
		Actor(Rc::from(name))
	}

	pub fn name(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for Actor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Actor({})", self.0)
	}
}

/// Write policy of a [`Listenable`] handle. All handles of one listenable
/// share the same storage, only the policy differs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Access {
	Full,
	ReadOnly,
	Actor(Actor),
}

impl Access {
	/// Identity for writes, or a violation when writes are not allowed.
	pub(crate) fn writer(&self) -> Result<Option<Actor>> {
		match self {
			Access::Full => Ok(None),
			Access::Actor(actor) => Ok(Some(actor.clone())),
			Access::ReadOnly => Err(Error::ReadOnlyViolation),
		}
	}

	/// Identity whose own writes are hidden from this handle's streams.
	pub(crate) fn viewer(&self) -> Option<Actor> {
		match self {
			Access::Actor(actor) => Some(actor.clone()),
			_ => None,
		}
	}

	/// Policy of a nested value reached through a handle with `self` policy.
	pub(crate) fn restrict(&self, nested: &Access) -> Access {
		match (self, nested) {
			(Access::ReadOnly, _) | (_, Access::ReadOnly) => Access::ReadOnly,
			(Access::Actor(actor), _) => Access::Actor(actor.clone()),
			(Access::Full, nested) => nested.clone(),
		}
	}
}

/// A view of `listenable` whose writes are tagged with `name` and whose
/// streams never report those writes back.
pub fn as_actor(name: &str, listenable: &Listenable) -> Listenable {
	listenable.as_actor(name)
}
