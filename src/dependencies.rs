use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};

use crate::addr::Addr;
use crate::listenable::ListenableBody;
use crate::mutation::{Mutation, Read};
use crate::{Derived, Observable, Version};

/// What one evaluation read, keyed by the observable it read from.
#[derive(Default)]
pub struct Dependencies {
	based_on: BTreeMap<Addr, Based>,
}

enum Based {
	/// A value-like observable, valid while its version is unchanged.
	Version {
		observable: Rc<dyn Observable>,
		version: Version,
	},
	/// Slots of a listenable, invalidated by mutations touching them.
	Reads {
		listenable: Rc<ListenableBody>,
		reads: BTreeSet<Read>,
	},
}

impl Based {
	fn not_used_by(&self, parent: &Weak<dyn Derived>) {
		match self {
			Based::Version { observable, .. } => observable.not_used_by(parent),
			Based::Reads { listenable, .. } => listenable.not_used_by(parent),
		}
	}
}

impl Dependencies {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_empty(&self) -> bool {
		self.based_on.is_empty()
	}

	pub fn based_on(&mut self, observable: Rc<dyn Observable>, version: Version) {
		self.based_on
			.insert(Addr::of(&observable), Based::Version { observable, version });
	}

	pub(crate) fn reads(&mut self, listenable: Rc<ListenableBody>, read: Read) {
		let based = self.based_on.entry(Addr::of(&listenable)).or_insert_with(|| Based::Reads {
			listenable,
			reads: BTreeSet::new(),
		});

		if let Based::Reads { reads, .. } = based {
			reads.insert(read);
		}
	}

	pub fn are_valid(&self) -> bool {
		for based in self.based_on.values() {
			if let Based::Version { observable, version } = based {
				if observable.update() != *version {
					return false;
				}
			}
		}

		true
	}

	pub(crate) fn affected_by(&self, source: Addr, mutation: &Mutation) -> bool {
		match self.based_on.get(&source) {
			Some(Based::Reads { reads, .. }) => reads.iter().any(|read| mutation.affects(read)),
			Some(Based::Version { .. }) => true,
			None => false,
		}
	}

	/// Detaches `parent` from everything it was based on.
	pub fn release(&mut self, parent: &Weak<dyn Derived>) {
		for based in std::mem::take(&mut self.based_on).values() {
			based.not_used_by(parent)
		}
	}

	pub fn swap(&mut self, next: Dependencies, parent: &Weak<dyn Derived>) {
		let prev = std::mem::replace(&mut self.based_on, next.based_on);

		// Diff the keys
		prev.iter()
			.filter(|(k, _)| !self.based_on.contains_key(k))
			.for_each(|(_, based)| based.not_used_by(parent));
	}
}
