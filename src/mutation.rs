use std::rc::Rc;

use crate::access::Actor;
use crate::value::{Item, Key};

/// One atomic change of a listenable.
///
/// Every variant carries what is needed to undo it: the previous value of a
/// property, or the sub-sequence a splice removed.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
	/// A record field (or an existing sequence slot) was set or deleted.
	/// `old == None` means the key did not exist, `new == None` means it was
	/// deleted.
	Property {
		key: Key,
		old: Option<Item>,
		new: Option<Item>,
	},
	/// `removed` was replaced by `inserted`, starting at `index`.
	Splice {
		index: usize,
		removed: Vec<Item>,
		inserted: Vec<Item>,
	},
	/// Something changed inside the nested listenable stored under `key`.
	Subproperty { key: Key, inner: Box<Mutation> },
}

/// What a tracked read observed.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Read {
	/// The full content, nested values included.
	Whole,
	/// Length of a sequence or the key set of a record.
	Shape,
	/// A single slot.
	Key(Key),
}

impl Mutation {
	/// The mutation that restores the state before `self`.
	///
	/// Subproperty mutations have no inverse of their own, undoing the inner
	/// mutation on the nested listenable takes care of them.
	pub fn inverse(&self) -> Option<Mutation> {
		match self {
			Mutation::Property { key, old, new } => Some(Mutation::Property {
				key: key.clone(),
				old: new.clone(),
				new: old.clone(),
			}),
			Mutation::Splice {
				index,
				removed,
				inserted,
			} => Some(Mutation::Splice {
				index: *index,
				removed: inserted.clone(),
				inserted: removed.clone(),
			}),
			Mutation::Subproperty { .. } => None,
		}
	}

	pub fn is_noop(&self) -> bool {
		match self {
			Mutation::Property { old, new, .. } => old == new,
			Mutation::Splice {
				removed, inserted, ..
			} => removed.is_empty() && inserted.is_empty(),
			Mutation::Subproperty { inner, .. } => inner.is_noop(),
		}
	}

	/// Whether a reader that observed `read` can see a difference.
	pub fn affects(&self, read: &Read) -> bool {
		match (self, read) {
			(_, Read::Whole) => true,
			(Mutation::Subproperty { .. }, _) => false,
			(Mutation::Property { old, new, .. }, Read::Shape) => old.is_some() != new.is_some(),
			(Mutation::Property { key, .. }, Read::Key(read)) => key == read,
			(
				Mutation::Splice {
					removed, inserted, ..
				},
				Read::Shape,
			) => removed.len() != inserted.len(),
			(
				Mutation::Splice {
					index,
					removed,
					inserted,
				},
				Read::Key(Key::Index(i)),
			) => {
				if i < index {
					false
				} else if removed.len() == inserted.len() {
					*i < index + removed.len()
				} else {
					true
				}
			}
			(Mutation::Splice { .. }, Read::Key(Key::Field(_))) => false,
		}
	}

	/// Keys whose slot can hold something different after this mutation,
	/// given the length of the sequence once the mutation has been applied.
	pub fn touched_keys(&self, len_after: usize) -> Vec<Key> {
		match self {
			Mutation::Property { key, .. } | Mutation::Subproperty { key, .. } => vec![key.clone()],
			Mutation::Splice {
				index,
				removed,
				inserted,
			} => {
				let end = if removed.len() == inserted.len() {
					index + removed.len()
				} else {
					let len_before = (len_after + removed.len()).saturating_sub(inserted.len());
					len_after.max(len_before)
				};
				(*index..end).map(Key::Index).collect()
			}
		}
	}

	/// Folds `next` into `self` when both can be expressed as a single
	/// mutation of the same listenable.
	pub fn merge(&self, next: &Mutation) -> Option<Mutation> {
		match (self, next) {
			(
				Mutation::Property { key, old, .. },
				Mutation::Property {
					key: next_key,
					new,
					..
				},
			) if key == next_key => Some(Mutation::Property {
				key: key.clone(),
				old: old.clone(),
				new: new.clone(),
			}),
			(
				Mutation::Splice {
					index,
					removed,
					inserted,
				},
				Mutation::Splice {
					index: next_index,
					removed: next_removed,
					inserted: next_inserted,
				},
			) => {
				if *next_index == index + inserted.len() {
					// continues right after the inserted range, anything it
					// removes followed the original removed range
					let mut removed = removed.clone();
					removed.extend(next_removed.iter().cloned());
					let mut inserted = inserted.clone();
					inserted.extend(next_inserted.iter().cloned());
					Some(Mutation::Splice {
						index: *index,
						removed,
						inserted,
					})
				} else if next_index == index && next_removed.is_empty() {
					let mut merged = next_inserted.clone();
					merged.extend(inserted.iter().cloned());
					Some(Mutation::Splice {
						index: *index,
						removed: removed.clone(),
						inserted: merged,
					})
				} else {
					None
				}
			}
			(
				Mutation::Subproperty { key, inner },
				Mutation::Subproperty {
					key: next_key,
					inner: next_inner,
				},
			) if key == next_key => inner.merge(next_inner).map(|inner| Mutation::Subproperty {
				key: key.clone(),
				inner: Box::new(inner),
			}),
			_ => None,
		}
	}
}

/// A mutation as delivered to subscribers: tagged with the batch that
/// produced it and the actor that wrote it.
#[derive(Clone, Debug, PartialEq)]
pub struct Change {
	pub mutation: Mutation,
	pub batch: Option<Rc<str>>,
	pub actor: Option<Actor>,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn ints(values: &[i64]) -> Vec<Item> {
		values.iter().map(|v| Item::from(*v)).collect()
	}

	fn splice(index: usize, removed: &[i64], inserted: &[i64]) -> Mutation {
		Mutation::Splice {
			index,
			removed: ints(removed),
			inserted: ints(inserted),
		}
	}

	#[test]
	fn appends_merge_into_one_insert() {
		let merged = splice(3, &[], &[1])
			.merge(&splice(4, &[], &[2]))
			.and_then(|m| m.merge(&splice(5, &[], &[3])));
		assert_eq!(merged, Some(splice(3, &[], &[1, 2, 3])));
	}

	#[test]
	fn prepends_merge_in_reverse_order() {
		let merged = splice(0, &[], &[1]).merge(&splice(0, &[], &[2]));
		assert_eq!(merged, Some(splice(0, &[], &[2, 1])));
	}

	#[test]
	fn gap_breaks_contiguity() {
		assert_eq!(splice(0, &[], &[1]).merge(&splice(5, &[], &[2])), None);
	}

	#[test]
	fn removal_after_insert_extends_removed_range() {
		let merged = splice(1, &[7], &[1]).merge(&splice(2, &[8], &[]));
		assert_eq!(merged, Some(splice(1, &[7, 8], &[1])));
	}

	#[test]
	fn property_writes_keep_first_old_value() {
		let first = Mutation::Property {
			key: "a".into(),
			old: Some(1.into()),
			new: Some(2.into()),
		};
		let second = Mutation::Property {
			key: "a".into(),
			old: Some(2.into()),
			new: Some(1.into()),
		};
		let merged = first.merge(&second).unwrap();
		assert!(merged.is_noop());
	}

	#[test]
	fn inverse_of_splice_swaps_ranges() {
		assert_eq!(splice(2, &[1], &[4, 5]).inverse(), Some(splice(2, &[4, 5], &[1])));
	}

	#[test]
	fn splice_affects_only_shifted_indices() {
		let m = splice(2, &[], &[9]);
		assert!(!m.affects(&Read::Key(Key::Index(1))));
		assert!(m.affects(&Read::Key(Key::Index(5))));
		assert!(m.affects(&Read::Shape));

		let replace = splice(2, &[1], &[9]);
		assert!(!replace.affects(&Read::Key(Key::Index(3))));
		assert!(!replace.affects(&Read::Shape));
	}

	#[test]
	fn subproperty_only_affects_whole_reads() {
		let m = Mutation::Subproperty {
			key: "a".into(),
			inner: Box::new(splice(0, &[], &[1])),
		};
		assert!(m.affects(&Read::Whole));
		assert!(!m.affects(&Read::Key("a".into())));
	}
}
