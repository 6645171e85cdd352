use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::Result;
use crate::listenable::Listenable;
use crate::mutation::{Change, Mutation};
use crate::ops::DerivedCollection;
use crate::runtime::Runtime;
use crate::stream::Subscription;
use crate::value::{Item, Key};

struct FilterOperator {
	runtime: Runtime,
	target: Listenable,
	predicate: Box<dyn Fn(&Item) -> bool>,
	entries: RefCell<Entries>,
	subscription: RefCell<Option<Subscription>>,
}

/// Source elements as of the last delivered change, with their last result.
///
/// Kept in step with delivered mutations only, so a nested change is
/// re-tested against the element that held the reported key when it
/// happened, even if a later change of the same batch moved it.
enum Entries {
	List(Vec<Entry>),
	Record(BTreeMap<String, Entry>),
}

struct Entry {
	item: Item,
	pass: bool,
}

/// A collection of the elements of `source` that satisfy `predicate`, in
/// source order.
///
/// The predicate is not tracked. An element is tested again when it is
/// replaced or when something inside it changes.
pub fn filter<F>(source: &Listenable, predicate: F) -> Result<DerivedCollection>
where
	F: Fn(&Item) -> bool + 'static,
{
	let runtime = source.runtime().clone();
	let source = source.canonical();
	let children = source.body().children();

	let (target, entries) = if source.is_list() {
		let entries: Vec<Entry> = children
			.into_iter()
			.map(|(_, item)| Entry {
				pass: predicate(&item),
				item,
			})
			.collect();
		let passing: Vec<Item> = entries
			.iter()
			.filter(|entry| entry.pass)
			.map(|entry| entry.item.clone())
			.collect();
		(runtime.list(passing), Entries::List(entries))
	} else {
		let entries: BTreeMap<String, Entry> = children
			.into_iter()
			.filter_map(|(key, item)| match key {
				Key::Field(field) => Some((
					field,
					Entry {
						pass: predicate(&item),
						item,
					},
				)),
				Key::Index(_) => None,
			})
			.collect();
		let passing: Vec<(String, Item)> = entries
			.iter()
			.filter(|(_, entry)| entry.pass)
			.map(|(field, entry)| (field.clone(), entry.item.clone()))
			.collect();
		(runtime.record(passing), Entries::Record(entries))
	};

	let operator = Rc::new(FilterOperator {
		runtime,
		target: target.clone(),
		predicate: Box::new(predicate),
		entries: RefCell::new(entries),
		subscription: RefCell::new(None),
	});

	let weak = Rc::downgrade(&operator);
	let subscription = source.listen().try_subscribe(move |change| match weak.upgrade() {
		Some(operator) => operator.on_change(change),
		None => Ok(()),
	});
	*operator.subscription.borrow_mut() = Some(subscription);

	Ok(DerivedCollection::new(&target, operator))
}

impl FilterOperator {
	fn on_change(&self, change: &Change) -> Result<()> {
		self.runtime.run_in_batch("filter", || match &change.mutation {
			Mutation::Splice {
				index,
				removed,
				inserted,
			} => self.splice(*index, removed.len(), inserted),
			Mutation::Property {
				key: Key::Index(index),
				new: Some(item),
				..
			} => self.retest_index(*index, Some(item.clone())),
			Mutation::Property {
				key: Key::Field(field),
				new,
				..
			} => self.retest_field(field, Some(new.clone())),
			Mutation::Subproperty { key, .. } => match key {
				Key::Index(index) => self.retest_index(*index, None),
				Key::Field(field) => self.retest_field(field, None),
			},
			Mutation::Property { .. } => Ok(()),
		})
	}

	/// Translates one source splice into at most one target splice.
	fn splice(&self, index: usize, removed: usize, inserted: &[Item]) -> Result<()> {
		let fresh: Vec<Entry> = inserted
			.iter()
			.map(|item| Entry {
				item: item.clone(),
				pass: (self.predicate)(item),
			})
			.collect();
		let passing: Vec<Item> = fresh
			.iter()
			.filter(|entry| entry.pass)
			.map(|entry| entry.item.clone())
			.collect();

		let (at, dropped) = {
			let mut entries = self.entries.borrow_mut();
			let Entries::List(entries) = &mut *entries else {
				return Ok(());
			};
			let start = index.min(entries.len());
			let end = (start + removed).min(entries.len());
			let at = entries[..start].iter().filter(|entry| entry.pass).count();
			let dropped = entries[start..end].iter().filter(|entry| entry.pass).count();
			entries.splice(start..end, fresh);
			(at, dropped)
		};

		if dropped > 0 || !passing.is_empty() {
			self.target.splice(at, dropped, passing)?;
		}
		Ok(())
	}

	/// Tests the element at `index` again. `replacement` is the new element
	/// when the slot was overwritten, `None` when it changed in place.
	fn retest_index(&self, index: usize, replacement: Option<Item>) -> Result<()> {
		let (item, was, pass, at) = {
			let mut entries = self.entries.borrow_mut();
			let Entries::List(entries) = &mut *entries else {
				return Ok(());
			};
			let at = entries.iter().take(index).filter(|entry| entry.pass).count();
			let Some(entry) = entries.get_mut(index) else {
				return Ok(());
			};
			if let Some(item) = replacement {
				entry.item = item;
			}
			let was = entry.pass;
			entry.pass = (self.predicate)(&entry.item);
			(entry.item.clone(), was, entry.pass, at)
		};

		match (was, pass) {
			(false, true) => self.target.insert(at, item),
			(true, false) => self.target.splice(at, 1, Vec::<Item>::new()).map(drop),
			(true, true) => self.target.set(at, item),
			(false, false) => Ok(()),
		}
	}

	/// Tests the field again. `replacement` is `Some(new)` when the field was
	/// set or deleted, `None` when its value changed in place.
	fn retest_field(&self, field: &str, replacement: Option<Option<Item>>) -> Result<()> {
		let (item, was, pass) = {
			let mut entries = self.entries.borrow_mut();
			let Entries::Record(entries) = &mut *entries else {
				return Ok(());
			};
			let was = entries.get(field).map_or(false, |entry| entry.pass);
			match replacement {
				Some(None) => {
					entries.remove(field);
					(None, was, false)
				}
				Some(Some(item)) => {
					let pass = (self.predicate)(&item);
					entries.insert(
						field.to_owned(),
						Entry {
							item: item.clone(),
							pass,
						},
					);
					(Some(item), was, pass)
				}
				None => match entries.get_mut(field) {
					Some(entry) => {
						entry.pass = (self.predicate)(&entry.item);
						(Some(entry.item.clone()), was, entry.pass)
					}
					None => return Ok(()),
				},
			}
		};

		match (item, pass) {
			(Some(item), true) => self.target.set(field, item),
			(_, false) if was => self.target.remove(field).map(drop),
			_ => Ok(()),
		}
	}
}
