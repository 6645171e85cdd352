use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::Result;
use crate::evaluation::Evaluation;
use crate::listenable::Listenable;
use crate::mutation::{Change, Mutation};
use crate::ops::DerivedCollection;
use crate::reaction::Reaction;
use crate::runtime::Runtime;
use crate::stream::Subscription;
use crate::value::{Item, Key, Value};

type Transform = dyn Fn(&Evaluation, &Item) -> Item;

struct MapOperator {
	runtime: Runtime,
	target: Listenable,
	transform: Rc<Transform>,
	slots: RefCell<Slots>,
	subscription: RefCell<Option<Subscription>>,
}

enum Slots {
	List(Vec<Rc<Slot>>),
	Record(BTreeMap<String, Rc<Slot>>),
}

/// One mapped element, with the reaction that keeps its output current.
struct Slot {
	key: RefCell<Key>,
	item: Item,
	output: RefCell<Option<Item>>,
	reaction: RefCell<Option<Reaction>>,
}

impl Slot {
	fn output(&self) -> Item {
		self.output
			.borrow()
			.clone()
			.unwrap_or(Item::Value(Value::Null))
	}

	fn dispose(&self) {
		if let Some(reaction) = self.reaction.borrow_mut().take() {
			reaction.dispose();
		}
	}
}

/// A collection holding `transform(element)` for every element of `source`.
///
/// Reads `transform` makes through its [`Evaluation`] are tracked per
/// element: when they change, only that element is mapped again.
pub fn listenable_map<F>(source: &Listenable, transform: F) -> Result<DerivedCollection>
where
	F: Fn(&Evaluation, &Item) -> Item + 'static,
{
	let runtime = source.runtime().clone();
	let source = source.canonical();
	let target = if source.is_list() {
		runtime.list(Vec::<Item>::new())
	} else {
		runtime.record(Vec::<(String, Item)>::new())
	};

	let operator = Rc::new(MapOperator {
		runtime: runtime.clone(),
		target: target.clone(),
		transform: Rc::new(transform),
		slots: RefCell::new(if source.is_list() {
			Slots::List(Vec::new())
		} else {
			Slots::Record(BTreeMap::new())
		}),
		subscription: RefCell::new(None),
	});

	runtime.run_in_batch("listenable_map", || -> Result<()> {
		for (key, item) in source.body().children() {
			let slot = operator.spawn(key.clone(), item)?;
			let output = slot.output();
			match (&mut *operator.slots.borrow_mut(), &key) {
				(Slots::List(slots), Key::Index(_)) => slots.push(slot),
				(Slots::Record(slots), Key::Field(field)) => {
					slots.insert(field.clone(), slot);
				}
				_ => continue,
			}
			operator.target.set(key, output)?;
		}
		Ok(())
	})?;

	let weak = Rc::downgrade(&operator);
	let subscription = source.listen().try_subscribe(move |change| match weak.upgrade() {
		Some(operator) => operator.on_change(change),
		None => Ok(()),
	});
	*operator.subscription.borrow_mut() = Some(subscription);

	Ok(DerivedCollection::new(&target, operator))
}

impl MapOperator {
	fn spawn(&self, key: Key, item: Item) -> Result<Rc<Slot>> {
		let slot = Rc::new(Slot {
			key: RefCell::new(key),
			item,
			output: RefCell::new(None),
			reaction: RefCell::new(None),
		});

		let weak = Rc::downgrade(&slot);
		let target = self.target.clone();
		let transform = self.transform.clone();
		let reaction = Reaction::new(
			self.runtime.clone(),
			"listenable_map",
			Box::new(move |cx| {
				let Some(slot) = weak.upgrade() else {
					return Ok(());
				};
				let output = transform(cx, &slot.item);
				let previous = slot.output.replace(Some(output.clone()));
				if previous.is_some() {
					let key = slot.key.borrow().clone();
					target.set(key, output)?;
				}
				Ok(())
			}),
		);

		reaction.run()?;
		*slot.reaction.borrow_mut() = Some(reaction);
		Ok(slot)
	}

	fn on_change(&self, change: &Change) -> Result<()> {
		self.runtime.run_in_batch("listenable_map", || match &change.mutation {
			Mutation::Splice {
				index,
				removed,
				inserted,
			} => self.splice(*index, removed.len(), inserted),
			Mutation::Property { key, new, .. } => self.replace(key, new.as_ref()),
			Mutation::Subproperty { .. } => Ok(()),
		})
	}

	fn splice(&self, index: usize, removed: usize, inserted: &[Item]) -> Result<()> {
		let fresh = inserted
			.iter()
			.enumerate()
			.map(|(offset, item)| self.spawn(Key::Index(index + offset), item.clone()))
			.collect::<Result<Vec<_>>>()?;
		let outputs: Vec<Item> = fresh.iter().map(|slot| slot.output()).collect();

		let dropped: Vec<Rc<Slot>> = {
			let mut slots = self.slots.borrow_mut();
			let Slots::List(slots) = &mut *slots else {
				return Ok(());
			};
			let start = index.min(slots.len());
			let end = (start + removed).min(slots.len());
			let dropped = slots.splice(start..end, fresh).collect();
			for (i, slot) in slots.iter().enumerate().skip(start) {
				*slot.key.borrow_mut() = Key::Index(i);
			}
			dropped
		};

		for slot in dropped {
			slot.dispose();
		}

		self.target.splice(index, removed, outputs).map(drop)
	}

	fn replace(&self, key: &Key, new: Option<&Item>) -> Result<()> {
		let fresh = match new {
			Some(item) => Some(self.spawn(key.clone(), item.clone())?),
			None => None,
		};
		let output = fresh.as_ref().map(|slot| slot.output());

		let previous = {
			let mut slots = self.slots.borrow_mut();
			match (&mut *slots, key, fresh) {
				(Slots::List(slots), Key::Index(i), Some(slot)) => match slots.get_mut(*i) {
					Some(current) => Some(std::mem::replace(current, slot)),
					None => None,
				},
				(Slots::Record(slots), Key::Field(field), Some(slot)) => slots.insert(field.clone(), slot),
				(Slots::Record(slots), Key::Field(field), None) => slots.remove(field),
				_ => None,
			}
		};

		if let Some(slot) = previous {
			slot.dispose();
		}

		match output {
			Some(output) => self.target.set(key.clone(), output),
			None => self.target.remove(key.clone()).map(drop),
		}
	}
}

impl Drop for MapOperator {
	fn drop(&mut self) {
		match self.slots.get_mut() {
			Slots::List(slots) => slots.iter().for_each(|slot| slot.dispose()),
			Slots::Record(slots) => slots.values().for_each(|slot| slot.dispose()),
		}
	}
}
