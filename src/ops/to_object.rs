use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::listenable::Listenable;
use crate::mutation::{Change, Mutation};
use crate::ops::DerivedCollection;
use crate::runtime::Runtime;
use crate::stream::Subscription;
use crate::value::{Item, Key};

struct IndexOperator {
	runtime: Runtime,
	target: Listenable,
	key_of: Box<dyn Fn(&Item) -> String>,
	/// Key of every source element, `None` for elements that were rejected.
	keys: RefCell<Vec<Option<String>>>,
	subscription: RefCell<Option<Subscription>>,
}

/// A record holding every element of the sequence `source` under
/// `key_of(element)`.
///
/// Keys must be unique. A change that would introduce a duplicate is
/// rejected with [`Error::DuplicateKey`] and leaves the record unchanged.
pub fn to_object<F>(source: &Listenable, key_of: F) -> Result<DerivedCollection>
where
	F: Fn(&Item) -> String + 'static,
{
	let runtime = source.runtime().clone();
	let source = source.canonical();
	if !source.is_list() {
		return Err(Error::KindMismatch {
			expected: "list",
			found: "record",
		});
	}

	let mut keys = Vec::new();
	let mut fields = Vec::new();
	let mut seen = BTreeSet::new();
	for (_, item) in source.body().children() {
		let key = key_of(&item);
		if !seen.insert(key.clone()) {
			return Err(Error::DuplicateKey(key));
		}
		keys.push(Some(key.clone()));
		fields.push((key, item));
	}

	let target = runtime.record(fields);
	let operator = Rc::new(IndexOperator {
		runtime,
		target: target.clone(),
		key_of: Box::new(key_of),
		keys: RefCell::new(keys),
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

impl IndexOperator {
	fn on_change(&self, change: &Change) -> Result<()> {
		self.runtime.run_in_batch("to_object", || match &change.mutation {
			Mutation::Splice {
				index,
				removed,
				inserted,
			} => self.splice(*index, removed.len(), inserted),
			Mutation::Property {
				key: Key::Index(index),
				new: Some(item),
				..
			} => self.update(*index, item),
			Mutation::Property { .. } | Mutation::Subproperty { .. } => Ok(()),
		})
	}

	fn splice(&self, index: usize, removed: usize, inserted: &[Item]) -> Result<()> {
		let fresh: Vec<String> = inserted.iter().map(|item| (self.key_of)(item)).collect();

		let (freed, duplicate) = {
			let keys = self.keys.borrow();
			let start = index.min(keys.len());
			let end = (start + removed).min(keys.len());
			let freed: Vec<String> = keys[start..end].iter().flatten().cloned().collect();

			let mut taken: BTreeSet<&str> = keys[..start]
				.iter()
				.chain(&keys[end..])
				.flatten()
				.map(String::as_str)
				.collect();
			let duplicate = fresh.iter().find(|key| !taken.insert(key.as_str())).cloned();
			(freed, duplicate)
		};

		let start = {
			let mut keys = self.keys.borrow_mut();
			let start = index.min(keys.len());
			let end = (start + removed).min(keys.len());
			let entries: Vec<Option<String>> = match &duplicate {
				Some(_) => vec![None; fresh.len()],
				None => fresh.iter().cloned().map(Some).collect(),
			};
			keys.splice(start..end, entries);
			start
		};

		if let Some(key) = duplicate {
			tracing::warn!(%key, index = start, "rejected a duplicate key");
			return Err(Error::DuplicateKey(key));
		}

		for key in freed.iter().filter(|key| !fresh.contains(key)) {
			self.target.remove(key.as_str())?;
		}
		for (key, item) in fresh.into_iter().zip(inserted) {
			self.target.set(key, item.clone())?;
		}
		Ok(())
	}

	fn update(&self, index: usize, item: &Item) -> Result<()> {
		let current = self.keys.borrow().get(index).cloned().flatten();
		if let Some(key) = current {
			return self.target.set(key, item.clone());
		}

		let key = (self.key_of)(item);
		let taken = self.keys.borrow().iter().flatten().any(|k| *k == key);
		if taken {
			return Err(Error::DuplicateKey(key));
		}

		if let Some(slot) = self.keys.borrow_mut().get_mut(index) {
			*slot = Some(key.clone());
		}
		self.target.set(key, item.clone())
	}
}
