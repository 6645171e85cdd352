use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::{Rc, Weak};

use enclose::enclose;
use smallvec::SmallVec;

use crate::access::{Access, Actor};
use crate::addr::{Addr, WeakAddr};
use crate::batch::keep_first;
use crate::error::{Error, Result};
use crate::evaluation::Evaluation;
use crate::mutation::{Change, Mutation, Read};
use crate::runtime::Runtime;
use crate::stream::{Observer, Source, Stream, Subscription};
use crate::value::{Item, Key, Value};
use crate::{Derived, Invalid};

/// Content of one listenable.
pub(crate) enum Storage {
	List(Vec<Item>),
	Record(BTreeMap<String, Item>),
}

impl Storage {
	pub(crate) fn from_value(value: Value) -> Result<Storage> {
		match value {
			Value::List(items) => Ok(Storage::raw_list(items)),
			Value::Record(fields) => Ok(Storage::raw_record(fields)),
			other => Err(Error::NotAContainer(other.kind())),
		}
	}

	fn raw_list(items: Vec<Value>) -> Storage {
		Storage::List(items.into_iter().map(Item::Value).collect())
	}

	fn raw_record(fields: BTreeMap<String, Value>) -> Storage {
		Storage::Record(fields.into_iter().map(|(k, v)| (k, Item::Value(v))).collect())
	}

	fn kind(&self) -> &'static str {
		match self {
			Storage::List(_) => "list",
			Storage::Record(_) => "record",
		}
	}

	fn len(&self) -> usize {
		match self {
			Storage::List(items) => items.len(),
			Storage::Record(fields) => fields.len(),
		}
	}

	fn keys(&self) -> Vec<Key> {
		match self {
			Storage::List(items) => (0..items.len()).map(Key::Index).collect(),
			Storage::Record(fields) => fields.keys().cloned().map(Key::Field).collect(),
		}
	}

	fn slot_mut(&mut self, key: &Key) -> Option<&mut Item> {
		match (self, key) {
			(Storage::List(items), Key::Index(i)) => items.get_mut(*i),
			(Storage::Record(fields), Key::Field(f)) => fields.get_mut(f),
			_ => None,
		}
	}

	fn iter(&self) -> Box<dyn Iterator<Item = (Key, &Item)> + '_> {
		match self {
			Storage::List(items) => Box::new(items.iter().enumerate().map(|(i, item)| (Key::Index(i), item))),
			Storage::Record(fields) => Box::new(fields.iter().map(|(k, item)| (Key::Field(k.clone()), item))),
		}
	}
}

/// A handle to a listenable record or sequence.
///
/// Handles are cheap to clone and share the same content. A handle also
/// carries a write policy: full access, read-only, or writes tagged with an
/// [`Actor`].
#[derive(Clone)]
pub struct Listenable {
	body: Rc<ListenableBody>,
	access: Access,
}

pub struct ListenableBody {
	runtime: Runtime,
	storage: RefCell<Storage>,
	inner: RefCell<ListenableInner>,
	this: Weak<ListenableBody>,
}

#[derive(Default)]
struct ListenableInner {
	used_by: BTreeSet<WeakAddr<dyn Derived>>,
	subscribers: Vec<Rc<Subscriber>>,
	parents: SmallVec<[Parent; 1]>,
	bindings: BTreeMap<Key, Subscription>,
	next_id: u64,
}

/// A listenable that holds this one under `key`.
struct Parent {
	body: Weak<ListenableBody>,
	key: Key,
}

struct Subscriber {
	id: u64,
	viewer: Option<Actor>,
	active: Cell<bool>,
	kind: Kind,
}

enum Kind {
	Changes(Observer<Change>),
	Snapshot(Observer<Value>),
	Key(Key, Access, Observer<Option<Item>>),
}

impl Subscriber {
	/// Writes made by the subscriber's own actor are not reported back.
	fn hides(&self, origin: Option<&Actor>) -> bool {
		matches!((&self.viewer, origin), (Some(viewer), Some(origin)) if viewer == origin)
	}
}

impl Listenable {
	pub(crate) fn new(runtime: Runtime, storage: Storage) -> Self {
		Listenable::full(ListenableBody::new(runtime, storage))
	}

	pub(crate) fn full(body: Rc<ListenableBody>) -> Self {
		Listenable {
			body,
			access: Access::Full,
		}
	}

	pub(crate) fn body(&self) -> &Rc<ListenableBody> {
		&self.body
	}

	/// The same listenable with full access.
	pub(crate) fn canonical(&self) -> Listenable {
		Listenable::full(self.body.clone())
	}

	pub fn runtime(&self) -> &Runtime {
		&self.body.runtime
	}

	/// Whether both handles share the same content, regardless of access.
	pub fn ptr_eq(&self, other: &Listenable) -> bool {
		Rc::ptr_eq(&self.body, &other.body)
	}

	pub fn is_list(&self) -> bool {
		matches!(&*self.body.storage.borrow(), Storage::List(_))
	}

	pub fn is_record(&self) -> bool {
		!self.is_list()
	}

	pub fn is_read_only(&self) -> bool {
		self.access == Access::ReadOnly
	}

	pub fn actor(&self) -> Option<Actor> {
		self.access.viewer()
	}

	fn track(&self, cx: &impl AsRef<Evaluation>, read: Read) {
		let eval = cx.as_ref();
		eval.reads(self.body.clone(), read);
		self.body.used_by(eval.parent());
	}

	fn view(&self, item: Item) -> Item {
		view(&self.access, item)
	}

	pub fn get(&self, cx: &impl AsRef<Evaluation>, key: impl Into<Key>) -> Option<Item> {
		let key = key.into();
		self.track(cx, Read::Key(key.clone()));
		self.get_once(key)
	}

	pub fn get_once(&self, key: impl Into<Key>) -> Option<Item> {
		self.body.child(&key.into()).map(|item| self.view(item))
	}

	pub fn len(&self, cx: &impl AsRef<Evaluation>) -> usize {
		self.track(cx, Read::Shape);
		self.len_once()
	}

	pub fn len_once(&self) -> usize {
		self.body.storage.borrow().len()
	}

	pub fn is_empty_once(&self) -> bool {
		self.len_once() == 0
	}

	pub fn keys(&self, cx: &impl AsRef<Evaluation>) -> Vec<Key> {
		self.track(cx, Read::Shape);
		self.keys_once()
	}

	pub fn keys_once(&self) -> Vec<Key> {
		self.body.storage.borrow().keys()
	}

	/// All slots in order, nested containers as listenables.
	pub fn items(&self, cx: &impl AsRef<Evaluation>) -> Vec<Item> {
		self.track(cx, Read::Whole);
		self.items_once()
	}

	pub fn items_once(&self) -> Vec<Item> {
		self.body
			.children()
			.into_iter()
			.map(|(_, item)| self.view(item))
			.collect()
	}

	/// Deep copy of the current content.
	pub fn snapshot(&self, cx: &impl AsRef<Evaluation>) -> Value {
		self.track(cx, Read::Whole);
		self.snapshot_once()
	}

	pub fn snapshot_once(&self) -> Value {
		self.body.snapshot()
	}

	/// Sets a record field, or replaces a sequence slot. Setting the slot
	/// right after the last one appends.
	pub fn set(&self, key: impl Into<Key>, value: impl Into<Item>) -> Result<()> {
		let key = key.into();
		let actor = self.access.writer()?;
		self.body.unbind(&key);
		self.body.put(key, value.into(), actor)
	}

	/// Deletes a record field, or removes a sequence slot.
	pub fn remove(&self, key: impl Into<Key>) -> Result<Option<Item>> {
		let key = key.into();
		let actor = self.access.writer()?;
		self.body.unbind(&key);
		self.body.delete(key, actor)
	}

	/// Removes up to `delete_count` items at `start` and inserts `items` in
	/// their place. Returns the removed items.
	pub fn splice<I: Into<Item>>(
		&self,
		start: usize,
		delete_count: usize,
		items: impl IntoIterator<Item = I>,
	) -> Result<Vec<Item>> {
		let actor = self.access.writer()?;
		let items = items.into_iter().map(Into::into).collect();
		self.body.splice(start, delete_count, items, actor)
	}

	pub fn push(&self, item: impl Into<Item>) -> Result<()> {
		let len = self.len_once();
		self.splice(len, 0, [item]).map(drop)
	}

	pub fn insert(&self, index: usize, item: impl Into<Item>) -> Result<()> {
		self.splice(index, 0, [item]).map(drop)
	}

	pub fn pop(&self) -> Result<Option<Item>> {
		let len = self.len_once();
		if len == 0 {
			self.access.writer()?;
			return Ok(None);
		}
		Ok(self.splice(len - 1, 1, Vec::<Item>::new())?.pop())
	}

	pub fn clear(&self) -> Result<()> {
		let actor = self.access.writer()?;
		let runtime = self.body.runtime.clone();
		runtime.write(|| match self.keys_once().first() {
			None => Ok(()),
			Some(Key::Index(_)) => {
				let len = self.len_once();
				self.body.splice(0, len, Vec::new(), actor).map(drop)
			}
			Some(Key::Field(_)) => {
				for key in self.keys_once() {
					self.body.unbind(&key);
					self.body.delete(key, actor.clone())?;
				}
				Ok(())
			}
		})
	}

	/// Every delivered mutation, except the ones made by this handle's actor.
	pub fn listen(&self) -> Stream<Change> {
		Stream::new(Rc::new(ChangeFeed {
			body: self.body.clone(),
			viewer: self.access.viewer(),
		}))
	}

	/// A fresh snapshot after every batch that changed this listenable.
	pub fn as_observable(&self) -> Stream<Value> {
		Stream::new(Rc::new(SnapshotFeed {
			body: self.body.clone(),
			viewer: self.access.viewer(),
		}))
	}

	/// The value under `key`, after every batch that touched it.
	pub fn observable(&self, key: impl Into<Key>) -> Stream<Option<Item>> {
		Stream::new(Rc::new(KeyFeed {
			body: self.body.clone(),
			access: self.access.clone(),
			key: key.into(),
		}))
	}

	pub fn observables(&self) -> BTreeMap<Key, Stream<Option<Item>>> {
		self.keys_once()
			.into_iter()
			.map(|key| (key.clone(), self.observable(key)))
			.collect()
	}

	pub fn as_readonly(&self) -> Listenable {
		Listenable {
			body: self.body.clone(),
			access: Access::ReadOnly,
		}
	}

	pub fn as_actor(&self, name: &str) -> Listenable {
		let access = match self.access {
			Access::ReadOnly => Access::ReadOnly,
			_ => Access::Actor(Actor::new(name)),
		};
		Listenable {
			body: self.body.clone(),
			access,
		}
	}

	/// Keeps `key` set to the latest value of `stream` until the key is
	/// written again, removed or unbound.
	pub fn bind<T>(&self, key: impl Into<Key>, stream: &Stream<T>) -> Result<()>
	where
		T: Clone + Into<Item> + 'static,
	{
		let key = key.into();
		let actor = self.access.writer()?;
		self.body.unbind(&key);

		if let Some(value) = stream.current() {
			self.body.put(key.clone(), value.into(), actor.clone())?;
		}

		let body = Rc::downgrade(&self.body);
		let subscription = stream.try_subscribe(enclose!((key) move |value: &T| {
			let Some(body) = body.upgrade() else {
				return Ok(());
			};
			let runtime = body.runtime.clone();
			runtime.run_in_batch("bind", || body.put(key.clone(), value.clone().into(), actor.clone()))
		}));

		let previous = self.body.inner.borrow_mut().bindings.insert(key, subscription);
		drop(previous);
		Ok(())
	}

	pub fn unbind(&self, key: impl Into<Key>) {
		self.body.unbind(&key.into())
	}
}

fn view(access: &Access, item: Item) -> Item {
	match item {
		Item::Listenable(nested) => Item::Listenable(Listenable {
			access: access.restrict(&nested.access),
			body: nested.body,
		}),
		item => item,
	}
}

impl ListenableBody {
	pub(crate) fn new(runtime: Runtime, storage: Storage) -> Rc<Self> {
		let body = Rc::new_cyclic(|this| ListenableBody {
			runtime,
			storage: RefCell::new(storage),
			inner: RefCell::new(ListenableInner::default()),
			this: this.clone(),
		});

		let nested: Vec<_> = body
			.storage
			.borrow()
			.iter()
			.filter_map(|(key, item)| item.as_listenable().map(|l| (key, l.body.clone())))
			.collect();
		for (key, child) in nested {
			child.link(&body.this, key);
		}

		body
	}

	fn link(&self, parent: &Weak<ListenableBody>, key: Key) {
		self.inner.borrow_mut().parents.push(Parent {
			body: parent.clone(),
			key,
		});
	}

	fn unlink(&self, parent: Addr, matches: impl Fn(&Key) -> bool) {
		self.inner
			.borrow_mut()
			.parents
			.retain(|p| !(Addr::of_weak(&p.body) == parent && matches(&p.key)));
	}

	/// Raw nested containers are wrapped on first access, in place.
	fn wrap_raw(&self, slot: &mut Item) -> Option<Rc<ListenableBody>> {
		let storage = match slot {
			Item::Value(Value::List(items)) => Storage::raw_list(std::mem::take(items)),
			Item::Value(Value::Record(fields)) => Storage::raw_record(std::mem::take(fields)),
			_ => return None,
		};

		let child = ListenableBody::new(self.runtime.clone(), storage);
		*slot = Item::Listenable(Listenable::full(child.clone()));
		Some(child)
	}

	pub(crate) fn child(&self, key: &Key) -> Option<Item> {
		let (item, wrapped) = {
			let mut storage = self.storage.borrow_mut();
			let slot = storage.slot_mut(key)?;
			let wrapped = self.wrap_raw(slot);
			(slot.clone(), wrapped)
		};

		if let Some(child) = wrapped {
			child.link(&self.this, key.clone());
		}

		Some(item)
	}

	pub(crate) fn children(&self) -> Vec<(Key, Item)> {
		let mut wrapped = Vec::new();
		let children = {
			let mut storage = self.storage.borrow_mut();
			let keys = storage.keys();
			let mut children = Vec::with_capacity(keys.len());
			for key in keys {
				if let Some(slot) = storage.slot_mut(&key) {
					if let Some(child) = self.wrap_raw(slot) {
						wrapped.push((key.clone(), child));
					}
					children.push((key, slot.clone()));
				}
			}
			children
		};

		for (key, child) in wrapped {
			child.link(&self.this, key);
		}

		children
	}

	pub(crate) fn len(&self) -> usize {
		self.storage.borrow().len()
	}

	pub(crate) fn snapshot(&self) -> Value {
		let storage = self.storage.borrow();
		match &*storage {
			Storage::List(items) => Value::List(items.iter().map(Item::to_value).collect()),
			Storage::Record(fields) => {
				Value::Record(fields.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
			}
		}
	}

	/// Containers written into a listenable become listenables themselves.
	fn adopt(&self, item: Item) -> Item {
		match item {
			Item::Value(Value::List(items)) => Item::Listenable(Listenable::full(ListenableBody::new(
				self.runtime.clone(),
				Storage::raw_list(items),
			))),
			Item::Value(Value::Record(fields)) => Item::Listenable(Listenable::full(ListenableBody::new(
				self.runtime.clone(),
				Storage::raw_record(fields),
			))),
			item => item,
		}
	}

	fn put(self: &Rc<Self>, key: Key, item: Item, actor: Option<Actor>) -> Result<()> {
		let runtime = self.runtime.clone();
		runtime.write(|| {
			let item = self.adopt(item);
			let mutation = {
				let storage = self.storage.borrow();
				match (&*storage, &key) {
					(Storage::Record(fields), Key::Field(field)) => Mutation::Property {
						key: key.clone(),
						old: fields.get(field).cloned(),
						new: Some(item),
					},
					(Storage::List(items), Key::Index(index)) if *index < items.len() => Mutation::Property {
						key: key.clone(),
						old: Some(items[*index].clone()),
						new: Some(item),
					},
					(Storage::List(items), Key::Index(index)) if *index == items.len() => Mutation::Splice {
						index: *index,
						removed: Vec::new(),
						inserted: vec![item],
					},
					(Storage::List(items), Key::Index(index)) => {
						return Err(Error::IndexOutOfBounds {
							index: *index,
							len: items.len(),
						})
					}
					(storage, key) => {
						return Err(Error::InvalidKey {
							key: key.clone(),
							kind: storage.kind(),
						})
					}
				}
			};

			if !mutation.is_noop() {
				self.perform(mutation, actor);
			}
			Ok(())
		})
	}

	fn delete(self: &Rc<Self>, key: Key, actor: Option<Actor>) -> Result<Option<Item>> {
		let field = match key {
			Key::Index(index) => return Ok(self.splice(index, 1, Vec::new(), actor)?.pop()),
			Key::Field(field) => field,
		};

		let runtime = self.runtime.clone();
		runtime.write(|| {
			let old = match &*self.storage.borrow() {
				Storage::Record(fields) => fields.get(&field).cloned(),
				storage => {
					return Err(Error::InvalidKey {
						key: Key::Field(field.clone()),
						kind: storage.kind(),
					})
				}
			};

			let Some(old) = old else {
				return Ok(None);
			};

			self.perform(
				Mutation::Property {
					key: Key::Field(field),
					old: Some(old.clone()),
					new: None,
				},
				actor,
			);
			Ok(Some(old))
		})
	}

	fn splice(
		self: &Rc<Self>,
		start: usize,
		delete_count: usize,
		items: Vec<Item>,
		actor: Option<Actor>,
	) -> Result<Vec<Item>> {
		let runtime = self.runtime.clone();
		runtime.write(|| {
			let removed = {
				let storage = self.storage.borrow();
				let Storage::List(current) = &*storage else {
					return Err(Error::KindMismatch {
						expected: "list",
						found: storage.kind(),
					});
				};
				if start > current.len() {
					return Err(Error::IndexOutOfBounds {
						index: start,
						len: current.len(),
					});
				}
				let end = start + delete_count.min(current.len() - start);
				current[start..end].to_vec()
			};

			let inserted = items.into_iter().map(|item| self.adopt(item)).collect();
			let mutation = Mutation::Splice {
				index: start,
				removed: removed.clone(),
				inserted,
			};

			if !mutation.is_noop() {
				self.perform(mutation, actor);
			}
			Ok(removed)
		})
	}

	fn perform(self: &Rc<Self>, mutation: Mutation, actor: Option<Actor>) {
		self.apply(&mutation);
		self.emit(mutation, actor);
	}

	/// Applies `mutation` to the storage and keeps parent links of nested
	/// listenables in sync. Used both for writes and for rollback.
	pub(crate) fn apply(&self, mutation: &Mutation) {
		let mut detached = Vec::new();
		{
			let mut storage = self.storage.borrow_mut();
			match (mutation, &mut *storage) {
				(Mutation::Property { key: Key::Field(field), new, .. }, Storage::Record(fields)) => {
					let old = match new {
						Some(item) => fields.insert(field.clone(), item.clone()),
						None => fields.remove(field),
					};
					detached.extend(old);
				}
				(Mutation::Property { key: Key::Index(index), new: Some(item), .. }, Storage::List(items)) => {
					if let Some(slot) = items.get_mut(*index) {
						detached.push(std::mem::replace(slot, item.clone()));
					}
				}
				(Mutation::Splice { index, removed, inserted }, Storage::List(items)) => {
					let start = (*index).min(items.len());
					let end = (start + removed.len()).min(items.len());
					detached.extend(items.splice(start..end, inserted.iter().cloned()));
				}
				_ => {
					tracing::warn!(?mutation, "mutation does not fit the storage");
					return;
				}
			}
		}

		let this = Addr::of_weak(&self.this);
		match mutation {
			Mutation::Property { key, new, .. } => {
				for item in &detached {
					if let Item::Listenable(child) = item {
						child.body.unlink(this, |k| k == key);
					}
				}
				if let Some(Item::Listenable(child)) = new {
					child.body.link(&self.this, key.clone());
				}
			}
			Mutation::Splice { index, .. } => {
				let from = *index;
				let shifted = |k: &Key| matches!(k, Key::Index(i) if *i >= from);
				let tail = self.listenables_from(from);

				for item in &detached {
					if let Item::Listenable(child) = item {
						child.body.unlink(this, shifted);
					}
				}
				for (_, child) in &tail {
					child.unlink(this, shifted);
				}
				for (index, child) in tail {
					child.link(&self.this, Key::Index(index));
				}
			}
			Mutation::Subproperty { .. } => {}
		}
	}

	fn listenables_from(&self, from: usize) -> Vec<(usize, Rc<ListenableBody>)> {
		match &*self.storage.borrow() {
			Storage::List(items) => items
				.iter()
				.enumerate()
				.skip(from)
				.filter_map(|(i, item)| item.as_listenable().map(|l| (i, l.body.clone())))
				.collect(),
			Storage::Record(_) => Vec::new(),
		}
	}

	/// Records `mutation` and reports it to every listenable holding this
	/// one, up to the roots. A parent holding this one under several keys
	/// gets one subproperty mutation per key.
	fn emit(self: &Rc<Self>, mutation: Mutation, actor: Option<Actor>) {
		let mut visited = BTreeSet::new();
		let mut pending = vec![(self.clone(), mutation)];

		while let Some((body, mutation)) = pending.pop() {
			let via = match &mutation {
				Mutation::Subproperty { key, .. } => Some(key.clone()),
				_ => None,
			};
			if !visited.insert((Addr::of(&body), via)) {
				continue;
			}

			let parents: Vec<_> = body
				.inner
				.borrow()
				.parents
				.iter()
				.filter_map(|p| p.body.upgrade().map(|parent| (parent, p.key.clone())))
				.collect();

			for (parent, key) in parents {
				pending.push((
					parent,
					Mutation::Subproperty {
						key,
						inner: Box::new(mutation.clone()),
					},
				));
			}

			self.runtime.record_change(body, mutation, actor.clone());
		}
	}

	fn unbind(&self, key: &Key) {
		let previous = self.inner.borrow_mut().bindings.remove(key);
		drop(previous);
	}

	fn subscribe(&self, viewer: Option<Actor>, kind: Kind) -> Subscription {
		let subscriber = {
			let mut inner = self.inner.borrow_mut();
			inner.next_id += 1;
			let subscriber = Rc::new(Subscriber {
				id: inner.next_id,
				viewer,
				active: Cell::new(true),
				kind,
			});
			inner.subscribers.push(subscriber.clone());
			subscriber
		};

		let body = self.this.clone();
		Subscription::new(move || {
			subscriber.active.set(false);
			if let Some(body) = body.upgrade() {
				body.inner
					.borrow_mut()
					.subscribers
					.retain(|s| s.id != subscriber.id);
			}
		})
	}

	/// Delivers one change: invalidates affected runners, then reports the
	/// change to change and key subscribers.
	pub(crate) fn notify(&self, change: &Change) -> Result<()> {
		let source = Addr::of_weak(&self.this);
		let (used_by, subscribers) = {
			let inner = self.inner.borrow();
			let used_by: Vec<_> = inner.used_by.iter().cloned().collect();
			(used_by, inner.subscribers.clone())
		};

		for derived in used_by {
			if let Some(derived) = derived.upgrade() {
				if derived.is_affected(source, &change.mutation) {
					derived.invalidate(Invalid::Definitely);
				}
			}
		}

		let mut result = Ok(());
		let mut touched: Option<Vec<Key>> = None;

		for subscriber in subscribers {
			if !subscriber.active.get() || subscriber.hides(change.actor.as_ref()) {
				continue;
			}

			let outcome = match &subscriber.kind {
				Kind::Changes(observer) => observer(change),
				Kind::Key(key, access, observer) => {
					let touched = touched.get_or_insert_with(|| change.mutation.touched_keys(self.len()));
					if touched.contains(key) {
						observer(&self.child(key).map(|item| view(access, item)))
					} else {
						Ok(())
					}
				}
				Kind::Snapshot(_) => Ok(()),
			};
			keep_first(&mut result, outcome);
		}

		result
	}

	/// Sends one snapshot per batch, unless every change in it came from the
	/// subscriber's own actor.
	pub(crate) fn notify_snapshot(&self, origins: &[Option<Actor>]) -> Result<()> {
		let subscribers = self.inner.borrow().subscribers.clone();
		let mut result = Ok(());
		let mut snapshot = None;

		for subscriber in subscribers {
			let Kind::Snapshot(observer) = &subscriber.kind else {
				continue;
			};
			if !subscriber.active.get() || origins.iter().all(|o| subscriber.hides(o.as_ref())) {
				continue;
			}

			let value = snapshot.get_or_insert_with(|| self.snapshot());
			keep_first(&mut result, observer(value));
		}

		result
	}

	fn used_by(&self, derived: Weak<dyn Derived>) {
		self.inner.borrow_mut().used_by.insert(WeakAddr::new(derived));
	}

	pub(crate) fn not_used_by(&self, derived: &Weak<dyn Derived>) {
		self.inner
			.borrow_mut()
			.used_by
			.remove(&WeakAddr::new(derived.clone()));
	}
}


struct ChangeFeed {
	body: Rc<ListenableBody>,
	viewer: Option<Actor>,
}

impl Source<Change> for ChangeFeed {
	fn attach(&self, observer: Observer<Change>) -> Subscription {
		self.body.subscribe(self.viewer.clone(), Kind::Changes(observer))
	}
}

struct SnapshotFeed {
	body: Rc<ListenableBody>,
	viewer: Option<Actor>,
}

impl Source<Value> for SnapshotFeed {
	fn attach(&self, observer: Observer<Value>) -> Subscription {
		self.body.subscribe(self.viewer.clone(), Kind::Snapshot(observer))
	}

	fn current(&self) -> Option<Value> {
		Some(self.body.snapshot())
	}
}

struct KeyFeed {
	body: Rc<ListenableBody>,
	access: Access,
	key: Key,
}

impl Source<Option<Item>> for KeyFeed {
	fn attach(&self, observer: Observer<Option<Item>>) -> Subscription {
		self.body.subscribe(
			self.access.viewer(),
			Kind::Key(self.key.clone(), self.access.clone(), observer),
		)
	}

	fn current(&self) -> Option<Option<Item>> {
		Some(self.body.child(&self.key).map(|item| view(&self.access, item)))
	}
}

impl fmt::Debug for Listenable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Listenable")
			.field("access", &self.access)
			.field("value", &self.body.snapshot())
			.finish()
	}
}
