use std::cell::{Cell, Ref, RefCell};
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use crate::addr::{Addr, WeakAddr};
use crate::batch::keep_first;
use crate::dependencies::Dependencies;
use crate::error::Result;
use crate::evaluation::Evaluation;
use crate::mutation::Mutation;
use crate::reaction::{Reactions, Reactive};
use crate::runtime::Runtime;
use crate::stream::{Observer, Source, Stream, Subscription};
use crate::{Derived, Hashed, Invalid, Observable, State, Version};

/// A value derived from other observables.
///
/// It is evaluated right away and re-evaluated after every batch that
/// changed something it read. Subscribers are only notified when the new
/// value hashes differently.
pub struct Computed<T>
where
	T: Hash + 'static,
{
	body: Rc<ComputedBody<T>>,
}

impl<T> Clone for Computed<T>
where
	T: Hash,
{
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

pub struct ComputedBody<T>
where
	T: Hash + 'static,
{
	runtime: Runtime,
	value: RefCell<Hashed<T>>,
	state: Cell<State>,
	notified: Cell<u64>,
	dependencies: RefCell<Dependencies>,
	children: RefCell<Reactions>,
	inner: RefCell<ComputedInner>,
	func: Box<dyn Fn(&Evaluation) -> T>,
	this: Weak<ComputedBody<T>>,
}

#[derive(Default)]
struct ComputedInner {
	used_by: BTreeSet<WeakAddr<dyn Derived>>,
	observers: Vec<(u64, Rc<dyn Fn() -> Result<()>>)>,
	next_id: u64,
}

impl<T> Drop for ComputedBody<T>
where
	T: Hash + 'static,
{
	fn drop(&mut self) {
		let this = self.this.clone() as Weak<dyn Derived>;
		self.dependencies.get_mut().release(&this);
	}
}

impl<T> Computed<T>
where
	T: Hash + 'static,
{
	pub(crate) fn new(runtime: Runtime, func: Box<dyn Fn(&Evaluation) -> T>) -> Self {
		Computed {
			body: Rc::new_cyclic(|this| {
				let parent = this.clone() as Weak<dyn Derived>;
				let evaluation = Evaluation::new(runtime.clone(), parent);
				let value = Hashed::new(func(&evaluation));
				let (dependencies, children) = evaluation.take();

				ComputedBody {
					runtime,
					notified: Cell::new(value.hash),
					value: RefCell::new(value),
					state: Cell::new(State::Valid),
					dependencies: RefCell::new(dependencies),
					children: RefCell::new(children),
					inner: RefCell::new(ComputedInner::default()),
					func,
					this: this.clone(),
				}
			}),
		}
	}

	#[inline]
	pub fn get_once(&self) -> Ref<'_, T> {
		self.body.get_once()
	}

	#[inline]
	pub fn get<'a>(&'a self, cx: &impl AsRef<Evaluation>) -> Ref<'a, T> {
		self.body.get(cx.as_ref())
	}

	pub fn state(&self) -> State {
		self.body.state.get()
	}

	/// Whether the last evaluation read nothing observable.
	pub fn is_constant(&self) -> bool {
		self.body.dependencies.borrow().is_empty() && self.body.children.borrow().is_empty()
	}

	/// Stops tracking. The last value stays readable.
	pub fn dispose(&self) {
		self.body.dispose()
	}

	pub fn stream(&self) -> Stream<T>
	where
		T: Clone,
	{
		Stream::new(self.body.clone())
	}

	#[must_use]
	pub fn subscribe(&self, func: impl Fn(&T) + 'static) -> Subscription
	where
		T: Clone,
	{
		self.stream().subscribe(func)
	}
}

impl<T> ComputedBody<T>
where
	T: Hash + 'static,
{
	pub fn get_once(&self) -> Ref<'_, T> {
		self.refresh();
		Ref::map(self.value.borrow(), |v| &v.value)
	}

	pub fn get<'a>(&'a self, eval: &'_ Evaluation) -> Ref<'a, T> {
		self.refresh();
		if let Some(this) = self.this.upgrade() {
			eval.based_on(this, self.version());
		}
		self.used_by(eval.parent());
		Ref::map(self.value.borrow(), |v| &v.value)
	}

	fn refresh(&self) {
		let is_valid = match self.state.get() {
			State::Valid | State::Disposed => true,
			State::Invalid(Invalid::Definitely) => false,
			State::Invalid(Invalid::Maybe) => {
				let dependencies = self.dependencies.borrow();
				dependencies.are_valid()
			}
		};

		if is_valid {
			if self.state.get() != State::Disposed {
				self.state.set(State::Valid);
			}
			return;
		}

		self.children.take().dispose();
		self.state.set(State::Valid);

		let this = self.this.clone() as Weak<dyn Derived>;
		let evaluation = Evaluation::new(self.runtime.clone(), this.clone());
		let value = (self.func)(&evaluation);
		let (dependencies, children) = evaluation.take();

		self.dependencies.borrow_mut().swap(dependencies, &this);
		*self.children.borrow_mut() = children;
		*self.value.borrow_mut() = Hashed::new(value);
	}

	fn dispose(&self) {
		if self.state.replace(State::Disposed) == State::Disposed {
			return;
		}

		let this = self.this.clone() as Weak<dyn Derived>;
		self.dependencies.borrow_mut().release(&this);
		self.children.take().dispose();
		self.inner.borrow_mut().observers.clear();
	}

	fn used_by(&self, derived: Weak<dyn Derived>) {
		self.inner.borrow_mut().used_by.insert(WeakAddr::new(derived));
	}

	fn not_used_by(&self, derived: &Weak<dyn Derived>) {
		self.inner
			.borrow_mut()
			.used_by
			.remove(&WeakAddr::new(derived.clone()));
	}
}

impl<T> Reactive for ComputedBody<T>
where
	T: Hash + 'static,
{
	fn update(&self) -> Result<()> {
		self.refresh();

		let hash = self.value.borrow().hash;
		if self.notified.replace(hash) == hash {
			return Ok(());
		}

		let observers: Vec<_> = self.inner.borrow().observers.iter().map(|(_, o)| o.clone()).collect();
		let mut result = Ok(());
		for observer in observers {
			keep_first(&mut result, observer());
		}
		result
	}

	fn abandon(&self) {
		self.refresh();
	}
}

impl<T> Observable for ComputedBody<T>
where
	T: Hash + 'static,
{
	fn update(&self) -> Version {
		self.refresh();
		self.version()
	}

	fn version(&self) -> Version {
		self.value.borrow().version()
	}

	fn used_by(&self, derived: Weak<dyn Derived>) {
		ComputedBody::used_by(self, derived)
	}

	fn not_used_by(&self, derived: &Weak<dyn Derived>) {
		ComputedBody::not_used_by(self, derived)
	}
}

impl<T> Derived for ComputedBody<T>
where
	T: Hash + 'static,
{
	fn invalidate(self: Rc<Self>, invalid: Invalid) {
		match self.state.get() {
			State::Valid => {
				self.state.set(State::Invalid(invalid));
				self.runtime.schedule(Rc::downgrade(&self) as Weak<dyn Reactive>);

				let used_by: Vec<_> = self.inner.borrow().used_by.iter().cloned().collect();
				for item in used_by {
					if let Some(item) = item.upgrade() {
						item.invalidate(Invalid::Maybe);
					}
				}
			}
			State::Invalid(Invalid::Maybe) if invalid == Invalid::Definitely => {
				self.state.set(State::Invalid(Invalid::Definitely));
			}
			_ => {}
		}
	}

	fn is_affected(&self, source: Addr, mutation: &Mutation) -> bool {
		match self.dependencies.try_borrow() {
			Ok(dependencies) => dependencies.affected_by(source, mutation),
			Err(_) => true,
		}
	}
}

impl<T> Source<T> for ComputedBody<T>
where
	T: Hash + Clone + 'static,
{
	fn attach(&self, observer: Observer<T>) -> Subscription {
		let this = self.this.clone();
		let notify: Rc<dyn Fn() -> Result<()>> = Rc::new(move || {
			let Some(body) = this.upgrade() else {
				return Ok(());
			};
			let value = body.value.borrow().value.clone();
			observer(&value)
		});

		let id = {
			let mut inner = self.inner.borrow_mut();
			inner.next_id += 1;
			let id = inner.next_id;
			inner.observers.push((id, notify));
			id
		};

		let this = self.this.clone();
		Subscription::new(move || {
			if let Some(body) = this.upgrade() {
				body.inner.borrow_mut().observers.retain(|(i, _)| *i != id);
			}
		})
	}

	fn current(&self) -> Option<T> {
		Some(self.get_once().clone())
	}
}

/// Result of [`Runtime::optionally_computed`](crate::Runtime::optionally_computed).
pub enum MaybeComputed<T>
where
	T: Hash + 'static,
{
	Plain(T),
	Computed(Computed<T>),
}

impl<T> MaybeComputed<T>
where
	T: Hash + Clone + 'static,
{
	pub fn get_once(&self) -> T {
		match self {
			MaybeComputed::Plain(value) => value.clone(),
			MaybeComputed::Computed(computed) => computed.get_once().clone(),
		}
	}

	pub fn is_computed(&self) -> bool {
		matches!(self, MaybeComputed::Computed(_))
	}
}

impl<T> Debug for Computed<T>
where
	T: Hash + Debug + 'static,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.get_once().fmt(f)
	}
}
