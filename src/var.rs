use std::cell::{Cell, Ref, RefCell};
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use crate::addr::WeakAddr;
use crate::computed::Computed;
use crate::error::Result;
use crate::evaluation::Evaluation;
use crate::reaction::Reaction;
use crate::runtime::Runtime;
use crate::stream::{Observer, Source, Stream, Subscription};
use crate::{Derived, Hashed, Invalid, Observable, Version};

/// A single observable cell.
///
/// Writes follow the same rules as listenable writes: they are rejected
/// outside of a batch in strict mode and undone by a failing transaction.
pub struct Var<T> {
	body: Rc<VarBody<T>>,
}

pub struct VarBody<T> {
	runtime: Runtime,
	value: RefCell<Hashed<T>>,
	inner: RefCell<VarInner>,
	this: Weak<VarBody<T>>,
}

#[derive(Default)]
struct VarInner {
	used_by: BTreeSet<WeakAddr<dyn Derived>>,
}

impl<T> Clone for Var<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

pub trait Toggle {
	fn toggle(&mut self);
}

impl Toggle for bool {
	fn toggle(&mut self) {
		*self = !*self
	}
}

impl<T> Var<T>
where
	T: 'static,
{
	pub(crate) fn new(runtime: Runtime, value: T) -> Self
	where
		T: Hash,
	{
		Var {
			body: Rc::new_cyclic(|this| VarBody {
				runtime,
				value: RefCell::new(Hashed::new(value)),
				inner: RefCell::new(VarInner::default()),
				this: this.clone(),
			}),
		}
	}

	pub fn map<F, R>(&self, func: F) -> Computed<R>
	where
		F: Fn(&T) -> R + 'static,
		R: Hash + 'static,
	{
		let this = self.body.clone();
		self.body.runtime.computed(move |ev| {
			let value = this.get(ev);
			func(&*value)
		})
	}

	#[inline]
	pub fn get(&self, eval: &impl AsRef<Evaluation>) -> Ref<'_, T> {
		self.body.get(eval.as_ref())
	}

	#[inline]
	pub fn get_once(&self) -> Ref<'_, T> {
		self.body.get_once()
	}

	#[inline]
	pub fn set(&self, value: T) -> Result<()>
	where
		T: Hash + Clone,
	{
		self.body.replace(value).map(drop)
	}

	#[inline]
	pub fn toggle(&self) -> Result<()>
	where
		T: Toggle + Hash + Clone,
	{
		self.update(T::toggle)
	}

	#[inline]
	pub fn replace(&self, value: T) -> Result<T>
	where
		T: Hash + Clone,
	{
		self.body.replace(value)
	}

	#[inline]
	pub fn update(&self, func: impl FnOnce(&mut T)) -> Result<()>
	where
		T: Hash + Clone,
	{
		self.body.update(func)
	}

	pub fn stream(&self) -> Stream<T>
	where
		T: Clone,
	{
		Stream::new(self.body.clone())
	}
}

impl<T> VarBody<T>
where
	T: 'static,
{
	pub fn get_once(&self) -> Ref<'_, T> {
		Ref::map(self.value.borrow(), |s| &s.value)
	}

	pub fn get<'a>(&'a self, eval: &'_ Evaluation) -> Ref<'a, T> {
		let value = self.value.borrow();
		if let Some(this) = self.this.upgrade() {
			eval.based_on(this, value.version());
		}
		self.used_by(eval.parent());
		Ref::map(value, |v| &v.value)
	}

	pub fn update(&self, func: impl FnOnce(&mut T)) -> Result<()>
	where
		T: Hash + Clone,
	{
		let mut next = self.value.borrow().value.clone();
		func(&mut next);
		self.replace(next).map(drop)
	}

	pub fn replace(&self, value: T) -> Result<T>
	where
		T: Hash + Clone,
	{
		let runtime = self.runtime.clone();
		runtime.write(|| {
			let next = Hashed::new(value);
			let changed = next.hash != self.value.borrow().hash;
			let old = std::mem::replace(&mut *self.value.borrow_mut(), next);

			if changed {
				let this = self.this.clone();
				let previous = old.value.clone();
				self.runtime.record_restore(Box::new(move || {
					if let Some(body) = this.upgrade() {
						*body.value.borrow_mut() = Hashed::new(previous);
						body.invalidate();
					}
				}));
				self.invalidate();
			}

			Ok(old.value)
		})
	}

	fn invalidate(&self) {
		let used_by: Vec<_> = self.inner.borrow().used_by.iter().cloned().collect();
		for item in used_by {
			if let Some(item) = item.upgrade() {
				item.invalidate(Invalid::Definitely)
			}
		}
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

impl<T: 'static> Observable for VarBody<T> {
	fn version(&self) -> Version {
		self.value.borrow().version()
	}

	fn update(&self) -> Version {
		self.version()
	}

	fn used_by(&self, derived: Weak<dyn Derived>) {
		VarBody::used_by(self, derived)
	}

	fn not_used_by(&self, derived: &Weak<dyn Derived>) {
		VarBody::not_used_by(self, derived)
	}
}

impl<T> Source<T> for VarBody<T>
where
	T: Clone + 'static,
{
	fn attach(&self, observer: Observer<T>) -> Subscription {
		let this = self.this.clone();
		let first = Cell::new(true);
		let reaction = Reaction::new(
			self.runtime.clone(),
			"var",
			Box::new(move |cx| {
				let Some(body) = this.upgrade() else {
					return Ok(());
				};
				let value = body.get(cx).clone();
				if first.replace(false) {
					return Ok(());
				}
				observer(&value)
			}),
		);

		if let Err(error) = reaction.run() {
			tracing::warn!(%error, "delivery failed while attaching to a var");
		}

		Subscription::new(move || reaction.dispose())
	}

	fn current(&self) -> Option<T> {
		Some(self.get_once().clone())
	}
}

impl<T> Hash for Var<T>
where
	T: Hash,
{
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		state.write_u64(self.body.value.borrow().hash);
	}
}

impl<T> Debug for Var<T>
where
	T: 'static + Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.get_once().fmt(f)
	}
}
