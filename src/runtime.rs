use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use crate::batch::Engine;
use crate::computed::{Computed, MaybeComputed};
use crate::error::Result;
use crate::evaluation::Evaluation;
use crate::listenable::{Listenable, Storage};
use crate::reaction::{Reaction, Reactive};
use crate::value::Item;
use crate::var::Var;

/// Engine-wide settings, owned by a [`Runtime`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
	/// Reject every write performed outside of a batch or transaction.
	pub strict: bool,
	/// How many rounds of reaction re-runs a single delivery may take before
	/// it is considered a loop.
	pub max_iterations: usize,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			strict: false,
			max_iterations: 100,
		}
	}
}

impl Config {
	pub fn strict(mut self, strict: bool) -> Self {
		self.strict = strict;
		self
	}

	pub fn max_iterations(mut self, max_iterations: usize) -> Self {
		self.max_iterations = max_iterations;
		self
	}
}

/// Root context of the reactive engine.
///
/// Everything created from a runtime shares its configuration, its batch
/// scope and its queue of pending reactions. Cloning is cheap.
#[derive(Clone)]
pub struct Runtime {
	pub(crate) body: Rc<RuntimeBody>,
}

pub(crate) struct RuntimeBody {
	pub(crate) config: Cell<Config>,
	pub(crate) engine: RefCell<Engine>,
	pub(crate) changed: RefCell<Vec<Weak<dyn Reactive>>>,
}

impl Default for Runtime {
	fn default() -> Self {
		Runtime::new(Config::default())
	}
}

impl Runtime {
	pub fn new(config: Config) -> Self {
		Runtime {
			body: Rc::new(RuntimeBody {
				config: Cell::new(config),
				engine: RefCell::new(Engine::default()),
				changed: RefCell::new(Vec::new()),
			}),
		}
	}

	pub fn config(&self) -> Config {
		self.body.config.get()
	}

	pub fn set_strict(&self, strict: bool) {
		self.body.config.set(self.config().strict(strict));
	}

	/// Wraps a record or sequence. Already wrapped values are returned as is.
	pub fn make_listenable(&self, value: impl Into<Item>) -> Result<Listenable> {
		match value.into() {
			Item::Listenable(listenable) => Ok(listenable),
			Item::Value(value) => Ok(Listenable::new(self.clone(), Storage::from_value(value)?)),
		}
	}

	pub fn list<I: Into<Item>>(&self, items: impl IntoIterator<Item = I>) -> Listenable {
		Listenable::new(
			self.clone(),
			Storage::List(items.into_iter().map(Into::into).collect()),
		)
	}

	pub fn record<K: Into<String>, I: Into<Item>>(
		&self,
		fields: impl IntoIterator<Item = (K, I)>,
	) -> Listenable {
		let fields: BTreeMap<String, Item> = fields
			.into_iter()
			.map(|(k, v)| (k.into(), v.into()))
			.collect();
		Listenable::new(self.clone(), Storage::Record(fields))
	}

	pub fn var<T: Hash + 'static>(&self, value: T) -> Var<T> {
		Var::new(self.clone(), value)
	}

	/// Evaluates `func` right away and again whenever something it read
	/// changes.
	pub fn computed<T: Hash + 'static>(&self, func: impl Fn(&Evaluation) -> T + 'static) -> Computed<T> {
		Computed::new(self.clone(), Box::new(func))
	}

	/// Like [`Runtime::computed`], but gives back the plain value when the
	/// first evaluation did not read anything observable.
	pub fn optionally_computed<T: Hash + Clone + 'static>(
		&self,
		func: impl Fn(&Evaluation) -> T + 'static,
	) -> MaybeComputed<T> {
		let computed = self.computed(func);
		if computed.is_constant() {
			let value = computed.get_once().clone();
			computed.dispose();
			MaybeComputed::Plain(value)
		} else {
			MaybeComputed::Computed(computed)
		}
	}

	/// Runs `func` now and re-runs it whenever something it read changes.
	///
	/// The reaction lives as long as the returned handle.
	#[must_use = "the reaction is disposed when the handle is dropped"]
	pub fn autorun(&self, func: impl Fn(&Evaluation) -> Result<()> + 'static) -> Result<Reaction> {
		self.autorun_named("autorun", func)
	}

	#[must_use = "the reaction is disposed when the handle is dropped"]
	pub fn autorun_named(
		&self,
		name: &str,
		func: impl Fn(&Evaluation) -> Result<()> + 'static,
	) -> Result<Reaction> {
		let reaction = Reaction::new(self.clone(), name, Box::new(func));
		if let Err(error) = reaction.run() {
			reaction.dispose();
			return Err(error);
		}
		Ok(reaction)
	}

	pub(crate) fn schedule(&self, reactive: Weak<dyn Reactive>) {
		self.body.changed.borrow_mut().push(reactive);
	}

	pub fn ptr_eq(&self, other: &Runtime) -> bool {
		Rc::ptr_eq(&self.body, &other.body)
	}
}

impl fmt::Debug for Runtime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Runtime")
			.field("config", &self.config())
			.field("in_batch", &self.in_batch())
			.finish()
	}
}
