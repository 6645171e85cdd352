use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::addr::Addr;
use crate::dependencies::Dependencies;
use crate::error::Result;
use crate::evaluation::Evaluation;
use crate::mutation::Mutation;
use crate::runtime::Runtime;
use crate::{Derived, Invalid, State};

/// Something that is re-run by the runtime after it was invalidated.
pub trait Reactive {
	fn update(&self) -> Result<()>;

	/// The pending update was dropped after a failed delivery. The runner
	/// must accept invalidations again.
	fn abandon(&self);
}

/// Reactions owned by another runner, disposed together with it.
#[derive(Default)]
pub struct Reactions {
	vec: SmallVec<[Reaction; 2]>,
}

impl Reactions {
	pub fn add(&mut self, reaction: Reaction) {
		self.vec.push(reaction);
	}

	pub fn len(&self) -> usize {
		self.vec.len()
	}

	pub fn is_empty(&self) -> bool {
		self.vec.is_empty()
	}

	pub fn dispose(self) {
		for reaction in &self.vec {
			reaction.dispose()
		}
	}
}

/// A side effect that re-runs whenever something it read changes.
///
/// Dropping the last handle disposes it.
#[derive(Clone)]
pub struct Reaction {
	pub(crate) body: Rc<ReactionBody>,
}

pub struct ReactionBody {
	runtime: Runtime,
	name: Rc<str>,
	state: Cell<State>,
	dependencies: RefCell<Dependencies>,
	children: RefCell<Reactions>,
	func: Box<dyn Fn(&Evaluation) -> Result<()>>,
	this: Weak<ReactionBody>,
}

impl Drop for ReactionBody {
	fn drop(&mut self) {
		let this = self.this.clone() as Weak<dyn Derived>;
		self.dependencies.get_mut().release(&this);
	}
}

impl Reaction {
	#[must_use]
	pub fn new(runtime: Runtime, name: &str, func: Box<dyn Fn(&Evaluation) -> Result<()>>) -> Self {
		Reaction {
			body: Rc::new_cyclic(|this| ReactionBody {
				runtime,
				name: Rc::from(name),
				state: Cell::new(State::Invalid(Invalid::Definitely)),
				dependencies: RefCell::new(Dependencies::new()),
				children: RefCell::new(Reactions::default()),
				func,
				this: this.clone(),
			}),
		}
	}

	pub fn name(&self) -> &str {
		&self.body.name
	}

	pub fn state(&self) -> State {
		self.body.state.get()
	}

	/// Runs the reaction now, whether it is stale or not.
	pub fn run(&self) -> Result<()> {
		self.body.run()
	}

	pub fn update(&self) -> Result<()> {
		Reactive::update(&*self.body)
	}

	/// Stops tracking. A disposed reaction never runs again.
	pub fn dispose(&self) {
		self.body.dispose()
	}

	pub fn is_disposed(&self) -> bool {
		self.state() == State::Disposed
	}
}

impl ReactionBody {
	fn run(&self) -> Result<()> {
		if self.state.get() == State::Disposed {
			return Ok(());
		}

		let span = tracing::trace_span!("reaction", name = %self.name);
		let _enter = span.enter();

		self.children.take().dispose();
		self.state.set(State::Valid);

		let this = self.this.clone() as Weak<dyn Derived>;
		let savepoint = self.runtime.begin(Some(&self.name), false);
		let evaluation = Evaluation::new(self.runtime.clone(), this.clone());
		let result = (self.func)(&evaluation);
		let (mut dependencies, children) = evaluation.take();

		if self.state.get() == State::Disposed {
			dependencies.release(&this);
			children.dispose();
		} else {
			self.dependencies.borrow_mut().swap(dependencies, &this);
			*self.children.borrow_mut() = children;
		}

		if let Err(error) = &result {
			tracing::debug!(%error, "reaction failed");
		}

		let delivered = savepoint.commit();
		result?;
		delivered
	}

	fn dispose(&self) {
		if self.state.replace(State::Disposed) == State::Disposed {
			return;
		}

		let this = self.this.clone() as Weak<dyn Derived>;
		self.dependencies.borrow_mut().release(&this);
		self.children.take().dispose();
	}
}

impl Reactive for ReactionBody {
	fn update(&self) -> Result<()> {
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
			return Ok(());
		}

		self.run()
	}

	fn abandon(&self) {
		if let State::Invalid(_) = self.state.get() {
			self.state.set(State::Valid);
		}
	}
}

impl Derived for ReactionBody {
	fn invalidate(self: Rc<Self>, invalid: Invalid) {
		match self.state.get() {
			State::Valid => {
				self.state.set(State::Invalid(invalid));
				self.runtime.schedule(Rc::downgrade(&self) as Weak<dyn Reactive>);
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

impl std::fmt::Debug for Reaction {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Reaction")
			.field("name", &self.body.name)
			.field("state", &self.body.state.get())
			.finish()
	}
}
