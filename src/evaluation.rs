use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::dependencies::Dependencies;
use crate::error::Result;
use crate::listenable::ListenableBody;
use crate::mutation::Read;
use crate::reaction::{Reaction, Reactions};
use crate::runtime::Runtime;
use crate::{Derived, Observable, Version};

/// Tracking scope of one run of a computed value or a reaction.
///
/// Every tracked read performed with it is recorded, and the owner is
/// re-evaluated when one of those reads becomes stale.
pub struct Evaluation {
	runtime: Runtime,
	inner: RefCell<EvaluationInner>,
	parent: Weak<dyn Derived>,
}

impl AsRef<Evaluation> for Evaluation {
	fn as_ref(&self) -> &Evaluation {
		self
	}
}

struct EvaluationInner {
	dependencies: Dependencies,
	children: Reactions,
}

impl Evaluation {
	pub(crate) fn new(runtime: Runtime, parent: Weak<dyn Derived>) -> Self {
		Evaluation {
			runtime,
			parent,
			inner: RefCell::new({
				EvaluationInner {
					dependencies: Dependencies::new(),
					children: Reactions::default(),
				}
			}),
		}
	}

	pub fn runtime(&self) -> &Runtime {
		&self.runtime
	}

	pub(crate) fn parent(&self) -> Weak<dyn Derived> {
		self.parent.clone()
	}

	pub(crate) fn based_on(&self, observable: Rc<dyn Observable>, version: Version) {
		self.inner
			.borrow_mut()
			.dependencies
			.based_on(observable, version);
	}

	pub(crate) fn reads(&self, listenable: Rc<ListenableBody>, read: Read) {
		self.inner.borrow_mut().dependencies.reads(listenable, read);
	}

	/// Runs `func` as a nested reaction with its own dependencies.
	///
	/// The nested reaction re-runs on its own when what it read changes,
	/// without re-running this evaluation. It is disposed together with
	/// this evaluation's owner, or when the owner runs again.
	pub fn autorun_tree(&self, func: impl Fn(&Evaluation) -> Result<()> + 'static) -> Result<()> {
		let reaction = Reaction::new(self.runtime.clone(), "autorun_tree", Box::new(func));
		let result = reaction.run();
		self.inner.borrow_mut().children.add(reaction);
		result
	}

	pub(crate) fn take(self) -> (Dependencies, Reactions) {
		let inner = self.inner.into_inner();
		(inner.dependencies, inner.children)
	}
}
