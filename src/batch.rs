use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use fxhash::FxHashMap;
use smallvec::SmallVec;

use crate::access::Actor;
use crate::addr::Addr;
use crate::error::{Error, Result};
use crate::listenable::ListenableBody;
use crate::mutation::{Change, Mutation};
use crate::reaction::Reactive;
use crate::runtime::Runtime;

/// Batch bookkeeping of one [`Runtime`].
#[derive(Default)]
pub(crate) struct Engine {
	scope: Option<Scope>,
	queue: VecDeque<Batch>,
	delivering: bool,
}

/// The outermost open batch. Nested batches and transactions only push
/// savepoints into its log.
struct Scope {
	name: Option<Rc<str>>,
	depth: usize,
	log: Vec<Entry>,
}

enum Entry {
	Change(Logged),
	/// Undoes a write to something that is not a listenable.
	Restore(Box<dyn FnOnce()>),
}

pub(crate) struct Logged {
	target: Rc<ListenableBody>,
	mutation: Mutation,
	actor: Option<Actor>,
}

/// A committed batch waiting for delivery.
struct Batch {
	name: Option<Rc<str>>,
	entries: Vec<Logged>,
}

impl Batch {
	/// Merges consecutive mutations of one target by one actor and drops the
	/// ones that cancel out.
	fn optimize(&mut self) {
		let before = self.entries.len();
		let mut merged: Vec<Logged> = Vec::with_capacity(before);
		let mut last: FxHashMap<Addr, usize> = FxHashMap::default();

		for entry in self.entries.drain(..) {
			let addr = Addr::of(&entry.target);
			if let Some(&at) = last.get(&addr) {
				let prev = &mut merged[at];
				if prev.actor == entry.actor {
					if let Some(mutation) = prev.mutation.merge(&entry.mutation) {
						prev.mutation = mutation;
						continue;
					}
				}
			}

			last.insert(addr, merged.len());
			merged.push(entry);
		}

		merged.retain(|entry| !entry.mutation.is_noop());
		tracing::trace!(before, after = merged.len(), "optimized batch");
		self.entries = merged;
	}
}

/// An open batch or transaction level.
///
/// Leaving it without [`Savepoint::commit`] or [`Savepoint::rollback`], e.g.
/// while unwinding, rolls a transaction back and closes a plain batch.
#[must_use]
pub(crate) struct Savepoint<'a> {
	runtime: &'a Runtime,
	root: bool,
	mark: usize,
	transactional: bool,
	done: bool,
}

impl Savepoint<'_> {
	pub(crate) fn commit(mut self) -> Result<()> {
		self.done = true;
		self.runtime.close(self.root, true)
	}

	pub(crate) fn rollback(mut self) -> Result<()> {
		self.done = true;
		self.runtime.rollback_to(self.root, self.mark)
	}
}

impl Drop for Savepoint<'_> {
	fn drop(&mut self) {
		if self.done {
			return;
		}

		let result = if self.transactional {
			self.runtime.rollback_to(self.root, self.mark)
		} else {
			self.runtime.close(self.root, !std::thread::panicking())
		};

		if let Err(error) = result {
			tracing::error!(%error, "failed to close an abandoned batch");
		}
	}
}

/// Keeps the first error of a delivery, later ones are only logged.
pub(crate) fn keep_first(result: &mut Result<()>, next: Result<()>) {
	if let Err(error) = next {
		if result.is_ok() {
			*result = Err(error);
		} else {
			tracing::warn!(%error, "observer failed after an earlier error");
		}
	}
}

/// Drops pending updates so that the next invalidation schedules them again.
fn abandon(changed: Vec<Weak<dyn Reactive>>) {
	for reactive in changed.iter().filter_map(Weak::upgrade) {
		reactive.abandon();
	}
}

impl Runtime {
	pub fn in_batch(&self) -> bool {
		self.body.engine.borrow().scope.is_some()
	}

	/// Runs `func` in a batch named `name`. Writes made inside are delivered
	/// together, after the outermost batch ends.
	pub fn run_in_batch<R, E>(&self, name: &str, func: impl FnOnce() -> Result<R, E>) -> Result<R, E>
	where
		E: From<Error>,
	{
		let span = tracing::debug_span!("batch", batch = name);
		let _enter = span.enter();

		let savepoint = self.begin(Some(name), false);
		let result = func();
		let delivered = savepoint.commit();
		let value = result?;
		delivered?;
		Ok(value)
	}

	/// Like [`Runtime::run_in_batch`], but an error returned by `func` undoes
	/// every write made inside before it is returned.
	pub fn run_transaction<R, E>(&self, name: &str, func: impl FnOnce() -> Result<R, E>) -> Result<R, E>
	where
		E: From<Error>,
	{
		let span = tracing::debug_span!("transaction", transaction = name);
		let _enter = span.enter();

		let savepoint = self.begin(Some(name), true);
		match func() {
			Ok(value) => {
				savepoint.commit()?;
				Ok(value)
			}
			Err(error) => {
				tracing::debug!("transaction failed, rolling back");
				savepoint.rollback()?;
				Err(error)
			}
		}
	}

	/// Wraps `func` so that every call runs in its own batch.
	pub fn batched<A, R, E>(
		&self,
		name: &str,
		func: impl Fn(A) -> Result<R, E>,
	) -> impl Fn(A) -> Result<R, E>
	where
		E: From<Error>,
	{
		let runtime = self.clone();
		let name: Rc<str> = Rc::from(name);
		move |arg| runtime.run_in_batch(&name, || func(arg))
	}

	/// Wraps `func` so that every call runs in its own transaction.
	pub fn transactional<A, R, E>(
		&self,
		name: &str,
		func: impl Fn(A) -> Result<R, E>,
	) -> impl Fn(A) -> Result<R, E>
	where
		E: From<Error>,
	{
		let runtime = self.clone();
		let name: Rc<str> = Rc::from(name);
		move |arg| runtime.run_transaction(&name, || func(arg))
	}

	pub(crate) fn begin(&self, name: Option<&str>, transactional: bool) -> Savepoint<'_> {
		let mut engine = self.body.engine.borrow_mut();
		let (root, mark) = match engine.scope.as_mut() {
			Some(scope) => {
				scope.depth += 1;
				(false, scope.log.len())
			}
			None => {
				engine.scope = Some(Scope {
					name: name.map(Rc::from),
					depth: 1,
					log: Vec::new(),
				});
				(true, 0)
			}
		};

		Savepoint {
			runtime: self,
			root,
			mark,
			transactional,
			done: false,
		}
	}

	/// Performs a write. Outside of any batch the write gets an implicit
	/// one, unless strict mode forbids it.
	pub(crate) fn write<R>(&self, func: impl FnOnce() -> Result<R>) -> Result<R> {
		if self.config().strict && !self.in_batch() {
			return Err(Error::StrictModeViolation);
		}

		let savepoint = self.begin(None, false);
		let result = func();
		let delivered = savepoint.commit();
		let value = result?;
		delivered?;
		Ok(value)
	}

	pub(crate) fn record_change(&self, target: Rc<ListenableBody>, mutation: Mutation, actor: Option<Actor>) {
		tracing::trace!(?mutation, "recorded");
		let logged = Logged {
			target,
			mutation,
			actor,
		};

		let mut engine = self.body.engine.borrow_mut();
		match engine.scope.as_mut() {
			Some(scope) => scope.log.push(Entry::Change(logged)),
			None => engine.queue.push_back(Batch {
				name: None,
				entries: vec![logged],
			}),
		}
	}

	/// Registers an undo step for the innermost open transaction.
	pub(crate) fn record_restore(&self, restore: Box<dyn FnOnce()>) {
		if let Some(scope) = self.body.engine.borrow_mut().scope.as_mut() {
			scope.log.push(Entry::Restore(restore));
		}
	}

	fn close(&self, root: bool, deliver: bool) -> Result<()> {
		{
			let mut engine = self.body.engine.borrow_mut();
			let Some(scope) = engine.scope.as_mut() else {
				return Ok(());
			};

			scope.depth -= 1;
			if !root {
				return Ok(());
			}

			let Some(scope) = engine.scope.take() else {
				return Ok(());
			};

			let mut batch = Batch {
				name: scope.name,
				entries: scope
					.log
					.into_iter()
					.filter_map(|entry| match entry {
						Entry::Change(logged) => Some(logged),
						Entry::Restore(_) => None,
					})
					.collect(),
			};

			batch.optimize();
			if !batch.entries.is_empty() {
				engine.queue.push_back(batch);
			}
		};

		if deliver {
			self.drain()
		} else {
			Ok(())
		}
	}

	fn rollback_to(&self, root: bool, mark: usize) -> Result<()> {
		let undone = {
			let mut engine = self.body.engine.borrow_mut();
			let Some(scope) = engine.scope.as_mut() else {
				return Ok(());
			};

			scope.depth -= 1;
			let mark = mark.min(scope.log.len());
			let undone = scope.log.split_off(mark);
			if root {
				engine.scope = None;
			}
			undone
		};

		tracing::debug!(entries = undone.len(), "rolling back");

		for entry in undone.into_iter().rev() {
			match entry {
				Entry::Change(logged) => {
					if let Some(inverse) = logged.mutation.inverse() {
						logged.target.apply(&inverse);
					}
				}
				Entry::Restore(restore) => restore(),
			}
		}

		if root {
			self.drain()
		} else {
			Ok(())
		}
	}

	/// Delivers queued batches and re-runs invalidated reactions until
	/// nothing is left.
	pub(crate) fn drain(&self) -> Result<()> {
		{
			let mut engine = self.body.engine.borrow_mut();
			if engine.delivering || engine.scope.is_some() {
				return Ok(());
			}
			engine.delivering = true;
		}

		let result = self.drain_inner();
		self.body.engine.borrow_mut().delivering = false;

		if result.is_err() {
			self.body.engine.borrow_mut().queue.clear();
			let changed = std::mem::take(&mut *self.body.changed.borrow_mut());
			abandon(changed);
		}

		result
	}

	fn drain_inner(&self) -> Result<()> {
		let max_iterations = self.config().max_iterations;
		let mut result = Ok(());
		let mut rounds = 0;

		loop {
			let batch = self.body.engine.borrow_mut().queue.pop_front();
			if let Some(batch) = batch {
				keep_first(&mut result, self.deliver(batch));
				continue;
			}

			let changed = std::mem::take(&mut *self.body.changed.borrow_mut());
			if changed.is_empty() {
				break;
			}

			rounds += 1;
			if rounds > max_iterations {
				tracing::error!(max_iterations, "reactions keep invalidating each other");
				keep_first(&mut result, Err(Error::ReactionLoop(max_iterations)));
				abandon(changed);
				break;
			}

			for reaction in changed {
				if let Some(reactive) = reaction.upgrade() {
					keep_first(&mut result, reactive.update());
				}
			}
		}

		result
	}

	fn deliver(&self, batch: Batch) -> Result<()> {
		let span = tracing::debug_span!(
			"deliver",
			batch = batch.name.as_deref().unwrap_or("<write>"),
			changes = batch.entries.len()
		);
		let _enter = span.enter();

		let mut result = Ok(());
		let mut touched: Vec<(Rc<ListenableBody>, SmallVec<[Option<Actor>; 2]>)> = Vec::new();
		let mut index: FxHashMap<Addr, usize> = FxHashMap::default();

		for logged in batch.entries {
			let change = Change {
				mutation: logged.mutation,
				batch: batch.name.clone(),
				actor: logged.actor,
			};

			keep_first(&mut result, logged.target.notify(&change));

			let at = *index.entry(Addr::of(&logged.target)).or_insert_with(|| {
				touched.push((logged.target.clone(), SmallVec::new()));
				touched.len() - 1
			});
			touched[at].1.push(change.actor);
		}

		for (target, origins) in touched {
			keep_first(&mut result, target.notify_snapshot(&origins));
		}

		result
	}
}
