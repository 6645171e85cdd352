use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::Result;

pub(crate) type Observer<T> = Rc<dyn Fn(&T) -> Result<()>>;

/// Something a [`Stream`] can attach observers to.
pub trait Source<T>: 'static {
	fn attach(&self, observer: Observer<T>) -> Subscription;

	/// Latest value, for sources that have one.
	fn current(&self) -> Option<T> {
		None
	}
}

/// A push-based stream of values.
///
/// Observers run synchronously while a committed batch is delivered. An
/// observer error is returned from the call that caused the delivery.
pub struct Stream<T> {
	source: Rc<dyn Source<T>>,
}

impl<T> Clone for Stream<T> {
	fn clone(&self) -> Self {
		Stream {
			source: self.source.clone(),
		}
	}
}

impl<T: 'static> Stream<T> {
	pub fn new(source: Rc<dyn Source<T>>) -> Self {
		Stream { source }
	}

	#[must_use]
	pub fn subscribe(&self, func: impl Fn(&T) + 'static) -> Subscription {
		self.source.attach(Rc::new(move |value| {
			func(value);
			Ok(())
		}))
	}

	#[must_use]
	pub fn try_subscribe(&self, func: impl Fn(&T) -> Result<()> + 'static) -> Subscription {
		self.source.attach(Rc::new(func))
	}

	pub fn current(&self) -> Option<T> {
		self.source.current()
	}
}

impl<T> fmt::Debug for Stream<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Stream").finish_non_exhaustive()
	}
}

/// Cancellation handle of an attached observer.
///
/// Cancelling is idempotent and takes effect immediately, batches that are
/// already queued will not reach the observer. Dropping the handle cancels.
#[must_use]
pub struct Subscription {
	cancel: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Subscription {
	pub fn new(cancel: impl FnOnce() + 'static) -> Self {
		Subscription {
			cancel: RefCell::new(Some(Box::new(cancel))),
		}
	}

	pub fn cancel(&self) {
		let cancel = self.cancel.borrow_mut().take();
		if let Some(cancel) = cancel {
			cancel()
		}
	}

	pub fn is_active(&self) -> bool {
		self.cancel.borrow().is_some()
	}

	/// Keeps the observer attached for as long as its source lives.
	pub fn detach(self) {
		self.cancel.borrow_mut().take();
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.cancel()
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription")
			.field("active", &self.is_active())
			.finish()
	}
}
