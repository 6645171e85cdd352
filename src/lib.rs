//! Listenable records and sequences.
//!
//! Plain structured values are wrapped into [`Listenable`]s. Reads made with
//! an [`Evaluation`] are tracked, every write produces a [`Mutation`], and
//! [`Computed`] values, [`Reaction`]s and derived collections stay in sync
//! with that single source of truth.
//!
//! All mutations go through the [`Runtime`] that created the listenable.
//! They are buffered while a batch or transaction is open, merged, and only
//! then delivered to subscribers.
//!
//! ```
//! use listenable::{Runtime, Value};
//!
//! let rt = Runtime::default();
//! let list = rt.list([1, 1, 2, 3]);
//! let sum = rt.computed({
//! 	let list = list.clone();
//! 	move |cx| list.items(cx).iter().filter_map(|i| i.as_i64()).sum::<i64>()
//! });
//!
//! list.push(10).unwrap();
//! assert_eq!(*sum.get_once(), 17);
//! ```

pub mod macros;

mod access;
mod addr;
mod batch;
mod computed;
mod dependencies;
mod error;
mod evaluation;
mod hashed;
mod listenable;
mod mutation;
pub mod ops;
mod reaction;
mod runtime;
mod stream;
mod value;
mod var;

use std::rc::{Rc, Weak};

pub use access::{as_actor, Actor};
pub use addr::Addr;
pub use computed::{Computed, MaybeComputed};
pub use dependencies::Dependencies;
pub use error::{Error, Result};
pub use evaluation::Evaluation;
pub use hashed::Hashed;
pub use listenable::Listenable;
pub use mutation::{Change, Mutation, Read};
pub use ops::{filter, listenable_map, to_object, DerivedCollection};
pub use reaction::{Reaction, Reactions, Reactive};
pub use runtime::{Config, Runtime};
pub use stream::{Source, Stream, Subscription};
pub use value::{Item, Key, Value};
pub use var::{Toggle, Var};

pub trait Derived: 'static {
	fn invalidate(self: Rc<Self>, invalid: Invalid);

	/// Whether `mutation` of the listenable at `source` touches something
	/// this derivation read during its last evaluation.
	fn is_affected(&self, source: Addr, mutation: &Mutation) -> bool;
}

pub trait Observable: 'static {
	/// This function is called when we want
	/// this observable to recompute itself.
	fn update(&self) -> Version;

	/// This function should return the current
	/// computed version.
	fn version(&self) -> Version;

	/// Notify this observable that `derived` started
	/// to listen.
	fn used_by(&self, derived: Weak<dyn Derived>);

	/// Notify this observable that `derived` stopped
	/// to listen.
	fn not_used_by(&self, derived: &Weak<dyn Derived>);
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum State {
	Valid,
	Invalid(Invalid),
	Disposed,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Invalid {
	Maybe,
	Definitely,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Version {
	Hash(u64),
}
