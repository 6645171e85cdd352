use std::cmp::Ordering;
use std::ops::Deref;
use std::rc::{Rc, Weak};

/// Thin address of a shared allocation.
///
/// Trait objects are compared by their data pointer only, two `Rc<dyn _>`
/// built from the same allocation through different vtables stay equal.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Addr(*const ());

impl Addr {
	pub fn of<T: ?Sized>(ptr: &Rc<T>) -> Self {
		Addr(Rc::as_ptr(ptr) as *const ())
	}

	pub fn of_weak<T: ?Sized>(ptr: &Weak<T>) -> Self {
		Addr(Weak::as_ptr(ptr) as *const ())
	}
}

pub struct WeakAddr<T: ?Sized> {
	ptr: Weak<T>,
}

impl<T: ?Sized> WeakAddr<T> {
	pub fn new(ptr: Weak<T>) -> Self {
		WeakAddr { ptr }
	}

	pub fn addr(&self) -> Addr {
		Addr::of_weak(&self.ptr)
	}
}

impl<T: ?Sized> Clone for WeakAddr<T> {
	fn clone(&self) -> Self {
		WeakAddr {
			ptr: self.ptr.clone(),
		}
	}
}

impl<T: ?Sized> Deref for WeakAddr<T> {
	type Target = Weak<T>;
	fn deref(&self) -> &Self::Target {
		&self.ptr
	}
}

impl<T: ?Sized> PartialEq for WeakAddr<T> {
	fn eq(&self, other: &Self) -> bool {
		self.addr() == other.addr()
	}
}

impl<T: ?Sized> Eq for WeakAddr<T> {}

impl<T: ?Sized> Ord for WeakAddr<T> {
	fn cmp(&self, other: &Self) -> Ordering {
		self.addr().cmp(&other.addr())
	}
}

impl<T: ?Sized> PartialOrd for WeakAddr<T> {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}
