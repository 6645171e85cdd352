use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display};
use std::hash::{Hash, Hasher};

use crate::listenable::Listenable;

/// A raw, unwrapped structured value.
///
/// This is what goes into [`Runtime::make_listenable`](crate::Runtime::make_listenable)
/// and what comes out of a snapshot.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
	#[default]
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	Str(String),
	List(Vec<Value>),
	Record(BTreeMap<String, Value>),
}

impl Value {
	pub fn list(items: impl IntoIterator<Item = impl Into<Value>>) -> Self {
		Value::List(items.into_iter().map(Into::into).collect())
	}

	pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
		Value::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
	}

	pub fn kind(&self) -> &'static str {
		match self {
			Value::Null => "null",
			Value::Bool(_) => "bool",
			Value::Int(_) => "int",
			Value::Float(_) => "float",
			Value::Str(_) => "string",
			Value::List(_) => "list",
			Value::Record(_) => "record",
		}
	}

	pub fn is_container(&self) -> bool {
		matches!(self, Value::List(_) | Value::Record(_))
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			Value::Int(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Value::Int(v) => Some(*v as f64),
			Value::Float(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Value::Bool(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::Str(v) => Some(v),
			_ => None,
		}
	}
}

impl Hash for Value {
	fn hash<H: Hasher>(&self, state: &mut H) {
		std::mem::discriminant(self).hash(state);
		match self {
			Value::Null => {}
			Value::Bool(v) => v.hash(state),
			Value::Int(v) => v.hash(state),
			Value::Float(v) => v.to_bits().hash(state),
			Value::Str(v) => v.hash(state),
			Value::List(v) => v.hash(state),
			Value::Record(v) => v.hash(state),
		}
	}
}

macro_rules! value_from {
	($($ty:ty => $variant:ident),* $(,)?) => {
		$(impl From<$ty> for Value {
			fn from(v: $ty) -> Self {
				Value::$variant(v.into())
			}
		})*
	};
}

value_from! {
	bool => Bool,
	i32 => Int,
	i64 => Int,
	u32 => Int,
	f64 => Float,
	String => Str,
	&str => Str,
}

impl From<Vec<Value>> for Value {
	fn from(v: Vec<Value>) -> Self {
		Value::List(v)
	}
}

impl From<BTreeMap<String, Value>> for Value {
	fn from(v: BTreeMap<String, Value>) -> Self {
		Value::Record(v)
	}
}

/// Address of a slot inside a listenable: a sequence index or a record field.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
	Index(usize),
	Field(String),
}

impl Key {
	pub fn index(&self) -> Option<usize> {
		match self {
			Key::Index(i) => Some(*i),
			Key::Field(_) => None,
		}
	}

	pub fn field(&self) -> Option<&str> {
		match self {
			Key::Field(f) => Some(f),
			Key::Index(_) => None,
		}
	}
}

impl Display for Key {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Key::Index(i) => write!(f, "{i}"),
			Key::Field(k) => f.write_str(k),
		}
	}
}

impl From<usize> for Key {
	fn from(i: usize) -> Self {
		Key::Index(i)
	}
}

impl From<&str> for Key {
	fn from(k: &str) -> Self {
		Key::Field(k.to_owned())
	}
}

impl From<String> for Key {
	fn from(k: String) -> Self {
		Key::Field(k)
	}
}

/// Content of a slot.
///
/// Nested records and sequences are handed out as their canonical
/// [`Listenable`]; everything else is a plain [`Value`].
#[derive(Clone)]
pub enum Item {
	Value(Value),
	Listenable(Listenable),
}

impl Item {
	pub fn as_value(&self) -> Option<&Value> {
		match self {
			Item::Value(v) => Some(v),
			Item::Listenable(_) => None,
		}
	}

	pub fn as_listenable(&self) -> Option<&Listenable> {
		match self {
			Item::Listenable(l) => Some(l),
			Item::Value(_) => None,
		}
	}

	pub fn as_i64(&self) -> Option<i64> {
		self.as_value().and_then(Value::as_i64)
	}

	pub fn as_f64(&self) -> Option<f64> {
		self.as_value().and_then(Value::as_f64)
	}

	pub fn as_bool(&self) -> Option<bool> {
		self.as_value().and_then(Value::as_bool)
	}

	pub fn as_str(&self) -> Option<&str> {
		self.as_value().and_then(Value::as_str)
	}

	/// Copies the current content out as a raw value.
	pub fn to_value(&self) -> Value {
		match self {
			Item::Value(v) => v.clone(),
			Item::Listenable(l) => l.snapshot_once(),
		}
	}
}

impl PartialEq for Item {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Item::Value(a), Item::Value(b)) => a == b,
			(Item::Listenable(a), Item::Listenable(b)) => a.ptr_eq(b),
			_ => false,
		}
	}
}

impl Debug for Item {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Item::Value(v) => v.fmt(f),
			Item::Listenable(l) => l.fmt(f),
		}
	}
}

macro_rules! item_from {
	($($ty:ty),* $(,)?) => {
		$(impl From<$ty> for Item {
			fn from(v: $ty) -> Self {
				Item::Value(v.into())
			}
		})*
	};
}

item_from!(Value, bool, i32, i64, u32, f64, String, &str, Vec<Value>);

impl From<Listenable> for Item {
	fn from(l: Listenable) -> Self {
		Item::Listenable(l)
	}
}

impl From<&Listenable> for Item {
	fn from(l: &Listenable) -> Self {
		Item::Listenable(l.clone())
	}
}
