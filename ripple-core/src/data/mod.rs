//! Dynamic Object Model
//!
//! View-binding layers work with loosely shaped state: objects whose keys
//! are only known at runtime, arrays of mixed values, nested structures that
//! may even contain cycles. This module provides that model and the deep
//! reactive wrapper over it.
//!
//! # Values
//!
//! [`Data`] is a dynamically typed value. Scalars are stored inline;
//! [`Object`] and [`Array`] are shared, mutable, reference-counted
//! containers with identity, so two `Data` values can point at the same
//! object exactly like two variables holding the same JS object.
//!
//! Writes through a plain `Object` handle are invisible to the reactive
//! system. Writes through an `Array` handle trigger the array's dependency
//! set once one has been attached (by a [`Ref`](crate::reactive::Ref) or by
//! reading the array through a reactive object).
//!
//! # Reactive Objects
//!
//! [`Reactive`] wraps an `Object` with tracked accessors. Each property gets
//! its own dependency set, created on first access and stored on the target,
//! so every proxy of the same object shares them. Nested objects are
//! wrapped lazily when read, not eagerly at construction.
//!
//! ```rust,ignore
//! let state = reactive(Data::from_json(json!({ "user": { "name": "ada" } })));
//! let state = state.as_reactive().unwrap();
//!
//! effect(move || {
//!     let user = state.get("user").unwrap();
//!     println!("{:?}", user.as_reactive().unwrap().get("name"));
//! });
//! ```

mod array;
mod clone;
mod object;
mod proxy;

pub use array::{Array, MAX_PADDING};
pub use object::{Object, WeakObject};
pub use proxy::{reactive, Reactive};

pub(crate) use clone::traverse_data;
pub(crate) use proxy::ProxyCache;

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};

/// A dynamically typed value.
///
/// Cloning is shallow: objects and arrays are shared, not copied. Use
/// [`Data::deep_clone`] for an independent copy.
#[derive(Clone, Default)]
pub enum Data {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(SystemTime),
    Array(Array),
    Object(Object),
    /// A tracked view of an object.
    Reactive(Reactive),
}

impl Data {
    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Data::Null => "null",
            Data::Bool(_) => "bool",
            Data::Number(_) => "number",
            Data::String(_) => "string",
            Data::Date(_) => "date",
            Data::Array(_) => "array",
            Data::Object(_) => "object",
            Data::Reactive(_) => "reactive",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Data::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Data::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Data::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Data::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<SystemTime> {
        match self {
            Data::Date(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Data::Array(array) => Some(array),
            _ => None,
        }
    }

    /// The underlying object, for both plain and reactive objects.
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Data::Object(object) => Some(object),
            Data::Reactive(proxy) => Some(proxy.target()),
            _ => None,
        }
    }

    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Data::Reactive(proxy) => Some(proxy),
            _ => None,
        }
    }

    /// Whether writing `other` over `self` is a no-op.
    ///
    /// Scalars compare by value. Objects and arrays compare by identity, and
    /// a reactive object is the same value as its target.
    pub fn same_value(&self, other: &Data) -> bool {
        match (self, other) {
            (Data::Null, Data::Null) => true,
            (Data::Bool(a), Data::Bool(b)) => a == b,
            (Data::Number(a), Data::Number(b)) => a == b,
            (Data::String(a), Data::String(b)) => a == b,
            (Data::Date(a), Data::Date(b)) => a == b,
            (Data::Array(a), Data::Array(b)) => a.ptr_eq(b),
            (a, b) => match (a.as_object(), b.as_object()) {
                (Some(a), Some(b)) => a.ptr_eq(b),
                _ => false,
            },
        }
    }

    /// Strip the reactive wrapper, if any.
    pub fn into_raw(self) -> Data {
        match self {
            Data::Reactive(proxy) => Data::Object(proxy.target().clone()),
            other => other,
        }
    }

    /// Parse a JSON value into fresh objects and arrays.
    pub fn from_json(value: serde_json::Value) -> Data {
        use serde_json::Value;

        match value {
            Value::Null => Data::Null,
            Value::Bool(value) => Data::Bool(value),
            Value::Number(number) => number.as_f64().map_or(Data::Null, Data::Number),
            Value::String(value) => Data::String(value),
            Value::Array(items) => {
                Data::Array(items.into_iter().map(Data::from_json).collect())
            }
            Value::Object(fields) => Data::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, Data::from_json(value)))
                    .collect(),
            ),
        }
    }
}

fn date_to_millis(date: SystemTime) -> f64 {
    match date.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_secs_f64() * 1000.0,
        Err(before) => -(before.duration().as_secs_f64() * 1000.0),
    }
}

/// `None` for non-finite or out-of-range values.
fn millis_to_date(millis: f64) -> Option<SystemTime> {
    let offset = Duration::try_from_secs_f64(millis.abs() / 1000.0).ok()?;
    if millis >= 0.0 {
        UNIX_EPOCH.checked_add(offset)
    } else {
        UNIX_EPOCH.checked_sub(offset)
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Data::Reactive(_) => write!(f, "Reactive({})", self.to_json()),
            Data::Date(date) => write!(f, "Date({})", date_to_millis(*date)),
            _ => write!(f, "{}", self.to_json()),
        }
    }
}

impl Serialize for Data {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

// ----------------------------------------------------------------------------
// Conversions
// ----------------------------------------------------------------------------

macro_rules! from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Data {
                fn from(value: $ty) -> Self {
                    Data::Number(value as f64)
                }
            }
        )*
    };
}

from_number!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64);

impl From<bool> for Data {
    fn from(value: bool) -> Self {
        Data::Bool(value)
    }
}

impl From<&str> for Data {
    fn from(value: &str) -> Self {
        Data::String(value.to_string())
    }
}

impl From<String> for Data {
    fn from(value: String) -> Self {
        Data::String(value)
    }
}

impl From<SystemTime> for Data {
    fn from(value: SystemTime) -> Self {
        Data::Date(value)
    }
}

impl From<Array> for Data {
    fn from(value: Array) -> Self {
        Data::Array(value)
    }
}

impl From<Object> for Data {
    fn from(value: Object) -> Self {
        Data::Object(value)
    }
}

impl From<Reactive> for Data {
    fn from(value: Reactive) -> Self {
        Data::Reactive(value)
    }
}

impl From<Vec<Data>> for Data {
    fn from(value: Vec<Data>) -> Self {
        Data::Array(Array::from(value))
    }
}

impl<T: Into<Data>> From<Option<T>> for Data {
    fn from(value: Option<T>) -> Self {
        value.map_or(Data::Null, Into::into)
    }
}

impl From<serde_json::Value> for Data {
    fn from(value: serde_json::Value) -> Self {
        Data::from_json(value)
    }
}

/// Typed extraction from a [`Data`] value.
pub trait FromData: Sized {
    fn from_data(data: &Data) -> Option<Self>;
}

impl FromData for Data {
    fn from_data(data: &Data) -> Option<Self> {
        Some(data.clone())
    }
}

impl FromData for bool {
    fn from_data(data: &Data) -> Option<Self> {
        data.as_bool()
    }
}

impl FromData for f64 {
    fn from_data(data: &Data) -> Option<Self> {
        data.as_f64()
    }
}

impl FromData for i64 {
    fn from_data(data: &Data) -> Option<Self> {
        data.as_f64()
            .filter(|value| value.fract() == 0.0)
            .map(|value| value as i64)
    }
}

impl FromData for String {
    fn from_data(data: &Data) -> Option<Self> {
        data.as_str().map(str::to_string)
    }
}

/// Dates, or numbers read as epoch milliseconds.
impl FromData for SystemTime {
    fn from_data(data: &Data) -> Option<Self> {
        data.as_date().or_else(|| data.as_f64().and_then(millis_to_date))
    }
}

impl FromData for Array {
    fn from_data(data: &Data) -> Option<Self> {
        data.as_array().cloned()
    }
}

impl FromData for Object {
    fn from_data(data: &Data) -> Option<Self> {
        data.as_object().cloned()
    }
}

impl FromData for Reactive {
    fn from_data(data: &Data) -> Option<Self> {
        data.as_reactive().cloned()
    }
}
