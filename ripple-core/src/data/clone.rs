//! Deep copies, deep comparison and JSON export.
//!
//! All three walk arbitrary object graphs, which may be cyclic. A walk keeps
//! the set of containers on the current path; a reference back to one of
//! them is a true cycle and is cut (the key is skipped in objects, `null` is
//! written in arrays). Containers shared between siblings are not cycles and
//! are visited once per reference.

use std::collections::HashSet;

use serde_json::{Map, Number, Value};

use super::{date_to_millis, Array, Data, Object, Reactive};

/// Containers on the path from the root to the value being visited.
#[derive(Default)]
struct Ancestors {
    addrs: HashSet<usize>,
}

impl Ancestors {
    /// Run `f` with `addr` on the path, or return `None` if it already is.
    fn descend<R>(&mut self, addr: usize, f: impl FnOnce(&mut Self) -> R) -> Option<R> {
        if !self.addrs.insert(addr) {
            return None;
        }
        let result = f(self);
        self.addrs.remove(&addr);
        Some(result)
    }
}

impl Data {
    /// An independent copy of this value and everything it reaches.
    ///
    /// The copy is plain: reactive objects are copied from their targets,
    /// arrays come back unpatched, and nothing is tracked.
    pub fn deep_clone(&self) -> Data {
        copy_value(self, &mut Ancestors::default())
    }

    /// Structural equality. Containers compare by contents, reactive objects
    /// by their targets' contents. Two NaNs are equal here.
    pub fn deep_eq(&self, other: &Data) -> bool {
        let mut visiting = HashSet::new();
        eq_value(self, other, &mut visiting)
    }

    /// Export as JSON. Integral numbers become integers, non-finite numbers
    /// become `null` and dates become epoch milliseconds.
    pub fn to_json(&self) -> Value {
        json_value(self, &mut Ancestors::default())
    }
}

/// Deep tracked read of a reactive object, returning a plain copy.
pub(crate) fn traverse(proxy: &Reactive) -> Data {
    traverse_object(proxy, &mut Ancestors::default()).unwrap_or_default()
}

/// Deep tracked read of any value. Plain objects are copied untracked.
pub(crate) fn traverse_data(value: &Data) -> Data {
    traverse_value(value.clone(), &mut Ancestors::default())
}

// ----------------------------------------------------------------------------
// Copying
// ----------------------------------------------------------------------------

fn copy_value(value: &Data, path: &mut Ancestors) -> Data {
    match value {
        Data::Array(array) => copy_array(array, path).unwrap_or_default(),
        Data::Object(object) => copy_object(object, path).unwrap_or_default(),
        Data::Reactive(proxy) => copy_object(proxy.target(), path).unwrap_or_default(),
        scalar => scalar.clone(),
    }
}

fn copy_array(array: &Array, path: &mut Ancestors) -> Option<Data> {
    path.descend(array.addr(), |path| {
        let items: Array = array
            .to_vec_untracked()
            .iter()
            .map(|item| copy_value(item, path))
            .collect();
        Data::Array(items)
    })
}

fn copy_object(object: &Object, path: &mut Ancestors) -> Option<Data> {
    path.descend(object.addr(), |path| {
        let copy = Object::new();
        for (key, value) in object.entries() {
            if is_back_edge(&value, path) {
                continue;
            }
            copy.insert(key, copy_value(&value, path));
        }
        Data::Object(copy)
    })
}

fn is_back_edge(value: &Data, path: &Ancestors) -> bool {
    let addr = match value {
        Data::Array(array) => array.addr(),
        other => match other.as_object() {
            Some(object) => object.addr(),
            None => return false,
        },
    };
    path.addrs.contains(&addr)
}

// ----------------------------------------------------------------------------
// Tracked traversal
// ----------------------------------------------------------------------------

fn traverse_value(value: Data, path: &mut Ancestors) -> Data {
    match value {
        Data::Reactive(proxy) => traverse_object(&proxy, path).unwrap_or_default(),
        Data::Array(array) => path
            .descend(array.addr(), |path| {
                let items: Array = array
                    .to_vec()
                    .into_iter()
                    .map(|item| traverse_value(item, path))
                    .collect();
                Data::Array(items)
            })
            .unwrap_or_default(),
        // Plain objects only appear under unpatched arrays and are not tracked.
        other => copy_value(&other, path),
    }
}

fn traverse_object(proxy: &Reactive, path: &mut Ancestors) -> Option<Data> {
    path.descend(proxy.target().addr(), |path| {
        let copy = Object::new();
        for key in proxy.keys() {
            let Some(value) = proxy.get(&key) else {
                continue;
            };
            if is_back_edge(&value, path) {
                continue;
            }
            copy.insert(key, traverse_value(value, path));
        }
        Data::Object(copy)
    })
}

// ----------------------------------------------------------------------------
// Comparison
// ----------------------------------------------------------------------------

fn eq_value(a: &Data, b: &Data, visiting: &mut HashSet<(usize, usize)>) -> bool {
    match (a, b) {
        (Data::Null, Data::Null) => true,
        (Data::Bool(a), Data::Bool(b)) => a == b,
        (Data::Number(a), Data::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
        (Data::String(a), Data::String(b)) => a == b,
        (Data::Date(a), Data::Date(b)) => a == b,
        (Data::Array(a), Data::Array(b)) => {
            if a.ptr_eq(b) || !visiting.insert((a.addr(), b.addr())) {
                return true;
            }
            let (a, b) = (a.to_vec_untracked(), b.to_vec_untracked());
            a.len() == b.len() && a.iter().zip(&b).all(|(a, b)| eq_value(a, b, visiting))
        }
        (a, b) => {
            let (Some(a), Some(b)) = (a.as_object(), b.as_object()) else {
                return false;
            };
            if a.ptr_eq(b) || !visiting.insert((a.addr(), b.addr())) {
                return true;
            }
            let (a, b) = (a.entries(), b.entries());
            a.len() == b.len()
                && a.iter().zip(&b).all(|((ka, va), (kb, vb))| {
                    ka == kb && eq_value(va, vb, visiting)
                })
        }
    }
}

// ----------------------------------------------------------------------------
// JSON
// ----------------------------------------------------------------------------

fn json_number(value: f64) -> Value {
    if !value.is_finite() {
        return Value::Null;
    }
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        return Value::Number(Number::from(value as i64));
    }
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn json_value(value: &Data, path: &mut Ancestors) -> Value {
    match value {
        Data::Null => Value::Null,
        Data::Bool(value) => Value::Bool(*value),
        Data::Number(value) => json_number(*value),
        Data::String(value) => Value::String(value.clone()),
        Data::Date(date) => json_number(date_to_millis(*date)),
        Data::Array(array) => path
            .descend(array.addr(), |path| {
                Value::Array(
                    array
                        .to_vec_untracked()
                        .iter()
                        .map(|item| json_value(item, path))
                        .collect(),
                )
            })
            .unwrap_or(Value::Null),
        Data::Object(object) => json_object(object, path),
        Data::Reactive(proxy) => json_object(proxy.target(), path),
    }
}

fn json_object(object: &Object, path: &mut Ancestors) -> Value {
    path.descend(object.addr(), |path| {
        let mut fields = Map::new();
        for (key, value) in object.entries() {
            if is_back_edge(&value, path) {
                continue;
            }
            fields.insert(key, json_value(&value, path));
        }
        Value::Object(fields)
    })
    .unwrap_or(Value::Null)
}
