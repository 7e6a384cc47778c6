//! COS object types.
//!
//! Indirect objects live in a `ObjectRef -> Object` map owned by
//! [`CosDocument`](crate::document::CosDocument); references between them are
//! plain keys, so the page tree and shared resources can form cycles without
//! owning pointers.

use crate::stream::Stream;
use std::collections::HashMap;

/// Dictionary payload shared by dictionaries and stream dictionaries.
pub type Dictionary = HashMap<String, Object>;

/// PDF object representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// String (byte array)
    String(Vec<u8>),
    /// Name (starting with /)
    Name(String),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary (key-value pairs)
    Dictionary(Dictionary),
    /// Stream (dictionary + in-memory or file-slice body)
    Stream(Stream),
    /// Indirect object reference
    Reference(ObjectRef),
}

/// Reference to an indirect object (the COS object key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

impl Object {
    /// Get the type name of this object (without data).
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream(_) => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    /// Create a Name object.
    pub fn name(s: &str) -> Object {
        Object::Name(s.to_string())
    }

    /// Create a Dictionary object from key/value pairs.
    pub fn dict(entries: Vec<(&str, Object)>) -> Object {
        Object::Dictionary(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to dictionary. Works for both Dictionary and Stream objects.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    /// Mutable variant of [`Object::as_dict`].
    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(&mut s.dict),
            _ => None,
        }
    }

    /// Try to cast to stream.
    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to cast to real number. Integers are widened.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Object::Real(r) => Some(*r),
            Object::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to cast to string (bytes).
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Check whether this is a dictionary (or stream) with the given `/Type`.
    pub fn has_type(&self, type_name: &str) -> bool {
        self.as_dict()
            .and_then(|d| d.get("Type"))
            .and_then(|t| t.as_name())
            == Some(type_name)
    }

    /// Call `visit` for every indirect reference contained in this object,
    /// descending into arrays, dictionaries and stream dictionaries.
    ///
    /// Dictionary keys are visited in sorted order so traversals built on top
    /// of this are deterministic.
    pub fn for_each_reference<F: FnMut(&str, ObjectRef)>(&self, visit: &mut F) {
        self.walk_references("", visit);
    }

    fn walk_references<F: FnMut(&str, ObjectRef)>(&self, key: &str, visit: &mut F) {
        match self {
            Object::Reference(r) => visit(key, *r),
            Object::Array(items) => {
                for item in items {
                    item.walk_references(key, visit);
                }
            },
            Object::Dictionary(dict) => walk_dict(dict, visit),
            Object::Stream(stream) => walk_dict(&stream.dict, visit),
            _ => {},
        }
    }

    /// Rewrite every indirect reference in place.
    ///
    /// `map` returns the replacement object for a reference; this is how the
    /// linearizer renumbers objects and nulls out dangling references.
    pub fn map_references<F: FnMut(ObjectRef) -> Object>(&mut self, map: &mut F) {
        match self {
            Object::Reference(r) => {
                let replacement = map(*r);
                *self = replacement;
            },
            Object::Array(items) => {
                for item in items.iter_mut() {
                    item.map_references(map);
                }
            },
            Object::Dictionary(dict) => {
                for value in dict.values_mut() {
                    value.map_references(map);
                }
            },
            Object::Stream(stream) => {
                for value in stream.dict.values_mut() {
                    value.map_references(map);
                }
            },
            _ => {},
        }
    }
}

fn walk_dict<F: FnMut(&str, ObjectRef)>(dict: &Dictionary, visit: &mut F) {
    let mut keys: Vec<&String> = dict.keys().collect();
    keys.sort();
    for key in keys {
        if let Some(value) = dict.get(key) {
            value.walk_references(key, visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_object_integer() {
        let obj = Object::Integer(42);
        assert_eq!(obj.as_integer(), Some(42));
        assert!(obj.as_name().is_none());
        assert!(!obj.is_null());
    }

    #[test]
    fn test_object_real_widens_integers() {
        assert_eq!(Object::Integer(3).as_real(), Some(3.0));
        assert_eq!(Object::Real(0.5).as_real(), Some(0.5));
    }

    #[test]
    fn test_object_stream_dict_access() {
        let mut dict = Dictionary::new();
        dict.insert("Length".to_string(), Object::Integer(11));
        let obj = Object::Stream(Stream::new(dict, Bytes::from_static(b"stream data")));

        let d = obj.as_dict().unwrap();
        assert_eq!(d.get("Length").unwrap().as_integer(), Some(11));
        assert!(obj.as_stream().is_some());
    }

    #[test]
    fn test_object_ref_display_and_order() {
        assert_eq!(format!("{}", ObjectRef::new(10, 0)), "10 0 R");
        assert!(ObjectRef::new(2, 0) < ObjectRef::new(10, 0));
        assert!(ObjectRef::new(2, 0) < ObjectRef::new(2, 1));
    }

    #[test]
    fn test_has_type() {
        let page = Object::dict(vec![("Type", Object::name("Page"))]);
        assert!(page.has_type("Page"));
        assert!(!page.has_type("Pages"));
        assert!(!Object::Integer(1).has_type("Page"));
    }

    #[test]
    fn test_for_each_reference_is_sorted_and_deep() {
        let obj = Object::dict(vec![
            ("Resources", Object::dict(vec![("Font", Object::Reference(ObjectRef::new(7, 0)))])),
            ("Contents", Object::Array(vec![
                Object::Reference(ObjectRef::new(5, 0)),
                Object::Reference(ObjectRef::new(6, 0)),
            ])),
            ("Parent", Object::Reference(ObjectRef::new(2, 0))),
        ]);

        let mut seen = Vec::new();
        obj.for_each_reference(&mut |key, r| seen.push((key.to_string(), r.id)));
        assert_eq!(
            seen,
            vec![
                ("Contents".to_string(), 5),
                ("Contents".to_string(), 6),
                ("Parent".to_string(), 2),
                ("Font".to_string(), 7),
            ]
        );
    }

    #[test]
    fn test_map_references() {
        let mut obj = Object::Array(vec![
            Object::Reference(ObjectRef::new(1, 0)),
            Object::Reference(ObjectRef::new(99, 0)),
        ]);
        obj.map_references(&mut |r| {
            if r.id == 1 {
                Object::Reference(ObjectRef::new(4, 0))
            } else {
                Object::Null
            }
        });
        assert_eq!(
            obj,
            Object::Array(vec![Object::Reference(ObjectRef::new(4, 0)), Object::Null])
        );
    }
}
