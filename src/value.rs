//! Runtime value space and its mirror schema
//!
//! `Value` is the tagged sum carried along data-node edges; `Type` is the
//! schema side of the same shape. Every type except a variant-less union has
//! a canonical zero value used by the skip/log error strategies.

use crate::error::{ConstellationError, ConstellationResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Schema of a runtime value
///
/// Product fields and union variants are order-preserving so that
/// "first-declared variant" is well defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    String,
    Int,
    Float,
    Bool,
    List(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Optional(Box<Type>),
    Product(Vec<(String, Type)>),
    Union(Vec<(String, Type)>),
}

impl Type {
    pub fn list(elem: Type) -> Type {
        Type::List(Box::new(elem))
    }

    pub fn map(key: Type, value: Type) -> Type {
        Type::Map(Box::new(key), Box::new(value))
    }

    pub fn optional(elem: Type) -> Type {
        Type::Optional(Box::new(elem))
    }
}

/// A runtime value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List {
        elem: Type,
        items: Vec<Value>,
    },
    /// Insertion-ordered key/value pairs
    Map {
        key: Type,
        value: Type,
        entries: Vec<(Value, Value)>,
    },
    Optional {
        elem: Type,
        value: Option<Box<Value>>,
    },
    Product {
        structure: Vec<(String, Type)>,
        fields: HashMap<String, Value>,
    },
    Union {
        tag: String,
        value: Box<Value>,
        variants: Vec<(String, Type)>,
    },
}

impl Value {
    /// String payload, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Whether `zero_value` can produce a value for this type.
///
/// Computed recursively: a product requires a zero for every field and a
/// union requires a zero for its first-declared variant. Lists, maps, and
/// optionals are always zeroable (empty / `None`).
pub fn has_zero_value(ty: &Type) -> bool {
    match ty {
        Type::String | Type::Int | Type::Float | Type::Bool => true,
        Type::List(_) | Type::Map(_, _) | Type::Optional(_) => true,
        Type::Product(fields) => fields.iter().all(|(_, t)| has_zero_value(t)),
        Type::Union(variants) => variants
            .first()
            .map(|(_, t)| has_zero_value(t))
            .unwrap_or(false),
    }
}

/// Canonical empty value for a type
///
/// Fails with a config error exactly when `has_zero_value` is false.
pub fn zero_value(ty: &Type) -> ConstellationResult<Value> {
    match ty {
        Type::String => Ok(Value::String(String::new())),
        Type::Int => Ok(Value::Int(0)),
        Type::Float => Ok(Value::Float(0.0)),
        Type::Bool => Ok(Value::Bool(false)),
        Type::List(elem) => Ok(Value::List {
            elem: (**elem).clone(),
            items: Vec::new(),
        }),
        Type::Map(key, value) => Ok(Value::Map {
            key: (**key).clone(),
            value: (**value).clone(),
            entries: Vec::new(),
        }),
        Type::Optional(elem) => Ok(Value::Optional {
            elem: (**elem).clone(),
            value: None,
        }),
        Type::Product(field_types) => {
            let mut fields = HashMap::with_capacity(field_types.len());
            for (name, field_ty) in field_types {
                fields.insert(name.clone(), zero_value(field_ty)?);
            }
            Ok(Value::Product {
                structure: field_types.clone(),
                fields,
            })
        }
        Type::Union(variants) => {
            let (tag, variant_ty) = variants.first().ok_or_else(|| {
                ConstellationError::Config(
                    "union with no variants has no zero value".to_string(),
                )
            })?;
            Ok(Value::Union {
                tag: tag.clone(),
                value: Box::new(zero_value(variant_ty)?),
                variants: variants.clone(),
            })
        }
    }
}
