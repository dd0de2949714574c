use std::fmt;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;

use crate::error::SemanticError;

/// Runtime value model used by the tree-walking interpreter. Values carry
/// only their payload; the concrete type is derived from the payload kind.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(BigInt),
    Decimal(BigDecimal),
    Character(char),
    String(String),
}

/// Structural equality of payloads. Values of differing kinds are unequal,
/// and decimals compare by exact representation: `1.0` and `1.00` differ.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(left), Value::Boolean(right)) => left == right,
            (Value::Integer(left), Value::Integer(right)) => left == right,
            (Value::Decimal(left), Value::Decimal(right)) => {
                left.as_bigint_and_exponent() == right.as_bigint_and_exponent()
            }
            (Value::Character(left), Value::Character(right)) => left == right,
            (Value::String(left), Value::String(right)) => left == right,
            _ => false,
        }
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "Nil",
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Decimal(_) => "Decimal",
            Value::Character(_) => "Character",
            Value::String(_) => "String",
        }
    }

    pub fn as_boolean(&self) -> Result<bool, SemanticError> {
        match self {
            Value::Boolean(value) => Ok(*value),
            other => Err(SemanticError::TypeMismatch {
                expected: "Boolean".to_string(),
                found: other.type_name().to_string(),
            }),
        }
    }
}

/// Rendering used by `print` and string concatenation.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(value) => write!(f, "{value}"),
            Value::Integer(value) => write!(f, "{value}"),
            Value::Decimal(value) => write!(f, "{value}"),
            Value::Character(value) => write!(f, "{value}"),
            Value::String(value) => write!(f, "{value}"),
        }
    }
}
