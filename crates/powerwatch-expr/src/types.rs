//! Static types, bound values and variable schemas

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Static type of an expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Uint,
    Double,
    Bool,
    String,
    List(Box<Type>),
}

impl Type {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Uint | Type::Double)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::Uint => f.write_str("uint"),
            Type::Double => f.write_str("double"),
            Type::Bool => f.write_str("bool"),
            Type::String => f.write_str("string"),
            Type::List(elem) => write!(f, "list({elem})"),
        }
    }
}

/// Value bound to a variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    String(String),
}

impl Value {
    pub fn type_of(&self) -> Type {
        match self {
            Value::Int(_) => Type::Int,
            Value::Bool(_) => Type::Bool,
            Value::String(_) => Type::String,
        }
    }

    pub(crate) fn to_cel(&self) -> cel_interpreter::Value {
        match self {
            Value::Int(i) => cel_interpreter::Value::Int(*i),
            Value::Bool(b) => cel_interpreter::Value::Bool(*b),
            Value::String(s) => cel_interpreter::Value::String(Arc::new(s.clone())),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// Declared variables an expression may reference
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    vars: BTreeMap<String, Type>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a variable. Redeclaring a name replaces its type.
    pub fn with(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.vars.insert(name.into(), ty);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Type> {
        self.vars.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Type)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Variable bindings for one evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Activation {
    vars: BTreeMap<String, Value>,
}

impl Activation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }
}
