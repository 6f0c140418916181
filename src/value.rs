// Runtime value representation: Value, Object (Array/Custom), and the two
// flavors of callable (native/user-defined). Grounded in
// original_source/src/interpreter/value.hpp's std::variant + shared_ptr
// fields, translated to Rc/RefCell.

use std::fmt;
use std::rc::Rc;
use std::cell::RefCell;

use indexmap::IndexMap;

use crate::ast::Stmt;
use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::interpreter::Interpreter;

#[derive(Clone)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    String(Rc<String>),
    Boolean(bool),
    Object(Rc<RefCell<Object>>),
    Function(Rc<FunctionValue>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(Rc::new(s.into()))
    }

    /// Truthiness per spec.md 4.3: Null/false/0/0.0 are falsy, everything
    /// else (including the empty string) is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(_) => true,
            Value::Object(_) => true,
            Value::Function(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Boolean(_) => "bool",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    /// Structural equality for primitives, identity for Object/Function,
    /// matching spec.md 4.3's `==`/`is` rule.
    pub fn values_equal(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(x), Value::Integer(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y,
            (Value::Integer(x), Value::Float(y)) | (Value::Float(y), Value::Integer(x)) => {
                *x as f64 == *y
            }
            (Value::String(x), Value::String(y)) => x == y,
            (Value::Boolean(x), Value::Boolean(y)) => x == y,
            (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
            (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Object(o) => write!(f, "{}", o.borrow()),
            Value::Function(_) => write!(f, "<function>"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Integer(i) => write!(f, "Integer({})", i),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Boolean(b) => write!(f, "Boolean({})", b),
            Value::Object(o) => write!(f, "Object({:?})", o.borrow().type_name()),
            Value::Function(_) => write!(f, "Function(..)"),
        }
    }
}

/// Object records: either a numerically-indexed array or a named aggregate
/// with a field map (methods live as Function-valued fields, per spec.md's
/// "method dispatch is field load yields a Function").
pub enum Object {
    ArrayObject { values: Vec<Value> },
    CustomObject { type_name: String, fields: IndexMap<String, Value> },
}

impl Object {
    pub fn type_name(&self) -> &str {
        match self {
            Object::ArrayObject { .. } => "array",
            Object::CustomObject { type_name, .. } => type_name,
        }
    }

    /// Field lookup unified for both kinds: ArrayObject synthesizes
    /// "length" per invariant I4, plus numeric-string indices.
    pub fn get_field(&self, name: &str) -> Option<Value> {
        match self {
            Object::ArrayObject { values } => {
                if name == "length" {
                    return Some(Value::Integer(values.len() as i64));
                }
                name.parse::<usize>().ok().and_then(|i| values.get(i).cloned())
            }
            Object::CustomObject { fields, .. } => fields.get(name).cloned(),
        }
    }

    pub fn set_field(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        match self {
            Object::ArrayObject { values } => {
                let idx: usize = name
                    .parse()
                    .map_err(|_| RuntimeError::new(format!("invalid array index '{}'", name), 0))?;
                if idx >= values.len() {
                    return Err(RuntimeError::new(
                        format!("array index {} out of range (length {})", idx, values.len()),
                        0,
                    ));
                }
                values[idx] = value;
                Ok(())
            }
            Object::CustomObject { fields, .. } => {
                fields.insert(name.to_string(), value);
                Ok(())
            }
        }
    }

    pub fn index_get(&self, index: i64) -> Result<Value, RuntimeError> {
        match self {
            Object::ArrayObject { values } => {
                if index < 0 || index as usize >= values.len() {
                    return Err(RuntimeError::new(
                        format!("array index {} out of range (length {})", index, values.len()),
                        0,
                    ));
                }
                Ok(values[index as usize].clone())
            }
            Object::CustomObject { fields, .. } => fields
                .get(&index.to_string())
                .cloned()
                .ok_or_else(|| RuntimeError::new(format!("no field '{}'", index), 0)),
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::ArrayObject { values } => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Object::CustomObject { type_name, .. } => write!(f, "<{} instance>", type_name),
        }
    }
}

pub type NativeFn = Rc<dyn Fn(&mut Interpreter, &[Value]) -> Result<Value, RuntimeError>>;

/// Either a host-provided closure or a user-defined function capturing an
/// Environment at declaration time (invariant I3). `body` is `Rc` so a
/// Function value can be cloned without cloning the statement list.
pub enum FunctionValue {
    Native(NativeFn),
    UserDefined {
        params: Vec<String>,
        closure: Environment,
        body: Rc<Vec<Stmt>>,
    },
}

impl FunctionValue {
    pub fn arity(&self) -> usize {
        match self {
            FunctionValue::Native(_) => 0,
            FunctionValue::UserDefined { params, .. } => params.len(),
        }
    }
}
