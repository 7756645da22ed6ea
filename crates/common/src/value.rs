//! Runtime value representation for the Tarn VM.
//!
//! Values are what live on the operand stack, in globals, and in the
//! constant pool. Reference-typed payloads use `Rc` so that cloning a value
//! shares storage: a map stored into a global and indexed through a local is
//! one map, and mutating it through either handle is visible through both.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::binop::BinOp;
use crate::bytecode::CompiledFunction;
use crate::error::RuntimeError;
use crate::iterator::Iter;

/// Shared mutable slot used for closure capture.
///
/// A local that has been captured holds a `Value::Cell` wrapping one of
/// these; reads and writes through the local dereference transparently, so
/// the capturing closure and the enclosing frame observe each other's
/// mutations.
pub type Cell = Rc<RefCell<Value>>;

/// Signature of a native callable.
pub type BuiltinFn = fn(&[Value]) -> Result<Value, RuntimeError>;

/// A native callable, opaque to the execution core.
#[derive(Debug)]
pub struct BuiltinFunction {
    pub name: &'static str,
    pub func: BuiltinFn,
}

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    /// The undefined singleton.
    Undefined,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// IEEE 754 64-bit float.
    Float(f64),
    /// Immutable UTF-8 string, indexed and sliced by byte.
    String(Rc<str>),
    /// Mutable byte buffer.
    Bytes(Rc<RefCell<Vec<u8>>>),
    /// Mutable array.
    Array(Rc<RefCell<Vec<Value>>>),
    /// Frozen array. Shares the array representation; freezing re-tags the
    /// same storage rather than copying it.
    ImmutableArray(Rc<RefCell<Vec<Value>>>),
    /// Mutable string-keyed map.
    Map(Rc<RefCell<HashMap<String, Value>>>),
    /// Frozen map.
    ImmutableMap(Rc<RefCell<HashMap<String, Value>>>),
    /// Error value wrapping a payload.
    Error(Rc<Value>),
    /// Compiled bytecode function, possibly with captured cells.
    Function(Rc<CompiledFunction>),
    /// Native callable.
    Builtin(&'static BuiltinFunction),
    /// In-progress iteration over a sequence or map.
    Iterator(Rc<RefCell<Iter>>),
    /// Closure capture cell. Never produced by user code; appears on the
    /// stack only under the capture opcodes.
    Cell(Cell),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn bytes(data: Vec<u8>) -> Self {
        Value::Bytes(Rc::new(RefCell::new(data)))
    }

    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn immutable_array(elements: Vec<Value>) -> Self {
        Value::ImmutableArray(Rc::new(RefCell::new(elements)))
    }

    pub fn map(entries: HashMap<String, Value>) -> Self {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    pub fn immutable_map(entries: HashMap<String, Value>) -> Self {
        Value::ImmutableMap(Rc::new(RefCell::new(entries)))
    }

    pub fn error(payload: Value) -> Self {
        Value::Error(Rc::new(payload))
    }

    /// Name of this value's variant, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::ImmutableArray(_) => "immutable-array",
            Value::Map(_) => "map",
            Value::ImmutableMap(_) => "immutable-map",
            Value::Error(_) => "error",
            Value::Function(_) => "compiled-function",
            Value::Builtin(_) => "builtin-function",
            Value::Iterator(_) => "iterator",
            Value::Cell(_) => "free-var",
        }
    }

    /// Truthiness test, defined for every variant.
    ///
    /// Undefined, `false`, zero numbers, and empty strings, byte buffers,
    /// arrays, and maps are falsy; everything else is truthy.
    pub fn is_falsy(&self) -> bool {
        match self {
            Value::Undefined => true,
            Value::Bool(b) => !b,
            Value::Int(n) => *n == 0,
            Value::Float(f) => *f == 0.0,
            Value::String(s) => s.is_empty(),
            Value::Bytes(data) => data.borrow().is_empty(),
            Value::Array(items) | Value::ImmutableArray(items) => items.borrow().is_empty(),
            Value::Map(entries) | Value::ImmutableMap(entries) => entries.borrow().is_empty(),
            _ => false,
        }
    }

    /// Language-level equality.
    ///
    /// Incompatible variants compare unequal rather than failing. Arrays
    /// and maps compare structurally across their mutable and frozen forms;
    /// errors, functions, builtins, and iterators compare by identity.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Bool(l), Value::Bool(r)) => l == r,
            (Value::Int(l), Value::Int(r)) => l == r,
            (Value::Float(l), Value::Float(r)) => l == r,
            (Value::String(l), Value::String(r)) => l == r,
            (Value::Bytes(l), Value::Bytes(r)) => *l.borrow() == *r.borrow(),
            (
                Value::Array(l) | Value::ImmutableArray(l),
                Value::Array(r) | Value::ImmutableArray(r),
            ) => {
                let (l, r) = (l.borrow(), r.borrow());
                l.len() == r.len() && l.iter().zip(r.iter()).all(|(a, b)| a.equals(b))
            }
            (
                Value::Map(l) | Value::ImmutableMap(l),
                Value::Map(r) | Value::ImmutableMap(r),
            ) => {
                let (l, r) = (l.borrow(), r.borrow());
                l.len() == r.len()
                    && l.iter()
                        .all(|(key, a)| r.get(key).is_some_and(|b| a.equals(b)))
            }
            (Value::Error(l), Value::Error(r)) => Rc::ptr_eq(l, r),
            (Value::Function(l), Value::Function(r)) => Rc::ptr_eq(l, r),
            (Value::Builtin(l), Value::Builtin(r)) => std::ptr::eq(*l, *r),
            (Value::Iterator(l), Value::Iterator(r)) => Rc::ptr_eq(l, r),
            (Value::Cell(l), Value::Cell(r)) => Rc::ptr_eq(l, r),
            _ => false,
        }
    }

    /// Apply a binary operator with this value on the left.
    ///
    /// Dispatches on the left operand's variant; unsupported combinations
    /// fail with an invalid-operation error. Integer arithmetic wraps.
    pub fn binary_op(&self, op: BinOp, rhs: &Value) -> Result<Value, RuntimeError> {
        if let (Value::Int(l), Value::Int(r)) = (self, rhs) {
            return int_binary_op(*l, op, *r);
        }

        let result = match (self, rhs) {
            (Value::Int(l), Value::Float(r)) => float_binary_op(*l as f64, op, *r),
            (Value::Float(l), Value::Int(r)) => float_binary_op(*l, op, *r as f64),
            (Value::Float(l), Value::Float(r)) => float_binary_op(*l, op, *r),
            (Value::String(l), Value::String(r)) => string_binary_op(l, op, r),
            (Value::String(l), Value::Int(r)) if op == BinOp::Add => {
                Some(Value::String(Rc::from(format!("{l}{r}"))))
            }
            (Value::String(l), Value::Float(r)) if op == BinOp::Add => {
                Some(Value::String(Rc::from(format!("{l}{r}"))))
            }
            (
                Value::Array(l) | Value::ImmutableArray(l),
                Value::Array(r) | Value::ImmutableArray(r),
            ) if op == BinOp::Add => {
                let mut items = l.borrow().clone();
                items.extend(r.borrow().iter().cloned());
                Some(Value::array(items))
            }
            (Value::Bytes(l), Value::Bytes(r)) if op == BinOp::Add => {
                let mut data = l.borrow().clone();
                data.extend_from_slice(&r.borrow());
                Some(Value::bytes(data))
            }
            _ => None,
        };

        result.ok_or_else(|| RuntimeError::InvalidOperator {
            op: op.symbol(),
            lhs: self.type_name(),
            rhs: rhs.type_name(),
        })
    }

    /// Read an element by index or key.
    ///
    /// Sequences require an in-range integer index; maps require a string
    /// key and read missing keys as `Undefined`.
    pub fn index_get(&self, index: &Value) -> Result<Value, RuntimeError> {
        match self {
            Value::Array(items) | Value::ImmutableArray(items) => {
                let idx = sequence_index(index, items.borrow().len())?;
                Ok(items.borrow()[idx].clone())
            }
            Value::String(s) => {
                let idx = sequence_index(index, s.len())?;
                Ok(Value::Int(s.as_bytes()[idx] as i64))
            }
            Value::Bytes(data) => {
                let data = data.borrow();
                let idx = sequence_index(index, data.len())?;
                Ok(Value::Int(data[idx] as i64))
            }
            Value::Map(entries) | Value::ImmutableMap(entries) => match index {
                Value::String(key) => Ok(entries
                    .borrow()
                    .get(key.as_ref())
                    .cloned()
                    .unwrap_or(Value::Undefined)),
                other => Err(RuntimeError::InvalidIndexType {
                    type_name: other.type_name(),
                }),
            },
            other => Err(RuntimeError::NotIndexable {
                type_name: other.type_name(),
            }),
        }
    }

    /// Write an element by index or key.
    ///
    /// Only mutable arrays, maps, and byte buffers accept writes; the
    /// frozen forms and everything else fail as not index-assignable.
    pub fn index_set(&self, index: &Value, value: Value) -> Result<(), RuntimeError> {
        match self {
            Value::Array(items) => {
                let idx = sequence_index(index, items.borrow().len())?;
                items.borrow_mut()[idx] = value;
                Ok(())
            }
            Value::Map(entries) => match index {
                Value::String(key) => {
                    entries.borrow_mut().insert(key.to_string(), value);
                    Ok(())
                }
                other => Err(RuntimeError::InvalidIndexType {
                    type_name: other.type_name(),
                }),
            },
            Value::Bytes(data) => {
                let idx = sequence_index(index, data.borrow().len())?;
                match value {
                    Value::Int(byte) => {
                        data.borrow_mut()[idx] = byte as u8;
                        Ok(())
                    }
                    other => Err(RuntimeError::InvalidIndexValueType {
                        type_name: other.type_name(),
                    }),
                }
            }
            other => Err(RuntimeError::NotIndexAssignable {
                type_name: other.type_name(),
            }),
        }
    }

    /// Whether this value can be called.
    pub fn can_call(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Builtin(_))
    }

    /// Whether this value can be iterated.
    pub fn can_iterate(&self) -> bool {
        matches!(
            self,
            Value::String(_)
                | Value::Bytes(_)
                | Value::Array(_)
                | Value::ImmutableArray(_)
                | Value::Map(_)
                | Value::ImmutableMap(_)
        )
    }

    /// Fresh iterator over this value, or `None` when it is not iterable.
    pub fn iterate(&self) -> Option<Iter> {
        match self {
            Value::Array(items) | Value::ImmutableArray(items) => Some(Iter::array(items.clone())),
            Value::Map(entries) | Value::ImmutableMap(entries) => Some(Iter::map(entries.clone())),
            Value::String(s) => Some(Iter::string(s.clone())),
            Value::Bytes(data) => Some(Iter::bytes(data.clone())),
            _ => None,
        }
    }
}

/// Structural equality, delegating to [`Value::equals`]. Mostly useful in
/// tests; the VM's `Equal` opcode calls `equals` directly.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("<undefined>"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => f.write_str(s),
            Value::Bytes(data) => f.write_str(&String::from_utf8_lossy(&data.borrow())),
            Value::Array(items) | Value::ImmutableArray(items) => {
                f.write_str("[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(entries) | Value::ImmutableMap(entries) => {
                // Sort keys so the rendering is stable.
                let entries = entries.borrow();
                let mut keys: Vec<&String> = entries.keys().collect();
                keys.sort();
                f.write_str("{")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {}", entries[*key])?;
                }
                f.write_str("}")
            }
            Value::Error(payload) => write!(f, "error: {payload}"),
            Value::Function(_) => f.write_str("<compiled-function>"),
            Value::Builtin(b) => write!(f, "<builtin-function:{}>", b.name),
            Value::Iterator(_) => f.write_str("<iterator>"),
            Value::Cell(_) => f.write_str("<free-var>"),
        }
    }
}

/// Validate an integer index against a sequence length.
fn sequence_index(index: &Value, len: usize) -> Result<usize, RuntimeError> {
    match index {
        Value::Int(idx) => {
            if *idx < 0 || *idx >= len as i64 {
                Err(RuntimeError::IndexOutOfBounds { index: *idx, len })
            } else {
                Ok(*idx as usize)
            }
        }
        other => Err(RuntimeError::InvalidIndexType {
            type_name: other.type_name(),
        }),
    }
}

fn int_binary_op(l: i64, op: BinOp, r: i64) -> Result<Value, RuntimeError> {
    let value = match op {
        BinOp::Add => Value::Int(l.wrapping_add(r)),
        BinOp::Sub => Value::Int(l.wrapping_sub(r)),
        BinOp::Mul => Value::Int(l.wrapping_mul(r)),
        BinOp::Div => {
            if r == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Value::Int(l.wrapping_div(r))
        }
        BinOp::Rem => {
            if r == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Value::Int(l.wrapping_rem(r))
        }
        BinOp::BitAnd => Value::Int(l & r),
        BinOp::BitOr => Value::Int(l | r),
        BinOp::BitXor => Value::Int(l ^ r),
        BinOp::Shl => Value::Int(l.wrapping_shl(r as u32)),
        BinOp::Shr => Value::Int(l.wrapping_shr(r as u32)),
        BinOp::Less => Value::Bool(l < r),
        BinOp::Greater => Value::Bool(l > r),
        BinOp::LessEq => Value::Bool(l <= r),
        BinOp::GreaterEq => Value::Bool(l >= r),
    };
    Ok(value)
}

fn float_binary_op(l: f64, op: BinOp, r: f64) -> Option<Value> {
    match op {
        BinOp::Add => Some(Value::Float(l + r)),
        BinOp::Sub => Some(Value::Float(l - r)),
        BinOp::Mul => Some(Value::Float(l * r)),
        // IEEE 754: float division by zero yields an infinity, not an error.
        BinOp::Div => Some(Value::Float(l / r)),
        BinOp::Less => Some(Value::Bool(l < r)),
        BinOp::Greater => Some(Value::Bool(l > r)),
        BinOp::LessEq => Some(Value::Bool(l <= r)),
        BinOp::GreaterEq => Some(Value::Bool(l >= r)),
        _ => None,
    }
}

fn string_binary_op(l: &Rc<str>, op: BinOp, r: &Rc<str>) -> Option<Value> {
    match op {
        BinOp::Add => Some(Value::String(Rc::from(format!("{l}{r}")))),
        // Comparisons are lexicographic byte order.
        BinOp::Less => Some(Value::Bool(l < r)),
        BinOp::Greater => Some(Value::Bool(l > r)),
        BinOp::LessEq => Some(Value::Bool(l <= r)),
        BinOp::GreaterEq => Some(Value::Bool(l >= r)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_of(pairs: &[(&str, Value)]) -> Value {
        Value::map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::Undefined.type_name(), "undefined");
        assert_eq!(Value::Int(1).type_name(), "int");
        assert_eq!(Value::string("x").type_name(), "string");
        assert_eq!(Value::array(vec![]).type_name(), "array");
        assert_eq!(Value::immutable_array(vec![]).type_name(), "immutable-array");
        assert_eq!(Value::error(Value::Int(1)).type_name(), "error");
    }

    #[test]
    fn falsiness_table() {
        assert!(Value::Undefined.is_falsy());
        assert!(Value::Bool(false).is_falsy());
        assert!(Value::Int(0).is_falsy());
        assert!(Value::Float(0.0).is_falsy());
        assert!(Value::string("").is_falsy());
        assert!(Value::bytes(vec![]).is_falsy());
        assert!(Value::array(vec![]).is_falsy());
        assert!(Value::map(HashMap::new()).is_falsy());

        assert!(!Value::Bool(true).is_falsy());
        assert!(!Value::Int(-1).is_falsy());
        assert!(!Value::Float(0.5).is_falsy());
        assert!(!Value::string("x").is_falsy());
        assert!(!Value::array(vec![Value::Undefined]).is_falsy());
        assert!(!Value::error(Value::Int(0)).is_falsy());
    }

    #[test]
    fn equality_same_variant() {
        assert!(Value::Int(42).equals(&Value::Int(42)));
        assert!(!Value::Int(42).equals(&Value::Int(43)));
        assert!(Value::string("a").equals(&Value::string("a")));
        assert!(Value::Undefined.equals(&Value::Undefined));
        assert!(Value::bytes(vec![1, 2]).equals(&Value::bytes(vec![1, 2])));
    }

    #[test]
    fn equality_across_variants_is_false_not_an_error() {
        assert!(!Value::Int(1).equals(&Value::Float(1.0)));
        assert!(!Value::Int(1).equals(&Value::Bool(true)));
        assert!(!Value::string("1").equals(&Value::Int(1)));
        assert!(!Value::Undefined.equals(&Value::Bool(false)));
    }

    #[test]
    fn equality_arrays_structural_across_mutability() {
        let a = Value::array(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::immutable_array(vec![Value::Int(1), Value::Int(2)]);
        let c = Value::array(vec![Value::Int(1)]);
        assert!(a.equals(&b));
        assert!(b.equals(&a));
        assert!(!a.equals(&c));
    }

    #[test]
    fn equality_maps_structural() {
        let a = map_of(&[("x", Value::Int(1)), ("y", Value::Int(2))]);
        let b = map_of(&[("y", Value::Int(2)), ("x", Value::Int(1))]);
        let c = map_of(&[("x", Value::Int(1))]);
        assert!(a.equals(&b));
        assert!(!a.equals(&c));
    }

    #[test]
    fn equality_errors_by_identity() {
        let e = Value::error(Value::Int(1));
        assert!(e.equals(&e.clone()));
        assert!(!e.equals(&Value::error(Value::Int(1))));
    }

    #[test]
    fn int_arithmetic_wraps() {
        let max = Value::Int(i64::MAX);
        assert_eq!(
            max.binary_op(BinOp::Add, &Value::Int(1)).unwrap(),
            Value::Int(i64::MIN)
        );
        assert_eq!(
            Value::Int(i64::MIN)
                .binary_op(BinOp::Div, &Value::Int(-1))
                .unwrap(),
            Value::Int(i64::MIN)
        );
    }

    #[test]
    fn int_division_by_zero_fails() {
        assert_eq!(
            Value::Int(1).binary_op(BinOp::Div, &Value::Int(0)),
            Err(RuntimeError::DivisionByZero)
        );
        assert_eq!(
            Value::Int(1).binary_op(BinOp::Rem, &Value::Int(0)),
            Err(RuntimeError::DivisionByZero)
        );
    }

    #[test]
    fn numeric_promotion_to_float() {
        assert_eq!(
            Value::Int(1).binary_op(BinOp::Add, &Value::Float(0.5)).unwrap(),
            Value::Float(1.5)
        );
        assert_eq!(
            Value::Float(3.0).binary_op(BinOp::Mul, &Value::Int(2)).unwrap(),
            Value::Float(6.0)
        );
        assert_eq!(
            Value::Float(1.0).binary_op(BinOp::Less, &Value::Int(2)).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn float_division_by_zero_follows_ieee() {
        match Value::Float(1.0).binary_op(BinOp::Div, &Value::Float(0.0)) {
            Ok(Value::Float(x)) => assert!(x.is_infinite()),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn string_concat_and_compare() {
        assert_eq!(
            Value::string("foo")
                .binary_op(BinOp::Add, &Value::string("bar"))
                .unwrap(),
            Value::string("foobar")
        );
        assert_eq!(
            Value::string("abc")
                .binary_op(BinOp::Less, &Value::string("abd"))
                .unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn string_plus_number_coerces_to_decimal() {
        assert_eq!(
            Value::string("n=").binary_op(BinOp::Add, &Value::Int(-7)).unwrap(),
            Value::string("n=-7")
        );
        assert_eq!(
            Value::string("f=")
                .binary_op(BinOp::Add, &Value::Float(2.5))
                .unwrap(),
            Value::string("f=2.5")
        );
    }

    #[test]
    fn array_concat_builds_new_array() {
        let a = Value::array(vec![Value::Int(1)]);
        let b = Value::immutable_array(vec![Value::Int(2)]);
        let sum = a.binary_op(BinOp::Add, &b).unwrap();
        assert_eq!(sum, Value::array(vec![Value::Int(1), Value::Int(2)]));
        // The originals are untouched.
        assert_eq!(a, Value::array(vec![Value::Int(1)]));
    }

    #[test]
    fn bytes_concat() {
        assert_eq!(
            Value::bytes(vec![1])
                .binary_op(BinOp::Add, &Value::bytes(vec![2, 3]))
                .unwrap(),
            Value::bytes(vec![1, 2, 3])
        );
    }

    #[test]
    fn unsupported_combinations_fail_with_invalid_operator() {
        assert_eq!(
            Value::Bool(true).binary_op(BinOp::Add, &Value::Bool(false)),
            Err(RuntimeError::InvalidOperator {
                op: "+",
                lhs: "bool",
                rhs: "bool"
            })
        );
        assert_eq!(
            Value::Float(1.0).binary_op(BinOp::BitAnd, &Value::Float(2.0)),
            Err(RuntimeError::InvalidOperator {
                op: "&",
                lhs: "float",
                rhs: "float"
            })
        );
        assert_eq!(
            Value::string("x").binary_op(BinOp::Sub, &Value::string("y")),
            Err(RuntimeError::InvalidOperator {
                op: "-",
                lhs: "string",
                rhs: "string"
            })
        );
    }

    #[test]
    fn index_get_array() {
        let arr = Value::array(vec![Value::Int(10), Value::Int(20)]);
        assert_eq!(arr.index_get(&Value::Int(1)).unwrap(), Value::Int(20));
        assert_eq!(
            arr.index_get(&Value::Int(2)),
            Err(RuntimeError::IndexOutOfBounds { index: 2, len: 2 })
        );
        // Negative indices are not wrapped.
        assert_eq!(
            arr.index_get(&Value::Int(-1)),
            Err(RuntimeError::IndexOutOfBounds { index: -1, len: 2 })
        );
        assert_eq!(
            arr.index_get(&Value::string("0")),
            Err(RuntimeError::InvalidIndexType {
                type_name: "string"
            })
        );
    }

    #[test]
    fn index_get_string_and_bytes_by_byte() {
        let s = Value::string("ab");
        assert_eq!(s.index_get(&Value::Int(0)).unwrap(), Value::Int(97));
        let b = Value::bytes(vec![7, 8]);
        assert_eq!(b.index_get(&Value::Int(1)).unwrap(), Value::Int(8));
    }

    #[test]
    fn index_get_map_missing_key_is_undefined() {
        let m = map_of(&[("here", Value::Int(1))]);
        assert_eq!(m.index_get(&Value::string("here")).unwrap(), Value::Int(1));
        assert_eq!(
            m.index_get(&Value::string("missing")).unwrap(),
            Value::Undefined
        );
        assert_eq!(
            m.index_get(&Value::Int(0)),
            Err(RuntimeError::InvalidIndexType { type_name: "int" })
        );
    }

    #[test]
    fn index_get_on_scalar_fails() {
        assert_eq!(
            Value::Int(1).index_get(&Value::Int(0)),
            Err(RuntimeError::NotIndexable { type_name: "int" })
        );
    }

    #[test]
    fn index_set_array_and_map() {
        let arr = Value::array(vec![Value::Int(0)]);
        arr.index_set(&Value::Int(0), Value::Int(9)).unwrap();
        assert_eq!(arr, Value::array(vec![Value::Int(9)]));

        let m = map_of(&[]);
        m.index_set(&Value::string("k"), Value::Int(5)).unwrap();
        assert_eq!(m.index_get(&Value::string("k")).unwrap(), Value::Int(5));
    }

    #[test]
    fn index_set_bytes_truncates_to_byte() {
        let b = Value::bytes(vec![0]);
        b.index_set(&Value::Int(0), Value::Int(0x1FF)).unwrap();
        assert_eq!(b, Value::bytes(vec![0xFF]));
        assert_eq!(
            b.index_set(&Value::Int(0), Value::string("x")),
            Err(RuntimeError::InvalidIndexValueType {
                type_name: "string"
            })
        );
    }

    #[test]
    fn index_set_frozen_fails() {
        assert_eq!(
            Value::immutable_array(vec![Value::Int(1)]).index_set(&Value::Int(0), Value::Int(2)),
            Err(RuntimeError::NotIndexAssignable {
                type_name: "immutable-array"
            })
        );
        assert_eq!(
            Value::immutable_map(HashMap::new()).index_set(&Value::string("k"), Value::Int(1)),
            Err(RuntimeError::NotIndexAssignable {
                type_name: "immutable-map"
            })
        );
        assert_eq!(
            Value::string("s").index_set(&Value::Int(0), Value::Int(1)),
            Err(RuntimeError::NotIndexAssignable {
                type_name: "string"
            })
        );
    }

    #[test]
    fn capabilities() {
        assert!(Value::Builtin(&CRASH).can_call());
        assert!(!Value::Int(1).can_call());
        assert!(Value::array(vec![]).can_iterate());
        assert!(Value::string("x").can_iterate());
        assert!(!Value::Int(1).can_iterate());
        assert!(Value::Int(1).iterate().is_none());
    }

    static CRASH: BuiltinFunction = BuiltinFunction {
        name: "crash",
        func: |_args| Err(RuntimeError::DivisionByZero),
    };

    #[test]
    fn shared_storage_is_visible_through_clones() {
        let arr = Value::array(vec![Value::Int(1)]);
        let alias = arr.clone();
        arr.index_set(&Value::Int(0), Value::Int(2)).unwrap();
        assert_eq!(alias.index_get(&Value::Int(0)).unwrap(), Value::Int(2));
    }

    #[test]
    fn display_rendering() {
        assert_eq!(Value::Undefined.to_string(), "<undefined>");
        assert_eq!(Value::Int(-3).to_string(), "-3");
        assert_eq!(Value::string("hi").to_string(), "hi");
        assert_eq!(
            Value::array(vec![Value::Int(1), Value::string("a")]).to_string(),
            "[1, a]"
        );
        assert_eq!(
            map_of(&[("b", Value::Int(2)), ("a", Value::Int(1))]).to_string(),
            "{a: 1, b: 2}"
        );
        assert_eq!(Value::error(Value::string("boom")).to_string(), "error: boom");
    }
}
