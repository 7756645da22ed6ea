//! Default native-callable table referenced by the `GetBuiltin` opcode.
//!
//! Hosts that need a different library can swap the table with
//! [`VM::with_builtins`](crate::VM::with_builtins); the indices baked into
//! the bytecode must match whatever table the VM runs with.

use tarn_common::{BuiltinFunction, RuntimeError, Value};

/// Builtins available to compiled programs, in index order.
pub static BUILTINS: &[BuiltinFunction] = &[
    BuiltinFunction {
        name: "len",
        func: builtin_len,
    },
    BuiltinFunction {
        name: "append",
        func: builtin_append,
    },
    BuiltinFunction {
        name: "copy",
        func: builtin_copy,
    },
    BuiltinFunction {
        name: "type_name",
        func: builtin_type_name,
    },
    BuiltinFunction {
        name: "string",
        func: builtin_string,
    },
];

fn builtin_len(args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() != 1 {
        return Err(RuntimeError::WrongNumArguments {
            want: 1,
            got: args.len(),
        });
    }
    let len = match &args[0] {
        Value::String(s) => s.len(),
        Value::Bytes(data) => data.borrow().len(),
        Value::Array(items) | Value::ImmutableArray(items) => items.borrow().len(),
        Value::Map(entries) | Value::ImmutableMap(entries) => entries.borrow().len(),
        other => {
            return Err(RuntimeError::InvalidArgumentType {
                name: "first",
                expected: "array/map/string/bytes",
                found: other.type_name(),
            })
        }
    };
    Ok(Value::Int(len as i64))
}

fn builtin_append(args: &[Value]) -> Result<Value, RuntimeError> {
    if args.is_empty() {
        return Err(RuntimeError::WrongNumArguments { want: 1, got: 0 });
    }
    let mut items = match &args[0] {
        Value::Array(items) | Value::ImmutableArray(items) => items.borrow().clone(),
        other => {
            return Err(RuntimeError::InvalidArgumentType {
                name: "first",
                expected: "array",
                found: other.type_name(),
            })
        }
    };
    items.extend_from_slice(&args[1..]);
    Ok(Value::array(items))
}

fn builtin_copy(args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() != 1 {
        return Err(RuntimeError::WrongNumArguments {
            want: 1,
            got: args.len(),
        });
    }
    Ok(deep_copy(&args[0]))
}

/// Recursively copy mutable containers; everything else is shared.
fn deep_copy(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::array(items.borrow().iter().map(deep_copy).collect()),
        Value::Map(entries) => Value::map(
            entries
                .borrow()
                .iter()
                .map(|(key, value)| (key.clone(), deep_copy(value)))
                .collect(),
        ),
        Value::Bytes(data) => Value::bytes(data.borrow().clone()),
        other => other.clone(),
    }
}

fn builtin_type_name(args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() != 1 {
        return Err(RuntimeError::WrongNumArguments {
            want: 1,
            got: args.len(),
        });
    }
    Ok(Value::string(args[0].type_name()))
}

fn builtin_string(args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() != 1 {
        return Err(RuntimeError::WrongNumArguments {
            want: 1,
            got: args.len(),
        });
    }
    match &args[0] {
        Value::String(_) => Ok(args[0].clone()),
        other => Ok(Value::string(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn len_over_every_container() {
        assert_eq!(builtin_len(&[Value::string("abc")]), Ok(Value::Int(3)));
        assert_eq!(builtin_len(&[Value::bytes(vec![1, 2])]), Ok(Value::Int(2)));
        assert_eq!(
            builtin_len(&[Value::immutable_array(vec![Value::Int(1)])]),
            Ok(Value::Int(1))
        );
        assert_eq!(
            builtin_len(&[Value::map(HashMap::new())]),
            Ok(Value::Int(0))
        );
    }

    #[test]
    fn len_rejects_scalars_and_bad_arity() {
        assert_eq!(
            builtin_len(&[Value::Int(1)]),
            Err(RuntimeError::InvalidArgumentType {
                name: "first",
                expected: "array/map/string/bytes",
                found: "int",
            })
        );
        assert_eq!(
            builtin_len(&[]),
            Err(RuntimeError::WrongNumArguments { want: 1, got: 0 })
        );
    }

    #[test]
    fn append_builds_a_new_array() {
        let base = Value::array(vec![Value::Int(1)]);
        let out = builtin_append(&[base.clone(), Value::Int(2), Value::Int(3)]).unwrap();
        assert_eq!(
            out,
            Value::array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
        // The original array is untouched.
        assert_eq!(base, Value::array(vec![Value::Int(1)]));
    }

    #[test]
    fn copy_detaches_nested_storage() {
        let inner = Value::array(vec![Value::Int(1)]);
        let outer = Value::array(vec![inner.clone()]);
        let copied = builtin_copy(&[outer.clone()]).unwrap();

        inner.index_set(&Value::Int(0), Value::Int(99)).unwrap();
        assert_eq!(
            copied,
            Value::array(vec![Value::array(vec![Value::Int(1)])])
        );
        assert_eq!(
            outer,
            Value::array(vec![Value::array(vec![Value::Int(99)])])
        );
    }

    #[test]
    fn string_coerces_and_passes_strings_through() {
        assert_eq!(builtin_string(&[Value::Int(-4)]), Ok(Value::string("-4")));
        let s = Value::string("as-is");
        assert_eq!(builtin_string(&[s.clone()]), Ok(s));
    }

    #[test]
    fn type_name_reports_variant() {
        assert_eq!(
            builtin_type_name(&[Value::bytes(vec![])]),
            Ok(Value::string("bytes"))
        );
    }
}
