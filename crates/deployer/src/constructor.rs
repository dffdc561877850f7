//! ABI encoding of constructor arguments given as JSON values.

use {
    alloy::{
        dyn_abi::{DynSolType, DynSolValue, Specifier},
        json_abi::JsonAbi,
        primitives::Bytes,
    },
    serde_json::Value,
    std::iter,
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("constructor takes {expected} arguments but {actual} were given")]
    ArgumentCount { expected: usize, actual: usize },

    #[error("unsupported constructor parameter type {ty}")]
    Type {
        ty: String,
        #[source]
        source: alloy::dyn_abi::Error,
    },

    #[error("argument {path} has {actual} elements but {ty} takes {expected}")]
    Length {
        path: String,
        ty: String,
        expected: usize,
        actual: usize,
    },

    #[error("argument {path} must be {expected} for {ty}")]
    Shape {
        path: String,
        ty: String,
        expected: &'static str,
    },

    #[error("argument {path} ({value}) is not a valid {ty}")]
    Value {
        path: String,
        value: String,
        ty: String,
        #[source]
        source: alloy::dyn_abi::Error,
    },
}

/// Encodes `args` for the constructor described in `abi`. The result gets
/// appended to the creation bytecode and is what explorers expect as
/// constructor arguments.
///
/// Tuples and arrays are JSON arrays with exactly the number of elements the
/// type has. Strings are taken verbatim for `string` parameters and parsed as
/// Solidity literals for everything else. Numbers and booleans are accepted
/// wherever their literal would be.
///
/// Argument paths in errors are the argument index followed by the element
/// index for every nesting level, e.g. `1[0][2]`.
pub fn encode(abi: &JsonAbi, args: &[Value]) -> Result<Bytes, Error> {
    let params = abi
        .constructor()
        .map(|constructor| constructor.inputs.as_slice())
        .unwrap_or_default();
    if params.len() != args.len() {
        return Err(Error::ArgumentCount {
            expected: params.len(),
            actual: args.len(),
        });
    }
    if params.is_empty() {
        return Ok(Bytes::new());
    }

    let values = params
        .iter()
        .zip(args)
        .enumerate()
        .map(|(index, (param, arg))| {
            let ty: DynSolType = param.resolve().map_err(|source| Error::Type {
                ty: param.ty.clone(),
                source,
            })?;
            value(arg, &ty, index.to_string())
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DynSolValue::Tuple(values).abi_encode_params().into())
}

fn value(json: &Value, ty: &DynSolType, path: String) -> Result<DynSolValue, Error> {
    match ty {
        DynSolType::Tuple(types) => {
            let items = items(json, ty, &path, Some(types.len()))?;
            elements(items, types.iter(), &path).map(DynSolValue::Tuple)
        }
        DynSolType::FixedArray(inner, len) => {
            let items = items(json, ty, &path, Some(*len))?;
            elements(items, iter::repeat(inner.as_ref()), &path).map(DynSolValue::FixedArray)
        }
        DynSolType::Array(inner) => {
            let items = items(json, ty, &path, None)?;
            elements(items, iter::repeat(inner.as_ref()), &path).map(DynSolValue::Array)
        }
        DynSolType::String => match json {
            Value::String(text) => Ok(DynSolValue::String(text.clone())),
            _ => Err(shape(ty, path, "a JSON string")),
        },
        _ => {
            let literal = match json {
                Value::String(text) => text.clone(),
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                _ => return Err(shape(ty, path, "a JSON string, number or boolean")),
            };
            ty.coerce_str(&literal).map_err(|source| Error::Value {
                path,
                value: literal,
                ty: ty.sol_type_name().into_owned(),
                source,
            })
        }
    }
}

/// The elements of a JSON array for a tuple or array type, checked against the
/// length the type requires.
fn items<'a>(
    json: &'a Value,
    ty: &DynSolType,
    path: &str,
    expected: Option<usize>,
) -> Result<&'a [Value], Error> {
    let Value::Array(items) = json else {
        return Err(shape(ty, path.to_string(), "a JSON array"));
    };
    match expected {
        Some(expected) if expected != items.len() => Err(Error::Length {
            path: path.to_string(),
            ty: ty.sol_type_name().into_owned(),
            expected,
            actual: items.len(),
        }),
        _ => Ok(items.as_slice()),
    }
}

fn elements<'a>(
    items: &[Value],
    types: impl Iterator<Item = &'a DynSolType>,
    path: &str,
) -> Result<Vec<DynSolValue>, Error> {
    items
        .iter()
        .zip(types)
        .enumerate()
        .map(|(index, (item, ty))| value(item, ty, format!("{path}[{index}]")))
        .collect()
}

fn shape(ty: &DynSolType, path: String, expected: &'static str) -> Error {
    Error::Shape {
        path,
        ty: ty.sol_type_name().into_owned(),
        expected,
    }
}
