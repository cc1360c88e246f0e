//! Borsh encoding of JSON instruction arguments, and decoding of account data
//! back to JSON.

use {
    crate::interface::{Field, IdlType},
    borsh::{BorshDeserialize, BorshSerialize},
    playground_runner_error::error::RunnerError,
    serde_json::{Map, Number, Value},
    std::str::FromStr,
    trezoa_pubkey::Pubkey,
};

/// Encode `values` against the declared argument list of `instruction`.
pub fn encode_args(
    instruction: &str,
    declared: &[Field],
    values: &[Value],
) -> Result<Vec<u8>, RunnerError> {
    if declared.len() != values.len() {
        return Err(RunnerError::InvalidArguments(format!(
            "\"{instruction}\" expects {} argument(s), got {}",
            declared.len(),
            values.len()
        )));
    }
    let mut out = Vec::new();
    for (field, value) in declared.iter().zip(values) {
        encode_value(&field.ty, value, &mut out).map_err(|reason| {
            RunnerError::InvalidArguments(format!("argument \"{}\": {reason}", field.name))
        })?;
    }
    Ok(out)
}

fn write<T: BorshSerialize>(value: &T, out: &mut Vec<u8>) -> Result<(), String> {
    value.serialize(out).map_err(|err| err.to_string())
}

fn expected(what: &str, value: &Value) -> String {
    format!("expected {what}, got {value}")
}

/// Integers arrive as JSON numbers, or as decimal strings when they exceed
/// what JavaScript numbers can hold.
fn integer<T: FromStr + TryFrom<u64> + TryFrom<i64>>(value: &Value, what: &str) -> Result<T, String> {
    let parsed = match value {
        Value::Number(number) => {
            if let Some(n) = number.as_u64() {
                T::try_from(n).ok()
            } else if let Some(n) = number.as_i64() {
                T::try_from(n).ok()
            } else {
                None
            }
        }
        Value::String(text) => text.trim().parse::<T>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| expected(what, value))
}

fn float(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| expected("a number", value))
}

fn encode_value(ty: &IdlType, value: &Value, out: &mut Vec<u8>) -> Result<(), String> {
    match ty {
        IdlType::Bool => match value {
            Value::Bool(b) => write(b, out),
            _ => Err(expected("a boolean", value)),
        },
        IdlType::U8 => write(&integer::<u8>(value, "u8")?, out),
        IdlType::U16 => write(&integer::<u16>(value, "u16")?, out),
        IdlType::U32 => write(&integer::<u32>(value, "u32")?, out),
        IdlType::U64 => write(&integer::<u64>(value, "u64")?, out),
        IdlType::U128 => write(&integer::<u128>(value, "u128")?, out),
        IdlType::I8 => write(&integer::<i8>(value, "i8")?, out),
        IdlType::I16 => write(&integer::<i16>(value, "i16")?, out),
        IdlType::I32 => write(&integer::<i32>(value, "i32")?, out),
        IdlType::I64 => write(&integer::<i64>(value, "i64")?, out),
        IdlType::I128 => write(&integer::<i128>(value, "i128")?, out),
        IdlType::F32 => write(&(float(value)? as f32), out),
        IdlType::F64 => write(&float(value)?, out),
        IdlType::String => match value {
            Value::String(text) => write(text, out),
            _ => Err(expected("a string", value)),
        },
        IdlType::Pubkey => {
            let text = value.as_str().ok_or_else(|| expected("a base58 address", value))?;
            let pubkey = Pubkey::from_str(text).map_err(|err| format!("{text}: {err}"))?;
            out.extend_from_slice(pubkey.as_ref());
            Ok(())
        }
        IdlType::Bytes => {
            let items = value.as_array().ok_or_else(|| expected("a byte array", value))?;
            let bytes = items
                .iter()
                .map(|item| integer::<u8>(item, "a byte"))
                .collect::<Result<Vec<u8>, _>>()?;
            write(&bytes, out)
        }
        IdlType::Vec(inner) => {
            let items = value.as_array().ok_or_else(|| expected("an array", value))?;
            write(&(items.len() as u32), out)?;
            items.iter().try_for_each(|item| encode_value(inner, item, out))
        }
        IdlType::Option(inner) => {
            if value.is_null() {
                out.push(0);
                Ok(())
            } else {
                out.push(1);
                encode_value(inner, value, out)
            }
        }
        IdlType::Array(inner, len) => {
            let items = value.as_array().ok_or_else(|| expected("an array", value))?;
            if items.len() != *len {
                return Err(format!("expected {len} elements, got {}", items.len()));
            }
            items.iter().try_for_each(|item| encode_value(inner, item, out))
        }
        IdlType::Defined(name) => Err(format!("type \"{name}\" is not supported")),
    }
}

/// Decode struct fields from `data` in declaration order.
///
/// Stops at the first field that cannot be decoded, returning the fields
/// decoded so far.
pub fn decode_fields(fields: &[Field], data: &[u8]) -> Map<String, Value> {
    let mut cursor = data;
    let mut out = Map::new();
    for field in fields {
        match decode_value(&field.ty, &mut cursor) {
            Some(value) => {
                out.insert(field.name.clone(), value);
            }
            None => break,
        }
    }
    out
}

fn read<T: BorshDeserialize>(cursor: &mut &[u8]) -> Option<T> {
    T::deserialize(cursor).ok()
}

fn decode_value(ty: &IdlType, cursor: &mut &[u8]) -> Option<Value> {
    Some(match ty {
        IdlType::Bool => Value::Bool(read(cursor)?),
        IdlType::U8 => Value::from(read::<u8>(cursor)?),
        IdlType::U16 => Value::from(read::<u16>(cursor)?),
        IdlType::U32 => Value::from(read::<u32>(cursor)?),
        IdlType::U64 => Value::from(read::<u64>(cursor)?),
        IdlType::I8 => Value::from(read::<i8>(cursor)?),
        IdlType::I16 => Value::from(read::<i16>(cursor)?),
        IdlType::I32 => Value::from(read::<i32>(cursor)?),
        IdlType::I64 => Value::from(read::<i64>(cursor)?),
        // Wider than a JSON number can carry exactly.
        IdlType::U128 => Value::String(read::<u128>(cursor)?.to_string()),
        IdlType::I128 => Value::String(read::<i128>(cursor)?.to_string()),
        IdlType::F32 => Value::Number(Number::from_f64(read::<f32>(cursor)? as f64)?),
        IdlType::F64 => Value::Number(Number::from_f64(read::<f64>(cursor)?)?),
        IdlType::String => Value::String(read(cursor)?),
        IdlType::Pubkey => {
            let bytes: [u8; 32] = read(cursor)?;
            Value::String(Pubkey::new_from_array(bytes).to_string())
        }
        IdlType::Bytes => Value::from(read::<Vec<u8>>(cursor)?),
        IdlType::Vec(inner) => {
            let len = read::<u32>(cursor)? as usize;
            // Each element takes at least one byte.
            if len > cursor.len() {
                return None;
            }
            Value::Array(
                (0..len)
                    .map(|_| decode_value(inner, cursor))
                    .collect::<Option<_>>()?,
            )
        }
        IdlType::Option(inner) => match read::<u8>(cursor)? {
            0 => Value::Null,
            1 => decode_value(inner, cursor)?,
            _ => return None,
        },
        IdlType::Array(inner, len) => Value::Array(
            (0..*len)
                .map(|_| decode_value(inner, cursor))
                .collect::<Option<_>>()?,
        ),
        IdlType::Defined(_) => return None,
    })
}
