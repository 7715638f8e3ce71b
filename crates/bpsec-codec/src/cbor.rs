//! Small helpers over `ciborium` values.

use bpsec_eid::Eid;
use ciborium::value::Value;

use crate::error::{CodecError, CodecResult};

/// URI scheme number for the ipn scheme.
pub const IPN_SCHEME: u64 = 2;

pub(crate) fn to_bytes(value: &Value) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(buf)
}

pub(crate) fn from_bytes(data: &[u8]) -> CodecResult<Value> {
    ciborium::de::from_reader(data).map_err(|e: ciborium::de::Error<std::io::Error>| {
        CodecError::Decode(e.to_string())
    })
}

pub(crate) fn uint(value: u64) -> Value {
    Value::Integer(value.into())
}

pub(crate) fn as_u64(value: &Value, field: &'static str) -> CodecResult<u64> {
    match value {
        Value::Integer(i) => {
            u64::try_from(*i).map_err(|_| CodecError::IntegerOutOfRange { field })
        }
        _ => Err(CodecError::UnexpectedItem { expected: field }),
    }
}

pub(crate) fn as_bytes<'a>(value: &'a Value, field: &'static str) -> CodecResult<&'a [u8]> {
    match value {
        Value::Bytes(b) => Ok(b),
        _ => Err(CodecError::UnexpectedItem { expected: field }),
    }
}

pub(crate) fn as_array<'a>(value: &'a Value, field: &'static str) -> CodecResult<&'a [Value]> {
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(CodecError::UnexpectedItem { expected: field }),
    }
}

/// Encode an EID as `[2, [node, service]]`.
pub(crate) fn encode_eid(eid: Eid) -> Value {
    Value::Array(vec![
        uint(IPN_SCHEME),
        Value::Array(vec![uint(eid.node_id), uint(eid.service_id)]),
    ])
}

/// Decode an ipn-scheme EID.
pub(crate) fn decode_eid(value: &Value) -> CodecResult<Eid> {
    let items = as_array(value, "EID array")?;
    if items.len() != 2 {
        return Err(CodecError::TruncatedArray {
            structure: "EID",
            expected: 2,
            got: items.len(),
        });
    }
    let scheme = as_u64(&items[0], "EID scheme")?;
    if scheme != IPN_SCHEME {
        return Err(CodecError::UnsupportedScheme { got: scheme });
    }
    let ssp = as_array(&items[1], "ipn scheme-specific part")?;
    if ssp.len() != 2 {
        return Err(CodecError::TruncatedArray {
            structure: "ipn scheme-specific part",
            expected: 2,
            got: ssp.len(),
        });
    }
    Ok(Eid::new(
        as_u64(&ssp[0], "ipn node number")?,
        as_u64(&ssp[1], "ipn service number")?,
    ))
}
