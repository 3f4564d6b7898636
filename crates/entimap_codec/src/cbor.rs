//! CBOR serialization through `ciborium`.

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes `value` as CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::EncodingFailed`] if serialization fails.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buf)
}

/// Decodes a value previously written by [`to_cbor`].
///
/// # Errors
///
/// Returns [`CodecError::DecodingFailed`] on malformed or mismatched input.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Row, Value};

    #[test]
    fn row_with_nested_values_survives() {
        let mut row = Row::new();
        row.insert("name", "Smarty Pants, Inc.");
        row.insert("id", 2i64);
        row.insert("ratio", Value::Float(0.5));
        row.insert("tags", Value::List(vec!["a".into(), Value::Null]));

        let decoded: Row = from_cbor(&to_cbor(&row).unwrap()).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn garbage_is_rejected() {
        let result: CodecResult<Row> = from_cbor(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(CodecError::DecodingFailed { .. })));
    }
}
