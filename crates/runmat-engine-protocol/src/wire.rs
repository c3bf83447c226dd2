//! Wire form of foreign arrays.
//!
//! Dense element data travels as base64 of the little-endian element bytes
//! in column-major order, so non-finite values and integer extremes survive
//! the trip unchanged.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use runmat_mx::{with_numeric, ElementType, MxArray, NumericData, Payload, SparseData};
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// A foreign array as carried inside `put` requests and `value` replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireArray {
    pub shape: Vec<usize>,
    pub data: WireData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireData {
    Numeric {
        class: ElementType,
        real: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        imag: Option<String>,
    },
    /// One byte per element, 0 or 1
    Logical { data: String },
    /// UTF-16 code units
    Char { data: String },
    Cell { elements: Vec<WireArray> },
    /// `values[element * fields.len() + field]`
    Struct {
        fields: Vec<String>,
        values: Vec<WireArray>,
    },
    /// Compressed-column sparse double
    Sparse {
        col_ptr: Vec<usize>,
        row_idx: Vec<usize>,
        real: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        imag: Option<String>,
    },
}

fn encode_numeric(data: &NumericData) -> String {
    let bytes: Vec<u8> = with_numeric!(data, v => v.iter().flat_map(|x| x.to_le_bytes()).collect());
    STANDARD.encode(bytes)
}

fn encode_f64(values: &[f64]) -> String {
    STANDARD.encode(values.iter().flat_map(|x| x.to_le_bytes()).collect::<Vec<u8>>())
}

fn decode_bytes(text: &str, elem_size: usize) -> Result<Vec<u8>> {
    let bytes = STANDARD.decode(text)?;
    if bytes.len() % elem_size != 0 {
        return Err(ProtocolError::Malformed(format!(
            "{} payload bytes are not a multiple of the element size {elem_size}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

fn decode_numeric(class: ElementType, text: &str) -> Result<NumericData> {
    let bytes = decode_bytes(text, class.size_bytes())?;
    macro_rules! decode {
        ($variant:ident, $t:ty) => {
            NumericData::$variant(
                bytes
                    .chunks_exact(std::mem::size_of::<$t>())
                    .map(|c| {
                        let mut raw = [0u8; std::mem::size_of::<$t>()];
                        raw.copy_from_slice(c);
                        <$t>::from_le_bytes(raw)
                    })
                    .collect(),
            )
        };
    }
    Ok(match class {
        ElementType::Int8 => decode!(Int8, i8),
        ElementType::Int16 => decode!(Int16, i16),
        ElementType::Int32 => decode!(Int32, i32),
        ElementType::Int64 => decode!(Int64, i64),
        ElementType::UInt8 => decode!(UInt8, u8),
        ElementType::UInt16 => decode!(UInt16, u16),
        ElementType::UInt32 => decode!(UInt32, u32),
        ElementType::UInt64 => decode!(UInt64, u64),
        ElementType::Float32 => decode!(Float32, f32),
        ElementType::Float64 => decode!(Float64, f64),
        ElementType::Logical | ElementType::Char => {
            return Err(ProtocolError::Malformed(format!(
                "{class} is not a numeric class"
            )))
        }
    })
}

fn decode_f64(text: &str) -> Result<Vec<f64>> {
    match decode_numeric(ElementType::Float64, text)? {
        NumericData::Float64(v) => Ok(v),
        _ => Err(ProtocolError::Malformed("expected double data".into())),
    }
}

impl From<&MxArray> for WireArray {
    fn from(array: &MxArray) -> Self {
        let data = match array.payload() {
            Payload::Numeric { real, imag } => WireData::Numeric {
                class: real.element_type(),
                real: encode_numeric(real),
                imag: imag.as_ref().map(encode_numeric),
            },
            Payload::Logical(v) => WireData::Logical {
                data: STANDARD.encode(v.iter().map(|&b| u8::from(b)).collect::<Vec<u8>>()),
            },
            Payload::Char(v) => WireData::Char {
                data: STANDARD.encode(v.iter().flat_map(|u| u.to_le_bytes()).collect::<Vec<u8>>()),
            },
            Payload::Cell(cells) => WireData::Cell {
                elements: cells.iter().map(WireArray::from).collect(),
            },
            Payload::Struct { fields, values } => WireData::Struct {
                fields: fields.clone(),
                values: values.iter().map(WireArray::from).collect(),
            },
            Payload::Sparse(sp) => WireData::Sparse {
                col_ptr: sp.col_ptr.clone(),
                row_idx: sp.row_idx.clone(),
                real: encode_f64(&sp.real),
                imag: sp.imag.as_deref().map(encode_f64),
            },
        };
        WireArray {
            shape: array.shape().to_vec(),
            data,
        }
    }
}

impl TryFrom<WireArray> for MxArray {
    type Error = ProtocolError;

    fn try_from(wire: WireArray) -> Result<Self> {
        let payload = match wire.data {
            WireData::Numeric { class, real, imag } => Payload::Numeric {
                real: decode_numeric(class, &real)?,
                imag: imag.map(|im| decode_numeric(class, &im)).transpose()?,
            },
            WireData::Logical { data } => {
                Payload::Logical(decode_bytes(&data, 1)?.into_iter().map(|b| b != 0).collect())
            }
            WireData::Char { data } => Payload::Char(
                decode_bytes(&data, 2)?
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect(),
            ),
            WireData::Cell { elements } => Payload::Cell(
                elements
                    .into_iter()
                    .map(MxArray::try_from)
                    .collect::<Result<_>>()?,
            ),
            WireData::Struct { fields, values } => Payload::Struct {
                fields,
                values: values
                    .into_iter()
                    .map(MxArray::try_from)
                    .collect::<Result<_>>()?,
            },
            WireData::Sparse {
                col_ptr,
                row_idx,
                real,
                imag,
            } => {
                if wire.shape.len() != 2 {
                    return Err(ProtocolError::Malformed(format!(
                        "sparse array with shape {:?}",
                        wire.shape
                    )));
                }
                Payload::Sparse(SparseData {
                    nrows: wire.shape[0],
                    ncols: wire.shape[1],
                    col_ptr,
                    row_idx,
                    real: decode_f64(&real)?,
                    imag: imag.as_deref().map(decode_f64).transpose()?,
                })
            }
        };
        Ok(MxArray::from_parts(wire.shape, payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runmat_mx::{HostArray, HostValue, IndexMap, SparseMatrix, ToForeign};

    fn through_wire(array: &MxArray) -> MxArray {
        let json = serde_json::to_string(&WireArray::from(array)).unwrap();
        let wire: WireArray = serde_json::from_str(&json).unwrap();
        MxArray::try_from(wire).unwrap()
    }

    #[test]
    fn special_floats_survive() {
        let host = HostArray::column_major(
            vec![f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -0.0],
            vec![2, 2],
        )
        .unwrap();
        let array = host.to_mx_array().unwrap();
        let back = through_wire(&array);
        match back.payload() {
            Payload::Numeric {
                real: NumericData::Float64(v),
                ..
            } => {
                assert!(v[0].is_nan());
                assert_eq!(v[1], f64::INFINITY);
                assert_eq!(v[2], f64::NEG_INFINITY);
                assert!(v[3].is_sign_negative());
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn integer_extremes_and_nested_containers() {
        let mut map = IndexMap::new();
        map.insert("big".to_string(), HostValue::from(u64::MAX));
        map.insert("small".to_string(), HostValue::from(i8::MIN));
        map.insert(
            "items".to_string(),
            HostValue::Cell(vec![HostValue::from("ü"), HostValue::from(false)]),
        );
        let array = map.to_mx_array().unwrap();
        assert_eq!(through_wire(&array), array);
    }

    #[test]
    fn sparse_keeps_structure() {
        let s = SparseMatrix::new(4, 3, vec![3, 0], vec![2, 0], vec![7.5, -1.0]).unwrap();
        let array = s.to_mx_array().unwrap();
        assert_eq!(through_wire(&array), array);
    }

    #[test]
    fn truncated_payload_is_malformed() {
        let wire = WireArray {
            shape: vec![1, 1],
            data: WireData::Numeric {
                class: ElementType::Float64,
                real: STANDARD.encode([0u8; 5]),
                imag: None,
            },
        };
        assert!(matches!(
            MxArray::try_from(wire),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let wire = WireArray {
            shape: vec![2, 2],
            data: WireData::Logical {
                data: STANDARD.encode([1u8]),
            },
        };
        assert!(matches!(MxArray::try_from(wire), Err(ProtocolError::Mx(_))));
    }
}
