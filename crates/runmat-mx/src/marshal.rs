//! Conversions between host containers and foreign blocks.
//!
//! Every conversion is a deep copy. Host to foreign goes through
//! [`ToForeign`]; the opposite direction is a set of explicit functions the
//! caller picks from (`to_scalar`, `to_array`, `to_mapping`, ...), plus
//! [`to_default`] for when any sensible host shape will do.

use indexmap::IndexMap;
use num_complex::{Complex32, Complex64};

use crate::alloc::ForeignAllocator;
use crate::class::ValueKind;
use crate::error::{MxError, MxResult};
use crate::host::{
    HostArray, HostCellArray, HostData, HostStructArray, HostValue, Record, Scalar, SparseMatrix,
    StructArrayMode,
};
use crate::layout::{non_singleton_dims, Order};
use crate::storage::{try_filled, MxArray, NumericData, Payload, SparseData};
use crate::value::ForeignValue;

/// Host values that can be copied into foreign memory.
pub trait ToForeign {
    /// Build the foreign block without charging any allocator.
    fn to_mx_array(&self) -> MxResult<MxArray>;

    /// Copy into a new host-owned value drawn from `allocator`.
    fn to_foreign_in(&self, allocator: &ForeignAllocator) -> MxResult<ForeignValue> {
        allocator.adopt(self.to_mx_array()?)
    }

    /// Copy into a new host-owned value drawn from the global allocator.
    fn to_foreign(&self) -> MxResult<ForeignValue> {
        self.to_foreign_in(ForeignAllocator::global())
    }
}

impl<T: ToForeign + ?Sized> ToForeign for &T {
    fn to_mx_array(&self) -> MxResult<MxArray> {
        (**self).to_mx_array()
    }
}

fn bmp_unit(c: char) -> MxResult<u16> {
    u16::try_from(u32::from(c)).map_err(|_| {
        MxError::type_error(format!(
            "character U+{:04X} is outside the basic multilingual plane",
            u32::from(c)
        ))
    })
}

/// Payload for column-major host data.
fn data_payload(data: &HostData) -> MxResult<Payload> {
    let numeric = |real: NumericData| Payload::Numeric { real, imag: None };
    Ok(match data {
        HostData::Int8(v) => numeric(NumericData::Int8(v.clone())),
        HostData::Int16(v) => numeric(NumericData::Int16(v.clone())),
        HostData::Int32(v) => numeric(NumericData::Int32(v.clone())),
        HostData::Int64(v) => numeric(NumericData::Int64(v.clone())),
        HostData::UInt8(v) => numeric(NumericData::UInt8(v.clone())),
        HostData::UInt16(v) => numeric(NumericData::UInt16(v.clone())),
        HostData::UInt32(v) => numeric(NumericData::UInt32(v.clone())),
        HostData::UInt64(v) => numeric(NumericData::UInt64(v.clone())),
        HostData::Float32(v) => numeric(NumericData::Float32(v.clone())),
        HostData::Float64(v) => numeric(NumericData::Float64(v.clone())),
        HostData::Bool(v) => Payload::Logical(v.clone()),
        HostData::Char(v) => Payload::Char(v.iter().map(|&c| bmp_unit(c)).collect::<MxResult<_>>()?),
        HostData::Complex32(v) => Payload::Numeric {
            real: NumericData::Float32(v.iter().map(|z| z.re).collect()),
            imag: Some(NumericData::Float32(v.iter().map(|z| z.im).collect())),
        },
        HostData::Complex64(v) => Payload::Numeric {
            real: NumericData::Float64(v.iter().map(|z| z.re).collect()),
            imag: Some(NumericData::Float64(v.iter().map(|z| z.im).collect())),
        },
    })
}

impl ToForeign for Scalar {
    fn to_mx_array(&self) -> MxResult<MxArray> {
        MxArray::from_parts(vec![1, 1], data_payload(&self.to_data())?)
    }
}

impl ToForeign for HostArray {
    fn to_mx_array(&self) -> MxResult<MxArray> {
        let column_major = if self.order() == Order::ColumnMajor {
            data_payload(self.data())?
        } else {
            data_payload(self.to_order(Order::ColumnMajor).data())?
        };
        MxArray::from_parts(self.shape().to_vec(), column_major)
    }
}

impl ToForeign for str {
    fn to_mx_array(&self) -> MxResult<MxArray> {
        Ok(MxArray::char_row(self))
    }
}

impl ToForeign for String {
    fn to_mx_array(&self) -> MxResult<MxArray> {
        Ok(MxArray::char_row(self))
    }
}

impl ToForeign for SparseMatrix {
    fn to_mx_array(&self) -> MxResult<MxArray> {
        let entries = self.canonical();
        let mut col_ptr = vec![0usize; self.ncols() + 1];
        for &(_, c, _) in &entries {
            col_ptr[c + 1] += 1;
        }
        for c in 0..self.ncols() {
            col_ptr[c + 1] += col_ptr[c];
        }
        let data = SparseData {
            nrows: self.nrows(),
            ncols: self.ncols(),
            col_ptr,
            row_idx: entries.iter().map(|e| e.0).collect(),
            real: entries.iter().map(|e| e.2).collect(),
            imag: None,
        };
        MxArray::from_parts(vec![self.nrows(), self.ncols()], Payload::Sparse(data))
    }
}

impl ToForeign for [HostValue] {
    fn to_mx_array(&self) -> MxResult<MxArray> {
        let cells = self
            .iter()
            .map(ToForeign::to_mx_array)
            .collect::<MxResult<Vec<_>>>()?;
        MxArray::from_parts(vec![1, cells.len()], Payload::Cell(cells))
    }
}

impl ToForeign for Vec<HostValue> {
    fn to_mx_array(&self) -> MxResult<MxArray> {
        self.as_slice().to_mx_array()
    }
}

impl ToForeign for IndexMap<String, HostValue> {
    fn to_mx_array(&self) -> MxResult<MxArray> {
        let fields: Vec<String> = self.keys().cloned().collect();
        let values = self
            .values()
            .map(ToForeign::to_mx_array)
            .collect::<MxResult<Vec<_>>>()?;
        MxArray::from_parts(vec![1, 1], Payload::Struct { fields, values })
    }
}

impl ToForeign for HostCellArray {
    fn to_mx_array(&self) -> MxResult<MxArray> {
        let cells = self
            .elements
            .iter()
            .map(ToForeign::to_mx_array)
            .collect::<MxResult<Vec<_>>>()?;
        MxArray::from_parts(self.shape.clone(), Payload::Cell(cells))
    }
}

impl ToForeign for HostStructArray {
    fn to_mx_array(&self) -> MxResult<MxArray> {
        let mut values = Vec::with_capacity(self.elements.len() * self.fields.len());
        for (i, element) in self.elements.iter().enumerate() {
            if element.len() != self.fields.len() {
                return Err(MxError::invalid(format!(
                    "struct element {i} has {} fields, expected {}",
                    element.len(),
                    self.fields.len()
                )));
            }
            for name in &self.fields {
                let value = element.get(name).ok_or_else(|| {
                    MxError::invalid(format!("struct element {i} is missing field '{name}'"))
                })?;
                values.push(value.to_mx_array()?);
            }
        }
        let payload = Payload::Struct {
            fields: self.fields.clone(),
            values,
        };
        MxArray::from_parts(self.shape.clone(), payload)
    }
}

impl ToForeign for HostValue {
    fn to_mx_array(&self) -> MxResult<MxArray> {
        match self {
            HostValue::Scalar(s) => s.to_mx_array(),
            HostValue::Array(a) => a.to_mx_array(),
            HostValue::String(s) => s.to_mx_array(),
            HostValue::Cell(items) => items.to_mx_array(),
            HostValue::CellArray(c) => c.to_mx_array(),
            HostValue::Map(m) => m.to_mx_array(),
            HostValue::StructArray(s) => s.to_mx_array(),
            HostValue::Sparse(s) => s.to_mx_array(),
        }
    }
}

macro_rules! scalar_to_foreign {
    ($($t:ty),* $(,)?) => {
        $(
            impl ToForeign for $t {
                fn to_mx_array(&self) -> MxResult<MxArray> {
                    Scalar::from(*self).to_mx_array()
                }
            }
        )*
    };
}

scalar_to_foreign!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, bool, char, Complex32, Complex64);

/// Host value for one record: a string-keyed map in field order.
pub fn from_record<R: Record + ?Sized>(record: &R) -> HostValue {
    HostValue::Map(record.fields())
}

/// Host value for a sequence of records.
///
/// `CellOfStructs` gives a 1xN cell of 1x1 structs; `StructArray` gives one
/// 1xN struct array and requires every record to carry the same field set.
pub fn from_records<R: Record>(records: &[R], mode: StructArrayMode) -> MxResult<HostValue> {
    let maps: Vec<IndexMap<String, HostValue>> = records.iter().map(Record::fields).collect();
    match mode {
        StructArrayMode::CellOfStructs => {
            Ok(HostValue::Cell(maps.into_iter().map(HostValue::Map).collect()))
        }
        StructArrayMode::StructArray => {
            let fields: Vec<String> = maps
                .first()
                .map(|m| m.keys().cloned().collect())
                .unwrap_or_default();
            for (i, map) in maps.iter().enumerate() {
                if map.len() != fields.len() || !fields.iter().all(|f| map.contains_key(f)) {
                    return Err(MxError::invalid(format!(
                        "record {i} does not have the fields {fields:?}"
                    )));
                }
            }
            Ok(HostValue::StructArray(HostStructArray {
                shape: vec![1, maps.len()],
                fields,
                elements: maps,
            }))
        }
    }
}

/// Anything that exposes a foreign block for reading: a host-owned
/// [`ForeignValue`] or a nested [`MxArray`].
pub trait AsArray {
    fn as_array(&self) -> MxResult<&MxArray>;
}

impl AsArray for MxArray {
    fn as_array(&self) -> MxResult<&MxArray> {
        Ok(self)
    }
}

impl AsArray for ForeignValue {
    fn as_array(&self) -> MxResult<&MxArray> {
        self.array()
    }
}

impl<T: AsArray + ?Sized> AsArray for &T {
    fn as_array(&self) -> MxResult<&MxArray> {
        (**self).as_array()
    }
}

fn char_of(unit: u16) -> char {
    char::from_u32(u32::from(unit)).unwrap_or(char::REPLACEMENT_CHARACTER)
}

fn numeric_data(real: &NumericData, imag: Option<&NumericData>) -> HostData {
    match (real, imag) {
        (NumericData::Float32(re), Some(NumericData::Float32(im))) => HostData::Complex32(
            re.iter().zip(im).map(|(&r, &i)| Complex32::new(r, i)).collect(),
        ),
        (re, Some(im)) => HostData::Complex64(
            re.to_f64_vec()
                .into_iter()
                .zip(im.to_f64_vec())
                .map(|(r, i)| Complex64::new(r, i))
                .collect(),
        ),
        (NumericData::Int8(v), None) => HostData::Int8(v.clone()),
        (NumericData::Int16(v), None) => HostData::Int16(v.clone()),
        (NumericData::Int32(v), None) => HostData::Int32(v.clone()),
        (NumericData::Int64(v), None) => HostData::Int64(v.clone()),
        (NumericData::UInt8(v), None) => HostData::UInt8(v.clone()),
        (NumericData::UInt16(v), None) => HostData::UInt16(v.clone()),
        (NumericData::UInt32(v), None) => HostData::UInt32(v.clone()),
        (NumericData::UInt64(v), None) => HostData::UInt64(v.clone()),
        (NumericData::Float32(v), None) => HostData::Float32(v.clone()),
        (NumericData::Float64(v), None) => HostData::Float64(v.clone()),
    }
}

fn densify(sp: &SparseData) -> MxResult<HostData> {
    let len = sp
        .nrows
        .checked_mul(sp.ncols)
        .ok_or_else(|| MxError::Allocation {
            requested: usize::MAX,
            in_use: 0,
            limit: None,
        })?;
    Ok(match &sp.imag {
        None => {
            let mut dense = try_filled(len, 0.0, 8)?;
            for (r, c, re, _) in sp.entries() {
                dense[c * sp.nrows + r] = re;
            }
            HostData::Float64(dense)
        }
        Some(_) => {
            let mut dense = try_filled(len, Complex64::new(0.0, 0.0), 16)?;
            for (r, c, re, im) in sp.entries() {
                dense[c * sp.nrows + r] = Complex64::new(re, im);
            }
            HostData::Complex64(dense)
        }
    })
}

/// Column-major typed data for numeric, logical, char and sparse blocks.
fn dense_data(array: &MxArray) -> MxResult<HostData> {
    match array.payload() {
        Payload::Numeric { real, imag } => Ok(numeric_data(real, imag.as_ref())),
        Payload::Logical(v) => Ok(HostData::Bool(v.clone())),
        Payload::Char(v) => Ok(HostData::Char(v.iter().map(|&u| char_of(u)).collect())),
        Payload::Sparse(sp) => densify(sp),
        Payload::Cell(_) | Payload::Struct { .. } => Err(MxError::type_error(format!(
            "{} cannot be converted to a host array",
            array.describe()
        ))),
    }
}

/// The single element of a 1x1 (or 1x1x...x1) block.
pub fn to_scalar(value: &impl AsArray) -> MxResult<Scalar> {
    let array = value.as_array()?;
    if array.numel() != 1 {
        return Err(MxError::shape(format!(
            "{} does not hold exactly one element",
            array.describe()
        )));
    }
    if let Payload::Sparse(sp) = array.payload() {
        let (re, im) = sp.entries().next().map_or((0.0, 0.0), |(_, _, re, im)| (re, im));
        return Ok(match sp.imag {
            Some(_) => Scalar::Complex64(Complex64::new(re, im)),
            None => Scalar::Float64(re),
        });
    }
    Ok(match dense_data(array)? {
        HostData::Int8(v) => Scalar::Int8(v[0]),
        HostData::Int16(v) => Scalar::Int16(v[0]),
        HostData::Int32(v) => Scalar::Int32(v[0]),
        HostData::Int64(v) => Scalar::Int64(v[0]),
        HostData::UInt8(v) => Scalar::UInt8(v[0]),
        HostData::UInt16(v) => Scalar::UInt16(v[0]),
        HostData::UInt32(v) => Scalar::UInt32(v[0]),
        HostData::UInt64(v) => Scalar::UInt64(v[0]),
        HostData::Float32(v) => Scalar::Float32(v[0]),
        HostData::Float64(v) => Scalar::Float64(v[0]),
        HostData::Bool(v) => Scalar::Bool(v[0]),
        HostData::Char(v) => Scalar::Char(v[0]),
        HostData::Complex32(v) => Scalar::Complex32(v[0]),
        HostData::Complex64(v) => Scalar::Complex64(v[0]),
    })
}

/// 1-D copy of a block with at most one non-singleton dimension.
pub fn to_vector(value: &impl AsArray) -> MxResult<HostArray> {
    let array = value.as_array()?;
    if non_singleton_dims(array.shape()) > 1 {
        return Err(MxError::shape(format!("{} is not a vector", array.describe())));
    }
    let data = dense_data(array)?;
    let len = data.len();
    HostArray::new(data, vec![len], Order::ColumnMajor)
}

/// Column-major copy with the block's full shape. Sparse blocks are
/// densified.
pub fn to_array(value: &impl AsArray) -> MxResult<HostArray> {
    let array = value.as_array()?;
    let data = dense_data(array)?;
    HostArray::new(data, array.shape().to_vec(), Order::ColumnMajor)
}

/// Text of a char row (or empty char array).
pub fn to_string(value: &impl AsArray) -> MxResult<String> {
    let array = value.as_array()?;
    match array.payload() {
        Payload::Char(units) => {
            let shape = array.shape();
            let single_row = shape[0] == 1 && shape[2..].iter().all(|&d| d == 1);
            if !single_row && !units.is_empty() {
                return Err(MxError::shape(format!(
                    "{} is not a single row of text",
                    array.describe()
                )));
            }
            Ok(String::from_utf16_lossy(units))
        }
        _ => Err(MxError::type_error(format!("{} is not char", array.describe()))),
    }
}

fn struct_parts(array: &MxArray) -> MxResult<(&[String], &[MxArray])> {
    match array.payload() {
        Payload::Struct { fields, values } => Ok((fields, values)),
        _ => Err(MxError::type_error(format!("{} is not a struct", array.describe()))),
    }
}

fn element_map(fields: &[String], values: &[MxArray], e: usize) -> MxResult<IndexMap<String, HostValue>> {
    let base = e * fields.len();
    fields
        .iter()
        .enumerate()
        .map(|(f, name)| Ok::<_, MxError>((name.clone(), to_default(&values[base + f])?)))
        .collect()
}

/// Field map of a 1x1 struct.
pub fn to_mapping(value: &impl AsArray) -> MxResult<IndexMap<String, HostValue>> {
    let array = value.as_array()?;
    let (fields, values) = struct_parts(array)?;
    if array.numel() != 1 {
        return Err(MxError::shape(format!(
            "{} is not a scalar struct",
            array.describe()
        )));
    }
    element_map(fields, values, 0)
}

/// One field map per struct element, column-major.
pub fn to_mappings(value: &impl AsArray) -> MxResult<Vec<IndexMap<String, HostValue>>> {
    let array = value.as_array()?;
    let (fields, values) = struct_parts(array)?;
    (0..array.numel())
        .map(|e| element_map(fields, values, e))
        .collect()
}

/// Cell contents in column-major order, each converted with [`to_default`].
pub fn to_cell(value: &impl AsArray) -> MxResult<Vec<HostValue>> {
    let array = value.as_array()?;
    match array.payload() {
        Payload::Cell(cells) => cells.iter().map(to_default).collect(),
        _ => Err(MxError::type_error(format!("{} is not a cell", array.describe()))),
    }
}

/// Coordinate triplets of a real sparse block.
pub fn to_sparse(value: &impl AsArray) -> MxResult<SparseMatrix> {
    let array = value.as_array()?;
    match array.payload() {
        Payload::Sparse(sp) if sp.imag.is_none() => {
            let mut rows = Vec::with_capacity(sp.nnz());
            let mut cols = Vec::with_capacity(sp.nnz());
            let mut vals = Vec::with_capacity(sp.nnz());
            for (r, c, re, _) in sp.entries() {
                rows.push(r);
                cols.push(c);
                vals.push(re);
            }
            SparseMatrix::new(sp.nrows, sp.ncols, rows, cols, vals)
        }
        Payload::Sparse(_) => Err(MxError::type_error(
            "complex sparse matrices have no host triplet form",
        )),
        _ => Err(MxError::type_error(format!("{} is not sparse", array.describe()))),
    }
}

/// Best-fit host value.
///
/// Precedence: char becomes a `String`; a single numeric or logical
/// element a `Scalar`; a 1x1 struct a `Map`, any other struct a
/// `StructArray`; a cell vector a `Cell`, any other cell a `CellArray`;
/// sparse stays `Sparse` when real; everything else is an `Array`.
pub fn to_default(value: &impl AsArray) -> MxResult<HostValue> {
    let array = value.as_array()?;
    match (array.kind(), array.payload()) {
        (ValueKind::Character, _) if to_string(array).is_ok() => {
            Ok(HostValue::String(to_string(array)?))
        }
        (ValueKind::Numeric | ValueKind::Logical, _) if array.numel() == 1 => {
            Ok(HostValue::Scalar(to_scalar(array)?))
        }
        (ValueKind::Struct, Payload::Struct { fields, values }) => {
            if array.numel() == 1 {
                Ok(HostValue::Map(element_map(fields, values, 0)?))
            } else {
                Ok(HostValue::StructArray(HostStructArray {
                    shape: array.shape().to_vec(),
                    fields: fields.clone(),
                    elements: to_mappings(array)?,
                }))
            }
        }
        (ValueKind::Cell, _) => {
            let elements = to_cell(array)?;
            let shape = array.shape();
            if shape.len() == 2 && shape[0] == 1 {
                Ok(HostValue::Cell(elements))
            } else {
                Ok(HostValue::CellArray(HostCellArray {
                    shape: shape.to_vec(),
                    elements,
                }))
            }
        }
        (ValueKind::Sparse, Payload::Sparse(sp)) if sp.imag.is_none() => {
            Ok(HostValue::Sparse(to_sparse(array)?))
        }
        _ => Ok(HostValue::Array(to_array(array)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ElementType;

    #[test]
    fn scalars_pick_the_nearest_class() {
        let v = 3i16.to_foreign().unwrap();
        assert_eq!(v.element_type().unwrap(), Some(ElementType::Int16));
        assert_eq!(v.shape().unwrap(), &[1, 1]);
        assert_eq!(to_scalar(&v).unwrap(), Scalar::Int16(3));

        let z = Complex64::new(1.0, -2.0).to_foreign().unwrap();
        assert!(z.is_complex().unwrap());
        assert_eq!(to_scalar(&z).unwrap(), Scalar::Complex64(Complex64::new(1.0, -2.0)));

        let b = true.to_foreign().unwrap();
        assert_eq!(b.kind().unwrap(), ValueKind::Logical);
    }

    #[test]
    fn row_major_input_is_transposed() {
        let host = HostArray::row_major(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]).unwrap();
        let v = host.to_foreign().unwrap();
        assert_eq!(v.shape().unwrap(), &[2, 3]);
        assert_eq!(v.real::<f64>().unwrap(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        let back = to_array(&v).unwrap();
        assert_eq!(back.order(), Order::ColumnMajor);
        assert_eq!(back, host);
    }

    #[test]
    fn rank_one_becomes_column() {
        let v = HostArray::vector(vec![1u8, 2, 3]).to_foreign().unwrap();
        assert_eq!(v.shape().unwrap(), &[3, 1]);
        let vec = to_vector(&v).unwrap();
        assert_eq!(vec.shape(), &[3]);
        assert!(to_vector(&ForeignValue::create(ElementType::Float64, &[2, 2]).unwrap()).is_err());
    }

    #[test]
    fn strings_and_cells() {
        let s = "héllo".to_foreign().unwrap();
        assert_eq!(s.shape().unwrap(), &[1, 5]);
        assert_eq!(to_string(&s).unwrap(), "héllo");
        assert!(matches!(to_scalar(&s), Err(MxError::Shape(_))));

        let items = vec![HostValue::from(1.0), HostValue::from("two")];
        let c = items.to_foreign().unwrap();
        assert_eq!(c.shape().unwrap(), &[1, 2]);
        assert_eq!(to_cell(&c).unwrap(), items);
        assert!(matches!(to_scalar(&c), Err(MxError::Type(_))));
        assert!(matches!(to_string(&c), Err(MxError::Type(_))));
    }

    #[test]
    fn chars_outside_bmp_are_rejected_in_arrays() {
        let a = HostArray::vector(vec!['a', '\u{1F600}']);
        assert!(matches!(a.to_foreign(), Err(MxError::Type(_))));
    }

    #[test]
    fn multi_row_char_is_not_a_string() {
        let a = HostArray::column_major(vec!['a', 'b', 'c', 'd'], vec![2, 2]).unwrap();
        let v = a.to_foreign().unwrap();
        assert!(matches!(to_string(&v), Err(MxError::Shape(_))));
        assert!(matches!(to_default(&v).unwrap(), HostValue::Array(_)));
    }

    #[test]
    fn records_in_both_modes() {
        let mut a = IndexMap::new();
        a.insert("x".to_string(), HostValue::from(1.0));
        let mut b = IndexMap::new();
        b.insert("x".to_string(), HostValue::from(2.0));
        let records = vec![a.clone(), b];

        let cell = from_records(&records, StructArrayMode::CellOfStructs).unwrap();
        let cv = cell.to_foreign().unwrap();
        assert_eq!(cv.kind().unwrap(), ValueKind::Cell);
        assert_eq!(cv.shape().unwrap(), &[1, 2]);

        let arr = from_records(&records, StructArrayMode::StructArray).unwrap();
        let sv = arr.to_foreign().unwrap();
        assert_eq!(sv.kind().unwrap(), ValueKind::Struct);
        assert_eq!(sv.shape().unwrap(), &[1, 2]);
        let maps = to_mappings(&sv).unwrap();
        assert_eq!(maps[1]["x"], HostValue::from(2.0));
        assert!(matches!(to_mapping(&sv), Err(MxError::Shape(_))));
        assert_eq!(to_default(&sv).unwrap(), arr);

        let mut odd = IndexMap::new();
        odd.insert("y".to_string(), HostValue::from(3.0));
        assert!(from_records(&[a, odd], StructArrayMode::StructArray).is_err());
    }

    #[test]
    fn sparse_drops_zeros_and_sums_duplicates() {
        let s = SparseMatrix::new(3, 2, vec![0, 0, 2, 1], vec![0, 0, 1, 1], vec![1.0, 2.0, 4.0, 0.0])
            .unwrap();
        let v = s.to_foreign().unwrap();
        assert!(v.is_sparse().unwrap());
        let back = to_sparse(&v).unwrap();
        assert_eq!(back.nnz(), 2);
        assert_eq!(back, s);
        let dense = to_array(&v).unwrap();
        assert_eq!(dense.get::<f64>(&[0, 0]), Some(3.0));
        assert_eq!(dense.get::<f64>(&[2, 1]), Some(4.0));
        assert_eq!(to_default(&v).unwrap(), HostValue::Sparse(s));
    }

    #[test]
    fn sparse_conversions_check_shape_before_densifying() {
        let huge = ForeignValue::create_sparse(1_000_000, 1_000_000).unwrap();
        assert!(matches!(to_scalar(&huge), Err(MxError::Shape(_))));
        assert!(matches!(to_vector(&huge), Err(MxError::Shape(_))));
        let empty = ForeignValue::create_sparse(0, 0).unwrap();
        assert!(matches!(to_scalar(&empty), Err(MxError::Shape(_))));

        let one = SparseMatrix::new(1, 1, vec![0], vec![0], vec![7.0]).unwrap();
        assert_eq!(to_scalar(&one.to_foreign().unwrap()).unwrap(), Scalar::Float64(7.0));
        let zero = ForeignValue::create_sparse(1, 1).unwrap();
        assert_eq!(to_scalar(&zero).unwrap(), Scalar::Float64(0.0));

        let column = SparseMatrix::new(5, 1, vec![3], vec![0], vec![2.0]).unwrap();
        let dense = to_vector(&column.to_foreign().unwrap()).unwrap();
        assert_eq!(dense.shape(), &[5]);
        assert_eq!(dense.get::<f64>(&[3]), Some(2.0));

        let too_big = ForeignValue::create_sparse(1 << 61, 2).unwrap();
        assert!(matches!(to_array(&too_big), Err(MxError::Allocation { .. })));
    }

    #[test]
    fn default_precedence() {
        assert_eq!(to_default(&MxArray::scalar(2.0)).unwrap(), HostValue::from(2.0));
        assert_eq!(
            to_default(&MxArray::char_row("ab")).unwrap(),
            HostValue::from("ab")
        );
        let m = MxArray::zeros(ElementType::Int32, &[2, 2]).unwrap();
        assert!(matches!(to_default(&m).unwrap(), HostValue::Array(_)));
        let c = MxArray::cell(&[2, 2]).unwrap();
        match to_default(&c).unwrap() {
            HostValue::CellArray(cells) => assert_eq!(cells.shape, vec![2, 2]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn conversions_need_host_ownership() {
        let mut v = 1.0f64.to_foreign().unwrap();
        v.release().unwrap();
        assert!(matches!(to_scalar(&v), Err(MxError::Ownership { .. })));
    }
}
