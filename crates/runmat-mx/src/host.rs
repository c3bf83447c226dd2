//! Host-side containers exchanged with foreign values.

use indexmap::IndexMap;
use num_complex::{Complex32, Complex64};
use std::fmt;

use crate::class::ElementType;
use crate::error::{MxError, MxResult};
use crate::layout::{element_count, linear_index, reorder, Order};

/// Typed buffer of a host array.
#[derive(Debug, Clone, PartialEq)]
pub enum HostData {
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Bool(Vec<bool>),
    Char(Vec<char>),
    Complex32(Vec<Complex32>),
    Complex64(Vec<Complex64>),
}

macro_rules! with_host {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            HostData::Int8($v) => $body,
            HostData::Int16($v) => $body,
            HostData::Int32($v) => $body,
            HostData::Int64($v) => $body,
            HostData::UInt8($v) => $body,
            HostData::UInt16($v) => $body,
            HostData::UInt32($v) => $body,
            HostData::UInt64($v) => $body,
            HostData::Float32($v) => $body,
            HostData::Float64($v) => $body,
            HostData::Bool($v) => $body,
            HostData::Char($v) => $body,
            HostData::Complex32($v) => $body,
            HostData::Complex64($v) => $body,
        }
    };
}

macro_rules! map_host {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            HostData::Int8($v) => HostData::Int8($body),
            HostData::Int16($v) => HostData::Int16($body),
            HostData::Int32($v) => HostData::Int32($body),
            HostData::Int64($v) => HostData::Int64($body),
            HostData::UInt8($v) => HostData::UInt8($body),
            HostData::UInt16($v) => HostData::UInt16($body),
            HostData::UInt32($v) => HostData::UInt32($body),
            HostData::UInt64($v) => HostData::UInt64($body),
            HostData::Float32($v) => HostData::Float32($body),
            HostData::Float64($v) => HostData::Float64($body),
            HostData::Bool($v) => HostData::Bool($body),
            HostData::Char($v) => HostData::Char($body),
            HostData::Complex32($v) => HostData::Complex32($body),
            HostData::Complex64($v) => HostData::Complex64($body),
        }
    };
}


impl HostData {
    pub fn len(&self) -> usize {
        with_host!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Foreign element class this buffer converts to.
    pub fn element_type(&self) -> ElementType {
        match self {
            HostData::Int8(_) => ElementType::Int8,
            HostData::Int16(_) => ElementType::Int16,
            HostData::Int32(_) => ElementType::Int32,
            HostData::Int64(_) => ElementType::Int64,
            HostData::UInt8(_) => ElementType::UInt8,
            HostData::UInt16(_) => ElementType::UInt16,
            HostData::UInt32(_) => ElementType::UInt32,
            HostData::UInt64(_) => ElementType::UInt64,
            HostData::Float32(_) | HostData::Complex32(_) => ElementType::Float32,
            HostData::Float64(_) | HostData::Complex64(_) => ElementType::Float64,
            HostData::Bool(_) => ElementType::Logical,
            HostData::Char(_) => ElementType::Char,
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, HostData::Complex32(_) | HostData::Complex64(_))
    }

    fn reordered(&self, shape: &[usize], from: Order, to: Order) -> HostData {
        map_host!(self, v => reorder(v, shape, from, to))
    }
}

/// Element types a [`HostArray`] can hold.
pub trait HostElement: Copy + PartialEq + fmt::Debug + 'static {
    fn wrap(values: Vec<Self>) -> HostData;
    fn slice(data: &HostData) -> Option<&[Self]>;
}

macro_rules! impl_host_element {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl HostElement for $t {
                fn wrap(values: Vec<Self>) -> HostData {
                    HostData::$variant(values)
                }
                fn slice(data: &HostData) -> Option<&[Self]> {
                    match data {
                        HostData::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_host_element!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    bool => Bool,
    char => Char,
    Complex32 => Complex32,
    Complex64 => Complex64,
);

/// Homogeneous N-D host array with an explicit memory order.
///
/// Equality is logical: two arrays are equal when they have the same shape,
/// the same element type and the same element at every multi-index,
/// whatever their memory orders.
#[derive(Debug, Clone)]
pub struct HostArray {
    shape: Vec<usize>,
    order: Order,
    data: HostData,
}

impl HostArray {
    pub fn new(data: HostData, shape: Vec<usize>, order: Order) -> MxResult<Self> {
        let expected = element_count(&shape)
            .ok_or_else(|| MxError::shape(format!("shape {shape:?} overflows")))?;
        if data.len() != expected {
            return Err(MxError::shape(format!(
                "host data length {} doesn't match shape {:?} ({} elements)",
                data.len(),
                shape,
                expected
            )));
        }
        Ok(HostArray { shape, order, data })
    }

    pub fn from_vec<T: HostElement>(values: Vec<T>, shape: Vec<usize>, order: Order) -> MxResult<Self> {
        Self::new(T::wrap(values), shape, order)
    }

    /// C-order array (last index fastest).
    pub fn row_major<T: HostElement>(values: Vec<T>, shape: Vec<usize>) -> MxResult<Self> {
        Self::from_vec(values, shape, Order::RowMajor)
    }

    /// Fortran-order array (first index fastest).
    pub fn column_major<T: HostElement>(values: Vec<T>, shape: Vec<usize>) -> MxResult<Self> {
        Self::from_vec(values, shape, Order::ColumnMajor)
    }

    /// 1-D array.
    pub fn vector<T: HostElement>(values: Vec<T>) -> Self {
        let n = values.len();
        HostArray {
            shape: vec![n],
            order: Order::ColumnMajor,
            data: T::wrap(values),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn data(&self) -> &HostData {
        &self.data
    }

    pub fn into_data(self) -> HostData {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    pub fn as_slice<T: HostElement>(&self) -> Option<&[T]> {
        T::slice(&self.data)
    }

    /// Element at a zero-based multi-index.
    pub fn get<T: HostElement>(&self, subs: &[usize]) -> Option<T> {
        let offset = linear_index(&self.shape, subs, self.order)?;
        T::slice(&self.data).and_then(|v| v.get(offset).copied())
    }

    /// Same logical array, stored in `order`.
    pub fn to_order(&self, order: Order) -> HostArray {
        HostArray {
            shape: self.shape.clone(),
            order,
            data: self.data.reordered(&self.shape, self.order, order),
        }
    }

    /// Same elements under a new shape with equal element count, keeping
    /// the memory order.
    pub fn reshape(self, shape: Vec<usize>) -> MxResult<Self> {
        Self::new(self.data, shape, self.order)
    }
}

impl PartialEq for HostArray {
    fn eq(&self, other: &Self) -> bool {
        if self.shape != other.shape {
            return false;
        }
        if self.order == other.order {
            return self.data == other.data;
        }
        self.data == other.data.reordered(&other.shape, other.order, self.order)
    }
}

/// A single host number, boolean or character.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    Char(char),
    Complex32(Complex32),
    Complex64(Complex64),
}

impl Scalar {
    /// Real value widened to `f64`; `None` for complex and char scalars.
    pub fn as_f64(&self) -> Option<f64> {
        Some(match *self {
            Scalar::Int8(v) => v as f64,
            Scalar::Int16(v) => v as f64,
            Scalar::Int32(v) => v as f64,
            Scalar::Int64(v) => v as f64,
            Scalar::UInt8(v) => v as f64,
            Scalar::UInt16(v) => v as f64,
            Scalar::UInt32(v) => v as f64,
            Scalar::UInt64(v) => v as f64,
            Scalar::Float32(v) => v as f64,
            Scalar::Float64(v) => v,
            Scalar::Bool(v) => f64::from(u8::from(v)),
            Scalar::Char(_) | Scalar::Complex32(_) | Scalar::Complex64(_) => return None,
        })
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            Scalar::Int8(_) => ElementType::Int8,
            Scalar::Int16(_) => ElementType::Int16,
            Scalar::Int32(_) => ElementType::Int32,
            Scalar::Int64(_) => ElementType::Int64,
            Scalar::UInt8(_) => ElementType::UInt8,
            Scalar::UInt16(_) => ElementType::UInt16,
            Scalar::UInt32(_) => ElementType::UInt32,
            Scalar::UInt64(_) => ElementType::UInt64,
            Scalar::Float32(_) | Scalar::Complex32(_) => ElementType::Float32,
            Scalar::Float64(_) | Scalar::Complex64(_) => ElementType::Float64,
            Scalar::Bool(_) => ElementType::Logical,
            Scalar::Char(_) => ElementType::Char,
        }
    }

    /// One-element buffer of the same type.
    pub(crate) fn to_data(self) -> HostData {
        match self {
            Scalar::Int8(v) => HostData::Int8(vec![v]),
            Scalar::Int16(v) => HostData::Int16(vec![v]),
            Scalar::Int32(v) => HostData::Int32(vec![v]),
            Scalar::Int64(v) => HostData::Int64(vec![v]),
            Scalar::UInt8(v) => HostData::UInt8(vec![v]),
            Scalar::UInt16(v) => HostData::UInt16(vec![v]),
            Scalar::UInt32(v) => HostData::UInt32(vec![v]),
            Scalar::UInt64(v) => HostData::UInt64(vec![v]),
            Scalar::Float32(v) => HostData::Float32(vec![v]),
            Scalar::Float64(v) => HostData::Float64(vec![v]),
            Scalar::Bool(v) => HostData::Bool(vec![v]),
            Scalar::Char(v) => HostData::Char(vec![v]),
            Scalar::Complex32(v) => HostData::Complex32(vec![v]),
            Scalar::Complex64(v) => HostData::Complex64(vec![v]),
        }
    }
}

/// Sparse matrix given as coordinate triplets (zero-based).
///
/// Equality compares the numeric content: duplicate coordinates are summed
/// and zero entries ignored before comparing.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    nrows: usize,
    ncols: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
}

impl SparseMatrix {
    pub fn new(
        nrows: usize,
        ncols: usize,
        rows: Vec<usize>,
        cols: Vec<usize>,
        values: Vec<f64>,
    ) -> MxResult<Self> {
        if rows.len() != cols.len() || rows.len() != values.len() {
            return Err(MxError::shape(format!(
                "sparse triplets have {} rows, {} cols and {} values",
                rows.len(),
                cols.len(),
                values.len()
            )));
        }
        if let Some((r, c)) = rows
            .iter()
            .zip(&cols)
            .find(|(&r, &c)| r >= nrows || c >= ncols)
        {
            return Err(MxError::shape(format!(
                "sparse entry ({r}, {c}) outside a {nrows}x{ncols} matrix"
            )));
        }
        Ok(SparseMatrix {
            nrows,
            ncols,
            rows,
            cols,
            values,
        })
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Triplets as given (possibly with duplicates or explicit zeros).
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.rows
            .iter()
            .zip(&self.cols)
            .zip(&self.values)
            .map(|((&r, &c), &v)| (r, c, v))
    }

    /// Column-major triplets with duplicates summed and zeros removed.
    pub fn canonical(&self) -> Vec<(usize, usize, f64)> {
        let mut entries: Vec<(usize, usize, f64)> = self.triplets().collect();
        entries.sort_by(|a, b| (a.1, a.0).cmp(&(b.1, b.0)));
        let mut out: Vec<(usize, usize, f64)> = Vec::with_capacity(entries.len());
        for (r, c, v) in entries {
            match out.last_mut() {
                Some(last) if last.0 == r && last.1 == c => last.2 += v,
                _ => out.push((r, c, v)),
            }
        }
        out.retain(|&(_, _, v)| v != 0.0);
        out
    }

    /// Stored non-zeros after canonicalisation.
    pub fn nnz(&self) -> usize {
        self.canonical().len()
    }
}

impl PartialEq for SparseMatrix {
    fn eq(&self, other: &Self) -> bool {
        self.nrows == other.nrows
            && self.ncols == other.ncols
            && self.canonical() == other.canonical()
    }
}

/// Struct array on the host: one map per element, all with the same fields.
#[derive(Debug, Clone, PartialEq)]
pub struct HostStructArray {
    pub shape: Vec<usize>,
    pub fields: Vec<String>,
    /// Column-major elements
    pub elements: Vec<IndexMap<String, HostValue>>,
}

/// Shaped cell array on the host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostCellArray {
    pub shape: Vec<usize>,
    /// Column-major elements
    pub elements: Vec<HostValue>,
}

/// Any host-native value the marshaller understands.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Scalar(Scalar),
    Array(HostArray),
    String(String),
    /// Heterogeneous sequence; becomes a 1xN cell
    Cell(Vec<HostValue>),
    CellArray(HostCellArray),
    /// String-keyed mapping; becomes a 1x1 struct
    Map(IndexMap<String, HostValue>),
    StructArray(HostStructArray),
    Sparse(SparseMatrix),
}

impl HostValue {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            HostValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_scalar().and_then(Scalar::as_f64)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&HostArray> {
        match self {
            HostValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, HostValue>> {
        match self {
            HostValue::Map(m) => Some(m),
            _ => None,
        }
    }
}

macro_rules! scalar_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Scalar {
                fn from(v: $t) -> Self {
                    Scalar::$variant(v)
                }
            }
            impl From<$t> for HostValue {
                fn from(v: $t) -> Self {
                    HostValue::Scalar(Scalar::$variant(v))
                }
            }
        )*
    };
}

scalar_from!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    bool => Bool,
    char => Char,
    Complex32 => Complex32,
    Complex64 => Complex64,
);

impl From<Scalar> for HostValue {
    fn from(v: Scalar) -> Self {
        HostValue::Scalar(v)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::String(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::String(s)
    }
}

impl From<HostArray> for HostValue {
    fn from(a: HostArray) -> Self {
        HostValue::Array(a)
    }
}

impl From<SparseMatrix> for HostValue {
    fn from(s: SparseMatrix) -> Self {
        HostValue::Sparse(s)
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(items: Vec<HostValue>) -> Self {
        HostValue::Cell(items)
    }
}

impl From<IndexMap<String, HostValue>> for HostValue {
    fn from(map: IndexMap<String, HostValue>) -> Self {
        HostValue::Map(map)
    }
}

/// Numeric vectors convert to 1-D arrays (n x 1 on the foreign side).
impl<T: HostElement> From<Vec<T>> for HostArray {
    fn from(values: Vec<T>) -> Self {
        HostArray::vector(values)
    }
}

/// Compound host types with named fields.
pub trait Record {
    /// Field name / value pairs in declaration order.
    fn fields(&self) -> IndexMap<String, HostValue>;
}

impl Record for IndexMap<String, HostValue> {
    fn fields(&self) -> IndexMap<String, HostValue> {
        self.clone()
    }
}

/// How a sequence of records becomes a foreign value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructArrayMode {
    /// 1xN cell whose elements are 1x1 structs
    CellOfStructs,
    /// One 1xN struct array
    StructArray,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_equality_across_orders() {
        let row = HostArray::row_major(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]).unwrap();
        let col = HostArray::column_major(vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0], vec![2, 3]).unwrap();
        assert_eq!(row, col);
        assert_eq!(row.get::<f64>(&[1, 2]), Some(6.0));
        assert_eq!(col.get::<f64>(&[1, 2]), Some(6.0));
        assert_eq!(row.to_order(Order::ColumnMajor).as_slice::<f64>(), col.as_slice::<f64>());
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let err = HostArray::row_major(vec![1i32, 2, 3], vec![2, 2]).unwrap_err();
        assert!(matches!(err, MxError::Shape(_)));
    }

    #[test]
    fn sparse_canonical_form() {
        let s = SparseMatrix::new(3, 3, vec![0, 2, 0, 1], vec![0, 1, 0, 2], vec![1.0, 0.0, 2.0, 5.0])
            .unwrap();
        assert_eq!(s.canonical(), vec![(0, 0, 3.0), (1, 2, 5.0)]);
        assert_eq!(s.nnz(), 2);
        assert!(SparseMatrix::new(2, 2, vec![2], vec![0], vec![1.0]).is_err());
    }

    #[test]
    fn scalar_conversions() {
        assert_eq!(HostValue::from(2.5).as_f64(), Some(2.5));
        assert_eq!(HostValue::from(true).as_f64(), Some(1.0));
        assert_eq!(Scalar::from(7u16).element_type(), ElementType::UInt16);
        assert_eq!(HostValue::from("x").as_str(), Some("x"));
    }
}
