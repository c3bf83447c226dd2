//! Foreign memory blocks.
//!
//! An [`MxArray`] is the payload a [`ForeignValue`](crate::ForeignValue)
//! owns: shape plus column-major element storage. Nested cell and struct
//! contents are plain `MxArray`s owned by their container.

use std::collections::TryReserveError;
use std::fmt;

use crate::class::{ElementType, ValueKind};
use crate::error::{MxError, MxResult};
use crate::layout::{element_count, normalize_shape};

/// Typed real (or imaginary) numeric storage.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericData {
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
}

/// Run `$body` with `$v` bound to the inner vector, whatever the variant.
#[macro_export]
macro_rules! with_numeric {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            $crate::NumericData::Int8($v) => $body,
            $crate::NumericData::Int16($v) => $body,
            $crate::NumericData::Int32($v) => $body,
            $crate::NumericData::Int64($v) => $body,
            $crate::NumericData::UInt8($v) => $body,
            $crate::NumericData::UInt16($v) => $body,
            $crate::NumericData::UInt32($v) => $body,
            $crate::NumericData::UInt64($v) => $body,
            $crate::NumericData::Float32($v) => $body,
            $crate::NumericData::Float64($v) => $body,
        }
    };
}

/// Like [`with_numeric!`] but rewraps the result in the same variant.
#[macro_export]
macro_rules! map_numeric {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            $crate::NumericData::Int8($v) => $crate::NumericData::Int8($body),
            $crate::NumericData::Int16($v) => $crate::NumericData::Int16($body),
            $crate::NumericData::Int32($v) => $crate::NumericData::Int32($body),
            $crate::NumericData::Int64($v) => $crate::NumericData::Int64($body),
            $crate::NumericData::UInt8($v) => $crate::NumericData::UInt8($body),
            $crate::NumericData::UInt16($v) => $crate::NumericData::UInt16($body),
            $crate::NumericData::UInt32($v) => $crate::NumericData::UInt32($body),
            $crate::NumericData::UInt64($v) => $crate::NumericData::UInt64($body),
            $crate::NumericData::Float32($v) => $crate::NumericData::Float32($body),
            $crate::NumericData::Float64($v) => $crate::NumericData::Float64($body),
        }
    };
}

fn alloc_error(requested: usize) -> impl FnOnce(TryReserveError) -> MxError {
    move |_| MxError::Allocation {
        requested,
        in_use: 0,
        limit: None,
    }
}

/// Allocate `len` copies of `fill`, reporting allocator failure instead of
/// aborting.
pub(crate) fn try_filled<T: Clone>(len: usize, fill: T, elem_size: usize) -> MxResult<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(alloc_error(len.saturating_mul(elem_size)))?;
    v.resize(len, fill);
    Ok(v)
}

impl NumericData {
    /// Zero-filled storage of a numeric class; `None` for logical/char.
    pub fn zeros(ty: ElementType, len: usize) -> MxResult<Self> {
        let size = ty.size_bytes();
        Ok(match ty {
            ElementType::Int8 => NumericData::Int8(try_filled(len, 0, size)?),
            ElementType::Int16 => NumericData::Int16(try_filled(len, 0, size)?),
            ElementType::Int32 => NumericData::Int32(try_filled(len, 0, size)?),
            ElementType::Int64 => NumericData::Int64(try_filled(len, 0, size)?),
            ElementType::UInt8 => NumericData::UInt8(try_filled(len, 0, size)?),
            ElementType::UInt16 => NumericData::UInt16(try_filled(len, 0, size)?),
            ElementType::UInt32 => NumericData::UInt32(try_filled(len, 0, size)?),
            ElementType::UInt64 => NumericData::UInt64(try_filled(len, 0, size)?),
            ElementType::Float32 => NumericData::Float32(try_filled(len, 0.0, size)?),
            ElementType::Float64 => NumericData::Float64(try_filled(len, 0.0, size)?),
            ElementType::Logical | ElementType::Char => {
                return Err(MxError::invalid(format!("{ty} is not a numeric class")))
            }
        })
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            NumericData::Int8(_) => ElementType::Int8,
            NumericData::Int16(_) => ElementType::Int16,
            NumericData::Int32(_) => ElementType::Int32,
            NumericData::Int64(_) => ElementType::Int64,
            NumericData::UInt8(_) => ElementType::UInt8,
            NumericData::UInt16(_) => ElementType::UInt16,
            NumericData::UInt32(_) => ElementType::UInt32,
            NumericData::UInt64(_) => ElementType::UInt64,
            NumericData::Float32(_) => ElementType::Float32,
            NumericData::Float64(_) => ElementType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        with_numeric!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `i` widened to `f64`.
    pub fn get_f64(&self, i: usize) -> Option<f64> {
        with_numeric!(self, v => v.get(i).map(|x| *x as f64))
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        with_numeric!(self, v => v.iter().map(|x| *x as f64).collect())
    }

    /// Build storage of class `ty` from `f64` values, saturating and
    /// rounding to nearest for integer classes.
    pub fn from_f64(ty: ElementType, values: &[f64]) -> MxResult<Self> {
        macro_rules! cast {
            ($variant:ident, $t:ty) => {
                NumericData::$variant(values.iter().map(|x| x.round() as $t).collect())
            };
        }
        Ok(match ty {
            ElementType::Int8 => cast!(Int8, i8),
            ElementType::Int16 => cast!(Int16, i16),
            ElementType::Int32 => cast!(Int32, i32),
            ElementType::Int64 => cast!(Int64, i64),
            ElementType::UInt8 => cast!(UInt8, u8),
            ElementType::UInt16 => cast!(UInt16, u16),
            ElementType::UInt32 => cast!(UInt32, u32),
            ElementType::UInt64 => cast!(UInt64, u64),
            ElementType::Float32 => NumericData::Float32(values.iter().map(|x| *x as f32).collect()),
            ElementType::Float64 => NumericData::Float64(values.to_vec()),
            ElementType::Logical | ElementType::Char => {
                return Err(MxError::invalid(format!("{ty} is not a numeric class")))
            }
        })
    }

    /// Gather elements by source index.
    pub fn gather(&self, indices: &[usize]) -> Self {
        map_numeric!(self, v => indices.iter().map(|&i| v[i]).collect())
    }

    pub fn is_all_zero(&self) -> bool {
        with_numeric!(self, v => v.iter().all(|x| *x as f64 == 0.0))
    }
}

/// Primitive element types that can be viewed in numeric storage.
pub trait MxElement: Copy + PartialEq + Default + fmt::Debug + Send + Sync + 'static {
    const ELEMENT_TYPE: ElementType;
    fn slice(data: &NumericData) -> Option<&[Self]>;
    fn slice_mut(data: &mut NumericData) -> Option<&mut [Self]>;
    fn wrap(values: Vec<Self>) -> NumericData;
}

macro_rules! impl_mx_element {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl MxElement for $t {
                const ELEMENT_TYPE: ElementType = ElementType::$variant;
                fn slice(data: &NumericData) -> Option<&[Self]> {
                    match data {
                        NumericData::$variant(v) => Some(v),
                        _ => None,
                    }
                }
                fn slice_mut(data: &mut NumericData) -> Option<&mut [Self]> {
                    match data {
                        NumericData::$variant(v) => Some(v),
                        _ => None,
                    }
                }
                fn wrap(values: Vec<Self>) -> NumericData {
                    NumericData::$variant(values)
                }
            }
        )*
    };
}

impl_mx_element!(
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
);

/// Compressed-column sparse double storage.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseData {
    pub nrows: usize,
    pub ncols: usize,
    /// `ncols + 1` offsets into `row_idx`/`real`
    pub col_ptr: Vec<usize>,
    pub row_idx: Vec<usize>,
    pub real: Vec<f64>,
    pub imag: Option<Vec<f64>>,
}

impl SparseData {
    pub fn empty(nrows: usize, ncols: usize) -> Self {
        SparseData {
            nrows,
            ncols,
            col_ptr: vec![0; ncols + 1],
            row_idx: Vec::new(),
            real: Vec::new(),
            imag: None,
        }
    }

    pub fn nnz(&self) -> usize {
        self.real.len()
    }

    pub fn validate(&self) -> MxResult<()> {
        if self.col_ptr.len() != self.ncols + 1 {
            return Err(MxError::shape(format!(
                "sparse column pointer has {} entries, expected {}",
                self.col_ptr.len(),
                self.ncols + 1
            )));
        }
        if self.col_ptr.first() != Some(&0)
            || self.col_ptr.windows(2).any(|w| w[0] > w[1])
            || self.col_ptr.last() != Some(&self.row_idx.len())
        {
            return Err(MxError::shape("sparse column pointers are not monotone"));
        }
        if self.row_idx.len() != self.real.len()
            || self.imag.as_ref().is_some_and(|im| im.len() != self.real.len())
        {
            return Err(MxError::shape("sparse index and value counts differ"));
        }
        if self.row_idx.iter().any(|&r| r >= self.nrows) {
            return Err(MxError::shape("sparse row index out of range"));
        }
        Ok(())
    }

    /// Triplets `(row, col, re, im)` in column-major order.
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize, f64, f64)> + '_ {
        (0..self.ncols).flat_map(move |c| {
            (self.col_ptr[c]..self.col_ptr[c + 1]).map(move |k| {
                let im = self.imag.as_ref().map(|v| v[k]).unwrap_or(0.0);
                (self.row_idx[k], c, self.real[k], im)
            })
        })
    }
}

/// Storage of one foreign block, by kind.
#[derive(Debug, Clone)]
pub enum Payload {
    Numeric {
        real: NumericData,
        imag: Option<NumericData>,
    },
    Logical(Vec<bool>),
    /// UTF-16 code units
    Char(Vec<u16>),
    Cell(Vec<MxArray>),
    /// `values[element * fields.len() + field]`
    Struct {
        fields: Vec<String>,
        values: Vec<MxArray>,
    },
    Sparse(SparseData),
}

/// A column-major foreign array block.
#[derive(Debug, Clone)]
pub struct MxArray {
    shape: Vec<usize>,
    payload: Payload,
}

impl MxArray {
    /// Assemble a block, checking that the payload matches the shape.
    pub fn from_parts(shape: Vec<usize>, payload: Payload) -> MxResult<Self> {
        let shape = normalize_shape(&shape);
        let numel = element_count(&shape)
            .ok_or_else(|| MxError::shape(format!("shape {shape:?} overflows")))?;
        let stored = match &payload {
            Payload::Numeric { real, imag } => {
                if let Some(im) = imag {
                    if im.element_type() != real.element_type() || im.len() != real.len() {
                        return Err(MxError::shape(
                            "imaginary part does not match the real part",
                        ));
                    }
                }
                real.len()
            }
            Payload::Logical(v) => v.len(),
            Payload::Char(v) => v.len(),
            Payload::Cell(v) => v.len(),
            Payload::Struct { fields, values } => {
                validate_field_names(fields)?;
                if fields.is_empty() {
                    if !values.is_empty() {
                        return Err(MxError::shape("struct without fields carries values"));
                    }
                    numel
                } else {
                    if values.len() % fields.len() != 0 {
                        return Err(MxError::shape("struct values do not fill every field"));
                    }
                    values.len() / fields.len()
                }
            }
            Payload::Sparse(sp) => {
                sp.validate()?;
                if shape != [sp.nrows, sp.ncols] {
                    return Err(MxError::shape(format!(
                        "sparse matrix is {}x{} but shape is {:?}",
                        sp.nrows, sp.ncols, shape
                    )));
                }
                numel
            }
        };
        if stored != numel {
            return Err(MxError::shape(format!(
                "{stored} stored elements do not match shape {shape:?} ({numel} elements)"
            )));
        }
        Ok(MxArray { shape, payload })
    }

    /// Zero-filled dense array of any element class.
    pub fn zeros(ty: ElementType, shape: &[usize]) -> MxResult<Self> {
        let shape = normalize_shape(shape);
        let numel = checked_numel(&shape, ty.size_bytes())?;
        let payload = match ty {
            ElementType::Logical => Payload::Logical(try_filled(numel, false, 1)?),
            ElementType::Char => Payload::Char(try_filled(numel, 0u16, 2)?),
            _ => Payload::Numeric {
                real: NumericData::zeros(ty, numel)?,
                imag: None,
            },
        };
        Ok(MxArray { shape, payload })
    }

    /// Zero-filled complex array of a numeric class.
    pub fn complex_zeros(ty: ElementType, shape: &[usize]) -> MxResult<Self> {
        if !ty.is_numeric() {
            return Err(MxError::invalid(format!("{ty} arrays cannot be complex")));
        }
        let shape = normalize_shape(shape);
        let numel = checked_numel(&shape, ty.size_bytes().saturating_mul(2))?;
        Ok(MxArray {
            shape,
            payload: Payload::Numeric {
                real: NumericData::zeros(ty, numel)?,
                imag: Some(NumericData::zeros(ty, numel)?),
            },
        })
    }

    /// The `[]` value: a 0x0 double.
    pub fn empty() -> Self {
        MxArray {
            shape: vec![0, 0],
            payload: Payload::Numeric {
                real: NumericData::Float64(Vec::new()),
                imag: None,
            },
        }
    }

    pub fn scalar(value: f64) -> Self {
        MxArray {
            shape: vec![1, 1],
            payload: Payload::Numeric {
                real: NumericData::Float64(vec![value]),
                imag: None,
            },
        }
    }

    /// 1xN char row holding `text` as UTF-16.
    pub fn char_row(text: &str) -> Self {
        let units: Vec<u16> = text.encode_utf16().collect();
        MxArray {
            shape: vec![1, units.len()],
            payload: Payload::Char(units),
        }
    }

    /// Cell array filled with `[]`.
    pub fn cell(shape: &[usize]) -> MxResult<Self> {
        let shape = normalize_shape(shape);
        let numel = checked_numel(&shape, std::mem::size_of::<MxArray>())?;
        let cells = try_filled(numel, MxArray::empty(), std::mem::size_of::<MxArray>())?;
        Ok(MxArray {
            shape,
            payload: Payload::Cell(cells),
        })
    }

    /// Struct array with every field of every element set to `[]`.
    pub fn structure(shape: &[usize], fields: &[&str]) -> MxResult<Self> {
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        validate_field_names(&fields)?;
        let shape = normalize_shape(shape);
        let numel = checked_numel(&shape, std::mem::size_of::<MxArray>())?;
        let slots = numel
            .checked_mul(fields.len())
            .ok_or_else(|| MxError::shape("struct array too large"))?;
        let values = try_filled(slots, MxArray::empty(), std::mem::size_of::<MxArray>())?;
        Ok(MxArray {
            shape,
            payload: Payload::Struct { fields, values },
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    pub fn into_parts(self) -> (Vec<usize>, Payload) {
        (self.shape, self.payload)
    }

    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.numel() == 0
    }

    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    pub fn cols(&self) -> usize {
        self.shape[1..].iter().product()
    }

    pub fn kind(&self) -> ValueKind {
        match &self.payload {
            Payload::Numeric { .. } => ValueKind::Numeric,
            Payload::Logical(_) => ValueKind::Logical,
            Payload::Char(_) => ValueKind::Character,
            Payload::Cell(_) => ValueKind::Cell,
            Payload::Struct { .. } => ValueKind::Struct,
            Payload::Sparse(_) => ValueKind::Sparse,
        }
    }

    pub fn element_type(&self) -> Option<ElementType> {
        match &self.payload {
            Payload::Numeric { real, .. } => Some(real.element_type()),
            Payload::Logical(_) => Some(ElementType::Logical),
            Payload::Char(_) => Some(ElementType::Char),
            Payload::Sparse(_) => Some(ElementType::Float64),
            Payload::Cell(_) | Payload::Struct { .. } => None,
        }
    }

    pub fn is_complex(&self) -> bool {
        match &self.payload {
            Payload::Numeric { imag, .. } => imag.is_some(),
            Payload::Sparse(sp) => sp.imag.is_some(),
            _ => false,
        }
    }

    /// Size of one element in bytes (pointer size for cells and structs).
    pub fn element_size(&self) -> usize {
        match self.element_type() {
            Some(ty) => ty.size_bytes(),
            None => std::mem::size_of::<usize>(),
        }
    }

    pub fn field_names(&self) -> &[String] {
        match &self.payload {
            Payload::Struct { fields, .. } => fields,
            _ => &[],
        }
    }

    /// Contents of cell `index` (column-major linear index).
    pub fn cell_at(&self, index: usize) -> MxResult<&MxArray> {
        match &self.payload {
            Payload::Cell(cells) => cells.get(index).ok_or_else(|| {
                MxError::shape(format!("cell index {index} out of range for {} cells", cells.len()))
            }),
            _ => Err(MxError::type_error(format!("{} value is not a cell", self.kind()))),
        }
    }

    /// Field `name` of struct element `index`.
    pub fn field(&self, index: usize, name: &str) -> MxResult<&MxArray> {
        let slot = self.field_slot(index, name)?;
        match &self.payload {
            Payload::Struct { values, .. } => Ok(&values[slot]),
            _ => unreachable!("field_slot only succeeds for structs"),
        }
    }

    pub(crate) fn field_slot(&self, index: usize, name: &str) -> MxResult<usize> {
        match &self.payload {
            Payload::Struct { fields, .. } => {
                let f = fields
                    .iter()
                    .position(|f| f == name)
                    .ok_or_else(|| MxError::invalid(format!("no field named '{name}'")))?;
                let numel = self.numel();
                if index >= numel {
                    return Err(MxError::shape(format!(
                        "struct element {index} out of range for {numel} elements"
                    )));
                }
                Ok(index * fields.len() + f)
            }
            _ => Err(MxError::type_error(format!("{} value is not a struct", self.kind()))),
        }
    }

    /// Replace a cell element, returning the previous contents.
    pub(crate) fn replace_cell(&mut self, index: usize, value: MxArray) -> MxResult<MxArray> {
        let kind = self.kind();
        match &mut self.payload {
            Payload::Cell(cells) => {
                let len = cells.len();
                let slot = cells.get_mut(index).ok_or_else(|| {
                    MxError::shape(format!("cell index {index} out of range for {len} cells"))
                })?;
                Ok(std::mem::replace(slot, value))
            }
            _ => Err(MxError::type_error(format!("{kind} value is not a cell"))),
        }
    }

    /// Replace a struct field, returning the previous contents.
    pub(crate) fn replace_field(
        &mut self,
        index: usize,
        name: &str,
        value: MxArray,
    ) -> MxResult<MxArray> {
        let slot = self.field_slot(index, name)?;
        match &mut self.payload {
            Payload::Struct { values, .. } => Ok(std::mem::replace(&mut values[slot], value)),
            _ => unreachable!("field_slot only succeeds for structs"),
        }
    }

    /// Approximate foreign memory held by this block and its children.
    pub fn byte_size(&self) -> usize {
        let header = std::mem::size_of::<MxArray>();
        header
            + match &self.payload {
                Payload::Numeric { real, imag } => {
                    let per = real.element_type().size_bytes();
                    real.len() * per + imag.as_ref().map_or(0, |im| im.len() * per)
                }
                Payload::Logical(v) => v.len(),
                Payload::Char(v) => v.len() * 2,
                Payload::Cell(v) => v.iter().map(MxArray::byte_size).sum(),
                Payload::Struct { fields, values } => {
                    fields.iter().map(String::len).sum::<usize>()
                        + values.iter().map(MxArray::byte_size).sum::<usize>()
                }
                Payload::Sparse(sp) => {
                    (sp.col_ptr.len() + sp.row_idx.len()) * std::mem::size_of::<usize>()
                        + sp.real.len() * 8
                        + sp.imag.as_ref().map_or(0, |im| im.len() * 8)
                }
            }
    }

    /// Short description in MATLAB `whos` style, e.g. `3x4 double`.
    pub fn describe(&self) -> String {
        let dims = self
            .shape
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("x");
        let class = match (&self.payload, self.element_type()) {
            (Payload::Cell(_), _) => "cell".to_string(),
            (Payload::Struct { .. }, _) => "struct".to_string(),
            (Payload::Sparse(_), _) => "sparse double".to_string(),
            (_, Some(ty)) => ty.class_name().to_string(),
            (_, None) => "unknown".to_string(),
        };
        if self.is_complex() {
            format!("{dims} complex {class}")
        } else {
            format!("{dims} {class}")
        }
    }
}

fn checked_numel(shape: &[usize], elem_size: usize) -> MxResult<usize> {
    element_count(shape)
        .filter(|n| n.checked_mul(elem_size).is_some())
        .ok_or(MxError::Allocation {
            requested: usize::MAX,
            in_use: 0,
            limit: None,
        })
}

/// Field names must be unique MATLAB identifiers of at most 63 characters.
pub fn validate_field_names<S: AsRef<str>>(fields: &[S]) -> MxResult<()> {
    for (i, f) in fields.iter().enumerate() {
        let f = f.as_ref();
        if !is_valid_identifier(f) {
            return Err(MxError::invalid(format!("'{f}' is not a valid field name")));
        }
        if fields[..i].iter().any(|g| g.as_ref() == f) {
            return Err(MxError::invalid(format!("duplicate field name '{f}'")));
        }
    }
    Ok(())
}

/// MATLAB identifier rule: a letter followed by letters, digits or
/// underscores, 63 characters at most.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl PartialEq for MxArray {
    fn eq(&self, other: &Self) -> bool {
        if self.shape != other.shape {
            return false;
        }
        match (&self.payload, &other.payload) {
            (
                Payload::Struct { fields: fa, values: va },
                Payload::Struct { fields: fb, values: vb },
            ) => {
                if fa.len() != fb.len() {
                    return false;
                }
                let numel = self.numel();
                fa.iter().enumerate().all(|(ia, name)| {
                    let Some(ib) = fb.iter().position(|f| f == name) else {
                        return false;
                    };
                    (0..numel).all(|e| va[e * fa.len() + ia] == vb[e * fb.len() + ib])
                })
            }
            (Payload::Numeric { real: ra, imag: ia }, Payload::Numeric { real: rb, imag: ib }) => {
                ra == rb && ia == ib
            }
            (Payload::Logical(a), Payload::Logical(b)) => a == b,
            (Payload::Char(a), Payload::Char(b)) => a == b,
            (Payload::Cell(a), Payload::Cell(b)) => a == b,
            (Payload::Sparse(a), Payload::Sparse(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for MxArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeros_normalizes_shape() {
        let a = MxArray::zeros(ElementType::Int16, &[4]).unwrap();
        assert_eq!(a.shape(), &[4, 1]);
        assert_eq!(a.kind(), ValueKind::Numeric);
        assert_eq!(a.element_type(), Some(ElementType::Int16));
        assert_eq!(a.numel(), 4);
    }

    #[test]
    fn from_parts_rejects_mismatched_length() {
        let err = MxArray::from_parts(
            vec![2, 2],
            Payload::Numeric {
                real: NumericData::Float64(vec![1.0, 2.0, 3.0]),
                imag: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, MxError::Shape(_)));
    }

    #[test]
    fn struct_equality_ignores_field_order() {
        let mut a = MxArray::structure(&[1, 1], &["x", "y"]).unwrap();
        let mut b = MxArray::structure(&[1, 1], &["y", "x"]).unwrap();
        a.replace_field(0, "x", MxArray::scalar(1.0)).unwrap();
        a.replace_field(0, "y", MxArray::char_row("hi")).unwrap();
        b.replace_field(0, "y", MxArray::char_row("hi")).unwrap();
        assert_ne!(a, b);
        b.replace_field(0, "x", MxArray::scalar(1.0)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn field_names_are_validated() {
        assert!(matches!(
            MxArray::structure(&[1, 1], &["a", "a"]),
            Err(MxError::InvalidArgument(_))
        ));
        assert!(matches!(
            MxArray::structure(&[1, 1], &["1bad"]),
            Err(MxError::InvalidArgument(_))
        ));
        assert!(is_valid_identifier("ok_name2"));
        assert!(!is_valid_identifier(&"a".repeat(64)));
    }

    #[test]
    fn overflowing_shape_is_an_allocation_error() {
        let err = MxArray::zeros(ElementType::Float64, &[usize::MAX / 4, 4]).unwrap_err();
        assert!(matches!(err, MxError::Allocation { .. }));
    }

    #[test]
    fn describe_like_whos() {
        assert_eq!(MxArray::scalar(1.0).describe(), "1x1 double");
        assert_eq!(MxArray::char_row("abc").describe(), "1x3 char");
        assert_eq!(MxArray::cell(&[2, 2]).unwrap().describe(), "2x2 cell");
    }
}
