//! Ownership-tracked handles to foreign memory.

use std::fmt;

use crate::alloc::ForeignAllocator;
use crate::class::{ElementType, ValueKind};
use crate::error::{MxError, MxResult};
use crate::storage::{MxArray, MxElement, Payload};

/// Who is responsible for a value's foreign memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The host must release (or drop) the value.
    HostOwned,
    /// The value was handed to a session workspace; the host copy is gone.
    SessionOwned,
    /// Terminal: the memory went back to the allocator.
    Released,
}

/// Handle to a value stored in foreign (engine-side) memory.
///
/// Shape, kind, class, complexity and struct field names are fixed at
/// creation. Only the ownership tag changes, and only forward:
/// `HostOwned -> SessionOwned` through [`transfer_to_session`] and
/// `HostOwned -> Released` through [`release`].
///
/// Dropping a value that is still host-owned returns its memory as well, but
/// explicit [`release`] is the contract; the drop path exists so that a
/// forgotten handle does not leak.
///
/// [`transfer_to_session`]: ForeignValue::transfer_to_session
/// [`release`]: ForeignValue::release
pub struct ForeignValue {
    id: u64,
    kind: ValueKind,
    element_type: Option<ElementType>,
    shape: Vec<usize>,
    complex: bool,
    field_names: Vec<String>,
    ownership: Ownership,
    storage: Option<MxArray>,
    bytes: usize,
    allocator: ForeignAllocator,
}

impl ForeignValue {
    pub(crate) fn from_block(allocator: ForeignAllocator, array: MxArray, bytes: usize) -> Self {
        allocator.value_opened();
        let value = ForeignValue {
            id: ForeignAllocator::next_id(),
            kind: array.kind(),
            element_type: array.element_type(),
            shape: array.shape().to_vec(),
            complex: array.is_complex(),
            field_names: array.field_names().to_vec(),
            ownership: Ownership::HostOwned,
            storage: Some(array),
            bytes,
            allocator,
        };
        log::trace!("foreign value #{} allocated ({} bytes)", value.id, bytes);
        value
    }

    /// Zero-filled value from the global allocator.
    pub fn create(ty: ElementType, shape: &[usize]) -> MxResult<Self> {
        ForeignAllocator::global().create(ty, shape)
    }

    pub fn create_complex(ty: ElementType, shape: &[usize]) -> MxResult<Self> {
        ForeignAllocator::global().create_complex(ty, shape)
    }

    pub fn create_cell(shape: &[usize]) -> MxResult<Self> {
        ForeignAllocator::global().create_cell(shape)
    }

    pub fn create_struct(fields: &[&str]) -> MxResult<Self> {
        ForeignAllocator::global().create_struct(fields)
    }

    pub fn create_struct_array(shape: &[usize], fields: &[&str]) -> MxResult<Self> {
        ForeignAllocator::global().create_struct_array(shape, fields)
    }

    pub fn create_string(text: &str) -> MxResult<Self> {
        ForeignAllocator::global().create_string(text)
    }

    pub fn create_sparse(nrows: usize, ncols: usize) -> MxResult<Self> {
        ForeignAllocator::global().create_sparse(nrows, ncols)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    fn ownership_error(&self, operation: &'static str) -> MxError {
        MxError::Ownership {
            id: self.id,
            actual: self.ownership,
            operation,
        }
    }

    /// Metadata is readable until the value is released.
    fn live(&self, operation: &'static str) -> MxResult<()> {
        if self.ownership == Ownership::Released {
            return Err(self.ownership_error(operation));
        }
        Ok(())
    }

    pub fn shape(&self) -> MxResult<&[usize]> {
        self.live("shape")?;
        Ok(&self.shape)
    }

    pub fn kind(&self) -> MxResult<ValueKind> {
        self.live("kind")?;
        Ok(self.kind)
    }

    /// Element class; `None` for cells and structs.
    pub fn element_type(&self) -> MxResult<Option<ElementType>> {
        self.live("element_type")?;
        Ok(self.element_type)
    }

    pub fn is_complex(&self) -> MxResult<bool> {
        self.live("is_complex")?;
        Ok(self.complex)
    }

    pub fn is_sparse(&self) -> MxResult<bool> {
        self.live("is_sparse")?;
        Ok(self.kind == ValueKind::Sparse)
    }

    pub fn numel(&self) -> MxResult<usize> {
        self.live("numel")?;
        Ok(self.shape.iter().product())
    }

    pub fn ndims(&self) -> MxResult<usize> {
        self.live("ndims")?;
        Ok(self.shape.len())
    }

    pub fn is_empty(&self) -> MxResult<bool> {
        Ok(self.numel()? == 0)
    }

    /// Bytes per element (pointer size for cells and structs).
    pub fn element_size(&self) -> MxResult<usize> {
        self.live("element_size")?;
        Ok(match self.element_type {
            Some(ty) => ty.size_bytes(),
            None => std::mem::size_of::<usize>(),
        })
    }

    pub fn field_names(&self) -> MxResult<&[String]> {
        self.live("field_names")?;
        if self.kind != ValueKind::Struct {
            return Err(MxError::type_error(format!("{} value has no fields", self.kind)));
        }
        Ok(&self.field_names)
    }

    /// Read view of the underlying block. The borrow keeps the value from
    /// being released or transferred while the view exists.
    pub fn array(&self) -> MxResult<&MxArray> {
        match (&self.storage, self.ownership) {
            (Some(array), Ownership::HostOwned) => Ok(array),
            _ => Err(self.ownership_error("data access")),
        }
    }

    fn array_mut(&mut self) -> MxResult<&mut MxArray> {
        match (self.storage.as_mut(), self.ownership) {
            (Some(array), Ownership::HostOwned) => Ok(array),
            _ => Err(MxError::Ownership {
                id: self.id,
                actual: self.ownership,
                operation: "data access",
            }),
        }
    }

    /// Real part as a typed slice.
    pub fn real<T: MxElement>(&self) -> MxResult<&[T]> {
        match self.array()?.payload() {
            Payload::Numeric { real, .. } => T::slice(real).ok_or_else(|| class_mismatch::<T>(self)),
            _ => Err(class_mismatch::<T>(self)),
        }
    }

    pub fn real_mut<T: MxElement>(&mut self) -> MxResult<&mut [T]> {
        let described = self.describe_class();
        match self.array_mut()?.payload_mut() {
            Payload::Numeric { real, .. } => {
                T::slice_mut(real).ok_or_else(|| class_mismatch_named::<T>(&described))
            }
            _ => Err(class_mismatch_named::<T>(&described)),
        }
    }

    /// Imaginary part; TypeError for real values.
    pub fn imag<T: MxElement>(&self) -> MxResult<&[T]> {
        match self.array()?.payload() {
            Payload::Numeric { imag: Some(imag), .. } => {
                T::slice(imag).ok_or_else(|| class_mismatch::<T>(self))
            }
            _ => Err(MxError::type_error(format!(
                "{} has no imaginary part",
                self.describe_class()
            ))),
        }
    }

    pub fn imag_mut<T: MxElement>(&mut self) -> MxResult<&mut [T]> {
        let described = self.describe_class();
        match self.array_mut()?.payload_mut() {
            Payload::Numeric { imag: Some(imag), .. } => {
                T::slice_mut(imag).ok_or_else(|| class_mismatch_named::<T>(&described))
            }
            _ => Err(MxError::type_error(format!("{described} has no imaginary part"))),
        }
    }

    pub fn logicals(&self) -> MxResult<&[bool]> {
        match self.array()?.payload() {
            Payload::Logical(v) => Ok(v),
            _ => Err(MxError::type_error(format!("{} is not logical", self.describe_class()))),
        }
    }

    pub fn logicals_mut(&mut self) -> MxResult<&mut [bool]> {
        let described = self.describe_class();
        match self.array_mut()?.payload_mut() {
            Payload::Logical(v) => Ok(v),
            _ => Err(MxError::type_error(format!("{described} is not logical"))),
        }
    }

    /// UTF-16 code units of a char array.
    pub fn chars(&self) -> MxResult<&[u16]> {
        match self.array()?.payload() {
            Payload::Char(v) => Ok(v),
            _ => Err(MxError::type_error(format!("{} is not char", self.describe_class()))),
        }
    }

    pub fn chars_mut(&mut self) -> MxResult<&mut [u16]> {
        let described = self.describe_class();
        match self.array_mut()?.payload_mut() {
            Payload::Char(v) => Ok(v),
            _ => Err(MxError::type_error(format!("{described} is not char"))),
        }
    }

    /// Contents of cell element `index` (column-major).
    pub fn cell_at(&self, index: usize) -> MxResult<&MxArray> {
        self.array()?.cell_at(index)
    }

    /// Store `value` into cell element `index`. The element value is
    /// consumed: its memory now belongs to this container.
    pub fn set_cell(&mut self, index: usize, value: ForeignValue) -> MxResult<()> {
        self.array()?.cell_at(index)?;
        let (block, bytes) = value.into_block("set_cell")?;
        let previous = self.array_mut()?.replace_cell(index, block)?;
        self.absorb(bytes, previous);
        Ok(())
    }

    /// Field `name` of struct element `index`.
    pub fn field(&self, index: usize, name: &str) -> MxResult<&MxArray> {
        self.array()?.field(index, name)
    }

    /// Store `value` into field `name` of struct element `index`, consuming
    /// the element value.
    pub fn set_field(&mut self, index: usize, name: &str, value: ForeignValue) -> MxResult<()> {
        self.array()?.field_slot(index, name)?;
        let (block, bytes) = value.into_block("set_field")?;
        let previous = self.array_mut()?.replace_field(index, name, block)?;
        self.absorb(bytes, previous);
        Ok(())
    }

    fn absorb(&mut self, incoming: usize, previous: MxArray) {
        let freed = previous.byte_size().min(self.bytes + incoming);
        self.bytes = self.bytes + incoming - freed;
        self.allocator.give_back(freed);
    }

    /// Take the block out of a host-owned value. Accounting moves with it.
    fn into_block(mut self, operation: &'static str) -> MxResult<(MxArray, usize)> {
        if self.ownership != Ownership::HostOwned {
            return Err(self.ownership_error(operation));
        }
        let block = self
            .storage
            .take()
            .ok_or_else(|| self.ownership_error(operation))?;
        let bytes = std::mem::take(&mut self.bytes);
        // The container now accounts for these bytes.
        self.ownership = Ownership::Released;
        self.allocator.value_closed();
        Ok((block, bytes))
    }

    /// Independent host-owned deep copy from the same allocator.
    pub fn duplicate(&self) -> MxResult<ForeignValue> {
        let copy = self.array()?.clone();
        self.allocator.adopt(copy)
    }

    /// Return the memory to the allocator. Fails on anything but a
    /// host-owned value, so a second release or a release after transfer is
    /// reported instead of freeing twice.
    pub fn release(&mut self) -> MxResult<()> {
        if self.ownership != Ownership::HostOwned {
            return Err(self.ownership_error("release"));
        }
        self.storage = None;
        self.allocator.give_back(std::mem::take(&mut self.bytes));
        self.allocator.value_closed();
        self.ownership = Ownership::Released;
        log::trace!("foreign value #{} released", self.id);
        Ok(())
    }

    /// Mark the value as handed to a session workspace. Called once the
    /// engine has accepted a copy; the host-side memory is freed and the
    /// workspace is now responsible for the value.
    pub fn transfer_to_session(&mut self) -> MxResult<()> {
        if self.ownership != Ownership::HostOwned {
            return Err(self.ownership_error("transfer"));
        }
        self.storage = None;
        self.allocator.give_back(std::mem::take(&mut self.bytes));
        self.allocator.value_closed();
        self.ownership = Ownership::SessionOwned;
        log::trace!("foreign value #{} transferred to a session", self.id);
        Ok(())
    }

    fn describe_class(&self) -> String {
        match self.element_type {
            Some(ty) if self.kind == ValueKind::Sparse => format!("sparse {ty} value"),
            Some(ty) => format!("{ty} value"),
            None => format!("{} value", self.kind),
        }
    }
}

fn class_mismatch<T: MxElement>(value: &ForeignValue) -> MxError {
    class_mismatch_named::<T>(&value.describe_class())
}

fn class_mismatch_named<T: MxElement>(described: &str) -> MxError {
    MxError::type_error(format!(
        "{described} cannot be viewed as {} data",
        T::ELEMENT_TYPE
    ))
}

impl Drop for ForeignValue {
    fn drop(&mut self) {
        if self.ownership == Ownership::HostOwned {
            log::trace!(
                "foreign value #{} dropped without release; reclaiming {} bytes",
                self.id,
                self.bytes
            );
            self.allocator.give_back(self.bytes);
            self.allocator.value_closed();
        }
    }
}

impl fmt::Debug for ForeignValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignValue")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("element_type", &self.element_type)
            .field("shape", &self.shape)
            .field("complex", &self.complex)
            .field("ownership", &self.ownership)
            .finish()
    }
}

impl fmt::Display for ForeignValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.storage, self.ownership) {
            (Some(array), Ownership::HostOwned) => write!(f, "{array}"),
            (_, Ownership::SessionOwned) => write!(f, "<value #{} held by a session>", self.id),
            _ => write!(f, "<released value #{}>", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_reports_metadata() {
        let v = ForeignValue::create(ElementType::UInt8, &[2, 3, 4]).unwrap();
        assert_eq!(v.shape().unwrap(), &[2, 3, 4]);
        assert_eq!(v.kind().unwrap(), ValueKind::Numeric);
        assert_eq!(v.element_type().unwrap(), Some(ElementType::UInt8));
        assert_eq!(v.element_size().unwrap(), 1);
        assert_eq!(v.numel().unwrap(), 24);
        assert!(!v.is_complex().unwrap());
        assert!(!v.is_sparse().unwrap());
        assert!(!v.is_empty().unwrap());
        assert!(v.real::<u8>().unwrap().iter().all(|&x| x == 0));
    }

    #[test]
    fn writes_land_in_place() {
        let mut v = ForeignValue::create(ElementType::Float64, &[2, 2]).unwrap();
        v.real_mut::<f64>().unwrap()[3] = 4.5;
        assert_eq!(v.real::<f64>().unwrap(), &[0.0, 0.0, 0.0, 4.5]);
        assert!(matches!(v.real::<f32>(), Err(MxError::Type(_))));
    }

    #[test]
    fn release_is_terminal() {
        let mut v = ForeignValue::create(ElementType::Float64, &[3, 3]).unwrap();
        v.release().unwrap();
        assert_eq!(v.ownership(), Ownership::Released);
        assert!(matches!(v.release(), Err(MxError::Ownership { .. })));
        assert!(matches!(v.shape(), Err(MxError::Ownership { .. })));
        assert!(matches!(v.real::<f64>(), Err(MxError::Ownership { .. })));
        assert!(matches!(v.duplicate(), Err(MxError::Ownership { .. })));
        assert!(matches!(v.transfer_to_session(), Err(MxError::Ownership { .. })));
    }

    #[test]
    fn transferred_value_keeps_metadata_but_not_data() {
        let mut v = ForeignValue::create(ElementType::Int32, &[1, 5]).unwrap();
        v.transfer_to_session().unwrap();
        assert_eq!(v.shape().unwrap(), &[1, 5]);
        assert!(matches!(v.real::<i32>(), Err(MxError::Ownership { .. })));
        assert!(matches!(v.release(), Err(MxError::Ownership { .. })));
        assert!(matches!(v.transfer_to_session(), Err(MxError::Ownership { .. })));
    }

    #[test]
    fn set_cell_consumes_the_element() {
        let alloc = ForeignAllocator::new();
        let mut cell = alloc.create_cell(&[1, 2]).unwrap();
        let s = alloc.create_string("hello").unwrap();
        cell.set_cell(1, s).unwrap();
        assert_eq!(alloc.live_values(), 1);
        assert_eq!(cell.cell_at(1).unwrap(), &MxArray::char_row("hello"));
        assert!(cell.cell_at(2).is_err());
        drop(cell);
        assert_eq!(alloc.bytes_in_use(), 0);
    }

    #[test]
    fn struct_fields_are_fixed() {
        let mut s = ForeignValue::create_struct(&["a", "b"]).unwrap();
        assert_eq!(s.field_names().unwrap(), &["a".to_string(), "b".to_string()]);
        let one = ForeignValue::create(ElementType::Float64, &[1, 1]).unwrap();
        s.set_field(0, "a", one).unwrap();
        let other = ForeignValue::create(ElementType::Float64, &[1, 1]).unwrap();
        assert!(matches!(
            s.set_field(0, "missing", other),
            Err(MxError::InvalidArgument(_))
        ));
        assert!(matches!(
            ForeignValue::create_struct(&["x", "x"]),
            Err(MxError::InvalidArgument(_))
        ));
    }

    #[test]
    fn duplicate_is_independent() {
        let mut a = ForeignValue::create(ElementType::Float64, &[1, 1]).unwrap();
        a.real_mut::<f64>().unwrap()[0] = 42.0;
        let b = a.duplicate().unwrap();
        a.real_mut::<f64>().unwrap()[0] = 100.0;
        assert_eq!(b.real::<f64>().unwrap(), &[42.0]);
    }
}
