//! mxArray-style foreign values for RunMat engine sessions.
//!
//! A [`ForeignValue`] owns a column-major [`MxArray`] block drawn from a
//! [`ForeignAllocator`] and tracks who is responsible for it. The
//! [`marshal`] module deep-copies between those blocks and host containers
//! ([`HostValue`], [`HostArray`], [`SparseMatrix`], records).

pub mod alloc;
pub mod class;
pub mod error;
pub mod host;
pub mod layout;
pub mod marshal;
pub mod storage;
pub mod value;

pub use alloc::ForeignAllocator;
pub use class::{ElementType, ValueKind};
pub use error::{MxError, MxResult};
pub use host::{
    HostArray, HostCellArray, HostData, HostElement, HostStructArray, HostValue, Record, Scalar,
    SparseMatrix, StructArrayMode,
};
pub use layout::Order;
pub use marshal::{
    from_record, from_records, to_array, to_cell, to_default, to_mapping, to_mappings, to_scalar,
    to_sparse, to_string, to_vector, AsArray, ToForeign,
};
pub use storage::{
    is_valid_identifier, validate_field_names, MxArray, MxElement, NumericData, Payload,
    SparseData,
};
pub use value::{ForeignValue, Ownership};

pub use indexmap::IndexMap;
pub use num_complex::{Complex32, Complex64};
