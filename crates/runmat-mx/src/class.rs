//! Type tags for foreign values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage kind of a foreign value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Numeric,
    Logical,
    Character,
    Cell,
    Struct,
    /// Sparse double matrix in compressed-column form
    Sparse,
}

/// Element class of numeric, logical and character storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Logical,
    Char,
}

impl ElementType {
    pub const NUMERIC: [ElementType; 10] = [
        ElementType::Int8,
        ElementType::Int16,
        ElementType::Int32,
        ElementType::Int64,
        ElementType::UInt8,
        ElementType::UInt16,
        ElementType::UInt32,
        ElementType::UInt64,
        ElementType::Float32,
        ElementType::Float64,
    ];

    /// Size in bytes of one (real) element.
    pub fn size_bytes(self) -> usize {
        match self {
            ElementType::Int8 | ElementType::UInt8 | ElementType::Logical => 1,
            ElementType::Int16 | ElementType::UInt16 | ElementType::Char => 2,
            ElementType::Int32 | ElementType::UInt32 | ElementType::Float32 => 4,
            ElementType::Int64 | ElementType::UInt64 | ElementType::Float64 => 8,
        }
    }

    /// MATLAB class name (`double`, `single`, `int8`, ...).
    pub fn class_name(self) -> &'static str {
        match self {
            ElementType::Int8 => "int8",
            ElementType::Int16 => "int16",
            ElementType::Int32 => "int32",
            ElementType::Int64 => "int64",
            ElementType::UInt8 => "uint8",
            ElementType::UInt16 => "uint16",
            ElementType::UInt32 => "uint32",
            ElementType::UInt64 => "uint64",
            ElementType::Float32 => "single",
            ElementType::Float64 => "double",
            ElementType::Logical => "logical",
            ElementType::Char => "char",
        }
    }

    /// Parse a MATLAB class name.
    pub fn from_class_name(name: &str) -> Option<Self> {
        match name {
            "int8" => Some(ElementType::Int8),
            "int16" => Some(ElementType::Int16),
            "int32" => Some(ElementType::Int32),
            "int64" => Some(ElementType::Int64),
            "uint8" => Some(ElementType::UInt8),
            "uint16" => Some(ElementType::UInt16),
            "uint32" => Some(ElementType::UInt32),
            "uint64" => Some(ElementType::UInt64),
            "single" => Some(ElementType::Float32),
            "double" => Some(ElementType::Float64),
            "logical" => Some(ElementType::Logical),
            "char" => Some(ElementType::Char),
            _ => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, ElementType::Logical | ElementType::Char)
    }

    pub fn is_integer(self) -> bool {
        self.is_numeric() && !self.is_float()
    }

    pub fn is_float(self) -> bool {
        matches!(self, ElementType::Float32 | ElementType::Float64)
    }

    /// The value kind a dense array of this class has.
    pub fn dense_kind(self) -> ValueKind {
        match self {
            ElementType::Logical => ValueKind::Logical,
            ElementType::Char => ValueKind::Character,
            _ => ValueKind::Numeric,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Numeric => "numeric",
            ValueKind::Logical => "logical",
            ValueKind::Character => "char",
            ValueKind::Cell => "cell",
            ValueKind::Struct => "struct",
            ValueKind::Sparse => "sparse",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_names_roundtrip() {
        for ty in ElementType::NUMERIC
            .iter()
            .copied()
            .chain([ElementType::Logical, ElementType::Char])
        {
            assert_eq!(ElementType::from_class_name(ty.class_name()), Some(ty));
        }
        assert_eq!(ElementType::from_class_name("cell"), None);
    }

    #[test]
    fn classification() {
        assert!(ElementType::Int16.is_integer());
        assert!(!ElementType::Float32.is_integer());
        assert!(ElementType::Float32.is_float());
        assert!(!ElementType::Char.is_numeric());
        assert_eq!(ElementType::Logical.dense_kind(), ValueKind::Logical);
        assert_eq!(ElementType::Float64.size_bytes(), 8);
        assert_eq!(ElementType::Char.size_bytes(), 2);
    }
}
