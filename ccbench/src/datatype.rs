/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use serde::{Deserialize, Serialize};

/// The element types a benchmark can read from vector files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Float32,
    UInt8,
    Int8,
}

impl DataType {
    /// Return the string representation of the enum.
    ///
    /// This is more efficient than using `serde` directly.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::UInt8 => "uint8",
            Self::Int8 => "int8",
        }
    }

    /// The size in bytes of one element on disk.
    pub const fn element_size(self) -> usize {
        match self {
            Self::Float32 => std::mem::size_of::<f32>(),
            Self::UInt8 => std::mem::size_of::<u8>(),
            Self::Int8 => std::mem::size_of::<i8>(),
        }
    }

    /// Lift `self` into the type domain by calling `visitor` with the matching element type.
    pub fn dispatch<V: Visitor>(self, visitor: V) -> V::Output {
        match self {
            Self::Float32 => visitor.visit::<f32>(),
            Self::UInt8 => visitor.visit::<u8>(),
            Self::Int8 => visitor.visit::<i8>(),
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A Rust type that can back a [`DataType`].
pub trait Element: bytemuck::Pod + Send + Sync + Into<f32> + 'static {
    const DATA_TYPE: DataType;
}

macro_rules! element {
    ($type:ty, $var:ident) => {
        impl Element for $type {
            const DATA_TYPE: DataType = DataType::$var;
        }
    };
}

element!(f32, Float32);
element!(u8, UInt8);
element!(i8, Int8);

/// Generic code run by [`DataType::dispatch`].
pub trait Visitor {
    type Output;
    fn visit<T: Element>(self) -> Self::Output;
}

///////////
// Tests //
///////////
