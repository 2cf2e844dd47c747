//! Vector element types and borrowed row-major matrices.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{Error, Result};

/// Element type of the vectors stored in an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorValueType {
    /// 32-bit float components.
    Float,
    /// Signed 8-bit components.
    Int8,
    /// Unsigned 8-bit components.
    UInt8,
}

impl std::fmt::Display for VectorValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Float => "Float",
            Self::Int8 => "Int8",
            Self::UInt8 => "UInt8",
        };
        f.write_str(name)
    }
}

/// A scalar type usable as a vector component.
pub trait VectorElement:
    Copy + Send + Sync + PartialEq + std::fmt::Debug + Serialize + DeserializeOwned + 'static
{
    /// The value type tag matching this element.
    const VALUE_TYPE: VectorValueType;

    /// Widens the component to `f32` for distance computation.
    fn to_f32(self) -> f32;

    /// Normalizes a row in place. No-op for integer element types.
    fn normalize(_row: &mut [Self]) {}
}

impl VectorElement for f32 {
    const VALUE_TYPE: VectorValueType = VectorValueType::Float;

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    fn normalize(row: &mut [Self]) {
        let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in row {
                *x /= norm;
            }
        }
    }
}

impl VectorElement for i8 {
    const VALUE_TYPE: VectorValueType = VectorValueType::Int8;

    #[inline]
    fn to_f32(self) -> f32 {
        f32::from(self)
    }
}

impl VectorElement for u8 {
    const VALUE_TYPE: VectorValueType = VectorValueType::UInt8;

    #[inline]
    fn to_f32(self) -> f32 {
        f32::from(self)
    }
}

/// Squared L2 distance between two rows, computed in `f32`.
#[inline]
#[must_use]
pub fn squared_l2<T: VectorElement>(a: &[T], b: &[T]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x.to_f32() - y.to_f32();
            d * d
        })
        .sum()
}

/// Borrowed row-major matrix over a flat slice.
///
/// Row `j` occupies `data[j * dimension..(j + 1) * dimension]`.
#[derive(Debug, Clone, Copy)]
pub struct VectorMatrix<'a, T> {
    data: &'a [T],
    dimension: usize,
}

impl<'a, T: VectorElement> VectorMatrix<'a, T> {
    /// Wraps a flat slice as a matrix with `dimension` columns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArgumentMismatch`] if `dimension` is zero or the slice
    /// length is not a multiple of it.
    pub fn new(data: &'a [T], dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::ArgumentMismatch {
                what: "matrix dimension",
                expected: 1,
                actual: 0,
            });
        }
        if data.len() % dimension != 0 {
            return Err(Error::ArgumentMismatch {
                what: "matrix buffer length",
                expected: data.len().next_multiple_of(dimension),
                actual: data.len(),
            });
        }
        Ok(Self { data, dimension })
    }

    /// Number of rows.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.data.len() / self.dimension
    }

    /// Number of columns.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Returns true if the matrix has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns row `j`.
    ///
    /// # Panics
    ///
    /// Panics if `j >= self.rows()`.
    #[inline]
    #[must_use]
    pub fn row(&self, j: usize) -> &'a [T] {
        &self.data[j * self.dimension..(j + 1) * self.dimension]
    }

    /// Iterates over the rows in order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &'a [T]> + 'a {
        self.data.chunks_exact(self.dimension)
    }

    /// The underlying flat buffer.
    #[must_use]
    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    /// Copies the matrix with every row normalized via [`VectorElement::normalize`].
    #[must_use]
    pub fn to_normalized(&self) -> Vec<T> {
        let mut owned = self.data.to_vec();
        for row in owned.chunks_exact_mut(self.dimension) {
            T::normalize(row);
        }
        owned
    }
}
