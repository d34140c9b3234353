//! Tensor API.
//!
//! Tensors are the inputs and outputs of the hand landmark network: the resized camera frame
//! goes in as a `[1, 224, 224, 3]` (or `[1, 3, 224, 224]`) tensor, and landmark coordinates,
//! presence and handedness come out as small `[1, N]` tensors.
//!
//! A Tensor is nothing more than an N-dimensional array of `f32`s stored in row-major order.

use std::fmt;

use tinyvec::TinyVec;

type Shape = TinyVec<[usize; 4]>;

/// A dynamically sized, row-major tensor of `f32` elements.
///
/// Tensors with quantized (`u8`) element types are represented by storing the integer values as
/// `f32`s; see [`crate::resize::DataType`].
#[derive(Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    data: Box<[f32]>,
}

impl Tensor {
    /// Creates a tensor of the given shape by pulling elements from an iterator.
    ///
    /// # Panics
    ///
    /// `iter` must yield exactly as many elements as specified by `shape` (by multiplying all of
    /// its entries), otherwise this method will panic.
    #[track_caller]
    pub fn from_iter<I: IntoIterator<Item = f32>>(shape: &[usize], iter: I) -> Self {
        let data: Box<[f32]> = iter.into_iter().collect();
        let elements: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            elements,
            "tensor of shape {shape:?} needs {elements} elements"
        );
        Self {
            shape: shape.into(),
            data,
        }
    }

    /// Creates a tensor of the given shape from a buffer of row-major elements.
    ///
    /// # Panics
    ///
    /// This method panics if `data` does not contain exactly as many elements as `shape`
    /// describes.
    #[track_caller]
    pub fn from_vec(shape: &[usize], data: Vec<f32>) -> Self {
        Self::from_iter(shape, data)
    }

    pub(super) fn from_tract(tract: &tract_onnx::prelude::Tensor) -> anyhow::Result<Self> {
        let data = tract.as_slice::<f32>()?;
        Ok(Self::from_iter(tract.shape(), data.iter().copied()))
    }

    pub(super) fn to_tract(&self) -> anyhow::Result<tract_onnx::prelude::Tensor> {
        Ok(tract_onnx::prelude::Tensor::from_shape(
            self.shape(),
            &self.data,
        )?)
    }

    /// Returns the shape of this tensor.
    ///
    /// A tensor's shape is the number of entries in each dimension.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the total number of elements in this tensor.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns all elements of the tensor in row-major order, regardless of its shape.
    ///
    /// Model outputs like `[1, 63]` landmark tensors are usually consumed this way.
    pub fn as_raw_data(&self) -> &[f32] {
        &self.data
    }

    /// Returns the first element of the tensor, or [`None`] if it has no elements.
    ///
    /// This is the value of scalar outputs, which networks tend to emit with shapes like `[1, 1]`.
    pub fn first(&self) -> Option<f32> {
        self.data.first().copied()
    }
}

impl From<f32> for Tensor {
    fn from(value: f32) -> Self {
        Tensor::from_iter(&[], [value])
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singular() {
        let tensor = Tensor::from(1.0);
        assert_eq!(tensor.shape(), &[] as &[usize]);
        assert_eq!(tensor.len(), 1);
        assert_eq!(tensor.first(), Some(1.0));
    }

    #[test]
    fn empty() {
        let tensor = Tensor::from_iter(&[1, 0], []);
        assert!(tensor.is_empty());
        assert_eq!(tensor.first(), None);
        assert_eq!(tensor.as_raw_data(), &[] as &[f32]);
    }

    #[test]
    fn row_major_2d() {
        let iter = [[0.0, 1.0, 2.0], [3.0, 4.0, 5.0]].into_iter().flatten();
        let tensor = Tensor::from_iter(&[2, 3], iter);
        assert_eq!(tensor.shape(), [2, 3]);
        assert_eq!(tensor.len(), 6);
        assert_eq!(tensor.as_raw_data(), [0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    #[should_panic = "needs 4 elements"]
    fn wrong_element_count() {
        Tensor::from_vec(&[2, 2], vec![0.0; 3]);
    }
}
