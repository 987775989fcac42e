use crate::math::Matrix;

/// N-dimensional tensor backed by a flat `Vec<f32>`.
///
/// Weights, scores, masks and activations all travel as `Tensor`s. Dense
/// products go through the 2-D [`Matrix`] type, so conversion helpers are
/// provided in both directions.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    /// Tensor elements in row-major order.
    pub data: Vec<f32>,
    /// Sizes for each dimension.
    pub shape: Vec<usize>,
}

impl Tensor {
    /// Create a new tensor from raw parts.  The number of elements in `data`
    /// must match the product of the requested `shape`.
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        assert_eq!(data.len(), shape.iter().product::<usize>());
        Tensor { data, shape }
    }

    /// Take ownership of a [`Matrix`] while recording its 2-D shape.
    pub fn from_matrix(m: Matrix) -> Self {
        Tensor {
            shape: vec![m.rows, m.cols],
            data: m.data,
        }
    }

    /// View the tensor as a matrix of `rows x (len / rows)` elements.
    pub fn to_matrix(&self, rows: usize) -> Matrix {
        let cols = if rows == 0 { 0 } else { self.data.len() / rows };
        Matrix::from_vec(rows, cols, self.data.clone())
    }

    /// Create a tensor filled with `value`.
    pub fn full(shape: Vec<usize>, value: f32) -> Self {
        let len: usize = shape.iter().product();
        Tensor {
            data: vec![value; len],
            shape,
        }
    }

    /// Create a tensor of zeros with the given shape.
    pub fn zeros(shape: Vec<usize>) -> Self {
        Self::full(shape, 0.0)
    }

    /// Create a tensor of zeros matching the shape of `other`.
    pub fn zeros_like(other: &Tensor) -> Self {
        Tensor {
            data: vec![0.0; other.data.len()],
            shape: other.shape.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Compute the flat index for a multi-dimensional coordinate.
    fn offset(&self, idx: &[usize]) -> usize {
        assert_eq!(idx.len(), self.shape.len());
        let mut stride = 1;
        let mut off = 0usize;
        for (i, &dim) in self.shape.iter().rev().enumerate() {
            let id = idx[self.shape.len() - 1 - i];
            assert!(id < dim, "index out of bounds");
            off += id * stride;
            stride *= dim;
        }
        off
    }

    pub fn get(&self, idx: &[usize]) -> f32 {
        let off = self.offset(idx);
        self.data[off]
    }

    pub fn set(&mut self, idx: &[usize], value: f32) {
        let off = self.offset(idx);
        self.data[off] = value;
    }

    /// Change the view of the underlying data without modifying order.
    /// The new shape must contain the same number of elements.
    pub fn reshape(&mut self, new_shape: Vec<usize>) {
        assert_eq!(self.data.len(), new_shape.iter().product::<usize>());
        self.shape = new_shape;
    }

    /// Consuming variant of [`Tensor::reshape`].
    pub fn reshaped(mut self, new_shape: Vec<usize>) -> Tensor {
        self.reshape(new_shape);
        self
    }

    /// Apply `f` to every element.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Tensor {
        Tensor {
            data: self.data.iter().map(|&v| f(v)).collect(),
            shape: self.shape.clone(),
        }
    }

    /// Elementwise product of two tensors of identical shape.
    pub fn hadamard(a: &Tensor, b: &Tensor) -> Tensor {
        assert_eq!(a.shape, b.shape, "hadamard requires identical shapes");
        Tensor {
            data: a.data.iter().zip(&b.data).map(|(x, y)| x * y).collect(),
            shape: a.shape.clone(),
        }
    }

    /// Elementwise in-place accumulation of `other` into `self`.
    pub fn add_assign(&mut self, other: &Tensor) {
        assert_eq!(self.shape, other.shape, "add_assign requires identical shapes");
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
    }

    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    /// Arithmetic mean over all elements; zero for an empty tensor.
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.sum() / self.data.len() as f32
    }

    pub fn count_nonzero(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0.0).count()
    }

    /// Size of the leading (batch) dimension.
    pub fn batch(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }
}
