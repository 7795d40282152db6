//! Model representation.
//!
//! A [`Model`] is an ordered list of named parameter tensors. The canonical model is
//! issued by the coordinator as part of the job and is never mutated by the worker.
//! Training operates on a working copy of the tensors, and the only artifact that
//! leaves the worker is the [`ParameterDelta`] between the canonical model and the
//! trained working copy.

use std::{convert::TryFrom, slice::Iter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors related to tensor construction and arithmetic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    #[error("shape {shape:?} requires {expected} values but got {got}")]
    InvalidLength {
        shape: Vec<usize>,
        expected: usize,
        got: usize,
    },
    #[error("shape mismatch: {left:?} vs {right:?}")]
    ShapeMismatch { left: Vec<usize>, right: Vec<usize> },
    #[error("cannot slice rows {start}..{end} out of {rows}")]
    OutOfBounds {
        start: usize,
        end: usize,
        rows: usize,
    },
    #[error("a scalar tensor has no rows")]
    NoRows,
    #[error("parameter count mismatch: {left} vs {right}")]
    CountMismatch { left: usize, right: usize },
}

/// A dense, row-major tensor of `f32` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TensorData")]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

/// The unchecked wire form of a [`Tensor`].
#[derive(Deserialize)]
struct TensorData {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl TryFrom<TensorData> for Tensor {
    type Error = TensorError;

    fn try_from(tensor: TensorData) -> Result<Self, Self::Error> {
        Tensor::new(tensor.shape, tensor.data)
    }
}

impl Tensor {
    /// Create a tensor with the given shape.
    ///
    /// # Errors
    /// Fails if the number of values doesn't match the shape.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, TensorError> {
        let expected = shape.iter().product::<usize>();
        if expected != data.len() {
            return Err(TensorError::InvalidLength {
                shape,
                expected,
                got: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Create a tensor filled with zeros.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product::<usize>();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Number of values in the tensor.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the first dimension.
    pub fn rows(&self) -> Result<usize, TensorError> {
        self.shape.first().copied().ok_or(TensorError::NoRows)
    }

    /// Number of values in a single row.
    fn row_len(&self) -> usize {
        self.shape.iter().skip(1).product::<usize>()
    }

    /// Copy the rows `start..start + len` into a new tensor.
    ///
    /// # Errors
    /// Fails if the range exceeds the first dimension.
    pub fn slice_rows(&self, start: usize, len: usize) -> Result<Tensor, TensorError> {
        let rows = self.rows()?;
        let end = start + len;
        if end > rows {
            return Err(TensorError::OutOfBounds { start, end, rows });
        }
        let row_len = self.row_len();
        let mut shape = self.shape.clone();
        shape[0] = len;
        Ok(Tensor {
            shape,
            data: self.data[start * row_len..end * row_len].to_vec(),
        })
    }

    /// Element-wise `self - other`.
    ///
    /// # Errors
    /// Fails if the shapes differ.
    pub fn sub(&self, other: &Tensor) -> Result<Tensor, TensorError> {
        if self.shape != other.shape {
            return Err(TensorError::ShapeMismatch {
                left: self.shape.clone(),
                right: other.shape.clone(),
            });
        }
        Ok(Tensor {
            shape: self.shape.clone(),
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| a - b)
                .collect(),
        })
    }
}

/// A named parameter tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub tensor: Tensor,
}

impl Parameter {
    pub fn new(name: impl Into<String>, tensor: Tensor) -> Self {
        Self {
            name: name.into(),
            tensor,
        }
    }
}

/// An ordered sequence of named parameter tensors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Model {
    params: Vec<Parameter>,
}

impl Model {
    pub fn new(params: Vec<Parameter>) -> Self {
        Self { params }
    }

    /// Gets the number of parameter tensors of this model.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> Iter<Parameter> {
        self.params.iter()
    }

    /// Creates an iterator over the parameter tensors, in order.
    pub fn tensors(&self) -> impl Iterator<Item = &Tensor> {
        self.params.iter().map(|p| &p.tensor)
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.tensor)
    }

    /// Build a model with the names of `self` and the given tensors.
    ///
    /// # Errors
    /// Fails if the number of tensors or their shapes differ from `self`.
    pub fn with_tensors(&self, tensors: &[Tensor]) -> Result<Model, TensorError> {
        check_compatible(self, tensors)?;
        Ok(Model {
            params: self
                .params
                .iter()
                .zip(tensors.iter())
                .map(|(p, t)| Parameter::new(p.name.clone(), t.clone()))
                .collect(),
        })
    }
}

fn check_compatible(model: &Model, tensors: &[Tensor]) -> Result<(), TensorError> {
    if model.len() != tensors.len() {
        return Err(TensorError::CountMismatch {
            left: model.len(),
            right: tensors.len(),
        });
    }
    for (param, tensor) in model.iter().zip(tensors.iter()) {
        if param.tensor.shape() != tensor.shape() {
            return Err(TensorError::ShapeMismatch {
                left: param.tensor.shape().to_vec(),
                right: tensor.shape().to_vec(),
            });
        }
    }
    Ok(())
}

/// The per-parameter difference between the model before and after a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDelta {
    params: Vec<Parameter>,
}

impl ParameterDelta {
    /// Compute `original[i] - trained[i]` for every parameter.
    ///
    /// # Errors
    /// Fails if the number of tensors or their shapes differ.
    pub fn between(original: &Model, trained: &[Tensor]) -> Result<Self, TensorError> {
        check_compatible(original, trained)?;
        let params = original
            .iter()
            .zip(trained.iter())
            .map(|(p, t)| Ok(Parameter::new(p.name.clone(), p.tensor.sub(t)?)))
            .collect::<Result<Vec<_>, TensorError>>()?;
        Ok(Self { params })
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> Iter<Parameter> {
        self.params.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.tensor)
    }
}
