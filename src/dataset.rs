//! Locally held training data.

use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

use crate::model::{Tensor, TensorError};

/// Inputs and targets, aligned along their first dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DatasetData")]
pub struct Dataset {
    inputs: Tensor,
    targets: Tensor,
}

#[derive(Deserialize)]
struct DatasetData {
    inputs: Tensor,
    targets: Tensor,
}

impl TryFrom<DatasetData> for Dataset {
    type Error = TensorError;

    fn try_from(dataset: DatasetData) -> Result<Self, Self::Error> {
        Dataset::new(dataset.inputs, dataset.targets)
    }
}

/// A contiguous slice of a [`Dataset`].
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub data: Tensor,
    pub targets: Tensor,
}

impl Dataset {
    /// Create a dataset.
    ///
    /// # Errors
    /// Fails if inputs and targets don't have the same number of rows.
    pub fn new(inputs: Tensor, targets: Tensor) -> Result<Self, TensorError> {
        let (left, right) = (inputs.rows()?, targets.rows()?);
        if left != right {
            return Err(TensorError::ShapeMismatch {
                left: inputs.shape().to_vec(),
                right: targets.shape().to_vec(),
            });
        }
        Ok(Self { inputs, targets })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        // the inputs are checked to have rows in `Dataset::new()`
        self.inputs.rows().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn inputs(&self) -> &Tensor {
        &self.inputs
    }

    pub fn targets(&self) -> &Tensor {
        &self.targets
    }

    /// Copy `len` samples starting at `start`.
    pub fn batch(&self, start: usize, len: usize) -> Result<Batch, TensorError> {
        Ok(Batch {
            data: self.inputs.slice_rows(start, len)?,
            targets: self.targets.slice_rows(start, len)?,
        })
    }
}
