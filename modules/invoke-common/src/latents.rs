use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShapeMismatch {
    #[error("latents shape {shape:?} needs {expected} values, got {actual}")]
    Length {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("latents shape {0:?} overflows the addressable size")]
    Overflow(Vec<usize>),
}

/// Dense latent tensor in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatentsTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Number of elements a shape holds, `None` on overflow.
pub fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

impl LatentsTensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, ShapeMismatch> {
        let tensor = Self { shape, data };
        tensor.validate()?;
        Ok(tensor)
    }

    pub fn zeros(shape: Vec<usize>) -> Result<Self, ShapeMismatch> {
        let len = element_count(&shape).ok_or_else(|| ShapeMismatch::Overflow(shape.clone()))?;
        Ok(Self {
            shape,
            data: vec![0.0; len],
        })
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn validate(&self) -> Result<(), ShapeMismatch> {
        let expected = element_count(&self.shape).ok_or_else(|| ShapeMismatch::Overflow(self.shape.clone()))?;
        if expected != self.data.len() {
            return Err(ShapeMismatch::Length {
                shape: self.shape.clone(),
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}
