use thiserror::Error;

use crate::models::{Centroid, EmbeddingMatrix};

#[derive(Debug, Error, PartialEq)]
pub enum ReduceError {
    #[error("cannot reduce an empty embedding matrix")]
    Empty,

    #[error("ragged embedding matrix: row {row} has {found} components, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// Component-wise arithmetic mean of every vector in the matrix.
pub fn mean_vector(matrix: &EmbeddingMatrix) -> Result<Vec<f32>, ReduceError> {
    let dim = matrix.dim().ok_or(ReduceError::Empty)?;
    let mut acc = vec![0.0f64; dim];
    for (row, v) in matrix.vectors.iter().enumerate() {
        if v.len() != dim {
            return Err(ReduceError::Ragged {
                row,
                expected: dim,
                found: v.len(),
            });
        }
        for (a, x) in acc.iter_mut().zip(v) {
            *a += f64::from(*x);
        }
    }
    let n = matrix.len() as f64;
    Ok(acc.into_iter().map(|a| (a / n) as f32).collect())
}

pub fn centroid(label: &str, matrix: &EmbeddingMatrix) -> Result<Centroid, ReduceError> {
    Ok(Centroid {
        label: label.to_string(),
        vector: mean_vector(matrix)?,
    })
}

/// Centroids in the order they were produced during a run.
#[derive(Debug, Clone, Default)]
pub struct CentroidSet {
    items: Vec<Centroid>,
}

impl CentroidSet {
    pub fn push(&mut self, c: Centroid) {
        self.items.push(c);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn labels(&self) -> Vec<String> {
        self.items.iter().map(|c| c.label.clone()).collect()
    }

    /// The centroids as a matrix with their labels as row names, so they can
    /// be reduced and exported like any other embedding.
    pub fn to_matrix(&self) -> EmbeddingMatrix {
        let mut m = EmbeddingMatrix::default();
        for c in &self.items {
            m.push(c.label.clone(), c.vector.clone());
        }
        m
    }
}
