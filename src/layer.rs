//! The layers a model is made of.

use std::io::{BufRead, Write};

use anyhow::{bail, Result};
use ndarray::prelude::*;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

use crate::linalg;
use crate::real;
use crate::rng::Rng;
use crate::table::{self, EmbeddingTable, Role};

#[derive(Debug)]
pub enum Layer {
    Lookup(EmbeddingTable),
    Linear(LinearLayer),
}

/// Type tag of a layer in a saved model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerTag {
    Lookup,
    Linear,
}

impl LayerTag {
    pub fn name(self) -> &'static str {
        match self {
            LayerTag::Lookup => "lookup",
            LayerTag::Linear => "linear",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "lookup" => Ok(LayerTag::Lookup),
            "linear" => Ok(LayerTag::Linear),
            _ => bail!("unknown layer type {name:?}"),
        }
    }
}

impl Layer {
    pub fn tag(&self) -> LayerTag {
        match self {
            Layer::Lookup(_) => LayerTag::Lookup,
            Layer::Linear(_) => LayerTag::Linear,
        }
    }

    pub fn as_table(&self) -> Option<&EmbeddingTable> {
        match self {
            Layer::Lookup(t) => Some(t),
            Layer::Linear(_) => None,
        }
    }

    pub fn as_table_mut(&mut self) -> Option<&mut EmbeddingTable> {
        match self {
            Layer::Lookup(t) => Some(t),
            Layer::Linear(_) => None,
        }
    }

    pub fn write_binary<W: Write>(&self, out: &mut W) -> Result<()> {
        match self {
            Layer::Lookup(t) => t.write_binary(out),
            Layer::Linear(l) => l.write_binary(out),
        }
    }

    /// `role` is only used for lookup layers.
    pub fn read_binary<R: BufRead>(input: &mut R, tag: LayerTag, role: Role) -> Result<Self> {
        Ok(match tag {
            LayerTag::Lookup => Layer::Lookup(EmbeddingTable::read_binary(input, role)?),
            LayerTag::Linear => Layer::Linear(LinearLayer::read_binary(input)?),
        })
    }
}

/// A dense layer `y = W x + b`, trained by plain SGD.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearLayer {
    /// Shape `(outputs, inputs)`.
    weights: Array2<real>,
    bias: Array1<real>,
}

impl LinearLayer {
    /// Weights and bias are uniform in `[-1/sqrt(inputs), 1/sqrt(inputs))`.
    pub fn new(inputs: usize, outputs: usize, rng: &mut Rng) -> Self {
        let bound = 1.0 / (inputs.max(1) as real).sqrt();
        let dist = Uniform::new(-bound, bound);
        LinearLayer {
            weights: Array2::random_using((outputs, inputs), dist, rng),
            bias: Array1::random_using(outputs, dist, rng),
        }
    }

    pub fn from_parts(weights: Array2<real>, bias: Array1<real>) -> Self {
        assert_eq!(weights.nrows(), bias.len(), "bias does not match weights");
        LinearLayer { weights, bias }
    }

    pub fn inputs(&self) -> usize {
        self.weights.ncols()
    }

    pub fn outputs(&self) -> usize {
        self.weights.nrows()
    }

    pub fn weights(&self) -> ArrayView2<'_, real> {
        self.weights.view()
    }

    pub fn bias(&self) -> ArrayView1<'_, real> {
        self.bias.view()
    }

    pub fn forward(&self, x: ArrayView1<'_, real>) -> Array1<real> {
        debug_assert_eq!(x.len(), self.inputs());
        self.weights.dot(&x) + &self.bias
    }

    /// Gradient with respect to the input, given the gradient `dy` of the
    /// loss with respect to the output.
    pub fn input_gradient(&self, dy: ArrayView1<'_, real>) -> Array1<real> {
        self.weights.t().dot(&dy)
    }

    /// Backpropagate `dy` and take one SGD step with learning rate `rate`.
    /// Returns the gradient with respect to `x`, computed with the weights
    /// as they were before the step.
    pub fn backward(&mut self, x: ArrayView1<'_, real>, dy: ArrayView1<'_, real>, rate: real) -> Array1<real> {
        debug_assert_eq!(dy.len(), self.outputs());
        let dx = self.input_gradient(dy);
        linalg::ger(-rate, dy, x, self.weights.view_mut());
        self.bias.scaled_add(-rate, &dy);
        dx
    }

    /// Weights then bias, each as a binary matrix.
    pub fn write_binary<W: Write>(&self, out: &mut W) -> Result<()> {
        table::write_binary_matrix(out, self.outputs(), self.inputs(), self.weights.iter().copied())?;
        table::write_binary_matrix(out, 1, self.outputs(), self.bias.iter().copied())
    }

    pub fn read_binary<R: BufRead>(input: &mut R) -> Result<Self> {
        let (rows, cols, w) = table::read_binary_matrix(input)?;
        let (one, n, b) = table::read_binary_matrix(input)?;
        anyhow::ensure!(
            one == 1 && n == rows,
            "linear layer bias has shape {one}x{n}, expected 1x{rows}"
        );
        let weights = Array2::from_shape_vec((rows, cols), w)?;
        Ok(LinearLayer::from_parts(weights, Array1::from(b)))
    }
}
