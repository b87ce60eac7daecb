use ndarray::{
    concatenate, stack, Array1, Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewMutD, Axis, IxDyn,
};
use serde::{Deserialize, Serialize};

use crate::MlError;

/// Where batches and models live while computing.
///
/// Only the host is supported; moving a batch to it is the identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    #[default]
    Cpu,
}

/// A single supervised sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    /// A feature vector with its target.
    Dense { x: Array1<f32>, y: ArrayD<f32> },

    /// A graph given by its node features (`nodes × features`) and a `2 × edges` index of
    /// `(source, target)` pairs, with a graph-level target.
    Graph {
        x: Array2<f32>,
        edge_index: Array2<usize>,
        y: ArrayD<f32>,
    },
}

impl Sample {
    /// Creates a dense sample with a scalar (0-dimensional) target.
    pub fn dense(x: Vec<f32>, y: f32) -> Self {
        Self::Dense {
            x: Array1::from(x),
            y: ArrayD::from_elem(IxDyn(&[]), y),
        }
    }

    /// Returns the sample's target.
    pub fn target(&self) -> &ArrayD<f32> {
        match self {
            Self::Dense { y, .. } | Self::Graph { y, .. } => y,
        }
    }

    /// Interprets a single-element target as a class index.
    ///
    /// # Returns
    /// `None` if the target holds more than one value or is not a non-negative finite number.
    pub fn class(&self) -> Option<usize> {
        let y = self.target();
        if y.len() != 1 {
            return None;
        }

        let v = *y.iter().next()?;
        (v.is_finite() && v >= 0.0).then(|| v as usize)
    }

    /// Gives mutable access to the features, whatever their shape.
    pub fn features_mut(&mut self) -> ArrayViewMutD<'_, f32> {
        match self {
            Self::Dense { x, .. } => x.view_mut().into_dyn(),
            Self::Graph { x, .. } => x.view_mut().into_dyn(),
        }
    }
}

/// A collated group of samples.
#[derive(Debug, Clone, PartialEq)]
pub enum Batch {
    /// Features stacked to `(batch, features)`, targets stacked along a new leading axis.
    Dense { x: Array2<f32>, y: ArrayD<f32> },

    /// Node features of every graph concatenated, edges re-indexed into the concatenated node
    /// space and `batch[node]` naming the graph each node belongs to.
    Graph {
        x: Array2<f32>,
        edge_index: Array2<usize>,
        batch: Array1<usize>,
        num_graphs: usize,
        y: ArrayD<f32>,
    },
}

/// A borrowed view of a batch's inputs, as handed to a model.
#[derive(Debug, Clone, Copy)]
pub enum ModelInput<'a> {
    Dense(ArrayView2<'a, f32>),
    Graph {
        x: ArrayView2<'a, f32>,
        edge_index: ArrayView2<'a, usize>,
        batch: ArrayView1<'a, usize>,
        num_graphs: usize,
    },
}

impl Batch {
    /// Collates `samples` into a single batch.
    ///
    /// # Errors
    /// Returns `MlError` if `samples` is empty, mixes dense and graph samples, or the shapes
    /// of the samples disagree.
    pub fn collate(samples: &[Sample]) -> Result<Self, MlError> {
        let Some(first) = samples.first() else {
            return Err(MlError::InvalidInput("cannot collate an empty batch"));
        };

        match first {
            Sample::Dense { .. } => collate_dense(samples),
            Sample::Graph { .. } => collate_graph(samples),
        }
    }

    /// Returns the number of samples (graphs, for graph batches) in this batch.
    pub fn len(&self) -> usize {
        match self {
            Self::Dense { x, .. } => x.nrows(),
            Self::Graph { num_graphs, .. } => *num_graphs,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the stacked targets.
    pub fn targets(&self) -> &ArrayD<f32> {
        match self {
            Self::Dense { y, .. } | Self::Graph { y, .. } => y,
        }
    }

    /// Moves the batch to `device`.
    pub fn to(self, device: Device) -> Self {
        match device {
            Device::Cpu => self,
        }
    }

    /// Borrows the batch's inputs.
    pub fn input(&self) -> ModelInput<'_> {
        match self {
            Self::Dense { x, .. } => ModelInput::Dense(x.view()),
            Self::Graph {
                x,
                edge_index,
                batch,
                num_graphs,
                ..
            } => ModelInput::Graph {
                x: x.view(),
                edge_index: edge_index.view(),
                batch: batch.view(),
                num_graphs: *num_graphs,
            },
        }
    }
}

fn collate_dense(samples: &[Sample]) -> Result<Batch, MlError> {
    let mut xs = Vec::with_capacity(samples.len());
    let mut ys = Vec::with_capacity(samples.len());

    for sample in samples {
        let Sample::Dense { x, y } = sample else {
            return Err(MlError::InvalidInput("dense and graph samples cannot share a batch"));
        };

        xs.push(x.view());
        ys.push(y.view());
    }

    Ok(Batch::Dense {
        x: stack(Axis(0), &xs)?,
        y: stack(Axis(0), &ys)?,
    })
}

fn collate_graph(samples: &[Sample]) -> Result<Batch, MlError> {
    let mut xs = Vec::with_capacity(samples.len());
    let mut edges = Vec::with_capacity(samples.len());
    let mut ys = Vec::with_capacity(samples.len());
    let mut batch = Vec::new();
    let mut offset = 0;

    for (graph, sample) in samples.iter().enumerate() {
        let Sample::Graph { x, edge_index, y } = sample else {
            return Err(MlError::InvalidInput("dense and graph samples cannot share a batch"));
        };

        let nodes = x.nrows();
        if edge_index.nrows() != 2 {
            return Err(MlError::ShapeMismatch {
                what: "edge_index rows",
                got: edge_index.nrows(),
                expected: 2,
            });
        }

        if let Some(&max) = edge_index.iter().max() {
            if max >= nodes {
                return Err(MlError::ShapeMismatch {
                    what: "edge endpoint",
                    got: max,
                    expected: nodes,
                });
            }
        }

        xs.push(x.view());
        edges.push(edge_index.mapv(|node| node + offset));
        ys.push(y.view());
        batch.extend(std::iter::repeat(graph).take(nodes));
        offset += nodes;
    }

    let edge_views: Vec<_> = edges.iter().map(|e| e.view()).collect();

    Ok(Batch::Graph {
        x: concatenate(Axis(0), &xs)?,
        edge_index: concatenate(Axis(1), &edge_views)?,
        batch: Array1::from(batch),
        num_graphs: samples.len(),
        y: stack(Axis(0), &ys)?,
    })
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn triangle(y: f32) -> Sample {
        Sample::Graph {
            x: Array2::ones((3, 2)),
            edge_index: array![[0, 1, 2], [1, 2, 0]],
            y: ArrayD::from_elem(IxDyn(&[1]), y),
        }
    }

    #[test]
    fn dense_collation_stacks_features_and_targets() {
        let samples = [Sample::dense(vec![1.0, 2.0], 0.0), Sample::dense(vec![3.0, 4.0], 1.0)];
        let batch = Batch::collate(&samples).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.targets().shape(), &[2]);
        let Batch::Dense { x, .. } = batch else {
            panic!("expected a dense batch");
        };
        assert_eq!(x, array![[1.0, 2.0], [3.0, 4.0]]);
    }

    #[test]
    fn single_scalar_target_collates_to_length_one() {
        let batch = Batch::collate(&[Sample::dense(vec![1.0], 3.0)]).unwrap();
        assert_eq!(batch.targets().shape(), &[1]);
    }

    #[test]
    fn graph_collation_offsets_edges() {
        let batch = Batch::collate(&[triangle(0.0), triangle(1.0)]).unwrap();

        let Batch::Graph {
            x,
            edge_index,
            batch,
            num_graphs,
            y,
        } = batch
        else {
            panic!("expected a graph batch");
        };

        assert_eq!(num_graphs, 2);
        assert_eq!(x.nrows(), 6);
        assert_eq!(edge_index, array![[0, 1, 2, 3, 4, 5], [1, 2, 0, 4, 5, 3]]);
        assert_eq!(batch, array![0, 0, 0, 1, 1, 1]);
        assert_eq!(y.shape(), &[2, 1]);
    }

    #[test]
    fn mixed_kinds_are_rejected() {
        let res = Batch::collate(&[Sample::dense(vec![1.0], 0.0), triangle(0.0)]);
        assert!(matches!(res, Err(MlError::InvalidInput(_))));
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let bad = Sample::Graph {
            x: Array2::ones((2, 1)),
            edge_index: array![[0], [5]],
            y: ArrayD::zeros(IxDyn(&[])),
        };
        assert!(matches!(
            Batch::collate(&[bad]),
            Err(MlError::ShapeMismatch { got: 5, .. })
        ));
    }

    #[test]
    fn empty_collation_fails() {
        assert!(Batch::collate(&[]).is_err());
    }
}
