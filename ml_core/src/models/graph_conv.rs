use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::Rng;

use super::Linear;
use crate::{MlError, Model, ModelInput};

/// A graph-level model: one round of mean neighbourhood aggregation (self loop included),
/// mean pooling per graph and a linear head.
///
/// Only the head carries parameters.
#[derive(Debug, Clone)]
pub struct GraphConv {
    features: usize,
    head: Linear,
}

impl GraphConv {
    /// Creates a new `GraphConv`.
    ///
    /// # Arguments
    /// * `features` - The amount of features per node.
    /// * `out` - The amount of outputs per graph.
    /// * `rng` - The random number generator used to initialize the head.
    pub fn new<R: Rng>(features: usize, out: usize, rng: &mut R) -> Self {
        Self {
            features,
            head: Linear::new((features, out), rng),
        }
    }

    fn pool(
        &self,
        x: ArrayView2<f32>,
        edge_index: ArrayView2<usize>,
        batch: ArrayView1<usize>,
        num_graphs: usize,
    ) -> Result<Array2<f32>, MlError> {
        let nodes = x.nrows();
        if x.ncols() != self.features {
            return Err(MlError::ShapeMismatch {
                what: "node features",
                got: x.ncols(),
                expected: self.features,
            });
        }
        if batch.len() != nodes {
            return Err(MlError::ShapeMismatch {
                what: "batch vector",
                got: batch.len(),
                expected: nodes,
            });
        }

        let mut agg = x.to_owned();
        let mut degree = vec![1.0_f32; nodes];

        for (&src, &dst) in edge_index.row(0).iter().zip(edge_index.row(1)) {
            if src >= nodes || dst >= nodes {
                return Err(MlError::ShapeMismatch {
                    what: "edge endpoint",
                    got: src.max(dst),
                    expected: nodes,
                });
            }

            let mut target = agg.row_mut(dst);
            target += &x.row(src);
            degree[dst] += 1.0;
        }

        for (mut row, d) in agg.rows_mut().into_iter().zip(&degree) {
            row /= *d;
        }

        let mut pooled = Array2::zeros((num_graphs, self.features));
        let mut counts = vec![0.0_f32; num_graphs];

        for (node, &graph) in batch.iter().enumerate() {
            if graph >= num_graphs {
                return Err(MlError::ShapeMismatch {
                    what: "graph id",
                    got: graph,
                    expected: num_graphs,
                });
            }

            let mut target = pooled.row_mut(graph);
            target += &agg.row(node);
            counts[graph] += 1.0;
        }

        for (mut row, c) in pooled.rows_mut().into_iter().zip(&counts) {
            if *c > 0.0 {
                row /= *c;
            }
        }

        Ok(pooled)
    }
}

impl Model for GraphConv {
    fn num_params(&self) -> usize {
        self.head.num_params()
    }

    fn forward(&mut self, input: ModelInput<'_>) -> Result<Array2<f32>, MlError> {
        let ModelInput::Graph {
            x,
            edge_index,
            batch,
            num_graphs,
        } = input
        else {
            return Err(MlError::InvalidInput("graph model expects graph input"));
        };

        let pooled = self.pool(x, edge_index, batch, num_graphs)?;
        self.head.forward_dense(pooled.view())
    }

    fn backward(&mut self, d_out: ArrayView2<'_, f32>) -> Result<(), MlError> {
        self.head.backward(d_out)
    }

    fn params_and_grad(&mut self) -> (&mut [f32], &[f32]) {
        self.head.params_and_grad()
    }

    fn flops(&self, input: ModelInput<'_>) -> Result<u64, MlError> {
        let ModelInput::Graph {
            x,
            edge_index,
            num_graphs,
            ..
        } = input
        else {
            return Err(MlError::Unsupported("flop analysis of dense input on a graph model"));
        };

        let nodes = x.nrows() as u64;
        let edges = edge_index.ncols() as u64;
        let features = self.features as u64;

        // neighbour sums, degree normalization, pooling sums
        let message_passing = (edges + 2 * nodes) * features;
        Ok(message_passing + self.head.flops_for_rows(num_graphs))
    }
}
