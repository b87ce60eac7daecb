use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::info;
use ml_core::{Dataset, Sample};
use ndarray::{Array1, Array2, ArrayD, IxDyn};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};

use crate::{DataErr, InMemoryDataset, Result};

/// The train and test datasets a source provides.
#[derive(Clone)]
pub struct DataSplits {
    pub train: Arc<dyn Dataset>,
    pub test: Arc<dyn Dataset>,
}

impl std::fmt::Debug for DataSplits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSplits")
            .field("train_len", &self.train.len())
            .field("test_len", &self.test.len())
            .finish()
    }
}

/// Something able to produce the centralized train and test datasets.
pub trait DatasetSource {
    /// # Errors
    /// Returns an error if the datasets cannot be read or generated.
    fn load(&self) -> Result<DataSplits>;
}

/// Sample counts and feature width shared by the synthetic sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticShape {
    pub train: usize,
    pub test: usize,
    pub features: usize,
}

fn normal(mean: f32, std: f32) -> Result<Normal<f32>> {
    Normal::new(mean, std)
        .map_err(|e| DataErr::InvalidConfig(format!("normal({mean}, {std}): {e}")))
}

fn splits(train: Vec<Sample>, test: Vec<Sample>) -> DataSplits {
    DataSplits {
        train: Arc::new(InMemoryDataset::new(train)),
        test: Arc::new(InMemoryDataset::new(test)),
    }
}

/// Gaussian blobs, one per class, centered at `class` on every feature.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticClassification {
    shape: SyntheticShape,
    classes: usize,
    seed: u64,
}

impl SyntheticClassification {
    pub fn new(shape: SyntheticShape, classes: usize, seed: u64) -> Self {
        Self {
            shape,
            classes: classes.max(1),
            seed,
        }
    }

    fn generate(&self, len: usize, rng: &mut StdRng, noise: &Normal<f32>) -> Vec<Sample> {
        (0..len)
            .map(|_| {
                let class = rng.random_range(0..self.classes);
                let x = (0..self.shape.features)
                    .map(|_| class as f32 + noise.sample(rng))
                    .collect();
                Sample::dense(x, class as f32)
            })
            .collect()
    }
}

impl DatasetSource for SyntheticClassification {
    fn load(&self) -> Result<DataSplits> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let noise = normal(0.0, 0.5)?;

        let train = self.generate(self.shape.train, &mut rng, &noise);
        let test = self.generate(self.shape.test, &mut rng, &noise);
        Ok(splits(train, test))
    }
}

/// A noisy linear function of standard normal features.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticRegression {
    shape: SyntheticShape,
    seed: u64,
}

impl SyntheticRegression {
    pub fn new(shape: SyntheticShape, seed: u64) -> Self {
        Self { shape, seed }
    }
}

impl DatasetSource for SyntheticRegression {
    fn load(&self) -> Result<DataSplits> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let std_normal = normal(0.0, 1.0)?;
        let noise = normal(0.0, 0.1)?;

        let weights: Vec<f32> = (0..self.shape.features)
            .map(|_| std_normal.sample(&mut rng))
            .collect();

        let mut generate = |len: usize| -> Vec<Sample> {
            (0..len)
                .map(|_| {
                    let x: Vec<f32> = weights.iter().map(|_| std_normal.sample(&mut rng)).collect();
                    let y = x.iter().zip(&weights).map(|(a, b)| a * b).sum::<f32>()
                        + noise.sample(&mut rng);
                    Sample::dense(x, y)
                })
                .collect()
        };

        let train = generate(self.shape.train);
        let test = generate(self.shape.test);
        Ok(splits(train, test))
    }
}

/// Small ring graphs whose node features are centered at the graph's class.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticGraph {
    shape: SyntheticShape,
    classes: usize,
    seed: u64,
}

impl SyntheticGraph {
    const MIN_NODES: usize = 3;
    const MAX_NODES: usize = 8;

    pub fn new(shape: SyntheticShape, classes: usize, seed: u64) -> Self {
        Self {
            shape,
            classes: classes.max(1),
            seed,
        }
    }

    fn graph(&self, rng: &mut StdRng, noise: &Normal<f32>) -> Sample {
        let nodes = rng.random_range(Self::MIN_NODES..=Self::MAX_NODES);
        let class = rng.random_range(0..self.classes);

        let x = Array2::from_shape_fn((nodes, self.shape.features), |_| {
            class as f32 + noise.sample(rng)
        });

        let mut edge_index = Array2::zeros((2, 2 * nodes));
        for n in 0..nodes {
            let next = (n + 1) % nodes;
            edge_index[[0, 2 * n]] = n;
            edge_index[[1, 2 * n]] = next;
            edge_index[[0, 2 * n + 1]] = next;
            edge_index[[1, 2 * n + 1]] = n;
        }

        Sample::Graph {
            x,
            edge_index,
            y: ArrayD::from_elem(IxDyn(&[]), class as f32),
        }
    }
}

impl DatasetSource for SyntheticGraph {
    fn load(&self) -> Result<DataSplits> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let noise = normal(0.0, 0.5)?;

        let train = (0..self.shape.train).map(|_| self.graph(&mut rng, &noise)).collect();
        let test = (0..self.shape.test).map(|_| self.graph(&mut rng, &noise)).collect();
        Ok(splits(train, test))
    }
}

/// Reads `train.csv` and `test.csv` under a root directory.
///
/// Every non-empty line holds comma separated numbers, the last one being the target. A first
/// line that does not parse is taken as a header and skipped.
#[derive(Debug, Clone)]
pub struct CsvSource {
    root: PathBuf,
}

impl CsvSource {
    pub const TRAIN_FILE: &'static str = "train.csv";
    pub const TEST_FILE: &'static str = "test.csv";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(path: &Path) -> Result<InMemoryDataset> {
        let content = fs::read_to_string(path).map_err(|source| DataErr::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> Result<InMemoryDataset> {
        let parse_err = |line: usize, msg: String| DataErr::Parse {
            path: path.to_path_buf(),
            line,
            msg,
        };

        let mut samples = Vec::new();
        let mut width = None;

        for (i, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let values = line
                .split(',')
                .map(|v| v.trim().parse::<f32>().map_err(|_| v.trim()))
                .collect::<std::result::Result<Vec<_>, _>>();

            let values = match values {
                Ok(values) => values,
                Err(_) if i == 0 => continue,
                Err(v) => return Err(parse_err(i + 1, format!("cannot parse '{v}' as f32"))),
            };

            if values.len() < 2 {
                return Err(parse_err(i + 1, "expected at least one feature and a target".into()));
            }

            match width {
                None => width = Some(values.len()),
                Some(w) if w != values.len() => {
                    return Err(parse_err(
                        i + 1,
                        format!("expected {w} values, got {}", values.len()),
                    ));
                }
                Some(_) => {}
            }

            let mut x = values;
            let y = x.pop().unwrap_or_default();
            samples.push(Sample::Dense {
                x: Array1::from(x),
                y: ArrayD::from_elem(IxDyn(&[]), y),
            });
        }

        if samples.is_empty() {
            return Err(DataErr::EmptyDataset);
        }

        Ok(InMemoryDataset::new(samples))
    }
}

impl DatasetSource for CsvSource {
    fn load(&self) -> Result<DataSplits> {
        let train = Self::read(&self.root.join(Self::TRAIN_FILE))?;
        let test = Self::read(&self.root.join(Self::TEST_FILE))?;

        info!(
            "csv dataset loaded from {}: train={} test={}",
            self.root.display(),
            train.len(),
            test.len()
        );

        Ok(DataSplits {
            train: Arc::new(train),
            test: Arc::new(test),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> SyntheticShape {
        SyntheticShape {
            train: 30,
            test: 10,
            features: 4,
        }
    }

    #[test]
    fn synthetic_sources_are_seeded() {
        let a = SyntheticClassification::new(shape(), 3, 1).load().unwrap();
        let b = SyntheticClassification::new(shape(), 3, 1).load().unwrap();

        assert_eq!(a.train.len(), 30);
        assert_eq!(a.test.len(), 10);
        assert_eq!(a.train.get(7).unwrap(), b.train.get(7).unwrap());
        assert!(a.train.get(7).unwrap().class().unwrap() < 3);
    }

    #[test]
    fn regression_targets_are_continuous() {
        let splits = SyntheticRegression::new(shape(), 2).load().unwrap();
        let sample = splits.train.get(0).unwrap();
        assert_eq!(sample.target().ndim(), 0);
    }

    #[test]
    fn graphs_have_symmetric_ring_edges() {
        let splits = SyntheticGraph::new(shape(), 2, 4).load().unwrap();
        let Sample::Graph { x, edge_index, .. } = splits.train.get(0).unwrap() else {
            panic!("expected a graph sample");
        };

        assert_eq!(x.ncols(), 4);
        assert_eq!(edge_index.ncols(), 2 * x.nrows());
        assert!(edge_index.iter().all(|&n| n < x.nrows()));
    }

    #[test]
    fn csv_skips_header_and_splits_target() {
        let ds = CsvSource::parse(Path::new("t.csv"), "a,b,y\n1,2,0\n\n3,4,1\n").unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(1).unwrap(), Sample::dense(vec![3.0, 4.0], 1.0));
    }

    #[test]
    fn csv_reports_bad_lines() {
        let err = CsvSource::parse(Path::new("t.csv"), "1,2,0\n3,x,1\n").unwrap_err();
        assert!(matches!(err, DataErr::Parse { line: 2, .. }));

        let err = CsvSource::parse(Path::new("t.csv"), "1,2,0\n3,1\n").unwrap_err();
        assert!(matches!(err, DataErr::Parse { line: 2, .. }));
    }

    #[test]
    fn missing_csv_is_an_io_error() {
        let err = CsvSource::new("/nonexistent/fedsim").load().unwrap_err();
        assert!(matches!(err, DataErr::Io { .. }));
    }
}
