use std::{convert::Infallible, sync::Arc};

use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::sync::Mutex;

use super::LocalError;
use crate::{dataset::Dataset, model::Tensor, traits::DatasetStore};

/// A store that hands out the dataset it was given, once. Clones share the same slot,
/// so that the dataset can be provided after the store was passed to a state
/// machine.
#[derive(Debug, Clone, Default)]
pub struct StaticDataset(Arc<Mutex<Option<Dataset>>>);

impl StaticDataset {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that holds `dataset`.
    pub fn with_dataset(dataset: Dataset) -> Self {
        Self(Arc::new(Mutex::new(Some(dataset))))
    }

    /// Provide the dataset, replacing any dataset that wasn't loaded yet.
    pub async fn set(&self, dataset: Dataset) {
        *self.0.lock().await = Some(dataset);
    }
}

#[async_trait]
impl DatasetStore for StaticDataset {
    type Error = Infallible;

    async fn load_dataset(&mut self) -> Result<Option<Dataset>, Self::Error> {
        Ok(self.0.lock().await.take())
    }
}

/// Generate a classification dataset of `samples` samples with `features` features,
/// drawn around one random center per class. The targets are one-hot encoded.
pub fn synthetic_dataset(
    samples: usize,
    features: usize,
    classes: usize,
    seed: u64,
) -> Result<Dataset, LocalError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let centers: Vec<Vec<f32>> = (0..classes)
        .map(|_| (0..features).map(|_| rng.gen_range(-2.0..2.0)).collect())
        .collect();

    let mut inputs = Vec::with_capacity(samples * features);
    let mut targets = vec![0.0; samples * classes];
    for i in 0..samples {
        let class = rng.gen_range(0..classes.max(1));
        if let Some(center) = centers.get(class) {
            inputs.extend(center.iter().map(|c| *c + rng.gen_range(-0.5_f32..0.5)));
            targets[i * classes + class] = 1.0;
        }
    }

    let inputs = Tensor::new(vec![samples, features], inputs)?;
    let targets = Tensor::new(vec![samples, classes], targets)?;
    Ok(Dataset::new(inputs, targets)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_dataset() {
        let dataset = synthetic_dataset(50, 3, 4, 7).unwrap();
        assert_eq!(dataset.len(), 50);
        assert_eq!(dataset.inputs().shape(), &[50, 3]);
        assert_eq!(dataset.targets().shape(), &[50, 4]);
        for row in dataset.targets().data().chunks(4) {
            assert_eq!(row.iter().sum::<f32>(), 1.0);
        }
        assert_eq!(dataset, synthetic_dataset(50, 3, 4, 7).unwrap());
    }

    #[tokio::test]
    async fn test_one_shot() {
        let mut store = StaticDataset::new();
        assert_eq!(store.load_dataset().await, Ok(None));
        store.set(synthetic_dataset(5, 2, 2, 0).unwrap()).await;
        assert!(store.load_dataset().await.unwrap().is_some());
        assert_eq!(store.load_dataset().await, Ok(None));
    }
}
