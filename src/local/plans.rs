use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use super::LocalError;
use crate::{
    assignment::PlanHandle,
    model::{Model, Parameter, Tensor},
    traits::{PlanExecutor, PlanInput, PlanOutput},
};

/// A plan implemented in-process.
pub type PlanFn = fn(&PlanInput<'_>) -> Result<PlanOutput, LocalError>;

/// A registry of in-process plans, resolved by name.
///
/// By default it holds a `training_plan` which performs one step of mini-batch
/// gradient descent of a softmax regression. See [`softmax_model()`].
#[derive(Clone)]
pub struct LocalPlans {
    plans: HashMap<String, PlanFn>,
}

impl Default for LocalPlans {
    fn default() -> Self {
        Self::empty().with_plan("training_plan", softmax_sgd)
    }
}

impl LocalPlans {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry without any plan.
    pub fn empty() -> Self {
        Self {
            plans: HashMap::new(),
        }
    }

    /// Register `plan` under `name`, replacing any plan of the same name.
    pub fn with_plan(mut self, name: impl Into<String>, plan: PlanFn) -> Self {
        self.plans.insert(name.into(), plan);
        self
    }

    /// Handles of the registered plans, sorted by name.
    pub fn handles(&self) -> Vec<PlanHandle> {
        let mut names: Vec<&String> = self.plans.keys().collect();
        names.sort();
        names.into_iter().map(PlanHandle::new).collect()
    }
}

#[async_trait]
impl PlanExecutor for LocalPlans {
    type Error = LocalError;

    async fn invoke(
        &mut self,
        plan: &str,
        input: PlanInput<'_>,
    ) -> Result<PlanOutput, Self::Error> {
        let run = self
            .plans
            .get(plan)
            .ok_or_else(|| LocalError::UnknownPlan(plan.to_string()))?;
        run(&input)
    }
}

/// The initial model of the softmax regression: a zero `features x classes` weight
/// matrix `w` and a zero bias `b`.
pub fn softmax_model(features: usize, classes: usize) -> Model {
    Model::new(vec![
        Parameter::new("w", Tensor::zeros(vec![features, classes])),
        Parameter::new("b", Tensor::zeros(vec![classes])),
    ])
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, max), (i, v)| {
            if *v > max {
                (i, *v)
            } else {
                (best, max)
            }
        })
        .0
}

/// One gradient descent step over the batch, with the cross-entropy loss. The targets
/// are one-hot encoded.
fn softmax_sgd(input: &PlanInput<'_>) -> Result<PlanOutput, LocalError> {
    let (w, b) = match input.params {
        [w, b] => (w, b),
        params => {
            return Err(LocalError::InvalidInput(format!(
                "expected 2 parameters, got {}",
                params.len()
            )))
        }
    };
    let (features, classes) = match w.shape() {
        [features, classes] => (*features, *classes),
        shape => {
            return Err(LocalError::InvalidInput(format!(
                "weights must be a matrix, got shape {:?}",
                shape
            )))
        }
    };
    if features == 0 || classes == 0 {
        return Err(LocalError::InvalidInput(format!(
            "degenerate weights of shape {:?}",
            w.shape()
        )));
    }
    let rows = input.data.rows()?;
    if b.shape() != [classes]
        || input.data.shape() != [rows, features]
        || input.targets.shape() != [rows, classes]
    {
        return Err(LocalError::InvalidInput(format!(
            "incompatible shapes: w {:?}, b {:?}, data {:?}, targets {:?}",
            w.shape(),
            b.shape(),
            input.data.shape(),
            input.targets.shape()
        )));
    }
    if rows == 0 {
        return Err(LocalError::InvalidInput("empty batch".to_string()));
    }

    let (w_data, b_data) = (w.data(), b.data());
    let mut grad_w = vec![0.0_f32; features * classes];
    let mut grad_b = vec![0.0_f32; classes];
    let mut loss = 0.0_f64;
    let mut correct = 0;

    for (x, t) in input
        .data
        .data()
        .chunks(features)
        .zip(input.targets.data().chunks(classes))
    {
        let logits: Vec<f32> = (0..classes)
            .map(|c| b_data[c] + (0..features).map(|f| x[f] * w_data[f * classes + c]).sum::<f32>())
            .collect();
        let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exp: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f32 = exp.iter().sum();
        let probs: Vec<f32> = exp.iter().map(|e| e / total).collect();

        let label = argmax(t);
        loss -= f64::from(probs[label].max(f32::MIN_POSITIVE)).ln();
        if argmax(&probs) == label {
            correct += 1;
        }

        for c in 0..classes {
            let g = probs[c] - t[c];
            grad_b[c] += g;
            for f in 0..features {
                grad_w[f * classes + c] += x[f] * g;
            }
        }
    }

    let step = input.lr as f32 / rows as f32;
    let new_w: Vec<f32> = w_data
        .iter()
        .zip(grad_w)
        .map(|(v, g)| v - step * g)
        .collect();
    let new_b: Vec<f32> = b_data
        .iter()
        .zip(grad_b)
        .map(|(v, g)| v - step * g)
        .collect();
    debug!("softmax step over {} samples", rows);

    Ok(PlanOutput {
        loss: loss / rows as f64,
        accuracy: correct as f64 / rows as f64,
        params: vec![
            Tensor::new(w.shape().to_vec(), new_w)?,
            Tensor::new(b.shape().to_vec(), new_b)?,
        ],
    })
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::identity::{Role, ScopeId, WorkerId, WorkerIdentity};

    fn worker() -> WorkerIdentity {
        WorkerIdentity {
            worker_id: WorkerId::new("worker"),
            role: Role::Creator,
            scope_id: ScopeId::new("scope"),
        }
    }

    fn input<'a>(worker: &'a WorkerIdentity, params: &'a [Tensor], lr: f64) -> PlanInput<'a> {
        // two separable samples: class 0 on the left, class 1 on the right
        PlanInput {
            worker,
            data: Tensor::new(vec![2, 2], vec![-1.0, 0.0, 1.0, 0.0]).unwrap(),
            targets: Tensor::new(vec![2, 2], vec![1.0, 0.0, 0.0, 1.0]).unwrap(),
            batch_size: 2,
            lr,
            params,
        }
    }

    #[tokio::test]
    async fn test_training_reduces_loss() {
        let mut plans = LocalPlans::default();
        let worker = worker();
        let mut params: Vec<Tensor> = softmax_model(2, 2).tensors().cloned().collect();

        let first = assert_ok!(
            plans
                .invoke("training_plan", input(&worker, &params, 0.5))
                .await
        );
        assert!((first.loss - 2.0_f64.ln()).abs() < 1e-6);
        params = first.params;

        let mut last = first.loss;
        for _ in 0..10 {
            let output = assert_ok!(
                plans
                    .invoke("training_plan", input(&worker, &params, 0.5))
                    .await
            );
            assert!(output.loss < last);
            last = output.loss;
            params = output.params;
        }
        let output = assert_ok!(
            plans
                .invoke("training_plan", input(&worker, &params, 0.5))
                .await
        );
        assert_eq!(output.accuracy, 1.0);
        assert_eq!(output.params.len(), 2);
        assert_eq!(output.params[0].shape(), &[2, 2]);
    }

    #[tokio::test]
    async fn test_unknown_plan() {
        let mut plans = LocalPlans::empty();
        let worker = worker();
        let params: Vec<Tensor> = softmax_model(2, 2).tensors().cloned().collect();
        let err = assert_err!(plans.invoke("training_plan", input(&worker, &params, 0.1)).await);
        assert!(matches!(err, LocalError::UnknownPlan(_)));
    }

    #[tokio::test]
    async fn test_shape_mismatch() {
        let mut plans = LocalPlans::default();
        let worker = worker();
        let params: Vec<Tensor> = softmax_model(3, 2).tensors().cloned().collect();
        let err = assert_err!(plans.invoke("training_plan", input(&worker, &params, 0.1)).await);
        assert!(matches!(err, LocalError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_zero_sized_model() {
        let mut plans = LocalPlans::default();
        let worker = worker();
        for (features, classes) in [(0, 2), (2, 0)].iter().copied() {
            let params: Vec<Tensor> = softmax_model(features, classes).tensors().cloned().collect();
            let input = PlanInput {
                worker: &worker,
                data: Tensor::zeros(vec![2, features]),
                targets: Tensor::zeros(vec![2, classes]),
                batch_size: 2,
                lr: 0.1,
                params: &params,
            };
            let err = assert_err!(plans.invoke("training_plan", input).await);
            assert!(matches!(err, LocalError::InvalidInput(_)));
        }
    }

    #[test]
    fn test_handles() {
        let plans = LocalPlans::default().with_plan("evaluation_plan", softmax_sgd);
        assert_eq!(
            plans.handles(),
            vec![
                PlanHandle::new("evaluation_plan"),
                PlanHandle::new("training_plan")
            ]
        );
    }
}
