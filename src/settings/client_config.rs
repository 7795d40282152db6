use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// The training configuration issued by the coordinator for a round.
///
/// # Examples
///
/// **TOML**
/// ```text
/// [job.client_config]
/// batch_size = 32
/// lr = 0.05
/// max_epochs = 2
/// max_updates = 100
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_client_config"))]
pub struct ClientConfig {
    /// Number of samples per batch. The last batch of an epoch may be shorter.
    #[validate(range(min = 1))]
    pub batch_size: usize,
    /// Learning rate handed to the training plan. Must be positive.
    pub lr: f64,
    /// Maximal number of epochs. Defaults to `1`.
    #[serde(default)]
    #[validate(range(min = 1))]
    pub max_epochs: Option<usize>,
    /// Maximal number of updates. Defaults to `max_epochs` full epochs. The tighter of
    /// the two bounds always wins.
    #[serde(default)]
    #[validate(range(min = 1))]
    pub max_updates: Option<usize>,
}

impl ClientConfig {
    pub fn new(batch_size: usize, lr: f64) -> Self {
        Self {
            batch_size,
            lr,
            max_epochs: None,
            max_updates: None,
        }
    }

    pub fn with_max_epochs(mut self, max_epochs: usize) -> Self {
        self.max_epochs = Some(max_epochs);
        self
    }

    pub fn with_max_updates(mut self, max_updates: usize) -> Self {
        self.max_updates = Some(max_updates);
        self
    }

    /// The epoch bound, `1` if unset.
    pub fn max_epochs(&self) -> usize {
        self.max_epochs.unwrap_or(1)
    }

    fn validate_lr(&self) -> Result<(), ValidationError> {
        // the validate attribute only accepts literals, therefore we check the invariants here
        if self.lr.is_finite() && self.lr > 0.0 {
            Ok(())
        } else {
            Err(ValidationError::new("invalid learning rate"))
        }
    }
}

/// A wrapper for validate derive.
fn validate_client_config(c: &ClientConfig) -> Result<(), ValidationError> {
    c.validate_lr()
}
