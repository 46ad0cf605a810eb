//! Suggestion types produced by the advisory engine.

use serde::{Deserialize, Serialize};

/// Confidence attached to a neutral "maintain" sub-suggestion.
pub const NEUTRAL_CONFIDENCE: f64 = 0.5;

/// Aggregate urgency of a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Nothing beyond routine tuning
    Low,
    /// At least one anomaly worth acting on
    Medium,
    /// Exploding or vanishing gradients
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// One recommended action with its evidence and confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advice<A> {
    /// What to do.
    pub action: A,
    /// Evidence behind the action, one line per rule that fired.
    pub reasoning: Vec<String>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

impl<A> Advice<A> {
    /// Advice with a single reason; `confidence` is clamped to `[0, 1]`.
    pub fn new(action: A, reason: impl Into<String>, confidence: f64) -> Self {
        Self {
            action,
            reasoning: vec![reason.into()],
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Neutral advice: keep the current setting.
    pub fn maintain(action: A) -> Self {
        Self::new(
            action,
            "No relevant anomaly detected; keep the current setting.",
            NEUTRAL_CONFIDENCE,
        )
    }
}

/// Learning rate adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum LearningRateAction {
    /// Keep the current learning rate.
    Maintain,
    /// Multiply the learning rate up.
    Increase {
        /// Multiplier, above 1
        factor: f64,
    },
    /// Multiply the learning rate down.
    Decrease {
        /// Multiplier, below 1
        factor: f64,
    },
}

impl LearningRateAction {
    /// Multiplier to apply to the current learning rate.
    pub fn factor(&self) -> f64 {
        match self {
            Self::Maintain => 1.0,
            Self::Increase { factor } | Self::Decrease { factor } => *factor,
        }
    }

    /// New learning rate given the current one.
    pub fn apply(&self, current_lr: f64) -> f64 {
        current_lr * self.factor()
    }
}

impl std::fmt::Display for LearningRateAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Maintain => write!(f, "maintain"),
            Self::Increase { factor } => write!(f, "increase x{factor}"),
            Self::Decrease { factor } => write!(f, "decrease x{factor}"),
        }
    }
}

/// Optimizer families the engine can recommend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    /// Adam
    Adam,
    /// RMSprop
    RmsProp,
    /// SGD with momentum
    SgdMomentum,
    /// Plain SGD
    Sgd,
}

impl std::fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Adam => write!(f, "adam"),
            Self::RmsProp => write!(f, "rmsprop"),
            Self::SgdMomentum => write!(f, "sgd+momentum"),
            Self::Sgd => write!(f, "sgd"),
        }
    }
}

/// Recommended optimizer and its key hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerChoice {
    /// Optimizer family.
    pub optimizer: OptimizerKind,
    /// First-moment decay (Adam)
    pub beta1: Option<f64>,
    /// Momentum (SGD)
    pub momentum: Option<f64>,
}

impl OptimizerChoice {
    /// Adam with the given first-moment decay.
    pub fn adam(beta1: f64) -> Self {
        Self {
            optimizer: OptimizerKind::Adam,
            beta1: Some(beta1),
            momentum: None,
        }
    }

    /// RMSprop with its usual defaults.
    pub fn rmsprop() -> Self {
        Self {
            optimizer: OptimizerKind::RmsProp,
            beta1: None,
            momentum: None,
        }
    }

    /// SGD with the given momentum.
    pub fn sgd_momentum(momentum: f64) -> Self {
        Self {
            optimizer: OptimizerKind::SgdMomentum,
            beta1: None,
            momentum: Some(momentum),
        }
    }
}

/// Structural change to the network.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ArchitectureChange {
    /// Skip connections around deep blocks.
    ResidualConnections,
    /// Batch normalization between layers.
    BatchNormalization,
    /// Layer normalization between layers.
    LayerNormalization,
    /// Clip the global gradient norm.
    GradientClipping {
        /// Norm to clip to
        max_norm: f64,
    },
    /// Re-initialize weights.
    ReInitialization,
}

impl std::fmt::Display for ArchitectureChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResidualConnections => write!(f, "residual connections"),
            Self::BatchNormalization => write!(f, "batch normalization"),
            Self::LayerNormalization => write!(f, "layer normalization"),
            Self::GradientClipping { max_norm } => write!(f, "gradient clipping (max norm {max_norm})"),
            Self::ReInitialization => write!(f, "weight re-initialization"),
        }
    }
}

/// Regularization settings to add.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RegularizationPlan {
    /// Dropout rate to add.
    pub dropout: Option<f64>,
    /// L2 weight decay to add.
    pub weight_decay: Option<f64>,
    /// Whether to add batch normalization.
    pub batch_normalization: bool,
}

impl RegularizationPlan {
    /// Whether nothing is to be added.
    pub fn is_empty(&self) -> bool {
        self.dropout.is_none() && self.weight_decay.is_none() && !self.batch_normalization
    }
}

/// Learning rate schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ScheduleAction {
    /// Keep a constant learning rate.
    Constant,
    /// Multiply the learning rate by `factor` every `step_epochs`.
    StepDecay {
        /// Decay multiplier
        factor: f64,
        /// Epochs between decays
        step_epochs: u32,
    },
    /// Cosine annealing over a fixed period.
    CosineAnnealing {
        /// Length of one cycle in epochs
        period_epochs: u32,
    },
}

impl std::fmt::Display for ScheduleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constant => write!(f, "constant"),
            Self::StepDecay {
                factor,
                step_epochs,
            } => write!(f, "step decay x{factor} every {step_epochs} epochs"),
            Self::CosineAnnealing { period_epochs } => {
                write!(f, "cosine annealing over {period_epochs} epochs")
            }
        }
    }
}

/// Overall urgency and confidence of a suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// Aggregate urgency.
    pub priority: Priority,
    /// Aggregate confidence in `[0, 1]`.
    pub confidence: f64,
    /// Why the priority and confidence came out as they did.
    pub reasoning: Vec<String>,
}

/// Current optimizer settings, as known to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HyperParams {
    /// Current learning rate, if known.
    pub learning_rate: Option<f64>,
    /// Current optimizer, if known.
    pub optimizer: Option<OptimizerKind>,
}

impl HyperParams {
    /// Both settings known.
    pub fn new(learning_rate: f64, optimizer: OptimizerKind) -> Self {
        Self {
            learning_rate: Some(learning_rate),
            optimizer: Some(optimizer),
        }
    }
}

/// Complete advice for one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Learning rate adjustment.
    pub learning_rate: Advice<LearningRateAction>,
    /// Optimizer recommendation.
    pub optimizer: Advice<OptimizerChoice>,
    /// Structural changes; empty when none apply.
    pub architecture: Advice<Vec<ArchitectureChange>>,
    /// Regularization to add.
    pub regularization: Advice<RegularizationPlan>,
    /// Learning rate schedule.
    pub training_schedule: Advice<ScheduleAction>,
    /// Concrete learning rate, when the current one is known.
    pub suggested_learning_rate: Option<f64>,
    /// Aggregate priority and confidence.
    pub overall: Assessment,
    /// Last recorded epoch at the time of analysis.
    pub epoch: Option<u64>,
}

impl Suggestion {
    /// Shorthand for `overall.priority`.
    pub fn priority(&self) -> Priority {
        self.overall.priority
    }

    /// Shorthand for `overall.confidence`.
    pub fn confidence(&self) -> f64 {
        self.overall.confidence
    }

    /// One line per sub-suggestion, prefixed by the aggregate priority.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "[{}] confidence {:.2}",
            self.overall.priority, self.overall.confidence
        )];

        let lr = match self.suggested_learning_rate {
            Some(lr) => format!("{} (-> {:.2e})", self.learning_rate.action, lr),
            None => self.learning_rate.action.to_string(),
        };
        lines.push(format!(
            "  learning rate: {} ({:.2})",
            lr, self.learning_rate.confidence
        ));
        lines.push(format!(
            "  optimizer: {} ({:.2})",
            self.optimizer.action.optimizer, self.optimizer.confidence
        ));

        let changes = if self.architecture.action.is_empty() {
            "none".to_string()
        } else {
            self.architecture
                .action
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        lines.push(format!(
            "  architecture: {} ({:.2})",
            changes, self.architecture.confidence
        ));

        let reg = &self.regularization.action;
        let mut parts = Vec::new();
        if let Some(p) = reg.dropout {
            parts.push(format!("dropout {p}"));
        }
        if let Some(wd) = reg.weight_decay {
            parts.push(format!("weight decay {wd:e}"));
        }
        if reg.batch_normalization {
            parts.push("batch normalization".to_string());
        }
        let reg_text = if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join(", ")
        };
        lines.push(format!(
            "  regularization: {} ({:.2})",
            reg_text, self.regularization.confidence
        ));
        lines.push(format!(
            "  schedule: {} ({:.2})",
            self.training_schedule.action, self.training_schedule.confidence
        ));

        lines
    }
}
