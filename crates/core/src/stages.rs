//! Stage inference: projects a job's `(status, progress_current)` onto the
//! ordered production pipeline shown to the user.
//!
//! The service reports a single progress number, so the per-stage view is
//! derived on every snapshot and never stored.  The projection is a pure
//! function of the stage definitions and the latest snapshot.
//!
//! The service never emits a progress value between 50 and 90: reaching 50
//! means the continuity pass is done and rendering has begun.  The
//! rendering stage is therefore declared with
//! [`StageTrigger::ImpliedFrom`] so it turns active at 50 while its
//! declared threshold stays 60.

use crate::error::CoreError;
use crate::job::{JobSnapshot, JobStatus};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Width of the progress interval `[t, t + 10)` attributed to a stage when
/// locating the stage a failed job stopped in.
pub const FAILED_INTERVAL_WIDTH: u16 = 10;

/// Progress at which the service starts rendering.
pub const RENDER_START_PROGRESS: u8 = 50;

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// How a stage becomes active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTrigger {
    /// Active once progress reaches the declared threshold.
    Threshold,
    /// Active once progress reaches the given earlier value, for stages
    /// the service never reports a distinct progress value for.
    ImpliedFrom(u8),
}

/// One declared pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDefinition {
    pub label: String,
    pub threshold: u8,
    pub trigger: StageTrigger,
}

impl StageDefinition {
    pub fn new(label: impl Into<String>, threshold: u8) -> Self {
        Self {
            label: label.into(),
            threshold,
            trigger: StageTrigger::Threshold,
        }
    }

    /// Declare the stage active from `progress` instead of its threshold.
    pub fn implied_from(mut self, progress: u8) -> Self {
        self.trigger = StageTrigger::ImpliedFrom(progress);
        self
    }

    /// Progress value at which this stage turns active.
    pub fn activation_point(&self) -> u8 {
        match self.trigger {
            StageTrigger::Threshold => self.threshold,
            StageTrigger::ImpliedFrom(p) => p,
        }
    }

    fn failed_interval_contains(&self, progress: u8) -> bool {
        progress >= self.threshold
            && u16::from(progress) < u16::from(self.threshold) + FAILED_INTERVAL_WIDTH
    }
}

/// The story pipeline as displayed to the user.
pub fn story_pipeline() -> Vec<StageDefinition> {
    vec![
        StageDefinition::new("Story Analysis & Script", 10),
        StageDefinition::new("World Building (Series Bible)", 20),
        StageDefinition::new("Scene Planning & Layout", 30),
        StageDefinition::new("Continuity Check", 50),
        StageDefinition::new("Animation & Rendering", 60).implied_from(RENDER_START_PROGRESS),
        StageDefinition::new("Final Assembly", 90),
    ]
}

/// Check that a definition list can be projected.
///
/// Thresholds must be strictly increasing and within 0..=100; implied
/// activation points must not exceed their own threshold and must keep
/// activation points non-decreasing across the list.
pub fn validate_stages(definitions: &[StageDefinition]) -> Result<(), CoreError> {
    if definitions.is_empty() {
        return Err(CoreError::InvalidStageDefinition(
            "at least one stage is required".to_string(),
        ));
    }

    let mut prev: Option<&StageDefinition> = None;
    for def in definitions {
        if def.threshold > 100 {
            return Err(CoreError::InvalidStageDefinition(format!(
                "stage '{}' threshold {} exceeds 100",
                def.label, def.threshold
            )));
        }
        if def.activation_point() > def.threshold {
            return Err(CoreError::InvalidStageDefinition(format!(
                "stage '{}' is implied from {} which is past its threshold {}",
                def.label,
                def.activation_point(),
                def.threshold
            )));
        }
        if let Some(prev) = prev {
            if def.threshold <= prev.threshold {
                return Err(CoreError::InvalidStageDefinition(format!(
                    "stage '{}' threshold {} does not follow '{}' threshold {}",
                    def.label, def.threshold, prev.label, prev.threshold
                )));
            }
            if def.activation_point() < prev.activation_point() {
                return Err(CoreError::InvalidStageDefinition(format!(
                    "stage '{}' would activate before '{}'",
                    def.label, prev.label
                )));
            }
        }
        prev = Some(def);
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Inference
// ---------------------------------------------------------------------------

/// Display state of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Pending,
    Active,
    Completed,
    Failed,
}

impl StageState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Project `(status, progress)` onto the stage list.
///
/// - `completed`: every stage is completed, whatever the progress value.
/// - `failed`: the stage whose interval `[t, t + 10)` holds the progress
///   is failed; failing that, the first stage not yet reached; failing
///   that, the last stage.
/// - otherwise: the stage with the greatest activation point not above
///   the progress is active (ties go to the later stage).
///
/// In every case stages before the marked one are completed and stages
/// after it are pending.
pub fn infer_stages(
    definitions: &[StageDefinition],
    status: JobStatus,
    progress: u8,
) -> Vec<StageState> {
    let count = definitions.len();
    if count == 0 {
        return Vec::new();
    }

    match status {
        JobStatus::Completed => vec![StageState::Completed; count],
        JobStatus::Failed => {
            let idx = failed_index(definitions, progress);
            mark(count, Some(idx), StageState::Failed)
        }
        JobStatus::Queued | JobStatus::Running => {
            mark(count, active_index(definitions, progress), StageState::Active)
        }
    }
}

fn active_index(definitions: &[StageDefinition], progress: u8) -> Option<usize> {
    definitions
        .iter()
        .enumerate()
        .filter(|(_, def)| def.activation_point() <= progress)
        .map(|(idx, _)| idx)
        .last()
}

fn failed_index(definitions: &[StageDefinition], progress: u8) -> usize {
    definitions
        .iter()
        .position(|def| def.failed_interval_contains(progress))
        .or_else(|| definitions.iter().position(|def| def.threshold > progress))
        .unwrap_or(definitions.len() - 1)
}

fn mark(count: usize, marked: Option<usize>, state: StageState) -> Vec<StageState> {
    let Some(marked) = marked else {
        return vec![StageState::Pending; count];
    };
    (0..count)
        .map(|idx| match idx.cmp(&marked) {
            std::cmp::Ordering::Less => StageState::Completed,
            std::cmp::Ordering::Equal => state,
            std::cmp::Ordering::Greater => StageState::Pending,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

/// A stage paired with its derived state, ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageView {
    pub label: String,
    pub threshold: u8,
    pub state: StageState,
}

/// Project a snapshot onto `definitions`, keeping labels alongside states.
pub fn stage_view(definitions: &[StageDefinition], snapshot: &JobSnapshot) -> Vec<StageView> {
    infer_stages(definitions, snapshot.status, snapshot.progress_current)
        .into_iter()
        .zip(definitions)
        .map(|(state, def)| StageView {
            label: def.label.clone(),
            threshold: def.threshold,
            state,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
