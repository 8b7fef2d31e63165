//! Plain-text rendering of snapshots and the stage view.

use cartoon_core::{JobSnapshot, StageState, StageView};

pub fn marker(state: StageState) -> &'static str {
    match state {
        StageState::Completed => "[x]",
        StageState::Active => "[>]",
        StageState::Pending => "[ ]",
        StageState::Failed => "[!]",
    }
}

/// One line per stage, e.g. `  [>] Animation & Rendering`.
pub fn render_stages(stages: &[StageView]) -> String {
    stages
        .iter()
        .map(|stage| format!("  {} {}", marker(stage.state), stage.label))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Status line, e.g. `planning  50%  Building scenes`.
pub fn render_status(snapshot: &JobSnapshot) -> String {
    let mut line = format!(
        "{:<10} {:>3}%",
        snapshot.status_label, snapshot.progress_current
    );
    if !snapshot.message.is_empty() {
        line.push_str("  ");
        line.push_str(&snapshot.message);
    }
    line
}
