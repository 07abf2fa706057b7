//! Terminal display sink fed from the snapshot bus.

use colored::Colorize;
use parley_types::{Action, AgentSnapshot, Mode, Role};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

/// Print every snapshot until the bus closes.
pub async fn run(mut rx: broadcast::Receiver<AgentSnapshot>) {
    loop {
        match rx.recv().await {
            Ok(snapshot) => println!("{}", render(&snapshot)),
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "display fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// One status block for `snapshot`.
pub fn render(snapshot: &AgentSnapshot) -> String {
    let mode = match snapshot.mode {
        Mode::Navigation => snapshot.mode.to_string().green(),
        Mode::Interaction => snapshot.mode.to_string().yellow(),
    };
    let action = match &snapshot.latest_action {
        Some(action @ Action::Error { .. }) => action.to_string().red().to_string(),
        Some(action) => action.to_string(),
        None => "-".dimmed().to_string(),
    };
    let current = snapshot
        .subgoals
        .last()
        .map(|s| s.description.as_str())
        .unwrap_or("-");

    let mut out = format!(
        "  {} {} ({})  {} {}\n  {} {}",
        "mode".bold(),
        mode,
        snapshot.state,
        "subgoal".bold(),
        current,
        "action".bold(),
        action,
    );
    for turn in &snapshot.recent_transcript {
        let who = match turn.role {
            Role::Robot => "Robot".cyan(),
            Role::Human => "Human".magenta(),
        };
        out.push_str(&format!("\n    [{who}] {}", turn.text));
    }
    out
}
