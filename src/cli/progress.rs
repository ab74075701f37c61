use std::time::Instant;

use qaflow::checkpoint::Session;
use qaflow::data::{Phase, Stage};

pub struct ProgressIndicator {
    total: usize,
    completed: usize,
    failed: usize,
    start_time: Instant,
}

impl ProgressIndicator {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            failed: 0,
            start_time: Instant::now(),
        }
    }

    pub fn complete_item(&mut self, name: &str, success: bool, verbose: bool) {
        if success {
            self.completed += 1;
            if verbose {
                println!("✓ {} ({}/{})", name, self.completed + self.failed, self.total);
            }
        } else {
            self.failed += 1;
            eprintln!("✗ {} ({}/{})", name, self.completed + self.failed, self.total);
        }
    }

    pub fn finish(&self) {
        let elapsed = self.start_time.elapsed();
        println!("\n{}", "=".repeat(60));
        println!("Summary:");
        println!("  Total:     {}", self.total);
        println!("  Succeeded: {}", self.completed);
        println!("  Failed:    {}", self.failed);
        println!("  Duration:  {:.2}s", elapsed.as_secs_f64());
        println!("{}", "=".repeat(60));
    }
}

/// Renders the seven stages with done, current and pending markers
pub fn render_tracker(session: &Session, phase: &Phase) -> String {
    let next = session.state.next_stage();
    let mut out = String::new();
    for stage in Stage::ALL {
        let marker = if session.state.is_complete(stage) {
            "✓"
        } else if Some(stage) == next {
            if phase.is_failed() { "✗" } else { "→" }
        } else {
            "⊚"
        };
        out.push_str(&format!("  {} {}\n", marker, stage.label()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_marks_done_current_and_pending() {
        let mut session = Session::new();
        session.state.mark_complete(Stage::SpecGenerated).unwrap();
        let text = render_tracker(&session, &Phase::SpecReady);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 7);
        assert!(lines[0].contains("✓ API Spec Generation"));
        assert!(lines[1].contains("→ Approve API Spec"));
        assert!(lines[6].contains("⊚ Run K6 Tests"));
    }

    #[test]
    fn tracker_marks_failed_stage() {
        let session = Session::new();
        let phase = Phase::Failed {
            state: Box::new(Phase::SpecGenerating),
            cause: "timeout".into(),
        };
        assert!(render_tracker(&session, &phase).starts_with("  ✗ API Spec Generation"));
    }
}
