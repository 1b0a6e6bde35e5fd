//! UI boundary.
//!
//! The core drives a `VerdictSurface`: a meter with an ARIA current value, a
//! verdict text toggle, the sorted label list, a blocking error notification
//! and the start/stop affordances. `TerminalSurface` renders to stderr;
//! `MemorySurface` records what would have been shown.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::camera::Affordances;
use crate::classify::Prediction;
use crate::error::PipelineError;
use crate::verdict::Verdict;

pub trait VerdictSurface: Send {
    /// Meter fill and its `aria-valuenow`.
    fn render_meter(&mut self, percentage: u8, aria_value_now: &str);

    /// `Some(text)` shows the pass message with the "ok" style; `None` clears it.
    fn render_verdict(&mut self, message: Option<&str>);

    /// Diagnostic list, already sorted. Non-authoritative.
    fn render_predictions(&mut self, prediction: &Prediction);

    /// Blocking notification; returns once the user has seen it.
    fn notify_error(&mut self, error: &PipelineError);

    fn render_affordances(&mut self, affordances: Affordances);
}

/// Push one classification result through every verdict-related surface call.
pub fn render_result(
    surface: &mut dyn VerdictSurface,
    prediction: &Prediction,
    verdict: &Verdict,
    pass_message: &str,
) {
    surface.render_meter(verdict.percentage, &verdict.aria_value_now());
    surface.render_verdict(verdict.pass.then_some(pass_message));
    surface.render_predictions(prediction);
}

// ----------------------------------------------------------------------------
// Terminal
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        }
    }

    fn use_pretty(self, is_tty: bool) -> bool {
        is_tty
            && match self {
                UiMode::Pretty | UiMode::Auto => true,
                UiMode::Plain => false,
            }
    }
}

pub struct TerminalSurface {
    meter: Option<ProgressBar>,
    meter_percentage: u8,
    last_verdict: Option<(u8, bool)>,
    verdict_text: Option<String>,
    last_list_at: Option<Instant>,
}

impl TerminalSurface {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        let meter = mode.use_pretty(is_tty).then(|| {
            let bar = ProgressBar::new(100);
            bar.set_draw_target(ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template("{prefix:>4} [{bar:40.green/white}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar
        });
        Self {
            meter,
            meter_percentage: 0,
            last_verdict: None,
            verdict_text: None,
            last_list_at: None,
        }
    }

    fn println(&self, line: &str) {
        match &self.meter {
            Some(bar) => bar.println(line),
            None => eprintln!("{line}"),
        }
    }

    /// Print a boot stage line ("load model", "open camera").
    pub fn stage(&self, name: &str) -> StageGuard {
        self.println(&format!("==> {}", name));
        StageGuard {
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(&mut self) {
        if let Some(bar) = self.meter.take() {
            bar.finish_and_clear();
        }
    }
}

impl VerdictSurface for TerminalSurface {
    fn render_meter(&mut self, percentage: u8, aria_value_now: &str) {
        self.meter_percentage = percentage;
        if let Some(bar) = &self.meter {
            bar.set_position(u64::from(percentage));
            bar.set_prefix(format!("{aria_value_now}%"));
        }
    }

    fn render_verdict(&mut self, message: Option<&str>) {
        self.verdict_text = message.map(str::to_string);
        if let Some(bar) = &self.meter {
            bar.set_message(message.unwrap_or("").to_string());
        }
    }

    fn render_predictions(&mut self, prediction: &Prediction) {
        if prediction.top().is_none() {
            return;
        }
        let state = (self.meter_percentage, self.verdict_text.is_some());
        let stale = self
            .last_list_at
            .map_or(true, |at| at.elapsed() >= Duration::from_secs(1));

        // plain mode prints when the target's verdict changes, at most once a second
        if self.meter.is_none() && stale && self.last_verdict != Some(state) {
            let mut rows: Vec<String> = prediction
                .display_rows()
                .into_iter()
                .map(|(label, pct)| format!("{label}: {pct}"))
                .collect();
            if let Some(text) = &self.verdict_text {
                rows.push(format!("=> {text}"));
            }
            self.println(&rows.join("  "));
            self.last_list_at = Some(Instant::now());
            self.last_verdict = Some(state);
        }
    }

    fn notify_error(&mut self, error: &PipelineError) {
        self.println(&format!("!! {}", error));
    }

    fn render_affordances(&mut self, affordances: Affordances) {
        log::debug!(
            "TerminalSurface: start={} stop={}",
            affordances.start_enabled,
            affordances.stop_enabled
        );
    }
}

impl Drop for TerminalSurface {
    fn drop(&mut self) {
        self.finish();
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        eprintln!("✔ {} ({})", self.name, format_duration(self.start.elapsed()));
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

// ----------------------------------------------------------------------------
// Memory
// ----------------------------------------------------------------------------

/// Everything a `MemorySurface` has been told so far.
#[derive(Clone, Debug, Default)]
pub struct SurfaceSnapshot {
    pub meter_percentage: Option<u8>,
    pub aria_value_now: Option<String>,
    pub verdict_text: Option<String>,
    pub labels: Vec<(String, String)>,
    pub notifications: Vec<String>,
    pub affordances: Option<Affordances>,
    pub results_rendered: u64,
}

/// Headless surface. Clones share one snapshot.
#[derive(Clone, Debug, Default)]
pub struct MemorySurface {
    state: Arc<Mutex<SurfaceSnapshot>>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SurfaceSnapshot {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn update(&self, f: impl FnOnce(&mut SurfaceSnapshot)) {
        match self.state.lock() {
            Ok(mut state) => f(&mut state),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl VerdictSurface for MemorySurface {
    fn render_meter(&mut self, percentage: u8, aria_value_now: &str) {
        self.update(|s| {
            s.meter_percentage = Some(percentage);
            s.aria_value_now = Some(aria_value_now.to_string());
        });
    }

    fn render_verdict(&mut self, message: Option<&str>) {
        self.update(|s| s.verdict_text = message.map(str::to_string));
    }

    fn render_predictions(&mut self, prediction: &Prediction) {
        self.update(|s| {
            s.labels = prediction.display_rows();
            s.results_rendered += 1;
        });
    }

    fn notify_error(&mut self, error: &PipelineError) {
        self.update(|s| s.notifications.push(error.to_string()));
    }

    fn render_affordances(&mut self, affordances: Affordances) {
        self.update(|s| s.affordances = Some(affordances));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ClassScore;
    use crate::verdict::evaluate;

    #[test]
    fn render_result_sets_meter_and_clears_failed_verdict() {
        let mut surface = MemorySurface::new();
        let pass = Prediction::from_scores(vec![ClassScore::new("STEM Teacher", 0.9)]);
        let verdict = evaluate(&pass, "STEM Teacher", 0.5);
        render_result(&mut surface, &pass, &verdict, "yes");

        let snap = surface.snapshot();
        assert_eq!(snap.meter_percentage, Some(90));
        assert_eq!(snap.aria_value_now.as_deref(), Some("90"));
        assert_eq!(snap.verdict_text.as_deref(), Some("yes"));

        let fail = Prediction::from_scores(vec![ClassScore::new("STEM Teacher", 0.1)]);
        let verdict = evaluate(&fail, "STEM Teacher", 0.5);
        render_result(&mut surface, &fail, &verdict, "yes");

        let snap = surface.snapshot();
        assert_eq!(snap.meter_percentage, Some(10));
        assert_eq!(snap.verdict_text, None);
        assert_eq!(snap.results_rendered, 2);
    }

    #[test]
    fn plain_terminal_reprints_when_target_changes_under_same_top_label() {
        let mut surface = TerminalSurface::new(UiMode::Plain, false);
        let first = Prediction::from_scores(vec![
            ClassScore::new("Other", 0.6),
            ClassScore::new("STEM Teacher", 0.4),
        ]);
        let verdict = evaluate(&first, "STEM Teacher", 0.5);
        render_result(&mut surface, &first, &verdict, "yes");
        assert_eq!(surface.last_verdict, Some((40, false)));

        // top label stays at 60%, only the target moves
        surface.last_list_at = None;
        let second = Prediction::from_scores(vec![
            ClassScore::new("Other", 0.6),
            ClassScore::new("STEM Teacher", 0.3),
            ClassScore::new("Student", 0.1),
        ]);
        let verdict = evaluate(&second, "STEM Teacher", 0.5);
        render_result(&mut surface, &second, &verdict, "yes");
        assert_eq!(surface.last_verdict, Some((30, false)));
    }

    #[test]
    fn ui_mode_flag_parsing() {
        assert!(matches!(UiMode::from_flag(Some("plain")), UiMode::Plain));
        assert!(matches!(UiMode::from_flag(Some("pretty")), UiMode::Pretty));
        assert!(matches!(UiMode::from_flag(None), UiMode::Auto));
        assert!(!UiMode::Pretty.use_pretty(false));
    }

    #[test]
    fn durations_format_like_stage_lines() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
