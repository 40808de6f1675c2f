//! View model of the results screen and its plain-text rendering.

use std::fmt::Write as _;

use crate::aggregate::{bar_width_pct, Aggregate, SpeedClass};
use crate::session::{HistoricalAverage, Mode, SessionInput};

pub const REPEAT_LABEL: &str = "Repeat Lesson";
pub const ADVANCE_LABEL: &str = "Next Lesson";
pub const ACTION_HINTS: &str = "Tab: Repeat Lesson, Enter: Next Lesson";
pub const NO_DATA: &str = "No data";

/// `MM:SS`, minutes and seconds both floored.
pub fn format_clock(total_secs: f64) -> String {
    let total = if total_secs.is_finite() { total_secs.max(0.0) } else { 0.0 };
    let minutes = (total / 60.0).floor() as u64;
    let seconds = (total % 60.0).floor() as u64;
    format!("{:02}:{:02}", minutes, seconds)
}

/// Hover text next to the clock.
pub fn format_precise(total_secs: f64) -> String {
    format!("{:.2}s", total_secs)
}

pub fn title(completed: bool, mode: Mode) -> &'static str {
    match (completed, mode) {
        (false, _) => "Level Incomplete",
        (true, Mode::Send) => "Sending Practice Complete!",
        (true, Mode::Copy) => "Level Complete!",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeCell {
    pub avg_secs: f64,
    pub speed: SpeedClass,
    pub bar_width_pct: f64,
}

impl TimeCell {
    pub fn new(avg_secs: f64) -> Self {
        Self {
            avg_secs,
            speed: SpeedClass::classify(avg_secs),
            bar_width_pct: bar_width_pct(avg_secs),
        }
    }

    pub fn label(&self) -> String {
        format!("{:.2}s", self.avg_secs)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeRow {
    pub character: char,
    pub current: TimeCell,
    /// `None` renders as "No data" when the history column is shown.
    pub history: Option<TimeCell>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Struggle {
    pub character: char,
    pub count: u32,
}

impl Struggle {
    pub fn label(&self) -> String {
        let plural = if self.count > 1 { "s" } else { "" };
        format!("{}: {} mistake{}", display_char(self.character), self.count, plural)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub label: &'static str,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryView {
    pub title: &'static str,
    pub clock: String,
    pub clock_precise: String,
    /// Only in copy mode.
    pub replays: Option<u32>,
    pub struggles: Vec<Struggle>,
    pub show_history: bool,
    pub rows: Vec<TimeRow>,
    pub repeat: Action,
    pub advance: Action,
    pub hints: &'static str,
}

fn display_char(c: char) -> String {
    c.to_uppercase().collect()
}

impl SummaryView {
    pub fn build(input: &SessionInput, history: Option<&HistoricalAverage>) -> Self {
        let agg = Aggregate::compute(&input.samples, &input.mistakes);
        let show_history = history.map_or(false, |h| !h.is_empty());
        let rows = agg
            .averages
            .iter()
            .map(|(&character, &avg)| TimeRow {
                character,
                current: TimeCell::new(avg),
                history: history
                    .filter(|_| show_history)
                    .and_then(|h| h.get(&character))
                    .map(|&h| TimeCell::new(h)),
            })
            .collect();

        Self {
            title: title(input.completed, input.mode),
            clock: format_clock(input.elapsed_seconds),
            clock_precise: format_precise(input.elapsed_seconds),
            replays: (input.mode == Mode::Copy).then_some(input.replay_count),
            struggles: agg
                .mistakes
                .into_iter()
                .map(|(character, count)| Struggle { character, count })
                .collect(),
            show_history,
            rows,
            repeat: Action { label: REPEAT_LABEL, enabled: true },
            advance: Action { label: ADVANCE_LABEL, enabled: input.completed },
            hints: ACTION_HINTS,
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.title);
        let _ = writeln!(out, "Time: {} ({})", self.clock, self.clock_precise);
        if let Some(replays) = self.replays {
            let _ = writeln!(out, "Replays: {}", replays);
        }

        if !self.struggles.is_empty() {
            let _ = writeln!(out, "\nCharacters you struggled with:");
            for s in &self.struggles {
                let _ = writeln!(out, "  {}", s.label());
            }
        }

        let _ = writeln!(out, "\nAverage Response Times");
        if self.show_history {
            let _ = writeln!(out, "  {:<5}{:<32}{}", "Char", "This Test", "Your History");
        } else {
            let _ = writeln!(out, "  {:<5}{}", "Char", "This Test");
        }
        for row in &self.rows {
            let current = render_cell(&row.current);
            let _ = if self.show_history {
                let history = row.history.as_ref().map(render_cell).unwrap_or_else(|| NO_DATA.to_string());
                writeln!(out, "  {:<5}{:<32}{}", display_char(row.character), current, history)
            } else {
                writeln!(out, "  {:<5}{}", display_char(row.character), current)
            };
        }

        let advance = if self.advance.enabled {
            format!("[{}]", self.advance.label)
        } else {
            format!("({} - locked)", self.advance.label)
        };
        let _ = writeln!(out, "\n[{}] {}", self.repeat.label, advance);
        let _ = writeln!(out, "{}", self.hints);
        out
    }
}

/// Ten-slot bar, one slot per 10% of width.
fn render_cell(cell: &TimeCell) -> String {
    let filled = (cell.bar_width_pct / 10.0).round() as usize;
    format!(
        "{:<10} {:>6} {}",
        "#".repeat(filled.min(10)),
        cell.label(),
        cell.speed.as_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MistakeTally, ResponseSample};

    fn input(completed: bool, mode: Mode) -> SessionInput {
        SessionInput {
            completed,
            elapsed_seconds: 125.678,
            replay_count: 4,
            mistakes: [('a', 2), ('b', 0), ('c', 1)].into_iter().collect(),
            samples: vec![
                ResponseSample::new('b', 3.5),
                ResponseSample::new('a', 0.5),
                ResponseSample::new('a', 0.9),
            ],
            lesson_id: "l1".to_string(),
            mode,
        }
    }

    #[test]
    fn test_clock_formatting() {
        assert_eq!(format_clock(0.0), "00:00");
        assert_eq!(format_clock(59.99), "00:59");
        assert_eq!(format_clock(125.678), "02:05");
        assert_eq!(format_clock(6000.0), "100:00");
        assert_eq!(format_precise(125.678), "125.68s");
    }

    #[test]
    fn test_titles() {
        assert_eq!(title(false, Mode::Send), "Level Incomplete");
        assert_eq!(title(true, Mode::Copy), "Level Complete!");
        assert_eq!(title(true, Mode::Send), "Sending Practice Complete!");
    }

    #[test]
    fn test_copy_mode_view_without_history() {
        let view = SummaryView::build(&input(true, Mode::Copy), None);
        assert_eq!(view.replays, Some(4));
        assert!(!view.show_history);
        assert_eq!(view.rows.iter().map(|r| r.character).collect::<Vec<_>>(), vec!['a', 'b']);
        assert!(view.rows.iter().all(|r| r.history.is_none()));
        assert_eq!(view.struggles[0].label(), "A: 2 mistakes");
        assert_eq!(view.struggles[1].label(), "C: 1 mistake");
        assert!(view.advance.enabled);
        assert_eq!(view.rows[1].current.bar_width_pct, 70.0);
    }

    #[test]
    fn test_send_mode_hides_replays_and_locks_advance() {
        let view = SummaryView::build(&input(false, Mode::Send), None);
        assert_eq!(view.replays, None);
        assert!(!view.advance.enabled);
        assert!(view.repeat.enabled);
    }

    #[test]
    fn test_history_column_and_missing_chars() {
        let history: HistoricalAverage = [('a', 1.25), ('z', 0.3)].into_iter().collect();
        let view = SummaryView::build(&input(true, Mode::Copy), Some(&history));
        assert!(view.show_history);
        let a = view.rows[0].history.as_ref().unwrap();
        assert_eq!(a.label(), "1.25s");
        assert_eq!(a.speed, SpeedClass::Medium);
        assert!(view.rows[1].history.is_none());

        let text = view.render_text();
        assert!(text.contains("Your History"));
        assert!(text.contains(NO_DATA));
    }

    #[test]
    fn test_empty_history_hides_column() {
        let view = SummaryView::build(&input(true, Mode::Copy), Some(&HistoricalAverage::new()));
        assert!(!view.show_history);
        assert!(!view.render_text().contains("Your History"));
    }

    #[test]
    fn test_empty_session_renders() {
        let empty = SessionInput { lesson_id: "l".to_string(), mistakes: MistakeTally::new(), ..Default::default() };
        let view = SummaryView::build(&empty, None);
        assert!(view.rows.is_empty());
        assert!(view.struggles.is_empty());
        assert!(view.render_text().contains("Average Response Times"));
    }
}
