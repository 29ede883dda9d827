//! Execution Timeline
//!
//! Records when each step of a run starts and finishes, for per-step
//! timing reports and an ASCII Gantt chart.

use std::time::{Duration, Instant};

/// Width of the chart bar area in characters.
const CHART_WIDTH: usize = 50;

/// Width of the step name column.
const NAME_WIDTH: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Started,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct TimelineEvent {
    pub step_name: String,
    pub event_type: EventType,
    /// Offset from the start of the timeline
    pub offset: Duration,
}

/// Span of one step, derived from its start and end events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSpan {
    pub step_name: String,
    pub start: Duration,
    pub end: Duration,
    pub succeeded: bool,
}

impl StepSpan {
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }
}

/// Step timeline of a single workflow run.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: Instant,
}

impl ExecutionTimeline {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
        }
    }

    pub fn record(&mut self, step_name: impl Into<String>, event_type: EventType) {
        self.events.push(TimelineEvent {
            step_name: step_name.into(),
            event_type,
            offset: self.start_time.elapsed(),
        });
    }

    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Finished steps in start order. A step that started but never
    /// finished has no span.
    pub fn spans(&self) -> Vec<StepSpan> {
        let mut spans = Vec::new();
        let mut open: Vec<(&str, Duration)> = Vec::new();

        for event in &self.events {
            match event.event_type {
                EventType::Started => open.push((&event.step_name, event.offset)),
                EventType::Completed | EventType::Failed => {
                    if let Some(pos) = open.iter().position(|(name, _)| *name == event.step_name) {
                        let (name, start) = open.remove(pos);
                        spans.push(StepSpan {
                            step_name: name.to_string(),
                            start,
                            end: event.offset,
                            succeeded: event.event_type == EventType::Completed,
                        });
                    }
                }
            }
        }

        spans.sort_by_key(|span| span.start);
        spans
    }

    /// Step durations in start order.
    pub fn durations(&self) -> Vec<(String, Duration)> {
        self.spans()
            .into_iter()
            .map(|span| {
                let duration = span.duration();
                (span.step_name, duration)
            })
            .collect()
    }

    /// Renders an ASCII Gantt chart, `#` for completed steps and `x` for
    /// failed ones.
    pub fn gantt_chart(&self) -> String {
        let mut output = String::from("\nExecution Timeline:\n\n");

        let spans = self.spans();
        let total = spans
            .iter()
            .map(|span| span.end)
            .max()
            .unwrap_or_default()
            .as_millis();

        if total == 0 {
            return output;
        }

        let scale = CHART_WIDTH as f64 / total as f64;

        for span in &spans {
            let start_pos = (span.start.as_millis() as f64 * scale) as usize;
            let width = ((span.duration().as_millis() as f64 * scale) as usize).max(1);
            let mark = if span.succeeded { "#" } else { "x" };

            let mut bar = " ".repeat(start_pos.min(CHART_WIDTH - 1));
            bar.push_str(&mark.repeat(width.min(CHART_WIDTH - bar.len())));

            output.push_str(&format!(
                "{} |{:width$}| ({} ms)\n",
                truncate(&span.step_name, NAME_WIDTH),
                bar,
                span.duration().as_millis(),
                width = CHART_WIDTH
            ));
        }

        output.push_str(&format!("\nTotal: {} ms\n", total));
        output
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Pads or shortens a step name to exactly `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
