//! Run Monitoring
//!
//! - [`ExecutionTimeline`]: per-step timing and Gantt chart rendering

pub mod timeline;

pub use timeline::{EventType, ExecutionTimeline, StepSpan, TimelineEvent};
