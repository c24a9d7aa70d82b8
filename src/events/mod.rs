//! Run-scoped event stream: progress, per-stage results, diagnostics, and
//! terminal signals, fanned out to pluggable sinks.

mod bus;
mod event;
mod sink;

pub use bus::{EventBus, EventEmitter, EventStream};
pub use event::{Event, EventKind, stage_progress};
pub use sink::{ChannelSink, EventSink, StdOutSink, TaskManagerSink};
