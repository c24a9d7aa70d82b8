//! Workflow graph: node registry, conditional edges, checkpointing, and
//! the driver that executes one node at a time.

mod builder;
mod checkpoint;
mod driver;
mod edges;

pub use builder::{EdgePredicate, GraphError, Workflow, WorkflowBuilder};
pub use checkpoint::{Checkpoint, Checkpointer, CheckpointerError, InMemoryCheckpointer, JsonFileCheckpointer};
pub use driver::{DriverError, InterruptPayload, RunOutcome, SessionInit, WorkflowDriver};
pub use edges::{
    MAX_QUESTIONING_ROUNDS, MAX_SECTION_IMPROVE_ROUNDS, QUESTIONING_HARD_CAP,
    should_deepen, should_improve_sections, should_refine_search, should_revise,
};
