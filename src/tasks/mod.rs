//! Task graph: shared work items with dependencies and exclusive claims.

pub mod graph;
pub mod types;

pub use graph::TaskGraph;
pub use types::{FieldChange, NewTask, Task, TaskPatch, TaskStatus};
