pub mod events;
pub mod graph;
pub mod images;
pub mod latents;
pub mod types;

pub use events::InvocationEvent;
pub use graph::{Graph, GraphExecutionState, GraphNode, LibraryGraph};
pub use images::*;
pub use latents::{LatentsTensor, ShapeMismatch};
pub use types::*;
