pub mod queue;
pub mod registry;
pub mod request;
pub mod setup;
pub mod workspace;

pub use queue::{EnqueueError, SetupQueue};
pub use registry::{DemoId, DemoRegistry, DemoStatus, ProcessKind, Side};
pub use request::{ElasticMode, StartRejection, StartRequest};
pub use setup::{Orchestrator, ReloadOutcome, SetupError};
pub use workspace::Workspace;
