//! Lifecycle control of the continuous jobs.
//!
//! Operators write commands into the [command](crate::store::Namespace::Command)
//! namespace, keyed by job name. A [ControlNode] routes every command to the
//! dispatcher partition owning that job name, which starts the job through a
//! [JobRunner] at most once.
mod command;
mod dispatcher;
mod node;
mod registry;
mod runner;

pub use command::{submit, Action, CommandEntry, CommandError, CommandRecord};
pub use dispatcher::{CommandDispatcher, DispatchError, Transition};
pub use node::ControlNode;
pub use registry::{JobRegistry, JobState};
pub use runner::{JobHandle, JobId, JobRunner, LaunchError};
