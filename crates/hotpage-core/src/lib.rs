#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod css;
pub mod entries;
pub mod error;
pub mod graph;
pub mod hmr;
pub mod scheduler;
pub mod session;
pub mod transform;
pub mod watch;

pub use config::{BuildMode, HotpageConfig};
pub use entries::{EntryOptions, EntrySet, Route};
pub use error::{ConfigurationError, Error, TransformError};
pub use graph::{DependencyGraph, DependencyMetadata};
pub use hmr::{HmrMessage, LiveChannel};
pub use scheduler::{ChangeKind, CycleOutcome, FileChange, Scheduler, SchedulerEvent};
pub use session::{ArtifactSet, BuildOptions, BuildResult, BundlerSession, ServedArtifacts};
pub use watch::{ProjectWatcher, WatchError};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
