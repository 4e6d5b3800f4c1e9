//! `engine` crate: definition resolution, caching, version selection and
//! the invocation/persistence handoff.

pub mod cache;
pub mod dag;
pub mod error;
pub mod invoker;
pub mod materializer;
pub mod models;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod signal;
pub mod source;
pub mod store;
pub mod version;

pub use dag::validate_dag;
pub use error::{
    ExecutionError, RegistrationError, RegistryError, RuntimeError, SourceError, StoreError,
};
pub use invoker::{Invoker, InvokerConfig, NodeRegistry, WorkflowInvoker};
pub use materializer::{DefaultMaterializer, InstanceMaterializer};
pub use models::{Definition, Edge, ExecutionResult, Instance, InstanceStatus, NodeDefinition};
pub use registry::{DefinitionRegistry, RegistryConfig, REGISTRY_CACHE_KEY, REGISTRY_SIGNAL};
pub use runtime::WorkflowRuntime;
pub use session::UnitOfWork;
pub use signal::{Signal, SignalToken};
pub use source::DefinitionSource;
pub use store::{DefinitionStore, InstanceStore};
pub use version::{select, VersionFlags, VersionQuery};

#[cfg(test)]
mod cache_tests;
#[cfg(test)]
mod invoker_tests;
