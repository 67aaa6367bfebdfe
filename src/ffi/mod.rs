//! Foreign-function boundary support
//!
//! Platform clients that live outside Rust report completion through C
//! callbacks keyed by an integer handle. [`registry`] turns those callbacks
//! into awaitable outcomes.

pub mod registry;

pub use registry::{
    global_registry, AsyncOperation, AsyncOperationRegistry, CallbackPair, ErrorTrampoline,
    HandleStatus, Outcome, RegistryError, SuccessTrampoline,
};
