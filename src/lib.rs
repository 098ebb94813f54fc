//! `ferry` evaluates tree-shaped values whose tensors live in a remote compute service.
//!
//! Structure is composed on the host while tensor storage and transfer are delegated to the
//! service through a [`Client`](service::Client).
//!
//! ## Key Components
//! 1. **Messages**: [`ValueMessage`](message::ValueMessage) is the portable form of a value,
//!    a tensor or a struct of values; [`codec`] converts tensors to and from host memory.
//! 2. **Service**: [`service`] defines the client boundary, remote handles that release their
//!    allocation when dropped, an in-process host service, and a registry of named platforms.
//! 3. **Executor**: [`executor`] embeds messages in the background and materializes them back,
//!    fanning out one transfer per tensor leaf.
//!
//! ## Features
//! - `native` (default): multi-threaded runtime.
//! - `serde`: serialization of messages.
//! - `trace`: `tracing` spans around transfers and materialization.

pub mod codec;
pub mod executor;
pub mod message;
pub mod num;
pub mod platform;
pub mod service;
pub mod shape;
