// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # aegis-workflow-core
//!
//! Core domain and runtime primitives for the durable workflow
//! orchestrator: the state machine that drives an execution through
//! scheduling, running, waiting-for-calls, resuming, completed, and failed;
//! the durable data model tying an execution to its batches of pending
//! external calls; the concurrency and ordering rules that let multiple
//! workers and call completions interleave safely; and the executor
//! abstraction that dispatches calls locally, through a task queue, or via
//! webhook-driven remote compute.
//!
//! ## Layering
//!
//! ```text
//! worker      -> drives progress by calling orchestrator + store + executor
//! orchestrator -> stateless façade over store + interpreter
//! domain      -> Execution / Call, their invariants and transitions
//! store       -> transactional persistence (in-memory / postgres)
//! executor    -> pluggable call dispatch (local / task-queue / push)
//! interpreter -> the boundary to the sandboxed scripting dialect
//! ```
//!
//! The sandboxed interpreter itself, the relational database engine, and
//! the remote-execution transport are external collaborators; this crate
//! only defines and drives the boundary contracts around them.

pub mod config;
pub mod domain;
pub mod executor;
pub mod interpreter;
pub mod orchestrator;
pub mod store;
pub mod worker;

pub use domain::{Call, CallOutcome, Execution, ExecutionId, ExecutionStatus, ResumeGroupId};
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use store::{Store, StoreError};
pub use worker::WorkerLoop;
