// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # aegis-workflow
//!
//! The CLI, HTTP API, and worker binary that wrap
//! [`aegis_workflow_core`]'s embedding API for standalone use: a `start`/
//! `poll`/`complete-call`/`result` surface for driving executions by hand,
//! a `worker` subcommand that runs the steady-state loop in the foreground,
//! a `serve` subcommand that exposes the same operations over HTTP plus the
//! push-executor webhook, and a `migrate` subcommand for the Postgres
//! schema.

pub mod api;
pub mod backend;
pub mod commands;
pub mod webhook;

pub use backend::AnyStore;
