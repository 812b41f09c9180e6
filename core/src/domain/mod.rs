// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod call;
pub mod execution;

pub use call::{Call, CallOutcome, CallRowId, CallStatus, PendingCallRequest};
pub use execution::{Execution, ExecutionError, ExecutionId, ExecutionStatus, ResumeGroupId};
