// Copyright (c) The devops-reporter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A client for the test run and test result APIs.
//!
//! The main type here is [`DevOpsClient`]. It holds connection state only: the active run is
//! tracked in a [`RunContext`](crate::run_meta::RunContext) that callers pass into each
//! operation.

mod imp;
#[cfg(test)]
pub(crate) mod test_helpers;
mod transport;
mod wire;

pub use imp::*;
pub use transport::*;
pub use wire::{Attachment, ResultHandle, RunHandle, RunState};
