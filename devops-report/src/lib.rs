// Copyright (c) The devops-reporter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line host for reporting test runs to Azure DevOps Test Plans.
//!
//! The library side of this crate lives in `devops-reporter`. This binary wires it to a config
//! file, a terminal logger and a JSON-lines stream of test runner events.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
pub use output::{LOG_ENV, OutputContext, StderrStyles};
