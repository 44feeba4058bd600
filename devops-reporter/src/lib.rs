// Copyright (c) The devops-reporter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for mirroring test runs into Azure DevOps Test Plans.
//!
//! The flow is one-directional: a host test runner calls the lifecycle hooks on
//! [`Reporter`](reporter::Reporter) and [`RunService`](service::RunService), which update an
//! in-memory [`ResultAggregator`](reporter::ResultAggregator) and push changes through a
//! [`DevOpsClient`](client::DevOpsClient).
//!
//! Test cases are correlated with the service through their titles: a whole-word `C<digits>`
//! token names the test case, and `[S<digits>]` tokens name its manual steps. See [`extract`].

pub mod client;
pub mod config;
pub mod errors;
pub mod extract;
mod helpers;
pub mod records;
pub mod reporter;
pub mod run_meta;
pub mod service;

pub use helpers::to_eight_digit_hex;
