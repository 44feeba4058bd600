// Copyright (c) The devops-reporter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mirrors test runner events into a test run.
//!
//! The host runner drives a [`Reporter`] through its lifecycle hooks, either directly or by
//! replaying a stream of [`RunnerEvent`]s. Each hook updates a [`ResultAggregator`] and uploads the
//! records that changed.

mod aggregator;
mod events;
mod imp;
mod screenshot;

pub use aggregator::ResultAggregator;
pub use events::*;
pub use imp::*;
pub use screenshot::*;
