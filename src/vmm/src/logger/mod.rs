// Copyright 2020 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Crate wide metrics. Logging itself goes through the `log` facade.

mod metrics;

pub use metrics::{IncMetric, Metrics, MetricsError, SharedIncMetric, METRICS};
