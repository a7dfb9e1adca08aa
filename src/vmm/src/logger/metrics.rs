// Copyright 2020 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Defines the metrics system.
//!
//! # Metrics format
//! The metrics are flushed in JSON, one object per line, every time [`Metrics::write`] is called.
//! Each group of metrics is defined next to the code that updates it and is plugged in through
//! its `flush_metrics` function.
//!
//! The system implements 1 type of metrics:
//! * Shared Incremental Metrics (SharedIncMetrics) - dedicated for the metrics which need a counter
//! (i.e the number of unhandled port accesses). These metrics are reset upon flush.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Serialize, Serializer};

use crate::devices::pio::pio_metrics;

/// Static instance used for handling metrics.
pub static METRICS: Metrics = Metrics::new();

/// Errors associated with metrics.
#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum MetricsError {
    /// Metrics system was already initialized.
    AlreadyInitialized,
    /// {0}
    Serde(String),
    /// Failed to write metrics: {0}
    Write(std::io::Error),
}

/// Writes serialized metrics to a destination set once at startup.
pub struct Metrics {
    metrics_buf: Mutex<Option<Box<dyn Write + Send>>>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Creates a metrics system without a destination.
    pub const fn new() -> Self {
        Metrics {
            metrics_buf: Mutex::new(None),
        }
    }

    /// Sets the destination of the metrics. Can only be called once.
    pub fn init(&self, metrics_dest: Box<dyn Write + Send>) -> Result<(), MetricsError> {
        let mut buf = self
            .metrics_buf
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if buf.is_some() {
            return Err(MetricsError::AlreadyInitialized);
        }
        *buf = Some(metrics_dest);
        Ok(())
    }

    /// Writes the metrics to the destination provided as argument upon initialization.
    ///
    /// Returns `Ok(false)` when the system has not been initialized yet, in which case nothing
    /// is flushed and the counters keep accumulating.
    pub fn write(&self) -> Result<bool, MetricsError> {
        let mut guard = self
            .metrics_buf
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(buf) = guard.as_mut() else {
            return Ok(false);
        };

        let serialized = serde_json::to_string(&SerializeToJson)
            .map_err(|err| MetricsError::Serde(err.to_string()))?;
        buf.write_all(serialized.as_bytes())
            .and_then(|_| buf.write_all(b"\n"))
            .and_then(|_| buf.flush())
            .map_err(MetricsError::Write)?;
        Ok(true)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics::new()
    }
}

/// Serializes every metrics group of the crate.
struct SerializeToJson;

impl Serialize for SerializeToJson {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        pio_metrics::flush_metrics(serializer)
    }
}

/// Used for defining new types of metrics that act as a counter (i.e they are continuously
/// updated by incrementing their value).
pub trait IncMetric {
    /// Adds `value` to the current counter.
    fn add(&self, value: u64);
    /// Increments by 1 unit the current counter.
    fn inc(&self) {
        self.add(1);
    }
    /// Returns current value of the counter.
    fn count(&self) -> u64;
    /// Returns diff of current and old value of the counter.
    /// Mostly used in process of aggregating per device metrics.
    fn fetch_diff(&self) -> u64;
}

/// Representation of a metric that is expected to be incremented from more than one thread, so more
/// synchronization is necessary.
// Updated from every vCPU thread dispatching port I/O.
#[derive(Debug, Default)]
pub struct SharedIncMetric(AtomicU64, AtomicU64);

impl SharedIncMetric {
    /// Const default construction.
    pub const fn new() -> Self {
        Self(AtomicU64::new(0), AtomicU64::new(0))
    }
}

impl IncMetric for SharedIncMetric {
    // While the order specified for this operation is still Relaxed, the actual instruction will
    // be an asm "LOCK; something" and thus atomic across multiple threads, simply because of the
    // fetch_and_add (as opposed to "store(load() + 1)") implementation for atomics.
    fn add(&self, value: u64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    fn count(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn fetch_diff(&self) -> u64 {
        let current = self.0.load(Ordering::Relaxed);
        let previous = self.1.swap(current, Ordering::Relaxed);
        current.saturating_sub(previous)
    }
}

impl Serialize for SharedIncMetric {
    /// Reset counters of each metrics. Here we suppose that Serialize's goal is to help with the
    /// flushing of metrics.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.fetch_diff())
    }
}
