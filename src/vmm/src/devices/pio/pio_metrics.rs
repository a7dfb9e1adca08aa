// Copyright 2023 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Defines the metrics system for port I/O dispatch.
//!
//! # Metrics format
//! The metrics are flushed in JSON when requested by vmm::logger::METRICS.write().
//!
//! ## JSON example with metrics:
//! ```json
//!  "pio": {
//!     "handled_count": "SharedIncMetric",
//!     "unhandled_count": "SharedIncMetric",
//!     "handler_fails": "SharedIncMetric",
//!     "registration_fails": "SharedIncMetric"
//!  }
//! }
//! ```
//! Each `pio` field in the example above is a serializable `PioMetrics` structure.
//! Port accesses are dispatched by a single bus per guest, so `pio` represents the aggregate
//! metrics of every registered handler.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::logger::SharedIncMetric;

/// Stores aggregated port I/O metrics
pub(crate) static PIO_METRICS: PioMetrics = PioMetrics::new();

/// Called by METRICS.write(), this function facilitates serialization of port I/O metrics.
pub fn flush_metrics<S: Serializer>(serializer: S) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_map(Some(1))?;
    seq.serialize_entry("pio", &PIO_METRICS)?;
    seq.end()
}

/// Port I/O dispatch metrics.
#[derive(Debug, Serialize)]
pub(crate) struct PioMetrics {
    /// Number of accesses completed by a handler.
    pub handled_count: SharedIncMetric,
    /// Number of accesses to ports without a handler.
    pub unhandled_count: SharedIncMetric,
    /// Number of accesses a handler failed.
    pub handler_fails: SharedIncMetric,
    /// Number of rejected handler registrations.
    pub registration_fails: SharedIncMetric,
}

impl PioMetrics {
    /// Const default construction.
    const fn new() -> Self {
        Self {
            handled_count: SharedIncMetric::new(),
            unhandled_count: SharedIncMetric::new(),
            handler_fails: SharedIncMetric::new(),
            registration_fails: SharedIncMetric::new(),
        }
    }
}
