// Copyright 2018 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
//
// Portions Copyright 2017 The Chromium OS Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the THIRD-PARTY file.

//! Dispatch of trapped port I/O instructions to emulated devices.

pub mod pio_metrics;

use std::fmt;
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use self::pio_metrics::PIO_METRICS;
use crate::logger::IncMetric;

/// Errors a device reports for a single port access.
#[derive(Debug, PartialEq, Eq, thiserror::Error, displaydoc::Display)]
pub enum PortIoError {
    /// Unsupported access of {1} bytes at port {0:#x}
    UnsupportedSize(u16, u8),
    /// Port {0:#x} is not implemented by the device
    UnsupportedPort(u16),
    /// Device error: {0}
    Device(String),
}

/// Errors associated with registering handlers on the bus.
#[derive(Debug, PartialEq, Eq, thiserror::Error, displaydoc::Display)]
pub enum PioError {
    /// Invalid port range {0}
    InvalidRange(PortRange),
    /// Port range {0} overlaps {1} used by {2}
    Overlap(PortRange, PortRange, String),
}

/// An inclusive range of I/O ports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{:#x}, {:#x}]", self.start, self.end)
    }
}

impl PortRange {
    pub const fn new(start: u16, end: u16) -> Self {
        PortRange { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    pub fn contains(&self, port: u16) -> bool {
        self.start <= port && port <= self.end
    }

    pub fn overlaps(&self, other: &PortRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// A device emulated behind one or more I/O ports.
///
/// `size` is the access width in bytes (1, 2 or 4). It is passed through as the guest issued it;
/// checking it is up to the device.
pub trait PortIoHandler: Send {
    /// Handles an `in` instruction and returns the value the guest reads.
    fn read(&mut self, port: u16, size: u8) -> Result<u32, PortIoError>;
    /// Handles an `out` instruction.
    fn write(&mut self, port: u16, size: u8, value: u32) -> Result<(), PortIoError>;
}

/// A handler together with the name it is reported under.
#[derive(Clone)]
pub struct PortIoInterface {
    pub handler: Arc<Mutex<dyn PortIoHandler>>,
    pub description: String,
}

impl fmt::Debug for PortIoInterface {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PortIoInterface")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl PortIoInterface {
    pub fn new<D: Into<String>>(handler: Arc<Mutex<dyn PortIoHandler>>, description: D) -> Self {
        PortIoInterface {
            handler,
            description: description.into(),
        }
    }
}

/// How accesses to a range are serviced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PioKind {
    /// Serviced by a device model in the VMM.
    Emulated,
}

/// A registered port range.
#[derive(Clone, Debug)]
pub struct PortIoEntry {
    pub range: PortRange,
    pub interface: PortIoInterface,
    pub kind: PioKind,
}

/// Direction of a port access, from the point of view of the guest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PioDirection {
    In,
    Out,
}

/// Result of dispatching one port access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PioOutcome {
    /// A handler serviced the access.
    Handled,
    /// No handler covers the port. Nothing was read or written.
    Unhandled,
    /// The handler failed the access.
    Error,
}

/// Port I/O dispatch table.
///
/// Entries are sorted by the first port of their range and never overlap, so a port maps to at
/// most one handler.
#[derive(Debug, Default)]
pub struct PortIoBus {
    entries: Vec<PortIoEntry>,
}

impl PortIoBus {
    /// Creates an empty table.
    pub fn new() -> Self {
        PortIoBus {
            entries: Vec::new(),
        }
    }

    /// Registers `interface` for every port in `range`.
    ///
    /// On error the table is left untouched.
    pub fn add_handler(
        &mut self,
        range: PortRange,
        interface: PortIoInterface,
    ) -> Result<(), PioError> {
        self.check_range(&range).map_err(|err| {
            PIO_METRICS.registration_fails.inc();
            err
        })?;

        let idx = self
            .entries
            .partition_point(|entry| entry.range.start < range.start);
        debug!(
            "Registering port range {} for {}",
            range, interface.description
        );
        self.entries.insert(
            idx,
            PortIoEntry {
                range,
                interface,
                kind: PioKind::Emulated,
            },
        );
        Ok(())
    }

    fn check_range(&self, range: &PortRange) -> Result<(), PioError> {
        if !range.is_valid() {
            return Err(PioError::InvalidRange(*range));
        }
        // Only the neighbours at the insertion point can overlap a sorted, disjoint table.
        let idx = self
            .entries
            .partition_point(|entry| entry.range.start < range.start);
        let prev = idx.checked_sub(1).and_then(|i| self.entries.get(i));
        match [prev, self.entries.get(idx)]
            .into_iter()
            .flatten()
            .find(|entry| entry.range.overlaps(range))
        {
            Some(entry) => Err(PioError::Overlap(
                *range,
                entry.range,
                entry.interface.description.clone(),
            )),
            None => Ok(()),
        }
    }

    /// Returns the entry whose range contains `port`.
    pub fn get(&self, port: u16) -> Option<&PortIoEntry> {
        let idx = self
            .entries
            .partition_point(|entry| entry.range.start <= port);
        idx.checked_sub(1)
            .map(|i| &self.entries[i])
            .filter(|entry| entry.range.contains(port))
    }

    /// Dispatches one trapped port access.
    ///
    /// For `In`, `data` receives the value read by the handler on success and is left as is
    /// otherwise. For `Out`, `data` holds the value the guest wrote.
    pub fn emulate_io(
        &self,
        port: u16,
        direction: PioDirection,
        size: u8,
        data: &mut u32,
    ) -> PioOutcome {
        let Some(entry) = self.get(port) else {
            PIO_METRICS.unhandled_count.inc();
            debug!("Unhandled port {:?} access at {:#x}", direction, port);
            return PioOutcome::Unhandled;
        };

        let Ok(mut handler) = entry.interface.handler.lock() else {
            PIO_METRICS.handler_fails.inc();
            warn!(
                "Port {:#x} handler {} is poisoned",
                port, entry.interface.description
            );
            return PioOutcome::Error;
        };

        let result = match direction {
            PioDirection::In => handler.read(port, size).map(|value| *data = value),
            PioDirection::Out => handler.write(port, size, *data),
        };
        match result {
            Ok(()) => {
                PIO_METRICS.handled_count.inc();
                PioOutcome::Handled
            }
            Err(err) => {
                PIO_METRICS.handler_fails.inc();
                warn!(
                    "{} failed port {:?} access at {:#x}: {}",
                    entry.interface.description, direction, port, err
                );
                PioOutcome::Error
            }
        }
    }

    /// Registered entries, sorted by port.
    pub fn iter(&self) -> impl Iterator<Item = &PortIoEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[derive(Default)]
    struct CountingDevice {
        reads: u32,
        writes: Vec<(u16, u8, u32)>,
        fail: bool,
    }

    impl PortIoHandler for CountingDevice {
        fn read(&mut self, port: u16, size: u8) -> Result<u32, PortIoError> {
            if self.fail {
                return Err(PortIoError::UnsupportedSize(port, size));
            }
            self.reads += 1;
            Ok(0xab)
        }

        fn write(&mut self, port: u16, size: u8, value: u32) -> Result<(), PortIoError> {
            if self.fail {
                return Err(PortIoError::UnsupportedPort(port));
            }
            self.writes.push((port, size, value));
            Ok(())
        }
    }

    fn interface(device: &Arc<Mutex<CountingDevice>>, description: &str) -> PortIoInterface {
        PortIoInterface::new(device.clone(), description)
    }

    #[test]
    fn test_unhandled_port() {
        let device = Arc::new(Mutex::new(CountingDevice::default()));
        let mut bus = PortIoBus::new();
        bus.add_handler(PortRange::new(0x60, 0x64), interface(&device, "i8042"))
            .unwrap();

        let mut data = 0xdead_beef;
        assert_eq!(
            bus.emulate_io(0x65, PioDirection::In, 1, &mut data),
            PioOutcome::Unhandled
        );
        assert_eq!(data, 0xdead_beef);
        assert_eq!(
            bus.emulate_io(0x5f, PioDirection::Out, 1, &mut data),
            PioOutcome::Unhandled
        );
        assert_eq!(device.lock().unwrap().reads, 0);
        assert!(device.lock().unwrap().writes.is_empty());
    }

    #[test]
    fn test_dispatch() {
        let device = Arc::new(Mutex::new(CountingDevice::default()));
        let mut bus = PortIoBus::new();
        bus.add_handler(PortRange::new(0x60, 0x64), interface(&device, "i8042"))
            .unwrap();

        let mut data = 0;
        assert_eq!(
            bus.emulate_io(0x60, PioDirection::In, 1, &mut data),
            PioOutcome::Handled
        );
        assert_eq!(data, 0xab);
        assert_eq!(device.lock().unwrap().reads, 1);

        let mut data = 0x1234;
        assert_eq!(
            bus.emulate_io(0x64, PioDirection::Out, 2, &mut data),
            PioOutcome::Handled
        );
        assert_eq!(device.lock().unwrap().writes, vec![(0x64, 2, 0x1234)]);
    }

    #[test]
    fn test_handler_failure() {
        let device = Arc::new(Mutex::new(CountingDevice {
            fail: true,
            ..Default::default()
        }));
        let mut bus = PortIoBus::new();
        bus.add_handler(PortRange::new(0x60, 0x64), interface(&device, "i8042"))
            .unwrap();

        let mut data = 7;
        assert_eq!(
            bus.emulate_io(0x60, PioDirection::In, 4, &mut data),
            PioOutcome::Error
        );
        assert_eq!(data, 7);
        assert_eq!(
            bus.emulate_io(0x61, PioDirection::Out, 1, &mut data),
            PioOutcome::Error
        );
    }

    #[test]
    fn test_poisoned_handler() {
        let device = Arc::new(Mutex::new(CountingDevice::default()));
        let mut bus = PortIoBus::new();
        bus.add_handler(PortRange::new(0x3f8, 0x3ff), interface(&device, "serial"))
            .unwrap();

        let poisoner = device.clone();
        let _ = thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the device lock");
        })
        .join();

        let mut data = 0;
        assert_eq!(
            bus.emulate_io(0x3f8, PioDirection::In, 1, &mut data),
            PioOutcome::Error
        );
    }

    #[test]
    fn test_add_handler_rejects_overlap() {
        let first = Arc::new(Mutex::new(CountingDevice::default()));
        let second = Arc::new(Mutex::new(CountingDevice::default()));
        let mut bus = PortIoBus::new();
        bus.add_handler(PortRange::new(0x60, 0x64), interface(&first, "first"))
            .unwrap();

        assert_eq!(
            bus.add_handler(PortRange::new(0x62, 0x66), interface(&second, "second"))
                .unwrap_err(),
            PioError::Overlap(
                PortRange::new(0x62, 0x66),
                PortRange::new(0x60, 0x64),
                "first".to_string()
            )
        );
        // Overlap on the other side and full containment.
        assert!(bus
            .add_handler(PortRange::new(0x5e, 0x60), interface(&second, "second"))
            .is_err());
        assert!(bus
            .add_handler(PortRange::new(0x0, 0xffff), interface(&second, "second"))
            .is_err());

        assert_eq!(bus.len(), 1);
        let ranges: Vec<PortRange> = bus.iter().map(|entry| entry.range).collect();
        assert_eq!(ranges, vec![PortRange::new(0x60, 0x64)]);
    }

    #[test]
    fn test_add_handler_rejects_invalid_range() {
        let device = Arc::new(Mutex::new(CountingDevice::default()));
        let mut bus = PortIoBus::new();
        assert_eq!(
            bus.add_handler(PortRange::new(0x64, 0x60), interface(&device, "i8042"))
                .unwrap_err(),
            PioError::InvalidRange(PortRange::new(0x64, 0x60))
        );
        assert!(bus.is_empty());
    }

    #[test]
    fn test_entries_stay_sorted() {
        let device = Arc::new(Mutex::new(CountingDevice::default()));
        let mut bus = PortIoBus::new();
        for (start, end) in [(0x3f8, 0x3ff), (0x70, 0x71), (0xcf8, 0xcff), (0x60, 0x64)] {
            bus.add_handler(PortRange::new(start, end), interface(&device, "dev"))
                .unwrap();
        }
        // Single port ranges at both ends of the port space.
        bus.add_handler(PortRange::new(0, 0), interface(&device, "low"))
            .unwrap();
        bus.add_handler(PortRange::new(0xffff, 0xffff), interface(&device, "high"))
            .unwrap();

        let starts: Vec<u16> = bus.iter().map(|entry| entry.range.start).collect();
        assert_eq!(starts, vec![0, 0x60, 0x70, 0x3f8, 0xcf8, 0xffff]);
        assert!(bus.iter().all(|entry| entry.kind == PioKind::Emulated));

        assert_eq!(bus.get(0).unwrap().interface.description, "low");
        assert_eq!(bus.get(0xffff).unwrap().interface.description, "high");
        assert_eq!(bus.get(0x71).unwrap().range, PortRange::new(0x70, 0x71));
        assert!(bus.get(0x72).is_none());
        assert!(bus.get(0x1).is_none());
    }

    #[test]
    fn test_tables_are_independent() {
        let device = Arc::new(Mutex::new(CountingDevice::default()));
        let mut first = PortIoBus::new();
        let second = PortIoBus::new();

        first
            .add_handler(PortRange::new(0x60, 0x64), interface(&device, "i8042"))
            .unwrap();
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());

        let mut data = 0;
        assert_eq!(
            second.emulate_io(0x60, PioDirection::In, 1, &mut data),
            PioOutcome::Unhandled
        );
    }
}
