// Copyright 2018 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
//
// Portions Copyright 2017 The Chromium OS Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the THIRD-PARTY file.

//! Emulated devices and the port I/O bus they hang off.

pub mod legacy;
pub mod pio;

pub use self::pio::{
    PioDirection, PioError, PioKind, PioOutcome, PortIoBus, PortIoEntry, PortIoError,
    PortIoHandler, PortIoInterface, PortRange,
};
