// Copyright 2018 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
//
// Portions Copyright 2017 The Chromium OS Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the THIRD-PARTY file.

//! Legacy PC devices living behind fixed I/O ports.

mod cmos;

pub use self::cmos::{Cmos, CMOS_DATA_PORT, CMOS_INDEX_PORT};
