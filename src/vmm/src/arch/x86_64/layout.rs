// Copyright 2018 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
//
// Portions Copyright 2017 The Chromium OS Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the THIRD-PARTY file.

/// Magic addresses externally used to lay out x86_64 VMs.

/// Kernel command line maximum size.
pub const CMDLINE_MAX_SIZE: usize = 2048;

/// Start of the high memory.
pub const HIMEM_START: u64 = 0x0010_0000; // 1 MB.

/// Start of the legacy video/BIOS hole below 1 MB.
pub const LEGACY_HOLE_START: u64 = 0x000a_0000;
/// Size of the legacy video/BIOS hole.
pub const LEGACY_HOLE_SIZE: u64 = HIMEM_START - LEGACY_HOLE_START;

/// The VBE protected mode interface only needs mapping when it sits above this address.
pub const VBE_PM_INTERFACE_MIN: u64 = 0xc000;

/// The E820 map always describes the guest physical space up to here.
pub const FIRST_ADDR_PAST_32BITS: u64 = 1 << 32;

/// Size of the 32-bit MMIO gap.
pub const MEM_32BIT_GAP_SIZE: u64 = 768 << 20;
/// The start of the memory area reserved for MMIO devices, such as a frame buffer.
pub const MMIO_MEM_START: u64 = FIRST_ADDR_PAST_32BITS - MEM_32BIT_GAP_SIZE;
/// Size of the MMIO area.
pub const MMIO_MEM_SIZE: u64 = MEM_32BIT_GAP_SIZE;

/// The 'zero page', a.k.a linux kernel bootparams, is page aligned.
pub const ZERO_PAGE_ALIGNMENT: u64 = 0x1000;
