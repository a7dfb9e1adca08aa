// Copyright 2018 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Implements platform specific functionality.

/// Module for x86_64 guest related functionality.
pub mod x86_64;

pub use crate::arch::x86_64::layout::*;

/// Default (smallest) memory page size for the supported architectures.
pub const PAGE_SIZE: u64 = 4096;
