// Copyright 2020 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

/// Allocator and mapping contract for guest physical address space outside of RAM.
pub mod resources;
