// Copyright 2018 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Guest side of the x86 boot protocol: memory layout and the entry register state.

pub mod layout;
pub mod regs;
