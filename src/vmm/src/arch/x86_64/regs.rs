// Copyright 2018 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
//
// Portions Copyright 2017 The Chromium OS Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the THIRD-PARTY file.

#[cfg(target_arch = "x86_64")]
use kvm_bindings::kvm_regs;
#[cfg(target_arch = "x86_64")]
use kvm_ioctls::VcpuFd;

/// General purpose registers touched when entering the guest kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GpRegister {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
}

/// Errors thrown while setting up the vCPU entry registers.
#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum RegsError {
    /// Failed to get base registers: {0}
    GetBaseRegisters(kvm_ioctls::Error),
    /// Failed to set base registers: {0}
    SetBaseRegisters(kvm_ioctls::Error),
}

/// Register level access to a vCPU, as far as the boot protocol needs it.
pub trait VcpuRegisters {
    /// Sets one of the general purpose registers.
    fn set_gp_register(&mut self, reg: GpRegister, value: u64) -> Result<(), RegsError>;
    /// Sets the address of the first instruction the vCPU executes.
    fn set_instruction_pointer(&mut self, value: u64) -> Result<(), RegsError>;
}

#[cfg(target_arch = "x86_64")]
impl VcpuRegisters for kvm_regs {
    fn set_gp_register(&mut self, reg: GpRegister, value: u64) -> Result<(), RegsError> {
        let slot = match reg {
            GpRegister::Rax => &mut self.rax,
            GpRegister::Rbx => &mut self.rbx,
            GpRegister::Rcx => &mut self.rcx,
            GpRegister::Rdx => &mut self.rdx,
            GpRegister::Rsi => &mut self.rsi,
        };
        *slot = value;
        Ok(())
    }

    fn set_instruction_pointer(&mut self, value: u64) -> Result<(), RegsError> {
        self.rip = value;
        Ok(())
    }
}

#[cfg(target_arch = "x86_64")]
impl VcpuRegisters for VcpuFd {
    fn set_gp_register(&mut self, reg: GpRegister, value: u64) -> Result<(), RegsError> {
        let mut regs = self.get_regs().map_err(RegsError::GetBaseRegisters)?;
        regs.set_gp_register(reg, value)?;
        self.set_regs(&regs).map_err(RegsError::SetBaseRegisters)
    }

    fn set_instruction_pointer(&mut self, value: u64) -> Result<(), RegsError> {
        let mut regs = self.get_regs().map_err(RegsError::GetBaseRegisters)?;
        regs.set_instruction_pointer(value)?;
        self.set_regs(&regs).map_err(RegsError::SetBaseRegisters)
    }
}

/// Configure the registers a 32-bit boot protocol kernel expects on entry.
///
/// # Arguments
///
/// * `vcpu` - Register file of the boot vCPU.
/// * `entry_addr` - Kernel entry point.
/// * `boot_params_addr` - Guest address of the zero page, handed over in `rsi`.
pub fn setup_entry_regs<V: VcpuRegisters + ?Sized>(
    vcpu: &mut V,
    entry_addr: u64,
    boot_params_addr: u64,
) -> Result<(), RegsError> {
    for reg in [GpRegister::Rax, GpRegister::Rbx, GpRegister::Rcx, GpRegister::Rdx] {
        vcpu.set_gp_register(reg, 0)?;
    }
    vcpu.set_instruction_pointer(entry_addr)?;
    vcpu.set_gp_register(GpRegister::Rsi, boot_params_addr)
}
