// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::bank::BankState;
use crate::metrics::MetricsSnapshot;
use serde::{Deserialize, Serialize};

/// Register words of one bank as read back from hardware.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BankRegisterDump {
    pub out: u32,
    pub input: u32,
    pub int_status: u32,
    pub int_en: u32,
    pub int_edge: u32,
    pub int_pos: u32,
    pub oe: u32,
    pub owner: u32,
}

#[derive(Serialize, Debug, Clone)]
pub struct BankSnapshot {
    pub name: String,
    pub start: u32,
    pub end: u32,
    pub registers: BankRegisterDump,
    pub state: BankState,
}

#[derive(Serialize, Debug, Clone)]
pub struct ControllerSnapshot {
    pub banks: Vec<BankSnapshot>,
    pub metrics: MetricsSnapshot,
}
