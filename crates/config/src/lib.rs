// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

/// Widest bank a single 32-bit register word can describe.
pub const MAX_BANK_WIDTH: u32 = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BoardError {
    #[error("Unsupported schema_version '{0}'. Supported versions: '1.0'")]
    UnsupportedSchema(String),
    #[error("Board '{0}' declares no GPIO banks")]
    NoBanks(String),
    #[error("Bank '{name}' has start {start} after end {end}")]
    InvertedRange { name: String, start: u32, end: u32 },
    #[error("Bank '{name}' spans {width} pins; at most 32 fit in one register")]
    TooWide { name: String, width: u32 },
    #[error("Banks '{first}' and '{second}' overlap")]
    Overlap { first: String, second: String },
    #[error("Mailbox needs at least one group and one fired slot")]
    EmptyMailbox,
    #[error("IRQs for pins up to {last_pin} from base {irq_base} exceed the 32-bit IRQ space")]
    IrqSpaceOverflow { irq_base: u32, last_pin: u32 },
}

/// Offsets of the nine bank registers relative to a bank's base address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegisterLayout {
    pub out: u64,
    #[serde(rename = "in")]
    pub input: u64,
    pub int_status: u64,
    pub int_clear: u64,
    pub int_en: u64,
    pub int_edge: u64,
    pub int_pos: u64,
    pub oe: u64,
    pub owner: u64,
}

impl Default for RegisterLayout {
    fn default() -> Self {
        Self {
            out: 0x00,
            input: 0x04,
            int_status: 0x08,
            int_clear: 0x0C,
            int_en: 0x10,
            int_edge: 0x14,
            int_pos: 0x18,
            oe: 0x1C,
            owner: 0x20,
        }
    }
}

impl RegisterLayout {
    /// Size of the window covering every register in the layout.
    pub fn window_size(&self) -> u64 {
        [
            self.out,
            self.input,
            self.int_status,
            self.int_clear,
            self.int_en,
            self.int_edge,
            self.int_pos,
            self.oe,
            self.owner,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 4
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct BankConfig {
    pub name: String,
    pub start: u32,
    pub end: u32,
    pub base_address: u64,
    /// Chained interrupt line (top-level IRQ number) this bank reports on.
    pub line: u32,
}

impl BankConfig {
    pub fn width(&self) -> u32 {
        self.end.saturating_sub(self.start).saturating_add(1)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct FunctionBlockConfig {
    pub name: String,
    pub select_address: u64,
    pub config_address: u64,
    pub first: u32,
    pub last: u32,
}

fn default_groups() -> usize {
    2
}

fn default_max_fired() -> usize {
    8
}

fn default_smem_id() -> u32 {
    0x2A
}

fn default_pool_size() -> String {
    "4KB".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MailboxConfig {
    #[serde(default = "default_smem_id")]
    pub smem_id: u32,
    #[serde(default = "default_groups")]
    pub groups: usize,
    #[serde(default = "default_max_fired")]
    pub max_fired: usize,
    /// Capacity of the shared-memory pool the mailbox is carved from, e.g. "4KB".
    #[serde(default = "default_pool_size")]
    pub pool_size: String,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            smem_id: default_smem_id(),
            groups: default_groups(),
            max_fired: default_max_fired(),
            pool_size: default_pool_size(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// Model the controller revision where a write to `int_clear` wipes the
    /// whole status word instead of only the written bits.
    #[serde(default)]
    pub clear_wipes_status: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct BoardDescriptor {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    /// IRQ number of GPIO 0; every pin maps to `irq_base + pin`.
    pub irq_base: u32,
    #[serde(default)]
    pub register_layout: RegisterLayout,
    pub banks: Vec<BankConfig>,
    #[serde(default)]
    pub function_blocks: Vec<FunctionBlockConfig>,
    #[serde(default)]
    pub mailbox: MailboxConfig,
    /// Dump bank registers and mailbox words on every sleep entry.
    #[serde(default)]
    pub debug_sleep: bool,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl BoardDescriptor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read board descriptor at {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let board: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Board Descriptor YAML")?;
        board.validate()?;
        Ok(board)
    }

    pub fn validate(&self) -> std::result::Result<(), BoardError> {
        if self.schema_version != "1.0" {
            return Err(BoardError::UnsupportedSchema(self.schema_version.clone()));
        }
        if self.banks.is_empty() {
            return Err(BoardError::NoBanks(self.name.clone()));
        }
        for bank in &self.banks {
            if bank.start > bank.end {
                return Err(BoardError::InvertedRange {
                    name: bank.name.clone(),
                    start: bank.start,
                    end: bank.end,
                });
            }
            if bank.width() > MAX_BANK_WIDTH {
                return Err(BoardError::TooWide {
                    name: bank.name.clone(),
                    width: bank.width(),
                });
            }
        }

        let last_pin = self.banks.iter().map(|b| b.end).max().unwrap_or(0);
        if last_pin == u32::MAX || self.irq_base.checked_add(last_pin + 1).is_none() {
            return Err(BoardError::IrqSpaceOverflow {
                irq_base: self.irq_base,
                last_pin,
            });
        }

        let mut sorted: Vec<&BankConfig> = self.banks.iter().collect();
        sorted.sort_by_key(|b| b.start);
        for pair in sorted.windows(2) {
            if pair[0].end >= pair[1].start {
                return Err(BoardError::Overlap {
                    first: pair[0].name.clone(),
                    second: pair[1].name.clone(),
                });
            }
            if pair[1].start > pair[0].end + 1 {
                tracing::warn!(
                    "Board '{}': pins {}..{} between '{}' and '{}' belong to no bank",
                    self.name,
                    pair[0].end + 1,
                    pair[1].start - 1,
                    pair[0].name,
                    pair[1].name
                );
            }
        }

        if self.mailbox.groups == 0 || self.mailbox.max_fired == 0 {
            return Err(BoardError::EmptyMailbox);
        }
        Ok(())
    }

    /// Number of pins in the global pin space, i.e. highest pin + 1.
    pub fn pin_count(&self) -> u32 {
        self.banks
            .iter()
            .map(|b| b.end.saturating_add(1))
            .max()
            .unwrap_or(0)
    }

    /// Chained lines in first-seen order.
    pub fn lines(&self) -> Vec<u32> {
        let mut lines = Vec::new();
        for bank in &self.banks {
            if !lines.contains(&bank.line) {
                lines.push(bank.line);
            }
        }
        lines
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Low,
    High,
}

impl From<Level> for bool {
    fn from(level: Level) -> Self {
        matches!(level, Level::High)
    }
}

/// One action in a scenario script.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum ScenarioStep {
    /// Raw `configure(pin, flags)` call; flags are names such as `drive_output`.
    Configure { pin: u32, flags: Vec<String> },
    /// Register a recording handler through the generic interrupt core.
    RequestIrq {
        pin: u32,
        #[serde(default)]
        trigger: Option<String>,
        #[serde(default)]
        wake: bool,
    },
    FreeIrq { pin: u32 },
    SetType { pin: u32, trigger: String },
    SetWake { pin: u32, enable: bool },
    Write { pin: u32, level: Level },
    /// Drive the external pad of an input pin.
    SetLevel { pin: u32, level: Level },
    /// Invoke the chained handler of one physical line.
    HandleLine { line: u32 },
    /// Invoke the chained handler of every line whose hardware output is asserted.
    HandlePending,
    EnterSleep {
        #[serde(default)]
        from_idle: bool,
    },
    /// Coprocessor records a wake event in the mailbox while the core sleeps.
    CoprocessorFire { group: usize, pin: u16 },
    ExitSleep,
    DrainReplay,
    SetFunction {
        pin: u32,
        func: u8,
        #[serde(default)]
        pull: String,
        #[serde(default)]
        drive_ma: Option<u8>,
        #[serde(default)]
        output: Option<Level>,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MailboxArray {
    Enabled,
    Detection,
    Polarity,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DispatchedAssertion {
    pub dispatched: Vec<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MailboxWordDetails {
    pub array: MailboxArray,
    pub index: usize,
    pub expected: u32,
    #[serde(default)]
    pub mask: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MailboxWordAssertion {
    pub mailbox_word: MailboxWordDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RegisterValueDetails {
    pub bank: String,
    pub register: String,
    pub expected: u32,
    #[serde(default)]
    pub mask: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RegisterValueAssertion {
    pub register_value: RegisterValueDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PinLevelDetails {
    pub pin: u32,
    pub level: Level,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PinLevelAssertion {
    pub pin_level: PinLevelDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum ScenarioAssertion {
    Dispatched(DispatchedAssertion),
    MailboxWord(MailboxWordAssertion),
    RegisterValue(RegisterValueAssertion),
    PinLevel(PinLevelAssertion),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScenarioScript {
    pub schema_version: String,
    /// Board descriptor path, resolved relative to the script.
    #[serde(default)]
    pub board: Option<String>,
    pub steps: Vec<ScenarioStep>,
    #[serde(default)]
    pub assertions: Vec<ScenarioAssertion>,
}

impl ScenarioScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open scenario script at {:?}", path.as_ref()))?;
        let script: Self =
            serde_yaml::from_reader(f).context("Failed to parse Scenario Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let script: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Scenario Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }
        if self.steps.is_empty() {
            anyhow::bail!("Scenario must contain at least one step");
        }
        Ok(())
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOARD: &str = r#"
name: "two-bank"
irq_base: 64
banks:
  - name: "bank0"
    start: 0
    end: 15
    base_address: 0xA9200800
    line: 19
  - name: "bank1"
    start: 16
    end: 42
    base_address: 0xA9300C00
    line: 20
"#;

    #[test]
    fn test_board_defaults() {
        let board = BoardDescriptor::from_yaml(BOARD).unwrap();
        assert_eq!(board.schema_version, "1.0");
        assert_eq!(board.pin_count(), 43);
        assert_eq!(board.lines(), vec![19, 20]);
        assert_eq!(board.mailbox.groups, 2);
        assert_eq!(board.mailbox.max_fired, 8);
        assert_eq!(board.register_layout, RegisterLayout::default());
        assert!(!board.simulation.clear_wipes_status);
    }

    #[test]
    fn test_overlapping_banks_rejected() {
        let yaml = BOARD.replace("start: 16", "start: 15");
        let err = BoardDescriptor::from_yaml(&yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("overlap"));
    }

    #[test]
    fn test_wide_bank_rejected() {
        let yaml = BOARD.replace("end: 42", "end: 48");
        let err = BoardDescriptor::from_yaml(&yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("at most 32"));
    }

    #[test]
    fn test_register_layout_override() {
        let yaml = format!(
            "{}register_layout:\n  in: 0x40\n  owner: 0x44\n",
            BOARD.trim_start()
        );
        let board = BoardDescriptor::from_yaml(&yaml).unwrap();
        assert_eq!(board.register_layout.input, 0x40);
        assert_eq!(board.register_layout.owner, 0x44);
        assert_eq!(board.register_layout.out, 0x00);
        assert_eq!(board.register_layout.window_size(), 0x48);
    }

    #[test]
    fn test_scenario_steps_parse() {
        let yaml = r#"
schema_version: "1.0"
steps:
  - op: request_irq
    pin: 29
    trigger: falling
    wake: true
  - op: set_level
    pin: 29
    level: high
  - op: enter_sleep
  - op: coprocessor_fire
    group: 0
    pin: 29
assertions:
  - dispatched: [93]
  - mailbox_word:
      array: enabled
      index: 0
      expected: 0x20000000
"#;
        let script = ScenarioScript::from_yaml(yaml).unwrap();
        assert_eq!(script.steps.len(), 4);
        assert_eq!(
            script.steps[2],
            ScenarioStep::EnterSleep { from_idle: false }
        );
        assert!(matches!(
            script.assertions[1],
            ScenarioAssertion::MailboxWord(_)
        ));
    }

    #[test]
    fn test_scenario_rejects_unknown_version() {
        let yaml = r#"
schema_version: "2.0"
steps:
  - op: exit_sleep
"#;
        let err = ScenarioScript::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("Unsupported schema_version"));
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4KB").unwrap(), 4000);
        assert!(parse_size("lots").is_err());
    }
}
