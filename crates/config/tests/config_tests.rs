// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use gpiobank_config::{
    BoardDescriptor, Level, MailboxArray, RegisterLayout, ScenarioAssertion, ScenarioScript,
    ScenarioStep,
};
use std::path::PathBuf;

fn configs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../configs")
}

#[test]
fn test_shipped_board_loads() {
    let board = BoardDescriptor::from_file(configs_dir().join("boards/msm7200.yaml")).unwrap();
    assert_eq!(board.banks.len(), 6);
    assert_eq!(board.pin_count(), 122);
    assert_eq!(board.lines(), vec![19, 20]);
    assert_eq!(board.function_blocks[0].name, "tlmm2");
    assert_eq!(board.mailbox.smem_id, 0x2A);
}

#[test]
fn test_shipped_scenarios_load() {
    for entry in std::fs::read_dir(configs_dir().join("scenarios")).unwrap() {
        let path = entry.unwrap().path();
        let script = ScenarioScript::from_file(&path)
            .unwrap_or_else(|e| panic!("{:?}: {:#}", path, e));
        assert_eq!(script.board.as_deref(), Some("../boards/msm7200.yaml"));
        assert!(!script.assertions.is_empty());
    }
}

#[test]
fn test_unknown_board_field_rejected() {
    let yaml = r#"
name: "typo"
banks:
  - name: "a"
    start: 0
    end: 7
    base_address: 0x1000
    line: 3
    irq: 5
"#;
    let err = BoardDescriptor::from_yaml(yaml).unwrap_err();
    assert!(format!("{:#}", err).contains("irq"));
}

#[test]
fn test_empty_mailbox_rejected() {
    let yaml = r#"
name: "no-slots"
banks:
  - name: "a"
    start: 0
    end: 7
    base_address: 0x1000
    line: 3
mailbox:
  max_fired: 0
"#;
    assert!(BoardDescriptor::from_yaml(yaml).is_err());
}

#[test]
fn test_irq_space_overflow_rejected() {
    let yaml = r#"
name: "high-base"
irq_base: 4294967280
banks:
  - name: "a"
    start: 16
    end: 42
    base_address: 0x1000
    line: 3
"#;
    let err = BoardDescriptor::from_yaml(yaml).unwrap_err();
    assert!(format!("{:#}", err).contains("IRQ space"));

    let top = r#"
name: "top-pin"
banks:
  - name: "a"
    start: 4294967295
    end: 4294967295
    base_address: 0x1000
    line: 3
"#;
    assert!(BoardDescriptor::from_yaml(top).is_err());
}

#[test]
fn test_register_layout_window() {
    assert_eq!(RegisterLayout::default().window_size(), 0x24);
}

#[test]
fn test_set_function_step_defaults() {
    let yaml = r#"
schema_version: "1.0"
steps:
  - op: set_function
    pin: 20
    func: 1
  - op: set_function
    pin: 21
    func: 2
    pull: up
    drive_ma: 8
    output: high
"#;
    let script = ScenarioScript::from_yaml(yaml).unwrap();
    assert_eq!(
        script.steps[0],
        ScenarioStep::SetFunction {
            pin: 20,
            func: 1,
            pull: String::new(),
            drive_ma: None,
            output: None,
        }
    );
    assert!(matches!(
        script.steps[1],
        ScenarioStep::SetFunction {
            drive_ma: Some(8),
            output: Some(Level::High),
            ..
        }
    ));
}

#[test]
fn test_assertion_variants() {
    let yaml = r#"
schema_version: "1.0"
steps:
  - op: handle_pending
assertions:
  - dispatched: []
  - mailbox_word:
      array: polarity
      index: 1
      expected: 0x10
      mask: 0xF0
  - register_value:
      bank: "gpio1_0"
      register: "int_en"
      expected: 0
  - pin_level:
      pin: 4
      level: low
"#;
    let script = ScenarioScript::from_yaml(yaml).unwrap();
    assert!(matches!(&script.assertions[0], ScenarioAssertion::Dispatched(a) if a.dispatched.is_empty()));
    match &script.assertions[1] {
        ScenarioAssertion::MailboxWord(a) => {
            assert_eq!(a.mailbox_word.array, MailboxArray::Polarity);
            assert_eq!(a.mailbox_word.mask, Some(0xF0));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(script.assertions[2], ScenarioAssertion::RegisterValue(_)));
    assert!(matches!(script.assertions[3], ScenarioAssertion::PinLevel(_)));
}

#[test]
fn test_unknown_step_rejected() {
    let yaml = r#"
schema_version: "1.0"
steps:
  - op: reboot
"#;
    assert!(ScenarioScript::from_yaml(yaml).is_err());

    let empty = r#"
schema_version: "1.0"
steps: []
"#;
    let err = ScenarioScript::from_yaml(empty).unwrap_err();
    assert!(err.to_string().contains("at least one step"));
}
