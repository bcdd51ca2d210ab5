// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod scenario;

use clap::{Parser, Subcommand};
use gpiobank_config::{BoardDescriptor, ScenarioAssertion, ScenarioScript};
use gpiobank_core::metrics::MetricsSnapshot;
use gpiobank_core::snapshot::ControllerSnapshot;
use gpiobank_core::MailboxGeometry;
use scenario::Session;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const RESULT_SCHEMA_VERSION: &str = "1.0";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "MSM GPIO bank controller simulator",
    long_about = None
)]
struct Cli {
    /// Enable debug-level logging of register and interrupt activity
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Deterministic, CI-friendly scenario runner driven by a script (YAML).
    Run(RunArgs),

    /// Print the pin, IRQ and mailbox layout of a board.
    Layout(LayoutArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the board descriptor (YAML); overrides the script's `board`
    #[arg(short = 'b', long)]
    board: Option<PathBuf>,

    /// Path to the scenario script (YAML)
    #[arg(short = 'c', long)]
    script: PathBuf,

    /// Directory to write run artifacts (result.json, snapshot.json)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Back the sleep mailbox with a mapped file instead of the heap pool
    #[arg(long)]
    smem_file: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct LayoutArgs {
    /// Path to the board descriptor (YAML)
    #[arg(short = 'b', long)]
    board: PathBuf,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct RunResult {
    result_schema_version: String,
    status: String,
    steps_executed: u64,
    dispatched: Vec<u32>,
    metrics: MetricsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    assertions: Vec<AssertionResult>,
    config: RunConfig,
}

#[derive(Debug, Serialize, Clone)]
struct AssertionResult {
    assertion: ScenarioAssertion,
    passed: bool,
}

#[derive(Debug, Serialize, Clone)]
struct RunConfig {
    board: Option<PathBuf>,
    script: PathBuf,
}

#[derive(Debug, Serialize)]
struct BoardLayout {
    name: String,
    irq_base: u32,
    banks: Vec<BankLayout>,
    mailbox: MailboxLayout,
}

#[derive(Debug, Serialize)]
struct BankLayout {
    name: String,
    first_gpio: u32,
    last_gpio: u32,
    first_irq: u32,
    last_irq: u32,
    line: u32,
    base_address: u64,
}

#[derive(Debug, Serialize)]
struct MailboxLayout {
    smem_id: u32,
    groups: usize,
    max_fired: usize,
    words_per_array: usize,
    bytes: usize,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    match cli.command {
        Commands::Run(args) => run_scenario(args),
        Commands::Layout(args) => print_layout(args),
    }
}

fn run_scenario(args: RunArgs) -> ExitCode {
    let script = match ScenarioScript::from_file(&args.script) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            write_config_error_outputs(&args, None, msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let board_path = match args.board.clone().or_else(|| {
        script
            .board
            .as_deref()
            .map(|b| resolve_script_path(&args.script, b))
    }) {
        Some(p) => p,
        None => {
            let msg = "Missing board descriptor: pass --board or set `board` in the script"
                .to_string();
            error!("{}", msg);
            write_config_error_outputs(&args, None, msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let board = match BoardDescriptor::from_file(&board_path) {
        Ok(b) => b,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            write_config_error_outputs(&args, Some(&board_path), msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let mut session = match Session::new(&board, args.smem_file.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            write_config_error_outputs(&args, Some(&board_path), msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    info!(
        "Running {} steps on board '{}'",
        script.steps.len(),
        board.name
    );

    let mut steps_executed = 0u64;
    let mut message = None;
    for (i, step) in script.steps.iter().enumerate() {
        tracing::debug!("step {}: {:?}", i, step);
        if let Err(e) = session.execute(step) {
            let msg = format!("Step {} ({:?}) failed: {:#}", i, step, e);
            error!("{}", msg);
            message = Some(msg);
            break;
        }
        steps_executed += 1;
    }

    let (status, assertions, code) = if message.is_some() {
        ("error", Vec::new(), EXIT_RUNTIME_ERROR)
    } else {
        let mut results = Vec::new();
        let mut all_passed = true;
        for assertion in &script.assertions {
            let passed = match session.check(assertion) {
                Ok(p) => p,
                Err(e) => {
                    error!("Assertion {:?} could not be evaluated: {:#}", assertion, e);
                    false
                }
            };
            if !passed {
                error!("Assertion failed: {:?}", assertion);
                all_passed = false;
            }
            results.push(AssertionResult {
                assertion: assertion.clone(),
                passed,
            });
        }
        if all_passed {
            ("pass", results, EXIT_PASS)
        } else {
            ("fail", results, EXIT_ASSERT_FAIL)
        }
    };

    let result = RunResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        steps_executed,
        dispatched: session.dispatched(),
        metrics: session.ctrl.metrics().snapshot(),
        message,
        assertions,
        config: RunConfig {
            board: Some(board_path),
            script: args.script.clone(),
        },
    };
    info!(
        "Scenario {}: {} steps, {} dispatches",
        status,
        steps_executed,
        result.dispatched.len()
    );

    write_outputs(&args, &result, Some(&session.ctrl.snapshot()));
    ExitCode::from(code)
}

fn write_outputs(args: &RunArgs, result: &RunResult, snapshot: Option<&ControllerSnapshot>) {
    let Some(output_dir) = &args.output_dir else {
        return;
    };
    if let Err(e) = std::fs::create_dir_all(output_dir) {
        error!("Failed to create output directory {:?}: {}", output_dir, e);
        return;
    }

    let result_path = output_dir.join("result.json");
    match std::fs::File::create(&result_path) {
        Ok(f) => {
            if let Err(e) = serde_json::to_writer_pretty(f, result) {
                error!("Failed to write result.json: {}", e);
            }
        }
        Err(e) => error!("Failed to create result.json: {}", e),
    }

    if let Some(snapshot) = snapshot {
        let snapshot_path = output_dir.join("snapshot.json");
        match std::fs::File::create(&snapshot_path) {
            Ok(f) => {
                if let Err(e) = serde_json::to_writer_pretty(f, snapshot) {
                    error!("Failed to write snapshot.json: {}", e);
                }
            }
            Err(e) => error!("Failed to create snapshot.json: {}", e),
        }
    }
}

fn write_config_error_outputs(args: &RunArgs, board: Option<&PathBuf>, message: String) {
    let result = RunResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: "error".to_string(),
        steps_executed: 0,
        dispatched: Vec::new(),
        metrics: MetricsSnapshot::default(),
        message: Some(message),
        assertions: Vec::new(),
        config: RunConfig {
            board: board.cloned().or_else(|| args.board.clone()),
            script: args.script.clone(),
        },
    };
    write_outputs(args, &result, None);
}

fn print_layout(args: LayoutArgs) -> ExitCode {
    let board = match BoardDescriptor::from_file(&args.board) {
        Ok(b) => b,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let geometry = MailboxGeometry::for_pins(
        board.pin_count(),
        board.mailbox.groups,
        board.mailbox.max_fired,
    );
    let layout = BoardLayout {
        name: board.name.clone(),
        irq_base: board.irq_base,
        banks: board
            .banks
            .iter()
            .map(|b| BankLayout {
                name: b.name.clone(),
                first_gpio: b.start,
                last_gpio: b.end,
                first_irq: board.irq_base + b.start,
                last_irq: board.irq_base + b.end,
                line: b.line,
                base_address: b.base_address,
            })
            .collect(),
        mailbox: MailboxLayout {
            smem_id: board.mailbox.smem_id,
            groups: geometry.groups,
            max_fired: geometry.max_fired,
            words_per_array: geometry.words,
            bytes: geometry.byte_len(),
        },
    };

    if args.json {
        match serde_json::to_string_pretty(&layout) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                error!("Failed to serialize layout: {}", e);
                return ExitCode::from(EXIT_RUNTIME_ERROR);
            }
        }
    } else {
        println!("Board: {} (irq base {})", layout.name, layout.irq_base);
        println!(
            "{:<10} {:>9} {:>11} {:>5} {:>12}",
            "bank", "gpios", "irqs", "line", "base"
        );
        for b in &layout.banks {
            println!(
                "{:<10} {:>4}-{:<4} {:>5}-{:<5} {:>5} {:#012x}",
                b.name, b.first_gpio, b.last_gpio, b.first_irq, b.last_irq, b.line, b.base_address
            );
        }
        println!(
            "Mailbox: smem id {:#x}, {} words per array, {} groups x {} fired, {} bytes",
            layout.mailbox.smem_id,
            layout.mailbox.words_per_array,
            layout.mailbox.groups,
            layout.mailbox.max_fired,
            layout.mailbox.bytes
        );
    }
    ExitCode::from(EXIT_PASS)
}

fn resolve_script_path(script_path: &Path, value: &str) -> PathBuf {
    let p = PathBuf::from(value);
    if p.is_absolute() {
        return p;
    }
    script_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(p)
}
