//! vlm-phone-agent - drive an Android phone from a vision-language model
//!
//! Run with: cargo run --bin vlm-phone-agent -- "打开抖音极速版"

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use vlm_phone_agent::config::{get_messages, Messages};
use vlm_phone_agent::logging::init_tracing;
use vlm_phone_agent::{
    AgentRunner, AppSettings, CoordinateSpace, Device, RunOutcome, StepCallback, StepRecord,
};

#[derive(Parser)]
#[command(name = "vlm-phone-agent")]
#[command(version)]
#[command(about = "Drive an Android phone over ADB from a vision-language model")]
#[command(long_about = r#"
Drive an Android phone over ADB from a vision-language model.

Each step captures a screenshot, asks the model for its next
Thought/Action, and performs the action on the device.

EXAMPLES:
  vlm-phone-agent "打开抖音极速版"
  vlm-phone-agent --lang en --max-steps 30 "open settings and enable wifi"
  vlm-phone-agent                        # interactive console
"#)]
struct Cli {
    /// Task to run; omit for the interactive console
    #[arg(trailing_var_arg = true)]
    task: Vec<String>,

    /// Model API base URL
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Model API key
    #[arg(long)]
    api_key: Option<String>,

    /// Model name
    #[arg(short, long)]
    model: Option<String>,

    /// ADB device serial
    #[arg(short, long)]
    device: Option<String>,

    /// Path of the adb executable
    #[arg(long, value_name = "PATH")]
    adb: Option<PathBuf>,

    /// Language of the model's thoughts (cn or en)
    #[arg(long, value_parser = ["cn", "en"])]
    lang: Option<String>,

    /// Coordinate convention: relative, resized or absolute
    #[arg(long, value_name = "SPACE")]
    coordinates: Option<CoordinateSpace>,

    /// Screenshots sent per request
    #[arg(long, value_name = "N")]
    history: Option<usize>,

    /// Stop after this many steps (0 for no limit)
    #[arg(long, value_name = "N")]
    max_steps: Option<u32>,

    /// Keep the latest screenshots in this directory
    #[arg(long, value_name = "DIR")]
    screenshot_dir: Option<PathBuf>,

    /// Do not write a session transcript
    #[arg(long)]
    no_session_log: bool,

    /// Persist the effective settings
    #[arg(long)]
    save_settings: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, settings: &mut AppSettings) {
        if let Some(v) = &self.base_url {
            settings.base_url = v.clone();
        }
        if let Some(v) = &self.api_key {
            settings.api_key = v.clone();
        }
        if let Some(v) = &self.model {
            settings.model_name = v.clone();
        }
        if let Some(v) = &self.device {
            settings.device_id = v.clone();
        }
        if let Some(v) = &self.adb {
            settings.adb_path = v.display().to_string();
        }
        if let Some(v) = &self.lang {
            settings.lang = v.clone();
        }
        if let Some(v) = self.coordinates {
            settings.coordinate_space = v;
        }
        if let Some(v) = self.history {
            settings.history_n = v;
        }
        if let Some(v) = self.max_steps {
            settings.max_steps = v;
        }
        if let Some(v) = &self.screenshot_dir {
            settings.screenshot_dir = v.display().to_string();
        }
        if self.no_session_log {
            settings.session_log = false;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut settings = AppSettings::load();
    settings.apply_env()?;
    cli.apply(&mut settings);

    if cli.save_settings {
        let path = settings.save()?;
        println!("Settings saved to {}", path.display());
    }

    let msgs = get_messages(&settings.lang);
    let mut agent_config = settings.to_agent_config();
    agent_config.verbose = cli.verbose;
    let device: Arc<dyn Device> = Arc::new(settings.to_device());

    println!("📱 vlm-phone-agent");
    println!("================================================");
    println!("Model: {} @ {}", settings.model_name, settings.base_url);
    println!("Language: {}", settings.lang);
    println!("Coordinates: {}", settings.coordinate_space);
    println!("History: {} screenshots", settings.history_n);
    match agent_config.max_steps {
        Some(max) => println!("Max steps: {}", max),
        None => println!("Max steps: unlimited"),
    }
    if !settings.device_id.is_empty() {
        println!("Device: {}", settings.device_id);
    }
    println!("================================================\n");

    let runner = AgentRunner::new(
        settings.to_model_config(),
        agent_config,
        device,
        Some(step_printer(msgs)),
    );

    if cli.task.is_empty() {
        run_interactive(&runner, msgs).await
    } else {
        run_task(&runner, msgs, &cli.task.join(" ")).await
    }
}

/// Print each step with localized labels.
fn step_printer(msgs: &'static Messages) -> StepCallback {
    Arc::new(move |step: &StepRecord| {
        println!("\n── {} {} ──", msgs.step, step.iteration);
        println!("💭 {}: {}", msgs.thinking, step.thought);
        println!("🎯 {}: {}", msgs.action, step.action);
    })
}

fn print_outcome(msgs: &Messages, outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Finished(message) => println!(
            "\n✅ {}: {}",
            msgs.task_completed,
            message.as_deref().unwrap_or_default()
        ),
        RunOutcome::Stopped => println!("\n⏹️  {}", msgs.stopped),
        RunOutcome::MaxStepsReached => println!("\n⚠️  {}", msgs.max_steps_reached),
    }
}

/// Run one task; Ctrl+C stops the loop.
async fn run_task(runner: &AgentRunner, msgs: &Messages, task: &str) -> anyhow::Result<()> {
    println!("📝 {}: {}\n", msgs.task, task);
    runner.update_instruction(task);
    runner.start()?;

    let result = tokio::select! {
        result = runner.wait() => result,
        _ = tokio::signal::ctrl_c() => {
            runner.stop().await;
            runner.wait().await
        }
    };

    match result {
        Ok(outcome) => print_outcome(msgs, &outcome),
        Err(e) => eprintln!("\n❌ {}: {}", msgs.error, e),
    }
    Ok(())
}

/// Console that accepts instructions while the loop runs.
async fn run_interactive(runner: &AgentRunner, msgs: &Messages) -> anyhow::Result<()> {
    println!("{}\n", msgs.interactive_hint);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match line.trim() {
            "" => continue,
            "quit" | "exit" => break,
            "status" => {
                let status = runner.status();
                println!("{}", serde_json::to_string_pretty(&status)?);
            }
            "stop" => {
                if runner.is_running() {
                    runner.stop().await;
                    println!("⏹️  {}", msgs.stopped);
                } else {
                    println!("{}", msgs.not_running);
                }
            }
            instruction => {
                runner.update_instruction(instruction);
                if runner.is_running() {
                    println!("🔄 {}: {}", msgs.instruction_updated, instruction);
                } else {
                    // Join the previous worker before starting a new one.
                    if let Ok(outcome) = runner.wait().await {
                        tracing::debug!("Previous run: {:?}", outcome);
                    }
                    runner.start()?;
                    println!("📝 {}: {}", msgs.task, instruction);
                }
            }
        }
    }

    if runner.is_running() {
        runner.stop().await;
    }
    println!("{} 👋", msgs.goodbye);
    Ok(())
}
