use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nogen::console::{ConsoleForm, ConsoleInput, ConsoleSpeech};
use nogen::{Assistant, AssistantEvent, Config, Hooks};

#[derive(Parser)]
#[command(name = "nogen", about = "Wake-word voice commands, driven from the terminal")]
struct Cli {
    /// Config file (defaults to ./nogen.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the wake word
    #[arg(long)]
    wake_word: Option<String>,

    /// Skip the welcome greeting
    #[arg(long)]
    no_greet: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nogen=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref()).context("loading config")?;
    if let Some(word) = cli.wake_word {
        config.set_wake_word(&word);
    }
    if cli.no_greet {
        config.speech.greet = false;
    }
    let wake_word = config.wake.word.clone();

    let input = ConsoleInput::new();
    let form = ConsoleForm::new(&config);
    let hooks = Hooks::new()
        .on_navigate(|path| println!("\r\x1b[K\x1b[36m[router] {}\x1b[0m", path))
        .on_download_requested(|format| {
            println!("\r\x1b[K\x1b[36m[export] {} file requested\x1b[0m", format)
        });

    let (assistant, handle, mut events) = Assistant::new(
        config,
        Box::new(input.clone()),
        Box::new(ConsoleSpeech),
        Box::new(form),
        hooks,
    );
    let assistant_task = tokio::spawn(assistant.run());

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                AssistantEvent::Heard(text) => println!("\r\x1b[K> {}", text),
                AssistantEvent::PageLoad(path) => {
                    println!("\r\x1b[K\x1b[36m[page load] {}\x1b[0m", path)
                }
                other => tracing::debug!(event = ?other, "assistant event"),
            }
        }
    });

    handle.start();
    println!("Press Enter to turn on the microphone, then type what you would say.");
    println!("Say \"{}\" first. `!error <code>` and `!end` simulate the stream.\n", wake_word);
    let _reader = input.spawn_reader(handle.clone());

    assistant_task.await.context("assistant task failed")?;
    Ok(())
}
