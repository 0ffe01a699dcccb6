//! The terminal chat front end for the trip-planning assistant.

#[macro_use]
extern crate tracing;

use std::env;
use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use wayfarer::core::delivery::{self, StreamEvent};
use wayfarer::tools::Catalog;
use wayfarer::{SessionBuilder, default_system_prompt};
use wayfarer_openai_model::{OpenAIConfigBuilder, OpenAIProvider};

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let Ok(api_key) = env::var("OPENAI_API_KEY") else {
        eprintln!("OPENAI_API_KEY environment variable is not set");
        return;
    };

    let mut config = OpenAIConfigBuilder::with_api_key(api_key);
    if let Ok(base_url) = env::var("OPENAI_BASE_URL") {
        config = config.with_base_url(base_url);
    }
    if let Ok(model) = env::var("OPENAI_MODEL") {
        config = config.with_model(model);
    }
    let model_provider = OpenAIProvider::new(config.build());

    let today = Local::now().format("%Y-%m-%d").to_string();
    let mut builder = SessionBuilder::with_model_provider(model_provider)
        .with_system_prompt(default_system_prompt(&today));
    if let Ok(tavily_key) = env::var("TAVILY_API_KEY") {
        builder = builder.with_web_search(tavily_key);
    }
    if let Ok(path) = env::var("WAYFARER_CATALOG") {
        match Catalog::from_path(&path) {
            Ok(catalog) => builder = builder.with_catalog(catalog),
            Err(err) => {
                eprintln!("failed to load catalog from {path}: {err}");
                return;
            }
        }
    }
    let mut session = builder.build();

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .expect("static template is valid")
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    loop {
        print!("> ");
        std::io::stdout().flush().expect("stdout is writable");

        let Some(line) = read_line().await else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (emitter, mut stream) = delivery::channel(32);
        let printer = tokio::spawn({
            let progress_style = progress_style.clone();
            async move {
                let progress_bar = ProgressBar::new_spinner();
                progress_bar.set_style(progress_style);
                progress_bar.set_message("🤔 Thinking...");
                progress_bar.enable_steady_tick(Duration::from_millis(100));

                let mut replying = false;
                while let Some(event) = stream.next_event().await {
                    match event {
                        StreamEvent::Delta { text } => {
                            if !replying {
                                progress_bar.finish_and_clear();
                                print!("{}🤖 ", BAR_CHAR.bright_cyan());
                                replying = true;
                            }
                            print!("{}", text.bright_white());
                            std::io::stdout().flush().ok();
                        }
                        StreamEvent::Done => break,
                    }
                }
                progress_bar.finish_and_clear();
                if replying {
                    println!();
                }
            }
        });

        let outcome = session
            .send_message_streaming(line, Arc::new(emitter))
            .await;
        printer.await.ok();
        debug!("turn finished after {} round(s)", outcome.rounds);
    }
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
