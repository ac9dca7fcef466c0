use anyhow::{anyhow, Context, Result};
use bat::PrettyPrinter;
use clap::{Parser, Subcommand};
use cliclack::{input, spinner};
use console::style;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use ollama_client::config::{ClientConfig, ConfigSnapshot};
use ollama_client::models::message::{Message, Role};
use ollama_client::models::request::{ChatRequest, DeleteRequest, EmbedRequest, GenerateRequest};
use ollama_client::{OllamaClient, WeatherAgent};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Ollama server URL (can also be set via OLLAMA_HOST or the config file)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Configuration property, e.g. -D ollama.host=http://gpu-box:11434
    #[arg(short = 'D', value_parser = parse_property, global = true)]
    property: Vec<(String, String)>,

    /// Configuration file (defaults to ./ollama.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Connect, read and write timeout in seconds
    #[arg(long, default_value_t = 30, global = true)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat session
    Chat {
        /// Model to use
        #[arg(short, long, default_value = "qwen2.5:7b")]
        model: String,

        /// Print replies as they are generated
        #[arg(long)]
        stream: bool,

        /// Never answer with agents, always ask the model
        #[arg(long)]
        no_agents: bool,
    },
    /// One-off completion for a prompt
    Generate {
        prompt: String,

        #[arg(short, long, default_value = "qwen2.5:7b")]
        model: String,

        #[arg(long)]
        stream: bool,
    },
    /// Print the embedding vector of a text
    Embed {
        text: String,

        #[arg(short, long, default_value = "nomic-embed-text")]
        model: String,
    },
    /// List local models
    List,
    /// Delete a local model
    Delete { model: String },
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    Ok((key.trim().to_string(), value.trim().to_string()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let cli = Cli::parse();

    let properties: HashMap<String, String> = cli.property.iter().cloned().collect();
    let snapshot = ConfigSnapshot::capture(properties, cli.config.as_deref())
        .context("Failed to read configuration")?;

    let timeout = Duration::from_secs(cli.timeout);
    let config = ClientConfig::from_snapshot(cli.host.as_deref(), &snapshot)
        .with_connect_timeout(timeout)
        .with_read_timeout(timeout)
        .with_write_timeout(timeout);
    let client = OllamaClient::new(config)?;

    match cli.command {
        Command::Chat {
            model,
            stream,
            no_agents,
        } => chat(client, &snapshot, model, stream, no_agents),
        Command::Generate {
            prompt,
            model,
            stream,
        } => generate(&client, GenerateRequest::new(model, prompt), stream),
        Command::Embed { text, model } => {
            let response = client.embed(&EmbedRequest::new(model, text))?;
            println!("{:?}", response.embedding);
            Ok(())
        }
        Command::List => {
            for model in client.list()?.models {
                let size = model.size.map(|s| format!("{:.1} GB", s as f64 / 1e9));
                println!(
                    "{} {}",
                    model.name,
                    style(size.unwrap_or_default()).dim()
                );
            }
            Ok(())
        }
        Command::Delete { model } => {
            client.delete(&DeleteRequest::new(&model))?;
            println!("Deleted {}", model);
            Ok(())
        }
    }
}

fn chat(
    client: OllamaClient,
    snapshot: &ConfigSnapshot,
    model: String,
    stream: bool,
    no_agents: bool,
) -> Result<()> {
    let client = match WeatherAgent::from_snapshot(client.clone(), snapshot) {
        Ok(agent) => client.with_agent(agent),
        Err(err) => {
            tracing::debug!("weather agent disabled: {}", err);
            client
        }
    };

    println!(
        "Ollama chat on {} {}",
        style(client.host()).bold(),
        style("- type \"exit\" to end the session").dim()
    );
    println!("\n");

    let mut request = ChatRequest::new(
        model,
        vec![Message::system("You are a helpful assistant.")],
    )
    .with_use_agents(!no_agents);

    loop {
        let message_text: String = input("Message:").placeholder("").multiline().interact()?;

        if message_text.trim().eq_ignore_ascii_case("exit") {
            break;
        }

        request.messages.push(Message::user(message_text));

        if stream {
            let mut replies = client.chat_stream(&mut request)?;
            let answered_by_agent = replies.is_agent();
            let mut reply = String::new();
            for record in replies.by_ref() {
                let content = record?.content().to_string();
                print!("{}", content);
                io::stdout().flush()?;
                reply.push_str(&content);
            }
            replies.close();
            println!("\n");

            // Agent answers are already in the history
            if !answered_by_agent {
                request.messages.push(Message::new(Role::Assistant, reply));
            }
        } else {
            let spin = spinner();
            spin.start("awaiting reply");
            let response = client.chat(&mut request)?;
            spin.stop("");

            render(response.content())?;
            println!("\n");
        }
    }
    Ok(())
}

fn generate(client: &OllamaClient, request: GenerateRequest, stream: bool) -> Result<()> {
    if stream {
        for record in client.generate_stream(&request)? {
            print!("{}", record?.response);
            io::stdout().flush()?;
        }
        println!();
    } else {
        let response = client.generate(&request)?;
        render(&response.response)?;
    }
    Ok(())
}

fn render(content: &str) -> Result<()> {
    PrettyPrinter::new()
        .input_from_bytes(content.as_bytes())
        .language("markdown")
        .print()
        .map_err(|e| anyhow!("Failed to render reply: {}", e))?;
    Ok(())
}
