//! `quill chat` - interactive or single-message chat.

use std::sync::Arc;

use quill_agent::{Agent, AgentBuilder, StopReason};
use quill_config::AppConfig;
use quill_core::message::ConversationId;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

pub struct ChatOptions {
    pub message: Option<String>,
    pub provider: Option<String>,
    pub no_cache: bool,
    pub conversation: Option<String>,
}

pub async fn run(config: AppConfig, options: ChatOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(config);
    let tools = quill_tools::load_tools(&config);
    debug!(tools = ?tools.names(), "Loaded tools for chat session");

    let providers = quill_providers::build_from_config(&config);

    let mut builder = AgentBuilder::new("quill", config.clone())
        .with_tool_registry(tools)
        .with_registry(providers);
    if let Some(provider) = options.provider {
        builder = builder.with_provider(provider);
    }
    if options.no_cache {
        builder = builder.with_cache(false);
    }
    let mut agent = builder.build().await?;

    if let Some(id) = options.conversation {
        let id = ConversationId::from(id);
        if !agent.load_conversation(&id).await {
            return Err(format!("No stored conversation '{id}'").into());
        }
    }

    match options.message {
        Some(message) => {
            let reply = agent.respond(&message).await;
            println!("{}", reply.text);
            if reply.stop == StopReason::BackendError {
                return Err("Model call failed".into());
            }
        }
        None => interactive(&mut agent).await?,
    }
    Ok(())
}

async fn interactive(agent: &mut Agent) -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("  quill interactive mode");
    println!();
    println!("  Provider:      {} ({})", agent.provider_id(), agent.model());
    println!("  Tools:         {}", agent.tools().names().join(", "));
    println!("  Conversation:  {}", agent.conversation_id());
    println!();
    println!("  Commands: /new, /clear, exit");
    println!();

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        stdout.write_all(b"  You > ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "exit" | "quit" => break,
            "/new" => {
                let id = agent.new_conversation().await;
                println!("  Started conversation {id}");
                continue;
            }
            "/clear" => {
                agent.clear_memory().await;
                println!("  Cleared short-term memory");
                continue;
            }
            _ => {}
        }

        let reply = agent.respond(input).await;
        println!();
        for line in reply.text.lines() {
            println!("  Assistant > {line}");
        }
        if reply.persist_failures > 0 {
            eprintln!("  [warning] {} message(s) were not saved to long-term memory", reply.persist_failures);
        }
        println!();
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}
