//! `quill conversations` - inspect the long-term memory log.

use quill_config::AppConfig;
use quill_core::memory::ConversationStore;
use quill_core::message::ConversationId;
use quill_memory::SqliteStore;

use crate::ConversationAction;

pub async fn run(config: &AppConfig, action: &ConversationAction) -> Result<(), Box<dyn std::error::Error>> {
    let path = &config.memory.long_term_db_path;
    if !config.memory.long_term_enabled {
        println!("Long-term memory is disabled (memory.long_term_enabled = false).");
        return Ok(());
    }
    let store = SqliteStore::open(path).await?;

    match action {
        ConversationAction::List => {
            let conversations = store.list().await?;
            if conversations.is_empty() {
                println!("No stored conversations in {}", path.display());
            }
            for c in conversations {
                println!(
                    "{}  {}  {}",
                    c.id,
                    c.updated_at.format("%Y-%m-%d %H:%M:%S"),
                    c.title
                );
            }
        }
        ConversationAction::Show { id } => {
            let messages = store.load(&ConversationId::from(id.as_str())).await?;
            if messages.is_empty() {
                return Err(format!("No stored conversation '{id}'").into());
            }
            for m in messages {
                println!("[{}] {}", m.role, m.content);
                for call in &m.tool_calls {
                    println!("    -> {}({})", call.name, call.arguments);
                }
            }
        }
        ConversationAction::Delete { id } => {
            if store.delete(&ConversationId::from(id.as_str())).await? {
                println!("Deleted conversation {id}");
            } else {
                println!("No stored conversation '{id}'");
            }
        }
        ConversationAction::Clear { confirm } => {
            if !confirm {
                println!("This deletes every stored conversation permanently.");
                println!("Run with --confirm to proceed: quill conversations clear --confirm");
                return Ok(());
            }
            store.clear().await?;
            println!("All conversations deleted.");
        }
    }
    Ok(())
}
