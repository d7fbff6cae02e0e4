use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Args;

use crate::config::RuntimePaths;
use crate::extract::{find_first_tool_result, first_user_text, preview_lines};
use crate::normalize::normalize_conversation;
use crate::store::ConversationStore;
use crate::utils::content::DEFAULT_PREVIEW_LINES;

#[derive(Debug, Clone, Args)]
pub struct ShowArgs {
    #[arg(value_name = "KEY")]
    pub key: String,

    #[arg(long, value_name = "PATH")]
    pub store: Option<PathBuf>,

    #[arg(long, value_name = "N", default_value_t = DEFAULT_PREVIEW_LINES)]
    pub preview_lines: usize,

    /// Print the stored record as pretty JSON instead of the summary.
    #[arg(long, default_value_t = false)]
    pub raw: bool,
}

pub fn run(args: &ShowArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    let store_path = match &args.store {
        Some(path) => runtime_paths.resolve(path)?,
        None => runtime_paths.default_store_path(),
    };
    let store = ConversationStore::open_read_only(&store_path)?;
    let value = store
        .get_value(&args.key)?
        .ok_or_else(|| anyhow!("no record stored under key `{}`", args.key))?;
    let source_path = store.source_path(&args.key)?;
    store.close()?;

    if args.raw {
        let encoded =
            serde_json::to_string_pretty(&value).context("failed to encode stored record")?;
        println!("{encoded}");
        return Ok(());
    }

    let normalized = normalize_conversation(&value);
    let conversation = &normalized.conversation;
    println!(
        "show: key={} source={} messages={} anomalies={}",
        args.key,
        source_path.as_deref().unwrap_or("-"),
        conversation.messages.len(),
        normalized.anomalies.len()
    );
    if let Some(text) = first_user_text(conversation) {
        println!("show: first_user_text");
        for line in preview_lines(text, args.preview_lines) {
            println!("  | {line}");
        }
    }

    match find_first_tool_result(conversation) {
        Some(found) => {
            println!(
                "show: tool_result message={} item={} shape={}",
                found.message_index,
                found.item_index,
                found.result.shape()
            );
            match found.content() {
                Some(content) => {
                    for line in preview_lines(content, args.preview_lines) {
                        println!("  | {line}");
                    }
                }
                None => println!("  (no content)"),
            }
        }
        None => println!("show: tool_result none"),
    }

    Ok(())
}
