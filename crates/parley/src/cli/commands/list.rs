use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::config::RuntimePaths;
use crate::store::{ConversationStore, DEFAULT_LIST_LIMIT};

#[derive(Debug, Clone, Args)]
pub struct ListArgs {
    #[arg(long, value_name = "PATH")]
    pub store: Option<PathBuf>,

    #[arg(long, value_name = "N", default_value_t = DEFAULT_LIST_LIMIT)]
    pub limit: usize,
}

pub fn run(args: &ListArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    let store_path = match &args.store {
        Some(path) => runtime_paths.resolve(path)?,
        None => runtime_paths.default_store_path(),
    };
    let store = ConversationStore::open_read_only(&store_path)?;
    let total = store.count()?;
    let keys = store.keys(args.limit)?;
    store.close()?;

    for key in &keys {
        println!("{key}");
    }
    println!(
        "list: shown={} total={} store={}",
        keys.len(),
        total,
        store_path.display()
    );
    Ok(())
}
