//! chatloom - CLI for inspecting and administering a chatloom data directory
//!
//! Thin administrative surface over the core stores: list and prune threads,
//! walk conversations, and manage attachments from the shell.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/chatloom/chatloom.db (~/.local/share/chatloom/chatloom.db)
//! - Attachments: $XDG_DATA_HOME/chatloom/attachments/
//! - Logs: $XDG_STATE_HOME/chatloom/chatloom.log (~/.local/state/chatloom/chatloom.log)
//! - Config: $XDG_CONFIG_HOME/chatloom/config.toml (~/.config/chatloom/config.toml)

use anyhow::{Context, Result};
use chatloom_core::{
    AttachmentCreateParams, AttachmentPayload, BlobStore, Config, MetadataStore, SortOrder, Thread,
    ThreadItem,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "chatloom")]
#[command(about = "Inspect and administer a chatloom data directory")]
#[command(version)]
struct Args {
    /// Override the database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Override the attachment root directory
    #[arg(long, global = true)]
    attachments_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create, list, and delete threads
    Threads {
        #[command(subcommand)]
        command: ThreadCommand,
    },
    /// Append to and walk thread conversations
    Items {
        #[command(subcommand)]
        command: ItemCommand,
    },
    /// Store, inspect, and delete attachments
    Attachments {
        #[command(subcommand)]
        command: AttachmentCommand,
    },
}

#[derive(Subcommand)]
enum ThreadCommand {
    /// Create a new thread
    New {
        /// Display title
        #[arg(long)]
        title: Option<String>,
    },
    /// List threads, most recently active first
    List {
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Resume after this thread id
        #[arg(long)]
        after: Option<String>,

        /// Sort order: asc or desc
        #[arg(long, default_value = "desc")]
        order: String,
    },
    /// Print one thread's stored document
    Show { thread_id: String },
    /// Delete a thread and everything in it
    Rm { thread_id: String },
}

#[derive(Subcommand)]
enum ItemCommand {
    /// Append a text item to a thread
    Add { thread_id: String, text: String },
    /// List a thread's items in conversation order
    List {
        thread_id: String,

        #[arg(long, default_value = "20")]
        limit: usize,

        /// Resume after this item id
        #[arg(long)]
        after: Option<String>,

        /// Sort order: asc or desc
        #[arg(long, default_value = "asc")]
        order: String,
    },
    /// Delete one item from a thread
    Rm { thread_id: String, item_id: String },
}

#[derive(Subcommand)]
enum AttachmentCommand {
    /// Store a file as a new attachment
    Add {
        file: PathBuf,

        /// Display name (defaults to the file's name)
        #[arg(long)]
        name: Option<String>,

        /// MIME type (defaults to a guess from the file extension)
        #[arg(long)]
        mime: Option<String>,
    },
    /// Print an attachment's stored metadata
    Info { attachment_id: String },
    /// Print the local path of an attachment's bytes
    Path { attachment_id: String },
    /// Delete an attachment and its mirrored record
    Rm { attachment_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(db) = args.db {
        config.storage.db_path = Some(db);
    }
    if let Some(dir) = args.attachments_dir {
        config.storage.attachments_dir = Some(dir);
    }

    let _log_guard =
        chatloom_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let db_path = config.storage.database_path();
    tracing::info!(path = %db_path.display(), "chatloom starting");

    let store = Arc::new(
        MetadataStore::open(&db_path)
            .await
            .context("failed to open database")?,
    );

    match args.command {
        Command::Threads { command } => run_threads(&store, command).await,
        Command::Items { command } => run_items(&store, command).await,
        Command::Attachments { command } => {
            let blobs = BlobStore::open(
                config.storage.attachments_dir(),
                config.storage.public_base_url.clone(),
            )
            .context("failed to open attachment store")?
            .with_mirror(Arc::clone(&store));
            run_attachments(&blobs, command).await
        }
    }
}

async fn run_threads(store: &MetadataStore, command: ThreadCommand) -> Result<()> {
    match command {
        ThreadCommand::New { title } => {
            let mut thread = Thread::new(format!("th_{}", Uuid::new_v4()));
            thread.title = title;
            store
                .save_thread(&thread)
                .await
                .context("failed to create thread")?;
            println!("Created thread {}", thread.id);
        }
        ThreadCommand::List {
            limit,
            after,
            order,
        } => {
            let page = store
                .list_threads(limit, after.as_deref(), SortOrder::parse_lenient(&order))
                .await
                .context("failed to list threads")?;
            for thread in &page.data {
                println!(
                    "{}  {}  {}",
                    thread.id,
                    thread.created_at.format("%Y-%m-%d %H:%M"),
                    thread.title.as_deref().unwrap_or("(untitled)")
                );
            }
            print_page_footer(page.data.len(), page.has_more, page.after.as_deref());
        }
        ThreadCommand::Show { thread_id } => {
            let thread = store
                .load_thread(&thread_id)
                .await
                .context("failed to load thread")?;
            println!("{}", serde_json::to_string_pretty(&thread)?);
        }
        ThreadCommand::Rm { thread_id } => {
            store
                .delete_thread(&thread_id)
                .await
                .context("failed to delete thread")?;
            println!("Deleted thread {}", thread_id);
        }
    }
    Ok(())
}

async fn run_items(store: &MetadataStore, command: ItemCommand) -> Result<()> {
    match command {
        ItemCommand::Add { thread_id, text } => {
            let mut item = ThreadItem::new(format!("it_{}", Uuid::new_v4()));
            item.extra
                .insert("text".to_string(), serde_json::Value::String(text));
            store
                .add_item(&thread_id, &item)
                .await
                .context("failed to append item")?;
            println!("Added item {} to {}", item.id, thread_id);
        }
        ItemCommand::List {
            thread_id,
            limit,
            after,
            order,
        } => {
            let page = store
                .list_items(
                    &thread_id,
                    limit,
                    after.as_deref(),
                    SortOrder::parse_lenient(&order),
                )
                .await
                .context("failed to list items")?;
            for item in &page.data {
                let text = item
                    .extra
                    .get("text")
                    .and_then(|v| v.as_str())
                    .unwrap_or("(no text)");
                println!(
                    "{}  {}  {}",
                    item.id,
                    item.created_at.format("%Y-%m-%d %H:%M"),
                    text
                );
            }
            print_page_footer(page.data.len(), page.has_more, page.after.as_deref());
        }
        ItemCommand::Rm { thread_id, item_id } => {
            store
                .delete_item(&thread_id, &item_id)
                .await
                .context("failed to delete item")?;
            println!("Deleted item {} from {}", item_id, thread_id);
        }
    }
    Ok(())
}

async fn run_attachments(blobs: &BlobStore, command: AttachmentCommand) -> Result<()> {
    match command {
        AttachmentCommand::Add { file, name, mime } => {
            let name = name.unwrap_or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            let mime_type = mime.unwrap_or_else(|| {
                mime_guess::from_path(&file)
                    .first_or_octet_stream()
                    .to_string()
            });

            let attachment = blobs
                .create(
                    AttachmentCreateParams { name, mime_type },
                    AttachmentPayload::FilePath(file),
                )
                .await
                .context("failed to store attachment")?;

            println!(
                "Stored attachment {} ({}, {} bytes)",
                attachment.id(),
                attachment.mime_type(),
                attachment.size()
            );
            if let Some(preview) = attachment.preview_url() {
                println!("Preview: {}", preview);
            }
        }
        AttachmentCommand::Info { attachment_id } => {
            let meta = blobs
                .metadata(&attachment_id)
                .await
                .context("failed to read attachment metadata")?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
        }
        AttachmentCommand::Path { attachment_id } => {
            let path = blobs
                .local_path(&attachment_id)
                .await
                .context("failed to resolve attachment path")?;
            println!("{}", path.display());
        }
        AttachmentCommand::Rm { attachment_id } => {
            blobs
                .delete(&attachment_id)
                .await
                .context("failed to delete attachment")?;
            println!("Deleted attachment {}", attachment_id);
        }
    }
    Ok(())
}

fn print_page_footer(count: usize, has_more: bool, after: Option<&str>) {
    if has_more {
        // after is always present when more pages remain
        println!(
            "{} shown, more available (resume with --after {})",
            count,
            after.unwrap_or("")
        );
    } else {
        println!("{} shown", count);
    }
}
