mod progress;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use console::style;
use cumulus_browser::{
    BrowserConfig, BrowserEvent, BrowserSession, BrowserSnapshot, Command, Pointer,
    SessionHandle, TaskId, TaskPatch, UploadStatus,
};
use cumulus_fs::{path, FileHandle, MemoryFs, Node, Search};
use futures::StreamExt;
use progress::UploadBars;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::EnvFilter;

/// Cumulus Shell - browse and upload into a remote file tree from the terminal
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Browser settings file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Items fetched per page, overrides the settings file
    #[arg(long)]
    page_size: Option<usize>,

    /// Search debounce in milliseconds, overrides the settings file
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Number of files generated under /documents
    #[arg(long, default_value = "120")]
    seed: usize,

    /// Simulated latency of every remote call in milliseconds
    #[arg(long, default_value = "40")]
    latency_ms: u64,

    /// Owner recorded on seeded nodes
    #[arg(long, default_value = "alice")]
    owner: String,

    /// Directory opened at start-up
    #[arg(short, long, default_value = "/")]
    start: String,
}

const WAIT_LIMIT: Duration = Duration::from_secs(10);

fn show_help() {
    println!("\n📖 Available Commands:");
    println!("  ┌──────────────────────────────────────────────────────────┐");
    println!("  │  help, ?                     Show this help              │");
    println!("  │  ls                          List the visible content    │");
    println!("  │  cd <path>                   Open a directory            │");
    println!("  │  more                        Load the next page          │");
    println!("  │  scroll <n>                  Report row n as visible     │");
    println!("  │  select <n>...               Select rows                 │");
    println!("  │  deselect <n>...             Deselect rows               │");
    println!("  │  all | none | toggle         Select all / none / toggle  │");
    println!("  │  search [-r] <query>         Filter the directory        │");
    println!("  │  search                      Clear the search            │");
    println!("  │  drag <n>                    Start dragging row n        │");
    println!("  │  drop <n>                    Drop onto directory row n   │");
    println!("  │  stage <file>...             Stage local files           │");
    println!("  │  tasks                       Show the upload queue       │");
    println!("  │  rename <t> <name>           Rename staged task t        │");
    println!("  │  crypt <t> on|off            Toggle encryption of task t │");
    println!("  │  compress <t> on|off         Toggle compression of t     │");
    println!("  │  unstage <t>                 Remove task t               │");
    println!("  │  upload                      Send every staged task      │");
    println!("  │  dismiss                     Clear finished uploads      │");
    println!("  │  mkdir <name>                Create a directory here     │");
    println!("  │  rm [-r]                     Delete the selection        │");
    println!("  │  quit, q                     Exit                        │");
    println!("  └──────────────────────────────────────────────────────────┘");
}

fn prompt(snapshot: &BrowserSnapshot) {
    let location = snapshot.current_path().unwrap_or("?");
    print!("{} > ", style(location).bold().blue());
    let _ = io::stdout().flush();
}

fn load_config(args: &Args) -> anyhow::Result<BrowserConfig> {
    let mut config = match &args.config {
        Some(file) => BrowserConfig::from_file(file)
            .with_context(|| format!("Failed to load settings from {}", file.display()))?,
        None => BrowserConfig::default(),
    };
    if let Some(page_size) = args.page_size {
        config.page_size = page_size;
    }
    if let Some(debounce_ms) = args.debounce_ms {
        config.search_debounce_ms = debounce_ms;
    }
    config.validate()?;
    Ok(config)
}

fn seed_store(args: &Args) -> anyhow::Result<MemoryFs> {
    let fs = MemoryFs::new(&args.owner);
    for i in 0..args.seed {
        fs.add_file(
            &format!("/documents/report-{:04}.pdf", i),
            4096 + (i as u64 * 1531) % 900_000,
        )?;
    }
    for i in 0..12 {
        fs.add_file(&format!("/photos/2024/img_{:04}.jpg", i), 2_400_000)?;
    }
    fs.add_file("/projects/cumulus/README.md", 2048)?;
    fs.add_file("/projects/cumulus/notes.txt", 512)?;
    fs.add_directory("/projects/archive")?;
    fs.add_directory("/music")?;
    fs.set_default_latency(Duration::from_millis(args.latency_ms));
    Ok(fs)
}

/// Resolve `input` against the current directory, accepting `..` segments
fn resolve_path(current: Option<&str>, input: &str) -> anyhow::Result<String> {
    let mut resolved = if input.starts_with('/') {
        path::ROOT.to_string()
    } else {
        current.unwrap_or(path::ROOT).to_string()
    };
    for segment in input.split('/') {
        match segment {
            "" | "." => continue,
            ".." => resolved = path::parent(&resolved).unwrap_or(path::ROOT).to_string(),
            name => resolved = path::join(&resolved, name)?,
        }
    }
    Ok(resolved)
}

fn print_listing(snapshot: &BrowserSnapshot) {
    let Some(directory) = &snapshot.current else {
        println!("  No directory open. Use 'cd <path>'.");
        return;
    };

    let total = snapshot
        .content_size
        .map(|size| size.to_string())
        .unwrap_or_else(|| "?".to_string());
    match &snapshot.search {
        Some(search) => println!(
            "\n🔍 '{}' in {} ({}/{})",
            search.query,
            directory.path(),
            snapshot.content.len(),
            total
        ),
        None => println!(
            "\n📁 {} ({}/{})",
            directory.path(),
            snapshot.content.len(),
            total
        ),
    }

    for (i, node) in snapshot.content.iter().enumerate() {
        let mark = if snapshot.is_selected(node.id()) {
            style("[x]").green()
        } else {
            style("[ ]").dim()
        };
        match node {
            Node::Directory(child) => {
                println!("  {:>4} {} {}/", i + 1, mark, style(child.name()).bold().blue())
            }
            Node::File(file) => println!(
                "  {:>4} {} {}  {}",
                i + 1,
                mark,
                node.name(),
                style(file.human_readable_size()).dim()
            ),
        }
    }

    if !snapshot.is_complete() && snapshot.content_size.is_some() {
        println!("  {}", style("... 'more' loads the next page").dim());
    }
    if let Some(error) = &snapshot.content_error {
        println!("  ❌ {}", error.display_message());
    }
}

fn print_tasks(snapshot: &BrowserSnapshot) {
    if snapshot.uploads.is_empty() {
        println!("  No uploads staged.");
        return;
    }
    println!("\n📤 Uploads:");
    for (i, task) in snapshot.uploads.iter().enumerate() {
        let status = match task.status {
            UploadStatus::Ready => style("ready").yellow(),
            UploadStatus::Loading => style("sending").cyan(),
            UploadStatus::Done => style("done").green(),
        };
        println!(
            "  {:>3}. {} -> {} [{}{}] {} {}%",
            i + 1,
            task.filename,
            task.location,
            if task.crypted { "crypted" } else { "plain" },
            if task.compressed { ", compressed" } else { "" },
            status,
            task.progress
        );
        if let Some(error) = &task.error {
            println!("       ❌ {}", error.display_message());
        }
    }
}

#[instrument(skip_all)]
fn print_event(event: &BrowserEvent) {
    debug!("Handling browser event: {:?}", event);
    match event {
        BrowserEvent::DirectoryChanged { directory } => {
            println!("📂 Opened {}", directory.path());
        }
        BrowserEvent::NavigationFailed { path, error } => {
            error!("Navigation to {} failed: {}", path, error);
            println!("❌ Cannot open {}: {}", path, error.display_message());
        }
        BrowserEvent::PageFailed { error } => {
            println!("❌ Loading content failed: {}", error.display_message());
        }
        BrowserEvent::SearchFailed { error } => {
            println!("❌ Search failed: {}", error.display_message());
        }
        BrowserEvent::UploadCompleted { node, .. } => {
            println!("✅ Uploaded {}", node.path());
        }
        BrowserEvent::UploadFailed {
            filename, error, ..
        } => {
            println!("❌ Upload of {} failed: {}", filename, error.display_message());
        }
        BrowserEvent::UploadsDrained => {
            println!("📤 Upload queue finished. Use 'dismiss' to clear it.");
        }
        BrowserEvent::NodesMoved { nodes, destination } => {
            println!("✅ Moved {} item(s) to {}", nodes.len(), destination);
        }
        BrowserEvent::MoveFailed { destination, error } => {
            println!(
                "❌ Move to {} failed: {}",
                destination,
                error.display_message()
            );
        }
        BrowserEvent::DirectoryCreated { directory } => {
            println!("✅ Created {}", directory.path());
        }
        BrowserEvent::NodesDeleted { node_ids } => {
            println!("🗑️ Deleted {} item(s)", node_ids.len());
        }
        BrowserEvent::OperationFailed { error } => {
            println!("❌ {}", error.display_message());
        }
    }
}

fn row(snapshot: &BrowserSnapshot, arg: Option<&str>) -> anyhow::Result<Node> {
    let index: usize = arg
        .ok_or_else(|| anyhow!("missing row number"))?
        .parse()
        .context("row must be a number")?;
    index
        .checked_sub(1)
        .and_then(|i| snapshot.content.get(i))
        .cloned()
        .ok_or_else(|| anyhow!("no row {}", index))
}

fn task_id(snapshot: &BrowserSnapshot, arg: Option<&str>) -> anyhow::Result<TaskId> {
    let index: usize = arg
        .ok_or_else(|| anyhow!("missing task number"))?
        .parse()
        .context("task must be a number")?;
    index
        .checked_sub(1)
        .and_then(|i| snapshot.uploads.get(i))
        .map(|task| task.id)
        .ok_or_else(|| anyhow!("no task {}", index))
}

fn switch(arg: Option<&str>) -> anyhow::Result<bool> {
    match arg {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        _ => bail!("expected 'on' or 'off'"),
    }
}

async fn settle<F>(session: &SessionHandle, predicate: F) -> anyhow::Result<BrowserSnapshot>
where
    F: FnMut(&BrowserSnapshot) -> bool,
{
    match tokio::time::timeout(WAIT_LIMIT, session.wait_for(predicate)).await {
        Ok(snapshot) => Ok(snapshot?),
        Err(_) => bail!("timed out waiting for the remote store"),
    }
}

/// Returns false once the user asked to leave
#[instrument(skip(session), fields(command = input))]
async fn process_command(input: &str, session: &SessionHandle) -> anyhow::Result<bool> {
    let parts: Vec<&str> = input.split_whitespace().collect();
    let Some(&name) = parts.first() else {
        return Ok(true);
    };
    let snapshot = session.snapshot();

    match name {
        "help" | "?" | "h" => show_help(),
        "ls" | "l" => print_listing(&snapshot),
        "cd" => {
            let target = resolve_path(snapshot.current_path(), parts.get(1).unwrap_or(&"/"))?;
            info!("Navigating to {}", target);
            session.dispatch(Command::Navigate { path: target }).await?;
            let snapshot = settle(session, |s| !s.directory_loading && !s.loading_more).await?;
            if snapshot.current.is_some() {
                print_listing(&snapshot);
            }
        }
        "more" | "m" => {
            session.dispatch(Command::LoadMore).await?;
            let snapshot = settle(session, |s| !s.loading_more).await?;
            print_listing(&snapshot);
        }
        "scroll" => {
            let visible_stop_index = parts
                .get(1)
                .ok_or_else(|| anyhow!("Usage: scroll <row>"))?
                .parse()?;
            session
                .dispatch(Command::Scrolled { visible_stop_index })
                .await?;
        }
        "select" | "deselect" => {
            if parts.len() < 2 {
                bail!("Usage: {} <row>...", name);
            }
            for arg in &parts[1..] {
                let id = row(&snapshot, Some(*arg))?.id().to_string();
                let command = if name == "select" {
                    Command::Select { id }
                } else {
                    Command::Deselect { id }
                };
                session.dispatch(command).await?;
            }
            print_listing(&session.snapshot());
        }
        "all" => session.dispatch(Command::SelectAll).await?,
        "none" => session.dispatch(Command::DeselectAll).await?,
        "toggle" => session.dispatch(Command::ToggleSelectAll).await?,
        "search" | "/" => {
            let (recursive, words) = match parts.get(1) {
                Some(&"-r") => (true, &parts[2..]),
                _ => (false, &parts[1..]),
            };
            let search = if words.is_empty() {
                None
            } else {
                Some(Search::new(&words.join(" ")).recursive(recursive))
            };
            let clearing = search.is_none();
            session.dispatch(Command::SetSearch { search }).await?;
            let snapshot = if clearing {
                session.snapshot()
            } else {
                settle(session, |s| !s.search_pending && !s.loading_more).await?
            };
            print_listing(&snapshot);
        }
        "drag" => {
            let node = row(&snapshot, parts.get(1).copied())?;
            session
                .dispatch(Command::BeginDrag {
                    node,
                    pointer: Pointer::default(),
                })
                .await?;
            if let Some(dragged) = session.snapshot().dragged {
                println!("✋ Dragging {} item(s)", dragged.nodes.len());
            }
        }
        "drop" => {
            let target = row(&snapshot, parts.get(1).copied())?;
            if snapshot.dragged.is_none() {
                bail!("nothing is being dragged");
            }
            session.dispatch(Command::Drop { target }).await?;
            session.dispatch(Command::EndDrag).await?;
        }
        "stage" => {
            if parts.len() < 2 {
                bail!("Usage: stage <file>...");
            }
            let mut files = Vec::new();
            for local in &parts[1..] {
                match FileHandle::from_path(&PathBuf::from(local)).await {
                    Ok(handle) => files.push(handle),
                    Err(e) => println!("❌ Skipping {}: {}", local, e),
                }
            }
            if !files.is_empty() {
                session.dispatch(Command::StageFiles { files }).await?;
                print_tasks(&session.snapshot());
            }
        }
        "tasks" | "t" => print_tasks(&snapshot),
        "rename" => {
            let id = task_id(&snapshot, parts.get(1).copied())?;
            let filename = parts
                .get(2)
                .ok_or_else(|| anyhow!("Usage: rename <task> <name>"))?
                .to_string();
            let patch = TaskPatch {
                filename: Some(filename),
                ..Default::default()
            };
            session.dispatch(Command::UpdateTask { id, patch }).await?;
        }
        "crypt" | "compress" => {
            let id = task_id(&snapshot, parts.get(1).copied())?;
            let enabled = switch(parts.get(2).copied())?;
            let patch = if name == "crypt" {
                TaskPatch {
                    crypted: Some(enabled),
                    ..Default::default()
                }
            } else {
                TaskPatch {
                    compressed: Some(enabled),
                    ..Default::default()
                }
            };
            session.dispatch(Command::UpdateTask { id, patch }).await?;
        }
        "unstage" => {
            let id = task_id(&snapshot, parts.get(1).copied())?;
            session.dispatch(Command::RemoveTask { id }).await?;
        }
        "upload" | "u" => session.dispatch(Command::UploadAll).await?,
        "dismiss" => session.dispatch(Command::DismissUploads).await?,
        "mkdir" => {
            let name = parts
                .get(1)
                .ok_or_else(|| anyhow!("Usage: mkdir <name>"))?
                .to_string();
            session.dispatch(Command::CreateDirectory { name }).await?;
        }
        "rm" => {
            let delete_content = parts.get(1) == Some(&"-r");
            if snapshot.selection.is_empty() {
                bail!("nothing selected");
            }
            session
                .dispatch(Command::DeleteSelection { delete_content })
                .await?;
        }
        "quit" | "exit" | "q" => {
            println!("👋 Goodbye!");
            return Ok(false);
        }
        other => println!(
            "❌ Unknown command: {}. Type 'help' for available commands.",
            other
        ),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .try_init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let speed_window = config.speed_window();

    let fs = Arc::new(seed_store(&args)?);
    let (session, mut events) = BrowserSession::spawn(config, fs)?;
    info!("Browser session started");

    println!("☁️  Cumulus Shell - {}", args.owner);
    println!("Type 'help' for commands.");
    let start = resolve_path(None, &args.start)?;
    session.dispatch(Command::Navigate { path: start }).await?;

    // Spawn a simple stdin reader that forwards lines over a channel
    let (stdin_sender, mut stdin_receiver) = tokio::sync::mpsc::unbounded_channel::<String>();
    let stdin_handle = tokio::spawn(async move {
        use tokio::io::{AsyncBufReadExt, BufReader};
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if stdin_sender.send(line.trim().to_string()).is_err() {
                break;
            }
        }
    });

    let mut snapshots = session.subscribe();
    let mut bars = UploadBars::new(speed_window);
    prompt(&session.snapshot());

    loop {
        tokio::select! {
            Some(event) = events.next() => {
                print_event(&event);
                if bars.is_idle() {
                    prompt(&session.snapshot());
                }
            }
            Ok(()) = snapshots.changed() => {
                let snapshot = snapshots.borrow_and_update().clone();
                bars.sync(&snapshot);
            }
            input = stdin_receiver.recv() => {
                let Some(input) = input else {
                    debug!("Standard input closed");
                    break;
                };
                match process_command(&input, &session).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => println!("❌ {}", e),
                }
                prompt(&session.snapshot());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                println!("\n👋 Goodbye!");
                break;
            }
        }
    }

    stdin_handle.abort();
    if let Err(e) = session.shutdown() {
        debug!("Session already closed: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_paths() {
        assert_eq!(resolve_path(Some("/docs"), "reports").unwrap(), "/docs/reports");
        assert_eq!(resolve_path(Some("/docs/reports"), "..").unwrap(), "/docs");
        assert_eq!(resolve_path(Some("/docs"), "../photos/2024").unwrap(), "/photos/2024");
        assert_eq!(resolve_path(Some("/"), "..").unwrap(), "/");
        assert_eq!(resolve_path(None, "music").unwrap(), "/music");
    }

    #[test]
    fn test_resolve_absolute_paths() {
        assert_eq!(resolve_path(Some("/docs"), "/photos/").unwrap(), "/photos");
        assert_eq!(resolve_path(Some("/docs"), "/").unwrap(), "/");
    }

    #[test]
    fn test_switch() {
        assert!(switch(Some("on")).unwrap());
        assert!(!switch(Some("off")).unwrap());
        assert!(switch(None).is_err());
    }
}
