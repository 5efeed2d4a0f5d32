use std::path::Path;
use std::sync::Arc;

use anvil_protocol::{PushStatus, RefResult};
use anvil_refs::{RefTarget, RefUpdate};
use anvil_repo::{Repository, View};
use anvil_server::{AnvilServer, ServerConfig};
use anvil_sync::{ClientSession, SyncConfig};
use anyhow::{bail, Context};
use colored::Colorize;
use tokio::net::TcpStream;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let repo_path = cli.repo;
    match cli.command {
        Command::Init(args) => cmd_init(args.path.as_deref().unwrap_or(&repo_path)),
        Command::Serve(args) => cmd_serve(args).await,
        Command::Heads => cmd_heads(&repo_path),
        Command::Log(args) => cmd_log(&repo_path, args.limit),
        Command::Fsck => cmd_fsck(&repo_path),
        Command::Fetch(args) => cmd_fetch(&repo_path, args).await,
        Command::Push(args) => cmd_push(&repo_path, args).await,
    }
}

fn open(path: &Path) -> anyhow::Result<Repository> {
    Repository::open(path).with_context(|| format!("opening repository at {}", path.display()))
}

fn cmd_init(path: &Path) -> anyhow::Result<()> {
    let repo = Repository::init(path)?;
    let root = repo.heads()?.into_iter().next();
    println!(
        "{} Initialized Anvil repository in {}",
        "✓".green().bold(),
        path.display().to_string().bold()
    );
    if let Some(root) = root {
        println!("  Root operation: {}", root.short_hex().cyan());
    }
    Ok(())
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(root) = args.root {
        config.repos_root = root;
    }
    if let Some(addr) = args.sync_addr {
        config.sync_addr = addr;
    }
    if let Some(addr) = args.http_addr {
        config.http_addr = addr;
    }
    println!(
        "Anvil server: sync on {}, http on {} (root: {})",
        config.sync_addr.to_string().bold(),
        config.http_addr.to_string().bold(),
        config.repos_root.display()
    );
    AnvilServer::new(config).serve().await?;
    Ok(())
}

fn cmd_heads(path: &Path) -> anyhow::Result<()> {
    let repo = open(path)?;
    let heads = repo.heads()?;
    if heads.len() > 1 {
        println!("{} {} divergent heads", "!".yellow().bold(), heads.len());
    }
    for head in heads {
        println!("{} {}", "op".dimmed(), head.to_hex().yellow());
        print_view(&repo.view_at(&head)?);
    }
    Ok(())
}

fn print_view(view: &View) {
    let namespaces = [
        ("bookmark", &view.bookmarks),
        ("tag", &view.tags),
        ("workspace", &view.workspaces),
    ];
    for (kind, refs) in namespaces {
        for (name, target) in refs {
            let rendered = match target {
                RefTarget::Normal(_) => target.to_string().normal(),
                RefTarget::Conflicted { .. } => target.to_string().red(),
            };
            println!("  {kind:<9} {} -> {rendered}", name.green());
        }
    }
    println!("  {} visible heads", view.head_ids.len());
}

fn cmd_log(path: &Path, limit: usize) -> anyhow::Result<()> {
    let repo = open(path)?;
    for (id, op) in repo.log(limit)? {
        let when = op
            .metadata
            .end_time
            .to_datetime()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S %:z").to_string())
            .unwrap_or_else(|_| "-".into());
        let merge = if op.parents.len() > 1 {
            " (merge)".magenta().to_string()
        } else {
            String::new()
        };
        println!(
            "{} {} {}{}",
            id.short_hex().yellow(),
            when.dimmed(),
            op.metadata.description.bold(),
            merge
        );
        if !op.metadata.actor.is_empty() {
            println!("    by {}", op.metadata.actor);
        }
    }
    Ok(())
}

fn cmd_fsck(path: &Path) -> anyhow::Result<()> {
    let repo = open(path)?;
    let report = repo.fsck()?;
    for id in &report.missing {
        println!("{} missing {}", "✗".red().bold(), id.to_hex());
    }
    for id in &report.corrupt {
        println!("{} corrupt {}", "✗".red().bold(), id.to_hex());
    }
    if !report.is_clean() {
        bail!(
            "{} missing and {} corrupt objects",
            report.missing.len(),
            report.corrupt.len()
        );
    }
    println!(
        "{} {} objects, {} operations, no issues",
        "✓".green().bold(),
        report.objects_checked,
        report.operations
    );
    Ok(())
}

async fn connect(args: &RemoteArgs) -> anyhow::Result<ClientSession<TcpStream>> {
    let stream = TcpStream::connect(&args.addr)
        .await
        .with_context(|| format!("connecting to {}", args.addr))?;
    let session = ClientSession::connect_repository(
        stream,
        &args.name,
        args.token.clone(),
        SyncConfig::default(),
    )
    .await?;
    Ok(session)
}

async fn cmd_fetch(path: &Path, args: RemoteArgs) -> anyhow::Result<()> {
    let repo = Arc::new(open(path)?);
    let session = connect(&args).await?;
    let summary = session.fetch(repo, vec![]).await?;
    if summary.is_up_to_date() {
        println!("Fetching from {}... {}", args.name.bold(), "up to date".green());
    } else {
        println!(
            "{} Fetched {} operations, {} objects from {}",
            "✓".green().bold(),
            summary.operations.len(),
            summary.objects,
            args.name.bold()
        );
    }
    if summary.heads.len() > 1 {
        println!("  {} heads; the next transaction will merge them", summary.heads.len());
    }
    Ok(())
}

/// Bookmark updates to report on: the named ones, or every local bookmark.
fn bookmark_updates(view: &View, names: &[String]) -> anyhow::Result<Vec<RefUpdate>> {
    let mut updates = Vec::new();
    for (name, target) in &view.bookmarks {
        if !names.is_empty() && !names.contains(name) {
            continue;
        }
        match target {
            RefTarget::Normal(id) => {
                updates.push(RefUpdate::bookmark(name.clone(), None, Some(*id)))
            }
            RefTarget::Conflicted { .. } => {
                if !names.is_empty() {
                    bail!("bookmark {name} is conflicted locally; resolve it before pushing");
                }
            }
        }
    }
    if let Some(missing) = names.iter().find(|n| !view.bookmarks.contains_key(*n)) {
        bail!("no local bookmark named {missing}");
    }
    Ok(updates)
}

async fn cmd_push(path: &Path, args: PushArgs) -> anyhow::Result<()> {
    let repo = Arc::new(open(path)?);
    let head = repo.reconcile_heads("anvil-cli")?;
    let updates = bookmark_updates(&repo.view_at(&head)?, &args.bookmarks)?;

    let session = connect(&args.remote).await?;
    let summary = session.push(repo, updates).await?;
    let head = summary
        .new_op_head
        .map(|h| h.short_hex())
        .unwrap_or_else(|| "-".into());
    match summary.status {
        PushStatus::Ok => println!(
            "{} Pushed to {} (op {})",
            "✓".green().bold(),
            args.remote.name.bold(),
            head.cyan()
        ),
        PushStatus::Conflict => println!(
            "{} Pushed to {} (op {}) with conflicts",
            "!".yellow().bold(),
            args.remote.name.bold(),
            head.cyan()
        ),
        PushStatus::Rejected => {
            println!("{} Push to {} rejected", "✗".red().bold(), args.remote.name.bold())
        }
    }
    for result in &summary.ref_results {
        match result {
            RefResult::Ok { name, .. } => println!("  {} {}", "ok".green(), name),
            RefResult::Conflict { name, target, .. } => {
                println!("  {} {} -> {}", "conflict".yellow(), name, target)
            }
            RefResult::Stale { name, current, .. } => {
                let current = current
                    .as_ref()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "absent".into());
                println!("  {} {} (now {})", "stale".yellow(), name, current)
            }
            RefResult::Rejected { name, reason, .. } => {
                println!("  {} {}: {}", "rejected".red(), name, reason)
            }
        }
    }
    if summary.status == PushStatus::Rejected {
        bail!("push rejected");
    }
    Ok(())
}
