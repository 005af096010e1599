// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use loom::agent::{Agent, OllamaClient};
use loom::cli::{ChatArgs, IndexArgs, SessionsArgs};
use loom::config::Settings;
use loom::indexer::Indexer;
use loom::session::Session;
use loom::storage::StorageGateway;
use loom::tools::{
    confirmation_channel, prompt_terminal, PermissionManager, ToolContext, ToolExecutor,
    ToolRegistry,
};
use loom::utils;

use super::chat_ui::{
    print_error, print_help, print_index_summary, print_stats, print_tool_progress, print_turn,
    print_welcome, read_user_input, IndexProgress,
};

async fn open_storage(settings: &Settings) -> Result<Arc<StorageGateway>> {
    let storage = Arc::new(StorageGateway::from_settings(settings));
    storage
        .connect()
        .await
        .with_context(|| format!("opening {}", settings.storage_path().display()))?;
    Ok(storage)
}

fn project_root(path: &Path) -> Result<std::path::PathBuf> {
    let root = path
        .canonicalize()
        .with_context(|| format!("project root {}", path.display()))?;
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }
    // Run from a subdirectory, the enclosing project is meant.
    if path == Path::new(".") {
        return Ok(utils::find_project_root_from(&root).unwrap_or(root));
    }
    Ok(root)
}

async fn index_with_progress(indexer: &Indexer) -> Result<()> {
    let mut progress = IndexProgress::new();
    let result = indexer.index_project(|p| progress.update(p)).await;
    progress.finish();
    let stats = result?;
    print_index_summary(&stats)?;
    Ok(())
}

pub(super) async fn run_index(args: IndexArgs, settings: Settings) -> Result<()> {
    let root = project_root(&args.path)?;
    let storage = open_storage(&settings).await?;
    let indexer = Indexer::new(&root, storage.clone(), &settings.indexer);

    if args.clear {
        storage.clear_project(indexer.project_name()).await?;
        tracing::info!("Cleared stored index for {}", indexer.project_name());
    }

    index_with_progress(&indexer).await?;
    storage.disconnect().await?;
    Ok(())
}

pub(super) async fn run_sessions(args: SessionsArgs, settings: Settings) -> Result<()> {
    let root = project_root(&args.path)?;
    let storage = open_storage(&settings).await?;
    let project = Indexer::new(&root, storage.clone(), &settings.indexer)
        .project_name()
        .to_string();

    if let Some(id) = args.delete {
        storage.delete_session(&id).await?;
        println!("Deleted session {}", id);
        return Ok(());
    }

    let mut sessions: Vec<Session> = Vec::new();
    for id in storage.list_sessions().await? {
        match storage.load_session(&id, settings.session.undo_capacity).await? {
            Some(session) if session.project_name == project => sessions.push(session),
            _ => {}
        }
    }

    if sessions.is_empty() {
        println!("No sessions for {}", project);
        return Ok(());
    }
    sessions.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
    for session in sessions {
        let first = session
            .input_history
            .first()
            .map(|s| utils::truncate_chars(s, 60))
            .unwrap_or_default();
        println!(
            "{}  {}  {:>3} messages  {}",
            session.id,
            session.last_activity_at.format("%Y-%m-%d %H:%M"),
            session.history.len(),
            first
        );
    }
    Ok(())
}

pub(super) async fn run_chat(args: ChatArgs, mut settings: Settings) -> Result<()> {
    if args.trust {
        settings.tools.trust_mode = true;
    }
    if let Some(model) = args.model {
        settings.llm.model = model;
    }

    let root = project_root(&args.path)?;
    let storage = open_storage(&settings).await?;
    let indexer = Arc::new(Indexer::new(&root, storage.clone(), &settings.indexer));

    let indexed = storage
        .get_project(indexer.project_name())
        .await?
        .is_some_and(|p| p.last_indexed_at.is_some());
    if !indexed {
        println!("Indexing {} ...", root.display());
        index_with_progress(&indexer).await?;
    }

    let (sender, mut requests) = confirmation_channel();
    let ctx = ToolContext::for_indexer(indexer.clone(), settings.tools.clone())
        .with_confirmations(sender)
        .with_progress(print_tool_progress);
    let executor = ToolExecutor::new(Arc::new(ToolRegistry::with_builtins()), ctx);
    let llm = Arc::new(OllamaClient::from_settings(&settings.llm)?);
    let agent = Agent::new(llm, executor, &settings);

    let mut session = match &args.resume {
        Some(id) => agent.resume_session(id).await?,
        None => agent.new_session(),
    };
    let mut permissions = if settings.tools.trust_mode {
        PermissionManager::with_trust_mode()
    } else {
        PermissionManager::new()
    };

    print_welcome(indexer.project_name(), &session, settings.tools.trust_mode)?;

    loop {
        let Some(input) = read_user_input()? else {
            break;
        };
        if input.is_empty() {
            continue;
        }
        if utils::is_exit_command(&input) {
            break;
        }

        if let Some((command, _)) = utils::parse_slash_command(&input) {
            match command {
                "undo" => match agent.undo_last(&mut session).await {
                    Ok(Some(entry)) => println!("Reverted: {}", entry.description),
                    Ok(None) => println!("Nothing to undo"),
                    Err(e) => print_error(&utils::format_error(&e)),
                },
                "stats" => print_stats(&session),
                "reindex" => {
                    if let Err(e) = index_with_progress(&indexer).await {
                        print_error(&format!("Error: {:#}", e));
                    }
                }
                "help" => print_help(),
                other => println!("Unknown command: /{} (try /help)", other),
            }
            continue;
        }

        // Confirmations arrive while the turn is suspended on them.
        let result = {
            let turn = agent.handle_message(&mut session, &input);
            tokio::pin!(turn);
            loop {
                tokio::select! {
                    result = &mut turn => break result,
                    Some(request) = requests.recv() => {
                        permissions.resolve(request, |req| prompt_terminal(req, &mut io::stdin().lock()));
                    }
                }
            }
        };

        match result {
            Ok(outcome) => print_turn(&outcome, &session)?,
            Err(e) => print_error(&utils::format_error(&e)),
        }
    }

    storage.save_session(&session).await?;
    storage.disconnect().await?;
    println!("Session saved: {}", session.id);
    Ok(())
}
