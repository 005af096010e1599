// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Loom - local coding assistant over an indexed project
#[derive(Parser, Debug)]
#[command(name = "loom")]
#[command(version, about = "Local coding assistant over an indexed project")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file (defaults to ~/.loom/settings.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan, parse and index a project
    Index(IndexArgs),

    /// List or delete stored sessions of a project
    Sessions(SessionsArgs),

    /// Start an interactive session
    Chat(ChatArgs),
}

/// Arguments for the index subcommand
#[derive(clap::Args, Debug)]
pub struct IndexArgs {
    /// Project root
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Drop the stored index before indexing
    #[arg(long)]
    pub clear: bool,
}

/// Arguments for the sessions subcommand
#[derive(clap::Args, Debug)]
pub struct SessionsArgs {
    /// Project root
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Delete the session with this id
    #[arg(long)]
    pub delete: Option<String>,
}

/// Arguments for the chat subcommand
#[derive(clap::Args, Debug)]
pub struct ChatArgs {
    /// Project root
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Approve every edit and command without asking
    #[arg(long)]
    pub trust: bool,

    /// Continue a stored session
    #[arg(short, long)]
    pub resume: Option<String>,

    /// Model override
    #[arg(short, long)]
    pub model: Option<String>,
}
