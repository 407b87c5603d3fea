//! CLI command definitions and dispatch.

mod login;
mod logout;
mod push;
mod version;

use clap::{Parser, Subcommand};

/// Multiarch — publish multi-platform manifest lists and image indexes.
#[derive(Parser)]
#[command(name = "multiarch", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Push a manifest list / OCI index assembled from existing images
    Push(push::PushArgs),
    /// Store registry credentials
    Login(login::LoginArgs),
    /// Remove stored registry credentials
    Logout(logout::LogoutArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Push(args) => push::execute(args).await,
        Command::Login(args) => login::execute(args).await,
        Command::Logout(args) => logout::execute(args).await,
        Command::Version(args) => version::execute(args).await,
    }
}
