//! ll-repo - linglong package repository tool

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ll_cli::cmd;
use ll_cli::context::Context;
use ll_cli::{Cli, Commands, ConfigCommands, LayerCommands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        cmd::completions::completions(shell);
        return Ok(());
    }

    let ctx = Context::new(cli.root.clone(), cli.quiet)?;

    match cli.command {
        Commands::List { filter } => cmd::store::list(&ctx, filter.as_deref()),
        Commands::Import { path, reference } => cmd::store::import(&ctx, &path, &reference),
        Commands::Tag { source, target } => cmd::store::tag(&ctx, &source, &target),
        Commands::Checkout {
            reference,
            target,
            subpath,
            all,
        } => cmd::store::checkout(&ctx, &reference, &target, &subpath, all),
        Commands::Pull {
            reference,
            all,
            force,
        } => cmd::sync::pull(&ctx, &reference, all, force).await,
        Commands::PullIsolated { url, reference } => {
            cmd::sync::pull_isolated(&ctx, &url, &reference).await
        }
        Commands::Push {
            reference,
            poll_interval,
        } => cmd::sync::push(&ctx, &reference, poll_interval).await,
        Commands::Latest {
            query,
            local,
            remote,
        } => cmd::resolve::latest(&ctx, &query, local, remote).await,
        Commands::LatestLayer {
            app_id,
            prefix,
            channel,
        } => cmd::resolve::latest_layer(&ctx, &channel, &app_id, &prefix),
        Commands::Prune { reference } => cmd::sync::prune(&ctx, &reference),
        Commands::Remotes => cmd::store::remotes(&ctx),
        Commands::RemoteUrl { name } => cmd::store::remote_url(&ctx, name.as_deref()),
        Commands::Config { command } => match command {
            ConfigCommands::Show => cmd::config::show(&ctx),
            ConfigCommands::SetDefault { name } => cmd::config::set_default(&ctx, &name),
            ConfigCommands::Add { name, url } => cmd::config::add(&ctx, &name, &url),
        },
        Commands::Info { path, json } => cmd::info::info(&path, json),
        Commands::Layer { command } => match command {
            LayerCommands::Pack { source, output } => cmd::layer::pack(&ctx, &source, &output),
            LayerCommands::Unpack { layer, dest } => cmd::layer::unpack(&ctx, &layer, &dest),
            LayerCommands::Inspect { layer } => cmd::layer::inspect(&layer),
        },
        Commands::Completions { .. } => Ok(()),
    }
}
