// ABOUTME: Entry point for the kubeling diagnostic CLI.
// ABOUTME: Selects the engine once, then dispatches subcommands against the runtime contract.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use futures::StreamExt;
use kubeling::config::Config;
use kubeling::error::Result;
use kubeling::runtime::traits::{ByteStream, Labels, LogOptions};
use kubeling::runtime::{OpContext, Runtime, select_runtime};
use std::env;
use tokio::io::{AsyncWriteExt, Stdout};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // --verbose wins; otherwise RUST_LOG, falling back to warnings only
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let result = run(cli).await;

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cwd = env::current_dir()?;
    let mut config = Config::resolve(&cwd)?;
    if let Some(runtime) = cli.runtime {
        config.runtime = runtime;
    }
    if let Some(socket) = cli.socket {
        config.socket = Some(socket);
    }

    let runtime = select_runtime(&config.runtime_config()?)?;
    let ctx = OpContext::new();

    // Ctrl-C cancels whatever is in flight.
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let rt = runtime.as_ref();
    match cli.command {
        Commands::Info { json } => info(rt, &ctx, json).await,
        Commands::Nodes { labels } => nodes(rt, &ctx, labels.into_iter().collect()).await,
        Commands::Logs {
            node,
            follow,
            tail,
            since,
            timestamps,
        } => {
            let opts = LogOptions {
                follow,
                tail,
                timestamps,
            };
            let stream = rt.get_node_logs(&ctx, &node, since, &opts).await?;
            pipe(stream, &mut tokio::io::stdout()).await
        }
        Commands::Exec { node, cmd } => {
            let mut logs = rt.exec_in_node_get_logs(&ctx, &node, &cmd).await?;
            let mut stdout = tokio::io::stdout();
            tokio::io::copy_buf(logs.reader(), &mut stdout).await?;
            stdout.flush().await?;
            Ok(logs.wait().await?)
        }
        Commands::Kubeconfig { node } => {
            let stream = rt.get_kubeconfig(&ctx, &node).await?;
            pipe(stream, &mut tokio::io::stdout()).await
        }
        Commands::Images => {
            for image in rt.get_images(&ctx).await? {
                println!("{image}");
            }
            Ok(())
        }
    }
}

async fn info(rt: &dyn Runtime, ctx: &OpContext, json: bool) -> Result<()> {
    let info = rt.info(ctx).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Runtime:        {}", info.name);
    println!("Endpoint:       {}", info.endpoint);
    println!("Version:        {}", info.version);
    println!("OS:             {} ({})", info.os, info.os_type);
    println!("Architecture:   {}", info.arch);
    println!("Cgroup:         v{} ({})", info.cgroup_version, info.cgroup_driver);
    println!("Storage driver: {}", info.storage_driver);
    Ok(())
}

async fn nodes(rt: &dyn Runtime, ctx: &OpContext, labels: Labels) -> Result<()> {
    let nodes = rt.get_nodes_by_label(ctx, &labels).await?;
    if nodes.is_empty() {
        println!("No nodes found.");
        return Ok(());
    }

    println!("{:<32} {:<8} {:<10} {:<16} IMAGE", "NAME", "ROLE", "STATUS", "IP");
    for node in nodes {
        let ip = node.ip.map(|ip| ip.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "{:<32} {:<8} {:<10} {:<16} {}",
            node.name.as_str(),
            node.role.as_str(),
            node.state.status,
            ip,
            node.image
        );
    }
    Ok(())
}

async fn pipe(mut stream: ByteStream, out: &mut Stdout) -> Result<()> {
    while let Some(chunk) = stream.next().await {
        out.write_all(&chunk?).await?;
    }
    out.flush().await?;
    Ok(())
}
