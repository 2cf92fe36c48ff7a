use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use cairn_server::{ReplicationServer, ServerConfig, ServerOptions};
use cairn_store::{CasTransform, ContentStore, PathTransform, PlainTransform};
use colored::Colorize;

use crate::cli::{Cli, Command, OutputFormat, PathArgs, PutArgs, ServeArgs};

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args).await,
        Command::Put(args) => cmd_put(args).await,
        Command::Path(args) => cmd_path(args, &cli.format),
    }
}

/// Config file first, then command-line overrides.
fn serve_config(args: &ServeArgs) -> anyhow::Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(listen) = &args.listen {
        config.listen_addr = listen.clone();
    }
    if let Some(root) = &args.root {
        config.storage_root = root.clone();
    }
    if !args.bootstrap.is_empty() {
        config.bootstrap_nodes = args.bootstrap.clone();
    }
    Ok(config)
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = serve_config(&args)?;
    let server = Arc::new(ReplicationServer::new(config, ServerOptions::default()));

    server.listen().await?;
    let addr = server
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_default();
    println!("{} Cairn node on {} (root: {})", "✓".green().bold(), addr.bold(), server.store().root().display());

    server.bootstrap_network();
    for addr in &server.config().bootstrap_nodes {
        println!("  Bootstrap: dialing {}", addr.bold());
    }

    let mut run = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.run().await })
    };
    tokio::select! {
        result = &mut run => return Ok(result??),
        signal = tokio::signal::ctrl_c() => signal.context("waiting for Ctrl-C")?,
    }

    println!("Stopping...");
    server.stop();
    run.await??;
    println!("{} Stopped.", "✓".green());
    Ok(())
}

async fn cmd_put(args: PutArgs) -> anyhow::Result<()> {
    let config = ServerConfig {
        listen_addr: args.listen.clone(),
        storage_root: args.root.clone(),
        bootstrap_nodes: args.bootstrap.clone(),
        ..Default::default()
    };
    let server = Arc::new(ReplicationServer::new(config, ServerOptions::default()));
    server.listen().await?;
    server.bootstrap_network();

    let run = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.run().await })
    };

    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.wait_secs);
    while server.peer_count() == 0 {
        if tokio::time::Instant::now() >= deadline {
            server.stop();
            run.await??;
            bail!("no peer admitted within {}s", args.wait_secs);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let file = tokio::fs::File::open(&args.file)
        .await
        .with_context(|| format!("opening {}", args.file.display()))?;
    let result = server.store_and_replicate(&args.key, file).await;
    let peers = server.peers();

    server.stop();
    run.await??;

    let size = result?;
    println!("{} Stored {} ({} bytes)", "✓".green().bold(), args.key.yellow(), size);
    for peer in peers {
        println!("  {} {}", "replicated:".green(), peer);
    }
    Ok(())
}

fn path_report(args: &PathArgs) -> serde_json::Value {
    let transform: Arc<dyn PathTransform> = if args.plain {
        Arc::new(PlainTransform)
    } else {
        Arc::new(CasTransform)
    };
    let store = ContentStore::new(args.root.clone(), transform);
    let path_key = store.path_key(&args.key);
    serde_json::json!({
        "key": args.key,
        "directory": path_key.directory.display().to_string(),
        "filename": path_key.filename,
        "path": path_key.full_path().display().to_string(),
    })
}

fn cmd_path(args: PathArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let report = path_report(&args);
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!("Key {}", args.key.yellow().bold());
            println!("  Directory: {}", report["directory"].as_str().unwrap_or_default().cyan());
            println!("  Filename:  {}", report["filename"].as_str().unwrap_or_default());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn path_report_cas() {
        let args = PathArgs {
            key: "momsbestpicture".into(),
            root: PathBuf::from("forever-store"),
            plain: false,
        };
        let report = path_report(&args);
        assert_eq!(report["filename"], "6804429f74181a63c50c3d81d733a12f14a353ff");
        assert_eq!(
            report["directory"],
            PathBuf::from("forever-store/74181a63/c50c3d81/d733a12f/14a353ff")
                .display()
                .to_string()
        );
    }

    #[test]
    fn path_report_plain() {
        let args = PathArgs {
            key: "photo".into(),
            root: PathBuf::from("store"),
            plain: true,
        };
        assert_eq!(path_report(&args)["filename"], "photo");
    }

    #[test]
    fn serve_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "listen_addr = \"127.0.0.1:4000\"\nstorage_root = \"from-file\"\n").unwrap();

        let args = ServeArgs {
            config: Some(path),
            listen: None,
            root: Some(PathBuf::from("from-flag")),
            bootstrap: vec!["127.0.0.1:5000".into()],
        };
        let config = serve_config(&args).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:4000");
        assert_eq!(config.storage_root, PathBuf::from("from-flag"));
        assert_eq!(config.bootstrap_nodes, vec!["127.0.0.1:5000"]);
    }

    #[test]
    fn serve_missing_config_fails() {
        let args = ServeArgs {
            config: Some(PathBuf::from("/definitely/not/here.toml")),
            listen: None,
            root: None,
            bootstrap: vec![],
        };
        assert!(serve_config(&args).is_err());
    }
}
