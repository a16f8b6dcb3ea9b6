use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use bill_inbox::channels::{DiscordNotifier, ImapMailbox};
use bill_inbox::config::AppConfig;
use bill_inbox::extraction::BillExtractor;
use bill_inbox::llm::create_provider;
use bill_inbox::pipeline::{InboxProcessor, spawn_run_worker};
use bill_inbox::server::inbox_routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let serve = match std::env::args().nth(1).as_deref() {
        None | Some("run") => false,
        Some("serve") => true,
        Some(other) => anyhow::bail!("Unknown command `{other}` (expected `run` or `serve`)"),
    };

    let config = AppConfig::from_env().context("Invalid configuration")?;

    eprintln!("📬 Bill Inbox v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!(
        "   Mailbox: {}@{}:{}/{}",
        config.mailbox.username, config.mailbox.host, config.mailbox.port, config.mailbox.folder
    );
    eprintln!("   Split: {} ways", config.discord.split_ways);

    let llm = create_provider(&config.llm).context("Failed to create LLM provider")?;
    let processor = Arc::new(InboxProcessor::new(
        Arc::new(ImapMailbox::new(config.mailbox.clone())),
        BillExtractor::new(llm, config.extraction.clone()),
        Arc::new(DiscordNotifier::new(config.discord.clone())),
    ));

    // Ctrl-C cancels whatever is in flight
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown requested");
                cancel.cancel();
            }
        });
    }

    if !serve {
        let report = processor.process(&cancel).await?;
        eprintln!(
            "   Done: {} email(s), {} bill(s), {} delivered, {} failed",
            report.emails,
            report.attachments,
            report.delivered(),
            report.failed()
        );
        if !report.skipped_attachments.is_empty() {
            eprintln!("   Skipped: {}", report.skipped_attachments.join(", "));
        }
        return Ok(());
    }

    let (queue, worker) = spawn_run_worker(
        Arc::clone(&processor),
        config.service.queue_capacity,
        cancel.clone(),
    );

    let port = config.service.port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    eprintln!("   Trigger: POST http://0.0.0.0:{port}/inbox\n");
    tracing::info!(port, "Inbox server started");

    let shutdown = cancel.clone();
    axum::serve(listener, inbox_routes(queue))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Inbox server failed")?;

    worker.await.context("Run worker panicked")?;
    Ok(())
}
