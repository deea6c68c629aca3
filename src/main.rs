use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use efnotify::config;
use efnotify::metrics::{MetricsSink, PrometheusSink};
use efnotify::models::notification::Filter;
use efnotify::store::Mutation;
use efnotify::toast::ToastEvent;
use efnotify::NotifyClient;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "efnotify"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "efnotify=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Listen) | None => run_listen(cfg).await,
        Some(cli::Commands::Unread) => {
            let client = NotifyClient::new(&cfg, None)?;
            let view = client.badge().refresh().await;
            println!("{}", view.count);
            Ok(())
        }
        Some(cli::Commands::Cursor) => {
            let client = NotifyClient::new(&cfg, None)?;
            println!("{}", client.store().cursor().await);
            Ok(())
        }
        Some(cli::Commands::Inbox { command }) => {
            let client = NotifyClient::new(&cfg, None)?;
            handle_inbox_command(&client, command).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_listen(cfg: config::Config) -> anyhow::Result<()> {
    let metrics = Arc::new(PrometheusSink::new()?);
    let sink: Arc<dyn MetricsSink> = metrics.clone();
    let client = NotifyClient::new(&cfg, Some(sink))?;

    let mut toast_events = client.toasts().subscribe();
    let mut badge = client.badge().subscribe();
    let handle = client.start().await;

    tracing::info!(
        server = %cfg.server_url,
        origin = %cfg.origin(),
        mode = ?cfg.mode,
        "efnotify listening (Ctrl-C to stop)"
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = toast_events.recv() => match event {
                Ok(ToastEvent::Shown(vm)) => {
                    let link = vm.actions.first().map(|a| a.href.as_str()).unwrap_or("");
                    tracing::info!(id = %vm.id, title = %vm.title, message = %vm.message, link, "toast shown");
                }
                Ok(ToastEvent::Removed { id, reason, .. }) => {
                    tracing::info!(id = %id, ?reason, "toast removed");
                }
                Ok(other) => tracing::debug!(event = ?other, "toast event"),
                Err(e) => tracing::debug!(error = %e, "toast event stream lagged"),
            },
            changed = badge.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = badge.borrow_and_update().clone();
                tracing::info!(unread = view.count, announcement = %view.announcement, "badge updated");
            }
        }
    }

    handle.abort();
    tracing::debug!(metrics = %metrics.encode(), "toast metrics at shutdown");
    tracing::info!("efnotify stopped");
    Ok(())
}

async fn handle_inbox_command(client: &NotifyClient, cmd: cli::InboxCommands) -> anyhow::Result<()> {
    let store = client.store();
    match cmd {
        cli::InboxCommands::List { filter } => {
            let filter: Filter = filter.parse().map_err(anyhow::Error::msg)?;
            let mut center = client.center().await;
            let view = center.set_filter(filter).await;
            if view.empty {
                println!("No notifications.");
            } else {
                println!("{:<24} {:<8} {:<17} {:<7} TITLE", "ID", "CHIP", "CREATED", "UNREAD");
                for row in &view.rows {
                    println!(
                        "{:<24} {:<8} {:<17} {:<7} {}",
                        row.id, row.chip_label, row.created_label, row.unread, row.title
                    );
                }
            }
        }
        cli::InboxCommands::Read { id } => {
            if store.update(&id, Mutation::MarkRead).await? {
                println!("Notification {} marked read.", id);
            } else {
                println!("Notification {} not found, dismissed or already read.", id);
            }
        }
        cli::InboxCommands::Toggle { id } => {
            if store.update(&id, Mutation::ToggleRead).await? {
                println!("Notification {} toggled.", id);
            } else {
                println!("Notification {} not found or dismissed.", id);
            }
        }
        cli::InboxCommands::Dismiss { ids } => {
            let n = store.update_many(&ids, Mutation::Dismiss).await?;
            println!("{} notification(s) dismissed.", n);
        }
        cli::InboxCommands::ReadAll => {
            let n = store.mark_all_read().await?;
            println!("{} notification(s) marked read.", n);
        }
        cli::InboxCommands::DismissAll { yes } => {
            if !yes {
                anyhow::bail!("refusing to dismiss every notification without --yes");
            }
            let mut center = client.center().await;
            center.request_delete_all();
            let n = center.confirm_delete_all().await?;
            println!("{} notification(s) dismissed.", n);
        }
    }
    Ok(())
}
