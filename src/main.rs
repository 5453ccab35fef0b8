use std::{process, sync::Arc};

use cachewire::{
    application::{
        context::{NodeBuilder, NodeContext},
        error::AppError,
        repos::ContentStore,
    },
    cache::{CacheConfig, payload},
    cluster::{ClusterConfig, WireMessage},
    config,
    infra::{
        content_store::InMemoryContentStore,
        error::InfraError,
        http::{self, HttpState, PUBLISH_PATH, PublishRequest, PublishResponse},
        telemetry,
        transport::HttpTransport,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Publish(args) => run_publish(args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let node = build_node(&settings).await?;

    info!(
        node_id = %node.cluster.node_id(),
        peers = node.cluster.peers().len(),
        addr = %settings.server.addr,
        "Starting cluster node"
    );

    serve_http(&settings, HttpState::from(&node)).await
}

async fn build_node(settings: &config::Settings) -> Result<NodeContext, AppError> {
    let store: Arc<dyn ContentStore> = match settings.content.seed_file.as_deref() {
        Some(path) => Arc::new(InMemoryContentStore::load_seed_file(path).await?),
        None => {
            warn!("No content seed configured; starting with an empty store");
            Arc::new(InMemoryContentStore::new())
        }
    };

    let cluster_config = ClusterConfig::from(&settings.cluster);
    let transport = Arc::new(HttpTransport::new(cluster_config.timeout)?);

    Ok(NodeBuilder::new(
        CacheConfig::from(&settings.cache),
        cluster_config,
        store,
        transport,
    )
    .build())
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    let (stop_tx, stop_rx) = futures::channel::oneshot::channel::<()>();
    let mut server = tokio::spawn(
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .into_future(),
    );

    tokio::select! {
        joined = &mut server => return server_outcome(joined),
        _ = shutdown_signal() => {
            info!("Shutdown signal received; draining connections");
            let _ = stop_tx.send(());
        }
    }

    match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
        Ok(joined) => server_outcome(joined),
        Err(_) => {
            warn!(
                grace_seconds = settings.server.graceful_shutdown.as_secs(),
                "Graceful shutdown timed out"
            );
            Ok(())
        }
    }
}

fn server_outcome(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(result) => result.map_err(|err| AppError::from(InfraError::from(err))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn run_publish(args: config::PublishArgs) -> Result<(), AppError> {
    let message = match args.action {
        config::PublishAction::RefreshAll => WireMessage::RefreshAll,
        config::PublishAction::Refresh { ids } => WireMessage::RefreshByIds { ids },
        config::PublishAction::Remove { ids } => WireMessage::RemoveByIds { ids },
        config::PublishAction::Payload { file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .map_err(|err| AppError::from(InfraError::from(err)))?;
            // Refuse locally rather than let the node reject it.
            payload::deserialize(&raw).map_err(|err| {
                AppError::validation(format!("{}: {err}", file.display()))
            })?;
            WireMessage::RefreshByPayload { payload: raw }
        }
    };

    let url = format!("{}{PUBLISH_PATH}", args.node.trim_end_matches('/'));
    let request = PublishRequest {
        refresher_id: args.refresher_id,
        message,
    };

    info!(node = %args.node, kind = request.message.kind(), "Publishing");
    let response = reqwest::Client::new()
        .post(&url)
        .json(&request)
        .send()
        .await
        .map_err(|err| AppError::from(InfraError::transport(&url, err)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::from(InfraError::transport(
            &url,
            format!("status {status}: {body}"),
        )));
    }

    let published: PublishResponse = response
        .json()
        .await
        .map_err(|err| AppError::from(InfraError::transport(&url, err)))?;

    let failed: Vec<&str> = published
        .peers
        .iter()
        .filter(|peer| peer.error.is_some())
        .map(|peer| peer.peer.as_str())
        .collect();
    info!(
        message_id = %published.message_id,
        ack = published.local.ack.as_str(),
        peers = published.peers.len(),
        failed_peers = ?failed,
        "Broadcast accepted"
    );

    let rendered = serde_json::to_string_pretty(&published)
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    println!("{rendered}");

    if failed.is_empty() {
        Ok(())
    } else {
        Err(AppError::unexpected(format!(
            "broadcast did not reach: {}",
            failed.join(", ")
        )))
    }
}
