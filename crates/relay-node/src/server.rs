//! Router construction, startup wiring and shutdown ordering.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use axum::{
    routing::{get, post},
    Router,
};
use relay_state::{SolutionCache, SubscriptionRegistry};
use relay_upstream::{Upstream, WsUpstream, WsUpstreamConfig};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api;
use crate::config::RelayConfig;
use crate::relay::IntentRelay;
use crate::state::AppState;

/// Create the API router.
///
/// dApp routes exist only when dApp credentials are configured, the solver
/// stream only when solver credentials are.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new().route("/ping", get(api::health::ping));

    if state.relay.serves_dapp() {
        router = router
            .route("/userOperation", post(api::dapp::user_operation))
            .route("/solverOperations", get(api::dapp::solver_operations));
    }

    if state.relay.serves_solvers() {
        router = router.route("/ws/solver", get(api::solver::solver_stream));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Open the upstream connection described by the config.
pub async fn connect_upstream(config: &RelayConfig) -> anyhow::Result<Arc<dyn Upstream>> {
    let ws_url = config.upstream.ws_url.as_deref().filter(|u| !u.is_empty());

    let Some(url) = ws_url else {
        bail!("gRPC upstream transport is not supported by this build, set upstream.ws_url");
    };

    if config.upstream.grpc_url.is_some() {
        warn!("both upstream.ws_url and upstream.grpc_url are set, using ws_url");
    }

    let upstream = WsUpstream::connect(WsUpstreamConfig {
        url: url.to_string(),
        auth_header: config.upstream.auth_header.clone(),
    })
    .await
    .with_context(|| format!("failed to connect to upstream at {}", url))?;

    info!(url = %url, "connected to upstream");
    Ok(Arc::new(upstream))
}

/// Build the shared state and install the upstream feeds.
///
/// Spawns the cache sweeper; it stops on its own once the cache is dropped.
pub async fn build_state(
    config: &RelayConfig,
    upstream: Arc<dyn Upstream>,
) -> anyhow::Result<AppState> {
    let cache = Arc::new(SolutionCache::new(Duration::from_secs(config.cache_ttl_secs)));
    cache.spawn_sweeper();

    let registry = Arc::new(SubscriptionRegistry::with_queue_capacity(
        config.notification_queue_capacity,
    ));

    let relay = Arc::new(IntentRelay::new(
        upstream,
        cache,
        Arc::clone(&registry),
        config.dapp.clone(),
        config.solver.clone(),
    ));

    relay
        .start()
        .await
        .context("failed to subscribe to upstream feeds")?;

    Ok(AppState::new(relay, registry))
}

/// Serve until `shutdown` resolves, then tear down in order: HTTP server,
/// upstream connection, subscription registry.
pub async fn serve<F>(
    listener: TcpListener,
    state: AppState,
    shutdown: F,
    grace: Duration,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state.clone());
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let mut server = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = stop_rx.await;
        })
        .await
    });

    tokio::select! {
        _ = shutdown => {
            info!("shutdown signal received, stopping services");
        }
        result = &mut server => {
            // The server stopped on its own; still release upstream and solvers.
            finish(&state).await;
            return match result {
                Ok(served) => served.context("http server failed"),
                Err(e) => Err(e).context("http server task failed"),
            };
        }
    }

    let _ = stop_tx.send(());

    // Solver streams outlive the HTTP server; closing the registry ends them.
    match tokio::time::timeout(grace, &mut server).await {
        Ok(Ok(Ok(()))) => info!("http server stopped"),
        Ok(Ok(Err(e))) => warn!(error = %e, "http server stopped with error"),
        Ok(Err(e)) => warn!(error = %e, "http server task failed"),
        Err(_) => {
            warn!(grace_secs = grace.as_secs(), "http server did not stop in time, aborting");
            server.abort();
        }
    }

    finish(&state).await;
    info!("intent relay stopped");
    Ok(())
}

async fn finish(state: &AppState) {
    if let Err(e) = state.relay.close().await {
        warn!(error = %e, "failed to close intent relay");
    }
    state.registry.close();
}

/// Connect, build, bind and serve until a termination signal arrives.
pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let upstream = connect_upstream(&config).await?;
    let state = build_state(&config, upstream).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!(
        %addr,
        dapp = state.relay.serves_dapp(),
        solver = state.relay.serves_solvers(),
        "listening"
    );

    serve(
        listener,
        state,
        shutdown_signal(),
        Duration::from_secs(config.shutdown_grace_secs),
    )
    .await
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
