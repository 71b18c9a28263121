use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use url::Url;

use rotagate::admin::{self, AdminContext};
use rotagate::directive::DirectiveConsumer;
use rotagate::entry::{self, EntryContext};
use rotagate::observability::{logging, metrics};
use rotagate::rotation::{Registry, Rotator};
use rotagate::rules;
use rotagate::security::detection::DetectionClient;
use rotagate::security::rate_limit::DEFAULT_MAX_REQUESTS;
use rotagate::security::suspicion::{SuspicionTracker, DEFAULT_MAX_SUSPICION};
use rotagate::worker::{self, WorkerContext};
use rotagate::{health, lifecycle, net, store, Cli, StartupError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rotagate starting");

    let (cert, key) = net::tls::resolve_certificates(cli.crt.as_deref(), cli.key.as_deref())?;
    let tls = net::tls::load_rustls_config(&cert, &key).await?;

    let metrics_handle = metrics::install().map_err(|e| StartupError::Metrics(e.to_string()))?;

    let backend = Url::parse(&cli.web_server).map_err(|e| StartupError::InvalidBackend {
        url: cli.web_server.clone(),
        reason: e.to_string(),
    })?;
    let host = cli.public_host();

    let header_rules = Arc::new(match &cli.header_rules {
        Some(path) => rules::header::load(path),
        None => {
            tracing::warn!("no header rules specified, header modification is disabled");
            Vec::new()
        }
    });

    // A broken ACL file aborts; every other rule file degrades.
    let acl = match &cli.acl_file {
        Some(path) => Some(rules::acl::load(path).map_err(StartupError::from)?),
        None => None,
    };

    let store = store::connect(&cli.store_url).await?;

    let endpoints = cli.endpoints(&host);
    let registry = Arc::new(
        Registry::new(endpoints.clone(), store.clone()).ok_or(StartupError::NoEndpoints)?,
    );

    let directives = if cli.queue_system {
        let consumer = Arc::new(DirectiveConsumer::new(store.clone()));
        consumer.setup().await?;
        tokio::spawn(Arc::clone(&consumer).run_drain());
        tracing::info!("directive stream consumer enabled");
        Some(consumer)
    } else {
        None
    };

    if cli.enable_detection {
        tracing::info!(url = %cli.detection_url, "attack detection system enabled");
    } else {
        tracing::info!("attack detection system disabled");
    }

    for endpoint in &endpoints {
        let detection = if cli.enable_detection {
            Some(DetectionClient::new(cli.detection_url.clone()).map_err(StartupError::Client)?)
        } else {
            None
        };
        let ctx = WorkerContext::new(
            endpoint,
            backend.clone(),
            store.clone(),
            header_rules.clone(),
            detection,
            directives.clone(),
            DEFAULT_MAX_REQUESTS,
            cli.unsecure_cert,
        )?;
        worker::spawn_active_cache(ctx.clone());

        let port = endpoint.port;
        let proxy_id = endpoint.id.clone();
        let tls = tls.clone();
        tokio::spawn(async move {
            if let Err(e) = worker::serve(ctx, port, tls).await {
                tracing::error!(proxy_id = %proxy_id, error = %e, "proxy worker terminated");
            }
        });
    }

    tokio::spawn(Rotator::new(registry.clone()).run());

    let suspicion = cli
        .enable_detection
        .then(|| SuspicionTracker::new(store.clone(), DEFAULT_MAX_SUSPICION));

    let admin_router = if cli.api {
        let api_key = admin::generate_api_key();
        tracing::info!(api_key = %api_key, "API endpoint enabled");
        let admin_ctx = Arc::new(AdminContext {
            registry: registry.clone(),
            store: store.clone(),
            api_key,
            health_client: health::probe_client().map_err(StartupError::Client)?,
        });
        Some(admin::router(admin_ctx))
    } else {
        None
    };

    let entry_ctx = Arc::new(EntryContext {
        registry,
        acl,
        suspicion,
        metrics: metrics_handle,
        api_enabled: cli.api,
    });
    let entry_router = entry::router(entry_ctx, admin_router);

    let handle = axum_server::Handle::new();
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            lifecycle::shutdown_signal().await;
            handle.graceful_shutdown(Some(Duration::from_secs(5)));
        });
    }

    entry::serve(entry_router, cli.entry_port, tls, handle)
        .await
        .map_err(|source| StartupError::Bind {
            addr: format!("0.0.0.0:{}", cli.entry_port),
            source,
        })?;

    tracing::info!("shutdown complete");
    Ok(())
}
