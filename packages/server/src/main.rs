use std::net::SocketAddr;
use std::sync::Arc;

use common::StorageBackend;
use common::storage::{filesystem::FilesystemBackend, s3::S3Backend};
use server::config::{AppConfig, StorageDriver};
use server::database::init_db;
use server::state::AppState;
use tracing::{Level, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = AppConfig::load()?;
    let db = init_db(&config.database.url).await?;

    let backend: Arc<dyn StorageBackend> = match config.storage.driver {
        StorageDriver::Local => {
            Arc::new(FilesystemBackend::new(config.storage.root_path.clone().into()).await?)
        }
        StorageDriver::Remote => {
            let s3 = &config.storage.s3;
            Arc::new(S3Backend::new(
                &s3.bucket,
                &s3.region,
                s3.endpoint.as_deref(),
                &s3.access_key,
                &s3.secret_key,
            )?)
        }
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app = server::build_router(AppState {
        db,
        backend,
        config,
    });

    info!("FleetHub storage listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
