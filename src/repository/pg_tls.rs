//! PostgreSQL connections, optionally over rustls.

use rustls::ClientConfig;
use tokio_postgres::{Client, Config, NoTls};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{error, warn};

fn build_rustls_config() -> ClientConfig {
    let mut root_store = rustls::RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        warn!("Failed to load a native certificate: {}", e);
    }
    for cert in native.certs {
        root_store.add(cert).ok();
    }

    ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

pub fn make_tls_connector() -> MakeRustlsConnect {
    MakeRustlsConnect::new(build_rustls_config())
}

/// Connect to PostgreSQL and spawn the connection task.
///
/// Returns just the `Client`. The connection future runs as a background
/// tokio task until the client is dropped.
pub async fn connect(config: &Config, tls: bool) -> Result<Client, tokio_postgres::Error> {
    if tls {
        let (client, connection) = config.connect(make_tls_connector()).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {}", e);
            }
        });
        Ok(client)
    } else {
        let (client, connection) = config.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {}", e);
            }
        });
        Ok(client)
    }
}
