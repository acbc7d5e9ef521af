use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, instrument};

use crate::auth::HtpasswdFile;
use crate::connection::Connection;
use crate::session::Session;
use crate::storage::Storage;
use crate::Error;

/// Binds the listener and serves sessions until the task is dropped. Every
/// accepted connection gets its own task; the storage engine and the
/// credential validator are shared across all of them.
pub async fn run(
    addr: &str,
    storage: Arc<dyn Storage>,
    validator: Option<Arc<HtpasswdFile>>,
) -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let listener = TcpListener::bind(addr).await?;

    if validator.is_none() {
        info!("authentication is disabled");
    }
    info!("cache server listening on {}", listener.local_addr()?);

    loop {
        let (socket, client_address) = listener.accept().await?;
        let storage = storage.clone();
        let validator = validator.clone();
        info!("Accepted connection from {:?}", client_address);

        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, client_address, storage, validator).await {
                error!("session failed: {}", e);
            }
        });
    }
}

#[instrument(
    name = "connection",
    skip(stream, storage, validator),
    fields(client_address = %client_address)
)]
async fn handle_connection(
    stream: TcpStream,
    client_address: SocketAddr,
    storage: Arc<dyn Storage>,
    validator: Option<Arc<HtpasswdFile>>,
) -> Result<(), Error> {
    let session = Session::new(Connection::new(stream), storage, validator);
    session.serve().await?;

    info!("Connection closed");
    Ok(())
}
