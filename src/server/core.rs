use log::{debug, error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use crate::config::AppConfig;
use crate::filesystem::ProfileRegistry;
use crate::server::connection::{ConnectionSettings, handle_connection};

pub struct Server {
    listener: TcpListener,
    registry: Arc<ProfileRegistry>,
    slots: Arc<Semaphore>,
    max_connections: usize,
    connection: ConnectionSettings,
}

impl Server {
    pub async fn bind(config: &AppConfig, registry: ProfileRegistry) -> io::Result<Self> {
        let address = config.listen_address();
        let listener = match TcpListener::bind(&address).await {
            Ok(listener) => {
                info!("Server bound to {}", address);
                listener
            }
            Err(e) => {
                error!("Failed to bind to {}: {}", address, e);
                return Err(e);
            }
        };

        Ok(Self {
            listener,
            registry: Arc::new(registry),
            slots: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
            connection: ConnectionSettings {
                chunk_size: config.buffer_size,
                idle_timeout: config.request_timeout(),
            },
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn start(&self) {
        info!(
            "Starting roxy-fileman on {} (max {} concurrent requests, {:?} idle timeout, profiles: {:?}, default '{}')",
            self.local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown address".into()),
            self.max_connections,
            self.connection.idle_timeout,
            self.registry.profiles(),
            self.registry.default_profile()
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let registry = Arc::clone(&self.registry);
                    let slots = Arc::clone(&self.slots);
                    let connection = self.connection;

                    // Spawn a task for each connection so the accept loop doesn't block
                    tokio::spawn(async move {
                        let Ok(_slot) = slots.acquire_owned().await else {
                            return;
                        };
                        debug!("Serving {}", addr);
                        if let Err(e) = handle_connection(stream, addr, registry, connection).await {
                            warn!("Failed to handle client {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}
