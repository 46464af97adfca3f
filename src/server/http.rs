use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use axum::Router;
use axum_server::Handle;
use tokio_util::sync::CancellationToken;

use crate::error::ApiResult;

pub struct HttpServer {
    addr: SocketAddr,
    router: Router,
    handle: Handle,
}

impl HttpServer {
    #[must_use]
    pub fn http(listen_addr: Ipv4Addr, listen_port: u16, router: Router) -> Self {
        Self {
            addr: SocketAddr::from((listen_addr, listen_port)),
            router,
            handle: Handle::new(),
        }
    }

    /// Serve until the token is cancelled, then drain open connections.
    pub async fn run(self, cancel: CancellationToken) -> ApiResult<()> {
        log::info!("Opening listen port on {}", self.addr);

        tokio::spawn({
            let handle = self.handle.clone();
            let addr = self.addr;
            async move {
                cancel.cancelled().await;
                log::info!("Stopping server {addr}");
                handle.graceful_shutdown(Some(Duration::from_secs(1)));
            }
        });

        axum_server::bind(self.addr)
            .handle(self.handle)
            .serve(self.router.into_make_service())
            .await?;

        Ok(())
    }
}
