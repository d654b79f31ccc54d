use std::sync::Arc;

use axum::Router;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_rustls::TlsAcceptor;
use tower::Service;

use mqstore::keypair::{server_config, KeyStore};
use mqstore::Result;

/// Accept loop terminating TLS with whichever keypair is current at each handshake
pub(crate) async fn serve(
    listener: TcpListener,
    app: Router,
    keys: Arc<KeyStore>,
    mut rx: oneshot::Receiver<()>,
) -> Result<()> {
    let acceptor = TlsAcceptor::from(Arc::new(server_config(keys)?));
    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    log::warn!("accept failure, {:?}", e);
                    continue;
                }
            },
            _ = &mut rx => break,
        };

        let acceptor = acceptor.clone();
        let app = app.clone();
        tokio::spawn(async move {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    log::debug!("tls handshake failure, peer: {}, {:?}", peer, e);
                    return;
                }
            };
            let service =
                hyper::service::service_fn(move |req: hyper::Request<Incoming>| app.clone().call(req));
            if let Err(e) =
                hyper::server::conn::http1::Builder::new().serve_connection(TokioIo::new(stream), service).await
            {
                log::debug!("connection closed with error, peer: {}, {:?}", peer, e);
            }
        });
    }
    log::info!("HTTPS API stopped");
    Ok(())
}
