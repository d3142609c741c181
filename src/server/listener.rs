use anyhow::Context;
use mio::net::TcpListener;
use std::net::SocketAddr;
use tracing::info;

use crate::config::Config;
use crate::http::connection::ServeContext;
use crate::reactor::{MioSelector, Reactor};
use crate::static_files::resolver::DocumentRoot;

/// Binds a non-blocking listener. `[::]` binds dual-stack where the platform
/// default allows IPv4-mapped clients.
pub fn bind(addr: &str) -> anyhow::Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid listen address {addr:?}"))?;

    TcpListener::bind(addr).with_context(|| format!("binding {addr}"))
}

/// Creates the reactor with the document root, limits and listener taken from `cfg`.
pub fn build(cfg: &Config) -> anyhow::Result<Reactor<MioSelector>> {
    let root = DocumentRoot::new(&cfg.static_files.root).with_context(|| {
        format!("opening document root {}", cfg.static_files.root.display())
    })?;
    info!("Serving files from {}", root.path().display());

    let listener = bind(&cfg.server.listen_addr)?;
    info!("Listening on {}", listener.local_addr()?);

    let ctx = ServeContext::from_config(root, cfg);
    let mut reactor = Reactor::new(MioSelector::new()?, ctx);
    reactor.register_acceptor(listener)?;

    Ok(reactor)
}

/// Builds the reactor and runs it on the calling thread.
pub fn run(cfg: &Config) -> anyhow::Result<()> {
    build(cfg)?.run()?;
    Ok(())
}
