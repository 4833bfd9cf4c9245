//! ride-watch: follow the signed-in user's active ride from a terminal.
//!
//! Configuration comes from `RIDESHARE_*` environment variables.

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    use std::rc::Rc;

    use anyhow::Context;
    use rideshare_client::{
        logging, ws::WsConnector, ApiClient, ClientConfig, RideChannelSession, StoreEvent,
    };

    logging::init();

    let config = ClientConfig::from_env();
    if config.auth_token.is_none() {
        anyhow::bail!("RIDESHARE_AUTH_TOKEN is not set");
    }

    let api = ApiClient::new()
        .with_base_url(config.api_base_url.clone())
        .with_token(config.auth_token.clone());
    let connector = WsConnector::new(config.ws_connect_url(), config.reconnect.clone());
    let session = RideChannelSession::create(config, Rc::new(api), Rc::new(connector));

    session.store().subscribe(|event, state| {
        if let StoreEvent::Loading = event {
            return;
        }
        match &state.ride {
            Some(ride) => tracing::info!(
                ride = %ride.id,
                status = %ride.status,
                version = state.version,
                stale = state.stale,
                "active ride"
            ),
            None => tracing::info!(version = state.version, "no active ride"),
        }
    });

    session.mount();
    session
        .engine()
        .refresh()
        .await
        .context("initial active ride fetch")?;

    tokio::select! {
        _ = session.clone().run() => {}
        _ = session.clone().poll() => {}
        res = tokio::signal::ctrl_c() => res.context("waiting for ctrl-c")?,
    }

    session.dispose();
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn main() {}
