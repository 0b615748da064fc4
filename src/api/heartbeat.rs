use reqwest::Url;

use crate::{api::client, prelude::*};

/// Ping the uptime monitor after a successful run.
#[instrument(skip_all)]
pub async fn send(url: Url) {
    info!(%url, "sending a heartbeat…");
    let result = match client::try_new() {
        Ok(client) => client.post(url).send().await.map_err(Error::from),
        Err(error) => Err(error),
    };
    if let Err(error) = result {
        warn!("failed to send the heartbeat: {error:#}");
    }
}
