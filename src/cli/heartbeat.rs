use clap::Parser;
use reqwest::Url;
use tariff_ledger::api::heartbeat;

#[derive(Parser)]
pub struct HeartbeatArgs {
    #[clap(long = "heartbeat-url", env = "HEARTBEAT_URL")]
    url: Option<Url>,
}

impl HeartbeatArgs {
    pub async fn send(&self) {
        if let Some(url) = &self.url {
            heartbeat::send(url.clone()).await;
        }
    }
}
