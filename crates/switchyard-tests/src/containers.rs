//! Testcontainer configurations for integration tests.

use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::nats::Nats;

/// NATS container with JetStream for event bus tests.
pub struct NatsContainer {
    #[allow(dead_code)] // Kept to maintain container lifetime
    container: ContainerAsync<Nats>,
    url: String,
}

impl NatsContainer {
    pub async fn start() -> anyhow::Result<Self> {
        let container = Nats::default()
            .with_tag("2.10-alpine")
            .with_cmd(["-js"]) // Enable JetStream
            .start()
            .await?;

        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(4222).await?;

        let url = format!("nats://{}:{}", host, port);

        Ok(Self { container, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}
