//! `async_query`: WHOIS over tokio sockets.

use super::{no_server, to_raw_result, AsyncQuery, BackendMetadata, BackendSettings, QueryBackend};
use crate::protocols::{ServerDirectory, WhoisClient};
use crate::types::RawResult;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::debug;

pub const ID: &str = super::ASYNC_QUERY_ID;

#[derive(Debug, Clone)]
pub struct AsyncWhoisBackend {
    client: WhoisClient,
    servers: ServerDirectory,
}

impl AsyncWhoisBackend {
    pub fn new(settings: &BackendSettings) -> Self {
        Self {
            client: WhoisClient::new().with_timeout(settings.timeout),
            servers: settings.servers.clone(),
        }
    }
}

impl AsyncQuery for AsyncWhoisBackend {
    fn query<'a>(&'a self, domain: &'a str) -> BoxFuture<'a, RawResult> {
        async move {
            let endpoint = match self.servers.resolve(domain) {
                Ok(ep) => ep,
                Err(e) => return no_server(e),
            };
            debug!(domain, server = %endpoint.host, "querying");
            let outcome = self.client.query(domain, &endpoint).await;
            to_raw_result(&endpoint, outcome)
        }
        .boxed()
    }
}

pub fn backend(settings: &BackendSettings) -> QueryBackend {
    QueryBackend::asynchronous(
        ID,
        BackendMetadata {
            author: "expiry-audit contributors".to_string(),
            help: "WHOIS over non-blocking sockets; one task per in-flight domain".to_string(),
        },
        AsyncWhoisBackend::new(settings),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::CODE_INTERNAL;
    use crate::types::CODE_OK;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_queries_configured_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 128];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"Domain Name: EXAMPLE.TEST\r\nRegistry Expiry Date: 2031-01-01T00:00:00Z\r\n")
                .await
                .unwrap();
        });

        let mut overrides = HashMap::new();
        overrides.insert("test".to_string(), format!("127.0.0.1:{}", port));
        let settings = BackendSettings {
            timeout: Duration::from_secs(5),
            servers: ServerDirectory::with_overrides(overrides),
        };

        let res = AsyncWhoisBackend::new(&settings).query("example.test").await;
        assert_eq!(res.code, CODE_OK);
        assert!(res.raw.contains("EXAMPLE.TEST"));
    }

    #[tokio::test]
    async fn test_rate_limited_answer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 128];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"Your access is too fast,please try again later.\r\n")
                .await
                .unwrap();
        });

        let mut overrides = HashMap::new();
        overrides.insert("test".to_string(), format!("127.0.0.1:{}", port));
        let settings = BackendSettings {
            timeout: Duration::from_secs(5),
            servers: ServerDirectory::with_overrides(overrides),
        };

        let res = AsyncWhoisBackend::new(&settings).query("example.test").await;
        assert_eq!(res.code, crate::backends::CODE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unknown_suffix_is_internal_error() {
        let backend = AsyncWhoisBackend::new(&BackendSettings::default());
        let res = backend.query("example.notarealtld").await;
        assert_eq!(res.code, CODE_INTERNAL);
    }
}
