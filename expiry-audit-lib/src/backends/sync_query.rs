//! `sync_query`: WHOIS over blocking std sockets.
//!
//! Meant for the blocking thread pool; each call holds one thread for the
//! full exchange.

use super::{no_server, to_raw_result, BackendMetadata, BackendSettings, QueryBackend, SyncQuery};
use crate::protocols::{BlockingWhoisClient, ServerDirectory};
use crate::types::RawResult;
use tracing::debug;

pub const ID: &str = super::SYNC_QUERY_ID;

#[derive(Debug, Clone)]
pub struct SyncWhoisBackend {
    client: BlockingWhoisClient,
    servers: ServerDirectory,
}

impl SyncWhoisBackend {
    pub fn new(settings: &BackendSettings) -> Self {
        Self {
            client: BlockingWhoisClient::new().with_timeout(settings.timeout),
            servers: settings.servers.clone(),
        }
    }
}

impl SyncQuery for SyncWhoisBackend {
    fn query(&self, domain: &str) -> RawResult {
        let endpoint = match self.servers.resolve(domain) {
            Ok(ep) => ep,
            Err(e) => return no_server(e),
        };
        debug!(domain, server = %endpoint.host, "querying");
        let outcome = self.client.query(domain, &endpoint);
        to_raw_result(&endpoint, outcome)
    }
}

pub fn backend(settings: &BackendSettings) -> QueryBackend {
    QueryBackend::sync(
        ID,
        BackendMetadata {
            author: "expiry-audit contributors".to_string(),
            help: "WHOIS over blocking sockets on the blocking thread pool".to_string(),
        },
        SyncWhoisBackend::new(settings),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{CODE_INTERNAL, CODE_UNAVAILABLE};
    use crate::types::CODE_OK;
    use std::collections::HashMap;
    use std::io::{Read, Write};
    use std::time::Duration;

    fn serve_once(body: &'static [u8]) -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut buf = [0u8; 128];
            let _ = socket.read(&mut buf).unwrap();
            socket.write_all(body).unwrap();
        });
        port
    }

    fn settings_for(suffix: &str, port: u16) -> BackendSettings {
        let mut overrides = HashMap::new();
        overrides.insert(suffix.to_string(), format!("127.0.0.1:{}", port));
        BackendSettings {
            timeout: Duration::from_secs(5),
            servers: ServerDirectory::with_overrides(overrides),
        }
    }

    #[test]
    fn test_registered_answer() {
        let port = serve_once(b"domain: barku.re\nExpiry Date: 2025-08-12T07:35:59Z\n");
        let res = SyncWhoisBackend::new(&settings_for("re", port)).query("barku.re");
        assert_eq!(res.code, CODE_OK);
        assert!(res.raw.starts_with("domain: barku.re"));
    }

    #[test]
    fn test_connection_refused_is_unavailable() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let res = SyncWhoisBackend::new(&settings_for("test", port)).query("example.test");
        assert_eq!(res.code, CODE_UNAVAILABLE);
    }

    #[test]
    fn test_unknown_suffix_is_internal_error() {
        let res = SyncWhoisBackend::new(&BackendSettings::default()).query("example.notarealtld");
        assert_eq!(res.code, CODE_INTERNAL);
    }
}
