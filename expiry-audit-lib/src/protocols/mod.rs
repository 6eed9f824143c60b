//! Protocol plumbing for expiry auditing.
//!
//! The server directory maps suffixes to authoritative WHOIS hosts; the
//! client speaks the line-based protocol over TCP.

/// TLD to WHOIS server directory
pub mod servers;

/// WHOIS protocol client, async and blocking
pub mod whois;

pub use servers::{ServerDirectory, ServerEndpoint, NIC_CH_HOST, NIC_CH_PORT, WHOIS_PORT};
pub use whois::{BlockingWhoisClient, WhoisClient};
