//! TLD to WHOIS server directory.
//!
//! A built-in table covers the common generic and country-code suffixes.
//! Entries from the `[servers]` config section overlay it.

use crate::error::AuditError;
use std::collections::HashMap;

/// Standard WHOIS port.
pub const WHOIS_PORT: u16 = 43;

/// Host and port of the registry serving `li` and `ch`.
pub const NIC_CH_HOST: &str = "whois.nic.ch";
pub const NIC_CH_PORT: u16 = 4343;

lazy_static::lazy_static! {
    static ref BUILTIN_SERVERS: HashMap<&'static str, &'static str> = HashMap::from([
        // Generic TLDs
        ("com", "whois.verisign-grs.com"),
        ("net", "whois.verisign-grs.com"),
        ("org", "whois.pir.org"),
        ("info", "whois.afilias.net"),
        ("biz", "whois.nic.biz"),
        ("name", "whois.nic.name"),
        ("mobi", "whois.afilias.net"),
        ("pro", "whois.afilias.net"),
        ("asia", "whois.nic.asia"),
        ("cat", "whois.nic.cat"),
        ("coop", "whois.nic.coop"),
        ("edu", "whois.educause.edu"),
        ("gov", "whois.dotgov.gov"),
        ("int", "whois.iana.org"),
        ("tel", "whois.nic.tel"),
        ("travel", "whois.nic.travel"),
        ("xxx", "whois.nic.xxx"),
        // New gTLDs
        ("app", "whois.nic.google"),
        ("dev", "whois.nic.google"),
        ("page", "whois.nic.google"),
        ("blog", "whois.nic.blog"),
        ("cloud", "whois.nic.cloud"),
        ("xyz", "whois.nic.xyz"),
        ("online", "whois.nic.online"),
        ("site", "whois.nic.site"),
        ("tech", "whois.nic.tech"),
        ("store", "whois.nic.store"),
        ("shop", "whois.nic.shop"),
        ("top", "whois.nic.top"),
        ("club", "whois.nic.club"),
        ("vip", "whois.nic.vip"),
        ("live", "whois.nic.live"),
        ("world", "whois.nic.world"),
        ("email", "whois.nic.email"),
        ("digital", "whois.nic.digital"),
        ("agency", "whois.nic.agency"),
        ("company", "whois.nic.company"),
        ("network", "whois.nic.network"),
        // Country codes
        ("io", "whois.nic.io"),
        ("co", "whois.nic.co"),
        ("me", "whois.nic.me"),
        ("tv", "whois.nic.tv"),
        ("cc", "ccwhois.verisign-grs.com"),
        ("ai", "whois.nic.ai"),
        ("gg", "whois.gg"),
        ("uk", "whois.nic.uk"),
        ("co.uk", "whois.nic.uk"),
        ("org.uk", "whois.nic.uk"),
        ("de", "whois.denic.de"),
        ("fr", "whois.nic.fr"),
        ("re", "whois.nic.re"),
        ("pm", "whois.nic.pm"),
        ("tf", "whois.nic.tf"),
        ("wf", "whois.nic.wf"),
        ("yt", "whois.nic.yt"),
        ("nl", "whois.domain-registry.nl"),
        ("be", "whois.dns.be"),
        ("eu", "whois.eu"),
        ("it", "whois.nic.it"),
        ("es", "whois.nic.es"),
        ("pl", "whois.dns.pl"),
        ("se", "whois.iis.se"),
        ("nu", "whois.iis.nu"),
        ("fi", "whois.fi"),
        ("dk", "whois.punktum.dk"),
        ("no", "whois.norid.no"),
        ("at", "whois.nic.at"),
        ("cz", "whois.nic.cz"),
        ("ru", "whois.tcinet.ru"),
        ("su", "whois.tcinet.ru"),
        ("ua", "whois.ua"),
        ("us", "whois.nic.us"),
        ("ca", "whois.cira.ca"),
        ("au", "whois.auda.org.au"),
        ("com.au", "whois.auda.org.au"),
        ("nz", "whois.irs.net.nz"),
        ("co.nz", "whois.irs.net.nz"),
        ("jp", "whois.jprs.jp"),
        ("co.jp", "whois.jprs.jp"),
        ("kr", "whois.kr"),
        ("cn", "whois.cnnic.cn"),
        ("com.cn", "whois.cnnic.cn"),
        ("tw", "whois.twnic.net.tw"),
        ("hk", "whois.hkirc.hk"),
        ("sg", "whois.sgnic.sg"),
        ("in", "whois.registry.in"),
        ("br", "whois.registro.br"),
        ("com.br", "whois.registro.br"),
        ("mx", "whois.mx"),
        ("ar", "whois.nic.ar"),
        ("cl", "whois.nic.cl"),
        ("za", "whois.registry.net.za"),
        ("co.za", "whois.registry.net.za"),
        ("li", NIC_CH_HOST),
        ("ch", NIC_CH_HOST),
    ]);
}

/// A resolved WHOIS endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
    /// The suffix whose entry matched
    pub suffix: String,
}

impl ServerEndpoint {
    /// Whether the registry answers with a bare numeric status code.
    pub fn is_numeric_registry(&self) -> bool {
        self.host == NIC_CH_HOST && self.port == NIC_CH_PORT
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Split an optional `:port` off an override entry.
fn split_host_port(entry: &str) -> (&str, Option<u16>) {
    match entry.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => match port.parse() {
            Ok(port) => (host, Some(port)),
            Err(_) => (entry, None),
        },
        _ => (entry, None),
    }
}

/// Resolves domains to their authoritative WHOIS server.
#[derive(Debug, Clone, Default)]
pub struct ServerDirectory {
    overrides: HashMap<String, String>,
}

impl ServerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory whose entries overlay the built-in table.
    ///
    /// Keys are lower-cased and stripped of a leading dot. Values are a
    /// host, optionally followed by `:port`.
    pub fn with_overrides(overrides: HashMap<String, String>) -> Self {
        let overrides = overrides
            .into_iter()
            .map(|(suffix, host)| {
                (
                    suffix.trim().trim_start_matches('.').to_lowercase(),
                    host.trim().to_string(),
                )
            })
            .filter(|(suffix, host)| !suffix.is_empty() && !host.is_empty())
            .collect();
        Self { overrides }
    }

    fn lookup(&self, suffix: &str) -> Option<&str> {
        self.overrides
            .get(suffix)
            .map(String::as_str)
            .or_else(|| BUILTIN_SERVERS.get(suffix).copied())
    }

    /// Find the server for `domain`, trying the most specific suffix first.
    ///
    /// `a.b.co.uk` tries `b.co.uk`, then `co.uk`, then `uk`.
    pub fn resolve(&self, domain: &str) -> Result<ServerEndpoint, AuditError> {
        let domain = domain.trim().trim_end_matches('.').to_lowercase();
        let labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();

        for start in 0..labels.len() {
            let suffix = labels[start..].join(".");
            if let Some(entry) = self.lookup(&suffix) {
                let (host, port) = split_host_port(entry);
                let port = port.unwrap_or(if host == NIC_CH_HOST {
                    NIC_CH_PORT
                } else {
                    WHOIS_PORT
                });
                return Ok(ServerEndpoint {
                    host: host.to_string(),
                    port,
                    suffix,
                });
            }
        }

        Err(AuditError::server_not_found(domain))
    }

    /// Number of suffixes known, built-ins plus overrides.
    pub fn len(&self) -> usize {
        BUILTIN_SERVERS.len()
            + self
                .overrides
                .keys()
                .filter(|k| !BUILTIN_SERVERS.contains_key(k.as_str()))
                .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
