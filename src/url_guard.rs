//! SSRF guard for outbound URLs
//!
//! [`validate`] is a pure function over the input string: it parses the URL
//! and refuses anything that is not plain http(s) to a public host. It never
//! touches the network.
//!
//! [`UrlGuard`] applies the same checks with operator-configured exemptions,
//! and additionally resolves DNS hosts so the fetcher can pin the connection
//! to an address that was actually checked (closing the DNS-rebinding gap
//! left by string-only validation).

use crate::config::FetchConfig;
use crate::error::{Error, Rejection, Result};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use url::{Host, Url};

/// Cloud metadata endpoints, refused regardless of exemptions
const METADATA_HOSTS: &[&str] = &[
    "169.254.169.254",
    "metadata.google.internal",
    "metadata.google.com",
    "169.254.169.254.xip.io",
];

/// Hostnames that always refer to the local machine or cluster internals
const BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "ip6-localhost",
    "ip6-loopback",
    "kubernetes.default",
    "kubernetes.default.svc",
];

/// A URL that passed validation
///
/// Guaranteed to have scheme `http` or `https`, a non-empty host, and a host
/// outside the blocked address ranges. Recomputed for every redirect hop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedUrl(Url);

impl ValidatedUrl {
    /// The parsed URL
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// The URL as a string
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Host as it appears in the URL (IPv6 literals keep their brackets)
    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }

    /// Explicit port, or the scheme default
    pub fn port(&self) -> u16 {
        self.0
            .port_or_known_default()
            .unwrap_or(if self.0.scheme() == "https" { 443 } else { 80 })
    }

    /// Consume into the parsed URL
    pub fn into_url(self) -> Url {
        self.0
    }
}

impl std::fmt::Display for ValidatedUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Validate a raw URL without exemptions and without network I/O
///
/// # Examples
///
/// ```
/// use fetch_guard::url_guard::validate;
/// use fetch_guard::Rejection;
///
/// assert!(validate("https://example.com/report.pdf").is_ok());
/// assert_eq!(validate("file:///etc/passwd"), Err(Rejection::SchemeBlocked));
/// assert_eq!(validate("http://10.0.0.8/"), Err(Rejection::PrivateIpBlocked));
/// assert_eq!(
///     validate("http://169.254.169.254/latest/meta-data/"),
///     Err(Rejection::MetadataBlocked)
/// );
/// ```
pub fn validate(raw: &str) -> std::result::Result<ValidatedUrl, Rejection> {
    check(raw, &[])
}

/// Whether an address falls inside a range outbound fetches must never reach
///
/// Covers 10/8, 172.16/12, 192.168/16, 127/8, 169.254/16, 0/8, `::1`, `::`,
/// fc00::/7 and fe80::/10. IPv4-mapped and IPv4-compatible IPv6 addresses are
/// checked as the IPv4 address they embed.
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_ipv4(v4),
        IpAddr::V6(v6) => is_blocked_ipv6(v6),
    }
}

fn is_blocked_ipv4(addr: Ipv4Addr) -> bool {
    addr.is_private() || addr.is_loopback() || addr.is_link_local() || addr.octets()[0] == 0
}

fn is_blocked_ipv6(addr: Ipv6Addr) -> bool {
    if addr.is_loopback() || addr.is_unspecified() {
        return true;
    }
    if let Some(v4) = embedded_ipv4(addr) {
        return is_blocked_ipv4(v4);
    }

    let first = addr.segments()[0];
    // fc00::/7 unique local, fe80::/10 link-local
    (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}

/// IPv4 address carried by `::ffff:a.b.c.d` or `::a.b.c.d`
fn embedded_ipv4(addr: Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(v4) = addr.to_ipv4_mapped() {
        return Some(v4);
    }
    let segments = addr.segments();
    if segments[..6].iter().all(|s| *s == 0) {
        let [a, b] = segments[6].to_be_bytes();
        let [c, d] = segments[7].to_be_bytes();
        return Some(Ipv4Addr::new(a, b, c, d));
    }
    None
}

fn normalize_hostname(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_metadata_host(host: &str) -> bool {
    let host = normalize_hostname(host);
    METADATA_HOSTS.contains(&host.as_str())
}

fn is_blocked_hostname(host: &str) -> bool {
    let host = normalize_hostname(host);
    host.ends_with(".localhost")
        || BLOCKED_HOSTNAMES
            .iter()
            .any(|blocked| host == *blocked || host.ends_with(&format!(".{blocked}")))
}

/// Whether `url` matches one of the exempt origins (`host` or `host:port`)
fn is_exempt(url: &Url, exempt_origins: &[String]) -> bool {
    if exempt_origins.is_empty() {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = normalize_hostname(host);
    let port = url.port_or_known_default();

    exempt_origins.iter().any(|origin| {
        let origin = origin.trim().to_ascii_lowercase();
        match port {
            Some(port) if origin == format!("{host}:{port}") => true,
            _ => origin == host,
        }
    })
}

fn check(raw: &str, exempt_origins: &[String]) -> std::result::Result<ValidatedUrl, Rejection> {
    let url = Url::parse(raw.trim()).map_err(|_| Rejection::InvalidFormat)?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Rejection::SchemeBlocked);
    }

    let host = match url.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
        Some(Host::Ipv4(v4)) => v4.to_string(),
        Some(Host::Ipv6(v6)) => v6.to_string(),
        _ => return Err(Rejection::NoHost),
    };

    // Metadata endpoints are checked before the address ranges so that
    // 169.254.169.254 reports the more specific reason.
    if is_metadata_host(&host) {
        return Err(Rejection::MetadataBlocked);
    }

    if is_exempt(&url, exempt_origins) {
        return Ok(ValidatedUrl(url));
    }

    if is_blocked_hostname(&host) {
        return Err(Rejection::PrivateIpBlocked);
    }

    let blocked_literal = match url.host() {
        Some(Host::Ipv4(v4)) => is_blocked_ipv4(v4),
        Some(Host::Ipv6(v6)) => is_blocked_ipv6(v6),
        _ => false,
    };
    if blocked_literal {
        return Err(Rejection::PrivateIpBlocked);
    }

    Ok(ValidatedUrl(url))
}

/// URL validator with exemptions and DNS pinning
#[derive(Clone, Debug)]
pub struct UrlGuard {
    exempt_origins: Vec<String>,
    resolve_dns: bool,
}

impl Default for UrlGuard {
    fn default() -> Self {
        Self::new(&FetchConfig::default())
    }
}

impl UrlGuard {
    /// Build a guard from the fetch configuration
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            exempt_origins: config.exempt_origins.clone(),
            resolve_dns: config.resolve_dns,
        }
    }

    /// Validate a raw URL, honoring exempt origins
    pub fn validate(&self, raw: &str) -> std::result::Result<ValidatedUrl, Rejection> {
        check(raw, &self.exempt_origins)
    }

    /// Resolve the host of a validated URL and check every answer
    ///
    /// Returns the address the connection must be pinned to, or `None` when
    /// no pinning is needed (literal IP hosts, exempt origins, or DNS
    /// resolution disabled). Any blocked address in the answer set rejects
    /// the URL with [`Rejection::PrivateIpBlocked`].
    pub async fn resolve(&self, url: &ValidatedUrl) -> Result<Option<SocketAddr>> {
        if !self.resolve_dns || is_exempt(url.as_url(), &self.exempt_origins) {
            return Ok(None);
        }
        let domain = match url.as_url().host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            _ => return Ok(None),
        };

        let port = url.port();
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((domain.as_str(), port))
            .await
            .map_err(|e| Error::Dns {
                host: domain.clone(),
                reason: e.to_string(),
            })?
            .collect();

        check_answers(&domain, &addrs).map(Some)
    }
}

/// Pick the address to pin from a DNS answer set
///
/// Any blocked address rejects the whole set.
fn check_answers(domain: &str, addrs: &[SocketAddr]) -> Result<SocketAddr> {
    if let Some(blocked) = addrs.iter().find(|addr| is_blocked_ip(addr.ip())) {
        tracing::warn!(
            host = %domain,
            resolved = %blocked.ip(),
            "hostname resolves to a blocked address"
        );
        return Err(Error::Rejected(Rejection::PrivateIpBlocked));
    }

    addrs.first().copied().ok_or_else(|| Error::Dns {
        host: domain.to_string(),
        reason: "no addresses returned".to_string(),
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_public_http_and_https() {
        let url = validate("https://example.com/report.pdf").unwrap();
        assert_eq!(url.host(), "example.com");
        assert_eq!(url.port(), 443);

        let url = validate("http://93.184.216.34:8080/x").unwrap();
        assert_eq!(url.port(), 8080);
    }

    #[test]
    fn malformed_input_is_invalid_format() {
        for raw in ["", "not a url", "https://", "http://exa mple.com/", "//example.com/x"] {
            assert_eq!(validate(raw), Err(Rejection::InvalidFormat), "{raw:?}");
        }
    }

    #[test]
    fn non_http_schemes_are_blocked() {
        for raw in [
            "file:///etc/passwd",
            "ftp://example.com/file",
            "gopher://example.com:70/_",
            "javascript:alert(1)",
            "data:text/plain,hello",
            "ws://example.com/socket",
            "mailto:someone@example.com",
            "dict://127.0.0.1:11211/",
        ] {
            assert_eq!(validate(raw), Err(Rejection::SchemeBlocked), "{raw:?}");
        }
    }

    #[test]
    fn private_ipv4_ranges_are_blocked() {
        for raw in [
            "http://10.0.0.1/",
            "http://10.255.255.255/",
            "http://172.16.0.1/",
            "http://172.31.255.254/",
            "http://192.168.1.1/",
            "http://127.0.0.1/admin",
            "http://127.8.9.10/",
            "http://169.254.1.1/",
            "http://0.0.0.0/",
            "http://localhost/",
            "http://LOCALHOST./",
            "http://api.localhost/",
        ] {
            assert_eq!(validate(raw), Err(Rejection::PrivateIpBlocked), "{raw:?}");
        }
    }

    #[test]
    fn obfuscated_ipv4_literals_are_normalized_and_blocked() {
        // The WHATWG parser canonicalizes these to 127.0.0.1
        for raw in ["http://2130706433/", "http://0x7f.1/", "http://0177.0.0.1/"] {
            assert_eq!(validate(raw), Err(Rejection::PrivateIpBlocked), "{raw:?}");
        }
    }

    #[test]
    fn private_ipv6_ranges_are_blocked() {
        for raw in [
            "http://[::1]/",
            "http://[::]/",
            "http://[fc00::1]/",
            "http://[fd12:3456:789a::1]/",
            "http://[fe80::1]/",
            "http://[febf::1]/",
            "http://[::ffff:127.0.0.1]/",
            "http://[::ffff:10.0.0.1]/",
            "http://[::ffff:169.254.169.254]/",
        ] {
            assert_eq!(validate(raw), Err(Rejection::PrivateIpBlocked), "{raw:?}");
        }
    }

    #[test]
    fn boundary_addresses_outside_ranges_are_allowed() {
        for raw in [
            "http://11.0.0.1/",
            "http://172.15.255.255/",
            "http://172.32.0.1/",
            "http://192.167.255.255/",
            "http://192.169.0.1/",
            "http://128.0.0.1/",
            "http://169.253.255.255/",
            "http://169.255.0.1/",
            "http://[2001:4860:4860::8888]/",
            "http://[fec0::1]/",
            "http://[fbff::1]/",
        ] {
            assert!(validate(raw).is_ok(), "{raw:?} should be allowed");
        }
    }

    #[test]
    fn generated_ipv4_addresses_reject_iff_inside_ranges() {
        let inside = |o: [u8; 4]| {
            o[0] == 10
                || (o[0] == 172 && (16..=31).contains(&o[1]))
                || (o[0] == 192 && o[1] == 168)
                || o[0] == 127
                || (o[0] == 169 && o[1] == 254)
                || o[0] == 0
        };

        // Deterministic walk over a spread of first/second octets
        for a in (0u16..=255).step_by(3).chain([10, 127, 169, 172, 192]) {
            for b in (0u16..=255).step_by(7).chain([16, 31, 168, 254]) {
                let octets = [a as u8, b as u8, 1, 2];
                let raw = format!(
                    "http://{}.{}.{}.{}/",
                    octets[0], octets[1], octets[2], octets[3]
                );
                let result = validate(&raw);
                if inside(octets) {
                    assert_eq!(result, Err(Rejection::PrivateIpBlocked), "{raw}");
                } else {
                    assert!(result.is_ok(), "{raw} should be allowed");
                }
            }
        }
    }

    #[test]
    fn generated_ipv6_addresses_reject_iff_inside_ranges() {
        for first in (0u32..=0xffff).step_by(0x3f).map(|v| v as u16) {
            let addr = Ipv6Addr::new(first, 0x1234, 0, 0, 0, 0, 0, 1);
            let inside = (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80;
            assert_eq!(
                is_blocked_ip(IpAddr::V6(addr)),
                inside,
                "unexpected verdict for {addr}"
            );
        }
    }

    #[test]
    fn metadata_hosts_are_blocked_for_any_scheme_spelling() {
        for raw in [
            "http://169.254.169.254/latest/meta-data/",
            "https://169.254.169.254/",
            "http://metadata.google.internal/computeMetadata/v1/",
            "https://Metadata.Google.Internal./",
            "http://metadata.google.com/",
            "http://169.254.169.254.xip.io/",
        ] {
            assert_eq!(validate(raw), Err(Rejection::MetadataBlocked), "{raw:?}");
        }
    }

    #[test]
    fn scheme_is_checked_before_metadata() {
        assert_eq!(
            validate("ftp://169.254.169.254/"),
            Err(Rejection::SchemeBlocked)
        );
    }

    #[test]
    fn kubernetes_internal_names_are_blocked() {
        assert_eq!(
            validate("https://kubernetes.default.svc/api"),
            Err(Rejection::PrivateIpBlocked)
        );
        assert_eq!(
            validate("https://api.kubernetes.default.svc/"),
            Err(Rejection::PrivateIpBlocked)
        );
        assert_eq!(
            validate("https://kubernetes.default/"),
            Err(Rejection::PrivateIpBlocked)
        );
    }

    #[test]
    fn exempt_origin_bypasses_range_checks_only() {
        let guard = UrlGuard::new(&FetchConfig {
            exempt_origins: vec!["127.0.0.1:9000".into(), "internal.example".into()],
            ..Default::default()
        });

        assert!(guard.validate("http://127.0.0.1:9000/ok").is_ok());
        assert!(guard.validate("https://internal.example/x").is_ok());
        // Different port is not exempt
        assert_eq!(
            guard.validate("http://127.0.0.1:9001/"),
            Err(Rejection::PrivateIpBlocked)
        );
        // Scheme still enforced
        assert_eq!(
            guard.validate("ftp://127.0.0.1:9000/"),
            Err(Rejection::SchemeBlocked)
        );
    }

    #[test]
    fn metadata_cannot_be_exempted() {
        let guard = UrlGuard::new(&FetchConfig {
            exempt_origins: vec!["169.254.169.254".into()],
            ..Default::default()
        });
        assert_eq!(
            guard.validate("http://169.254.169.254/"),
            Err(Rejection::MetadataBlocked)
        );
    }

    #[tokio::test]
    async fn resolve_skips_literal_ips() {
        let guard = UrlGuard::new(&FetchConfig::default());
        let url = validate("http://93.184.216.34/").unwrap();

        assert_eq!(guard.resolve(&url).await.unwrap(), None);
    }

    #[tokio::test]
    async fn resolve_disabled_returns_none() {
        let guard = UrlGuard::new(&FetchConfig {
            resolve_dns: false,
            ..Default::default()
        });
        let url = validate("https://example.com/").unwrap();

        assert_eq!(guard.resolve(&url).await.unwrap(), None);
    }

    #[test]
    fn answer_set_with_any_blocked_address_is_rejected() {
        let public: SocketAddr = "93.184.216.34:80".parse().unwrap();
        let loopback: SocketAddr = "127.0.0.1:80".parse().unwrap();
        let mapped: SocketAddr = "[::ffff:10.0.0.7]:80".parse().unwrap();

        for answers in [vec![loopback], vec![public, loopback], vec![mapped, public]] {
            assert!(matches!(
                check_answers("rebind.example", &answers),
                Err(Error::Rejected(Rejection::PrivateIpBlocked))
            ));
        }
    }

    #[test]
    fn public_answer_set_pins_first_address() {
        let first: SocketAddr = "93.184.216.34:443".parse().unwrap();
        let second: SocketAddr = "[2606:2800:220:1::1]:443".parse().unwrap();

        assert_eq!(
            check_answers("example.com", &[first, second]).unwrap(),
            first
        );
    }

    #[test]
    fn empty_answer_set_is_a_dns_error() {
        assert!(matches!(
            check_answers("example.com", &[]),
            Err(Error::Dns { .. })
        ));
    }

    #[test]
    fn default_guard_resolves_dns() {
        let guard = UrlGuard::default();

        assert!(guard.resolve_dns);
        assert_eq!(guard.resolve_dns, FetchConfig::default().resolve_dns);
        assert!(guard.exempt_origins.is_empty());
    }
}
