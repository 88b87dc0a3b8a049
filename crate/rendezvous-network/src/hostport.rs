use anyhow::Context as _;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// A listen or connect address: the host:port string as given, plus
/// the socket address it resolved to.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct HostPort {
    host: String,
    port: u16,
    addr: SocketAddr,
}

impl HostPort {
    /// Parse a host:port string and resolve it.
    ///
    /// IPv6 literals must be bracketed, as in `[::1]:9900`. Only the
    /// first address returned by the resolver is kept.
    pub async fn parse(s: &str) -> anyhow::Result<Self> {
        let Some(idx) = s.rfind(':') else {
            anyhow::bail!("Missing port in address: {s}");
        };
        let (host, port_str) = s.split_at(idx);
        let port = port_str[1..]
            .parse::<u16>()
            .map_err(|_| anyhow::anyhow!("Invalid port in address: {s}"))?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            anyhow::bail!("Missing host in address: {s}");
        }

        let mut addrs = tokio::net::lookup_host(s)
            .await
            .with_context(|| format!("DNS lookup failed for {s}"))?;
        let addr = addrs
            .next()
            .ok_or_else(|| anyhow::anyhow!("DNS lookup failed for {s}"))?;
        log::debug!("{s} resolved to {addr}");

        Ok(HostPort {
            host: host.to_string(),
            port,
            addr,
        })
    }

    /// Loopback address on the given port; port 0 lets the OS pick.
    pub fn localhost(port: u16) -> Self {
        HostPort::from(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<SocketAddr> for HostPort {
    fn from(addr: SocketAddr) -> Self {
        HostPort {
            host: addr.ip().to_string(),
            port: addr.port(),
            addr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parse_ipv4() -> anyhow::Result<()> {
        let hp = HostPort::parse("127.0.0.1:9900").await?;
        assert_eq!(hp.host(), "127.0.0.1");
        assert_eq!(hp.port(), 9900);
        assert_eq!(hp.addr().port(), 9900);

        Ok(())
    }

    #[tokio::test]
    async fn parse_ipv6() -> anyhow::Result<()> {
        let hp = HostPort::parse("[::1]:9900").await?;
        assert_eq!(hp.host(), "::1");
        assert_eq!(hp.port(), 9900);
        assert_eq!(hp.to_string(), "[::1]:9900");

        Ok(())
    }

    #[tokio::test]
    async fn parse_hostname() -> anyhow::Result<()> {
        let hp = HostPort::parse("localhost:1234").await?;
        assert_eq!(hp.host(), "localhost");
        assert_eq!(hp.port(), 1234);
        assert_eq!(hp.addr().port(), 1234);

        Ok(())
    }

    #[tokio::test]
    async fn parse_invalid() {
        assert!(HostPort::parse("myhost").await.is_err());
        assert!(HostPort::parse("myhost:notaport").await.is_err());
        assert!(HostPort::parse(":9900").await.is_err());
    }

    #[tokio::test]
    async fn from_socketaddr() -> anyhow::Result<()> {
        let hp1 = HostPort::parse("127.0.0.1:8000").await?;
        let hp2 = HostPort::from(hp1.addr());
        assert_eq!(hp1, hp2);

        Ok(())
    }

    #[test]
    fn localhost() {
        let hp = HostPort::localhost(0);
        assert_eq!(hp.to_string(), "127.0.0.1:0");
        assert!(hp.addr().ip().is_loopback());
    }
}
