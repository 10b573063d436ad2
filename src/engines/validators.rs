// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::net::IpAddr;
use tokio::net::lookup_host;
use url::Url;

/// 验证 URL 是否可以抓取
///
/// 只允许 http/https 且必须带主机名；`block_private_networks` 为 true 时
/// 检查解析后的 IP 是否为私有地址或环回地址 (防止 SSRF)
pub async fn validate_url(url_str: &str, block_private_networks: bool) -> anyhow::Result<Url> {
    let url = Url::parse(url_str.trim())?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(anyhow::anyhow!("Unsupported scheme: {}", other)),
    }
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("Missing host"))?;

    if !block_private_networks {
        return Ok(url);
    }

    if host == "localhost" {
        return Err(anyhow::anyhow!("SSRF protection: localhost is not allowed"));
    }

    // lookup_host 需要 host:port；IPv6 字面量需要方括号
    let port = url.port_or_known_default().unwrap_or(80);
    let addr_str = match url.host() {
        Some(url::Host::Ipv6(ip)) => format!("[{}]:{}", ip, port),
        _ => format!("{}:{}", host, port),
    };

    let addrs = lookup_host(addr_str).await?;

    // 检查所有解析出的 IP
    for addr in addrs {
        if is_private_ip(addr.ip()) {
            return Err(anyhow::anyhow!(
                "SSRF protection: Private IP access is not allowed: {}",
                addr.ip()
            ));
        }
    }

    Ok(url)
}

/// 验证 URL 是否在黑名单域名中
pub fn validate_domain_blacklist(url: &Url, blacklist: &[String]) -> anyhow::Result<()> {
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("Missing host"))?
        .to_ascii_lowercase();

    for domain in blacklist {
        let domain = domain.trim().to_ascii_lowercase();
        if host == domain || host.ends_with(&format!(".{}", domain)) {
            return Err(anyhow::anyhow!("Domain {} is in blacklist", host));
        }
    }

    Ok(())
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            let octets = ipv4.octets();
            // 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16
            octets[0] == 10
                || (octets[0] == 172 && (16..=31).contains(&octets[1]))
                || (octets[0] == 192 && octets[1] == 168)
                || ipv4.is_loopback()
                || ipv4.is_link_local()
                || ipv4.is_unspecified()
                || (224..=239).contains(&octets[0])
        }
        IpAddr::V6(ipv6) => {
            let first = ipv6.segments()[0];
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                // Unique Local Address (fc00::/7)
                || (first & 0xfe00) == 0xfc00
                // Link-local (fe80::/10)
                || (first & 0xffc0) == 0xfe80
                // Multicast (ff00::/8)
                || (first & 0xff00) == 0xff00
                || ipv6.to_ipv4_mapped().is_some_and(|v4| is_private_ip(IpAddr::V4(v4)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_validate_url_scheme_and_host() {
        assert!(validate_url("ftp://example.com/file", false).await.is_err());
        assert!(validate_url("mailto:info@example.com", false).await.is_err());
        assert!(validate_url("not a url", false).await.is_err());

        let url = validate_url(" https://example.com/path ", false).await.unwrap();
        assert_eq!(url.as_str(), "https://example.com/path");
    }

    #[tokio::test]
    async fn test_validate_url_ssrf() {
        // Private hosts are allowed unless blocking is enabled
        assert!(validate_url("http://127.0.0.1:8080", false).await.is_ok());

        assert!(validate_url("http://localhost", true).await.is_err());
        assert!(validate_url("http://127.0.0.1", true).await.is_err());
        assert!(validate_url("http://192.168.1.10", true).await.is_err());
        assert!(validate_url("http://[::1]:8080", true).await.is_err());
    }

    #[test]
    fn test_is_private_ip() {
        assert!(is_private_ip("127.0.0.1".parse().unwrap()));
        assert!(is_private_ip("10.0.0.1".parse().unwrap()));
        assert!(is_private_ip("192.168.1.1".parse().unwrap()));
        assert!(is_private_ip("172.16.0.1".parse().unwrap()));
        assert!(is_private_ip("::ffff:10.0.0.1".parse().unwrap()));
        assert!(!is_private_ip("8.8.8.8".parse().unwrap()));
        assert!(!is_private_ip("172.32.0.1".parse().unwrap()));
    }

    #[test]
    fn test_validate_domain_blacklist() {
        let blacklist = vec!["example.com".to_string(), "Malicious.net".to_string()];
        let check = |url: &str| validate_domain_blacklist(&Url::parse(url).unwrap(), &blacklist);

        // Blocked exact match
        assert!(check("http://example.com").is_err());
        assert!(check("http://malicious.net/path").is_err());

        // Blocked subdomain
        assert!(check("http://sub.example.com").is_err());
        assert!(check("http://API.malicious.net").is_err());

        // Allowed
        assert!(check("http://google.com").is_ok());
        assert!(check("http://example.org").is_ok());
        assert!(check("http://myexample.com").is_ok());
    }
}
