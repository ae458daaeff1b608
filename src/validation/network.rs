//! Network attachment check
//!
//! Tier order, first match wins:
//! 1. a readable SSID must be in the allow-list (no fallback on mismatch)
//! 2. otherwise the client IP must fall in an allowed range
//! 3. otherwise the client is not on the school network
//!
//! Browsers usually cannot read the SSID, so tier 2 carries most traffic.

use std::net::Ipv4Addr;

use crate::models::LocationConfig;

/// Values clients send when the SSID could not actually be read
const SSID_PLACEHOLDERS: &[&str] = &[
    "",
    "unknown",
    "<unknown ssid>",
    "null",
    "undefined",
    "n/a",
    "wifi",
];

const CELLULAR_TYPES: &[&str] = &["cellular", "3g", "4g", "5g", "lte"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkTier {
    Ssid,
    IpRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkOutcome {
    pub ok: bool,
    pub reason: Option<String>,
    pub matched_by: Option<NetworkTier>,
    /// Stable label of the network, used for anomaly history
    pub signature: Option<String>,
}

impl NetworkOutcome {
    fn accept(tier: NetworkTier, signature: Option<String>) -> Self {
        Self { ok: true, reason: None, matched_by: Some(tier), signature }
    }

    fn reject(reason: String, signature: Option<String>) -> Self {
        Self { ok: false, reason: Some(reason), matched_by: None, signature }
    }
}

pub fn is_placeholder_ssid(ssid: &str) -> bool {
    let normalized = ssid.trim().trim_matches('"').to_lowercase();
    SSID_PLACEHOLDERS.contains(&normalized.as_str())
}

fn is_cellular(connection_type: Option<&str>) -> bool {
    connection_type
        .map(|t| CELLULAR_TYPES.contains(&t.trim().to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Signature for an IP: its /24 for IPv4, the raw text otherwise
pub fn ip_signature(ip: &str) -> String {
    match ip.trim().parse::<Ipv4Addr>() {
        Ok(addr) => {
            let o = addr.octets();
            format!("ip:{}.{}.{}.0/24", o[0], o[1], o[2])
        }
        Err(_) => format!("ip:{}", ip.trim()),
    }
}

/// Match an IP against one allow-list entry.
/// Entries are CIDR ("10.0.0.0/8"), a full address, or a literal prefix ("192.168.").
pub fn ip_matches_range(ip: &str, range: &str) -> bool {
    let ip = ip.trim();
    let range = range.trim();
    if range.is_empty() {
        return false;
    }

    if let Some((base, bits)) = range.split_once('/') {
        let (Ok(base), Ok(bits), Ok(addr)) = (
            base.parse::<Ipv4Addr>(),
            bits.parse::<u32>(),
            ip.parse::<Ipv4Addr>(),
        ) else {
            return false;
        };
        if bits > 32 {
            return false;
        }
        let mask = if bits == 0 { 0 } else { u32::MAX << (32 - bits) };
        return (u32::from(addr) & mask) == (u32::from(base) & mask);
    }

    if range.parse::<Ipv4Addr>().is_ok() {
        return ip == range;
    }

    ip.starts_with(range)
}

pub struct NetworkIdentityValidator;

impl NetworkIdentityValidator {
    pub fn validate(
        &self,
        ssid: Option<&str>,
        ip_address: Option<&str>,
        connection_type: Option<&str>,
        config: &LocationConfig,
    ) -> NetworkOutcome {
        // Tier 1: explicit SSID is authoritative
        if let Some(ssid) = ssid.filter(|s| !is_placeholder_ssid(s)) {
            let ssid = ssid.trim();
            let signature = Some(ssid.to_string());
            if config.allowed_ssids.iter().any(|allowed| allowed == ssid) {
                return NetworkOutcome::accept(NetworkTier::Ssid, signature);
            }
            return NetworkOutcome::reject(
                format!("WiFi '{}' is not an allowed school network", ssid),
                signature,
            );
        }

        // Tier 2: IP range, unless the client says it is on mobile data
        let ip = ip_address.map(str::trim).filter(|ip| !ip.is_empty());
        if let Some(ip) = ip.filter(|_| !is_cellular(connection_type)) {
            let signature = Some(ip_signature(ip));
            if config.allowed_ip_ranges.iter().any(|range| ip_matches_range(ip, range)) {
                return NetworkOutcome::accept(NetworkTier::IpRange, signature);
            }
            return NetworkOutcome::reject(
                format!("IP address {} is not in a school network range", ip),
                signature,
            );
        }

        // Tier 3
        NetworkOutcome::reject("Not connected to the school network".to_string(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn config(ssids: &[&str], ranges: &[&str]) -> LocationConfig {
        LocationConfig {
            id: Uuid::new_v4(),
            name: "test".to_string(),
            reference_latitude: 0.0,
            reference_longitude: 0.0,
            radius_meters: 100.0,
            allowed_ssids: ssids.iter().map(|s| s.to_string()).collect(),
            allowed_ip_ranges: ranges.iter().map(|s| s.to_string()).collect(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_ssid_allow_list() {
        let cfg = config(&["SchoolWifi"], &[]);
        let v = NetworkIdentityValidator;

        let ok = v.validate(Some("SchoolWifi"), None, None, &cfg);
        assert!(ok.ok);
        assert_eq!(ok.matched_by, Some(NetworkTier::Ssid));

        let bad = v.validate(Some("OtherWifi"), None, None, &cfg);
        assert!(!bad.ok);
        assert!(bad.reason.unwrap().contains("OtherWifi"));
    }

    #[test]
    fn test_ssid_mismatch_does_not_fall_back_to_ip() {
        let cfg = config(&["SchoolWifi"], &["192.168.1.0/24"]);
        let outcome = NetworkIdentityValidator.validate(Some("OtherWifi"), Some("192.168.1.50"), None, &cfg);
        assert!(!outcome.ok);
    }

    #[test]
    fn test_placeholder_ssid_uses_ip_tier() {
        let cfg = config(&["SchoolWifi"], &["192.168.1.0/24"]);
        for placeholder in ["", "unknown", "<unknown ssid>", "\"<unknown ssid>\"", "  null "] {
            let outcome = NetworkIdentityValidator.validate(Some(placeholder), Some("192.168.1.50"), None, &cfg);
            assert!(outcome.ok, "placeholder {:?} should defer to IP", placeholder);
            assert_eq!(outcome.matched_by, Some(NetworkTier::IpRange));
        }
    }

    #[test]
    fn test_cidr_range() {
        let cfg = config(&[], &["192.168.1.0/24"]);
        let v = NetworkIdentityValidator;
        assert!(v.validate(None, Some("192.168.1.50"), None, &cfg).ok);
        assert!(!v.validate(None, Some("192.168.2.50"), None, &cfg).ok);
    }

    #[test]
    fn test_range_matching() {
        assert!(ip_matches_range("192.168.7.9", "192.168."));
        assert!(!ip_matches_range("10.168.7.9", "192.168."));
        assert!(ip_matches_range("10.20.30.40", "10.0.0.0/8"));
        assert!(ip_matches_range("1.2.3.4", "0.0.0.0/0"));
        assert!(ip_matches_range("10.0.0.5", "10.0.0.5"));
        assert!(!ip_matches_range("10.0.0.50", "10.0.0.5"));
        assert!(!ip_matches_range("10.0.0.5", "10.0.0.0/33"));
        assert!(!ip_matches_range("not-an-ip", "10.0.0.0/8"));
        assert!(!ip_matches_range("10.0.0.5", ""));
    }

    #[test]
    fn test_cellular_is_rejected() {
        let cfg = config(&[], &["0.0.0.0/0"]);
        let outcome = NetworkIdentityValidator.validate(None, Some("100.64.1.1"), Some("4g"), &cfg);
        assert!(!outcome.ok);
        assert_eq!(outcome.reason.as_deref(), Some("Not connected to the school network"));
    }

    #[test]
    fn test_no_evidence_is_rejected() {
        let cfg = config(&["SchoolWifi"], &["192.168.1.0/24"]);
        let outcome = NetworkIdentityValidator.validate(None, None, None, &cfg);
        assert!(!outcome.ok);
        assert!(outcome.signature.is_none());
    }

    #[test]
    fn test_ip_signature() {
        assert_eq!(ip_signature("192.168.1.50"), "ip:192.168.1.0/24");
        assert_eq!(ip_signature("fe80::1"), "ip:fe80::1");
    }
}
