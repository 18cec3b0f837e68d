//! Blocked address ranges
//!
//! The two tables below are the complete SSRF blocklist. Any resolved address
//! inside one of them makes the whole hostname unusable.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// IPv4 ranges that must never be fetched: (network, prefix length, label)
pub const BLOCKED_V4: &[(Ipv4Addr, u8, &str)] = &[
    (Ipv4Addr::new(0, 0, 0, 0), 8, "this-network"),
    (Ipv4Addr::new(10, 0, 0, 0), 8, "private"),
    (Ipv4Addr::new(100, 64, 0, 0), 10, "shared-address-space"),
    (Ipv4Addr::new(127, 0, 0, 0), 8, "loopback"),
    (Ipv4Addr::new(169, 254, 0, 0), 16, "link-local"),
    (Ipv4Addr::new(172, 16, 0, 0), 12, "private"),
    (Ipv4Addr::new(192, 0, 0, 0), 24, "ietf-protocol-assignments"),
    (Ipv4Addr::new(192, 0, 2, 0), 24, "documentation"),
    (Ipv4Addr::new(192, 88, 99, 0), 24, "6to4-relay-anycast"),
    (Ipv4Addr::new(192, 168, 0, 0), 16, "private"),
    (Ipv4Addr::new(198, 18, 0, 0), 15, "benchmarking"),
    (Ipv4Addr::new(198, 51, 100, 0), 24, "documentation"),
    (Ipv4Addr::new(203, 0, 113, 0), 24, "documentation"),
    (Ipv4Addr::new(224, 0, 0, 0), 4, "multicast"),
    (Ipv4Addr::new(240, 0, 0, 0), 4, "reserved"),
    (Ipv4Addr::new(255, 255, 255, 255), 32, "broadcast"),
];

/// IPv6 ranges that must never be fetched: (network, prefix length, label)
pub const BLOCKED_V6: &[(Ipv6Addr, u8, &str)] = &[
    (Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 0), 128, "unspecified"),
    (Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 1), 128, "loopback"),
    // IPv4-compatible addresses (deprecated); mapped ::ffff:0:0/96 is unwrapped instead
    (Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 0), 96, "ipv4-compatible"),
    (Ipv6Addr::new(0x0100, 0, 0, 0, 0, 0, 0, 0), 64, "discard-only"),
    (Ipv6Addr::new(0x2001, 0x0db8, 0, 0, 0, 0, 0, 0), 32, "documentation"),
    (Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0), 7, "unique-local"),
    (Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 10, "link-local"),
    (Ipv6Addr::new(0xfec0, 0, 0, 0, 0, 0, 0, 0), 10, "site-local"),
    (Ipv6Addr::new(0xff00, 0, 0, 0, 0, 0, 0, 0), 8, "multicast"),
];

/// Returns the label of the blocked range containing `ip`, if any
///
/// IPv6 addresses that embed an IPv4 address (IPv4-mapped `::ffff:0:0/96`,
/// NAT64 `64:ff9b::/96` and 6to4 `2002::/16`) are also checked against the
/// IPv4 table, so `::ffff:127.0.0.1` cannot sneak past the loopback rule.
///
/// With `allow_loopback`, 127.0.0.0/8 and `::1` are exempt (local development
/// and test harnesses only). Nothing else is ever exempt.
///
/// # Examples
///
/// ```
/// use safe_fetch::url::blocked_range;
///
/// assert_eq!(blocked_range("10.1.2.3".parse().unwrap(), false), Some("private"));
/// assert_eq!(blocked_range("93.184.216.34".parse().unwrap(), false), None);
/// ```
pub fn blocked_range(ip: IpAddr, allow_loopback: bool) -> Option<&'static str> {
    match ip {
        IpAddr::V4(v4) => blocked_v4(v4, allow_loopback),
        IpAddr::V6(v6) => {
            if let Some(v4) = embedded_v4(&v6) {
                return blocked_v4(v4, allow_loopback);
            }
            if allow_loopback && v6 == Ipv6Addr::LOCALHOST {
                return None;
            }
            BLOCKED_V6
                .iter()
                .find(|(net, prefix, _)| v6_in(v6, *net, *prefix))
                .map(|(_, _, label)| *label)
        }
    }
}

/// Returns true if the address may be fetched
pub fn is_public(ip: IpAddr) -> bool {
    blocked_range(ip, false).is_none()
}

fn blocked_v4(ip: Ipv4Addr, allow_loopback: bool) -> Option<&'static str> {
    if allow_loopback && ip.is_loopback() {
        return None;
    }
    BLOCKED_V4
        .iter()
        .find(|(net, prefix, _)| v4_in(ip, *net, *prefix))
        .map(|(_, _, label)| *label)
}

fn v4_in(ip: Ipv4Addr, net: Ipv4Addr, prefix: u8) -> bool {
    let mask = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    };
    (u32::from(ip) & mask) == (u32::from(net) & mask)
}

fn v6_in(ip: Ipv6Addr, net: Ipv6Addr, prefix: u8) -> bool {
    let mask = if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    };
    (u128::from(ip) & mask) == (u128::from(net) & mask)
}

/// Extracts an IPv4 address tunnelled inside an IPv6 address
fn embedded_v4(ip: &Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return Some(v4);
    }

    let segments = ip.segments();
    let bits = u128::from(*ip);

    // NAT64 well-known prefix 64:ff9b::/96
    if segments[..6] == [0x64, 0xff9b, 0, 0, 0, 0] {
        return Some(Ipv4Addr::from(bits as u32));
    }

    // 6to4 2002:AABB:CCDD::/48
    if segments[0] == 0x2002 {
        return Some(Ipv4Addr::from((bits >> 80) as u32));
    }

    None
}
