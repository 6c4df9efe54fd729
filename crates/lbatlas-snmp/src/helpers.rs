// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! Encoding helpers shared by the vendor collectors: the length-prefixed
//! string-in-OID codec used by Cisco CS and F5, and the Alteon group
//! membership bitmap.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Encode a string the way several MIBs index tables: one length component
/// followed by one component per byte.
pub fn oid_string(s: &str) -> Vec<u64> {
    let mut components = Vec::with_capacity(s.len() + 1);
    components.push(s.len() as u64);
    components.extend(s.bytes().map(u64::from));
    components
}

/// Decode one or more length-prefixed strings packed into an OID tail,
/// in order. Returns `None` when a length prefix overruns the sequence.
pub fn string_oid(components: &[u64]) -> Option<Vec<String>> {
    let mut strings = Vec::new();
    let mut rest = components;
    while !rest.is_empty() {
        let len = usize::try_from(rest[0]).ok()?;
        if rest.len() < len + 1 {
            return None;
        }
        let bytes: Vec<u8> = rest[1..=len]
            .iter()
            .map(|c| u8::try_from(*c).ok())
            .collect::<Option<_>>()?;
        strings.push(String::from_utf8_lossy(&bytes).into_owned());
        rest = &rest[len + 1..];
    }
    Some(strings)
}

/// Iterate the 1-based positions of the set bits of an Alteon membership
/// bitmap. For byte `i` (0-based) and bit `r` (0-based from the LSB) the
/// yielded position is `8 - r + i*8`; this off-by-one is what
/// slbCurCfgRealServer indices use as keys and must not be "fixed".
pub fn bitmap(bytes: &[u8]) -> impl Iterator<Item = u64> + '_ {
    bytes.iter().enumerate().flat_map(|(i, byte)| {
        (0..8u64)
            .filter(move |r| byte & (1u8 << r) != 0)
            .map(move |r| 8 - r + (i as u64) * 8)
    })
}

/// Interpret a raw 4- or 16-byte address.
pub fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_codec_round_trips() {
        for s in ["", "a", "owner", "a longer string with spaces"] {
            let encoded = oid_string(s);
            assert_eq!(encoded[0] as usize, s.len());
            assert_eq!(string_oid(&encoded).unwrap(), vec![s.to_string()]);
        }
    }

    #[test]
    fn packed_strings_decode_in_order() {
        let mut packed = oid_string("owner");
        packed.extend(oid_string("content"));
        assert_eq!(
            string_oid(&packed).unwrap(),
            vec!["owner".to_string(), "content".to_string()]
        );
        // A length prefix pointing past the end is malformed.
        assert!(string_oid(&[5, 97]).is_none());
    }

    #[test]
    fn bitmap_positions() {
        // 0x03: LSB bits 0 and 1 -> positions 8 and 7.
        assert_eq!(bitmap(&[0x03]).collect::<Vec<_>>(), vec![8, 7]);
        // 0xC0: LSB bits 6 and 7 -> positions 2 and 1.
        assert_eq!(bitmap(&[0xC0]).collect::<Vec<_>>(), vec![2, 1]);
        // Second byte shifts by 8.
        assert_eq!(bitmap(&[0x00, 0x01]).collect::<Vec<_>>(), vec![16]);
    }

    #[test]
    fn bitmap_popcount() {
        let bytes = [0xA5u8, 0x00, 0xFF, 0x10];
        let expected: u32 = bytes.iter().map(|b| b.count_ones()).sum();
        let positions: Vec<u64> = bitmap(&bytes).collect();
        assert_eq!(positions.len() as u32, expected);
        for p in positions {
            assert!(p >= 1 && p <= 8 * bytes.len() as u64);
        }
    }

    #[test]
    fn raw_addresses() {
        assert_eq!(
            ip_from_bytes(&[10, 0, 0, 1]).unwrap().to_string(),
            "10.0.0.1"
        );
        let v6 = ip_from_bytes(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]).unwrap();
        assert_eq!(v6.to_string(), "::1");
        assert!(ip_from_bytes(&[1, 2, 3]).is_none());
    }
}
