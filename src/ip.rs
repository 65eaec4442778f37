//! Dotted-quad IPv4 codec.
//!
//! Addresses are handled as big-endian `u32` values throughout the crate,
//! so `1.2.3.4` is `0x01020304`.

use crate::{Error, Result};

/// Parse a dotted-quad IPv4 address into its numeric value.
///
/// Exactly four decimal fields are accepted, each one to three ASCII digits
/// with a value in `0..=255`. Signs, whitespace and empty fields are
/// rejected.
///
/// # Examples
/// ```
/// use ipregion::ip::parse_ip;
///
/// assert_eq!(parse_ip("1.2.3.4").unwrap(), 0x01020304);
/// assert!(parse_ip("1.2.3").is_err());
/// ```
pub fn parse_ip(text: &str) -> Result<u32> {
    let invalid = || Error::InvalidIp(text.to_string());

    let mut value = 0u32;
    let mut fields = 0;
    for field in text.split('.') {
        fields += 1;
        if fields > 4 {
            return Err(invalid());
        }
        value = (value << 8) | u32::from(parse_octet(field).ok_or_else(invalid)?);
    }

    if fields != 4 {
        return Err(invalid());
    }
    Ok(value)
}

fn parse_octet(field: &str) -> Option<u8> {
    if field.is_empty() || field.len() > 3 || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n = field.bytes().fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0'));
    u8::try_from(n).ok()
}

/// Render a numeric IPv4 address as a dotted quad.
pub fn format_ip(ip: u32) -> String {
    let [a, b, c, d] = ip.to_be_bytes();
    format!("{}.{}.{}.{}", a, b, c, d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_valid() {
        assert_eq!(parse_ip("0.0.0.0").unwrap(), 0);
        assert_eq!(parse_ip("255.255.255.255").unwrap(), u32::MAX);
        assert_eq!(parse_ip("1.0.0.255").unwrap(), 0x010000FF);
        assert_eq!(parse_ip("8.8.8.8").unwrap(), 0x08080808);
        assert_eq!(parse_ip("192.168.001.010").unwrap(), 0xC0A8010A);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "",
            "1.2.3",
            "1.2.3.4.5",
            "1..3.4",
            "1.2.3.",
            ".1.2.3",
            "256.0.0.1",
            "1.2.3.1000",
            "0001.2.3.4",
            "+1.2.3.4",
            "-1.2.3.4",
            " 1.2.3.4",
            "1.2.3.4 ",
            "not.an.ip.x",
            "1.2.3.4/24",
            "::1",
        ] {
            let err = parse_ip(bad).unwrap_err();
            assert!(matches!(err, Error::InvalidIp(ref s) if s == bad), "{bad:?}");
        }
    }

    #[test]
    fn test_format() {
        assert_eq!(format_ip(0), "0.0.0.0");
        assert_eq!(format_ip(u32::MAX), "255.255.255.255");
        assert_eq!(format_ip(0x08080808), "8.8.8.8");
        assert_eq!(format_ip(0x01000100), "1.0.1.0");
    }

    proptest! {
        #[test]
        fn prop_numeric_round_trip(n in any::<u32>()) {
            prop_assert_eq!(parse_ip(&format_ip(n)).unwrap(), n);
        }

        #[test]
        fn prop_text_round_trip(octets in any::<[u8; 4]>()) {
            let text = format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3]);
            prop_assert_eq!(format_ip(parse_ip(&text).unwrap()), text);
        }

        #[test]
        fn prop_agrees_with_std(octets in any::<[u8; 4]>()) {
            let addr = std::net::Ipv4Addr::from(octets);
            prop_assert_eq!(parse_ip(&addr.to_string()).unwrap(), u32::from(addr));
        }
    }
}
