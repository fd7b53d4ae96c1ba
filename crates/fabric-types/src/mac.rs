//! MAC address and masked MAC match types.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 48-bit Ethernet MAC address.
///
/// # Examples
///
/// ```
/// use fabric_types::MacAddress;
///
/// let mac: MacAddress = "02:00:00:01:00:01".parse().unwrap();
/// assert_eq!(mac.to_string(), "02:00:00:01:00:01");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// The broadcast address (ff:ff:ff:ff:ff:ff).
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    /// The zero address (00:00:00:00:00:00).
    pub const ZERO: MacAddress = MacAddress([0; 6]);

    /// Creates a new MAC address from raw bytes.
    pub const fn new(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }

    /// Returns the raw bytes of the MAC address.
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Returns true if this is a locally administered address.
    ///
    /// Every address the fabric hands out is locally administered.
    pub const fn is_local(&self) -> bool {
        self.0[0] & 0x02 != 0
    }

    /// Returns true if this is the broadcast address.
    pub const fn is_broadcast(&self) -> bool {
        let b = &self.0;
        b[0] == 0xff && b[1] == 0xff && b[2] == 0xff && b[3] == 0xff && b[4] == 0xff && b[5] == 0xff
    }

    /// Bitwise AND with `mask`.
    pub fn masked(&self, mask: &MacAddress) -> MacAddress {
        let mut out = [0u8; 6];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.0[i] & mask.0[i];
        }
        MacAddress(out)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let separator = if s.contains(':') { ':' } else { '-' };

        let parts: Vec<&str> = s.split(separator).collect();
        if parts.len() != 6 {
            return Err(ParseError::InvalidMacAddress(s.to_string()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| ParseError::InvalidMacAddress(s.to_string()))?;
        }

        Ok(MacAddress(bytes))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> String {
        mac.to_string()
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }
}

impl From<MacAddress> for [u8; 6] {
    fn from(mac: MacAddress) -> [u8; 6] {
        mac.0
    }
}

/// A MAC address with a bit mask, written `address/mask`.
///
/// Unlike IP prefixes the mask need not be contiguous, but the fabric only
/// ever uses whole-byte masks over the trailing fields of a host address.
/// The stored address is always pre-masked so that two prefixes covering the
/// same set of addresses compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MacPrefix {
    address: MacAddress,
    mask: MacAddress,
}

impl MacPrefix {
    /// Creates a prefix, clearing address bits outside `mask`.
    pub fn new(address: MacAddress, mask: MacAddress) -> Self {
        MacPrefix {
            address: address.masked(&mask),
            mask,
        }
    }

    /// A prefix matching exactly one address.
    pub const fn exact(address: MacAddress) -> Self {
        MacPrefix {
            address,
            mask: MacAddress::BROADCAST,
        }
    }

    /// A prefix keeping the first `bytes` octets and wildcarding the rest.
    pub fn leading_bytes(address: MacAddress, bytes: usize) -> Self {
        let mut mask = [0u8; 6];
        for byte in mask.iter_mut().take(bytes) {
            *byte = 0xff;
        }
        MacPrefix::new(address, MacAddress(mask))
    }

    /// Returns the masked address.
    pub const fn address(&self) -> &MacAddress {
        &self.address
    }

    /// Returns the mask.
    pub const fn mask(&self) -> &MacAddress {
        &self.mask
    }

    /// Returns true if the mask selects every bit.
    pub const fn is_exact(&self) -> bool {
        self.mask.is_broadcast()
    }

    /// Returns true if `mac` falls under this prefix.
    pub fn contains(&self, mac: &MacAddress) -> bool {
        mac.masked(&self.mask) == self.address
    }

    /// Returns true if every address matched by `other` is matched by `self`.
    pub fn covers(&self, other: &MacPrefix) -> bool {
        other.mask.masked(&self.mask) == self.mask && self.contains(&other.address)
    }
}

impl fmt::Display for MacPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exact() {
            write!(f, "{}", self.address)
        } else {
            write!(f, "{}/{}", self.address, self.mask)
        }
    }
}

impl From<MacAddress> for MacPrefix {
    fn from(mac: MacAddress) -> Self {
        MacPrefix::exact(mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_colon_format() {
        let mac: MacAddress = "02:00:00:01:00:01".parse().unwrap();
        assert_eq!(mac.as_bytes(), &[0x02, 0x00, 0x00, 0x01, 0x00, 0x01]);
    }

    #[test]
    fn test_parse_hyphen_format() {
        let mac: MacAddress = "02-ff-00-00-00-02".parse().unwrap();
        assert_eq!(mac.as_bytes(), &[0x02, 0xff, 0x00, 0x00, 0x00, 0x02]);
    }

    #[test]
    fn test_display() {
        let mac = MacAddress::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_invalid_format() {
        assert!("invalid".parse::<MacAddress>().is_err());
        assert!("02:00:00:00:00".parse::<MacAddress>().is_err());
        assert!("02:00:00:00:00:00:00".parse::<MacAddress>().is_err());
        assert!("0g:00:00:00:00:00".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_string_round_trip() {
        let mac = MacAddress::new([0x02, 0, 0, 3, 1, 0]);
        let text = String::from(mac);
        assert_eq!(text, "02:00:00:03:01:00");
        assert_eq!(MacAddress::try_from(text).unwrap(), mac);
    }

    #[test]
    fn test_prefix_is_premasked() {
        let a = MacPrefix::leading_bytes(MacAddress::new([2, 0, 0, 1, 7, 9]), 4);
        let b = MacPrefix::leading_bytes(MacAddress::new([2, 0, 0, 1, 0, 0]), 4);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "02:00:00:01:00:00/ff:ff:ff:ff:00:00");
    }

    #[test]
    fn test_prefix_contains() {
        let pod1 = MacPrefix::leading_bytes(MacAddress::new([2, 0, 0, 1, 0, 0]), 4);
        assert!(pod1.contains(&MacAddress::new([2, 0, 0, 1, 1, 0])));
        assert!(!pod1.contains(&MacAddress::new([2, 0, 0, 2, 1, 0])));
    }

    #[test]
    fn test_prefix_covers() {
        let pod = MacPrefix::leading_bytes(MacAddress::new([2, 0, 0, 1, 0, 0]), 4);
        let edge = MacPrefix::leading_bytes(MacAddress::new([2, 0, 0, 1, 1, 0]), 5);
        let host = MacPrefix::exact(MacAddress::new([2, 0, 0, 1, 1, 1]));

        assert!(pod.covers(&edge));
        assert!(pod.covers(&host));
        assert!(edge.covers(&host));
        assert!(!host.covers(&edge));
        assert!(!edge.covers(&pod));
    }

    #[test]
    fn test_exact_prefix_display() {
        let host = MacPrefix::exact(MacAddress::new([2, 0, 0, 0, 0, 0]));
        assert!(host.is_exact());
        assert_eq!(host.to_string(), "02:00:00:00:00:00");
    }
}
