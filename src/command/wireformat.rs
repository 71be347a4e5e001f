//! `WireFormatInfo`: the negotiation handshake command (§4.C, §4.D).

use crate::command::CommandHeader;
use crate::primitives::PrimitiveMap;

/// Magic string every `WireFormatInfo` opens with.
pub const MAGIC: &[u8; 8] = b"ActiveMQ";

/// Highest wire format version this crate negotiates.
pub const MAX_VERSION: u32 = 12;

#[derive(Debug, Clone, PartialEq)]
pub struct WireFormatInfo {
    pub header: CommandHeader,
    pub version: u32,
    pub properties: PrimitiveMap,
}

impl Default for WireFormatInfo {
    fn default() -> Self {
        Self {
            header: CommandHeader::default(),
            version: MAX_VERSION,
            properties: PrimitiveMap::new(),
        }
    }
}

impl WireFormatInfo {
    #[must_use]
    pub fn bool_property(&self, name: &str, default: bool) -> bool {
        self.properties
            .get(name)
            .and_then(|v| crate::primitives::convert_to_bool(v).ok())
            .unwrap_or(default)
    }

    #[must_use]
    pub fn long_property(&self, name: &str, default: i64) -> i64 {
        self.properties
            .get(name)
            .and_then(|v| crate::primitives::convert_to_long(v).ok())
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::PrimitiveValue;

    #[test]
    fn bool_property_falls_back_to_default_when_absent() {
        let info = WireFormatInfo::default();
        assert!(!info.bool_property("TightEncodingEnabled", false));
    }

    #[test]
    fn bool_property_reads_present_value() {
        let mut info = WireFormatInfo::default();
        info.properties.insert("CacheEnabled".into(), PrimitiveValue::Boolean(true));
        assert!(info.bool_property("CacheEnabled", false));
    }
}
