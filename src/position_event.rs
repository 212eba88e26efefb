use anyhow::Result;
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};

pub const POSITION_PORTNUM: &str = "POSITION_APP";

// Only the fields used here are modelled; the host packet carries many more.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MeshPacket {
    #[serde(default)]
    pub decoded: Option<Decoded>,
    #[serde(default, rename = "fromId")]
    pub from_id: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Decoded {
    #[serde(default)]
    pub portnum: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
    /// Whether the sender included `precisionBits` at all. Its value is
    /// never looked at.
    #[serde(default, rename = "precisionBits", deserialize_with = "key_present")]
    pub has_precision_bits: bool,
}

fn key_present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    IgnoredAny::deserialize(deserializer)?;
    Ok(true)
}

/// A validated position report: the device it came from and where it was.
#[derive(Clone, Debug, PartialEq)]
pub struct PositionReport {
    pub device_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl MeshPacket {
    /// Parses a raw host packet. Anything that does not fit the expected
    /// shape is treated as "not a position report".
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        MeshPacket::deserialize(value).ok()
    }

    /// The position of this packet if it is a reportable fix, i.e. a
    /// `POSITION_APP` payload with `precisionBits` present.
    pub fn reportable_position(&self) -> Option<&Position> {
        let decoded = self.decoded.as_ref()?;
        if decoded.portnum.as_deref() != Some(POSITION_PORTNUM) {
            return None;
        }
        decoded.position.as_ref().filter(|p| p.has_precision_bits)
    }

    /// Builds the report for a packet that passed `reportable_position`.
    /// Missing coordinates or sender are an error rather than a silent skip.
    pub fn position_report(&self, position: &Position) -> Result<PositionReport> {
        let latitude = position
            .latitude
            .ok_or_else(|| anyhow!("position report without latitude"))?;
        let longitude = position
            .longitude
            .ok_or_else(|| anyhow!("position report without longitude"))?;
        let device_id = self
            .from_id
            .as_deref()
            .map(device_id_from)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow!("position report without fromId"))?;
        Ok(PositionReport {
            device_id: device_id.to_string(),
            latitude,
            longitude,
            altitude: position.altitude.unwrap_or(0.0),
        })
    }
}

/// Node IDs are sent as `!ab12cd34`; files are named after the bare hex part.
pub fn device_id_from(from_id: &str) -> &str {
    from_id.strip_prefix('!').unwrap_or(from_id)
}
