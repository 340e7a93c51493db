use std::fmt;

/// An opaque content digest, by default 32 bytes (SHA-256).
///
/// Equality and ordering are defined over the raw bytes, so a `Checksum`
/// can be used directly as a map key or sorted for deterministic output.
/// Display and the filename form used by the blob store are lower-case hex.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Checksum(Vec<u8>);

impl Checksum {
    /// Wrap raw digest bytes. Does not hash or validate length; callers
    /// that need a specific algorithm's output size should check that
    /// themselves (mixing algorithms within one repository is a
    /// programmer error rejected at the API boundary, not here).
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Checksum(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lower-case hex encoding, e.g. for blob-store filenames.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        Ok(Checksum(hex::decode(s)?))
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.to_hex())
    }
}

impl AsRef<[u8]> for Checksum {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Checksum {
    fn from(bytes: [u8; 32]) -> Self {
        Checksum(bytes.to_vec())
    }
}

impl serde::Serialize for Checksum {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for Checksum {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Checksum::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let bytes = [0xab_u8, 0xcd, 0x00, 0xff];
        let sum = Checksum::from_bytes(bytes.to_vec());
        assert_eq!(sum.to_hex(), "abcd00ff");
        let parsed = Checksum::from_hex("abcd00ff").unwrap();
        assert_eq!(sum, parsed);
    }

    #[test]
    fn ordering_is_by_bytes() {
        let a = Checksum::from_bytes(vec![0x01]);
        let b = Checksum::from_bytes(vec![0x02]);
        assert!(a < b);
    }
}
