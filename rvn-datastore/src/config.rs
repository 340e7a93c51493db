//! Typed, keyed configuration with defaults and converters.
//!
//! Replaces the source's dynamic-type / runtime-reflected converter
//! design with a statically-typed registry: each
//! [`ConfigProperty<T>`] owns its own converter function, and [`Config`]
//! stores only raw strings, converting on read. Modeled on the shape of
//! `pbs-config::prune`'s static property registry, minus its
//! section-config/schema-macro machinery, which this spec doesn't need.

use std::collections::HashMap;
use std::fmt;

use rvn_api_types::ReversionError;

use crate::chunker::{Chunker, FixedSizeChunker, RollingHashChunker};

/// Lets a converter signal `ValueConvertError` with the offending key and
/// raw value already attached.
pub struct ConvertContext<'a> {
    key: &'a str,
    raw: &'a str,
}

impl<'a> ConvertContext<'a> {
    pub fn fail(&self, message: impl Into<String>) -> ReversionError {
        ReversionError::ValueConvertError {
            key: self.key.to_string(),
            value: self.raw.to_string(),
            message: message.into(),
        }
    }
}

/// A single typed, defaulted, converted configuration property.
pub struct ConfigProperty<T> {
    pub key: &'static str,
    pub human_name: &'static str,
    pub description: &'static str,
    default: fn() -> T,
    converter: fn(&str, &ConvertContext) -> Result<T, ReversionError>,
}

impl<T> ConfigProperty<T> {
    pub const fn new(
        key: &'static str,
        human_name: &'static str,
        description: &'static str,
        default: fn() -> T,
        converter: fn(&str, &ConvertContext) -> Result<T, ReversionError>,
    ) -> Self {
        ConfigProperty {
            key,
            human_name,
            description,
            default,
            converter,
        }
    }
}

/// A map of keyed raw string values, with typed, defaulted access via
/// [`ConfigProperty`].
#[derive(Debug, Clone, Default)]
pub struct Config {
    values: HashMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }

    pub fn from_raw(values: HashMap<String, String>) -> Self {
        Config { values }
    }

    pub fn set_raw(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn raw_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns `property.default()` if unset, else the result of running
    /// the property's converter over the stored raw string.
    pub fn get<T>(&self, property: &ConfigProperty<T>) -> Result<T, ReversionError> {
        match self.values.get(property.key) {
            None => Ok((property.default)()),
            Some(raw) => {
                let ctx = ConvertContext {
                    key: property.key,
                    raw,
                };
                (property.converter)(raw, &ctx)
            }
        }
    }
}

/// Describes which [`Chunker`] a repository uses, serialised into the
/// `chunker` config property. `blockSize` is only meaningful for the
/// fixed-size variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkerSpec {
    /// One chunk per file, treated as effectively unbounded size.
    WholeFile,
    Fixed(u64),
    Rolling(u32),
}

impl ChunkerSpec {
    pub fn build(self) -> Box<dyn Chunker + Send + Sync> {
        match self {
            ChunkerSpec::WholeFile => Box::new(FixedSizeChunker::whole_file()),
            ChunkerSpec::Fixed(size) => Box::new(FixedSizeChunker::new(size)),
            ChunkerSpec::Rolling(bits) => Box::new(RollingHashChunker::new(bits)),
        }
    }
}

impl fmt::Display for ChunkerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkerSpec::WholeFile => write!(f, "whole-file"),
            ChunkerSpec::Fixed(size) => write!(f, "fixed:{size}"),
            ChunkerSpec::Rolling(bits) => write!(f, "rolling:{bits}"),
        }
    }
}

impl std::str::FromStr for ChunkerSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "whole-file" {
            return Ok(ChunkerSpec::WholeFile);
        }
        if let Some(rest) = s.strip_prefix("fixed:") {
            let size: u64 = rest.parse().map_err(|_| format!("bad fixed chunk size '{rest}'"))?;
            return Ok(ChunkerSpec::Fixed(size));
        }
        if let Some(rest) = s.strip_prefix("rolling:") {
            let bits: u32 = rest.parse().map_err(|_| format!("bad rolling chunker bit-width '{rest}'"))?;
            return Ok(ChunkerSpec::Rolling(bits));
        }
        Err(format!("unrecognised chunker spec '{s}'"))
    }
}

fn convert_hash_algorithm(raw: &str, ctx: &ConvertContext) -> Result<String, ReversionError> {
    match crate::checksum::HashAlgorithm::parse(raw) {
        Some(algo) => Ok(algo.name().to_string()),
        None => Err(ctx.fail(format!("unsupported hash algorithm '{raw}'"))),
    }
}

fn convert_chunker(raw: &str, ctx: &ConvertContext) -> Result<ChunkerSpec, ReversionError> {
    raw.parse().map_err(|msg| ctx.fail(msg))
}

fn convert_block_size(raw: &str, ctx: &ConvertContext) -> Result<u64, ReversionError> {
    raw.parse().map_err(|_| ctx.fail(format!("'{raw}' is not an integer byte count")))
}

/// `hashAlgorithm`: digest algorithm for files and blobs.
pub static HASH_ALGORITHM: ConfigProperty<String> = ConfigProperty::new(
    "hashAlgorithm",
    "Hash algorithm",
    "Digest algorithm used for files and blobs",
    || "SHA-256".to_string(),
    convert_hash_algorithm,
);

/// `chunker`: determines block granularity and the dedup unit.
pub static CHUNKER: ConfigProperty<ChunkerSpec> = ConfigProperty::new(
    "chunker",
    "Chunker",
    "Chunking strategy used to split files into blocks",
    || ChunkerSpec::WholeFile,
    convert_chunker,
);

/// `blockSize`: only meaningful for fixed-size chunker variants.
pub static BLOCK_SIZE: ConfigProperty<u64> = ConfigProperty::new(
    "blockSize",
    "Block size",
    "Target block size in bytes for the fixed-size chunker",
    || 4 * 1024 * 1024,
    convert_block_size,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_property_returns_default() {
        let config = Config::new();
        assert_eq!(config.get(&HASH_ALGORITHM).unwrap(), "SHA-256");
        assert_eq!(config.get(&CHUNKER).unwrap(), ChunkerSpec::WholeFile);
    }

    #[test]
    fn set_property_is_converted() {
        let mut config = Config::new();
        config.set_raw("chunker", "rolling:16");
        assert_eq!(config.get(&CHUNKER).unwrap(), ChunkerSpec::Rolling(16));
    }

    #[test]
    fn bad_value_surfaces_value_convert_error() {
        let mut config = Config::new();
        config.set_raw("hashAlgorithm", "md5");
        let err = config.get(&HASH_ALGORITHM).unwrap_err();
        match err {
            ReversionError::ValueConvertError { key, value, .. } => {
                assert_eq!(key, "hashAlgorithm");
                assert_eq!(value, "md5");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn chunker_spec_round_trips_through_display() {
        for spec in [
            ChunkerSpec::WholeFile,
            ChunkerSpec::Fixed(65536),
            ChunkerSpec::Rolling(18),
        ] {
            let text = spec.to_string();
            let parsed: ChunkerSpec = text.parse().unwrap();
            assert_eq!(spec, parsed);
        }
    }
}
