use std::collections::BTreeMap;
use std::fmt::{Formatter, Result as FmtResult};

use anyhow::{Context, Result};
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{self, Serialize, Serializer};
use serde::{Deserialize, Deserializer};

use crate::utils::time::Timestamp;

/// Untyped tree produced by the markup parser. Mapping keys are kept sorted,
/// which is what makes the byte encoding canonical.
#[derive(Debug, Clone, PartialEq)]
pub enum GenericValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Timestamp(Timestamp),
    Sequence(Vec<GenericValue>),
    Mapping(BTreeMap<String, GenericValue>),
}

/// `UInt` only holds values above `i64::MAX`; everything smaller is `Int`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl Number {
    #[must_use]
    pub fn from_u64(value: u64) -> Self {
        i64::try_from(value).map_or(Self::UInt(value), Self::Int)
    }
}

impl std::fmt::Display for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::UInt(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
        }
    }
}

impl GenericValue {
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Timestamp(_) => "timestamp",
            Self::Sequence(_) => "sequence",
            Self::Mapping(_) => "mapping",
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_sequence(&self) -> Option<&[GenericValue]> {
        match self {
            Self::Sequence(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_mapping(&self) -> Option<&BTreeMap<String, GenericValue>> {
        match self {
            Self::Mapping(map) => Some(map),
            _ => None,
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&GenericValue> {
        self.as_mapping().and_then(|map| map.get(key))
    }

    /// Compact JSON with sorted keys and canonical timestamp text. Fails only
    /// for values JSON cannot carry (non-finite floats).
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("failed to encode value tree as canonical JSON")
    }

    /// Strings are never reinterpreted, so a stored timestamp reads back as
    /// its canonical text. See [`GenericValue::canonicalized`].
    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("failed to decode canonical JSON value tree")
    }

    /// The tree as it reads back from the store: timestamps are replaced by
    /// their canonical text and everything else is unchanged.
    pub fn canonicalized(&self) -> Result<Self> {
        Ok(match self {
            Self::Timestamp(timestamp) => Self::String(timestamp.canonical_text()?),
            Self::Sequence(items) => Self::Sequence(
                items
                    .iter()
                    .map(Self::canonicalized)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Self::Mapping(map) => Self::Mapping(
                map.iter()
                    .map(|(key, value)| Ok((key.clone(), value.canonicalized()?)))
                    .collect::<Result<BTreeMap<_, _>>>()?,
            ),
            other => other.clone(),
        })
    }
}

impl Serialize for GenericValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::Number(Number::Int(value)) => serializer.serialize_i64(*value),
            Self::Number(Number::UInt(value)) => serializer.serialize_u64(*value),
            Self::Number(Number::Float(value)) => {
                if !value.is_finite() {
                    return Err(<S::Error as ser::Error>::custom(format!(
                        "non-finite float `{value}` has no canonical encoding"
                    )));
                }
                serializer.serialize_f64(*value)
            }
            Self::String(text) => serializer.serialize_str(text),
            Self::Timestamp(timestamp) => {
                let text = timestamp
                    .canonical_text()
                    .map_err(|error| <S::Error as ser::Error>::custom(format!("{error:#}")))?;
                serializer.serialize_str(&text)
            }
            Self::Sequence(items) => serializer.collect_seq(items),
            Self::Mapping(map) => serializer.collect_map(map),
        }
    }
}

impl<'de> Deserialize<'de> for GenericValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(GenericValueVisitor)
    }
}

struct GenericValueVisitor;

impl<'de> Visitor<'de> for GenericValueVisitor {
    type Value = GenericValue;

    fn expecting(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        formatter.write_str("a null, boolean, number, string, sequence or string-keyed mapping")
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(GenericValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(GenericValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<Self::Value, D::Error> {
        GenericValue::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> std::result::Result<Self::Value, E> {
        Ok(GenericValue::Bool(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<Self::Value, E> {
        Ok(GenericValue::Number(Number::Int(value)))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<Self::Value, E> {
        Ok(GenericValue::Number(Number::from_u64(value)))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> std::result::Result<Self::Value, E> {
        Ok(GenericValue::Number(Number::Float(value)))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<Self::Value, E> {
        Ok(GenericValue::String(value.to_string()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> std::result::Result<Self::Value, E> {
        Ok(GenericValue::String(value))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<GenericValue>()? {
            items.push(item);
        }
        Ok(GenericValue::Sequence(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
        let mut entries = BTreeMap::new();
        while let Some((key, value)) = map.next_entry::<String, GenericValue>()? {
            entries.insert(key, value);
        }
        Ok(GenericValue::Mapping(entries))
    }
}
