//! Encoded score-map payloads for the sorted-set commands.
//!
//! A sorted set is stored as one JSON object in the entry's value: member
//! name to numeric score. Payloads that fail to decode, or decode to
//! something other than an object, are treated as empty rather than raised
//! — a corrupt set heals on the next write and reads as absent until then.

use crate::core::error::TrellisResult;
use serde_json::{Map, Value};

/// A decoded member-to-score mapping.
#[derive(Debug, Clone, Default)]
pub struct ScoreMap {
    members: Map<String, Value>,
}

impl ScoreMap {
    /// Decode a stored payload.
    ///
    /// Returns None when the payload is not valid JSON or not an object;
    /// callers that must not destroy data on corruption (removal, count)
    /// treat None as an empty result and leave the row untouched.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(members)) => Some(Self { members }),
            _ => None,
        }
    }

    /// Decode a stored payload, healing corruption to an empty map.
    ///
    /// Used by the merge path: a corrupt payload is overwritten with the
    /// freshly merged members.
    pub fn decode_or_default(bytes: &[u8]) -> Self {
        Self::decode(bytes).unwrap_or_default()
    }

    /// Encode for storage.
    pub fn encode(&self) -> TrellisResult<Vec<u8>> {
        Ok(serde_json::to_vec(&Value::Object(self.members.clone()))?)
    }

    /// Merge new member scores in: new members added, existing overwritten.
    pub fn merge<I>(&mut self, mapping: I)
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        for (member, score) in mapping {
            self.members.insert(member, Value::from(score));
        }
    }

    /// Remove every member whose score falls within `[min, max]` inclusive.
    ///
    /// Members whose stored score is not numeric (and not a numeric string)
    /// are kept; they cannot be compared against the bounds.
    pub fn remove_range(&mut self, min: f64, max: f64) -> u64 {
        let doomed: Vec<String> = self
            .members
            .iter()
            .filter_map(|(member, value)| {
                let score = member_score(value)?;
                (min <= score && score <= max).then(|| member.clone())
            })
            .collect();

        for member in &doomed {
            self.members.remove(member);
        }
        doomed.len() as u64
    }

    /// Number of members.
    pub fn len(&self) -> u64 {
        self.members.len() as u64
    }

    /// Check if the map has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Interpret a stored member value as a score.
fn member_score(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Parse a textual score bound, accepting infinity sentinels.
///
/// `-inf` maps to negative infinity, `+inf` and `inf` to positive infinity;
/// anything else must parse as a plain float.
pub fn parse_bound(raw: &str) -> Option<f64> {
    match raw {
        "-inf" => Some(f64::NEG_INFINITY),
        "+inf" | "inf" => Some(f64::INFINITY),
        other => other.parse().ok(),
    }
}
