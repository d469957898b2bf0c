use std::collections::BTreeSet;

use serde_json::Value;

/// Ranges kept per BITMAP datagram, chosen so the encoded JSON stays comfortably
/// under the ~1400B safe-MTU payload budget.
pub const MAX_RANGES: usize = 50;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum BitmapError {
    #[error("invalid bitmap JSON: {0}")]
    InvalidJson(String),
    #[error("bitmap entry is neither an integer nor a [start, end] pair")]
    UnrecognizedEntry,
}

/// Merge a sorted set of chunk_ids into ascending, maximal `[start, end]` runs.
fn merge_runs(ids: &BTreeSet<u32>) -> Vec<(u32, u32)> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for &id in ids {
        match runs.last_mut() {
            Some((_, end)) if *end + 1 == id => *end = id,
            _ => runs.push((id, id)),
        }
    }
    runs
}

/// Encode a local bitmap into the wire payload: RLE ranges, keeping only the most
/// recent (highest chunk_id) `MAX_RANGES` runs.
pub fn encode(ids: &BTreeSet<u32>) -> Vec<u8> {
    let mut runs = merge_runs(ids);
    if runs.len() > MAX_RANGES {
        let drop = runs.len() - MAX_RANGES;
        runs.drain(..drop);
    }
    let json: Vec<[u32; 2]> = runs.into_iter().map(|(s, e)| [s, e]).collect();
    serde_json::to_vec(&json).expect("range list always serializes")
}

/// Decode a BITMAP payload, accepting either the preferred RLE-ranges form
/// (`[[s,e], ...]`) or a flat integer list (`[c, ...]`), for backward compatibility.
pub fn decode(bytes: &[u8]) -> Result<BTreeSet<u32>, BitmapError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| BitmapError::InvalidJson(e.to_string()))?;
    let entries = value.as_array().ok_or_else(|| {
        BitmapError::InvalidJson("top-level bitmap JSON must be an array".to_string())
    })?;

    let mut out = BTreeSet::new();
    for entry in entries {
        match entry {
            Value::Number(n) => {
                let id = n.as_u64().ok_or(BitmapError::UnrecognizedEntry)? as u32;
                out.insert(id);
            }
            Value::Array(pair) => {
                if pair.len() != 2 {
                    return Err(BitmapError::UnrecognizedEntry);
                }
                let start = pair[0].as_u64().ok_or(BitmapError::UnrecognizedEntry)? as u32;
                let end = pair[1].as_u64().ok_or(BitmapError::UnrecognizedEntry)? as u32;
                for id in start..=end {
                    out.insert(id);
                }
            }
            _ => return Err(BitmapError::UnrecognizedEntry),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_round_trip_without_truncation() {
        let set: BTreeSet<u32> = [1, 2, 3, 7, 8, 20].into_iter().collect();
        let encoded = encode(&set);
        assert_eq!(decode(&encoded).unwrap(), set);
    }

    #[test]
    fn truncates_to_the_50_highest_ranges() {
        // 120 disjoint singleton chunks -> 120 ranges, should keep the top 50 by value.
        let set: BTreeSet<u32> = (0u32..120).step_by(1).collect();
        // make them disjoint singletons by spacing them out
        let set: BTreeSet<u32> = set.iter().map(|&i| i * 2).collect();
        let encoded = encode(&set);
        let decoded = decode(&encoded).unwrap();

        let all_runs = merge_runs(&set);
        assert_eq!(all_runs.len(), 120);
        let kept: BTreeSet<u32> = all_runs[70..]
            .iter()
            .flat_map(|&(s, e)| s..=e)
            .collect();
        assert_eq!(decoded, kept);
        assert_eq!(decoded.len(), 50);
    }

    #[test]
    fn decodes_flat_integer_list() {
        let bytes = serde_json::to_vec(&[1, 2, 3]).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, [1, 2, 3].into_iter().collect());
    }

    #[test]
    fn decodes_mixed_json_shapes_are_rejected_gracefully() {
        assert!(decode(b"not json").is_err());
        assert!(decode(b"{}").is_err());
    }

    #[test]
    fn merges_consecutive_runs() {
        let set: BTreeSet<u32> = [1, 2, 3, 5, 6, 10].into_iter().collect();
        assert_eq!(merge_runs(&set), vec![(1, 3), (5, 6), (10, 10)]);
    }
}
