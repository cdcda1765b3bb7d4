//! Base64 VLQ codec for the `mappings` field of a version 3 source map.
//!
//! Decoding keeps four running totals (source index, source line, source
//! column, name index) across the whole mapping and one (generated column)
//! that resets at every `;`. Encoding recomputes the same deltas, so any
//! mapping produced by [`encode`] round-trips byte for byte.

use crate::{Result, SourceryError};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::Arc;

const VLQ_BASE_SHIFT: u32 = 5;
const VLQ_BASE: i64 = 1 << VLQ_BASE_SHIFT;
const VLQ_BASE_MASK: i64 = VLQ_BASE - 1;
const VLQ_CONTINUATION_BIT: i64 = VLQ_BASE;
const VLQ_MAX_SHIFT: u32 = 55;

const BASE64_CHARS: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Where a generated position came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Origin {
    pub source: u32,
    pub line: u32,
    pub column: u32,
    pub name: Option<u32>,
}

/// One decoded segment. `origin == None` is the 1-field form: a generated
/// position with deliberately no source association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Segment {
    pub generated_column: u32,
    pub origin: Option<Origin>,
}

impl Segment {
    pub const fn unmapped(generated_column: u32) -> Self {
        Self {
            generated_column,
            origin: None,
        }
    }

    pub const fn mapped(generated_column: u32, source: u32, line: u32, column: u32) -> Self {
        Self {
            generated_column,
            origin: Some(Origin {
                source,
                line,
                column,
                name: None,
            }),
        }
    }

    pub const fn named(
        generated_column: u32,
        source: u32,
        line: u32,
        column: u32,
        name: u32,
    ) -> Self {
        Self {
            generated_column,
            origin: Some(Origin {
                source,
                line,
                column,
                name: Some(name),
            }),
        }
    }

    /// Number of VLQ fields this segment occupies when encoded (1, 4 or 5).
    pub const fn field_count(&self) -> usize {
        match self.origin {
            None => 1,
            Some(Origin { name: None, .. }) => 4,
            Some(Origin { name: Some(_), .. }) => 5,
        }
    }
}

pub type Line = Vec<Segment>;
pub type Mappings = Vec<Line>;

#[derive(Default)]
struct RunningTotals {
    source: i64,
    line: i64,
    column: i64,
    name: i64,
}

pub fn encode_integer(value: i64, out: &mut String) {
    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };

    loop {
        let mut digit = vlq & VLQ_BASE_MASK;
        vlq >>= VLQ_BASE_SHIFT;
        if vlq > 0 {
            digit |= VLQ_CONTINUATION_BIT;
        }
        out.push(BASE64_CHARS[digit as usize] as char);
        if vlq == 0 {
            break;
        }
    }
}

const fn decode_base64_digit(byte: u8) -> Option<i64> {
    let value = match byte {
        b'A'..=b'Z' => byte - b'A',
        b'a'..=b'z' => byte - b'a' + 26,
        b'0'..=b'9' => byte - b'0' + 52,
        b'+' => 62,
        b'/' => 63,
        _ => return None,
    };
    Some(value as i64)
}

/// Decodes every VLQ integer in `text` (one segment's worth of fields).
pub fn decode_integers(text: &str) -> Result<Vec<i64>> {
    let mut values = Vec::with_capacity(5);
    let mut value: i64 = 0;
    let mut shift: u32 = 0;

    for (pos, byte) in text.bytes().enumerate() {
        let digit = decode_base64_digit(byte).ok_or_else(|| SourceryError::MalformedMapping {
            reason: format!("invalid base64 character {:?} at offset {pos}", byte as char),
        })?;

        if shift > VLQ_MAX_SHIFT {
            return Err(SourceryError::MalformedMapping {
                reason: format!("VLQ value overflows in segment {text:?}"),
            });
        }
        value += (digit & VLQ_BASE_MASK) << shift;

        if digit & VLQ_CONTINUATION_BIT == 0 {
            let negative = value & 1 == 1;
            value >>= 1;
            values.push(if negative { -value } else { value });
            value = 0;
            shift = 0;
        } else {
            shift += VLQ_BASE_SHIFT;
        }
    }

    if shift != 0 {
        return Err(SourceryError::MalformedMapping {
            reason: format!("unterminated VLQ value in segment {text:?}"),
        });
    }

    Ok(values)
}

fn accumulate(total: &mut i64, delta: i64, field: &str, line: usize) -> Result<u32> {
    *total += delta;
    u32::try_from(*total).map_err(|_| SourceryError::MalformedMapping {
        reason: format!("{field} out of range ({total}) on line {line}", total = *total),
    })
}

/// Decodes a `mappings` string into lines of segments.
pub fn decode(mappings: &str) -> Result<Mappings> {
    let mut totals = RunningTotals::default();
    let mut decoded = Vec::new();

    for (line_index, line) in mappings.split(';').enumerate() {
        let mut generated_column: i64 = 0;
        let mut segments = Line::new();

        for text in line.split(',') {
            if text.is_empty() {
                continue;
            }

            let fields = decode_integers(text)?;
            let column = accumulate(
                &mut generated_column,
                fields[0],
                "generated column",
                line_index,
            )?;

            let origin = match fields.len() {
                1 => None,
                4 | 5 => {
                    let source = accumulate(&mut totals.source, fields[1], "source index", line_index)?;
                    let src_line = accumulate(&mut totals.line, fields[2], "source line", line_index)?;
                    let src_column =
                        accumulate(&mut totals.column, fields[3], "source column", line_index)?;
                    let name = match fields.get(4) {
                        Some(&delta) => Some(accumulate(
                            &mut totals.name,
                            delta,
                            "name index",
                            line_index,
                        )?),
                        None => None,
                    };
                    Some(Origin {
                        source,
                        line: src_line,
                        column: src_column,
                        name,
                    })
                }
                n => {
                    return Err(SourceryError::MalformedMapping {
                        reason: format!(
                            "segment {text:?} on line {line_index} has {n} fields (expected 1, 4 or 5)"
                        ),
                    });
                }
            };

            segments.push(Segment {
                generated_column: column,
                origin,
            });
        }

        decoded.push(segments);
    }

    Ok(decoded)
}

/// Encodes decoded lines back into a `mappings` string.
pub fn encode(mappings: &[Line]) -> String {
    let mut totals = RunningTotals::default();
    let mut out = String::new();

    for (line_index, line) in mappings.iter().enumerate() {
        if line_index > 0 {
            out.push(';');
        }

        let mut generated_column: i64 = 0;
        for (segment_index, segment) in line.iter().enumerate() {
            if segment_index > 0 {
                out.push(',');
            }

            let column = i64::from(segment.generated_column);
            encode_integer(column - generated_column, &mut out);
            generated_column = column;

            let Some(origin) = segment.origin else {
                continue;
            };

            for (total, value) in [
                (&mut totals.source, origin.source),
                (&mut totals.line, origin.line),
                (&mut totals.column, origin.column),
            ] {
                let value = i64::from(value);
                encode_integer(value - *total, &mut out);
                *total = value;
            }

            if let Some(name) = origin.name {
                let name = i64::from(name);
                encode_integer(name - totals.name, &mut out);
                totals.name = name;
            }
        }
    }

    out
}

/// Memoizes [`decode`] by the md5 digest of the mappings text. Owned by a
/// load session; the oldest entry is evicted once `capacity` is reached.
#[derive(Debug)]
pub struct DecodeCache {
    capacity: usize,
    entries: FxHashMap<[u8; 16], Arc<Mappings>>,
    order: VecDeque<[u8; 16]>,
    hits: usize,
}

impl DecodeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: FxHashMap::default(),
            order: VecDeque::new(),
            hits: 0,
        }
    }

    pub fn decode(&mut self, mappings: &str) -> Result<Arc<Mappings>> {
        let key = md5::compute(mappings.as_bytes()).0;

        if let Some(found) = self.entries.get(&key) {
            self.hits += 1;
            tracing::trace!(len = mappings.len(), "decode cache hit");
            return Ok(Arc::clone(found));
        }

        let decoded = Arc::new(decode(mappings)?);

        if self.capacity > 0 {
            while self.entries.len() >= self.capacity {
                let Some(oldest) = self.order.pop_front() else {
                    break;
                };
                self.entries.remove(&oldest);
            }
            self.entries.insert(key, Arc::clone(&decoded));
            self.order.push_back(key);
        }

        Ok(decoded)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub const fn hits(&self) -> usize {
        self.hits
    }
}

impl Default for DecodeCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const COFFEE_MAPPINGS: &str = "AAAA;AAAA,MAAA,MAAA;;AAAA,EAAA,MAAA,GAAS,EAAA,GAAK,CAAd,CAAA;;AAAA,EACA,OAAO,CAAC,GAAR,CAAa,gBAAA,GAAe,MAA5B,CADA,CAAA;AAAA";

    fn encode_one(value: i64) -> String {
        let mut out = String::new();
        encode_integer(value, &mut out);
        out
    }

    #[test]
    fn test_encode_integer_known_values() {
        assert_eq!(encode_one(0), "A");
        assert_eq!(encode_one(1), "C");
        assert_eq!(encode_one(-1), "D");
        assert_eq!(encode_one(15), "e");
        assert_eq!(encode_one(16), "gB");
        assert_eq!(encode_one(-16), "hB");
        assert_eq!(encode_one(1000), "w+B");
        assert_eq!(encode_one(-1000), "x+B");
        assert_eq!(encode_one(2_147_483_647), "+/////D");
    }

    #[test]
    fn test_decode_integers_sequence() {
        assert_eq!(decode_integers("AAgBC").unwrap(), vec![0, 0, 16, 1]);
        assert_eq!(decode_integers("x+BD").unwrap(), vec![-1000, -1]);
    }

    #[test]
    fn test_decode_running_totals() {
        let decoded = decode(COFFEE_MAPPINGS).unwrap();
        assert_eq!(decoded.len(), 7);
        assert!(decoded[2].is_empty());
        assert_eq!(
            decoded[1],
            vec![
                Segment::mapped(0, 0, 0, 0),
                Segment::mapped(6, 0, 0, 0),
                Segment::mapped(12, 0, 0, 0),
            ]
        );
        // source line and column carry over from line 3 into line 5
        assert_eq!(decoded[5][1], Segment::mapped(2, 0, 1, 0));
        assert_eq!(decoded[5][3], Segment::mapped(10, 0, 1, 8));
        assert_eq!(decoded[5][10], Segment::mapped(41, 0, 0, 0));
    }

    #[test]
    fn test_encode_matches_known_mapping() {
        let decoded = decode(COFFEE_MAPPINGS).unwrap();
        assert_eq!(encode(&decoded), COFFEE_MAPPINGS);
    }

    #[test]
    fn test_names_and_single_field_segments() {
        let text = "AAAA,YACE,IAAIA,EAEJA,EAAS,GAETC,QAAQC,IAAI,iBAAmBF,E,GAE9B";
        let decoded = decode(text).unwrap();
        assert_eq!(decoded[0][2], Segment::named(16, 0, 1, 6, 0));
        assert_eq!(decoded[0][6], Segment::named(31, 0, 5, 10, 2));
        assert_eq!(decoded[0][9], Segment::unmapped(54));
        assert_eq!(decoded[0][9].field_count(), 1);
        assert_eq!(decoded[0][10], Segment::mapped(57, 0, 7, 3));
        assert_eq!(encode(&decoded), text);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(decode("").unwrap(), vec![Line::new()]);
        assert_eq!(decode(";;").unwrap().len(), 3);
        assert_eq!(encode(&[]), "");
    }

    #[test]
    fn test_invalid_character_is_malformed() {
        let err = decode("AAAA,A!AA").unwrap_err();
        assert!(matches!(err, SourceryError::MalformedMapping { .. }));
    }

    #[test]
    fn test_short_segment_is_malformed() {
        assert!(matches!(
            decode("AAA").unwrap_err(),
            SourceryError::MalformedMapping { .. }
        ));
        assert!(matches!(
            decode("AA").unwrap_err(),
            SourceryError::MalformedMapping { .. }
        ));
    }

    #[test]
    fn test_unterminated_value_is_malformed() {
        assert!(decode("AAAg").is_err());
    }

    #[test]
    fn test_overlong_value_is_malformed() {
        assert!(decode_integers("////////////////A").is_err());
    }

    #[test]
    fn test_negative_total_is_malformed() {
        // source line delta of -1 from zero
        assert!(decode("AADA").is_err());
    }

    #[test]
    fn test_decode_cache_reuses_entries() {
        let mut cache = DecodeCache::new(4);
        let first = cache.decode(COFFEE_MAPPINGS).unwrap();
        let second = cache.decode(COFFEE_MAPPINGS).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_decode_cache_evicts_oldest() {
        let mut cache = DecodeCache::new(2);
        let a = cache.decode("AAAA").unwrap();
        cache.decode("AACA").unwrap();
        cache.decode("AAEA").unwrap();
        assert_eq!(cache.len(), 2);

        let again = cache.decode("AAAA").unwrap();
        assert!(!Arc::ptr_eq(&a, &again));
        assert_eq!(cache.hits(), 0);
    }

    #[test]
    fn test_decode_cache_zero_capacity_still_decodes() {
        let mut cache = DecodeCache::new(0);
        assert_eq!(cache.decode("AAAA").unwrap().len(), 1);
        assert!(cache.is_empty());
    }

    fn segment_strategy() -> impl Strategy<Value = Segment> {
        (
            0u32..500,
            prop::option::of((0u32..8, 0u32..2000, 0u32..300, prop::option::of(0u32..40))),
        )
            .prop_map(|(generated_column, origin)| Segment {
                generated_column,
                origin: origin.map(|(source, line, column, name)| Origin {
                    source,
                    line,
                    column,
                    name,
                }),
            })
    }

    fn mappings_strategy() -> impl Strategy<Value = Mappings> {
        prop::collection::vec(
            prop::collection::vec(segment_strategy(), 0..12).prop_map(|mut line| {
                line.sort_by_key(|s| s.generated_column);
                line
            }),
            1..20,
        )
    }

    proptest! {
        #[test]
        fn vlq_integer_roundtrip(value in -(1i64 << 40)..(1i64 << 40)) {
            let mut out = String::new();
            encode_integer(value, &mut out);
            prop_assert_eq!(decode_integers(&out).unwrap(), vec![value]);
        }

        #[test]
        fn mappings_roundtrip(mappings in mappings_strategy()) {
            let encoded = encode(&mappings);
            let decoded = decode(&encoded).unwrap();
            prop_assert_eq!(&decoded, &mappings);
            prop_assert_eq!(encode(&decoded), encoded);
        }
    }
}
