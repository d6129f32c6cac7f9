//! Source map generation (V3 format, base64-VLQ mappings).
use serde::Serialize;
use smol_str::SmolStr;

const BASE64_CHARS: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Encodes one value as base64-VLQ. The sign lives in the lowest bit:
/// `v < 0` encodes as `((-v) << 1) | 1`, otherwise `v << 1`.
pub fn encode_vlq(value: i64, out: &mut String) {
    let mut v = if value < 0 {
        (((-value) as u64) << 1) | 1
    } else {
        (value as u64) << 1
    };
    loop {
        let mut digit = (v & 31) as u8;
        v >>= 5;
        if v != 0 {
            digit |= 32;
        }
        out.push(BASE64_CHARS[digit as usize] as char);
        if v == 0 {
            break;
        }
    }
}

fn decode_digit(c: char) -> Option<u8> {
    BASE64_CHARS.iter().position(|&b| b as char == c).map(|p| p as u8)
}

/// Decodes one VLQ value, returning it and the number of characters read.
pub fn decode_vlq(text: &str) -> Option<(i64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, c) in text.chars().enumerate() {
        let digit = decode_digit(c)?;
        value |= u64::from(digit & 31) << shift;
        if digit & 32 == 0 {
            let negative = value & 1 == 1;
            let magnitude = (value >> 1) as i64;
            return Some((if negative { -magnitude } else { magnitude }, i + 1));
        }
        shift += 5;
    }
    None
}

/// One generated-to-original position mapping.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MappingSegment {
    pub gen_line: u32,
    pub gen_col: u32,
    pub src_line: u32,
    pub src_col: u32,
    pub name: Option<u32>,
}

/// A V3 source map.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u32,
    pub file: String,
    pub sources: Vec<String>,
    pub sources_content: Vec<String>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    /// Renders the map as a `sourceMappingURL` data URI.
    pub fn to_data_uri(&self) -> String {
        let json = serde_json::to_string(self).expect("source map serialization cannot fail");
        format!("data:application/json;base64,{}", base64::encode(json))
    }
}

/// Builds a map from mapping segments. Fields after the generated column are
/// deltas from the previous segment; generated columns reset per line.
pub fn build_source_map(
    file: impl Into<String>,
    source_name: impl Into<String>,
    source_text: impl Into<String>,
    names: Vec<SmolStr>,
    mut segments: Vec<MappingSegment>,
) -> SourceMap {
    segments.sort_by_key(|s| (s.gen_line, s.gen_col));

    let mut mappings = String::new();
    let mut line = 0u32;
    let mut prev_gen_col = 0i64;
    let mut prev_src_line = 0i64;
    let mut prev_src_col = 0i64;
    let mut prev_name = 0i64;
    let mut first_in_line = true;

    for segment in &segments {
        while line < segment.gen_line {
            mappings.push(';');
            line += 1;
            prev_gen_col = 0;
            first_in_line = true;
        }
        if !first_in_line {
            mappings.push(',');
        }
        first_in_line = false;

        encode_vlq(segment.gen_col as i64 - prev_gen_col, &mut mappings);
        prev_gen_col = segment.gen_col as i64;
        // Single-source map: the source index delta is always 0.
        encode_vlq(0, &mut mappings);
        encode_vlq(segment.src_line as i64 - prev_src_line, &mut mappings);
        prev_src_line = segment.src_line as i64;
        encode_vlq(segment.src_col as i64 - prev_src_col, &mut mappings);
        prev_src_col = segment.src_col as i64;
        if let Some(name) = segment.name {
            encode_vlq(name as i64 - prev_name, &mut mappings);
            prev_name = name as i64;
        }
    }

    SourceMap {
        version: 3,
        file: file.into(),
        sources: vec![source_name.into()],
        sources_content: vec![source_text.into()],
        names: names.into_iter().map(|n| n.to_string()).collect(),
        mappings,
    }
}

/// Decodes a mappings string back into segments (test support).
pub fn decode_mappings(mappings: &str) -> Option<Vec<MappingSegment>> {
    let mut segments = Vec::new();
    let mut src_line = 0i64;
    let mut src_col = 0i64;
    let mut name = 0i64;
    for (gen_line, line_text) in mappings.split(';').enumerate() {
        let mut gen_col = 0i64;
        for segment_text in line_text.split(',').filter(|s| !s.is_empty()) {
            let mut rest = segment_text;
            let mut fields = Vec::new();
            while !rest.is_empty() {
                let (value, read) = decode_vlq(rest)?;
                fields.push(value);
                rest = &rest[read..];
            }
            if fields.len() < 4 {
                return None;
            }
            gen_col += fields[0];
            src_line += fields[2];
            src_col += fields[3];
            let segment_name = if fields.len() > 4 {
                name += fields[4];
                Some(name as u32)
            } else {
                None
            };
            segments.push(MappingSegment {
                gen_line: gen_line as u32,
                gen_col: gen_col as u32,
                src_line: src_line as u32,
                src_col: src_col as u32,
                name: segment_name,
            });
        }
    }
    Some(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: i64) -> String {
        let mut out = String::new();
        encode_vlq(value, &mut out);
        out
    }

    #[test]
    fn known_encodings() {
        assert_eq!(encode(0), "A");
        assert_eq!(encode(16), "gB");
        assert_eq!(encode(-7), "P");
        assert_eq!(encode(1), "C");
        assert_eq!(encode(-1), "D");
    }

    #[test]
    fn vlq_roundtrip() {
        for value in [-1000, -33, -7, -1, 0, 1, 15, 16, 31, 32, 1000, 123456] {
            let mut out = String::new();
            encode_vlq(value, &mut out);
            let (decoded, read) = decode_vlq(&out).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(read, out.len());
        }
    }

    #[test]
    fn mappings_roundtrip() {
        let segments = vec![
            MappingSegment {
                gen_line: 0,
                gen_col: 0,
                src_line: 2,
                src_col: 4,
                name: Some(0),
            },
            MappingSegment {
                gen_line: 1,
                gen_col: 4,
                src_line: 3,
                src_col: 2,
                name: None,
            },
            MappingSegment {
                gen_line: 3,
                gen_col: 8,
                src_line: 7,
                src_col: 0,
                name: Some(1),
            },
        ];
        let map = build_source_map(
            "out.js",
            "shader.3d.ts",
            "source text",
            vec!["main".into(), "helper".into()],
            segments.clone(),
        );
        assert_eq!(map.version, 3);
        assert_eq!(decode_mappings(&map.mappings).unwrap(), segments);
    }
}
