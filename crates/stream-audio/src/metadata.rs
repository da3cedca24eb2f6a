//! Stream metadata extraction
//!
//! Normalises tags coming out of the decode pipeline (ID3v2, ASF, ICY, ...)
//! into a flat map keyed by a small set of canonical names.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::engine::{Tag, TagData, TagFormat};

pub const KEY_ARTIST: &str = "ARTIST";
pub const KEY_TITLE: &str = "TITLE";
pub const KEY_STREAM_NAME: &str = "STREAM_NAME";
pub const KEY_STREAM_LOCATION: &str = "STREAM_LOCATION";

/// Engine tag announcing that the stream switched sample rate mid-play.
pub const SAMPLE_RATE_CHANGE_TAG: &str = "Sample Rate Change";

/// A decoded tag value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Text(String),
    Integer(i64),
    Real(f64),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Text(s) => f.write_str(s),
            MetadataValue::Integer(i) => write!(f, "{}", i),
            MetadataValue::Real(r) => write!(f, "{}", r),
        }
    }
}

/// What a single tag means for the metadata map.
#[derive(Debug, Clone, PartialEq)]
pub enum TagOutcome {
    Store(String, MetadataValue),
    /// Not metadata: the live channel must be retuned to this frequency.
    SampleRate(f32),
    Skip,
}

/// Map a format-specific tag name to its canonical key.  Unknown names pass
/// through unchanged.
pub fn canonical_key(format: TagFormat, name: &str) -> String {
    let mapped = match format {
        TagFormat::Id3v2 => match name {
            "TIT2" => Some(KEY_TITLE),
            "TPE1" => Some(KEY_ARTIST),
            _ => None,
        },
        TagFormat::Asf => match name {
            "Title" => Some(KEY_TITLE),
            "WM/AlbumArtist" => Some(KEY_ARTIST),
            _ => None,
        },
        _ => match name {
            "icy-name" => Some(KEY_STREAM_NAME),
            "icy-url" => Some(KEY_STREAM_LOCATION),
            _ => None,
        },
    };
    mapped.unwrap_or(name).to_string()
}

/// Decode a tag payload according to its declared type.
pub fn decode_value(data: &TagData) -> Option<MetadataValue> {
    match data {
        TagData::Int(i) => Some(MetadataValue::Integer(*i)),
        TagData::Float(f) => Some(MetadataValue::Real(*f)),
        TagData::String(bytes) => Some(MetadataValue::Text(
            String::from_utf8_lossy(trim_nul(bytes)).into_owned(),
        )),
        TagData::Utf16(bytes) => Some(MetadataValue::Text(decode_utf16(bytes, false))),
        TagData::Utf16Be(bytes) => Some(MetadataValue::Text(decode_utf16(bytes, true))),
        TagData::Binary(_) => None,
    }
}

/// Decide what to do with one tag.
pub fn classify(tag: &Tag) -> TagOutcome {
    if tag.format == TagFormat::Engine {
        return match (tag.name.as_str(), &tag.data) {
            (SAMPLE_RATE_CHANGE_TAG, TagData::Float(hz)) => TagOutcome::SampleRate(*hz as f32),
            _ => TagOutcome::Skip,
        };
    }

    match decode_value(&tag.data) {
        Some(value) => TagOutcome::Store(canonical_key(tag.format, &tag.name), value),
        None => TagOutcome::Skip,
    }
}

/// Split an ICY `StreamTitle` on its first ` - ` into `(artist, title)`.
/// Without a separator the whole string is the title.
pub fn split_stream_title(raw: &str) -> (Option<String>, Option<String>) {
    let raw = raw.trim();
    if raw.is_empty() {
        return (None, None);
    }

    let non_empty = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };

    match raw.find(" - ") {
        Some(pos) => (non_empty(&raw[..pos]), non_empty(&raw[pos + 3..])),
        None => (None, Some(raw.to_string())),
    }
}

fn trim_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| b != 0)
        .map(|p| p + 1)
        .unwrap_or(0);
    &bytes[..end]
}

fn decode_utf16(bytes: &[u8], big_endian: bool) -> String {
    let mut units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| {
            if big_endian {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                u16::from_le_bytes([pair[0], pair[1]])
            }
        })
        .collect();

    // A byte order mark overrides the declared endianness.
    match units.first() {
        Some(0xFEFF) => {
            units.remove(0);
        }
        Some(0xFFFE) => {
            units.remove(0);
            for unit in units.iter_mut() {
                *unit = unit.swap_bytes();
            }
        }
        _ => {}
    }

    while units.last() == Some(&0) {
        units.pop();
    }

    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Last-known metadata of the current stream.
#[derive(Debug, Default)]
pub struct MetadataExtractor {
    entries: BTreeMap<String, MetadataValue>,
    new_metadata: bool,
}

impl MetadataExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh batch: previous values are dropped and the batch is
    /// flagged as new.
    pub fn begin_batch(&mut self) {
        self.entries.clear();
        self.new_metadata = true;
    }

    /// Add one tag to the current batch.  Returns a frequency when the tag is
    /// a sample rate change that must be applied to the channel instead.
    pub fn ingest(&mut self, tag: &Tag) -> Option<f32> {
        match classify(tag) {
            TagOutcome::Store(key, value) => {
                debug!("metadata: {} = {}", tag.name, value);
                self.entries.insert(key, value);
                None
            }
            TagOutcome::SampleRate(hz) => Some(hz),
            TagOutcome::Skip => None,
        }
    }

    /// Consume the "new metadata" flag.
    pub fn take_new(&mut self) -> bool {
        std::mem::take(&mut self.new_metadata)
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.entries.get(key)
    }

    /// Value under `key` as text, empty when absent.
    pub fn text(&self, key: &str) -> String {
        self.entries
            .get(key)
            .map(|v| v.to_string())
            .unwrap_or_default()
    }

    pub fn artist(&self) -> String {
        self.text(KEY_ARTIST)
    }

    pub fn title(&self) -> String {
        self.text(KEY_TITLE)
    }

    pub fn stream_name(&self) -> String {
        self.text(KEY_STREAM_NAME)
    }

    pub fn stream_location(&self) -> String {
        self.text(KEY_STREAM_LOCATION)
    }

    pub fn entries(&self) -> &BTreeMap<String, MetadataValue> {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    fn utf16be(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(|u| u.to_be_bytes()).collect()
    }

    // --- canonical_key ---

    #[test]
    fn id3v2_frames_map_to_canonical_keys() {
        assert_eq!(canonical_key(TagFormat::Id3v2, "TIT2"), "TITLE");
        assert_eq!(canonical_key(TagFormat::Id3v2, "TPE1"), "ARTIST");
        assert_eq!(canonical_key(TagFormat::Id3v2, "TALB"), "TALB");
    }

    #[test]
    fn asf_names_map_to_canonical_keys() {
        assert_eq!(canonical_key(TagFormat::Asf, "Title"), "TITLE");
        assert_eq!(canonical_key(TagFormat::Asf, "WM/AlbumArtist"), "ARTIST");
    }

    #[test]
    fn icy_headers_map_for_generic_formats() {
        assert_eq!(canonical_key(TagFormat::Shoutcast, "icy-name"), "STREAM_NAME");
        assert_eq!(canonical_key(TagFormat::Unknown, "icy-url"), "STREAM_LOCATION");
    }

    #[test]
    fn mapping_depends_on_format() {
        // ID3v2 has its own table; icy names are not special there
        assert_eq!(canonical_key(TagFormat::Id3v2, "icy-name"), "icy-name");
        assert_eq!(canonical_key(TagFormat::Shoutcast, "TIT2"), "TIT2");
    }

    // --- decode_value ---

    #[test]
    fn narrow_string_drops_trailing_nul() {
        let v = decode_value(&TagData::String(b"Radio One\0".to_vec()));
        assert_eq!(v, Some(MetadataValue::Text("Radio One".to_string())));
    }

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        let v = decode_value(&TagData::String(vec![b'a', 0xff, b'b']));
        assert_eq!(v, Some(MetadataValue::Text("a\u{fffd}b".to_string())));
    }

    #[test]
    fn utf16_little_and_big_endian() {
        assert_eq!(
            decode_value(&TagData::Utf16(utf16le("Señor"))),
            Some(MetadataValue::Text("Señor".to_string()))
        );
        assert_eq!(
            decode_value(&TagData::Utf16Be(utf16be("Señor"))),
            Some(MetadataValue::Text("Señor".to_string()))
        );
    }

    #[test]
    fn utf16_bom_overrides_declared_order() {
        let mut bytes = vec![0xfe, 0xff];
        bytes.extend(utf16be("abc"));
        assert_eq!(
            decode_value(&TagData::Utf16(bytes)),
            Some(MetadataValue::Text("abc".to_string()))
        );
    }

    #[test]
    fn numeric_values_keep_their_type() {
        assert_eq!(decode_value(&TagData::Int(128)), Some(MetadataValue::Integer(128)));
        assert_eq!(decode_value(&TagData::Float(0.5)), Some(MetadataValue::Real(0.5)));
        assert_eq!(decode_value(&TagData::Binary(vec![1, 2, 3])), None);
    }

    // --- classify ---

    #[test]
    fn sample_rate_change_is_not_metadata() {
        let tag = Tag::new(TagFormat::Engine, SAMPLE_RATE_CHANGE_TAG, TagData::Float(48000.0));
        assert_eq!(classify(&tag), TagOutcome::SampleRate(48000.0));
    }

    #[test]
    fn other_engine_tags_are_skipped() {
        let tag = Tag::text(TagFormat::Engine, "Something Internal", "x");
        assert_eq!(classify(&tag), TagOutcome::Skip);
    }

    #[test]
    fn utf16_tags_are_stored_under_canonical_key() {
        let tag = Tag::new(TagFormat::Id3v2, "TIT2", TagData::Utf16(utf16le("Song")));
        assert_eq!(
            classify(&tag),
            TagOutcome::Store("TITLE".to_string(), MetadataValue::Text("Song".to_string()))
        );
    }

    // --- split_stream_title ---

    #[test]
    fn stream_title_with_separator() {
        assert_eq!(
            split_stream_title("Pink Floyd - Comfortably Numb"),
            (
                Some("Pink Floyd".to_string()),
                Some("Comfortably Numb".to_string())
            )
        );
    }

    #[test]
    fn stream_title_without_separator() {
        assert_eq!(
            split_stream_title("  Station ID  "),
            (None, Some("Station ID".to_string()))
        );
        assert_eq!(split_stream_title("   "), (None, None));
    }

    #[test]
    fn stream_title_splits_on_first_separator_only() {
        let (artist, title) = split_stream_title("A - B - C");
        assert_eq!(artist.as_deref(), Some("A"));
        assert_eq!(title.as_deref(), Some("B - C"));
    }

    // --- MetadataExtractor ---

    #[test]
    fn batch_replaces_previous_values() {
        let mut m = MetadataExtractor::new();
        m.begin_batch();
        m.ingest(&Tag::text(TagFormat::Id3v2, "TPE1", "Old Artist"));
        m.ingest(&Tag::text(TagFormat::Id3v2, "TIT2", "Old Title"));

        m.begin_batch();
        m.ingest(&Tag::text(TagFormat::Id3v2, "TIT2", "New Title"));

        assert_eq!(m.title(), "New Title");
        assert_eq!(m.artist(), "");
    }

    #[test]
    fn new_flag_is_consumed_once() {
        let mut m = MetadataExtractor::new();
        assert!(!m.take_new());
        m.begin_batch();
        assert!(m.take_new());
        assert!(!m.take_new());
    }

    #[test]
    fn accessors_render_numbers_as_text() {
        let mut m = MetadataExtractor::new();
        m.begin_batch();
        m.ingest(&Tag::new(TagFormat::Unknown, "icy-name", TagData::Int(42)));
        assert_eq!(m.stream_name(), "42");
        assert_eq!(m.stream_location(), "");
    }

    #[test]
    fn sample_rate_tag_returns_frequency_and_stores_nothing() {
        let mut m = MetadataExtractor::new();
        m.begin_batch();
        let hz = m.ingest(&Tag::new(
            TagFormat::Engine,
            SAMPLE_RATE_CHANGE_TAG,
            TagData::Float(22050.0),
        ));
        assert_eq!(hz, Some(22050.0));
        assert!(m.entries().is_empty());
    }

    #[test]
    fn passthrough_tags_are_kept() {
        let mut m = MetadataExtractor::new();
        m.begin_batch();
        m.ingest(&Tag::text(TagFormat::VorbisComment, "GENRE", "Ambient"));
        assert_eq!(
            m.get("GENRE"),
            Some(&MetadataValue::Text("Ambient".to_string()))
        );
    }
}
