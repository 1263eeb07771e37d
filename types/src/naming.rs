//! Segment naming scheme shared by the splitter and the upload queue.
//!
//! A segment of a source video is stored as
//! `{base_title}_part_{part_index}.{ext}`, with `part_index` starting at 1.
use std::path::Path;

/// Literal separating the base title from the part index in a segment name.
pub const PART_MARKER: &str = "_part_";

/// Strips a leading `"Source - "` prefix from a raw title.
///
/// Everything up to and including the first `-` is dropped and the rest is
/// trimmed. Titles without a `-` are only trimmed.
pub fn normalize_title(raw: &str) -> String {
    raw.split_once('-')
        .map_or(raw, |(_, title)| title)
        .trim()
        .to_string()
}

/// Identity of one segment: the title shared by every part of a source
/// video plus the 1-based position of this part.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentName {
    pub base_title: String,
    pub part_index: u32,
}

impl SegmentName {
    pub fn new(base_title: impl Into<String>, part_index: u32) -> Self {
        Self {
            base_title: base_title.into(),
            part_index,
        }
    }

    pub fn stem(&self) -> String {
        format!("{}{PART_MARKER}{}", self.base_title, self.part_index)
    }

    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{extension}", self.stem())
    }

    /// Decodes a segment file name. Never fails: a name without the marker
    /// keeps its whole stem as base title and gets part index 0.
    pub fn parse(file_name: &str) -> Self {
        let stem = file_stem(file_name);
        let base_title = stem
            .split_once(PART_MARKER)
            .map_or(stem, |(base, _)| base);

        Self {
            base_title: base_title.to_string(),
            part_index: part_index(file_name),
        }
    }
}

fn file_stem(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file_name)
}

/// Part index encoded in a segment file name.
///
/// Falls back to 0 when the marker is missing or the text after it is not
/// an integer, so malformed names sort ahead of real parts.
pub fn part_index(file_name: &str) -> u32 {
    file_stem(file_name)
        .split(PART_MARKER)
        .nth(1)
        .and_then(|index| index.parse().ok())
        .unwrap_or(0)
}

/// Part number as written in the file name, or `?` without a marker.
pub fn part_label(file_name: &str) -> &str {
    file_stem(file_name).split(PART_MARKER).nth(1).unwrap_or("?")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_normalize_title_strips_prefix() {
        assert_eq!(normalize_title("Channel - My Title"), "My Title");
        assert_eq!(normalize_title("A-B-C"), "B-C");
    }

    #[test]
    fn test_normalize_title_without_separator() {
        assert_eq!(normalize_title("NoSeparator"), "NoSeparator");
        assert_eq!(normalize_title("  padded  "), "padded");
    }

    #[test]
    fn test_file_name() {
        let name = SegmentName::new("My Talk", 3);
        assert_eq!(name.file_name("mp4"), "My Talk_part_3.mp4");
    }

    #[test]
    fn test_parse_encoded_names() {
        for (title, index) in
            [("My Talk", 1), ("Channel - Talk", 12), ("v1.2 release", 400)]
        {
            let file_name = SegmentName::new(title, index).file_name("mp4");
            assert_eq!(
                SegmentName::parse(&file_name),
                SegmentName::new(title, index)
            );
        }
    }

    #[test]
    fn test_parse_malformed_names() {
        assert_eq!(part_index("randomfile"), 0);
        assert_eq!(part_index("randomfile.mp4"), 0);
        assert_eq!(part_index("clip_part_x.mp4"), 0);
        assert_eq!(part_index("clip_part_.mp4"), 0);
        // parts are numbered from 1, a negative number is malformed too
        assert_eq!(part_index("clip_part_-1.mp4"), 0);
        assert_eq!(
            SegmentName::parse("randomfile.mp4"),
            SegmentName::new("randomfile", 0)
        );
    }

    #[test]
    fn test_part_label() {
        assert_eq!(part_label("clip_part_7.mp4"), "7");
        assert_eq!(part_label("clip_part_x.mp4"), "x");
        assert_eq!(part_label("clip.mp4"), "?");
    }
}
