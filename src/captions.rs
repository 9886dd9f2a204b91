//! Caption track builder.
//!
//! Groups the provider's character-level timing map into word-level
//! caption events and serializes them into a styled ASS subtitle
//! document suitable for burn-in via the encoder's subtitle filter.

use log::info;
use serde::Serialize;

use crate::speech::CharacterTimingMap;

/// One displayed word with its time window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptionEvent {
    pub text: String,
    /// Seconds from the start of the narration.
    pub start: f64,
    pub end: f64,
}

/// Build word-level caption events from a character timing map.
///
/// Scans characters left to right, accumulating into the current word
/// buffer and flushing on whitespace or end-of-map. A word's start time
/// is inherited from the map's next-start value after the previous flush;
/// a map with fewer start entries than characters is tolerated by
/// clamping to the last known time instead of indexing past the end.
/// Overlap is prevented by clamping each event's start to at least the
/// previous event's end.
pub fn build_caption_events(map: &CharacterTimingMap) -> Vec<CaptionEvent> {
    // Walk only the span covered by all three arrays; a ragged map is a
    // provider anomaly that must not panic here.
    let len = map
        .characters
        .len()
        .min(map.start_times.len())
        .min(map.end_times.len());

    let mut events: Vec<CaptionEvent> = Vec::new();
    if len == 0 {
        return events;
    }

    let mut word = String::new();
    let mut word_start = map.start_times[0];

    for i in 0..len {
        let ch = map.characters[i];
        word.push(ch);

        let is_last = i + 1 == len;
        if ch.is_whitespace() || is_last {
            let text = word.trim().to_string();
            if !text.is_empty() {
                let prev_end = events.last().map(|e| e.end);
                let start = match prev_end {
                    Some(pe) => word_start.max(pe),
                    None => word_start,
                };
                let end = map.end_times[i].max(start);
                events.push(CaptionEvent { text, start, end });
            }
            word.clear();
            // The next word starts at the next character's start time;
            // clamp to the last known time when the map runs short.
            word_start = map
                .start_times
                .get(i + 1)
                .copied()
                .unwrap_or(map.end_times[i]);
        }
    }

    info!("built {} caption events", events.len());
    events
}

const ASS_HEADER: &str = "[Script Info]\n\
ScriptType: v4.00+\n\
PlayResX: 1920\n\
PlayResY: 1080\n\
\n\
[V4+ Styles]\n\
Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\n\
Style: Default,Impact,70,&H00FFFFFF,&H0000D7FF,&H80000000,&H00000000,-1,0,0,0,100,100,2,0,1,3,2,2,10,10,100,1\n\
\n\
[Events]\n\
Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n";

/// Serialize caption events into an ASS subtitle document.
///
/// One `Dialogue` line per word, with a karaoke tag so the secondary
/// style colour sweeps the word while it is spoken.
pub fn serialize_ass(events: &[CaptionEvent]) -> String {
    let mut doc = String::from(ASS_HEADER);
    for event in events {
        let karaoke_cs = ((event.end - event.start) * 100.0).floor().max(0.0) as u64;
        doc.push_str(&format!(
            "Dialogue: 0,{},{},Default,,0,0,0,,{{\\k{}}}{}\n",
            format_timestamp(event.start),
            format_timestamp(event.end),
            karaoke_cs,
            event.text
        ));
    }
    doc
}

/// ASS timestamp: `H:MM:SS.CC` (centisecond precision).
fn format_timestamp(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0).floor() as u64;
    let cs = total_cs % 100;
    let total_secs = total_cs / 100;
    let s = total_secs % 60;
    let m = (total_secs / 60) % 60;
    let h = total_secs / 3600;
    format!("{h}:{m:02}:{s:02}.{cs:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_of(text: &str) -> CharacterTimingMap {
        let characters: Vec<char> = text.chars().collect();
        let start_times: Vec<f64> = (0..characters.len()).map(|i| i as f64 * 0.1).collect();
        let end_times: Vec<f64> = (0..characters.len())
            .map(|i| (i + 1) as f64 * 0.1)
            .collect();
        CharacterTimingMap {
            characters,
            start_times,
            end_times,
        }
    }

    #[test]
    fn test_word_count_matches_tokens() {
        let text = "Hello world. Atlas wins.";
        let events = build_caption_events(&map_of(text));
        assert_eq!(events.len(), text.split_whitespace().count());
        assert_eq!(events[0].text, "Hello");
        assert_eq!(events[1].text, "world.");
        assert_eq!(events[3].text, "wins.");
    }

    #[test]
    fn test_events_are_ordered_and_non_overlapping() {
        let events = build_caption_events(&map_of("one two three four"));
        for pair in events.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
        for event in &events {
            assert!(event.end >= event.start);
        }
    }

    #[test]
    fn test_determinism() {
        let map = map_of("the same text twice");
        assert_eq!(build_caption_events(&map), build_caption_events(&map));
    }

    #[test]
    fn test_short_map_clamps_instead_of_panicking() {
        let mut map = map_of("ab cd");
        // Fewer start times than characters: the builder walks only the
        // covered span and clamps instead of indexing out of bounds.
        map.start_times.truncate(4);
        let events = build_caption_events(&map);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].text, "ab");
        assert_eq!(events[1].text, "c");
        assert!(events[1].start >= events[0].end);
    }

    #[test]
    fn test_consecutive_whitespace_produces_no_empty_words() {
        let events = build_caption_events(&map_of("a  b"));
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| !e.text.is_empty()));
    }

    #[test]
    fn test_empty_map() {
        let map = CharacterTimingMap {
            characters: Vec::new(),
            start_times: Vec::new(),
            end_times: Vec::new(),
        };
        assert!(build_caption_events(&map).is_empty());
    }

    #[test]
    fn test_serialize_ass() {
        let events = build_caption_events(&map_of("go now"));
        let doc = serialize_ass(&events);
        assert!(doc.starts_with("[Script Info]"));
        assert!(doc.contains("[V4+ Styles]"));
        assert_eq!(doc.matches("Dialogue:").count(), 2);
        assert!(doc.contains("{\\k"));
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(format_timestamp(0.0), "0:00:00.00");
        assert_eq!(format_timestamp(90.5), "0:01:30.50");
        assert_eq!(format_timestamp(3690.25), "1:01:30.25");
        // Negative input is clamped rather than wrapping.
        assert_eq!(format_timestamp(-1.0), "0:00:00.00");
    }
}
