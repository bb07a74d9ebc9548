//! FFmpeg filter-graph generation.
//!
//! Every concat input is normalized to the same frame size, frame rate,
//! pixel format and audio layout before the `concat` filter sees it, so
//! submissions recorded on different phones can be joined without
//! re-muxing surprises.

use std::path::Path;
use weave_models::Resolution;

/// Output label of the concatenated video stream.
pub const CONCAT_VIDEO_OUT: &str = "[outv]";
/// Output label of the concatenated audio stream.
pub const CONCAT_AUDIO_OUT: &str = "[outa]";
/// Output label of the mixed audio stream.
pub const MIX_AUDIO_OUT: &str = "[aout]";

/// Title card background colour.
pub const CARD_BACKGROUND: &str = "black";
/// Title card text colour.
pub const CARD_FONT_COLOR: &str = "white";

/// Audio format every stream is converted to before concat.
const AUDIO_FORMAT: &str = "aformat=sample_fmts=fltp:channel_layouts=stereo";

/// Escape a value for a filter option (`key=value:key=value`).
fn escape_option_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape a filter argument string for the filtergraph parser.
fn escape_graph_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape text or a path so it survives both filtergraph and option parsing.
pub fn escape_filter_value(value: &str) -> String {
    escape_graph_value(&escape_option_value(value))
}

/// Solid-colour video source for a title card.
pub fn color_source(resolution: Resolution, duration_secs: f64, fps: u32) -> String {
    format!(
        "color=c={}:s={}:d={:.3}:r={}",
        CARD_BACKGROUND, resolution, duration_secs, fps
    )
}

/// Silent stereo audio source.
pub fn silence_source(sample_rate: u32) -> String {
    format!("anullsrc=channel_layout=stereo:sample_rate={}", sample_rate)
}

/// Centered text overlay. `%` expansion is disabled so text is rendered verbatim.
pub fn drawtext(text: &str, font_size: u32, font_file: Option<&Path>) -> String {
    let mut filter = format!(
        "drawtext=text={}:fontcolor={}:fontsize={}:x=(w-text_w)/2:y=(h-text_h)/2:expansion=none",
        escape_filter_value(text),
        CARD_FONT_COLOR,
        font_size
    );
    if let Some(font) = font_file {
        filter.push_str(":fontfile=");
        filter.push_str(&escape_filter_value(&font.to_string_lossy()));
    }
    filter
}

/// Scale into the frame preserving aspect, letterbox the rest.
pub fn normalize_video(input: usize, resolution: Resolution, fps: u32) -> String {
    let (w, h) = (resolution.width, resolution.height);
    format!(
        "[{input}:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color={CARD_BACKGROUND},\
         setsar=1,fps={fps},format=yuv420p[v{input}]"
    )
}

pub fn normalize_audio(input: usize, sample_rate: u32) -> String {
    format!("[{input}:a]aresample={sample_rate},{AUDIO_FORMAT}[a{input}]")
}

/// Generated silence standing in for a missing audio stream.
pub fn silent_track(input: usize, duration_secs: f64, sample_rate: u32) -> String {
    format!(
        "{},atrim=duration={:.3},{}[a{}]",
        silence_source(sample_rate),
        duration_secs,
        AUDIO_FORMAT,
        input
    )
}

/// What the concat graph needs to know about one input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConcatSource {
    pub has_audio: bool,
    pub duration_secs: f64,
}

/// Full `-filter_complex` for normalizing and concatenating inputs in order.
pub fn concat_graph(
    sources: &[ConcatSource],
    resolution: Resolution,
    fps: u32,
    sample_rate: u32,
) -> String {
    let mut chains = Vec::with_capacity(sources.len() * 2 + 1);
    let mut pads = String::new();

    for (i, source) in sources.iter().enumerate() {
        chains.push(normalize_video(i, resolution, fps));
        chains.push(if source.has_audio {
            normalize_audio(i, sample_rate)
        } else {
            silent_track(i, source.duration_secs, sample_rate)
        });
        pads.push_str(&format!("[v{i}][a{i}]"));
    }

    chains.push(format!(
        "{}concat=n={}:v=1:a=1{}{}",
        pads,
        sources.len(),
        CONCAT_VIDEO_OUT,
        CONCAT_AUDIO_OUT
    ));
    chains.join(";")
}

/// Additive mix of a video's audio (input 0) with a music bed (input 1).
///
/// Output ends with the first input.
pub fn amix_graph() -> String {
    format!("[0:a][1:a]amix=inputs=2:duration=first:dropout_transition=2{MIX_AUDIO_OUT}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_filter_value() {
        assert_eq!(escape_filter_value("Week of September 01, 2025"), "Week of September 01\\, 2025");
        assert_eq!(escape_filter_value("it's"), "it\\\\\\'s");
        assert_eq!(escape_filter_value("a:b"), "a\\\\:b");
        assert_eq!(escape_filter_value("50%"), "50%");
        assert_eq!(escape_filter_value("[x];y"), "\\[x\\]\\;y");
    }

    #[test]
    fn test_drawtext() {
        let filter = drawtext("Created with Weave", 36, None);
        assert!(filter.starts_with("drawtext=text=Created with Weave:"));
        assert!(filter.contains("fontsize=36"));
        assert!(filter.contains("x=(w-text_w)/2:y=(h-text_h)/2"));
        assert!(!filter.contains("fontfile"));

        let filter = drawtext("Hi", 48, Some(Path::new("/fonts/Inter.ttf")));
        assert!(filter.ends_with(":fontfile=/fonts/Inter.ttf"));
    }

    #[test]
    fn test_sources() {
        assert_eq!(
            color_source(Resolution::HD, 3.0, 30),
            "color=c=black:s=1280x720:d=3.000:r=30"
        );
        assert_eq!(silence_source(44_100), "anullsrc=channel_layout=stereo:sample_rate=44100");
    }

    #[test]
    fn test_concat_graph() {
        let sources = [
            ConcatSource { has_audio: true, duration_secs: 3.0 },
            ConcatSource { has_audio: false, duration_secs: 8.25 },
            ConcatSource { has_audio: true, duration_secs: 2.0 },
        ];
        let graph = concat_graph(&sources, Resolution::HD, 30, 44_100);
        let chains: Vec<&str> = graph.split(';').collect();
        assert_eq!(chains.len(), 7);

        assert!(chains[0].starts_with("[0:v]scale=1280:720:force_original_aspect_ratio=decrease,pad=1280:720:(ow-iw)/2:(oh-ih)/2"));
        assert!(chains[0].ends_with("[v0]"));
        assert!(chains[1].starts_with("[0:a]aresample=44100"));
        assert!(chains[3].starts_with("anullsrc="));
        assert!(chains[3].contains("atrim=duration=8.250"));
        assert!(chains[3].ends_with("[a1]"));
        assert_eq!(chains[6], "[v0][a0][v1][a1][v2][a2]concat=n=3:v=1:a=1[outv][outa]");
    }

    #[test]
    fn test_amix_graph() {
        assert_eq!(
            amix_graph(),
            "[0:a][1:a]amix=inputs=2:duration=first:dropout_transition=2[aout]"
        );
    }
}
