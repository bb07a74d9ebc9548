//! The transcoder seam used by the compilation pipeline.
//!
//! `MediaTranscoder` is the only way the pipeline touches the codec tool, so
//! orchestration can be exercised with a fake. `FfmpegTranscoder` is the real
//! implementation: one blocking FFmpeg process per operation, exit code and
//! stderr captured, no retries.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::asset::{AssetKind, MediaAsset};
use crate::command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegInput, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::{self, ConcatSource};
use crate::probe::probe_media;
use weave_models::{EncodingConfig, Resolution};

/// Intro font size in pixels.
pub const INTRO_FONT_SIZE: u32 = 48;
/// Outro font size in pixels.
pub const OUTRO_FONT_SIZE: u32 = 36;

/// Text-over-background clip description.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleCard {
    pub kind: AssetKind,
    pub text: String,
    pub duration_secs: f64,
    pub font_size: u32,
}

impl TitleCard {
    pub fn intro(label: impl Into<String>, duration_secs: f64) -> Self {
        Self {
            kind: AssetKind::Intro,
            text: label.into(),
            duration_secs,
            font_size: INTRO_FONT_SIZE,
        }
    }

    /// The fixed `Created with <product>` card.
    pub fn outro(product: &str, duration_secs: f64) -> Self {
        Self {
            kind: AssetKind::Outro,
            text: format!("Created with {}", product),
            duration_secs,
            font_size: OUTRO_FONT_SIZE,
        }
    }
}

#[async_trait]
pub trait MediaTranscoder: Send + Sync {
    /// Render a title card to `output`.
    async fn make_title_card(
        &self,
        card: &TitleCard,
        resolution: Resolution,
        output: &Path,
    ) -> MediaResult<MediaAsset>;

    /// Normalize and concatenate `assets` in slice order into `output`.
    async fn concat(&self, assets: &[MediaAsset], output: &Path, resolution: Resolution) -> MediaResult<()>;

    /// Mix `audio` under the existing audio of `video`, keeping the video stream untouched.
    async fn mix_audio(&self, video: &Path, audio: &Path, output: &Path) -> MediaResult<()>;
}

/// Binary locations and encode settings for `FfmpegTranscoder`.
#[derive(Debug, Clone)]
pub struct TranscoderConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub timeout_secs: Option<u64>,
    pub encoding: EncodingConfig,
    /// Font for title cards; fontconfig's default when unset
    pub font_file: Option<PathBuf>,
}

impl TranscoderConfig {
    /// Locate ffmpeg and ffprobe (honouring `FFMPEG_PATH` / `FFPROBE_PATH`).
    pub fn detect() -> MediaResult<Self> {
        Ok(Self {
            ffmpeg_path: check_ffmpeg()?,
            ffprobe_path: check_ffprobe()?,
            timeout_secs: None,
            encoding: EncodingConfig::default(),
            font_file: None,
        })
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_font_file(mut self, font: Option<PathBuf>) -> Self {
        self.font_file = font;
        self
    }
}

/// `MediaTranscoder` backed by the FFmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    runner: FfmpegRunner,
    ffprobe: PathBuf,
    encoding: EncodingConfig,
    font_file: Option<PathBuf>,
}

impl FfmpegTranscoder {
    pub fn new(config: TranscoderConfig) -> Self {
        let mut runner = FfmpegRunner::new(config.ffmpeg_path);
        if let Some(secs) = config.timeout_secs {
            runner = runner.with_timeout(secs);
        }
        Self {
            runner,
            ffprobe: config.ffprobe_path,
            encoding: config.encoding,
            font_file: config.font_file,
        }
    }

    fn ensure_exists(path: &Path) -> MediaResult<()> {
        if path.exists() {
            Ok(())
        } else {
            Err(MediaError::FileNotFound(path.to_path_buf()))
        }
    }
}

#[async_trait]
impl MediaTranscoder for FfmpegTranscoder {
    async fn make_title_card(
        &self,
        card: &TitleCard,
        resolution: Resolution,
        output: &Path,
    ) -> MediaResult<MediaAsset> {
        if card.duration_secs <= 0.0 {
            return Err(MediaError::invalid_input(format!(
                "title card duration must be positive, got {}",
                card.duration_secs
            )));
        }

        let cmd = FfmpegCommand::new(output)
            .input(FfmpegInput::lavfi(filters::color_source(
                resolution,
                card.duration_secs,
                self.encoding.frame_rate,
            )))
            .input(FfmpegInput::lavfi(filters::silence_source(self.encoding.sample_rate)))
            .video_filter(filters::drawtext(&card.text, card.font_size, self.font_file.as_deref()))
            .map("0:v")
            .map("1:a")
            .duration(card.duration_secs)
            .encoding(&self.encoding)
            .faststart();

        self.runner.run(&cmd).await?;
        Self::ensure_exists(output)?;

        debug!(kind = card.kind.as_str(), output = %output.display(), "Rendered title card");
        Ok(MediaAsset::new(0, card.kind, output))
    }

    async fn concat(&self, assets: &[MediaAsset], output: &Path, resolution: Resolution) -> MediaResult<()> {
        if assets.is_empty() {
            return Err(MediaError::invalid_input("concat requires at least one input"));
        }

        let mut sources = Vec::with_capacity(assets.len());
        let mut cmd = FfmpegCommand::new(output);
        for asset in assets {
            let media = probe_media(&self.ffprobe, &asset.path).await?;
            if !media.has_video {
                return Err(MediaError::InvalidVideo(format!(
                    "{} has no video stream",
                    asset.path.display()
                )));
            }
            if !media.has_audio {
                debug!(input = %asset.path.display(), "Input has no audio, synthesizing silence");
            }
            sources.push(ConcatSource {
                has_audio: media.has_audio,
                duration_secs: media.duration,
            });
            cmd = cmd.input_file(&asset.path);
        }

        let graph = filters::concat_graph(
            &sources,
            resolution,
            self.encoding.frame_rate,
            self.encoding.sample_rate,
        );
        let cmd = cmd
            .filter_complex(graph)
            .map(filters::CONCAT_VIDEO_OUT)
            .map(filters::CONCAT_AUDIO_OUT)
            .encoding(&self.encoding)
            .faststart();

        self.runner.run(&cmd).await?;
        Self::ensure_exists(output)?;

        info!(inputs = assets.len(), output = %output.display(), "Concatenated compilation");
        Ok(())
    }

    async fn mix_audio(&self, video: &Path, audio: &Path, output: &Path) -> MediaResult<()> {
        Self::ensure_exists(video)?;
        Self::ensure_exists(audio)?;

        let media = probe_media(&self.ffprobe, video).await?;

        let cmd = FfmpegCommand::new(output).input_file(video).input_file(audio);
        let cmd = if media.has_audio {
            cmd.filter_complex(filters::amix_graph())
                .map("0:v")
                .map(filters::MIX_AUDIO_OUT)
        } else {
            // Nothing to mix with, the music becomes the soundtrack
            cmd.map("0:v").map("1:a").output_arg("-shortest")
        };
        let cmd = cmd
            .video_codec("copy")
            .audio_codec(self.encoding.audio_codec.clone())
            .audio_bitrate(self.encoding.audio_bitrate.clone())
            .faststart();

        self.runner.run(&cmd).await?;
        Self::ensure_exists(output)?;

        info!(output = %output.display(), "Mixed background music");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_cards() {
        let intro = TitleCard::intro("Week of September 01, 2025", 3.0);
        assert_eq!(intro.kind, AssetKind::Intro);
        assert_eq!(intro.font_size, 48);

        let outro = TitleCard::outro("Weave", 2.0);
        assert_eq!(outro.text, "Created with Weave");
        assert_eq!(outro.font_size, 36);
    }

    #[tokio::test]
    async fn test_concat_rejects_empty_input() {
        let transcoder = FfmpegTranscoder::new(TranscoderConfig {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            timeout_secs: None,
            encoding: EncodingConfig::default(),
            font_file: None,
        });
        let err = transcoder
            .concat(&[], Path::new("/tmp/out.mp4"), Resolution::HD)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidInput(_)));
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg and ffprobe"]
    async fn test_render_cards_and_concat() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = FfmpegTranscoder::new(TranscoderConfig::detect().unwrap().with_timeout(120));

        let intro = transcoder
            .make_title_card(
                &TitleCard::intro("Week of September 01, 2025", 1.0),
                Resolution::HD,
                &dir.path().join("intro.mp4"),
            )
            .await
            .unwrap();
        let outro = transcoder
            .make_title_card(&TitleCard::outro("Weave", 1.0), Resolution::HD, &dir.path().join("outro.mp4"))
            .await
            .unwrap()
            .with_index(1);

        let output = dir.path().join("compilation.mp4");
        transcoder.concat(&[intro, outro], &output, Resolution::HD).await.unwrap();

        let info = probe_media(&check_ffprobe().unwrap(), &output).await.unwrap();
        assert!(info.has_audio);
        assert_eq!((info.width, info.height), (1280, 720));
        assert!((info.duration - 2.0).abs() < 0.5);
    }
}
