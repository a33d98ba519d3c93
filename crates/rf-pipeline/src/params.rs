//! Transformation parameters and their validation.

use serde::{Deserialize, Serialize};
use std::fmt;

use rf_core::{AudioCodec, Error, OutputFormat, Result, VideoCodec};

/// Smallest accepted output dimension, in pixels.
pub const MIN_DIMENSION: u32 = 16;
/// Largest accepted output dimension, in pixels.
pub const MAX_DIMENSION: u32 = 7680;
/// Accepted frame-rate range.
pub const FRAME_RATE_RANGE: std::ops::RangeInclusive<u32> = 1..=120;
/// Accepted constant-rate-factor range.
pub const CRF_RANGE: std::ops::RangeInclusive<u8> = 0..=51;
/// Accepted video bitrate range, in kbit/s.
pub const VIDEO_BITRATE_RANGE: std::ops::RangeInclusive<u32> = 100..=100_000;
/// Accepted audio bitrate range, in kbit/s.
pub const AUDIO_BITRATE_RANGE: std::ops::RangeInclusive<u32> = 8..=640;

/// Output frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// How the source frame is fitted into the requested [`Resolution`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScaleFit {
    /// Scale to fill the frame and crop the overflow.
    #[default]
    Cover,
    /// Scale to fit inside the frame and pad the rest.
    Contain,
    /// Scale to the exact size, ignoring aspect ratio.
    Stretch,
}

/// Encoder speed/quality trade-off (x264/x265 preset names).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EncodeSpeed {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    Fast,
    Medium,
    Slow,
    Slower,
    Veryslow,
}

impl EncodeSpeed {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ultrafast => "ultrafast",
            Self::Superfast => "superfast",
            Self::Veryfast => "veryfast",
            Self::Faster => "faster",
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
            Self::Slower => "slower",
            Self::Veryslow => "veryslow",
        }
    }
}

impl fmt::Display for EncodeSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested transformation of a source artifact.
///
/// Only `format` is required. Unset codecs fall back to the format's
/// defaults (see [`resolved_video_codec`](Self::resolved_video_codec) and
/// [`resolved_audio_codec`](Self::resolved_audio_codec)); every other unset
/// field leaves the encoder's own default in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(deny_unknown_fields)]
pub struct TranscodeParams {
    pub format: OutputFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<VideoCodec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<AudioCodec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(default)]
    pub fit: ScaleFit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crf: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<EncodeSpeed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_bitrate_kbps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_bitrate_kbps: Option<u32>,
    #[serde(default)]
    pub strip_audio: bool,
}

impl TranscodeParams {
    /// Parameters that only choose the output format.
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            video_codec: None,
            audio_codec: None,
            resolution: None,
            fit: ScaleFit::default(),
            frame_rate: None,
            crf: None,
            speed: None,
            video_bitrate_kbps: None,
            audio_bitrate_kbps: None,
            strip_audio: false,
        }
    }

    /// Video codec the output will use, or `None` when it has no video
    /// stream or the container implies the encoder (GIF).
    pub fn resolved_video_codec(&self) -> Option<VideoCodec> {
        self.video_codec
            .or_else(|| self.format.default_video_codec())
    }

    /// Audio codec the output will use, or `None` when audio is dropped.
    pub fn resolved_audio_codec(&self) -> Option<AudioCodec> {
        if self.strip_audio || self.format.is_video_only() {
            return None;
        }
        self.audio_codec
            .or_else(|| self.format.default_audio_codec())
    }

    /// Whether the output carries a video stream.
    pub fn has_video(&self) -> bool {
        !self.format.is_audio_only()
    }

    /// Check that these parameters describe a transformation the pipeline
    /// supports.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let format = self.format;

        if format.is_audio_only() {
            self.reject_video_settings()?;
            if self.strip_audio {
                return Err(invalid(format!(
                    "strip_audio would leave {format} output with no streams"
                )));
            }
        }

        if format.is_video_only()
            && (self.audio_codec.is_some() || self.audio_bitrate_kbps.is_some())
        {
            return Err(invalid(format!("{format} output carries no audio")));
        }

        if self.strip_audio && (self.audio_codec.is_some() || self.audio_bitrate_kbps.is_some()) {
            return Err(invalid(
                "audio_codec and audio_bitrate_kbps conflict with strip_audio",
            ));
        }

        if let Some(codec) = self.video_codec {
            if !format.video_codecs().contains(&codec) {
                return Err(invalid(format!(
                    "video codec {codec} is not supported in {format}"
                )));
            }
        }

        if let Some(codec) = self.audio_codec {
            if !format.audio_codecs().contains(&codec) {
                return Err(invalid(format!(
                    "audio codec {codec} is not supported in {format}"
                )));
            }
        }

        if let Some(res) = self.resolution {
            for (name, value) in [("width", res.width), ("height", res.height)] {
                if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&value) {
                    return Err(invalid(format!(
                        "{name} {value} is outside {MIN_DIMENSION}..={MAX_DIMENSION}"
                    )));
                }
                if value % 2 != 0 {
                    return Err(invalid(format!("{name} {value} must be even")));
                }
            }
        }

        if let Some(fps) = self.frame_rate {
            if !FRAME_RATE_RANGE.contains(&fps) {
                return Err(invalid(format!(
                    "frame_rate {fps} is outside {}..={}",
                    FRAME_RATE_RANGE.start(),
                    FRAME_RATE_RANGE.end()
                )));
            }
        }

        self.validate_rate_control()?;

        if let Some(kbps) = self.audio_bitrate_kbps {
            if !AUDIO_BITRATE_RANGE.contains(&kbps) {
                return Err(invalid(format!(
                    "audio_bitrate_kbps {kbps} is outside {}..={}",
                    AUDIO_BITRATE_RANGE.start(),
                    AUDIO_BITRATE_RANGE.end()
                )));
            }
            if let Some(codec @ (AudioCodec::Pcm | AudioCodec::Flac)) = self.resolved_audio_codec() {
                return Err(invalid(format!(
                    "audio codec {codec} is lossless and takes no bitrate"
                )));
            }
        }

        Ok(())
    }

    fn reject_video_settings(&self) -> Result<()> {
        let format = self.format;
        let offending = [
            ("video_codec", self.video_codec.is_some()),
            ("resolution", self.resolution.is_some()),
            ("frame_rate", self.frame_rate.is_some()),
            ("crf", self.crf.is_some()),
            ("speed", self.speed.is_some()),
            ("video_bitrate_kbps", self.video_bitrate_kbps.is_some()),
        ]
        .into_iter()
        .find(|(_, set)| *set);

        match offending {
            Some((field, _)) => Err(invalid(format!(
                "{field} is not allowed for audio-only format {format}"
            ))),
            None => Ok(()),
        }
    }

    fn validate_rate_control(&self) -> Result<()> {
        if self.crf.is_some() && self.video_bitrate_kbps.is_some() {
            return Err(invalid("crf and video_bitrate_kbps are mutually exclusive"));
        }

        let codec = self.resolved_video_codec();

        if let Some(crf) = self.crf {
            if !CRF_RANGE.contains(&crf) {
                return Err(invalid(format!(
                    "crf {crf} is outside {}..={}",
                    CRF_RANGE.start(),
                    CRF_RANGE.end()
                )));
            }
            match codec {
                Some(VideoCodec::Prores) => {
                    return Err(invalid("crf is not supported by prores"));
                }
                None => {
                    return Err(invalid(format!("crf is not supported for {}", self.format)));
                }
                _ => {}
            }
        }

        if let Some(speed) = self.speed {
            if !matches!(codec, Some(VideoCodec::H264 | VideoCodec::H265)) {
                let target = codec.map_or_else(|| self.format.to_string(), |c| c.to_string());
                return Err(invalid(format!(
                    "speed {speed} only applies to h264 and h265, not {target}"
                )));
            }
        }

        if let Some(kbps) = self.video_bitrate_kbps {
            if !VIDEO_BITRATE_RANGE.contains(&kbps) {
                return Err(invalid(format!(
                    "video_bitrate_kbps {kbps} is outside {}..={}",
                    VIDEO_BITRATE_RANGE.start(),
                    VIDEO_BITRATE_RANGE.end()
                )));
            }
            if codec.is_none() {
                return Err(invalid(format!(
                    "video_bitrate_kbps is not supported for {}",
                    self.format
                )));
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::invalid_input(message)
}
