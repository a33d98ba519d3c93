//! Media-domain enums for output formats and codecs.
//!
//! All enums serialize in lowercase (via `serde(rename_all = "lowercase")`) and
//! implement `Display` manually for consistent string representation.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// OutputFormat
// ---------------------------------------------------------------------------

/// Output container formats the pipeline can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Mp4,
    Mov,
    Mkv,
    Webm,
    Gif,
    Mp3,
    M4a,
    Wav,
}

impl OutputFormat {
    /// Every supported format, in catalogue order.
    pub const ALL: [OutputFormat; 8] = [
        Self::Mp4,
        Self::Mov,
        Self::Mkv,
        Self::Webm,
        Self::Gif,
        Self::Mp3,
        Self::M4a,
        Self::Wav,
    ];

    /// File extension (without the dot) for result artifacts.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
            Self::Mkv => "mkv",
            Self::Webm => "webm",
            Self::Gif => "gif",
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
            Self::Wav => "wav",
        }
    }

    /// Formats that carry no video stream.
    pub fn is_audio_only(self) -> bool {
        matches!(self, Self::Mp3 | Self::M4a | Self::Wav)
    }

    /// Formats that carry no audio stream.
    pub fn is_video_only(self) -> bool {
        matches!(self, Self::Gif)
    }

    /// Video codecs this container can hold. Empty for audio-only formats and
    /// for GIF, whose encoder is implied by the container.
    pub fn video_codecs(self) -> &'static [VideoCodec] {
        match self {
            Self::Mp4 => &[VideoCodec::H264, VideoCodec::H265, VideoCodec::Av1],
            Self::Mov => &[VideoCodec::H264, VideoCodec::H265, VideoCodec::Prores],
            Self::Mkv => &[
                VideoCodec::H264,
                VideoCodec::H265,
                VideoCodec::Vp9,
                VideoCodec::Av1,
            ],
            Self::Webm => &[VideoCodec::Vp9, VideoCodec::Av1],
            Self::Gif | Self::Mp3 | Self::M4a | Self::Wav => &[],
        }
    }

    /// Audio codecs this container can hold. Empty for GIF.
    pub fn audio_codecs(self) -> &'static [AudioCodec] {
        match self {
            Self::Mp4 => &[AudioCodec::Aac, AudioCodec::Mp3, AudioCodec::Opus],
            Self::Mov => &[AudioCodec::Aac, AudioCodec::Pcm],
            Self::Mkv => &[
                AudioCodec::Aac,
                AudioCodec::Mp3,
                AudioCodec::Opus,
                AudioCodec::Vorbis,
                AudioCodec::Flac,
                AudioCodec::Pcm,
            ],
            Self::Webm => &[AudioCodec::Opus, AudioCodec::Vorbis],
            Self::Gif => &[],
            Self::Mp3 => &[AudioCodec::Mp3],
            Self::M4a => &[AudioCodec::Aac],
            Self::Wav => &[AudioCodec::Pcm],
        }
    }

    /// Codec used when the request does not name one.
    pub fn default_video_codec(self) -> Option<VideoCodec> {
        self.video_codecs().first().copied()
    }

    /// Codec used when the request does not name one.
    pub fn default_audio_codec(self) -> Option<AudioCodec> {
        match self {
            Self::Webm => Some(AudioCodec::Opus),
            _ => self.audio_codecs().first().copied(),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

// ---------------------------------------------------------------------------
// VideoCodec
// ---------------------------------------------------------------------------

/// Supported video codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    H265,
    Vp9,
    Av1,
    Prores,
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H264 => write!(f, "h264"),
            Self::H265 => write!(f, "h265"),
            Self::Vp9 => write!(f, "vp9"),
            Self::Av1 => write!(f, "av1"),
            Self::Prores => write!(f, "prores"),
        }
    }
}

// ---------------------------------------------------------------------------
// AudioCodec
// ---------------------------------------------------------------------------

/// Supported audio codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
    Mp3,
    Opus,
    Vorbis,
    Flac,
    Pcm,
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aac => write!(f, "aac"),
            Self::Mp3 => write!(f, "mp3"),
            Self::Opus => write!(f, "opus"),
            Self::Vorbis => write!(f, "vorbis"),
            Self::Flac => write!(f, "flac"),
            Self::Pcm => write!(f, "pcm"),
        }
    }
}
