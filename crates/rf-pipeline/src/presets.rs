//! Named parameter sets offered to clients.

use serde::Serialize;

use rf_core::{AudioCodec, Error, OutputFormat, Result, VideoCodec};

use crate::params::{EncodeSpeed, Resolution, ScaleFit, TranscodeParams};

/// A named, ready-made [`TranscodeParams`].
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct Preset {
    pub name: &'static str,
    pub description: &'static str,
    pub params: TranscodeParams,
}

/// All presets, in catalogue order.
pub fn all() -> Vec<Preset> {
    vec![
        Preset {
            name: "vertical-1080p",
            description: "1080x1920 portrait H.264 at 30 fps, cropped to fill",
            params: TranscodeParams {
                video_codec: Some(VideoCodec::H264),
                audio_codec: Some(AudioCodec::Aac),
                resolution: Some(Resolution::new(1080, 1920)),
                fit: ScaleFit::Cover,
                frame_rate: Some(30),
                crf: Some(23),
                speed: Some(EncodeSpeed::Medium),
                ..TranscodeParams::new(OutputFormat::Mp4)
            },
        },
        Preset {
            name: "web-720p",
            description: "1280x720 H.264/AAC MP4 for browser playback",
            params: TranscodeParams {
                resolution: Some(Resolution::new(1280, 720)),
                fit: ScaleFit::Contain,
                crf: Some(23),
                speed: Some(EncodeSpeed::Fast),
                audio_bitrate_kbps: Some(128),
                ..TranscodeParams::new(OutputFormat::Mp4)
            },
        },
        Preset {
            name: "web-1080p",
            description: "1920x1080 H.264/AAC MP4 for browser playback",
            params: TranscodeParams {
                resolution: Some(Resolution::new(1920, 1080)),
                fit: ScaleFit::Contain,
                crf: Some(21),
                speed: Some(EncodeSpeed::Medium),
                audio_bitrate_kbps: Some(160),
                ..TranscodeParams::new(OutputFormat::Mp4)
            },
        },
        Preset {
            name: "webm-720p",
            description: "1280x720 VP9/Opus WebM",
            params: TranscodeParams {
                resolution: Some(Resolution::new(1280, 720)),
                fit: ScaleFit::Contain,
                crf: Some(32),
                audio_bitrate_kbps: Some(96),
                ..TranscodeParams::new(OutputFormat::Webm)
            },
        },
        Preset {
            name: "gif-480p",
            description: "480 px wide animated GIF at 12 fps",
            params: TranscodeParams {
                resolution: Some(Resolution::new(480, 270)),
                fit: ScaleFit::Contain,
                frame_rate: Some(12),
                ..TranscodeParams::new(OutputFormat::Gif)
            },
        },
        Preset {
            name: "audio-mp3",
            description: "Audio track only, 192 kbit/s MP3",
            params: TranscodeParams {
                audio_bitrate_kbps: Some(192),
                ..TranscodeParams::new(OutputFormat::Mp3)
            },
        },
    ]
}

/// Look up a preset by name.
pub fn find(name: &str) -> Option<Preset> {
    all().into_iter().find(|p| p.name == name)
}

/// Resolve a preset name to its parameters.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for an unknown name.
pub fn resolve(name: &str) -> Result<TranscodeParams> {
    find(name)
        .map(|p| p.params)
        .ok_or_else(|| Error::invalid_input(format!("unknown preset '{name}'")))
}
