//! Deterministic ffmpeg command-line construction.
//!
//! The invocation only ever refers to the staged source and result by their
//! relative names inside the job directory, so the argument list is a pure
//! function of the parameters and the source extension.

use std::path::{Path, PathBuf};

use rf_av::{JobWorkspace, ToolCommand};
use rf_core::{AudioCodec, OutputFormat, VideoCodec};

use crate::params::{ScaleFit, TranscodeParams};

/// A fully resolved external process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Directory the process runs in.
    pub working_dir: PathBuf,
}

impl Invocation {
    /// Convert into a [`ToolCommand`] ready to run.
    pub fn to_command(&self) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.program.clone());
        cmd.args(self.args.iter().cloned());
        cmd.current_dir(&self.working_dir);
        cmd
    }

    /// Shell-like rendering for logs.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Build the ffmpeg invocation that turns `source_name` into
/// `output.<ext>` inside `working_dir`.
///
/// `params` are assumed to have passed [`TranscodeParams::validate`].
pub fn build_invocation(
    program: &Path,
    working_dir: &Path,
    source_name: &str,
    params: &TranscodeParams,
) -> Invocation {
    let format = params.format;
    let mut args: Vec<String> = Vec::new();
    let mut push = |items: &[&str]| args.extend(items.iter().map(|s| s.to_string()));

    push(&["-hide_banner", "-nostdin", "-y", "-i", source_name]);

    if format.is_audio_only() {
        push(&["-vn"]);
    } else {
        let codec = params.resolved_video_codec();
        if let Some(codec) = codec {
            push(&["-c:v", video_encoder(codec)]);
            if codec == VideoCodec::Prores {
                push(&["-profile:v", "3"]);
            }
        }

        let filters = video_filters(params);
        if !filters.is_empty() {
            push(&["-vf", &filters.join(",")]);
        }

        if let Some(crf) = params.crf {
            push(&["-crf", &crf.to_string()]);
            // libvpx and libaom only honour crf as constant quality with a zero bitrate.
            if matches!(codec, Some(VideoCodec::Vp9 | VideoCodec::Av1)) {
                push(&["-b:v", "0"]);
            }
        }
        if let Some(speed) = params.speed {
            push(&["-preset", speed.as_str()]);
        }
        if let Some(kbps) = params.video_bitrate_kbps {
            push(&["-b:v", &format!("{kbps}k")]);
        }
        if let Some(fps) = params.frame_rate {
            push(&["-r", &fps.to_string()]);
        }
    }

    match params.resolved_audio_codec() {
        Some(codec) => {
            push(&["-c:a", audio_encoder(codec)]);
            if let Some(kbps) = params.audio_bitrate_kbps {
                push(&["-b:a", &format!("{kbps}k")]);
            }
        }
        None => push(&["-an"]),
    }

    if matches!(format, OutputFormat::Mp4 | OutputFormat::Mov | OutputFormat::M4a) {
        push(&["-movflags", "+faststart"]);
    }

    push(&[&JobWorkspace::output_name(format.extension())]);

    Invocation {
        program: program.to_path_buf(),
        args,
        working_dir: working_dir.to_path_buf(),
    }
}

/// The `-vf` filter chain: frame rate, geometry, pixel format, then the
/// GIF palette pass.
fn video_filters(params: &TranscodeParams) -> Vec<String> {
    let mut filters = Vec::new();

    if let Some(fps) = params.frame_rate {
        filters.push(format!("fps={fps}"));
    }

    if let Some(res) = params.resolution {
        let (w, h) = (res.width, res.height);
        match params.fit {
            ScaleFit::Cover => {
                filters.push(format!("scale={w}:{h}:force_original_aspect_ratio=increase"));
                filters.push(format!("crop={w}:{h}"));
            }
            ScaleFit::Contain => {
                filters.push(format!("scale={w}:{h}:force_original_aspect_ratio=decrease"));
                filters.push(format!("pad={w}:{h}:(ow-iw)/2:(oh-ih)/2"));
            }
            ScaleFit::Stretch => filters.push(format!("scale={w}:{h}")),
        }
    }

    match params.resolved_video_codec() {
        Some(VideoCodec::H264 | VideoCodec::H265 | VideoCodec::Vp9) => {
            filters.push("format=yuv420p".into());
        }
        _ => {}
    }

    if params.resolution.is_some() {
        filters.push("setsar=1".into());
    }

    if params.format == OutputFormat::Gif {
        filters.push("split[a][b];[a]palettegen[p];[b][p]paletteuse".into());
    }

    filters
}

fn video_encoder(codec: VideoCodec) -> &'static str {
    match codec {
        VideoCodec::H264 => "libx264",
        VideoCodec::H265 => "libx265",
        VideoCodec::Vp9 => "libvpx-vp9",
        VideoCodec::Av1 => "libaom-av1",
        VideoCodec::Prores => "prores_ks",
    }
}

fn audio_encoder(codec: AudioCodec) -> &'static str {
    match codec {
        AudioCodec::Aac => "aac",
        AudioCodec::Mp3 => "libmp3lame",
        AudioCodec::Opus => "libopus",
        AudioCodec::Vorbis => "libvorbis",
        AudioCodec::Flac => "flac",
        AudioCodec::Pcm => "pcm_s16le",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{EncodeSpeed, Resolution};
    use crate::presets;

    fn build(params: &TranscodeParams) -> Vec<String> {
        build_invocation(Path::new("ffmpeg"), Path::new("/work/job"), "source.mov", params).args
    }

    #[test]
    fn identical_inputs_yield_identical_invocations() {
        let params = presets::resolve("vertical-1080p").unwrap();
        let a = build_invocation(Path::new("ffmpeg"), Path::new("/w/1"), "source.mp4", &params);
        let b = build_invocation(Path::new("ffmpeg"), Path::new("/w/2"), "source.mp4", &params);
        assert_eq!(a.args, b.args);
        assert_ne!(a.working_dir, b.working_dir);
    }

    #[test]
    fn vertical_preset_arguments() {
        let params = presets::resolve("vertical-1080p").unwrap();
        assert_eq!(
            build(&params),
            vec![
                "-hide_banner",
                "-nostdin",
                "-y",
                "-i",
                "source.mov",
                "-c:v",
                "libx264",
                "-vf",
                "fps=30,scale=1080:1920:force_original_aspect_ratio=increase,crop=1080:1920,format=yuv420p,setsar=1",
                "-crf",
                "23",
                "-preset",
                "medium",
                "-r",
                "30",
                "-c:a",
                "aac",
                "-movflags",
                "+faststart",
                "output.mp4",
            ]
        );
    }

    #[test]
    fn minimal_mp4_uses_defaults() {
        let args = build(&TranscodeParams::new(OutputFormat::Mp4));
        assert_eq!(
            args,
            vec![
                "-hide_banner",
                "-nostdin",
                "-y",
                "-i",
                "source.mov",
                "-c:v",
                "libx264",
                "-vf",
                "format=yuv420p",
                "-c:a",
                "aac",
                "-movflags",
                "+faststart",
                "output.mp4",
            ]
        );
    }

    #[test]
    fn audio_only_drops_video() {
        let params = TranscodeParams {
            audio_bitrate_kbps: Some(192),
            ..TranscodeParams::new(OutputFormat::Mp3)
        };
        let args = build(&params);
        assert!(args.contains(&"-vn".to_string()));
        assert!(!args.contains(&"-c:v".to_string()));
        assert!(args.windows(2).any(|w| w == ["-c:a", "libmp3lame"]));
        assert!(args.windows(2).any(|w| w == ["-b:a", "192k"]));
        assert_eq!(args.last().unwrap(), "output.mp3");
    }

    #[test]
    fn strip_audio_emits_an() {
        let params = TranscodeParams {
            strip_audio: true,
            ..TranscodeParams::new(OutputFormat::Mkv)
        };
        let args = build(&params);
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"-c:a".to_string()));
        assert!(!args.contains(&"-movflags".to_string()));
    }

    #[test]
    fn contain_pads_and_stretch_scales() {
        let contain = TranscodeParams {
            resolution: Some(Resolution::new(1280, 720)),
            fit: ScaleFit::Contain,
            ..TranscodeParams::new(OutputFormat::Mp4)
        };
        let args = build(&contain);
        let vf = &args[args.iter().position(|a| a == "-vf").unwrap() + 1];
        assert!(vf.contains("force_original_aspect_ratio=decrease"));
        assert!(vf.contains("pad=1280:720"));

        let stretch = TranscodeParams {
            fit: ScaleFit::Stretch,
            ..contain
        };
        let args = build(&stretch);
        let vf = &args[args.iter().position(|a| a == "-vf").unwrap() + 1];
        assert!(vf.starts_with("scale=1280:720,"));
        assert!(!vf.contains("pad="));
    }

    #[test]
    fn vp9_crf_sets_zero_bitrate() {
        let params = TranscodeParams {
            crf: Some(31),
            ..TranscodeParams::new(OutputFormat::Webm)
        };
        let args = build(&params);
        assert!(args.windows(2).any(|w| w == ["-c:v", "libvpx-vp9"]));
        assert!(args.windows(4).any(|w| w == ["-crf", "31", "-b:v", "0"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "libopus"]));
    }

    #[test]
    fn bitrate_mode() {
        let params = TranscodeParams {
            video_bitrate_kbps: Some(4500),
            speed: Some(EncodeSpeed::Veryfast),
            ..TranscodeParams::new(OutputFormat::Mov)
        };
        let args = build(&params);
        assert!(args.windows(2).any(|w| w == ["-b:v", "4500k"]));
        assert!(!args.contains(&"-crf".to_string()));
        assert_eq!(args.last().unwrap(), "output.mov");
    }

    #[test]
    fn gif_uses_palette_and_no_audio() {
        let params = presets::resolve("gif-480p").unwrap();
        let args = build(&params);
        let vf = &args[args.iter().position(|a| a == "-vf").unwrap() + 1];
        assert!(vf.starts_with("fps=12,"));
        assert!(vf.ends_with("paletteuse"));
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"-c:v".to_string()));
        assert_eq!(args.last().unwrap(), "output.gif");
    }

    #[test]
    fn to_command_carries_working_dir() {
        let inv = build_invocation(
            Path::new("/usr/bin/ffmpeg"),
            Path::new("/work/job"),
            "source.mp4",
            &TranscodeParams::new(OutputFormat::Mp3),
        );
        assert!(inv.command_line().starts_with("/usr/bin/ffmpeg -hide_banner"));
        let _cmd = inv.to_command();
    }
}
