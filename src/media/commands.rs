use std::path::Path;

use crate::config::SegmentConfig;

/// Abstract external tool command representation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Seek before the next input
    pub fn seek(self, seconds: f64) -> Self {
        self.arg("-ss").arg(format!("{:.3}", seconds))
    }

    /// Limit output duration
    pub fn duration(self, seconds: f64) -> Self {
        self.arg("-t").arg(format!("{:.3}", seconds))
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Disable audio
    pub fn no_audio(self) -> Self {
        self.arg("-an")
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Add video filter
    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-filter:v").arg(filter)
    }

    /// Add audio filter
    pub fn audio_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-af").arg(filter)
    }

    /// Decode everything and discard the result (analysis passes)
    pub fn null_output(self) -> Self {
        self.arg("-f").arg("null").arg("-")
    }

    /// Machine-readable progress on stdout, one key=value per line
    pub fn progress_pipe(self) -> Self {
        self.arg("-progress").arg("pipe:1")
    }

    /// Executable name without directories, used in logs and errors
    pub fn tool_name(&self) -> String {
        Path::new(&self.binary_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.binary_path.clone())
    }
}

/// Builder for the ffmpeg/ffprobe invocations the pipeline needs
#[derive(Debug, Clone)]
pub struct MediaCommandBuilder {
    ffmpeg: String,
    ffprobe: String,
}

impl MediaCommandBuilder {
    /// Create a new command builder
    pub fn new<S1: Into<String>, S2: Into<String>>(ffmpeg: S1, ffprobe: S2) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    fn ffmpeg<S: Into<String>>(&self, description: S) -> MediaCommand {
        MediaCommand::new(&self.ffmpeg, description).args(["-hide_banner", "-nostdin"])
    }

    /// Build container duration probe
    pub fn probe_duration<P: AsRef<Path>>(&self, input: P) -> MediaCommand {
        MediaCommand::new(&self.ffprobe, "Duration probe")
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .output(input)
    }

    /// Build scene-cut analysis pass
    pub fn scene_detection<P: AsRef<Path>>(&self, input: P, threshold: f64) -> MediaCommand {
        self.ffmpeg("Scene detection")
            .input(input)
            .video_filter(format!("select='gt(scene,{})',showinfo", threshold))
            .no_audio()
            .progress_pipe()
            .null_output()
    }

    /// Build silence analysis pass
    pub fn silence_detection<P: AsRef<Path>>(
        &self,
        input: P,
        noise_db: f64,
        min_secs: f64,
    ) -> MediaCommand {
        self.ffmpeg("Silence detection")
            .input(input)
            .no_video()
            .audio_filter(format!("silencedetect=noise={}dB:d={}", noise_db, min_secs))
            .progress_pipe()
            .null_output()
    }

    /// Build clip cut with constant encoding settings
    pub fn cut_segment<P: AsRef<Path>>(
        &self,
        input: P,
        start: f64,
        duration: f64,
        output: P,
        settings: &SegmentConfig,
    ) -> MediaCommand {
        self.ffmpeg(format!("Cut segment ({:.3}s from {:.3}s)", duration, start))
            .overwrite()
            .seek(start)
            .input(input)
            .duration(duration)
            .video_codec("libx264")
            .arg("-preset")
            .arg(&settings.preset)
            .arg("-crf")
            .arg(settings.crf.to_string())
            .audio_codec("aac")
            .arg("-b:a")
            .arg(&settings.audio_bitrate)
            .arg("-movflags")
            .arg("+faststart")
            .progress_pipe()
            .output(output)
    }

    /// Build single-frame thumbnail extraction
    pub fn thumbnail<P: AsRef<Path>>(&self, clip: P, at: f64, output: P) -> MediaCommand {
        self.ffmpeg("Thumbnail extraction")
            .overwrite()
            .seek(at)
            .input(clip)
            .arg("-frames:v")
            .arg("1")
            .output(output)
    }

    /// Build container normalization (re-encode to H.264/AAC)
    pub fn transcode<P: AsRef<Path>>(&self, input: P, output: P) -> MediaCommand {
        self.ffmpeg("Container normalization")
            .overwrite()
            .input(input)
            .video_codec("libx264")
            .arg("-preset")
            .arg("veryfast")
            .audio_codec("aac")
            .arg("-movflags")
            .arg("+faststart")
            .progress_pipe()
            .output(output)
    }

    /// Build version check command
    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.ffmpeg, "Version check").arg("-version")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> MediaCommandBuilder {
        MediaCommandBuilder::new("ffmpeg", "ffprobe")
    }

    #[test]
    fn cut_seeks_before_input_and_limits_after() {
        let settings = SegmentConfig {
            preset: "veryfast".to_string(),
            crf: 23,
            audio_bitrate: "128k".to_string(),
        };
        let cmd = builder().cut_segment("in.mp4", 30.0, 12.5, "out.mp4", &settings);
        let args = cmd.args.join(" ");
        assert!(args.contains("-y -ss 30.000 -i in.mp4 -t 12.500"));
        assert!(args.contains("-c:v libx264 -preset veryfast -crf 23"));
        assert!(args.contains("-c:a aac -b:a 128k -movflags +faststart"));
        assert_eq!(cmd.args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn analysis_passes_use_expected_filters() {
        let scenes = builder().scene_detection("in.mp4", 0.35);
        assert!(scenes.args.contains(&"select='gt(scene,0.35)',showinfo".to_string()));
        assert!(scenes.args.ends_with(&["-f".to_string(), "null".to_string(), "-".to_string()]));

        let silence = builder().silence_detection("in.mp4", -30.0, 0.5);
        assert!(silence.args.contains(&"silencedetect=noise=-30dB:d=0.5".to_string()));
    }

    #[test]
    fn thumbnail_grabs_one_frame() {
        let cmd = builder().thumbnail("clip.mp4", 1.0, "clip.jpg");
        let args = cmd.args.join(" ");
        assert!(args.contains("-ss 1.000 -i clip.mp4 -frames:v 1 clip.jpg"));
    }

    #[test]
    fn tool_name_strips_directories() {
        let cmd = MediaCommand::new("/usr/local/bin/ffprobe", "probe");
        assert_eq!(cmd.tool_name(), "ffprobe");
    }
}
