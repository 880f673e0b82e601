//! Capture command construction
//!
//! Builds the ffmpeg invocation for the host platform's screen-capture
//! source: `gdigrab` of the whole desktop on windows, `x11grab` of
//! `$DISPLAY` elsewhere. Output is a raw Annex-B H.264 stream on stdout,
//! diagnostics on stderr.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Capture and encode parameters for one viewer session
#[derive(Debug, Clone)]
pub struct CaptureParams {
    /// Encoder to hand to ffmpeg (`libx264`, `h264_nvenc`, ...)
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl CaptureParams {
    /// Target spacing between delivered frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

/// Build the capture process invocation.
pub fn capture_command(params: &CaptureParams) -> Command {
    let mut cmd = Command::new("ffmpeg");

    #[cfg(windows)]
    cmd.arg("-f").arg("gdigrab").arg("-i").arg("desktop");

    #[cfg(not(windows))]
    {
        let display = std::env::var("DISPLAY").unwrap_or_else(|_| ":0".to_owned());
        cmd.arg("-f").arg("x11grab").arg("-i").arg(display);
    }

    cmd.arg("-framerate")
        .arg(params.fps.to_string())
        .arg("-video_size")
        .arg(format!("{}x{}", params.width, params.height))
        .arg("-c:v")
        .arg(&params.codec)
        .arg("-pix_fmt")
        .arg("yuv420p")
        // Low-latency tuning; a buffered lookahead would add a full GOP of
        // glass-to-glass delay.
        .arg("-preset")
        .arg("ultrafast")
        .arg("-tune")
        .arg("zerolatency")
        .arg("-profile:v")
        .arg("baseline")
        .arg("-b:v")
        .arg("3M")
        .arg("-maxrate")
        .arg("3M")
        .arg("-bufsize")
        .arg("6M")
        .arg("-g")
        .arg((params.fps * 2).to_string())
        .arg("-bf")
        .arg("0")
        .arg("-f")
        .arg("h264")
        .arg("pipe:1");

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Backstop: a dropped handle must never orphan the process.
        .kill_on_drop(true);

    cmd
}
