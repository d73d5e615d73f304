use std::ffi::OsString;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::shared::capture_config::{ImageFormat, Viewport};
use crate::shared::constants::BRIDGE_SHUTDOWN_GRACE;
use crate::source::domain::frame_source::{FrameSource, SourceError, SourceFrame};

/// A frame line written by the bridge, mirroring a screencast frame event.
#[derive(Debug, Deserialize)]
struct BridgeFrame {
    data: String,
    #[serde(rename = "sessionId")]
    session_id: u64,
}

/// Stream parameters announced to the bridge before the first frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BridgeSettings {
    pub width: u32,
    pub height: u32,
    pub format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
}

impl BridgeSettings {
    pub fn new(viewport: Viewport, image_format: ImageFormat) -> Self {
        let quality = match image_format {
            ImageFormat::Png => None,
            ImageFormat::Jpeg { quality } => Some(quality),
        };
        Self {
            width: viewport.width,
            height: viewport.height,
            format: image_format.extension(),
            quality,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum BridgeCommand {
    Start(BridgeSettings),
    Ack(u64),
    Stop(bool),
}

/// Frame source backed by a bridge process speaking JSON lines.
///
/// The bridge (typically a headless browser driver running a screencast)
/// first reads `{"start": {"width", "height", "format", "quality"}}` from
/// stdin and sizes and encodes its stream accordingly. It then writes
/// `{"data": "<base64>", "sessionId": N}` per frame on stdout and waits for
/// `{"ack": N}` on stdin before sending the next one. Closing sends
/// `{"stop": true}`, closes stdin and reaps the process, killing it if it
/// does not exit within a short grace period.
pub struct ScreencastBridgeSource {
    program: OsString,
    args: Vec<OsString>,
    settings: BridgeSettings,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<BufReader<ChildStdout>>,
    line: String,
}

impl ScreencastBridgeSource {
    pub fn new<I, S>(program: impl Into<OsString>, args: I, settings: BridgeSettings) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            settings,
            child: None,
            stdin: None,
            stdout: None,
            line: String::new(),
        }
    }

    /// Builds a source from `[program, args...]`.
    pub fn from_command_line(
        parts: &[String],
        settings: BridgeSettings,
    ) -> Result<Self, SourceError> {
        let (program, args) = parts.split_first().ok_or("bridge command is empty")?;
        Ok(Self::new(program, args, settings))
    }
}

impl FrameSource for ScreencastBridgeSource {
    fn open(&mut self) -> Result<(), SourceError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| format!("failed to start bridge {:?}: {e}", self.program))?;

        self.stdin = child.stdin.take();
        self.stdout = child.stdout.take().map(BufReader::new);
        self.child = Some(child);
        log::info!("Screencast bridge started: {:?}", self.program);

        let stdin = self.stdin.as_mut().ok_or("bridge stdin is not piped")?;
        send_command(stdin, &BridgeCommand::Start(self.settings))
            .map_err(|e| format!("failed to send stream settings to bridge: {e}"))?;
        log::debug!(
            "Requested {}x{} {} frames from bridge",
            self.settings.width,
            self.settings.height,
            self.settings.format
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<SourceFrame>, SourceError> {
        let reader = self.stdout.as_mut().ok_or("bridge is not open")?;
        loop {
            self.line.clear();
            if reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return parse_frame_line(trimmed).map(Some);
        }
    }

    fn ack(&mut self, ack_id: u64) -> Result<(), SourceError> {
        let stdin = self.stdin.as_mut().ok_or("bridge is not open")?;
        send_command(stdin, &BridgeCommand::Ack(ack_id))
    }

    fn close(&mut self) {
        if let Some(mut stdin) = self.stdin.take() {
            let _ = send_command(&mut stdin, &BridgeCommand::Stop(true));
        }
        self.stdout = None;

        if let Some(mut child) = self.child.take() {
            if !wait_with_grace(&mut child, BRIDGE_SHUTDOWN_GRACE) {
                log::warn!("Screencast bridge did not exit, killing it");
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

impl Drop for ScreencastBridgeSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Decodes one bridge frame line.
pub fn parse_frame_line(line: &str) -> Result<SourceFrame, SourceError> {
    let frame: BridgeFrame =
        serde_json::from_str(line).map_err(|e| format!("malformed bridge frame: {e}"))?;
    let payload = base64::engine::general_purpose::STANDARD
        .decode(frame.data.as_bytes())
        .map_err(|e| format!("frame {} is not valid base64: {e}", frame.session_id))?;
    Ok(SourceFrame {
        payload,
        ack_id: frame.session_id,
    })
}

fn send_command(stdin: &mut ChildStdin, command: &BridgeCommand) -> Result<(), SourceError> {
    let line = serde_json::to_string(command)?;
    writeln!(stdin, "{line}")?;
    stdin.flush()?;
    Ok(())
}

fn wait_with_grace(child: &mut Child, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(10));
            }
            _ => return false,
        }
    }
}
