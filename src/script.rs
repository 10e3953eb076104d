//! Script-upload client for the controller's secondary interface.
//!
//! The secondary interface accepts plain URScript text terminated by
//! newlines; receiving a new program replaces whatever is currently
//! running. Before upload, a line-oriented pre-processor resolves `$MN`
//! version markers against the live controller version.

use crate::control_script::CONTROL_SCRIPT;
use crate::rtde::ControllerVersion;
use crate::{Result, RtdeError};
use regex::Regex;
use std::io::Write;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Secondary (script upload) port on the controller.
pub const SCRIPT_PORT: u16 = 30002;

/// Client for uploading URScript programs to the controller.
pub struct ScriptClient {
    hostname: String,
    port: u16,
    stream: Option<TcpStream>,
    controller_version: ControllerVersion,
    register_offset: u32,
    custom_script_file: Option<PathBuf>,
    version_marker: Regex,
}

impl ScriptClient {
    pub fn new(
        hostname: &str,
        port: u16,
        controller_version: ControllerVersion,
        register_offset: u32,
    ) -> Result<Self> {
        let version_marker = Regex::new(r"^(\s*)\$\s?(\d)(\d)\s?(.*)$")
            .map_err(|e| RtdeError::Config(format!("Invalid version marker pattern: {}", e)))?;
        Ok(Self {
            hostname: hostname.to_string(),
            port,
            stream: None,
            controller_version,
            register_offset,
            custom_script_file: None,
            version_marker,
        })
    }

    pub fn connect(&mut self) -> Result<()> {
        let stream = TcpStream::connect((self.hostname.as_str(), self.port)).map_err(|e| {
            RtdeError::Connection(format!(
                "Failed to connect to script server {}:{}: {}",
                self.hostname, self.port, e
            ))
        })?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        debug!(
            "Connected to script server at {}:{}",
            self.hostname, self.port
        );
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!("Script client disconnected");
        }
    }

    /// Use the given file as the control script instead of the embedded
    /// one. Passing `None` restores the embedded script.
    pub fn set_script_file(&mut self, path: Option<PathBuf>) {
        self.custom_script_file = path;
    }

    /// Upload the per-session control script: the custom file if one is
    /// assigned (falling back to the embedded script if it cannot be
    /// read), otherwise the embedded script.
    pub fn send_control_script(&mut self) -> Result<()> {
        let source = match &self.custom_script_file {
            Some(path) => match std::fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        "Failed to read custom script {}: {}; falling back to embedded script",
                        path.display(),
                        e
                    );
                    CONTROL_SCRIPT.to_string()
                }
            },
            None => CONTROL_SCRIPT.to_string(),
        };
        let script = self.prepare(&source)?;
        self.send_raw(&script)?;
        info!("Control script uploaded");
        Ok(())
    }

    /// Upload an arbitrary script, applying the same version filtering as
    /// the control script upload.
    pub fn send_script_text(&mut self, text: &str) -> Result<()> {
        let script = self.prepare(text)?;
        self.send_raw(&script)
    }

    pub fn send_script_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RtdeError::Config(format!("Failed to read script file {}: {}", path.display(), e))
        })?;
        self.send_script_text(&text)
    }

    fn send_raw(&mut self, script: &str) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| RtdeError::Connection("Script client not connected".to_string()))?;
        stream.write_all(script.as_bytes())?;
        stream.flush()?;
        Ok(())
    }

    fn prepare(&self, source: &str) -> Result<String> {
        let substituted = source.replace("{{REGISTER_OFFSET}}", &self.register_offset.to_string());
        self.filter_by_version(&substituted)
    }

    /// Resolve `$MN` markers: keep the line (marker stripped, indentation
    /// preserved) if the live controller version is at least M.N, delete
    /// the whole line otherwise. A line-leading `$` that does not form a
    /// valid marker aborts the upload.
    pub fn filter_by_version(&self, script: &str) -> Result<String> {
        let mut out = String::with_capacity(script.len());
        for line in script.lines() {
            if !line.trim_start().starts_with('$') {
                out.push_str(line);
                out.push('\n');
                continue;
            }
            let caps = self.version_marker.captures(line).ok_or_else(|| {
                RtdeError::Version(format!(
                    "Could not read the control version required by script line: {:?}",
                    line
                ))
            })?;
            let major: u32 = caps[2].parse().unwrap_or(0);
            let minor: u32 = caps[3].parse().unwrap_or(0);
            if self.controller_version.is_at_least(major, minor) {
                out.push_str(&caps[1]);
                out.push_str(&caps[4]);
                out.push('\n');
            }
        }
        Ok(out)
    }
}

impl Drop for ScriptClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
