//! Dashboard client for high-level robot control.
//!
//! The dashboard server speaks a line-oriented text protocol on port
//! 29999: one command per line, one reply line per command. The RTDE core
//! treats it as an external collaborator for power, brake, and program
//! control.

use crate::{Result, RtdeError};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;
use tracing::{debug, info};

/// Dashboard server port for Universal Robots.
pub const DASHBOARD_PORT: u16 = 29999;

const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the dashboard server.
pub struct DashboardClient {
    hostname: String,
    port: u16,
    stream: Option<TcpStream>,
}

impl DashboardClient {
    pub fn new(hostname: &str) -> Self {
        Self::with_port(hostname, DASHBOARD_PORT)
    }

    pub fn with_port(hostname: &str, port: u16) -> Self {
        Self {
            hostname: hostname.to_string(),
            port,
            stream: None,
        }
    }

    /// Connect and consume the greeting line the server sends on accept.
    pub fn connect(&mut self) -> Result<()> {
        let stream = TcpStream::connect((self.hostname.as_str(), self.port)).map_err(|e| {
            RtdeError::Connection(format!(
                "Failed to connect to dashboard {}:{}: {}",
                self.hostname, self.port, e
            ))
        })?;
        stream.set_read_timeout(Some(DEFAULT_REPLY_TIMEOUT))?;
        self.stream = Some(stream);

        let greeting = self.read_line()?;
        info!("Dashboard connected: {}", greeting);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!("Dashboard client disconnected");
        }
    }

    /// Send one command line and return the single reply line.
    pub fn send_command(&mut self, command: &str) -> Result<String> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| RtdeError::Connection("Dashboard not connected".to_string()))?;
        stream.write_all(format!("{}\n", command).as_bytes())?;
        let reply = self.read_line()?;
        debug!("Dashboard: {} -> {}", command, reply);
        Ok(reply)
    }

    fn read_line(&mut self) -> Result<String> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| RtdeError::Connection("Dashboard not connected".to_string()))?;

        let mut collected = Vec::new();
        let mut buffer = [0u8; 1];
        loop {
            match stream.read_exact(&mut buffer) {
                Ok(_) => {
                    if buffer[0] == b'\n' {
                        break;
                    }
                    collected.push(buffer[0]);
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
                {
                    return Err(RtdeError::Timeout(
                        "Dashboard reply timed out".to_string(),
                    ));
                }
                Err(e) => return Err(RtdeError::Io(e)),
            }
        }
        Ok(String::from_utf8_lossy(&collected).trim().to_string())
    }

    pub fn power_on(&mut self) -> Result<String> {
        self.send_command("power on")
    }

    pub fn power_off(&mut self) -> Result<String> {
        self.send_command("power off")
    }

    pub fn brake_release(&mut self) -> Result<String> {
        self.send_command("brake release")
    }

    /// Current robot mode string, e.g. `Robotmode: RUNNING`.
    pub fn robot_mode(&mut self) -> Result<String> {
        self.send_command("robotmode")
    }

    pub fn play(&mut self) -> Result<String> {
        self.send_command("play")
    }

    pub fn pause_program(&mut self) -> Result<String> {
        self.send_command("pause")
    }

    pub fn stop_program(&mut self) -> Result<String> {
        self.send_command("stop")
    }

    pub fn unlock_protective_stop(&mut self) -> Result<String> {
        self.send_command("unlock protective stop")
    }

    pub fn close_safety_popup(&mut self) -> Result<String> {
        self.send_command("close safety popup")
    }

    /// e-Series controllers refuse RTDE control unless in remote control.
    pub fn is_in_remote_control(&mut self) -> Result<bool> {
        let reply = self.send_command("is in remote control")?;
        Ok(reply.to_lowercase().contains("true"))
    }

    pub fn quit(&mut self) -> Result<()> {
        let _ = self.send_command("quit");
        self.disconnect();
        Ok(())
    }
}

impl Drop for DashboardClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
