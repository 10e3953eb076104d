//! RTDE session handling: socket lifecycle, protocol negotiation, recipe
//! setup, streaming control, and the background receive loop.
//!
//! Based on Universal Robots' RTDE specification. One session owns one
//! socket; a dedicated receive thread drains output frames into the shared
//! robot state while callers issue input frames through the session.

use crate::command::RobotCommand;
use crate::protocol::{self, ByteCursor, PackageType};
use crate::recipe::Recipe;
use crate::robot_state::SharedRobotState;
use crate::{Result, RtdeError};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// RTDE port on the controller.
pub const RTDE_PORT: u16 = 30004;

/// Last controller major version of the CB series. Anything above streams
/// at 500 Hz instead of 125 Hz.
pub const CB3_MAJOR_VERSION: u32 = 3;

const PREFERRED_PROTOCOL_VERSION: u16 = 2;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Controller software version as reported during session setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerVersion {
    pub major: u32,
    pub minor: u32,
    pub bugfix: u32,
    pub build: u32,
}

impl ControllerVersion {
    /// e-Series controllers stream at 500 Hz; CB-series at 125 Hz.
    pub fn is_e_series(&self) -> bool {
        self.major > CB3_MAJOR_VERSION
    }

    pub fn preferred_frequency(&self) -> f64 {
        if self.is_e_series() {
            500.0
        } else {
            125.0
        }
    }

    pub fn is_at_least(&self, major: u32, minor: u32) -> bool {
        self.major > major || (self.major == major && self.minor >= minor)
    }
}

impl std::fmt::Display for ControllerVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.bugfix, self.build
        )
    }
}

/// Session connection states. Transitions are driven by the caller; the
/// receive loop only observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Started,
    Paused,
}

/// One RTDE connection to the controller.
pub struct RtdeClient {
    hostname: String,
    port: u16,
    stream: Option<TcpStream>,
    state: ConnectionState,
    protocol_version: u16,
    output_recipe: Option<Recipe>,
    input_recipes: Vec<Recipe>,
}

impl RtdeClient {
    pub fn new(hostname: &str, port: u16) -> Self {
        Self {
            hostname: hostname.to_string(),
            port,
            stream: None,
            state: ConnectionState::Disconnected,
            protocol_version: 1,
            output_recipe: None,
            input_recipes: Vec::new(),
        }
    }

    /// Open the TCP connection with NODELAY and SO_REUSEADDR set.
    pub fn connect(&mut self) -> Result<()> {
        let address = self.resolve_address()?;
        let domain = if address.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nodelay(true)?;
        socket.set_reuse_address(true)?;
        socket
            .connect_timeout(&address.into(), CONNECT_TIMEOUT)
            .map_err(|e| {
                RtdeError::Connection(format!(
                    "Failed to connect to {}:{}: {}",
                    self.hostname, self.port, e
                ))
            })?;

        self.stream = Some(socket.into());
        self.state = ConnectionState::Connected;
        self.output_recipe = None;
        self.input_recipes.clear();
        info!("Connected to RTDE at {}:{}", self.hostname, self.port);
        Ok(())
    }

    fn resolve_address(&self) -> Result<SocketAddr> {
        (self.hostname.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| {
                RtdeError::Connection(format!("Failed to resolve {}: {}", self.hostname, e))
            })?
            .next()
            .ok_or_else(|| {
                RtdeError::Connection(format!("No address found for {}", self.hostname))
            })
    }

    /// Close the connection. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            debug!("RTDE socket disconnected");
        }
        self.state = ConnectionState::Disconnected;
    }

    pub fn is_connected(&self) -> bool {
        self.state != ConnectionState::Disconnected
    }

    pub fn is_started(&self) -> bool {
        self.state == ConnectionState::Started
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn protocol_version(&self) -> u16 {
        self.protocol_version
    }

    pub fn output_recipe(&self) -> Option<&Recipe> {
        self.output_recipe.as_ref()
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| RtdeError::Connection("Not connected".to_string()))
    }

    /// Duplicate handle to the socket for the receive thread. Reads go
    /// through the clone; writes stay with the session.
    pub fn try_clone_reader(&self) -> Result<TcpStream> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| RtdeError::Connection("Not connected".to_string()))?;
        Ok(stream.try_clone()?)
    }

    fn send_packet(&mut self, package_type: PackageType, payload: &[u8]) -> Result<()> {
        protocol::write_packet(self.stream_mut()?, package_type, payload)
    }

    fn read_packet(&mut self) -> Result<(PackageType, Vec<u8>)> {
        protocol::read_packet(self.stream_mut()?)
    }

    /// Read packets until the expected reply type arrives. Text messages
    /// are advisory and only logged; stale data packages from a previous
    /// start are skipped.
    fn read_reply(&mut self, expected: PackageType) -> Result<Vec<u8>> {
        loop {
            let (package_type, payload) = self.read_packet()?;
            if package_type == expected {
                return Ok(payload);
            }
            match package_type {
                PackageType::TextMessage => log_text_message(&payload),
                PackageType::DataPackage => debug!("Skipping data package while awaiting reply"),
                other => {
                    return Err(RtdeError::Protocol(format!(
                        "Unexpected {:?} packet while awaiting {:?}",
                        other, expected
                    )))
                }
            }
        }
    }

    /// Attempt protocol version 2; fall back to version 1 if the
    /// controller rejects it. Returns the pinned version.
    pub fn negotiate_protocol_version(&mut self) -> Result<u16> {
        let payload = PREFERRED_PROTOCOL_VERSION.to_be_bytes();
        self.send_packet(PackageType::RequestProtocolVersion, &payload)?;
        let reply = self.read_reply(PackageType::RequestProtocolVersion)?;

        if reply.first() == Some(&1) {
            self.protocol_version = PREFERRED_PROTOCOL_VERSION;
        } else {
            self.protocol_version = 1;
        }
        info!("RTDE protocol version {} negotiated", self.protocol_version);
        Ok(self.protocol_version)
    }

    /// Query the controller software version.
    pub fn controller_version(&mut self) -> Result<ControllerVersion> {
        self.send_packet(PackageType::GetControllerVersion, &[])?;
        let reply = self.read_reply(PackageType::GetControllerVersion)?;
        let mut cursor = ByteCursor::new(&reply);
        let version = ControllerVersion {
            major: cursor.read_u32()?,
            minor: cursor.read_u32()?,
            bugfix: cursor.read_u32()?,
            build: cursor.read_u32()?,
        };
        if version.major == 0 {
            return Err(RtdeError::Version(
                "Controller reported version 0.0; unable to determine capabilities".to_string(),
            ));
        }
        info!("Controller version {}", version);
        Ok(version)
    }

    /// Register the output recipe: the variables streamed back every tick.
    /// Exactly one output recipe exists per session.
    pub fn send_output_setup(&mut self, names: &[String], frequency: f64) -> Result<Recipe> {
        let mut payload = Vec::new();
        if self.protocol_version >= 2 {
            payload.extend_from_slice(&frequency.to_be_bytes());
        }
        payload.extend_from_slice(names.join(",").as_bytes());
        self.send_packet(PackageType::SetupOutputs, &payload)?;

        let reply = self.read_reply(PackageType::SetupOutputs)?;
        let recipe = Recipe::from_setup_reply(names, &reply)?;
        debug!(
            "Output recipe {} registered with {} variables at {} Hz",
            recipe.id,
            recipe.fields.len(),
            frequency
        );
        self.output_recipe = Some(recipe.clone());
        Ok(recipe)
    }

    /// Register one input recipe and return it with the controller-assigned
    /// id. Multiple input recipes coexist per session.
    pub fn send_input_setup(&mut self, names: &[String]) -> Result<Recipe> {
        let payload = names.join(",").into_bytes();
        self.send_packet(PackageType::SetupInputs, &payload)?;

        let reply = self.read_reply(PackageType::SetupInputs)?;
        let recipe = Recipe::from_setup_reply(names, &reply)?;
        debug!(
            "Input recipe {} registered with {} variables",
            recipe.id,
            recipe.fields.len()
        );
        self.input_recipes.push(recipe.clone());
        Ok(recipe)
    }

    /// Start output streaming.
    pub fn send_start(&mut self) -> Result<()> {
        self.send_packet(PackageType::Start, &[])?;
        let reply = self.read_reply(PackageType::Start)?;
        if reply.first() == Some(&1) {
            self.state = ConnectionState::Started;
            info!("RTDE synchronization started");
            Ok(())
        } else {
            Err(RtdeError::Protocol(
                "Controller rejected start of synchronization".to_string(),
            ))
        }
    }

    /// Pause output streaming.
    pub fn send_pause(&mut self) -> Result<()> {
        self.send_packet(PackageType::Pause, &[])?;
        let reply = self.read_reply(PackageType::Pause)?;
        if reply.first() == Some(&1) {
            self.state = ConnectionState::Paused;
            info!("RTDE synchronization paused");
            Ok(())
        } else {
            Err(RtdeError::Protocol(
                "Controller rejected pause of synchronization".to_string(),
            ))
        }
    }

    /// Send one command as an input data package against its recipe.
    pub fn send(&mut self, command: &RobotCommand, register_offset: u32) -> Result<()> {
        let recipe = self
            .input_recipes
            .iter()
            .find(|r| r.id == command.recipe_id())
            .cloned()
            .ok_or_else(|| {
                RtdeError::Protocol(format!("No input recipe with id {}", command.recipe_id()))
            })?;
        let payload = command.encode_payload(&recipe, register_offset)?;
        self.send_packet(PackageType::DataPackage, &payload)
    }

    /// Block until one output data package has been decoded into the
    /// shared state. Advisory text messages are logged and skipped.
    pub fn receive_data(&mut self, state: &SharedRobotState) -> Result<()> {
        let recipe = self
            .output_recipe
            .clone()
            .ok_or_else(|| RtdeError::Protocol("No output recipe configured".to_string()))?;
        loop {
            let (package_type, payload) = self.read_packet()?;
            match package_type {
                PackageType::DataPackage => {
                    decode_data_package(&recipe, &payload, state)?;
                    return Ok(());
                }
                PackageType::TextMessage => log_text_message(&payload),
                other => debug!("Ignoring {:?} packet while streaming", other),
            }
        }
    }
}

impl Drop for RtdeClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Decode one output data package into the shared snapshot.
pub(crate) fn decode_data_package(
    recipe: &Recipe,
    payload: &[u8],
    state: &SharedRobotState,
) -> Result<()> {
    let (id, data) = payload
        .split_first()
        .ok_or_else(|| RtdeError::Protocol("Empty data package".to_string()))?;
    if *id != recipe.id {
        return Err(RtdeError::Protocol(format!(
            "Data package for unknown recipe {} (expected {})",
            id, recipe.id
        )));
    }
    let values = recipe.decode(data)?;
    state.write().update(recipe, values);
    Ok(())
}

fn log_text_message(payload: &[u8]) {
    // v2 text messages carry a one-byte length followed by the message.
    let text = match payload.split_first() {
        Some((len, rest)) if (*len as usize) <= rest.len() => {
            String::from_utf8_lossy(&rest[..*len as usize]).into_owned()
        }
        Some((_, rest)) => String::from_utf8_lossy(rest).into_owned(),
        None => return,
    };
    if !text.is_empty() {
        warn!("Controller message: {}", text);
    }
}

/// Background reader that populates the robot state at controller rate.
///
/// The thread observes only a snapshot handle and a stop flag; the session
/// keeps ownership of the worker handle and stops it before closing the
/// socket.
pub(crate) struct ReceiveThread {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<RtdeError>>>,
}

impl ReceiveThread {
    pub fn spawn(mut reader: TcpStream, recipe: Recipe, state: SharedRobotState) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let connected = Arc::new(AtomicBool::new(true));
        let last_error = Arc::new(Mutex::new(None));

        let thread_stop = Arc::clone(&stop);
        let thread_connected = Arc::clone(&connected);
        let thread_error = Arc::clone(&last_error);

        let handle = std::thread::Builder::new()
            .name("rtde-receive".to_string())
            .spawn(move || {
                while !thread_stop.load(Ordering::Relaxed) {
                    match protocol::read_packet(&mut reader) {
                        Ok((PackageType::DataPackage, payload)) => {
                            if let Err(e) = decode_data_package(&recipe, &payload, &state) {
                                error!("Receive loop: {}", e);
                                *thread_error.lock() = Some(e);
                                thread_connected.store(false, Ordering::Relaxed);
                                break;
                            }
                        }
                        Ok((PackageType::TextMessage, payload)) => log_text_message(&payload),
                        Ok((other, _)) => {
                            debug!("Receive loop ignoring {:?} packet", other);
                        }
                        Err(e) => {
                            if !thread_stop.load(Ordering::Relaxed) {
                                error!("Receive loop: {}", e);
                                *thread_error.lock() = Some(e);
                                thread_connected.store(false, Ordering::Relaxed);
                            }
                            break;
                        }
                    }
                }
            })?;

        Ok(Self {
            handle: Some(handle),
            stop,
            connected,
            last_error,
        })
    }

    /// True while the loop is still draining frames without error.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// The error that terminated the loop, if any.
    pub fn take_error(&self) -> Option<RtdeError> {
        self.last_error.lock().take()
    }

    /// Request a cooperative stop. The blocking read is released by the
    /// session shutting the socket down.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ReceiveThread {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
