//! Telemetry interface: a dedicated session streaming robot state.
//!
//! Subscribes an output recipe (by default every commonly used variable),
//! keeps a background thread decoding frames into the shared snapshot, and
//! exposes typed getters over the latest frame. Getters return zeroed
//! values until the first frame lands; construction waits for it.

use crate::robot_state::{
    shared_robot_state, RobotState, RobotStatusBit, SafetyStatusBit, SharedRobotState,
};
use crate::rtde::{ReceiveThread, RtdeClient, RTDE_PORT};
use crate::{Result, RtdeError};
use parking_lot::{Mutex, RwLockReadGuard};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

const FIRST_STATE_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Variables subscribed when no explicit list is given.
pub const DEFAULT_VARIABLES: &[&str] = &[
    "timestamp",
    "target_q",
    "target_qd",
    "target_qdd",
    "target_current",
    "target_moment",
    "actual_q",
    "actual_qd",
    "actual_current",
    "joint_control_output",
    "actual_TCP_pose",
    "actual_TCP_speed",
    "actual_TCP_force",
    "target_TCP_pose",
    "target_TCP_speed",
    "actual_digital_input_bits",
    "joint_temperatures",
    "actual_execution_time",
    "robot_mode",
    "joint_mode",
    "safety_mode",
    "actual_tool_accelerometer",
    "speed_scaling",
    "target_speed_fraction",
    "actual_momentum",
    "actual_main_voltage",
    "actual_robot_voltage",
    "actual_robot_current",
    "actual_joint_voltage",
    "actual_digital_output_bits",
    "runtime_state",
    "standard_analog_input0",
    "standard_analog_input1",
    "standard_analog_output0",
    "standard_analog_output1",
    "robot_status_bits",
    "safety_status_bits",
    "output_int_register_0",
    "output_int_register_1",
    "output_int_register_2",
    "output_int_register_3",
    "output_int_register_4",
    "output_int_register_5",
    "output_int_register_6",
    "output_int_register_7",
    "output_double_register_0",
    "output_double_register_1",
    "output_double_register_2",
    "output_double_register_3",
    "output_double_register_4",
    "output_double_register_5",
    "output_double_register_6",
    "output_double_register_7",
];

/// Read access to streamed robot state.
pub struct RtdeReceiveInterface {
    hostname: String,
    port: u16,
    variables: Vec<String>,
    frequency_override: Option<f64>,
    frequency: f64,
    rtde: Mutex<RtdeClient>,
    robot_state: SharedRobotState,
    receive_thread: Mutex<Option<ReceiveThread>>,
}

impl RtdeReceiveInterface {
    /// Connect and subscribe the default variable set at the controller's
    /// native frequency.
    pub fn new(hostname: &str) -> Result<Self> {
        Self::with_variables(hostname, RTDE_PORT, &[], None)
    }

    /// Connect and subscribe a custom variable set. An empty list selects
    /// the defaults; `frequency` of `None` selects the controller's
    /// native rate.
    pub fn with_variables(
        hostname: &str,
        port: u16,
        variables: &[&str],
        frequency: Option<f64>,
    ) -> Result<Self> {
        let variables: Vec<String> = if variables.is_empty() {
            DEFAULT_VARIABLES.iter().map(|s| s.to_string()).collect()
        } else {
            variables.iter().map(|s| s.to_string()).collect()
        };

        let mut rtde = RtdeClient::new(hostname, port);
        let robot_state = shared_robot_state();
        let (actual_frequency, receive_thread) =
            start_session(&mut rtde, &variables, frequency, &robot_state)?;

        let interface = Self {
            hostname: hostname.to_string(),
            port,
            variables,
            frequency_override: frequency,
            frequency: actual_frequency,
            rtde: Mutex::new(rtde),
            robot_state,
            receive_thread: Mutex::new(Some(receive_thread)),
        };
        interface.wait_for_first_state(FIRST_STATE_TIMEOUT)?;
        info!(
            "Receive interface streaming {} variables at {} Hz",
            interface.variables.len(),
            interface.frequency
        );
        Ok(interface)
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn is_connected(&self) -> bool {
        let session = self.rtde.lock().is_connected();
        let streaming = self
            .receive_thread
            .lock()
            .as_ref()
            .map(|t| t.is_connected())
            .unwrap_or(false);
        session && streaming
    }

    /// The error that terminated the receive loop, if any.
    pub fn take_receive_error(&self) -> Option<RtdeError> {
        self.receive_thread
            .lock()
            .as_ref()
            .and_then(|t| t.take_error())
    }

    pub fn disconnect(&self) {
        let mut thread_guard = self.receive_thread.lock();
        if let Some(thread) = thread_guard.as_ref() {
            thread.stop();
        }
        self.rtde.lock().disconnect();
        if let Some(mut thread) = thread_guard.take() {
            thread.join();
        }
    }

    /// Re-establish the session and resume streaming after a transport
    /// failure.
    pub fn reconnect(&self) -> Result<()> {
        info!("Reconnecting receive interface to {}:{}", self.hostname, self.port);
        let mut thread_guard = self.receive_thread.lock();
        if let Some(thread) = thread_guard.as_ref() {
            thread.stop();
        }
        let mut rtde = self.rtde.lock();
        rtde.disconnect();
        if let Some(mut thread) = thread_guard.take() {
            thread.join();
        }
        *self.robot_state.write() = RobotState::new();

        let (_, receive_thread) = start_session(
            &mut rtde,
            &self.variables,
            self.frequency_override,
            &self.robot_state,
        )?;
        *thread_guard = Some(receive_thread);
        drop(rtde);
        drop(thread_guard);

        self.wait_for_first_state(FIRST_STATE_TIMEOUT)
    }

    /// Block until the receive loop has applied at least one frame.
    pub fn wait_for_first_state(&self, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        loop {
            if self.robot_state.read().first_state_received() {
                return Ok(());
            }
            if !self.is_connected() {
                return Err(RtdeError::Connection(
                    "Receive stream lost before the first frame".to_string(),
                ));
            }
            if start.elapsed() >= timeout {
                return Err(RtdeError::Timeout(
                    "No robot state received".to_string(),
                ));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn state(&self) -> RwLockReadGuard<'_, RobotState> {
        self.robot_state.read()
    }

    // ----- typed getters over the latest frame -----

    /// Controller timestamp in seconds since power-on.
    pub fn timestamp(&self) -> f64 {
        self.state().double("timestamp").unwrap_or(0.0)
    }

    pub fn target_q(&self) -> [f64; 6] {
        self.state().vector6d("target_q").unwrap_or([0.0; 6])
    }

    pub fn target_qd(&self) -> [f64; 6] {
        self.state().vector6d("target_qd").unwrap_or([0.0; 6])
    }

    pub fn target_qdd(&self) -> [f64; 6] {
        self.state().vector6d("target_qdd").unwrap_or([0.0; 6])
    }

    pub fn target_current(&self) -> [f64; 6] {
        self.state().vector6d("target_current").unwrap_or([0.0; 6])
    }

    pub fn target_moment(&self) -> [f64; 6] {
        self.state().vector6d("target_moment").unwrap_or([0.0; 6])
    }

    /// Actual joint positions in radians.
    pub fn actual_q(&self) -> [f64; 6] {
        self.state().vector6d("actual_q").unwrap_or([0.0; 6])
    }

    pub fn actual_qd(&self) -> [f64; 6] {
        self.state().vector6d("actual_qd").unwrap_or([0.0; 6])
    }

    pub fn actual_current(&self) -> [f64; 6] {
        self.state().vector6d("actual_current").unwrap_or([0.0; 6])
    }

    pub fn joint_control_output(&self) -> [f64; 6] {
        self.state()
            .vector6d("joint_control_output")
            .unwrap_or([0.0; 6])
    }

    /// Actual TCP pose: position in meters, rotation as a rotation
    /// vector.
    pub fn actual_tcp_pose(&self) -> [f64; 6] {
        self.state().vector6d("actual_TCP_pose").unwrap_or([0.0; 6])
    }

    pub fn actual_tcp_speed(&self) -> [f64; 6] {
        self.state().vector6d("actual_TCP_speed").unwrap_or([0.0; 6])
    }

    pub fn actual_tcp_force(&self) -> [f64; 6] {
        self.state().vector6d("actual_TCP_force").unwrap_or([0.0; 6])
    }

    pub fn target_tcp_pose(&self) -> [f64; 6] {
        self.state().vector6d("target_TCP_pose").unwrap_or([0.0; 6])
    }

    pub fn target_tcp_speed(&self) -> [f64; 6] {
        self.state().vector6d("target_TCP_speed").unwrap_or([0.0; 6])
    }

    pub fn actual_digital_input_bits(&self) -> u64 {
        self.state()
            .uint64("actual_digital_input_bits")
            .unwrap_or(0)
    }

    pub fn joint_temperatures(&self) -> [f64; 6] {
        self.state()
            .vector6d("joint_temperatures")
            .unwrap_or([0.0; 6])
    }

    pub fn actual_execution_time(&self) -> f64 {
        self.state().double("actual_execution_time").unwrap_or(0.0)
    }

    pub fn robot_mode(&self) -> i32 {
        self.state().int32("robot_mode").unwrap_or(-1)
    }

    pub fn joint_mode(&self) -> [i32; 6] {
        self.state().vector6_i32("joint_mode").unwrap_or([0; 6])
    }

    pub fn safety_mode(&self) -> i32 {
        self.state().int32("safety_mode").unwrap_or(-1)
    }

    pub fn actual_tool_accelerometer(&self) -> [f64; 3] {
        self.state()
            .vector3d("actual_tool_accelerometer")
            .unwrap_or([0.0; 3])
    }

    pub fn speed_scaling(&self) -> f64 {
        self.state().double("speed_scaling").unwrap_or(0.0)
    }

    pub fn target_speed_fraction(&self) -> f64 {
        self.state().double("target_speed_fraction").unwrap_or(0.0)
    }

    pub fn actual_momentum(&self) -> f64 {
        self.state().double("actual_momentum").unwrap_or(0.0)
    }

    pub fn actual_main_voltage(&self) -> f64 {
        self.state().double("actual_main_voltage").unwrap_or(0.0)
    }

    pub fn actual_robot_voltage(&self) -> f64 {
        self.state().double("actual_robot_voltage").unwrap_or(0.0)
    }

    pub fn actual_robot_current(&self) -> f64 {
        self.state().double("actual_robot_current").unwrap_or(0.0)
    }

    pub fn actual_joint_voltage(&self) -> [f64; 6] {
        self.state()
            .vector6d("actual_joint_voltage")
            .unwrap_or([0.0; 6])
    }

    pub fn actual_digital_output_bits(&self) -> u64 {
        self.state()
            .uint64("actual_digital_output_bits")
            .unwrap_or(0)
    }

    /// State of a single digital output.
    pub fn digital_out_state(&self, output_id: u8) -> bool {
        self.actual_digital_output_bits() & (1 << output_id) != 0
    }

    pub fn runtime_state(&self) -> u32 {
        self.state().uint32("runtime_state").unwrap_or(0)
    }

    pub fn standard_analog_input_0(&self) -> f64 {
        self.state().double("standard_analog_input0").unwrap_or(0.0)
    }

    pub fn standard_analog_input_1(&self) -> f64 {
        self.state().double("standard_analog_input1").unwrap_or(0.0)
    }

    pub fn standard_analog_output_0(&self) -> f64 {
        self.state().double("standard_analog_output0").unwrap_or(0.0)
    }

    pub fn standard_analog_output_1(&self) -> f64 {
        self.state().double("standard_analog_output1").unwrap_or(0.0)
    }

    pub fn robot_status_bits(&self) -> u32 {
        self.state().uint32("robot_status_bits").unwrap_or(0)
    }

    pub fn safety_status_bits(&self) -> u32 {
        self.state().uint32("safety_status_bits").unwrap_or(0)
    }

    pub fn output_int_register(&self, register: u32) -> i32 {
        self.state().output_int_register(register).unwrap_or(0)
    }

    pub fn output_double_register(&self, register: u32) -> f64 {
        self.state().output_double_register(register).unwrap_or(0.0)
    }

    /// Progress of the control interface's asynchronous operation, read
    /// from `output_int_register_1`: -1 when idle, otherwise the index of
    /// the waypoint in progress. Valid when the control interface uses
    /// the default register window.
    pub fn async_operation_progress(&self) -> i32 {
        self.state().output_int_register(1).unwrap_or(-1)
    }

    pub fn is_program_running(&self) -> bool {
        self.state()
            .robot_status_bit(RobotStatusBit::ProgramRunning)
            .unwrap_or(false)
    }

    pub fn is_protective_stopped(&self) -> bool {
        self.state()
            .safety_status_bit(SafetyStatusBit::ProtectiveStopped)
            .unwrap_or(false)
    }

    pub fn is_emergency_stopped(&self) -> bool {
        let state = self.state();
        [
            SafetyStatusBit::SystemEmergencyStopped,
            SafetyStatusBit::RobotEmergencyStopped,
            SafetyStatusBit::EmergencyStopped,
        ]
        .iter()
        .any(|bit| state.safety_status_bit(*bit).unwrap_or(false))
    }
}

impl Drop for RtdeReceiveInterface {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn start_session(
    rtde: &mut RtdeClient,
    variables: &[String],
    frequency: Option<f64>,
    robot_state: &SharedRobotState,
) -> Result<(f64, ReceiveThread)> {
    rtde.connect()?;
    rtde.negotiate_protocol_version()?;
    let version = rtde.controller_version()?;
    let frequency = frequency.unwrap_or_else(|| version.preferred_frequency());

    let output_recipe = rtde.send_output_setup(variables, frequency)?;
    rtde.send_start()?;
    let reader = rtde.try_clone_reader()?;
    let thread = ReceiveThread::spawn(reader, output_recipe, Arc::clone(robot_state))?;
    Ok((frequency, thread))
}
