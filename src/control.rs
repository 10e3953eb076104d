//! Command channel to the robot controller.
//!
//! Commands travel through an RTDE register mailbox: the client writes a
//! command code plus payload into input registers, the control script on
//! the controller executes the request and acknowledges through output
//! registers, observed here via the streamed snapshot. One receive thread
//! keeps the snapshot fresh; callers poll it while awaiting completion.

use crate::command::{CommandCode, RobotCommand};
use crate::config::ClientConfig;
use crate::path::{MoveType, Path};
use crate::recipe::Recipe;
use crate::robot_state::{
    shared_robot_state, RobotState, RobotStatusBit, SafetyStatusBit, SharedRobotState,
};
use crate::rtde::{ControllerVersion, ReceiveThread, RtdeClient, RTDE_PORT};
use crate::script::{ScriptClient, SCRIPT_PORT};
use crate::{Result, RtdeError};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Value of the done-flag register while the control script awaits a command.
pub const UR_CONTROLLER_RDY_FOR_CMD: i32 = 1;
/// Value of the done-flag register once a command has completed.
pub const UR_CONTROLLER_DONE_WITH_CMD: i32 = 2;

const EXECUTION_TIMEOUT: Duration = Duration::from_secs(300);
const PATH_EXECUTION_TIMEOUT: Duration = Duration::from_secs(600);
const GET_READY_TIMEOUT: Duration = Duration::from_secs(5);
const WAIT_FOR_PROGRAM_RUNNING_TIMEOUT: Duration = Duration::from_secs(60);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(2);

pub const UR_JOINT_VELOCITY_MIN: f64 = 0.0;
pub const UR_JOINT_VELOCITY_MAX: f64 = 3.14;
pub const UR_JOINT_ACCELERATION_MIN: f64 = 0.0;
pub const UR_JOINT_ACCELERATION_MAX: f64 = 40.0;
pub const UR_TOOL_VELOCITY_MIN: f64 = 0.0;
pub const UR_TOOL_VELOCITY_MAX: f64 = 3.0;
pub const UR_TOOL_ACCELERATION_MIN: f64 = 0.0;
pub const UR_TOOL_ACCELERATION_MAX: f64 = 150.0;
pub const UR_SERVO_LOOKAHEAD_TIME_MIN: f64 = 0.03;
pub const UR_SERVO_LOOKAHEAD_TIME_MAX: f64 = 0.2;
pub const UR_SERVO_GAIN_MIN: f64 = 100.0;
pub const UR_SERVO_GAIN_MAX: f64 = 2000.0;
pub const UR_BLEND_MIN: f64 = 0.0;
pub const UR_BLEND_MAX: f64 = 2.0;

/// Frame of reference for jogging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Feature {
    Base = 0,
    Tool = 1,
}

/// Construction options for [`RtdeControlInterface`].
#[derive(Debug, Clone)]
pub struct ControlOptions {
    /// Upload the control script at session start.
    pub upload_script: bool,
    /// Use registers 24..47 instead of 0..23, to coexist with another
    /// program occupying the default window.
    pub use_upper_range_registers: bool,
    /// Streaming frequency override.
    pub frequency: Option<f64>,
    /// Control script file overriding the embedded one.
    pub custom_script_file: Option<PathBuf>,
    pub rtde_port: u16,
    pub script_port: u16,
}

impl Default for ControlOptions {
    fn default() -> Self {
        Self {
            upload_script: true,
            use_upper_range_registers: false,
            frequency: None,
            custom_script_file: None,
            rtde_port: RTDE_PORT,
            script_port: SCRIPT_PORT,
        }
    }
}

/// Controller-assigned ids of the input recipes the command channel
/// registers at setup, one per command class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CommandRecipes {
    no_cmd: u8,
    movement: u8,
    servo: u8,
    speed: u8,
    force: u8,
    misc: u8,
    pose_pair: u8,
}

/// Motion, configuration, and kinematics commands executed through the
/// control script's register mailbox.
pub struct RtdeControlInterface {
    hostname: String,
    options: ControlOptions,
    register_offset: u32,
    frequency: f64,
    delta_time: f64,
    controller_version: ControllerVersion,
    rtde: Mutex<RtdeClient>,
    robot_state: SharedRobotState,
    receive_thread: Mutex<Option<ReceiveThread>>,
    script_client: Mutex<ScriptClient>,
    recipes: CommandRecipes,
    custom_script_running: AtomicBool,
}

impl RtdeControlInterface {
    pub fn new(hostname: &str) -> Result<Self> {
        Self::with_options(hostname, ControlOptions::default())
    }

    pub fn new_with_config(config: &ClientConfig) -> Result<Self> {
        let options = ControlOptions {
            upload_script: config.upload_script(),
            use_upper_range_registers: config.use_upper_range_registers(),
            frequency: config.frequency,
            custom_script_file: config.custom_script_file.clone().map(PathBuf::from),
            rtde_port: config.rtde_port(),
            script_port: config.script_port(),
        };
        Self::with_options(&config.host, options)
    }

    pub fn with_options(hostname: &str, options: ControlOptions) -> Result<Self> {
        let register_offset = if options.use_upper_range_registers { 24 } else { 0 };

        let mut rtde = RtdeClient::new(hostname, options.rtde_port);
        rtde.connect()?;
        rtde.negotiate_protocol_version()?;
        let controller_version = rtde.controller_version()?;
        let frequency = options
            .frequency
            .unwrap_or_else(|| controller_version.preferred_frequency());
        let delta_time = 1.0 / frequency;

        let (recipes, output_recipe) = setup_recipes(&mut rtde, register_offset, frequency)?;
        let robot_state = shared_robot_state();
        rtde.send_start()?;
        let reader = rtde.try_clone_reader()?;
        let receive_thread =
            ReceiveThread::spawn(reader, output_recipe, Arc::clone(&robot_state))?;

        let mut script_client = ScriptClient::new(
            hostname,
            options.script_port,
            controller_version,
            register_offset,
        )?;
        if let Some(path) = &options.custom_script_file {
            script_client.set_script_file(Some(path.clone()));
        }
        script_client.connect()?;

        let interface = Self {
            hostname: hostname.to_string(),
            options,
            register_offset,
            frequency,
            delta_time,
            controller_version,
            rtde: Mutex::new(rtde),
            robot_state,
            receive_thread: Mutex::new(Some(receive_thread)),
            script_client: Mutex::new(script_client),
            recipes,
            custom_script_running: AtomicBool::new(false),
        };

        if interface.options.upload_script {
            interface.script_client.lock().send_control_script()?;
            interface.wait_for_program_running(WAIT_FOR_PROGRAM_RUNNING_TIMEOUT)?;
            interface.wait_until_ready(GET_READY_TIMEOUT)?;
        }
        Ok(interface)
    }

    pub fn controller_version(&self) -> ControllerVersion {
        self.controller_version
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn register_offset(&self) -> u32 {
        self.register_offset
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

    /// Close the session. The receive worker is stopped before the socket
    /// goes down.
    pub fn disconnect(&self) {
        let mut thread_guard = self.receive_thread.lock();
        if let Some(thread) = thread_guard.as_ref() {
            thread.stop();
        }
        self.rtde.lock().disconnect();
        if let Some(mut thread) = thread_guard.take() {
            thread.join();
        }
        self.script_client.lock().disconnect();
    }

    /// Re-establish the session after a lost connection: reconnect the
    /// socket, negotiate and set up recipes again, restart streaming and
    /// the receive worker, and re-upload the control script.
    pub fn reconnect(&self) -> Result<()> {
        info!("Reconnecting control interface to {}", self.hostname);
        {
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

            rtde.connect()?;
            rtde.negotiate_protocol_version()?;
            rtde.controller_version()?;
            let (recipes, output_recipe) =
                setup_recipes(&mut rtde, self.register_offset, self.frequency)?;
            if recipes != self.recipes {
                return Err(RtdeError::Protocol(
                    "Controller assigned unexpected recipe ids on reconnect".to_string(),
                ));
            }
            rtde.send_start()?;
            let reader = rtde.try_clone_reader()?;
            *thread_guard = Some(ReceiveThread::spawn(
                reader,
                output_recipe,
                Arc::clone(&self.robot_state),
            )?);
        }

        {
            let mut script = self.script_client.lock();
            script.disconnect();
            script.connect()?;
        }
        self.custom_script_running.store(false, Ordering::Relaxed);

        if self.options.upload_script {
            self.script_client.lock().send_control_script()?;
            self.wait_for_program_running(WAIT_FOR_PROGRAM_RUNNING_TIMEOUT)?;
            self.wait_until_ready(GET_READY_TIMEOUT)?;
        }
        Ok(())
    }

    // ----- motion commands -----

    /// Move to joint positions, linear in joint space. An asynchronous
    /// move returns once the control script has started it; stop with
    /// [`stop_j`](Self::stop_j) or [`stop_l`](Self::stop_l).
    pub fn move_j(
        &self,
        q: &[f64; 6],
        speed: f64,
        acceleration: f64,
        asynchronous: bool,
    ) -> Result<()> {
        verify_vector_finite(q, "joint positions")?;
        verify_value_is_within(speed, UR_JOINT_VELOCITY_MIN, UR_JOINT_VELOCITY_MAX, "joint speed")?;
        verify_value_is_within(
            acceleration,
            UR_JOINT_ACCELERATION_MIN,
            UR_JOINT_ACCELERATION_MAX,
            "joint acceleration",
        )?;
        let mut cmd = RobotCommand::new(CommandCode::MoveJ, self.recipes.movement);
        cmd.set_int(1, asynchronous as i32);
        cmd.set_doubles(0, q);
        cmd.set_double(6, speed);
        cmd.set_double(7, acceleration);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)
    }

    /// Move to a pose, linear in tool space.
    pub fn move_l(
        &self,
        pose: &[f64; 6],
        speed: f64,
        acceleration: f64,
        asynchronous: bool,
    ) -> Result<()> {
        verify_vector_finite(pose, "target pose")?;
        verify_value_is_within(speed, UR_TOOL_VELOCITY_MIN, UR_TOOL_VELOCITY_MAX, "tool speed")?;
        verify_value_is_within(
            acceleration,
            UR_TOOL_ACCELERATION_MIN,
            UR_TOOL_ACCELERATION_MAX,
            "tool acceleration",
        )?;
        let mut cmd = RobotCommand::new(CommandCode::MoveL, self.recipes.movement);
        cmd.set_int(1, asynchronous as i32);
        cmd.set_doubles(0, pose);
        cmd.set_double(6, speed);
        cmd.set_double(7, acceleration);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)
    }

    /// Move to a pose, linear in joint space (target solved through the
    /// controller's inverse kinematics).
    pub fn move_j_ik(
        &self,
        pose: &[f64; 6],
        speed: f64,
        acceleration: f64,
        asynchronous: bool,
    ) -> Result<()> {
        verify_vector_finite(pose, "target pose")?;
        verify_value_is_within(speed, UR_JOINT_VELOCITY_MIN, UR_JOINT_VELOCITY_MAX, "joint speed")?;
        verify_value_is_within(
            acceleration,
            UR_JOINT_ACCELERATION_MIN,
            UR_JOINT_ACCELERATION_MAX,
            "joint acceleration",
        )?;
        let mut cmd = RobotCommand::new(CommandCode::MoveJIk, self.recipes.movement);
        cmd.set_int(1, asynchronous as i32);
        cmd.set_doubles(0, pose);
        cmd.set_double(6, speed);
        cmd.set_double(7, acceleration);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)
    }

    /// Move to joint positions, linear in tool space (target solved
    /// through the controller's forward kinematics).
    pub fn move_l_fk(
        &self,
        q: &[f64; 6],
        speed: f64,
        acceleration: f64,
        asynchronous: bool,
    ) -> Result<()> {
        verify_vector_finite(q, "joint positions")?;
        verify_value_is_within(speed, UR_TOOL_VELOCITY_MIN, UR_TOOL_VELOCITY_MAX, "tool speed")?;
        verify_value_is_within(
            acceleration,
            UR_TOOL_ACCELERATION_MIN,
            UR_TOOL_ACCELERATION_MAX,
            "tool acceleration",
        )?;
        let mut cmd = RobotCommand::new(CommandCode::MoveLFk, self.recipes.movement);
        cmd.set_int(1, asynchronous as i32);
        cmd.set_doubles(0, q);
        cmd.set_double(6, speed);
        cmd.set_double(7, acceleration);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)
    }

    /// Blend circular and move linear at constant tool speed.
    pub fn move_p(&self, pose: &[f64; 6], speed: f64, acceleration: f64, blend: f64) -> Result<()> {
        verify_vector_finite(pose, "target pose")?;
        verify_value_is_within(speed, UR_TOOL_VELOCITY_MIN, UR_TOOL_VELOCITY_MAX, "tool speed")?;
        verify_value_is_within(
            acceleration,
            UR_TOOL_ACCELERATION_MIN,
            UR_TOOL_ACCELERATION_MAX,
            "tool acceleration",
        )?;
        verify_value_is_within(blend, UR_BLEND_MIN, UR_BLEND_MAX, "blend radius")?;
        let mut cmd = RobotCommand::new(CommandCode::MoveP, self.recipes.movement);
        cmd.set_doubles(0, pose);
        cmd.set_double(6, speed);
        cmd.set_double(7, acceleration);
        cmd.set_double(8, blend);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)
    }

    /// Move circular through a via pose to a target pose. `mode` 0
    /// interpolates orientation to the target, 1 keeps it constant
    /// relative to the arc tangent.
    pub fn move_c(
        &self,
        pose_via: &[f64; 6],
        pose_to: &[f64; 6],
        speed: f64,
        acceleration: f64,
        blend: f64,
        mode: i32,
    ) -> Result<()> {
        verify_vector_finite(pose_via, "via pose")?;
        verify_vector_finite(pose_to, "target pose")?;
        verify_value_is_within(speed, UR_TOOL_VELOCITY_MIN, UR_TOOL_VELOCITY_MAX, "tool speed")?;
        verify_value_is_within(
            acceleration,
            UR_TOOL_ACCELERATION_MIN,
            UR_TOOL_ACCELERATION_MAX,
            "tool acceleration",
        )?;
        verify_value_is_within(blend, UR_BLEND_MIN, UR_BLEND_MAX, "blend radius")?;
        if !(0..=1).contains(&mode) {
            return Err(RtdeError::Validation(format!(
                "moveC mode must be 0 or 1, got {}",
                mode
            )));
        }
        let mut cmd = RobotCommand::new(CommandCode::MoveC, self.recipes.pose_pair);
        cmd.set_int(1, mode);
        cmd.set_doubles(0, pose_via);
        cmd.set_doubles(6, pose_to);
        cmd.set_double(12, speed);
        cmd.set_double(13, acceleration);
        cmd.set_double(14, blend);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)
    }

    /// Servo to joint positions. Blocks for `time` seconds on the
    /// controller; meant to be re-issued every control cycle.
    pub fn servo_j(
        &self,
        q: &[f64; 6],
        speed: f64,
        acceleration: f64,
        time: f64,
        lookahead_time: f64,
        gain: f64,
    ) -> Result<()> {
        verify_vector_finite(q, "joint positions")?;
        verify_value_is_within(
            lookahead_time,
            UR_SERVO_LOOKAHEAD_TIME_MIN,
            UR_SERVO_LOOKAHEAD_TIME_MAX,
            "servo lookahead time",
        )?;
        verify_value_is_within(gain, UR_SERVO_GAIN_MIN, UR_SERVO_GAIN_MAX, "servo gain")?;
        verify_vector_finite(&[speed, acceleration, time], "servo parameters")?;
        let mut cmd = RobotCommand::new(CommandCode::ServoJ, self.recipes.servo);
        cmd.set_doubles(0, q);
        cmd.set_double(6, speed);
        cmd.set_double(7, acceleration);
        cmd.set_double(8, time);
        cmd.set_double(9, lookahead_time);
        cmd.set_double(10, gain);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)
    }

    /// Servo to a pose, linear in tool space.
    pub fn servo_l(
        &self,
        pose: &[f64; 6],
        speed: f64,
        acceleration: f64,
        time: f64,
        lookahead_time: f64,
        gain: f64,
    ) -> Result<()> {
        verify_vector_finite(pose, "target pose")?;
        verify_value_is_within(
            lookahead_time,
            UR_SERVO_LOOKAHEAD_TIME_MIN,
            UR_SERVO_LOOKAHEAD_TIME_MAX,
            "servo lookahead time",
        )?;
        verify_value_is_within(gain, UR_SERVO_GAIN_MIN, UR_SERVO_GAIN_MAX, "servo gain")?;
        verify_vector_finite(&[speed, acceleration, time], "servo parameters")?;
        let mut cmd = RobotCommand::new(CommandCode::ServoL, self.recipes.servo);
        cmd.set_doubles(0, pose);
        cmd.set_double(6, speed);
        cmd.set_double(7, acceleration);
        cmd.set_double(8, time);
        cmd.set_double(9, lookahead_time);
        cmd.set_double(10, gain);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)
    }

    /// Servo circular to a pose at constant tool speed.
    pub fn servo_c(&self, pose: &[f64; 6], speed: f64, acceleration: f64, blend: f64) -> Result<()> {
        verify_vector_finite(pose, "target pose")?;
        verify_value_is_within(speed, UR_TOOL_VELOCITY_MIN, UR_TOOL_VELOCITY_MAX, "tool speed")?;
        verify_value_is_within(
            acceleration,
            UR_TOOL_ACCELERATION_MIN,
            UR_TOOL_ACCELERATION_MAX,
            "tool acceleration",
        )?;
        verify_value_is_within(blend, UR_BLEND_MIN, UR_BLEND_MAX, "blend radius")?;
        let mut cmd = RobotCommand::new(CommandCode::ServoC, self.recipes.movement);
        cmd.set_doubles(0, pose);
        cmd.set_double(6, speed);
        cmd.set_double(7, acceleration);
        cmd.set_double(8, blend);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)
    }

    /// Accelerate linearly in joint space and continue at constant joint
    /// speed until stopped or `time` expires.
    pub fn speed_j(&self, qd: &[f64; 6], acceleration: f64, time: f64) -> Result<()> {
        verify_vector_finite(qd, "joint speeds")?;
        verify_value_is_within(
            acceleration,
            UR_JOINT_ACCELERATION_MIN,
            UR_JOINT_ACCELERATION_MAX,
            "joint acceleration",
        )?;
        verify_vector_finite(&[time], "time")?;
        let mut cmd = RobotCommand::new(CommandCode::SpeedJ, self.recipes.speed);
        cmd.set_doubles(0, qd);
        cmd.set_double(6, acceleration);
        cmd.set_double(7, time);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)
    }

    /// Accelerate linearly in Cartesian space and continue at constant
    /// tool speed.
    pub fn speed_l(&self, xd: &[f64; 6], acceleration: f64, time: f64) -> Result<()> {
        verify_vector_finite(xd, "tool speed")?;
        verify_value_is_within(
            acceleration,
            UR_TOOL_ACCELERATION_MIN,
            UR_TOOL_ACCELERATION_MAX,
            "tool acceleration",
        )?;
        verify_vector_finite(&[time], "time")?;
        let mut cmd = RobotCommand::new(CommandCode::SpeedL, self.recipes.speed);
        cmd.set_doubles(0, xd);
        cmd.set_double(6, acceleration);
        cmd.set_double(7, time);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)
    }

    /// Stop servo motion.
    pub fn servo_stop(&self) -> Result<()> {
        self.simple_command(CommandCode::ServoStop)
    }

    /// Stop speed motion.
    pub fn speed_stop(&self) -> Result<()> {
        self.simple_command(CommandCode::SpeedStop)
    }

    /// Decelerate tool speed to zero, linear in tool space.
    pub fn stop_l(&self, deceleration: f64) -> Result<()> {
        verify_value_is_within(
            deceleration,
            UR_TOOL_ACCELERATION_MIN,
            UR_TOOL_ACCELERATION_MAX,
            "tool deceleration",
        )?;
        if self.stop_custom_script_motion()? {
            return Ok(());
        }
        let mut cmd = RobotCommand::new(CommandCode::StopL, self.recipes.misc);
        cmd.set_double(0, deceleration);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)
    }

    /// Decelerate joint speeds to zero, linear in joint space.
    pub fn stop_j(&self, deceleration: f64) -> Result<()> {
        verify_value_is_within(
            deceleration,
            UR_JOINT_ACCELERATION_MIN,
            UR_JOINT_ACCELERATION_MAX,
            "joint deceleration",
        )?;
        if self.stop_custom_script_motion()? {
            return Ok(());
        }
        let mut cmd = RobotCommand::new(CommandCode::StopJ, self.recipes.misc);
        cmd.set_double(0, deceleration);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)
    }

    // ----- force mode -----

    /// Put the robot into force mode.
    pub fn force_mode(
        &self,
        task_frame: &[f64; 6],
        selection_vector: &[i32; 6],
        wrench: &[f64; 6],
        force_type: i32,
        limits: &[f64; 6],
    ) -> Result<()> {
        verify_vector_finite(task_frame, "task frame")?;
        verify_vector_finite(wrench, "wrench")?;
        verify_vector_finite(limits, "limits")?;
        if selection_vector.iter().any(|v| *v != 0 && *v != 1) {
            return Err(RtdeError::Validation(
                "Selection vector elements must be 0 or 1".to_string(),
            ));
        }
        if !(1..=3).contains(&force_type) {
            return Err(RtdeError::Validation(format!(
                "Force mode type must be in [1;3], got {}",
                force_type
            )));
        }
        let mut cmd = RobotCommand::new(CommandCode::ForceMode, self.recipes.force);
        cmd.set_ints(1, selection_vector);
        cmd.set_int(7, force_type);
        cmd.set_doubles(0, task_frame);
        cmd.set_doubles(6, wrench);
        cmd.set_doubles(12, limits);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)
    }

    /// Leave force mode and resume normal operation.
    pub fn force_mode_stop(&self) -> Result<()> {
        self.simple_command(CommandCode::ForceModeStop)
    }

    /// Damping applied in force mode, 0 (none) to 1 (full).
    pub fn force_mode_set_damping(&self, damping: f64) -> Result<()> {
        verify_value_is_within(damping, 0.0, 1.0, "force mode damping")?;
        let mut cmd = RobotCommand::new(CommandCode::ForceModeSetDamping, self.recipes.misc);
        cmd.set_double(0, damping);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)
    }

    /// Gain scaling in force mode, 0 to 2. Values above 1 can make force
    /// mode unstable.
    pub fn force_mode_set_gain_scaling(&self, scaling: f64) -> Result<()> {
        verify_value_is_within(scaling, 0.0, 2.0, "force mode gain scaling")?;
        let mut cmd = RobotCommand::new(CommandCode::ForceModeSetGainScaling, self.recipes.misc);
        cmd.set_double(0, scaling);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)
    }

    /// Zero the force/torque measurement of the builtin sensor.
    pub fn zero_ft_sensor(&self) -> Result<()> {
        self.simple_command(CommandCode::ZeroFtSensor)
    }

    // ----- configuration and queries -----

    /// Set the payload mass and optionally its center of gravity.
    pub fn set_payload(&self, mass: f64, cog: Option<&[f64; 3]>) -> Result<()> {
        verify_vector_finite(&[mass], "payload mass")?;
        let mut cmd = RobotCommand::new(CommandCode::SetPayload, self.recipes.misc);
        cmd.set_double(0, mass);
        if let Some(cog) = cog {
            verify_vector_finite(cog, "payload cog")?;
            cmd.set_int(1, 1);
            cmd.set_doubles(1, cog);
        }
        self.dispatch(&cmd, EXECUTION_TIMEOUT)
    }

    /// Put the robot in freedrive mode.
    pub fn teach_mode(&self) -> Result<()> {
        self.simple_command(CommandCode::TeachMode)
    }

    /// Leave freedrive mode.
    pub fn end_teach_mode(&self) -> Result<()> {
        self.simple_command(CommandCode::EndTeachMode)
    }

    /// Detect tool contact along the given direction. Returns the number
    /// of time steps back to just before the contact started; 0 means no
    /// contact.
    pub fn tool_contact(&self, direction: &[f64; 6]) -> Result<i32> {
        verify_vector_finite(direction, "contact direction")?;
        let mut cmd = RobotCommand::new(CommandCode::ToolContact, self.recipes.misc);
        cmd.set_doubles(0, direction);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)?;
        Ok(self.read_scalar_result() as i32)
    }

    /// Duration of the controller time step in seconds.
    pub fn get_step_time(&self) -> Result<f64> {
        self.simple_command(CommandCode::GetStepTime)?;
        Ok(self.read_scalar_result())
    }

    /// Joint positions as they were `steps` time steps ago.
    pub fn get_actual_joint_positions_history(&self, steps: u32) -> Result<[f64; 6]> {
        let mut cmd =
            RobotCommand::new(CommandCode::GetActualJointPositionsHistory, self.recipes.misc);
        cmd.set_int(1, steps as i32);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)?;
        Ok(self.read_vector_result())
    }

    /// Target waypoint of the active move.
    pub fn get_target_waypoint(&self) -> Result<[f64; 6]> {
        self.simple_command(CommandCode::GetTargetWaypoint)?;
        Ok(self.read_vector_result())
    }

    /// Set the active TCP offset.
    pub fn set_tcp(&self, tcp_offset: &[f64; 6]) -> Result<()> {
        verify_vector_finite(tcp_offset, "tcp offset")?;
        let mut cmd = RobotCommand::new(CommandCode::SetTcp, self.recipes.pose_pair);
        cmd.set_doubles(0, tcp_offset);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)
    }

    /// Inverse kinematics for the given pose. When `qnear` is given the
    /// solution closest to it is returned, otherwise the one closest to
    /// the current joint positions.
    pub fn get_inverse_kinematics(
        &self,
        pose: &[f64; 6],
        qnear: Option<&[f64; 6]>,
    ) -> Result<[f64; 6]> {
        verify_vector_finite(pose, "target pose")?;
        let mut cmd = RobotCommand::new(CommandCode::GetInverseKinematics, self.recipes.pose_pair);
        cmd.set_doubles(0, pose);
        if let Some(qnear) = qnear {
            verify_vector_finite(qnear, "qnear")?;
            cmd.set_int(1, 1);
            cmd.set_doubles(6, qnear);
        }
        self.dispatch(&cmd, EXECUTION_TIMEOUT)?;
        Ok(self.read_vector_result())
    }

    /// Transform `p_from_to` by `p_from`: the resulting pose of moving
    /// `p_from_to` within the coordinate system of `p_from`.
    pub fn pose_trans(&self, p_from: &[f64; 6], p_from_to: &[f64; 6]) -> Result<[f64; 6]> {
        verify_vector_finite(p_from, "p_from")?;
        verify_vector_finite(p_from_to, "p_from_to")?;
        let mut cmd = RobotCommand::new(CommandCode::PoseTrans, self.recipes.pose_pair);
        cmd.set_doubles(0, p_from);
        cmd.set_doubles(6, p_from_to);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)?;
        Ok(self.read_vector_result())
    }

    /// Forward kinematics. Uses the current joint angles when `q` is
    /// `None`; a TCP offset may only be given together with `q`.
    pub fn get_forward_kinematics(
        &self,
        q: Option<&[f64; 6]>,
        tcp_offset: Option<&[f64; 6]>,
    ) -> Result<[f64; 6]> {
        if tcp_offset.is_some() && q.is_none() {
            return Err(RtdeError::Validation(
                "A TCP offset requires explicit joint positions".to_string(),
            ));
        }
        let mut cmd = RobotCommand::new(CommandCode::GetForwardKinematics, self.recipes.pose_pair);
        match (q, tcp_offset) {
            (Some(q), Some(tcp)) => {
                verify_vector_finite(q, "joint positions")?;
                verify_vector_finite(tcp, "tcp offset")?;
                cmd.set_int(1, 2);
                cmd.set_doubles(0, q);
                cmd.set_doubles(6, tcp);
            }
            (Some(q), None) => {
                verify_vector_finite(q, "joint positions")?;
                cmd.set_int(1, 1);
                cmd.set_doubles(0, q);
            }
            _ => {}
        }
        self.dispatch(&cmd, EXECUTION_TIMEOUT)?;
        Ok(self.read_vector_result())
    }

    /// Trigger a protective stop, for testing and debugging.
    pub fn trigger_protective_stop(&self) -> Result<()> {
        self.simple_command(CommandCode::TriggerProtectiveStop)
    }

    /// True when the robot is fully at rest.
    pub fn is_steady(&self) -> Result<bool> {
        self.simple_command(CommandCode::IsSteady)?;
        Ok(self.read_scalar_result() != 0.0)
    }

    /// Check a pose against the current safety limits.
    pub fn is_pose_within_safety_limits(&self, pose: &[f64; 6]) -> Result<bool> {
        verify_vector_finite(pose, "pose")?;
        let mut cmd =
            RobotCommand::new(CommandCode::IsPoseWithinSafetyLimits, self.recipes.pose_pair);
        cmd.set_doubles(0, pose);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)?;
        Ok(self.read_scalar_result() != 0.0)
    }

    /// Check joint positions against the current safety limits.
    pub fn is_joints_within_safety_limits(&self, q: &[f64; 6]) -> Result<bool> {
        verify_vector_finite(q, "joint positions")?;
        let mut cmd =
            RobotCommand::new(CommandCode::IsJointsWithinSafetyLimits, self.recipes.pose_pair);
        cmd.set_doubles(0, q);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)?;
        Ok(self.read_scalar_result() != 0.0)
    }

    /// Torques of all joints in Nm.
    pub fn get_joint_torques(&self) -> Result<[f64; 6]> {
        self.simple_command(CommandCode::GetJointTorques)?;
        Ok(self.read_vector_result())
    }

    /// The active TCP offset.
    pub fn get_tcp_offset(&self) -> Result<[f64; 6]> {
        self.simple_command(CommandCode::GetTcpOffset)?;
        Ok(self.read_vector_result())
    }

    /// Start jogging with the given speed vector. Call again with new
    /// speeds to steer; the feature is only evaluated on the first call.
    pub fn jog_start(&self, speeds: &[f64; 6], feature: Feature) -> Result<()> {
        verify_vector_finite(speeds, "jog speeds")?;
        let mut cmd = RobotCommand::new(CommandCode::JogStart, self.recipes.speed);
        cmd.set_int(1, feature as i32);
        cmd.set_doubles(0, speeds);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)
    }

    /// Stop jogging.
    pub fn jog_stop(&self) -> Result<()> {
        self.simple_command(CommandCode::JogStop)
    }

    /// Watch the command channel with a minimum input frequency; the
    /// controller pauses the program if updates stop arriving.
    pub fn set_watchdog(&self, min_frequency: f64) -> Result<()> {
        if !(min_frequency.is_finite() && min_frequency > 0.0) {
            return Err(RtdeError::Validation(format!(
                "Watchdog frequency must be positive, got {}",
                min_frequency
            )));
        }
        let mut cmd = RobotCommand::new(CommandCode::SetWatchdog, self.recipes.misc);
        cmd.set_double(0, min_frequency);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)
    }

    /// Kick the watchdog from the control loop.
    pub fn kick_watchdog(&self) -> Result<()> {
        self.simple_command(CommandCode::KickWatchdog)
    }

    // ----- status from the streamed snapshot -----

    /// True if a program is running on the controller.
    pub fn is_program_running(&self) -> bool {
        self.robot_state
            .read()
            .robot_status_bit(RobotStatusBit::ProgramRunning)
            .unwrap_or(false)
    }

    pub fn is_protective_stopped(&self) -> bool {
        self.robot_state
            .read()
            .safety_status_bit(SafetyStatusBit::ProtectiveStopped)
            .unwrap_or(false)
    }

    pub fn is_emergency_stopped(&self) -> bool {
        let state = self.robot_state.read();
        [
            SafetyStatusBit::SystemEmergencyStopped,
            SafetyStatusBit::RobotEmergencyStopped,
            SafetyStatusBit::EmergencyStopped,
        ]
        .iter()
        .any(|bit| state.safety_status_bit(*bit).unwrap_or(false))
    }

    /// Progress of the active asynchronous operation: -1 when idle, the
    /// waypoint index being executed otherwise.
    pub fn async_operation_progress(&self) -> i32 {
        self.robot_state
            .read()
            .output_int_register(self.register_offset + 1)
            .unwrap_or(-1)
    }

    // ----- script upload and paths -----

    /// Re-upload the control script if no program is currently running.
    pub fn reupload_script(&self) -> Result<()> {
        if self.is_program_running() {
            return Ok(());
        }
        self.script_client.lock().send_control_script()?;
        self.wait_for_program_running(WAIT_FOR_PROGRAM_RUNNING_TIMEOUT)?;
        self.wait_until_ready(GET_READY_TIMEOUT)
    }

    /// Terminate the program running on the controller by replacing it
    /// with an empty one.
    pub fn stop_script(&self) -> Result<()> {
        let script = "def rtde_stop():\n\ttextmsg(\"rtde control script stopped\")\nend\n";
        self.script_client.lock().send_script_text(script)?;
        self.custom_script_running.store(false, Ordering::Relaxed);
        Ok(())
    }

    /// Run a one-shot script on the controller. `script` is a function
    /// body (statements without the surrounding `def`); it is indented,
    /// wrapped, and terminated with a done-register write so completion
    /// can be observed. Afterwards the control script is restored.
    pub fn send_custom_script(&self, script: &str) -> Result<()> {
        self.run_custom_script("rtde_custom", script)?;
        self.finish_custom_script(EXECUTION_TIMEOUT)
    }

    /// Like [`send_custom_script`](Self::send_custom_script) with an
    /// explicit function name.
    pub fn send_custom_script_function(&self, name: &str, script: &str) -> Result<()> {
        self.run_custom_script(name, script)?;
        self.finish_custom_script(EXECUTION_TIMEOUT)
    }

    /// Run a one-shot script loaded from a file.
    pub fn send_custom_script_file(&self, path: &std::path::Path) -> Result<()> {
        let script = std::fs::read_to_string(path).map_err(|e| {
            RtdeError::Config(format!("Failed to read script file {}: {}", path.display(), e))
        })?;
        self.send_custom_script(&script)
    }

    /// Assign a custom control script file used by future uploads.
    /// Passing `None` restores the embedded script.
    pub fn set_custom_script_file(&self, path: Option<PathBuf>) {
        self.script_client.lock().set_script_file(path);
    }

    /// Move through all waypoints of a path. Synchronous execution blocks
    /// until the last waypoint is reached; asynchronous execution returns
    /// once the path has started, with progress published per waypoint.
    pub fn move_path(&self, path: &Path, asynchronous: bool) -> Result<()> {
        path.validate()?;
        for entry in path.waypoints() {
            let (velocity, acceleration, blend) = entry.profile();
            match entry.move_type {
                MoveType::MoveJ => {
                    verify_value_is_within(
                        velocity,
                        UR_JOINT_VELOCITY_MIN,
                        UR_JOINT_VELOCITY_MAX,
                        "waypoint joint speed",
                    )?;
                    verify_value_is_within(
                        acceleration,
                        UR_JOINT_ACCELERATION_MIN,
                        UR_JOINT_ACCELERATION_MAX,
                        "waypoint joint acceleration",
                    )?;
                }
                _ => {
                    verify_value_is_within(
                        velocity,
                        UR_TOOL_VELOCITY_MIN,
                        UR_TOOL_VELOCITY_MAX,
                        "waypoint tool speed",
                    )?;
                    verify_value_is_within(
                        acceleration,
                        UR_TOOL_ACCELERATION_MIN,
                        UR_TOOL_ACCELERATION_MAX,
                        "waypoint tool acceleration",
                    )?;
                }
            }
            verify_value_is_within(blend, UR_BLEND_MIN, UR_BLEND_MAX, "waypoint blend radius")?;
        }

        if self.custom_script_running.load(Ordering::Relaxed) {
            self.finish_custom_script(PATH_EXECUTION_TIMEOUT)?;
        }

        let body = path.to_script_code(self.register_offset);
        let program = format!(
            "def rtde_move_path():\n{}    write_output_integer_register({}, {})\nend\n",
            body, self.register_offset, UR_CONTROLLER_DONE_WITH_CMD
        );
        self.custom_script_running.store(true, Ordering::Relaxed);
        self.script_client.lock().send_script_text(&program)?;

        if asynchronous {
            self.wait_for_async_start(GET_READY_TIMEOUT)
        } else {
            self.finish_custom_script(PATH_EXECUTION_TIMEOUT)
        }
    }

    /// Convenience wrapper: a pure joint-space path given as
    /// `[q, velocity, acceleration, blend]` rows.
    pub fn move_j_path(&self, waypoints: &[Vec<f64>], asynchronous: bool) -> Result<()> {
        let mut path = Path::new();
        path.append_movej_path(waypoints);
        self.move_path(&path, asynchronous)
    }

    /// Convenience wrapper: a pure tool-space path given as
    /// `[pose, velocity, acceleration, blend]` rows.
    pub fn move_l_path(&self, waypoints: &[Vec<f64>], asynchronous: bool) -> Result<()> {
        let mut path = Path::new();
        path.append_movel_path(waypoints);
        self.move_path(&path, asynchronous)
    }

    // ----- internals -----

    fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.delta_time).max(MIN_POLL_INTERVAL)
    }

    fn output_int(&self, register: u32) -> Option<i32> {
        self.robot_state
            .read()
            .output_int_register(self.register_offset + register)
    }

    fn read_scalar_result(&self) -> f64 {
        self.robot_state
            .read()
            .output_double_register(self.register_offset)
            .unwrap_or(0.0)
    }

    fn read_vector_result(&self) -> [f64; 6] {
        let state = self.robot_state.read();
        let mut out = [0.0; 6];
        for (i, value) in out.iter_mut().enumerate() {
            *value = state
                .output_double_register(self.register_offset + i as u32)
                .unwrap_or(0.0);
        }
        out
    }

    fn simple_command(&self, code: CommandCode) -> Result<()> {
        let cmd = RobotCommand::new(code, self.recipes.no_cmd);
        self.dispatch(&cmd, EXECUTION_TIMEOUT)
    }

    /// Send a command and await its DONE acknowledgement, reconnecting
    /// and retrying at most once after a transport failure.
    fn dispatch(&self, cmd: &RobotCommand, timeout: Duration) -> Result<()> {
        match self.execute_command(cmd, timeout) {
            Err(e) if e.is_transport() => {
                warn!("Lost connection during command: {}; reconnecting once", e);
                self.reconnect()?;
                self.execute_command(cmd, timeout)
            }
            other => other,
        }
    }

    fn execute_command(&self, cmd: &RobotCommand, timeout: Duration) -> Result<()> {
        if self.custom_script_running.load(Ordering::Relaxed) {
            self.finish_custom_script(PATH_EXECUTION_TIMEOUT)?;
        }
        self.rtde.lock().send(cmd, self.register_offset)?;
        self.wait_for_done(timeout)?;
        self.send_clear_command()?;
        // Without this barrier the next command could mistake the stale
        // DONE for its own acknowledgement.
        self.wait_until_ready(GET_READY_TIMEOUT)
    }

    /// Write NOOP back to the command register, letting the control
    /// script re-establish readiness.
    fn send_clear_command(&self) -> Result<()> {
        let cmd = RobotCommand::new(CommandCode::NoCmd, self.recipes.no_cmd);
        self.rtde.lock().send(&cmd, self.register_offset)
    }

    fn check_controller_stops(&self, state: &RobotState) -> Result<()> {
        if state
            .safety_status_bit(SafetyStatusBit::ProtectiveStopped)
            .unwrap_or(false)
        {
            return Err(RtdeError::Controller(
                "Protective stop detected while awaiting command completion".to_string(),
            ));
        }
        let emergency = [
            SafetyStatusBit::SystemEmergencyStopped,
            SafetyStatusBit::RobotEmergencyStopped,
            SafetyStatusBit::EmergencyStopped,
        ]
        .iter()
        .any(|bit| state.safety_status_bit(*bit).unwrap_or(false));
        if emergency {
            return Err(RtdeError::Controller(
                "Emergency stop detected while awaiting command completion".to_string(),
            ));
        }
        Ok(())
    }

    /// Poll the snapshot until the done flag reads DONE. A controller
    /// stop, a program that dies underway, a dead receive stream, or the
    /// timeout each abort the wait.
    fn wait_for_done(&self, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        let mut seen_running = false;
        loop {
            {
                let state = self.robot_state.read();
                self.check_controller_stops(&state)?;
                if state.output_int_register(self.register_offset) ==
                    Some(UR_CONTROLLER_DONE_WITH_CMD)
                {
                    return Ok(());
                }
                match state.robot_status_bit(RobotStatusBit::ProgramRunning) {
                    Some(true) => seen_running = true,
                    Some(false) if seen_running => {
                        return Err(RtdeError::Controller(
                            "Program stopped while awaiting command completion".to_string(),
                        ))
                    }
                    _ => {}
                }
            }
            if !self.is_connected() {
                return Err(RtdeError::Connection(
                    "Receive stream lost while awaiting command completion".to_string(),
                ));
            }
            if start.elapsed() >= timeout {
                return Err(RtdeError::Timeout(format!(
                    "No command acknowledgement within {:?}",
                    timeout
                )));
            }
            std::thread::sleep(self.poll_interval());
        }
    }

    /// Poll for the done marker written at the end of a one-shot script.
    /// Unlike [`wait_for_done`](Self::wait_for_done) this tolerates the
    /// program-running flag dropping, since the control script is
    /// replaced for the duration.
    fn wait_for_marker(&self, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        loop {
            {
                let state = self.robot_state.read();
                self.check_controller_stops(&state)?;
                if state.output_int_register(self.register_offset)
                    == Some(UR_CONTROLLER_DONE_WITH_CMD)
                {
                    return Ok(());
                }
            }
            if !self.is_connected() {
                return Err(RtdeError::Connection(
                    "Receive stream lost while awaiting script completion".to_string(),
                ));
            }
            if start.elapsed() >= timeout {
                return Err(RtdeError::Timeout(format!(
                    "Script did not signal completion within {:?}",
                    timeout
                )));
            }
            std::thread::sleep(self.poll_interval());
        }
    }

    fn wait_for_async_start(&self, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        loop {
            if self.async_operation_progress() >= 0 {
                return Ok(());
            }
            if self.output_int(0) == Some(UR_CONTROLLER_DONE_WITH_CMD) {
                // Path already ran to completion before we observed a
                // progress update.
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(RtdeError::Timeout(
                    "Asynchronous path did not start in time".to_string(),
                ));
            }
            std::thread::sleep(self.poll_interval());
        }
    }

    /// Wrap a script body into a one-shot program ending in the done
    /// marker, and upload it.
    fn run_custom_script(&self, name: &str, body: &str) -> Result<()> {
        let mut program = format!("def {}():\n", name);
        for line in body.lines() {
            program.push('\t');
            program.push_str(line);
            program.push('\n');
        }
        program.push_str(&format!(
            "\twrite_output_integer_register({}, {})\n",
            self.register_offset, UR_CONTROLLER_DONE_WITH_CMD
        ));
        program.push_str("end\n");

        self.custom_script_running.store(true, Ordering::Relaxed);
        self.script_client.lock().send_script_text(&program)
    }

    /// Wait out the running one-shot script, then restore the control
    /// script and readiness.
    fn finish_custom_script(&self, timeout: Duration) -> Result<()> {
        self.wait_for_marker(timeout)?;
        self.custom_script_running.store(false, Ordering::Relaxed);
        if self.options.upload_script {
            self.script_client.lock().send_control_script()?;
            self.wait_for_program_running(WAIT_FOR_PROGRAM_RUNNING_TIMEOUT)?;
            self.wait_until_ready(GET_READY_TIMEOUT)?;
        }
        Ok(())
    }

    /// While a one-shot script owns the controller, a stop request is
    /// served by replacing the program rather than through the mailbox.
    /// Returns true if the stop was handled that way.
    fn stop_custom_script_motion(&self) -> Result<bool> {
        if !self.custom_script_running.load(Ordering::Relaxed) {
            return Ok(false);
        }
        self.stop_script()?;
        if self.options.upload_script {
            self.script_client.lock().send_control_script()?;
            self.wait_for_program_running(WAIT_FOR_PROGRAM_RUNNING_TIMEOUT)?;
            self.wait_until_ready(GET_READY_TIMEOUT)?;
        }
        Ok(true)
    }

    fn wait_for_program_running(&self, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        loop {
            if self.is_program_running() {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(RtdeError::Timeout(
                    "Program did not start on the controller".to_string(),
                ));
            }
            std::thread::sleep(self.poll_interval());
        }
    }

    /// Wait for the control script to report readiness.
    fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        loop {
            if self.output_int(0) == Some(UR_CONTROLLER_RDY_FOR_CMD) {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(RtdeError::Timeout(
                    "Control script did not report ready".to_string(),
                ));
            }
            std::thread::sleep(self.poll_interval());
        }
    }
}

impl Drop for RtdeControlInterface {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn setup_recipes(
    rtde: &mut RtdeClient,
    base: u32,
    frequency: f64,
) -> Result<(CommandRecipes, Recipe)> {
    let mut output_names = vec![
        "robot_status_bits".to_string(),
        "safety_status_bits".to_string(),
    ];
    output_names.extend(out_int_registers(base, 0..=1));
    output_names.extend(out_double_registers(base, 0..=5));
    let output_recipe = rtde.send_output_setup(&output_names, frequency)?;

    let no_cmd = rtde.send_input_setup(&in_int_registers(base, 0..=0))?.id;

    let mut movement = in_int_registers(base, 0..=1);
    movement.extend(in_double_registers(base, 0..=8));
    let movement = rtde.send_input_setup(&movement)?.id;

    let mut servo = in_int_registers(base, 0..=0);
    servo.extend(in_double_registers(base, 0..=10));
    let servo = rtde.send_input_setup(&servo)?.id;

    let mut speed = in_int_registers(base, 0..=1);
    speed.extend(in_double_registers(base, 0..=7));
    let speed = rtde.send_input_setup(&speed)?.id;

    let mut force = in_int_registers(base, 0..=7);
    force.extend(in_double_registers(base, 0..=17));
    let force = rtde.send_input_setup(&force)?.id;

    let mut misc = in_int_registers(base, 0..=1);
    misc.extend(in_double_registers(base, 0..=5));
    let misc = rtde.send_input_setup(&misc)?.id;

    let mut pose_pair = in_int_registers(base, 0..=1);
    pose_pair.extend(in_double_registers(base, 0..=14));
    let pose_pair = rtde.send_input_setup(&pose_pair)?.id;

    Ok((
        CommandRecipes {
            no_cmd,
            movement,
            servo,
            speed,
            force,
            misc,
            pose_pair,
        },
        output_recipe,
    ))
}

fn in_int_registers(base: u32, range: std::ops::RangeInclusive<u32>) -> Vec<String> {
    range
        .map(|i| format!("input_int_register_{}", base + i))
        .collect()
}

fn in_double_registers(base: u32, range: std::ops::RangeInclusive<u32>) -> Vec<String> {
    range
        .map(|i| format!("input_double_register_{}", base + i))
        .collect()
}

fn out_int_registers(base: u32, range: std::ops::RangeInclusive<u32>) -> Vec<String> {
    range
        .map(|i| format!("output_int_register_{}", base + i))
        .collect()
}

fn out_double_registers(base: u32, range: std::ops::RangeInclusive<u32>) -> Vec<String> {
    range
        .map(|i| format!("output_double_register_{}", base + i))
        .collect()
}

/// Reject values outside `[min; max]` and NaN before any frame is emitted.
pub(crate) fn verify_value_is_within(value: f64, min: f64, max: f64, name: &str) -> Result<()> {
    if value.is_nan() {
        return Err(RtdeError::Validation(format!("{} is NaN", name)));
    }
    if value < min || value > max {
        return Err(RtdeError::Validation(format!(
            "{} of {} is not within [{}; {}]",
            name, value, min, max
        )));
    }
    Ok(())
}

pub(crate) fn verify_vector_finite(values: &[f64], name: &str) -> Result<()> {
    if values.iter().any(|v| v.is_nan()) {
        return Err(RtdeError::Validation(format!("{} contains NaN", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_value_is_within() {
        assert!(verify_value_is_within(1.05, UR_JOINT_VELOCITY_MIN, UR_JOINT_VELOCITY_MAX, "v")
            .is_ok());
        assert!(verify_value_is_within(0.0, 0.0, 3.14, "v").is_ok());
        assert!(verify_value_is_within(3.14, 0.0, 3.14, "v").is_ok());

        let err = verify_value_is_within(3.15, 0.0, 3.14, "joint speed").unwrap_err();
        assert!(matches!(err, RtdeError::Validation(_)));
        assert!(err.to_string().contains("joint speed"));

        let err = verify_value_is_within(f64::NAN, 0.0, 3.14, "v").unwrap_err();
        assert!(matches!(err, RtdeError::Validation(_)));
    }

    #[test]
    fn test_verify_vector_finite() {
        assert!(verify_vector_finite(&[0.0, -1.57, 3.0], "q").is_ok());
        let err = verify_vector_finite(&[0.0, f64::NAN], "q").unwrap_err();
        assert!(matches!(err, RtdeError::Validation(_)));
    }

    #[test]
    fn test_register_name_builders() {
        assert_eq!(
            in_int_registers(0, 0..=1),
            vec!["input_int_register_0", "input_int_register_1"]
        );
        assert_eq!(
            in_double_registers(24, 0..=1),
            vec!["input_double_register_24", "input_double_register_25"]
        );
        assert_eq!(out_int_registers(24, 1..=1), vec!["output_int_register_25"]);
    }
}
