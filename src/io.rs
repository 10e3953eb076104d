//! Direct I/O writes through dedicated input recipes.
//!
//! Orthogonal to the command channel: these recipes target the robot's own
//! I/O mailbox fields, so no control script and no handshake are needed.
//! The controller applies each mask-plus-value write on its next tick. The
//! command slot sits at input register 20, disjoint from both command
//! channel windows, so the two interfaces can run side by side.

use crate::command::RobotCommand;
use crate::control::verify_value_is_within;
use crate::robot_state::{shared_robot_state, RobotStatusBit, SharedRobotState};
use crate::rtde::{RtdeClient, RTDE_PORT};
use crate::{Result, RtdeError};
use parking_lot::Mutex;
use tracing::warn;

/// Command slot for the I/O recipes.
const IO_COMMAND_REGISTER: u32 = 20;

/// Command code written alongside each I/O recipe write.
const IO_SET_COMMAND: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IoRecipes {
    digital_out: u8,
    tool_out: u8,
    speed_slider: u8,
    analog_out: u8,
}

/// Digital, analog, tool, and speed-slider outputs set without involving
/// the control script.
pub struct RtdeIoInterface {
    hostname: String,
    port: u16,
    rtde: Mutex<RtdeClient>,
    robot_state: SharedRobotState,
    recipes: IoRecipes,
}

impl RtdeIoInterface {
    pub fn new(hostname: &str) -> Result<Self> {
        Self::with_port(hostname, RTDE_PORT)
    }

    pub fn with_port(hostname: &str, port: u16) -> Result<Self> {
        let mut rtde = RtdeClient::new(hostname, port);
        let recipes = setup_session(&mut rtde)?;
        Ok(Self {
            hostname: hostname.to_string(),
            port,
            rtde: Mutex::new(rtde),
            robot_state: shared_robot_state(),
            recipes,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.rtde.lock().is_connected()
    }

    pub fn disconnect(&self) {
        self.rtde.lock().disconnect();
    }

    /// Re-run the connect/negotiate/setup/start sequence after a lost
    /// connection.
    pub fn reconnect(&self) -> Result<()> {
        let mut rtde = self.rtde.lock();
        rtde.disconnect();
        let recipes = setup_session(&mut rtde)?;
        if recipes != self.recipes {
            return Err(RtdeError::Protocol(
                "Controller assigned unexpected recipe ids on reconnect".to_string(),
            ));
        }
        Ok(())
    }

    /// Set one standard digital output. Untouched outputs keep their
    /// state: the mask selects only bit `output_id`.
    pub fn set_standard_digital_out(&self, output_id: u8, signal_level: bool) -> Result<()> {
        if output_id > 7 {
            return Err(RtdeError::Validation(format!(
                "Standard digital output id must be in [0:7], got {}",
                output_id
            )));
        }
        let mask = 1u8 << output_id;
        let mut cmd = RobotCommand::with_raw_code(IO_SET_COMMAND, self.recipes.digital_out);
        cmd.set_std_digital_out(mask, if signal_level { mask } else { 0 });
        self.send_command(&cmd)
    }

    /// Set one tool digital output.
    pub fn set_tool_digital_out(&self, output_id: u8, signal_level: bool) -> Result<()> {
        if output_id > 1 {
            return Err(RtdeError::Validation(format!(
                "Tool digital output id must be in [0:1], got {}",
                output_id
            )));
        }
        let mask = 1u8 << output_id;
        let mut cmd = RobotCommand::with_raw_code(IO_SET_COMMAND, self.recipes.tool_out);
        cmd.set_tool_digital_out(mask, if signal_level { mask } else { 0 });
        self.send_command(&cmd)
    }

    /// Set the speed slider as a fraction between 0 and 1.
    pub fn set_speed_slider(&self, fraction: f64) -> Result<()> {
        verify_value_is_within(fraction, 0.0, 1.0, "speed slider fraction")?;
        let mut cmd = RobotCommand::with_raw_code(IO_SET_COMMAND, self.recipes.speed_slider);
        cmd.set_speed_slider(1, fraction);
        self.send_command(&cmd)
    }

    /// Set an analog output in voltage mode, as a ratio of the voltage
    /// span.
    pub fn set_analog_output_voltage(&self, output_id: u8, voltage_ratio: f64) -> Result<()> {
        self.set_analog_output(output_id, voltage_ratio, 1)
    }

    /// Set an analog output in current mode, as a ratio of the current
    /// span.
    pub fn set_analog_output_current(&self, output_id: u8, current_ratio: f64) -> Result<()> {
        self.set_analog_output(output_id, current_ratio, 0)
    }

    fn set_analog_output(&self, output_id: u8, ratio: f64, output_type: u8) -> Result<()> {
        if output_id > 1 {
            return Err(RtdeError::Validation(format!(
                "Analog output id must be in [0:1], got {}",
                output_id
            )));
        }
        verify_value_is_within(ratio, 0.0, 1.0, "analog output ratio")?;
        let mask = 1u8 << output_id;
        let (out0, out1) = if output_id == 0 { (ratio, 0.0) } else { (0.0, ratio) };
        let mut cmd = RobotCommand::with_raw_code(IO_SET_COMMAND, self.recipes.analog_out);
        cmd.set_std_analog_out(mask, output_type, out0, out1);
        self.send_command(&cmd)
    }

    /// True if a program is running on the controller, read synchronously
    /// from the next output frame.
    pub fn is_program_running(&self) -> Result<bool> {
        let mut rtde = self.rtde.lock();
        rtde.receive_data(&self.robot_state)?;
        Ok(self
            .robot_state
            .read()
            .robot_status_bit(RobotStatusBit::ProgramRunning)
            .unwrap_or(false))
    }

    /// Send a write, reconnecting and retrying at most once if the
    /// transport failed underneath us.
    fn send_command(&self, cmd: &RobotCommand) -> Result<()> {
        let result = self.rtde.lock().send(cmd, IO_COMMAND_REGISTER);
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_transport() => {
                warn!(
                    "Lost connection to {}:{} while writing I/O: {}; reconnecting once",
                    self.hostname, self.port, e
                );
                self.reconnect()?;
                self.rtde.lock().send(cmd, IO_COMMAND_REGISTER)
            }
            Err(e) => Err(e),
        }
    }
}

impl Drop for RtdeIoInterface {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn setup_session(rtde: &mut RtdeClient) -> Result<IoRecipes> {
    rtde.connect()?;
    rtde.negotiate_protocol_version()?;
    let version = rtde.controller_version()?;
    let frequency = version.preferred_frequency();

    let output_names = vec![
        "robot_status_bits".to_string(),
        "output_int_register_0".to_string(),
    ];
    rtde.send_output_setup(&output_names, frequency)?;

    let command_slot = format!("input_int_register_{}", IO_COMMAND_REGISTER);
    let digital_out = rtde
        .send_input_setup(&[
            command_slot.clone(),
            "standard_digital_output_mask".to_string(),
            "standard_digital_output".to_string(),
        ])?
        .id;
    let tool_out = rtde
        .send_input_setup(&[
            command_slot.clone(),
            "tool_digital_output_mask".to_string(),
            "tool_digital_output".to_string(),
        ])?
        .id;
    let speed_slider = rtde
        .send_input_setup(&[
            command_slot.clone(),
            "speed_slider_mask".to_string(),
            "speed_slider_fraction".to_string(),
        ])?
        .id;
    let analog_out = rtde
        .send_input_setup(&[
            command_slot,
            "standard_analog_output_mask".to_string(),
            "standard_analog_output_type".to_string(),
            "standard_analog_output_0".to_string(),
            "standard_analog_output_1".to_string(),
        ])?
        .id;

    rtde.send_start()?;
    Ok(IoRecipes {
        digital_out,
        tool_out,
        speed_slider,
        analog_out,
    })
}
