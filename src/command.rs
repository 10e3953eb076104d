//! Command records sent to the controller through the register mailbox.
//!
//! A command targets one input recipe and carries typed payload slots; when
//! the session serializes it, each field the recipe demands is drawn from
//! the matching slot, and slots the caller never set stay zero.

use crate::recipe::{DataValue, Recipe};
use crate::{Result, RtdeError};

/// Integer command codes written to `input_int_register_(base+0)`. The
/// numeric values are part of the contract with the companion control
/// script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum CommandCode {
    NoCmd = 0,
    MoveJ = 1,
    MoveL = 2,
    MoveJIk = 3,
    MoveLFk = 4,
    MoveP = 5,
    MoveC = 6,
    ServoJ = 7,
    ServoL = 8,
    SpeedJ = 9,
    SpeedL = 10,
    ServoC = 11,
    ForceMode = 12,
    ForceModeStop = 13,
    ZeroFtSensor = 14,
    StopL = 15,
    StopJ = 16,
    SetPayload = 17,
    TeachMode = 18,
    EndTeachMode = 19,
    ForceModeSetDamping = 20,
    ForceModeSetGainScaling = 21,
    ToolContact = 22,
    GetStepTime = 23,
    GetActualJointPositionsHistory = 24,
    GetTargetWaypoint = 25,
    SetTcp = 26,
    GetInverseKinematics = 27,
    /// Reserved for the control script's internal protective-stop handling.
    ProtectiveStop = 28,
    TriggerProtectiveStop = 29,
    PoseTrans = 30,
    IsSteady = 31,
    SetWatchdog = 32,
    KickWatchdog = 33,
    IsPoseWithinSafetyLimits = 34,
    IsJointsWithinSafetyLimits = 35,
    GetJointTorques = 36,
    GetTcpOffset = 37,
    JogStart = 38,
    JogStop = 39,
    GetForwardKinematics = 40,
    MovePath = 41,
    ServoStop = 42,
    SpeedStop = 43,
}

/// Number of input int registers in one command-channel window.
pub const INT_SLOTS: usize = 8;
/// Number of input double registers in one command-channel window.
pub const DOUBLE_SLOTS: usize = 24;

/// A single request to the controller: command code, target recipe, and
/// the payload slots meaningful to that command.
#[derive(Debug, Clone)]
pub struct RobotCommand {
    code: i32,
    recipe_id: u8,
    int_slots: [i32; INT_SLOTS],
    double_slots: [f64; DOUBLE_SLOTS],
    std_digital_out_mask: u8,
    std_digital_out: u8,
    tool_digital_out_mask: u8,
    tool_digital_out: u8,
    speed_slider_mask: u32,
    speed_slider_fraction: f64,
    std_analog_output_mask: u8,
    std_analog_output_type: u8,
    std_analog_output_0: f64,
    std_analog_output_1: f64,
}

impl RobotCommand {
    pub fn new(code: CommandCode, recipe_id: u8) -> Self {
        Self::with_raw_code(code as i32, recipe_id)
    }

    /// Build a command with a raw integer code. Used by the I/O facade,
    /// whose codes are scoped per recipe rather than drawn from
    /// [`CommandCode`].
    pub fn with_raw_code(code: i32, recipe_id: u8) -> Self {
        let mut int_slots = [0i32; INT_SLOTS];
        int_slots[0] = code;
        Self {
            code,
            recipe_id,
            int_slots,
            double_slots: [0.0; DOUBLE_SLOTS],
            std_digital_out_mask: 0,
            std_digital_out: 0,
            tool_digital_out_mask: 0,
            tool_digital_out: 0,
            speed_slider_mask: 0,
            speed_slider_fraction: 0.0,
            std_analog_output_mask: 0,
            std_analog_output_type: 0,
            std_analog_output_0: 0.0,
            std_analog_output_1: 0.0,
        }
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn recipe_id(&self) -> u8 {
        self.recipe_id
    }

    /// Set an int slot relative to the register window. Slot 0 holds the
    /// command code and is managed by the constructor.
    pub fn set_int(&mut self, slot: usize, value: i32) -> &mut Self {
        debug_assert!(slot > 0 && slot < INT_SLOTS);
        self.int_slots[slot] = value;
        self
    }

    pub fn set_double(&mut self, slot: usize, value: f64) -> &mut Self {
        debug_assert!(slot < DOUBLE_SLOTS);
        self.double_slots[slot] = value;
        self
    }

    /// Fill consecutive double slots starting at `start`.
    pub fn set_doubles(&mut self, start: usize, values: &[f64]) -> &mut Self {
        debug_assert!(start + values.len() <= DOUBLE_SLOTS);
        self.double_slots[start..start + values.len()].copy_from_slice(values);
        self
    }

    /// Fill consecutive int slots starting at `start`.
    pub fn set_ints(&mut self, start: usize, values: &[i32]) -> &mut Self {
        debug_assert!(start > 0 && start + values.len() <= INT_SLOTS);
        self.int_slots[start..start + values.len()].copy_from_slice(values);
        self
    }

    pub fn set_std_digital_out(&mut self, mask: u8, value: u8) -> &mut Self {
        self.std_digital_out_mask = mask;
        self.std_digital_out = value;
        self
    }

    pub fn set_tool_digital_out(&mut self, mask: u8, value: u8) -> &mut Self {
        self.tool_digital_out_mask = mask;
        self.tool_digital_out = value;
        self
    }

    pub fn set_speed_slider(&mut self, mask: u32, fraction: f64) -> &mut Self {
        self.speed_slider_mask = mask;
        self.speed_slider_fraction = fraction;
        self
    }

    pub fn set_std_analog_out(&mut self, mask: u8, output_type: u8, out0: f64, out1: f64) -> &mut Self {
        self.std_analog_output_mask = mask;
        self.std_analog_output_type = output_type;
        self.std_analog_output_0 = out0;
        self.std_analog_output_1 = out1;
        self
    }

    /// Value of one recipe field, by the variable name the recipe was
    /// registered with. Register names are translated to window-relative
    /// slots using `register_offset`.
    pub fn field_value(&self, name: &str, register_offset: u32) -> Result<DataValue> {
        if let Some(index) = name.strip_prefix("input_int_register_") {
            let slot = self.register_slot(index, register_offset, INT_SLOTS)?;
            return Ok(DataValue::Int32(self.int_slots[slot]));
        }
        if let Some(index) = name.strip_prefix("input_double_register_") {
            let slot = self.register_slot(index, register_offset, DOUBLE_SLOTS)?;
            return Ok(DataValue::Double(self.double_slots[slot]));
        }
        match name {
            "standard_digital_output_mask" => Ok(DataValue::Uint8(self.std_digital_out_mask)),
            "standard_digital_output" => Ok(DataValue::Uint8(self.std_digital_out)),
            "tool_digital_output_mask" => Ok(DataValue::Uint8(self.tool_digital_out_mask)),
            "tool_digital_output" => Ok(DataValue::Uint8(self.tool_digital_out)),
            "speed_slider_mask" => Ok(DataValue::Uint32(self.speed_slider_mask)),
            "speed_slider_fraction" => Ok(DataValue::Double(self.speed_slider_fraction)),
            "standard_analog_output_mask" => Ok(DataValue::Uint8(self.std_analog_output_mask)),
            "standard_analog_output_type" => Ok(DataValue::Uint8(self.std_analog_output_type)),
            "standard_analog_output_0" => Ok(DataValue::Double(self.std_analog_output_0)),
            "standard_analog_output_1" => Ok(DataValue::Double(self.std_analog_output_1)),
            other => Err(RtdeError::Protocol(format!(
                "Command cannot supply recipe field: {}",
                other
            ))),
        }
    }

    fn register_slot(&self, index: &str, register_offset: u32, limit: usize) -> Result<usize> {
        let register: u32 = index.parse().map_err(|_| {
            RtdeError::Protocol(format!("Malformed register name suffix: {}", index))
        })?;
        let slot = register
            .checked_sub(register_offset)
            .map(|s| s as usize)
            .filter(|s| *s < limit)
            .ok_or_else(|| {
                RtdeError::Protocol(format!(
                    "Register {} outside window starting at {}",
                    register, register_offset
                ))
            })?;
        Ok(slot)
    }

    /// Serialize the full input data-package payload for this command:
    /// recipe id followed by every field the recipe demands, in order.
    pub fn encode_payload(&self, recipe: &Recipe, register_offset: u32) -> Result<Vec<u8>> {
        let mut payload = Vec::with_capacity(1 + recipe.payload_size());
        payload.push(recipe.id);
        for field in &recipe.fields {
            self.field_value(&field.name, register_offset)?
                .write_to(&mut payload);
        }
        Ok(payload)
    }
}
