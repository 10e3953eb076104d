//! Most-recently-received robot state snapshot.
//!
//! The receive loop is the only writer; everything else takes shared read
//! holds through the surrounding `RwLock`. A reader always observes a
//! complete frame, never a partially applied one.

use crate::recipe::{DataValue, Recipe};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Bit positions within `robot_status_bits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RobotStatusBit {
    PowerOn = 0,
    ProgramRunning = 1,
    TeachButtonPressed = 2,
    PowerButtonPressed = 3,
}

/// Bit positions within `safety_status_bits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SafetyStatusBit {
    NormalMode = 0,
    ReducedMode = 1,
    ProtectiveStopped = 2,
    RecoveryMode = 3,
    SafeguardStopped = 4,
    SystemEmergencyStopped = 5,
    RobotEmergencyStopped = 6,
    EmergencyStopped = 7,
    Violation = 8,
    Fault = 9,
    StoppedDueToSafety = 10,
}

/// Snapshot of all subscribed output variables, keyed by variable name.
#[derive(Debug, Default)]
pub struct RobotState {
    values: HashMap<String, DataValue>,
    first_state_received: bool,
}

/// Shared handle to a snapshot: one writer (the receive loop), any number
/// of readers.
pub type SharedRobotState = Arc<RwLock<RobotState>>;

pub fn shared_robot_state() -> SharedRobotState {
    Arc::new(RwLock::new(RobotState::new()))
}

impl RobotState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one decoded output frame. Called with the write lock held, so
    /// readers see either the previous or the new frame in full.
    pub(crate) fn update(&mut self, recipe: &Recipe, values: Vec<DataValue>) {
        for (field, value) in recipe.fields.iter().zip(values) {
            self.values.insert(field.name.clone(), value);
        }
        self.first_state_received = true;
    }

    /// True once at least one output frame has been decoded.
    pub fn first_state_received(&self) -> bool {
        self.first_state_received
    }

    pub fn value(&self, name: &str) -> Option<&DataValue> {
        self.values.get(name)
    }

    pub fn double(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(DataValue::Double(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn uint32(&self, name: &str) -> Option<u32> {
        match self.values.get(name) {
            Some(DataValue::Uint32(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn uint64(&self, name: &str) -> Option<u64> {
        match self.values.get(name) {
            Some(DataValue::Uint64(v)) => Some(*v),
            // Digital IO words are UINT64 on e-Series but UINT32 on older
            // controllers.
            Some(DataValue::Uint32(v)) => Some(*v as u64),
            _ => None,
        }
    }

    pub fn int32(&self, name: &str) -> Option<i32> {
        match self.values.get(name) {
            Some(DataValue::Int32(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn vector3d(&self, name: &str) -> Option<[f64; 3]> {
        match self.values.get(name) {
            Some(DataValue::Vector3d(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn vector6d(&self, name: &str) -> Option<[f64; 6]> {
        match self.values.get(name) {
            Some(DataValue::Vector6d(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn vector6_i32(&self, name: &str) -> Option<[i32; 6]> {
        match self.values.get(name) {
            Some(DataValue::Vector6Int32(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn robot_status_bit(&self, bit: RobotStatusBit) -> Option<bool> {
        self.uint32("robot_status_bits")
            .map(|bits| bits & (1 << bit as u32) != 0)
    }

    pub fn safety_status_bit(&self, bit: SafetyStatusBit) -> Option<bool> {
        self.uint32("safety_status_bits")
            .map(|bits| bits & (1 << bit as u32) != 0)
    }

    pub fn output_int_register(&self, register: u32) -> Option<i32> {
        self.int32(&format!("output_int_register_{}", register))
    }

    pub fn output_double_register(&self, register: u32) -> Option<f64> {
        self.double(&format!("output_double_register_{}", register))
    }
}
