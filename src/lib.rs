//! Client library for the Universal Robots Real-Time Data Exchange (RTDE)
//! interface.
//!
//! Connects to the robot controller on port 30004, negotiates the binary
//! RTDE protocol, streams state telemetry at the controller's rate, and
//! issues motion, I/O, and configuration commands through a register
//! mailbox serviced by a control script uploaded over the secondary port.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ur_rtde::{RtdeControlInterface, RtdeReceiveInterface};
//!
//! fn main() -> ur_rtde::Result<()> {
//!     let control = RtdeControlInterface::new("192.168.56.101")?;
//!     let receive = RtdeReceiveInterface::new("192.168.56.101")?;
//!
//!     // Move the base joint by ~30 degrees
//!     let mut q = receive.actual_q();
//!     q[0] += 0.5235;
//!     control.move_j(&q, 1.05, 1.4, false)?;
//!
//!     println!("TCP pose: {:?}", receive.actual_tcp_pose());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **RtdeClient**: one RTDE session (socket, negotiation, recipes,
//!   start/pause, frame codec)
//! - **RtdeControlInterface**: command channel over the register mailbox
//! - **RtdeReceiveInterface**: telemetry streaming with typed getters
//! - **RtdeIoInterface**: digital/analog/speed-slider writes without the
//!   control script
//! - **ScriptClient** / **DashboardClient**: collaborators on ports
//!   30002 and 29999

pub mod command;
pub mod config;
pub mod control;
mod control_script;
pub mod dashboard;
pub mod error;
pub mod io;
pub mod path;
pub mod protocol;
pub mod receive;
pub mod recipe;
pub mod robot_state;
pub mod rtde;
pub mod script;

// High-level exports for easy usage
pub use config::ClientConfig;
pub use control::{ControlOptions, Feature, RtdeControlInterface};
pub use dashboard::DashboardClient;
pub use error::{Result, RtdeError};
pub use io::RtdeIoInterface;
pub use path::{MoveType, Path, PathEntry, PositionType};
pub use receive::RtdeReceiveInterface;

// Core component exports for advanced usage
pub use command::{CommandCode, RobotCommand};
pub use control::{UR_CONTROLLER_DONE_WITH_CMD, UR_CONTROLLER_RDY_FOR_CMD};
pub use recipe::{DataType, DataValue, Recipe};
pub use robot_state::{RobotState, RobotStatusBit, SafetyStatusBit};
pub use rtde::{ConnectionState, ControllerVersion, RtdeClient, CB3_MAJOR_VERSION, RTDE_PORT};
pub use script::ScriptClient;
