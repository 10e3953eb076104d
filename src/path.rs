//! Client-side path composition for multi-waypoint moves.
//!
//! A path is serialized into URScript, one move call per waypoint, with a
//! progress-register write before each move so async callers can follow
//! execution. The resulting text is uploaded through the script client as
//! a one-shot program.

use crate::{Result, RtdeError};

/// Move command used for one waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveType {
    MoveJ,
    MoveL,
    MoveP,
    MoveC,
}

/// Interpretation of a waypoint's six position values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionType {
    TcpPose,
    Joints,
}

/// One waypoint: six position values followed by velocity, acceleration
/// and blend radius. `MoveC` waypoints carry a via pose and a target pose
/// (twelve position values) before the three scalars.
#[derive(Debug, Clone)]
pub struct PathEntry {
    pub move_type: MoveType,
    pub position_type: PositionType,
    pub parameters: Vec<f64>,
}

impl PathEntry {
    pub fn new(move_type: MoveType, position_type: PositionType, parameters: Vec<f64>) -> Self {
        Self {
            move_type,
            position_type,
            parameters,
        }
    }

    fn expected_parameter_count(&self) -> usize {
        match self.move_type {
            MoveType::MoveC => 15,
            _ => 9,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.parameters.len() != self.expected_parameter_count() {
            return Err(RtdeError::Validation(format!(
                "{:?} waypoint needs {} parameters, got {}",
                self.move_type,
                self.expected_parameter_count(),
                self.parameters.len()
            )));
        }
        if self.parameters.iter().any(|v| v.is_nan()) {
            return Err(RtdeError::Validation(
                "Waypoint contains NaN values".to_string(),
            ));
        }
        Ok(())
    }

    /// Velocity, acceleration, blend triple of this waypoint.
    pub(crate) fn profile(&self) -> (f64, f64, f64) {
        let n = self.parameters.len();
        (
            self.parameters[n - 3],
            self.parameters[n - 2],
            self.parameters[n - 1],
        )
    }

    /// The URScript move call for this waypoint.
    pub fn to_script_line(&self) -> String {
        let (velocity, acceleration, blend) = self.profile();
        let position = format_values(&self.parameters[..6]);
        match (self.move_type, self.position_type) {
            (MoveType::MoveJ, PositionType::Joints) => format!(
                "movej([{}], a={}, v={}, r={})",
                position,
                format_value(acceleration),
                format_value(velocity),
                format_value(blend)
            ),
            (MoveType::MoveJ, PositionType::TcpPose) => format!(
                "movej(get_inverse_kin(p[{}]), a={}, v={}, r={})",
                position,
                format_value(acceleration),
                format_value(velocity),
                format_value(blend)
            ),
            (MoveType::MoveL, PositionType::TcpPose) => format!(
                "movel(p[{}], a={}, v={}, r={})",
                position,
                format_value(acceleration),
                format_value(velocity),
                format_value(blend)
            ),
            (MoveType::MoveL, PositionType::Joints) => format!(
                "movel([{}], a={}, v={}, r={})",
                position,
                format_value(acceleration),
                format_value(velocity),
                format_value(blend)
            ),
            (MoveType::MoveP, _) => format!(
                "movep(p[{}], a={}, v={}, r={})",
                position,
                format_value(acceleration),
                format_value(velocity),
                format_value(blend)
            ),
            (MoveType::MoveC, _) => format!(
                "movec(p[{}], p[{}], a={}, v={}, r={})",
                position,
                format_values(&self.parameters[6..12]),
                format_value(acceleration),
                format_value(velocity),
                format_value(blend)
            ),
        }
    }
}

/// An ordered list of waypoints. Move types may be mixed freely.
#[derive(Debug, Clone, Default)]
pub struct Path {
    waypoints: Vec<PathEntry>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, entry: PathEntry) -> &mut Self {
        self.waypoints.push(entry);
        self
    }

    pub fn clear(&mut self) {
        self.waypoints.clear();
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn waypoints(&self) -> &[PathEntry] {
        &self.waypoints
    }

    /// Append joint-space waypoints given as `[q0..q5, velocity,
    /// acceleration, blend]` rows.
    pub fn append_movej_path(&mut self, path: &[Vec<f64>]) -> &mut Self {
        for row in path {
            self.add_entry(PathEntry::new(
                MoveType::MoveJ,
                PositionType::Joints,
                row.clone(),
            ));
        }
        self
    }

    /// Append tool-space waypoints given as `[pose, velocity,
    /// acceleration, blend]` rows.
    pub fn append_movel_path(&mut self, path: &[Vec<f64>]) -> &mut Self {
        for row in path {
            self.add_entry(PathEntry::new(
                MoveType::MoveL,
                PositionType::TcpPose,
                row.clone(),
            ));
        }
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.waypoints.is_empty() {
            return Err(RtdeError::Validation("Path has no waypoints".to_string()));
        }
        for entry in &self.waypoints {
            entry.validate()?;
        }
        Ok(())
    }

    /// Script body for the whole path: a progress-register write before
    /// each waypoint, the idle marker after the last one.
    pub fn to_script_code(&self, register_offset: u32) -> String {
        let progress_register = register_offset + 1;
        let mut code = String::new();
        for (index, entry) in self.waypoints.iter().enumerate() {
            code.push_str(&format!(
                "    write_output_integer_register({}, {})\n",
                progress_register, index
            ));
            code.push_str("    ");
            code.push_str(&entry.to_script_line());
            code.push('\n');
        }
        code.push_str(&format!(
            "    write_output_integer_register({}, -1)\n",
            progress_register
        ));
        code
    }
}

fn format_value(value: f64) -> String {
    format!("{:.6}", value)
}

fn format_values(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format_value(*v))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movel_entry(z: f64, blend: f64) -> PathEntry {
        PathEntry::new(
            MoveType::MoveL,
            PositionType::TcpPose,
            vec![-0.14, -0.4, z, 0.0, 3.14, 0.0, 0.5, 4.0, blend],
        )
    }

    #[test]
    fn test_movej_joint_line() {
        let entry = PathEntry::new(
            MoveType::MoveJ,
            PositionType::Joints,
            vec![0.0, -1.57, 0.0, -1.57, 0.0, 0.0, 1.05, 1.4, 0.0],
        );
        assert_eq!(
            entry.to_script_line(),
            "movej([0.000000,-1.570000,0.000000,-1.570000,0.000000,0.000000], \
             a=1.400000, v=1.050000, r=0.000000)"
        );
    }

    #[test]
    fn test_movej_pose_uses_inverse_kinematics() {
        let entry = PathEntry::new(
            MoveType::MoveJ,
            PositionType::TcpPose,
            vec![-0.14, -0.4, 0.1, 0.0, 3.14, 0.0, 0.5, 4.0, 0.0],
        );
        let line = entry.to_script_line();
        assert!(line.starts_with("movej(get_inverse_kin(p["));
        assert!(line.ends_with("r=0.000000)"));
    }

    #[test]
    fn test_movec_uses_both_poses() {
        let entry = PathEntry::new(
            MoveType::MoveC,
            PositionType::TcpPose,
            vec![
                0.1, 0.2, 0.3, 0.0, 3.14, 0.0, // via
                0.4, 0.5, 0.6, 0.0, 3.14, 0.0, // target
                0.25, 1.2, 0.05,
            ],
        );
        let line = entry.to_script_line();
        assert!(line.starts_with("movec(p[0.100000,"));
        assert!(line.contains("p[0.400000,"));
        assert!(line.ends_with("r=0.050000)"));
    }

    #[test]
    fn test_parameter_count_is_validated() {
        let entry = PathEntry::new(MoveType::MoveL, PositionType::TcpPose, vec![0.0; 8]);
        assert!(entry.validate().is_err());

        let entry = PathEntry::new(MoveType::MoveC, PositionType::TcpPose, vec![0.0; 9]);
        assert!(entry.validate().is_err());
    }

    #[test]
    fn test_nan_is_rejected() {
        let mut parameters = vec![0.0; 9];
        parameters[2] = f64::NAN;
        let entry = PathEntry::new(MoveType::MoveL, PositionType::TcpPose, parameters);
        assert!(entry.validate().is_err());
    }

    #[test]
    fn test_path_script_has_progress_writes() {
        let mut path = Path::new();
        path.add_entry(movel_entry(0.1, 0.099));
        path.add_entry(movel_entry(0.3, 0.0));

        let code = path.to_script_code(0);
        let lines: Vec<&str> = code.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "    write_output_integer_register(1, 0)");
        assert!(lines[1].trim_start().starts_with("movel(p["));
        assert_eq!(lines[2], "    write_output_integer_register(1, 1)");
        assert_eq!(lines[4], "    write_output_integer_register(1, -1)");
    }

    #[test]
    fn test_path_script_respects_register_window() {
        let mut path = Path::new();
        path.add_entry(movel_entry(0.1, 0.0));
        let code = path.to_script_code(24);
        assert!(code.contains("write_output_integer_register(25, 0)"));
        assert!(code.contains("write_output_integer_register(25, -1)"));
    }

    #[test]
    fn test_append_helpers() {
        let mut path = Path::new();
        path.append_movej_path(&[vec![0.0, -1.57, 0.0, -1.57, 0.0, 0.0, 1.05, 1.4, 0.0]]);
        path.append_movel_path(&[vec![-0.14, -0.4, 0.1, 0.0, 3.14, 0.0, 0.25, 1.2, 0.0]]);
        assert_eq!(path.len(), 2);
        assert_eq!(path.waypoints()[0].move_type, MoveType::MoveJ);
        assert_eq!(path.waypoints()[1].move_type, MoveType::MoveL);
        assert!(path.validate().is_ok());
    }
}
