//! Recipe bookkeeping for RTDE output and input setups.
//!
//! A recipe is the ordered list of variables agreed with the controller
//! during setup, together with the one-byte id the controller assigned to
//! it. The controller's setup reply carries the variable types; the names
//! are the ones the client asked for.

use crate::protocol::ByteCursor;
use crate::{Result, RtdeError};

/// Primitive RTDE variable types with their wire widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Bool,
    Uint8,
    Uint32,
    Uint64,
    Int32,
    Double,
    Vector3d,
    Vector6d,
    Vector6Int32,
    Vector6Uint32,
}

impl DataType {
    /// Parse a type name from a setup reply.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "BOOL" => Ok(DataType::Bool),
            "UINT8" => Ok(DataType::Uint8),
            "UINT32" => Ok(DataType::Uint32),
            "UINT64" => Ok(DataType::Uint64),
            "INT32" => Ok(DataType::Int32),
            "DOUBLE" => Ok(DataType::Double),
            "VECTOR3D" => Ok(DataType::Vector3d),
            "VECTOR6D" => Ok(DataType::Vector6d),
            "VECTOR6INT32" => Ok(DataType::Vector6Int32),
            "VECTOR6UINT32" => Ok(DataType::Vector6Uint32),
            other => Err(RtdeError::Protocol(format!(
                "Unsupported variable type: {}",
                other
            ))),
        }
    }

    /// Wire size in bytes.
    pub fn size(&self) -> usize {
        match self {
            DataType::Bool | DataType::Uint8 => 1,
            DataType::Uint32 | DataType::Int32 => 4,
            DataType::Uint64 | DataType::Double => 8,
            DataType::Vector3d | DataType::Vector6Int32 | DataType::Vector6Uint32 => 24,
            DataType::Vector6d => 48,
        }
    }
}

/// A decoded RTDE variable value.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Bool(bool),
    Uint8(u8),
    Uint32(u32),
    Uint64(u64),
    Int32(i32),
    Double(f64),
    Vector3d([f64; 3]),
    Vector6d([f64; 6]),
    Vector6Int32([i32; 6]),
    Vector6Uint32([u32; 6]),
}

impl DataValue {
    /// Append the big-endian wire form of this value to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            DataValue::Bool(v) => out.push(*v as u8),
            DataValue::Uint8(v) => out.push(*v),
            DataValue::Uint32(v) => out.extend_from_slice(&v.to_be_bytes()),
            DataValue::Uint64(v) => out.extend_from_slice(&v.to_be_bytes()),
            DataValue::Int32(v) => out.extend_from_slice(&v.to_be_bytes()),
            DataValue::Double(v) => out.extend_from_slice(&v.to_be_bytes()),
            DataValue::Vector3d(v) => {
                for x in v {
                    out.extend_from_slice(&x.to_be_bytes());
                }
            }
            DataValue::Vector6d(v) => {
                for x in v {
                    out.extend_from_slice(&x.to_be_bytes());
                }
            }
            DataValue::Vector6Int32(v) => {
                for x in v {
                    out.extend_from_slice(&x.to_be_bytes());
                }
            }
            DataValue::Vector6Uint32(v) => {
                for x in v {
                    out.extend_from_slice(&x.to_be_bytes());
                }
            }
        }
    }

    fn read_from(cursor: &mut ByteCursor<'_>, data_type: DataType) -> Result<Self> {
        Ok(match data_type {
            DataType::Bool => DataValue::Bool(cursor.read_bool()?),
            DataType::Uint8 => DataValue::Uint8(cursor.read_u8()?),
            DataType::Uint32 => DataValue::Uint32(cursor.read_u32()?),
            DataType::Uint64 => DataValue::Uint64(cursor.read_u64()?),
            DataType::Int32 => DataValue::Int32(cursor.read_i32()?),
            DataType::Double => DataValue::Double(cursor.read_f64()?),
            DataType::Vector3d => DataValue::Vector3d(cursor.read_vector3d()?),
            DataType::Vector6d => DataValue::Vector6d(cursor.read_vector6d()?),
            DataType::Vector6Int32 => DataValue::Vector6Int32(cursor.read_vector6_i32()?),
            DataType::Vector6Uint32 => DataValue::Vector6Uint32(cursor.read_vector6_u32()?),
        })
    }
}

/// One named, typed variable of a recipe.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
}

/// A variable list agreed with the controller, addressed by recipe id.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub id: u8,
    pub fields: Vec<Field>,
}

impl Recipe {
    /// Build a recipe from the requested variable names and the raw setup
    /// reply payload (`u8 recipe_id` followed by a comma-separated type
    /// list). Any `NOT_FOUND` or `IN_USE` entry in the reply is fatal.
    pub fn from_setup_reply(names: &[String], payload: &[u8]) -> Result<Self> {
        if payload.is_empty() {
            return Err(RtdeError::Protocol("Empty setup reply".to_string()));
        }
        let id = payload[0];
        let type_list = String::from_utf8_lossy(&payload[1..]);
        let type_names: Vec<&str> = type_list
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();

        if type_names.len() != names.len() {
            return Err(RtdeError::Protocol(format!(
                "Setup reply has {} types for {} requested variables",
                type_names.len(),
                names.len()
            )));
        }

        let mut missing: Vec<&str> = Vec::new();
        let mut in_use: Vec<&str> = Vec::new();
        for (name, type_name) in names.iter().zip(type_names.iter()) {
            match *type_name {
                "NOT_FOUND" => missing.push(name.as_str()),
                "IN_USE" => in_use.push(name.as_str()),
                _ => {}
            }
        }
        if !missing.is_empty() {
            return Err(RtdeError::Protocol(format!(
                "Variables not supported by the controller: [{}]",
                missing.join(", ")
            )));
        }
        if !in_use.is_empty() {
            return Err(RtdeError::Protocol(format!(
                "Input registers already in use by another client: [{}]",
                in_use.join(", ")
            )));
        }

        let mut fields = Vec::with_capacity(names.len());
        for (name, type_name) in names.iter().zip(&type_names) {
            fields.push(Field {
                name: name.clone(),
                data_type: DataType::parse(type_name)?,
            });
        }

        Ok(Recipe { id, fields })
    }

    /// Total payload size of one data package for this recipe, excluding
    /// the leading recipe id byte.
    pub fn payload_size(&self) -> usize {
        self.fields.iter().map(|f| f.data_type.size()).sum()
    }

    /// Decode a data-package body (the bytes after the recipe id) into one
    /// value per field, in recipe order.
    pub fn decode(&self, data: &[u8]) -> Result<Vec<DataValue>> {
        if data.len() != self.payload_size() {
            return Err(RtdeError::Protocol(format!(
                "Data package size mismatch for recipe {}: expected {} bytes, got {}",
                self.id,
                self.payload_size(),
                data.len()
            )));
        }
        let mut cursor = ByteCursor::new(data);
        let mut values = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            values.push(DataValue::read_from(&mut cursor, field.data_type)?);
        }
        Ok(values)
    }
}
