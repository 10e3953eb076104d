//! RTDE wire framing and primitive (de)serialization.
//!
//! Every packet on the wire has the form `[u16 size][u8 type][payload]`
//! where `size` counts the type byte and the payload. All primitives are
//! big-endian; floating point values are IEEE-754.

use crate::{Result, RtdeError};
use std::io::{Read, Write};

/// Size of the `[u16 size][u8 type]` packet header.
pub const HEADER_SIZE: usize = 3;

/// Upper bound on a plausible RTDE packet, used to reject corrupt headers
/// before attempting a large read.
pub const MAX_PACKET_SIZE: u16 = 4096;

/// RTDE packet types as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PackageType {
    RequestProtocolVersion = 86,
    GetControllerVersion = 118,
    TextMessage = 77,
    DataPackage = 85,
    SetupOutputs = 79,
    SetupInputs = 73,
    Start = 83,
    Pause = 80,
}

impl PackageType {
    pub fn from_u8(raw: u8) -> Result<Self> {
        match raw {
            86 => Ok(PackageType::RequestProtocolVersion),
            118 => Ok(PackageType::GetControllerVersion),
            77 => Ok(PackageType::TextMessage),
            85 => Ok(PackageType::DataPackage),
            79 => Ok(PackageType::SetupOutputs),
            73 => Ok(PackageType::SetupInputs),
            83 => Ok(PackageType::Start),
            80 => Ok(PackageType::Pause),
            other => Err(RtdeError::Protocol(format!(
                "Unknown packet type: {}",
                other
            ))),
        }
    }
}

/// Encode a single packet: header plus payload, ready to be written out.
pub fn encode_packet(package_type: PackageType, payload: &[u8]) -> Vec<u8> {
    let size = (HEADER_SIZE + payload.len()) as u16;
    let mut packet = Vec::with_capacity(size as usize);
    packet.extend_from_slice(&size.to_be_bytes());
    packet.push(package_type as u8);
    packet.extend_from_slice(payload);
    packet
}

/// Write one packet to the given writer.
pub fn write_packet<W: Write>(
    writer: &mut W,
    package_type: PackageType,
    payload: &[u8],
) -> Result<()> {
    writer.write_all(&encode_packet(package_type, payload))?;
    Ok(())
}

/// Read exactly one packet from the given reader, blocking until it is
/// complete. A declared size below the header size or above
/// [`MAX_PACKET_SIZE`], or a stream that ends mid-packet, is reported as a
/// corrupt frame.
pub fn read_packet<R: Read>(reader: &mut R) -> Result<(PackageType, Vec<u8>)> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            RtdeError::Connection("Connection closed by controller".to_string())
        } else {
            RtdeError::Io(e)
        }
    })?;

    let size = u16::from_be_bytes([header[0], header[1]]);
    if size < HEADER_SIZE as u16 || size > MAX_PACKET_SIZE {
        return Err(RtdeError::Protocol(format!(
            "Invalid packet size: {}",
            size
        )));
    }
    let package_type = PackageType::from_u8(header[2])?;

    let mut payload = vec![0u8; size as usize - HEADER_SIZE];
    reader.read_exact(&mut payload).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            RtdeError::Protocol(format!(
                "Packet truncated: expected {} payload bytes",
                size as usize - HEADER_SIZE
            ))
        } else {
            RtdeError::Io(e)
        }
    })?;

    Ok((package_type, payload))
}

/// Sequential big-endian reader over a packet payload.
pub struct ByteCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(RtdeError::Protocol(format!(
                "Payload too short: need {} bytes at offset {}, have {}",
                len,
                self.offset,
                self.remaining()
            )));
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let b = self.take(8)?;
        Ok(f64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_vector3d(&mut self) -> Result<[f64; 3]> {
        let mut out = [0.0; 3];
        for v in out.iter_mut() {
            *v = self.read_f64()?;
        }
        Ok(out)
    }

    pub fn read_vector6d(&mut self) -> Result<[f64; 6]> {
        let mut out = [0.0; 6];
        for v in out.iter_mut() {
            *v = self.read_f64()?;
        }
        Ok(out)
    }

    pub fn read_vector6_i32(&mut self) -> Result<[i32; 6]> {
        let mut out = [0i32; 6];
        for v in out.iter_mut() {
            *v = self.read_i32()?;
        }
        Ok(out)
    }

    pub fn read_vector6_u32(&mut self) -> Result<[u32; 6]> {
        let mut out = [0u32; 6];
        for v in out.iter_mut() {
            *v = self.read_u32()?;
        }
        Ok(out)
    }
}
