//! Bit-exact encoding and decoding of LIFX LAN protocol frames.
//!
//! Every frame is a 36-byte header followed by a type-specific payload.
//! The header packs three sections: Frame (size, protocol bitfield, source
//! identifier), FrameAddress (target, flags, sequence) and ProtocolHeader
//! (message type). All multi-byte integers are little-endian.

use bytes::{Buf, BufMut};

use crate::error::{LichtError, Result};

/// Well-known LIFX UDP port, for unicast and broadcast alike
pub const LIFX_PORT: u16 = 56700;

/// Size of the fixed frame header in bytes
pub const HEADER_SIZE: usize = 36;

/// Protocol number carried in the Frame bitfield, always 1024
pub const PROTOCOL_NUMBER: u16 = 1024;

/// Service value in StateService that denotes the UDP service
pub const SERVICE_UDP: u8 = 1;

/// Length of an echo payload in bytes
pub const ECHO_PAYLOAD_SIZE: usize = 64;

/// Length of a device label field in bytes
pub const LABEL_SIZE: usize = 32;

/// Message types the client sends or understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    GetService = 2,
    StateService = 3,
    GetPower = 20,
    SetPower = 21,
    StatePower = 22,
    GetLabel = 23,
    StateLabel = 25,
    Acknowledgement = 45,
    EchoRequest = 58,
    EchoResponse = 59,
    LightGet = 101,
    LightSetColor = 102,
    LightState = 107,
}

impl MessageType {
    /// Map a wire value to a known message type
    pub fn from_wire(value: u16) -> Result<Self> {
        match value {
            2 => Ok(Self::GetService),
            3 => Ok(Self::StateService),
            20 => Ok(Self::GetPower),
            21 => Ok(Self::SetPower),
            22 => Ok(Self::StatePower),
            23 => Ok(Self::GetLabel),
            25 => Ok(Self::StateLabel),
            45 => Ok(Self::Acknowledgement),
            58 => Ok(Self::EchoRequest),
            59 => Ok(Self::EchoResponse),
            101 => Ok(Self::LightGet),
            102 => Ok(Self::LightSetColor),
            107 => Ok(Self::LightState),
            other => Err(LichtError::UnsupportedMessage(other)),
        }
    }
}

/// Raw hue/saturation/brightness/kelvin quadruple as carried on the wire.
///
/// All fields are full-range u16; `saturation == 0` signals white mode.
/// Conversion to and from the typed [`LightColor`](crate::LightColor)
/// representation lives in the color module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsbk {
    pub hue: u16,
    pub saturation: u16,
    pub brightness: u16,
    pub kelvin: u16,
}

impl Hsbk {
    fn read(buf: &mut &[u8]) -> Self {
        Self {
            hue: buf.get_u16_le(),
            saturation: buf.get_u16_le(),
            brightness: buf.get_u16_le(),
            kelvin: buf.get_u16_le(),
        }
    }

    fn write(&self, buf: &mut Vec<u8>) {
        buf.put_u16_le(self.hue);
        buf.put_u16_le(self.saturation);
        buf.put_u16_le(self.brightness);
        buf.put_u16_le(self.kelvin);
    }
}

/// Encode a label string into the fixed 32-byte NUL-padded wire field.
///
/// Input longer than 32 bytes is truncated at a character boundary.
pub fn encode_label(label: &str) -> [u8; LABEL_SIZE] {
    let mut out = [0u8; LABEL_SIZE];
    let mut end = label.len().min(LABEL_SIZE);
    while !label.is_char_boundary(end) {
        end -= 1;
    }
    out[..end].copy_from_slice(&label.as_bytes()[..end]);
    out
}

/// Decode a fixed 32-byte label field, stripping NUL padding
pub fn decode_label(raw: &[u8; LABEL_SIZE]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(LABEL_SIZE);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Typed payload of a frame, one variant per supported message type
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    GetService,
    StateService { service: u8, port: u32 },
    GetPower,
    SetPower { level: u16 },
    StatePower { level: u16 },
    GetLabel,
    StateLabel { label: [u8; LABEL_SIZE] },
    Acknowledgement,
    EchoRequest { payload: [u8; ECHO_PAYLOAD_SIZE] },
    EchoResponse { payload: [u8; ECHO_PAYLOAD_SIZE] },
    LightGet,
    LightSetColor { color: Hsbk, duration_ms: u32 },
    LightState { color: Hsbk, power: u16, label: [u8; LABEL_SIZE] },
}

impl Payload {
    /// The message type this payload is carried under
    pub fn message_type(&self) -> MessageType {
        match self {
            Payload::GetService => MessageType::GetService,
            Payload::StateService { .. } => MessageType::StateService,
            Payload::GetPower => MessageType::GetPower,
            Payload::SetPower { .. } => MessageType::SetPower,
            Payload::StatePower { .. } => MessageType::StatePower,
            Payload::GetLabel => MessageType::GetLabel,
            Payload::StateLabel { .. } => MessageType::StateLabel,
            Payload::Acknowledgement => MessageType::Acknowledgement,
            Payload::EchoRequest { .. } => MessageType::EchoRequest,
            Payload::EchoResponse { .. } => MessageType::EchoResponse,
            Payload::LightGet => MessageType::LightGet,
            Payload::LightSetColor { .. } => MessageType::LightSetColor,
            Payload::LightState { .. } => MessageType::LightState,
        }
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Payload::GetService
            | Payload::GetPower
            | Payload::GetLabel
            | Payload::Acknowledgement
            | Payload::LightGet => {}
            Payload::StateService { service, port } => {
                buf.put_u8(*service);
                buf.put_u32_le(*port);
            }
            Payload::SetPower { level } | Payload::StatePower { level } => {
                buf.put_u16_le(*level);
            }
            Payload::StateLabel { label } => {
                buf.put_slice(label);
            }
            Payload::EchoRequest { payload } | Payload::EchoResponse { payload } => {
                buf.put_slice(payload);
            }
            Payload::LightSetColor { color, duration_ms } => {
                buf.put_u8(0); // reserved
                color.write(buf);
                buf.put_u32_le(*duration_ms);
            }
            Payload::LightState { color, power, label } => {
                color.write(buf);
                buf.put_u16_le(0); // reserved
                buf.put_u16_le(*power);
                buf.put_slice(label);
                buf.put_u64_le(0); // reserved
            }
        }
    }

    fn decode(message_type: MessageType, mut buf: &[u8]) -> Result<Self> {
        let got = buf.len();
        let expect = move |want: usize| -> Result<()> {
            if got == want {
                Ok(())
            } else {
                Err(LichtError::MalformedFrame(format!(
                    "{:?} payload is {} bytes, expected {}",
                    message_type, got, want
                )))
            }
        };

        match message_type {
            MessageType::GetService => {
                expect(0)?;
                Ok(Payload::GetService)
            }
            MessageType::StateService => {
                expect(5)?;
                Ok(Payload::StateService {
                    service: buf.get_u8(),
                    port: buf.get_u32_le(),
                })
            }
            MessageType::GetPower => {
                expect(0)?;
                Ok(Payload::GetPower)
            }
            MessageType::SetPower => {
                expect(2)?;
                Ok(Payload::SetPower {
                    level: buf.get_u16_le(),
                })
            }
            MessageType::StatePower => {
                expect(2)?;
                Ok(Payload::StatePower {
                    level: buf.get_u16_le(),
                })
            }
            MessageType::GetLabel => {
                expect(0)?;
                Ok(Payload::GetLabel)
            }
            MessageType::StateLabel => {
                expect(LABEL_SIZE)?;
                let mut label = [0u8; LABEL_SIZE];
                buf.copy_to_slice(&mut label);
                Ok(Payload::StateLabel { label })
            }
            MessageType::Acknowledgement => {
                expect(0)?;
                Ok(Payload::Acknowledgement)
            }
            MessageType::EchoRequest | MessageType::EchoResponse => {
                expect(ECHO_PAYLOAD_SIZE)?;
                let mut payload = [0u8; ECHO_PAYLOAD_SIZE];
                buf.copy_to_slice(&mut payload);
                if message_type == MessageType::EchoRequest {
                    Ok(Payload::EchoRequest { payload })
                } else {
                    Ok(Payload::EchoResponse { payload })
                }
            }
            MessageType::LightGet => {
                expect(0)?;
                Ok(Payload::LightGet)
            }
            MessageType::LightSetColor => {
                expect(13)?;
                buf.advance(1); // reserved
                Ok(Payload::LightSetColor {
                    color: Hsbk::read(&mut buf),
                    duration_ms: buf.get_u32_le(),
                })
            }
            MessageType::LightState => {
                expect(8 + 2 + 2 + LABEL_SIZE + 8)?;
                let color = Hsbk::read(&mut buf);
                buf.advance(2); // reserved
                let power = buf.get_u16_le();
                let mut label = [0u8; LABEL_SIZE];
                buf.copy_to_slice(&mut label);
                Ok(Payload::LightState { color, power, label })
            }
        }
    }
}

/// One complete protocol frame: header fields plus typed payload.
///
/// `encode` computes and writes the size field; `decode` is its exact
/// inverse and fails with [`LichtError::MalformedFrame`] when the declared
/// size disagrees with the buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Broadcast-style frame, set when the target field is unused
    pub tagged: bool,
    /// 32-bit identifier chosen by the sender; devices echo it in replies
    pub source: u32,
    /// Hardware target (MAC in the low 6 bytes), zero for broadcast queries
    pub target: u64,
    /// Request an Acknowledgement message from the device
    pub ack_required: bool,
    /// Request a State response message from the device
    pub res_required: bool,
    /// Wrapping per-backend sequence number
    pub sequence: u8,
    pub payload: Payload,
}

impl Packet {
    /// Serialize the frame; the leading size field always equals the
    /// returned buffer's length
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        self.payload.encode_into(&mut payload);

        let size = (HEADER_SIZE + payload.len()) as u16;
        let mut buf = Vec::with_capacity(size as usize);

        // Frame
        buf.put_u16_le(size);
        let mut bitfield: u16 = PROTOCOL_NUMBER & 0x0fff;
        bitfield |= 1 << 12; // addressable
        if self.tagged {
            bitfield |= 1 << 13;
        }
        buf.put_u16_le(bitfield);
        buf.put_u32_le(self.source);

        // FrameAddress
        buf.put_u64_le(self.target);
        buf.put_slice(&[0u8; 6]);
        let mut flags: u8 = 0;
        if self.ack_required {
            flags |= 0b10;
        }
        if self.res_required {
            flags |= 0b01;
        }
        buf.put_u8(flags);
        buf.put_u8(self.sequence);

        // ProtocolHeader
        buf.put_u64_le(0);
        buf.put_u16_le(self.payload.message_type() as u16);
        buf.put_u16_le(0);

        buf.extend_from_slice(&payload);
        buf
    }

    /// Parse a frame from a received datagram
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(LichtError::MalformedFrame(format!(
                "datagram is {} bytes, header needs {}",
                data.len(),
                HEADER_SIZE
            )));
        }

        let mut buf = data;
        let size = buf.get_u16_le();
        if size as usize != data.len() {
            return Err(LichtError::MalformedFrame(format!(
                "size field says {} but datagram is {} bytes",
                size,
                data.len()
            )));
        }

        let bitfield = buf.get_u16_le();
        let protocol = bitfield & 0x0fff;
        if protocol != PROTOCOL_NUMBER {
            return Err(LichtError::MalformedFrame(format!(
                "protocol number {} is not {}",
                protocol, PROTOCOL_NUMBER
            )));
        }
        let tagged = bitfield & (1 << 13) != 0;
        let source = buf.get_u32_le();

        let target = buf.get_u64_le();
        buf.advance(6); // reserved
        let flags = buf.get_u8();
        let ack_required = flags & 0b10 != 0;
        let res_required = flags & 0b01 != 0;
        let sequence = buf.get_u8();

        buf.advance(8); // reserved
        let message_type = MessageType::from_wire(buf.get_u16_le())?;
        buf.advance(2); // reserved

        let payload = Payload::decode(message_type, buf)?;

        Ok(Packet {
            tagged,
            source,
            target,
            ack_required,
            res_required,
            sequence,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(payload: Payload) -> Packet {
        Packet {
            tagged: false,
            source: 0x6c636874,
            target: 0xd073d5_001122,
            ack_required: false,
            res_required: true,
            sequence: 42,
            payload,
        }
    }

    #[test]
    fn roundtrip_every_payload() {
        let color = Hsbk {
            hue: 21845,
            saturation: 65535,
            brightness: 32768,
            kelvin: 3500,
        };
        let payloads = vec![
            Payload::GetService,
            Payload::StateService {
                service: SERVICE_UDP,
                port: LIFX_PORT as u32,
            },
            Payload::GetPower,
            Payload::SetPower { level: 65535 },
            Payload::StatePower { level: 0 },
            Payload::GetLabel,
            Payload::StateLabel {
                label: encode_label("Kitchen"),
            },
            Payload::Acknowledgement,
            Payload::EchoRequest { payload: [7; 64] },
            Payload::EchoResponse { payload: [7; 64] },
            Payload::LightGet,
            Payload::LightSetColor {
                color,
                duration_ms: 250,
            },
            Payload::LightState {
                color,
                power: 65535,
                label: encode_label("Kitchen"),
            },
        ];

        for payload in payloads {
            let original = packet(payload);
            let bytes = original.encode();
            let decoded = Packet::decode(&bytes).unwrap();
            assert_eq!(original, decoded);
        }
    }

    #[test]
    fn header_byte_layout() {
        let p = Packet {
            tagged: true,
            source: 0x04030201,
            target: 0x0000_665544332211,
            ack_required: true,
            res_required: false,
            sequence: 0xab,
            payload: Payload::GetService,
        };
        let bytes = p.encode();
        assert_eq!(bytes.len(), HEADER_SIZE);

        // size, little-endian
        assert_eq!(bytes[0], 36);
        assert_eq!(bytes[1], 0);

        // tagged | addressable | protocol 1024 = 0x3400
        assert_eq!(bytes[2], 0x00);
        assert_eq!(bytes[3], 0x34);

        // source, little-endian
        assert_eq!(&bytes[4..8], &[0x01, 0x02, 0x03, 0x04]);

        // target MAC in the low bytes
        assert_eq!(&bytes[8..14], &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);

        // ack bit, sequence
        assert_eq!(bytes[22], 0b10);
        assert_eq!(bytes[23], 0xab);

        // message type 2, little-endian
        assert_eq!(bytes[32], 2);
        assert_eq!(bytes[33], 0);
    }

    #[test]
    fn power_request_with_sequence_seven() {
        let request = Packet {
            tagged: false,
            source: 1,
            target: 0xabcdef,
            ack_required: false,
            res_required: true,
            sequence: 7,
            payload: Payload::GetPower,
        };
        let bytes = request.encode();
        let declared = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
        assert_eq!(declared, bytes.len());

        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded.sequence, 7);
        assert_eq!(decoded.payload.message_type(), MessageType::GetPower);
    }

    #[test]
    fn size_mismatch_is_malformed() {
        let mut bytes = packet(Payload::GetPower).encode();
        bytes.push(0);
        assert!(matches!(
            Packet::decode(&bytes),
            Err(LichtError::MalformedFrame(_))
        ));
    }

    #[test]
    fn truncated_header_is_malformed() {
        let bytes = packet(Payload::GetPower).encode();
        assert!(matches!(
            Packet::decode(&bytes[..HEADER_SIZE - 1]),
            Err(LichtError::MalformedFrame(_))
        ));
    }

    #[test]
    fn wrong_protocol_number_is_malformed() {
        let mut bytes = packet(Payload::GetPower).encode();
        bytes[2] = 0xff; // clobber the protocol bits
        assert!(matches!(
            Packet::decode(&bytes),
            Err(LichtError::MalformedFrame(_))
        ));
    }

    #[test]
    fn unknown_message_type_is_unsupported() {
        let mut bytes = packet(Payload::GetPower).encode();
        bytes[32] = 0xff;
        bytes[33] = 0xff;
        assert!(matches!(
            Packet::decode(&bytes),
            Err(LichtError::UnsupportedMessage(0xffff))
        ));
    }

    #[test]
    fn payload_length_mismatch_is_malformed() {
        // StatePower with a 3-byte payload instead of 2
        let mut bytes = packet(Payload::StatePower { level: 1 }).encode();
        bytes.push(0);
        let size = (bytes.len() as u16).to_le_bytes();
        bytes[0] = size[0];
        bytes[1] = size[1];
        assert!(matches!(
            Packet::decode(&bytes),
            Err(LichtError::MalformedFrame(_))
        ));
    }

    #[test]
    fn label_roundtrip_strips_padding() {
        let raw = encode_label("Schlafzimmer");
        assert_eq!(decode_label(&raw), "Schlafzimmer");
        assert_eq!(decode_label(&encode_label("")), "");
    }
}
