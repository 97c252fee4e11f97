use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use rfdlink_frame::packet_type::{MOTOR_COMMAND, PING, SENSOR_DATA, TEXT_MESSAGE};
use rfdlink_frame::Packet;
use serde::{Serialize, Serializer};

use crate::error::PayloadError;

const MOTOR_PAYLOAD_LEN: usize = 8;
const SENSOR_PAYLOAD_LEN: usize = 12;

/// Application-level content of a packet, keyed by packet type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// Type 0. Any payload is accepted and ignored.
    Ping,
    /// Type 1. Left and right drive speeds.
    MotorCommand { left: f32, right: f32 },
    /// Type 2.
    TextMessage { text: String },
    /// Type 3. Temperature (°C), relative humidity (%), pressure (hPa).
    SensorData {
        temperature: f32,
        humidity: f32,
        pressure: f32,
    },
    /// Any other type; the payload is passed through untouched.
    Unknown {
        packet_type: u8,
        #[serde(serialize_with = "serialize_hex")]
        payload: Bytes,
    },
}

impl Message {
    pub fn motor(left: f32, right: f32) -> Self {
        Self::MotorCommand { left, right }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::TextMessage { text: text.into() }
    }

    pub fn sensor(temperature: f32, humidity: f32, pressure: f32) -> Self {
        Self::SensorData {
            temperature,
            humidity,
            pressure,
        }
    }

    /// Interpret a packet's payload according to its type.
    pub fn from_packet(packet: &Packet) -> Result<Self, PayloadError> {
        Self::decode(packet.packet_type(), packet.payload())
    }

    /// Interpret `payload` as a message of `packet_type`.
    pub fn decode(packet_type: u8, payload: &Bytes) -> Result<Self, PayloadError> {
        match packet_type {
            PING => Ok(Self::Ping),
            MOTOR_COMMAND => {
                let [left, right] = read_f32s::<2>(packet_type, payload)?;
                Ok(Self::MotorCommand { left, right })
            }
            TEXT_MESSAGE => {
                let text = std::str::from_utf8(payload)?;
                Ok(Self::TextMessage {
                    text: text.to_owned(),
                })
            }
            SENSOR_DATA => {
                let [temperature, humidity, pressure] = read_f32s::<3>(packet_type, payload)?;
                Ok(Self::SensorData {
                    temperature,
                    humidity,
                    pressure,
                })
            }
            other => Ok(Self::Unknown {
                packet_type: other,
                payload: payload.clone(),
            }),
        }
    }

    pub fn packet_type(&self) -> u8 {
        match self {
            Self::Ping => PING,
            Self::MotorCommand { .. } => MOTOR_COMMAND,
            Self::TextMessage { .. } => TEXT_MESSAGE,
            Self::SensorData { .. } => SENSOR_DATA,
            Self::Unknown { packet_type, .. } => *packet_type,
        }
    }

    /// Payload bytes for the wire. Floats are big-endian IEEE-754.
    pub fn to_payload(&self) -> Bytes {
        match self {
            Self::Ping => Bytes::new(),
            Self::MotorCommand { left, right } => {
                let mut buf = BytesMut::with_capacity(MOTOR_PAYLOAD_LEN);
                buf.put_f32(*left);
                buf.put_f32(*right);
                buf.freeze()
            }
            Self::TextMessage { text } => Bytes::copy_from_slice(text.as_bytes()),
            Self::SensorData {
                temperature,
                humidity,
                pressure,
            } => {
                let mut buf = BytesMut::with_capacity(SENSOR_PAYLOAD_LEN);
                buf.put_f32(*temperature);
                buf.put_f32(*humidity);
                buf.put_f32(*pressure);
                buf.freeze()
            }
            Self::Unknown { payload, .. } => payload.clone(),
        }
    }

    /// Build the packet that carries this message.
    pub fn to_packet(&self, sequence: u16) -> rfdlink_frame::Result<Packet> {
        Packet::new(self.packet_type(), sequence, self.to_payload())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ping => write!(f, "PING"),
            Self::MotorCommand { left, right } => {
                write!(f, "MOTOR left={left:.2} right={right:.2}")
            }
            Self::TextMessage { text } => write!(f, "TEXT {text:?}"),
            Self::SensorData {
                temperature,
                humidity,
                pressure,
            } => write!(
                f,
                "SENSOR temperature={temperature:.1}C humidity={humidity:.1}% pressure={pressure:.2}hPa"
            ),
            Self::Unknown {
                packet_type,
                payload,
            } => write!(f, "UNKNOWN type={packet_type} payload={}", hex(payload)),
        }
    }
}

fn read_f32s<const N: usize>(packet_type: u8, payload: &[u8]) -> Result<[f32; N], PayloadError> {
    if payload.len() != N * 4 {
        return Err(PayloadError::Length {
            packet_type,
            expected: N * 4,
            actual: payload.len(),
        });
    }
    let mut values = [0f32; N];
    for (value, chunk) in values.iter_mut().zip(payload.chunks_exact(4)) {
        *value = f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Ok(values)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn serialize_hex<S: Serializer>(payload: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex(payload))
}
