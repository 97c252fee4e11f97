//! Well-known packet type codes.
//!
//! Types 0-3 carry the rover's built-in messages. Any other value is legal on
//! the wire and is passed through to the application untouched.

/// Liveness check, no payload semantics.
pub const PING: u8 = 0;

/// Left/right drive speeds, two big-endian `f32`.
pub const MOTOR_COMMAND: u8 = 1;

/// UTF-8 text.
pub const TEXT_MESSAGE: u8 = 2;

/// Temperature, humidity, pressure, three big-endian `f32`.
pub const SENSOR_DATA: u8 = 3;

/// Returns a human-readable name for a packet type.
pub fn type_name(packet_type: u8) -> &'static str {
    match packet_type {
        PING => "PING",
        MOTOR_COMMAND => "MOTOR_COMMAND",
        TEXT_MESSAGE => "TEXT_MESSAGE",
        SENSOR_DATA => "SENSOR_DATA",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_cover_builtin_types() {
        assert_eq!(type_name(PING), "PING");
        assert_eq!(type_name(SENSOR_DATA), "SENSOR_DATA");
        assert_eq!(type_name(200), "UNKNOWN");
        assert_eq!(type_name(4), "UNKNOWN");
    }
}
