use crate::types::{CameraModel, CaptureGeometry, FirmwareVersion};
use std::time::Duration;

// -- USB identifiers --
pub const VID: u16 = 0x1278;
pub const PID: u16 = 0x0525;

// -- Endpoint defaults, used when descriptor discovery finds nothing --
pub const DEFAULT_BULK_IN: u8 = 0x82;
pub const DEFAULT_BULK_OUT: u8 = 0x01;

// -- Legacy vendor control requests --
pub const CTRL_GET_FIRMWARE_VERSION: u8 = 0x11;
pub const CTRL_CAMERA_MODEL: u8 = 0x14;

// -- Bulk command frame --
/// Command-type tag for the bulk write path. 0xC0 appears in the protocol
/// only as the vendor-class control request type, not as a frame tag.
pub const CMD_TYPE: u8 = 0x40;
pub const CMD_FRAME_LEN: usize = 8;

// -- Bulk opcodes --
pub const CMD_GET_FIRMWARE_VERSION: u8 = 0xFF;
pub const CMD_CAMERA_MODEL: u8 = 0xFE;
pub const CMD_READ_PIXELS_DELAYED: u8 = 0x02;
pub const CMD_READ_PIXELS: u8 = 0x00;

// -- Frame geometry --
pub const DEFAULT_WIDTH: u16 = 1392;
pub const DEFAULT_HEIGHT: u16 = 1040;
pub const BITS_PER_PIXEL: u8 = 16;

// -- Timing --
pub const COMMAND_TIMEOUT: Duration = Duration::from_millis(5000);
pub const CHUNK_TIMEOUT: Duration = Duration::from_millis(10000);
/// Added on top of the exposure while waiting for the sensor's internal
/// timer and readout logic to finish.
pub const READOUT_MARGIN: Duration = Duration::from_millis(500);
pub const FIRST_CHUNK_RETRY_PAUSE: Duration = Duration::from_millis(500);
pub const INTER_CHUNK_PAUSE: Duration = Duration::from_millis(10);

// -- Transfer bounds --
pub const CHUNK_SIZE: usize = 64 * 1024;
pub const MAX_CHUNK_RETRIES: u32 = 3;

/// Build the fixed 8-byte command header:
/// `[0x40, opcode, 0, 0, 0, 0, param_len_lo, param_len_hi]`.
pub fn build_command_frame(opcode: u8, param_len: u16) -> [u8; CMD_FRAME_LEN] {
    let len = param_len.to_le_bytes();
    [CMD_TYPE, opcode, 0, 0, 0, 0, len[0], len[1]]
}

/// Encode the 10-byte geometry block: offsets and dimensions as u16 LE,
/// binning factors as single bytes.
pub fn encode_geometry(g: &CaptureGeometry) -> [u8; 10] {
    let mut buf = [0u8; 10];
    buf[0..2].copy_from_slice(&g.x_offset.to_le_bytes());
    buf[2..4].copy_from_slice(&g.y_offset.to_le_bytes());
    buf[4..6].copy_from_slice(&g.width.to_le_bytes());
    buf[6..8].copy_from_slice(&g.height.to_le_bytes());
    buf[8] = g.x_bin;
    buf[9] = g.y_bin;
    buf
}

/// Encode the 14-byte read-pixels-delayed parameter block:
/// geometry followed by the exposure in milliseconds (u32 LE).
pub fn encode_exposure_params(g: &CaptureGeometry, exposure_ms: u32) -> [u8; 14] {
    let mut buf = [0u8; 14];
    buf[0..10].copy_from_slice(&encode_geometry(g));
    buf[10..14].copy_from_slice(&exposure_ms.to_le_bytes());
    buf
}

/// Decode a 14-byte parameter block back into geometry + exposure.
pub fn decode_exposure_params(buf: &[u8]) -> Option<(CaptureGeometry, u32)> {
    if buf.len() < 14 {
        return None;
    }
    let g = CaptureGeometry {
        x_offset: u16::from_le_bytes([buf[0], buf[1]]),
        y_offset: u16::from_le_bytes([buf[2], buf[3]]),
        width: u16::from_le_bytes([buf[4], buf[5]]),
        height: u16::from_le_bytes([buf[6], buf[7]]),
        x_bin: buf[8],
        y_bin: buf[9],
    };
    let ms = u32::from_le_bytes([buf[10], buf[11], buf[12], buf[13]]);
    Some((g, ms))
}

/// Build the full 22-byte read-pixels-delayed frame sent in a single
/// bulk write. The device answers with the raw pixel stream, not a
/// command response.
pub fn build_exposure_frame(g: &CaptureGeometry, exposure_ms: u32) -> [u8; 22] {
    let mut buf = [0u8; 22];
    buf[0..8].copy_from_slice(&build_command_frame(CMD_READ_PIXELS_DELAYED, 14));
    buf[8..22].copy_from_slice(&encode_exposure_params(g, exposure_ms));
    buf
}

/// Build the plain-exposure frame (opcode 0x00): geometry only, the host
/// times the exposure itself.
pub fn build_plain_exposure_frame(g: &CaptureGeometry) -> [u8; 18] {
    let mut buf = [0u8; 18];
    buf[0..8].copy_from_slice(&build_command_frame(CMD_READ_PIXELS, 10));
    buf[8..18].copy_from_slice(&encode_geometry(g));
    buf
}

/// Decode the legacy control-transfer version response: a single u16
/// hundredths value, `(b0 | b1<<8) / 100` -> major.minor.
pub fn decode_legacy_version(data: &[u8]) -> Option<FirmwareVersion> {
    if data.len() < 2 {
        return None;
    }
    let raw = u16::from_le_bytes([data[0], data[1]]);
    Some(FirmwareVersion {
        major: raw / 100,
        minor: raw % 100,
    })
}

/// Decode the bulk-command version response (opcode 0xFF, 4 bytes):
/// bytes[0..2) minor, bytes[2..4) major, both u16 LE.
///
/// This is the Wireshark-derived reading; the legacy path decodes the same
/// logical value differently and the two have not been reconciled against
/// vendor documentation. Confirm against hardware before trusting either.
pub fn decode_bulk_version(data: &[u8]) -> Option<FirmwareVersion> {
    if data.len() < 4 {
        return None;
    }
    Some(FirmwareVersion {
        minor: u16::from_le_bytes([data[0], data[1]]),
        major: u16::from_le_bytes([data[2], data[3]]),
    })
}

// -- Model codes --
const MODEL_NAMES: &[(u8, &str)] = &[
    (0x45, "MX5"),
    (0x84, "MX5C"),
    (0x47, "MX7"),
    (0xC7, "MX7C"),
    (0xC8, "MX8C"),
    (0x49, "MX9"),
    (0x05, "H5"),
    (0x85, "H5C"),
    (0x09, "H9"),
    (0x89, "H9C"),
    (0x10, "H16"),
    (0x12, "H18"),
    (0x46, "LodeStar"),
    (0x17, "CoStar"),
    (0x25, "ECHO2"),
    (0xBC, "ECHO2"),
];

/// Look up a model name by its code.
pub fn model_name(code: u8) -> Option<&'static str> {
    MODEL_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Classify by product ID when the model code is unknown or the query failed.
pub fn fallback_model(product_id: u16) -> CameraModel {
    if product_id == PID {
        CameraModel {
            code: 0x25,
            name: "ECHO2",
        }
    } else {
        CameraModel {
            code: 0,
            name: "Unknown SX camera",
        }
    }
}

/// Reinterpret the raw byte stream as little-endian 16-bit samples,
/// zero-filling any shortfall so the result is always `pixel_count` long.
pub fn unpack_pixels(raw: &[u8], pixel_count: usize) -> Vec<u16> {
    let mut pixels = vec![0u16; pixel_count];
    let pairs = (raw.len() / 2).min(pixel_count);
    for (i, px) in pixels.iter_mut().take(pairs).enumerate() {
        *px = u16::from_le_bytes([raw[i * 2], raw[i * 2 + 1]]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_frame_layout() {
        let frame = build_command_frame(CMD_READ_PIXELS_DELAYED, 14);
        assert_eq!(frame, [0x40, 0x02, 0, 0, 0, 0, 14, 0]);

        let frame = build_command_frame(CMD_GET_FIRMWARE_VERSION, 0x1234);
        assert_eq!(frame[6], 0x34);
        assert_eq!(frame[7], 0x12);
    }

    #[test]
    fn test_exposure_frame_layout() {
        let g = CaptureGeometry::default();
        let frame = build_exposure_frame(&g, 1000);
        // Header: 0x40, opcode 0x02, param length 14
        assert_eq!(&frame[0..8], &[0x40, 0x02, 0, 0, 0, 0, 14, 0]);
        // 1392 = 0x0570, 1040 = 0x0410, little-endian
        assert_eq!(&frame[12..16], &[0x70, 0x05, 0x10, 0x04]);
        assert_eq!(&frame[16..18], &[1, 1]);
        // 1000 ms = 0x000003E8
        assert_eq!(&frame[18..22], &[0xE8, 0x03, 0x00, 0x00]);
    }

    #[test]
    fn test_plain_exposure_frame_layout() {
        let g = CaptureGeometry::default();
        let frame = build_plain_exposure_frame(&g);
        assert_eq!(&frame[0..8], &[0x40, 0x00, 0, 0, 0, 0, 10, 0]);
        assert_eq!(&frame[8..18], &encode_geometry(&g));
    }

    #[test]
    fn test_exposure_params_round_trip() {
        let g = CaptureGeometry {
            x_offset: 10,
            y_offset: 20,
            width: 696,
            height: 520,
            x_bin: 2,
            y_bin: 2,
        };
        let encoded = encode_exposure_params(&g, 12_345);
        let (decoded, ms) = decode_exposure_params(&encoded).unwrap();
        assert_eq!(decoded, g);
        assert_eq!(ms, 12_345);
    }

    #[test]
    fn test_decode_legacy_version() {
        // 127 hundredths -> 1.27
        let v = decode_legacy_version(&[127, 0]).unwrap();
        assert_eq!(v, FirmwareVersion { major: 1, minor: 27 });
        assert!(decode_legacy_version(&[1]).is_none());
    }

    #[test]
    fn test_decode_bulk_version() {
        // Observed on the wire: 1b 00 01 00 -> 1.27
        let v = decode_bulk_version(&[0x1B, 0x00, 0x01, 0x00]).unwrap();
        assert_eq!(v, FirmwareVersion { major: 1, minor: 27 });
        assert_eq!(v.to_string(), "1.27");
        assert!(decode_bulk_version(&[0x1B, 0x00]).is_none());
    }

    #[test]
    fn test_model_lookup() {
        assert_eq!(model_name(0x25), Some("ECHO2"));
        assert_eq!(model_name(0xBC), Some("ECHO2"));
        assert_eq!(model_name(0x46), Some("LodeStar"));
        assert_eq!(model_name(0x77), None);

        assert_eq!(fallback_model(PID).name, "ECHO2");
        assert_eq!(fallback_model(0x0100).name, "Unknown SX camera");
    }

    #[test]
    fn test_unpack_pixels() {
        let raw = [0x34, 0x12, 0xFF, 0xFF, 0x01];
        let pixels = unpack_pixels(&raw, 4);
        // Two full pairs, the trailing odd byte and missing pair are zero.
        assert_eq!(pixels, vec![0x1234, 0xFFFF, 0, 0]);
    }
}
