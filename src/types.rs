/// Capture window and binning. Offsets and dimensions are little-endian
/// u16 on the wire; binning factors are a single byte each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureGeometry {
    pub x_offset: u16,
    pub y_offset: u16,
    pub width: u16,
    pub height: u16,
    pub x_bin: u8,
    pub y_bin: u8,
}

impl Default for CaptureGeometry {
    /// Full ECHO2 frame, unbinned.
    fn default() -> Self {
        CaptureGeometry {
            x_offset: 0,
            y_offset: 0,
            width: crate::protocol::DEFAULT_WIDTH,
            height: crate::protocol::DEFAULT_HEIGHT,
            x_bin: 1,
            y_bin: 1,
        }
    }
}

impl CaptureGeometry {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Raw payload size for a readout: two bytes per 16-bit sample.
    pub fn byte_count(&self) -> usize {
        self.pixel_count() * 2
    }
}

/// A captured frame of 16-bit samples, row-major, always exactly
/// width * height samples long. `received_bytes` tells how much of it
/// actually came off the wire; the rest is zero-filled.
#[derive(Debug, Clone)]
pub struct Image {
    pub data: Vec<u16>,
    pub width: u16,
    pub height: u16,
    pub bits_per_pixel: u8,
    pub received_bytes: usize,
}

impl Image {
    /// False when the transfer ended short and the tail is zero-filled.
    pub fn is_complete(&self) -> bool {
        self.received_bytes >= self.data.len() * 2
    }
}

/// Firmware version as reported by the camera.
///
/// The wire format is ambiguous: the legacy control query returns a single
/// u16 hundredths value (e.g. 127 -> 1.27), the bulk query returns two u16
/// fields read here as minor then major. Both decoders live in `protocol`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub major: u16,
    pub minor: u16,
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.major, self.minor)
    }
}

/// Model code and its human-readable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraModel {
    pub code: u8,
    pub name: &'static str,
}

/// Identity of an attached, not-yet-opened camera.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus_number: u8,
    pub address: u8,
}

/// Discrete progress events emitted during a capture, replacing free-text
/// narration. Delivered best-effort over a crossbeam channel; a full or
/// disconnected channel never stalls the transfer.
#[derive(Debug, Clone, Copy)]
pub enum TransferEvent {
    ExposureStarted { exposure_ms: u32 },
    ReadoutStarted { expected_bytes: usize },
    ChunkReceived { bytes: usize, total: usize, expected: usize },
    ChunkTimeout { attempt: u32, max: u32 },
    Completed { received: usize, expected: usize },
    Degraded { received: usize, expected: usize },
}
