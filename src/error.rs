/// Errors that can occur when interacting with an SX camera.
#[derive(Debug, thiserror::Error)]
pub enum SxError {
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    #[error("Camera not found (VID=1278 PID=0525)")]
    DeviceNotFound,

    #[error("Failed to open camera: {0}")]
    OpenFailed(rusb::Error),

    #[error("No claimable interface on the active configuration")]
    NoClaimableInterface,

    #[error("Command write failed: {0}")]
    CommandWrite(rusb::Error),

    #[error("Command read failed: {0}")]
    CommandRead(rusb::Error),

    #[error("Short response for command 0x{opcode:02x}: got {got} bytes, wanted {want}")]
    ShortResponse { opcode: u8, got: usize, want: usize },

    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("Operation cancelled")]
    Cancelled,
}
