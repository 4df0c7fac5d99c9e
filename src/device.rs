use crate::capture::{self, CaptureOptions};
use crate::protocol::{self, COMMAND_TIMEOUT, PID, VID};
use crate::transport::{BulkPipe, CommandChannel};
use crate::types::{CameraModel, DeviceInfo, FirmwareVersion, Image};
use crate::{Result, SxError};
use rusb::{Direction, Recipient, RequestType};
use std::time::Duration;

/// List all attached SX cameras without opening them.
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let mut found = Vec::new();
    for device in rusb::devices()?.iter() {
        let desc = match device.device_descriptor() {
            Ok(d) => d,
            Err(_) => continue,
        };
        if desc.vendor_id() == VID && desc.product_id() == PID {
            found.push(DeviceInfo {
                vendor_id: desc.vendor_id(),
                product_id: desc.product_id(),
                bus_number: device.bus_number(),
                address: device.address(),
            });
        }
    }
    Ok(found)
}

/// An opened SX camera with a claimed interface and resolved bulk
/// endpoint pair, ready for queries and captures.
///
/// The claimed interface is released on drop. One camera, one session:
/// nothing here guards against a second process opening the same device.
pub struct Device {
    handle: rusb::DeviceHandle<rusb::GlobalContext>,
    claimed_interface: u8,
    bulk_in: u8,
    bulk_out: u8,
}

impl Device {
    /// Find, open, and negotiate the first attached SX camera.
    pub fn open_first() -> Result<Device> {
        let devices = rusb::devices()?;
        let usb_device = devices
            .iter()
            .find(|d| {
                d.device_descriptor()
                    .map(|desc| desc.vendor_id() == VID && desc.product_id() == PID)
                    .unwrap_or(false)
            })
            .ok_or(SxError::DeviceNotFound)?;

        let handle = usb_device.open().map_err(SxError::OpenFailed)?;

        detach_kernel_drivers(&handle, &usb_device);

        let claimed_interface = claim_any_interface(&handle, &usb_device)?;
        let (bulk_in, bulk_out) =
            find_endpoints(&usb_device, claimed_interface).unwrap_or_else(|| {
                log::warn!(
                    "No endpoints in descriptors for interface {}, using defaults IN=0x{:02x} OUT=0x{:02x}",
                    claimed_interface,
                    protocol::DEFAULT_BULK_IN,
                    protocol::DEFAULT_BULK_OUT
                );
                (protocol::DEFAULT_BULK_IN, protocol::DEFAULT_BULK_OUT)
            });

        log::info!(
            "Opened SX camera: interface {}, IN=0x{:02x}, OUT=0x{:02x}",
            claimed_interface,
            bulk_in,
            bulk_out
        );

        // Negotiation already succeeded; a failed reset is only a warning.
        if let Err(e) = handle.reset() {
            log::warn!("Device reset failed: {} (continuing)", e);
        }

        Ok(Device {
            handle,
            claimed_interface,
            bulk_in,
            bulk_out,
        })
    }

    /// The interface number that was successfully claimed.
    pub fn claimed_interface(&self) -> u8 {
        self.claimed_interface
    }

    /// The resolved bulk endpoint addresses (IN, OUT).
    pub fn endpoints(&self) -> (u8, u8) {
        (self.bulk_in, self.bulk_out)
    }

    /// Query the firmware version.
    ///
    /// The legacy vendor control request is tried first; only when it
    /// fails does this fall back to the two-stage bulk command. The two
    /// paths decode the response differently (see `protocol`).
    pub fn firmware_version(&self) -> Result<FirmwareVersion> {
        let request_type = rusb::request_type(Direction::In, RequestType::Vendor, Recipient::Device);
        let mut data = [0u8; 16];
        match self.handle.read_control(
            request_type,
            protocol::CTRL_GET_FIRMWARE_VERSION,
            0,
            0,
            &mut data,
            COMMAND_TIMEOUT,
        ) {
            Ok(len) => {
                if let Some(version) = protocol::decode_legacy_version(&data[..len]) {
                    return Ok(version);
                }
                log::debug!("Legacy version response too short ({} bytes)", len);
            }
            Err(e) => log::debug!("Legacy version query failed: {}", e),
        }

        let mut response = [0u8; 4];
        let len = self.channel().send(
            protocol::CMD_GET_FIRMWARE_VERSION,
            &[],
            &mut response,
        )?;
        protocol::decode_bulk_version(&response[..len]).ok_or(SxError::ShortResponse {
            opcode: protocol::CMD_GET_FIRMWARE_VERSION,
            got: len,
            want: 4,
        })
    }

    /// Query the camera model.
    ///
    /// Tries the legacy control request, then the bulk command. If both
    /// fail the session is still usable: the model degrades to the
    /// product-ID classification instead of an error.
    pub fn camera_model(&self) -> Result<CameraModel> {
        let request_type = rusb::request_type(Direction::In, RequestType::Vendor, Recipient::Device);
        let mut data = [0u8; 2];
        let code = match self.handle.read_control(
            request_type,
            protocol::CTRL_CAMERA_MODEL,
            0,
            0,
            &mut data,
            COMMAND_TIMEOUT,
        ) {
            Ok(len) if len >= 1 => Some(data[0]),
            Ok(len) => {
                log::debug!("Model response too short ({} bytes)", len);
                None
            }
            Err(e) => {
                log::debug!("Legacy model query failed: {}, trying bulk command", e);
                let mut response = [0u8; 2];
                match self
                    .channel()
                    .send(protocol::CMD_CAMERA_MODEL, &[], &mut response)
                {
                    Ok(len) if len >= 1 => Some(response[0]),
                    Ok(_) => None,
                    Err(e) => {
                        log::warn!("Model query failed ({}), assuming default model", e);
                        None
                    }
                }
            }
        };

        let model = code
            .and_then(|c| protocol::model_name(c).map(|name| CameraModel { code: c, name }))
            .unwrap_or_else(|| protocol::fallback_model(PID));
        log::info!("Camera model: {} (code 0x{:02x})", model.name, model.code);
        Ok(model)
    }

    /// Capture a full frame with the default geometry.
    pub fn capture_image(&self, exposure: Duration) -> Result<Image> {
        self.capture_image_with(&CaptureOptions::new(exposure))
    }

    /// Capture with explicit geometry, cancellation, and event sink.
    pub fn capture_image_with(&self, opts: &CaptureOptions) -> Result<Image> {
        capture::run_capture(self, opts)
    }

    fn channel(&self) -> CommandChannel<'_, Self> {
        CommandChannel::new(self)
    }
}

impl BulkPipe for Device {
    fn write_bulk(&self, data: &[u8], timeout: Duration) -> rusb::Result<usize> {
        self.handle.write_bulk(self.bulk_out, data, timeout)
    }

    fn read_bulk(&self, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        self.handle.read_bulk(self.bulk_in, buf, timeout)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(self.claimed_interface) {
            log::debug!(
                "Release of interface {} failed: {}",
                self.claimed_interface,
                e
            );
        }
    }
}

/// Best-effort kernel driver detach across the active configuration.
/// Failures never abort the open.
fn detach_kernel_drivers(
    handle: &rusb::DeviceHandle<rusb::GlobalContext>,
    device: &rusb::Device<rusb::GlobalContext>,
) {
    let config = match device.active_config_descriptor() {
        Ok(c) => c,
        Err(e) => {
            log::warn!("Could not read active config descriptor: {}", e);
            return;
        }
    };

    for interface in config.interfaces() {
        let number = interface.number();
        match handle.kernel_driver_active(number) {
            Ok(true) => match handle.detach_kernel_driver(number) {
                Ok(_) => log::info!("Detached kernel driver from interface {}", number),
                Err(e) => log::warn!(
                    "Kernel driver detach failed on interface {}: {} (continuing)",
                    number,
                    e
                ),
            },
            Ok(false) => {}
            Err(e) => log::debug!(
                "Kernel driver check unavailable for interface {}: {}",
                number,
                e
            ),
        }
    }
}

/// Claim interface 1 first (the vendor interface on every SX camera seen
/// so far), then fall back across the rest of the active configuration.
fn claim_any_interface(
    handle: &rusb::DeviceHandle<rusb::GlobalContext>,
    device: &rusb::Device<rusb::GlobalContext>,
) -> Result<u8> {
    match handle.claim_interface(1) {
        Ok(_) => {
            log::debug!("Claimed interface 1");
            return Ok(1);
        }
        Err(e) => log::debug!("Claim of interface 1 failed: {}", e),
    }

    let config = device.active_config_descriptor()?;
    for interface in config.interfaces() {
        let number = interface.number();
        if number == 1 {
            continue;
        }
        match handle.claim_interface(number) {
            Ok(_) => {
                log::debug!("Claimed interface {}", number);
                return Ok(number);
            }
            Err(e) => log::debug!("Claim of interface {} failed: {}", number, e),
        }
    }

    Err(SxError::NoClaimableInterface)
}

/// Discover the bulk endpoint pair of the claimed interface across all
/// alternate settings. Later endpoints of a direction overwrite earlier
/// ones; SX cameras expose exactly one bulk pair, so last-wins is safe.
fn find_endpoints(
    device: &rusb::Device<rusb::GlobalContext>,
    interface_number: u8,
) -> Option<(u8, u8)> {
    let config = device.active_config_descriptor().ok()?;
    let mut bulk_in = None;
    let mut bulk_out = None;

    for interface in config.interfaces() {
        if interface.number() != interface_number {
            continue;
        }
        for alt in interface.descriptors() {
            for endpoint in alt.endpoint_descriptors() {
                match endpoint.direction() {
                    Direction::In => {
                        log::debug!("Found IN endpoint 0x{:02x}", endpoint.address());
                        bulk_in = Some(endpoint.address());
                    }
                    Direction::Out => {
                        log::debug!("Found OUT endpoint 0x{:02x}", endpoint.address());
                        bulk_out = Some(endpoint.address());
                    }
                }
            }
        }
    }

    match (bulk_in, bulk_out) {
        (None, None) => None,
        (input, output) => Some((
            input.unwrap_or(protocol::DEFAULT_BULK_IN),
            output.unwrap_or(protocol::DEFAULT_BULK_OUT),
        )),
    }
}
