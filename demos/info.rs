use sxcam::Device;

fn main() {
    env_logger::init();

    match sxcam::list_devices() {
        Ok(devices) if devices.is_empty() => {
            println!("No SX cameras attached");
            return;
        }
        Ok(devices) => {
            for d in &devices {
                println!(
                    "Found {:04x}:{:04x} on bus {} address {}",
                    d.vendor_id, d.product_id, d.bus_number, d.address
                );
            }
        }
        Err(e) => {
            eprintln!("Enumeration failed: {}", e);
            return;
        }
    }

    let camera = match Device::open_first() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Open failed: {}", e);
            return;
        }
    };

    let (ep_in, ep_out) = camera.endpoints();
    println!(
        "Interface {}, endpoints IN=0x{:02x} OUT=0x{:02x}",
        camera.claimed_interface(),
        ep_in,
        ep_out
    );

    match camera.camera_model() {
        Ok(model) => println!("Model: {} (code 0x{:02x})", model.name, model.code),
        Err(e) => eprintln!("Model query failed: {}", e),
    }
    match camera.firmware_version() {
        Ok(version) => println!("Firmware: {}", version),
        Err(e) => eprintln!("Version query failed: {}", e),
    }
}
