//! List attached USB devices and the MIDI streaming interface of each, if any.
//!
//! Only reads descriptors; no interface is claimed.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn main() {
    use usb_host_midi::Transport;

    env_logger::init();
    for info in usb_host_midi::list_devices().unwrap() {
        println!(
            "Device {:03}.{:03} ({:04x}:{:04x}) {} {}",
            info.bus_number(),
            info.device_address(),
            info.vendor_id(),
            info.product_id(),
            info.manufacturer_string().unwrap_or(""),
            info.product_string().unwrap_or("")
        );

        let mut dev = match info.open() {
            Ok(dev) => dev,
            Err(e) => {
                println!("\tFailed to open device: {e}");
                continue;
            }
        };

        match dev.device_descriptor() {
            Some(desc) => println!(
                "\tUSB {:x}.{:02x}, {:04x}:{:04x} release {:04x}, {} configuration(s)",
                desc.usb_version() >> 8,
                desc.usb_version() & 0xff,
                desc.vendor_id(),
                desc.product_id(),
                desc.device_version(),
                desc.num_configurations()
            ),
            None => println!("\tInvalid device descriptor"),
        }

        let config = match dev.configuration_descriptor(0) {
            Ok(config) => config,
            Err(e) => {
                println!("\tNo configuration descriptor: {e}");
                continue;
            }
        };

        let found = usb_host_midi::scan(&config);
        if found.interface_found() {
            println!(
                "\tMIDI interface {}: in {:02x}, out {:02x}",
                found.interface_number(),
                found.in_endpoint(),
                found.out_endpoint()
            );
        } else {
            println!("\tNo MIDI interface");
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn main() {
    eprintln!("no USB host backend on this platform");
}
