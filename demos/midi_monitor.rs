//! Wait for a USB MIDI device, then print the raw bytes it sends.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn main() {
    use std::{thread::sleep, time::Duration};

    use usb_host_midi::{ErrorKind, MidiDevice};

    env_logger::init();
    println!("Looking for MIDI device");
    let mut midi = loop {
        let found = usb_host_midi::list_devices()
            .unwrap()
            .filter(|d| d.has_midi_streaming_interface())
            .find_map(|info| {
                let dev = info.open().ok()?;
                match MidiDevice::new(dev, Some(Duration::from_millis(10))) {
                    Ok(midi) => {
                        println!("Found {:04x}:{:04x}", info.vendor_id(), info.product_id());
                        Some(midi)
                    }
                    Err(e) if e.kind() == ErrorKind::NoMidiInterface => None,
                    Err(e) => {
                        println!("Skipping {:04x}:{:04x}: {e}", info.vendor_id(), info.product_id());
                        None
                    }
                }
            });

        match found {
            Some(midi) => break midi,
            None => sleep(Duration::from_secs(1)),
        }
    };

    println!("{midi}");
    loop {
        let bytes = midi.read(3).unwrap();
        if !bytes.is_empty() {
            println!("{bytes:02x?}");
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn main() {
    eprintln!("no USB host backend on this platform");
}
