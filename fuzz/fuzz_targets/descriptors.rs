#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let found = usb_host_midi::scan(data);
    std::hint::black_box(found);

    for config in usb_host_midi::descriptors::fuzz_parse_concatenated_config_descriptors(data) {
        for desc in usb_host_midi::descriptors::Descriptors::new(config) {
            let s = format!("{:?}", desc.kind());
            std::hint::black_box(s);
        }
    }
});
