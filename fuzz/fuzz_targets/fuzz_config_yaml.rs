#![no_main]

use libfuzzer_sys::fuzz_target;
use wordstore::StoreConfig;
use wordstore::config::ConfigLayer;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Malformed input must surface as an error, never a panic.
    if let Ok(layer) = ConfigLayer::from_yaml_str(text) {
        if layer.get("seed-file").is_none() {
            let _ = StoreConfig::from_layer(&layer);
        }
    }
});
