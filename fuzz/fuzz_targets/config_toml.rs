#![no_main]

use libfuzzer_sys::fuzz_target;

use pagecap_core::config::Config;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = Config::from_toml(raw) else {
        return;
    };

    // Anything that parsed and validated must render and re-parse identically.
    let rendered = config.to_toml().expect("valid config renders");
    let reparsed = Config::from_toml(&rendered).expect("rendered config parses");
    assert_eq!(config, reparsed);
});
