#![no_main]

use jouler::config::ProfilerConfig;
use jouler::filter::MethodFilter;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Parsing must never panic; accepted configs must validate
        if let Ok(config) = ProfilerConfig::from_toml(input) {
            assert!(config.validate().is_ok());
            let _ = MethodFilter::from_patterns(&config.exclude);
        }
    }
});
