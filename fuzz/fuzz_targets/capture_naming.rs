#![no_main]

use chrono::{TimeZone, Utc};
use libfuzzer_sys::fuzz_target;

use pagecap_core::artifact::{artifact_path, decode_data_uri, to_data_uri};
use pagecap_core::config::PersistenceConfig;
use pagecap_core::naming::derive_name;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        // Arbitrary bytes still exercise the data URI parser.
        let _ = decode_data_uri(&String::from_utf8_lossy(data));
        return;
    };

    let name = derive_name(text);
    assert!(!name.as_str().is_empty());
    assert!(
        name.as_str()
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
    );
    assert_eq!(derive_name(name.as_str()), name);

    let millis = data
        .iter()
        .fold(0i64, |acc, b| acc.wrapping_mul(31).wrapping_add(i64::from(*b)))
        .rem_euclid(4_102_444_800_000);
    if let Some(now) = Utc.timestamp_millis_opt(millis).single() {
        let path = artifact_path(&PersistenceConfig::default(), &name, now);
        assert!(!path.contains(':'));
        assert_eq!(path.matches('/').count(), 2);
    }

    let uri = to_data_uri("text/html", text);
    let decoded = decode_data_uri(&uri).expect("encoded URI decodes");
    assert_eq!(decoded.body, text.as_bytes());

    let _ = decode_data_uri(text);
});
