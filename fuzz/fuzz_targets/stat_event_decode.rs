#![no_main]

use libfuzzer_sys::fuzz_target;
use poststats_core::codec::{decode, encode, encoded_len};
use poststats_core::DecodeError;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes from the log must never panic the consumer.
    match decode(data) {
        Ok(event) => {
            assert!(event.viewed <= 1 && event.liked <= 1);

            // anything accepted re-encodes to a canonical form that decodes
            // to the same event; the all-default event encodes to nothing
            let bytes = encode(&event);
            assert_eq!(bytes.len(), encoded_len(&event));
            if !bytes.is_empty() {
                assert_eq!(decode(&bytes).ok(), Some(event));
            }
        }
        Err(DecodeError::Empty) => assert!(data.is_empty()),
        Err(_) => {}
    }
});
