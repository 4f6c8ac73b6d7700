#![no_main]

use libfuzzer_sys::fuzz_target;
use packstream::{from_slice, to_vec, Decoder};

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must fail cleanly, never panic or overflow the stack
    let mut decoder = Decoder::new(data);
    let _ = decoder.peek_kind();

    if let Ok(value) = from_slice(data) {
        // Anything that decodes must re-encode and decode to the same value
        if let Ok(bytes) = to_vec(&value) {
            assert_eq!(from_slice(&bytes).ok(), Some(value));
        }
    }
});
