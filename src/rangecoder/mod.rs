//! Byte-oriented adaptive range coder (§4.4).
//!
//! The alphabet is the 256 possible byte values plus a dedicated
//! end-of-stream symbol; the coder is "adaptive" only in the sense that
//! each call builds a fresh frequency table from its own input, not that
//! probabilities update as symbols are coded (the table is static across
//! a single encode/decode pass, like the reference implementation).

mod coder;

pub use coder::{decode, encode};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_io::BufferWriter;

    #[test]
    fn empty_input_roundtrips() {
        let mut out = BufferWriter::new();
        encode(&[], &mut out).unwrap();
        let decoded = decode(out.as_slice()).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn single_byte_roundtrips() {
        let mut out = BufferWriter::new();
        encode(&[42], &mut out).unwrap();
        let decoded = decode(out.as_slice()).unwrap();
        assert_eq!(decoded, vec![42]);
    }

    #[test]
    fn repeated_byte_roundtrips() {
        let data = vec![7u8; 4096];
        let mut out = BufferWriter::new();
        encode(&data, &mut out).unwrap();
        let decoded = decode(out.as_slice()).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn all_byte_values_roundtrip() {
        let data: Vec<u8> = (0..=255).cycle().take(2000).collect();
        let mut out = BufferWriter::new();
        encode(&data, &mut out).unwrap();
        let decoded = decode(out.as_slice()).unwrap();
        assert_eq!(decoded, data);
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_bytes_roundtrip(data in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..8192)) {
            let mut out = BufferWriter::new();
            encode(&data, &mut out).unwrap();
            let decoded = decode(out.as_slice()).unwrap();
            proptest::prop_assert_eq!(decoded, data);
        }
    }
}
