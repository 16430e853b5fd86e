//! The run-length compression used by `.ark` files in the second game.
//!
//! A control byte with the high bit set repeats the next byte
//! `(c & 0x7F) + 3` times; otherwise the next `(c & 0x7F) + 1` bytes
//! are literal. Runs encode lengths 3..=130, literal chunks 1..=128.

use crate::codec::CodecError;

/// Heuristic from the original tools: compressed archives have many
/// high-bit control bytes early on.
#[must_use]
pub fn is_compressed(data: &[u8]) -> bool {
    let sample = &data[..data.len().min(256)];
    let high_bits = sample.iter().filter(|&&byte| byte & 0x80 != 0).count();
    high_bits > 64
}

pub fn decompress(input: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut output = Vec::with_capacity(input.len() * 2);
    let mut cursor = 0usize;
    while cursor < input.len() {
        let control = input[cursor];
        cursor += 1;
        if control & 0x80 != 0 {
            let count = usize::from(control & 0x7F) + 3;
            let value = *input.get(cursor).ok_or(CodecError::Truncated)?;
            cursor += 1;
            output.extend(std::iter::repeat_n(value, count));
        } else {
            let count = usize::from(control & 0x7F) + 1;
            let literals = input
                .get(cursor..cursor + count)
                .ok_or(CodecError::Truncated)?;
            output.extend_from_slice(literals);
            cursor += count;
        }
    }
    Ok(output)
}

#[must_use]
pub fn compress(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());
    let mut cursor = 0usize;
    while cursor < input.len() {
        let run = run_length_at(input, cursor);
        if run >= 3 {
            output.push(0x80 | (run as u8 - 3));
            output.push(input[cursor]);
            cursor += run;
            continue;
        }

        // Literal chunk: up to 128 bytes, stopping where a run starts.
        let start = cursor;
        while cursor < input.len() && cursor - start < 128 {
            if run_length_at(input, cursor) >= 3 {
                break;
            }
            cursor += 1;
        }
        output.push((cursor - start - 1) as u8);
        output.extend_from_slice(&input[start..cursor]);
    }
    output
}

/// Length of the run of equal bytes starting at `at`, capped at the
/// longest encodable run.
fn run_length_at(input: &[u8], at: usize) -> usize {
    let value = input[at];
    input[at..]
        .iter()
        .take(130)
        .take_while(|&&byte| byte == value)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn run_token_expands() {
        // 0x82 = run of 5, value 0xAB.
        assert_eq!(decompress(&[0x82, 0xAB]).unwrap(), vec![0xAB; 5]);
    }

    #[test]
    fn literal_token_copies() {
        assert_eq!(decompress(&[0x02, 1, 2, 3]).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn truncated_streams_are_rejected() {
        assert!(matches!(decompress(&[0x82]), Err(CodecError::Truncated)));
        assert!(matches!(
            decompress(&[0x05, 1, 2]),
            Err(CodecError::Truncated)
        ));
    }

    #[test]
    fn short_runs_stay_literal() {
        let compressed = compress(&[7, 7, 8, 9]);
        assert_eq!(compressed[0] & 0x80, 0);
        assert_eq!(decompress(&compressed).unwrap(), vec![7, 7, 8, 9]);
    }

    #[test]
    fn long_runs_split_at_130() {
        let input = vec![0x42u8; 200];
        let compressed = compress(&input);
        assert_eq!(compressed.len(), 4); // 130-run + 70-run
        assert_eq!(compressed[0], 0x80 | 127);
        assert_eq!(decompress(&compressed).unwrap(), input);
    }

    #[test]
    fn long_literals_split_at_128() {
        let input: Vec<u8> = (0..=255u16).map(|v| (v % 251) as u8).collect();
        let compressed = compress(&input);
        assert_eq!(decompress(&compressed).unwrap(), input);
    }

    #[test]
    fn empty_input_round_trips() {
        assert!(compress(&[]).is_empty());
        assert!(decompress(&[]).unwrap().is_empty());
    }

    #[test]
    fn detection_threshold() {
        assert!(!is_compressed(&[0x10; 256]));
        assert!(is_compressed(&[0x90; 256]));
        // 64 high-bit bytes is not enough; 65 is.
        let mut data = vec![0u8; 256];
        for byte in data.iter_mut().take(64) {
            *byte = 0xFF;
        }
        assert!(!is_compressed(&data));
        data[64] = 0xFF;
        assert!(is_compressed(&data));
    }

    proptest! {
        #[test]
        fn decompress_inverts_compress(input in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let compressed = compress(&input);
            prop_assert_eq!(decompress(&compressed).unwrap(), input);
        }

        #[test]
        fn runs_compress_well(value in any::<u8>(), count in 3usize..1000) {
            let input = vec![value; count];
            let compressed = compress(&input);
            prop_assert!(compressed.len() <= input.len() / 3 * 2 + 2);
            prop_assert_eq!(decompress(&compressed).unwrap(), input);
        }
    }
}
