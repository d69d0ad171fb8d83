//! Wire form of [`OctalCode`]: a length byte followed by the octants packed
//! three bits each, most significant bit first, zero padded to a whole byte.

use super::error::{ensure_remaining, CodecError};
use crate::types::{OctalCode, MAX_OCTAL_DEPTH};
use bytes::BufMut;

/// Number of bytes `code` occupies on the wire.
pub fn octal_code_len(code: &OctalCode) -> usize {
    1 + packed_len(code.depth())
}

fn packed_len(depth: usize) -> usize {
    (depth * 3 + 7) / 8
}

pub fn write_octal_code<B: BufMut>(code: &OctalCode, out: &mut B) {
    let octants = code.octants();
    out.put_u8(octants.len() as u8);

    let mut packed = vec![0u8; packed_len(octants.len())];
    for (i, octant) in octants.iter().enumerate() {
        for bit in 0..3 {
            if octant & (0b100 >> bit) != 0 {
                let position = i * 3 + bit;
                packed[position / 8] |= 0x80 >> (position % 8);
            }
        }
    }
    out.put_slice(&packed);
}

/// Reads an octal code from the front of `data`, returning it and the number
/// of bytes consumed.
pub fn read_octal_code(data: &[u8]) -> Result<(OctalCode, usize), CodecError> {
    ensure_remaining(data, 1)?;
    let depth = data[0] as usize;
    if depth > MAX_OCTAL_DEPTH {
        return Err(CodecError::OctalCodeTooDeep {
            depth,
            max: MAX_OCTAL_DEPTH,
        });
    }

    let total = 1 + packed_len(depth);
    ensure_remaining(data, total)?;
    let packed = &data[1..total];

    let mut octants = Vec::with_capacity(depth);
    for i in 0..depth {
        let mut octant = 0u8;
        for bit in 0..3 {
            let position = i * 3 + bit;
            if packed[position / 8] & (0x80 >> (position % 8)) != 0 {
                octant |= 0b100 >> bit;
            }
        }
        octants.push(octant);
    }
    Ok((OctalCode::from_octants(&octants), total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_octal_code_packing() {
        // 7 = 111, 0 = 000, 5 = 101 -> 1110 0010 1000 0000
        let code = OctalCode::from_octants(&[7, 0, 5]);
        let mut out = BytesMut::new();
        write_octal_code(&code, &mut out);
        assert_eq!(&out[..], &[3, 0b1110_0010, 0b1000_0000]);
        assert_eq!(octal_code_len(&code), 3);

        let (decoded, consumed) = read_octal_code(&out).expect("code should parse");
        assert_eq!(decoded, code);
        assert_eq!(consumed, 3);
    }

    #[test]
    fn test_root_code_is_one_byte() {
        let mut out = BytesMut::new();
        write_octal_code(&OctalCode::root(), &mut out);
        assert_eq!(&out[..], &[0]);
        assert_eq!(read_octal_code(&out), Ok((OctalCode::root(), 1)));
    }

    #[test]
    fn test_truncated_and_oversized_codes() {
        assert!(matches!(
            read_octal_code(&[4, 0xFF]),
            Err(CodecError::Truncated { needed: 3, remaining: 2 })
        ));
        assert!(matches!(
            read_octal_code(&[200]),
            Err(CodecError::OctalCodeTooDeep { depth: 200, .. })
        ));
        assert!(matches!(read_octal_code(&[]), Err(CodecError::Truncated { .. })));
    }
}
