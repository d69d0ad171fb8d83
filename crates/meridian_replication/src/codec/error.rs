use thiserror::Error;

/// Errors raised while reading replication wire data.
///
/// None of these are fatal to the caller: a decoder that hits one simply
/// stops and reports how far it got.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The buffer ended before a complete field could be read
    #[error("Truncated data: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// The packet type byte is not one this protocol knows
    #[error("Unknown packet type {0}")]
    UnknownPacketType(u8),

    /// The entity identity discriminant is not 0 (known id) or 1 (creator token)
    #[error("Unknown entity identity tag {0}")]
    UnknownIdentityTag(u8),

    /// An octal code longer than the supported depth
    #[error("Octal code of {depth} octants exceeds the maximum depth of {max}")]
    OctalCodeTooDeep { depth: usize, max: usize },

    /// A model URL that is not valid UTF-8
    #[error("Property blob contains invalid UTF-8")]
    InvalidUtf8,

    /// A packet of one type was handed to a reader for another
    #[error("Expected a {expected:?} packet, found {found:?}")]
    UnexpectedPacketType {
        expected: super::PacketType,
        found: super::PacketType,
    },
}

/// Fails with [`CodecError::Truncated`] unless `buf` holds at least `needed` bytes.
pub(crate) fn ensure_remaining(buf: &[u8], needed: usize) -> Result<(), CodecError> {
    if buf.len() < needed {
        Err(CodecError::Truncated {
            needed,
            remaining: buf.len(),
        })
    } else {
        Ok(())
    }
}
