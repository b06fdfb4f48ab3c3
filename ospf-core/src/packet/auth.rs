//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use derive_new::new;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

// Length of the keyed-MD5 message digest.
pub const MD5_DIGEST_LENGTH: u8 = 16;

// Keying material for OSPF cryptographic authentication (RFC 2328 - Appendix
// D.3).
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct AuthCtx {
    // Authentication key ID.
    pub key_id: u8,
    // Authentication key.
    pub key: String,
}

// ===== global functions =====

// Computes the keyed-MD5 digest of the given packet.
//
// The key is zero-padded (or truncated) to 16 bytes and appended to the packet
// contents before hashing.
pub(crate) fn md5_digest(data: &[u8], key: &str) -> [u8; 16] {
    let mut key = key.as_bytes().to_vec();
    key.resize(MD5_DIGEST_LENGTH as usize, 0);

    let mut ctx = Md5::new();
    ctx.update(data);
    ctx.update(&key);
    ctx.finalize().into()
}

// Converts a simple password into the 64-bit authentication field.
pub fn simple_password(key: &str) -> [u8; 8] {
    let mut password = [0; 8];
    for (dst, src) in password.iter_mut().zip(key.as_bytes()) {
        *dst = *src;
    }
    password
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_password_padding() {
        assert_eq!(simple_password("abc"), *b"abc\0\0\0\0\0");
        assert_eq!(simple_password("0123456789"), *b"01234567");
    }

    #[test]
    fn md5_digest_depends_on_key() {
        let data = [0x02, 0x01, 0x00, 0x18];
        assert_ne!(md5_digest(&data, "HOLO"), md5_digest(&data, "OLOH"));
        assert_eq!(md5_digest(&data, "HOLO"), md5_digest(&data, "HOLO"));
    }
}
