//! Message authentication tags
//!
//! Datagrams are authenticated with an 8 byte tag cut out of an
//! HMAC-SHA256 digest. The HMAC key is the SHA-512 digest of the
//! station's pass-phrase: key expansion from a variable-length secret to
//! the 64 bytes of material HMAC-SHA256 wants, and both ends can derive
//! it from the shared pass-phrase alone.
//!
//! The tag is not the first 8 bytes of the digest. The offset of the 8
//! byte window depends on byte 22 of the digest itself, so it varies per
//! message. The aggregator performs the identical selection; changing
//! this breaks every deployed station, so it stays as it is.

use hmac::{
    Hmac,
    Mac,
};
use sha2::{
    Digest,
    Sha256,
    Sha512,
};

/// Length of the tag appended to each datagram.
pub const TAG_LEN: usize = 8;

const KEY_LEN: usize = 64;

/// Signs and verifies datagrams for one station.
#[derive(Clone)]
pub struct Signer {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // don't leak key material into logs
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}

impl Signer {
    /// Expand a pass-phrase into the HMAC key.
    pub fn new(passphrase: &[u8]) -> Self {
        let digest = Sha512::digest(passphrase);
        let mut key = [0; KEY_LEN];
        key.copy_from_slice(&digest);
        Self { key }
    }

    /// Compute the tag over the bytes that will precede it on the wire.
    pub fn sign(&self, message: &[u8]) -> [u8; TAG_LEN] {
        let digest = self.digest(message);
        let idx = usize::from(digest[22]) % (digest.len() - TAG_LEN);

        let mut tag = [0; TAG_LEN];
        tag.copy_from_slice(&digest[idx..idx + TAG_LEN]);
        tag
    }

    /// Check a received tag. Bit-identical recomputation of [`sign`].
    ///
    /// [`sign`]: Self::sign
    pub fn verify(&self, message: &[u8], tag: &[u8]) -> bool {
        tag.len() == TAG_LEN && self.sign(message) == tag[..]
    }

    fn digest(&self, message: &[u8]) -> [u8; 32] {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
            .expect("hmac accepts keys of any length");
        mac.update(message);
        mac.finalize().into_bytes().into()
    }
}

#[cfg(test)]
mod tests {
    use crate::authtag::{
        Signer,
        TAG_LEN,
    };

    #[test]
    fn it_signs_deterministically() {
        let message = b"squawk 7700";
        let a = Signer::new(b"secret").sign(message);
        let b = Signer::new(b"secret").sign(message);
        assert_eq!(a, b);
    }

    #[test]
    fn it_depends_on_the_passphrase() {
        let message = b"squawk 7700";
        let a = Signer::new(b"secret").sign(message);
        let b = Signer::new(b"terces").sign(message);
        assert_ne!(a, b);
    }

    #[test]
    fn any_bit_flip_changes_the_tag() {
        let signer = Signer::new(b"secret");
        let message = *b"\x17\x3f\xda\x3e\xc2\x1b\x44\x79\x00\x00\x00\x00\x00\x00\x00\x00\x01\x00\x00\x00\x03";
        let tag = signer.sign(&message);

        for byte in 0..message.len() {
            for bit in 0..8 {
                let mut altered = message;
                altered[byte] ^= 1 << bit;
                assert_ne!(signer.sign(&altered), tag, "byte {byte} bit {bit}");
            }
        }
    }

    #[test]
    fn it_verifies_its_own_tags() {
        let signer = Signer::new(b"secret");
        let message = b"any bytes at all";
        let tag = signer.sign(message);
        assert!(signer.verify(message, &tag));
    }

    #[test]
    fn it_rejects_altered_messages_and_tags() {
        let signer = Signer::new(b"secret");
        let message = b"any bytes at all".to_vec();
        let tag = signer.sign(&message);

        for i in 0..message.len() {
            let mut altered = message.clone();
            altered[i] ^= 0x01;
            assert!(!signer.verify(&altered, &tag));
        }

        let mut altered_tag = tag;
        altered_tag[0] ^= 0x80;
        assert!(!signer.verify(&message, &altered_tag));

        assert!(!signer.verify(&message, &tag[..4]));
    }

    #[test]
    fn the_window_offset_follows_byte_22() {
        // the window starts at digest[22] % 24, so it always fits
        let signer = Signer::new(b"secret");
        for i in 0..=255u8 {
            let _ = signer.sign(&[i]);
        }
    }
}
