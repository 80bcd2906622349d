//! VNC (challenge-response) authentication (`spec.md` §4.3, `VncAuth`
//! state) and the stored-password file format.
//!
//! VNC's DES usage has one historical wrinkle: every key byte has its
//! bits reversed before being loaded as a DES key. This module isolates
//! that quirk so the rest of the crate just calls [`challenge_response`].
//! Grounded on `examples/dustinmcafee-rustvncserver` and
//! `examples/signal-slot-kmsvnc`, both of which pull in the `des` crate
//! for exactly this purpose.

use des::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use des::Des;

use crate::error::{Error, Result};

/// The fixed key RealVNC-derived tools use to obfuscate a password file
/// on disk (the classic `~/.vnc/passwd` format). Not a secret — every VNC
/// client ships it verbatim.
const FIXED_KEY: [u8; 8] = [0x17, 0x52, 0x6b, 0x06, 0x23, 0x4e, 0x58, 0x07];

fn reverse_bits(byte: u8) -> u8 {
    let mut b = byte;
    let mut r = 0u8;
    for _ in 0..8 {
        r = (r << 1) | (b & 1);
        b >>= 1;
    }
    r
}

/// Pads/truncates a password to 8 bytes and bit-reverses each byte, per
/// the DES variant VNC has always used.
fn des_key(password: &[u8]) -> [u8; 8] {
    let mut padded = [0u8; 8];
    let n = password.len().min(8);
    padded[..n].copy_from_slice(&password[..n]);
    let mut key = [0u8; 8];
    for (i, &b) in padded.iter().enumerate() {
        key[i] = reverse_bits(b);
    }
    key
}

fn des_encrypt_block(key: &[u8; 8], block: &[u8; 8]) -> [u8; 8] {
    let cipher = Des::new(GenericArray::from_slice(key));
    let mut buf = GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut buf);
    buf.into()
}

/// Encrypts the server's 16-byte challenge as two independent 8-byte ECB
/// blocks under the password-derived key (`spec.md` §4.3).
pub fn challenge_response(password: &[u8], challenge: &[u8; 16]) -> [u8; 16] {
    let key = des_key(password);
    let mut response = [0u8; 16];
    response[0..8].copy_from_slice(&des_encrypt_block(&key, challenge[0..8].try_into().unwrap()));
    response[8..16].copy_from_slice(&des_encrypt_block(&key, challenge[8..16].try_into().unwrap()));
    response
}

/// Decrypts an 8-byte obfuscated password blob from a stored password
/// file (`spec.md` §4.3 "Stored password files"). The fixed key is used
/// directly — unlike the challenge-response path, the *key* itself (not
/// the plaintext) is the thing being DES-"encrypted" through here, so
/// there is no bit-reversal of a user password involved.
pub fn decrypt_password_file(blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() != 8 {
        return Err(Error::protocol(format!(
            "password file must be exactly 8 bytes, got {}",
            blob.len()
        )));
    }
    let key = {
        let mut reversed = [0u8; 8];
        for (i, &b) in FIXED_KEY.iter().enumerate() {
            reversed[i] = reverse_bits(b);
        }
        reversed
    };
    let cipher = Des::new(GenericArray::from_slice(&key));
    let mut buf = GenericArray::clone_from_slice(blob);
    // The password file stores DES-*decrypt* of the plaintext under the
    // fixed key; recovering it means encrypting the stored bytes back
    // (DES-CBC-with-no-chaining-in-ECB-mode is an involution here because
    // VNC's tool used the encrypt direction to obfuscate, decrypt to
    // reveal).
    des::cipher::BlockDecrypt::decrypt_block(&cipher, &mut buf);
    let plain: [u8; 8] = buf.into();
    // Password is NUL-terminated within the 8-byte field if shorter.
    let len = plain.iter().position(|&b| b == 0).unwrap_or(8);
    Ok(plain[..len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_reversal_is_an_involution() {
        for b in 0u8..=255 {
            assert_eq!(reverse_bits(reverse_bits(b)), b);
        }
    }

    #[test]
    fn response_is_deterministic_and_key_dependent() {
        let challenge = [0u8; 16];
        let r1 = challenge_response(b"secret", &challenge);
        let r2 = challenge_response(b"secret", &challenge);
        assert_eq!(r1, r2);
        let r3 = challenge_response(b"different", &challenge);
        assert_ne!(r1, r3);
    }

    #[test]
    fn password_longer_than_8_bytes_is_truncated() {
        let challenge = [1u8; 16];
        let short = challenge_response(b"12345678", &challenge);
        let long = challenge_response(b"123456789999", &challenge);
        assert_eq!(short, long);
    }
}
