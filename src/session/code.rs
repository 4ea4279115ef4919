//! Process code generation.

use bytes::Bytes;
use rand::Rng;

/// Key alphabet codes are drawn from. Every digit appears four times, so a
/// uniform draw over the table is a uniform draw over the digits.
pub const KEYS: &[u8; 40] = b"1234567890306215498735768942100316258974";

/// Length of codes allocated by the server.
pub const DEFAULT_CODE_LENGTH: usize = 8;

/// Draw `len` symbols independently and uniformly from [`KEYS`].
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Bytes {
    (0..len)
        .map(|_| KEYS[rng.random_range(0..KEYS.len())])
        .collect::<Vec<u8>>()
        .into()
}
