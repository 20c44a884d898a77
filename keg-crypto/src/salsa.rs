//! Salsa20 with a 128-bit key
//!
//! Armadillo keys are 16 bytes, which selects the Salsa20 variant expanded
//! with the "expand 16-byte k" constants. The ecosystem `salsa20` crate
//! only implements the 32-byte-key variant, whose constants differ in two
//! words and therefore emit a different keystream, so the 128-bit core
//! lives here.

pub(crate) const KEY_SIZE: usize = 16;
pub(crate) const NONCE_SIZE: usize = 8;

/// "expand 16-byte k", as little-endian words.
const TAU: [u32; 4] = [0x6170_7865, 0x3120_646e, 0x7962_2d36, 0x6b20_6574];

const ROUNDS: usize = 20;

fn quarter_round(x: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
    x[b] ^= x[a].wrapping_add(x[d]).rotate_left(7);
    x[c] ^= x[b].wrapping_add(x[a]).rotate_left(9);
    x[d] ^= x[c].wrapping_add(x[b]).rotate_left(13);
    x[a] ^= x[d].wrapping_add(x[c]).rotate_left(18);
}

/// One 64-byte keystream block.
fn block(key: &[u32; 4], nonce: &[u32; 2], counter: u64) -> [u8; 64] {
    let input: [u32; 16] = [
        TAU[0], key[0], key[1], key[2],
        key[3], TAU[1], nonce[0], nonce[1],
        counter as u32, (counter >> 32) as u32, TAU[2], key[0],
        key[1], key[2], key[3], TAU[3],
    ];

    let mut x = input;
    for _ in 0..ROUNDS / 2 {
        // column round
        quarter_round(&mut x, 0, 4, 8, 12);
        quarter_round(&mut x, 5, 9, 13, 1);
        quarter_round(&mut x, 10, 14, 2, 6);
        quarter_round(&mut x, 15, 3, 7, 11);
        // row round
        quarter_round(&mut x, 0, 1, 2, 3);
        quarter_round(&mut x, 5, 6, 7, 4);
        quarter_round(&mut x, 10, 11, 8, 9);
        quarter_round(&mut x, 15, 12, 13, 14);
    }

    let mut out = [0u8; 64];
    for (i, (word, initial)) in x.iter().zip(&input).enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&word.wrapping_add(*initial).to_le_bytes());
    }
    out
}

fn words<const N: usize>(bytes: &[u8]) -> [u32; N] {
    let mut out = [0u32; N];
    for (word, chunk) in out.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    out
}

/// XOR the keystream for `key` and `nonce` into `data`, counter from 0.
pub(crate) fn apply_keystream(key: &[u8; KEY_SIZE], nonce: &[u8; NONCE_SIZE], data: &mut [u8]) {
    let key = words::<4>(key);
    let nonce = words::<2>(nonce);

    for (counter, chunk) in data.chunks_mut(64).enumerate() {
        let stream = block(&key, &nonce, counter as u64);
        for (byte, stream_byte) in chunk.iter_mut().zip(&stream) {
            *byte ^= stream_byte;
        }
    }
}
