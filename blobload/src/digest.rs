//! This module provides resumable SHA-256 content digests.
//!
//! A file is hashed once while scanning; the accumulator state left after its last byte is serialized
//! alongside the final digest. The digest of `file ++ suffix` is later derived by restoring that state and feeding
//! it the suffix only, so that any number of distinct objects can be synthesized from one base file without reading
//! it again.
//!
//! The serialized layout is the one produced by Go's `crypto/sha256` binary marshaller:
//!
//! ```text
//!     "sha\x03" | h0..h7 (u32 BE) | pending block (64 bytes, zero tail) | length in bytes (u64 BE)
//! ```

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use sha2::digest::generic_array::GenericArray;

use crate::Error;

const BLOCK_LEN: usize = 64;
const LEN_OFFSET: usize = BLOCK_LEN - 8;
const MAGIC: &[u8; 4] = b"sha\x03";
const INIT: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a, 0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

/// Length of a serialized [`DigestState`].
pub const STATE_LEN: usize = MAGIC.len() + INIT.len() * 4 + BLOCK_LEN + 8;

/// A 256-bit content digest, used as an object identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hexadecimal rendering, as substituted for `{sha256}` in resource names.
    #[inline]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; 32]> for Digest {
    #[inline]
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

/// Serialized snapshot of an [`Accumulator`].
///
/// It is opaque to callers: it can only be produced by [`Accumulator::snapshot()`] and consumed by
/// [`Accumulator::restore()`] or [`extend_digest()`].
#[derive(Clone, PartialEq, Eq)]
pub struct DigestState(Box<[u8]>);

impl DigestState {
    /// Wrap raw serialized bytes; they are only validated when restored.
    #[inline]
    pub fn from_bytes(bytes: impl Into<Box<[u8]>>) -> Self {
        Self(bytes.into())
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for DigestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DigestState({} bytes)", self.0.len())
    }
}

/// A streaming SHA-256 accumulator whose intermediate state can be serialized and restored.
#[derive(Clone)]
pub struct Accumulator {
    state: [u32; 8],
    block: [u8; BLOCK_LEN],
    block_len: usize,
    len: u64,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            state: INIT,
            block: [0; BLOCK_LEN],
            block_len: 0,
            len: 0,
        }
    }

    /// Total number of bytes consumed so far.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn update(&mut self, mut data: &[u8]) {
        self.len = self.len.wrapping_add(data.len() as u64);

        if self.block_len > 0 {
            let n = data.len().min(BLOCK_LEN - self.block_len);
            self.block[self.block_len..self.block_len + n].copy_from_slice(&data[..n]);
            self.block_len += n;
            data = &data[n..];

            if self.block_len < BLOCK_LEN {
                return;
            }

            compress(&mut self.state, &self.block);
            self.block_len = 0;
        }

        let mut blocks = data.chunks_exact(BLOCK_LEN);
        for block in blocks.by_ref() {
            compress(&mut self.state, block);
        }

        let rest = blocks.remainder();
        self.block[..rest.len()].copy_from_slice(rest);
        self.block_len = rest.len();
    }

    /// Pad, compress the last block(s) and return the digest.
    pub fn finalize(mut self) -> Digest {
        let bit_len = self.len.wrapping_mul(8);

        self.block[self.block_len] = 0x80;
        self.block_len += 1;

        if self.block_len > LEN_OFFSET {
            self.block[self.block_len..].fill(0);
            compress(&mut self.state, &self.block);
            self.block_len = 0;
        }

        self.block[self.block_len..LEN_OFFSET].fill(0);
        self.block[LEN_OFFSET..].copy_from_slice(&bit_len.to_be_bytes());
        compress(&mut self.state, &self.block);

        let mut out = [0; 32];
        for (bytes, word) in out.chunks_exact_mut(4).zip(self.state) {
            bytes.copy_from_slice(&word.to_be_bytes());
        }

        Digest(out)
    }

    /// Serialize the current state.
    pub fn snapshot(&self) -> DigestState {
        let mut bytes = Vec::with_capacity(STATE_LEN);

        bytes.extend_from_slice(MAGIC);
        for word in self.state {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        bytes.extend_from_slice(&self.block[..self.block_len]);
        bytes.resize(bytes.len() + BLOCK_LEN - self.block_len, 0);
        bytes.extend_from_slice(&self.len.to_be_bytes());

        debug_assert_eq!(bytes.len(), STATE_LEN);

        DigestState(bytes.into_boxed_slice())
    }

    /// Rebuild an accumulator from a serialized state.
    pub fn restore(state: &DigestState) -> Result<Self, Error> {
        let bytes = state.as_bytes();

        if bytes.len() != STATE_LEN {
            return Err(Error::InvalidDigestState("unexpected length"));
        }

        let (magic, bytes) = bytes.split_at(MAGIC.len());
        if magic != MAGIC {
            return Err(Error::InvalidDigestState("unrecognized identifier"));
        }

        let (words, bytes) = bytes.split_at(INIT.len() * 4);
        let (pending, len) = bytes.split_at(BLOCK_LEN);

        let mut accumulator = Self::new();

        for (word, chunk) in accumulator.state.iter_mut().zip(words.chunks_exact(4)) {
            *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }

        let mut len_bytes = [0; 8];
        len_bytes.copy_from_slice(len);
        accumulator.len = u64::from_be_bytes(len_bytes);
        accumulator.block_len = (accumulator.len % BLOCK_LEN as u64) as usize;
        accumulator.block[..accumulator.block_len].copy_from_slice(&pending[..accumulator.block_len]);

        Ok(accumulator)
    }
}

impl io::Write for Accumulator {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[inline]
fn compress(state: &mut [u32; 8], block: &[u8]) {
    sha2::compress256(state, std::slice::from_ref(GenericArray::from_slice(block)));
}

/// Result of digesting a file once.
#[derive(Debug, Clone)]
pub struct FileDigest {
    pub digest: Digest,
    /// Accumulator state as it stood right after the file's last byte.
    pub state: DigestState,
    /// Number of bytes hashed.
    pub len: u64,
}

/// Stream a file once, returning its digest and the serialized accumulator state.
pub fn digest_file(path: impl AsRef<Path>) -> Result<FileDigest, Error> {
    let mut reader = BufReader::with_capacity(1 << 16, File::open(path)?);
    let mut accumulator = Accumulator::new();

    io::copy(&mut reader, &mut accumulator)?;

    Ok(FileDigest {
        state: accumulator.snapshot(),
        len: accumulator.len(),
        digest: accumulator.finalize(),
    })
}

/// Digest of the bytes behind `state` followed by `extra`, without reprocessing those bytes.
pub fn extend_digest(state: &DigestState, extra: &[u8]) -> Result<Digest, Error> {
    let mut accumulator = Accumulator::restore(state)?;
    accumulator.update(extra);
    Ok(accumulator.finalize())
}

/// Digest of an in-memory buffer.
pub fn digest_bytes(data: &[u8]) -> Digest {
    let mut accumulator = Accumulator::new();
    accumulator.update(data);
    accumulator.finalize()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rand::rngs::StdRng;
    use rand::{Rng, RngCore, SeedableRng};
    use sha2::Digest as _;

    use super::*;

    fn reference(data: &[u8]) -> [u8; 32] {
        let mut out = [0; 32];
        out.copy_from_slice(&sha2::Sha256::digest(data));
        out
    }

    fn random_bytes(rng: &mut StdRng, len: usize) -> Vec<u8> {
        let mut bytes = vec![0; len];
        rng.fill_bytes(&mut bytes);
        bytes
    }

    #[test]
    fn test_known_vectors() {
        assert_eq!(
            digest_bytes(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            digest_bytes(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_matches_reference_across_block_boundaries() {
        let mut rng = StdRng::seed_from_u64(0x5ca1ab1e);

        for len in 0..=3 * BLOCK_LEN + 1 {
            let data = random_bytes(&mut rng, len);
            assert_eq!(digest_bytes(&data).as_bytes(), &reference(&data), "len {len}");
        }
    }

    #[test]
    fn test_split_updates_match_single_update() {
        let mut rng = StdRng::seed_from_u64(7);
        let data = random_bytes(&mut rng, 1000);

        let mut accumulator = Accumulator::new();
        let mut rest = &data[..];
        while !rest.is_empty() {
            let n = rng.gen_range(0..=rest.len().min(150));
            accumulator.update(&rest[..n]);
            rest = &rest[n..];
        }

        assert_eq!(accumulator.len(), 1000);
        assert_eq!(accumulator.finalize().as_bytes(), &reference(&data));
    }

    #[test]
    fn test_extension_matches_full_rehash() {
        let mut rng = StdRng::seed_from_u64(0xd1_9e57);

        for _ in 0..500 {
            let base_len = match rng.gen_range(0..4) {
                0 => 0,
                1 => BLOCK_LEN * rng.gen_range(1..4),
                _ => rng.gen_range(0..400),
            };
            let extra_len = match rng.gen_range(0..4) {
                0 => 0,
                _ => rng.gen_range(0..200),
            };
            let base = random_bytes(&mut rng, base_len);
            let extra = random_bytes(&mut rng, extra_len);

            let mut accumulator = Accumulator::new();
            accumulator.update(&base);
            let state = accumulator.snapshot();

            let whole = [base.as_slice(), extra.as_slice()].concat();
            let extended = extend_digest(&state, &extra).unwrap();

            assert_eq!(extended.as_bytes(), &reference(&whole), "base {base_len} + extra {extra_len}");
        }
    }

    #[test]
    fn test_extension_with_empty_inputs() {
        let empty = Accumulator::new().snapshot();
        assert_eq!(extend_digest(&empty, b"").unwrap(), digest_bytes(b""));
        assert_eq!(extend_digest(&empty, b"suffix").unwrap(), digest_bytes(b"suffix"));

        let mut accumulator = Accumulator::new();
        accumulator.update(b"prefix");
        assert_eq!(extend_digest(&accumulator.snapshot(), b"").unwrap(), accumulator.finalize());
    }

    #[test]
    fn test_snapshot_layout() {
        let mut accumulator = Accumulator::new();
        accumulator.update(b"abc");

        let state = accumulator.snapshot();
        let bytes = state.as_bytes();

        assert_eq!(bytes.len(), STATE_LEN);
        assert_eq!(&bytes[..4], MAGIC);
        assert_eq!(&bytes[4..8], &INIT[0].to_be_bytes());
        assert_eq!(&bytes[36..39], b"abc");
        assert!(bytes[39..100].iter().all(|&b| b == 0));
        assert_eq!(&bytes[100..], &3u64.to_be_bytes());
    }

    #[test]
    fn test_restore_rejects_malformed_state() {
        let state = Accumulator::new().snapshot();

        let truncated = DigestState::from_bytes(&state.as_bytes()[..STATE_LEN - 1]);
        assert!(matches!(Accumulator::restore(&truncated), Err(Error::InvalidDigestState(_))));

        let mut bytes = state.as_bytes().to_vec();
        bytes[3] = 0x02;
        assert!(matches!(
            extend_digest(&DigestState::from_bytes(bytes), b"x"),
            Err(Error::InvalidDigestState(_))
        ));
    }

    #[test]
    fn test_digest_file() {
        let mut rng = StdRng::seed_from_u64(42);
        let data = random_bytes(&mut rng, 200_000);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        let file_digest = digest_file(file.path()).unwrap();

        assert_eq!(file_digest.len, data.len() as u64);
        assert_eq!(file_digest.digest.as_bytes(), &reference(&data));

        let extended = extend_digest(&file_digest.state, &[0; 16]).unwrap();
        let whole = [data.as_slice(), &[0; 16]].concat();
        assert_eq!(extended.as_bytes(), &reference(&whole));
    }

    #[test]
    fn test_digest_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(digest_file(dir.path().join("missing")), Err(Error::Io(_))));
    }
}
