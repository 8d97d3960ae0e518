//! Chunked streaming AES-256-GCM
//!
//! Stream format (binary):
//! ```text
//! [12 bytes: file nonce]
//! repeated:
//!   [4 bytes: ciphertext length, big-endian][12 bytes: chunk nonce][ciphertext + 16-byte tag]
//! ```
//!
//! Plaintext is cut into 64 KiB chunks. Chunk `i` is sealed under the file
//! nonce with its trailing 8 bytes XORed with `i` (big-endian), so nonces
//! never repeat within a file and the random file nonce keeps files apart.
//!
//! The last chunk is always shorter than [`CHUNK_SIZE`], empty if the
//! plaintext length is a multiple of it. Readers derive every nonce from
//! their own counter, so reordered, dropped, duplicated, or trailing frames
//! all surface as [`ShareError::AuthenticationFailure`].

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use std::io::{self, Read, Write};
use zkshare_core::{ShareError, ShareResult};

use crate::keys::ShareKey;
use crate::{NONCE_SIZE, TAG_SIZE};

/// Plaintext bytes per chunk
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Length prefix plus chunk nonce
pub const FRAME_OVERHEAD: usize = 4 + NONCE_SIZE;

/// Largest ciphertext a length prefix may announce
pub const MAX_FRAME_CIPHERTEXT: usize = CHUNK_SIZE + TAG_SIZE;

/// Nonce for chunk `index`: the file nonce with `index` XORed into its low 8 bytes.
pub fn chunk_nonce(file_nonce: &[u8; NONCE_SIZE], index: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = *file_nonce;
    for (b, i) in nonce[NONCE_SIZE - 8..].iter_mut().zip(index.to_be_bytes()) {
        *b ^= i;
    }
    nonce
}

/// Exact sealed size for a plaintext of `plaintext_len` bytes.
pub fn sealed_len(plaintext_len: u64) -> u64 {
    let chunks = plaintext_len / CHUNK_SIZE as u64 + 1;
    NONCE_SIZE as u64 + plaintext_len + chunks * (FRAME_OVERHEAD + TAG_SIZE) as u64
}

/// Incremental encoder. Emit [`StreamSealer::header`] first, then one frame
/// per [`StreamSealer::seal_chunk`] call.
pub struct StreamSealer {
    cipher: Aes256Gcm,
    file_nonce: [u8; NONCE_SIZE],
    counter: u64,
    finished: bool,
}

impl StreamSealer {
    pub fn new(key: &ShareKey) -> Self {
        let mut file_nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut file_nonce);
        Self {
            cipher: Aes256Gcm::new(key.as_bytes().into()),
            file_nonce,
            counter: 0,
            finished: false,
        }
    }

    pub fn header(&self) -> [u8; NONCE_SIZE] {
        self.file_nonce
    }

    /// Seal the next chunk into a complete frame.
    ///
    /// A chunk shorter than [`CHUNK_SIZE`] ends the stream; sealing anything
    /// after it is an error.
    pub fn seal_chunk(&mut self, chunk: &[u8]) -> ShareResult<Vec<u8>> {
        if self.finished {
            return Err(ShareError::InvalidInput(
                "stream already finished by a short chunk".into(),
            ));
        }
        if chunk.len() > CHUNK_SIZE {
            return Err(ShareError::InvalidInput(format!(
                "chunk of {} bytes exceeds {CHUNK_SIZE}",
                chunk.len()
            )));
        }

        let nonce_bytes = chunk_nonce(&self.file_nonce, self.counter);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), chunk)
            .map_err(|e| anyhow::anyhow!("chunk encryption failed: {e}"))?;

        self.counter = self
            .counter
            .checked_add(1)
            .ok_or_else(|| ShareError::InvalidInput("chunk counter exhausted".into()))?;
        self.finished = chunk.len() < CHUNK_SIZE;

        let mut frame = Vec::with_capacity(FRAME_OVERHEAD + ciphertext.len());
        frame.extend_from_slice(&(ciphertext.len() as u32).to_be_bytes());
        frame.extend_from_slice(&nonce_bytes);
        frame.extend_from_slice(&ciphertext);
        Ok(frame)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Incremental decoder, the mirror of [`StreamSealer`].
pub struct StreamOpener {
    cipher: Aes256Gcm,
    file_nonce: [u8; NONCE_SIZE],
    counter: u64,
    finished: bool,
}

impl StreamOpener {
    pub fn new(key: &ShareKey, header: &[u8; NONCE_SIZE]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.as_bytes().into()),
            file_nonce: *header,
            counter: 0,
            finished: false,
        }
    }

    /// Open one frame body (the bytes after the length prefix).
    pub fn open_frame(&mut self, wire_nonce: &[u8], ciphertext: &[u8]) -> ShareResult<Vec<u8>> {
        if self.finished || ciphertext.len() < TAG_SIZE || ciphertext.len() > MAX_FRAME_CIPHERTEXT
        {
            return Err(ShareError::AuthenticationFailure);
        }

        let expected = chunk_nonce(&self.file_nonce, self.counter);
        if wire_nonce != expected {
            return Err(ShareError::AuthenticationFailure);
        }

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&expected), ciphertext)
            .map_err(|_| ShareError::AuthenticationFailure)?;

        self.counter += 1;
        self.finished = plaintext.len() < CHUNK_SIZE;
        Ok(plaintext)
    }

    /// Confirm the terminating short chunk was seen.
    pub fn finish(&self) -> ShareResult<()> {
        if self.finished {
            Ok(())
        } else {
            Err(ShareError::AuthenticationFailure)
        }
    }

    pub fn chunks_opened(&self) -> u64 {
        self.counter
    }
}

/// Encrypt everything from `reader` into `writer`. Returns bytes written.
///
/// Memory use is bounded by one chunk regardless of input size.
pub fn encrypt_stream<R: Read, W: Write>(
    key: &ShareKey,
    mut reader: R,
    mut writer: W,
) -> ShareResult<u64> {
    let mut sealer = StreamSealer::new(key);
    writer.write_all(&sealer.header())?;
    let mut written = NONCE_SIZE as u64;

    let mut buf = vec![0u8; CHUNK_SIZE];
    while !sealer.is_finished() {
        let n = read_full(&mut reader, &mut buf)?;
        let frame = sealer.seal_chunk(&buf[..n])?;
        writer.write_all(&frame)?;
        written += frame.len() as u64;
    }

    writer.flush()?;
    tracing::trace!(chunks = sealer.counter, bytes = written, "stream sealed");
    Ok(written)
}

/// Decrypt a stream produced by [`encrypt_stream`]. Returns plaintext bytes written.
///
/// Plaintext is written chunk by chunk as each one authenticates. On error the
/// caller must discard whatever reached `writer`; [`open_chunked`] does that
/// for in-memory use.
pub fn decrypt_stream<R: Read, W: Write>(
    key: &ShareKey,
    mut reader: R,
    mut writer: W,
) -> ShareResult<u64> {
    let mut header = [0u8; NONCE_SIZE];
    if read_full(&mut reader, &mut header)? != NONCE_SIZE {
        return Err(ShareError::AuthenticationFailure);
    }
    let mut opener = StreamOpener::new(key, &header);

    let mut written = 0u64;
    let mut len_buf = [0u8; 4];
    let mut nonce_buf = [0u8; NONCE_SIZE];
    let mut ciphertext = Vec::with_capacity(MAX_FRAME_CIPHERTEXT);
    loop {
        match read_full(&mut reader, &mut len_buf)? {
            0 => break,
            4 => {}
            _ => return Err(ShareError::AuthenticationFailure),
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        if !(TAG_SIZE..=MAX_FRAME_CIPHERTEXT).contains(&len) {
            return Err(ShareError::AuthenticationFailure);
        }

        if read_full(&mut reader, &mut nonce_buf)? != NONCE_SIZE {
            return Err(ShareError::AuthenticationFailure);
        }
        ciphertext.resize(len, 0);
        if read_full(&mut reader, &mut ciphertext)? != len {
            return Err(ShareError::AuthenticationFailure);
        }

        let plaintext = opener.open_frame(&nonce_buf, &ciphertext)?;
        writer.write_all(&plaintext)?;
        written += plaintext.len() as u64;
    }

    opener.finish()?;
    writer.flush()?;
    Ok(written)
}

/// In-memory convenience over [`encrypt_stream`].
pub fn seal_chunked(key: &ShareKey, plaintext: &[u8]) -> ShareResult<Vec<u8>> {
    let mut out = Vec::with_capacity(sealed_len(plaintext.len() as u64) as usize);
    encrypt_stream(key, plaintext, &mut out)?;
    Ok(out)
}

/// In-memory convenience over [`decrypt_stream`]. Returns nothing unless
/// every chunk authenticated.
pub fn open_chunked(key: &ShareKey, blob: &[u8]) -> ShareResult<Vec<u8>> {
    let mut out = Vec::with_capacity(blob.len());
    decrypt_stream(key, blob, &mut out)?;
    Ok(out)
}

/// Read until `buf` is full or EOF. Returns the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
