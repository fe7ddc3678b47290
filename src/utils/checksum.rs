//! Content digests for change detection against the remote copy.
//!
//! MD5 is used because it is what the publisher writes next to the dataset.
//! It only answers "did the bytes change", never "were they tampered with".

use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Compute the MD5 of a file and return the digest as lowercase hex.
/// Reads `block_size` bytes at a time; the result does not depend on it.
pub fn md5_file(path: &Path, block_size: usize) -> io::Result<String> {
    let mut f = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; block_size.max(1)];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
