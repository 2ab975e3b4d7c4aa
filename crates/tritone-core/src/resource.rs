//! Resource identifiers.
//!
//! A resource named like `1855.mp3` keeps its number. Anything else gets a
//! content-derived identifier: murmur3 over 8 x 8 KiB read from the middle
//! of the file, mapped into the upper half of the i32 range so the lower
//! half stays free for explicit sequential identifiers.

use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;

const BLOCK_SIZE: u64 = 8 * 1024;
const BLOCKS_IN_HASH: u64 = 8;

/// Identifier for an audio resource. Stable across runs for identical file
/// contents.
pub fn resource_id(path: &Path) -> i32 {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    if !stem.is_empty() && stem.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(explicit) = stem.parse::<i32>() {
            return explicit;
        }
    }

    let mut hash = file_content_hash(path).unwrap_or(0);
    if hash == 0 {
        hash = path_hash(path).wrapping_abs();
    }
    // Reserve the lower half of the i32 range for sequential identifiers.
    let min_value = i32::MAX / 2;
    min_value + hash / 2
}

/// Murmur3 of 8 x 8 KiB blocks read in the middle of the file. `None` when
/// the file cannot be read.
fn file_content_hash(path: &Path) -> Option<i32> {
    let mut file = File::open(path).ok()?;
    let file_size = file.metadata().ok()?.len();
    let offset_in_blocks = (file_size / 2) / BLOCK_SIZE;
    let wanted = (BLOCK_SIZE * BLOCKS_IN_HASH) as usize;

    file.seek(SeekFrom::Start(offset_in_blocks * BLOCK_SIZE)).ok()?;
    let mut data = vec![0u8; wanted];
    let mut read = 0;
    while read < wanted {
        match file.read(&mut data[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(_) => return None,
        }
    }
    if read != wanted {
        log::warn!(
            "Will only use {} bytes for the hash of '{}', expected {}",
            read,
            path.display(),
            wanted
        );
    }

    let hash = murmur3::murmur3_32(&mut Cursor::new(&data[..read]), 0).ok()?;
    Some(hash as i32)
}

fn path_hash(path: &Path) -> i32 {
    let text = path.display().to_string();
    murmur3::murmur3_32(&mut Cursor::new(text.as_bytes()), 0)
        .map(|hash| hash as i32)
        .unwrap_or(0)
}
