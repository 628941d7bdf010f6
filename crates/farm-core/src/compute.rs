//! Per-file weighted sum.
//!
//! A file is read as consecutive host-native `i64` records and reduced to
//! `sum(i * file[i])`. A trailing partial record is ignored. Arithmetic
//! wraps on overflow.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{FarmError, FarmResult};

const RECORD_BYTES: usize = std::mem::size_of::<i64>();

/// Weighted sum of every record read from `reader`
pub fn weighted_sum_of<R: Read>(reader: &mut R) -> std::io::Result<i64> {
    let mut record = [0u8; RECORD_BYTES];
    let mut sum: i64 = 0;
    let mut index: i64 = 0;
    loop {
        let mut filled = 0;
        while filled < RECORD_BYTES {
            match reader.read(&mut record[filled..]) {
                Ok(0) => return Ok(sum),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        let value = i64::from_ne_bytes(record);
        sum = sum.wrapping_add(index.wrapping_mul(value));
        index += 1;
    }
}

/// Weighted sum of the file at `path`
pub fn weighted_sum(path: &Path) -> FarmResult<i64> {
    let file = File::open(path).map_err(|e| FarmError::compute(path.display().to_string(), e))?;
    let mut reader = BufReader::new(file);
    weighted_sum_of(&mut reader).map_err(|e| FarmError::compute(path.display().to_string(), e))
}
