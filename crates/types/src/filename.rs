// SPDX-FileCopyrightText: Copyright © 2026 ique Developers
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;

use crate::constants::{MAX_EXT_LEN, MAX_STEM_LEN};

#[derive(Debug, thiserror::Error)]
pub enum FilenameError {
    #[error("filename has more than one '.' separator")]
    MultipleSeparators,
    #[error("filename stem longer than {MAX_STEM_LEN} characters")]
    StemTooLong,
    #[error("filename extension longer than {MAX_EXT_LEN} characters")]
    ExtTooLong,
    #[error("filename is empty")]
    Empty,
}

/// A validated on-device filename: an 8-character stem and a 3-character
/// extension, matching the directory entry's fixed-width fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Filename {
    stem: String,
    ext: String,
}

impl Filename {
    pub fn parse(display: &str) -> Result<Self, FilenameError> {
        if display.is_empty() {
            return Err(FilenameError::Empty);
        }
        let mut parts = display.splitn(2, '.');
        let stem = parts.next().unwrap_or_default();
        let ext = parts.next().unwrap_or_default();
        if display.matches('.').count() > 1 {
            return Err(FilenameError::MultipleSeparators);
        }
        if stem.len() > MAX_STEM_LEN {
            return Err(FilenameError::StemTooLong);
        }
        if ext.len() > MAX_EXT_LEN {
            return Err(FilenameError::ExtTooLong);
        }
        Ok(Filename {
            stem: stem.to_string(),
            ext: ext.to_string(),
        })
    }

    /// Build directly from the directory entry's fixed-width, space-padded
    /// stem and extension fields, trimming trailing padding.
    pub fn from_entry_fields(stem_field: &[u8; MAX_STEM_LEN], ext_field: &[u8; MAX_EXT_LEN]) -> Self {
        let stem = trim_field(stem_field);
        let ext = trim_field(ext_field);
        Filename { stem, ext }
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn ext(&self) -> &str {
        &self.ext
    }

    /// Render into a directory entry's fixed-width stem field, space-padded.
    pub fn to_stem_field(&self) -> [u8; MAX_STEM_LEN] {
        pad_field::<MAX_STEM_LEN>(&self.stem)
    }

    /// Render into a directory entry's fixed-width extension field, space-padded.
    pub fn to_ext_field(&self) -> [u8; MAX_EXT_LEN] {
        pad_field::<MAX_EXT_LEN>(&self.ext)
    }
}

impl fmt::Display for Filename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ext.is_empty() {
            write!(f, "{}", self.stem)
        } else {
            write!(f, "{}.{}", self.stem, self.ext)
        }
    }
}

fn trim_field(field: &[u8]) -> String {
    let end = field
        .iter()
        .rposition(|&b| b != b' ' && b != 0)
        .map(|p| p + 1)
        .unwrap_or(0);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn pad_field<const N: usize>(s: &str) -> [u8; N] {
    let mut out = [b' '; N];
    let bytes = s.as_bytes();
    let n = bytes.len().min(N);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stem_and_extension() {
        let f = Filename::parse("game.bin").unwrap();
        assert_eq!(f.stem(), "game");
        assert_eq!(f.ext(), "bin");
        assert_eq!(f.to_string(), "game.bin");
    }

    #[test]
    fn rejects_long_stem() {
        assert!(Filename::parse("toolongstem.bin").is_err());
    }

    #[test]
    fn rejects_multiple_dots() {
        assert!(Filename::parse("a.b.c").is_err());
    }

    #[test]
    fn round_trips_through_fields() {
        let f = Filename::parse("temp.tmp").unwrap();
        let stem_field = f.to_stem_field();
        let ext_field = f.to_ext_field();
        let back = Filename::from_entry_fields(&stem_field, &ext_field);
        assert_eq!(f, back);
    }
}
