use std::collections::HashMap;

use crate::database::VolumeRow;
use crate::error::{Result, SyncError};

/// Where a volume's files live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prefix {
    /// A Windows drive letter. MediaMonkey stores paths as `:\Dir\File.mp3`.
    Drive(char),
    /// A mount point or share root that replaces the drive entirely.
    Mount(String),
}

impl Prefix {
    /// Parse a configured override: `D`, `D:` or a mount point/share root.
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some(letter), None, None) | (Some(letter), Some(':'), None)
                if letter.is_ascii_alphabetic() =>
            {
                Prefix::Drive(letter.to_ascii_uppercase())
            }
            _ => Prefix::Mount(trimmed.to_string()),
        }
    }
}

/// MediaMonkey numbers drive letters from zero (`0` is `A:`).
fn drive_letter(index: i64) -> Option<char> {
    u8::try_from(index)
        .ok()
        .filter(|i| *i < 26)
        .map(|i| char::from(b'A' + i))
}

/// Maps MediaMonkey volume ids (`IDMedia`) to path prefixes for one session.
#[derive(Debug, Clone, Default)]
pub struct VolumeResolver {
    prefixes: HashMap<i64, Prefix>,
}

impl VolumeResolver {
    /// Build the drive map from the `Medias` table.
    ///
    /// `overrides` is keyed by drive letter (`"C"`) or by volume id (`"3"`), the
    /// latter winning. Volumes without a usable drive letter and no override are
    /// left unmapped, so tracks on them fail to resolve.
    pub fn from_rows(rows: &[VolumeRow], overrides: &HashMap<String, String>) -> Self {
        let overrides: HashMap<String, Prefix> = overrides
            .iter()
            .map(|(key, value)| {
                let key = key.trim().trim_end_matches(':').to_uppercase();
                (key, Prefix::parse(value))
            })
            .collect();

        let mut prefixes = HashMap::new();
        for row in rows {
            let letter = row.drive_letter.and_then(drive_letter);
            let prefix = overrides
                .get(&row.id.to_string())
                .or_else(|| letter.and_then(|l| overrides.get(&l.to_string())))
                .cloned()
                .or(letter.map(Prefix::Drive));

            match prefix {
                Some(prefix) => {
                    log::debug!("Volume {} resolves to {:?}", row.id, prefix);
                    prefixes.insert(row.id, prefix);
                }
                None => log::debug!(
                    "Volume {} has no drive letter ({:?}) and no override",
                    row.id,
                    row.drive_letter
                ),
            }
        }

        Self { prefixes }
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn resolve(&self, volume_id: i64) -> Result<&Prefix> {
        self.prefixes
            .get(&volume_id)
            .ok_or_else(|| SyncError::not_found("volume", volume_id))
    }

    /// Join a stored relative path onto its volume prefix.
    ///
    /// The returned path is always rooted; anything else is an error.
    pub fn qualify(&self, volume_id: i64, relative: &str) -> Result<String> {
        let path = match self.resolve(volume_id)? {
            Prefix::Drive(letter) => {
                if relative.starts_with(':') {
                    format!("{}{}", letter, relative)
                } else if relative.starts_with(['\\', '/']) {
                    format!("{}:{}", letter, relative)
                } else {
                    format!("{}:\\{}", letter, relative)
                }
            }
            Prefix::Mount(root) => {
                let sep = if root.starts_with('/') { '/' } else { '\\' };
                let rest: String = relative
                    .trim_start_matches(':')
                    .chars()
                    .map(|c| if c == '\\' || c == '/' { sep } else { c })
                    .collect();
                format!(
                    "{}{}{}",
                    root.trim_end_matches(['/', '\\']),
                    sep,
                    rest.trim_start_matches(sep)
                )
            }
        };

        if is_rooted(&path) {
            Ok(path)
        } else {
            Err(SyncError::InvalidPath { path })
        }
    }
}

fn is_rooted(path: &str) -> bool {
    let bytes = path.as_bytes();
    match bytes {
        [letter, b':', b'\\' | b'/', ..] => letter.is_ascii_alphabetic(),
        [b'/', ..] => true,
        [b'\\', b'\\', ..] => true,
        _ => false,
    }
}
