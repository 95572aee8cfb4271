//! Image enumeration from `/proc/<pid>/maps`
//!
//! Every file-backed mapping of the same path belongs to one image; the image
//! spans from the lowest mapping start to the highest mapping end. This works
//! for any process we can read, not only our own.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::polling::ImageEnumerator;
use super::read_code_id;
use crate::domain::{ImageInfo, ObserverError, Pid};

const DELETED_SUFFIX: &str = " (deleted)";

/// Images of a process as listed in its memory maps
#[derive(Debug, Clone)]
pub struct ProcMaps {
    pid: Option<Pid>,
    maps_path: PathBuf,
    read_code_ids: bool,
}

impl ProcMaps {
    pub fn for_pid(pid: Pid) -> Self {
        Self { pid: Some(pid), maps_path: PathBuf::from(format!("/proc/{}/maps", pid.0)), read_code_ids: true }
    }

    /// Read mappings from an arbitrary file in maps format
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { pid: None, maps_path: path.into(), read_code_ids: true }
    }

    /// Skip opening image files for their build ids
    #[must_use]
    pub fn without_code_ids(mut self) -> Self {
        self.read_code_ids = false;
        self
    }

    pub fn maps_path(&self) -> &Path {
        &self.maps_path
    }
}

impl ImageEnumerator for ProcMaps {
    fn enumerate_images(&self) -> Result<Vec<ImageInfo>, ObserverError> {
        let maps = fs::read_to_string(&self.maps_path).map_err(|e| match self.pid {
            Some(pid) => {
                warn!("Failed to read {}: {e}", self.maps_path.display());
                ObserverError::EnumerationFailed(pid)
            }
            None => ObserverError::Io(e),
        })?;

        let mut images = parse_memory_maps(&maps);
        if self.read_code_ids {
            for image in &mut images {
                image.code_id = image.name.as_deref().and_then(|name| read_code_id(Path::new(name)));
            }
        }

        info!("Found {} images in {}", images.len(), self.maps_path.display());
        Ok(images)
    }
}

/// Group the file-backed mappings of a maps listing into images
///
/// Images are returned in order of their first mapping. Lines that cannot be
/// parsed are skipped.
pub fn parse_memory_maps(maps: &str) -> Vec<ImageInfo> {
    let mut images: Vec<(String, u64, u64)> = Vec::new();
    let mut by_path: HashMap<String, usize> = HashMap::new();

    for line in maps.lines() {
        // "start-end perms offset dev inode pathname"
        let mut parts = line.splitn(6, char::is_whitespace);
        let Some(range) = parts.next() else {
            continue;
        };
        let Some(path) = parts.nth(4).map(str::trim).filter(|p| p.starts_with('/')) else {
            continue;
        };
        let path = path.strip_suffix(DELETED_SUFFIX).unwrap_or(path);

        let Some((start, end)) = parse_range(range) else {
            warn!("Skipping unparsable mapping: {line}");
            continue;
        };

        match by_path.get(path) {
            Some(&index) => {
                let entry = &mut images[index];
                entry.1 = entry.1.min(start);
                entry.2 = entry.2.max(end);
            }
            None => {
                by_path.insert(path.to_string(), images.len());
                images.push((path.to_string(), start, end));
            }
        }
    }

    images
        .into_iter()
        .map(|(path, start, end)| ImageInfo {
            name: Some(path),
            base_address: start,
            size: end.saturating_sub(start),
            code_id: None,
        })
        .collect()
}

fn parse_range(range: &str) -> Option<(u64, u64)> {
    let (start, end) = range.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPS: &str = "\
55f3a2b4c000-55f3a2b4d000 r--p 00000000 08:01 1234    /usr/bin/app
55f3a2b4d000-55f3a2b5f000 r-xp 00001000 08:01 1234    /usr/bin/app
55f3a2b5f000-55f3a2b60000 rw-p 00013000 08:01 1234    /usr/bin/app
55f3a3000000-55f3a3021000 rw-p 00000000 00:00 0       [heap]
7f8b3c1a0000-7f8b3c1c2000 r--p 00000000 08:01 5678    /usr/lib/libc.so.6
7f8b3c1c2000-7f8b3c337000 r-xp 00022000 08:01 5678    /usr/lib/libc.so.6
7f8b3c400000-7f8b3c401000 rw-p 00000000 00:00 0
7f8b3c500000-7f8b3c510000 r-xp 00000000 08:01 9999    /tmp/libgone.so (deleted)
7ffd1c9f0000-7ffd1c9f2000 r-xp 00000000 00:00 0       [vdso]
";

    #[test]
    fn test_parse_memory_maps_groups_by_path() {
        let images = parse_memory_maps(MAPS);
        assert_eq!(images.len(), 3);

        assert_eq!(images[0].name.as_deref(), Some("/usr/bin/app"));
        assert_eq!(images[0].base_address, 0x55f3_a2b4_c000);
        assert_eq!(images[0].size, 0x55f3_a2b6_0000 - 0x55f3_a2b4_c000);

        assert_eq!(images[1].name.as_deref(), Some("/usr/lib/libc.so.6"));
        assert_eq!(images[1].base_address, 0x7f8b_3c1a_0000);
        assert_eq!(images[1].size, 0x19_7000);

        assert_eq!(images[2].name.as_deref(), Some("/tmp/libgone.so"));
    }

    #[test]
    fn test_parse_memory_maps_skips_garbage() {
        let images = parse_memory_maps("not a maps line\nzzzz-1000 r-xp 0 0:0 0 /lib/x.so\n");
        assert!(images.is_empty());
    }

    #[test]
    fn test_enumerate_from_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), MAPS).unwrap();

        let maps = ProcMaps::from_path(file.path()).without_code_ids();
        let images = maps.enumerate_images().unwrap();
        assert_eq!(images.len(), 3);
        assert!(images.iter().all(|image| image.code_id.is_none()));
    }

    #[test]
    fn test_missing_maps_file() {
        let maps = ProcMaps::from_path("/nonexistent/maps");
        assert!(matches!(maps.enumerate_images(), Err(ObserverError::Io(_))));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_parse_memory_maps_self() {
        let maps = ProcMaps::for_pid(Pid::current());
        let images = maps.enumerate_images().unwrap();

        let exe = std::env::current_exe().unwrap();
        let exe = exe.to_str().unwrap();
        assert!(images.iter().any(|image| image.name.as_deref() == Some(exe)));
    }
}
