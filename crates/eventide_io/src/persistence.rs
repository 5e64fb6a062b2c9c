//! Snapshot persistence as gzip-compressed JSON.

use crate::error::{IoError, Result};
use eventide_core::Snapshot;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Writes `snapshot` to `path` as gzip-compressed JSON.
pub fn save_snapshot<P: AsRef<Path>>(snapshot: &Snapshot, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(IoError::fs("creating", path))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(&mut encoder, snapshot)?;
    encoder
        .finish()
        .and_then(|mut w| w.flush())
        .map_err(|source| IoError::Compression {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::debug!(
        path = %path.display(),
        particles = snapshot.particle_count(),
        time = snapshot.time,
        "Snapshot saved"
    );
    Ok(())
}

/// Reads a snapshot written by [`save_snapshot`].
///
/// `path` may omit the `.gz` suffix. Uncompressed JSON is accepted too.
pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<Snapshot> {
    let path = path.as_ref();
    let gz = with_gz_suffix(path);
    let target = if gz.exists() {
        gz
    } else if path.exists() {
        path.to_path_buf()
    } else {
        return Err(IoError::NotFound(path.to_path_buf()));
    };

    let mut bytes = Vec::new();
    File::open(&target)
        .and_then(|f| BufReader::new(f).read_to_end(&mut bytes))
        .map_err(IoError::fs("reading", &target))?;

    let mut decoded = Vec::new();
    let snapshot: Snapshot = if GzDecoder::new(bytes.as_slice())
        .read_to_end(&mut decoded)
        .is_ok()
    {
        serde_json::from_slice(&decoded)?
    } else {
        serde_json::from_slice(&bytes)?
    };

    if snapshot.particles.is_empty() {
        return Err(IoError::validation(format!("{:?} holds no particles", target)));
    }
    Ok(snapshot)
}

fn with_gz_suffix(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|e| e == "gz") {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_os_string();
        name.push(".gz");
        PathBuf::from(name)
    }
}

/// Writes one snapshot per temperature slot into `dir`, coldest first.
pub fn save_replicas<P: AsRef<Path>>(dir: P, snapshots: &[Snapshot]) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(IoError::fs("creating", dir))?;
    snapshots
        .iter()
        .enumerate()
        .map(|(slot, snapshot)| {
            let path = dir.join(format!("replica_{slot}.json.gz"));
            save_snapshot(snapshot, &path)?;
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventide_data::{Particle, Species, Vec3};

    fn snapshot() -> Snapshot {
        Snapshot {
            particles: vec![
                Particle::new(0, Vec3::new(0.5, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 0),
                Particle::new(1, Vec3::new(-0.5, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0), 0),
            ],
            species: vec![Species::new("A", 1.0)],
            time: 2.5,
            event_count: 17,
            captures: vec![(0, 1, 0)],
            temperature: Some(1.5),
            fingerprint: Some("abc".to_string()),
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("eventide_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_save_and_load_snapshot() {
        let path = temp_path("snapshot.json.gz");
        save_snapshot(&snapshot(), &path).unwrap();
        let restored = load_snapshot(&path).unwrap();
        assert_eq!(restored, snapshot());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_without_suffix() {
        let base = temp_path("nosuffix.json");
        let gz = with_gz_suffix(&base);
        save_snapshot(&snapshot(), &gz).unwrap();
        let restored = load_snapshot(&base).unwrap();
        assert_eq!(restored.event_count, 17);
        std::fs::remove_file(&gz).ok();
    }

    #[test]
    fn test_load_plain_json() {
        let path = temp_path("plain.json");
        std::fs::write(&path, serde_json::to_string(&snapshot()).unwrap()).unwrap();
        let restored = load_snapshot(&path).unwrap();
        assert_eq!(restored.captures, vec![(0, 1, 0)]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_snapshot() {
        let err = load_snapshot(temp_path("does_not_exist")).unwrap_err();
        assert!(matches!(err, IoError::NotFound(_)));
    }
}
