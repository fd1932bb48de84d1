use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Combines per-chunk audio files into the final recording.
pub trait AudioJoiner: Send + Sync {
    fn join(&self, parts: &[PathBuf], dest: &Path) -> io::Result<()>;
}

/// Byte-level concatenation. MP3 streams are frame based, so appending
/// files back to back yields a playable file.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConcatJoiner;

impl AudioJoiner for ConcatJoiner {
    fn join(&self, parts: &[PathBuf], dest: &Path) -> io::Result<()> {
        let tmp = tmp_path(dest);
        let mut out = fs::File::create(&tmp)?;
        for part in parts {
            let mut input = fs::File::open(part)?;
            io::copy(&mut input, &mut out)?;
        }
        out.sync_all()?;
        drop(out);
        fs::rename(&tmp, dest)?;
        debug!(parts = parts.len(), dest = %dest.display(), "audio joined");
        Ok(())
    }
}

/// Write `bytes` to `path` so that a crash leaves either no file or the
/// complete one.
pub fn write_durable(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = tmp_path(path);
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_parts_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a 1.mp3");
        let b = dir.path().join("a 2.mp3");
        write_durable(&a, b"first-").unwrap();
        write_durable(&b, b"second").unwrap();

        let dest = dir.path().join("a.mp3");
        ConcatJoiner.join(&[a, b], &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"first-second");
        assert!(!dir.path().join("a.mp3.part").exists());
    }

    #[test]
    fn missing_part_fails() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.mp3");
        let err = ConcatJoiner
            .join(&[dir.path().join("gone.mp3")], &dest)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!dest.exists());
    }
}
