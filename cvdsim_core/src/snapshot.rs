//! Cohort files: the JSON array of entities a run starts from and the
//! snapshot it leaves behind.

use crate::{Entity, Error, Result};
use fs2::FileExt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

fn read_locked(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    file.lock_shared()?;

    let mut contents = String::new();
    let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
    let unlocked = file.unlock();
    read?;
    unlocked?;
    Ok(contents)
}

/// Load a cohort that must exist and parse
pub fn load_cohort(path: &Path) -> Result<Vec<Entity>> {
    let contents = read_locked(path).map_err(|e| match e {
        Error::Io(io) => Error::Io(std::io::Error::new(
            io.kind(),
            format!("cohort {:?}: {}", path, io),
        )),
        other => other,
    })?;
    let entities: Vec<Entity> = serde_json::from_str(&contents)?;
    tracing::info!("Loaded {} entities from {:?}", entities.len(), path);
    Ok(entities)
}

/// Load a snapshot left by an earlier run
///
/// A missing or unreadable snapshot is not an error: it is logged and an
/// empty cohort is returned.
pub fn load_snapshot(path: &Path) -> Result<Vec<Entity>> {
    if !path.exists() {
        tracing::info!("No snapshot at {:?}", path);
        return Ok(Vec::new());
    }

    let contents = match read_locked(path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::warn!("Unable to read snapshot {:?}: {}. Ignoring it.", path, e);
            return Ok(Vec::new());
        }
    };

    match serde_json::from_str::<Vec<Entity>>(&contents) {
        Ok(entities) => {
            tracing::debug!("Loaded snapshot of {} entities from {:?}", entities.len(), path);
            Ok(entities)
        }
        Err(e) => {
            tracing::warn!("Failed to parse snapshot {:?}: {}. Ignoring it.", path, e);
            Ok(Vec::new())
        }
    }
}

/// Write entities to `path` atomically (temp file, sync, rename)
pub fn save_snapshot(path: &Path, entities: &[Entity]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;
    temp.as_file().lock_exclusive()?;

    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        serde_json::to_writer(&mut writer, entities)?;
        writer.flush()?;
    }

    temp.as_file().sync_all()?;
    temp.as_file().unlock()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;

    tracing::debug!("Saved snapshot of {} entities to {:?}", entities.len(), path);
    Ok(())
}
