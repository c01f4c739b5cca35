//! Per-conversation interface state persisted between sessions.

use std::{
    fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use chat_core::{InterfaceState, PeerId};

use crate::PlatformError;

/// Location of the interface state file for `peer_id` under `data_dir`.
pub fn interface_state_path(data_dir: &Path, peer_id: PeerId) -> PathBuf {
    data_dir.join(format!("peer-{}.interface.json", peer_id.0))
}

/// Load interface state JSON from disk when available.
pub fn load_interface_state(path: &Path) -> Result<Option<InterfaceState>, PlatformError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(PlatformError::Backend(format!(
                "failed reading interface state {}: {err}",
                path.display()
            )));
        }
    };

    let state = serde_json::from_str::<InterfaceState>(&raw).map_err(|err| {
        PlatformError::Backend(format!(
            "failed parsing interface state {}: {err}",
            path.display()
        ))
    })?;
    Ok(Some(state))
}

/// Persist interface state JSON, creating parent directories when needed.
pub fn save_interface_state(path: &Path, state: &InterfaceState) -> Result<(), PlatformError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            PlatformError::Backend(format!(
                "failed creating interface state directory {}: {err}",
                parent.display()
            ))
        })?;
    }

    let encoded =
        serde_json::to_vec_pretty(state).map_err(|err| PlatformError::Backend(err.to_string()))?;
    let temp_path = temp_path_for(path);
    fs::write(&temp_path, encoded).map_err(|err| {
        PlatformError::Backend(format!(
            "failed writing temp interface state {}: {err}",
            temp_path.display()
        ))
    })?;

    if let Err(rename_err) = fs::rename(&temp_path, path) {
        // Windows does not allow replacing existing files via rename.
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                let _ = fs::remove_file(&temp_path);
                return Err(PlatformError::Backend(format!(
                    "failed replacing interface state {} after rename error ({rename_err}): {err}",
                    path.display()
                )));
            }
        }
        fs::rename(&temp_path, path).map_err(|err| {
            let _ = fs::remove_file(&temp_path);
            PlatformError::Backend(format!(
                "failed writing interface state {} after temp write: {err}",
                path.display()
            ))
        })?;
    }

    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or("interface.json");
    let now_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos())
        .unwrap_or(0);
    parent.join(format!(".{file_name}.{now_nanos}.tmp"))
}

/// Remove the interface state file; a missing file is not an error.
pub fn clear_interface_state(path: &Path) -> Result<(), PlatformError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(PlatformError::Backend(format!(
            "failed deleting interface state {}: {err}",
            path.display()
        ))),
    }
}
