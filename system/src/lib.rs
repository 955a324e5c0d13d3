use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("Storage directory unusable: {0}")]
    StorageDir(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Unsupported platform: {0}")]
    Unsupported(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Creates the storage directory if needed and checks it is a directory.
pub fn prepare_storage_dir(storage_path: &Path) -> Result<(), SystemError> {
    std::fs::create_dir_all(storage_path).map_err(|e| {
        SystemError::StorageDir(format!("cannot create {}: {}", storage_path.display(), e))
    })?;

    let metadata = std::fs::metadata(storage_path)?;
    if !metadata.is_dir() {
        return Err(SystemError::StorageDir(format!(
            "{} is not a directory",
            storage_path.display()
        )));
    }

    tracing::info!("Storage directory ready at {}", storage_path.display());
    Ok(())
}

/// Total size in bytes of the filesystem holding `path`.
#[cfg(unix)]
pub fn disk_capacity(path: &Path) -> Result<u64, SystemError> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| SystemError::InvalidPath(e.to_string()))?;

    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(SystemError::Io(std::io::Error::last_os_error()));
    }

    #[allow(clippy::unnecessary_cast)]
    Ok(stat.f_blocks as u64 * stat.f_frsize as u64)
}

#[cfg(not(unix))]
pub fn disk_capacity(_path: &Path) -> Result<u64, SystemError> {
    Err(SystemError::Unsupported("disk capacity probe requires a unix platform"))
}

/// Capacity this node advertises: the configured ceiling, lowered to the
/// filesystem size when that can be measured.
pub fn effective_capacity(path: &Path, configured_max: u64) -> u64 {
    match disk_capacity(path) {
        Ok(disk) if disk > 0 => disk.min(configured_max),
        Ok(_) => configured_max,
        Err(e) => {
            tracing::debug!("Disk capacity probe failed for {}: {}", path.display(), e);
            configured_max
        }
    }
}
