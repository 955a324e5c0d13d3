use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use bytes::Bytes;
use uuid::Uuid;

use crate::Result;
use crate::object::{generate_object_id, validate_object_id, ObjectId};

const TEMP_SUFFIX: &str = ".tmp";

/// On-disk object bytes, one file per object id.
///
/// Objects live under `objects/<first two id chars>/<id>`. Every write lands
/// in a uniquely named temp file next to its destination and is renamed into
/// place after `sync_all`, so concurrent readers observe either nothing or
/// the complete object.
pub struct LocalObjectStore {
    storage_path: PathBuf,
}

impl LocalObjectStore {
    pub async fn new<P: AsRef<Path>>(storage_path: P) -> Result<Self> {
        let storage_path = storage_path.as_ref().to_path_buf();

        fs::create_dir_all(storage_path.join("objects")).await?;

        Ok(Self { storage_path })
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    /// Stores `data` under a freshly allocated id.
    pub async fn put(&self, data: &[u8]) -> Result<ObjectId> {
        let id = generate_object_id();
        self.put_with_id(&id, data).await?;
        Ok(id)
    }

    pub async fn put_with_id(&self, id: &str, data: &[u8]) -> Result<()> {
        validate_object_id(id)?;

        let object_dir = self.shard_dir(id);
        fs::create_dir_all(&object_dir).await?;

        let file_path = object_dir.join(id);
        let temp_path = object_dir.join(format!(".{}.{}{}", id, Uuid::new_v4().simple(), TEMP_SUFFIX));

        if let Err(e) = Self::write_temp(&temp_path, data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_path, &file_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        tracing::debug!("Wrote object {} ({} bytes)", id, data.len());
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Bytes>> {
        validate_object_id(id)?;

        match fs::read(self.object_path(id)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, id: &str) -> Result<bool> {
        validate_object_id(id)?;
        Ok(fs::try_exists(self.object_path(id)).await?)
    }

    /// Returns false when there was nothing to delete.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        validate_object_id(id)?;

        match fs::remove_file(self.object_path(id)).await {
            Ok(()) => {
                tracing::debug!("Deleted object {}", id);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_ids(&self) -> Result<Vec<ObjectId>> {
        let mut ids = Vec::new();
        self.visit_objects(|name, _| ids.push(name.to_string())).await?;
        Ok(ids)
    }

    /// Sum of all complete object sizes.
    pub async fn used_bytes(&self) -> Result<u64> {
        let mut total = 0u64;
        self.visit_objects(|_, len| total += len).await?;
        Ok(total)
    }

    async fn visit_objects<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&str, u64),
    {
        let objects_dir = self.storage_path.join("objects");
        if !fs::try_exists(&objects_dir).await? {
            return Ok(());
        }

        let mut entries = fs::read_dir(&objects_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }

            let mut sub_entries = fs::read_dir(entry.path()).await?;
            while let Some(sub_entry) = sub_entries.next_entry().await? {
                let name = sub_entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if name.ends_with(TEMP_SUFFIX) || validate_object_id(name).is_err() {
                    continue;
                }

                if let Ok(metadata) = sub_entry.metadata().await {
                    if metadata.is_file() {
                        visit(name, metadata.len());
                    }
                }
            }
        }

        Ok(())
    }

    async fn write_temp(temp_path: &Path, data: &[u8]) -> Result<()> {
        let mut file = fs::File::create(temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        Ok(())
    }

    fn shard_dir(&self, id: &str) -> PathBuf {
        self.storage_path.join("objects").join(&id[..2.min(id.len())])
    }

    fn object_path(&self, id: &str) -> PathBuf {
        self.shard_dir(id).join(id)
    }
}
