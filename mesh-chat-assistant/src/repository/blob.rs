//! C7/C11 — mesh blob repository.
//!
//! Grounded on `original_source/src/repository/model.py`
//! (`AsyncS3ModelRepository`: save/get_url/get_batch_urls/set_owner/
//! list_by_owner), with the S3 object store replaced by a filesystem
//! directory — no object-storage crate is in the teacher's or pack's
//! dependency set, and spec.md §6 already frames the object store as an
//! external collaborator this repo only needs a working stand-in for.
//! Files are named `{uuid}.obj` exactly as spec.md §6 specifies.

use std::collections::HashMap;
use std::path::PathBuf;

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{AssistantError, Result};
use crate::models::MeshBlobRecord;

pub struct BlobRepository {
    dir: PathBuf,
    records: DashMap<Uuid, MeshBlobRecord>,
}

impl BlobRepository {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            records: DashMap::new(),
        }
    }

    /// `save(message_id, bytes) -> {id, url}`.
    pub async fn save(&self, message_id: u64, bytes: &[u8]) -> Result<MeshBlobRecord> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let id = Uuid::new_v4();
        let path = self.dir.join(format!("{id}.obj"));
        tokio::fs::write(&path, bytes).await?;

        let record = MeshBlobRecord {
            id,
            message_id,
            url: format!("file://{}", path.display()),
            owner: None,
        };
        self.records.insert(id, record.clone());
        Ok(record)
    }

    pub fn get_url(&self, id: Uuid) -> Result<String> {
        self.records
            .get(&id)
            .map(|r| r.url.clone())
            .ok_or_else(|| AssistantError::PersistenceFailure(format!("no blob with id {id}")))
    }

    pub fn get_urls(&self, ids: &[Uuid]) -> HashMap<Uuid, String> {
        ids.iter()
            .filter_map(|id| self.records.get(id).map(|r| (*id, r.url.clone())))
            .collect()
    }

    pub fn set_owner(&self, id: Uuid, owner: Option<u64>) -> Result<()> {
        let mut entry = self
            .records
            .get_mut(&id)
            .ok_or_else(|| AssistantError::PersistenceFailure(format!("no blob with id {id}")))?;
        entry.owner = owner;
        Ok(())
    }

    pub fn list_by_owner(&self, owner: u64) -> Vec<MeshBlobRecord> {
        self.records
            .iter()
            .filter(|entry| entry.owner == Some(owner))
            .map(|entry| entry.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_writes_a_uuid_named_file_and_returns_its_url() {
        let dir = tempfile::tempdir().unwrap();
        let repo = BlobRepository::new(dir.path().to_path_buf());
        let record = repo.save(1, b"v 0 0 0\n").await.unwrap();
        assert!(record.url.ends_with(".obj"));
        assert_eq!(repo.get_url(record.id).unwrap(), record.url);
    }

    #[tokio::test]
    async fn unknown_owner_filters_out_everything() {
        let dir = tempfile::tempdir().unwrap();
        let repo = BlobRepository::new(dir.path().to_path_buf());
        let record = repo.save(1, b"v 0 0 0\n").await.unwrap();
        repo.set_owner(record.id, Some(42)).unwrap();
        assert_eq!(repo.list_by_owner(42).len(), 1);
        assert_eq!(repo.list_by_owner(7).len(), 0);
    }
}
