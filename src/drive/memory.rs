// In-memory RemoteStore used by tests.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::{RemoteFolder, RemoteObject, RemoteStore};
use crate::errors::{AppError, Result};

#[derive(Debug, Default)]
pub(crate) struct MemoryState {
    pub folders: Vec<RemoteFolder>,
    /// (folder id, object)
    pub objects: Vec<(String, RemoteObject)>,
    /// (object id, email, role)
    pub permissions: Vec<(String, String, String)>,
    pub uploads: Vec<String>,
    pub delete_calls: usize,
    pub next_id: usize,
    pub fail_upload: bool,
    pub fail_share: bool,
    pub fail_delete: HashSet<String>,
}

impl MemoryState {
    fn allocate_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    pub state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn seed_object(&self, folder_id: &str, name: &str, created: DateTime<Utc>) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.allocate_id("obj");
        state.objects.push((
            folder_id.to_string(),
            RemoteObject {
                id: id.clone(),
                name: name.to_string(),
                created_time: Some(created),
            },
        ));
        id
    }

    pub fn object_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.objects.iter().map(|(_, o)| o.name.clone()).collect()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn find_folders(&self, name: &str) -> Result<Vec<RemoteFolder>> {
        let state = self.state.lock().unwrap();
        Ok(state.folders.iter().filter(|f| f.name == name).cloned().collect())
    }

    async fn create_folder(&self, name: &str) -> Result<RemoteFolder> {
        let mut state = self.state.lock().unwrap();
        let folder = RemoteFolder {
            id: state.allocate_id("folder"),
            name: name.to_string(),
        };
        state.folders.push(folder.clone());
        Ok(folder)
    }

    async fn upload(&self, local_path: &Path, folder_id: &str) -> Result<RemoteObject> {
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AppError::InvalidInput(format!("no file name: {}", local_path.display())))?;
        // The archive must still be on disk while it is uploaded.
        std::fs::metadata(local_path)?;

        let mut state = self.state.lock().unwrap();
        state.uploads.push(name.clone());
        if state.fail_upload {
            return Err(AppError::RemoteApi("upload returned 503 Service Unavailable".to_string()));
        }
        let object = RemoteObject {
            id: state.allocate_id("obj"),
            name,
            created_time: Some(Utc::now()),
        };
        state.objects.push((folder_id.to_string(), object.clone()));
        Ok(object)
    }

    async fn share(&self, object_id: &str, email: &str, role: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_share {
            return Err(AppError::RemoteApi("permission create returned 403".to_string()));
        }
        state
            .permissions
            .push((object_id.to_string(), email.to_string(), role.to_string()));
        Ok(())
    }

    async fn list_created_before(
        &self,
        folder_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RemoteObject>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .objects
            .iter()
            .filter(|(folder, o)| folder == folder_id && o.created_time.is_some_and(|t| t < cutoff))
            .map(|(_, o)| o.clone())
            .collect())
    }

    async fn delete(&self, object_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.delete_calls += 1;
        if state.fail_delete.contains(object_id) {
            return Err(AppError::RemoteApi(format!("delete {} returned 500", object_id)));
        }
        state.objects.retain(|(_, o)| o.id != object_id);
        Ok(())
    }
}
