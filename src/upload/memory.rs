//! In-process multipart store. Assembles objects on completion; used for dry
//! runs and tests.

use super::{CompletedPart, MultipartStore};
use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

#[derive(Debug, Default)]
struct PendingObject {
    key: String,
    content_type: String,
    parts: BTreeMap<u32, (Vec<u8>, String)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_upload: u64,
    pending: HashMap<String, PendingObject>,
    objects: HashMap<String, (String, Vec<u8>)>,
    aborted: usize,
    completion_calls: Vec<Vec<CompletedPart>>,
}

/// Multipart store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

fn e_tag_for(body: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("\"{:016x}\"", hasher.finish())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of a completed object.
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().objects.get(key).map(|(_, body)| body.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.state
            .lock()
            .objects
            .get(key)
            .map(|(content_type, _)| content_type.clone())
    }

    pub fn aborted_uploads(&self) -> usize {
        self.state.lock().aborted
    }

    /// Part lists received by `complete_multipart`, in call order.
    pub fn completion_calls(&self) -> Vec<Vec<CompletedPart>> {
        self.state.lock().completion_calls.clone()
    }
}

#[async_trait]
impl MultipartStore for MemoryStore {
    async fn create_multipart(&self, key: &str, content_type: &str) -> Result<String, StoreError> {
        let mut state = self.state.lock();
        state.next_upload += 1;
        let upload_id = format!("memory-upload-{}", state.next_upload);
        state.pending.insert(
            upload_id.clone(),
            PendingObject {
                key: key.to_string(),
                content_type: content_type.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: &[u8],
    ) -> Result<String, StoreError> {
        let mut state = self.state.lock();
        let object = state
            .pending
            .get_mut(upload_id)
            .filter(|object| object.key == key)
            .ok_or_else(|| StoreError::Rejected(format!("no such upload: {}", upload_id)))?;
        let e_tag = e_tag_for(body);
        object
            .parts
            .insert(part_number, (body.to_vec(), e_tag.clone()));
        Ok(e_tag)
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.completion_calls.push(parts.to_vec());
        let object = state
            .pending
            .remove(upload_id)
            .filter(|object| object.key == key)
            .ok_or_else(|| StoreError::Rejected(format!("no such upload: {}", upload_id)))?;

        if parts.windows(2).any(|pair| pair[0].part_number >= pair[1].part_number) {
            return Err(StoreError::Rejected(
                "parts must be in ascending order".to_string(),
            ));
        }

        let mut body = Vec::new();
        for part in parts {
            let (bytes, e_tag) = object.parts.get(&part.part_number).ok_or_else(|| {
                StoreError::Rejected(format!("part {} was never uploaded", part.part_number))
            })?;
            if *e_tag != part.e_tag {
                return Err(StoreError::Rejected(format!(
                    "ETag mismatch for part {}",
                    part.part_number
                )));
            }
            body.extend_from_slice(bytes);
        }
        state
            .objects
            .insert(object.key.clone(), (object.content_type.clone(), body));
        Ok(())
    }

    async fn abort_multipart(&self, _key: &str, upload_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.pending.remove(upload_id).is_some() {
            state.aborted += 1;
        }
        Ok(())
    }
}
