//! The artifact store — the canonical table of artifacts, keyed by id.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use kernel_core::constants::{
    KERNEL_CONTRACT_FREEWARE, KERNEL_CONTRACT_PRIVATE, KERNEL_CONTRACT_SELF_OWNED,
    KERNEL_CONTRACT_TRANSFERABLE_FREEWARE, RESERVED_METADATA_KEYS,
};
use kernel_core::{IdCategory, IdRegistry, KernelError};
use serde_json::Value;
use uuid::Uuid;

use crate::artifact::Artifact;
use crate::validator::CodeValidator;

/// Fields accepted by [`ArtifactStore::write`]. Grouped into a struct
/// because the artifact record has more optional fields than a plain
/// function signature can read comfortably.
#[derive(Debug, Clone, Default)]
pub struct WriteRequest {
    pub id: Option<String>,
    pub kind: String,
    pub content: String,
    pub created_by: String,
    pub executable: bool,
    pub code: String,
    pub price: u64,
    pub access_contract_id: Option<String>,
    pub capabilities: Vec<String>,
    pub has_standing: bool,
    pub has_loop: bool,
    pub kernel_protected: bool,
    pub genesis_methods: Option<Vec<String>>,
    pub initial_metadata: HashMap<String, Value>,
}

/// The canonical artifact table plus secondary indexes by creator and by
/// standing status.
pub struct ArtifactStore {
    id_registry: Arc<IdRegistry>,
    validator: Arc<dyn CodeValidator>,
    artifacts: DashMap<String, Artifact>,
    by_creator: DashMap<String, Vec<String>>,
    standing_ids: DashMap<String, ()>,
}

impl ArtifactStore {
    pub fn new(id_registry: Arc<IdRegistry>, validator: Arc<dyn CodeValidator>) -> Self {
        Self {
            id_registry,
            validator,
            artifacts: DashMap::new(),
            by_creator: DashMap::new(),
            standing_ids: DashMap::new(),
        }
    }

    /// Auto-populates authorization state for a freshly created artifact
    /// based on its declared contract:
    /// freeware/transferable_freeware → `writer = created_by`;
    /// self_owned/private → `principal = created_by`.
    fn auto_populate_state(access_contract_id: Option<&str>, created_by: &str) -> HashMap<String, Value> {
        let mut state = HashMap::new();
        match access_contract_id {
            Some(KERNEL_CONTRACT_FREEWARE) | Some(KERNEL_CONTRACT_TRANSFERABLE_FREEWARE) => {
                state.insert("writer".to_string(), Value::String(created_by.to_string()));
            }
            Some(KERNEL_CONTRACT_SELF_OWNED) | Some(KERNEL_CONTRACT_PRIVATE) => {
                state.insert(
                    "principal".to_string(),
                    Value::String(created_by.to_string()),
                );
            }
            _ => {}
        }
        state
    }

    /// Creates a new artifact, or overwrites the content/code of an
    /// existing one the id already names (category switch is rejected).
    pub fn write(&self, request: WriteRequest) -> Result<Artifact, KernelError> {
        let id = request
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let entry_points = if request.executable {
            if request.code.trim().is_empty() {
                return Err(KernelError::invalid_argument(
                    "executable artifact requires non-empty code",
                ));
            }
            self.validator.validate(&request.code)?.entry_points
        } else {
            Vec::new()
        };

        let now = Utc::now();

        if let Some(mut existing) = self.artifacts.get_mut(&id) {
            if existing.deleted {
                return Err(KernelError::Deleted { id });
            }
            existing.content = request.content;
            existing.executable = request.executable;
            existing.code = request.code;
            existing.price = request.price;
            existing.capabilities = request.capabilities;
            existing.has_loop = request.has_loop;
            existing.entry_points = entry_points;
            existing.updated_at = now;
            existing.version = Uuid::new_v4().to_string();
            tracing::info!(%id, "artifact overwritten");
            return Ok(existing.clone());
        }

        self.id_registry.register(&id, IdCategory::Artifact)?;

        let state = Self::auto_populate_state(request.access_contract_id.as_deref(), &request.created_by);

        let artifact = Artifact {
            id: id.clone(),
            kind: request.kind,
            content: request.content,
            created_by: request.created_by.clone(),
            created_at: now,
            updated_at: now,
            executable: request.executable,
            code: request.code,
            price: request.price,
            access_contract_id: request.access_contract_id,
            state,
            metadata: request.initial_metadata,
            capabilities: request.capabilities,
            has_standing: request.has_standing,
            has_loop: request.has_loop,
            deleted: false,
            deleted_at: None,
            deleted_by: None,
            kernel_protected: request.kernel_protected,
            genesis_methods: request.genesis_methods,
            version: Uuid::new_v4().to_string(),
            entry_points,
        };

        self.by_creator
            .entry(request.created_by)
            .or_default()
            .push(id.clone());
        if artifact.has_standing {
            self.standing_ids.insert(id.clone(), ());
        }

        self.artifacts.insert(id.clone(), artifact.clone());
        tracing::info!(%id, "artifact created");
        Ok(artifact)
    }

    pub fn get(&self, id: &str) -> Option<Artifact> {
        self.artifacts.get(id).map(|entry| entry.clone())
    }

    pub fn exists(&self, id: &str) -> bool {
        self.artifacts.contains_key(id)
    }

    /// Surgical content edit: succeeds iff `old` occurs exactly once in the
    /// artifact's content.
    pub fn edit(&self, id: &str, old: &str, new: &str) -> Result<Artifact, KernelError> {
        let mut entry = self
            .artifacts
            .get_mut(id)
            .ok_or_else(|| KernelError::not_found(id))?;
        if entry.deleted {
            return Err(KernelError::Deleted { id: id.to_string() });
        }
        let occurrences = entry.content.matches(old).count();
        match occurrences {
            0 => Err(KernelError::invalid_argument(format!(
                "edit target not found in artifact {id}"
            ))),
            1 => {
                entry.content = entry.content.replacen(old, new, 1);
                entry.updated_at = Utc::now();
                if entry.executable {
                    entry.version = Uuid::new_v4().to_string();
                }
                Ok(entry.clone())
            }
            n => Err(KernelError::invalid_argument(format!(
                "edit target occurs {n} times in artifact {id}, must be unique"
            ))),
        }
    }

    /// Moves the authoritative ownership state field (`writer` for
    /// freeware-family contracts, `principal` for owned-family). The
    /// kernel itself only calls this for system-level steps; agents effect
    /// transfers through a contract's `state_updates`.
    pub fn transfer_ownership(&self, id: &str, field: &str, to: &str) -> Result<Artifact, KernelError> {
        let mut entry = self
            .artifacts
            .get_mut(id)
            .ok_or_else(|| KernelError::not_found(id))?;
        if entry.deleted {
            return Err(KernelError::Deleted { id: id.to_string() });
        }
        entry
            .state
            .insert(field.to_string(), Value::String(to.to_string()));
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    /// Soft-deletes an artifact. Fails for genesis artifacts and for
    /// kernel-protected artifacts. Authorization against the artifact's
    /// contract happens upstream in the permission checker; this method
    /// only enforces the store-level invariants.
    pub fn delete(&self, id: &str, requester: &str) -> Result<Artifact, KernelError> {
        if self.id_registry.lookup(id) == Some(IdCategory::Genesis) {
            return Err(KernelError::not_authorized("genesis artifacts cannot be deleted"));
        }
        let mut entry = self
            .artifacts
            .get_mut(id)
            .ok_or_else(|| KernelError::not_found(id))?;
        if entry.deleted {
            return Err(KernelError::Deleted { id: id.to_string() });
        }
        if entry.kernel_protected {
            return Err(KernelError::not_authorized(
                "kernel-protected artifacts cannot be deleted",
            ));
        }
        entry.deleted = true;
        entry.deleted_at = Some(Utc::now());
        entry.deleted_by = Some(requester.to_string());
        tracing::info!(%id, %requester, "artifact deleted");
        Ok(entry.clone())
    }

    /// Merges `updates` into an artifact's authorization state field-wise.
    /// Used to apply a permission decision's `state_updates` atomically
    /// alongside the action it accompanied.
    pub fn apply_state_updates(
        &self,
        id: &str,
        updates: HashMap<String, Value>,
    ) -> Result<Artifact, KernelError> {
        let mut entry = self
            .artifacts
            .get_mut(id)
            .ok_or_else(|| KernelError::not_found(id))?;
        if entry.deleted {
            return Err(KernelError::Deleted { id: id.to_string() });
        }
        entry.merge_state(updates);
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    /// Merges `updates` into an artifact's non-authorization metadata.
    /// Rejects the whole update if any key names one of
    /// [`RESERVED_METADATA_KEYS`], since those are kernel-owned.
    pub fn update_metadata(
        &self,
        id: &str,
        updates: HashMap<String, Value>,
    ) -> Result<Artifact, KernelError> {
        if let Some(reserved) = updates.keys().find(|k| RESERVED_METADATA_KEYS.contains(&k.as_str())) {
            return Err(KernelError::invalid_argument(format!(
                "metadata key {reserved} is reserved"
            )));
        }
        let mut entry = self
            .artifacts
            .get_mut(id)
            .ok_or_else(|| KernelError::not_found(id))?;
        if entry.deleted {
            return Err(KernelError::Deleted { id: id.to_string() });
        }
        for (key, value) in updates {
            entry.metadata.insert(key, value);
        }
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    pub fn ids_by_creator(&self, created_by: &str) -> Vec<String> {
        self.by_creator.get(created_by).map(|v| v.clone()).unwrap_or_default()
    }

    pub fn standing_artifact_ids(&self) -> Vec<String> {
        self.standing_ids.iter().map(|e| e.key().clone()).collect()
    }
}
