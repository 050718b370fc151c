use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Per-handler journal of the last log id emitted for each image, persisted
/// as `json/{handler}.json`.
///
/// The gate suppresses repeats: a `(handler, image)` pair only passes when
/// its log id differs from the recorded one. A first-ever sighting records
/// the id and passes. Each handler's file has its own lock; writes go
/// through a temp file and an atomic rename.
pub struct LogRegistry {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LogRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, handler_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(handler_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn registry_path(&self, handler_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", handler_id))
    }

    fn read(&self, handler_id: &str) -> HashMap<String, String> {
        match fs::read(self.registry_path(handler_id)) {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    fn write(&self, handler_id: &str, registry: &HashMap<String, String>) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            warn!("failed to create log registry directory: {}", e);
            return;
        }
        let tmp = self.dir.join(format!(".{}.json.tmp", handler_id));
        let serialized = match serde_json::to_vec(registry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("failed to serialize log registry {}: {}", handler_id, e);
                return;
            },
        };
        if let Err(e) =
            fs::write(&tmp, serialized).and_then(|_| fs::rename(&tmp, self.registry_path(handler_id)))
        {
            warn!("failed to persist log registry {}: {}", handler_id, e);
        }
    }

    /// Check-and-set: record `log_id` for `(handler, image)` and report
    /// whether it differs from what was recorded before. First-ever
    /// sightings count as distinct.
    pub fn is_distinct(&self, handler_id: &str, image_id: &str, log_id: &str) -> bool {
        let lock = self.lock_for(handler_id);
        let _guard = lock.lock().unwrap();

        let mut registry = self.read(handler_id);
        match registry.get(image_id) {
            Some(previous) if previous == log_id => false,
            _ => {
                registry.insert(image_id.to_string(), log_id.to_string());
                self.write(handler_id, &registry);
                true
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_first_sighting_is_distinct() {
        let dir = tempdir().unwrap();
        let registry = LogRegistry::new(dir.path());

        assert!(registry.is_distinct("handler", "nginx:1.25.0", "update"));
    }

    #[test]
    fn test_repeat_is_suppressed_until_log_changes() {
        let dir = tempdir().unwrap();
        let registry = LogRegistry::new(dir.path());

        assert!(registry.is_distinct("handler", "nginx:1.25.0", "update"));
        assert!(!registry.is_distinct("handler", "nginx:1.25.0", "update"));
        assert!(!registry.is_distinct("handler", "nginx:1.25.0", "update"));

        // A different log id passes, and flips the recorded state.
        assert!(registry.is_distinct("handler", "nginx:1.25.0", "no_update"));
        assert!(!registry.is_distinct("handler", "nginx:1.25.0", "no_update"));

        // Going back to the original id counts as a change again.
        assert!(registry.is_distinct("handler", "nginx:1.25.0", "update"));
    }

    #[test]
    fn test_images_and_handlers_are_independent() {
        let dir = tempdir().unwrap();
        let registry = LogRegistry::new(dir.path());

        assert!(registry.is_distinct("handler-a", "nginx:1.25.0", "update"));
        assert!(registry.is_distinct("handler-a", "redis:7.0", "update"));
        assert!(registry.is_distinct("handler-b", "nginx:1.25.0", "update"));
    }

    #[test]
    fn test_state_survives_reload() {
        let dir = tempdir().unwrap();
        {
            let registry = LogRegistry::new(dir.path());
            assert!(registry.is_distinct("handler", "nginx:1.25.0", "update"));
        }
        let reloaded = LogRegistry::new(dir.path());
        assert!(!reloaded.is_distinct("handler", "nginx:1.25.0", "update"));
    }

    #[test]
    fn test_corrupt_registry_file_is_reset() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("handler.json"), b"not json").unwrap();

        let registry = LogRegistry::new(dir.path());
        assert!(registry.is_distinct("handler", "nginx:1.25.0", "update"));
        assert!(!registry.is_distinct("handler", "nginx:1.25.0", "update"));
    }
}
