//! Parsed platform-independent layers, shared between branches.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use strata_core::{CommandStream, ConfigError, LayerSource, parse_stream};

/// Streams keyed by the SHA-256 of their source text.
#[derive(Debug, Default)]
pub struct SourceCache {
    streams: Mutex<HashMap<String, Arc<CommandStream>>>,
    hits: AtomicUsize,
}

impl SourceCache {
    /// Read `path` and return its parsed stream, reusing an earlier parse of
    /// identical content. `Ok(None)` when the file does not exist.
    pub fn load(&self, path: &Path) -> Result<Option<Arc<CommandStream>>, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ConfigError::io(path, e)),
        };
        let name = path.to_string_lossy();
        let hash = LayerSource::from_text(name.as_ref(), &text).content_hash;

        let mut streams = self.streams.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(stream) = streams.get(&hash) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(Arc::clone(stream)));
        }
        let stream = Arc::new(parse_stream(&name, &text));
        streams.insert(hash, Arc::clone(&stream));
        Ok(Some(stream))
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.streams.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.streams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
