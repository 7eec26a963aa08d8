//! Interned sample-buffer cache keyed by filename, mirroring
//! `OASAudioHandler.h`'s `BufferMap`.
//!
//! Requesting the same filename twice returns the same backend buffer
//! instead of decoding and uploading the file again.

use std::collections::HashMap;

use crate::render::{AudioBackend, BackendBufferId, RenderResult, SampleData};

pub struct BufferMap {
    buffers: HashMap<String, BackendBufferId>,
}

impl BufferMap {
    pub fn new() -> BufferMap {
        BufferMap { buffers: HashMap::new() }
    }

    /// Returns the cached buffer for `filename` if present.
    pub fn get(&self, filename: &str) -> Option<BackendBufferId> {
        self.buffers.get(filename).copied()
    }

    /// Inserts a freshly-decoded buffer into the cache. Callers decode and
    /// upload the sample data themselves (see `file_handler` for the actual
    /// decode step) and pass the resulting backend id here.
    pub fn insert(&mut self, filename: String, buffer: BackendBufferId) {
        self.buffers.insert(filename, buffer);
    }

    /// Gets the buffer for `filename`, uploading `data` via `backend` and
    /// caching the result if this is the first request for that filename.
    pub fn get_or_create(
        &mut self,
        backend: &mut dyn AudioBackend,
        filename: &str,
        data: &SampleData,
        sample_rate: i32,
    ) -> RenderResult<BackendBufferId> {
        if let Some(id) = self.get(filename) {
            return Ok(id);
        }

        let id = backend.create_buffer(data, sample_rate)?;
        self.insert(filename.to_string(), id);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl Default for BufferMap {
    fn default() -> BufferMap {
        BufferMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::MockAudioBackend;

    #[test]
    fn get_or_create_caches_by_filename() {
        let mut backend = MockAudioBackend::new();
        backend
            .expect_create_buffer()
            .times(1)
            .returning(|_, _| Ok(BackendBufferId(7)));

        let mut map = BufferMap::new();
        let data = SampleData::Mono16(vec![0; 4]);

        let first = map.get_or_create(&mut backend, "ding.wav", &data, 44100).unwrap();
        let second = map.get_or_create(&mut backend, "ding.wav", &data, 44100).unwrap();

        assert_eq!(first, second);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn distinct_filenames_get_distinct_buffers() {
        let mut backend = MockAudioBackend::new();
        let mut next = 1u32;
        backend.expect_create_buffer().returning(move |_, _| {
            let id = BackendBufferId(next);
            next += 1;
            Ok(id)
        });

        let mut map = BufferMap::new();
        let data = SampleData::Mono16(vec![0; 4]);

        let a = map.get_or_create(&mut backend, "a.wav", &data, 44100).unwrap();
        let b = map.get_or_create(&mut backend, "b.wav", &data, 44100).unwrap();

        assert_ne!(a, b);
        assert_eq!(map.len(), 2);
    }
}
