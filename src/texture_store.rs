//! Thread-safe, clone-friendly store for baked texture buffers.
//!
//! Entries are keyed by the (mesh, material) pair that baked them: the same
//! material baked against two meshes yields two independent textures, since
//! their UV layouts differ. An entry is exclusively owned by its pair from
//! bake until the rewire step consumes it with `take`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use image::RgbaImage;

use crate::document::MaterialId;

/// Identity of one bake: mesh index and material id within a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BakeKey {
    pub mesh: usize,
    pub material: MaterialId,
}

/// A baked square pixel buffer with alpha, named after its material.
#[derive(Debug, Clone)]
pub struct BakedTexture {
    pub name: String,
    pub pixels: RgbaImage,
}

impl BakedTexture {
    pub fn size(&self) -> u32 {
        self.pixels.width()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextureStore {
    inner: Arc<Mutex<HashMap<BakeKey, BakedTexture>>>,
}

impl TextureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a baked buffer under a name derived from `base_name`,
    /// suffixing `_2`, `_3`, ... if the name is already taken by another
    /// entry or appears in `reserved` (the host-image-datablock dedup
    /// behavior; callers pass the names already committed to the scene).
    /// Returns the name actually allocated. Re-inserting a key replaces its
    /// previous entry.
    pub fn insert(
        &self,
        key: BakeKey,
        base_name: &str,
        reserved: &HashSet<String>,
        pixels: RgbaImage,
    ) -> String {
        let Ok(mut map) = self.inner.lock() else {
            return base_name.to_string();
        };
        map.remove(&key);

        let mut name = base_name.to_string();
        let mut counter = 1usize;
        while reserved.contains(&name) || map.values().any(|t| t.name == name) {
            counter += 1;
            name = format!("{base_name}_{counter}");
        }

        map.insert(
            key,
            BakedTexture {
                name: name.clone(),
                pixels,
            },
        );
        name
    }

    /// Retrieve a clone of the entry for `key`.
    pub fn get(&self, key: BakeKey) -> Option<BakedTexture> {
        let map = self.inner.lock().ok()?;
        map.get(&key).cloned()
    }

    /// Remove and return the entry for `key`, releasing its buffer to the
    /// caller.
    pub fn take(&self, key: BakeKey) -> Option<BakedTexture> {
        self.inner.lock().ok()?.remove(&key)
    }

    pub fn contains(&self, key: BakeKey) -> bool {
        self.inner
            .lock()
            .ok()
            .is_some_and(|map| map.contains_key(&key))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries.
    pub fn clear(&self) {
        if let Ok(mut map) = self.inner.lock() {
            map.clear();
        }
    }
}
