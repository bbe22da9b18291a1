//! Named resource storage shared between the importer and the scene builder.

use std::collections::HashMap;
use std::sync::Arc;

use crate::handle::{HandleAllocator, INVALID_HANDLE};
use crate::{ConfigError, ConfigResult, Mesh, Texture};

/// Default number of slots per resource kind.
pub const DEFAULT_CAPACITY: u32 = 4096;

/// One kind of resource: names map to handles, handles index the slots.
#[derive(Debug)]
struct Slots<T> {
    kind: &'static str,
    allocator: HandleAllocator,
    names: HashMap<String, u32>,
    items: Vec<Option<Arc<T>>>,
}

impl<T> Slots<T> {
    fn new(kind: &'static str, capacity: u32) -> Self {
        Self {
            kind,
            allocator: HandleAllocator::new(capacity),
            names: HashMap::new(),
            items: Vec::new(),
        }
    }

    fn insert(&mut self, name: &str, item: T) -> ConfigResult<u32> {
        if self.names.contains_key(name) {
            return Err(ConfigError::DuplicateResource {
                kind: self.kind,
                name: name.to_string(),
            });
        }
        let handle = self.allocator.alloc();
        if handle == INVALID_HANDLE {
            return Err(ConfigError::RegistryFull {
                kind: self.kind,
                capacity: self.allocator.capacity(),
            });
        }
        let slot = handle as usize;
        if slot >= self.items.len() {
            self.items.resize_with(slot + 1, || None);
        }
        self.items[slot] = Some(Arc::new(item));
        self.names.insert(name.to_string(), handle);
        Ok(handle)
    }

    fn handle(&self, name: &str) -> ConfigResult<u32> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownResource {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    fn get(&self, name: &str) -> ConfigResult<Arc<T>> {
        let handle = self.handle(name)?;
        self.get_by_handle(handle)
    }

    fn get_by_handle(&self, handle: u32) -> ConfigResult<Arc<T>> {
        self.items
            .get(handle as usize)
            .and_then(|slot| slot.clone())
            .ok_or(ConfigError::InvalidHandle { handle })
    }

    fn remove(&mut self, name: &str) -> ConfigResult<()> {
        let handle = self.handle(name)?;
        self.allocator.free(handle)?;
        self.items[handle as usize] = None;
        self.names.remove(name);
        Ok(())
    }
}

/// Meshes and textures registered by name.
///
/// Built by the application before the scene is assembled and passed to
/// the scene builder by reference.
#[derive(Debug)]
pub struct ResourceRegistry {
    meshes: Slots<Mesh>,
    textures: Slots<Texture>,
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            meshes: Slots::new("mesh", capacity),
            textures: Slots::new("texture", capacity),
        }
    }

    /// Register a mesh after validating its buffers.
    pub fn add_mesh(&mut self, name: &str, mesh: Mesh) -> ConfigResult<u32> {
        mesh.validate(name)?;
        let handle = self.meshes.insert(name, mesh)?;
        log::debug!("Registered mesh '{}' as handle {}", name, handle);
        Ok(handle)
    }

    pub fn add_texture(&mut self, name: &str, texture: Texture) -> ConfigResult<u32> {
        let handle = self.textures.insert(name, texture)?;
        log::debug!("Registered texture '{}' as handle {}", name, handle);
        Ok(handle)
    }

    pub fn mesh(&self, name: &str) -> ConfigResult<Arc<Mesh>> {
        self.meshes.get(name)
    }

    pub fn texture(&self, name: &str) -> ConfigResult<Arc<Texture>> {
        self.textures.get(name)
    }

    pub fn mesh_by_handle(&self, handle: u32) -> ConfigResult<Arc<Mesh>> {
        self.meshes.get_by_handle(handle)
    }

    pub fn texture_by_handle(&self, handle: u32) -> ConfigResult<Arc<Texture>> {
        self.textures.get_by_handle(handle)
    }

    pub fn remove_mesh(&mut self, name: &str) -> ConfigResult<()> {
        self.meshes.remove(name)
    }

    pub fn remove_texture(&mut self, name: &str) -> ConfigResult<()> {
        self.textures.remove(name)
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.names.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.names.len()
    }
}
