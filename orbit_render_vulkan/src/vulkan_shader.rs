/// ShaderCache - shader modules looked up by string key
///
/// The application supplies SPIR-V (words or raw bytes); the pipeline only
/// ever asks for a module by key.

use ash::vk;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use orbit_render::orbit::{Error, Result};
use orbit_render::{engine_bail, engine_debug, engine_err};

use crate::vulkan_context::GpuContext;

pub struct ShaderCache {
    ctx: Arc<GpuContext>,
    modules: FxHashMap<String, vk::ShaderModule>,
}

impl ShaderCache {
    pub fn new(ctx: Arc<GpuContext>) -> Self {
        Self {
            ctx,
            modules: FxHashMap::default(),
        }
    }

    /// Create a module from SPIR-V words, replacing any module under `key`
    pub fn insert_spirv(&mut self, key: &str, code: &[u32]) -> Result<()> {
        if code.is_empty() {
            engine_bail!("orbit::vulkan", "Shader '{}' has no SPIR-V code", key);
        }

        let create_info = vk::ShaderModuleCreateInfo::default().code(code);
        let module = unsafe { self.ctx.device.create_shader_module(&create_info, None) }
            .map_err(|e| engine_err!("orbit::vulkan", "Failed to create shader module '{}': {:?}", key, e))?;

        if let Some(old) = self.modules.insert(key.to_string(), module) {
            unsafe {
                self.ctx.device.destroy_shader_module(old, None);
            }
        }
        engine_debug!("orbit::vulkan", "Shader '{}' loaded ({} words)", key, code.len());
        Ok(())
    }

    /// Create a module from a SPIR-V byte stream (e.g. a `.spv` file)
    pub fn insert_spirv_bytes(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        let code = ash::util::read_spv(&mut std::io::Cursor::new(bytes))
            .map_err(|e| {
                Error::InvalidResource(format!("Shader '{}' is not valid SPIR-V: {}", key, e))
            })?;
        self.insert_spirv(key, &code)
    }

    pub fn get(&self, key: &str) -> Option<vk::ShaderModule> {
        self.modules.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.modules.contains_key(key)
    }

    /// Destroy the module under `key`; returns false if there was none
    pub fn remove(&mut self, key: &str) -> bool {
        match self.modules.remove(key) {
            Some(module) => {
                unsafe {
                    self.ctx.device.destroy_shader_module(module, None);
                }
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Drop for ShaderCache {
    fn drop(&mut self) {
        unsafe {
            for (_, module) in self.modules.drain() {
                self.ctx.device.destroy_shader_module(module, None);
            }
        }
    }
}
