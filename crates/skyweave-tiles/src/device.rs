//! Graphics device abstraction and an in-memory implementation.
//!
//! Tiles only ever talk to the device through [`GraphicsDevice`]; buffers
//! and textures are referenced by opaque handles. All calls happen on the
//! thread that owns the device.

use glam::DVec3;
use rustc_hash::FxHashMap;

use crate::error::DeviceError;
use crate::payload::TextureData;
use crate::tessellation::TileMesh;

/// Device-resident vertex buffer plus four quadrant index buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// One quadrant draw recorded during a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawCall {
    pub mesh: MeshHandle,
    pub part: usize,
    pub texture: Option<TextureHandle>,
    /// World offset of the mesh's vertex positions.
    pub origin: DVec3,
    pub opacity: f32,
    pub index_count: u32,
}

pub trait GraphicsDevice {
    /// Upload a tile mesh.
    fn create_mesh(&mut self, label: &str, mesh: &TileMesh) -> Result<MeshHandle, DeviceError>;

    /// Upload decoded pixels.
    fn create_texture(&mut self, label: &str, data: &TextureData) -> Result<TextureHandle, DeviceError>;

    fn release_mesh(&mut self, mesh: MeshHandle);

    fn release_texture(&mut self, texture: TextureHandle);

    /// Queue one quadrant of a mesh for drawing this frame.
    fn draw_part(&mut self, call: DrawCall);

    /// Take the draw calls queued since the last call.
    fn take_draw_calls(&mut self) -> Vec<DrawCall>;
}

/// Validate a mesh before upload.
pub(crate) fn validate_mesh(label: &str, mesh: &TileMesh) -> Result<(), DeviceError> {
    if mesh.vertices.is_empty() || mesh.parts.iter().all(Vec::is_empty) {
        return Err(DeviceError::EmptyUpload {
            label: label.to_string(),
        });
    }
    let vertex_count = mesh.vertices.len();
    if let Some(&index) = mesh.parts.iter().flatten().find(|&&i| i as usize >= vertex_count) {
        return Err(DeviceError::IndexOutOfRange {
            index,
            vertex_count,
        });
    }
    Ok(())
}

/// Validate texture bytes against dimensions.
pub(crate) fn validate_texture(label: &str, data: &TextureData) -> Result<(), DeviceError> {
    if data.width == 0 || data.height == 0 {
        return Err(DeviceError::EmptyUpload {
            label: label.to_string(),
        });
    }
    let expected = data.expected_len();
    if data.bytes.len() != expected {
        return Err(DeviceError::TextureSize {
            width: data.width,
            height: data.height,
            expected,
            actual: data.bytes.len(),
        });
    }
    Ok(())
}

/// Book-keeping of a live mesh on [`HeadlessDevice`].
#[derive(Clone, Debug)]
struct HeadlessMesh {
    index_counts: [u32; 4],
}

/// A device that keeps everything in memory and counts allocations.
///
/// Used by tests and the demo driver; no GPU required.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    next_handle: u64,
    meshes: FxHashMap<u64, HeadlessMesh>,
    textures: FxHashMap<u64, (u32, u32)>,
    draw_calls: Vec<DrawCall>,
    /// Meshes created over the device's lifetime.
    pub meshes_created: usize,
    /// Textures created over the device's lifetime.
    pub textures_created: usize,
    /// Remaining allocations before uploads start failing; `None` is unlimited.
    pub allocation_budget: Option<usize>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device that fails every allocation after `budget` successful ones.
    pub fn with_allocation_budget(budget: usize) -> Self {
        Self {
            allocation_budget: Some(budget),
            ..Self::default()
        }
    }

    pub fn live_meshes(&self) -> usize {
        self.meshes.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    fn allocate(&mut self, label: &str) -> Result<u64, DeviceError> {
        if let Some(budget) = self.allocation_budget.as_mut() {
            if *budget == 0 {
                return Err(DeviceError::OutOfMemory {
                    label: label.to_string(),
                });
            }
            *budget -= 1;
        }
        self.next_handle += 1;
        Ok(self.next_handle)
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn create_mesh(&mut self, label: &str, mesh: &TileMesh) -> Result<MeshHandle, DeviceError> {
        validate_mesh(label, mesh)?;
        let id = self.allocate(label)?;
        let index_counts = std::array::from_fn(|i| mesh.parts[i].len() as u32);
        self.meshes.insert(id, HeadlessMesh { index_counts });
        self.meshes_created += 1;
        Ok(MeshHandle(id))
    }

    fn create_texture(&mut self, label: &str, data: &TextureData) -> Result<TextureHandle, DeviceError> {
        validate_texture(label, data)?;
        let id = self.allocate(label)?;
        self.textures.insert(id, (data.width, data.height));
        self.textures_created += 1;
        Ok(TextureHandle(id))
    }

    fn release_mesh(&mut self, mesh: MeshHandle) {
        self.meshes.remove(&mesh.0);
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
    }

    fn draw_part(&mut self, mut call: DrawCall) {
        if let Some(mesh) = self.meshes.get(&call.mesh.0) {
            call.index_count = mesh.index_counts.get(call.part).copied().unwrap_or(0);
            self.draw_calls.push(call);
        }
    }

    fn take_draw_calls(&mut self) -> Vec<DrawCall> {
        std::mem::take(&mut self.draw_calls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tessellation::TileVertex;

    fn triangle() -> TileMesh {
        let v = TileVertex::new(DVec3::X, DVec3::ZERO, 0.0, 0.0);
        TileMesh {
            origin: DVec3::ZERO,
            vertices: vec![v; 3],
            parts: [vec![0, 1, 2], vec![], vec![], vec![]],
        }
    }

    #[test]
    fn test_headless_counts_and_releases() {
        let mut device = HeadlessDevice::new();
        let mesh = device.create_mesh("t", &triangle()).unwrap();
        let tex = device
            .create_texture("t", &TextureData::rgba8(1, 1, vec![0; 4]))
            .unwrap();
        assert_eq!(device.live_meshes(), 1);
        assert_eq!(device.live_textures(), 1);
        assert_ne!(mesh.0, tex.0);

        device.release_mesh(mesh);
        device.release_texture(tex);
        assert_eq!(device.live_meshes(), 0);
        assert_eq!(device.meshes_created, 1);
    }

    #[test]
    fn test_draw_calls_carry_index_count() {
        let mut device = HeadlessDevice::new();
        let mesh = device.create_mesh("t", &triangle()).unwrap();
        device.draw_part(DrawCall {
            mesh,
            part: 0,
            texture: None,
            origin: DVec3::ZERO,
            opacity: 1.0,
            index_count: 0,
        });
        let calls = device.take_draw_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].index_count, 3);
        assert!(device.take_draw_calls().is_empty());
    }

    #[test]
    fn test_rejects_bad_uploads() {
        let mut device = HeadlessDevice::new();
        let mut bad = triangle();
        bad.parts[1] = vec![0, 1, 9];
        assert!(matches!(
            device.create_mesh("bad", &bad),
            Err(DeviceError::IndexOutOfRange { index: 9, .. })
        ));
        assert!(matches!(
            device.create_mesh("empty", &TileMesh::default()),
            Err(DeviceError::EmptyUpload { .. })
        ));
        assert!(matches!(
            device.create_texture("short", &TextureData::rgba8(2, 2, vec![0; 4])),
            Err(DeviceError::TextureSize { expected: 16, .. })
        ));
    }

    #[test]
    fn test_allocation_budget() {
        let mut device = HeadlessDevice::with_allocation_budget(1);
        assert!(device.create_mesh("a", &triangle()).is_ok());
        assert!(device.create_mesh("b", &triangle()).is_err());
    }
}
