//! [`GraphicsDevice`] backed by wgpu buffers and textures.

use rustc_hash::FxHashMap;
use wgpu::util::DeviceExt;

use crate::device::{DrawCall, GraphicsDevice, MeshHandle, TextureHandle, validate_mesh, validate_texture};
use crate::error::DeviceError;
use crate::payload::{TexelFormat, TextureData};
use crate::tessellation::{TileMesh, TileVertex};

/// Vertex layout of [`TileVertex`]: position at location 0, uv at 1.
pub fn tile_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    use wgpu::{VertexAttribute, VertexFormat};

    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<TileVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: VertexFormat::Float32x3,
            },
            VertexAttribute {
                offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                shader_location: 1,
                format: VertexFormat::Float32x2,
            },
        ],
    }
}

fn texture_format(format: TexelFormat) -> wgpu::TextureFormat {
    match format {
        TexelFormat::Rgba8 => wgpu::TextureFormat::Rgba8UnormSrgb,
        TexelFormat::R32Float => wgpu::TextureFormat::R32Float,
    }
}

/// A tile mesh on the GPU: one vertex buffer and one index buffer per
/// quadrant.
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffers: [Option<wgpu::Buffer>; 4],
    pub index_counts: [u32; 4],
}

pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub dimensions: (u32, u32),
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    next_handle: u64,
    meshes: FxHashMap<u64, GpuMesh>,
    textures: FxHashMap<u64, GpuTexture>,
    draw_calls: Vec<DrawCall>,
}

impl WgpuDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            next_handle: 0,
            meshes: FxHashMap::default(),
            textures: FxHashMap::default(),
            draw_calls: Vec::new(),
        }
    }

    /// Request any adapter without a surface and block until the device is
    /// ready.
    pub fn new_headless() -> Result<Self, DeviceError> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });

            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::default(),
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .map_err(|err| DeviceError::NoAdapter(err.to_string()))?;

            let (device, queue) = adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: Some("skyweave-tiles"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                    experimental_features: Default::default(),
                    ..Default::default()
                })
                .await
                .map_err(|err| DeviceError::NoAdapter(err.to_string()))?;

            Ok(Self::new(device, queue))
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn mesh(&self, handle: MeshHandle) -> Option<&GpuMesh> {
        self.meshes.get(&handle.0)
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&GpuTexture> {
        self.textures.get(&handle.0)
    }

    /// Encode `calls` into `pass`. The caller sets the pipeline; `bind` is
    /// invoked before each draw to bind the call's texture and uniforms.
    pub fn encode<'p>(
        &'p self,
        pass: &mut wgpu::RenderPass<'p>,
        calls: &[DrawCall],
        mut bind: impl FnMut(&mut wgpu::RenderPass<'p>, &DrawCall),
    ) {
        for call in calls {
            let Some(mesh) = self.meshes.get(&call.mesh.0) else {
                continue;
            };
            let Some(indices) = mesh.index_buffers.get(call.part).and_then(Option::as_ref) else {
                continue;
            };
            bind(pass, call);
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..mesh.index_counts[call.part], 0, 0..1);
        }
    }

    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

impl GraphicsDevice for WgpuDevice {
    fn create_mesh(&mut self, label: &str, mesh: &TileMesh) -> Result<MeshHandle, DeviceError> {
        validate_mesh(label, mesh)?;
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}-vertices")),
                contents: bytemuck::cast_slice(&mesh.vertices),
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            });
        let index_buffers = std::array::from_fn(|part| {
            let indices = &mesh.parts[part];
            (!indices.is_empty()).then(|| {
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(&format!("{label}-part{part}")),
                        contents: bytemuck::cast_slice(indices),
                        usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
                    })
            })
        });
        let index_counts = std::array::from_fn(|part| mesh.parts[part].len() as u32);

        let handle = self.next_handle();
        self.meshes.insert(
            handle,
            GpuMesh {
                vertex_buffer,
                index_buffers,
                index_counts,
            },
        );
        Ok(MeshHandle(handle))
    }

    fn create_texture(&mut self, label: &str, data: &TextureData) -> Result<TextureHandle, DeviceError> {
        validate_texture(label, data)?;
        let size = wgpu::Extent3d {
            width: data.width,
            height: data.height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(data.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data.bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(data.width * data.format.bytes_per_texel() as u32),
                rows_per_image: None,
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let handle = self.next_handle();
        self.textures.insert(
            handle,
            GpuTexture {
                texture,
                view,
                dimensions: (data.width, data.height),
            },
        );
        Ok(TextureHandle(handle))
    }

    fn release_mesh(&mut self, mesh: MeshHandle) {
        if let Some(gpu) = self.meshes.remove(&mesh.0) {
            gpu.vertex_buffer.destroy();
            for buffer in gpu.index_buffers.iter().flatten() {
                buffer.destroy();
            }
        }
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if let Some(gpu) = self.textures.remove(&texture.0) {
            gpu.texture.destroy();
        }
    }

    fn draw_part(&mut self, call: DrawCall) {
        if self.meshes.contains_key(&call.mesh.0) {
            self.draw_calls.push(call);
        }
    }

    fn take_draw_calls(&mut self) -> Vec<DrawCall> {
        std::mem::take(&mut self.draw_calls)
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::*;

    #[test]
    fn test_vertex_layout_matches_tile_vertex() {
        let layout = tile_vertex_layout();
        assert_eq!(layout.array_stride, 20);
        assert_eq!(layout.attributes.len(), 2);
        assert_eq!(layout.attributes[1].offset, 12);
    }

    #[test]
    fn test_texture_formats() {
        assert_eq!(texture_format(TexelFormat::Rgba8), wgpu::TextureFormat::Rgba8UnormSrgb);
        assert_eq!(texture_format(TexelFormat::R32Float), wgpu::TextureFormat::R32Float);
    }

    #[test]
    fn test_uploads_when_adapter_available() {
        let Ok(mut device) = WgpuDevice::new_headless() else {
            return;
        };
        let vertex = TileVertex::new(DVec3::X, DVec3::ZERO, 0.0, 0.0);
        let mesh = TileMesh {
            origin: DVec3::ZERO,
            vertices: vec![vertex; 3],
            parts: [vec![0, 1, 2], vec![], vec![], vec![]],
        };
        let handle = device.create_mesh("tri", &mesh).unwrap();
        let gpu = device.mesh(handle).unwrap();
        assert!(gpu.index_buffers[0].is_some());
        assert!(gpu.index_buffers[1].is_none());
        assert_eq!(gpu.index_counts[0], 3);

        let texture = device
            .create_texture("px", &TextureData::rgba8(1, 1, vec![1, 2, 3, 4]))
            .unwrap();
        assert_eq!(device.texture(texture).unwrap().dimensions, (1, 1));

        device.release_mesh(handle);
        device.release_texture(texture);
        assert!(device.mesh(handle).is_none());
    }
}
