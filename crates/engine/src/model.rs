use crate::buffer::Buffer;
use crate::context::VkContext;
use crate::error::{EngineError, EngineResult};
use ash::vk;
use std::collections::HashMap;
use std::io::BufRead;
use std::mem::{offset_of, size_of};
use std::path::Path;
use std::sync::Arc;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            color: [1.0; 3],
            normal: [0.0; 3],
            uv: [0.0; 2],
        }
    }
}

impl Vertex {
    pub fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        let attribute = |location, format, offset: usize| vk::VertexInputAttributeDescription {
            location,
            binding: 0,
            format,
            offset: offset as u32,
        };

        vec![
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, color)),
            attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, normal)),
            attribute(3, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, uv)),
        ]
    }

    /// Bit-exact identity, used to merge duplicate OBJ corners.
    fn key(&self) -> [u32; 11] {
        let mut key = [0u32; 11];
        self.position
            .iter()
            .chain(&self.color)
            .chain(&self.normal)
            .chain(&self.uv)
            .zip(key.iter_mut())
            .for_each(|(value, slot)| *slot = value.to_bits());
        key
    }
}

/// CPU side mesh data, ready to be uploaded with [`Model::new`].
#[derive(Debug, Default, Clone)]
pub struct ModelBuilder {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl ModelBuilder {
    pub fn load_model<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let path = path.as_ref();
        log::debug!("Loading model {}", path.display());
        // materials are not used, a missing .mtl must not fail the load
        let (models, _materials) = tobj::load_obj(path, &Self::load_options())?;
        Ok(Self::from_tobj_models(&models))
    }

    pub fn from_obj_reader<R: BufRead>(mut reader: R) -> EngineResult<Self> {
        let (models, _materials) = tobj::load_obj_buf(&mut reader, &Self::load_options(), |_| {
            Ok(Default::default())
        })?;
        Ok(Self::from_tobj_models(&models))
    }

    fn load_options() -> tobj::LoadOptions {
        tobj::LoadOptions {
            single_index: true,
            triangulate: true,
            ..Default::default()
        }
    }

    fn from_tobj_models(models: &[tobj::Model]) -> Self {
        let mut builder = Self::default();
        let mut unique_vertices: HashMap<[u32; 11], u32> = HashMap::new();

        for mesh in models.iter().map(|model| &model.mesh) {
            for &index in &mesh.indices {
                let i = index as usize;
                let vertex = Vertex {
                    position: read3(&mesh.positions, i).unwrap_or([0.0; 3]),
                    color: read3(&mesh.vertex_color, i).unwrap_or([1.0; 3]),
                    normal: read3(&mesh.normals, i).unwrap_or([0.0; 3]),
                    uv: read2(&mesh.texcoords, i).unwrap_or([0.0; 2]),
                };

                let next_index = builder.vertices.len() as u32;
                let index = *unique_vertices.entry(vertex.key()).or_insert_with(|| {
                    builder.vertices.push(vertex);
                    next_index
                });
                builder.indices.push(index);
            }
        }

        log::debug!(
            "Model has {} unique vertices, {} indices",
            builder.vertices.len(),
            builder.indices.len()
        );
        builder
    }

    fn validate(&self) -> EngineResult<()> {
        if self.vertices.len() < 3 {
            return Err(EngineError::NotEnoughVertices(self.vertices.len()));
        }
        Ok(())
    }
}

fn read3(values: &[f32], index: usize) -> Option<[f32; 3]> {
    values
        .get(3 * index..3 * index + 3)
        .map(|v| [v[0], v[1], v[2]])
}

fn read2(values: &[f32], index: usize) -> Option<[f32; 2]> {
    values.get(2 * index..2 * index + 2).map(|v| [v[0], v[1]])
}

/// A mesh living in device-local memory.
pub struct Model {
    context: Arc<VkContext>,
    vertex_buffer: Buffer,
    vertex_count: u32,
    index_buffer: Option<Buffer>,
    index_count: u32,
}

impl Model {
    pub fn new(context: Arc<VkContext>, builder: &ModelBuilder) -> EngineResult<Self> {
        builder.validate()?;

        let vertex_buffer = upload(
            &context,
            &builder.vertices,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        let index_buffer = if builder.indices.is_empty() {
            None
        } else {
            Some(upload(
                &context,
                &builder.indices,
                vk::BufferUsageFlags::INDEX_BUFFER,
            )?)
        };

        Ok(Self {
            context,
            vertex_buffer,
            vertex_count: builder.vertices.len() as u32,
            index_buffer,
            index_count: builder.indices.len() as u32,
        })
    }

    pub fn from_file<P: AsRef<Path>>(context: Arc<VkContext>, path: P) -> EngineResult<Self> {
        let builder = ModelBuilder::load_model(path)?;
        Self::new(context, &builder)
    }

    pub fn bind(&self, cmd: vk::CommandBuffer) {
        let device = &self.context.device;
        unsafe {
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer()], &[0]);
            if let Some(index_buffer) = &self.index_buffer {
                device.cmd_bind_index_buffer(cmd, index_buffer.buffer(), 0, vk::IndexType::UINT32);
            }
        }
    }

    pub fn draw(&self, cmd: vk::CommandBuffer) {
        let device = &self.context.device;
        unsafe {
            if self.index_buffer.is_some() {
                device.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);
            } else {
                device.cmd_draw(cmd, self.vertex_count, 1, 0, 0);
            }
        }
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// Copies `data` into a new device-local buffer through a host-visible
/// staging buffer.
fn upload<T: Copy>(
    context: &Arc<VkContext>,
    data: &[T],
    usage: vk::BufferUsageFlags,
) -> EngineResult<Buffer> {
    let instance_size = size_of::<T>() as vk::DeviceSize;
    let count = data.len() as u32;

    let mut staging = Buffer::new(
        context.clone(),
        instance_size,
        count,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        1,
    )?;
    staging.map(vk::WHOLE_SIZE, 0)?;
    staging.write_to_buffer(data, vk::WHOLE_SIZE, 0)?;

    let buffer = Buffer::new(
        context.clone(),
        instance_size,
        count,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
        1,
    )?;
    context.copy_buffer(staging.buffer(), buffer.buffer(), buffer.buffer_size())?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TRIANGLE: &str = "\
v 0.0 -0.5 0.0
v 0.5 0.5 0.0
v -0.5 0.5 0.0
f 1 2 3
";

    const QUAD_WITH_NORMALS: &str = "\
v -1.0 0.0 -1.0
v 1.0 0.0 -1.0
v 1.0 0.0 1.0
v -1.0 0.0 1.0
vn 0.0 -1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
f 1/1/1 2/2/1 3/3/1
f 1/1/1 3/3/1 4/4/1
";

    fn parse(source: &str) -> ModelBuilder {
        ModelBuilder::from_obj_reader(Cursor::new(source)).unwrap()
    }

    #[test]
    fn triangle_without_attributes_uses_defaults() {
        let builder = parse(TRIANGLE);
        assert_eq!(builder.vertices.len(), 3);
        assert_eq!(builder.indices, vec![0, 1, 2]);

        let vertex = builder.vertices[1];
        assert_eq!(vertex.position, [0.5, 0.5, 0.0]);
        assert_eq!(vertex.color, [1.0, 1.0, 1.0]);
        assert_eq!(vertex.normal, [0.0, 0.0, 0.0]);
        assert_eq!(vertex.uv, [0.0, 0.0]);
    }

    #[test]
    fn shared_corners_are_deduplicated() {
        let builder = parse(QUAD_WITH_NORMALS);
        assert_eq!(builder.vertices.len(), 4);
        assert_eq!(builder.indices.len(), 6);
        // both triangles start at the same corner
        assert_eq!(builder.indices[0], builder.indices[3]);
        assert_eq!(builder.indices[2], builder.indices[4]);

        for vertex in &builder.vertices {
            assert_eq!(vertex.normal, [0.0, -1.0, 0.0]);
        }
        let corner = builder.vertices[builder.indices[2] as usize];
        assert_eq!(corner.position, [1.0, 0.0, 1.0]);
        assert_eq!(corner.uv, [1.0, 1.0]);
    }

    #[test]
    fn faces_are_triangulated() {
        let builder = parse("v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n");
        assert_eq!(builder.vertices.len(), 4);
        assert_eq!(builder.indices.len(), 6);
    }

    #[test]
    fn vertex_colors_are_read() {
        let builder = parse("v 0 0 0 1 0 0\nv 1 0 0 0 1 0\nv 0 1 0 0 0 1\nf 1 2 3\n");
        assert_eq!(builder.vertices[0].color, [1.0, 0.0, 0.0]);
        assert_eq!(builder.vertices[2].color, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn fewer_than_three_vertices_is_rejected() {
        let builder = ModelBuilder {
            vertices: vec![Vertex::default(); 2],
            indices: Vec::new(),
        };
        assert!(matches!(
            builder.validate(),
            Err(EngineError::NotEnoughVertices(2))
        ));
        assert!(parse(TRIANGLE).validate().is_ok());
    }

    #[test]
    fn attribute_layout_matches_struct() {
        let attributes = Vertex::attribute_descriptions();
        let locations: Vec<u32> = attributes.iter().map(|a| a.location).collect();
        assert_eq!(locations, vec![0, 1, 2, 3]);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[2].offset, 24);
        assert_eq!(attributes[3].offset, 36);
        assert_eq!(attributes[3].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(Vertex::binding_descriptions()[0].stride, 44);
    }
}
