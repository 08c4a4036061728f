use crate::context::VkContext;
use crate::error::{EngineError, EngineResult};
use ash::vk;
use itertools::Itertools;
use std::collections::BTreeMap;
use std::sync::Arc;

type BindingTable = BTreeMap<u32, vk::DescriptorSetLayoutBinding<'static>>;

#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: BindingTable,
    duplicate: Option<u32>,
}

impl DescriptorSetLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a binding. Reusing a binding number is reported by [`Self::build`].
    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
        count: u32,
    ) -> Self {
        if self.bindings.contains_key(&binding) {
            self.duplicate.get_or_insert(binding);
            return self;
        }

        let layout_binding = vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(descriptor_type)
            .descriptor_count(count)
            .stage_flags(stage_flags);
        self.bindings.insert(binding, layout_binding);
        self
    }

    fn validated(self) -> EngineResult<BindingTable> {
        match self.duplicate {
            Some(binding) => Err(EngineError::DuplicateBinding(binding)),
            None => Ok(self.bindings),
        }
    }

    pub fn build(self, context: Arc<VkContext>) -> EngineResult<DescriptorSetLayout> {
        let bindings = self.validated()?;
        let layout_bindings = bindings.values().copied().collect_vec();
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&layout_bindings);

        let layout = unsafe { context.device.create_descriptor_set_layout(&info, None) }?;
        Ok(DescriptorSetLayout {
            context,
            layout,
            bindings,
        })
    }
}

pub struct DescriptorSetLayout {
    context: Arc<VkContext>,
    layout: vk::DescriptorSetLayout,
    bindings: BindingTable,
}

impl DescriptorSetLayout {
    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    pub fn binding(&self, binding: u32) -> Option<&vk::DescriptorSetLayoutBinding<'static>> {
        self.bindings.get(&binding)
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.context
                .device
                .destroy_descriptor_set_layout(self.layout, None)
        }
    }
}

pub struct DescriptorPoolBuilder {
    pool_sizes: Vec<vk::DescriptorPoolSize>,
    max_sets: u32,
    pool_flags: vk::DescriptorPoolCreateFlags,
}

impl Default for DescriptorPoolBuilder {
    fn default() -> Self {
        Self {
            pool_sizes: Vec::new(),
            max_sets: 1000,
            pool_flags: vk::DescriptorPoolCreateFlags::empty(),
        }
    }
}

impl DescriptorPoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pool_size(mut self, descriptor_type: vk::DescriptorType, count: u32) -> Self {
        self.pool_sizes.push(
            vk::DescriptorPoolSize::default()
                .ty(descriptor_type)
                .descriptor_count(count),
        );
        self
    }

    pub fn pool_flags(mut self, flags: vk::DescriptorPoolCreateFlags) -> Self {
        self.pool_flags = flags;
        self
    }

    pub fn max_sets(mut self, count: u32) -> Self {
        self.max_sets = count;
        self
    }

    pub fn build(self, context: Arc<VkContext>) -> EngineResult<DescriptorPool> {
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .flags(self.pool_flags)
            .max_sets(self.max_sets)
            .pool_sizes(&self.pool_sizes);

        let pool = unsafe { context.device.create_descriptor_pool(&pool_info, None) }?;
        Ok(DescriptorPool { context, pool })
    }
}

pub struct DescriptorPool {
    context: Arc<VkContext>,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    pub fn allocate_descriptor(
        &self,
        layout: vk::DescriptorSetLayout,
    ) -> EngineResult<vk::DescriptorSet> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(core::slice::from_ref(&layout));

        match unsafe { self.context.device.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => Ok(sets[0]),
            Err(
                err @ (vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL),
            ) => Err(EngineError::DescriptorPoolExhausted(err)),
            Err(err) => Err(err.into()),
        }
    }

    /// Requires the pool to be built with `FREE_DESCRIPTOR_SET`.
    pub fn free_descriptors(&self, descriptors: &[vk::DescriptorSet]) -> EngineResult<()> {
        unsafe {
            self.context
                .device
                .free_descriptor_sets(self.pool, descriptors)
        }?;
        Ok(())
    }

    pub fn reset_pool(&self) -> EngineResult<()> {
        unsafe {
            self.context
                .device
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())
        }?;
        Ok(())
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe { self.context.device.destroy_descriptor_pool(self.pool, None) }
    }
}

/// Only bindings holding a single descriptor can be written from one info.
fn single_descriptor_type(
    bindings: &BindingTable,
    binding: u32,
) -> EngineResult<vk::DescriptorType> {
    let description = bindings
        .get(&binding)
        .ok_or(EngineError::UnknownBinding(binding))?;

    if description.descriptor_count != 1 {
        return Err(EngineError::ArrayBindingWrite {
            binding,
            count: description.descriptor_count,
        });
    }
    Ok(description.descriptor_type)
}

/// Collects buffer and image infos for one set, then allocates and/or
/// updates it in a single `vkUpdateDescriptorSets` call.
pub struct DescriptorWriter<'a> {
    set_layout: &'a DescriptorSetLayout,
    pool: &'a DescriptorPool,
    buffer_infos: Vec<(u32, vk::DescriptorType, vk::DescriptorBufferInfo)>,
    image_infos: Vec<(u32, vk::DescriptorType, vk::DescriptorImageInfo)>,
}

impl<'a> DescriptorWriter<'a> {
    pub fn new(set_layout: &'a DescriptorSetLayout, pool: &'a DescriptorPool) -> Self {
        Self {
            set_layout,
            pool,
            buffer_infos: Vec::new(),
            image_infos: Vec::new(),
        }
    }

    pub fn write_buffer(
        mut self,
        binding: u32,
        buffer_info: vk::DescriptorBufferInfo,
    ) -> EngineResult<Self> {
        let descriptor_type = single_descriptor_type(&self.set_layout.bindings, binding)?;
        self.buffer_infos.push((binding, descriptor_type, buffer_info));
        Ok(self)
    }

    pub fn write_image(
        mut self,
        binding: u32,
        image_info: vk::DescriptorImageInfo,
    ) -> EngineResult<Self> {
        let descriptor_type = single_descriptor_type(&self.set_layout.bindings, binding)?;
        self.image_infos.push((binding, descriptor_type, image_info));
        Ok(self)
    }

    pub fn build(&self) -> EngineResult<vk::DescriptorSet> {
        let set = self.pool.allocate_descriptor(self.set_layout.layout())?;
        self.overwrite(set);
        Ok(set)
    }

    pub fn overwrite(&self, set: vk::DescriptorSet) {
        let buffer_writes = self.buffer_infos.iter().map(|(binding, ty, info)| {
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(*binding)
                .descriptor_type(*ty)
                .buffer_info(core::slice::from_ref(info))
        });
        let image_writes = self.image_infos.iter().map(|(binding, ty, info)| {
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(*binding)
                .descriptor_type(*ty)
                .image_info(core::slice::from_ref(info))
        });
        let writes = buffer_writes.chain(image_writes).collect_vec();

        unsafe { self.pool.context.device.update_descriptor_sets(&writes, &[]) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_at(
        builder: DescriptorSetLayoutBuilder,
        binding: u32,
        count: u32,
    ) -> DescriptorSetLayoutBuilder {
        builder.add_binding(
            binding,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::ALL_GRAPHICS,
            count,
        )
    }

    #[test]
    fn bindings_are_keyed_by_number() {
        let builder = uniform_at(DescriptorSetLayoutBuilder::new(), 2, 1);
        let builder = builder.add_binding(
            0,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::ShaderStageFlags::FRAGMENT,
            1,
        );
        let table = builder.validated().unwrap();

        assert_eq!(table.keys().copied().collect_vec(), vec![0, 2]);
        assert_eq!(table[&2].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(table[&2].stage_flags, vk::ShaderStageFlags::ALL_GRAPHICS);
        assert_eq!(table[&0].stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn duplicate_binding_fails_validation() {
        let builder = uniform_at(DescriptorSetLayoutBuilder::new(), 0, 1);
        let builder = uniform_at(builder, 1, 1);
        let builder = uniform_at(builder, 0, 1);

        assert!(matches!(
            builder.validated(),
            Err(EngineError::DuplicateBinding(0))
        ));
    }

    #[test]
    fn pool_builder_defaults() {
        let builder = DescriptorPoolBuilder::new()
            .add_pool_size(vk::DescriptorType::UNIFORM_BUFFER, 2);
        assert_eq!(builder.max_sets, 1000);
        assert_eq!(builder.pool_flags, vk::DescriptorPoolCreateFlags::empty());
        assert_eq!(builder.pool_sizes.len(), 1);
        assert_eq!(builder.pool_sizes[0].descriptor_count, 2);

        let builder = builder.max_sets(2);
        assert_eq!(builder.max_sets, 2);
    }

    #[test]
    fn writes_need_existing_single_binding() {
        let table = uniform_at(uniform_at(DescriptorSetLayoutBuilder::new(), 0, 1), 1, 4)
            .validated()
            .unwrap();

        assert_eq!(
            single_descriptor_type(&table, 0).unwrap(),
            vk::DescriptorType::UNIFORM_BUFFER
        );
        assert!(matches!(
            single_descriptor_type(&table, 3),
            Err(EngineError::UnknownBinding(3))
        ));
        assert!(matches!(
            single_descriptor_type(&table, 1),
            Err(EngineError::ArrayBindingWrite {
                binding: 1,
                count: 4
            })
        ));
    }
}
