use crate::context::VkContext;
use crate::error::{EngineError, EngineResult};
use ash::vk;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Arc;

/// A `vk::Buffer` holding `instance_count` elements, each padded to
/// `alignment_size` so any single element can be bound as a dynamic offset.
pub struct Buffer {
    context: Arc<VkContext>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    mapped: Option<Mapping>,

    buffer_size: vk::DeviceSize,
    instance_count: u32,
    instance_size: vk::DeviceSize,
    alignment_size: vk::DeviceSize,
    usage_flags: vk::BufferUsageFlags,
    memory_property_flags: vk::MemoryPropertyFlags,
}

impl Buffer {
    pub fn new(
        context: Arc<VkContext>,
        instance_size: vk::DeviceSize,
        instance_count: u32,
        usage_flags: vk::BufferUsageFlags,
        memory_property_flags: vk::MemoryPropertyFlags,
        min_offset_alignment: vk::DeviceSize,
    ) -> EngineResult<Self> {
        let alignment_size = Self::alignment(instance_size, min_offset_alignment);
        let buffer_size = alignment_size * instance_count as vk::DeviceSize;
        let (buffer, memory) =
            context.create_buffer(buffer_size, usage_flags, memory_property_flags)?;

        Ok(Self {
            context,
            buffer,
            memory,
            mapped: None,
            buffer_size,
            instance_count,
            instance_size,
            alignment_size,
            usage_flags,
            memory_property_flags,
        })
    }

    /// Rounds `instance_size` up to the next multiple of `min_offset_alignment`.
    ///
    /// Device limits are powers of two; an alignment of 0 leaves the size as is.
    pub fn alignment(
        instance_size: vk::DeviceSize,
        min_offset_alignment: vk::DeviceSize,
    ) -> vk::DeviceSize {
        if min_offset_alignment > 0 {
            (instance_size + min_offset_alignment - 1) & !(min_offset_alignment - 1)
        } else {
            instance_size
        }
    }

    /// Maps `size` bytes at `offset`; `vk::WHOLE_SIZE` maps from `offset` to
    /// the end of the buffer. Mapping twice without `unmap` is an error.
    pub fn map(&mut self, size: vk::DeviceSize, offset: vk::DeviceSize) -> EngineResult<()> {
        if self.mapped.is_some() {
            return Err(EngineError::BufferAlreadyMapped);
        }
        let range = MappedRange::new(self.buffer_size, size, offset)?;

        let ptr = unsafe {
            self.context.device.map_memory(
                self.memory,
                range.offset,
                range.size,
                vk::MemoryMapFlags::empty(),
            )
        }?;
        self.mapped = NonNull::new(ptr).map(|ptr| Mapping { ptr, range });
        Ok(())
    }

    pub fn unmap(&mut self) {
        if self.mapped.take().is_some() {
            unsafe { self.context.device.unmap_memory(self.memory) };
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }

    /// Copies `data` into the mapped range.
    ///
    /// With `size == vk::WHOLE_SIZE` all of `data` is written from the start of
    /// the mapping; otherwise the first `size` bytes of `data` land at buffer
    /// offset `offset`, which has to lie inside the mapping.
    pub fn write_to_buffer<T: Copy>(
        &mut self,
        data: &[T],
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
    ) -> EngineResult<()> {
        let mapping = self.mapped.ok_or(EngineError::BufferNotMapped)?;
        let bytes = as_bytes(data);
        let (offset, len) = mapping.range.resolve_write(bytes.len(), size, offset)?;

        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                mapping.ptr.as_ptr().cast::<u8>().add(offset),
                len,
            );
        }
        Ok(())
    }

    pub fn flush(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> EngineResult<()> {
        let range = self.mapped_range(size, offset);
        unsafe { self.context.device.flush_mapped_memory_ranges(&[range]) }?;
        Ok(())
    }

    pub fn invalidate(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> EngineResult<()> {
        let range = self.mapped_range(size, offset);
        unsafe { self.context.device.invalidate_mapped_memory_ranges(&[range]) }?;
        Ok(())
    }

    pub fn descriptor_info(
        &self,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
    ) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset,
            range: size,
        }
    }

    /// Writes one instance at `index * alignment_size`.
    pub fn write_to_index<T: Copy>(&mut self, data: &T, index: u32) -> EngineResult<()> {
        let offset = self.index_offset(index);
        self.write_to_buffer(std::slice::from_ref(data), self.instance_size, offset)
    }

    pub fn flush_index(&self, index: u32) -> EngineResult<()> {
        self.flush(self.alignment_size, self.index_offset(index))
    }

    pub fn descriptor_info_for_index(&self, index: u32) -> vk::DescriptorBufferInfo {
        self.descriptor_info(self.alignment_size, self.index_offset(index))
    }

    pub fn invalidate_index(&self, index: u32) -> EngineResult<()> {
        self.invalidate(self.alignment_size, self.index_offset(index))
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    pub fn instance_size(&self) -> vk::DeviceSize {
        self.instance_size
    }

    pub fn alignment_size(&self) -> vk::DeviceSize {
        self.alignment_size
    }

    pub fn usage_flags(&self) -> vk::BufferUsageFlags {
        self.usage_flags
    }

    pub fn memory_property_flags(&self) -> vk::MemoryPropertyFlags {
        self.memory_property_flags
    }

    pub fn buffer_size(&self) -> vk::DeviceSize {
        self.buffer_size
    }

    fn index_offset(&self, index: u32) -> vk::DeviceSize {
        index as vk::DeviceSize * self.alignment_size
    }

    fn mapped_range(
        &self,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
    ) -> vk::MappedMemoryRange<'static> {
        vk::MappedMemoryRange::default()
            .memory(self.memory)
            .offset(offset)
            .size(size)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.unmap();
        unsafe {
            self.context.device.destroy_buffer(self.buffer, None);
            self.context.device.free_memory(self.memory, None);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Mapping {
    ptr: NonNull<c_void>,
    range: MappedRange,
}

/// The byte range of the buffer currently mapped, in buffer offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MappedRange {
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
}

impl MappedRange {
    fn new(
        buffer_size: vk::DeviceSize,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
    ) -> EngineResult<Self> {
        let size = if size == vk::WHOLE_SIZE {
            buffer_size.saturating_sub(offset)
        } else {
            size
        };
        if size == 0 {
            return Err(EngineError::BufferOverflow {
                offset,
                size,
                start: 0,
                end: buffer_size,
            });
        }
        check_range(offset, size, 0, buffer_size)?;
        Ok(Self { offset, size })
    }

    fn end(&self) -> vk::DeviceSize {
        self.offset + self.size
    }

    /// Resolves a write request against the mapping, returning the byte offset
    /// into the mapped pointer and the length to copy.
    fn resolve_write(
        &self,
        data_len: usize,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
    ) -> EngineResult<(usize, usize)> {
        let (offset, size) = if size == vk::WHOLE_SIZE {
            (self.offset, data_len as vk::DeviceSize)
        } else {
            (offset, size)
        };

        if size > data_len as vk::DeviceSize {
            return Err(EngineError::WriteExceedsData { size, data_len });
        }
        check_range(offset, size, self.offset, self.end())?;

        Ok(((offset - self.offset) as usize, size as usize))
    }
}

fn check_range(
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    start: vk::DeviceSize,
    end: vk::DeviceSize,
) -> EngineResult<()> {
    let inside = offset >= start && offset.checked_add(size).is_some_and(|last| last <= end);
    if inside {
        Ok(())
    } else {
        Err(EngineError::BufferOverflow {
            offset,
            size,
            start,
            end,
        })
    }
}

fn as_bytes<T: Copy>(data: &[T]) -> &[u8] {
    unsafe { std::slice::from_raw_parts(data.as_ptr().cast::<u8>(), std::mem::size_of_val(data)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_rounds_up_to_multiple() {
        assert_eq!(Buffer::alignment(200, 256), 256);
        assert_eq!(Buffer::alignment(256, 256), 256);
        assert_eq!(Buffer::alignment(257, 256), 512);
        assert_eq!(Buffer::alignment(12, 4), 12);
        assert_eq!(Buffer::alignment(13, 4), 16);
    }

    #[test]
    fn zero_alignment_keeps_size() {
        assert_eq!(Buffer::alignment(200, 0), 200);
    }

    fn whole_mapping(buffer_size: vk::DeviceSize) -> MappedRange {
        MappedRange::new(buffer_size, vk::WHOLE_SIZE, 0).unwrap()
    }

    #[test]
    fn whole_size_write_starts_at_the_mapping() {
        assert_eq!(
            whole_mapping(256).resolve_write(64, vk::WHOLE_SIZE, 128).unwrap(),
            (0, 64)
        );
    }

    #[test]
    fn sized_write_honours_offset() {
        assert_eq!(whole_mapping(512).resolve_write(200, 200, 256).unwrap(), (256, 200));
    }

    #[test]
    fn write_past_the_end_is_rejected() {
        let err = whole_mapping(256).resolve_write(200, 200, 100).unwrap_err();
        assert!(matches!(
            err,
            EngineError::BufferOverflow {
                offset: 100,
                size: 200,
                start: 0,
                end: 256
            }
        ));
        assert!(whole_mapping(64).resolve_write(128, vk::WHOLE_SIZE, 0).is_err());
    }

    #[test]
    fn write_near_offset_limit_does_not_wrap() {
        let err = whole_mapping(256).resolve_write(4, 4, u64::MAX - 1).unwrap_err();
        assert!(matches!(err, EngineError::BufferOverflow { .. }));
    }

    #[test]
    fn write_larger_than_data_is_rejected() {
        assert!(matches!(
            whole_mapping(256).resolve_write(16, 32, 0),
            Err(EngineError::WriteExceedsData {
                size: 32,
                data_len: 16
            })
        ));
    }

    #[test]
    fn partial_mapping_translates_offsets() {
        let range = MappedRange::new(256, 64, 128).unwrap();
        assert_eq!(range.resolve_write(16, 16, 128).unwrap(), (0, 16));
        assert_eq!(range.resolve_write(16, 16, 176).unwrap(), (48, 16));
        assert_eq!(range.resolve_write(8, vk::WHOLE_SIZE, 0).unwrap(), (0, 8));
    }

    #[test]
    fn partial_mapping_rejects_writes_outside_it() {
        let range = MappedRange::new(256, 64, 128).unwrap();
        // inside the buffer but past the mapped bytes
        assert!(range.resolve_write(64, 64, 128 + 16).is_err());
        assert!(range.resolve_write(64, 64, 192).is_err());
        // before the mapping
        assert!(range.resolve_write(16, 16, 64).is_err());
        assert!(range.resolve_write(128, vk::WHOLE_SIZE, 0).is_err());
    }

    #[test]
    fn mapping_has_to_fit_the_buffer() {
        assert_eq!(
            MappedRange::new(256, vk::WHOLE_SIZE, 64).unwrap(),
            MappedRange {
                offset: 64,
                size: 192
            }
        );
        assert!(MappedRange::new(256, 128, 192).is_err());
        assert!(MappedRange::new(256, 1, u64::MAX).is_err());
        assert!(MappedRange::new(256, vk::WHOLE_SIZE, 300).is_err());
        assert!(MappedRange::new(256, vk::WHOLE_SIZE, 256).is_err());
    }

    #[test]
    fn bytes_cover_the_whole_slice() {
        let data = [1.0f32, 2.0, 3.0];
        let bytes = as_bytes(&data);
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[4..8], &2.0f32.to_ne_bytes());
    }
}
