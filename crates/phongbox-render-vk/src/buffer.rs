// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Context, Result};
use ash::vk;
use bytemuck::Pod;
use phongbox_math::{ConstantSlots, Vertex};
use phongbox_render::{ResourceState, StateTracker};
use tracing::{debug, warn};

use crate::barrier::{buffer_barrier, cmd_buffer_transitions};
use crate::context::{DeviceContext, SubmitSync};
use crate::unwind::InitGuard;

pub(crate) fn find_memory_type(
    mem: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    req: vk::MemoryPropertyFlags,
) -> Result<u32> {
    (0..mem.memory_type_count)
        .find(|&i| {
            (type_bits & (1 << i)) != 0 && mem.memory_types[i as usize].property_flags.contains(req)
        })
        .ok_or_else(|| anyhow!("no memory type with {req:?} in mask {type_bits:#b}"))
}

pub(crate) unsafe fn allocate_for(
    ctx: &DeviceContext,
    req: vk::MemoryRequirements,
    props: vk::MemoryPropertyFlags,
) -> Result<vk::DeviceMemory> {
    let mem_type = find_memory_type(&ctx.memory_properties(), req.memory_type_bits, props)?;
    let mai = vk::MemoryAllocateInfo {
        s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
        allocation_size: req.size,
        memory_type_index: mem_type,
        ..Default::default()
    };
    ctx.device()
        .allocate_memory(&mai, None)
        .context("allocate_memory")
}

/// A buffer with its own dedicated allocation.
#[derive(Clone, Copy, Debug)]
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

impl GpuBuffer {
    pub fn create(
        ctx: &DeviceContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        props: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        unsafe {
            let device = ctx.device();
            let bci = vk::BufferCreateInfo {
                s_type: vk::StructureType::BUFFER_CREATE_INFO,
                size,
                usage,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                ..Default::default()
            };
            let mut guard = InitGuard::new();
            let buffer = device.create_buffer(&bci, None).context("create_buffer")?;
            let d = device.clone();
            guard.push("buffer", move || d.destroy_buffer(buffer, None));
            let req = device.get_buffer_memory_requirements(buffer);
            let memory = allocate_for(ctx, req, props)?;
            let d = device.clone();
            guard.push("buffer memory", move || d.free_memory(memory, None));
            device
                .bind_buffer_memory(buffer, memory, 0)
                .context("bind_buffer_memory")?;
            guard.disarm();
            Ok(Self {
                buffer,
                memory,
                size,
            })
        }
    }

    /// Host-visible transfer source holding a copy of `bytes`.
    pub fn staging(ctx: &DeviceContext, bytes: &[u8]) -> Result<Self> {
        let buf = Self::create(
            ctx,
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let mut guard = InitGuard::new();
        guard.push("staging buffer", buf.undo(ctx.device()));
        unsafe {
            let ptr = ctx
                .device()
                .map_memory(buf.memory, 0, buf.size, vk::MemoryMapFlags::empty())
                .context("map_memory(staging)")?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr as *mut u8, bytes.len());
            ctx.device().unmap_memory(buf.memory);
        }
        guard.disarm();
        Ok(buf)
    }

    /// Cleanup step for an [`InitGuard`].
    pub(crate) fn undo(self, device: &ash::Device) -> impl FnOnce() + 'static {
        let device = device.clone();
        move || unsafe { self.destroy(&device) }
    }

    pub(crate) unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_buffer(self.buffer, None);
        device.free_memory(self.memory, None);
    }
}

/// Persistently mapped, host-coherent buffer of 256-byte aligned `T` slots.
///
/// Writes are plain memory stores; callers only write after the fence shows
/// the GPU is done reading the previous contents.
pub struct UploadBuffer<T> {
    buf: GpuBuffer,
    mapped: *mut u8,
    slots: ConstantSlots<T>,
}

impl<T: Pod> UploadBuffer<T> {
    pub fn new(ctx: &DeviceContext, count: usize, usage: vk::BufferUsageFlags) -> Result<Self> {
        let slots = ConstantSlots::<T>::new(count);
        let buf = GpuBuffer::create(
            ctx,
            slots.byte_len() as vk::DeviceSize,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let mut guard = InitGuard::new();
        guard.push("upload buffer", buf.undo(ctx.device()));
        let mapped = unsafe {
            ctx.device()
                .map_memory(buf.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                .context("map_memory(upload)")? as *mut u8
        };
        guard.disarm();
        debug!(
            "upload buffer: {count} x {} bytes (stride {})",
            std::mem::size_of::<T>(),
            slots.stride()
        );
        Ok(Self {
            buf,
            mapped,
            slots,
        })
    }

    fn region_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.mapped, self.slots.byte_len()) }
    }

    pub fn write(&mut self, index: usize, value: &T) -> Result<()> {
        let slots = self.slots;
        slots.write(self.region_mut(), index, value)?;
        Ok(())
    }

    pub fn descriptor_info(&self, index: usize) -> Result<vk::DescriptorBufferInfo> {
        Ok(vk::DescriptorBufferInfo {
            buffer: self.buf.buffer,
            offset: self.slots.offset(index)? as vk::DeviceSize,
            range: std::mem::size_of::<T>() as vk::DeviceSize,
        })
    }

    pub(crate) unsafe fn destroy(&mut self, device: &ash::Device) {
        device.unmap_memory(self.buf.memory);
        self.mapped = std::ptr::null_mut();
        self.buf.destroy(device);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum GeometrySlot {
    Vertices,
    Indices,
}

/// Device-local vertex and index buffers, filled once through staging copies.
pub struct GeometryBuffers {
    pub vertices: GpuBuffer,
    pub indices: GpuBuffer,
    pub index_count: u32,
}

impl GeometryBuffers {
    pub fn upload(ctx: &mut DeviceContext, vertices: &[Vertex], indices: &[u16]) -> Result<Self> {
        let vbytes: &[u8] = bytemuck::cast_slice(vertices);
        let ibytes: &[u8] = bytemuck::cast_slice(indices);

        let mut guard = InitGuard::new();
        let vb = GpuBuffer::create(
            ctx,
            vbytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        guard.push("vertex buffer", vb.undo(ctx.device()));
        let ib = GpuBuffer::create(
            ctx,
            ibytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        guard.push("index buffer", ib.undo(ctx.device()));
        let vstage = GpuBuffer::staging(ctx, vbytes)?;
        guard.push("vertex staging", vstage.undo(ctx.device()));
        let istage = GpuBuffer::staging(ctx, ibytes)?;
        guard.push("index staging", istage.undo(ctx.device()));

        // Unwinds first: a submitted copy may still be reading staging memory.
        let device = ctx.device().clone();
        guard.push("pending upload", move || unsafe {
            if let Err(e) = device.device_wait_idle() {
                warn!("device_wait_idle after failed upload: {e}");
            }
        });

        let mut states = StateTracker::new();
        states.register(GeometrySlot::Vertices, ResourceState::CopyDest);
        states.register(GeometrySlot::Indices, ResourceState::CopyDest);

        ctx.record_and_submit(SubmitSync::default(), |d, cmd| unsafe {
            states.expect(GeometrySlot::Vertices, ResourceState::CopyDest)?;
            states.expect(GeometrySlot::Indices, ResourceState::CopyDest)?;
            let vcopy = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: vb.size,
            };
            d.cmd_copy_buffer(cmd, vstage.buffer, vb.buffer, std::slice::from_ref(&vcopy));
            let icopy = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: ib.size,
            };
            d.cmd_copy_buffer(cmd, istage.buffer, ib.buffer, std::slice::from_ref(&icopy));

            let tv = states.transition(GeometrySlot::Vertices, ResourceState::VertexBuffer)?;
            let ti = states.transition(GeometrySlot::Indices, ResourceState::IndexBuffer)?;
            cmd_buffer_transitions(d, cmd, &[buffer_barrier(vb.buffer, &tv), buffer_barrier(ib.buffer, &ti)]);
            Ok(())
        })
        .context("record geometry upload")?;

        // Staging memory must outlive the copy.
        ctx.flush().context("flush geometry upload")?;
        guard.disarm();
        unsafe {
            vstage.destroy(ctx.device());
            istage.destroy(ctx.device());
        }

        debug!(
            "geometry uploaded: {} vertices, {} indices",
            vertices.len(),
            indices.len()
        );
        Ok(Self {
            vertices: vb,
            indices: ib,
            index_count: indices.len() as u32,
        })
    }

    pub(crate) unsafe fn destroy(&self, device: &ash::Device) {
        self.vertices.destroy(device);
        self.indices.destroy(device);
    }
}
