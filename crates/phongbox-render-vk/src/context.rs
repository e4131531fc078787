// SPDX-License-Identifier: CEPL-1.0
//! Instance, surface, device, the single queue, the single command pool/buffer
//! pair and the timeline semaphore that backs the frame fence.
use std::ffi::{c_void, CStr};

use anyhow::{anyhow, Context, Result};
use ash::ext::debug_utils as ext_debug;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use phongbox_render::{CommandListState, CompletionSignal, FenceCounter};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use tracing::{debug, error, info, trace, warn};

use crate::unwind::InitGuard;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const VALIDATION_REQUESTED: bool = cfg!(debug_assertions);

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", ?types, "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", ?types, "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!(target: "vulkan", ?types, "{msg}");
    } else {
        trace!(target: "vulkan", ?types, "{msg}");
    }
    vk::FALSE
}

struct DebugMessenger {
    loader: ext_debug::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

unsafe fn create_debug_messenger(entry: &Entry, instance: &Instance) -> Result<DebugMessenger> {
    let loader = ext_debug::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    let messenger = loader
        .create_debug_utils_messenger(&ci, None)
        .context("create_debug_utils_messenger")?;
    Ok(DebugMessenger { loader, messenger })
}

/// Returns the instance and whether the validation layer is active.
unsafe fn create_instance(entry: &Entry, display_raw: RawDisplayHandle) -> Result<(Instance, bool)> {
    let app = c"phongbox";
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app.as_ptr(),
        application_version: 0,
        p_engine_name: app.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_3,
        ..Default::default()
    };

    let mut exts = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?
        .to_vec();

    let validation = VALIDATION_REQUESTED
        && entry
            .enumerate_instance_layer_properties()
            .unwrap_or_default()
            .iter()
            .any(|l| CStr::from_ptr(l.layer_name.as_ptr()) == VALIDATION_LAYER);
    if VALIDATION_REQUESTED && !validation {
        warn!("validation layer not installed; continuing without it");
    }
    if validation {
        exts.push(ext_debug::NAME.as_ptr());
    }
    let layers = [VALIDATION_LAYER.as_ptr()];

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: exts.len() as u32,
        pp_enabled_extension_names: exts.as_ptr(),
        enabled_layer_count: if validation { layers.len() as u32 } else { 0 },
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };

    let instance = entry
        .create_instance(&create_info, None)
        .context("create_instance")?;
    Ok((instance, validation))
}

/// Lower is better. Hardware adapters always rank ahead of software ones.
pub(crate) fn adapter_rank(ty: vk::PhysicalDeviceType) -> u32 {
    match ty {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 3,
        _ => 4,
    }
}

pub(crate) fn is_software(ty: vk::PhysicalDeviceType) -> bool {
    ty == vk::PhysicalDeviceType::CPU
}

pub(crate) fn pick_adapter<T: Copy>(
    candidates: &[(T, vk::PhysicalDeviceType)],
) -> Option<(T, vk::PhysicalDeviceType)> {
    candidates
        .iter()
        .copied()
        .min_by_key(|&(_, ty)| adapter_rank(ty))
}

#[derive(Clone, Copy)]
struct Candidate {
    phys: vk::PhysicalDevice,
    queue_family: u32,
}

unsafe fn find_graphics_present_queue(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
) -> Option<u32> {
    let qprops = instance.get_physical_device_queue_family_properties(phys);
    qprops.iter().enumerate().find_map(|(i, q)| {
        let present = surface_loader
            .get_physical_device_surface_support(phys, i as u32, surface)
            .unwrap_or(false);
        (q.queue_flags.contains(vk::QueueFlags::GRAPHICS) && present).then_some(i as u32)
    })
}

/// Hardware first; a CPU implementation is accepted only when nothing else qualifies.
unsafe fn select_adapter(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(Candidate, vk::PhysicalDeviceProperties)> {
    let mut candidates = Vec::new();
    for phys in instance
        .enumerate_physical_devices()
        .context("enumerate_physical_devices")?
    {
        let props = instance.get_physical_device_properties(phys);
        let name = props
            .device_name_as_c_str()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if props.api_version < vk::API_VERSION_1_3 {
            debug!("skipping {name}: Vulkan {}.{}", vk::api_version_major(props.api_version), vk::api_version_minor(props.api_version));
            continue;
        }
        let Some(queue_family) = find_graphics_present_queue(instance, surface_loader, surface, phys)
        else {
            debug!("skipping {name}: no graphics queue that can present");
            continue;
        };
        debug!("candidate adapter {name} ({:?})", props.device_type);
        candidates.push((Candidate { phys, queue_family }, props.device_type));
    }

    let (picked, ty) = pick_adapter(&candidates)
        .ok_or_else(|| anyhow!("no Vulkan 1.3 adapter with a graphics queue that can present"))?;
    if is_software(ty) {
        warn!("no hardware adapter available; falling back to software rasterizer");
    }
    Ok((picked, instance.get_physical_device_properties(picked.phys)))
}

unsafe fn create_logical_device(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    queue_family: u32,
) -> Result<ash::Device> {
    let priorities = [1.0_f32];
    let qinfo = vk::DeviceQueueCreateInfo {
        s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
        queue_family_index: queue_family,
        queue_count: 1,
        p_queue_priorities: priorities.as_ptr(),
        ..Default::default()
    };

    // Timeline semaphores are 1.2 core; sync2 and dynamic rendering are 1.3 core.
    let mut feats13 = vk::PhysicalDeviceVulkan13Features {
        s_type: vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_3_FEATURES,
        synchronization2: vk::TRUE,
        dynamic_rendering: vk::TRUE,
        ..Default::default()
    };
    let feats12 = vk::PhysicalDeviceVulkan12Features {
        s_type: vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_2_FEATURES,
        p_next: (&mut feats13) as *mut _ as *mut c_void,
        timeline_semaphore: vk::TRUE,
        ..Default::default()
    };

    let device_exts = [swapchain::NAME.as_ptr()];
    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        p_next: (&feats12) as *const _ as *const c_void,
        queue_create_info_count: 1,
        p_queue_create_infos: &qinfo,
        enabled_extension_count: device_exts.len() as u32,
        pp_enabled_extension_names: device_exts.as_ptr(),
        ..Default::default()
    };

    instance
        .create_device(phys, &dinfo, None)
        .context("create_device")
}

/// Timeline semaphore driven through the device's only queue.
pub(crate) struct TimelineSignal {
    device: ash::Device,
    queue: vk::Queue,
    semaphore: vk::Semaphore,
}

impl TimelineSignal {
    unsafe fn create(device: &ash::Device, queue: vk::Queue) -> Result<Self> {
        let type_info = vk::SemaphoreTypeCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_TYPE_CREATE_INFO,
            semaphore_type: vk::SemaphoreType::TIMELINE,
            initial_value: 0,
            ..Default::default()
        };
        let ci = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            p_next: (&type_info) as *const _ as *const c_void,
            ..Default::default()
        };
        let semaphore = device
            .create_semaphore(&ci, None)
            .context("create_semaphore(timeline)")?;
        Ok(Self {
            device: device.clone(),
            queue,
            semaphore,
        })
    }
}

impl CompletionSignal for TimelineSignal {
    fn enqueue_signal(&mut self, value: u64) -> Result<()> {
        let signal = vk::SemaphoreSubmitInfo {
            s_type: vk::StructureType::SEMAPHORE_SUBMIT_INFO,
            semaphore: self.semaphore,
            value,
            stage_mask: vk::PipelineStageFlags2::ALL_COMMANDS,
            ..Default::default()
        };
        let submit = vk::SubmitInfo2 {
            s_type: vk::StructureType::SUBMIT_INFO_2,
            signal_semaphore_info_count: 1,
            p_signal_semaphore_infos: &signal,
            ..Default::default()
        };
        unsafe {
            self.device
                .queue_submit2(self.queue, std::slice::from_ref(&submit), vk::Fence::null())
                .context("queue_submit2(fence signal)")
        }
    }

    fn completed_value(&self) -> Result<u64> {
        unsafe {
            self.device
                .get_semaphore_counter_value(self.semaphore)
                .context("get_semaphore_counter_value")
        }
    }

    fn wait_for(&self, value: u64) -> Result<()> {
        let info = vk::SemaphoreWaitInfo {
            s_type: vk::StructureType::SEMAPHORE_WAIT_INFO,
            semaphore_count: 1,
            p_semaphores: &self.semaphore,
            p_values: &value,
            ..Default::default()
        };
        unsafe {
            self.device
                .wait_semaphores(&info, u64::MAX)
                .context("wait_semaphores")
        }
    }
}

/// Binary semaphores a submit waits on and signals. Default: neither.
#[derive(Clone, Copy, Debug, Default)]
pub struct SubmitSync {
    pub wait: Option<(vk::Semaphore, vk::PipelineStageFlags2)>,
    pub signal: Option<vk::Semaphore>,
}

pub struct DeviceContext {
    _entry: Entry,
    instance: Instance,
    debug: Option<DebugMessenger>,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,

    phys: vk::PhysicalDevice,
    adapter_name: String,
    software: bool,
    device: ash::Device,
    queue: vk::Queue,

    cmd_pool: vk::CommandPool,
    cmd: vk::CommandBuffer,
    list: CommandListState,
    fence: FenceCounter<TimelineSignal>,
}

impl DeviceContext {
    // STRICT ORDER:
    // 1) instance (+ debug messenger)
    // 2) surface from THIS instance
    // 3) adapter chosen against the surface (present support)
    // 4) device, queue, pool/buffer, timeline
    // A failure at any step destroys what the earlier steps created.
    pub fn new(window: &dyn HasWindowHandle, display: &dyn HasDisplayHandle) -> Result<Self> {
        let mut guard = InitGuard::new();
        unsafe {
            let dh = display.display_handle()?.as_raw();
            let wh = window.window_handle()?.as_raw();

            let entry = Entry::linked();
            let (instance, validation) = create_instance(&entry, dh)?;
            let i = instance.clone();
            guard.push("instance", move || i.destroy_instance(None));

            let debug = if validation {
                let dbg = create_debug_messenger(&entry, &instance)?;
                let (loader, messenger) = (dbg.loader.clone(), dbg.messenger);
                guard.push("debug messenger", move || {
                    loader.destroy_debug_utils_messenger(messenger, None)
                });
                Some(dbg)
            } else {
                None
            };

            let surface_loader = surface::Instance::new(&entry, &instance);
            let surface = ash_window::create_surface(&entry, &instance, dh, wh, None)
                .context("ash_window::create_surface")?;
            let sl = surface_loader.clone();
            guard.push("surface", move || sl.destroy_surface(surface, None));

            let (picked, props) = select_adapter(&instance, &surface_loader, surface)?;
            let adapter_name = props
                .device_name_as_c_str()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let device = create_logical_device(&instance, picked.phys, picked.queue_family)?;
            let d = device.clone();
            guard.push("device", move || d.destroy_device(None));
            let queue = device.get_device_queue(picked.queue_family, 0);

            let pool_info = vk::CommandPoolCreateInfo {
                s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
                queue_family_index: picked.queue_family,
                ..Default::default()
            };
            let cmd_pool = device
                .create_command_pool(&pool_info, None)
                .context("create_command_pool")?;
            let d = device.clone();
            guard.push("command pool", move || d.destroy_command_pool(cmd_pool, None));
            let alloc_info = vk::CommandBufferAllocateInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
                command_pool: cmd_pool,
                level: vk::CommandBufferLevel::PRIMARY,
                command_buffer_count: 1,
                ..Default::default()
            };
            let cmd = device
                .allocate_command_buffers(&alloc_info)
                .context("allocate_command_buffers")?[0];

            let timeline = TimelineSignal::create(&device, queue)?;
            guard.disarm();

            info!(
                "device ready: {adapter_name} ({:?}), queue family {}, validation {}",
                props.device_type,
                picked.queue_family,
                if validation { "on" } else { "off" }
            );

            Ok(Self {
                _entry: entry,
                instance,
                debug,
                surface_loader,
                surface,
                phys: picked.phys,
                adapter_name,
                software: is_software(props.device_type),
                device,
                queue,
                cmd_pool,
                cmd,
                list: CommandListState::default(),
                fence: FenceCounter::new(timeline),
            })
        }
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn phys(&self) -> vk::PhysicalDevice {
        self.phys
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn surface_loader(&self) -> &surface::Instance {
        &self.surface_loader
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn is_software(&self) -> bool {
        self.software
    }

    pub fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        unsafe { self.instance.get_physical_device_memory_properties(self.phys) }
    }

    /// Reset the pool, record through `record`, close and submit as one batch.
    ///
    /// Fails if the previous recording was never closed, or if the previous
    /// batch has not been covered by a completed flush.
    pub fn record_and_submit<F>(&mut self, sync: SubmitSync, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
    {
        let completed = self.fence.completed()?;
        self.list.begin(completed)?;

        unsafe {
            self.device
                .reset_command_pool(self.cmd_pool, vk::CommandPoolResetFlags::empty())
                .context("reset_command_pool")?;
            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                ..Default::default()
            };
            self.device
                .begin_command_buffer(self.cmd, &begin)
                .context("begin_command_buffer")?;
        }

        record(&self.device, self.cmd)?;

        unsafe {
            self.device
                .end_command_buffer(self.cmd)
                .context("end_command_buffer")?;
        }
        self.list.close()?;

        let cmd_info = vk::CommandBufferSubmitInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_SUBMIT_INFO,
            command_buffer: self.cmd,
            ..Default::default()
        };
        let wait = sync.wait.map(|(semaphore, stage_mask)| vk::SemaphoreSubmitInfo {
            s_type: vk::StructureType::SEMAPHORE_SUBMIT_INFO,
            semaphore,
            stage_mask,
            ..Default::default()
        });
        let signal = sync.signal.map(|semaphore| vk::SemaphoreSubmitInfo {
            s_type: vk::StructureType::SEMAPHORE_SUBMIT_INFO,
            semaphore,
            stage_mask: vk::PipelineStageFlags2::ALL_COMMANDS,
            ..Default::default()
        });
        let submit = vk::SubmitInfo2 {
            s_type: vk::StructureType::SUBMIT_INFO_2,
            wait_semaphore_info_count: u32::from(wait.is_some()),
            p_wait_semaphore_infos: wait.as_ref().map_or(std::ptr::null(), |w| w as *const _),
            command_buffer_info_count: 1,
            p_command_buffer_infos: &cmd_info,
            signal_semaphore_info_count: u32::from(signal.is_some()),
            p_signal_semaphore_infos: signal.as_ref().map_or(std::ptr::null(), |s| s as *const _),
            ..Default::default()
        };
        unsafe {
            self.device
                .queue_submit2(self.queue, std::slice::from_ref(&submit), vk::Fence::null())
                .context("queue_submit2")?;
        }

        // The next flush is the one that covers this batch.
        self.list.submitted(self.fence.target() + 1)?;
        Ok(())
    }

    /// Signal a fresh fence value behind all enqueued work and block until it is reached.
    pub fn flush(&mut self) -> Result<u64> {
        self.fence.flush()
    }

    // STRICT TEARDOWN ORDER:
    // - timeline semaphore and command buffer/pool BEFORE device
    // - device BEFORE surface
    // - debug messenger and surface BEFORE instance; instance last
    pub(crate) unsafe fn destroy(&mut self) {
        let d = &self.device;
        d.destroy_semaphore(self.fence.signal().semaphore, None);
        d.free_command_buffers(self.cmd_pool, std::slice::from_ref(&self.cmd));
        d.destroy_command_pool(self.cmd_pool, None);
        d.destroy_device(None);

        self.surface_loader.destroy_surface(self.surface, None);
        if let Some(dbg) = self.debug.take() {
            dbg.loader
                .destroy_debug_utils_messenger(dbg.messenger, None);
        }
        self.instance.destroy_instance(None);
    }
}
