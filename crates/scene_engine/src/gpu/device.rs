//! Physical device selection, logical device, and the graphics context
//!
//! [`Device`] owns the instance, the presentation surface and the logical
//! device. Components never hold a `Device`; they receive a
//! [`GraphicsContext`] by reference and clone the handles they need to
//! release their own objects.

use ash::extensions::khr::{PushDescriptor, Surface, Swapchain as SwapchainLoader};
use ash::{vk, Instance};
use std::ffi::CStr;

use super::error::{VulkanError, VulkanResult};
use super::instance::{SurfaceProvider, VulkanInstance};

/// Handles every GPU component needs to create and destroy its objects
#[derive(Clone)]
pub struct GraphicsContext {
    /// Logical device
    pub device: ash::Device,
    /// Instance the device was created from
    pub instance: Instance,
    /// Selected adapter
    pub physical_device: vk::PhysicalDevice,
    /// Memory heaps/types of the adapter
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family used for graphics, transfer and present
    pub queue_family_index: u32,
    /// `VK_KHR_push_descriptor` entry points
    pub push_descriptor: PushDescriptor,
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Queue family supporting graphics and presentation
    pub queue_family_index: u32,
    /// Present modes offered for the surface
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl PhysicalDeviceInfo {
    /// Device extensions the renderer cannot run without
    #[must_use]
    pub fn required_extensions() -> [&'static CStr; 2] {
        [SwapchainLoader::name(), PushDescriptor::name()]
    }

    /// Select the best suitable adapter for `surface`
    pub fn select(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };

        let mut best: Option<(u32, Self)> = None;
        for device in devices {
            match Self::evaluate_device(instance, device, surface, surface_loader) {
                Ok(info) => {
                    let score = device_type_score(info.properties.device_type);
                    if best.as_ref().map_or(true, |(best_score, _)| score > *best_score) {
                        best = Some((score, info));
                    }
                }
                Err(e) => log::debug!("Skipping adapter: {}", e),
            }
        }

        let (_, info) = best.ok_or_else(|| {
            VulkanError::InitializationFailed("No suitable GPU found".to_string())
        })?;
        log::info!("Selected GPU: {}", info.name());
        Ok(info)
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        if properties.api_version < vk::API_VERSION_1_3 {
            return Err(VulkanError::InitializationFailed(
                "Vulkan 1.3 not supported".to_string(),
            ));
        }

        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };
        let mut present_support = Vec::with_capacity(queue_families.len());
        for index in 0..queue_families.len() as u32 {
            let supported = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, index, surface)
                    .map_err(VulkanError::Api)?
            };
            present_support.push(supported);
        }
        let queue_family_index = find_queue_family(&queue_families, &present_support)
            .ok_or_else(|| {
                VulkanError::InitializationFailed(
                    "No queue family with graphics and present support".to_string(),
                )
            })?;

        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };
        let has_required_extensions = Self::required_extensions().iter().all(|required| {
            extensions.iter().any(|available| {
                let name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
                name == *required
            })
        });
        if !has_required_extensions {
            return Err(VulkanError::InitializationFailed(
                "Required device extensions not supported".to_string(),
            ));
        }

        let mut features12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
        {
            let mut features2 = vk::PhysicalDeviceFeatures2::builder()
                .push_next(&mut features12)
                .push_next(&mut features13);
            unsafe { instance.get_physical_device_features2(device, &mut features2) };
        }
        if features12.timeline_semaphore != vk::TRUE || features13.dynamic_rendering != vk::TRUE {
            return Err(VulkanError::InitializationFailed(
                "Timeline semaphores or dynamic rendering unsupported".to_string(),
            ));
        }

        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(device, surface)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            properties,
            queue_family_index,
            present_modes,
        })
    }

    /// Human-readable adapter name
    #[must_use]
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

/// First queue family that can both draw and present
#[must_use]
pub fn find_queue_family(
    families: &[vk::QueueFamilyProperties],
    present_support: &[bool],
) -> Option<u32> {
    families
        .iter()
        .zip(present_support)
        .position(|(family, &present)| {
            family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && present
        })
        .map(|index| index as u32)
}

/// Preference order between adapter kinds
#[must_use]
pub fn device_type_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 4,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    }
}

/// The GPU device, its instance and the window surface
pub struct Device {
    context: GraphicsContext,
    physical: PhysicalDeviceInfo,
    surface: vk::SurfaceKHR,
    surface_loader: Surface,
    // Dropped after the logical device and surface
    instance: VulkanInstance,
}

impl Device {
    /// Create the instance, surface and logical device for `window`
    pub fn new(
        window: &mut impl SurfaceProvider,
        app_name: &str,
        enable_validation: bool,
    ) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(&*window, app_name, enable_validation)?;
        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = window.create_surface(&instance.instance)?;

        let physical = match PhysicalDeviceInfo::select(&instance.instance, surface, &surface_loader)
        {
            Ok(physical) => physical,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };

        let device = match Self::create_logical_device(&instance.instance, &physical) {
            Ok(device) => device,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };

        let memory_properties = unsafe {
            instance
                .instance
                .get_physical_device_memory_properties(physical.device)
        };
        let push_descriptor = PushDescriptor::new(&instance.instance, &device);

        let context = GraphicsContext {
            device,
            instance: instance.instance.clone(),
            physical_device: physical.device,
            memory_properties,
            queue_family_index: physical.queue_family_index,
            push_descriptor,
        };

        log::info!(
            "Device ready (queue family {}, tearing {})",
            physical.queue_family_index,
            if physical.present_modes.contains(&vk::PresentModeKHR::IMMEDIATE) {
                "supported"
            } else {
                "unsupported"
            }
        );

        Ok(Self {
            context,
            physical,
            surface,
            surface_loader,
            instance,
        })
    }

    fn create_logical_device(
        instance: &Instance,
        physical: &PhysicalDeviceInfo,
    ) -> VulkanResult<ash::Device> {
        let priorities = [1.0];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(physical.queue_family_index)
            .queue_priorities(&priorities)
            .build()];

        let extension_names = PhysicalDeviceInfo::required_extensions().map(CStr::as_ptr);

        let mut features12 =
            vk::PhysicalDeviceVulkan12Features::builder().timeline_semaphore(true);
        let mut features13 = vk::PhysicalDeviceVulkan13Features::builder().dynamic_rendering(true);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut features12)
            .push_next(&mut features13);

        unsafe {
            instance
                .create_device(physical.device, &create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    /// Handles to pass to component constructors
    #[must_use]
    pub const fn context(&self) -> &GraphicsContext {
        &self.context
    }

    /// Selected adapter
    #[must_use]
    pub const fn physical(&self) -> &PhysicalDeviceInfo {
        &self.physical
    }

    /// Presentation surface
    #[must_use]
    pub const fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// `VK_KHR_surface` entry points
    #[must_use]
    pub const fn surface_loader(&self) -> &Surface {
        &self.surface_loader
    }

    /// Whether presentation without vertical sync is available
    #[must_use]
    pub fn supports_tearing(&self) -> bool {
        self.physical
            .present_modes
            .contains(&vk::PresentModeKHR::IMMEDIATE)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            self.context.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
        log::debug!("Device destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_queue_family_needs_graphics_and_present() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];

        assert_eq!(find_queue_family(&families, &[true, false, true]), Some(2));
        assert_eq!(find_queue_family(&families, &[true, true, true]), Some(1));
        assert_eq!(find_queue_family(&families, &[true, false, false]), None);
    }

    #[test]
    fn test_discrete_gpu_preferred() {
        assert!(
            device_type_score(vk::PhysicalDeviceType::DISCRETE_GPU)
                > device_type_score(vk::PhysicalDeviceType::INTEGRATED_GPU)
        );
        assert!(
            device_type_score(vk::PhysicalDeviceType::INTEGRATED_GPU)
                > device_type_score(vk::PhysicalDeviceType::CPU)
        );
    }
}
