//! GPU texture allocation: spec §3's "Texture" data model.
//!
//! Grounded in `eclale_graphics/src/vulkan/resource.rs`'s `ImageDescriptor`/
//! `SamplerDescriptor` builders; resize is destroy-and-recreate, as spec
//! requires, so callers must refresh any descriptor-set binding that
//! referenced the old image/sampler pair.

use std::sync::Arc;

use anyhow::Result;
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

use crate::device::DeviceShared;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimensionality {
    D1,
    D2,
    D3,
}

#[derive(Debug, Clone, Copy)]
pub struct TextureDescriptor {
    pub dims: Dimensionality,
    pub shape: [u32; 3],
    pub format: vk::Format,
    pub filter_min: vk::Filter,
    pub filter_mag: vk::Filter,
    pub address_mode: [vk::SamplerAddressMode; 3],
}

impl TextureDescriptor {
    pub fn new_2d(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            dims: Dimensionality::D2,
            shape: [width, height, 1],
            format,
            filter_min: vk::Filter::LINEAR,
            filter_mag: vk::Filter::LINEAR,
            address_mode: [vk::SamplerAddressMode::CLAMP_TO_EDGE; 3],
        }
    }

    /// Bytes per texel for the formats this runtime's textures and
    /// colormaps actually use.
    pub fn texel_size(&self) -> u64 {
        match self.format {
            vk::Format::R8_UNORM | vk::Format::R8_UINT | vk::Format::R8_SRGB => 1,
            vk::Format::R8G8_UNORM => 2,
            vk::Format::R8G8B8A8_UNORM
            | vk::Format::R8G8B8A8_SRGB
            | vk::Format::B8G8R8A8_UNORM
            | vk::Format::B8G8R8A8_SRGB
            | vk::Format::R32_SFLOAT => 4,
            vk::Format::R32G32_SFLOAT => 8,
            vk::Format::R32G32B32_SFLOAT => 12,
            vk::Format::R32G32B32A32_SFLOAT => 16,
            other => panic!("texel_size: unsupported format {other:?}"),
        }
    }
}

pub struct Texture {
    shared: Arc<DeviceShared>,
    desc: TextureDescriptor,
    image: vk::Image,
    allocation: Option<Allocation>,
    view: vk::ImageView,
    sampler: vk::Sampler,
    pub layout: vk::ImageLayout,
}

impl Texture {
    pub fn new(shared: Arc<DeviceShared>, desc: TextureDescriptor) -> Result<Self> {
        let (image, allocation) = Self::create_image(&shared, &desc)?;
        let view = Self::create_view(&shared, image, &desc)?;
        let sampler = Self::create_sampler(&shared, &desc)?;
        Ok(Self {
            shared,
            desc,
            image,
            allocation: Some(allocation),
            view,
            sampler,
            layout: vk::ImageLayout::UNDEFINED,
        })
    }

    fn create_image(
        shared: &DeviceShared,
        desc: &TextureDescriptor,
    ) -> Result<(vk::Image, Allocation)> {
        let image_type = match desc.dims {
            Dimensionality::D1 => vk::ImageType::TYPE_1D,
            Dimensionality::D2 => vk::ImageType::TYPE_2D,
            Dimensionality::D3 => vk::ImageType::TYPE_3D,
        };
        let image_info = vk::ImageCreateInfo::default()
            .image_type(image_type)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.shape[0],
                height: desc.shape[1],
                depth: desc.shape[2],
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe { shared.raw.create_image(&image_info, None)? };
        let requirements = unsafe { shared.raw.get_image_memory_requirements(image) };
        let allocation = shared.allocator.lock().allocate(&AllocationCreateDesc {
            name: "lumen_texture",
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        unsafe {
            shared
                .raw
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }
        Ok((image, allocation))
    }

    fn create_view(
        shared: &DeviceShared,
        image: vk::Image,
        desc: &TextureDescriptor,
    ) -> Result<vk::ImageView> {
        let view_type = match desc.dims {
            Dimensionality::D1 => vk::ImageViewType::TYPE_1D,
            Dimensionality::D2 => vk::ImageViewType::TYPE_2D,
            Dimensionality::D3 => vk::ImageViewType::TYPE_3D,
        };
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(view_type)
            .format(desc.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        Ok(unsafe { shared.raw.create_image_view(&view_info, None)? })
    }

    fn create_sampler(shared: &DeviceShared, desc: &TextureDescriptor) -> Result<vk::Sampler> {
        let sampler_info = vk::SamplerCreateInfo::default()
            .min_filter(desc.filter_min)
            .mag_filter(desc.filter_mag)
            .address_mode_u(desc.address_mode[0])
            .address_mode_v(desc.address_mode[1])
            .address_mode_w(desc.address_mode[2]);
        Ok(unsafe { shared.raw.create_sampler(&sampler_info, None)? })
    }

    /// Destroys and recreates the underlying image/view/sampler at a new
    /// shape. Any descriptor set bound to the old `view`/`sampler` must be
    /// refreshed by the caller after this returns.
    pub fn resize(&mut self, shape: [u32; 3]) -> Result<()> {
        self.destroy_gpu_objects();
        self.desc.shape = shape;
        let (image, allocation) = Self::create_image(&self.shared, &self.desc)?;
        self.image = image;
        self.allocation = Some(allocation);
        self.view = Self::create_view(&self.shared, self.image, &self.desc)?;
        self.sampler = Self::create_sampler(&self.shared, &self.desc)?;
        self.layout = vk::ImageLayout::UNDEFINED;
        Ok(())
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    pub fn image(&self) -> vk::Image {
        self.image
    }

    pub fn extent(&self) -> vk::Extent3D {
        vk::Extent3D {
            width: self.desc.shape[0],
            height: self.desc.shape[1],
            depth: self.desc.shape[2],
        }
    }

    /// Total texture byte size (`shape[0]*shape[1]*shape[2]*texel_size`),
    /// the expected length of an `upload`/`download` payload.
    pub fn byte_size(&self) -> u64 {
        self.desc.texel_size()
            * self.desc.shape[0] as u64
            * self.desc.shape[1] as u64
            * self.desc.shape[2] as u64
    }

    fn destroy_gpu_objects(&mut self) {
        unsafe {
            self.shared.raw.destroy_sampler(self.sampler, None);
            self.shared.raw.destroy_image_view(self.view, None);
            self.shared.raw.destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take() {
            let _ = self.shared.allocator.lock().free(allocation);
        }
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.destroy_gpu_objects();
    }
}
