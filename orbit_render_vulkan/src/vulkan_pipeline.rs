/// Render pass and graphics pipeline for the single color pass
///
/// Both depend on swapchain state (format, image count via framebuffers)
/// and are rebuilt by the frame backend during the rebuild cascade.

use ash::vk::{self, Handle};
use orbit_render::orbit::{Error, Result};
use orbit_render::orbit::device::{UniformDescriptor, VertexAttribute};
use orbit_render::{engine_err, engine_error};

use crate::vulkan_format::buffer_format_to_vk;
use crate::vulkan_shader::ShaderCache;

/// Fixed-function setup of the pipeline the frame backend builds
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// ShaderCache key of the vertex shader
    pub vertex_shader: String,
    /// ShaderCache key of the fragment shader
    pub fragment_shader: String,
    /// Byte stride of one vertex in binding 0
    pub vertex_stride: u32,
    pub vertex_attributes: Vec<VertexAttribute>,
    /// RGBA clear color of the color attachment
    pub clear_color: [f32; 4],
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vertex_shader: "main.vert".to_string(),
            fragment_shader: "main.frag".to_string(),
            vertex_stride: 0,
            vertex_attributes: Vec::new(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Single-subpass render pass clearing and presenting one color attachment
pub(crate) fn create_render_pass(device: &ash::Device, format: vk::Format) -> Result<vk::RenderPass> {
    let attachment = vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    let color_attachment_ref = vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    let subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(std::slice::from_ref(&color_attachment_ref));

    // Wait for the acquire semaphore (signaled at COLOR_ATTACHMENT_OUTPUT)
    let dependency = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

    let render_pass_info = vk::RenderPassCreateInfo::default()
        .attachments(std::slice::from_ref(&attachment))
        .subpasses(std::slice::from_ref(&subpass))
        .dependencies(std::slice::from_ref(&dependency));

    unsafe { device.create_render_pass(&render_pass_info, None) }
        .map_err(|e| engine_err!("orbit::vulkan", "Failed to create render pass: {:?}", e))
}

/// Vulkan pipeline plus its layout
pub(crate) struct Pipeline {
    pub(crate) pipeline: vk::Pipeline,
    /// Set layouts follow the order of the uniform descriptors
    pub(crate) pipeline_layout: vk::PipelineLayout,
}

impl Pipeline {
    pub(crate) fn new(
        device: &ash::Device,
        render_pass: vk::RenderPass,
        config: &PipelineConfig,
        shaders: &ShaderCache,
        descriptors: &[UniformDescriptor],
    ) -> Result<Self> {
        let vertex_module = shaders.get(&config.vertex_shader).ok_or_else(|| {
            engine_error!("orbit::vulkan", "Vertex shader '{}' is not in the shader cache", config.vertex_shader);
            Error::InvalidResource(format!("Unknown vertex shader '{}'", config.vertex_shader))
        })?;
        let fragment_module = shaders.get(&config.fragment_shader).ok_or_else(|| {
            engine_error!("orbit::vulkan", "Fragment shader '{}' is not in the shader cache", config.fragment_shader);
            Error::InvalidResource(format!("Unknown fragment shader '{}'", config.fragment_shader))
        })?;

        unsafe {
            let shader_stages = [
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(vk::ShaderStageFlags::VERTEX)
                    .module(vertex_module)
                    .name(c"main"),
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(vk::ShaderStageFlags::FRAGMENT)
                    .module(fragment_module)
                    .name(c"main"),
            ];

            // Vertex input state (one interleaved binding)
            let vertex_bindings = if config.vertex_stride > 0 {
                vec![vk::VertexInputBindingDescription {
                    binding: 0,
                    stride: config.vertex_stride,
                    input_rate: vk::VertexInputRate::VERTEX,
                }]
            } else {
                Vec::new()
            };

            let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = config.vertex_attributes
                .iter()
                .map(|attribute| vk::VertexInputAttributeDescription {
                    location: attribute.location,
                    binding: 0,
                    format: buffer_format_to_vk(attribute.format),
                    offset: attribute.offset,
                })
                .collect();

            let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
                .vertex_binding_descriptions(&vertex_bindings)
                .vertex_attribute_descriptions(&vertex_attributes);

            let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
                .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
                .primitive_restart_enable(false);

            // Viewport state (dynamic)
            let viewports = [vk::Viewport::default()];
            let scissors = [vk::Rect2D::default()];
            let viewport_state = vk::PipelineViewportStateCreateInfo::default()
                .viewports(&viewports)
                .scissors(&scissors);

            let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
                .depth_clamp_enable(false)
                .rasterizer_discard_enable(false)
                .polygon_mode(vk::PolygonMode::FILL)
                .line_width(1.0)
                .cull_mode(vk::CullModeFlags::NONE)
                .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
                .depth_bias_enable(false);

            let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
                .sample_shading_enable(false)
                .rasterization_samples(vk::SampleCountFlags::TYPE_1);

            let color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(false);

            let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
                .logic_op_enable(false)
                .attachments(std::slice::from_ref(&color_blend_attachment));

            let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
            let dynamic_state = vk::PipelineDynamicStateCreateInfo::default()
                .dynamic_states(&dynamic_states);

            let set_layouts: Vec<vk::DescriptorSetLayout> = descriptors
                .iter()
                .map(|descriptor| vk::DescriptorSetLayout::from_raw(descriptor.layout.0))
                .collect();

            let layout_create_info = vk::PipelineLayoutCreateInfo::default()
                .set_layouts(&set_layouts);

            let pipeline_layout = device.create_pipeline_layout(&layout_create_info, None)
                .map_err(|e| engine_err!("orbit::vulkan", "Failed to create pipeline layout: {:?}", e))?;

            let pipeline_create_info = vk::GraphicsPipelineCreateInfo::default()
                .stages(&shader_stages)
                .vertex_input_state(&vertex_input_state)
                .input_assembly_state(&input_assembly_state)
                .viewport_state(&viewport_state)
                .rasterization_state(&rasterization_state)
                .multisample_state(&multisample_state)
                .color_blend_state(&color_blend_state)
                .dynamic_state(&dynamic_state)
                .layout(pipeline_layout)
                .render_pass(render_pass)
                .subpass(0);

            let pipelines = match device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(&pipeline_create_info),
                None,
            ) {
                Ok(pipelines) => pipelines,
                Err((_, e)) => {
                    device.destroy_pipeline_layout(pipeline_layout, None);
                    return Err(engine_err!("orbit::vulkan", "Failed to create graphics pipeline: {:?}", e));
                }
            };

            Ok(Self {
                pipeline: pipelines[0],
                pipeline_layout,
            })
        }
    }

    pub(crate) fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.pipeline_layout, None);
        }
    }
}
