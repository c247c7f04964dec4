/// Orbit demo - a ring of tinted triangles driven by the frame loop
///
/// One host-visible vertex buffer holds the triangle, a uniform buffer holds
/// scene data (set 0) and a multi-instance uniform buffer holds one
/// transform and one color per triangle (set 1, dynamic offsets).
///
/// Shaders are loaded from `shaders/*.spv`; compile them first:
///
/// ```text
/// glslc shaders/triangle.vert -o shaders/triangle.vert.spv
/// glslc shaders/triangle.frag -o shaders/triangle.frag.spv
/// ```

use std::sync::{Arc, Mutex};
use std::time::Instant;

use glam::{Vec2, Vec4};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use orbit_render::orbit::{AllocatorHost, Engine, Error, Result};
use orbit_render::orbit::buffer::{
    share, HostVisibleVertexBuffer, InstanceDataSet, MultiInstanceUniformBuffer,
    MultiInstanceUniformBufferDesc, SharedUniformData, StructUniformData, SyncedBuffer,
    UniformBuffer, UniformDataLayout, UniformDataLayoutSet,
};
use orbit_render::orbit::device::{BufferFormat, ShaderStageFlags, VertexAttribute};
use orbit_render::orbit::frame::{FrameLoop, FrameLoopConfig};
use orbit_render::orbit::log::LogSeverity;
use orbit_render::{engine_error, engine_info, engine_warn};
use orbit_render_vulkan::orbit::{Config, PipelineConfig, ShaderCache, VulkanDevice, VulkanFrameBackend};

const INSTANCE_COUNT: u32 = 6;
const SHADER_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/shaders");

// ===== GPU DATA =====

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 2],
    color: [f32; 3],
}

const TRIANGLE: [Vertex; 3] = [
    Vertex { position: [0.0, -0.5], color: [1.0, 0.2, 0.2] },
    Vertex { position: [0.5, 0.5], color: [0.2, 1.0, 0.2] },
    Vertex { position: [-0.5, 0.5], color: [0.2, 0.2, 1.0] },
];

/// Set 0, binding 0
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct SceneUniforms {
    /// Global color multiplier
    tint: Vec4,
    /// x: aspect ratio, y: seconds since start
    params: Vec4,
}

/// Set 1, binding 0
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct InstanceTransform {
    /// xy: offset, z: scale, w: rotation in radians
    offset_scale_rotation: Vec4,
}

/// Set 1, binding 1
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct InstanceColor {
    color: Vec4,
}

fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        vertex_shader: "triangle.vert".to_string(),
        fragment_shader: "triangle.frag".to_string(),
        vertex_stride: std::mem::size_of::<Vertex>() as u32,
        vertex_attributes: vec![
            VertexAttribute { location: 0, format: BufferFormat::R32G32_SFLOAT, offset: 0 },
            VertexAttribute { location: 1, format: BufferFormat::R32G32B32_SFLOAT, offset: 8 },
        ],
        clear_color: [0.02, 0.02, 0.05, 1.0],
    }
}

fn load_shader(shaders: &mut ShaderCache, key: &str) -> Result<()> {
    let path = format!("{}/{}.spv", SHADER_DIR, key);
    let bytes = std::fs::read(&path).map_err(|e| {
        engine_error!("orbit::demo", "Cannot read shader '{}': {}", path, e);
        Error::InitializationFailed(format!("Missing shader binary {} (run glslc first)", path))
    })?;
    shaders.insert_spirv_bytes(key, &bytes)
}

// ===== DEMO STATE =====

struct Demo {
    frame_loop: FrameLoop<VulkanFrameBackend>,
    vertices: Arc<Mutex<HostVisibleVertexBuffer<Vertex>>>,
    scene: Arc<Mutex<UniformBuffer<SceneUniforms>>>,
    instances: Arc<Mutex<MultiInstanceUniformBuffer>>,
    transforms: Vec<Arc<Mutex<StructUniformData<InstanceTransform>>>>,
    start: Instant,
    _host: AllocatorHost,
    _device: Arc<VulkanDevice>,
}

impl Demo {
    fn new(window: &Window) -> Result<Self> {
        let config = Config {
            app_name: "Orbit Demo".to_string(),
            ..Config::default()
        };
        let device = Arc::new(VulkanDevice::new(window, config)?);
        let mut host = AllocatorHost::new();
        let context = host.device_context(device.clone())?;

        let mut shaders = ShaderCache::new(device.context().clone());
        load_shader(&mut shaders, "triangle.vert")?;
        load_shader(&mut shaders, "triangle.frag")?;

        let size = window.inner_size();
        let backend = VulkanFrameBackend::new(&device, pipeline_config(), shaders, (size.width, size.height))?;
        let mut frame_loop = FrameLoop::new(backend, FrameLoopConfig::default());

        let vertices = HostVisibleVertexBuffer::new(context.clone(), "triangle", TRIANGLE.to_vec())?;
        let mut scene = UniformBuffer::new(
            context.clone(),
            "scene",
            SceneUniforms {
                tint: Vec4::ONE,
                params: Vec4::new(aspect_ratio(size), 0.0, 0.0, 0.0),
            },
            0,
            ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT,
        );

        let layouts = UniformDataLayoutSet::new()
            .with(0, UniformDataLayout::from_size(std::mem::size_of::<InstanceTransform>() as u64))
            .with(1, UniformDataLayout::from_size(std::mem::size_of::<InstanceColor>() as u64));
        let mut desc = MultiInstanceUniformBufferDesc::new("instances", layouts);
        desc.capacity_hint = Some(INSTANCE_COUNT);
        let mut instances = MultiInstanceUniformBuffer::new(context.clone(), desc)?;

        let mut transforms = Vec::new();
        for i in 0..INSTANCE_COUNT {
            let transform = Arc::new(Mutex::new(StructUniformData::new(InstanceTransform {
                offset_scale_rotation: Vec4::ZERO,
            })));
            let hue = i as f32 / INSTANCE_COUNT as f32;
            let color = StructUniformData::new(InstanceColor { color: hue_to_rgba(hue) });

            let shared_transform: SharedUniformData = transform.clone();
            let data: InstanceDataSet = [
                (0u32, shared_transform),
                (1u32, share(color)),
            ]
            .into_iter()
            .collect();
            instances.push_back_instance_with(data)?;
            transforms.push(transform);
        }

        // Descriptors must exist before the first pipeline is built
        scene.update_device()?;
        instances.update_device()?;

        let vertices = Arc::new(Mutex::new(vertices));
        let scene = Arc::new(Mutex::new(scene));
        let instances = Arc::new(Mutex::new(instances));
        frame_loop.bind_buffer(vertices.clone());
        frame_loop.bind_buffer(scene.clone());
        frame_loop.bind_buffer(instances.clone());
        frame_loop.initialize()?;

        Ok(Self {
            frame_loop,
            vertices,
            scene,
            instances,
            transforms,
            start: Instant::now(),
            _host: host,
            _device: device,
        })
    }

    fn resize(&mut self, size: PhysicalSize<u32>) -> Result<()> {
        self.frame_loop.backend_mut().set_window_extent(size.width, size.height);
        self.frame_loop.request_resize();
        lock(&self.scene)?.uniform_data_mut().params.x = aspect_ratio(size);
        Ok(())
    }

    fn animate(&mut self) -> Result<()> {
        let seconds = self.start.elapsed().as_secs_f32();
        lock(&self.scene)?.uniform_data_mut().params.y = seconds;

        for (i, transform) in self.transforms.iter().enumerate() {
            let angle = seconds * 0.5 + i as f32 * std::f32::consts::TAU / INSTANCE_COUNT as f32;
            let offset = Vec2::from_angle(angle) * 0.6;
            lock(transform)?.set(InstanceTransform {
                offset_scale_rotation: Vec4::new(offset.x, offset.y, 0.25, -seconds),
            });
        }
        Ok(())
    }

    fn draw(&mut self) -> Result<()> {
        self.animate()?;

        let vertices = self.vertices.clone();
        let instances = self.instances.clone();
        self.frame_loop.draw_frame(|cmd, _frame| {
            let (vertex_buffer, vertex_count) = {
                let vertices = lock(&vertices)?;
                let buffer = vertices
                    .device_buffer()
                    .ok_or_else(|| Error::InvalidResource("triangle vertices not uploaded".to_string()))?;
                (buffer, vertices.vertex_count())
            };
            let instances = lock(&instances)?;

            cmd.bind_vertex_buffer(0, vertex_buffer, 0)?;
            cmd.bind_uniform_set(0, &[])?;
            for i in 0..instances.instance_count() {
                cmd.bind_uniform_set(1, &instances.dynamic_offsets(i))?;
                cmd.draw(vertex_count, 1, 0, 0)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.frame_loop.shutdown()?;
        lock(&self.instances)?.free_and_reset()?;
        lock(&self.scene)?.free_and_reset()?;
        lock(&self.vertices)?.free_and_reset()?;

        let stats = self.frame_loop.stats();
        engine_info!(
            "orbit::demo",
            "Presented {} frames ({} rebuilds, {} present failures)",
            stats.frames_presented, stats.rebuilds, stats.present_failures
        );
        Ok(())
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| Error::BackendError("demo state lock poisoned".to_string()))
}

fn aspect_ratio(size: PhysicalSize<u32>) -> f32 {
    size.width.max(1) as f32 / size.height.max(1) as f32
}

fn hue_to_rgba(hue: f32) -> Vec4 {
    let rgb = (Vec4::new(0.0, 2.0 / 3.0, 1.0 / 3.0, 0.0) + hue) * std::f32::consts::TAU;
    Vec4::new(
        0.5 + 0.5 * rgb.x.cos(),
        0.5 + 0.5 * rgb.y.cos(),
        0.5 + 0.5 * rgb.z.cos(),
        1.0,
    )
}

// ===== WINDOW LOOP =====

#[derive(Default)]
struct App {
    window: Option<Window>,
    demo: Option<Demo>,
    minimized: bool,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title("Orbit Demo")
            .with_inner_size(PhysicalSize::new(1024, 768));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => window,
            Err(e) => {
                engine_error!("orbit::demo", "Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match Demo::new(&window) {
            Ok(demo) => self.demo = Some(demo),
            Err(e) => {
                engine_error!("orbit::demo", "Failed to initialize demo: {}", e);
                event_loop.exit();
                return;
            }
        }
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(demo) = self.demo.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                self.minimized = size.width == 0 || size.height == 0;
                if !self.minimized {
                    if let Err(e) = demo.resize(size) {
                        engine_error!("orbit::demo", "Resize failed: {}", e);
                        event_loop.exit();
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                if self.minimized {
                    return;
                }
                if let Err(e) = demo.draw() {
                    engine_error!("orbit::demo", "Frame failed: {}", e);
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut demo) = self.demo.take() {
            if let Err(e) = demo.shutdown() {
                engine_warn!("orbit::demo", "Shutdown incomplete: {}", e);
            }
        }
    }
}

fn main() {
    Engine::set_min_severity(if cfg!(debug_assertions) { LogSeverity::Debug } else { LogSeverity::Info });

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            engine_error!("orbit::demo", "Failed to create event loop: {}", e);
            std::process::exit(1);
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::default();
    if let Err(e) = event_loop.run_app(&mut app) {
        engine_error!("orbit::demo", "Event loop error: {}", e);
        std::process::exit(1);
    }
}
