//! render_core 演示程序
//!
//! 按配置选择后端并驱动设备的帧循环。
//!
//! # 使用方法
//!
//! ```bash
//! # 使用配置文件
//! cargo run
//!
//! # 模拟 GPU，运行 600 帧
//! cargo run -- --headless --frames 600
//!
//! # 使用 DirectX 12（仅 Windows）
//! cargo run -- --dx12 --vsync
//! ```
//!
//! 模拟 GPU 模式下，一个后台线程按 `headless.gpu_latency_ms` 的节奏完成已提交的帧，
//! 演示环形缓冲在 GPU 落后时的阻塞行为。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, error, info};

use render_core::core::{log, BackendKind, Config, DeviceError};
use render_core::gfx::headless::{HeadlessBackend, HeadlessGpu, HeadlessSurface};
use render_core::gfx::GraphicsBackend;
use render_core::renderer::{DescriptorHeapKind, Device, PresentOutcome};

fn main() -> Result<()> {
    // 1. 加载配置（在初始化日志之前）
    let mut config = Config::from_file_or_default("config.toml");

    // 2. 应用命令行参数
    config.apply_args(std::env::args());

    // 3. 验证配置
    config.validate().context("Invalid configuration")?;

    // 4. 初始化日志系统
    let log_file = config
        .logging
        .file_output
        .then_some(config.logging.log_file.as_str());
    log::init_logger(config.logging.level, config.logging.file_output, log_file);
    info!(version = env!("CARGO_PKG_VERSION"), "render_core starting...");
    info!(
        backend = config.device.backend.name(),
        width = config.window.width,
        height = config.window.height,
        buffers = config.device.swap_chain_buffers,
        vsync = config.device.vsync,
        "Device configuration"
    );

    let result = match config.device.backend {
        BackendKind::Headless => run_headless(&config),
        BackendKind::Dx12 => run_windowed(&config),
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

/// 帧颜色随帧号缓慢变化
fn clear_color(frame: u64) -> [f32; 4] {
    let t = (frame % 240) as f32 / 240.0;
    [0.1 + 0.4 * t, 0.2, 0.5 - 0.3 * t, 1.0]
}

/// 录制一帧（清除颜色和深度）并呈现
fn render_frame<B: GraphicsBackend>(device: &mut Device<B>) -> std::result::Result<PresentOutcome, DeviceError> {
    let color = clear_color(device.frame_count());
    {
        let mut ctx = device.render_context()?;
        let target = ctx.target();
        ctx.clear_color(target, color)?;
        ctx.clear_depth(target, 1.0, 0)?;
    }
    device.present()
}

fn log_heap_usage<B: GraphicsBackend>(device: &Device<B>) {
    for kind in DescriptorHeapKind::ALL {
        let stats = device.heap(kind).stats();
        debug!(
            heap = %stats.kind,
            used = stats.used,
            capacity = stats.capacity,
            usage = format!("{:.1}%", stats.usage_ratio * 100.0),
            "Descriptor heap usage"
        );
    }
}

fn run_headless(config: &Config) -> Result<()> {
    let gpu = HeadlessGpu::new();
    gpu.set_auto_complete(false);

    let surface = HeadlessSurface::new(config.window.width, config.window.height);
    let mut device = Device::<HeadlessBackend>::create(gpu.clone(), &surface, config.device_desc())
        .context("Failed to create headless device")?;

    // 模拟 GPU：按固定延迟完成已提交的工作
    let running = Arc::new(AtomicBool::new(true));
    let worker = {
        let gpu = gpu.clone();
        let running = Arc::clone(&running);
        let latency = Duration::from_millis(config.headless.gpu_latency_ms);
        thread::Builder::new()
            .name("simulated-gpu".to_string())
            .spawn(move || {
                while running.load(Ordering::Acquire) {
                    thread::sleep(latency);
                    gpu.complete_all();
                }
                gpu.complete_all();
            })
            .context("Failed to spawn simulated GPU thread")?
    };

    let start = Instant::now();
    let mut skipped = 0u64;
    let mut outcome = Ok(());
    for frame in 0..config.headless.frames {
        // 中途模拟一次窗口调整大小
        if frame == config.headless.frames / 2 {
            let (width, height) = (config.window.width / 2 + 1, config.window.height / 2 + 1);
            if let Err(e) = device.resize_swap_chain(width, height) {
                outcome = Err(e).context("Swap chain resize failed");
                break;
            }
            info!(width, height, "Simulated window resize");
        }

        match render_frame(&mut device) {
            Ok(PresentOutcome::Presented { frame }) => {
                if frame % 60 == 0 {
                    debug!(
                        frame,
                        completed = device.fence().completed_value(),
                        in_flight_bytes = device.resource_allocator().in_flight(),
                        "Frame stats"
                    );
                }
            }
            Ok(PresentOutcome::Skipped) => skipped += 1,
            Err(e) => {
                outcome = Err(e).context("Frame submission failed");
                break;
            }
        }
    }

    let flushed = device.flush();
    log_heap_usage(&device);

    let elapsed = start.elapsed();
    info!(
        frames = device.frame_count(),
        skipped,
        elapsed_ms = elapsed.as_millis() as u64,
        fps = format!("{:.1}", device.frame_count() as f64 / elapsed.as_secs_f64().max(f64::EPSILON)),
        "Headless run finished"
    );
    drop(device);

    running.store(false, Ordering::Release);
    if worker.join().is_err() {
        error!("Simulated GPU thread panicked");
    }

    outcome?;
    flushed.context("Failed to flush GPU work")?;
    Ok(())
}

#[cfg(target_os = "windows")]
fn run_windowed(config: &Config) -> Result<()> {
    use render_core::gfx::dx12::{Dx12Backend, Dx12Options};
    use winit::dpi::LogicalSize;
    use winit::event::{Event, WindowEvent};
    use winit::event_loop::{ControlFlow, EventLoop};
    use winit::window::WindowBuilder;

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let window = WindowBuilder::new()
        .with_title(format!("{} [{}]", config.window.title, config.device.backend.name()))
        .with_inner_size(LogicalSize::new(config.window.width, config.window.height))
        .build(&event_loop)
        .context("Failed to create window")?;

    let mut device = Device::<Dx12Backend>::create(Dx12Options::default(), &window, config.device_desc())
        .context("Failed to create DirectX 12 device")?;
    info!("Entering main loop...");

    let mut failure: Option<DeviceError> = None;
    event_loop
        .run(|event, elwt| {
            elwt.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::CloseRequested => {
                        info!("Close requested, shutting down...");
                        elwt.exit();
                    }
                    WindowEvent::Resized(size) => {
                        // 最小化时大小为 0，跳过
                        if size.width == 0 || size.height == 0 {
                            return;
                        }
                        debug!(width = size.width, height = size.height, "Window resized");
                        if let Err(e) = device.resize_swap_chain(size.width, size.height) {
                            failure = Some(e);
                            elwt.exit();
                        }
                    }
                    WindowEvent::RedrawRequested => {
                        if device.is_window_occluded() {
                            thread::sleep(Duration::from_millis(16));
                            return;
                        }
                        if let Err(e) = render_frame(&mut device) {
                            failure = Some(e);
                            elwt.exit();
                        }
                    }
                    _ => {}
                },
                Event::AboutToWait => window.request_redraw(),
                _ => {}
            }
        })
        .context("Event loop terminated abnormally")?;

    log_heap_usage(&device);
    match failure {
        Some(e) => Err(e).context("Device failure"),
        None => Ok(()),
    }
}

#[cfg(not(target_os = "windows"))]
fn run_windowed(_config: &Config) -> Result<()> {
    anyhow::bail!("The DirectX 12 backend is only available on Windows; run with --headless")
}
