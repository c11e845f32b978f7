// renderer/recording.rs - headless backend that logs every GPU side effect
use std::collections::{HashMap, HashSet};

use glam::{Mat4, UVec2};

use crate::asset::Mesh;
use crate::error::{RenderError, RenderResult};
use crate::renderer::gpu::{
    CameraPass, ClearValues, DrawCall, GpuBackend, PipelineHandle, PrimitiveHandle, ProgramHandle,
    ProgramSource, TargetDesc, TargetHandle, TextureDesc, TextureHandle,
};
use crate::renderer::pipeline::{LayerBinding, PipelineState};
use crate::renderer::uniforms::DrawUniforms;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    CompileProgram {
        program: ProgramHandle,
        label: String,
    },
    CreatePipeline {
        pipeline: PipelineHandle,
        label: String,
        state: PipelineState,
    },
    ReleasePipeline(PipelineHandle),
    CreatePrimitive {
        primitive: PrimitiveHandle,
        label: String,
    },
    ReleasePrimitive(PrimitiveHandle),
    CreateTexture(TextureHandle),
    CreateTarget {
        target: TargetHandle,
        label: String,
    },
    ResizeTarget {
        target: TargetHandle,
        size: UVec2,
    },
    BeginCamera {
        label: &'static str,
        target: Option<TargetHandle>,
        clear: Option<ClearValues>,
    },
    /// The camera below the new one on the stack stopped receiving draws.
    Suspend(&'static str),
    EndCamera(&'static str),
    /// The camera below the finished one receives draws again.
    Resume(&'static str),
    Draw {
        camera: &'static str,
        pipeline: PipelineHandle,
        primitive: PrimitiveHandle,
        modelview: Mat4,
        layers: Vec<LayerBinding>,
        shadowed: bool,
    },
    DrawFullscreen {
        camera: &'static str,
        pipeline: PipelineHandle,
        layers: Vec<LayerBinding>,
    },
}

#[derive(Debug, Clone)]
struct RecordedTarget {
    label: String,
    size: UVec2,
    color: TextureHandle,
    depth: TextureHandle,
}

/// Records commands instead of talking to a device.
///
/// Handles are handed out sequentially per kind. Program compilation can be
/// made to fail to exercise the error path of a paint.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    commands: Vec<GpuCommand>,
    cameras: Vec<CameraPass>,
    targets: Vec<RecordedTarget>,
    live_pipelines: HashSet<PipelineHandle>,
    pipeline_programs: HashMap<PipelineHandle, ProgramHandle>,
    sources: Vec<ProgramSource>,
    next_pipeline: u32,
    next_texture: u32,
    primitives: u32,
    live_primitives: HashSet<PrimitiveHandle>,
    pipelines_created: usize,
    fail_compilation: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `compile_program` fail.
    pub fn fail_compilation(&mut self, fail: bool) {
        self.fail_compilation = fail;
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn programs_compiled(&self) -> usize {
        self.sources.len()
    }

    pub fn program_source(&self, program: ProgramHandle) -> Option<&ProgramSource> {
        self.sources.get(program.index() as usize)
    }

    pub fn pipeline_program(&self, pipeline: PipelineHandle) -> Option<ProgramHandle> {
        self.pipeline_programs.get(&pipeline).copied()
    }

    pub fn pipelines_created(&self) -> usize {
        self.pipelines_created
    }

    pub fn live_pipelines(&self) -> usize {
        self.live_pipelines.len()
    }

    pub fn primitives_created(&self) -> u32 {
        self.primitives
    }

    pub fn live_primitives(&self) -> usize {
        self.live_primitives.len()
    }

    /// Labels of the active camera stack, outermost first.
    pub fn camera_stack(&self) -> Vec<&'static str> {
        self.cameras.iter().map(|c| c.label).collect()
    }

    pub fn target_label(&self, target: TargetHandle) -> Option<&str> {
        self.targets
            .get(target.index() as usize)
            .map(|t| t.label.as_str())
    }

    /// Every `Draw` recorded while `camera` was innermost, in issue order.
    pub fn draws_in(&self, camera: &str) -> Vec<&GpuCommand> {
        self.commands
            .iter()
            .filter(|c| matches!(c, GpuCommand::Draw { camera: label, .. } if *label == camera))
            .collect()
    }

    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, GpuCommand::Draw { .. }))
            .count()
    }

    pub fn fullscreen_draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, GpuCommand::DrawFullscreen { .. }))
            .count()
    }

    /// Labels of the cameras begun, in order.
    pub fn camera_labels(&self) -> Vec<&'static str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                GpuCommand::BeginCamera { label, .. } => Some(*label),
                _ => None,
            })
            .collect()
    }

    fn next_texture(&mut self) -> TextureHandle {
        let handle = TextureHandle(self.next_texture);
        self.next_texture += 1;
        handle
    }

    fn current_camera(&self, operation: &'static str) -> RenderResult<&'static str> {
        self.cameras
            .last()
            .map(|c| c.label)
            .ok_or(RenderError::NoActiveCamera(operation))
    }

    fn target(&self, target: TargetHandle) -> RenderResult<&RecordedTarget> {
        self.targets
            .get(target.index() as usize)
            .ok_or_else(|| RenderError::unknown("target", target.index()))
    }
}

impl GpuBackend for RecordingBackend {
    fn compile_program(&mut self, source: &ProgramSource) -> RenderResult<ProgramHandle> {
        if self.fail_compilation {
            return Err(RenderError::ProgramCompilation {
                label: source.label.clone(),
                message: "compilation disabled on recording backend".to_string(),
            });
        }
        let program = ProgramHandle(self.sources.len() as u32);
        self.sources.push(source.clone());
        self.commands.push(GpuCommand::CompileProgram {
            program,
            label: source.label.clone(),
        });
        Ok(program)
    }

    fn create_pipeline(
        &mut self,
        label: &str,
        state: &PipelineState,
        program: ProgramHandle,
    ) -> RenderResult<PipelineHandle> {
        if program.index() as usize >= self.sources.len() {
            return Err(RenderError::unknown("program", program.index()));
        }
        let pipeline = PipelineHandle(self.next_pipeline);
        self.next_pipeline += 1;
        self.pipelines_created += 1;
        self.live_pipelines.insert(pipeline);
        self.pipeline_programs.insert(pipeline, program);
        self.commands.push(GpuCommand::CreatePipeline {
            pipeline,
            label: label.to_string(),
            state: *state,
        });
        Ok(pipeline)
    }

    fn release_pipeline(&mut self, pipeline: PipelineHandle) {
        if self.live_pipelines.remove(&pipeline) {
            self.commands.push(GpuCommand::ReleasePipeline(pipeline));
        } else {
            log::warn!("Released unknown pipeline {:?}", pipeline);
        }
    }

    fn create_primitive(&mut self, mesh: &Mesh) -> RenderResult<PrimitiveHandle> {
        let primitive = PrimitiveHandle(self.primitives);
        self.primitives += 1;
        self.live_primitives.insert(primitive);
        self.commands.push(GpuCommand::CreatePrimitive {
            primitive,
            label: mesh.label.clone(),
        });
        Ok(primitive)
    }

    fn release_primitive(&mut self, primitive: PrimitiveHandle) {
        if self.live_primitives.remove(&primitive) {
            self.commands.push(GpuCommand::ReleasePrimitive(primitive));
        } else {
            log::warn!("Released unknown primitive {:?}", primitive);
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc, pixels: &[u8]) -> RenderResult<TextureHandle> {
        let expected = desc.width as usize * desc.height as usize * 4;
        if pixels.len() != expected {
            return Err(RenderError::TargetCreation {
                label: desc.label.clone(),
                message: format!("expected {} bytes of RGBA8, got {}", expected, pixels.len()),
            });
        }
        let texture = self.next_texture();
        self.commands.push(GpuCommand::CreateTexture(texture));
        Ok(texture)
    }

    fn create_target(&mut self, desc: &TargetDesc) -> RenderResult<TargetHandle> {
        let target = TargetHandle(self.targets.len() as u32);
        let color = self.next_texture();
        let depth = self.next_texture();
        self.targets.push(RecordedTarget {
            label: desc.label.clone(),
            size: UVec2::new(desc.width, desc.height),
            color,
            depth,
        });
        self.commands.push(GpuCommand::CreateTarget {
            target,
            label: desc.label.clone(),
        });
        Ok(target)
    }

    fn resize_target(&mut self, target: TargetHandle, width: u32, height: u32) -> RenderResult<()> {
        let size = UVec2::new(width, height);
        let recorded = self
            .targets
            .get_mut(target.index() as usize)
            .ok_or_else(|| RenderError::unknown("target", target.index()))?;
        recorded.size = size;
        self.commands.push(GpuCommand::ResizeTarget { target, size });
        Ok(())
    }

    fn target_size(&self, target: TargetHandle) -> Option<UVec2> {
        self.targets.get(target.index() as usize).map(|t| t.size)
    }

    fn target_color(&self, target: TargetHandle) -> Option<TextureHandle> {
        self.targets.get(target.index() as usize).map(|t| t.color)
    }

    fn target_depth(&self, target: TargetHandle) -> Option<TextureHandle> {
        self.targets.get(target.index() as usize).map(|t| t.depth)
    }

    fn begin_camera(&mut self, camera: &CameraPass) -> RenderResult<()> {
        if let Some(target) = camera.target {
            self.target(target)?;
        }
        if let Some(outer) = self.cameras.last() {
            self.commands.push(GpuCommand::Suspend(outer.label));
        }
        self.commands.push(GpuCommand::BeginCamera {
            label: camera.label,
            target: camera.target,
            clear: camera.clear,
        });
        self.cameras.push(camera.clone());
        Ok(())
    }

    fn end_camera(&mut self) -> RenderResult<()> {
        let finished = self
            .cameras
            .pop()
            .ok_or(RenderError::NoActiveCamera("end_camera"))?;
        self.commands.push(GpuCommand::EndCamera(finished.label));
        if let Some(outer) = self.cameras.last() {
            self.commands.push(GpuCommand::Resume(outer.label));
        }
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> RenderResult<()> {
        let camera = self.current_camera("draw")?;
        if !self.live_pipelines.contains(&call.pipeline) {
            return Err(RenderError::unknown("pipeline", call.pipeline.index()));
        }
        if !self.live_primitives.contains(&call.primitive) {
            return Err(RenderError::unknown("primitive", call.primitive.index()));
        }
        self.commands.push(GpuCommand::Draw {
            camera,
            pipeline: call.pipeline,
            primitive: call.primitive,
            modelview: call.uniforms.modelview_matrix(),
            layers: call.layers.to_vec(),
            shadowed: call.uniforms.shadow_enabled(),
        });
        Ok(())
    }

    fn draw_fullscreen(
        &mut self,
        pipeline: PipelineHandle,
        _uniforms: &DrawUniforms,
        layers: &[LayerBinding],
    ) -> RenderResult<()> {
        let camera = self.current_camera("draw_fullscreen")?;
        if !self.live_pipelines.contains(&pipeline) {
            return Err(RenderError::unknown("pipeline", pipeline.index()));
        }
        self.commands.push(GpuCommand::DrawFullscreen {
            camera,
            pipeline,
            layers: layers.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(label: &'static str) -> CameraPass {
        CameraPass {
            label,
            target: None,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            viewport: [0.0, 0.0, 16.0, 16.0],
            clear: None,
        }
    }

    #[test]
    fn nested_cameras_suspend_and_resume() {
        let mut gpu = RecordingBackend::new();
        gpu.begin_camera(&camera("outer")).unwrap();
        gpu.begin_camera(&camera("inner")).unwrap();
        assert_eq!(gpu.camera_stack(), vec!["outer", "inner"]);
        gpu.end_camera().unwrap();
        gpu.end_camera().unwrap();

        assert_eq!(
            gpu.commands(),
            &[
                GpuCommand::BeginCamera {
                    label: "outer",
                    target: None,
                    clear: None
                },
                GpuCommand::Suspend("outer"),
                GpuCommand::BeginCamera {
                    label: "inner",
                    target: None,
                    clear: None
                },
                GpuCommand::EndCamera("inner"),
                GpuCommand::Resume("outer"),
                GpuCommand::EndCamera("outer"),
            ]
        );
        assert!(gpu.end_camera().is_err());
    }

    #[test]
    fn draws_need_an_active_camera() {
        let mut gpu = RecordingBackend::new();
        let uniforms = DrawUniforms::new();
        let result = gpu.draw_fullscreen(PipelineHandle(0), &uniforms, &[]);
        assert!(matches!(result, Err(RenderError::NoActiveCamera(_))));
    }

    #[test]
    fn targets_own_two_textures() {
        let mut gpu = RecordingBackend::new();
        let target = gpu
            .create_target(&TargetDesc {
                label: "offscreen".to_string(),
                width: 4,
                height: 2,
            })
            .unwrap();

        assert_eq!(gpu.target_size(target), Some(UVec2::new(4, 2)));
        assert_ne!(gpu.target_color(target), gpu.target_depth(target));
        assert_eq!(gpu.target_label(target), Some("offscreen"));
        assert!(gpu.target_size(TargetHandle(7)).is_none());
    }

    #[test]
    fn compilation_failure_is_reported() {
        let mut gpu = RecordingBackend::new();
        gpu.fail_compilation(true);
        let result = gpu.compile_program(&ProgramSource {
            label: "broken".to_string(),
            wgsl: String::new(),
        });
        assert!(matches!(result, Err(RenderError::ProgramCompilation { .. })));
        assert_eq!(gpu.programs_compiled(), 0);
    }

    #[test]
    fn texture_upload_checks_pixel_count() {
        let mut gpu = RecordingBackend::new();
        let desc = TextureDesc {
            label: "white".to_string(),
            width: 2,
            height: 2,
        };
        assert!(gpu.create_texture(&desc, &[255; 16]).is_ok());
        assert!(gpu.create_texture(&desc, &[255; 4]).is_err());
    }

    #[test]
    fn released_primitives_cannot_be_drawn() {
        let mut gpu = RecordingBackend::new();
        let program = gpu
            .compile_program(&ProgramSource {
                label: "plain".to_string(),
                wgsl: String::new(),
            })
            .unwrap();
        let pipeline = gpu
            .create_pipeline("plain", &PipelineState::OPAQUE, program)
            .unwrap();
        let primitive = gpu.create_primitive(&Mesh::quad()).unwrap();
        let uniforms = DrawUniforms::new();
        let call = DrawCall {
            pipeline,
            primitive,
            uniforms: &uniforms,
            layers: &[],
        };

        gpu.begin_camera(&camera("main")).unwrap();
        assert!(gpu.draw(&call).is_ok());
        gpu.release_primitive(primitive);
        assert!(matches!(
            gpu.draw(&call),
            Err(RenderError::UnknownHandle { .. })
        ));
        assert_eq!(gpu.live_primitives(), 0);
        assert_eq!(gpu.primitives_created(), 1);
    }
}
