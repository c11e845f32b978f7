// renderer/renderer.rs
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use glam::UVec2;
use hecs::Entity;

use crate::asset::{Handle, ImageSource, Mesh};
use crate::error::{RenderError, RenderResult};
use crate::renderer::dof::DepthOfField;
use crate::renderer::gpu::{CameraPass, ClearValues, DrawCall, GpuBackend, PrimitiveHandle};
use crate::renderer::journal::{Journal, JournalEntry};
use crate::renderer::pass::RenderPass;
use crate::renderer::pass_params::{draw_uniforms, CacheOutcome, FrameContext, PassParameters};
use crate::renderer::shadows::{try_inverse, ShadowMap};
use crate::scene::{Camera, Geometry, Light, Material, Scene};
use crate::settings::RenderSettings;

const CLEAR_WHITE: ClearValues = ClearValues {
    color: [1.0, 1.0, 1.0, 1.0],
    depth: 1.0,
};

/// Counters for the most recent [`Renderer::paint_camera`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RendererStats {
    /// Draw calls issued, indexed like [`RenderPass::ALL`].
    pub draws: [usize; 4],
    /// Journal flushes in the order they ran.
    pub flushes: Vec<RenderPass>,
    pub shadow_passes: usize,
    /// Passes drawn into the depth-of-field buffers.
    pub offscreen_passes: usize,
    pub composites: usize,
    pub pipelines_built: usize,
    pub cache_hits: usize,
    /// Receivers drawn without shadow because the light was degenerate.
    pub shadow_skips: usize,
    /// Entries dropped because their mesh no longer exists.
    pub skipped_draws: usize,
}

impl RendererStats {
    pub fn draws_in(&self, pass: RenderPass) -> usize {
        self.draws[pass.index()]
    }

    pub fn color_flushes(&self) -> usize {
        self.flushes.iter().filter(|p| p.is_color()).count()
    }
}

/// Ends the camera it began when dropped, so an error part way through a
/// paint still resumes the camera underneath.
pub struct CameraScope<'a, B: GpuBackend + ?Sized> {
    backend: &'a mut B,
    label: &'static str,
    ended: bool,
}

impl<'a, B: GpuBackend + ?Sized> CameraScope<'a, B> {
    pub fn begin(backend: &'a mut B, camera: &CameraPass) -> RenderResult<Self> {
        backend.begin_camera(camera)?;
        Ok(Self {
            backend,
            label: camera.label,
            ended: false,
        })
    }

    /// Ends the camera and reports the backend's result.
    pub fn finish(mut self) -> RenderResult<()> {
        self.ended = true;
        self.backend.end_camera()
    }
}

impl<B: GpuBackend + ?Sized> Deref for CameraScope<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        &*self.backend
    }
}

impl<B: GpuBackend + ?Sized> DerefMut for CameraScope<'_, B> {
    fn deref_mut(&mut self) -> &mut B {
        &mut *self.backend
    }
}

impl<B: GpuBackend + ?Sized> Drop for CameraScope<'_, B> {
    fn drop(&mut self) {
        if !self.ended {
            if let Err(err) = self.backend.end_camera() {
                log::error!("Failed to end camera '{}': {}", self.label, err);
            }
        }
    }
}

/// Pipelines, uploaded primitives and counters; everything a flush touches
/// apart from the journal itself.
struct DrawState {
    params: PassParameters,
    primitives: HashMap<Handle<Mesh>, PrimitiveHandle>,
    stats: RendererStats,
}

impl DrawState {
    /// Collects the pass's entities into the journal and flushes it.
    fn run_pass<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        journal: &mut Journal,
        scene: &mut Scene,
        pass: RenderPass,
        frame: &FrameContext,
    ) -> RenderResult<usize> {
        journal.begin(pass);
        {
            let scene: &Scene = scene;
            scene.traverse(frame.view, |entity, transform| {
                if should_log(scene, entity, pass) {
                    journal.log(entity, pass, transform);
                }
            });
        }

        let logged = journal.flush(pass, |entry| {
            self.draw_entry(backend, scene, pass, frame, entry)
        })?;
        self.stats.flushes.push(pass);
        log::trace!("Flushed {} entries for {}", logged, pass.label());
        Ok(logged)
    }

    fn draw_entry<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        scene: &mut Scene,
        pass: RenderPass,
        frame: &FrameContext,
        entry: &JournalEntry,
    ) -> RenderResult<()> {
        let (pipeline, outcome) = self
            .params
            .get_or_build(backend, scene, entry.entity, pass)?;
        match outcome {
            CacheOutcome::Hit => self.stats.cache_hits += 1,
            CacheOutcome::Built => self.stats.pipelines_built += 1,
        }

        let mesh = scene
            .world
            .get::<&Geometry>(entry.entity)
            .map(|g| g.mesh())
            .map_err(|_| RenderError::missing(entry.entity, "Geometry"))?;
        let Some(primitive) = self.primitive(backend, scene, mesh)? else {
            log::warn!("Mesh {:?} of {:?} does not exist", mesh, entry.entity);
            self.stats.skipped_draws += 1;
            return Ok(());
        };

        let (uniforms, shadow_skipped) = draw_uniforms(scene, entry, pass, frame, &pipeline)?;
        if shadow_skipped {
            self.stats.shadow_skips += 1;
        }

        backend.draw(&DrawCall {
            pipeline: pipeline.handle(),
            primitive,
            uniforms: &uniforms,
            layers: pipeline.layers(),
        })?;
        self.stats.draws[pass.index()] += 1;
        log::trace!(
            "{} draw of {:?} at depth {} with {}",
            pass.label(),
            entry.entity,
            entry.depth(),
            pipeline.label()
        );
        Ok(())
    }

    /// Uploads `mesh` on first use.
    fn primitive<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        scene: &Scene,
        mesh: Handle<Mesh>,
    ) -> RenderResult<Option<PrimitiveHandle>> {
        if let Some(&primitive) = self.primitives.get(&mesh) {
            return Ok(Some(primitive));
        }
        let Some(data) = scene.assets.meshes.get(mesh) else {
            return Ok(None);
        };
        let primitive = backend.create_primitive(data)?;
        log::debug!(
            "Uploaded mesh '{}' ({} indices) as {:?}",
            data.label,
            data.index_count(),
            primitive
        );
        self.primitives.insert(mesh, primitive);
        Ok(Some(primitive))
    }

    /// Releases the upload of `mesh` so the next draw reads it again.
    fn forget_primitive<B: GpuBackend + ?Sized>(&mut self, backend: &mut B, mesh: Handle<Mesh>) {
        if let Some(primitive) = self.primitives.remove(&mesh) {
            backend.release_primitive(primitive);
            log::debug!("Released upload {:?} of {:?}", primitive, mesh);
        }
    }
}

fn should_log(scene: &Scene, entity: Entity, pass: RenderPass) -> bool {
    if !scene.has_geometry(entity) || !scene.is_visible(entity) {
        return false;
    }
    pass != RenderPass::Shadow || scene.casts_shadow(entity)
}

/// Paints cameras of a [`Scene`] through a [`GpuBackend`].
///
/// Shared GPU state (snippets, template pipelines, the shadow map and the
/// depth-of-field buffers) is created by [`Renderer::init`], which
/// `paint_camera` calls on first use.
pub struct Renderer<B: GpuBackend> {
    backend: B,
    settings: RenderSettings,
    journal: Journal,
    draw: DrawState,
    shadow_map: Option<ShadowMap>,
    dof: Option<DepthOfField>,
    initialized: bool,
}

impl<B: GpuBackend> Renderer<B> {
    pub fn new(backend: B, settings: RenderSettings) -> Self {
        Self {
            backend,
            settings: settings.validate(),
            journal: Journal::new(),
            draw: DrawState {
                params: PassParameters::new(),
                primitives: HashMap::new(),
                stats: RendererStats::default(),
            },
            shadow_map: None,
            dof: None,
            initialized: false,
        }
    }

    pub fn init(&mut self) -> RenderResult<()> {
        if self.initialized {
            return Ok(());
        }

        let shadow_map = ShadowMap::new(&mut self.backend, self.settings.shadow_map_size)?;
        self.draw
            .params
            .init(&mut self.backend, Some(shadow_map.depth_texture()))?;
        if self.settings.depth_of_field {
            self.dof = Some(DepthOfField::new(&mut self.backend, UVec2::ONE)?);
        }
        self.shadow_map = Some(shadow_map);
        self.initialized = true;

        log::info!(
            "Renderer initialised (shadow map {}, depth of field {})",
            self.settings.shadow_map_size,
            if self.dof.is_some() { "on" } else { "off" }
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn stats(&self) -> &RendererStats {
        &self.draw.stats
    }

    pub fn pass_parameters(&self) -> &PassParameters {
        &self.draw.params
    }

    pub fn shadow_map(&self) -> Option<&ShadowMap> {
        self.shadow_map.as_ref()
    }

    pub fn depth_of_field(&self) -> Option<&DepthOfField> {
        self.dof.as_ref()
    }

    /// Paints `camera` into its target.
    ///
    /// Runs the shadow pass, then either the two colour passes straight into
    /// the target or, with depth of field, the mask and colour passes into
    /// offscreen buffers followed by one composite. A paint nests inside any
    /// camera already active on the backend and resumes it afterwards.
    pub fn paint_camera(&mut self, scene: &mut Scene, camera: Entity) -> RenderResult<()> {
        self.init()?;
        self.draw.stats = RendererStats::default();

        let cam = *scene
            .world
            .get::<&Camera>(camera)
            .map_err(|_| RenderError::missing(camera, "Camera"))?;
        let Some(light_entity) = scene.light() else {
            log::warn!("Scene has no light; {:?} paints nothing", camera);
            return Ok(());
        };
        let light = *scene
            .world
            .get::<&Light>(light_entity)
            .map_err(|_| RenderError::missing(light_entity, "Light"))?;

        let camera_world = scene.world_matrix(camera);
        let Some(view) = try_inverse(camera_world) else {
            log::warn!("Camera {:?} has a degenerate transform; skipped", camera);
            return Ok(());
        };
        let light_world = scene.world_matrix(light_entity);
        let projection = cam.projection_matrix();

        let frame = FrameContext {
            view,
            projection,
            view_inverse: camera_world,
            focal_distance: cam.focal_distance,
            depth_of_field: cam.depth_of_field,
            light,
            light_world,
        };

        let Self {
            backend,
            settings,
            journal,
            draw,
            shadow_map,
            dof,
            ..
        } = self;

        let viewport = cam.viewport;
        let mut main = CameraScope::begin(
            backend,
            &CameraPass {
                label: "camera",
                target: cam.target,
                view,
                projection,
                viewport: [viewport.x, viewport.y, viewport.width, viewport.height],
                clear: cam.clear.then(|| ClearValues {
                    color: cam.background.to_array(),
                    depth: 1.0,
                }),
            },
        )?;

        if let Some(shadow_map) = shadow_map.as_ref() {
            match try_inverse(light_world) {
                Some(light_view) => {
                    let light_frame = FrameContext {
                        view: light_view,
                        projection: light.projection(),
                        view_inverse: light_world,
                        ..frame
                    };
                    let mut scope = CameraScope::begin(
                        &mut *main,
                        &CameraPass {
                            label: "shadow-map",
                            target: Some(shadow_map.target()),
                            view: light_view,
                            projection: light_frame.projection,
                            viewport: shadow_map.viewport(),
                            clear: Some(CLEAR_WHITE),
                        },
                    )?;
                    draw.run_pass(&mut *scope, journal, scene, RenderPass::Shadow, &light_frame)?;
                    scope.finish()?;
                    draw.stats.shadow_passes += 1;
                }
                None => log::warn!("Light {:?} cannot be inverted; no shadow pass", light_entity),
            }
        }

        let dof = dof
            .as_mut()
            .filter(|_| settings.depth_of_field && cam.depth_of_field_enabled);
        match dof {
            Some(dof) => {
                let size = UVec2::new(viewport.width as u32, viewport.height as u32);
                dof.ensure_size(&mut *main, size)?;
                let offscreen = [0.0, 0.0, dof.size().x as f32, dof.size().y as f32];

                let mut scope = CameraScope::begin(
                    &mut *main,
                    &CameraPass {
                        label: "dof-depth",
                        target: Some(dof.depth_pass()),
                        view,
                        projection,
                        viewport: offscreen,
                        clear: Some(CLEAR_WHITE),
                    },
                )?;
                draw.run_pass(&mut *scope, journal, scene, RenderPass::DofDepth, &frame)?;
                scope.finish()?;
                draw.stats.offscreen_passes += 1;

                let mut scope = CameraScope::begin(
                    &mut *main,
                    &CameraPass {
                        label: "dof-color",
                        target: Some(dof.color_pass()),
                        view,
                        projection,
                        viewport: offscreen,
                        clear: Some(ClearValues {
                            color: cam.background.to_array(),
                            depth: 1.0,
                        }),
                    },
                )?;
                for pass in [RenderPass::ColorUnblended, RenderPass::ColorBlended] {
                    draw.run_pass(&mut *scope, journal, scene, pass, &frame)?;
                    draw.stats.offscreen_passes += 1;
                }
                scope.finish()?;

                let layers = dof.composite_layers(&*main)?;
                let uniforms = dof.composite_uniforms(settings.composite_blur_radius);
                main.draw_fullscreen(dof.composite_pipeline(), &uniforms, &layers)?;
                draw.stats.composites += 1;
            }
            None => {
                for pass in [RenderPass::ColorUnblended, RenderPass::ColorBlended] {
                    draw.run_pass(&mut *main, journal, scene, pass, &frame)?;
                }
            }
        }

        main.finish()?;
        draw.params.collect_garbage(backend);
        Ok(())
    }

    /// Drops every cached pipeline of `entity` along with the upload of its
    /// mesh; the next paint rebuilds both.
    pub fn dirty_entity_render_state(&mut self, scene: &Scene, entity: Entity) {
        let dropped = self.draw.params.invalidate(scene, entity);
        log::debug!("Invalidated {} cached pipelines of {:?}", dropped, entity);
        if let Ok(mesh) = scene.world.get::<&Geometry>(entity).map(|g| g.mesh()) {
            self.draw.forget_primitive(&mut self.backend, mesh);
        }
    }

    /// Called once an image source finished loading. Every entity using it
    /// is invalidated; shapes showing it as their colour take its size.
    /// Returns the number of entities affected.
    pub fn notify_image_source_ready(
        &mut self,
        scene: &mut Scene,
        source: Handle<ImageSource>,
    ) -> usize {
        let natural = scene
            .assets
            .images
            .get(source)
            .filter(|image| image.is_ready())
            .map(|image| image.natural_size().as_vec2());

        let users = scene.entities_using_image(source);
        for &entity in &users {
            let shows_source = scene
                .world
                .get::<&Material>(entity)
                .map(|m| m.color_source == Some(source))
                .unwrap_or(false);
            if let (true, Some(size)) = (shows_source, natural) {
                if let Ok(mut geometry) = scene.world.get::<&mut Geometry>(entity) {
                    if geometry.fit_to_image(size) {
                        log::debug!("Resized {:?} to {}x{}", entity, size.x, size.y);
                    }
                }
            }
            self.dirty_entity_render_state(scene, entity);
        }
        users.len()
    }
}
