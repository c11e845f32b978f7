// renderer/pass_params.rs - picks or builds the pipeline for an entity and pass
use std::sync::Arc;

use glam::Mat4;
use hecs::Entity;

use crate::asset::{Handle, ImageSource};
use crate::error::{RenderError, RenderResult};
use crate::renderer::gpu::{GpuBackend, TextureHandle};
use crate::renderer::journal::JournalEntry;
use crate::renderer::pass::{CacheSlot, RenderPass};
use crate::renderer::pipeline::{
    layer, Pipeline, PipelineCache, PipelineFeatures, PipelineState, PipelineTemplate,
    RenderCache, SharedPipeline, VisualInputs,
};
use crate::renderer::shadows::light_shadow_matrix;
use crate::renderer::snippets::SnippetLibrary;
use crate::renderer::uniforms::DrawUniforms;
use crate::scene::{light_direction, Geometry, GeometryKind, Light, Material, Scene};

/// Per-paint values every draw of a pass needs.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    pub view: Mat4,
    pub projection: Mat4,
    /// Inverse of `view`; takes journal transforms back to world space.
    pub view_inverse: Mat4,
    pub focal_distance: f32,
    pub depth_of_field: f32,
    pub light: Light,
    pub light_world: Mat4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Built,
}

/// Starting points shared by every entity. Built once by
/// [`PassParameters::init`].
#[derive(Debug)]
struct Templates {
    generic_mask: SharedPipeline,
    diamond_mask: SharedPipeline,
    unshaped_mask: PipelineTemplate,
    pointalism_mask: PipelineTemplate,
    color_unblended: PipelineTemplate,
    color_blended: PipelineTemplate,
}

/// Owns the snippet library, the pipeline cache and the templates.
#[derive(Debug)]
pub struct PassParameters {
    snippets: SnippetLibrary,
    pipelines: PipelineCache,
    templates: Option<Templates>,
    shadow_layer: Option<TextureHandle>,
}

impl PassParameters {
    pub fn new() -> Self {
        Self {
            snippets: SnippetLibrary::new(),
            pipelines: PipelineCache::new(),
            templates: None,
            shadow_layer: None,
        }
    }

    /// Builds the shared mask pipelines and colour templates. `shadow_layer`
    /// is the depth texture receivers sample; `None` disables receiving.
    pub fn init<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        shadow_layer: Option<TextureHandle>,
    ) -> RenderResult<()> {
        if self.templates.is_some() {
            return Ok(());
        }
        let s = &self.snippets;

        let mut generic = PipelineTemplate::new("mask-generic", PipelineState::MASK);
        generic.add_snippet(&s.cache_position);
        generic.add_snippet(&s.dof_blur_vertex);
        generic.add_snippet(&s.dof_blur_fragment);
        generic.features = PipelineFeatures::MASK | PipelineFeatures::SHARED;

        let mut diamond = PipelineTemplate::new("mask-diamond", PipelineState::MASK);
        diamond.add_snippet(&s.cache_position);
        diamond.add_snippet(&s.dof_blur_vertex);
        diamond.add_snippet(&s.diamond_circle);
        diamond.add_snippet(&s.dof_diamond_fragment);
        diamond.features = PipelineFeatures::MASK | PipelineFeatures::SHARED;

        let mut unshaped_mask = PipelineTemplate::new("mask-unshaped", PipelineState::MASK);
        unshaped_mask.add_snippet(&s.cache_position);
        unshaped_mask.add_snippet(&s.dof_blur_vertex);
        unshaped_mask.features = PipelineFeatures::MASK;

        let mut pointalism_mask = PipelineTemplate::new("mask-pointalism", PipelineState::MASK);
        pointalism_mask.add_snippet(&s.pointalism_vertex);
        pointalism_mask.add_snippet(&s.cache_position);
        pointalism_mask.add_snippet(&s.dof_blur_vertex);
        pointalism_mask.add_snippet(&s.dof_blur_fragment);
        pointalism_mask.features = PipelineFeatures::MASK;

        let color_unblended = PipelineTemplate::new("color-unblended", PipelineState::OPAQUE);
        let mut color_blended = PipelineTemplate::new("color-blended", PipelineState::BLENDED);
        color_blended.features = PipelineFeatures::BLENDED;

        let generic_mask = self.pipelines.realize(backend, generic)?;
        let diamond_mask = self.pipelines.realize(backend, diamond)?;

        self.templates = Some(Templates {
            generic_mask,
            diamond_mask,
            unshaped_mask,
            pointalism_mask,
            color_unblended,
            color_blended,
        });
        self.shadow_layer = shadow_layer;
        log::info!(
            "Pipeline templates ready ({} programs compiled)",
            self.pipelines.programs().compiled()
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.templates.is_some()
    }

    pub fn snippets(&self) -> &SnippetLibrary {
        &self.snippets
    }

    pub fn pipelines(&self) -> &PipelineCache {
        &self.pipelines
    }

    /// Returns the cached pipeline for `pass` or builds and caches a new one.
    ///
    /// A change in the entity's visual inputs (geometry kind, shadow flag,
    /// bound texture identities) drops every cached slot first.
    pub fn get_or_build<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        scene: &mut Scene,
        entity: Entity,
        pass: RenderPass,
    ) -> RenderResult<(SharedPipeline, CacheOutcome)> {
        let inputs = visual_inputs(scene, entity)?;
        let slot = pass.cache_slot();

        if scene.world.get::<&RenderCache>(entity).is_err() {
            scene
                .world
                .insert_one(entity, RenderCache::new())
                .map_err(|_| RenderError::missing(entity, "RenderCache"))?;
        }

        {
            let mut cache = scene
                .world
                .get::<&mut RenderCache>(entity)
                .map_err(|_| RenderError::missing(entity, "RenderCache"))?;
            if cache.sync_inputs(inputs) {
                log::debug!("Visual inputs of {:?} changed, dropped its pipelines", entity);
            }
            if let Some(pipeline) = cache.get(slot) {
                return Ok((Arc::clone(pipeline), CacheOutcome::Hit));
            }
        }

        let pipeline = self.build(backend, &inputs, slot)?;
        log::debug!(
            "Built {} pipeline for {:?} [{:?}]",
            pass.label(),
            entity,
            pipeline.features()
        );

        scene
            .world
            .get::<&mut RenderCache>(entity)
            .map_err(|_| RenderError::missing(entity, "RenderCache"))?
            .set(slot, Arc::clone(&pipeline));
        Ok((pipeline, CacheOutcome::Built))
    }

    /// Empties every cached slot of `entity`. Returns the number dropped.
    pub fn invalidate(&self, scene: &Scene, entity: Entity) -> usize {
        match scene.world.get::<&mut RenderCache>(entity) {
            Ok(mut cache) => cache.invalidate(),
            Err(_) => 0,
        }
    }

    /// Releases GPU pipelines no entity refers to any more.
    pub fn collect_garbage<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) -> usize {
        let released = self.pipelines.collect_garbage(backend);
        if released > 0 {
            log::debug!("Released {} unused GPU pipelines", released);
        }
        released
    }

    fn build<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        inputs: &VisualInputs,
        slot: CacheSlot,
    ) -> RenderResult<SharedPipeline> {
        let Self {
            snippets: s,
            pipelines,
            templates,
            shadow_layer,
        } = self;
        let t = templates
            .as_ref()
            .ok_or(RenderError::NotInitialized("pipeline build"))?;
        let kind = inputs.kind.unwrap_or(GeometryKind::Generic);
        let neutral = if inputs.pending {
            PipelineFeatures::NEUTRAL
        } else {
            PipelineFeatures::empty()
        };

        let mut template = match slot {
            CacheSlot::ShadowOrMask => match kind {
                GeometryKind::Generic => return Ok(pipelines.derive(&t.generic_mask)),
                GeometryKind::Diamond => return Ok(pipelines.derive(&t.diamond_mask)),
                GeometryKind::Shape => {
                    let mut mask = t.unshaped_mask.clone().with_label("mask-shape");
                    attach_silhouette(&mut mask, inputs);
                    if let Some(texture) = inputs.alpha_mask {
                        mask.set_layer(layer::ALPHA_MASK, texture);
                        mask.add_snippet(&s.alpha_mask);
                        mask.features |= PipelineFeatures::ALPHA_MASK;
                    }
                    mask.add_snippet(&s.dof_unshaped_fragment);
                    mask
                }
                GeometryKind::PointalismGrid => {
                    let mut mask = t.pointalism_mask.clone();
                    if let Some(texture) = inputs.color {
                        mask.set_layer(layer::COLOR, texture);
                        mask.features |= PipelineFeatures::TEXTURED;
                    }
                    mask
                }
            },
            CacheSlot::ColorUnblended | CacheSlot::ColorBlended => {
                let blended = slot == CacheSlot::ColorBlended;
                let base = if blended {
                    &t.color_blended
                } else {
                    &t.color_unblended
                };
                let mut color = base
                    .clone()
                    .with_label(format!("{}-{}", base.label, kind_label(kind)));

                if kind == GeometryKind::PointalismGrid {
                    color.add_snippet(&s.pointalism_vertex);
                }
                color.add_snippet(&s.cache_position);
                color.add_snippet(&s.lighting_vertex);
                if let Some(texture) = inputs.normal_map {
                    color.set_layer(layer::NORMAL_MAP, texture);
                    color.add_snippet(&s.normal_map_vertex);
                    color.features |= PipelineFeatures::NORMAL_MAP;
                }
                let receiver = match (inputs.receive_shadow, *shadow_layer) {
                    (true, Some(depth)) => {
                        color.set_layer(layer::SHADOW_MAP, depth);
                        color.add_snippet(&s.shadow_vertex);
                        color.features |= PipelineFeatures::SHADOW_RECEIVER;
                        true
                    }
                    _ => false,
                };

                match kind {
                    GeometryKind::Diamond => color.add_snippet(&s.diamond_circle),
                    GeometryKind::Shape => attach_silhouette(&mut color, inputs),
                    GeometryKind::PointalismGrid | GeometryKind::Generic => {}
                }
                if let Some(texture) = inputs.color {
                    color.set_layer(layer::COLOR, texture);
                    color.features |= PipelineFeatures::TEXTURED;
                }

                color.add_snippet(if blended {
                    &s.blended_discard
                } else {
                    &s.unblended_discard
                });
                color.add_snippet(&s.unpremultiply);
                if let Some(texture) = inputs.alpha_mask {
                    color.set_layer(layer::ALPHA_MASK, texture);
                    color.add_snippet(&s.alpha_mask);
                    color.features |= PipelineFeatures::ALPHA_MASK;
                }

                if inputs.normal_map.is_some() {
                    color.add_snippet(&s.normal_map_lighting);
                } else if inputs.color.is_some() || inputs.alpha_mask.is_some() {
                    color.add_snippet(&s.material_lighting);
                } else {
                    color.add_snippet(&s.simple_lighting);
                }
                if receiver {
                    color.add_snippet(&s.shadow_fragment);
                }
                color.add_snippet(&s.premultiply);
                color
            }
        };

        template.features |= neutral;
        pipelines.realize(backend, template)
    }
}

impl Default for PassParameters {
    fn default() -> Self {
        Self::new()
    }
}

fn kind_label(kind: GeometryKind) -> &'static str {
    match kind {
        GeometryKind::Shape => "shape",
        GeometryKind::Diamond => "diamond",
        GeometryKind::PointalismGrid => "pointalism",
        GeometryKind::Generic => "generic",
    }
}

/// Shape mask and colour layers; the program combines them into the base
/// colour before any fragment snippet runs.
fn attach_silhouette(template: &mut PipelineTemplate, inputs: &VisualInputs) {
    if let Some(mask) = inputs.shape_mask {
        template.set_layer(layer::SHAPE_MASK, mask);
        template.features |= PipelineFeatures::SHAPED;
    }
    if let Some(texture) = inputs.color {
        template.set_layer(layer::COLOR, texture);
        template.features |= PipelineFeatures::TEXTURED;
    }
}

/// Everything a pipeline is built from. Sources that are still loading
/// resolve to no texture and set `pending`.
pub fn visual_inputs(scene: &Scene, entity: Entity) -> RenderResult<VisualInputs> {
    let geometry = *scene
        .world
        .get::<&Geometry>(entity)
        .map_err(|_| RenderError::missing(entity, "Geometry"))?;
    let material = *scene
        .world
        .get::<&Material>(entity)
        .map_err(|_| RenderError::missing(entity, "Material"))?;

    let mut pending = false;
    let mut resolve = |source: Option<Handle<ImageSource>>| -> Option<TextureHandle> {
        let handle = source?;
        let texture = scene
            .assets
            .images
            .get(handle)
            .and_then(ImageSource::texture);
        if texture.is_none() {
            log::trace!("Image source {:?} of {:?} still loading", handle, entity);
            pending = true;
        }
        texture
    };

    let (shaped, shape_mask) = match geometry {
        Geometry::Shape {
            shaped, shape_mask, ..
        } => (shaped, if shaped { resolve(shape_mask) } else { None }),
        _ => (false, None),
    };
    let color = resolve(material.color_source);
    let alpha_mask = resolve(material.alpha_mask);
    let normal_map = resolve(material.normal_map);

    Ok(VisualInputs {
        kind: Some(geometry.kind()),
        shaped,
        receive_shadow: material.receive_shadow,
        shape_mask,
        color,
        alpha_mask,
        normal_map,
        pending,
    })
}

/// Fills the per-draw uniforms for one journal entry. The second value is
/// true when the pipeline samples the shadow map but the light transform
/// could not be inverted, so the draw goes out without shadow.
pub fn draw_uniforms(
    scene: &Scene,
    entry: &JournalEntry,
    pass: RenderPass,
    frame: &FrameContext,
    pipeline: &Pipeline,
) -> RenderResult<(DrawUniforms, bool)> {
    let entity = entry.entity;
    let geometry = *scene
        .world
        .get::<&Geometry>(entity)
        .map_err(|_| RenderError::missing(entity, "Geometry"))?;
    let material = *scene
        .world
        .get::<&Material>(entity)
        .map_err(|_| RenderError::missing(entity, "Material"))?;

    let local = geometry.local_matrix();
    let mut uniforms = DrawUniforms::new();
    uniforms.set_transforms(entry.transform * local, frame.projection);
    uniforms.set_light(
        light_direction(frame.light_world, frame.view),
        frame.light.ambient,
        frame.light.diffuse,
        frame.light.specular,
    );
    uniforms.set_material(
        material.ambient,
        material.diffuse,
        material.specular,
        material.shininess,
    );
    uniforms.set_alpha_threshold(material.alpha_mask_threshold);
    uniforms.set_focal_parameters(frame.focal_distance, frame.depth_of_field);

    if let Geometry::PointalismGrid {
        scale,
        z,
        lighter,
        cell_size,
        ..
    } = geometry
    {
        uniforms.set_pointalism(scale, z, lighter, cell_size);
    }

    let mut shadow_skipped = false;
    if pass.is_color() && pipeline.features().contains(PipelineFeatures::SHADOW_RECEIVER) {
        let entity_world = frame.view_inverse * entry.transform * local;
        let matrix = light_shadow_matrix(frame.light_world, frame.light.projection(), entity_world);
        if matrix.is_none() {
            log::warn!(
                "Light transform is not invertible; drawing {:?} without shadow",
                entity
            );
            shadow_skipped = true;
        }
        uniforms.set_shadow(matrix);
    }

    Ok((uniforms, shadow_skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Mesh;
    use crate::renderer::recording::RecordingBackend;
    use crate::scene::Transform;
    use glam::{UVec2, Vec2, Vec3};

    struct Fixture {
        gpu: RecordingBackend,
        params: PassParameters,
        scene: Scene,
    }

    fn fixture() -> Fixture {
        let mut gpu = RecordingBackend::new();
        let mut params = PassParameters::new();
        params.init(&mut gpu, Some(TextureHandle(99))).unwrap();
        Fixture {
            gpu,
            params,
            scene: Scene::new(),
        }
    }

    fn generic(scene: &mut Scene, material: Material) -> Entity {
        let mesh = scene.assets.meshes.insert(Mesh::quad());
        scene.spawn_drawable(Transform::IDENTITY, Geometry::Generic { mesh }, material)
    }

    fn frame(light_world: Mat4) -> FrameContext {
        FrameContext {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            view_inverse: Mat4::IDENTITY,
            focal_distance: 10.0,
            depth_of_field: 2.0,
            light: Light::default(),
            light_world,
        }
    }

    #[test]
    fn second_lookup_is_a_hit_with_the_same_pipeline() {
        let mut f = fixture();
        let e = generic(&mut f.scene, Material::default());

        let (first, built) = f
            .params
            .get_or_build(&mut f.gpu, &mut f.scene, e, RenderPass::ColorUnblended)
            .unwrap();
        let created = f.gpu.pipelines_created();
        let (second, hit) = f
            .params
            .get_or_build(&mut f.gpu, &mut f.scene, e, RenderPass::ColorUnblended)
            .unwrap();

        assert_eq!(built, CacheOutcome::Built);
        assert_eq!(hit, CacheOutcome::Hit);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(f.gpu.pipelines_created(), created);
    }

    #[test]
    fn shadow_and_dof_share_the_mask_slot() {
        let mut f = fixture();
        let e = generic(&mut f.scene, Material::default());

        let (shadow, _) = f
            .params
            .get_or_build(&mut f.gpu, &mut f.scene, e, RenderPass::Shadow)
            .unwrap();
        let (dof, outcome) = f
            .params
            .get_or_build(&mut f.gpu, &mut f.scene, e, RenderPass::DofDepth)
            .unwrap();

        assert_eq!(outcome, CacheOutcome::Hit);
        assert!(Arc::ptr_eq(&shadow, &dof));
        assert!(shadow.features().contains(PipelineFeatures::SHARED));
    }

    #[test]
    fn invalidated_generic_mask_gets_a_new_identity() {
        let mut f = fixture();
        let e = generic(&mut f.scene, Material::default());

        let (before, _) = f
            .params
            .get_or_build(&mut f.gpu, &mut f.scene, e, RenderPass::Shadow)
            .unwrap();
        assert_eq!(f.params.invalidate(&f.scene, e), 1);
        let (after, outcome) = f
            .params
            .get_or_build(&mut f.gpu, &mut f.scene, e, RenderPass::Shadow)
            .unwrap();

        assert_eq!(outcome, CacheOutcome::Built);
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(before.handle(), after.handle());
    }

    #[test]
    fn colour_passes_use_complementary_discards() {
        let mut f = fixture();
        let e = generic(&mut f.scene, Material::default());

        let (opaque, _) = f
            .params
            .get_or_build(&mut f.gpu, &mut f.scene, e, RenderPass::ColorUnblended)
            .unwrap();
        let (blended, _) = f
            .params
            .get_or_build(&mut f.gpu, &mut f.scene, e, RenderPass::ColorBlended)
            .unwrap();
        let s = f.params.snippets();

        assert!(opaque.has_snippet(&s.unblended_discard));
        assert!(!opaque.has_snippet(&s.blended_discard));
        assert!(blended.has_snippet(&s.blended_discard));
        assert!(opaque.state().depth_write);
        assert!(!blended.state().depth_write);
        assert!(blended.has_snippet(&s.simple_lighting));
    }

    #[test]
    fn shadow_receivers_bind_the_shadow_layer() {
        let mut f = fixture();
        let receiver = generic(&mut f.scene, Material::default());
        let plain = generic(
            &mut f.scene,
            Material {
                receive_shadow: false,
                ..Material::default()
            },
        );

        let (with, _) = f
            .params
            .get_or_build(&mut f.gpu, &mut f.scene, receiver, RenderPass::ColorUnblended)
            .unwrap();
        let (without, _) = f
            .params
            .get_or_build(&mut f.gpu, &mut f.scene, plain, RenderPass::ColorUnblended)
            .unwrap();

        assert!(with.has_snippet(&f.params.snippets().shadow_fragment));
        assert!(with
            .layers()
            .iter()
            .any(|l| l.index == layer::SHADOW_MAP && l.texture == TextureHandle(99)));
        assert!(!without.has_snippet(&f.params.snippets().shadow_fragment));
    }

    #[test]
    fn loading_source_falls_back_to_neutral_pipeline() {
        let mut f = fixture();
        let image = f.scene.add_image(ImageSource::loading("photo"));
        let e = generic(
            &mut f.scene,
            Material {
                color_source: Some(image),
                receive_shadow: false,
                ..Material::default()
            },
        );

        let (neutral, _) = f
            .params
            .get_or_build(&mut f.gpu, &mut f.scene, e, RenderPass::ColorUnblended)
            .unwrap();
        assert!(neutral.features().contains(PipelineFeatures::NEUTRAL));
        assert!(neutral.layers().is_empty());

        f.scene
            .mark_image_ready(image, TextureHandle(5), UVec2::new(4, 4));
        let (textured, outcome) = f
            .params
            .get_or_build(&mut f.gpu, &mut f.scene, e, RenderPass::ColorUnblended)
            .unwrap();

        assert_eq!(outcome, CacheOutcome::Built);
        assert!(textured.features().contains(PipelineFeatures::TEXTURED));
        assert!(!textured.features().contains(PipelineFeatures::NEUTRAL));
    }

    #[test]
    fn shaped_shape_mask_binds_layers_and_alpha_mask() {
        let mut f = fixture();
        let mesh = f.scene.assets.meshes.insert(Mesh::quad());
        let silhouette = f
            .scene
            .add_image(ImageSource::ready("mask", TextureHandle(1), UVec2::ONE));
        let cutout = f
            .scene
            .add_image(ImageSource::ready("cutout", TextureHandle(2), UVec2::ONE));
        let e = f.scene.spawn_drawable(
            Transform::IDENTITY,
            Geometry::Shape {
                mesh,
                size: Vec2::ONE,
                shaped: true,
                shape_mask: Some(silhouette),
            },
            Material {
                alpha_mask: Some(cutout),
                ..Material::default()
            },
        );

        let (mask, _) = f
            .params
            .get_or_build(&mut f.gpu, &mut f.scene, e, RenderPass::DofDepth)
            .unwrap();
        let s = f.params.snippets();

        assert!(mask.has_snippet(&s.dof_unshaped_fragment));
        assert!(mask.has_snippet(&s.alpha_mask));
        assert_eq!(mask.features() & PipelineFeatures::SHARED, PipelineFeatures::empty());
        let indices: Vec<u32> = mask.layers().iter().map(|l| l.index).collect();
        assert_eq!(indices, vec![layer::SHAPE_MASK, layer::ALPHA_MASK]);
    }

    #[test]
    fn pointalism_displaces_before_caching_the_position() {
        let mut f = fixture();
        let mesh = f.scene.assets.meshes.insert(Mesh::grid(4, 4));
        let e = f.scene.spawn_drawable(
            Transform::IDENTITY,
            Geometry::PointalismGrid {
                mesh,
                scale: 1.0,
                z: 2.0,
                lighter: true,
                cell_size: 0.25,
            },
            Material::default(),
        );

        let (color, _) = f
            .params
            .get_or_build(&mut f.gpu, &mut f.scene, e, RenderPass::ColorBlended)
            .unwrap();
        let names = color.snippet_names();
        assert_eq!(&names[..2], &["pointalism-vertex", "cache-position"]);
    }

    #[test]
    fn entity_without_material_is_an_error() {
        let mut f = fixture();
        let mesh = f.scene.assets.meshes.insert(Mesh::quad());
        let e = f
            .scene
            .world
            .spawn((Transform::IDENTITY, Geometry::Generic { mesh }));

        let result = f
            .params
            .get_or_build(&mut f.gpu, &mut f.scene, e, RenderPass::Shadow);
        assert!(matches!(result, Err(RenderError::MissingComponent { .. })));
    }

    #[test]
    fn uniforms_carry_shadow_matrix_for_receivers() {
        let mut f = fixture();
        let e = generic(&mut f.scene, Material::default());
        let (pipeline, _) = f
            .params
            .get_or_build(&mut f.gpu, &mut f.scene, e, RenderPass::ColorUnblended)
            .unwrap();
        let entry = JournalEntry {
            entity: e,
            transform: Mat4::from_translation(Vec3::new(1.0, 0.0, 5.0)),
        };

        let light = Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0));
        let (uniforms, skipped) = draw_uniforms(
            &f.scene,
            &entry,
            RenderPass::ColorUnblended,
            &frame(light),
            &pipeline,
        )
        .unwrap();
        assert!(!skipped);
        assert!(uniforms.shadow_enabled());
        assert_eq!(uniforms.focal_distance(), 10.0);

        let flat = Mat4::from_scale(Vec3::new(1.0, 1.0, 0.0));
        let (uniforms, skipped) = draw_uniforms(
            &f.scene,
            &entry,
            RenderPass::ColorUnblended,
            &frame(flat),
            &pipeline,
        )
        .unwrap();
        assert!(skipped);
        assert!(!uniforms.shadow_enabled());
    }

    #[test]
    fn pointalism_uniforms_carry_cell_size() {
        let mut f = fixture();
        let mesh = f.scene.assets.meshes.insert(Mesh::grid(4, 4));
        let e = f.scene.spawn_drawable(
            Transform::IDENTITY,
            Geometry::PointalismGrid {
                mesh,
                scale: 1.5,
                z: 2.0,
                lighter: true,
                cell_size: 0.1,
            },
            Material::default(),
        );
        let (pipeline, _) = f
            .params
            .get_or_build(&mut f.gpu, &mut f.scene, e, RenderPass::ColorBlended)
            .unwrap();
        let entry = JournalEntry {
            entity: e,
            transform: Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0)),
        };

        let light = Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0));
        let (uniforms, _) = draw_uniforms(
            &f.scene,
            &entry,
            RenderPass::ColorBlended,
            &frame(light),
            &pipeline,
        )
        .unwrap();
        // Dot size comes from the geometry, not from the 4x4 cell layout.
        assert_eq!(uniforms.pointalism, [1.5, 2.0, 1.0, 0.1]);
    }
}
