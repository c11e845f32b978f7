// scene/scene.rs - entity store and depth-first traversal
use glam::{Mat4, UVec2};
use hecs::{Entity, World};
use thiserror::Error;

use super::components::*;
use crate::asset::{Assets, Handle, ImageSource};
use crate::renderer::gpu::TextureHandle;
use crate::scene::{Camera, Transform};

#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error(transparent)]
    NoSuchEntity(#[from] hecs::NoSuchEntity),
    #[error("parenting {child:?} under {parent:?} would make it its own ancestor")]
    Cycle { child: Entity, parent: Entity },
}

pub struct Scene {
    pub world: World,
    pub assets: Assets,
    light: Option<Entity>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            assets: Assets::default(),
            light: None,
        }
    }

    pub fn spawn(&mut self, transform: Transform) -> Entity {
        self.world.spawn((transform,))
    }

    pub fn spawn_drawable(
        &mut self,
        transform: Transform,
        geometry: Geometry,
        material: Material,
    ) -> Entity {
        self.world.spawn((transform, geometry, material))
    }

    pub fn spawn_camera(&mut self, transform: Transform, camera: Camera) -> Entity {
        self.world.spawn((transform, camera))
    }

    /// Spawns the light and makes it the scene's shadow caster.
    pub fn spawn_light(&mut self, transform: Transform, light: Light) -> Entity {
        let entity = self.world.spawn((transform, light));
        self.light = Some(entity);
        entity
    }

    pub fn light(&self) -> Option<Entity> {
        self.light.filter(|&e| self.world.get::<&Light>(e).is_ok())
    }

    pub fn set_light(&mut self, light: Option<Entity>) {
        self.light = light;
    }

    /// Re-parents `child`; children are visited in attach order. The
    /// hierarchy is left untouched when `parent` is `child` or one of its
    /// descendants.
    pub fn set_parent(&mut self, child: Entity, parent: Entity) -> Result<(), HierarchyError> {
        if !self.world.contains(child) || !self.world.contains(parent) {
            return Err(hecs::NoSuchEntity.into());
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(HierarchyError::Cycle { child, parent });
        }

        if let Ok(old) = self.world.get::<&Parent>(child).map(|p| p.0) {
            if let Ok(mut children) = self.world.get::<&mut Children>(old) {
                children.0.retain(|&c| c != child);
            }
        }

        self.world.insert_one(child, Parent(parent))?;

        let appended = match self.world.get::<&mut Children>(parent) {
            Ok(mut children) => {
                children.0.push(child);
                true
            }
            Err(_) => false,
        };
        if !appended {
            self.world.insert_one(parent, Children(vec![child]))?;
        }
        Ok(())
    }

    fn is_ancestor_or_self(&self, ancestor: Entity, entity: Entity) -> bool {
        let mut current = entity;
        loop {
            if current == ancestor {
                return true;
            }
            match self.world.get::<&Parent>(current).map(|p| p.0) {
                Ok(parent) => current = parent,
                Err(_) => return false,
            }
        }
    }

    pub fn local_matrix(&self, entity: Entity) -> Mat4 {
        self.world
            .get::<&Transform>(entity)
            .map(|t| t.matrix())
            .unwrap_or(Mat4::IDENTITY)
    }

    /// Accumulated transform from the root down to `entity`.
    pub fn world_matrix(&self, entity: Entity) -> Mat4 {
        let mut matrix = self.local_matrix(entity);
        let mut current = entity;
        while let Ok(parent) = self.world.get::<&Parent>(current).map(|p| p.0) {
            matrix = self.local_matrix(parent) * matrix;
            current = parent;
        }
        matrix
    }

    /// Depth-first walk starting at every root, children in attach order.
    /// `visit` receives each entity with `base * world(entity)`.
    pub fn traverse<F>(&self, base: Mat4, mut visit: F)
    where
        F: FnMut(Entity, Mat4),
    {
        let mut roots: Vec<Entity> = self
            .world
            .query::<&Transform>()
            .without::<&Parent>()
            .iter()
            .map(|(entity, _)| entity)
            .collect();
        roots.sort_by_key(|e| e.id());

        let mut stack: Vec<(Entity, Mat4)> = roots
            .into_iter()
            .rev()
            .map(|root| (root, base))
            .collect();

        while let Some((entity, parent_matrix)) = stack.pop() {
            let matrix = parent_matrix * self.local_matrix(entity);
            visit(entity, matrix);

            if let Ok(children) = self.world.get::<&Children>(entity) {
                stack.extend(children.0.iter().rev().map(|&child| (child, matrix)));
            }
        }
    }

    pub fn has_geometry(&self, entity: Entity) -> bool {
        self.world.get::<&Geometry>(entity).is_ok()
    }

    /// Entities without a material are never drawn.
    pub fn is_visible(&self, entity: Entity) -> bool {
        self.world
            .get::<&Material>(entity)
            .map(|m| m.visible)
            .unwrap_or(false)
    }

    pub fn casts_shadow(&self, entity: Entity) -> bool {
        self.world
            .get::<&Material>(entity)
            .map(|m| m.cast_shadow)
            .unwrap_or(false)
    }

    pub fn add_image(&mut self, source: ImageSource) -> Handle<ImageSource> {
        self.assets.images.insert(source)
    }

    /// Completes an image load. The renderer still has to be told through
    /// `Renderer::notify_image_source_ready`.
    pub fn mark_image_ready(
        &mut self,
        handle: Handle<ImageSource>,
        texture: TextureHandle,
        natural_size: UVec2,
    ) -> bool {
        match self.assets.images.get_mut(handle) {
            Some(source) => {
                source.set_ready(texture, natural_size);
                true
            }
            None => {
                log::warn!("Image source {:?} does not exist", handle);
                false
            }
        }
    }

    pub fn entities_using_image(&self, handle: Handle<ImageSource>) -> Vec<Entity> {
        let mut users: Vec<Entity> = self
            .world
            .query::<(&Material, Option<&Geometry>)>()
            .iter()
            .filter(|(_, (material, geometry))| {
                let shape_mask = match geometry {
                    Some(Geometry::Shape { shape_mask, .. }) => *shape_mask == Some(handle),
                    _ => false,
                };
                shape_mask || material.sources().any(|h| h == handle)
            })
            .map(|(entity, _)| entity)
            .collect();
        users.sort_by_key(|e| e.id());
        users
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Mesh;
    use glam::Vec3;

    fn quad(scene: &mut Scene) -> Handle<Mesh> {
        scene.assets.meshes.insert(Mesh::quad())
    }

    #[test]
    fn traversal_is_depth_first_in_attach_order() {
        let mut scene = Scene::new();
        let root = scene.spawn(Transform::default());
        let a = scene.spawn(Transform::default());
        let b = scene.spawn(Transform::default());
        let a_child = scene.spawn(Transform::default());
        scene.set_parent(a, root).unwrap();
        scene.set_parent(b, root).unwrap();
        scene.set_parent(a_child, a).unwrap();

        let mut visited = Vec::new();
        scene.traverse(Mat4::IDENTITY, |e, _| visited.push(e));

        assert_eq!(visited, vec![root, a, a_child, b]);
    }

    #[test]
    fn traversal_accumulates_parent_transforms() {
        let mut scene = Scene::new();
        let parent = scene.spawn(Transform::from_translation(Vec3::new(0.0, 0.0, 2.0)));
        let child = scene.spawn(Transform::from_translation(Vec3::new(1.0, 0.0, 3.0)));
        scene.set_parent(child, parent).unwrap();

        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, 10.0));
        let mut child_matrix = None;
        scene.traverse(view, |e, m| {
            if e == child {
                child_matrix = Some(m);
            }
        });

        let m = child_matrix.unwrap();
        assert!(m.w_axis.abs_diff_eq(glam::Vec4::new(1.0, 0.0, 15.0, 1.0), 1e-6));
        assert!(scene
            .world_matrix(child)
            .abs_diff_eq(Mat4::from_translation(Vec3::new(1.0, 0.0, 5.0)), 1e-6));
    }

    #[test]
    fn reparenting_moves_child() {
        let mut scene = Scene::new();
        let first = scene.spawn(Transform::default());
        let second = scene.spawn(Transform::default());
        let child = scene.spawn(Transform::default());
        scene.set_parent(child, first).unwrap();
        scene.set_parent(child, second).unwrap();

        assert!(scene.world.get::<&Children>(first).unwrap().0.is_empty());
        assert_eq!(scene.world.get::<&Children>(second).unwrap().0, vec![child]);
    }

    #[test]
    fn parenting_cycles_are_rejected() {
        let mut scene = Scene::new();
        let root = scene.spawn(Transform::default());
        let middle = scene.spawn(Transform::default());
        let leaf = scene.spawn(Transform::default());
        scene.set_parent(middle, root).unwrap();
        scene.set_parent(leaf, middle).unwrap();

        assert!(matches!(
            scene.set_parent(root, leaf),
            Err(HierarchyError::Cycle { .. })
        ));
        assert!(matches!(
            scene.set_parent(middle, middle),
            Err(HierarchyError::Cycle { .. })
        ));

        // Hierarchy is unchanged and traversal still terminates.
        assert!(scene.world.get::<&Parent>(root).is_err());
        assert_eq!(scene.world.get::<&Parent>(middle).unwrap().0, root);
        let mut visited = Vec::new();
        scene.traverse(Mat4::IDENTITY, |e, _| visited.push(e));
        assert_eq!(visited, vec![root, middle, leaf]);
    }

    #[test]
    fn parenting_to_a_despawned_entity_fails_cleanly() {
        let mut scene = Scene::new();
        let child = scene.spawn(Transform::default());
        let gone = scene.spawn(Transform::default());
        scene.world.despawn(gone).unwrap();

        assert!(matches!(
            scene.set_parent(child, gone),
            Err(HierarchyError::NoSuchEntity(_))
        ));
        assert!(scene.world.get::<&Parent>(child).is_err());
    }

    #[test]
    fn predicates_follow_material() {
        let mut scene = Scene::new();
        let mesh = quad(&mut scene);
        let hidden = scene.spawn_drawable(
            Transform::default(),
            Geometry::Generic { mesh },
            Material {
                visible: false,
                cast_shadow: false,
                ..Material::default()
            },
        );
        let bare = scene.world.spawn((Transform::default(), Geometry::Generic { mesh }));

        assert!(scene.has_geometry(hidden));
        assert!(!scene.is_visible(hidden));
        assert!(!scene.casts_shadow(hidden));
        assert!(!scene.is_visible(bare));
    }

    #[test]
    fn image_users_include_shape_masks() {
        let mut scene = Scene::new();
        let mesh = quad(&mut scene);
        let mask = scene.add_image(ImageSource::loading("mask"));
        let color = scene.add_image(ImageSource::loading("color"));

        let shaped = scene.spawn_drawable(
            Transform::default(),
            Geometry::Shape {
                mesh,
                size: glam::Vec2::ONE,
                shaped: true,
                shape_mask: Some(mask),
            },
            Material::default(),
        );
        let textured = scene.spawn_drawable(
            Transform::default(),
            Geometry::Generic { mesh },
            Material {
                color_source: Some(color),
                ..Material::default()
            },
        );

        assert_eq!(scene.entities_using_image(mask), vec![shaped]);
        assert_eq!(scene.entities_using_image(color), vec![textured]);
    }
}
