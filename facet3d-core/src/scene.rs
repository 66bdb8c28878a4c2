/// Scene graph with arena-owned nodes and top-down transform propagation.
///
/// Nodes live in a [`SlotMap`] owned by the [`Scene`]; parents own their
/// children through key lists and every node keeps a non-owning key back to
/// its parent. A node has at most one parent at a time. Removing a node never
/// destroys its children: they become detached roots that the caller may
/// re-attach or remove.
use nalgebra::{Matrix4, Point3, Vector3};
use slotmap::{new_key_type, SlotMap};

use crate::error::SceneError;
use crate::geometry::Mesh;
use crate::math::{translation_of, RotationState, Transform};

new_key_type! {
    /// Stable handle to a node in a [`Scene`]
    pub struct NodeKey;
}

/// Position, rotation and scale plus the matrices derived from them
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTransform {
    pub position: Vector3<f32>,
    pub rotation: RotationState,
    pub scale: Vector3<f32>,
    local: Matrix4<f32>,
    world: Matrix4<f32>,
}

impl NodeTransform {
    pub fn new() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: RotationState::zero(),
            scale: Vector3::new(1.0, 1.0, 1.0),
            local: Matrix4::identity(),
            world: Matrix4::identity(),
        }
    }

    /// `T * Rz * Rx * Ry`, with `S` appended when `apply_scale` is set
    pub fn update_local_matrix(&mut self, apply_scale: bool) -> Matrix4<f32> {
        let p = self.position;
        let mut local = Transform::translation(p.x, p.y, p.z) * self.rotation.to_matrix();
        if apply_scale {
            local *= Transform::scale(self.scale.x, self.scale.y, self.scale.z);
        }
        self.local = local;
        local
    }

    /// `world = parent_world * local`, or `world = local` for a root
    pub fn update_world_matrix(
        &mut self,
        parent_world: Option<&Matrix4<f32>>,
        force_local: Option<bool>,
    ) -> Matrix4<f32> {
        if let Some(apply_scale) = force_local {
            self.update_local_matrix(apply_scale);
        }
        self.world = match parent_world {
            Some(parent) => parent * self.local,
            None => self.local,
        };
        self.world
    }

    /// Overwrite the world matrix directly (used by the camera's look-at)
    pub fn set_world_matrix(&mut self, world: Matrix4<f32>) {
        self.world = world;
    }

    pub fn local_matrix(&self) -> &Matrix4<f32> {
        &self.local
    }

    pub fn world_matrix(&self) -> &Matrix4<f32> {
        &self.world
    }

    pub fn world_position(&self) -> Point3<f32> {
        translation_of(&self.world)
    }
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self::new()
    }
}

/// What a node carries besides its transform
#[derive(Debug, Clone)]
pub enum NodeKind {
    Group,
    Mesh(Mesh),
}

impl NodeKind {
    /// Groups and meshes both apply their scale to the local matrix
    fn applies_scale(&self) -> bool {
        match self {
            NodeKind::Group | NodeKind::Mesh(_) => true,
        }
    }
}

/// A node in the scene graph
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub transform: NodeTransform,
    pub kind: NodeKind,
    /// Hidden nodes hide their whole subtree from the renderer
    pub visible: bool,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
}

impl SceneNode {
    pub fn group(name: impl Into<String>) -> Self {
        Self::with_kind(name, NodeKind::Group)
    }

    pub fn mesh(name: impl Into<String>, mesh: Mesh) -> Self {
        Self::with_kind(name, NodeKind::Mesh(mesh))
    }

    fn with_kind(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            transform: NodeTransform::new(),
            kind,
            visible: true,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn with_position(mut self, x: f32, y: f32, z: f32) -> Self {
        self.transform.position = Vector3::new(x, y, z);
        self
    }

    pub fn with_rotation(mut self, x: f32, y: f32, z: f32) -> Self {
        self.transform.rotation = RotationState::new(x, y, z);
        self
    }

    pub fn with_scale(mut self, x: f32, y: f32, z: f32) -> Self {
        self.transform.scale = Vector3::new(x, y, z);
        self
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    pub fn as_mesh(&self) -> Option<&Mesh> {
        match &self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            NodeKind::Group => None,
        }
    }

    pub fn as_mesh_mut(&mut self) -> Option<&mut Mesh> {
        match &mut self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            NodeKind::Group => None,
        }
    }
}

/// Arena of scene nodes with a fixed root group
#[derive(Debug)]
pub struct Scene {
    nodes: SlotMap<NodeKey, SceneNode>,
    root: NodeKey,
}

impl Scene {
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(SceneNode::group("scene"));
        Self { nodes, root }
    }

    pub fn root(&self) -> NodeKey {
        self.root
    }

    /// Insert a detached node
    pub fn insert(&mut self, node: SceneNode) -> NodeKey {
        let mut node = node;
        node.parent = None;
        node.children.clear();
        self.nodes.insert(node)
    }

    /// Insert a node and attach it under `parent`
    pub fn add_child(&mut self, parent: NodeKey, node: SceneNode) -> Result<NodeKey, SceneError> {
        if !self.nodes.contains_key(parent) {
            return Err(SceneError::MissingNode);
        }
        let key = self.insert(node);
        self.add(parent, key)?;
        Ok(key)
    }

    /// Attach `child` under `parent`, detaching it from its previous parent first
    pub fn add(&mut self, parent: NodeKey, child: NodeKey) -> Result<(), SceneError> {
        if !self.nodes.contains_key(parent) || !self.nodes.contains_key(child) {
            return Err(SceneError::MissingNode);
        }
        if child == self.root {
            return Err(SceneError::RootImmovable);
        }
        if self.is_ancestor_or_self(child, parent) {
            tracing::warn!(node = %self.nodes[child].name, "Rejected attach that would create a cycle");
            return Err(SceneError::WouldCreateCycle);
        }

        self.detach(child)?;
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
        Ok(())
    }

    /// Detach `child` from its parent; it stays in the arena as a root
    pub fn detach(&mut self, child: NodeKey) -> Result<(), SceneError> {
        if child == self.root {
            return Err(SceneError::RootImmovable);
        }
        let node = self.nodes.get_mut(child).ok_or(SceneError::MissingNode)?;
        if let Some(parent) = node.parent.take() {
            if let Some(parent) = self.nodes.get_mut(parent) {
                parent.children.retain(|&k| k != child);
            }
        }
        Ok(())
    }

    /// Remove a node from the arena. Its children become detached roots.
    pub fn remove(&mut self, key: NodeKey) -> Result<SceneNode, SceneError> {
        self.detach(key)?;
        let mut node = self.nodes.remove(key).ok_or(SceneError::MissingNode)?;
        for child in node.children.drain(..) {
            if let Some(child) = self.nodes.get_mut(child) {
                child.parent = None;
            }
        }
        Ok(node)
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn get(&self, key: NodeKey) -> Option<&SceneNode> {
        self.nodes.get(key)
    }

    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut SceneNode> {
        self.nodes.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn is_ancestor_or_self(&self, ancestor: NodeKey, mut node: NodeKey) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.nodes.get(node).and_then(|n| n.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    /// Recompute local and world matrices of every node, parents before children
    pub fn update_world_matrices(&mut self) {
        let roots: Vec<NodeKey> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(key, _)| key)
            .collect();

        let mut stack: Vec<(NodeKey, Option<Matrix4<f32>>)> =
            roots.into_iter().map(|key| (key, None)).collect();
        while let Some((key, parent_world)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(key) else {
                continue;
            };
            let apply_scale = node.kind.applies_scale();
            let world = node
                .transform
                .update_world_matrix(parent_world.as_ref(), Some(apply_scale));
            for &child in node.children.iter().rev() {
                stack.push((child, Some(world)));
            }
        }
    }

    /// Visible nodes reachable from the root, depth-first, parents before children
    pub fn traverse_visible(&self) -> Vec<NodeKey> {
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(key) = stack.pop() {
            let Some(node) = self.nodes.get(key) else {
                continue;
            };
            if !node.visible {
                continue;
            }
            order.push(key);
            stack.extend(node.children.iter().rev().copied());
        }
        order
    }

    /// Visible mesh nodes in traversal order
    pub fn visible_meshes(&self) -> Vec<(NodeKey, &SceneNode, &Mesh)> {
        self.traverse_visible()
            .into_iter()
            .filter_map(|key| {
                let node = &self.nodes[key];
                node.as_mesh().map(|mesh| (key, node, mesh))
            })
            .collect()
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
    use crate::material::Material;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn add_sets_parent_and_reparenting_moves_child() {
        let mut scene = Scene::new();
        let a = scene.add_child(scene.root(), SceneNode::group("a")).unwrap();
        let b = scene.add_child(scene.root(), SceneNode::group("b")).unwrap();
        let c = scene.add_child(a, SceneNode::group("c")).unwrap();
        assert_eq!(scene.get(c).unwrap().parent(), Some(a));

        scene.add(b, c).unwrap();
        assert_eq!(scene.get(c).unwrap().parent(), Some(b));
        assert!(scene.get(a).unwrap().children().is_empty());
        assert_eq!(scene.get(b).unwrap().children(), &[c]);
    }

    #[test]
    fn cycles_are_rejected() {
        let mut scene = Scene::new();
        let a = scene.add_child(scene.root(), SceneNode::group("a")).unwrap();
        let b = scene.add_child(a, SceneNode::group("b")).unwrap();
        assert_eq!(scene.add(b, a), Err(SceneError::WouldCreateCycle));
        assert_eq!(scene.add(a, a), Err(SceneError::WouldCreateCycle));
        assert_eq!(scene.add(a, scene.root()), Err(SceneError::RootImmovable));
    }

    #[test]
    fn removing_a_node_detaches_children() {
        let mut scene = Scene::new();
        let a = scene.add_child(scene.root(), SceneNode::group("a")).unwrap();
        let b = scene.add_child(a, SceneNode::group("b")).unwrap();

        let removed = scene.remove(a).unwrap();
        assert_eq!(removed.name, "a");
        assert!(!scene.contains(a));
        assert!(scene.contains(b));
        assert_eq!(scene.get(b).unwrap().parent(), None);
        assert!(scene.get(scene.root()).unwrap().children().is_empty());
        assert_eq!(scene.remove(a).unwrap_err(), SceneError::MissingNode);
    }

    #[test]
    fn world_matrix_composes_parent_then_local() {
        let mut scene = Scene::new();
        let parent = scene
            .add_child(
                scene.root(),
                SceneNode::group("parent")
                    .with_position(10.0, 0.0, 0.0)
                    .with_rotation(0.0, 0.0, FRAC_PI_2),
            )
            .unwrap();
        let child = scene
            .add_child(parent, SceneNode::group("child").with_position(1.0, 0.0, 0.0))
            .unwrap();

        scene.update_world_matrices();
        let p = scene.get(child).unwrap().transform.world_position();
        assert_relative_eq!(p.x, 10.0, epsilon = 1e-5);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn reparented_child_never_reads_stale_parent() {
        let mut scene = Scene::new();
        let child = scene.insert(SceneNode::group("child").with_position(0.0, 1.0, 0.0));
        let parent = scene
            .add_child(scene.root(), SceneNode::group("parent").with_position(0.0, 0.0, 5.0))
            .unwrap();
        scene.update_world_matrices();
        assert_relative_eq!(scene.get(child).unwrap().transform.world_position().z, 0.0);

        scene.get_mut(parent).unwrap().transform.position.z = 7.0;
        scene.add(parent, child).unwrap();
        scene.update_world_matrices();
        let p = scene.get(child).unwrap().transform.world_position();
        assert_relative_eq!(p.z, 7.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn mesh_scale_is_applied() {
        let mut scene = Scene::new();
        let mesh = scene
            .add_child(
                scene.root(),
                SceneNode::mesh("cube", Mesh::cube(1.0, Material::default()))
                    .with_scale(2.0, 2.0, 2.0),
            )
            .unwrap();
        scene.update_world_matrices();
        let world = scene.get(mesh).unwrap().transform.world_matrix();
        let corner = Transform::transform_point(world, &Point3::new(0.5, 0.5, 0.5));
        assert_relative_eq!(corner.x, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn hidden_nodes_hide_their_subtree() {
        let mut scene = Scene::new();
        let group = scene.add_child(scene.root(), SceneNode::group("g")).unwrap();
        scene
            .add_child(group, SceneNode::mesh("m", Mesh::cube(1.0, Material::default())))
            .unwrap();
        assert_eq!(scene.visible_meshes().len(), 1);

        scene.get_mut(group).unwrap().visible = false;
        assert!(scene.visible_meshes().is_empty());
    }
}
