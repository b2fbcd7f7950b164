use std::ops::Index;

use crate::error::FegridError;

/// Vertices per triangle
pub const VERTICES: usize = 3;

pub const DEFAULT_CONDUCTIVITY: f64 = 30.0;
pub const DEFAULT_BOUNDARY_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

impl Vertex {
    pub fn new(x: f64, y: f64) -> Vertex {
        Vertex { x, y }
    }

    /// Component-wise difference `self - other`
    pub fn offset_from(&self, other: &Vertex) -> Vertex {
        Vertex {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

/// A mesh vertex. Interior nodes carry their dense index among interior
/// nodes; boundary nodes carry `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub vertex: Vertex,
    interior_node_id: Option<usize>,
}

impl Node {
    pub fn interior(vertex: Vertex, interior_node_id: usize) -> Node {
        Node {
            vertex,
            interior_node_id: Some(interior_node_id),
        }
    }

    pub fn boundary(vertex: Vertex) -> Node {
        Node {
            vertex,
            interior_node_id: None,
        }
    }

    pub fn is_interior(&self) -> bool {
        self.interior_node_id.is_some()
    }

    pub fn interior_node_id(&self) -> Option<usize> {
        self.interior_node_id
    }
}

/// A triangle referencing three global node indices, in table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element {
    nodes: [usize; VERTICES],
}

impl Element {
    /// Builds an element after checking that every vertex is a distinct
    /// index below `num_nodes`.
    ///
    /// # Arguments
    /// * `nodes` - Zero-based global node indices
    /// * `num_nodes` - The size of the node table
    ///
    /// # Returns
    /// The element, or a description of the violated constraint
    pub fn new(nodes: [usize; VERTICES], num_nodes: usize) -> Result<Element, String> {
        if let Some(bad) = nodes.iter().find(|&&n| n >= num_nodes) {
            return Err(format!(
                "vertex {} is outside the node table (1..={})",
                bad + 1,
                num_nodes
            ));
        }
        if nodes[0] == nodes[1] || nodes[1] == nodes[2] || nodes[0] == nodes[2] {
            return Err(format!(
                "vertices {} {} {} are not distinct",
                nodes[0] + 1,
                nodes[1] + 1,
                nodes[2] + 1
            ));
        }

        Ok(Element { nodes })
    }

    pub fn nodes(&self) -> &[usize; VERTICES] {
        &self.nodes
    }
}

impl Index<usize> for Element {
    type Output = usize;

    fn index(&self, local_node: usize) -> &usize {
        &self.nodes[local_node]
    }
}

/// Axis-aligned rectangle bounding the problem domain. Nodes on its edges are
/// Dirichlet boundary nodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainExtents {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl DomainExtents {
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Result<Self, FegridError> {
        if !(x_min < x_max) {
            return Err(FegridError::Input(format!(
                "domain x_min ({x_min}) must be less than x_max ({x_max})"
            )));
        }
        if !(y_min < y_max) {
            return Err(FegridError::Input(format!(
                "domain y_min ({y_min}) must be less than y_max ({y_max})"
            )));
        }

        Ok(DomainExtents {
            x_min,
            x_max,
            y_min,
            y_max,
        })
    }

    /// The bounding box of a set of vertices, or `None` for an empty set
    pub fn bounding(vertices: &[Vertex]) -> Option<DomainExtents> {
        let first = vertices.first()?;
        let mut extents = DomainExtents {
            x_min: first.x,
            x_max: first.x,
            y_min: first.y,
            y_max: first.y,
        };
        for v in &vertices[1..] {
            extents.x_min = extents.x_min.min(v.x);
            extents.x_max = extents.x_max.max(v.x);
            extents.y_min = extents.y_min.min(v.y);
            extents.y_max = extents.y_max.max(v.y);
        }
        Some(extents)
    }

    /// True when `vertex` lies strictly inside the rectangle by more than `tolerance`
    pub fn contains_strictly(&self, vertex: &Vertex, tolerance: f64) -> bool {
        vertex.x > self.x_min + tolerance
            && vertex.x < self.x_max - tolerance
            && vertex.y > self.y_min + tolerance
            && vertex.y < self.y_max - tolerance
    }

    /// True when `vertex` lies inside or on the rectangle, widened by `tolerance`
    pub fn contains(&self, vertex: &Vertex, tolerance: f64) -> bool {
        vertex.x >= self.x_min - tolerance
            && vertex.x <= self.x_max + tolerance
            && vertex.y >= self.y_min - tolerance
            && vertex.y <= self.y_max + tolerance
    }
}

/// Material and classification parameters for a run
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetadata {
    pub conductivity: f64,
    pub area_weighted: bool,
    pub boundary_tolerance: f64,
    pub extents: Option<DomainExtents>,
}

impl Default for ModelMetadata {
    fn default() -> Self {
        ModelMetadata {
            conductivity: DEFAULT_CONDUCTIVITY,
            area_weighted: false,
            boundary_tolerance: DEFAULT_BOUNDARY_TOLERANCE,
            extents: None,
        }
    }
}
