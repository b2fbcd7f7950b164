//! Triangular finite-element grid.
//!
//! A grid is loaded from two plain-text tables:
//! - `<prefix>.node`: a node count `N`, then `N` records of `<id> <x> <y>`
//! - `<prefix>.elem`: an element count `M`, then `M` records of `<id> <v1> <v2> <v3>`
//!
//! All ids are 1-based in the files and 0-based once loaded. Nodes strictly
//! inside the domain rectangle are interior and receive a dense interior index
//! in record order; every other node is a Dirichlet boundary node.

use std::path::Path;
use std::str::{FromStr, SplitWhitespace};

use nalgebra::Vector2;
use tracing::{debug, info, warn};

use crate::{
    datatypes::{DomainExtents, Element, ModelMetadata, Node, Vertex, VERTICES},
    error::FegridError,
};

#[derive(Debug, Clone)]
pub struct FeGrid {
    nodes: Vec<Node>,
    elements: Vec<Element>,
    num_interior_nodes: usize,
    extents: DomainExtents,
}

/// Non-blank lines of a table, with 1-based line numbers
type TableLines<'a> = Box<dyn Iterator<Item = (usize, &'a str)> + 'a>;

fn table_lines(contents: &str) -> TableLines<'_> {
    Box::new(
        contents
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line))
            .filter(|(_, line)| !line.trim().is_empty()),
    )
}

/// Reads the leading record count of a table
fn parse_count(lines: &mut TableLines, table: &str) -> Result<usize, FegridError> {
    let (line_no, line) = match lines.next() {
        Some(l) => l,
        None => {
            return Err(FegridError::MeshLoad(format!(
                "{table}: empty table, expected a record count"
            )))
        }
    };

    let count: i64 = match line.trim().parse() {
        Ok(c) => c,
        Err(_) => {
            return Err(FegridError::MeshLoad(format!(
                "{table}:{line_no}: record count '{}' is not an integer",
                line.trim()
            )))
        }
    };

    if count <= 0 {
        return Err(FegridError::MeshLoad(format!(
            "{table}:{line_no}: record count must be positive, got {count}"
        )));
    }

    Ok(count as usize)
}

fn parse_field<T: FromStr>(
    fields: &mut SplitWhitespace,
    name: &str,
    table: &str,
    line_no: usize,
) -> Result<T, FegridError> {
    let raw = match fields.next() {
        Some(f) => f,
        None => {
            return Err(FegridError::MeshLoad(format!(
                "{table}:{line_no}: missing {name}"
            )))
        }
    };

    match raw.parse() {
        Ok(v) => Ok(v),
        Err(_) => Err(FegridError::MeshLoad(format!(
            "{table}:{line_no}: invalid {name} '{raw}'"
        ))),
    }
}

/// Converts a 1-based table id into a 0-based index below `count`
fn zero_based(id: i64, count: usize, what: &str, table: &str, line_no: usize) -> Result<usize, FegridError> {
    if id < 1 || id as u64 > count as u64 {
        return Err(FegridError::MeshLoad(format!(
            "{table}:{line_no}: {what} {id} is outside 1..={count}"
        )));
    }
    Ok((id - 1) as usize)
}

/// Takes the `count` declared records, failing before any allocation sized by
/// `count` when the table holds fewer
fn record_lines<'a>(
    lines: TableLines<'a>,
    table: &str,
    count: usize,
) -> Result<Vec<(usize, &'a str)>, FegridError> {
    let mut records: Vec<(usize, &'a str)> = lines.collect();
    if records.len() < count {
        return Err(FegridError::MeshLoad(format!(
            "{table}: expected {count} records, found {}",
            records.len()
        )));
    }

    let trailing = records.len() - count;
    if trailing > 0 {
        warn!("{table}: ignoring {trailing} lines after the declared records");
    }
    records.truncate(count);
    Ok(records)
}

/// Parses a node table into vertices in record order
///
/// # Returns
/// A vector of `(node index, vertex)` pairs in the order they appear
fn parse_node_table(contents: &str, table: &str) -> Result<Vec<(usize, Vertex)>, FegridError> {
    let mut lines = table_lines(contents);
    let count = parse_count(&mut lines, table)?;
    let lines = record_lines(lines, table, count)?;

    let mut seen = vec![false; count];
    let mut records: Vec<(usize, Vertex)> = Vec::with_capacity(count);

    for (line_no, line) in lines {
        let mut fields = line.split_whitespace();

        let id: i64 = parse_field(&mut fields, "node id", table, line_no)?;
        let x: f64 = parse_field(&mut fields, "x coordinate", table, line_no)?;
        let y: f64 = parse_field(&mut fields, "y coordinate", table, line_no)?;

        if !x.is_finite() || !y.is_finite() {
            return Err(FegridError::MeshLoad(format!(
                "{table}:{line_no}: node {id} has a non-finite coordinate"
            )));
        }

        let index = zero_based(id, count, "node id", table, line_no)?;
        if seen[index] {
            return Err(FegridError::MeshLoad(format!(
                "{table}:{line_no}: duplicate node id {id}"
            )));
        }
        seen[index] = true;

        records.push((index, Vertex::new(x, y)));
    }

    Ok(records)
}

/// Parses an element table, validating every vertex against `num_nodes`
fn parse_element_table(
    contents: &str,
    table: &str,
    num_nodes: usize,
) -> Result<Vec<Element>, FegridError> {
    let mut lines = table_lines(contents);
    let count = parse_count(&mut lines, table)?;
    let lines = record_lines(lines, table, count)?;

    let mut slots: Vec<Option<Element>> = vec![None; count];

    for (line_no, line) in lines {
        let mut fields = line.split_whitespace();

        let id: i64 = parse_field(&mut fields, "element id", table, line_no)?;
        let index = zero_based(id, count, "element id", table, line_no)?;

        let mut vertices = [0usize; VERTICES];
        for (local, vertex) in vertices.iter_mut().enumerate() {
            let raw: i64 = parse_field(
                &mut fields,
                &format!("vertex {}", local + 1),
                table,
                line_no,
            )?;
            *vertex = zero_based(raw, num_nodes, "vertex", table, line_no)?;
        }

        let element = match Element::new(vertices, num_nodes) {
            Ok(e) => e,
            Err(msg) => {
                return Err(FegridError::MeshLoad(format!(
                    "{table}:{line_no}: element {id}: {msg}"
                )))
            }
        };

        if slots[index].is_some() {
            return Err(FegridError::MeshLoad(format!(
                "{table}:{line_no}: duplicate element id {id}"
            )));
        }
        slots[index] = Some(element);
    }

    // ids are distinct and within 1..=count, so every slot is filled
    match slots.into_iter().collect::<Option<Vec<Element>>>() {
        Some(elements) => Ok(elements),
        None => Err(FegridError::MeshLoad(format!(
            "{table}: element ids do not cover 1..={count}"
        ))),
    }
}

fn read_table(path: &Path) -> Result<String, FegridError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(contents),
        Err(err) => Err(FegridError::MeshLoad(format!(
            "Unable to open {}: {err}",
            path.display()
        ))),
    }
}

impl FeGrid {
    /// Loads `<prefix>.node` and `<prefix>.elem`
    ///
    /// # Arguments
    /// * `prefix` - The common file name prefix, without extension
    /// * `metadata` - Supplies the domain extents and boundary tolerance
    pub fn load_prefix(prefix: &str, metadata: &ModelMetadata) -> Result<FeGrid, FegridError> {
        let node_file = format!("{prefix}.node");
        let element_file = format!("{prefix}.elem");
        FeGrid::load(Path::new(&node_file), Path::new(&element_file), metadata)
    }

    /// Loads a grid from a node table file and an element table file
    pub fn load(
        node_file: &Path,
        element_file: &Path,
        metadata: &ModelMetadata,
    ) -> Result<FeGrid, FegridError> {
        let node_contents = read_table(node_file)?;
        let element_contents = read_table(element_file)?;

        FeGrid::parse(
            &node_contents,
            &node_file.display().to_string(),
            &element_contents,
            &element_file.display().to_string(),
            metadata,
        )
    }

    /// Builds a grid from in-memory table contents
    pub fn from_tables(
        node_table: &str,
        element_table: &str,
        metadata: &ModelMetadata,
    ) -> Result<FeGrid, FegridError> {
        FeGrid::parse(node_table, "node table", element_table, "element table", metadata)
    }

    fn parse(
        node_contents: &str,
        node_name: &str,
        element_contents: &str,
        element_name: &str,
        metadata: &ModelMetadata,
    ) -> Result<FeGrid, FegridError> {
        let records = parse_node_table(node_contents, node_name)?;
        let tolerance = metadata.boundary_tolerance;

        let extents = match metadata.extents {
            Some(extents) => {
                let outside = records
                    .iter()
                    .filter(|(_, v)| !extents.contains(v, tolerance))
                    .count();
                if outside > 0 {
                    warn!("{outside} nodes lie outside the configured domain extents {extents:?}");
                }
                extents
            }
            None => {
                let vertices: Vec<Vertex> = records.iter().map(|(_, v)| *v).collect();
                match DomainExtents::bounding(&vertices) {
                    Some(extents) => extents,
                    None => {
                        return Err(FegridError::MeshLoad(format!("{node_name}: no nodes")))
                    }
                }
            }
        };
        debug!("classifying nodes against {extents:?} with tolerance {tolerance}");

        let mut slots: Vec<Option<Node>> = vec![None; records.len()];
        let mut num_interior_nodes = 0;
        for (index, vertex) in records {
            slots[index] = Some(if extents.contains_strictly(&vertex, tolerance) {
                num_interior_nodes += 1;
                Node::interior(vertex, num_interior_nodes - 1)
            } else {
                Node::boundary(vertex)
            });
        }
        let nodes = match slots.into_iter().collect::<Option<Vec<Node>>>() {
            Some(nodes) => nodes,
            None => {
                return Err(FegridError::MeshLoad(format!(
                    "{node_name}: node ids do not cover the declared count"
                )))
            }
        };

        let elements = parse_element_table(element_contents, element_name, nodes.len())?;

        info!(
            "loaded {} nodes ({} interior) and {} elements",
            nodes.len(),
            num_interior_nodes,
            elements.len()
        );

        Ok(FeGrid {
            nodes,
            elements,
            num_interior_nodes,
            extents,
        })
    }

    /// Edge vectors from local vertex `from` to the next two vertices in
    /// cyclic element order
    fn edge_vectors(&self, element: usize, from: usize) -> (Vertex, Vertex) {
        let e = &self.elements[element];
        let base = &self.nodes[e[from]].vertex;
        let d0 = self.nodes[e[(from + 1) % VERTICES]].vertex.offset_from(base);
        let d1 = self.nodes[e[(from + 2) % VERTICES]].vertex.offset_from(base);
        (d0, d1)
    }

    /// Calculates the unsigned area of an element
    pub fn element_area(&self, element: usize) -> f64 {
        let (d0, d1) = self.edge_vectors(element, 0);
        (d0.x * d1.y - d1.x * d0.y).abs() / 2.0
    }

    /// Calculates the gradient of the linear shape function of one local node,
    /// constant over the triangle. The y component is `-dN/dy`, which is what
    /// the kij dump records; `B^T C B` is unaffected since `C` is diagonal.
    ///
    /// # Arguments
    /// * `element` - The element index
    /// * `local_node` - The local node number (0, 1 or 2)
    ///
    /// # Returns
    /// The gradient, or `DegenerateElement` if the triangle has zero area
    pub fn gradient(&self, element: usize, local_node: usize) -> Result<Vector2<f64>, FegridError> {
        let (d0, d1) = self.edge_vectors(element, local_node);
        let det = d0.x * d1.y - d1.x * d0.y;

        if det == 0.0 || !det.is_finite() {
            return Err(FegridError::DegenerateElement { element, det });
        }

        Ok(Vector2::new(-(d1.y - d0.y) / det, -(d1.x - d0.x) / det))
    }

    pub fn get_node(&self, element: usize, local_node: usize) -> &Node {
        &self.nodes[self.elements[element][local_node]]
    }

    pub fn element(&self, i: usize) -> &Element {
        &self.elements[i]
    }

    pub fn node(&self, i: usize) -> &Node {
        &self.nodes[i]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_interior_nodes(&self) -> usize {
        self.num_interior_nodes
    }

    pub fn extents(&self) -> &DomainExtents {
        &self.extents
    }
}

/// Node and element tables for an `nx` by `ny` lattice with spacing `h`,
/// each cell split along its rising diagonal.
#[cfg(test)]
pub(crate) fn structured_tables(nx: usize, ny: usize, h: f64) -> (String, String) {
    let mut nodes = format!("{}\n", nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            nodes.push_str(&format!(
                "{} {} {}\n",
                j * nx + i + 1,
                i as f64 * h,
                j as f64 * h
            ));
        }
    }

    let mut count = 0;
    let mut body = String::new();
    for j in 0..ny - 1 {
        for i in 0..nx - 1 {
            let a = j * nx + i + 1;
            let b = a + 1;
            let c = b + nx;
            let d = a + nx;
            count += 1;
            body.push_str(&format!("{count} {a} {b} {c}\n"));
            count += 1;
            body.push_str(&format!("{count} {a} {c} {d}\n"));
        }
    }

    (nodes, format!("{count}\n{body}"))
}
