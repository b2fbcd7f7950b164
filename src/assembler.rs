use std::io::Write;
use std::path::PathBuf;

use indicatif::ProgressBar;
use nalgebra::{matrix, DMatrix, Matrix2, MatrixXx2};
use tracing::{debug, error, info};

use crate::{
    datatypes::{ModelMetadata, VERTICES},
    error::FegridError,
    grid::FeGrid,
};

/// Builds the isotropic conductivity tensor `diag(k, k)`
pub fn compute_conductivity_tensor(conductivity: f64) -> Matrix2<f64> {
    matrix![
        conductivity, 0.0;
        0.0, conductivity;
    ]
}

/// The local node numbers of an element whose nodes are interior, in local order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteriorLocals {
    locals: [usize; VERTICES],
    len: usize,
}

impl InteriorLocals {
    pub fn of_element(grid: &FeGrid, element: usize) -> InteriorLocals {
        let mut locals = [0; VERTICES];
        let mut len = 0;
        for local in 0..VERTICES {
            if grid.get_node(element, local).is_interior() {
                locals[len] = local;
                len += 1;
            }
        }
        InteriorLocals { locals, len }
    }

    /// All three local nodes, regardless of classification
    pub fn all() -> InteriorLocals {
        InteriorLocals {
            locals: [0, 1, 2],
            len: VERTICES,
        }
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.locals[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// One element's contribution before it is scattered into the global matrix
#[derive(Debug, Clone)]
pub struct LocalBlock {
    pub element: usize,
    pub locals: InteriorLocals,
    /// `B^T C`, one row per local node
    pub bt_c: MatrixXx2<f64>,
    /// `(B^T C) B`, square over the local nodes
    pub stiffness: DMatrix<f64>,
}

/// Calculates the `k x 2` matrix whose rows are the shape-function gradients
/// of the selected local nodes
pub fn compute_gradient_matrix(
    grid: &FeGrid,
    element: usize,
    locals: &[usize],
) -> Result<MatrixXx2<f64>, FegridError> {
    let mut bt = MatrixXx2::zeros(locals.len());
    for (row, &local) in locals.iter().enumerate() {
        let g = grid.gradient(element, local)?;
        bt[(row, 0)] = g.x;
        bt[(row, 1)] = g.y;
    }
    Ok(bt)
}

/// Computes the local stiffness block of an element over the given local nodes
///
/// # Arguments
/// * `grid` - The grid owning the element
/// * `element` - The element index
/// * `locals` - The local nodes that become rows and columns of the block
/// * `tensor` - The conductivity tensor
/// * `area_weighted` - Whether to scale the block by the element area
pub fn compute_local_block(
    grid: &FeGrid,
    element: usize,
    locals: InteriorLocals,
    tensor: &Matrix2<f64>,
    area_weighted: bool,
) -> Result<LocalBlock, FegridError> {
    let bt = compute_gradient_matrix(grid, element, locals.as_slice())?;
    let bt_c = &bt * tensor;
    let mut stiffness: DMatrix<f64> = &bt_c * bt.transpose();

    if area_weighted {
        stiffness *= grid.element_area(element);
    }

    Ok(LocalBlock {
        element,
        locals,
        bt_c,
        stiffness,
    })
}

/// Hooks into the element loop of [`StiffnessAssembler`]
pub trait AssemblyObserver {
    fn observe_init(&mut self, _num_elements: usize) {}

    /// Called after each element with at least one interior node
    fn observe_element(&mut self, _block: &LocalBlock) {}

    fn observe_final(&mut self, _global: &DMatrix<f64>) {}
}

/// Progress bar over the element loop
pub struct ProgressObserver {
    bar: Option<ProgressBar>,
}

impl ProgressObserver {
    pub fn new() -> ProgressObserver {
        ProgressObserver { bar: None }
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        ProgressObserver::new()
    }
}

impl AssemblyObserver for ProgressObserver {
    fn observe_init(&mut self, num_elements: usize) {
        self.bar = Some(ProgressBar::new(num_elements as u64));
    }

    fn observe_element(&mut self, block: &LocalBlock) {
        if let Some(bar) = &self.bar {
            bar.set_position(block.element as u64 + 1);
        }
    }

    fn observe_final(&mut self, _global: &DMatrix<f64>) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Overwrites a binary file with the `B^T C` block of the most recent element.
/// Write failures are logged and never interrupt assembly.
pub struct KijDumpObserver {
    path: PathBuf,
}

impl KijDumpObserver {
    pub fn new(path: impl Into<PathBuf>) -> KijDumpObserver {
        KijDumpObserver { path: path.into() }
    }

    fn write_block(&self, block: &LocalBlock) -> std::io::Result<()> {
        let mut bytes: Vec<u8> = Vec::with_capacity(block.bt_c.len() * 8);
        for row in block.bt_c.row_iter() {
            for value in row.iter() {
                bytes.extend_from_slice(&value.to_ne_bytes());
            }
        }

        let mut file = std::fs::File::create(&self.path)?;
        file.write_all(&bytes)
    }
}

impl AssemblyObserver for KijDumpObserver {
    fn observe_element(&mut self, block: &LocalBlock) {
        if let Err(err) = self.write_block(block) {
            error!(
                "unable to write element {} block to {}: {err}",
                block.element,
                self.path.display()
            );
        }
    }
}

/// Assembles the dense global stiffness matrix over the interior nodes of a grid
pub struct StiffnessAssembler<'a> {
    grid: &'a FeGrid,
    tensor: Matrix2<f64>,
    area_weighted: bool,
    observers: Vec<Box<dyn AssemblyObserver + 'a>>,
}

impl<'a> StiffnessAssembler<'a> {
    pub fn new(grid: &'a FeGrid, metadata: &ModelMetadata) -> StiffnessAssembler<'a> {
        StiffnessAssembler {
            grid,
            tensor: compute_conductivity_tensor(metadata.conductivity),
            area_weighted: metadata.area_weighted,
            observers: Vec::new(),
        }
    }

    pub fn add_observer<O: AssemblyObserver + 'a>(mut self, observer: O) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Scatter-adds one local block into the global matrix
    fn scatter(&self, global: &mut DMatrix<f64>, block: &LocalBlock) {
        let locals = block.locals.as_slice();
        for (m, &local_m) in locals.iter().enumerate() {
            let row = self
                .grid
                .get_node(block.element, local_m)
                .interior_node_id()
                .expect("interior local node has no interior index");
            for (n, &local_n) in locals.iter().enumerate() {
                let col = self
                    .grid
                    .get_node(block.element, local_n)
                    .interior_node_id()
                    .expect("interior local node has no interior index");
                global[(row, col)] += block.stiffness[(m, n)];
            }
        }
    }

    /// Runs the element loop
    ///
    /// # Returns
    /// A square matrix of size `num_interior_nodes`, indexed by interior node id
    pub fn run(mut self) -> Result<DMatrix<f64>, FegridError> {
        let size = self.grid.num_interior_nodes();
        let num_elements = self.grid.num_elements();
        let mut global: DMatrix<f64> = DMatrix::zeros(size, size);

        info!("assembling {size}x{size} stiffness matrix from {num_elements} elements");
        for observer in self.observers.iter_mut() {
            observer.observe_init(num_elements);
        }

        let mut skipped = 0;
        for element in 0..num_elements {
            let locals = InteriorLocals::of_element(self.grid, element);
            if locals.is_empty() {
                skipped += 1;
                continue;
            }
            debug!("element {element}: {} interior nodes", locals.len());

            let block =
                compute_local_block(self.grid, element, locals, &self.tensor, self.area_weighted)?;
            self.scatter(&mut global, &block);

            for observer in self.observers.iter_mut() {
                observer.observe_element(&block);
            }
        }

        for observer in self.observers.iter_mut() {
            observer.observe_final(&global);
        }
        info!(
            "assembled stiffness matrix ({} elements without interior nodes skipped)",
            skipped
        );

        Ok(global)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::structured_tables;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn structured_grid(nx: usize, ny: usize, h: f64) -> FeGrid {
        let (nodes, elements) = structured_tables(nx, ny, h);
        FeGrid::from_tables(&nodes, &elements, &ModelMetadata::default()).unwrap()
    }

    fn assemble(grid: &FeGrid, metadata: &ModelMetadata) -> DMatrix<f64> {
        StiffnessAssembler::new(grid, metadata).run().unwrap()
    }

    /// Records which elements reached the observer
    struct Recorder {
        seen: Rc<RefCell<Vec<(usize, usize)>>>,
    }

    impl AssemblyObserver for Recorder {
        fn observe_element(&mut self, block: &LocalBlock) {
            self.seen.borrow_mut().push((block.element, block.locals.len()));
        }
    }

    #[test]
    fn test_conductivity_tensor_is_diagonal() {
        let c = compute_conductivity_tensor(30.0);
        assert_eq!(c, Matrix2::new(30.0, 0.0, 0.0, 30.0));
    }

    #[test]
    fn test_all_boundary_square_gives_empty_matrix() {
        let nodes = "4\n1 0 0\n2 1 0\n3 1 1\n4 0 1\n";
        let elements = "2\n1 1 2 3\n2 1 3 4\n";
        let grid = FeGrid::from_tables(nodes, elements, &ModelMetadata::default()).unwrap();
        assert_eq!(grid.num_interior_nodes(), 0);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let global = StiffnessAssembler::new(&grid, &ModelMetadata::default())
            .add_observer(Recorder { seen: seen.clone() })
            .run()
            .unwrap();

        assert_eq!(global.shape(), (0, 0));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_single_interior_node_value() {
        let grid = structured_grid(3, 3, 1.0);
        let global = assemble(&grid, &ModelMetadata::default());

        // the center touches six triangles: two where it is the right-angle
        // vertex (|grad N|^2 = 2) and four where it is acute (|grad N|^2 = 1)
        assert_eq!(global.shape(), (1, 1));
        assert!((global[(0, 0)] - 30.0 * 8.0).abs() < 1e-12, "{}", global[(0, 0)]);
    }

    #[test]
    fn test_single_interior_node_sums_self_stiffness() {
        let grid = structured_grid(3, 3, 1.0);
        let tensor = compute_conductivity_tensor(30.0);
        let global = assemble(&grid, &ModelMetadata::default());

        let mut expected = 0.0;
        for element in 0..grid.num_elements() {
            for local in 0..VERTICES {
                if grid.get_node(element, local).is_interior() {
                    let g = grid.gradient(element, local).unwrap();
                    expected += (g.transpose() * tensor * g)[(0, 0)];
                }
            }
        }
        assert!((global[(0, 0)] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_area_weighting_gives_five_point_stencil() {
        let grid = structured_grid(5, 5, 0.25);
        let metadata = ModelMetadata {
            conductivity: 1.0,
            area_weighted: true,
            ..ModelMetadata::default()
        };
        let global = assemble(&grid, &metadata);

        assert_eq!(global.shape(), (9, 9));
        // interior ids follow row-major order over the 3x3 interior block
        let center = 4;
        assert!((global[(center, center)] - 4.0).abs() < 1e-12);
        for neighbor in [1, 3, 5, 7] {
            assert!((global[(center, neighbor)] + 1.0).abs() < 1e-12);
        }
        for diagonal in [0, 2, 6, 8] {
            assert!(global[(center, diagonal)].abs() < 1e-12);
        }
    }

    #[test]
    fn test_global_matrix_is_symmetric() {
        // 5x5 lattice with the nine interior nodes pushed off the grid lines
        let (_, elements) = structured_tables(5, 5, 0.25);
        let mut nodes = String::from("25\n");
        for j in 0..5 {
            for i in 0..5 {
                let (mut x, mut y) = (i as f64 * 0.25, j as f64 * 0.25);
                if (1..4).contains(&i) && (1..4).contains(&j) {
                    x += 0.04 * (((i * 3 + j * 5) % 3) as f64 - 1.0);
                    y += 0.03 * (((i * 7 + j * 2) % 3) as f64 - 1.0);
                }
                nodes.push_str(&format!("{} {x} {y}\n", j * 5 + i + 1));
            }
        }
        let grid = FeGrid::from_tables(&nodes, &elements, &ModelMetadata::default()).unwrap();
        let global = assemble(&grid, &ModelMetadata::default());
        assert_eq!(global.shape(), (9, 9));
        assert!(global[(0, 1)].abs() > 1e-6, "{}", global[(0, 1)]);
        for i in 0..global.nrows() {
            for j in 0..global.ncols() {
                assert!((global[(i, j)] - global[(j, i)]).abs() < 1e-10);
            }
        }

        let grid = structured_grid(6, 5, 0.2);
        let global = assemble(&grid, &ModelMetadata::default());
        assert_eq!(global.shape(), (12, 12));
        for i in 0..global.nrows() {
            for j in 0..global.ncols() {
                assert!((global[(i, j)] - global[(j, i)]).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_full_element_blocks_have_zero_row_sums() {
        let grid = structured_grid(4, 3, 0.3);
        let tensor = compute_conductivity_tensor(30.0);

        for element in 0..grid.num_elements() {
            let block =
                compute_local_block(&grid, element, InteriorLocals::all(), &tensor, true).unwrap();
            for m in 0..VERTICES {
                let row_sum: f64 = block.stiffness.row(m).iter().sum();
                assert!(row_sum.abs() < 1e-9, "element {element} row {m}: {row_sum}");
            }
        }
    }

    #[test]
    fn test_reassembly_is_bit_identical() {
        let first = assemble(&structured_grid(5, 4, 0.1), &ModelMetadata::default());
        let second = assemble(&structured_grid(5, 4, 0.1), &ModelMetadata::default());
        assert_eq!(first, second);
    }

    #[test]
    fn test_interior_locals_selection() {
        let grid = structured_grid(3, 3, 1.0);
        // element 0 is (1, 2, 5): only local node 2 is the center
        let locals = InteriorLocals::of_element(&grid, 0);
        assert_eq!(locals.as_slice(), &[2]);
        // element 2 is (2, 3, 6): no interior nodes
        assert!(InteriorLocals::of_element(&grid, 2).is_empty());
    }

    #[test]
    fn test_elements_without_interior_nodes_skip_observers() {
        let grid = structured_grid(3, 3, 1.0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        StiffnessAssembler::new(&grid, &ModelMetadata::default())
            .add_observer(Recorder { seen: seen.clone() })
            .run()
            .unwrap();

        let seen = seen.borrow();
        let elements: Vec<usize> = seen.iter().map(|(e, _)| *e).collect();
        assert_eq!(elements, vec![0, 1, 3, 4, 6, 7]);
        assert!(seen.iter().all(|(_, k)| *k == 1));
    }

    #[test]
    fn test_degenerate_interior_element_fails_assembly() {
        let nodes = "5\n1 0 0\n2 2 0\n3 2 2\n4 0 2\n5 1 1\n";
        let elements = "3\n1 1 5 3\n2 1 2 5\n3 2 3 5\n";
        let grid = FeGrid::from_tables(nodes, elements, &ModelMetadata::default()).unwrap();
        match StiffnessAssembler::new(&grid, &ModelMetadata::default()).run() {
            Err(FegridError::DegenerateElement { element, .. }) => assert_eq!(element, 0),
            other => panic!("expected degenerate element, got {other:?}"),
        }
    }

    #[test]
    fn test_kij_dump_holds_last_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kijdump.bin");
        let grid = structured_grid(3, 3, 1.0);

        StiffnessAssembler::new(&grid, &ModelMetadata::default())
            .add_observer(KijDumpObserver::new(&path))
            .run()
            .unwrap();

        // last element with an interior node is 7: (5, 9, 8), center at local 0
        let expected = compute_local_block(
            &grid,
            7,
            InteriorLocals::of_element(&grid, 7),
            &compute_conductivity_tensor(30.0),
            false,
        )
        .unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 2 * 8);
        let values: Vec<f64> = bytes
            .chunks_exact(8)
            .map(|c| f64::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![expected.bt_c[(0, 0)], expected.bt_c[(0, 1)]]);
        assert_eq!(values, vec![0.0, 30.0]);
    }

    #[test]
    fn test_kij_dump_failure_does_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("kijdump.bin");
        let grid = structured_grid(3, 3, 1.0);

        let global = StiffnessAssembler::new(&grid, &ModelMetadata::default())
            .add_observer(KijDumpObserver::new(&path))
            .run()
            .unwrap();
        assert!((global[(0, 0)] - 240.0).abs() < 1e-12);
        assert!(!path.exists());
    }
}
