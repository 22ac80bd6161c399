//! Boundary-condition records.

/// One record per constrained global block row: which of the b within-block
/// variables are fixed, and to what values. The values are consumed by the
/// right-hand-side side of the solver; the matrix only needs the variable
/// list.
struct BcEntry {
    global: usize,
    vars: Vec<usize>,
    values: Vec<f64>,
}

#[derive(Default)]
pub struct BcMap {
    bcs: Vec<BcEntry>,
}

impl BcMap {
    pub fn new() -> BcMap {
        BcMap { bcs: Vec::new() }
    }

    /// Constrain `vars` of global block row `global` to `values`.
    pub fn add_bc(&mut self, global: usize, vars: &[usize], values: &[f64]) {
        assert_eq!(vars.len(), values.len());
        self.bcs.push(BcEntry {
            global,
            vars: vars.to_vec(),
            values: values.to_vec(),
        });
    }

    pub fn len(&self) -> usize {
        self.bcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bcs.is_empty()
    }

    /// (global block row, constrained vars, prescribed values) per record.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[usize], &[f64])> {
        self.bcs
            .iter()
            .map(|bc| (bc.global, bc.vars.as_slice(), bc.values.as_slice()))
    }
}
