use rayon::prelude::*;

/// 2D (query, ion) index space that extraction kernels run over.
///
/// Each unit owns a disjoint, contiguous chunk of the output buffer, so
/// workers never write the same cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IonGrid {
    pub num_queries: usize,
    pub num_ions: usize,
}

impl IonGrid {
    pub fn new(num_queries: usize, num_ions: usize) -> Self {
        Self {
            num_queries,
            num_ions,
        }
    }

    pub fn num_units(&self) -> usize {
        self.num_queries * self.num_ions
    }

    #[inline]
    pub fn unit(&self, flat: usize) -> (usize, usize) {
        (flat / self.num_ions, flat % self.num_ions)
    }

    /// Allocates `unit_len` cells per unit and fills them in parallel.
    ///
    /// `f(query, ion, chunk)` receives the unit's own chunk.
    ///
    /// ```
    /// use xicquery::IonGrid;
    ///
    /// let grid = IonGrid::new(2, 3);
    /// let out = grid.fill_par(2, 0usize, |query, ion, chunk| {
    ///     chunk.fill(query * 10 + ion);
    /// });
    /// assert_eq!(out, vec![0, 0, 1, 1, 2, 2, 10, 10, 11, 11, 12, 12]);
    /// ```
    pub fn fill_par<T, F>(&self, unit_len: usize, init: T, f: F) -> Vec<T>
    where
        T: Send + Sync + Clone,
        F: Fn(usize, usize, &mut [T]) + Sync + Send,
    {
        let mut out = vec![init; self.num_units() * unit_len];
        if unit_len == 0 {
            return out;
        }
        out.par_chunks_mut(unit_len)
            .with_min_len(64)
            .enumerate()
            .for_each(|(flat, chunk)| {
                let (query, ion) = self.unit(flat);
                f(query, ion, chunk);
            });
        out
    }
}
