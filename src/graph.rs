//! Compressed sparse row storage of a weighted bipartite graph.
//!
//! Left vertices (bidders) are rows `0..left_count`, right vertices (objects) are columns
//! `0..right_count`; the global id of column `j` is `left_count + j`. Only the forward
//! adjacency of the left side is stored. An arc with negative weight is kept in the
//! storage but is not eligible for matching.

use crate::error::AuctionError;
use crate::solution::UnsignedInt;
use anyhow::{anyhow as anyhow_error, ensure, Result};
use rand::Rng;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct BipartiteGraph<I: UnsignedInt> {
    num_left: I,
    num_right: I,
    i_starts_stops: Vec<I>,
    j_counts: Vec<I>,
    column_indices: Vec<I>,
    // memory view of all weights
    values: Vec<f64>,
}

impl<I: UnsignedInt> BipartiteGraph<I> {
    pub fn new(row_capacity: usize, arcs_capacity: usize) -> Self {
        BipartiteGraph {
            num_left: I::zero(),
            num_right: I::zero(),
            i_starts_stops: Vec::with_capacity(row_capacity + 1),
            j_counts: Vec::with_capacity(row_capacity),
            column_indices: Vec::with_capacity(arcs_capacity),
            values: Vec::with_capacity(arcs_capacity),
        }
    }

    /// Builds a graph from `(row, column, weight)` triples given in any order.
    pub fn from_edges(num_left: I, num_right: I, edges: &[(I, I, f64)]) -> Result<Self> {
        let mut sorted = edges.to_vec();
        sorted.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        let mut graph = Self::new(num_left.as_(), sorted.len());
        graph.init(num_left, num_right)?;
        for (row, column, weight) in sorted {
            graph.add_value(row, column, weight)?;
        }
        Ok(graph)
    }

    /// Clears the storage and sets the size of both sides.
    pub fn init(&mut self, num_left: I, num_right: I) -> Result<()> {
        ensure!(num_left < I::max_value() && num_right < I::max_value());
        self.num_left = num_left;
        self.num_right = num_right;

        self.i_starts_stops.clear();
        self.i_starts_stops.push(I::zero());
        self.j_counts.clear();

        self.column_indices.clear();
        self.values.clear();
        Ok(())
    }

    // opens all rows up to and including `row`, skipped rows stay empty
    fn open_rows_through(&mut self, row: usize) {
        while self.j_counts.len() <= row {
            let stop = self.i_starts_stops[self.j_counts.len()];
            self.i_starts_stops.push(stop);
            self.j_counts.push(I::zero());
        }
    }

    fn check_row(&self, row: I) -> Result<usize> {
        ensure!(
            row < self.num_left,
            "row {} is out of range {}",
            row,
            self.num_left
        );
        let row_usize: usize = row.as_();
        ensure!(
            row_usize + 1 >= self.j_counts.len(),
            "rows must be added in non-decreasing order"
        );
        Ok(row_usize)
    }

    #[inline]
    pub fn add_value(&mut self, row: I, column: I, value: f64) -> Result<(), anyhow::Error> {
        let row_usize = self.check_row(row)?;
        ensure!(
            column < self.num_right,
            "column {} is out of range {}",
            column,
            self.num_right
        );
        self.open_rows_through(row_usize);

        let cumulative_offset = self.i_starts_stops[row_usize + 1]
            .checked_add(&I::one())
            .ok_or_else(|| {
                anyhow_error!("i_starts_stops vector is longer then max value of type")
            })?;
        self.i_starts_stops[row_usize + 1] = cumulative_offset;
        self.j_counts[row_usize] += I::one();

        self.column_indices.push(column);
        self.values.push(value);
        Ok(())
    }

    #[inline]
    pub fn extend_from_values(
        &mut self,
        row: I,
        columns: &[I],
        values: &[f64],
    ) -> Result<(), anyhow::Error> {
        ensure!(columns.len() == values.len());
        let row_usize = self.check_row(row)?;
        ensure!(columns.iter().all(|&column| column < self.num_right));
        self.open_rows_through(row_usize);

        let length_increment = I::from_usize(columns.len())
            .ok_or_else(|| anyhow_error!(" columns slice is longer then max value of type"))?;
        let cumulative_offset = self.i_starts_stops[row_usize + 1]
            .checked_add(&length_increment)
            .ok_or_else(|| {
                anyhow_error!("i_starts_stops vector is longer then max value of type")
            })?;
        self.i_starts_stops[row_usize + 1] = cumulative_offset;
        self.j_counts[row_usize] += length_increment;

        self.column_indices.extend_from_slice(columns);
        self.values.extend_from_slice(values);
        Ok(())
    }

    #[inline]
    pub fn left_count(&self) -> I {
        self.num_left
    }

    #[inline]
    pub fn right_count(&self) -> I {
        self.num_right
    }

    /// Vertices on both sides, counted in `usize` since the sum may not fit `I`.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        let num_left: usize = self.num_left.as_();
        let num_right: usize = self.num_right.as_();
        num_left + num_right
    }

    #[inline]
    pub fn num_of_arcs(&self) -> usize {
        self.column_indices.len()
    }

    #[inline]
    fn row_range(&self, row: usize) -> (usize, usize) {
        if row < self.j_counts.len() {
            let start: usize = self.i_starts_stops[row].as_();
            let stop: usize = self.i_starts_stops[row + 1].as_();
            (start, stop)
        } else {
            (0, 0)
        }
    }

    /// Arcs `(column, weight)` leaving left vertex `row`, ineligible ones included.
    #[inline]
    pub fn neighbors(&self, row: I) -> impl Iterator<Item = (I, f64)> + '_ {
        let (start, stop) = self.row_range(row.as_());
        self.column_indices[start..stop]
            .iter()
            .copied()
            .zip(self.values[start..stop].iter().copied())
    }

    /// Number of eligible arcs of left vertex `row`.
    pub fn degree(&self, row: I) -> usize {
        self.neighbors(row).filter(|&(_, w)| w >= 0.).count()
    }

    /// Number of eligible arcs entering every right vertex.
    pub fn right_degrees(&self) -> Vec<usize> {
        let mut degrees = vec![0; self.num_right.as_()];
        self.column_indices
            .iter()
            .zip(self.values.iter())
            .filter(|&(_, &w)| w >= 0.)
            .for_each(|(&j, _)| {
                let j_usize: usize = j.as_();
                degrees[j_usize] += 1
            });
        degrees
    }

    /// Smallest and largest eligible weight, `None` without eligible arcs.
    pub fn eligible_weight_range(&self) -> Option<(f64, f64)> {
        self.values
            .iter()
            .filter(|&&w| w >= 0.)
            .fold(None, |acc, &w| match acc {
                None => Some((w, w)),
                Some((min, max)) => Some((min.min(w), max.max(w))),
            })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        ensure!(
            self.num_left > I::zero() && self.num_right > I::zero(),
            AuctionError::InvalidParameter("both sides of the graph must be non-empty".into())
        );
        ensure!(self.column_indices.len() == self.values.len());
        ensure!(
            self.values.iter().all(|w| w.is_finite()),
            AuctionError::InvalidParameter("edge weights must be finite".into())
        );
        // row + 1 of the last row that used a column
        let mut last_row = vec![0_usize; self.num_right.as_()];
        for row in 0..self.j_counts.len() {
            let (start, stop) = self.row_range(row);
            for &j in &self.column_indices[start..stop] {
                let j_usize: usize = j.as_();
                ensure!(
                    last_row[j_usize] != row + 1,
                    AuctionError::InvalidParameter(format!(
                        "parallel edges between {} and {}",
                        row, j
                    ))
                );
                last_row[j_usize] = row + 1;
            }
        }
        Ok(())
    }

    /// Reads a Matrix Market coordinate file: rows become left vertices, columns right
    /// vertices. Weights of a `pattern` matrix are drawn from `rng`. Duplicate entries keep
    /// the largest weight.
    pub fn read_mtx<R: BufRead, G: Rng>(reader: R, abs_value: bool, rng: &mut G) -> Result<Self> {
        let mut lines = reader.lines();
        let header = match lines.next() {
            Some(line) => line.map_err(|e| input_error(format!("reading header: {}", e)))?,
            None => return Err(input_error("empty file".into())),
        }
        .to_lowercase();
        if !header.starts_with("%%matrixmarket") {
            return Err(input_error(format!("not a Matrix Market header: {}", header)));
        }
        let pattern = header.contains("pattern");
        if header.contains("symmetric") || header.contains("hermitian") {
            warn!("symmetric storage is read as given, mirrored entries are not added");
        }

        let mut data_lines = lines.filter_map(|line| match line {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('%') {
                    None
                } else {
                    Some(Ok(trimmed.to_string()))
                }
            }
            Err(e) => Some(Err(e)),
        });

        let size_line = match data_lines.next() {
            Some(line) => line.map_err(|e| input_error(format!("reading sizes: {}", e)))?,
            None => return Err(input_error("missing size line".into())),
        };
        let sizes = size_line
            .split_whitespace()
            .map(|token| token.parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| input_error(format!("bad size line {:?}: {}", size_line, e)))?;
        if sizes.len() != 3 {
            return Err(input_error(format!("bad size line {:?}", size_line)));
        }
        let (num_rows, num_cols, nonzeros) = (sizes[0], sizes[1], sizes[2]);

        let mut entries: Vec<(usize, usize, f64)> = Vec::with_capacity(nonzeros);
        for line in data_lines {
            let line = line.map_err(|e| input_error(format!("reading entry: {}", e)))?;
            let mut tokens = line.split_whitespace();
            let mut index = |bound: usize| -> Result<usize> {
                let value = tokens
                    .next()
                    .and_then(|token| token.parse::<usize>().ok())
                    .filter(|&v| v >= 1 && v <= bound)
                    .ok_or_else(|| input_error(format!("bad entry {:?}", line)))?;
                Ok(value - 1)
            };
            let i = index(num_rows)?;
            let j = index(num_cols)?;
            let weight = if pattern {
                rng.gen_range(0.0..1e6)
            } else {
                tokens
                    .next()
                    .and_then(|token| token.parse::<f64>().ok())
                    .ok_or_else(|| input_error(format!("bad weight in {:?}", line)))?
            };
            entries.push((i, j, if abs_value { weight.abs() } else { weight }));
        }
        if entries.len() != nonzeros {
            return Err(input_error(format!(
                "expected {} entries, found {}",
                nonzeros,
                entries.len()
            )));
        }

        entries.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        entries.dedup_by(|next, kept| {
            if (next.0, next.1) == (kept.0, kept.1) {
                kept.2 = kept.2.max(next.2);
                true
            } else {
                false
            }
        });

        let to_index = |v: usize| {
            I::from_usize(v).ok_or_else(|| input_error(format!("{} overflows the index type", v)))
        };
        let mut graph = Self::new(num_rows, entries.len());
        graph.init(to_index(num_rows)?, to_index(num_cols)?)?;
        for (i, j, w) in entries {
            graph.add_value(to_index(i)?, to_index(j)?, w)?;
        }
        debug!(
            "(|A|, |B|, n, m) := ({}, {}, {}, {})",
            num_rows,
            num_cols,
            num_rows + num_cols,
            graph.num_of_arcs()
        );
        Ok(graph)
    }

    pub fn read_mtx_file<P: AsRef<Path>, G: Rng>(
        path: P,
        abs_value: bool,
        rng: &mut G,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| input_error(format!("{}: {}", path.display(), e)))?;
        Self::read_mtx(BufReader::new(file), abs_value, rng)
    }
}

fn input_error(msg: String) -> anyhow::Error {
    anyhow_error!(AuctionError::InputUnavailable(msg))
}

#[cfg(test)]
mod tests {
    use super::BipartiteGraph;
    use crate::error::{kind, AuctionError};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_cumulative_idx_with_empty_rows() {
        let mut graph = BipartiteGraph::<u16>::new(4, 5);
        graph.init(4, 3).unwrap();
        graph.add_value(0, 0, 1.).unwrap();
        graph.add_value(0, 2, 2.).unwrap();
        graph.extend_from_values(2, &[0, 1, 2], &[3., 4., -1.]).unwrap();
        assert_eq!(graph.i_starts_stops, [0, 2, 2, 5]);
        assert_eq!(graph.j_counts, [2, 0, 3]);
        assert_eq!(graph.neighbors(1).count(), 0);
        assert_eq!(graph.neighbors(3).count(), 0);
        assert_eq!(graph.neighbors(2).collect::<Vec<_>>(), [(0, 3.), (1, 4.), (2, -1.)]);
        assert_eq!(graph.degree(2), 2);
        assert_eq!(graph.right_degrees(), [2, 1, 1]);
        assert_eq!(graph.eligible_weight_range(), Some((1., 4.)));
        assert!(graph.add_value(1, 0, 1.).is_err());
        assert!(graph.add_value(3, 3, 1.).is_err());
    }

    #[test]
    fn test_from_edges_sorts_rows() {
        let graph =
            BipartiteGraph::<u32>::from_edges(2, 2, &[(1, 1, 4.), (0, 1, 3.), (0, 0, 5.)])
                .unwrap();
        assert_eq!(graph.neighbors(0).collect::<Vec<_>>(), [(0, 5.), (1, 3.)]);
        assert_eq!(graph.neighbors(1).collect::<Vec<_>>(), [(1, 4.)]);
        assert_eq!(graph.vertex_count(), 4);
        graph.validate().unwrap();
    }

    #[test]
    fn test_vertex_count_wider_than_index_type() {
        let mut graph = BipartiteGraph::<u16>::new(0, 0);
        graph.init(40000, 40000).unwrap();
        assert_eq!(graph.vertex_count(), 80000);
        assert!(graph.init(u16::MAX, 1).is_err());
    }

    #[test]
    fn test_validate_rejects_parallel_edges() {
        let graph =
            BipartiteGraph::<u32>::from_edges(1, 2, &[(0, 1, 4.), (0, 1, 3.)]).unwrap();
        let err = graph.validate().unwrap_err();
        assert!(matches!(kind(&err), Some(AuctionError::InvalidParameter(_))));
    }

    #[test]
    fn test_read_mtx() {
        let input = "%%MatrixMarket matrix coordinate real general\n\
                     % comment\n\
                     2 3 4\n\
                     1 1 5.0\n\
                     2 3 -2.5\n\
                     1 2 3.0\n\
                     1 1 6.0\n";
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let graph = BipartiteGraph::<u32>::read_mtx(input.as_bytes(), false, &mut rng).unwrap();
        assert_eq!(graph.left_count(), 2);
        assert_eq!(graph.right_count(), 3);
        assert_eq!(graph.neighbors(0).collect::<Vec<_>>(), [(0, 6.), (1, 3.)]);
        assert_eq!(graph.neighbors(1).collect::<Vec<_>>(), [(2, -2.5)]);

        let graph = BipartiteGraph::<u32>::read_mtx(input.as_bytes(), true, &mut rng).unwrap();
        assert_eq!(graph.neighbors(1).collect::<Vec<_>>(), [(2, 2.5)]);
    }

    #[test]
    fn test_read_mtx_pattern_draws_weights() {
        let input = "%%MatrixMarket matrix coordinate pattern general\n2 2 2\n1 2\n2 1\n";
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let graph = BipartiteGraph::<u32>::read_mtx(input.as_bytes(), false, &mut rng).unwrap();
        assert_eq!(graph.num_of_arcs(), 2);
        assert!(graph
            .neighbors(0)
            .chain(graph.neighbors(1))
            .all(|(_, w)| (0.0..1e6).contains(&w)));
    }

    #[test]
    fn test_read_mtx_errors() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        for input in &[
            "",
            "not a header\n1 1 1\n1 1 1.0\n",
            "%%MatrixMarket matrix coordinate real general\n1 1 2\n1 1 1.0\n",
            "%%MatrixMarket matrix coordinate real general\n1 1 1\n2 1 1.0\n",
        ] {
            let err = BipartiteGraph::<u32>::read_mtx(input.as_bytes(), false, &mut rng)
                .unwrap_err();
            assert!(matches!(kind(&err), Some(AuctionError::InputUnavailable(_))));
        }
        let err =
            BipartiteGraph::<u32>::read_mtx_file("/nonexistent/graph.mtx", false, &mut rng)
                .unwrap_err();
        assert!(matches!(kind(&err), Some(AuctionError::InputUnavailable(_))));
    }
}
