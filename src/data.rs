// Rows read from a file live in one RowArena. Mini-batches are DMatrix windows
// (start, length) over the arena, so nothing is copied and nothing is freed twice.

/// Reusable scratch row the parser fills one line at a time.
/// Clearing keeps the capacity, so the buffers only ever grow.
#[derive(Clone, Debug, Default)]
pub struct SparseRowBuf {
    pub label: f32,
    pub values: Vec<f32>,
    pub indices: Vec<u32>,
    pub fields: Vec<u32>,
}

impl SparseRowBuf {
    pub fn new() -> SparseRowBuf {
        SparseRowBuf::default()
    }

    pub fn clear(&mut self) {
        self.label = 0.0;
        self.values.clear();
        self.indices.clear();
        self.fields.clear();
    }

    pub fn reserve(&mut self, nonzeros: usize) {
        if self.values.capacity() < nonzeros {
            self.values.reserve(nonzeros - self.values.len());
            self.indices.reserve(nonzeros - self.indices.len());
            self.fields.reserve(nonzeros - self.fields.len());
        }
    }

    #[inline(always)]
    pub fn push(&mut self, index: u32, value: f32) {
        self.indices.push(index);
        self.values.push(value);
    }

    #[inline(always)]
    pub fn push_with_field(&mut self, field: u32, index: u32, value: f32) {
        self.fields.push(field);
        self.indices.push(index);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}


/// Read-only view of one example inside a RowArena.
#[derive(Clone, Copy, Debug)]
pub struct SparseRow<'a> {
    pub sample_id: usize,
    pub values: &'a [f32],
    pub indices: &'a [u32],
    pub fields: Option<&'a [u32]>,
}

impl<'a> SparseRow<'a> {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}


#[derive(Clone, Debug)]
pub struct RowArena {
    has_fields: bool,
    // first entry of every row is the synthetic bias 0:0:1.0
    has_bias: bool,
    values: Vec<f32>,
    indices: Vec<u32>,
    fields: Vec<u32>,
    // row i spans offsets[i]..offsets[i+1]
    offsets: Vec<usize>,
    labels: Vec<f32>,
    max_index: u32,
    max_field: u32,
}

impl RowArena {
    pub fn new(has_fields: bool) -> RowArena {
        RowArena {
            has_fields: has_fields,
            has_bias: false,
            values: Vec::new(),
            indices: Vec::new(),
            fields: Vec::new(),
            offsets: vec![0],
            labels: Vec::new(),
            max_index: 0,
            max_field: 0,
        }
    }

    /// Arena whose rows all start with the bias term the libffm parser prepends.
    pub fn new_with_bias(has_fields: bool) -> RowArena {
        let mut arena = RowArena::new(has_fields);
        arena.has_bias = true;
        arena
    }

    pub fn has_fields(&self) -> bool {
        self.has_fields
    }

    pub fn has_bias(&self) -> bool {
        self.has_bias
    }

    pub fn push_row(&mut self, row: &SparseRowBuf) {
        assert_eq!(row.values.len(), row.indices.len(), "Row values and indices differ in length");
        if self.has_fields {
            assert_eq!(row.values.len(), row.fields.len(), "Row values and fields differ in length");
            self.fields.extend_from_slice(&row.fields);
            if let Some(m) = row.fields.iter().max() {
                self.max_field = self.max_field.max(*m);
            }
        }
        if let Some(m) = row.indices.iter().max() {
            self.max_index = self.max_index.max(*m);
        }
        self.values.extend_from_slice(&row.values);
        self.indices.extend_from_slice(&row.indices);
        self.offsets.push(self.values.len());
        self.labels.push(row.label);
    }

    /// Convenience for building rows by hand, mostly in tests.
    pub fn push_sparse(&mut self, label: f32, nonzeros: &[(u32, f32)]) {
        let mut row = SparseRowBuf::new();
        row.label = label;
        for (index, value) in nonzeros {
            row.push(*index, *value);
        }
        self.push_row(&row);
    }

    pub fn push_field_aware(&mut self, label: f32, nonzeros: &[(u32, u32, f32)]) {
        let mut row = SparseRowBuf::new();
        row.label = label;
        for (field, index, value) in nonzeros {
            row.push_with_field(*field, *index, *value);
        }
        self.push_row(&row);
    }

    pub fn row_count(&self) -> usize {
        self.labels.len()
    }

    pub fn max_feature_index(&self) -> u32 {
        self.max_index
    }

    pub fn max_field(&self) -> u32 {
        self.max_field
    }

    pub fn row(&self, i: usize) -> SparseRow<'_> {
        let (start, end) = (self.offsets[i], self.offsets[i + 1]);
        SparseRow {
            sample_id: i,
            values: &self.values[start..end],
            indices: &self.indices[start..end],
            fields: if self.has_fields { Some(&self.fields[start..end]) } else { None },
        }
    }

    pub fn window(&self, start: usize, len: usize) -> DMatrix<'_> {
        assert!(start + len <= self.row_count(), "Window {}..{} outside of {} rows", start, start + len, self.row_count());
        DMatrix {
            arena: self,
            start: start,
            row_count: len,
        }
    }

    pub fn all_rows(&self) -> DMatrix<'_> {
        self.window(0, self.row_count())
    }

    fn push_view(&mut self, row: &SparseRow, label: f32) {
        let mut buf = SparseRowBuf::new();
        buf.label = label;
        buf.values.extend_from_slice(row.values);
        buf.indices.extend_from_slice(row.indices);
        if let Some(fields) = row.fields {
            buf.fields.extend_from_slice(fields);
        }
        self.push_row(&buf);
    }

    /// Deals rows round-robin into `num_folds` new arenas: row i lands in fold i % num_folds.
    pub fn split_folds(&self, num_folds: usize) -> Vec<RowArena> {
        assert!(num_folds > 0, "Can not split rows into zero folds");
        let mut folds: Vec<RowArena> = (0..num_folds).map(|_| self.new_like()).collect();
        for i in 0..self.row_count() {
            folds[i % num_folds].push_view(&self.row(i), self.labels[i]);
        }
        folds
    }

    fn new_like(&self) -> RowArena {
        let mut arena = RowArena::new(self.has_fields);
        arena.has_bias = self.has_bias;
        arena
    }

    /// Concatenates all arenas except the one at `skip`.
    pub fn merge_except(folds: &[RowArena], skip: usize) -> RowArena {
        let mut merged = match folds.first() {
            Some(first) => first.new_like(),
            None => RowArena::new(false),
        };
        for (k, fold) in folds.iter().enumerate() {
            if k == skip {
                continue;
            }
            for i in 0..fold.row_count() {
                merged.push_view(&fold.row(i), fold.labels[i]);
            }
        }
        merged
    }
}


/// Largest feature index and largest field id over several arenas.
pub fn problem_bounds(arenas: &[&RowArena]) -> (u32, u32) {
    arenas.iter().fold((0, 0), |(index, field), arena| {
        (index.max(arena.max_index), field.max(arena.max_field))
    })
}


/// A mini-batch: a window of rows over a RowArena plus their labels.
/// A window with zero rows marks the end of an epoch.
#[derive(Clone, Copy, Debug)]
pub struct DMatrix<'a> {
    arena: &'a RowArena,
    start: usize,
    row_count: usize,
}

impl<'a> DMatrix<'a> {
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn has_fields(&self) -> bool {
        self.arena.has_fields
    }

    pub fn has_bias(&self) -> bool {
        self.arena.has_bias
    }

    pub fn row(&self, i: usize) -> SparseRow<'a> {
        assert!(i < self.row_count, "Row {} outside of batch of {} rows", i, self.row_count);
        self.arena.row(self.start + i)
    }

    pub fn rows(&self) -> impl Iterator<Item = SparseRow<'a>> + '_ {
        (0..self.row_count).map(move |i| self.row(i))
    }

    pub fn labels(&self) -> &'a [f32] {
        &self.arena.labels[self.start..self.start + self.row_count]
    }

    /// Shrinks the window, used to mark a partial final batch.
    pub fn set_length(&mut self, row_count: usize) {
        assert!(row_count <= self.row_count, "Can not grow a batch from {} to {} rows", self.row_count, row_count);
        self.row_count = row_count;
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn make_arena() -> RowArena {
        let mut arena = RowArena::new(false);
        arena.push_sparse(1.0, &[(0, 1.0), (3, 0.5)]);
        arena.push_sparse(0.0, &[(5, 2.0)]);
        arena.push_sparse(1.0, &[]);
        arena.push_sparse(0.0, &[(1, 1.0), (2, 1.0), (9, 3.0)]);
        arena
    }

    #[test]
    fn test_arena_rows() {
        let arena = make_arena();
        assert_eq!(arena.row_count(), 4);
        assert_eq!(arena.max_feature_index(), 9);
        let row = arena.row(0);
        assert_eq!(row.indices, &[0, 3]);
        assert_eq!(row.values, &[1.0, 0.5]);
        assert!(row.fields.is_none());
        assert!(arena.row(2).is_empty());
        assert_eq!(arena.row(3).len(), 3);
    }

    #[test]
    fn test_window() {
        let arena = make_arena();
        let mut batch = arena.window(1, 3);
        assert_eq!(batch.row_count(), 3);
        assert_eq!(batch.labels(), &[0.0, 1.0, 0.0]);
        assert_eq!(batch.row(0).indices, &[5]);
        assert_eq!(batch.rows().count(), 3);
        batch.set_length(2);
        assert_eq!(batch.labels(), &[0.0, 1.0]);
        assert_eq!(batch.rows().map(|r| r.len()).sum::<usize>(), 1);
    }

    #[test]
    #[should_panic]
    fn test_window_grow() {
        let arena = make_arena();
        let mut batch = arena.window(0, 2);
        batch.set_length(3);
    }

    #[test]
    fn test_field_aware() {
        let mut arena = RowArena::new(true);
        arena.push_field_aware(1.0, &[(0, 0, 1.0), (2, 7, 0.5)]);
        assert_eq!(arena.max_field(), 2);
        assert_eq!(arena.max_feature_index(), 7);
        assert_eq!(arena.row(0).fields.unwrap(), &[0, 2]);
    }

    #[test]
    fn test_split_folds() {
        let arena = make_arena();
        let folds = arena.split_folds(2);
        assert_eq!(folds.len(), 2);
        assert_eq!(folds[0].row_count(), 2);
        assert!(folds[0].row(1).indices.is_empty());
        assert_eq!(folds[1].row(1).indices, &[1, 2, 9]);
        let merged = RowArena::merge_except(&folds, 0);
        assert_eq!(merged.row_count(), 2);
        assert_eq!(merged.all_rows().labels(), &[0.0, 0.0]);
    }

    #[test]
    fn test_bias_flag_survives_folds() {
        let mut arena = RowArena::new_with_bias(true);
        for i in 0..4 {
            arena.push_field_aware(1.0, &[(0, 0, 1.0), (1, i, 1.0)]);
        }
        assert!(arena.has_bias());
        assert!(arena.all_rows().has_bias());
        let folds = arena.split_folds(2);
        assert!(folds.iter().all(|f| f.has_bias()));
        assert!(RowArena::merge_except(&folds, 1).has_bias());
        assert!(!RowArena::new(true).has_bias());
    }

    #[test]
    fn test_problem_bounds() {
        let mut ffm = RowArena::new(true);
        ffm.push_field_aware(1.0, &[(3, 2, 1.0)]);
        let svm = make_arena();
        assert_eq!(problem_bounds(&[&ffm, &svm]), (9, 3));
        assert_eq!(problem_bounds(&[&ffm]), (2, 3));
        assert_eq!(problem_bounds(&[]), (0, 0));
    }

    #[test]
    fn test_row_buf_keeps_capacity() {
        let mut row = SparseRowBuf::new();
        row.reserve(16);
        let capacity = row.values.capacity();
        row.push(1, 1.0);
        row.clear();
        assert!(row.is_empty());
        assert_eq!(row.values.capacity(), capacity);
        row.reserve(4);
        assert_eq!(row.values.capacity(), capacity);
    }
}
