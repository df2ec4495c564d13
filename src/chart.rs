use std::fmt;

/// A table with one cell per span `[first, last)`, `first <= last <= size`.
/// Empty spans `[pos, pos)` have cells too: they hold the items a rule
/// starts from.
#[derive(Debug, Clone)]
pub struct Chart<T> {
  size: usize,
  cells: Vec<T>,
}

impl<T: Default> Chart<T> {
  pub fn new(size: usize) -> Self {
    let width = size + 1;
    let mut cells = Vec::with_capacity(width * width);
    cells.resize_with(width * width, T::default);
    Self { size, cells }
  }

  /// Moves a cell out so it can be filled while other cells are read
  pub fn take(&mut self, first: usize, last: usize) -> T {
    std::mem::take(self.get_mut(first, last))
  }
}

impl<T> Chart<T> {
  pub fn size(&self) -> usize {
    self.size
  }

  fn index(&self, first: usize, last: usize) -> usize {
    assert!(first <= last && last <= self.size, "bad span [{}, {})", first, last);
    first * (self.size + 1) + last
  }

  pub fn get(&self, first: usize, last: usize) -> &T {
    &self.cells[self.index(first, last)]
  }

  pub fn get_mut(&mut self, first: usize, last: usize) -> &mut T {
    let idx = self.index(first, last);
    &mut self.cells[idx]
  }

  pub fn put(&mut self, first: usize, last: usize, cell: T) {
    *self.get_mut(first, last) = cell;
  }
}

impl<T: fmt::Debug> fmt::Display for Chart<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for first in 0..=self.size {
      for last in first..=self.size {
        writeln!(f, "{}..{}: {:?}", first, last, self.get(first, last))?;
      }
    }
    Ok(())
  }
}

#[test]
fn test_chart_cells() {
  let mut chart: Chart<Vec<usize>> = Chart::new(3);
  chart.get_mut(0, 3).push(7);
  chart.get_mut(1, 1).push(1);
  assert_eq!(chart.get(0, 3), &vec![7]);
  assert!(chart.get(0, 2).is_empty());

  let cell = chart.take(0, 3);
  assert!(chart.get(0, 3).is_empty());
  chart.put(0, 3, cell);
  assert_eq!(chart.get(0, 3), &vec![7]);
}
