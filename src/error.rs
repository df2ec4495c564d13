use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
  /// Mismatched grammar/threshold counts, empty grammar lists, bad option strings
  #[error("config error: {0}")]
  Config(String),
  #[error("grammar error at line {line}: {message}")]
  Grammar { line: usize, message: String },
  #[error("lattice error: {0}")]
  Lattice(String),
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
