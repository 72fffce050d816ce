//! facebench-img: Image and dataset layer for face-recognition benchmarks.
//!
//! Loads grayscale face images, applies the named preprocessing strategies,
//! and parses sample lists and LFW pair files.

pub mod dataset;
pub mod frame;
pub mod preprocess;

pub use dataset::{ImagePair, Label, LabelMap, PairDataset, SampleRecord};
pub use frame::{DirectoryImageSource, GrayImage, ImageError, ImageSource, MemoryImageSource};
pub use preprocess::{PreprocessKind, Preprocessor, UnknownPreprocess};
