//! The interface the host expects from an underlying compressor.
//!
//! The compression library itself is an external collaborator; the host
//! only needs to configure named settings, run compress/decompress, and
//! read named metrics back out.

use thiserror::Error;

use crate::options::{Options, TensorBuf};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{msg}")]
pub struct CompressorError {
    /// Host exit-status convention: 1 missing output list, 2 search or
    /// compressor failure, 3 missing inputs list.
    pub code: i32,
    pub msg: String,
}

impl CompressorError {
    pub fn new(code: i32, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
        }
    }
}

/// `Sync` so evaluation threads can clone their own instance from a shared
/// prototype; per-call state belongs to the clone.
pub trait Compressor: Send + Sync {
    fn prefix(&self) -> &str;

    fn get_options(&self) -> Options;

    fn set_options(&mut self, opts: &Options) -> Result<(), CompressorError>;

    /// Capabilities; `opt:thread_safe` (int 0/1) gates concurrent
    /// evaluation against a shared instance.
    fn get_configuration(&self) -> Options;

    fn compress(&mut self, input: &TensorBuf, output: &mut TensorBuf)
        -> Result<(), CompressorError>;

    fn decompress(
        &mut self,
        input: &TensorBuf,
        output: &mut TensorBuf,
    ) -> Result<(), CompressorError>;

    /// Metrics measured by the most recent compress/decompress pair.
    fn metrics_results(&self) -> Options;

    fn box_clone(&self) -> Box<dyn Compressor>;
}

impl Clone for Box<dyn Compressor> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}
