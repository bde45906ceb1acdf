//! Python bindings.
//!
//! ```python
//! from hindi_tokenizer import Tokenizer
//!
//! tok = Tokenizer.train(corpus, vocab_size=5000)
//! tok.save("hindi.model")
//! ids = Tokenizer.load("hindi.model").encode("नमस्ते दुनिया")
//! ```
//!
//! `RegexTokenizer` keeps the minbpe-style calling convention, where a
//! tokenizer is constructed first and `load` replaces its model in place:
//!
//! ```python
//! tok = RegexTokenizer(pattern=pattern)
//! tok.load("hindi_tokenizer.model")
//! ```
//!
//! Heavy work runs with the GIL released; log records are forwarded to
//! Python's `logging` module.

use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyBytes;

use crate::{
    Token, TrainerConfig,
    error::ModelError,
    segmenter::HINDI_PATTERN,
    tokenizer::Tokenizer,
};

/// Python wrapper for the Rust Tokenizer.
#[pyclass(name = "Tokenizer", frozen)]
pub struct PyTokenizer {
    inner: Tokenizer,
}

fn model_err(e: ModelError) -> PyErr {
    match e {
        ModelError::Io(e) => PyIOError::new_err(e.to_string()),
        ModelError::Format(e) => PyValueError::new_err(e.to_string()),
    }
}

fn value_err(e: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(e.to_string())
}

#[pymethods]
impl PyTokenizer {
    /// Train a tokenizer on a list of texts.
    ///
    /// Args:
    ///     corpus: Training texts
    ///     vocab_size: Target vocabulary size, must exceed 256
    ///     min_pair_freq: Stop once the best pair occurs fewer times than this
    ///     show_progress: Draw a progress bar while learning merges
    #[staticmethod]
    #[pyo3(signature = (corpus, vocab_size, min_pair_freq=2, show_progress=false))]
    fn train(
        py: Python<'_>,
        corpus: Vec<String>,
        vocab_size: usize,
        min_pair_freq: usize,
        show_progress: bool,
    ) -> PyResult<Self> {
        let config = TrainerConfig::new(vocab_size)
            .min_pair_freq(min_pair_freq)
            .show_progress(show_progress);
        let inner = py
            .allow_threads(|| Tokenizer::train(&corpus, &config))
            .map_err(value_err)?;
        Ok(Self { inner })
    }

    /// Load a model file written by `save`.
    #[staticmethod]
    fn load(path: &str) -> PyResult<Self> {
        let inner = Tokenizer::load(path).map_err(model_err)?;
        Ok(Self { inner })
    }

    /// Write the model to `path`.
    fn save(&self, path: &str) -> PyResult<()> {
        self.inner.save(path).map_err(model_err)
    }

    /// Encode text to token IDs.
    fn encode(&self, py: Python<'_>, text: &str) -> PyResult<Vec<Token>> {
        py.allow_threads(|| self.inner.encode(text)).map_err(value_err)
    }

    /// Encode many texts in parallel.
    #[pyo3(signature = (texts, show_progress=false))]
    fn encode_batch(
        &self,
        py: Python<'_>,
        texts: Vec<String>,
        show_progress: bool,
    ) -> PyResult<Vec<Vec<Token>>> {
        py.allow_threads(|| self.inner.encode_batch(&texts, show_progress))
            .map_err(value_err)
    }

    /// Decode token IDs to text.
    fn decode(&self, py: Python<'_>, ids: Vec<Token>) -> PyResult<String> {
        py.allow_threads(|| self.inner.decode(&ids)).map_err(value_err)
    }

    /// Decode many token sequences in parallel.
    #[pyo3(signature = (seqs, show_progress=false))]
    fn decode_batch(
        &self,
        py: Python<'_>,
        seqs: Vec<Vec<Token>>,
        show_progress: bool,
    ) -> PyResult<Vec<String>> {
        py.allow_threads(|| self.inner.decode_batch(&seqs, show_progress))
            .map_err(value_err)
    }

    /// Byte expansion of one token, or None for an unknown ID.
    fn token_bytes(&self, py: Python<'_>, id: Token) -> Option<Py<PyBytes>> {
        self.inner
            .token_bytes(id)
            .map(|bytes| PyBytes::new_bound(py, bytes).unbind())
    }

    #[getter]
    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }

    fn __repr__(&self) -> String {
        format!(
            "Tokenizer(vocab_size={}, merges={})",
            self.inner.vocab_size(),
            self.inner.merges().len()
        )
    }
}

/// Tokenizer whose model is loaded into an existing instance.
#[pyclass(name = "RegexTokenizer")]
pub struct PyRegexTokenizer {
    inner: Tokenizer,
}

#[pymethods]
impl PyRegexTokenizer {
    /// Create an empty tokenizer (bytes only) with `pattern` or the default one.
    #[new]
    #[pyo3(signature = (pattern=None))]
    fn new(pattern: Option<&str>) -> PyResult<Self> {
        let inner = Tokenizer::new(pattern.unwrap_or(HINDI_PATTERN), []).map_err(value_err)?;
        Ok(Self { inner })
    }

    /// Replace this tokenizer's pattern, merges and special tokens with the
    /// contents of a model file.
    fn load(&mut self, path: &str) -> PyResult<()> {
        self.inner = Tokenizer::load(path).map_err(model_err)?;
        Ok(())
    }

    /// Write the model to `path`.
    fn save(&self, path: &str) -> PyResult<()> {
        self.inner.save(path).map_err(model_err)
    }

    /// Encode text to token IDs.
    fn encode(&self, py: Python<'_>, text: &str) -> PyResult<Vec<Token>> {
        py.allow_threads(|| self.inner.encode(text)).map_err(value_err)
    }

    /// Decode token IDs to text.
    fn decode(&self, py: Python<'_>, ids: Vec<Token>) -> PyResult<String> {
        py.allow_threads(|| self.inner.decode(&ids)).map_err(value_err)
    }

    #[getter]
    fn pattern(&self) -> &str {
        self.inner.pattern()
    }

    #[getter]
    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }
}

#[pymodule]
fn hindi_tokenizer(m: &Bound<'_, PyModule>) -> PyResult<()> {
    pyo3_log::init();
    m.add_class::<PyTokenizer>()?;
    m.add_class::<PyRegexTokenizer>()?;
    Ok(())
}
