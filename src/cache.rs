//! Content-addressed on-disk cache of fitted models.
//!
//! A cache entry is keyed by a BLAKE3 hash of everything that determines the
//! posterior draws: formula, family, priors, sampler schedule and seeds,
//! proposal tuning, convergence policy and the model frame itself. Changing
//! any of them misses the cache; the core count and time budget do not take
//! part because they never change the draws of a completed fit.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::inference::SamplerConfig;
use crate::input::ModelFrame;
use crate::models::regression::{
    ConvergencePolicy, Family, FitError, FitOptions, FittedModel, PriorSpec, ProposalTuning,
    fit_frame,
};

/// Bumped whenever the serialized layout of `FittedModel` changes.
const CACHE_FORMAT_VERSION: u32 = 1;
const KEY_PREFIX_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid model id `{0}`: use letters, digits, `-` or `_`")]
    InvalidModelId(String),
    #[error("cache I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Fit(#[from] FitError),
}

#[derive(Serialize)]
struct CacheKey<'a> {
    version: u32,
    formula: String,
    family: Family,
    priors: &'a PriorSpec,
    sampler: SamplerConfig,
    tuning: &'a ProposalTuning,
    convergence: &'a ConvergencePolicy,
    frame: &'a ModelFrame,
}

/// Directory of serialized fitted models.
#[derive(Debug, Clone)]
pub struct FitCache {
    dir: PathBuf,
}

impl FitCache {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Hex BLAKE3 key of a fit request.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Serialize` if the request cannot be encoded.
    pub fn key(frame: &ModelFrame, options: &FitOptions) -> Result<String, CacheError> {
        let sampler = SamplerConfig {
            cores: 1,
            time_budget: None,
            ..options.sampler
        };
        let key = CacheKey {
            version: CACHE_FORMAT_VERSION,
            formula: frame.formula.to_string(),
            family: options.family,
            priors: &options.priors,
            sampler,
            tuning: &options.tuning,
            convergence: &options.convergence,
            frame,
        };
        let bytes = serde_json::to_vec(&key)?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }

    /// Path of the entry for `model_id` under `key`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::InvalidModelId` if `model_id` is empty or would
    /// escape the cache directory.
    pub fn entry_path(&self, model_id: &str, key: &str) -> Result<PathBuf, CacheError> {
        let valid = !model_id.is_empty()
            && model_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(CacheError::InvalidModelId(model_id.to_string()));
        }
        let prefix = &key[..key.len().min(KEY_PREFIX_LEN)];
        Ok(self.dir.join(format!("{model_id}-{prefix}.json")))
    }

    /// Load a cached model, if a readable entry exists.
    ///
    /// Unreadable or corrupt entries are reported as misses.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the key cannot be computed.
    pub fn load(
        &self,
        model_id: &str,
        frame: &ModelFrame,
        options: &FitOptions,
    ) -> Result<Option<FittedModel>, CacheError> {
        let key = Self::key(frame, options)?;
        let path = self.entry_path(model_id, &key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable cache entry");
                return Ok(None);
            }
        };
        match serde_json::from_slice::<FittedModel>(&bytes) {
            Ok(model) => Ok(Some(model)),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "corrupt cache entry, refitting");
                Ok(None)
            }
        }
    }

    /// Write `model` under the key of its fit request.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if serialization or any file operation fails.
    pub fn store(
        &self,
        model_id: &str,
        options: &FitOptions,
        model: &FittedModel,
    ) -> Result<PathBuf, CacheError> {
        let key = Self::key(model.frame(), options)?;
        let path = self.entry_path(model_id, &key)?;
        fs::create_dir_all(&self.dir).map_err(|source| CacheError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let temp_path = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(model)?;
        fs::write(&temp_path, bytes).map_err(|source| CacheError::Io {
            path: temp_path.clone(),
            source,
        })?;
        fs::rename(&temp_path, &path).map_err(|source| CacheError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "stored fitted model");
        Ok(path)
    }

    /// Return the cached fit for this request, fitting and storing it on a
    /// miss.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Fit` if fitting fails, or another `CacheError`
    /// if the result cannot be written.
    pub fn load_or_fit(
        &self,
        model_id: &str,
        frame: &ModelFrame,
        options: &FitOptions,
    ) -> Result<FittedModel, CacheError> {
        self.load_or_fit_with(model_id, frame, options, |frame| {
            fit_frame(model_id, frame, options).map_err(CacheError::from)
        })
    }

    /// Like [`FitCache::load_or_fit`], with `fit` producing the model on a
    /// miss. The entry is stored under `options` even when `fit` ends up
    /// sampling a shorter schedule.
    ///
    /// # Errors
    ///
    /// Returns whatever `fit` returns, or a `CacheError` converted into `E`
    /// if the key cannot be computed or the result cannot be written.
    pub fn load_or_fit_with<E, F>(
        &self,
        model_id: &str,
        frame: &ModelFrame,
        options: &FitOptions,
        fit: F,
    ) -> Result<FittedModel, E>
    where
        E: From<CacheError>,
        F: FnOnce(ModelFrame) -> Result<FittedModel, E>,
    {
        if let Some(model) = self.load(model_id, frame, options)? {
            info!(model = model_id, dir = %self.dir.display(), "loaded cached fit");
            return Ok(model.renamed(model_id));
        }
        let model = fit(frame.clone())?;
        self.store(model_id, options, &model)?;
        Ok(model)
    }
}
