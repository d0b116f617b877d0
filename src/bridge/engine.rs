use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Value written to an engine parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Bool(bool),
    Number(f32),
}

impl ParamValue {
    pub fn as_f32(&self) -> f32 {
        match self {
            ParamValue::Bool(true) => 1.0,
            ParamValue::Bool(false) => 0.0,
            ParamValue::Number(value) => *value,
        }
    }

    pub fn is_on(&self) -> bool {
        self.as_f32() != 0.0
    }
}

// Motion and expression names of a loaded model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelData {
    pub motions: Vec<String>,
    pub expressions: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Model not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("No model loaded")]
    NoModel,

    #[error("Engine error: {0}")]
    Backend(String),
}

/// Rendering engine driven by the bridge.
///
/// Only the calls the bridge needs; drawing is the engine's business.
pub trait AnimationEngine: Send + 'static {
    fn load(&mut self, path: &Path) -> Result<ModelData, EngineError>;

    fn set_parameter_value(&mut self, id: &str, value: ParamValue) -> Result<(), EngineError>;

    fn destroy(&mut self);
}

#[derive(Debug, Default)]
struct BoardState {
    model: Option<PathBuf>,
    parameters: BTreeMap<String, ParamValue>,
    destroyed: bool,
}

/// In-process engine that keeps the latest value of every parameter.
///
/// The overlay draws from it; clones share the same board.
#[derive(Debug, Clone, Default)]
pub struct ParameterBoard {
    state: Arc<RwLock<BoardState>>,
}

impl ParameterBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, id: &str) -> Option<ParamValue> {
        self.read(|state| state.parameters.get(id).copied())
    }

    pub fn number(&self, id: &str) -> f32 {
        self.value(id).map(|value| value.as_f32()).unwrap_or(0.0)
    }

    pub fn is_on(&self, id: &str) -> bool {
        self.value(id).is_some_and(|value| value.is_on())
    }

    pub fn model(&self) -> Option<PathBuf> {
        self.read(|state| state.model.clone())
    }

    pub fn is_destroyed(&self) -> bool {
        self.read(|state| state.destroyed)
    }

    fn read<R>(&self, f: impl FnOnce(&BoardState) -> R) -> R {
        let guard = self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }

    fn write<R>(&self, f: impl FnOnce(&mut BoardState) -> R) -> R {
        let mut guard = self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

impl AnimationEngine for ParameterBoard {
    /// Records `path` as the current model and resets all parameters.
    ///
    /// A missing model file is reported but the board keeps working with its
    /// parameters, so the overlay still reacts to input.
    fn load(&mut self, path: &Path) -> Result<ModelData, EngineError> {
        self.write(|state| {
            state.model = Some(path.to_path_buf());
            state.parameters.clear();
            state.destroyed = false;
        });

        if !path.exists() {
            return Err(EngineError::ModelNotFound(path.to_path_buf()));
        }
        info!("Model loaded: {}", path.display());
        Ok(ModelData::default())
    }

    fn set_parameter_value(&mut self, id: &str, value: ParamValue) -> Result<(), EngineError> {
        self.write(|state| {
            if state.destroyed {
                warn!("Parameter {} written after destroy", id);
                return Err(EngineError::NoModel);
            }
            debug!("{} = {:?}", id, value);
            state.parameters.insert(id.to_string(), value);
            Ok(())
        })
    }

    fn destroy(&mut self) {
        self.write(|state| {
            state.destroyed = true;
            state.model = None;
        });
        info!("Parameter board destroyed");
    }
}
