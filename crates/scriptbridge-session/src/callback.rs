use std::collections::HashMap;
use std::fmt;

use scriptbridge_wire::{TypeRegistry, TypeTag, Value, WireError};

/// Identifies a controller-side callback within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(pub u32);

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result type and ordered parameter types of a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackSignature {
    pub result: TypeTag,
    pub params: Vec<TypeTag>,
}

impl CallbackSignature {
    pub fn new(result: TypeTag, params: impl Into<Vec<TypeTag>>) -> Self {
        Self {
            result,
            params: params.into(),
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn returns_value(&self) -> bool {
        !self.result.is_void()
    }

    /// Every parameter must be a registered type; the result may also be void.
    pub fn validate(&self, registry: &TypeRegistry) -> Result<(), WireError> {
        if self.returns_value() && !registry.contains(self.result) {
            return Err(WireError::UnregisteredType(self.result));
        }
        match self.params.iter().find(|tag| !registry.contains(**tag)) {
            Some(tag) => Err(WireError::UnregisteredType(*tag)),
            None => Ok(()),
        }
    }
}

/// Error type for controller-side callback handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A controller-local function invoked on behalf of the worker.
pub type Handler = Box<dyn FnMut(Vec<Value>) -> Result<Value, HandlerError>>;

pub(crate) struct CallbackRegistration {
    pub(crate) signature: CallbackSignature,
    pub(crate) handler: Handler,
}

/// Callbacks installed by one controller, keyed by id.
pub(crate) struct CallbackRegistry {
    last_id: u32,
    entries: HashMap<CallbackId, CallbackRegistration>,
}

impl CallbackRegistry {
    pub(crate) fn new() -> Self {
        Self {
            last_id: 0,
            entries: HashMap::new(),
        }
    }

    /// Allocate the next id. Ids are never reused, even if registration fails.
    pub(crate) fn reserve(&mut self) -> CallbackId {
        self.last_id += 1;
        CallbackId(self.last_id)
    }

    pub(crate) fn insert(&mut self, id: CallbackId, registration: CallbackRegistration) {
        self.entries.insert(id, registration);
    }

    pub(crate) fn get_mut(&mut self, id: CallbackId) -> Option<&mut CallbackRegistration> {
        self.entries.get_mut(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
