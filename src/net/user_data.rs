use parking_lot::RwLock;

// -----------------------------------------------------------------------------
// ----- UserData --------------------------------------------------------------

/// Caller-owned value attached to a connection, listener or registry, used to
/// correlate network objects with application state.
#[derive(Debug)]
pub struct UserData<U> {
    slot: RwLock<Option<U>>,
}

impl<U> Default for UserData<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> UserData<U> {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// Store `value`, returning whatever was attached before.
    pub fn set(&self, value: U) -> Option<U> {
        self.slot.write().replace(value)
    }

    pub fn take(&self) -> Option<U> {
        self.slot.write().take()
    }

    pub fn is_set(&self) -> bool {
        self.slot.read().is_some()
    }

    pub fn with<R>(&self, f: impl FnOnce(Option<&U>) -> R) -> R {
        f(self.slot.read().as_ref())
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(Option<&mut U>) -> R) -> R {
        f(self.slot.write().as_mut())
    }
}

impl<U: Clone> UserData<U> {
    pub fn get(&self) -> Option<U> {
        self.slot.read().clone()
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
