use crate::method::MethodRegistry;
use crate::variable::VariableStore;

/// The server's variables and methods.
///
/// Construct one per process and share it with `Arc`; the dispatcher and the
/// publish scheduler both hold a reference.
#[derive(Default)]
pub struct AddressSpace {
    variables: VariableStore,
    methods: MethodRegistry,
}

impl AddressSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub fn methods(&self) -> &MethodRegistry {
        &self.methods
    }
}
