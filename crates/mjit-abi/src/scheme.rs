//! Per-method-kind ABI selection.

use crate::abi::Abi;

/// How a method is entered and compiled, selecting its calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Ordinary managed code calling managed code.
    Standard,
    /// Stub calling out to native code.
    NativeCallOut,
    /// Native code entering the VM.
    NativeCallIn,
    /// Interpreter template glue.
    Template,
    /// The interpreter's tree-call convention.
    TreeCall,
}

/// The distinct ABIs a platform supplies, selected per method by its kind.
#[derive(Debug, Clone)]
pub struct AbiScheme<A: Abi> {
    pub standard: A,
    pub native_call_out: A,
    pub native_call_in: A,
    pub template: A,
    pub tree_call: A,
}

impl<A: Abi> AbiScheme<A> {
    /// The ABI for a method of `kind`.
    pub fn abi_for(&self, kind: MethodKind) -> &A {
        match kind {
            MethodKind::Standard => &self.standard,
            MethodKind::NativeCallOut => &self.native_call_out,
            MethodKind::NativeCallIn => &self.native_call_in,
            MethodKind::Template => &self.template,
            MethodKind::TreeCall => &self.tree_call,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestAbi;

    #[test]
    fn test_scheme_selection() {
        let scheme = AbiScheme {
            standard: TestAbi::new(),
            native_call_out: TestAbi::new(),
            native_call_in: TestAbi::new(),
            template: TestAbi::template(),
            tree_call: TestAbi::new(),
        };
        assert!(!scheme.abi_for(MethodKind::Standard).targets_templates());
        assert!(scheme.abi_for(MethodKind::Template).targets_templates());
    }
}
