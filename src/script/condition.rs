//! IF/NOTIF/ELSE/ENDIF nesting state.

use crate::script::ScriptError;

/// The stack of boolean scopes opened by OP_IF/OP_NOTIF, with a cached
/// "every open branch is taken" bit consulted before each opcode.
#[derive(Debug)]
pub struct ConditionNest {
    branches: Vec<bool>,
    all_true: bool,
}

impl Default for ConditionNest {
    fn default() -> ConditionNest {
        ConditionNest::new()
    }
}

impl ConditionNest {
    /// Creates an empty nest; with no open branches the result is true.
    #[must_use]
    pub fn new() -> ConditionNest {
        ConditionNest {
            branches: Vec::new(),
            all_true: true,
        }
    }

    /// Opens a branch (OP_IF).
    pub fn begin_if(&mut self, condition: bool) {
        self.branches.push(condition);
        if !condition {
            self.all_true = false;
        }
    }

    /// Opens an inverted branch (OP_NOTIF).
    #[inline]
    pub fn begin_not_if(&mut self, condition: bool) {
        self.begin_if(!condition);
    }

    /// Inverts the innermost branch (OP_ELSE).
    ///
    /// # Errors
    /// `ScriptError::UnbalancedConditional` if no branch is open.
    pub fn switch_else(&mut self) -> Result<(), ScriptError> {
        let last = self
            .branches
            .last_mut()
            .ok_or(ScriptError::UnbalancedConditional)?;
        *last = !*last;
        self.all_true = !self.branches.contains(&false);
        Ok(())
    }

    /// Closes the innermost branch (OP_ENDIF).
    ///
    /// # Errors
    /// `ScriptError::UnbalancedConditional` if no branch is open.
    pub fn end_if(&mut self) -> Result<(), ScriptError> {
        if self.branches.pop().is_none() {
            return Err(ScriptError::UnbalancedConditional);
        }
        self.all_true = !self.branches.contains(&false);
        Ok(())
    }

    /// Whether every open branch is taken.
    #[must_use]
    #[inline]
    pub fn result(&self) -> bool {
        self.all_true
    }

    /// Whether no branch is open.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Drops all open branches.
    pub fn clear(&mut self) {
        self.branches.clear();
        self.all_true = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn nesting() {
        let mut nest = ConditionNest::new();
        assert!(nest.result());
        assert!(nest.is_empty());

        nest.begin_if(true);
        assert!(nest.result());
        nest.begin_if(false);
        assert!(!nest.result());
        nest.begin_not_if(false);
        assert!(!nest.result());

        nest.end_if().unwrap();
        assert!(!nest.result());
        nest.switch_else().unwrap();
        assert!(nest.result());
        nest.end_if().unwrap();
        assert!(nest.result());
        nest.end_if().unwrap();
        assert!(nest.is_empty());
    }

    #[test]
    fn unbalanced() {
        let mut nest = ConditionNest::new();
        assert_eq!(
            nest.switch_else().unwrap_err(),
            ScriptError::UnbalancedConditional
        );
        assert_eq!(nest.end_if().unwrap_err(), ScriptError::UnbalancedConditional);
    }

    #[test]
    fn clear_restores_result() {
        let mut nest = ConditionNest::new();
        nest.begin_if(false);
        assert!(!nest.result());
        nest.clear();
        assert!(nest.result());
        assert!(nest.is_empty());
    }
}
