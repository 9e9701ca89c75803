use thiserror::Error;

/// Identifies one lexical nesting instance. Levels are handed out in increasing order and
/// never reused, so two sibling blocks never share a level.
pub type ScopeLevel = u32;

pub const GLOBAL_SCOPE: ScopeLevel = 0;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ScopeError {
    #[error("Cannot exit the global scope")]
    EmptyStack,

    #[error("`{0}` is already declared in this scope")]
    AlreadyDeclared(String),
}

/// Entries stored in a [`ScopeStack`] know their own name and the level they were
/// declared at.
pub trait Scoped {
    fn name(&self) -> &str;
    fn level(&self) -> ScopeLevel;
}

/// Linear, append-only scoped store.
///
/// Lookups scan from the most recently added entry to the oldest and take the first one
/// whose level is not deeper than the current level. This only resolves correctly while
/// entries of a level are swept as soon as that level is exited, which `exit` does.
#[derive(Clone, Debug)]
pub struct ScopeStack<V> {
    entries: Vec<V>,
    levels: Vec<ScopeLevel>,
    next_level: ScopeLevel,
}

impl<V> Default for ScopeStack<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            levels: vec![GLOBAL_SCOPE],
            next_level: GLOBAL_SCOPE + 1,
        }
    }
}

impl<V: Scoped> ScopeStack<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> ScopeLevel {
        self.levels.last().copied().unwrap_or(GLOBAL_SCOPE)
    }

    pub fn enter(&mut self) -> ScopeLevel {
        let level = self.next_level;
        self.next_level += 1;
        self.levels.push(level);

        level
    }

    /// Leaves the innermost scope, dropping everything declared in it, and returns the
    /// level that was left.
    pub fn exit(&mut self) -> Result<ScopeLevel, ScopeError> {
        if self.levels.len() <= 1 {
            return Err(ScopeError::EmptyStack);
        }

        let Some(level) = self.levels.pop() else {
            return Err(ScopeError::EmptyStack);
        };
        self.remove_all_in(level);

        Ok(level)
    }

    pub fn insert(&mut self, value: V) -> Result<(), ScopeError> {
        if self.get_in_level(value.name(), value.level()).is_some() {
            return Err(ScopeError::AlreadyDeclared(value.name().to_string()));
        }

        self.entries.push(value);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&V> {
        let current = self.current();
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.name() == name && entry.level() <= current)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut V> {
        let current = self.current();
        self.entries
            .iter_mut()
            .rev()
            .find(|entry| entry.name() == name && entry.level() <= current)
    }

    pub fn get_in_level(&self, name: &str, level: ScopeLevel) -> Option<&V> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.name() == name && entry.level() == level)
    }

    /// Pops entries off the tail while they belong to `level`.
    pub fn remove_all_in(&mut self, level: ScopeLevel) {
        while self.entries.last().is_some_and(|entry| entry.level() == level) {
            self.entries.pop();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry(&'static str, ScopeLevel, u32);

    impl Scoped for Entry {
        fn name(&self) -> &str {
            self.0
        }

        fn level(&self) -> ScopeLevel {
            self.1
        }
    }

    #[test]
    fn levels_are_never_reused() {
        let mut stack: ScopeStack<Entry> = ScopeStack::new();
        let first = stack.enter();
        assert_eq!(stack.exit(), Ok(first));
        let second = stack.enter();

        assert!(second > first);
        assert_eq!(stack.current(), second);
    }

    #[test]
    fn exit_returns_most_recent_unexited_level() {
        let mut stack: ScopeStack<Entry> = ScopeStack::new();
        let outer = stack.enter();
        let inner = stack.enter();

        assert_eq!(stack.exit(), Ok(inner));
        assert_eq!(stack.current(), outer);
        assert_eq!(stack.exit(), Ok(outer));
        assert_eq!(stack.current(), GLOBAL_SCOPE);
        assert_eq!(stack.exit(), Err(ScopeError::EmptyStack));
    }

    #[test]
    fn duplicate_in_same_level_is_rejected() {
        let mut stack = ScopeStack::new();
        assert!(stack.insert(Entry("x", 0, 1)).is_ok());
        assert_eq!(
            stack.insert(Entry("x", 0, 2)),
            Err(ScopeError::AlreadyDeclared("x".to_string()))
        );
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn inner_scope_shadows_and_sweep_restores() {
        let mut stack = ScopeStack::new();
        stack.insert(Entry("x", GLOBAL_SCOPE, 1)).unwrap();

        let level = stack.enter();
        stack.insert(Entry("x", level, 2)).unwrap();
        stack.insert(Entry("y", level, 3)).unwrap();
        assert_eq!(stack.lookup("x").map(|e| e.2), Some(2));

        stack.exit().unwrap();
        assert_eq!(stack.lookup("x").map(|e| e.2), Some(1));
        assert!(stack.lookup("y").is_none());
    }

    #[test]
    fn sibling_blocks_do_not_see_each_other() {
        let mut stack = ScopeStack::new();
        let first = stack.enter();
        stack.insert(Entry("tmp", first, 1)).unwrap();
        stack.exit().unwrap();

        stack.enter();
        assert!(stack.lookup("tmp").is_none());
    }

    #[test]
    fn remove_all_in_only_pops_tail_of_level() {
        let mut stack = ScopeStack::new();
        stack.insert(Entry("a", 0, 1)).unwrap();
        let level = stack.enter();
        stack.insert(Entry("b", level, 2)).unwrap();
        stack.insert(Entry("c", level, 3)).unwrap();

        stack.remove_all_in(level);
        assert_eq!(stack.len(), 1);
        assert!(stack.lookup("a").is_some());
    }
}
