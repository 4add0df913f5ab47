//! Declarative state groups.
//!
//! A [`StateGroup`] is a named, ordered set of states plus nested subgroups.
//! Fully qualified names and ordinal links are derived once, when the group
//! is built:
//!
//! ```rust,ignore
//! let form = StateGroup::builder("Form")
//!     .states(["name", "age", "pet"])
//!     .group(StateGroup::builder("Extra").state("comment"))
//!     .build()?;
//!
//! let name = form.member("name").unwrap();
//! assert_eq!(name.name(), "Form.name");
//! assert_eq!(name.next()?.name(), "Form.age");
//! assert_eq!(form.last().unwrap().name(), "Form.Extra.comment");
//! ```

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{ConfigError, StateError};

struct GroupNode {
    name: String,
    full_name: String,
    states: Vec<Arc<str>>,
    children: Vec<StateGroup>,
}

/// A named group of conversational states.
///
/// Cloning is cheap; clones refer to the same group.
#[derive(Clone)]
pub struct StateGroup {
    node: Arc<GroupNode>,
}

impl StateGroup {
    /// Starts declaring a group named `name`.
    pub fn builder(name: impl Into<String>) -> StateGroupBuilder {
        StateGroupBuilder {
            name: name.into(),
            states: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builds a flat group from a list of state names.
    pub fn from_states<I, S>(name: impl Into<String>, states: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::builder(name).states(states).build()
    }

    /// Returns the short name of this group.
    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// Returns the dotted name of this group, including its parents.
    pub fn full_name(&self) -> &str {
        &self.node.full_name
    }

    /// Returns the states declared directly in this group.
    pub fn own_members(&self) -> Vec<Member> {
        (0..self.node.states.len())
            .map(|index| Member {
                group: self.clone(),
                index,
            })
            .collect()
    }

    /// Returns every member: own states first, then subgroups depth-first.
    pub fn members(&self) -> Vec<Member> {
        let mut members = self.own_members();
        for child in &self.node.children {
            members.extend(child.members());
        }
        members
    }

    /// Returns the direct subgroups.
    pub fn children(&self) -> &[StateGroup] {
        &self.node.children
    }

    /// Looks up a subgroup by short name.
    pub fn child(&self, name: &str) -> Option<&StateGroup> {
        self.node.children.iter().find(|c| c.name() == name)
    }

    /// Looks up an own state by short name.
    pub fn member(&self, short_name: &str) -> Option<Member> {
        let full_name = format!("{}.{short_name}", self.node.full_name);
        self.node
            .states
            .iter()
            .position(|s| **s == *full_name)
            .map(|index| Member {
                group: self.clone(),
                index,
            })
    }

    /// Looks up any member of this group tree by fully qualified name.
    pub fn get(&self, full_name: &str) -> Option<Member> {
        self.members().into_iter().find(|m| m.name() == full_name)
    }

    /// Returns `true` if `member` belongs to this group tree.
    pub fn contains(&self, member: &Member) -> bool {
        self.get(member.name()).is_some()
    }

    /// Returns the first member.
    pub fn first(&self) -> Option<Member> {
        self.members().into_iter().next()
    }

    /// Returns the last member.
    pub fn last(&self) -> Option<Member> {
        self.members().pop()
    }
}

impl PartialEq for StateGroup {
    fn eq(&self, other: &Self) -> bool {
        self.full_name() == other.full_name()
    }
}

impl Eq for StateGroup {}

impl fmt::Debug for StateGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateGroup")
            .field("name", &self.node.full_name)
            .field("states", &self.node.states)
            .field("children", &self.node.children)
            .finish()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Declares a [`StateGroup`].
#[derive(Debug, Clone)]
pub struct StateGroupBuilder {
    name: String,
    states: Vec<String>,
    children: Vec<StateGroupBuilder>,
}

impl StateGroupBuilder {
    /// Appends a state.
    pub fn state(mut self, name: impl Into<String>) -> Self {
        self.states.push(name.into());
        self
    }

    /// Appends several states, in order.
    pub fn states<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.states.extend(names.into_iter().map(Into::into));
        self
    }

    /// Appends a nested group.
    pub fn group(mut self, child: StateGroupBuilder) -> Self {
        self.children.push(child);
        self
    }

    /// Validates the declaration and derives all names.
    pub fn build(self) -> Result<StateGroup, ConfigError> {
        self.build_under(None)
    }

    fn build_under(self, parent: Option<&str>) -> Result<StateGroup, ConfigError> {
        validate_name(&self.name)?;
        let full_name = match parent {
            Some(parent) => format!("{parent}.{}", self.name),
            None => self.name,
        };
        let name = full_name
            .rsplit('.')
            .next()
            .unwrap_or(&full_name)
            .to_owned();

        let mut seen = HashSet::new();
        for state in &self.states {
            validate_name(state)?;
            if !seen.insert(state.as_str()) {
                return Err(ConfigError::invalid_state(format!(
                    "'{state}' is declared twice in '{full_name}'"
                )));
            }
        }
        for child in &self.children {
            if !seen.insert(child.name.as_str()) {
                return Err(ConfigError::invalid_state(format!(
                    "'{}' is declared twice in '{full_name}'",
                    child.name
                )));
            }
        }

        let states = self
            .states
            .iter()
            .map(|s| Arc::from(format!("{full_name}.{s}")))
            .collect();
        let children = self
            .children
            .into_iter()
            .map(|child| child.build_under(Some(&full_name)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StateGroup {
            node: Arc::new(GroupNode {
                name,
                full_name,
                states,
                children,
            }),
        })
    }
}

fn validate_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::invalid_state("names cannot be empty"));
    }
    if name.contains('.') || name.contains(char::is_whitespace) {
        return Err(ConfigError::invalid_state(format!(
            "'{name}' cannot contain dots or whitespace"
        )));
    }
    if name == "*" {
        return Err(ConfigError::invalid_state("'*' is reserved"));
    }
    Ok(())
}

// =============================================================================
// Member
// =============================================================================

/// One state of a [`StateGroup`].
///
/// Navigation (`next`, `prev`, `top`) walks the owning group's flattened
/// member list, so the last own state of a group is followed by the first
/// state of its first subgroup.
#[derive(Clone)]
pub struct Member {
    group: StateGroup,
    index: usize,
}

impl Member {
    /// Returns the fully qualified name, e.g. `Form.age`.
    pub fn name(&self) -> &str {
        &self.group.node.states[self.index]
    }

    /// Returns the name without the group prefix, e.g. `age`.
    pub fn short_name(&self) -> &str {
        let name = self.name();
        &name[self.group.full_name().len() + 1..]
    }

    /// Returns the group that declared this member.
    pub fn group(&self) -> &StateGroup {
        &self.group
    }

    /// Returns the dotted name of the declaring group.
    pub fn group_name(&self) -> &str {
        self.group.full_name()
    }

    /// Returns the member after this one.
    pub fn next(&self) -> Result<Member, StateError> {
        let members = self.group.members();
        let position = self.position(&members);
        members
            .get(position + 1)
            .cloned()
            .ok_or_else(|| StateError::NoNext(self.name().to_owned()))
    }

    /// Returns the member before this one.
    pub fn prev(&self) -> Result<Member, StateError> {
        let members = self.group.members();
        self.position(&members)
            .checked_sub(1)
            .and_then(|position| members.get(position).cloned())
            .ok_or_else(|| StateError::NoPrev(self.name().to_owned()))
    }

    /// Returns the first member of this member's group.
    pub fn top(&self) -> Result<Member, StateError> {
        self.group
            .first()
            .ok_or_else(|| StateError::NoTop(self.group.full_name().to_owned()))
    }

    /// Returns the last member of this member's group.
    pub fn last(&self) -> Result<Member, StateError> {
        self.group
            .last()
            .ok_or_else(|| StateError::NoTop(self.group.full_name().to_owned()))
    }

    fn position(&self, members: &[Member]) -> usize {
        members.iter().position(|m| m == self).unwrap_or(self.index)
    }
}

impl PartialEq for Member {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for Member {}

impl Hash for Member {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Member").field(&self.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> StateGroup {
        StateGroup::from_states("G", ["a", "b", "c"]).unwrap()
    }

    #[test]
    fn test_ordinal_navigation() {
        let group = abc();
        let a = group.member("a").unwrap();
        let b = group.member("b").unwrap();
        let c = group.member("c").unwrap();

        assert_eq!(a.next().unwrap(), b);
        assert_eq!(b.prev().unwrap(), a);
        assert_eq!(c.next(), Err(StateError::NoNext("G.c".into())));
        assert_eq!(a.prev(), Err(StateError::NoPrev("G.a".into())));
        assert_eq!(c.top().unwrap(), a);
        assert_eq!(a.last().unwrap(), c);
    }

    #[test]
    fn test_nested_names_and_order() {
        let form = StateGroup::builder("Form")
            .states(["name", "age"])
            .group(StateGroup::builder("Extra").states(["x", "y"]))
            .state("pet")
            .build()
            .unwrap();

        let names: Vec<_> = form.members().iter().map(|m| m.name().to_owned()).collect();
        assert_eq!(
            names,
            ["Form.name", "Form.age", "Form.pet", "Form.Extra.x", "Form.Extra.y"]
        );

        let extra = form.child("Extra").unwrap();
        assert_eq!(extra.full_name(), "Form.Extra");
        assert_eq!(extra.name(), "Extra");

        let pet = form.member("pet").unwrap();
        assert_eq!(pet.short_name(), "pet");
        assert_eq!(pet.next().unwrap().name(), "Form.Extra.x");

        // Subgroup members navigate within their own group.
        let y = extra.member("y").unwrap();
        assert!(y.next().is_err());
        assert_eq!(y.top().unwrap().name(), "Form.Extra.x");

        assert!(form.contains(&y));
        assert_eq!(form.get("Form.Extra.y").unwrap(), y);
    }

    #[test]
    fn test_member_lookup_by_short_name() {
        let form = StateGroup::builder("Form")
            .states(["name", "age"])
            .group(StateGroup::builder("Extra").state("x"))
            .build()
            .unwrap();

        let age = form.member("age").unwrap();
        assert_eq!(age.name(), "Form.age");
        assert_eq!(age.short_name(), "age");
        let extra = form.child("Extra").unwrap();
        assert_eq!(extra.member("x").unwrap().name(), "Form.Extra.x");

        assert!(form.member("Form.age").is_none());
        assert!(form.member("x").is_none());
        assert!(form.member("missing").is_none());
    }

    #[test]
    fn test_invalid_declarations() {
        assert!(StateGroup::from_states("G", ["a", "a"]).is_err());
        assert!(StateGroup::from_states("G", ["a.b"]).is_err());
        assert!(StateGroup::from_states("", ["a"]).is_err());
        assert!(StateGroup::from_states("G", ["*"]).is_err());
        assert!(
            StateGroup::builder("G")
                .state("sub")
                .group(StateGroup::builder("sub"))
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_display_is_full_name() {
        let group = abc();
        assert_eq!(group.member("b").unwrap().to_string(), "G.b");
    }
}
