//! Filters over the subject's current FSM state.
//!
//! Every filter here is event-naive and asynchronous: it reads the state
//! through the ambient [`UserCage`](crate::cage::UserCage) rather than the
//! event payload. When a filter matches a [`Member`], the member is published
//! to the ambient context, where handlers pick it up through
//! [`context::member`](crate::context::member) or the
//! [`CurrentMember`](crate::extractor::CurrentMember) extractor.

use std::sync::Arc;

use tracing::warn;

use crate::context;
use crate::filter::Filter;
use crate::state::{Member, StateGroup};

/// What a state filter compares the current state against.
#[derive(Debug, Clone)]
pub enum StateTarget {
    /// Any non-empty state.
    Any,
    /// No state at all.
    Entry,
    /// One of these raw state names.
    Names(Vec<String>),
    /// One of these members.
    Members(Vec<Member>),
}

impl StateTarget {
    fn describe(&self) -> String {
        match self {
            Self::Any => "state == *".to_owned(),
            Self::Entry => "state == None".to_owned(),
            Self::Names(names) => format!("state in {names:?}"),
            Self::Members(members) => {
                let names: Vec<_> = members.iter().map(Member::name).collect();
                format!("state in {names:?}")
            }
        }
    }
}

impl From<Member> for StateTarget {
    fn from(member: Member) -> Self {
        Self::Members(vec![member])
    }
}

impl From<&Member> for StateTarget {
    fn from(member: &Member) -> Self {
        Self::Members(vec![member.clone()])
    }
}

impl From<StateGroup> for StateTarget {
    fn from(group: StateGroup) -> Self {
        Self::Members(group.members())
    }
}

impl From<&StateGroup> for StateTarget {
    fn from(group: &StateGroup) -> Self {
        Self::Members(group.members())
    }
}

impl From<Vec<Member>> for StateTarget {
    fn from(members: Vec<Member>) -> Self {
        Self::Members(members)
    }
}

impl From<&[Member]> for StateTarget {
    fn from(members: &[Member]) -> Self {
        Self::Members(members.to_vec())
    }
}

impl From<&str> for StateTarget {
    fn from(name: &str) -> Self {
        match name {
            "*" => Self::Any,
            name => Self::Names(vec![name.to_owned()]),
        }
    }
}

impl From<String> for StateTarget {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl<T: Into<StateTarget>> From<Option<T>> for StateTarget {
    fn from(target: Option<T>) -> Self {
        target.map_or(Self::Entry, Into::into)
    }
}

/// Passes when the subject has any state.
pub fn any() -> Filter {
    equals(StateTarget::Any)
}

/// Passes when the subject has no state, i.e. at the entry point of a flow.
pub fn entry() -> Filter {
    equals(StateTarget::Entry)
}

/// Alias of [`equals`].
pub fn exact(target: impl Into<StateTarget>) -> Filter {
    equals(target)
}

/// Passes when the current state matches `target`.
pub fn equals(target: impl Into<StateTarget>) -> Filter {
    let target = Arc::new(target.into());
    let name = target.describe();

    Filter::new_async(move |_| {
        let target = Arc::clone(&target);
        async move { check(&target).await }
    })
    .named(name)
}

async fn check(target: &StateTarget) -> bool {
    let Some(cage) = context::cage() else {
        warn!(target = ?target, "State filter evaluated without a subject");
        return false;
    };
    let state = match cage.get_state().await {
        Ok(state) => state,
        Err(e) => {
            warn!(key = cage.key(), error = %e, "Failed to read state");
            if let Some(ctx) = context::current() {
                ctx.record_failure(e.into());
            }
            return false;
        }
    };

    match (target, state) {
        (StateTarget::Any, state) => state.is_some(),
        (StateTarget::Entry, state) => state.is_none(),
        (_, None) => false,
        (StateTarget::Names(names), Some(state)) => names.contains(&state),
        (StateTarget::Members(members), Some(state)) => {
            let Some(member) = members.iter().find(|m| m.name() == state) else {
                return false;
            };
            if let Some(ctx) = context::current() {
                ctx.publish_member(member.clone());
            }
            true
        }
    }
}
