//! Screen state machines.
//!
//! A machine is a pure `reduce` from one state to the next. The effects a
//! transition wants run are carried as data on the new state, and a [`Runner`]
//! executes them once the transition has been committed. Effects talk back
//! only through [`Dispatch`].

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

pub mod login;
pub mod new_entry;
pub mod new_experience;
pub mod sign_up;

pub const NOTHING_TO_SAVE: &str = "Nothing to save";
pub const FORM_CONTAINS_ERRORS: &str = "Form contains errors";
pub const GENERIC_ERROR: &str = "Something went wrong - please try again.";
pub const NOT_CONNECTED: &str = "You are not connected";
pub const ALREADY_TAKEN: &str = "has already been taken";

pub trait Machine: Clone {
    type Action;
    type Effect: Clone;

    fn reduce(&self, action: Self::Action) -> Self;

    /// What the transition that produced this state asked for.
    fn effects(&self) -> &[Self::Effect];
}

#[allow(async_fn_in_trait)]
pub trait EffectHandler<M: Machine> {
    async fn run(&self, effect: M::Effect, dispatch: &Dispatch<M::Action>);
}

pub struct Dispatch<A> {
    queue: RefCell<VecDeque<A>>,
}

impl<A> Default for Dispatch<A> {
    fn default() -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
        }
    }
}

impl<A> Dispatch<A> {
    /// Queue an action. It is reduced after everything queued before it.
    pub fn send(&self, action: A) {
        self.queue.borrow_mut().push_back(action);
    }

    fn next(&self) -> Option<A> {
        self.queue.borrow_mut().pop_front()
    }
}

/// Owns a machine's state and drives it. Dropping the runner drops any
/// effect still in flight along with it.
pub struct Runner<M: Machine, H> {
    state: RefCell<M>,
    handler: H,
    dispatch: Dispatch<M::Action>,
    draining: Cell<bool>,
}

impl<M: Machine, H: EffectHandler<M>> Runner<M, H> {
    pub fn new(initial: M, handler: H) -> Self {
        Self {
            state: RefCell::new(initial),
            handler,
            dispatch: Dispatch::default(),
            draining: Cell::new(false),
        }
    }

    pub fn state(&self) -> M {
        self.state.borrow().clone()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Reduce `action` and everything it leads to. If the runner is already
    /// busy, the action is queued and handled by the call that is draining.
    /// Dropping that call's future leaves the queue for the next `dispatch`.
    pub async fn dispatch(&self, action: M::Action) {
        self.dispatch.send(action);
        if self.draining.replace(true) {
            return;
        }
        let _draining = Draining(&self.draining);

        while let Some(action) = self.dispatch.next() {
            let effects = {
                let mut state = self.state.borrow_mut();
                let next = state.reduce(action);
                let effects = next.effects().to_vec();
                *state = next;
                effects
            };

            for effect in effects {
                self.handler.run(effect, &self.dispatch).await;
            }
        }
    }
}

/// Clears the runner's draining flag when the draining future ends or is dropped.
struct Draining<'a>(&'a Cell<bool>);

impl Drop for Draining<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Submission {
    #[default]
    Inactive,
    Active,
    Warning(String),
    CommonErrors(String),
}

/// `(label, message)` pairs.
pub type FieldErrors = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Validity {
    #[default]
    Initial,
    Valid,
    Invalid(FieldErrors),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldState<T> {
    #[default]
    Unchanged,
    Changed {
        value: T,
        validity: Validity,
    },
}

impl<T> FieldState<T> {
    pub fn changed(value: T) -> Self {
        FieldState::Changed {
            value,
            validity: Validity::Initial,
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, FieldState::Changed { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            FieldState::Changed { value, .. } => Some(value),
            FieldState::Unchanged => None,
        }
    }

    pub fn errors(&self) -> Option<&FieldErrors> {
        match self {
            FieldState::Changed {
                validity: Validity::Invalid(errors),
                ..
            } => Some(errors),
            _ => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.errors().is_some()
    }
}

impl<T: Clone> FieldState<T> {
    /// Mark the field invalid, using `fallback` as its value if it was never touched.
    pub(crate) fn invalidate(&mut self, fallback: T, errors: FieldErrors) {
        let value = self.value().cloned().unwrap_or(fallback);
        *self = FieldState::Changed {
            value,
            validity: Validity::Invalid(errors),
        };
    }
}

pub(crate) enum Checked<T> {
    Skipped,
    Valid(T),
    Invalid,
}

/// Validate a text field in place. An untouched required field is validated
/// as the empty string; an untouched optional one is skipped.
pub(crate) fn check_text(
    field: &mut FieldState<String>,
    label: &str,
    required: bool,
    validate: impl Fn(&str) -> Vec<String>,
) -> Checked<String> {
    let value = match field {
        FieldState::Changed { value, .. } => value.clone(),
        FieldState::Unchanged if required => String::new(),
        FieldState::Unchanged => return Checked::Skipped,
    };

    let messages = validate(&value);
    if messages.is_empty() {
        *field = FieldState::Changed {
            value: value.clone(),
            validity: Validity::Valid,
        };
        Checked::Valid(value)
    } else {
        *field = FieldState::Changed {
            value,
            validity: Validity::Invalid(labelled(label, messages)),
        };
        Checked::Invalid
    }
}

pub(crate) fn labelled(label: &str, messages: Vec<String>) -> FieldErrors {
    messages
        .into_iter()
        .map(|message| (label.to_string(), message))
        .collect()
}

pub(crate) fn length_errors(value: &str, min: usize) -> Vec<String> {
    let length = value.trim().chars().count();
    if length == 0 {
        vec!["is required".to_string()]
    } else if length < min {
        vec![format!("must be at least {min} characters")]
    } else {
        vec![]
    }
}

pub(crate) fn email_errors(value: &str) -> Vec<String> {
    let value = value.trim();
    if value.is_empty() {
        return vec!["is required".to_string()];
    }

    let looks_right = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() >= 2
                && domain.split('.').all(|part| !part.is_empty())
                && !value.contains(char::is_whitespace)
        }
        None => false,
    };

    if looks_right {
        vec![]
    } else {
        vec!["is invalid".to_string()]
    }
}

/// Where a validated submit lands: `submit` is `None` when the form had errors.
pub(crate) fn settle<E>(
    submission: &mut Submission,
    effects: &mut Vec<E>,
    submit: Option<E>,
    scroll: E,
) {
    match submit {
        Some(effect) => {
            *submission = Submission::Active;
            effects.push(effect);
        }
        None => {
            *submission = Submission::CommonErrors(FORM_CONTAINS_ERRORS.to_string());
            effects.push(scroll);
        }
    }
}

pub(crate) fn nothing_to_save<E>(submission: &mut Submission, effects: &mut Vec<E>, scroll: E) {
    *submission = Submission::Warning(NOTHING_TO_SAVE.to_string());
    effects.push(scroll);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_count_characters_not_bytes() {
        assert!(length_errors("éé", 2).is_empty());
        assert_eq!(length_errors(" é ", 2), vec!["must be at least 2 characters"]);
        assert_eq!(length_errors("   ", 2), vec!["is required"]);
    }

    #[test]
    fn emails() {
        assert!(email_errors("me@example.com").is_empty());
        for bad in ["me", "me@", "@example.com", "me@example", "me@exa mple.com", "a@b@c.d"] {
            assert_eq!(email_errors(bad), vec!["is invalid"], "{bad}");
        }
    }

    #[test]
    fn untouched_required_fields_become_invalid() {
        let mut field = FieldState::Unchanged;
        assert!(matches!(
            check_text(&mut field, "title", true, |v| length_errors(v, 2)),
            Checked::Invalid
        ));
        assert_eq!(field.value().map(String::as_str), Some(""));
        assert!(field.is_invalid());

        let mut optional = FieldState::Unchanged;
        assert!(matches!(
            check_text(&mut optional, "description", false, |_| vec![]),
            Checked::Skipped
        ));
        assert_eq!(optional, FieldState::Unchanged);
    }

    #[derive(Debug, Clone, Default)]
    struct Counter {
        count: u32,
        effects: Vec<u32>,
    }

    impl Machine for Counter {
        type Action = u32;
        type Effect = u32;

        fn reduce(&self, action: u32) -> Self {
            Counter {
                count: self.count + action,
                effects: if action > 1 { vec![action - 1, action - 1] } else { vec![] },
            }
        }

        fn effects(&self) -> &[u32] {
            &self.effects
        }
    }

    #[derive(Default)]
    struct Echo {
        seen: RefCell<Vec<u32>>,
    }

    impl EffectHandler<Counter> for Echo {
        async fn run(&self, effect: u32, dispatch: &Dispatch<u32>) {
            self.seen.borrow_mut().push(effect);
            dispatch.send(effect);
        }
    }

    #[test]
    fn effects_feed_actions_back_in_order() {
        let runner = Runner::new(Counter::default(), Echo::default());
        futures::executor::block_on(runner.dispatch(3));

        // 3 -> effects [2, 2] -> each 2 -> effects [1, 1]
        assert_eq!(*runner.handler().seen.borrow(), vec![2, 2, 1, 1, 1, 1]);
        assert_eq!(runner.state().count, 3 + 2 + 2 + 1 + 1 + 1 + 1);
        assert!(runner.state().effects().is_empty());
    }

    #[derive(Default)]
    struct Stall {
        stalled: Cell<bool>,
    }

    impl EffectHandler<Counter> for Stall {
        async fn run(&self, _effect: u32, _dispatch: &Dispatch<u32>) {
            if self.stalled.get() {
                futures::future::pending::<()>().await;
            }
        }
    }

    #[test]
    fn a_dropped_dispatch_does_not_wedge_the_runner() {
        use futures::FutureExt;

        let runner = Runner::new(Counter::default(), Stall::default());
        runner.handler().stalled.set(true);
        assert!(runner.dispatch(2).now_or_never().is_none());
        assert_eq!(runner.state().count, 2);

        runner.handler().stalled.set(false);
        futures::executor::block_on(runner.dispatch(1));
        assert_eq!(runner.state().count, 3);
    }
}
