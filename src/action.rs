//! Per-node action state: the edit/delete dialog machine plus the
//! single-shot guards on boost and reply.

use crate::error::{Rejection, TreeError};
use crate::model::NodeId;
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Edit,
    Delete,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Edit => "edit",
            Self::Delete => "delete",
        })
    }
}

/// An open edit or delete dialog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dialog {
    /// Locked while a submission is outstanding: no resubmit, no cancel.
    pub submitting: bool,
    /// Last failed submission; cleared when the next one starts.
    pub error: Option<TreeError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ActionState {
    #[default]
    Idle,
    Editing(Dialog),
    Deleting(Dialog),
}

impl ActionState {
    pub fn kind(&self) -> Option<ActionKind> {
        match self {
            Self::Idle => None,
            Self::Editing(_) => Some(ActionKind::Edit),
            Self::Deleting(_) => Some(ActionKind::Delete),
        }
    }

    pub fn dialog(&self) -> Option<&Dialog> {
        match self {
            Self::Idle => None,
            Self::Editing(d) | Self::Deleting(d) => Some(d),
        }
    }

    fn dialog_mut(&mut self) -> Option<&mut Dialog> {
        match self {
            Self::Idle => None,
            Self::Editing(d) | Self::Deleting(d) => Some(d),
        }
    }
}

/// Why the dispatcher refused a transition. Turned into a [`Rejection`]
/// once the caller attaches the node id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    Idle,
    Active(ActionKind),
    NotActive(ActionKind),
    Submitting,
}

impl Refusal {
    pub fn on(self, node: &NodeId) -> Rejection {
        match self {
            Self::Idle => Rejection::NothingOpen(node.clone()),
            Self::Active(active) => Rejection::ActionActive {
                node: node.clone(),
                active,
            },
            Self::NotActive(expected) => Rejection::NoActiveAction {
                node: node.clone(),
                expected,
            },
            Self::Submitting => Rejection::Submitting(node.clone()),
        }
    }
}

/// ```text
/// idle ──request(edit)──▶ editing ──submit ok / cancel──▶ idle
/// idle ──request(delete)─▶ deleting ─submit ok / cancel──▶ idle
/// editing|deleting ──submit err──▶ same state, error attached
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionDispatcher {
    state: ActionState,
}

impl ActionDispatcher {
    pub fn state(&self) -> &ActionState {
        &self.state
    }

    pub fn active(&self) -> Option<ActionKind> {
        self.state.kind()
    }

    pub fn is_submitting(&self) -> bool {
        self.state.dialog().is_some_and(|d| d.submitting)
    }

    pub fn request(&mut self, kind: ActionKind) -> Result<(), Refusal> {
        if let Some(active) = self.active() {
            return Err(Refusal::Active(active));
        }
        self.state = match kind {
            ActionKind::Edit => ActionState::Editing(Dialog::default()),
            ActionKind::Delete => ActionState::Deleting(Dialog::default()),
        };
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<ActionKind, Refusal> {
        let kind = self.active().ok_or(Refusal::Idle)?;
        if self.is_submitting() {
            return Err(Refusal::Submitting);
        }
        self.state = ActionState::Idle;
        Ok(kind)
    }

    /// Locks the dialog for `kind` before its request goes out.
    pub fn begin_submit(&mut self, kind: ActionKind) -> Result<(), Refusal> {
        if self.active() != Some(kind) {
            return Err(Refusal::NotActive(kind));
        }
        let dialog = self.state.dialog_mut().ok_or(Refusal::NotActive(kind))?;
        if dialog.submitting {
            return Err(Refusal::Submitting);
        }
        dialog.submitting = true;
        dialog.error = None;
        Ok(())
    }

    /// Applies the outcome of a submission. Returns `false` when no matching
    /// submission was outstanding, in which case nothing changes.
    pub fn finish_submit(&mut self, kind: ActionKind, outcome: Result<(), TreeError>) -> bool {
        if self.active() != Some(kind) || !self.is_submitting() {
            return false;
        }
        match outcome {
            Ok(()) => self.state = ActionState::Idle,
            Err(error) => {
                if let Some(dialog) = self.state.dialog_mut() {
                    dialog.submitting = false;
                    dialog.error = Some(error);
                }
            }
        }
        true
    }
}

/// Guard for a fire-and-forget control (boost, reply): at most one request
/// in flight; the last failure is kept for display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ControlState {
    #[default]
    Ready,
    InFlight,
    Failed {
        error: TreeError,
        at: Instant,
    },
}

impl ControlState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::InFlight)
    }

    pub fn error(&self) -> Option<&TreeError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// `false` if a request is already in flight.
    pub fn begin(&mut self) -> bool {
        if self.is_in_flight() {
            return false;
        }
        *self = Self::InFlight;
        true
    }

    pub fn finish(&mut self, outcome: Result<(), TreeError>) {
        *self = match outcome {
            Ok(()) => Self::Ready,
            Err(error) => Self::Failed {
                error,
                at: Instant::now(),
            },
        };
    }

    /// Forgets a stored failure. An in-flight request is left alone.
    pub fn clear_failure(&mut self) {
        if matches!(self, Self::Failed { .. }) {
            *self = Self::Ready;
        }
    }

    /// Drops a failure older than `ttl`. Returns `true` if one was dropped.
    pub fn expire(&mut self, ttl: Duration) -> bool {
        if let Self::Failed { at, .. } = self {
            if at.elapsed() >= ttl {
                *self = Self::Ready;
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::MutationKind;

    fn failure() -> TreeError {
        TreeError::mutation_failed(MutationKind::Edit, &"n".into(), "nope")
    }

    #[test]
    fn starts_idle() {
        let d = ActionDispatcher::default();
        assert_eq!(d.state(), &ActionState::Idle);
        assert_eq!(d.active(), None);
    }

    #[test]
    fn request_edit_then_cancel() {
        let mut d = ActionDispatcher::default();
        d.request(ActionKind::Edit).unwrap();
        assert_eq!(d.active(), Some(ActionKind::Edit));
        assert_eq!(d.cancel(), Ok(ActionKind::Edit));
        assert_eq!(d.state(), &ActionState::Idle);
    }

    #[test]
    fn second_action_rejected_while_one_is_open() {
        let mut d = ActionDispatcher::default();
        d.request(ActionKind::Delete).unwrap();
        assert_eq!(
            d.request(ActionKind::Edit),
            Err(Refusal::Active(ActionKind::Delete))
        );
        assert_eq!(
            d.request(ActionKind::Delete),
            Err(Refusal::Active(ActionKind::Delete))
        );
        assert_eq!(d.active(), Some(ActionKind::Delete));
    }

    #[test]
    fn cancel_when_idle_is_refused() {
        let mut d = ActionDispatcher::default();
        assert_eq!(d.cancel(), Err(Refusal::Idle));
    }

    #[test]
    fn successful_submit_returns_to_idle() {
        let mut d = ActionDispatcher::default();
        d.request(ActionKind::Edit).unwrap();
        d.begin_submit(ActionKind::Edit).unwrap();
        assert!(d.is_submitting());
        assert!(d.finish_submit(ActionKind::Edit, Ok(())));
        assert_eq!(d.state(), &ActionState::Idle);
    }

    #[test]
    fn failed_submit_keeps_dialog_with_error() {
        let mut d = ActionDispatcher::default();
        d.request(ActionKind::Edit).unwrap();
        d.begin_submit(ActionKind::Edit).unwrap();
        assert!(d.finish_submit(ActionKind::Edit, Err(failure())));
        let dialog = d.state().dialog().unwrap();
        assert!(!dialog.submitting);
        assert_eq!(dialog.error, Some(failure()));

        // Retry clears the error, cancel still works afterwards.
        d.begin_submit(ActionKind::Edit).unwrap();
        assert_eq!(d.state().dialog().unwrap().error, None);
        d.finish_submit(ActionKind::Edit, Err(failure()));
        assert_eq!(d.cancel(), Ok(ActionKind::Edit));
    }

    #[test]
    fn dialog_is_locked_while_submitting() {
        let mut d = ActionDispatcher::default();
        d.request(ActionKind::Delete).unwrap();
        d.begin_submit(ActionKind::Delete).unwrap();
        assert_eq!(d.begin_submit(ActionKind::Delete), Err(Refusal::Submitting));
        assert_eq!(d.cancel(), Err(Refusal::Submitting));
    }

    #[test]
    fn submit_for_wrong_action_is_refused() {
        let mut d = ActionDispatcher::default();
        d.request(ActionKind::Edit).unwrap();
        assert_eq!(
            d.begin_submit(ActionKind::Delete),
            Err(Refusal::NotActive(ActionKind::Delete))
        );
        assert!(!d.finish_submit(ActionKind::Delete, Ok(())));
        assert_eq!(d.active(), Some(ActionKind::Edit));
    }

    #[test]
    fn control_guards_single_flight() {
        let mut c = ControlState::default();
        assert!(c.begin());
        assert!(!c.begin());
        c.finish(Err(failure()));
        assert_eq!(c.error(), Some(&failure()));
        assert!(c.begin());
        c.finish(Ok(()));
        assert_eq!(c, ControlState::Ready);
    }

    #[test]
    fn clear_failure_keeps_in_flight() {
        let mut c = ControlState::default();
        c.begin();
        c.clear_failure();
        assert!(c.is_in_flight());
        c.finish(Err(failure()));
        c.clear_failure();
        assert_eq!(c, ControlState::Ready);
    }

    #[test]
    fn control_failure_expires() {
        let mut c = ControlState::default();
        c.begin();
        c.finish(Err(failure()));
        assert!(!c.expire(Duration::from_secs(60)));
        assert!(c.expire(Duration::ZERO));
        assert_eq!(c, ControlState::Ready);
    }
}
