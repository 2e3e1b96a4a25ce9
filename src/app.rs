use crate::action::ControlState;
use crate::config::{ERROR_TTL_SECS, NOTIFICATION_TTL_SECS, SPINNER_FRAME_COUNT};
use crate::error::Rejection;
use crate::events::TreeEvent;
use crate::model::{Content, NodeId};
use crate::tree::{RootStatus, TreeController};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    pub timestamp: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposerMode {
    Reply,
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Field {
    Title,
    #[default]
    Body,
}

/// Two single-line fields for a reply or an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composer {
    pub target: NodeId,
    pub mode: ComposerMode,
    pub title: String,
    pub body: String,
    pub field: Field,
    /// Sent and waiting for the backend.
    pub submitted: bool,
}

impl Composer {
    fn new(target: NodeId, mode: ComposerMode) -> Self {
        Self {
            target,
            mode,
            title: String::new(),
            body: String::new(),
            field: Field::Body,
            submitted: false,
        }
    }

    pub fn content(&self) -> Content {
        Content::new(Some(&self.title), Some(&self.body))
    }

    fn active_mut(&mut self) -> &mut String {
        match self.field {
            Field::Title => &mut self.title,
            Field::Body => &mut self.body,
        }
    }

    pub fn push(&mut self, c: char) {
        if !self.submitted {
            self.active_mut().push(c);
        }
    }

    pub fn backspace(&mut self) {
        if !self.submitted {
            self.active_mut().pop();
        }
    }

    pub fn next_field(&mut self) {
        self.field = match self.field {
            Field::Title => Field::Body,
            Field::Body => Field::Title,
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmDelete {
    pub target: NodeId,
    pub replies: usize,
    pub submitted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ActiveOverlay {
    #[default]
    None,
    Composer(Composer),
    Confirm(ConfirmDelete),
}

/// Immutable configuration set at startup.
pub struct AppConfig {
    /// Where the thread came from, shown in the header.
    pub source: String,
    pub version_string: String,
}

pub struct AppState {
    pub config: AppConfig,
    pub tree: TreeController,

    // Navigation
    pub cursor: usize,

    // Transient UI
    pub overlay: ActiveOverlay,
    pub notifications: Vec<Notification>,
    pub error: Option<(String, Instant)>,
    pub spinner_frame: usize,
    pub should_quit: bool,
    announced_removal: Option<NodeId>,
}

impl AppState {
    pub fn new(config: AppConfig, tree: TreeController) -> Self {
        Self {
            config,
            tree,
            cursor: 0,
            overlay: ActiveOverlay::None,
            notifications: Vec::new(),
            error: None,
            spinner_frame: 0,
            should_quit: false,
            announced_removal: None,
        }
    }

    pub fn row_count(&self) -> usize {
        self.tree.arena().len()
    }

    pub fn selected(&self) -> Option<NodeId> {
        self.tree.rows().get(self.cursor).map(|r| r.id().clone())
    }

    pub fn move_cursor_up(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
        }
    }

    pub fn move_cursor_down(&mut self) {
        if self.cursor + 1 < self.row_count() {
            self.cursor += 1;
        }
    }

    fn clamp_cursor(&mut self) {
        self.cursor = self.cursor.min(self.row_count().saturating_sub(1));
    }

    pub fn is_loading(&self) -> bool {
        !self.tree.is_idle()
    }

    pub fn advance_spinner(&mut self) {
        self.spinner_frame = (self.spinner_frame + 1) % SPINNER_FRAME_COUNT;
    }

    pub fn notify(&mut self, message: impl Into<String>) {
        self.notifications.push(Notification {
            message: message.into(),
            timestamp: Instant::now(),
        });
    }

    pub fn prune_notifications(&mut self) {
        let now = Instant::now();
        self.notifications
            .retain(|n| now.duration_since(n.timestamp).as_secs() < NOTIFICATION_TTL_SECS);
    }

    pub fn set_error(&mut self, msg: String) {
        self.error = Some((msg, Instant::now()));
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn prune_error(&mut self) {
        if let Some((_, ts)) = &self.error {
            if ts.elapsed().as_secs() >= ERROR_TTL_SECS {
                self.error = None;
            }
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|(msg, _)| msg.as_str())
    }

    fn reject(&mut self, rejection: Rejection) {
        tracing::debug!("request refused: {rejection}");
        self.set_error(rejection.to_string());
    }

    // --- Tree driving ---

    /// Applies `event` and anything else already queued behind it.
    pub fn apply_tree_event(&mut self, event: TreeEvent) {
        self.tree.apply(event);
        self.tree.pump();
        self.after_tree_change();
    }

    /// Re-syncs cursor and overlays with the tree after any change.
    pub fn after_tree_change(&mut self) {
        self.clamp_cursor();
        self.sync_overlay();
        if let RootStatus::Removed(id) = self.tree.status() {
            if self.announced_removal.as_ref() != Some(id) {
                let id = id.clone();
                self.notify(format!("{id} was deleted"));
                self.announced_removal = Some(id);
            }
        }
    }

    pub fn tick(&mut self) {
        self.advance_spinner();
        self.tree.prune_transient();
        self.prune_notifications();
        self.prune_error();
    }

    fn with_selected(&mut self, op: impl FnOnce(&mut TreeController, &NodeId) -> Result<(), Rejection>) {
        let Some(id) = self.selected() else {
            return;
        };
        if let Err(rejection) = op(&mut self.tree, &id) {
            self.reject(rejection);
        }
    }

    pub fn boost_selected(&mut self) {
        self.with_selected(TreeController::boost);
    }

    pub fn retry_selected(&mut self) {
        if let RootStatus::Failed(root, _) = self.tree.status() {
            let root = root.clone();
            if let Err(rejection) = self.tree.retry(&root) {
                self.reject(rejection);
            }
            return;
        }
        self.with_selected(TreeController::retry);
    }

    pub fn expand_selected(&mut self) {
        self.with_selected(TreeController::expand);
    }

    pub fn focus_selected(&mut self) {
        if let Some(id) = self.selected() {
            self.tree.focus(id);
            self.cursor = 0;
        }
    }

    pub fn focus_parent(&mut self) {
        let parent = self
            .tree
            .arena()
            .root_entry()
            .and_then(|e| e.node.parent.clone());
        match parent {
            Some(parent) => {
                self.tree.focus(parent);
                self.cursor = 0;
            }
            None => self.set_error("already at the top of the thread".to_string()),
        }
    }

    // --- Overlays ---

    pub fn has_composer(&self) -> bool {
        matches!(self.overlay, ActiveOverlay::Composer(_))
    }

    pub fn has_confirm(&self) -> bool {
        matches!(self.overlay, ActiveOverlay::Confirm(_))
    }

    pub fn composer_mut(&mut self) -> Option<&mut Composer> {
        match &mut self.overlay {
            ActiveOverlay::Composer(composer) => Some(composer),
            _ => None,
        }
    }

    pub fn open_reply(&mut self) {
        if let Some(id) = self.selected() {
            self.tree.clear_reply_error(&id);
            self.overlay = ActiveOverlay::Composer(Composer::new(id, ComposerMode::Reply));
        }
    }

    pub fn open_edit(&mut self) {
        let Some(id) = self.selected() else {
            return;
        };
        if let Err(rejection) = self.tree.request_edit(&id) {
            self.reject(rejection);
            return;
        }
        let mut composer = Composer::new(id.clone(), ComposerMode::Edit);
        if let Some(node) = self.tree.node(&id) {
            composer.title = node.title.clone().unwrap_or_default();
            composer.body = node.body.clone().unwrap_or_default();
        }
        self.overlay = ActiveOverlay::Composer(composer);
    }

    pub fn open_delete(&mut self) {
        let Some(id) = self.selected() else {
            return;
        };
        if let Err(rejection) = self.tree.request_delete(&id) {
            self.reject(rejection);
            return;
        }
        let replies = self.tree.arena().descendant_count(&id);
        self.overlay = ActiveOverlay::Confirm(ConfirmDelete {
            target: id,
            replies,
            submitted: false,
        });
    }

    /// Esc / `n`. Edit and delete dialogs stay open while submitting.
    pub fn cancel_overlay(&mut self) {
        let target = match &self.overlay {
            ActiveOverlay::None => return,
            ActiveOverlay::Composer(c) if c.mode == ComposerMode::Reply => {
                self.overlay = ActiveOverlay::None;
                return;
            }
            ActiveOverlay::Composer(Composer { target, .. })
            | ActiveOverlay::Confirm(ConfirmDelete { target, .. }) => target.clone(),
        };
        match self.tree.cancel_action(&target) {
            Ok(_) => self.overlay = ActiveOverlay::None,
            Err(Rejection::UnknownNode(_) | Rejection::NotMounted) => {
                self.overlay = ActiveOverlay::None;
            }
            Err(rejection) => self.reject(rejection),
        }
    }

    /// Enter / `y`.
    pub fn submit_overlay(&mut self) {
        let outcome = match &mut self.overlay {
            ActiveOverlay::None => return,
            ActiveOverlay::Composer(composer) => {
                let content = composer.content();
                let target = composer.target.clone();
                let outcome = match composer.mode {
                    ComposerMode::Reply => self.tree.submit_reply(&target, content),
                    ComposerMode::Edit => self.tree.submit_edit(&target, content),
                };
                if outcome.is_ok() {
                    composer.submitted = true;
                }
                outcome
            }
            ActiveOverlay::Confirm(confirm) => {
                let outcome = self.tree.confirm_delete(&confirm.target);
                if outcome.is_ok() {
                    confirm.submitted = true;
                }
                outcome
            }
        };
        if let Err(rejection) = outcome {
            self.reject(rejection);
        }
    }

    /// Error attached to the open overlay's target by its last failed submit.
    pub fn overlay_error(&self) -> Option<String> {
        match &self.overlay {
            ActiveOverlay::None => None,
            ActiveOverlay::Composer(c) => {
                let entry = self.tree.entry(&c.target)?;
                match c.mode {
                    ComposerMode::Reply => entry.reply.error(),
                    ComposerMode::Edit => entry.actions.state().dialog()?.error.as_ref(),
                }
                .map(ToString::to_string)
            }
            ActiveOverlay::Confirm(c) => {
                let entry = self.tree.entry(&c.target)?;
                entry
                    .actions
                    .state()
                    .dialog()?
                    .error
                    .as_ref()
                    .map(ToString::to_string)
            }
        }
    }

    /// Closes a submitted overlay once its request settled successfully and
    /// unlocks it for another try when the request failed.
    fn sync_overlay(&mut self) {
        let mut done: Option<String> = None;
        match &mut self.overlay {
            ActiveOverlay::None => {}
            ActiveOverlay::Composer(c) if c.submitted => {
                let Some(entry) = self.tree.entry(&c.target) else {
                    self.overlay = ActiveOverlay::None;
                    return;
                };
                match c.mode {
                    ComposerMode::Reply => match &entry.reply {
                        ControlState::InFlight => {}
                        ControlState::Ready => done = Some("Reply posted".to_string()),
                        ControlState::Failed { .. } => c.submitted = false,
                    },
                    ComposerMode::Edit => {
                        if entry.actions.active().is_none() {
                            done = Some("Saved".to_string());
                        } else if !entry.actions.is_submitting() {
                            c.submitted = false;
                        }
                    }
                }
            }
            ActiveOverlay::Composer(_) => {}
            ActiveOverlay::Confirm(c) if c.submitted => match self.tree.entry(&c.target) {
                None => done = Some(format!("Deleted {}", c.target)),
                Some(entry) if !entry.actions.is_submitting() => c.submitted = false,
                Some(_) => {}
            },
            ActiveOverlay::Confirm(_) => {}
        }
        if let Some(message) = done {
            self.overlay = ActiveOverlay::None;
            self.notify(message);
        }
    }
}
