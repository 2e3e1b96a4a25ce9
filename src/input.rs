use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    Quit,
    DismissError,
    MoveUp,
    MoveDown,
    Boost,
    Reply,
    Edit,
    Delete,
    Focus,
    FocusParent,
    Retry,
    Expand,
    // Overlay actions
    Type(char),
    Backspace,
    NextField,
    Submit,
    Cancel,
    None,
}

/// Which overlay (if any) is currently displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlayMode {
    #[default]
    None,
    Composer,
    Confirm,
}

/// Captures the UI state needed to interpret a key press.
#[derive(Debug, Clone, Default)]
pub struct InputContext {
    pub has_error: bool,
    pub overlay: OverlayMode,
}

pub fn map_key(key: KeyEvent, ctx: &InputContext) -> Action {
    if key.kind != KeyEventKind::Press {
        return Action::None;
    }

    // Ctrl+C always quits
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Action::Quit;
    }

    match ctx.overlay {
        // Every printable key is text while composing.
        OverlayMode::Composer => {
            return match key.code {
                KeyCode::Esc => Action::Cancel,
                KeyCode::Enter => Action::Submit,
                KeyCode::Tab | KeyCode::BackTab => Action::NextField,
                KeyCode::Backspace => Action::Backspace,
                KeyCode::Char(c) => Action::Type(c),
                _ => Action::None,
            };
        }
        OverlayMode::Confirm => {
            return match key.code {
                KeyCode::Char('y' | 'Y') | KeyCode::Enter => Action::Submit,
                KeyCode::Char('n' | 'N' | 'q') | KeyCode::Esc => Action::Cancel,
                _ => Action::None,
            };
        }
        OverlayMode::None => {}
    }

    match key.code {
        KeyCode::Char('q') => Action::Quit,
        KeyCode::Esc => {
            if ctx.has_error {
                Action::DismissError
            } else {
                Action::Quit
            }
        }
        KeyCode::Up | KeyCode::Char('k') => Action::MoveUp,
        KeyCode::Down | KeyCode::Char('j') => Action::MoveDown,
        KeyCode::Char('b') => Action::Boost,
        KeyCode::Char('r') => Action::Reply,
        KeyCode::Char('e') => Action::Edit,
        KeyCode::Char('d') => Action::Delete,
        KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => Action::Focus,
        KeyCode::Char('u') | KeyCode::Left | KeyCode::Char('h') => Action::FocusParent,
        KeyCode::Char('R') => Action::Retry,
        KeyCode::Char('x') => Action::Expand,
        _ => Action::None,
    }
}
